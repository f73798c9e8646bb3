// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Camera backend that reads raw frames from an `ffmpeg` child process
//!
//! ffmpeg grabs from the platform capture API (v4l2, avfoundation or
//! vfwcap), scales to a fixed size and writes packed `rgb24` frames to
//! stdout, so every frame is exactly `width * height * 3` bytes.

use async_trait::async_trait;
use image::RgbImage;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::debug;

use super::{Backend, CameraDevice, CameraOpener};
use crate::config::CameraConfig;
use crate::{Result, ScannerError};

/// Opens cameras through ffmpeg
pub struct FfmpegOpener {
    ffmpeg_path: String,
    width: u32,
    height: u32,
}

impl FfmpegOpener {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            width: config.width,
            height: config.height,
        }
    }

    fn command_args(&self, index: u32, backend: Backend) -> Vec<String> {
        let mut args = input_args(index, backend, self.width, self.height);
        args.extend(
            [
                "-vf".to_string(),
                format!("scale={}:{}", self.width, self.height),
                "-f".to_string(),
                "rawvideo".to_string(),
                "-pix_fmt".to_string(),
                "rgb24".to_string(),
                "-loglevel".to_string(),
                "error".to_string(),
                "-".to_string(),
            ],
        );
        args
    }
}

impl CameraOpener for FfmpegOpener {
    fn open(&self, index: u32, backend: Backend) -> Result<Box<dyn CameraDevice>> {
        check_device(index)?;

        let args = self.command_args(index, backend);
        debug!("Spawning {} {}", self.ffmpeg_path, args.join(" "));

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ScannerError::Camera(format!("ffmpeg spawn failed: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ScannerError::Camera("ffmpeg stdout unavailable".to_string()))?;

        Ok(Box::new(FfmpegCamera {
            _child: child,
            stdout,
            width: self.width,
            height: self.height,
        }))
    }
}

/// A running ffmpeg capture; the process is killed when this is dropped
struct FfmpegCamera {
    _child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
}

#[async_trait]
impl CameraDevice for FfmpegCamera {
    async fn read_frame(&mut self) -> Result<RgbImage> {
        let mut buffer = vec![0u8; (self.width * self.height * 3) as usize];
        self.stdout
            .read_exact(&mut buffer)
            .await
            .map_err(|e| ScannerError::Camera(format!("camera read failed: {}", e)))?;

        RgbImage::from_raw(self.width, self.height, buffer)
            .ok_or_else(|| ScannerError::Camera("short frame from camera".to_string()))
    }
}

#[cfg(target_os = "linux")]
fn check_device(index: u32) -> Result<()> {
    let path = format!("/dev/video{}", index);
    if std::path::Path::new(&path).exists() {
        Ok(())
    } else {
        Err(ScannerError::Camera(format!("{} not found", path)))
    }
}

#[cfg(not(target_os = "linux"))]
fn check_device(_index: u32) -> Result<()> {
    Ok(())
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[cfg(target_os = "linux")]
fn input_args(index: u32, backend: Backend, width: u32, height: u32) -> Vec<String> {
    let device = format!("/dev/video{}", index);
    match backend {
        // Compressed capture keeps USB bandwidth down
        Backend::Preferred => {
            let size = format!("{}x{}", width, height);
            strings(&["-f", "v4l2", "-input_format", "mjpeg", "-video_size", &size, "-i", &device])
        }
        Backend::Default => strings(&["-f", "v4l2", "-i", &device]),
    }
}

#[cfg(target_os = "macos")]
fn input_args(index: u32, backend: Backend, width: u32, height: u32) -> Vec<String> {
    let device = index.to_string();
    match backend {
        Backend::Preferred => {
            let size = format!("{}x{}", width, height);
            strings(&["-f", "avfoundation", "-framerate", "30", "-video_size", &size, "-i", &device])
        }
        Backend::Default => strings(&["-f", "avfoundation", "-i", &device]),
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn input_args(index: u32, backend: Backend, _width: u32, _height: u32) -> Vec<String> {
    let index = index.to_string();
    match backend {
        Backend::Preferred => strings(&["-f", "vfwcap", "-framerate", "30", "-i", &index]),
        Backend::Default => strings(&["-f", "vfwcap", "-i", &index]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opener() -> FfmpegOpener {
        FfmpegOpener::new(&CameraConfig::default())
    }

    #[test]
    fn test_output_is_raw_rgb_of_configured_size() {
        let args = opener().command_args(0, Backend::Default);
        let tail: Vec<&str> = args.iter().rev().take(9).rev().map(String::as_str).collect();
        assert_eq!(
            tail,
            ["-vf", "scale=640:480", "-f", "rawvideo", "-pix_fmt", "rgb24", "-loglevel", "error", "-"]
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_backends() {
        let preferred = opener().command_args(2, Backend::Preferred);
        assert!(preferred.windows(2).any(|w| w == ["-input_format", "mjpeg"]));
        assert!(preferred.windows(2).any(|w| w == ["-i", "/dev/video2"]));

        let default = opener().command_args(2, Backend::Default);
        assert!(!default.iter().any(|a| a == "-input_format"));
        assert!(default.windows(2).any(|w| w == ["-i", "/dev/video2"]));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_missing_device_is_camera_error() {
        let err = check_device(9999).unwrap_err();
        assert!(matches!(err, ScannerError::Camera(msg) if msg.contains("/dev/video9999")));
    }
}
