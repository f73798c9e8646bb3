// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Webcam capture
//!
//! [`CaptureService`] owns at most one open camera. The handle is opened on
//! the first [`CaptureService::acquire`] and stays open until
//! [`CaptureService::release`], so the live preview and still captures share
//! the same device.

pub mod ffmpeg;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{Result, ScannerError};

/// Multipart boundary used by the MJPEG preview stream
pub const FRAME_BOUNDARY: &str = "frame";

/// Time a freshly opened device gets to deliver its first frame
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(10);

/// Capture backend to open a device with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Platform-specific fast path
    Preferred,
    /// Plain platform default
    Default,
}

/// An open camera producing RGB frames
#[async_trait]
pub trait CameraDevice: Send {
    /// Read the next frame
    async fn read_frame(&mut self) -> Result<RgbImage>;
}

/// Opens camera devices by index
pub trait CameraOpener: Send + Sync {
    fn open(&self, index: u32, backend: Backend) -> Result<Box<dyn CameraDevice>>;
}

/// Shared handle to the open camera; frame reads lock the device itself
pub type SharedCamera = Arc<Mutex<Box<dyn CameraDevice>>>;

/// A device whose first frame was read while opening it
struct PrimedDevice {
    first: Option<RgbImage>,
    inner: Box<dyn CameraDevice>,
}

#[async_trait]
impl CameraDevice for PrimedDevice {
    async fn read_frame(&mut self) -> Result<RgbImage> {
        match self.first.take() {
            Some(frame) => Ok(frame),
            None => self.inner.read_frame().await,
        }
    }
}

/// Owner of the process-wide camera handle
pub struct CaptureService {
    opener: Box<dyn CameraOpener>,
    index: u32,
    handle: Mutex<Option<SharedCamera>>,
}

impl CaptureService {
    /// Create a service that opens device `index` with `opener`
    pub fn new(opener: Box<dyn CameraOpener>, index: u32) -> Self {
        Self {
            opener,
            index,
            handle: Mutex::new(None),
        }
    }

    /// Open `backend` and wait for its first frame
    ///
    /// A capture process can start and then die on options the device
    /// rejects, so the device only counts as open once it has produced a frame.
    async fn open_backend(&self, backend: Backend) -> Result<Box<dyn CameraDevice>> {
        let mut device = self.opener.open(self.index, backend)?;

        let first = tokio::time::timeout(FIRST_FRAME_TIMEOUT, device.read_frame())
            .await
            .map_err(|_| {
                ScannerError::Camera(format!("no frame within {}s", FIRST_FRAME_TIMEOUT.as_secs()))
            })??;

        Ok(Box::new(PrimedDevice {
            first: Some(first),
            inner: device,
        }))
    }

    /// Return the open camera, opening it first if needed
    pub async fn acquire(&self) -> Result<SharedCamera> {
        let mut handle = self.handle.lock().await;

        if let Some(camera) = handle.as_ref() {
            return Ok(Arc::clone(camera));
        }

        let device = match self.open_backend(Backend::Preferred).await {
            Ok(device) => device,
            Err(e) => {
                warn!("Preferred camera backend failed ({}), trying default", e);
                self.open_backend(Backend::Default).await.map_err(|e| {
                    ScannerError::Camera(format!("Could not open webcam: {}", e))
                })?
            }
        };

        info!("Opened camera {}", self.index);
        let camera: SharedCamera = Arc::new(Mutex::new(device));
        *handle = Some(Arc::clone(&camera));
        Ok(camera)
    }

    /// Close the camera if it is open
    ///
    /// A stream that is still running keeps its own reference and closes the
    /// device when it ends.
    pub async fn release(&self) {
        if self.handle.lock().await.take().is_some() {
            info!("Released camera {}", self.index);
        }
    }

    /// Whether a camera handle is currently held
    pub async fn is_active(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// Drop `camera` from the slot if it is still the cached handle
    async fn forget(&self, camera: &SharedCamera) {
        let mut handle = self.handle.lock().await;
        if handle.as_ref().is_some_and(|held| Arc::ptr_eq(held, camera)) {
            *handle = None;
            info!("Dropped camera {} after a failed read", self.index);
        }
    }

    /// Read a single frame
    ///
    /// A failed read drops the cached handle so the next call reopens the
    /// device.
    pub async fn capture_one_frame(&self) -> Result<RgbImage> {
        let camera = self.acquire().await?;
        let frame = camera.lock().await.read_frame().await;

        match frame {
            Ok(frame) => Ok(frame),
            Err(e) => {
                warn!("Frame read failed: {}", e);
                self.forget(&camera).await;
                Err(ScannerError::Camera("Failed to capture frame from webcam".to_string()))
            }
        }
    }

    /// Read a single frame as JPEG bytes
    pub async fn capture_jpeg(&self) -> Result<Vec<u8>> {
        let frame = self.capture_one_frame().await?;
        encode_jpeg(&frame)
    }

    /// Endless MJPEG multipart chunks from the camera
    ///
    /// The camera is acquired before returning, so an unavailable device is
    /// reported here rather than as an empty stream. The stream ends on the
    /// first failed read; frames that fail to encode are skipped.
    pub async fn stream_frames(&self) -> Result<BoxStream<'static, Vec<u8>>> {
        let camera = self.acquire().await?;

        Ok(stream::unfold(camera, |camera| async move {
            loop {
                let frame = camera.lock().await.read_frame().await;

                match frame {
                    Ok(frame) => match encode_jpeg(&frame) {
                        Ok(jpeg) => return Some((multipart_frame(&jpeg), camera)),
                        Err(e) => debug!("Skipping frame that failed to encode: {}", e),
                    },
                    Err(e) => {
                        info!("Camera stream ended: {}", e);
                        return None;
                    }
                }
            }
        })
        .boxed())
    }
}

/// JPEG-encode a frame
pub fn encode_jpeg(frame: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    frame.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Jpeg)?;
    Ok(buffer)
}

/// Wrap JPEG bytes in one `multipart/x-mixed-replace` part
pub fn multipart_frame(jpeg: &[u8]) -> Vec<u8> {
    let header = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", FRAME_BOUNDARY);
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeDevice {
        frames_left: usize,
    }

    #[async_trait]
    impl CameraDevice for FakeDevice {
        async fn read_frame(&mut self) -> Result<RgbImage> {
            if self.frames_left == 0 {
                return Err(ScannerError::Camera("no more frames".to_string()));
            }
            self.frames_left -= 1;
            Ok(RgbImage::from_pixel(8, 8, image::Rgb([200, 40, 40])))
        }
    }

    struct FakeOpener {
        preferred_works: bool,
        default_works: bool,
        /// Frames the preferred backend delivers once opened
        preferred_frames: Option<usize>,
        frames: usize,
        opened: Arc<AtomicUsize>,
    }

    impl FakeOpener {
        fn new(frames: usize) -> Self {
            Self {
                preferred_works: true,
                default_works: true,
                preferred_frames: None,
                frames,
                opened: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl CameraOpener for FakeOpener {
        fn open(&self, _index: u32, backend: Backend) -> Result<Box<dyn CameraDevice>> {
            let (works, frames) = match backend {
                Backend::Preferred => {
                    (self.preferred_works, self.preferred_frames.unwrap_or(self.frames))
                }
                Backend::Default => (self.default_works, self.frames),
            };
            if !works {
                return Err(ScannerError::Camera(format!("{:?} backend unavailable", backend)));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeDevice { frames_left: frames }))
        }
    }

    #[tokio::test]
    async fn test_acquire_reuses_handle() {
        let opener = FakeOpener::new(1);
        let opened = Arc::clone(&opener.opened);
        let service = CaptureService::new(Box::new(opener), 0);

        let first = service.acquire().await.unwrap();
        let second = service.acquire().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_acquire_falls_back_to_default_backend() {
        let mut opener = FakeOpener::new(1);
        opener.preferred_works = false;
        let opened = Arc::clone(&opener.opened);
        let service = CaptureService::new(Box::new(opener), 0);

        assert!(service.acquire().await.is_ok());
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_silent_preferred_backend_falls_back_to_default() {
        let mut opener = FakeOpener::new(2);
        opener.preferred_frames = Some(0);
        let opened = Arc::clone(&opener.opened);
        let service = CaptureService::new(Box::new(opener), 0);

        // Both captures come from the default device: the primed frame, then a live read.
        assert!(service.capture_one_frame().await.is_ok());
        assert!(service.capture_one_frame().await.is_ok());
        assert_eq!(opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_acquire_fails_when_no_backend_works() {
        let mut opener = FakeOpener::new(1);
        opener.preferred_works = false;
        opener.default_works = false;
        let service = CaptureService::new(Box::new(opener), 0);

        match service.acquire().await {
            Err(ScannerError::Camera(msg)) => assert!(msg.starts_with("Could not open webcam")),
            other => panic!("expected camera error, got {:?}", other.map(|_| ())),
        }
        assert!(!service.is_active().await);
    }

    #[tokio::test]
    async fn test_acquire_fails_when_no_backend_delivers_frames() {
        let service = CaptureService::new(Box::new(FakeOpener::new(0)), 0);

        let err = service.acquire().await.err().unwrap();
        assert!(matches!(err, ScannerError::Camera(msg) if msg.starts_with("Could not open webcam")));
        assert!(!service.is_active().await);
    }

    #[tokio::test]
    async fn test_release_is_idempotent_and_reopens() {
        let opener = FakeOpener::new(1);
        let opened = Arc::clone(&opener.opened);
        let service = CaptureService::new(Box::new(opener), 0);

        service.release().await;
        service.acquire().await.unwrap();
        assert!(service.is_active().await);

        service.release().await;
        service.release().await;
        assert!(!service.is_active().await);

        service.acquire().await.unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_read_drops_handle_and_reopens() {
        let opener = FakeOpener::new(1);
        let opened = Arc::clone(&opener.opened);
        let service = CaptureService::new(Box::new(opener), 0);

        let frame = service.capture_one_frame().await.unwrap();
        assert_eq!(frame.dimensions(), (8, 8));

        match service.capture_one_frame().await {
            Err(ScannerError::Camera(msg)) => assert_eq!(msg, "Failed to capture frame from webcam"),
            other => panic!("expected camera error, got {:?}", other.map(|_| ())),
        }
        assert!(!service.is_active().await);

        assert!(service.capture_one_frame().await.is_ok());
        assert_eq!(opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_capture_jpeg_is_jpeg() {
        let service = CaptureService::new(Box::new(FakeOpener::new(1)), 0);
        let jpeg = service.capture_jpeg().await.unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_stream_frames_until_read_fails() {
        let service = CaptureService::new(Box::new(FakeOpener::new(3)), 0);

        let parts: Vec<Vec<u8>> = service.stream_frames().await.unwrap().collect().await;
        assert_eq!(parts.len(), 3);

        let header = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
        for part in &parts {
            assert!(part.starts_with(header));
            assert_eq!(&part[header.len()..header.len() + 2], &[0xFF, 0xD8]);
            assert!(part.ends_with(b"\r\n"));
        }

        // Ending the stream leaves the handle in place.
        assert!(service.is_active().await);
    }

    #[tokio::test]
    async fn test_stream_frames_reports_unavailable_camera() {
        let mut opener = FakeOpener::new(0);
        opener.preferred_works = false;
        opener.default_works = false;
        let service = CaptureService::new(Box::new(opener), 0);

        assert!(service.stream_frames().await.is_err());
    }

    #[test]
    fn test_multipart_frame_layout() {
        let part = multipart_frame(b"JPEG");
        assert_eq!(part, b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n".to_vec());
    }
}
