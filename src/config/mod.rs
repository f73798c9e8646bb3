// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for the e-waste scanner

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable that overrides `classifier.api_key`
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// Vision model endpoint settings
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Item file and scratch directory
    #[serde(default)]
    pub storage: StorageConfig,

    /// Webcam settings
    #[serde(default)]
    pub camera: CameraConfig,

    /// Web server settings
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClassifierConfig {
    /// Chat-completion endpoint
    #[serde(default = "default_classifier_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Bearer token; never written by `config generate`
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// Sent as `HTTP-Referer`
    #[serde(default = "default_referer")]
    pub referer: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_prompt")]
    pub prompt: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_items_path")]
    pub items_path: String,
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: String,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Device index (`/dev/video<N>` on Linux)
    #[serde(default)]
    pub index: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
}

// Default value functions
fn default_classifier_url() -> String { "https://openrouter.ai/api/v1/chat/completions".to_string() }
fn default_model() -> String { "google/gemini-2.0-flash-001".to_string() }
fn default_referer() -> String { "http://localhost".to_string() }
fn default_timeout() -> u64 { 30 }
fn default_items_path() -> String { "listed_items.json".to_string() }
fn default_uploads_dir() -> String { "uploads".to_string() }
fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }
fn default_ffmpeg_path() -> String { "ffmpeg".to_string() }
fn default_web_host() -> String { "0.0.0.0".to_string() }
fn default_web_port() -> u16 { 5000 }

fn default_allowed_extensions() -> Vec<String> {
    vec!["png", "jpg", "jpeg"].into_iter().map(String::from).collect()
}

fn default_prompt() -> String {
    "Identify the e-waste item in this image. \
     Provide the output in JSON format with these exact keys:\n\
     - product_name: Name of the device.\n\
     - components: A list of main internal parts.\n\
     - toxicity_level: High, Medium, or Low.\n\
     - recyclable: Boolean (true/false).\n\
     - harmful_substances: List of chemicals/metals present.".to_string()
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url: default_classifier_url(),
            model: default_model(),
            api_key: String::new(),
            referer: default_referer(),
            timeout_secs: default_timeout(),
            prompt: default_prompt(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            items_path: default_items_path(),
            uploads_dir: default_uploads_dir(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: default_width(),
            height: default_height(),
            ffmpeg_path: default_ffmpeg_path(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
        }
    }
}

impl StorageConfig {
    /// Check a client-supplied filename against the allowed extensions
    pub fn is_allowed_file(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((_, ext)) => self
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file, then apply environment overrides
    pub fn load(path: &Path) -> crate::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)
                .map_err(|e| crate::ScannerError::Config(format!("Failed to parse config: {}", e)))?
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                config.classifier.api_key = key;
            }
        }

        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
