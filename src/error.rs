// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for the e-waste scanner

use thiserror::Error;

/// Result type alias for scanner operations
pub type Result<T> = std::result::Result<T, ScannerError>;

/// Scanner error types
#[derive(Error, Debug)]
pub enum ScannerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(#[from] reqwest::Error),

    /// Camera could not be opened or a frame could not be read
    #[error("{0}")]
    Camera(String),

    /// Request payload failed validation (HTTP 400)
    #[error("{0}")]
    Validation(String),

    /// Requested item does not exist (HTTP 404)
    #[error("{0}")]
    NotFound(String),

    /// Request body exceeded the upload limit (HTTP 413)
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Item store could not be written
    #[error("{0}")]
    Store(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
}
