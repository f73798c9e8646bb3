// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! E-Waste Scanner
//!
//! Photograph or upload an electronic-waste item, classify it with a
//! vision-language model and keep classified items in a flat JSON store.

pub mod camera;
pub mod classifier;
pub mod config;
pub mod error;
pub mod normalize;
pub mod store;
pub mod web;

pub use config::AppConfig;
pub use error::{Result, ScannerError};
