//! Compounder Common - configuration, errors and logging shared by the
//! compounder screener crates.
//!
//! This crate provides:
//! - Configuration types and loading (file + environment)
//! - Configuration validation
//! - The run-level error type
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    CacheConfig, Config, FetchConfig, FilterConfig, ObservabilityConfig, ScreenerConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};
