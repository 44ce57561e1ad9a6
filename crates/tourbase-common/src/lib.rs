//! Tourbase Common - Shared utilities and types
//!
//! This crate provides common functionality used across all Tourbase components:
//! - Error types and handling
//! - Configuration management
//! - Tracing/logging initialization

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{Error, Result};
