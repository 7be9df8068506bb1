//! # pixvec Common Library
//!
//! Shared code for the pixvec ingest tooling:
//! - Configuration file model and resolution
//! - Common error type

pub mod config;
pub mod error;

pub use error::{Error, Result};
