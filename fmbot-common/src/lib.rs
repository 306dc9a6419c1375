//! # fmbot Common Library
//!
//! Shared code for the fmbot services:
//! - Database initialization and row models
//! - Bootstrap configuration (TOML + root folder resolution)
//! - Common error type
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
