//! Core types for mx.
//!
//! This crate provides the structured error type shared by all mx crates.

pub mod error;

pub use error::{Error, ErrorCode, Fix, Result};
