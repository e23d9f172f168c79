//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("invalid property key: {0}")]
    InvalidPropKey(String),

    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("invalid number pool range: {min}..={max}")]
    InvalidPoolRange { min: u32, max: u32 },

    #[error("number {number} outside of pool range {min}..={max}")]
    OutOfPoolRange { number: u32, min: u32, max: u32 },

    #[error("number {0} is already allocated")]
    AlreadyAllocated(u32),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
