//! Error types for LodeStream
//!
//! Provides a unified error type for all operations.
//!
//! Failures fall into two classes: fatal (`CorruptStream`, where the mapped
//! bytes cannot be trusted and no recovery is possible) and recoverable
//! conditions callers are expected to handle as normal control flow
//! (`OutOfSpace`, `InsufficientSpace`, `StaleHandle`). Torn entries and
//! stray invalid headers are never surfaced as errors at all; scanning and
//! iteration treat them as the end of valid data.

use thiserror::Error;

/// Result type alias using LodeError
pub type Result<T> = std::result::Result<T, LodeError>;

/// Unified error type for LodeStream operations
#[derive(Debug, Error)]
pub enum LodeError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Stream Errors (fatal)
    // -------------------------------------------------------------------------
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    // -------------------------------------------------------------------------
    // Allocation Errors (recoverable)
    // -------------------------------------------------------------------------
    #[error("out of space: {requested} bytes requested, {available} available at tail")]
    OutOfSpace { requested: u64, available: u64 },

    #[error("insufficient space in region: entry needs {requested} bytes, {remaining} remain")]
    InsufficientSpace { requested: u64, remaining: u64 },

    // -------------------------------------------------------------------------
    // Handle Errors (recoverable)
    // -------------------------------------------------------------------------
    #[error("stale region handle: offset {offset}, generation {generation}")]
    StaleHandle { offset: u64, generation: u64 },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
