//! src/error.rs
//! This module defines the error type shared by the batching processor, the
//! index mappings and the parameter transplanter. Every fallible operation
//! returns a `Result` instead of panicking, so a corrupted checkpoint or a bad
//! input record is reported to the caller rather than aborting the training run.

use thiserror::Error;

/// The primary error type for all fallible operations in this library.
#[derive(Error, Debug)]
pub enum TbError {
    // --- I/O and Parsing Errors ---
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("JSON (de)serialization failed")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse data from file '{file}': {message}")]
    FileParse { file: String, message: String },

    #[error("Invalid orbital projection string: '{0}'")]
    InvalidOrbitalProjection(String),

    #[error("Invalid atom type string: '{0}'")]
    InvalidAtomType(String),

    // --- Invalid Input and Arguments ---
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unknown onsite mode '{0}', expected one of none, uniform, split, strain")]
    UnknownOnsiteMode(String),

    #[error("Shape mismatch for '{context}': expected {expected:?}, got {found:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Dimension '{dim}' is not supported, supported dimensions are {supported:?}")]
    InvalidDimension { dim: usize, supported: Vec<usize> },

    // --- Structure State ---
    #[error("The environment of this structure has not been computed, call cal_env first")]
    EnvNotReady,
}

/// A specialized `Result` type for this library's operations.
pub type Result<T> = std::result::Result<T, TbError>;
