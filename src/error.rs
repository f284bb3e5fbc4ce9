//! Error types for PDF storage and correlation search.
//!
//! Structured errors via thiserror, grouped by the failure classes the
//! pipeline distinguishes: validation, not-found, unsupported operations,
//! and file-format problems. Degenerate data (all-zero candidates,
//! zero-variance correlations) is deliberately not represented here; it is
//! handled in-band by the search pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for store and search operations.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Identifier validation errors
    #[error("COD id {0} is out of range: must be a 7-digit integer")]
    IdOutOfRange(u64),

    #[error("no 7-digit id segment found in '{input}'")]
    NoIdSegment { input: String },

    #[error("ambiguous id: '{input}' contains distinct 7-digit segments {first} and {second}")]
    AmbiguousId {
        input: String,
        first: String,
        second: String,
    },

    /// Grid validation errors
    #[error("grid mismatch: {reason}")]
    GridMismatch { reason: String },

    #[error(
        "grid step mismatch at r = {r}: off the {rstep} tick by {residual:e}\nSuggestion: both curves must be sampled on multiples of the store grid step"
    )]
    StepMismatch { r: f64, rstep: f64, residual: f64 },

    #[error("grids do not overlap: lower bound {lb} exceeds upper bound {ub}")]
    NoOverlap { lb: f64, ub: f64 },

    /// Not-found errors
    #[error("no entry for COD id {id} in the store")]
    EntryNotFound { id: String },

    #[error("store has no canonical grid; write a configuration first")]
    MissingGrid,

    /// Unsupported operations on a backend
    #[error(
        "operation '{operation}' is not supported by the {backend} backend\nSuggestion: flat stores are built offline; use the hierarchical backend for writes"
    )]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    /// File-format errors
    #[error("invalid store format in '{path}': {reason}")]
    InvalidFormat { path: PathBuf, reason: String },

    #[error("unsupported store version: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    /// Configuration errors
    #[error("invalid configuration: {reason}")]
    ConfigError { reason: String },

    /// Observed-curve data file errors
    #[error("failed to parse curve data '{path}' at line {line}: {reason}")]
    DataParse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("descriptor parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("descriptor encoding error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Result type alias for store and search operations.
pub type PdfResult<T> = Result<T, PdfError>;
