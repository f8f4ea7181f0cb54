//! Error types for grid file parsing and writing.

use thiserror::Error;

/// Result type for grid codec operations.
pub type GridResult<T> = Result<T, GridError>;

/// Error types for the grid codec.
#[derive(Error, Debug)]
pub enum GridError {
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or truncated file
    #[error("Invalid grid file: {0}")]
    InvalidFormat(String),

    /// A format feature the codec deliberately does not handle
    #[error("Unsupported grid file: {0}")]
    Unsupported(String),

    /// Missing required dimension, variable, or attribute
    #[error("Missing required data: {0}")]
    MissingData(String),

    /// Inconsistent coordinate/value shapes
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Crop bounds select no grid cells
    #[error("Crop bounds select an empty grid")]
    EmptyCrop,
}
