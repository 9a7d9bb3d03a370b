//! Error types for the episodic memory.

use thiserror::Error;

/// Episodic memory error types.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Rejected configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Query vector of the wrong length
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Labels do not line up with the query batch
    #[error("Label count mismatch: expected {expected}, got {got}")]
    LabelCountMismatch { expected: usize, got: usize },

    /// Training mode requires a label for every query
    #[error("Labels are required in training mode")]
    MissingLabels,

    /// Negative labels collide with the empty-slot sentinel
    #[error("Invalid label {0}: labels must be non-negative")]
    InvalidLabel(i64),

    /// Zero-norm or non-finite query
    #[error("Query {index} has zero norm or non-finite components")]
    DegenerateQuery { index: usize },
}

/// Result type alias for memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;
