//! Error types for KRLS implementation

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KrlsError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Empty dataset")]
    EmptyDataset,

    #[error("Non-finite input: {0}")]
    NonFiniteInput(String),

    #[error("Unstable decomposition: eigenvalue {index} is {value:e}")]
    UnstableDecomposition { index: usize, value: f64 },

    #[error("Eigensolver failed: {0}")]
    EigenSolver(String),

    #[error("Singular matrix: {0}")]
    SingularMatrix(String),

    #[error("Numeric overflow: leave-one-out error is not finite at lambda = {lambda:e}")]
    NumericOverflow { lambda: f64 },

    #[error("Regularization search failed: {0}")]
    SearchFailed(String),

    #[error("Model not fitted")]
    NotFitted,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, KrlsError>;
