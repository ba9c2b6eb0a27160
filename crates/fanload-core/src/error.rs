//! Typed errors for the core crate.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("cannot encode column '{column}' at row {row}: {reason}")]
    Encoding {
        column: String,
        row: usize,
        reason: String,
    },

    #[error("schema error: {0}")]
    Schema(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
