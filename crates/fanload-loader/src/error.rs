//! Load errors.

use std::time::Duration;

use fanload_connectors::ConnectorError;
use fanload_core::CoreError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The target table could not be created; nothing was scheduled.
    #[error("table bootstrap failed: {0}")]
    BootstrapFailed(ConnectorError),

    #[error("{0}")]
    Connection(ConnectorError),

    #[error("{0}")]
    Encoding(CoreError),

    #[error("insert failed: {0}")]
    Execution(ConnectorError),

    #[error("index creation failed: {0}")]
    IndexCreationFailed(ConnectorError),

    #[error("deadline of {0:?} exceeded before the partition reported")]
    DeadlineExceeded(Duration),

    #[error("write task panicked: {0}")]
    WorkerPanicked(String),
}

impl From<CoreError> for LoadError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidArgument(msg) | CoreError::Schema(msg) => {
                LoadError::InvalidArgument(msg)
            }
            e @ CoreError::Encoding { .. } => LoadError::Encoding(e),
        }
    }
}
