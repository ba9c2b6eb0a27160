//! Typed errors for the connectors crate.

use std::fmt;

use crate::descriptor::ConnectionDescriptor;

/// Errors that can occur while talking to a database.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorError {
    /// Failed to establish a connection.
    ConnectionFailed {
        host: String,
        port: u16,
        database: String,
        message: String,
    },
    /// A statement, commit or close failed on an open connection.
    QueryFailed(String),
    /// Invalid or missing connection configuration.
    ConfigError(String),
}

impl ConnectorError {
    /// A connection failure carrying the descriptor's host/port/database.
    pub fn connection(descriptor: &ConnectionDescriptor, message: impl fmt::Display) -> Self {
        ConnectorError::ConnectionFailed {
            host: descriptor.host.clone(),
            port: descriptor.port,
            database: descriptor.database.clone(),
            message: message.to_string(),
        }
    }

    pub fn is_connection_failure(&self) -> bool {
        matches!(self, ConnectorError::ConnectionFailed { .. })
    }
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorError::ConnectionFailed {
                host,
                port,
                database,
                message,
            } => write!(
                f,
                "connection to {}:{}/{} failed: {}",
                host, port, database, message
            ),
            ConnectorError::QueryFailed(msg) => write!(f, "query failed: {}", msg),
            ConnectorError::ConfigError(msg) => write!(f, "config error: {}", msg),
        }
    }
}

impl std::error::Error for ConnectorError {}

impl From<sqlx::Error> for ConnectorError {
    fn from(e: sqlx::Error) -> Self {
        ConnectorError::QueryFailed(e.to_string())
    }
}

impl From<url::ParseError> for ConnectorError {
    fn from(e: url::ParseError) -> Self {
        ConnectorError::ConfigError(e.to_string())
    }
}
