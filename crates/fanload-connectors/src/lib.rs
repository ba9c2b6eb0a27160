//! fanload connectors - per-task database connections
//!
//! This crate provides:
//! - `ConnectionDescriptor` (host, port, credentials, database, charset)
//! - the `Connector` / `Connection` traits
//! - a MySQL connector (sqlx)
//! - an in-memory connector for dry runs and tests

pub mod connection;
pub mod descriptor;
pub mod error;
pub mod memory;
pub mod mysql;

pub use connection::{Connection, Connector};
pub use descriptor::ConnectionDescriptor;
pub use error::ConnectorError;
pub use memory::{LoggedStatement, MemoryConnector, MemoryTable};
pub use mysql::MySqlConnector;
