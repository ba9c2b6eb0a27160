//! Connection factory traits.
//!
//! A [`Connector`] opens one fresh, unshared [`Connection`] per call. There is
//! no pooling: each write task owns its connection for its whole lifetime, so
//! a failure or close on one connection never affects another.

use async_trait::async_trait;
use fanload_core::Statement;

use crate::descriptor::ConnectionDescriptor;
use crate::error::ConnectorError;

/// Opens independent database connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Short name for log lines ("mysql", "memory").
    fn name(&self) -> &'static str;

    /// Open a new connection. Failures are not retried.
    async fn open(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn Connection>, ConnectorError>;
}

/// One open connection with an implicit transaction.
///
/// Inserts become visible to other connections only after [`commit`];
/// closing without committing discards them.
///
/// [`commit`]: Connection::commit
#[async_trait]
pub trait Connection: Send {
    /// Execute a statement, returning the number of affected rows.
    async fn execute(&mut self, statement: &Statement) -> Result<u64, ConnectorError>;

    async fn commit(&mut self) -> Result<(), ConnectorError>;

    async fn close(self: Box<Self>) -> Result<(), ConnectorError>;
}
