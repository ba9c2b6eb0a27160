//! Target table creation, run once before any partition is written.

use fanload_connectors::{Connection, ConnectionDescriptor, Connector, ConnectorError};
use fanload_core::{create_table_sql, ColumnDef};
use tracing::{debug, warn};

use crate::error::LoadError;

/// Create `table` with `columns` (if it does not exist yet) and commit.
pub async fn ensure_table(
    conn: &mut dyn Connection,
    table: &str,
    columns: &[ColumnDef],
) -> Result<(), ConnectorError> {
    let statement = create_table_sql(table, columns);
    debug!("Bootstrapping table: {}", statement.sql);
    conn.execute(&statement).await?;
    conn.commit().await
}

/// Open a dedicated connection, make sure the table exists, close it.
///
/// Any failure is fatal for the load and is reported as
/// [`LoadError::BootstrapFailed`].
pub async fn bootstrap(
    connector: &dyn Connector,
    descriptor: &ConnectionDescriptor,
    table: &str,
    columns: &[ColumnDef],
) -> Result<(), LoadError> {
    let mut conn = connector
        .open(descriptor)
        .await
        .map_err(LoadError::BootstrapFailed)?;
    let outcome = ensure_table(conn.as_mut(), table, columns).await;
    let closed = conn.close().await;
    outcome.map_err(LoadError::BootstrapFailed)?;
    if let Err(e) = closed {
        warn!("Closing bootstrap connection for '{}' failed: {}", table, e);
    }
    Ok(())
}
