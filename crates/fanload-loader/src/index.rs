//! Composite index creation after a fully successful load.

use fanload_connectors::{Connection, ConnectionDescriptor, Connector, ConnectorError};
use fanload_core::add_index_sql;
use tracing::{info, warn};

use crate::error::LoadError;

pub async fn add_index(
    conn: &mut dyn Connection,
    table: &str,
    columns: &[String],
) -> Result<(), ConnectorError> {
    conn.execute(&add_index_sql(table, columns)).await?;
    conn.commit().await
}

/// Issue a single `ALTER TABLE ... ADD INDEX` over `columns`, in order, on a
/// dedicated connection.
pub async fn build_index(
    connector: &dyn Connector,
    descriptor: &ConnectionDescriptor,
    table: &str,
    columns: &[String],
) -> Result<(), LoadError> {
    let mut conn = connector
        .open(descriptor)
        .await
        .map_err(LoadError::IndexCreationFailed)?;
    let outcome = add_index(conn.as_mut(), table, columns).await;
    let closed = conn.close().await;
    outcome.map_err(LoadError::IndexCreationFailed)?;
    if let Err(e) = closed {
        warn!("Closing index connection for '{}' failed: {}", table, e);
    }
    info!("Created index on '{}' ({})", table, columns.join(", "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::bootstrap;
    use fanload_connectors::MemoryConnector;
    use fanload_core::{ColumnDef, ColumnType};

    fn descriptor() -> ConnectionDescriptor {
        ConnectionDescriptor::new("memory", "u", "p", "db")
    }

    async fn seeded() -> MemoryConnector {
        let connector = MemoryConnector::new();
        let columns = ["id", "day"]
            .into_iter()
            .map(|name| ColumnDef {
                name: name.into(),
                column_type: ColumnType::BigInt,
            })
            .collect::<Vec<_>>();
        bootstrap(&connector, &descriptor(), "t", &columns)
            .await
            .unwrap();
        connector
    }

    #[tokio::test]
    async fn test_build_index_keeps_column_order() {
        let connector = seeded().await;
        let columns = vec!["day".to_string(), "id".to_string()];
        build_index(&connector, &descriptor(), "t", &columns)
            .await
            .unwrap();

        assert_eq!(connector.table("t").unwrap().indexes, vec![columns]);
        let last = connector.statements().pop().unwrap();
        assert_eq!(last.sql, "ALTER TABLE `t` ADD INDEX (`day`, `id`)");
    }

    #[tokio::test]
    async fn test_build_index_unknown_column() {
        let connector = seeded().await;
        let err = build_index(&connector, &descriptor(), "t", &["nope".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::IndexCreationFailed(_)));
        assert_eq!(connector.opened(), connector.closed());
    }
}
