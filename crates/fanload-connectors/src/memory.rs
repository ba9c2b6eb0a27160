//! In-process connector.
//!
//! Interprets statements by their [`StatementKind`] instead of parsing SQL:
//! tables live in a shared map, inserts are buffered per connection until
//! commit, DDL applies immediately (as in MySQL). Every executed statement is
//! logged in order, which makes the connector useful for dry runs and as a
//! fake database in tests. Fail points let callers simulate connection,
//! bootstrap, insert and index failures.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use fanload_core::{ColumnDef, Statement, StatementKind, Value};
use tracing::debug;

use crate::connection::{Connection, Connector};
use crate::descriptor::ConnectionDescriptor;
use crate::error::ConnectorError;

/// A table held by the memory connector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTable {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Vec<Value>>,
    pub indexes: Vec<Vec<String>>,
}

/// A statement as seen by the memory connector.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedStatement {
    /// Sequence number of the connection that ran it (1-based).
    pub connection_id: usize,
    pub sql: String,
    pub param_count: usize,
    pub row_count: usize,
}

#[derive(Debug, Default)]
struct FailPoints {
    open: HashSet<usize>,
    create_table: bool,
    add_index: bool,
    insert_rows: HashSet<usize>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, MemoryTable>,
    log: Vec<LoggedStatement>,
    opened: usize,
    closed: usize,
    commits: usize,
    active: usize,
    peak_active: usize,
    fail: FailPoints,
}

/// Shared in-memory database. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
    open_delay: Option<Duration>,
    execute_delay: Option<Duration>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the `nth` call to `open` (1-based, counted across all callers).
    pub fn fail_open(self, nth: usize) -> Self {
        self.state().fail.open.insert(nth);
        self
    }

    pub fn fail_create_table(self) -> Self {
        self.state().fail.create_table = true;
        self
    }

    pub fn fail_add_index(self) -> Self {
        self.state().fail.add_index = true;
        self
    }

    /// Fail any insert whose rows include dataset row `row`.
    pub fn fail_insert_covering(self, row: usize) -> Self {
        self.state().fail.insert_rows.insert(row);
        self
    }

    /// Sleep for `delay` inside every `open`.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Sleep for `delay` at the start of every `execute`.
    pub fn with_execute_delay(mut self, delay: Duration) -> Self {
        self.execute_delay = Some(delay);
        self
    }

    pub fn table(&self, name: &str) -> Option<MemoryTable> {
        self.state().tables.get(name).cloned()
    }

    pub fn statements(&self) -> Vec<LoggedStatement> {
        self.state().log.clone()
    }

    pub fn opened(&self) -> usize {
        self.state().opened
    }

    pub fn closed(&self) -> usize {
        self.state().closed
    }

    pub fn commits(&self) -> usize {
        self.state().commits
    }

    /// Highest number of connections that were open at the same time.
    pub fn peak_open(&self) -> usize {
        self.state().peak_active
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn open(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn Connection>, ConnectorError> {
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        let id = {
            let mut state = self.state();
            state.opened += 1;
            let id = state.opened;
            if state.fail.open.contains(&id) {
                return Err(ConnectorError::connection(
                    descriptor,
                    format!("simulated failure on open #{}", id),
                ));
            }
            state.active += 1;
            state.peak_active = state.peak_active.max(state.active);
            id
        };
        debug!("Opened memory connection #{} for {}", id, descriptor.endpoint());
        Ok(Box::new(MemoryConnection {
            id,
            state: Arc::clone(&self.state),
            pending: Vec::new(),
            execute_delay: self.execute_delay,
            released: false,
        }))
    }
}

struct MemoryConnection {
    id: usize,
    state: Arc<Mutex<MemoryState>>,
    pending: Vec<(String, Vec<Vec<Value>>)>,
    execute_delay: Option<Duration>,
    released: bool,
}

impl MemoryConnection {
    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the connection as closed exactly once.
    fn release(&mut self, how: &str) {
        if self.released {
            return;
        }
        self.released = true;
        let mut state = self.state();
        state.closed += 1;
        state.active -= 1;
        drop(state);
        debug!(
            "{} memory connection #{} ({} uncommitted inserts discarded)",
            how,
            self.id,
            self.pending.len()
        );
    }
}

// A connection dropped mid-statement (e.g. an aborted task) still goes away
// in MySQL once the socket closes.
impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.release("Dropped");
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn execute(&mut self, statement: &Statement) -> Result<u64, ConnectorError> {
        if let Some(delay) = self.execute_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        state.log.push(LoggedStatement {
            connection_id: self.id,
            sql: statement.sql.clone(),
            param_count: statement.params.len(),
            row_count: statement.row_count(),
        });

        match &statement.kind {
            StatementKind::CreateTable { table, columns } => {
                if state.fail.create_table {
                    return Err(ConnectorError::QueryFailed(format!(
                        "simulated failure creating '{}'",
                        table
                    )));
                }
                state
                    .tables
                    .entry(table.clone())
                    .or_insert_with(|| MemoryTable {
                        columns: columns.clone(),
                        ..Default::default()
                    });
                Ok(0)
            }
            StatementKind::Insert { table, rows, nulls } => {
                let target = state.tables.get(table).ok_or_else(|| {
                    ConnectorError::QueryFailed(format!("Table '{}' doesn't exist", table))
                })?;
                if let Some(unknown) = rows
                    .columns()
                    .iter()
                    .find(|c| !target.columns.iter().any(|d| &d.name == *c))
                {
                    return Err(ConnectorError::QueryFailed(format!(
                        "Unknown column '{}' in '{}'",
                        unknown, table
                    )));
                }
                if rows.row_range().any(|r| state.fail.insert_rows.contains(&r)) {
                    return Err(ConnectorError::QueryFailed(format!(
                        "simulated failure inserting rows {:?}",
                        rows.row_range()
                    )));
                }
                drop(state);

                let values: Vec<Vec<Value>> = rows
                    .rows()
                    .iter()
                    .map(|row| row.iter().map(|v| nulls.substitute(v).into_owned()).collect())
                    .collect();
                let affected = values.len() as u64;
                self.pending.push((table.clone(), values));
                Ok(affected)
            }
            StatementKind::AddIndex { table, columns } => {
                if state.fail.add_index {
                    return Err(ConnectorError::QueryFailed(format!(
                        "simulated failure indexing '{}'",
                        table
                    )));
                }
                let target = state.tables.get_mut(table).ok_or_else(|| {
                    ConnectorError::QueryFailed(format!("Table '{}' doesn't exist", table))
                })?;
                if let Some(unknown) = columns
                    .iter()
                    .find(|c| !target.columns.iter().any(|d| &d.name == *c))
                {
                    return Err(ConnectorError::QueryFailed(format!(
                        "Key column '{}' doesn't exist in table",
                        unknown
                    )));
                }
                target.indexes.push(columns.clone());
                Ok(0)
            }
        }
    }

    async fn commit(&mut self) -> Result<(), ConnectorError> {
        let pending = std::mem::take(&mut self.pending);
        let mut state = self.state();
        for (table, rows) in pending {
            if let Some(target) = state.tables.get_mut(&table) {
                target.rows.extend(rows);
            }
        }
        state.commits += 1;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), ConnectorError> {
        let mut conn = self;
        conn.release("Closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanload_core::{create_table_sql, partition, RowEncoder, Table};

    fn descriptor() -> ConnectionDescriptor {
        ConnectionDescriptor::new("memory", "u", "p", "db")
    }

    fn frame() -> Arc<Table> {
        Arc::new(
            Table::new(
                vec!["id".into(), "v".into()],
                vec![
                    vec![Value::Int(1), Value::Null],
                    vec![Value::Int(2), Value::from("x")],
                ],
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_insert_visible_only_after_commit() {
        let connector = MemoryConnector::new();
        let table = frame();
        let parts = partition(Arc::clone(&table), 1).unwrap();

        let mut conn = connector.open(&descriptor()).await.unwrap();
        conn.execute(&create_table_sql("t", &table.column_defs()))
            .await
            .unwrap();
        let insert = RowEncoder::default().encode_insert("t", &parts[0]).unwrap();
        assert_eq!(conn.execute(&insert).await.unwrap(), 2);
        assert!(connector.table("t").unwrap().rows.is_empty());

        conn.commit().await.unwrap();
        conn.close().await.unwrap();

        let stored = connector.table("t").unwrap();
        assert_eq!(stored.rows.len(), 2);
        assert_eq!(stored.rows[0][1], Value::from("NULL"));
        assert_eq!(connector.opened(), 1);
        assert_eq!(connector.closed(), 1);
        assert_eq!(connector.statements().len(), 2);
    }

    #[tokio::test]
    async fn test_close_without_commit_discards() {
        let connector = MemoryConnector::new();
        let table = frame();
        let parts = partition(Arc::clone(&table), 1).unwrap();

        let mut conn = connector.open(&descriptor()).await.unwrap();
        conn.execute(&create_table_sql("t", &table.column_defs()))
            .await
            .unwrap();
        let insert = RowEncoder::default().encode_insert("t", &parts[0]).unwrap();
        conn.execute(&insert).await.unwrap();
        conn.close().await.unwrap();

        assert!(connector.table("t").unwrap().rows.is_empty());
    }

    #[tokio::test]
    async fn test_insert_into_missing_table_fails() {
        let connector = MemoryConnector::new();
        let parts = partition(frame(), 1).unwrap();
        let mut conn = connector.open(&descriptor()).await.unwrap();
        let insert = RowEncoder::default().encode_insert("nope", &parts[0]).unwrap();
        let err = conn.execute(&insert).await.unwrap_err();
        assert!(matches!(err, ConnectorError::QueryFailed(_)));
    }

    #[tokio::test]
    async fn test_fail_open_is_connection_failure() {
        let connector = MemoryConnector::new().fail_open(2);
        let first = connector.open(&descriptor()).await.unwrap();
        let err = match connector.open(&descriptor()).await {
            Ok(_) => panic!("second open should fail"),
            Err(e) => e,
        };
        assert!(err.is_connection_failure());
        assert!(err.to_string().contains("memory:3306/db"));
        first.close().await.unwrap();
        assert_eq!(connector.opened(), 2);
        assert_eq!(connector.closed(), 1);
        assert_eq!(connector.peak_open(), 1);
    }

    #[tokio::test]
    async fn test_dropped_connection_counts_as_closed() {
        let connector = MemoryConnector::new().with_execute_delay(Duration::from_millis(200));
        let table = frame();
        let mut conn = connector.open(&descriptor()).await.unwrap();
        let create = create_table_sql("t", &table.column_defs());
        let stalled = tokio::time::timeout(Duration::from_millis(20), conn.execute(&create)).await;
        assert!(stalled.is_err());
        drop(conn);

        assert_eq!(connector.opened(), 1);
        assert_eq!(connector.closed(), 1);
        assert!(connector.statements().is_empty());

        let again = connector.open(&descriptor()).await.unwrap();
        again.close().await.unwrap();
        assert_eq!(connector.closed(), 2);
        assert_eq!(connector.peak_open(), 1);
    }
}
