//! Writes one partition over its own connection.

use std::any::Any;
use std::future::Future;
use std::ops::Range;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use fanload_connectors::{Connection, ConnectionDescriptor, Connector};
use fanload_core::{NullMode, Partition, RowEncoder, Statement, MAX_BIND_PARAMS};
use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::LoadError;
use crate::metrics::LoaderMetrics;
use crate::options::StatementMode;
use crate::result::TaskReport;

/// Everything a write task needs. Cheap to clone: one clone per task.
#[derive(Clone)]
pub struct PartitionWriter {
    connector: Arc<dyn Connector>,
    descriptor: Arc<ConnectionDescriptor>,
    table: Arc<str>,
    encoder: RowEncoder,
    mode: StatementMode,
    metrics: Option<LoaderMetrics>,
    deadline: Option<(Instant, Duration)>,
}

impl PartitionWriter {
    pub fn new(
        connector: Arc<dyn Connector>,
        descriptor: Arc<ConnectionDescriptor>,
        table: &str,
        nulls: NullMode,
        mode: StatementMode,
    ) -> Self {
        Self {
            connector,
            descriptor,
            table: Arc::from(table),
            encoder: RowEncoder::new(nulls),
            mode,
            metrics: None,
            deadline: None,
        }
    }

    pub fn with_metrics(mut self, metrics: LoaderMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Give up on writes still running `limit` after `start`.
    pub fn with_deadline(mut self, start: Instant, limit: Duration) -> Self {
        self.deadline = Some((start + limit, limit));
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Render the partition's INSERT statements.
    pub fn encode(&self, partition: &Partition) -> Result<Vec<Statement>, LoadError> {
        let statements = match self.mode {
            StatementMode::Literal => vec![self.encoder.encode_insert(&self.table, partition)?],
            StatementMode::Bound => {
                self.encoder
                    .encode_insert_chunks(&self.table, partition, MAX_BIND_PARAMS)?
            }
        };
        Ok(statements)
    }

    /// Open, encode, insert, commit, close. Never returns without closing a
    /// connection it opened, deadline included; the outcome is reported, not
    /// raised.
    pub async fn write(&self, partition: Partition) -> TaskReport {
        let index = partition.index();
        let rows = partition.row_range();
        if partition.is_empty() {
            return TaskReport::written(index, rows, 0);
        }
        if let Some((at, limit)) = self.deadline {
            if Instant::now() >= at {
                return self.failed(index, rows, LoadError::DeadlineExceeded(limit));
            }
        }

        let mut conn = match self.within_deadline(self.connector.open(&self.descriptor)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return self.failed(index, rows, LoadError::Connection(e)),
            Err(limit) => return self.failed(index, rows, LoadError::DeadlineExceeded(limit)),
        };
        let active = ActiveWriter::enter(self.metrics.as_ref());

        let outcome = match self.encode(&partition) {
            Ok(statements) => {
                let insert = async {
                    AssertUnwindSafe(insert_and_commit(conn.as_mut(), &statements))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|payload| {
                            Err(LoadError::WorkerPanicked(panic_message(payload)))
                        })
                };
                self.within_deadline(insert)
                    .await
                    .unwrap_or_else(|limit| Err(LoadError::DeadlineExceeded(limit)))
            }
            Err(e) => Err(e),
        };

        if let Err(e) = conn.close().await {
            warn!(
                "Closing connection for partition {} of '{}' failed: {}",
                index, self.table, e
            );
        }
        drop(active);

        match outcome {
            Ok(count) => {
                debug!("Partition {} wrote {} rows", index, count);
                if let Some(m) = &self.metrics {
                    m.partitions_written.inc();
                    m.rows_written.inc_by(count);
                }
                TaskReport::written(index, rows, count)
            }
            Err(e) => self.failed(index, rows, e),
        }
    }

    /// Run `fut` until the writer's deadline, if any. `Err` carries the limit.
    async fn within_deadline<F: Future>(&self, fut: F) -> Result<F::Output, Duration> {
        match self.deadline {
            Some((at, limit)) => tokio::time::timeout_at(at, fut).await.map_err(|_| limit),
            None => Ok(fut.await),
        }
    }

    fn failed(&self, index: usize, rows: Range<usize>, cause: LoadError) -> TaskReport {
        if let Some(m) = &self.metrics {
            m.partitions_failed.inc();
        }
        TaskReport::failed(index, rows, cause)
    }
}

/// Holds one `active_writers` slot until dropped, aborted tasks included.
struct ActiveWriter<'a>(Option<&'a LoaderMetrics>);

impl<'a> ActiveWriter<'a> {
    fn enter(metrics: Option<&'a LoaderMetrics>) -> Self {
        if let Some(m) = metrics {
            m.active_writers.inc();
        }
        Self(metrics)
    }
}

impl Drop for ActiveWriter<'_> {
    fn drop(&mut self) {
        if let Some(m) = self.0 {
            m.active_writers.dec();
        }
    }
}

async fn insert_and_commit(
    conn: &mut dyn Connection,
    statements: &[Statement],
) -> Result<u64, LoadError> {
    let mut affected = 0;
    for statement in statements {
        affected += conn
            .execute(statement)
            .await
            .map_err(LoadError::Execution)?;
    }
    conn.commit().await.map_err(LoadError::Execution)?;
    Ok(affected)
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
