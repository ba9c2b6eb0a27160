//! Load orchestration: bootstrap, fan out, aggregate, index.

use std::sync::Arc;
use std::time::Instant;

use fanload_connectors::{ConnectionDescriptor, Connector, MySqlConnector};
use fanload_core::{partition, Dataset, Partition};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::bootstrap::bootstrap;
use crate::error::LoadError;
use crate::index::build_index;
use crate::metrics::LoaderMetrics;
use crate::options::LoadOptions;
use crate::result::{IndexOutcome, LoadResult};
use crate::scheduler::Scheduler;
use crate::writer::PartitionWriter;

/// Loads datasets into tables reachable through one connector and descriptor.
#[derive(Clone)]
pub struct BulkLoader {
    connector: Arc<dyn Connector>,
    descriptor: Arc<ConnectionDescriptor>,
    metrics: Option<LoaderMetrics>,
}

impl BulkLoader {
    pub fn new(connector: Arc<dyn Connector>, descriptor: ConnectionDescriptor) -> Self {
        Self {
            connector,
            descriptor: Arc::new(descriptor),
            metrics: None,
        }
    }

    pub fn mysql(descriptor: ConnectionDescriptor) -> Self {
        Self::new(Arc::new(MySqlConnector::new()), descriptor)
    }

    pub fn with_metrics(mut self, metrics: LoaderMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// Load `dataset` into `table_name`.
    ///
    /// Returns `Err` only when nothing was written: invalid arguments or a
    /// failed bootstrap. Partition and index failures are reported in the
    /// returned [`LoadResult`].
    pub async fn load(
        &self,
        dataset: Dataset,
        table_name: &str,
        options: &LoadOptions,
    ) -> Result<LoadResult, LoadError> {
        options.validate()?;
        if table_name.trim().is_empty() {
            return Err(LoadError::InvalidArgument(
                "table name cannot be empty".into(),
            ));
        }
        let series_bypass = dataset.is_series();
        let table = Arc::new(dataset.into_table()?);
        if let Some(missing) = options
            .index_columns
            .iter()
            .find(|c| table.column_index(c).is_none())
        {
            return Err(LoadError::InvalidArgument(format!(
                "index column '{}' is not in the dataset",
                missing
            )));
        }

        let load_id = Uuid::new_v4();
        let started = Instant::now();
        info!(
            "Load {} into '{}' via {}: {} rows x {} columns, {} partitions, {} workers",
            load_id,
            table_name,
            self.connector.name(),
            table.row_count(),
            table.column_count(),
            if series_bypass {
                1
            } else {
                options.partition_count.min(table.row_count())
            },
            options.worker_count
        );

        let columns = table.column_defs();
        if let Err(e) = bootstrap(
            self.connector.as_ref(),
            &self.descriptor,
            table_name,
            &columns,
        )
        .await
        {
            error!("Load {} aborted: {}", load_id, e);
            if let Some(m) = &self.metrics {
                m.record_load("bootstrap_failed");
            }
            return Err(e);
        }

        let mut writer = PartitionWriter::new(
            Arc::clone(&self.connector),
            Arc::clone(&self.descriptor),
            table_name,
            options.nulls,
            options.statement_mode,
        );
        if let Some(m) = &self.metrics {
            writer = writer.with_metrics(m.clone());
        }

        let reports = if series_bypass {
            let writer = match options.deadline {
                Some(limit) => writer.with_deadline(tokio::time::Instant::now(), limit),
                None => writer,
            };
            vec![writer.write(Partition::whole(Arc::clone(&table))).await]
        } else {
            let partitions = partition(Arc::clone(&table), options.partition_count)?;
            Scheduler::new(options.worker_count)?
                .with_deadline(options.deadline)
                .run(partitions, &writer)
                .await
        };

        let mut result = LoadResult::new(load_id, table_name, reports.len(), series_bypass);
        for report in reports {
            if let Err(cause) = &report.outcome {
                warn!(
                    "Load {}: partition {} (rows {:?}) failed: {}",
                    load_id, report.partition_index, report.rows, cause
                );
            }
            result.record(report);
        }

        result.index = if options.index_columns.is_empty() {
            IndexOutcome::NotRequested
        } else if result.has_failures() {
            warn!(
                "Load {}: skipping index on '{}' after {} failed partitions",
                load_id,
                table_name,
                result.failures.len()
            );
            IndexOutcome::SkippedAfterFailures
        } else {
            match build_index(
                self.connector.as_ref(),
                &self.descriptor,
                table_name,
                &options.index_columns,
            )
            .await
            {
                Ok(()) => IndexOutcome::Created,
                Err(e) => {
                    warn!("Load {}: {}", load_id, e);
                    IndexOutcome::Failed(e)
                }
            }
        };

        result.finish(started.elapsed());
        info!(
            "Load {} finished in {}ms: {}/{} partitions, {} rows",
            load_id, result.elapsed_ms, result.succeeded, result.partitions, result.rows_written
        );
        if let Some(m) = &self.metrics {
            m.record_load(if result.is_complete() {
                "complete"
            } else {
                "partial"
            });
        }
        Ok(result)
    }
}

/// Load `dataset` into `table_name` over MySQL.
pub async fn bulk_load(
    dataset: Dataset,
    table_name: &str,
    descriptor: &ConnectionDescriptor,
    options: &LoadOptions,
) -> Result<LoadResult, LoadError> {
    BulkLoader::mysql(descriptor.clone())
        .load(dataset, table_name, options)
        .await
}
