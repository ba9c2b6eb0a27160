//! Aggregate outcome of one load.

use std::fmt::Display;
use std::ops::Range;
use std::time::Duration;

use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::error::LoadError;

fn serialize_display<T: Display, S: Serializer>(value: &T, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(value)
}

/// What one write task reported back to the scheduler.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub partition_index: usize,
    pub rows: Range<usize>,
    pub outcome: Result<u64, LoadError>,
}

impl TaskReport {
    pub fn written(partition_index: usize, rows: Range<usize>, count: u64) -> Self {
        Self {
            partition_index,
            rows,
            outcome: Ok(count),
        }
    }

    pub fn failed(partition_index: usize, rows: Range<usize>, cause: LoadError) -> Self {
        Self {
            partition_index,
            rows,
            outcome: Err(cause),
        }
    }
}

/// A partition that did not land.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionFailure {
    pub partition_index: usize,
    /// Dataset row indices the partition covered.
    pub rows: Range<usize>,
    #[serde(serialize_with = "serialize_display")]
    pub cause: LoadError,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(tag = "status", content = "cause", rename_all = "snake_case")]
pub enum IndexOutcome {
    #[default]
    NotRequested,
    Created,
    /// Not attempted because at least one partition failed.
    SkippedAfterFailures,
    Failed(#[serde(serialize_with = "serialize_display")] LoadError),
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadResult {
    pub load_id: Uuid,
    pub table: String,
    /// Number of write tasks dispatched.
    pub partitions: usize,
    pub succeeded: usize,
    pub rows_written: u64,
    pub failures: Vec<PartitionFailure>,
    pub index: IndexOutcome,
    /// The dataset was a single series, written by one direct insert.
    pub series_bypass: bool,
    pub elapsed_ms: u64,
}

impl LoadResult {
    pub fn new(load_id: Uuid, table: &str, partitions: usize, series_bypass: bool) -> Self {
        Self {
            load_id,
            table: table.to_string(),
            partitions,
            succeeded: 0,
            rows_written: 0,
            failures: vec![],
            index: IndexOutcome::NotRequested,
            series_bypass,
            elapsed_ms: 0,
        }
    }

    pub fn record(&mut self, report: TaskReport) {
        match report.outcome {
            Ok(count) => {
                self.succeeded += 1;
                self.rows_written += count;
            }
            Err(cause) => self.failures.push(PartitionFailure {
                partition_index: report.partition_index,
                rows: report.rows,
                cause,
            }),
        }
    }

    pub fn finish(&mut self, elapsed: Duration) {
        self.failures.sort_by_key(|f| f.partition_index);
        self.elapsed_ms = elapsed.as_millis() as u64;
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn failed_partitions(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.partition_index).collect()
    }

    /// Every partition landed and the requested index (if any) exists.
    pub fn is_complete(&self) -> bool {
        !self.has_failures() && !matches!(self.index, IndexOutcome::Failed(_))
    }
}
