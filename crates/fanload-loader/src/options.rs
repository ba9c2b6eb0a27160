//! Load options, with an environment-variable loader.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use fanload_core::NullMode;
use serde::Serialize;

use crate::error::LoadError;

/// How INSERT statements are sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementMode {
    /// `?` placeholders with bound values.
    #[default]
    Bound,
    /// Escaped literal SQL text.
    Literal,
}

impl FromStr for StatementMode {
    type Err = LoadError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bound" => Ok(StatementMode::Bound),
            "literal" => Ok(StatementMode::Literal),
            other => Err(LoadError::InvalidArgument(format!(
                "unknown statement mode '{}', expected 'bound' or 'literal'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    /// Columns of the composite index added after a fully successful load.
    /// Empty = no index.
    pub index_columns: Vec<String>,
    /// Requested number of partitions; capped to the row count.
    pub partition_count: usize,
    /// Number of partitions written concurrently.
    pub worker_count: usize,
    pub nulls: NullMode,
    pub statement_mode: StatementMode,
    /// Pool-level deadline. Partitions still writing when it elapses roll
    /// back, close their connection and are recorded as failures.
    pub deadline: Option<Duration>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            index_columns: vec![],
            partition_count: 1,
            worker_count: 1,
            nulls: NullMode::default(),
            statement_mode: StatementMode::default(),
            deadline: None,
        }
    }
}

impl LoadOptions {
    pub fn with_index_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.index_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_partitions(mut self, partition_count: usize) -> Self {
        self.partition_count = partition_count;
        self
    }

    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Map a `n_workers` × `threads_per_worker` pair onto a single
    /// parallelism knob: `worker_count = n_workers * threads_per_worker`.
    pub fn with_legacy_parallelism(mut self, n_workers: usize, threads_per_worker: usize) -> Self {
        self.worker_count = n_workers.saturating_mul(threads_per_worker);
        self
    }

    pub fn with_nulls(mut self, nulls: NullMode) -> Self {
        self.nulls = nulls;
        self
    }

    pub fn with_statement_mode(mut self, mode: StatementMode) -> Self {
        self.statement_mode = mode;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn validate(&self) -> std::result::Result<(), LoadError> {
        if self.partition_count == 0 {
            return Err(LoadError::InvalidArgument(
                "partition count must be at least 1".into(),
            ));
        }
        if self.worker_count == 0 {
            return Err(LoadError::InvalidArgument(
                "worker count must be at least 1".into(),
            ));
        }
        if self.index_columns.iter().any(|c| c.trim().is_empty()) {
            return Err(LoadError::InvalidArgument(
                "index column names cannot be empty".into(),
            ));
        }
        if self.deadline.is_some_and(|d| d.is_zero()) {
            return Err(LoadError::InvalidArgument("deadline must be positive".into()));
        }
        Ok(())
    }

    /// Read options from environment variables, falling back to defaults:
    /// `FANLOAD_PARTITIONS`, `FANLOAD_WORKERS`, `FANLOAD_NULL_MODE`,
    /// `FANLOAD_STATEMENT_MODE`, `FANLOAD_DEADLINE_SECS`,
    /// `FANLOAD_INDEX_COLUMNS` (comma separated).
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            index_columns: std::env::var("FANLOAD_INDEX_COLUMNS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            partition_count: std::env::var("FANLOAD_PARTITIONS")
                .unwrap_or_else(|_| defaults.partition_count.to_string())
                .parse()
                .context("Invalid FANLOAD_PARTITIONS")?,
            worker_count: std::env::var("FANLOAD_WORKERS")
                .unwrap_or_else(|_| defaults.worker_count.to_string())
                .parse()
                .context("Invalid FANLOAD_WORKERS")?,
            nulls: std::env::var("FANLOAD_NULL_MODE")
                .unwrap_or_else(|_| "legacy".to_string())
                .parse()
                .context("Invalid FANLOAD_NULL_MODE")?,
            statement_mode: std::env::var("FANLOAD_STATEMENT_MODE")
                .unwrap_or_else(|_| "bound".to_string())
                .parse()
                .context("Invalid FANLOAD_STATEMENT_MODE")?,
            deadline: std::env::var("FANLOAD_DEADLINE_SECS")
                .ok()
                .map(|v| v.parse::<u64>().map(Duration::from_secs))
                .transpose()
                .context("Invalid FANLOAD_DEADLINE_SECS")?,
        })
    }
}
