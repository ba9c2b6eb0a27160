//! Bounded worker pool.
//!
//! Every partition becomes one tokio task, gated by a semaphore so that at
//! most `worker_count` of them hold a connection at once. The deadline is
//! enforced inside each writer, which closes its own connection when time
//! runs out; tasks still running `CLOSE_GRACE` later are aborted. `run`
//! returns only after every task has reported, in partition order.

use std::ops::Range;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use fanload_core::Partition;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::LoadError;
use crate::result::TaskReport;
use crate::writer::{panic_message, PartitionWriter};

/// How long past the deadline writers get to close their connections.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Scheduler {
    worker_count: usize,
    deadline: Option<Duration>,
}

impl Scheduler {
    pub fn new(worker_count: usize) -> Result<Self, LoadError> {
        if worker_count == 0 {
            return Err(LoadError::InvalidArgument(
                "worker count must be at least 1".into(),
            ));
        }
        Ok(Self {
            worker_count,
            deadline: None,
        })
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Write every partition, at most `worker_count` at a time, and wait for
    /// all of them.
    pub async fn run(&self, partitions: Vec<Partition>, writer: &PartitionWriter) -> Vec<TaskReport> {
        let expected: Vec<(usize, Range<usize>)> = partitions
            .iter()
            .map(|p| (p.index(), p.row_range()))
            .collect();
        let semaphore = Arc::new(Semaphore::new(
            self.worker_count.min(Semaphore::MAX_PERMITS),
        ));
        let mut set: JoinSet<TaskReport> = JoinSet::new();
        let started = Instant::now();
        let writer = match self.deadline {
            Some(limit) => writer.clone().with_deadline(started, limit),
            None => writer.clone(),
        };

        for partition in partitions {
            let sem = Arc::clone(&semaphore);
            let writer = writer.clone();
            set.spawn(async move {
                let index = partition.index();
                let rows = partition.row_range();
                let _permit = match sem.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return TaskReport::failed(
                            index,
                            rows,
                            LoadError::WorkerPanicked("worker pool closed".into()),
                        )
                    }
                };
                AssertUnwindSafe(writer.write(partition))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| {
                        TaskReport::failed(
                            index,
                            rows,
                            LoadError::WorkerPanicked(panic_message(payload)),
                        )
                    })
            });
        }
        debug!(
            "Dispatched {} partitions to {} workers",
            expected.len(),
            self.worker_count
        );

        let abort_at = self.deadline.map(|d| started + d + CLOSE_GRACE);
        let mut reports = Vec::with_capacity(expected.len());
        let mut expired = false;
        loop {
            let next = match abort_at {
                Some(at) => match tokio::time::timeout_at(at, set.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!("Aborting {} write tasks stuck past the deadline", set.len());
                        expired = true;
                        set.abort_all();
                        break;
                    }
                },
                None => set.join_next().await,
            };
            match next {
                Some(Ok(report)) => reports.push(report),
                Some(Err(e)) => warn!("Write task did not complete: {}", e),
                None => break,
            }
        }

        if expired {
            // Tasks that finished in the meantime still count.
            while let Some(next) = set.join_next().await {
                if let Ok(report) = next {
                    reports.push(report);
                }
            }
        }

        if reports.len() < expected.len() {
            let reported: Vec<usize> = reports.iter().map(|r| r.partition_index).collect();
            for (index, rows) in expected {
                if reported.contains(&index) {
                    continue;
                }
                let cause = match (expired, self.deadline) {
                    (true, Some(d)) => LoadError::DeadlineExceeded(d),
                    _ => LoadError::WorkerPanicked("write task did not report".into()),
                };
                reports.push(TaskReport::failed(index, rows, cause));
            }
        }

        reports.sort_by_key(|r| r.partition_index);
        reports
    }
}
