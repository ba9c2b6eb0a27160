//! fanload loader - partitioned, bounded-parallel bulk loads
//!
//! A load bootstraps the target table on its own connection, splits the
//! dataset into contiguous partitions, writes each partition on a fresh
//! connection with at most `worker_count` running at once, and finally adds
//! the requested index if every partition landed.

pub mod bootstrap;
pub mod error;
pub mod index;
pub mod loader;
pub mod metrics;
pub mod options;
pub mod result;
pub mod scheduler;
pub mod writer;

pub use error::LoadError;
pub use loader::{bulk_load, BulkLoader};
pub use metrics::LoaderMetrics;
pub use options::{LoadOptions, StatementMode};
pub use result::{IndexOutcome, LoadResult, PartitionFailure, TaskReport};
pub use scheduler::Scheduler;
pub use writer::PartitionWriter;
