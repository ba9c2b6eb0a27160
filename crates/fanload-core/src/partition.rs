//! Partitioning: split a frame into contiguous row ranges so each range can
//! be written by its own worker.

use std::ops::Range;
use std::sync::Arc;

use tracing::debug;

use crate::dataset::{Table, Value};
use crate::error::{CoreError, Result};

/// Compute contiguous row ranges for `num_partitions` partitions.
///
/// Divides `total_rows` as evenly as possible; the first
/// `total_rows % effective_partitions` ranges each receive one extra row.
/// If `num_partitions` exceeds `total_rows`, the partition count is capped
/// to `total_rows`, so no range is ever empty.
pub fn partition_ranges(total_rows: usize, num_partitions: usize) -> Result<Vec<Range<usize>>> {
    if num_partitions == 0 {
        return Err(CoreError::InvalidArgument(
            "partition count must be at least 1".into(),
        ));
    }
    if total_rows == 0 {
        return Ok(vec![]);
    }

    let effective_partitions = num_partitions.min(total_rows);
    let base_size = total_rows / effective_partitions;
    let remainder = total_rows % effective_partitions;

    let mut ranges = Vec::with_capacity(effective_partitions);
    let mut offset = 0usize;

    for i in 0..effective_partitions {
        let len = if i < remainder { base_size + 1 } else { base_size };
        ranges.push(offset..offset + len);
        offset += len;
    }

    Ok(ranges)
}

/// A contiguous slice of a shared, read-only frame.
#[derive(Debug, Clone)]
pub struct Partition {
    index: usize,
    rows: Range<usize>,
    table: Arc<Table>,
}

impl Partition {
    /// A partition covering `rows` of `table`.
    ///
    /// Returns `InvalidArgument` if the range falls outside the frame.
    pub fn new(index: usize, table: Arc<Table>, rows: Range<usize>) -> Result<Self> {
        if rows.start > rows.end || rows.end > table.row_count() {
            return Err(CoreError::InvalidArgument(format!(
                "row range {:?} out of bounds for {} rows",
                rows,
                table.row_count()
            )));
        }
        Ok(Self { index, rows, table })
    }

    /// A single partition spanning the whole frame.
    pub fn whole(table: Arc<Table>) -> Self {
        let rows = 0..table.row_count();
        Self {
            index: 0,
            rows,
            table,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Row indices of this partition within the full frame.
    pub fn row_range(&self) -> Range<usize> {
        self.rows.clone()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        self.table.columns()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.table.rows()[self.rows.clone()]
    }

    /// Narrow this partition to a sub-range of its own rows (relative indices).
    pub fn slice(&self, relative: Range<usize>) -> Result<Self> {
        let start = self.rows.start + relative.start;
        let end = self.rows.start + relative.end;
        if relative.start > relative.end || end > self.rows.end {
            return Err(CoreError::InvalidArgument(format!(
                "slice {:?} out of bounds for partition of {} rows",
                relative,
                self.len()
            )));
        }
        Ok(Self {
            index: self.index,
            rows: start..end,
            table: Arc::clone(&self.table),
        })
    }
}

/// Split `table` into at most `partition_count` contiguous partitions.
pub fn partition(table: Arc<Table>, partition_count: usize) -> Result<Vec<Partition>> {
    let ranges = partition_ranges(table.row_count(), partition_count)?;
    debug!(
        "Split {} rows into {} partitions (requested {})",
        table.row_count(),
        ranges.len(),
        partition_count
    );
    Ok(ranges
        .into_iter()
        .enumerate()
        .map(|(index, rows)| Partition {
            index,
            rows,
            table: Arc::clone(&table),
        })
        .collect())
}
