//! fanload core - dataset model, partitioning and statement rendering
//!
//! This crate has no I/O: it turns an in-memory dataset into partitions and
//! partitions into MySQL statements.

pub mod dataset;
pub mod encode;
pub mod error;
pub mod partition;

pub use dataset::{ColumnDef, ColumnType, Dataset, Series, Table, Value};
pub use encode::{
    add_index_sql, create_table_sql, quote_identifier, NullMode, RowEncoder, Statement,
    StatementKind, MAX_BIND_PARAMS,
};
pub use error::CoreError;
pub use partition::{partition, partition_ranges, Partition};
