//! In-memory dataset model: scalar values, frames, series.
//!
//! A [`Dataset`] is fully materialized before a load starts. Frames are
//! shared read-only between partitions through an `Arc<Table>`.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::error::{CoreError, Result};

/// A nullable scalar cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Value {
    /// True for `Null` and for `NaN` floats, which count as missing data.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Detect the type of a raw text cell (CSV and similar sources).
    ///
    /// Empty cells are null. Integers, finite floats, booleans, datetimes and
    /// dates are recognized in that order; everything else stays text.
    pub fn infer_from_str(raw: &str) -> Value {
        let s = raw.trim();
        if s.is_empty() {
            return Value::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            if f.is_finite() {
                return Value::Float(f);
            }
        }
        if s.eq_ignore_ascii_case("true") {
            return Value::Bool(true);
        }
        if s.eq_ignore_ascii_case("false") {
            return Value::Bool(false);
        }
        for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Value::DateTime(dt);
            }
        }
        if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Value::Date(d);
        }
        Value::Text(raw.to_string())
    }

    fn kind(&self) -> Option<ColumnType> {
        match self {
            _ if self.is_missing() => None,
            Value::Bool(_) => Some(ColumnType::Boolean),
            Value::Int(_) => Some(ColumnType::BigInt),
            Value::Float(_) => Some(ColumnType::Double),
            Value::Text(_) => Some(ColumnType::Text),
            Value::Bytes(_) => Some(ColumnType::Blob),
            Value::Date(_) => Some(ColumnType::Date),
            Value::DateTime(_) => Some(ColumnType::DateTime),
            Value::Null => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// MySQL column type chosen for a dataset column at bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    BigInt,
    Double,
    Boolean,
    Text,
    Blob,
    Date,
    DateTime,
}

impl ColumnType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::BigInt => "BIGINT",
            ColumnType::Double => "DOUBLE",
            ColumnType::Boolean => "BOOL",
            ColumnType::Text => "TEXT",
            ColumnType::Blob => "BLOB",
            ColumnType::Date => "DATE",
            ColumnType::DateTime => "DATETIME",
        }
    }

    /// Infer a column type from its values.
    ///
    /// Missing values are ignored. Integers mixed with floats widen to
    /// `Double`; any other mix, and an all-missing column, falls back to `Text`.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> ColumnType {
        let mut inferred: Option<ColumnType> = None;
        for kind in values.into_iter().filter_map(Value::kind) {
            inferred = Some(match (inferred, kind) {
                (None, k) => k,
                (Some(a), b) if a == b => a,
                (Some(ColumnType::BigInt), ColumnType::Double)
                | (Some(ColumnType::Double), ColumnType::BigInt) => ColumnType::Double,
                _ => return ColumnType::Text,
            });
        }
        inferred.unwrap_or(ColumnType::Text)
    }
}

/// A column name with its inferred SQL type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

/// A multi-column frame with a flat row index.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Build a frame, checking that column names are non-empty and unique and
    /// that every row has one value per column.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        if columns.is_empty() {
            return Err(CoreError::Schema("a frame needs at least one column".into()));
        }
        let mut seen = HashSet::new();
        for name in &columns {
            if name.is_empty() {
                return Err(CoreError::Schema("column names cannot be empty".into()));
            }
            if !seen.insert(name.as_str()) {
                return Err(CoreError::Schema(format!("duplicate column '{}'", name)));
            }
        }
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(CoreError::Schema(format!(
                "row {} has {} values, expected {}",
                i,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Column names paired with the types inferred from their values.
    pub fn column_defs(&self) -> Vec<ColumnDef> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, name)| ColumnDef {
                name: name.clone(),
                column_type: ColumnType::infer(self.rows.iter().map(|row| &row[i])),
            })
            .collect()
    }
}

/// A single named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub values: Vec<Value>,
}

impl Series {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// View the series as a one-column frame.
    pub fn into_table(self) -> Result<Table> {
        let rows = self.values.into_iter().map(|v| vec![v]).collect();
        Table::new(vec![self.name], rows)
    }
}

/// Input to a bulk load.
#[derive(Debug, Clone, PartialEq)]
pub enum Dataset {
    Frame(Table),
    Series(Series),
}

impl Dataset {
    pub fn row_count(&self) -> usize {
        match self {
            Dataset::Frame(t) => t.row_count(),
            Dataset::Series(s) => s.values.len(),
        }
    }

    pub fn columns(&self) -> Vec<String> {
        match self {
            Dataset::Frame(t) => t.columns().to_vec(),
            Dataset::Series(s) => vec![s.name.clone()],
        }
    }

    pub fn is_series(&self) -> bool {
        matches!(self, Dataset::Series(_))
    }

    pub fn into_table(self) -> Result<Table> {
        match self {
            Dataset::Frame(t) => Ok(t),
            Dataset::Series(s) => s.into_table(),
        }
    }
}

impl From<Table> for Dataset {
    fn from(t: Table) -> Self {
        Dataset::Frame(t)
    }
}

impl From<Series> for Dataset {
    fn from(s: Series) -> Self {
        Dataset::Series(s)
    }
}
