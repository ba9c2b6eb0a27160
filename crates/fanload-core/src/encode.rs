//! Row encoder: renders partitions into MySQL multi-row INSERT statements.
//!
//! Two output forms share the same shape:
//!
//! - literal: ``INSERT INTO `t`(`a`, `b`) VALUES (1, 'x'), (2, 'NULL')``
//! - bound:   ``INSERT INTO `t`(`a`, `b`) VALUES (?, ?), (?, ?)`` plus the
//!   values as parameters, in row-major order.
//!
//! Missing values are substituted according to [`NullMode`] before either
//! form is produced.

use std::borrow::Cow;
use std::fmt::Write as _;

use serde::Serialize;

use crate::dataset::{ColumnDef, Value};
use crate::error::{CoreError, Result};
use crate::partition::Partition;

/// MySQL's limit on placeholders in one prepared statement.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// How missing values (null, NaN) are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NullMode {
    /// Write the quoted text `'NULL'`. Compatible with loads produced by
    /// earlier tooling, but stores a 4-character string, not SQL NULL.
    #[default]
    LegacyText,
    /// Write SQL `NULL`.
    SqlNull,
}

impl NullMode {
    pub fn substitute<'a>(&self, value: &'a Value) -> Cow<'a, Value> {
        if !value.is_missing() {
            return Cow::Borrowed(value);
        }
        match self {
            NullMode::LegacyText => Cow::Owned(Value::Text("NULL".to_string())),
            NullMode::SqlNull => Cow::Owned(Value::Null),
        }
    }
}

impl std::str::FromStr for NullMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" | "legacy_text" | "text" => Ok(NullMode::LegacyText),
            "sql" | "sql_null" | "null" => Ok(NullMode::SqlNull),
            other => Err(CoreError::InvalidArgument(format!(
                "unknown null mode '{}', expected 'legacy' or 'sql'",
                other
            ))),
        }
    }
}

/// What a statement does, independent of how its SQL text is rendered.
#[derive(Debug, Clone)]
pub enum StatementKind {
    CreateTable {
        table: String,
        columns: Vec<ColumnDef>,
    },
    Insert {
        table: String,
        rows: Partition,
        nulls: NullMode,
    },
    AddIndex {
        table: String,
        columns: Vec<String>,
    },
}

/// A rendered SQL statement, with bound parameters when it uses placeholders.
#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
    pub kind: StatementKind,
}

impl Statement {
    pub fn is_bound(&self) -> bool {
        !self.params.is_empty()
    }

    /// Number of rows this statement inserts (zero for DDL).
    pub fn row_count(&self) -> usize {
        match &self.kind {
            StatementKind::Insert { rows, .. } => rows.len(),
            _ => 0,
        }
    }
}

/// Quote an identifier with backticks, doubling any embedded backtick.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn quote_identifiers(names: &[String]) -> String {
    names
        .iter()
        .map(|n| quote_identifier(n))
        .collect::<Vec<_>>()
        .join(", ")
}

fn quote_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("''"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Schema-only bootstrap: create the table when absent, no-op otherwise.
pub fn create_table_sql(table: &str, columns: &[ColumnDef]) -> Statement {
    let defs = columns
        .iter()
        .map(|c| format!("{} {}", quote_identifier(&c.name), c.column_type.sql_type()))
        .collect::<Vec<_>>()
        .join(", ");
    Statement {
        sql: format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_identifier(table),
            defs
        ),
        params: vec![],
        kind: StatementKind::CreateTable {
            table: table.to_string(),
            columns: columns.to_vec(),
        },
    }
}

/// Composite secondary index over `columns`.
pub fn add_index_sql(table: &str, columns: &[String]) -> Statement {
    Statement {
        sql: format!(
            "ALTER TABLE {} ADD INDEX ({})",
            quote_identifier(table),
            quote_identifiers(columns)
        ),
        params: vec![],
        kind: StatementKind::AddIndex {
            table: table.to_string(),
            columns: columns.to_vec(),
        },
    }
}

/// Renders partitions into INSERT statements.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowEncoder {
    nulls: NullMode,
}

impl RowEncoder {
    pub fn new(nulls: NullMode) -> Self {
        Self { nulls }
    }

    pub fn nulls(&self) -> NullMode {
        self.nulls
    }

    /// Render a partition as one literal multi-row INSERT.
    pub fn encode_insert(&self, table: &str, part: &Partition) -> Result<Statement> {
        ensure_rows(part)?;
        let mut sql = insert_header(table, part.columns());
        let base = part.row_range().start;
        for (r, row) in part.rows().iter().enumerate() {
            if r > 0 {
                sql.push_str(", ");
            }
            sql.push('(');
            for (c, value) in row.iter().enumerate() {
                if c > 0 {
                    sql.push_str(", ");
                }
                let value = self.nulls.substitute(value);
                let rendered = render_literal(&value).map_err(|reason| CoreError::Encoding {
                    column: part.columns()[c].clone(),
                    row: base + r,
                    reason,
                })?;
                sql.push_str(&rendered);
            }
            sql.push(')');
        }
        Ok(Statement {
            sql,
            params: vec![],
            kind: self.insert_kind(table, part),
        })
    }

    /// Render a partition as one INSERT with `?` placeholders and bound values.
    pub fn encode_insert_bound(&self, table: &str, part: &Partition) -> Result<Statement> {
        ensure_rows(part)?;
        let width = part.columns().len();
        let tuple = format!("({})", vec!["?"; width].join(", "));
        let mut sql = insert_header(table, part.columns());
        sql.push_str(&vec![tuple.as_str(); part.len()].join(", "));

        let base = part.row_range().start;
        let mut params = Vec::with_capacity(part.len() * width);
        for (r, row) in part.rows().iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                let value = self.nulls.substitute(value).into_owned();
                check_bindable(&value).map_err(|reason| CoreError::Encoding {
                    column: part.columns()[c].clone(),
                    row: base + r,
                    reason,
                })?;
                params.push(value);
            }
        }
        Ok(Statement {
            sql,
            params,
            kind: self.insert_kind(table, part),
        })
    }

    /// Bound INSERTs for a partition, split so that no statement carries more
    /// than `max_params` placeholders.
    pub fn encode_insert_chunks(
        &self,
        table: &str,
        part: &Partition,
        max_params: usize,
    ) -> Result<Vec<Statement>> {
        ensure_rows(part)?;
        let width = part.columns().len();
        if width > max_params {
            return Err(CoreError::InvalidArgument(format!(
                "{} columns exceed the limit of {} bound parameters",
                width, max_params
            )));
        }
        let rows_per_chunk = max_params / width;
        if part.len() <= rows_per_chunk {
            return Ok(vec![self.encode_insert_bound(table, part)?]);
        }

        let mut statements = Vec::with_capacity(part.len().div_ceil(rows_per_chunk));
        let mut start = 0;
        while start < part.len() {
            let end = (start + rows_per_chunk).min(part.len());
            statements.push(self.encode_insert_bound(table, &part.slice(start..end)?)?);
            start = end;
        }
        Ok(statements)
    }

    fn insert_kind(&self, table: &str, part: &Partition) -> StatementKind {
        StatementKind::Insert {
            table: table.to_string(),
            rows: part.clone(),
            nulls: self.nulls,
        }
    }
}

fn ensure_rows(part: &Partition) -> Result<()> {
    if part.is_empty() {
        return Err(CoreError::InvalidArgument(format!(
            "partition {} has no rows to insert",
            part.index()
        )));
    }
    Ok(())
}

fn insert_header(table: &str, columns: &[String]) -> String {
    format!(
        "INSERT INTO {}({}) VALUES ",
        quote_identifier(table),
        quote_identifiers(columns)
    )
}

fn check_bindable(value: &Value) -> std::result::Result<(), String> {
    match value {
        Value::Float(f) if f.is_infinite() => Err(format!("{} has no SQL representation", f)),
        _ => Ok(()),
    }
}

/// Render one (already null-substituted) value as a MySQL literal.
pub fn render_literal(value: &Value) -> std::result::Result<String, String> {
    check_bindable(value)?;
    Ok(match value {
        Value::Null => "NULL".to_string(),
        Value::Float(f) if f.is_nan() => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format!("{:?}", f),
        Value::Text(s) => quote_text(s),
        Value::Bytes(b) => {
            let mut out = String::with_capacity(b.len() * 2 + 3);
            out.push_str("X'");
            for byte in b {
                let _ = write!(out, "{:02X}", byte);
            }
            out.push('\'');
            out
        }
        Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
        Value::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S%.f")),
    })
}
