//! MySQL connector built on a single `sqlx::MySqlConnection` per open.
//!
//! Autocommit is switched off right after connecting so that every write task
//! commits explicitly. Every statement goes through `sqlx::query`; bound
//! statements carry their parameters with their native types, literal ones
//! carry none.

use async_trait::async_trait;
use fanload_core::{Statement, Value};
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlConnection};
use sqlx::query::Query;
use sqlx::{Connection as _, MySql};
use tracing::debug;

use crate::connection::{Connection, Connector};
use crate::descriptor::ConnectionDescriptor;
use crate::error::ConnectorError;

/// Opens one MySQL connection per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

impl MySqlConnector {
    pub fn new() -> Self {
        Self
    }

    /// Translate a descriptor into sqlx connect options.
    pub fn connect_options(descriptor: &ConnectionDescriptor) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&descriptor.host)
            .port(descriptor.port)
            .username(&descriptor.user)
            .password(&descriptor.password)
            .database(&descriptor.database)
            .charset(descriptor.charset())
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    fn name(&self) -> &'static str {
        "mysql"
    }

    async fn open(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn Connection>, ConnectorError> {
        let options = Self::connect_options(descriptor);
        let mut conn = MySqlConnection::connect_with(&options)
            .await
            .map_err(|e| ConnectorError::connection(descriptor, e))?;

        if let Err(e) = sqlx::query("SET autocommit = 0").execute(&mut conn).await {
            let _ = conn.close().await;
            return Err(ConnectorError::connection(descriptor, e));
        }

        debug!("Opened MySQL connection to {}", descriptor.endpoint());
        Ok(Box::new(MySqlSession { conn }))
    }
}

struct MySqlSession {
    conn: MySqlConnection,
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) if f.is_nan() => query.bind(None::<f64>),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
        Value::Date(d) => query.bind(*d),
        Value::DateTime(dt) => query.bind(*dt),
    }
}

#[async_trait]
impl Connection for MySqlSession {
    async fn execute(&mut self, statement: &Statement) -> Result<u64, ConnectorError> {
        let result = if statement.is_bound() {
            let query = statement
                .params
                .iter()
                .fold(sqlx::query(&statement.sql), bind_value);
            query.execute(&mut self.conn).await?
        } else {
            sqlx::query(&statement.sql).execute(&mut self.conn).await?
        };
        Ok(result.rows_affected())
    }

    async fn commit(&mut self) -> Result<(), ConnectorError> {
        sqlx::query("COMMIT").execute(&mut self.conn).await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), ConnectorError> {
        self.conn.close().await?;
        Ok(())
    }
}
