//! Restricted ad-hoc SQL execution for tenants
//!
//! Queries run on the tenant's own pooled connection after passing the
//! forbidden-command screen. Result rows are converted into JSON cells so the
//! HTTP layer can return them as-is.

use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use serde_json::Value;
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::{Column, Either, Executor, Row, TypeInfo, ValueRef};
use tracing::{debug, warn};

use crate::error::{GatewayError, Result, with_deadline};
use crate::pool::TenantPool;
use crate::sql::classify::{QueryKind, classify, find_forbidden_command};
use crate::types::{QueryResult, TenantCredential};

/// Column types whose values are raw bytes
const BINARY_TYPES: &[&str] = &[
    "BINARY",
    "VARBINARY",
    "TINYBLOB",
    "BLOB",
    "MEDIUMBLOB",
    "LONGBLOB",
    "BIT",
    "GEOMETRY",
];

const SIGNED_INTEGER_TYPES: &[&str] = &["TINYINT", "SMALLINT", "MEDIUMINT", "INT", "BIGINT", "YEAR"];

/// Executes screened tenant SQL against the tenant's pool
pub struct QueryGateway {
    pool: Arc<TenantPool>,
    statement_timeout: Duration,
}

impl QueryGateway {
    pub fn new(pool: Arc<TenantPool>, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    /// Run `query` as the tenant
    ///
    /// `SELECT`, `SHOW`, `DESCRIBE` and `EXPLAIN` return their rows; any
    /// other statement returns a one-cell success result with the number of
    /// rows affected. The pooled connection stays open afterwards.
    pub async fn execute(&self, credential: &TenantCredential, query: &str) -> Result<QueryResult> {
        credential.identifiers()?;

        if let Some(command) = find_forbidden_command(query) {
            warn!(user = %credential.user, command, "rejected forbidden command");
            return Err(GatewayError::CommandNotAllowed(command.to_string()));
        }

        let pool = self.pool.get_or_create(credential).await?;

        match classify(query) {
            QueryKind::Read => {
                with_deadline("query", self.statement_timeout, fetch_rows(&pool, query)).await
            }
            QueryKind::Write => {
                with_deadline("query", self.statement_timeout, execute_write(&pool, query)).await
            }
        }
    }
}

/// Stream every row into memory, skipping rows that fail to decode
///
/// Only the first result set that carries rows is returned. Rows from any
/// later statement of a multi-statement query are counted as skipped.
async fn fetch_rows(pool: &MySqlPool, query: &str) -> Result<QueryResult> {
    let mut stream = sqlx::raw_sql(query).fetch_many(pool);
    let mut columns: Option<Vec<String>> = None;
    let mut first_set_done = false;
    let mut rows = Vec::new();
    let mut skipped = 0;

    while let Some(item) = stream
        .try_next()
        .await
        .map_err(GatewayError::tenant_statement)?
    {
        let row = match item {
            Either::Left(_) => {
                first_set_done |= columns.is_some();
                continue;
            }
            Either::Right(row) => row,
        };
        if first_set_done {
            skipped += 1;
            continue;
        }
        columns.get_or_insert_with(|| column_names(&row));
        match decode_row(&row) {
            Ok(cells) => rows.push(cells),
            Err(err) => {
                debug!(error = %err, "skipping undecodable row");
                skipped += 1;
            }
        }
    }
    drop(stream);

    if skipped > 0 {
        debug!(skipped, "rows left out of query result");
    }

    let columns = match columns {
        Some(columns) => columns,
        None => describe_columns(pool, query).await,
    };

    Ok(QueryResult::rows_returned(columns, rows, skipped))
}

async fn execute_write(pool: &MySqlPool, query: &str) -> Result<QueryResult> {
    let done = sqlx::raw_sql(query)
        .execute(pool)
        .await
        .map_err(GatewayError::tenant_statement)?;
    Ok(QueryResult::rows_affected(done.rows_affected()))
}

fn column_names(row: &MySqlRow) -> Vec<String> {
    row.columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect()
}

/// Column names for a query that returned no rows
///
/// Relies on `Executor::describe`, which sqlx keeps hidden from its docs for
/// use by the query macros; recheck this when moving off sqlx 0.8.
async fn describe_columns(pool: &MySqlPool, query: &str) -> Vec<String> {
    match pool.describe(query).await {
        Ok(described) => described
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect(),
        Err(err) => {
            debug!(error = %err, "could not describe empty result");
            Vec::new()
        }
    }
}

fn decode_row(row: &MySqlRow) -> std::result::Result<Vec<Value>, sqlx::Error> {
    (0..row.len()).map(|index| decode_cell(row, index)).collect()
}

/// Convert one cell to JSON
///
/// Rows arrive over the text protocol, so every value is decoded from its
/// textual form: integers and floats become JSON scalars, JSON
/// columns are parsed, binary strings become (lossy) UTF-8 text, and
/// everything else (decimals, dates, times, enums) keeps its server text.
fn decode_cell(row: &MySqlRow, index: usize) -> std::result::Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        // sqlx reports every TINYINT(1) as BOOLEAN, whatever value it stores.
        "BOOLEAN" => integer_from_text(&text_at(row, index)?),
        name if SIGNED_INTEGER_TYPES.contains(&name) => {
            Value::from(row.try_get_unchecked::<i64, _>(index)?)
        }
        name if name.ends_with("UNSIGNED") => Value::from(row.try_get_unchecked::<u64, _>(index)?),
        "FLOAT" | "DOUBLE" => {
            let float = row.try_get_unchecked::<f64, _>(index)?;
            serde_json::Number::from_f64(float)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        }
        "JSON" => {
            let text = text_at(row, index)?;
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        }
        name if BINARY_TYPES.contains(&name) => {
            let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => Value::String(text_at(row, index)?),
    };
    Ok(value)
}

/// Parse integer text as signed, then unsigned, keeping the text if neither fits
fn integer_from_text(text: &str) -> Value {
    text.parse::<i64>()
        .map(Value::from)
        .or_else(|_| text.parse::<u64>().map(Value::from))
        .unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Read a cell as text, falling back to lossy UTF-8 for binary-collated strings
pub(crate) fn text_at(row: &MySqlRow, index: usize) -> std::result::Result<String, sqlx::Error> {
    match row.try_get_unchecked::<String, _>(index) {
        Ok(text) => Ok(text),
        Err(_) => {
            let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::pool::MySqlConnector;

    fn gateway() -> (QueryGateway, Arc<TenantPool>) {
        let config = GatewayConfig::builder("root", "secret")
            .host("127.0.0.1")
            .port(1)
            .connect_timeout(Duration::from_millis(200))
            .build();
        let pool = Arc::new(TenantPool::new(MySqlConnector::new(&config)));
        (
            QueryGateway::new(Arc::clone(&pool), config.statement_timeout),
            pool,
        )
    }

    fn cred() -> TenantCredential {
        TenantCredential::new("shop_db", "shop_user", "secret1")
    }

    #[tokio::test]
    async fn test_rejects_invalid_identifiers() {
        let (gw, pool) = gateway();
        let bad = TenantCredential::new("shop`db", "shop_user", "secret1");
        let err = gw.execute(&bad, "SELECT 1").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidIdentifier(_)));
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_forbidden_before_connecting() {
        let (gw, pool) = gateway();
        let err = gw
            .execute(&cred(), "SELECT 1; drop   database shop_db")
            .await
            .unwrap_err();
        match err {
            GatewayError::CommandNotAllowed(command) => assert_eq!(command, "DROP DATABASE"),
            other => panic!("expected CommandNotAllowed, got {other:?}"),
        }
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_each_admin_command() {
        let (gw, _pool) = gateway();
        for query in [
            "GRANT SELECT ON *.* TO x",
            "revoke all on *.* from x",
            "create user x",
            "DROP USER x",
            "alter user x identified by 'y'",
            "FLUSH TABLES",
            "CREATE DATABASE other",
        ] {
            let err = gw.execute(&cred(), query).await.unwrap_err();
            assert!(
                matches!(err, GatewayError::CommandNotAllowed(_)),
                "{query}: {err:?}"
            );
        }
    }

    #[test]
    fn test_integer_from_text_keeps_tinyint_values() {
        assert_eq!(integer_from_text("0"), Value::from(0));
        assert_eq!(integer_from_text("5"), Value::from(5));
        assert_eq!(integer_from_text("-3"), Value::from(-3));
        assert_eq!(integer_from_text("200"), Value::from(200));
        assert_eq!(
            integer_from_text("18446744073709551615"),
            Value::from(u64::MAX)
        );
        assert_eq!(integer_from_text("n/a"), Value::String("n/a".into()));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let (gw, pool) = gateway();
        let err = gw.execute(&cred(), "SELECT 1").await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {err:?}");
        assert!(pool.is_empty());
    }
}
