//! Tenant schema introspection
//!
//! Lists tables and their columns through the tenant's own pool.

use std::sync::Arc;
use std::time::Duration;

use sqlx::mysql::MySqlPool;
use tracing::debug;

use crate::error::{GatewayError, Result, with_deadline};
use crate::pool::TenantPool;
use crate::query::text_at;
use crate::sql::sanitize::quote_identifier;
use crate::types::{ColumnSchema, DatabaseSchema, TableSchema, TenantCredential};

pub struct SchemaIntrospector {
    pool: Arc<TenantPool>,
    statement_timeout: Duration,
}

impl SchemaIntrospector {
    pub fn new(pool: Arc<TenantPool>, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    /// Tables in discovery order, each with columns in server order
    ///
    /// A table whose `DESCRIBE` fails is left out and named in
    /// `skipped_tables`; the rest of the schema is still returned.
    pub async fn get_schema(&self, credential: &TenantCredential) -> Result<DatabaseSchema> {
        credential.identifiers()?;
        let pool = self.pool.get_or_create(credential).await?;

        with_deadline(
            "schema introspection",
            self.statement_timeout,
            read_schema(&pool),
        )
        .await
    }
}

async fn read_schema(pool: &MySqlPool) -> Result<DatabaseSchema> {
    let table_names: Vec<String> = sqlx::raw_sql("SHOW TABLES")
        .fetch_all(pool)
        .await
        .map_err(GatewayError::tenant_statement)?
        .iter()
        .filter_map(|row| text_at(row, 0).ok())
        .collect();

    let mut schema = DatabaseSchema::default();
    for table in table_names {
        let describe = format!("DESCRIBE {}", quote_identifier(&table));
        match sqlx::raw_sql(&describe).fetch_all(pool).await {
            Ok(rows) => {
                let columns = rows
                    .iter()
                    .filter_map(|row| {
                        Some(ColumnSchema {
                            name: text_at(row, 0).ok()?,
                            column_type: text_at(row, 1).ok()?,
                        })
                    })
                    .collect();
                schema.tables.push(TableSchema {
                    name: table,
                    columns,
                });
            }
            Err(err) => {
                debug!(table = %table, error = %err, "skipping table with unreadable columns");
                schema.skipped_tables.push(table);
            }
        }
    }

    Ok(schema)
}
