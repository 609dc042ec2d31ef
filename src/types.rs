//! Core type definitions for the gateway
//!
//! Includes the tenant credential triple and the transport-neutral query and
//! schema results handed back to the HTTP layer.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::sql::sanitize::Identifier;

// ============================================================================
// Tenant Credential
// ============================================================================

/// The (database, user, password) triple a resolved tenant supplies on every call
#[derive(Clone)]
pub struct TenantCredential {
    pub database: String,
    pub user: String,
    pub password: String,
}

impl TenantCredential {
    pub fn new(
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// Validate both names, returning them as identifiers
    pub fn identifiers(&self) -> Result<(Identifier, Identifier)> {
        let database = Identifier::parse(&self.database, "database")?;
        let user = Identifier::parse(&self.user, "user")?;
        Ok((database, user))
    }
}

impl fmt::Debug for TenantCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantCredential")
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// Query Result
// ============================================================================

/// Result of an ad-hoc tenant query
///
/// Every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// Column names in result order
    pub columns: Vec<String>,
    /// Row cells in column order
    pub rows: Vec<Vec<Value>>,
    /// Human-readable summary ("N rows returned" / "N rows affected")
    pub message: String,
    /// Rows dropped because they could not be decoded
    pub skipped_rows: usize,
}

impl QueryResult {
    /// Result of a read query
    pub fn rows_returned(columns: Vec<String>, rows: Vec<Vec<Value>>, skipped_rows: usize) -> Self {
        let message = format!("{} rows returned", rows.len());
        Self {
            columns,
            rows,
            message,
            skipped_rows,
        }
    }

    /// Synthetic single-cell result of a write query
    pub fn rows_affected(affected: u64) -> Self {
        Self {
            columns: vec!["Result".to_string()],
            rows: vec![vec![Value::String("Query executed successfully".to_string())]],
            message: format!("{} rows affected", affected),
            skipped_rows: 0,
        }
    }
}

// ============================================================================
// Database Schema
// ============================================================================

/// A column as reported by `DESCRIBE`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    /// Declared type, e.g. `varchar(255)`
    #[serde(rename = "type")]
    pub column_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

/// Tables and columns of one tenant database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseSchema {
    /// Tables in discovery order
    pub tables: Vec<TableSchema>,
    /// Tables whose column query failed and were left out
    pub skipped_tables: Vec<String>,
}
