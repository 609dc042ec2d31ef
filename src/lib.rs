//! # tenant-db-gateway
//!
//! Multi-tenant MySQL database provisioning and a restricted query gateway.
//!
//! Each tenant owns exactly one database and one server user. This crate
//! creates and removes those pairs through a shared administrative
//! connection, keeps one small connection pool per tenant user, and lets a
//! tenant run ad-hoc SQL against only their own database.
//!
//! ## Features
//!
//! - **Provisioning**: create / delete / rotate password, with compensating
//!   rollback when a multi-step create fails part way
//! - **Identifier allow-list**: database and user names must match
//!   `^[A-Za-z0-9_]+$` before they reach any DDL statement
//! - **Tenant pool cache**: one lazily built pool per user, built at most once
//!   under concurrent first use and invalidated on password change or delete
//! - **Query screening**: administrative commands (GRANT, DROP DATABASE, ...)
//!   are rejected anywhere in the query text
//! - **Transport-neutral results**: rows come back as JSON cells
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tenant_db_gateway::{DatabaseGateway, GatewayConfig, TenantCredential};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::from_env()?;
//!     let gateway = DatabaseGateway::connect(config).await?;
//!
//!     gateway.create_database("shop_db", "shop_user", "s3cret-pw").await?;
//!
//!     let tenant = TenantCredential::new("shop_db", "shop_user", "s3cret-pw");
//!     gateway
//!         .execute_query(&tenant, "CREATE TABLE items (id INT PRIMARY KEY, name VARCHAR(64))")
//!         .await?;
//!     let result = gateway.execute_query(&tenant, "SELECT * FROM items").await?;
//!     println!("{}", result.message);
//!
//!     let schema = gateway.get_schema(&tenant).await?;
//!     println!("{} table(s)", schema.tables.len());
//!
//!     gateway.delete_database("shop_db", "shop_user").await?;
//!     gateway.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use std::time::Duration;
//! use tenant_db_gateway::GatewayConfig;
//!
//! let config = GatewayConfig::builder("root", "admin-password")
//!     .host("mysql.internal")                      // Default "localhost"
//!     .port(3306)                                  // Default 3306
//!     .statement_timeout(Duration::from_secs(30))  // Per statement deadline
//!     .build();
//! ```
//!
//! ## Limits of the query screen
//!
//! Screening is a substring and leading-keyword heuristic, not a SQL parser.
//! It blocks the obvious administrative statements but is not a complete
//! security boundary; tenant accounts should still hold grants on their own
//! database only.

pub mod admin;
pub mod config;
pub mod error;
pub mod gateway;
pub mod pool;
pub mod provision;
pub mod query;
pub mod schema;
pub mod sql;
pub mod types;

// Re-export main types for convenience
pub use admin::AdminConnection;
pub use config::{GatewayConfig, GatewayConfigBuilder, PoolLimits};
pub use error::{GatewayError, ProvisionStep, Result};
pub use gateway::DatabaseGateway;
pub use pool::{MySqlConnector, PoolConnector, TenantPool};
pub use provision::Provisioner;
pub use query::QueryGateway;
pub use schema::SchemaIntrospector;
pub use types::{ColumnSchema, DatabaseSchema, QueryResult, TableSchema, TenantCredential};

// Re-export SQL utilities for advanced users
pub use sql::classify::{QueryKind, classify, find_forbidden_command};
pub use sql::sanitize::{escape_literal, is_valid_identifier, validate_password};
