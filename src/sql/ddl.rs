//! DDL Generation for Tenant Provisioning
//!
//! Generates the MySQL administrative statements used to create, alter and
//! remove a tenant's database and user. Names arrive as [`Identifier`]s, so
//! they have already passed the allow-list; password literals are escaped here.

use crate::config::GatewayConfig;
use crate::sql::sanitize::{Identifier, escape_literal};

/// Host part used for every tenant account (connect from any host)
pub const TENANT_HOST: &str = "%";

/// Size of one database in megabytes, bound to the schema name as `?`
pub const DATABASE_SIZE_SQL: &str = "SELECT COALESCE(SUM(data_length + index_length), 0) / 1024 / 1024 \
     FROM information_schema.tables WHERE table_schema = ?";

/// DDL Generator for tenant databases and accounts
pub struct DdlGenerator<'a> {
    config: &'a GatewayConfig,
}

impl<'a> DdlGenerator<'a> {
    /// Create a new DDL generator with the given configuration
    pub fn new(config: &'a GatewayConfig) -> Self {
        Self { config }
    }

    /// `CREATE DATABASE` with the configured character set and collation
    ///
    /// Deliberately without `IF NOT EXISTS`: creating an existing tenant must fail.
    pub fn create_database(&self, database: &Identifier) -> String {
        format!(
            "CREATE DATABASE `{}` CHARACTER SET {} COLLATE {}",
            database, self.config.charset, self.config.collation
        )
    }

    pub fn create_user(&self, user: &Identifier, password: &str) -> String {
        format!(
            "CREATE USER '{}'@'{}' IDENTIFIED BY '{}'",
            user,
            TENANT_HOST,
            escape_literal(password)
        )
    }

    /// Grant every privilege on the tenant's database, and nothing outside it
    pub fn grant_all(&self, database: &Identifier, user: &Identifier) -> String {
        format!(
            "GRANT ALL PRIVILEGES ON `{}`.* TO '{}'@'{}'",
            database, user, TENANT_HOST
        )
    }

    pub fn alter_user_password(&self, user: &Identifier, password: &str) -> String {
        format!(
            "ALTER USER '{}'@'{}' IDENTIFIED BY '{}'",
            user,
            TENANT_HOST,
            escape_literal(password)
        )
    }

    pub fn drop_database(&self, database: &Identifier) -> String {
        format!("DROP DATABASE IF EXISTS `{}`", database)
    }

    pub fn drop_user(&self, user: &Identifier) -> String {
        format!("DROP USER IF EXISTS '{}'@'{}'", user, TENANT_HOST)
    }

    pub fn flush_privileges(&self) -> &'static str {
        "FLUSH PRIVILEGES"
    }
}
