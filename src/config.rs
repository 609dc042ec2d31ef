//! Configuration for the gateway
//!
//! Provides a builder pattern for configuring the admin connection and the
//! per-tenant pools, plus an environment loader for process startup.

use std::fmt;
use std::time::Duration;

use crate::error::{GatewayError, Result};
use crate::sql::sanitize::validate_identifier;

/// Connection bounds applied to a sqlx pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    /// Maximum number of open connections
    pub max_connections: u32,
    /// Connections kept open even when idle
    pub min_connections: u32,
    /// Idle connections older than this are closed
    pub idle_timeout: Duration,
    /// Connections older than this are closed and replaced
    pub max_lifetime: Duration,
}

impl PoolLimits {
    /// Bounds for the shared administrative pool
    pub fn admin() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            idle_timeout: Duration::from_secs(10 * 60),
            max_lifetime: Duration::from_secs(60 * 60),
        }
    }

    /// Bounds for a single tenant's pool
    pub fn tenant() -> Self {
        Self {
            max_connections: 5,
            min_connections: 0,
            idle_timeout: Duration::from_secs(60),
            max_lifetime: Duration::from_secs(5 * 60),
        }
    }
}

/// Configuration for the gateway
#[derive(Clone)]
pub struct GatewayConfig {
    /// MySQL server host, shared by admin and tenant connections
    pub host: String,
    /// MySQL server port
    pub port: u16,
    /// Administrative user (needs CREATE USER and GRANT OPTION)
    pub admin_user: String,
    /// Administrative password
    pub admin_password: String,
    /// Bounds for the administrative pool
    pub admin_pool: PoolLimits,
    /// Bounds for every tenant pool
    pub tenant_pool: PoolLimits,
    /// Deadline for establishing and probing a connection
    pub connect_timeout: Duration,
    /// Deadline for a single statement or query
    pub statement_timeout: Duration,
    /// Character set for provisioned databases (default: "utf8mb4")
    pub charset: String,
    /// Collation for provisioned databases (default: "utf8mb4_unicode_ci")
    pub collation: String,
}

impl GatewayConfig {
    /// Create a new configuration builder
    pub fn builder(admin_user: impl Into<String>, admin_password: impl Into<String>) -> GatewayConfigBuilder {
        GatewayConfigBuilder::new(admin_user, admin_password)
    }

    /// Load configuration from `MYSQL_HOST`, `MYSQL_PORT`, `MYSQL_ADMIN_USER`
    /// and `MYSQL_ADMIN_PASSWORD`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let admin_user = lookup("MYSQL_ADMIN_USER").unwrap_or_else(|| "root".to_string());
        let admin_password = lookup("MYSQL_ADMIN_PASSWORD").unwrap_or_default();

        let mut builder = Self::builder(admin_user, admin_password);
        if let Some(host) = lookup("MYSQL_HOST") {
            builder = builder.host(host);
        }
        if let Some(port) = lookup("MYSQL_PORT") {
            let port = port.parse::<u16>().map_err(|_| {
                GatewayError::configuration(format!("MYSQL_PORT '{}' is not a valid port", port))
            })?;
            builder = builder.port(port);
        }

        Ok(builder.build())
    }

    /// Check the values that end up inside DDL text
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.charset, "charset")?;
        validate_identifier(&self.collation, "collation")?;
        Ok(())
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("admin_user", &self.admin_user)
            .field("admin_password", &"<redacted>")
            .field("admin_pool", &self.admin_pool)
            .field("tenant_pool", &self.tenant_pool)
            .field("connect_timeout", &self.connect_timeout)
            .field("statement_timeout", &self.statement_timeout)
            .field("charset", &self.charset)
            .field("collation", &self.collation)
            .finish()
    }
}

/// Builder for GatewayConfig
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    /// Create a new builder with the administrative credentials
    pub fn new(admin_user: impl Into<String>, admin_password: impl Into<String>) -> Self {
        Self {
            config: GatewayConfig {
                host: "localhost".to_string(),
                port: 3306,
                admin_user: admin_user.into(),
                admin_password: admin_password.into(),
                admin_pool: PoolLimits::admin(),
                tenant_pool: PoolLimits::tenant(),
                connect_timeout: Duration::from_secs(5),
                statement_timeout: Duration::from_secs(30),
                charset: "utf8mb4".to_string(),
                collation: "utf8mb4_unicode_ci".to_string(),
            },
        }
    }

    /// Set the server host (default: "localhost")
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the server port (default: 3306)
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn admin_pool(mut self, limits: PoolLimits) -> Self {
        self.config.admin_pool = limits;
        self
    }

    pub fn tenant_pool(mut self, limits: PoolLimits) -> Self {
        self.config.tenant_pool = limits;
        self
    }

    /// Set the connect/probe deadline (default: 5s)
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the per-statement deadline (default: 30s)
    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.config.statement_timeout = timeout;
        self
    }

    /// Set charset and collation used by `CREATE DATABASE`
    pub fn character_set(mut self, charset: impl Into<String>, collation: impl Into<String>) -> Self {
        self.config.charset = charset.into();
        self.config.collation = collation.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> GatewayConfig {
        self.config
    }
}

impl fmt::Debug for GatewayConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}
