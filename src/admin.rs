//! Process-wide administrative connection
//!
//! Created once at startup and closed at shutdown; every provisioning
//! statement runs through it.

use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::{Connection, Executor};
use tracing::info;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result, with_deadline};

/// Password literals are escaped by quote doubling only, so the admin
/// session must not treat backslash as an escape character.
const SESSION_SQL_MODE: &str =
    "SET SESSION sql_mode = CONCAT(@@SESSION.sql_mode, ',NO_BACKSLASH_ESCAPES')";

/// Shared pool holding elevated credentials, connected without a default database
#[derive(Clone)]
pub struct AdminConnection {
    pool: MySqlPool,
}

impl AdminConnection {
    /// Connect to the server and verify it answers a ping within the connect timeout
    pub async fn connect(config: &GatewayConfig) -> Result<Self> {
        let admin = Self::connect_lazy(config);
        if let Err(err) = admin.ping(config.connect_timeout).await {
            admin.pool.close().await;
            return Err(err);
        }

        info!(
            host = %config.host,
            port = config.port,
            user = %config.admin_user,
            "connected to MySQL server as admin"
        );
        Ok(admin)
    }

    /// Build the pool without opening a connection yet
    pub fn connect_lazy(config: &GatewayConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.admin_user)
            .password(&config.admin_password);

        let limits = config.admin_pool;
        let pool = MySqlPoolOptions::new()
            .max_connections(limits.max_connections)
            .min_connections(limits.min_connections)
            .idle_timeout(limits.idle_timeout)
            .max_lifetime(limits.max_lifetime)
            .acquire_timeout(config.connect_timeout)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute(SESSION_SQL_MODE).await?;
                    Ok(())
                })
            })
            .connect_lazy_with(options);

        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Check out a connection and ping the server
    pub async fn ping(&self, timeout: Duration) -> Result<()> {
        with_deadline("admin ping", timeout, async {
            let mut conn = self
                .pool
                .acquire()
                .await
                .map_err(|e| GatewayError::connection("admin connection unavailable", e))?;
            conn.ping()
                .await
                .map_err(|e| GatewayError::connection("admin ping failed", e))
        })
        .await
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Close the pool, waiting for checked-out connections to be returned
    pub async fn close(&self) {
        self.pool.close().await;
        info!("MySQL admin connection closed");
    }
}
