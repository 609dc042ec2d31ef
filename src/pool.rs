//! Tenant connection pool cache
//!
//! One lazily built connection pool per tenant user, shared by every request
//! for that user until it is invalidated.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::Connection;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::{GatewayConfig, PoolLimits};
use crate::error::{GatewayError, Result, with_deadline};
use crate::types::TenantCredential;

/// Builds and tears down the handle cached for one tenant
#[async_trait]
pub trait PoolConnector: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    /// Open a handle for `credential` and verify it is live
    async fn connect(&self, credential: &TenantCredential) -> Result<Self::Handle>;

    /// Close a handle that is being evicted
    async fn close(&self, handle: &Self::Handle);
}

/// Opens a sqlx pool scoped to the tenant's single database
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    host: String,
    port: u16,
    limits: PoolLimits,
    connect_timeout: Duration,
}

impl MySqlConnector {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            limits: config.tenant_pool,
            connect_timeout: config.connect_timeout,
        }
    }
}

#[async_trait]
impl PoolConnector for MySqlConnector {
    type Handle = MySqlPool;

    async fn connect(&self, credential: &TenantCredential) -> Result<MySqlPool> {
        // Passed as discrete options, so the raw password needs no escaping.
        // Tenant sessions keep the server's own sql_mode and time zone.
        let options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&credential.user)
            .password(&credential.password)
            .database(&credential.database)
            .pipes_as_concat(false)
            .no_engine_substitution(false)
            .timezone(None::<String>);

        let pool = MySqlPoolOptions::new()
            .max_connections(self.limits.max_connections)
            .min_connections(self.limits.min_connections)
            .idle_timeout(self.limits.idle_timeout)
            .max_lifetime(self.limits.max_lifetime)
            .acquire_timeout(self.connect_timeout)
            .connect_lazy_with(options);

        let probe = with_deadline("tenant connection probe", self.connect_timeout, async {
            let mut conn = pool.acquire().await.map_err(|e| {
                GatewayError::connection(
                    format!(
                        "cannot connect to database '{}' as '{}'",
                        credential.database, credential.user
                    ),
                    e,
                )
            })?;
            conn.ping()
                .await
                .map_err(|e| GatewayError::connection("tenant ping failed", e))
        })
        .await;

        if let Err(err) = probe {
            pool.close().await;
            return Err(err);
        }

        info!(
            user = %credential.user,
            database = %credential.database,
            "opened tenant connection pool"
        );
        Ok(pool)
    }

    async fn close(&self, handle: &MySqlPool) {
        handle.close().await;
    }
}

/// Keyed cache of live tenant pools
///
/// Each user maps to a cell that is inserted atomically and initialized at
/// most once, so concurrent first requests for a user share one construction.
pub struct TenantPool<C: PoolConnector = MySqlConnector> {
    connector: C,
    entries: Mutex<HashMap<String, Arc<OnceCell<C::Handle>>>>,
}

impl<C: PoolConnector> TenantPool<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached handle for `credential.user`, building it on first use
    ///
    /// A cached handle is returned without a liveness probe; the underlying
    /// pool reconnects on its own. A failed build is not cached.
    pub async fn get_or_create(&self, credential: &TenantCredential) -> Result<C::Handle> {
        let cell = {
            let mut entries = self.entries.lock();
            Arc::clone(entries.entry(credential.user.clone()).or_default())
        };

        if let Some(handle) = cell.get() {
            debug!(user = %credential.user, "tenant pool hit");
            return Ok(handle.clone());
        }

        match cell
            .get_or_try_init(|| self.connector.connect(credential))
            .await
        {
            Ok(handle) => Ok(handle.clone()),
            Err(err) => {
                self.discard_empty(&credential.user, &cell);
                Err(err)
            }
        }
    }

    /// Remove and close the entry for `user`; returns false if none was live
    ///
    /// Closing waits for connections still checked out by in-flight queries.
    pub async fn invalidate(&self, user: &str) -> bool {
        let removed = self.entries.lock().remove(user);
        match removed.and_then(|cell| cell.get().cloned()) {
            Some(handle) => {
                self.connector.close(&handle).await;
                info!(user, "tenant connection pool invalidated");
                true
            }
            None => false,
        }
    }

    /// Close every cached entry
    pub async fn close_all(&self) {
        let drained: Vec<_> = self.entries.lock().drain().collect();
        for (user, cell) in drained {
            if let Some(handle) = cell.get() {
                self.connector.close(handle).await;
                debug!(user = %user, "tenant connection pool closed");
            }
        }
    }

    /// Whether a live entry exists for `user`
    pub fn contains(&self, user: &str) -> bool {
        self.entries
            .lock()
            .get(user)
            .is_some_and(|cell| cell.initialized())
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Drop the cell for `user` if it is still this (uninitialized) one
    fn discard_empty(&self, user: &str, cell: &Arc<OnceCell<C::Handle>>) {
        let mut entries = self.entries.lock();
        let stale = entries
            .get(user)
            .is_some_and(|current| Arc::ptr_eq(current, cell) && !current.initialized());
        if stale {
            entries.remove(user);
        }
    }
}
