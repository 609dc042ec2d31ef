//! DatabaseGateway - Main entry point for tenant database management
//!
//! Owns the administrative connection and the tenant pool cache, and wires
//! them into the provisioning, query and schema services.

use std::sync::Arc;

use tracing::info;

use crate::admin::AdminConnection;
use crate::config::GatewayConfig;
use crate::error::Result;
use crate::pool::{MySqlConnector, TenantPool};
use crate::provision::Provisioner;
use crate::query::QueryGateway;
use crate::schema::SchemaIntrospector;
use crate::types::{DatabaseSchema, QueryResult, TenantCredential};

/// Multi-tenant MySQL provisioning and query gateway
///
/// Build one per process at startup with [`DatabaseGateway::connect`] and call
/// [`DatabaseGateway::shutdown`] when the process stops.
pub struct DatabaseGateway {
    admin: AdminConnection,
    pool: Arc<TenantPool>,
    provisioner: Provisioner,
    queries: QueryGateway,
    introspector: SchemaIntrospector,
    config: GatewayConfig,
}

impl DatabaseGateway {
    /// Connect the admin pool and build the gateway
    pub async fn connect(config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        let admin = AdminConnection::connect(&config).await?;
        Ok(Self::from_admin(admin, config))
    }

    /// Build the gateway around an existing admin connection
    pub fn from_admin(admin: AdminConnection, config: GatewayConfig) -> Self {
        let pool = Arc::new(TenantPool::new(MySqlConnector::new(&config)));
        let provisioner = Provisioner::new(admin.clone(), Arc::clone(&pool), config.clone());
        let queries = QueryGateway::new(Arc::clone(&pool), config.statement_timeout);
        let introspector = SchemaIntrospector::new(Arc::clone(&pool), config.statement_timeout);

        Self {
            admin,
            pool,
            provisioner,
            queries,
            introspector,
            config,
        }
    }

    pub fn admin(&self) -> &AdminConnection {
        &self.admin
    }

    /// Get a reference to the tenant pool cache
    pub fn tenant_pool(&self) -> &TenantPool {
        &self.pool
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    // =========================================================================
    // Provisioning
    // =========================================================================

    pub async fn create_database(&self, database: &str, user: &str, password: &str) -> Result<()> {
        self.provisioner
            .create_database(database, user, password)
            .await
    }

    pub async fn delete_database(&self, database: &str, user: &str) -> Result<()> {
        self.provisioner.delete_database(database, user).await
    }

    pub async fn revoke_access(&self, database: &str, user: &str) {
        self.provisioner.revoke_access(database, user).await
    }

    pub async fn update_password(&self, user: &str, new_password: &str) -> Result<()> {
        self.provisioner.update_password(user, new_password).await
    }

    /// Size of a tenant database in megabytes
    pub async fn database_size(&self, database: &str) -> Result<f64> {
        self.provisioner.database_size(database).await
    }

    // =========================================================================
    // Data Plane
    // =========================================================================

    pub async fn execute_query(
        &self,
        credential: &TenantCredential,
        query: &str,
    ) -> Result<QueryResult> {
        self.queries.execute(credential, query).await
    }

    pub async fn get_schema(&self, credential: &TenantCredential) -> Result<DatabaseSchema> {
        self.introspector.get_schema(credential).await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close every tenant pool, then the admin connection
    pub async fn shutdown(&self) {
        self.pool.close_all().await;
        self.admin.close().await;
        info!("database gateway shut down");
    }
}
