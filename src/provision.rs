//! Tenant database and user lifecycle
//!
//! Every statement runs serially against the shared admin connection. When a
//! multi-step create fails part-way, the undo actions owed for the steps that
//! already completed run newest first before the error is returned.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::{info, warn};

use crate::admin::AdminConnection;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, ProvisionStep, Result, with_deadline};
use crate::pool::{MySqlConnector, PoolConnector, TenantPool};
use crate::sql::ddl::{DATABASE_SIZE_SQL, DdlGenerator};
use crate::sql::sanitize::{Identifier, validate_password};

/// A compensating action for a completed forward step
#[derive(Debug, Clone, PartialEq, Eq)]
enum Undo {
    DropDatabase(Identifier),
    DropUser(Identifier),
}

/// Creates, rotates and removes tenant databases and users
pub struct Provisioner<C: PoolConnector = MySqlConnector> {
    admin: AdminConnection,
    pool: Arc<TenantPool<C>>,
    config: GatewayConfig,
}

impl<C: PoolConnector> Provisioner<C> {
    pub fn new(admin: AdminConnection, pool: Arc<TenantPool<C>>, config: GatewayConfig) -> Self {
        Self {
            admin,
            pool,
            config,
        }
    }

    /// Create a database and a user with full privileges on it
    ///
    /// Steps run in order: create database, create user, grant, flush. A
    /// failed user creation drops the database; a failed grant drops both.
    /// A failed flush is returned without rollback since the grant already
    /// took effect.
    pub async fn create_database(&self, database: &str, user: &str, password: &str) -> Result<()> {
        let database = Identifier::parse(database, "database")?;
        let user = Identifier::parse(user, "user")?;
        validate_password(password)?;
        self.config.validate()?;

        let ddl = DdlGenerator::new(&self.config);
        let steps = [
            (ProvisionStep::CreateDatabase, ddl.create_database(&database)),
            (ProvisionStep::CreateUser, ddl.create_user(&user, password)),
            (ProvisionStep::GrantPrivileges, ddl.grant_all(&database, &user)),
        ];

        for (step, sql) in steps {
            if let Err(err) = self.run(step, &sql).await {
                let plan = rollback_plan(step, &database, &user);
                warn!(
                    database = %database,
                    user = %user,
                    error = %err,
                    "{} failed, rolling back {} step(s)",
                    step,
                    plan.len()
                );
                self.compensate(plan).await;
                return Err(err);
            }
        }

        self.run(ProvisionStep::FlushPrivileges, ddl.flush_privileges())
            .await?;

        info!(database = %database, user = %user, "provisioned tenant database");
        Ok(())
    }

    /// Drop the database and user, closing any live pool for the user first
    ///
    /// Uses `IF EXISTS` forms, so deleting an absent tenant succeeds.
    pub async fn delete_database(&self, database: &str, user: &str) -> Result<()> {
        let database = Identifier::parse(database, "database")?;
        let user = Identifier::parse(user, "user")?;

        self.pool.invalidate(user.as_str()).await;

        let ddl = DdlGenerator::new(&self.config);
        self.run(ProvisionStep::DropDatabase, &ddl.drop_database(&database))
            .await?;
        self.run(ProvisionStep::DropUser, &ddl.drop_user(&user))
            .await?;
        self.flush_best_effort().await;

        info!(database = %database, user = %user, "deleted tenant database");
        Ok(())
    }

    /// Best-effort removal of a user and database; errors are logged, never returned
    ///
    /// Each name is validated on its own, so a bad database name does not
    /// prevent dropping a valid user.
    pub async fn revoke_access(&self, database: &str, user: &str) {
        let mut undo = Vec::new();
        match Identifier::parse(user, "user") {
            Ok(user) => undo.push(Undo::DropUser(user)),
            Err(err) => warn!(error = %err, "skipping user drop"),
        }
        match Identifier::parse(database, "database") {
            Ok(database) => undo.push(Undo::DropDatabase(database)),
            Err(err) => warn!(error = %err, "skipping database drop"),
        }
        self.compensate(undo).await;
    }

    /// Change the user's password and drop its cached pool
    pub async fn update_password(&self, user: &str, new_password: &str) -> Result<()> {
        let user = Identifier::parse(user, "user")?;
        validate_password(new_password)?;

        self.pool.invalidate(user.as_str()).await;

        let ddl = DdlGenerator::new(&self.config);
        self.run(
            ProvisionStep::AlterUser,
            &ddl.alter_user_password(&user, new_password),
        )
        .await?;
        self.flush_best_effort().await;

        info!(user = %user, "rotated tenant password");
        Ok(())
    }

    /// Data plus index size of a database in megabytes; 0 when it does not exist
    pub async fn database_size(&self, database: &str) -> Result<f64> {
        let database = Identifier::parse(database, "database")?;
        let step = ProvisionStep::MeasureSize;

        let size = with_deadline(step.as_str(), self.config.statement_timeout, async {
            sqlx::query_scalar::<_, Option<Decimal>>(DATABASE_SIZE_SQL)
                .bind(database.as_str())
                .fetch_one(self.admin.pool())
                .await
                .map_err(|e| GatewayError::admin_statement(step, e))
        })
        .await?;

        Ok(size.and_then(|mb| mb.to_f64()).unwrap_or(0.0))
    }

    async fn run(&self, step: ProvisionStep, sql: &str) -> Result<()> {
        with_deadline(step.as_str(), self.config.statement_timeout, async {
            sqlx::raw_sql(sql)
                .execute(self.admin.pool())
                .await
                .map(|_| ())
                .map_err(|e| GatewayError::admin_statement(step, e))
        })
        .await
    }

    /// Run undo actions in order, swallowing each failure
    async fn compensate(&self, undo: Vec<Undo>) {
        let ddl = DdlGenerator::new(&self.config);
        for action in undo {
            let (step, sql) = match &action {
                Undo::DropUser(user) => (ProvisionStep::DropUser, ddl.drop_user(user)),
                Undo::DropDatabase(database) => {
                    (ProvisionStep::DropDatabase, ddl.drop_database(database))
                }
            };
            if let Err(err) = self.run(step, &sql).await {
                warn!(error = %err, "compensating {} failed", step);
            }
        }
    }

    async fn flush_best_effort(&self) {
        let ddl = DdlGenerator::new(&self.config);
        if let Err(err) = self
            .run(ProvisionStep::FlushPrivileges, ddl.flush_privileges())
            .await
        {
            warn!(error = %err, "flush privileges failed");
        }
    }
}

/// Compensations owed when `failed` is the first create step that did not
/// complete, newest first
fn rollback_plan(failed: ProvisionStep, database: &Identifier, user: &Identifier) -> Vec<Undo> {
    let completed = [
        (ProvisionStep::CreateDatabase, Undo::DropDatabase(database.clone())),
        (ProvisionStep::CreateUser, Undo::DropUser(user.clone())),
    ];

    let mut undo: Vec<Undo> = completed
        .into_iter()
        .take_while(|(step, _)| *step != failed)
        .map(|(_, action)| action)
        .collect();
    undo.reverse();
    undo
}
