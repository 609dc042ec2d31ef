//! Integration tests for tenant-db-gateway
//!
//! These tests require a running MySQL server and an account allowed to
//! create databases and users. Set `TEST_MYSQL_HOST` to run them.
//!
//! Example:
//! ```bash
//! TEST_MYSQL_HOST=127.0.0.1 TEST_MYSQL_PORT=3306 \
//! TEST_MYSQL_ADMIN_USER=root TEST_MYSQL_ADMIN_PASSWORD=secret \
//!   cargo test -p tenant-db-gateway --test integration
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sqlx::Row;
use tenant_db_gateway::{
    DatabaseGateway, GatewayConfig, GatewayError, ProvisionStep, TenantCredential,
};

/// Get a unique tenant name for this test run
fn test_prefix() -> String {
    format!(
        "t_{}",
        uuid::Uuid::new_v4().to_string().replace("-", "_")[..8].to_lowercase()
    )
}

/// Build the configuration from the environment
fn test_config() -> Option<GatewayConfig> {
    let host = std::env::var("TEST_MYSQL_HOST").ok()?;
    let port = std::env::var("TEST_MYSQL_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3306);
    let user = std::env::var("TEST_MYSQL_ADMIN_USER").unwrap_or_else(|_| "root".to_string());
    let password = std::env::var("TEST_MYSQL_ADMIN_PASSWORD").unwrap_or_default();

    Some(
        GatewayConfig::builder(user, password)
            .host(host)
            .port(port)
            .statement_timeout(Duration::from_secs(20))
            .build(),
    )
}

async fn create_test_gateway() -> Option<(DatabaseGateway, String)> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let gateway = DatabaseGateway::connect(test_config()?).await.ok()?;
    Some((gateway, test_prefix()))
}

/// Provision `<prefix>_db` / `<prefix>_user` and return its credential
async fn provision(gateway: &DatabaseGateway, prefix: &str) -> TenantCredential {
    let cred = TenantCredential::new(
        format!("{}_db", prefix),
        format!("{}_user", prefix),
        "initial'pw\\1",
    );
    gateway
        .create_database(&cred.database, &cred.user, &cred.password)
        .await
        .expect("Should provision tenant");
    cred
}

async fn database_exists(gateway: &DatabaseGateway, name: &str) -> bool {
    let row = sqlx::query(
        "SELECT COUNT(*) AS n FROM information_schema.schemata WHERE schema_name = ?",
    )
    .bind(name)
    .fetch_one(gateway.admin().pool())
    .await
    .expect("Should query schemata");
    row.get::<i64, _>("n") > 0
}

async fn user_exists(gateway: &DatabaseGateway, name: &str) -> bool {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM mysql.user WHERE user = ?")
        .bind(name)
        .fetch_one(gateway.admin().pool())
        .await
        .expect("Should query mysql.user");
    row.get::<i64, _>("n") > 0
}

async fn cleanup(gateway: &DatabaseGateway, cred: &TenantCredential) {
    let _ = gateway.delete_database(&cred.database, &cred.user).await;
}

// ==================== Provisioning Tests ====================

#[tokio::test]
async fn test_create_then_delete_leaves_nothing() {
    let Some((gateway, prefix)) = create_test_gateway().await else {
        eprintln!("Skipping test: TEST_MYSQL_HOST not set");
        return;
    };

    let cred = provision(&gateway, &prefix).await;
    assert!(database_exists(&gateway, &cred.database).await);
    assert!(user_exists(&gateway, &cred.user).await);

    gateway
        .execute_query(&cred, "SELECT 1")
        .await
        .expect("Tenant should be able to query");
    assert!(gateway.tenant_pool().contains(&cred.user));

    gateway
        .delete_database(&cred.database, &cred.user)
        .await
        .expect("Should delete tenant");
    assert!(!gateway.tenant_pool().contains(&cred.user));
    assert!(!database_exists(&gateway, &cred.database).await);
    assert!(!user_exists(&gateway, &cred.user).await);

    gateway
        .delete_database(&cred.database, &cred.user)
        .await
        .expect("Second delete should also succeed");
}

#[tokio::test]
async fn test_create_existing_tenant_fails() {
    let Some((gateway, prefix)) = create_test_gateway().await else {
        eprintln!("Skipping test: TEST_MYSQL_HOST not set");
        return;
    };

    let cred = provision(&gateway, &prefix).await;

    let err = gateway
        .create_database(&cred.database, &cred.user, &cred.password)
        .await
        .unwrap_err();
    match err {
        GatewayError::ProvisioningFailed { step, .. } => {
            assert_eq!(step, ProvisionStep::CreateDatabase)
        }
        other => panic!("expected ProvisioningFailed, got {other:?}"),
    }

    // The failed first step must not have rolled back the existing tenant.
    assert!(database_exists(&gateway, &cred.database).await);

    cleanup(&gateway, &cred).await;
}

#[tokio::test]
async fn test_failed_user_creation_drops_database() {
    let Some((gateway, prefix)) = create_test_gateway().await else {
        eprintln!("Skipping test: TEST_MYSQL_HOST not set");
        return;
    };

    // Occupy the user name so step 2 fails after step 1 succeeded.
    let existing = provision(&gateway, &prefix).await;
    let second_db = format!("{}_other", prefix);

    let err = gateway
        .create_database(&second_db, &existing.user, "another-pw")
        .await
        .unwrap_err();
    match err {
        GatewayError::ProvisioningFailed { step, .. } => assert_eq!(step, ProvisionStep::CreateUser),
        other => panic!("expected ProvisioningFailed, got {other:?}"),
    }

    assert!(!database_exists(&gateway, &second_db).await);
    assert!(user_exists(&gateway, &existing.user).await);

    cleanup(&gateway, &existing).await;
}

#[tokio::test]
async fn test_revoke_access_removes_both() {
    let Some((gateway, prefix)) = create_test_gateway().await else {
        eprintln!("Skipping test: TEST_MYSQL_HOST not set");
        return;
    };

    let cred = provision(&gateway, &prefix).await;
    gateway.revoke_access(&cred.database, &cred.user).await;

    assert!(!database_exists(&gateway, &cred.database).await);
    assert!(!user_exists(&gateway, &cred.user).await);
}

#[tokio::test]
async fn test_database_size() {
    let Some((gateway, prefix)) = create_test_gateway().await else {
        eprintln!("Skipping test: TEST_MYSQL_HOST not set");
        return;
    };

    let cred = provision(&gateway, &prefix).await;
    gateway
        .execute_query(&cred, "CREATE TABLE blobs (id INT PRIMARY KEY, body TEXT)")
        .await
        .expect("Should create table");

    let size = gateway
        .database_size(&cred.database)
        .await
        .expect("Should measure size");
    assert!(size >= 0.0);

    let missing = gateway
        .database_size(&format!("{}_missing", prefix))
        .await
        .expect("Missing database should measure zero");
    assert_eq!(missing, 0.0);

    cleanup(&gateway, &cred).await;
}

// ==================== Query Tests ====================

#[tokio::test]
async fn test_select_one() {
    let Some((gateway, prefix)) = create_test_gateway().await else {
        eprintln!("Skipping test: TEST_MYSQL_HOST not set");
        return;
    };

    let cred = provision(&gateway, &prefix).await;
    let result = gateway
        .execute_query(&cred, "SELECT 1")
        .await
        .expect("Should run SELECT 1");

    assert_eq!(result.columns.len(), 1);
    assert_eq!(result.rows, vec![vec![json!(1)]]);
    assert_eq!(result.message, "1 rows returned");

    cleanup(&gateway, &cred).await;
}

#[tokio::test]
async fn test_write_and_read_back() {
    let Some((gateway, prefix)) = create_test_gateway().await else {
        eprintln!("Skipping test: TEST_MYSQL_HOST not set");
        return;
    };

    let cred = provision(&gateway, &prefix).await;

    gateway
        .execute_query(
            &cred,
            "CREATE TABLE t (id INT PRIMARY KEY, x INT, label VARCHAR(32), raw VARBINARY(16), price DECIMAL(8,2), at DATETIME NULL)",
        )
        .await
        .expect("Should create table");

    let update = gateway
        .execute_query(&cred, "UPDATE t SET x=1")
        .await
        .expect("Should run update");
    assert_eq!(update.message, "0 rows affected");
    assert_eq!(update.columns, vec!["Result"]);

    let insert = gateway
        .execute_query(
            &cred,
            "INSERT INTO t VALUES (1, 10, 'a', 'bytes', 9.50, NULL), (2, 20, 'b', 'more', 1.25, '2024-05-01 10:00:00')",
        )
        .await
        .expect("Should insert");
    assert_eq!(insert.message, "2 rows affected");

    let select = gateway
        .execute_query(&cred, "  select id, label, raw, price, at from t order by id")
        .await
        .expect("Should select");
    assert_eq!(select.columns, vec!["id", "label", "raw", "price", "at"]);
    assert_eq!(select.message, "2 rows returned");
    assert_eq!(select.skipped_rows, 0);
    assert_eq!(
        select.rows[0],
        vec![json!(1), json!("a"), json!("bytes"), json!("9.50"), json!(null)]
    );
    assert_eq!(select.rows[1][4], json!("2024-05-01 10:00:00"));
    assert!(select.rows.iter().all(|row| row.len() == select.columns.len()));

    let empty = gateway
        .execute_query(&cred, "SELECT id, label FROM t WHERE id > 100")
        .await
        .expect("Should select nothing");
    assert_eq!(empty.message, "0 rows returned");
    assert_eq!(empty.columns, vec!["id", "label"]);

    cleanup(&gateway, &cred).await;
}

#[tokio::test]
async fn test_tinyint_one_keeps_stored_values() {
    let Some((gateway, prefix)) = create_test_gateway().await else {
        eprintln!("Skipping test: TEST_MYSQL_HOST not set");
        return;
    };

    let cred = provision(&gateway, &prefix).await;
    gateway
        .execute_query(
            &cred,
            "CREATE TABLE flags (id INT PRIMARY KEY, signed_flag TINYINT(1), unsigned_flag TINYINT(1) UNSIGNED)",
        )
        .await
        .expect("Should create table");
    gateway
        .execute_query(&cred, "INSERT INTO flags VALUES (1, 5, 200), (2, -3, 0), (3, 1, 1)")
        .await
        .expect("Should insert");

    let select = gateway
        .execute_query(&cred, "SELECT signed_flag, unsigned_flag FROM flags ORDER BY id")
        .await
        .expect("Should select");
    assert_eq!(select.skipped_rows, 0);
    assert_eq!(
        select.rows,
        vec![
            vec![json!(5), json!(200)],
            vec![json!(-3), json!(0)],
            vec![json!(1), json!(1)],
        ]
    );

    cleanup(&gateway, &cred).await;
}

#[tokio::test]
async fn test_session_keeps_server_sql_mode() {
    let Some((gateway, prefix)) = create_test_gateway().await else {
        eprintln!("Skipping test: TEST_MYSQL_HOST not set");
        return;
    };

    let cred = provision(&gateway, &prefix).await;
    let result = gateway
        .execute_query(&cred, "SELECT 1 || 0")
        .await
        .expect("Should evaluate ||");
    assert_eq!(result.rows, vec![vec![json!(1)]]);

    let tz = gateway
        .execute_query(&cred, "SELECT @@session.time_zone = @@global.time_zone")
        .await
        .expect("Should read time zone");
    assert_eq!(tz.rows, vec![vec![json!(1)]]);

    cleanup(&gateway, &cred).await;
}

#[tokio::test]
async fn test_multi_statement_returns_first_result_set() {
    let Some((gateway, prefix)) = create_test_gateway().await else {
        eprintln!("Skipping test: TEST_MYSQL_HOST not set");
        return;
    };

    let cred = provision(&gateway, &prefix).await;
    let result = gateway
        .execute_query(&cred, "SELECT 1 AS n; SELECT 2 AS n UNION ALL SELECT 3")
        .await
        .expect("Should run both statements");
    assert_eq!(result.columns, vec!["n"]);
    assert_eq!(result.rows, vec![vec![json!(1)]]);
    assert_eq!(result.skipped_rows, 2);
    assert_eq!(result.message, "1 rows returned");

    cleanup(&gateway, &cred).await;
}

#[tokio::test]
async fn test_forbidden_command_rejected() {
    let Some((gateway, prefix)) = create_test_gateway().await else {
        eprintln!("Skipping test: TEST_MYSQL_HOST not set");
        return;
    };

    let cred = provision(&gateway, &prefix).await;
    let err = gateway
        .execute_query(&cred, "SELECT 1; /* x */ Drop Database mysql")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::CommandNotAllowed(ref c) if c == "DROP DATABASE"));

    cleanup(&gateway, &cred).await;
}

#[tokio::test]
async fn test_query_error_is_typed() {
    let Some((gateway, prefix)) = create_test_gateway().await else {
        eprintln!("Skipping test: TEST_MYSQL_HOST not set");
        return;
    };

    let cred = provision(&gateway, &prefix).await;
    let err = gateway
        .execute_query(&cred, "SELECT * FROM no_such_table")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Query(_)));

    cleanup(&gateway, &cred).await;
}

#[tokio::test]
async fn test_password_rotation_invalidates_pool() {
    let Some((gateway, prefix)) = create_test_gateway().await else {
        eprintln!("Skipping test: TEST_MYSQL_HOST not set");
        return;
    };

    let cred = provision(&gateway, &prefix).await;
    gateway
        .execute_query(&cred, "SELECT 1")
        .await
        .expect("Should query with initial password");

    gateway
        .update_password(&cred.user, "rotated-pw")
        .await
        .expect("Should rotate password");
    assert!(!gateway.tenant_pool().contains(&cred.user));

    let err = gateway.execute_query(&cred, "SELECT 1").await.unwrap_err();
    assert!(matches!(err, GatewayError::ConnectionFailed { .. }));

    let rotated = TenantCredential::new(&cred.database, &cred.user, "rotated-pw");
    gateway
        .execute_query(&rotated, "SELECT 1")
        .await
        .expect("Should query with new password");

    cleanup(&gateway, &rotated).await;
}

// ==================== Pool Tests ====================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_queries_share_one_pool() {
    let Some((gateway, prefix)) = create_test_gateway().await else {
        eprintln!("Skipping test: TEST_MYSQL_HOST not set");
        return;
    };

    let gateway = Arc::new(gateway);
    let cred = provision(&gateway, &prefix).await;

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let gateway = Arc::clone(&gateway);
            let cred = cred.clone();
            tokio::spawn(async move { gateway.execute_query(&cred, "SELECT 1").await })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().expect("Every concurrent query should succeed");
    }
    assert_eq!(gateway.tenant_pool().len(), 1);

    cleanup(&gateway, &cred).await;
}

// ==================== Schema Tests ====================

#[tokio::test]
async fn test_get_schema() {
    let Some((gateway, prefix)) = create_test_gateway().await else {
        eprintln!("Skipping test: TEST_MYSQL_HOST not set");
        return;
    };

    let cred = provision(&gateway, &prefix).await;
    gateway
        .execute_query(&cred, "CREATE TABLE customers (id INT PRIMARY KEY, email VARCHAR(255))")
        .await
        .expect("Should create customers");
    gateway
        .execute_query(&cred, "CREATE TABLE `odd name` (note TEXT)")
        .await
        .expect("Should create odd table");

    let schema = gateway.get_schema(&cred).await.expect("Should read schema");
    assert!(schema.skipped_tables.is_empty());
    assert_eq!(schema.tables.len(), 2);

    let customers = schema
        .tables
        .iter()
        .find(|t| t.name == "customers")
        .expect("customers table");
    assert_eq!(customers.columns[0].name, "id");
    assert_eq!(customers.columns[0].column_type, "int");
    assert_eq!(customers.columns[1].name, "email");
    assert_eq!(customers.columns[1].column_type, "varchar(255)");

    let odd = schema
        .tables
        .iter()
        .find(|t| t.name == "odd name")
        .expect("quoted table");
    assert_eq!(odd.columns[0].name, "note");

    cleanup(&gateway, &cred).await;
}

#[tokio::test]
async fn test_get_schema_skips_broken_view() {
    let Some((gateway, prefix)) = create_test_gateway().await else {
        eprintln!("Skipping test: TEST_MYSQL_HOST not set");
        return;
    };

    let cred = provision(&gateway, &prefix).await;
    for statement in [
        "CREATE TABLE kept (id INT)",
        "CREATE TABLE a (x INT)",
        "CREATE VIEW v AS SELECT x FROM a",
        "DROP TABLE a",
    ] {
        gateway
            .execute_query(&cred, statement)
            .await
            .unwrap_or_else(|e| panic!("{statement}: {e}"));
    }

    let schema = gateway.get_schema(&cred).await.expect("Should read schema");
    assert_eq!(schema.skipped_tables, vec!["v"]);
    assert_eq!(schema.tables.len(), 1);
    assert_eq!(schema.tables[0].name, "kept");
    assert_eq!(schema.tables[0].columns[0].name, "id");

    cleanup(&gateway, &cred).await;
}
