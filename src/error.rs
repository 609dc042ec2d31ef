//! Error types for gateway operations

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// A named step of a provisioning sequence, reported when that step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    CreateDatabase,
    CreateUser,
    GrantPrivileges,
    FlushPrivileges,
    DropDatabase,
    DropUser,
    AlterUser,
    MeasureSize,
}

impl ProvisionStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateDatabase => "create database",
            Self::CreateUser => "create user",
            Self::GrantPrivileges => "grant privileges",
            Self::FlushPrivileges => "flush privileges",
            Self::DropDatabase => "drop database",
            Self::DropUser => "drop user",
            Self::AlterUser => "update password",
            Self::MeasureSize => "measure database size",
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during gateway operations
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    #[error("Connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    #[error("{step} failed: {source}")]
    ProvisioningFailed {
        step: ProvisionStep,
        #[source]
        source: sqlx::Error,
    },

    #[error("Command not allowed: {0}")]
    CommandNotAllowed(String),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    pub fn invalid_identifier(msg: impl Into<String>) -> Self {
        Self::InvalidIdentifier(msg.into())
    }

    pub fn invalid_password(msg: impl Into<String>) -> Self {
        Self::InvalidPassword(msg.into())
    }

    pub fn connection(msg: impl Into<String>, source: sqlx::Error) -> Self {
        Self::ConnectionFailed {
            message: msg.into(),
            source: Some(source),
        }
    }

    pub fn provisioning(step: ProvisionStep, source: sqlx::Error) -> Self {
        Self::ProvisioningFailed { step, source }
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Wrap a failed admin statement, reporting an unusable connection as such
    pub(crate) fn admin_statement(step: ProvisionStep, source: sqlx::Error) -> Self {
        if is_connection_loss(&source) {
            Self::connection(format!("admin connection unavailable during {}", step), source)
        } else {
            Self::provisioning(step, source)
        }
    }

    /// Wrap a failed tenant statement, reporting an unusable connection as such
    pub(crate) fn tenant_statement(source: sqlx::Error) -> Self {
        if is_connection_loss(&source) {
            Self::connection("tenant connection unavailable", source)
        } else {
            Self::Query(source)
        }
    }

    /// True for errors raised by input validation, before any statement was issued
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdentifier(_) | Self::InvalidPassword(_) | Self::CommandNotAllowed(_)
        )
    }

    /// True when repeating the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors raised before the server ever saw the statement
fn is_connection_loss(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_)
    )
}

/// Bound a future by `limit`, mapping expiry to [`GatewayError::Timeout`].
///
/// Expiry drops the inner future, which releases any statement or cursor it holds.
pub(crate) async fn with_deadline<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::timeout(operation, limit)),
    }
}
