//! SQL Identifier and Literal Sanitization Utilities
//!
//! MySQL DDL has no placeholder form for identifiers or for the
//! `IDENTIFIED BY` password literal. Identifiers are therefore gated by a
//! strict allow-list, and passwords are validated and then escaped for
//! embedding in a single-quoted literal.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{GatewayError, Result};

/// Minimum accepted password length, in bytes
pub const MIN_PASSWORD_LEN: usize = 6;

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("identifier pattern is valid"));

/// Check whether a database or user name is safe to interpolate into DDL
///
/// Only non-empty strings of ASCII letters, digits and underscores pass.
///
/// # Example
/// ```
/// use tenant_db_gateway::sql::is_valid_identifier;
///
/// assert!(is_valid_identifier("shop_db1"));
/// assert!(!is_valid_identifier("shop-db"));
/// assert!(!is_valid_identifier(""));
/// ```
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

/// Validate an identifier, naming its role (e.g. "database", "user") in the error
pub fn validate_identifier(name: &str, kind: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(GatewayError::invalid_identifier(format!(
            "{} name '{}' must be non-empty and contain only letters, numbers, and underscores",
            kind,
            name.escape_debug()
        )))
    }
}

/// A database or user name that has passed [`validate_identifier`]
///
/// DDL builders only accept this type, so an unchecked name cannot reach a
/// statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Validate `name` and wrap it
    pub fn parse(name: &str, kind: &str) -> Result<Self> {
        validate_identifier(name, kind)?;
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate a tenant password before it is embedded in a string literal
///
/// Rejects NUL bytes (which would truncate the literal server-side) and
/// passwords shorter than [`MIN_PASSWORD_LEN`].
pub fn validate_password(password: &str) -> Result<()> {
    if password.contains('\0') {
        return Err(GatewayError::invalid_password(
            "password contains invalid characters",
        ));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(GatewayError::invalid_password(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Escape a value for use inside a single-quoted MySQL string literal
///
/// Every `'` is doubled; nothing else changes. Backslashes are not escaped,
/// so statements carrying such a literal must run on a session with
/// `NO_BACKSLASH_ESCAPES` (the admin connection sets it on connect).
///
/// # Example
/// ```
/// use tenant_db_gateway::sql::escape_literal;
///
/// assert_eq!(escape_literal("it's"), "it''s");
/// ```
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Quote a server-reported identifier with backticks, doubling embedded backticks
///
/// Only for names the server itself returned (e.g. from `SHOW TABLES`).
/// Caller-supplied DDL names must pass [`validate_identifier`] instead.
pub fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}
