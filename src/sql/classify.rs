//! Tenant query screening
//!
//! A coarse, substring-based screen over ad-hoc tenant SQL: a blocklist of
//! administrative commands and a leading-keyword read/write split. It is a
//! heuristic, not a parser, and does not see through obfuscation such as
//! commands hidden inside stored routines.

/// Administrative commands a tenant may never run, checked in this order
pub const FORBIDDEN_COMMANDS: &[&str] = &[
    "DROP DATABASE",
    "CREATE DATABASE",
    "GRANT",
    "REVOKE",
    "CREATE USER",
    "DROP USER",
    "ALTER USER",
    "FLUSH",
    "DROP SCHEMA",
    "CREATE SCHEMA",
];

/// Leading keywords whose statements produce a result set
pub const READ_KEYWORDS: &[&str] = &["SELECT", "SHOW", "DESCRIBE", "EXPLAIN"];

/// How a tenant query is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Returns rows; executed with a row fetch
    Read,
    /// Everything else; executed for rows affected
    Write,
}

/// Uppercase the query and collapse every whitespace run to a single space
fn normalize(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Return the first forbidden command found anywhere in `query`
pub fn find_forbidden_command(query: &str) -> Option<&'static str> {
    let normalized = normalize(query);
    FORBIDDEN_COMMANDS
        .iter()
        .copied()
        .find(|command| normalized.contains(command))
}

/// Classify a query by its leading keyword, ignoring case and surrounding whitespace
pub fn classify(query: &str) -> QueryKind {
    let upper = query.trim().to_uppercase();
    if READ_KEYWORDS.iter().any(|kw| upper.starts_with(kw)) {
        QueryKind::Read
    } else {
        QueryKind::Write
    }
}
