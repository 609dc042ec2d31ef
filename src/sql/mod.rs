//! SQL utilities for the gateway
//!
//! Provides identifier/literal sanitization, DDL generation, and tenant query screening.

pub mod classify;
pub mod ddl;
pub mod sanitize;

pub use classify::{FORBIDDEN_COMMANDS, QueryKind, classify, find_forbidden_command};
pub use ddl::DdlGenerator;
pub use sanitize::{
    Identifier, MIN_PASSWORD_LEN, escape_literal, is_valid_identifier, quote_identifier,
    validate_identifier, validate_password,
};
