//! # Ecclesia Shared Library
//!
//! This crate contains the types, persistence and business rules shared by
//! the Ecclesia API server, the worker and the migration CLI.
//!
//! ## Module Organization
//!
//! - `db`: Connection pool and migration runner
//! - `models`: Database models (users, organizations, hierarchy, profile
//!   sections, events, campaigns, audit trails)
//! - `auth`: Passwords, tokens, the database-backed session store, the
//!   scope resolver and authorization rules
//! - `mail`: Outbound email transports and mail-merge templates
//! - `validation`: Field-level view of input validation failures

pub mod auth;
pub mod db;
pub mod mail;
pub mod models;
pub mod validation;

/// Current version of the Ecclesia shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
