//! # Database Schema
//!
//! ```text
//! ┌─────────────────────────────────┐    ┌─────────────────┐
//! │              kv                 │    │ schema_version  │
//! ├─────────────────────────────────┤    ├─────────────────┤
//! │ key        TEXT PRIMARY KEY     │    │ version         │
//! │ value      TEXT (JSON)          │    └─────────────────┘
//! │ updated_at INTEGER (unix secs)  │
//! └─────────────────────────────────┘
//! ```

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Fresh database layout
pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;
