//! Shared SQLite schema/migration plumbing used by `infrastructure::catalog`.

pub mod schema;
