//! # Catalog
//!
//! Durable storage and query for Configurations, Executions, and
//! GeneratedImages (spec §4.1), plus the row store backing the tier-2/3
//! `SecretsVault` rows (spec §4.2). `SqliteCatalog` is the sole production
//! implementation; `InMemoryCatalog` is a test fake satisfying the same
//! `CatalogRepository` port.

mod in_memory;
mod row_mappers;
mod sqlite_catalog;

pub use in_memory::InMemoryCatalog;
pub use sqlite_catalog::SqliteCatalog;
