//! Domain error taxonomy for imgforge.
//!
//! Mirrors the kinds called out by the design: configuration, per-stage,
//! per-image, catalog, external-service, and cancellation failures. These are
//! kinds, not wrapper types around a foreign error — each variant carries the
//! structured data a caller needs to decide whether to retry, record, or
//! surface the failure to a human.

mod domain_error;

pub use domain_error::{CatalogErrorKind, DomainError, StageFailure, StageName};
