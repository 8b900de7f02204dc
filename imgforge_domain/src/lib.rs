//! # imgforge Domain
//!
//! Pure business logic for the batch image-generation job/retry pipeline:
//! entities, value objects, the error taxonomy, domain events, and the
//! repository/vault/stage ports the infrastructure layer implements.
//!
//! This crate is independent of any I/O technology. It does not know about
//! SQLite, HTTP, or the filesystem beyond the `PathBuf` values it validates
//! the shape of; `imgforge_core` supplies the concrete adapters behind the
//! ports defined in [`ports`].
//!
//! ## Module structure
//!
//! - [`entities`] — `Configuration`, `Execution`, `GeneratedImage`, and the
//!   in-memory `JobAggregate` state machine that drives one run.
//! - [`value_objects`] — `MappingId`, `QcStatus`, `ExecutionStatus`,
//!   `WorkerCount`, and the `Settings` configuration document with its
//!   validation and clamping rules.
//! - [`error`] — `DomainError`, the single error taxonomy shared by every
//!   layer above this one.
//! - [`events`] — the topic and payload types published on the event bus.
//! - [`ports`] — `CatalogRepository`, `SecretsVault`, and `PipelineStage`,
//!   the async traits infrastructure implements.
//! - [`services`] — stateless domain services: settings validation and
//!   RFC3339 datetime compliance.

pub mod entities;
pub mod error;
pub mod events;
pub mod ports;
pub mod services;
pub mod value_objects;

pub use error::{CatalogErrorKind, DomainError, StageFailure, StageName};
pub use value_objects::WorkerCount;
