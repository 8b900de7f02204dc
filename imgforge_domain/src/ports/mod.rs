//! Ports: the async traits infrastructure implements. Pure contracts —
//! everything in this module is an interface, never an implementation.
//!
//! - [`catalog_repository::CatalogRepository`] — C1, spec §4.1.
//! - [`secrets_vault::SecretsVault`] — C2, spec §4.2.
//! - `pipeline_stage` — the nine stage traits of C4, spec §4.4.

pub mod catalog_repository;
pub mod pipeline_stage;
pub mod secrets_vault;

pub use catalog_repository::CatalogRepository;
pub use pipeline_stage::{
    CancelSignal, ConvertStage, DownloadStage, DownloadedAsset, EnhanceStage, GenerateStage, GeneratedAsset,
    ImageFormat, MetadataResult, MetadataStage, ParameterSet, PlanStage, QcResult, QualityCheckStage,
    RemoveBackgroundStage, TrimTransparentStage,
};
pub use secrets_vault::{SecretsVault, SecurityLevel};
