//! `GeneratedImage` — spec §3: one candidate image outcome.
//!
//! The retry-overwrite invariant ("retry output with the same `mapping_id`
//! overwrites the prior row's outcome fields atomically ... but preserves
//! `execution_id` and `created_at`") is enforced by `Catalog::updateImageByMapping`
//! in `imgforge_core`, not here; this type only models the shape and the
//! pure well-formedness check.

use serde::{Deserialize, Serialize};

use crate::value_objects::{MappingId, ProcessingSettings, QcStatus};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub id: i64,
    pub execution_id: Option<i64>,
    pub mapping_id: MappingId,
    pub prompt: String,
    pub seed: Option<i64>,
    pub qc_status: QcStatus,
    pub qc_reason: Option<String>,
    pub final_path: Option<String>,
    pub metadata: Option<ImageMetadata>,
    pub processing_settings: ProcessingSettings,
    pub created_at: String,
}

impl GeneratedImage {
    /// Spec §3 invariants:
    /// `qc_status=approved ⇒ final_path ≠ null`;
    /// `metadata ≠ null ⇒ qc_status ∈ {approved, retry_pending}`.
    pub fn is_well_formed(&self) -> bool {
        if self.qc_status.requires_final_path() && self.final_path.is_none() {
            return false;
        }
        if self.metadata.is_some() && !matches!(self.qc_status, QcStatus::Approved | QcStatus::RetryPending) {
            return false;
        }
        true
    }
}

/// Fields for inserting the first outcome row for one image (spec §4.5:
/// "exactly one `saveImage` ... per call").
#[derive(Debug, Clone)]
pub struct NewGeneratedImage {
    pub execution_id: Option<i64>,
    pub mapping_id: MappingId,
    pub prompt: String,
    pub seed: Option<i64>,
    pub qc_status: QcStatus,
    pub qc_reason: Option<String>,
    pub final_path: Option<String>,
    pub metadata: Option<ImageMetadata>,
    pub processing_settings: ProcessingSettings,
}

/// A partial update applied to an existing row by id (spec §4.1:
/// `updateImage(id, fields)`).
#[derive(Debug, Clone, Default)]
pub struct ImageUpdate {
    pub qc_status: Option<QcStatus>,
    pub qc_reason: Option<Option<String>>,
    pub final_path: Option<Option<String>>,
    pub metadata: Option<Option<ImageMetadata>>,
    pub processing_settings: Option<ProcessingSettings>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageFilter {
    pub execution_id: Option<i64>,
    pub qc_status: Option<QcStatus>,
}
