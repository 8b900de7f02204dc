//! `PipelineStage` family — spec §4.4's nine ordered stages, expressed as
//! one async trait per stage with a fixed, typed input/output pair.
//!
//! Each trait is the "pure contract"; `imgforge_core::infrastructure`
//! supplies the HTTP-calling implementations (generation/background-removal/
//! LLM providers) and `imgforge_core::application::services::pipeline_stages`
//! composes them. Domain code never calls a provider directly — only
//! through these traits — so `ImageProcessor` can be built and unit tested
//! against fakes without a network.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::StageFailure;
use crate::value_objects::settings::ConvertFormat;
use crate::value_objects::Settings;

/// Cooperative cancellation signal threaded into every stage call (spec
/// §5). Kept trait-object-safe and tokio-free so the domain crate does not
/// need to depend on an async runtime.
pub trait CancelSignal: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

/// One planned generation's parameters (spec §4.4 stage 1 Plan output).
#[derive(Debug, Clone)]
pub struct ParameterSet {
    pub mapping_id: i64,
    pub prompt: String,
    pub seed: Option<i64>,
    pub variations: u32,
    pub aspect_ratio: Option<String>,
}

#[async_trait]
pub trait PlanStage: Send + Sync {
    /// Spec §4.4 stage 1: "given `settings_snapshot`, produce a bounded
    /// sequence of parameter sets (one per generation)." Inputs include
    /// keyword file contents and prompt templates, read by the
    /// implementation from `settings.file_paths`.
    async fn plan(&self, settings: &Settings) -> Result<Vec<ParameterSet>, StageFailure>;
}

#[derive(Debug, Clone)]
pub struct GeneratedAsset {
    pub url: String,
}

#[async_trait]
pub trait GenerateStage: Send + Sync {
    /// Spec §4.4 stage 2: call the provider for one parameter set; return up
    /// to `variations` URLs, issuing one top-up request on a short count.
    async fn generate(
        &self,
        params: &ParameterSet,
        settings: &Settings,
        cancel: &dyn CancelSignal,
    ) -> Result<Vec<GeneratedAsset>, StageFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpg,
    Webp,
}

#[derive(Debug, Clone)]
pub struct DownloadedAsset {
    pub temp_path: PathBuf,
    pub format: ImageFormat,
}

#[async_trait]
pub trait DownloadStage: Send + Sync {
    /// Spec §4.4 stage 3: fetch to a temp file with per-byte and total
    /// timeouts, verifying magic bytes match the declared format.
    async fn download(
        &self,
        asset: &GeneratedAsset,
        temp_dir: &std::path::Path,
        file_stem: &str,
        cancel: &dyn CancelSignal,
    ) -> Result<DownloadedAsset, StageFailure>;
}

#[async_trait]
pub trait RemoveBackgroundStage: Send + Sync {
    /// Spec §4.4 stage 4. Retries 5xx with bounded exponential backoff up to
    /// a deadline derived from `pollingTimeout`; soft/hard policy is applied
    /// by the caller (`ImageProcessor`), not here — this trait only reports
    /// success or a typed failure.
    async fn remove_background(
        &self,
        input: &DownloadedAsset,
        settings: &Settings,
        cancel: &dyn CancelSignal,
    ) -> Result<DownloadedAsset, StageFailure>;
}

#[async_trait]
pub trait TrimTransparentStage: Send + Sync {
    /// Spec §4.4 stage 5: crop the opaque bounding box. Requires the image
    /// to already have an alpha channel (remove-bg succeeded).
    async fn trim_transparent(&self, input: &DownloadedAsset) -> Result<DownloadedAsset, StageFailure>;
}

#[async_trait]
pub trait EnhanceStage: Send + Sync {
    /// Spec §4.4 stage 6: sharpening in `[0,10]` (0 is a no-op), saturation
    /// in `[0,3]` (1.0 is a no-op). Both are pre-clamped by
    /// `services::validate_settings` before this is ever called.
    async fn enhance(&self, input: &DownloadedAsset, sharpening: f64, saturation: f64) -> Result<DownloadedAsset, StageFailure>;
}

#[async_trait]
pub trait ConvertStage: Send + Sync {
    /// Spec §4.4 stage 7: re-encode to the requested format with a quality
    /// setting, honoring `jpg_background` only when the caller has already
    /// resolved `removeBg ∧ convertToJpg` (see
    /// `Settings::effective_jpg_background`).
    async fn convert(
        &self,
        input: &DownloadedAsset,
        format: ConvertFormat,
        quality: u32,
        background: Option<&str>,
    ) -> Result<DownloadedAsset, StageFailure>;
}

#[derive(Debug, Clone)]
pub struct QcResult {
    pub passed: bool,
    pub reason: Option<String>,
}

#[async_trait]
pub trait QualityCheckStage: Send + Sync {
    /// Spec §4.4 stage 8: an LLM vision call returning `{passed, reason}`.
    async fn quality_check(
        &self,
        input: &DownloadedAsset,
        settings: &Settings,
        cancel: &dyn CancelSignal,
    ) -> Result<QcResult, StageFailure>;
}

#[derive(Debug, Clone)]
pub struct MetadataResult {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

#[async_trait]
pub trait MetadataStage: Send + Sync {
    /// Spec §4.4 stage 9: only called for images that passed QC (or skipped
    /// QC). A failure here never invalidates an otherwise-passed image —
    /// `ImageProcessor` records it as a warning, not a `StageFailure`.
    async fn generate_metadata(
        &self,
        input: &DownloadedAsset,
        settings: &Settings,
        cancel: &dyn CancelSignal,
    ) -> Result<MetadataResult, StageFailure>;
}
