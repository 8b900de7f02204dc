//! `ImageProcessor` — spec §4.5. Runs the ordered, non-Plan/Generate
//! stages (download through metadata) for one already-generated candidate
//! image, enforces each stage's soft/hard failure policy, and produces
//! exactly one persisted outcome.
//!
//! Generate itself is *not* owned here: one `GenerateStage` call yields up
//! to `variations` URLs shared across several candidate images, so
//! `JobRunner`/`RetryExecutor` call it once per `ParameterSet` and hand each
//! resulting [`GeneratedAsset`] to its own `ImageProcessor::process` call —
//! matching the "exactly one `saveImage`/`updateImageByMapping` per call"
//! guarantee to "one call produces one row", grounded on the teacher's
//! per-file pipeline-stage composition in its own processing orchestrator.

use std::sync::Arc;

use imgforge_domain::entities::{ImageMetadata as DomainImageMetadata, ImageUpdate, NewGeneratedImage};
use imgforge_domain::error::{DomainError, StageFailure, StageName};
use imgforge_domain::events::{EventContext, ImageSettledEvent};
use imgforge_domain::ports::{
    CancelSignal, CatalogRepository, ConvertStage, DownloadStage, DownloadedAsset, EnhanceStage, GeneratedAsset,
    MetadataStage, QualityCheckStage, RemoveBackgroundStage, TrimTransparentStage,
};
use imgforge_domain::services::now_iso8601;
use imgforge_domain::value_objects::settings::{ConvertFormat, FailureMode};
use imgforge_domain::value_objects::{MappingId, ProcessingSettings, QcStatus, Settings};

use crate::application::services::event_bus::EventBus;
use crate::application::services::retry_policy::with_busy_retry;
use crate::infrastructure::metrics::JobMetrics;
use crate::infrastructure::runtime::TempArtifact;

/// Whether the settled outcome is a fresh row or an overwrite of an
/// existing one by `(execution_id, mapping_id)` — spec's retry-overwrite
/// invariant on `GeneratedImage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistMode {
    Insert,
    Overwrite,
}

/// Everything that identifies *which* image this call is settling, as
/// distinct from the pipeline `Settings`/`ProcessingSettings` governing
/// *how* it's processed.
pub struct PipelineContext {
    pub execution_id: i64,
    pub mapping_id: MappingId,
    pub prompt: String,
    pub seed: Option<i64>,
    pub event_context: EventContext,
    pub persist_mode: PersistMode,
}

#[derive(Debug, Clone)]
pub struct ImageOutcome {
    pub final_path: Option<String>,
    pub qc_status: QcStatus,
    pub qc_reason: Option<String>,
    pub metadata: Option<DomainImageMetadata>,
    pub processing_settings: ProcessingSettings,
    pub failed_stage: Option<StageName>,
}

impl ImageOutcome {
    fn is_pipeline_failure(&self) -> bool {
        self.final_path.is_none()
    }
}

/// Composes the seven candidate-image stages (download through metadata)
/// behind one `process` entry point, grounded on `TempArtifact` for
/// cross-stage temp-file lifecycle and `EventBus::publish_image_settled`
/// for the one-event-per-call guarantee.
pub struct ImageProcessor {
    download: Arc<dyn DownloadStage>,
    remove_background: Arc<dyn RemoveBackgroundStage>,
    trim_transparent: Arc<dyn TrimTransparentStage>,
    enhance: Arc<dyn EnhanceStage>,
    convert: Arc<dyn ConvertStage>,
    quality_check: Arc<dyn QualityCheckStage>,
    metadata: Arc<dyn MetadataStage>,
    catalog: Arc<dyn CatalogRepository>,
    events: EventBus,
    metrics: Arc<JobMetrics>,
}

impl ImageProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        download: Arc<dyn DownloadStage>,
        remove_background: Arc<dyn RemoveBackgroundStage>,
        trim_transparent: Arc<dyn TrimTransparentStage>,
        enhance: Arc<dyn EnhanceStage>,
        convert: Arc<dyn ConvertStage>,
        quality_check: Arc<dyn QualityCheckStage>,
        metadata: Arc<dyn MetadataStage>,
        catalog: Arc<dyn CatalogRepository>,
        events: EventBus,
        metrics: Arc<JobMetrics>,
    ) -> Self {
        Self {
            download,
            remove_background,
            trim_transparent,
            enhance,
            convert,
            quality_check,
            metadata,
            catalog,
            events,
            metrics,
        }
    }

    /// Runs the pipeline for one candidate image and persists exactly one
    /// outcome row. Never returns `Err` for a pipeline-internal failure —
    /// those are folded into `ImageOutcome`; `Err` is reserved for the
    /// catalog write itself failing after the busy-retry budget (a genuine
    /// infrastructure fault the caller must surface).
    pub async fn process(
        &self,
        ctx: &PipelineContext,
        asset: &GeneratedAsset,
        settings: &Settings,
        processing_settings: ProcessingSettings,
        cancel: Arc<dyn CancelSignal>,
    ) -> Result<ImageOutcome, DomainError> {
        let outcome = self.run_pipeline(ctx, asset, settings, processing_settings, cancel.as_ref()).await;
        self.persist(ctx, &outcome).await?;
        self.publish_settled(ctx, &outcome);
        Ok(outcome)
    }

    /// Re-enters the pipeline from an already-downloaded file rather than a
    /// fresh provider URL — `RetryExecutor`'s `RetryJob` carries an
    /// `imageId`, not a source URL (spec §4.7 step 3 calls this
    /// `ImageProcessor.process`, but Download has nothing to fetch on a
    /// retry), so the existing `final_path` is copied into a fresh
    /// `TempArtifact` and handed straight to the post-Download stages.
    pub async fn process_retry(
        &self,
        ctx: &PipelineContext,
        source_path: &std::path::Path,
        format: imgforge_domain::ports::ImageFormat,
        settings: &Settings,
        processing_settings: ProcessingSettings,
        cancel: Arc<dyn CancelSignal>,
    ) -> Result<ImageOutcome, DomainError> {
        let file_stem = format!("{}_{}_retry", ctx.execution_id, ctx.mapping_id.0);
        let ext = match format {
            imgforge_domain::ports::ImageFormat::Png => "png",
            imgforge_domain::ports::ImageFormat::Jpg => "jpg",
            imgforge_domain::ports::ImageFormat::Webp => "webp",
        };
        let working_copy = settings.file_paths.temp_directory.join(format!("{file_stem}.{ext}"));
        let outcome = match std::fs::copy(source_path, &working_copy) {
            Ok(_) => {
                let buffer = TempArtifact::new(working_copy.clone());
                let current = DownloadedAsset { temp_path: working_copy, format };
                self.run_from_downloaded(ctx, settings, processing_settings, current, buffer, cancel.as_ref()).await
            }
            Err(err) => self.hard_failure(
                StageFailure::new(StageName::Download, format!("reading prior final_path for retry: {err}")),
                processing_settings,
            ),
        };
        self.persist(ctx, &outcome).await?;
        self.publish_settled(ctx, &outcome);
        Ok(outcome)
    }

    async fn run_pipeline(
        &self,
        ctx: &PipelineContext,
        asset: &GeneratedAsset,
        settings: &Settings,
        processing_settings: ProcessingSettings,
        cancel: &dyn CancelSignal,
    ) -> ImageOutcome {
        let temp_dir = &settings.file_paths.temp_directory;
        let file_stem = format!("{}_{}", ctx.execution_id, ctx.mapping_id.0);

        if cancel.is_cancelled() {
            return ImageOutcome {
                final_path: None,
                qc_status: QcStatus::QcFailed,
                qc_reason: Some("cancelled".to_string()),
                metadata: None,
                processing_settings,
                failed_stage: Some(StageName::Download),
            };
        }
        let downloaded = match self.download.download(asset, temp_dir, &file_stem, cancel).await {
            Ok(d) => d,
            Err(failure) => return self.hard_failure(failure, processing_settings),
        };
        let buffer = TempArtifact::new(downloaded.temp_path.clone());
        self.run_from_downloaded(ctx, settings, processing_settings, downloaded, buffer, cancel).await
    }

    /// The shared tail of the pipeline (RemoveBackground through Metadata),
    /// entered either with a freshly downloaded candidate ([`run_pipeline`])
    /// or a retry's copied `final_path` ([`process_retry`]).
    async fn run_from_downloaded(
        &self,
        ctx: &PipelineContext,
        settings: &Settings,
        mut processing_settings: ProcessingSettings,
        mut current: DownloadedAsset,
        mut buffer: TempArtifact,
        cancel: &dyn CancelSignal,
    ) -> ImageOutcome {
        macro_rules! cancelled_outcome {
            ($stage:expr) => {
                return ImageOutcome {
                    final_path: None,
                    qc_status: QcStatus::QcFailed,
                    qc_reason: Some("cancelled".to_string()),
                    metadata: None,
                    processing_settings: processing_settings.clone(),
                    failed_stage: Some($stage),
                }
            };
        }

        if processing_settings.remove_bg_requested {
            if cancel.is_cancelled() {
                cancelled_outcome!(StageName::RemoveBackground);
            }
            match self.remove_background.remove_background(&current, settings, cancel).await {
                Ok(next) => {
                    let next_buffer = TempArtifact::new(next.temp_path.clone());
                    current = next;
                    buffer = next_buffer;
                    processing_settings.remove_bg_applied = true;
                }
                Err(failure) => match processing_settings.remove_bg_failure_mode {
                    FailureMode::Soft => {
                        self.metrics.stage_failures_total.with_label_values(&["remove_bg"]).inc();
                    }
                    FailureMode::Hard => return self.hard_failure(failure, processing_settings),
                },
            }
        }

        if processing_settings.trim_transparent_background && processing_settings.remove_bg_applied {
            if cancel.is_cancelled() {
                cancelled_outcome!(StageName::TrimTransparent);
            }
            match self.trim_transparent.trim_transparent(&current).await {
                Ok(next) => {
                    let next_buffer = TempArtifact::new(next.temp_path.clone());
                    current = next;
                    buffer = next_buffer;
                }
                Err(failure) => return self.hard_failure(failure, processing_settings),
            }
        }

        if processing_settings.image_enhancement {
            if cancel.is_cancelled() {
                cancelled_outcome!(StageName::Enhance);
            }
            match self
                .enhance
                .enhance(&current, processing_settings.sharpening, processing_settings.saturation)
                .await
            {
                Ok(next) => {
                    let next_buffer = TempArtifact::new(next.temp_path.clone());
                    current = next;
                    buffer = next_buffer;
                }
                Err(failure) => return self.hard_failure(failure, processing_settings),
            }
        }

        if processing_settings.image_convert {
            if cancel.is_cancelled() {
                cancelled_outcome!(StageName::Convert);
            }
            let (format, quality) = self.chosen_format(&processing_settings);
            let background = settings.effective_jpg_background();
            match self.convert.convert(&current, format, quality, background).await {
                Ok(next) => {
                    let next_buffer = TempArtifact::new(next.temp_path.clone());
                    current = next;
                    buffer = next_buffer;
                }
                Err(failure) => return self.hard_failure(failure, processing_settings),
            }
        }

        let final_path = match self.finalize(ctx, &settings.file_paths.output_directory, buffer, &current) {
            Ok(path) => path,
            Err(failure) => return self.hard_failure(failure, processing_settings),
        };

        let mut qc_status = QcStatus::Approved;
        let mut qc_reason = None;
        if processing_settings.run_quality_check {
            match self.quality_check.quality_check(&current, settings, cancel).await {
                Ok(result) if result.passed => {}
                Ok(result) => {
                    qc_status = QcStatus::QcFailed;
                    qc_reason = result.reason;
                }
                Err(failure) => {
                    self.metrics.stage_failures_total.with_label_values(&["quality_check"]).inc();
                    qc_status = QcStatus::QcFailed;
                    qc_reason = Some(failure.cause);
                }
            }
        }

        let mut metadata = None;
        if processing_settings.run_metadata_gen && matches!(qc_status, QcStatus::Approved) {
            match self.metadata.generate_metadata(&current, settings, cancel).await {
                Ok(result) => {
                    metadata = Some(DomainImageMetadata {
                        title: result.title,
                        description: result.description,
                        tags: result.tags,
                    })
                }
                Err(_failure) => {
                    // Spec §4.5: "Metadata failure never invalidates an
                    // otherwise-passed image" — recorded as a warning via
                    // job.log by the caller, not folded into the outcome.
                }
            }
        }

        ImageOutcome {
            final_path: Some(final_path),
            qc_status,
            qc_reason,
            metadata,
            processing_settings,
            failed_stage: None,
        }
    }

    fn chosen_format(&self, processing_settings: &ProcessingSettings) -> (ConvertFormat, u32) {
        if processing_settings.convert_to_jpg {
            (ConvertFormat::Jpg, processing_settings.jpg_quality)
        } else if processing_settings.convert_to_webp {
            (ConvertFormat::Webp, processing_settings.webp_quality)
        } else {
            (ConvertFormat::Png, processing_settings.png_quality)
        }
    }

    fn hard_failure(&self, failure: StageFailure, processing_settings: ProcessingSettings) -> ImageOutcome {
        self.metrics.stage_failures_total.with_label_values(&[&failure.stage.to_string()]).inc();
        ImageOutcome {
            final_path: None,
            qc_status: QcStatus::QcFailed,
            qc_reason: Some(failure.cause.clone()),
            metadata: None,
            processing_settings,
            failed_stage: Some(failure.stage),
        }
    }

    /// Moves the last stage's buffer into `output_dir` under its permanent
    /// name, disarming the `TempArtifact` guard so the rename's
    /// destination survives. Falls back to copy-then-remove when `rename`
    /// fails across a filesystem/device boundary.
    fn finalize(
        &self,
        ctx: &PipelineContext,
        output_dir: &std::path::Path,
        buffer: TempArtifact,
        current: &DownloadedAsset,
    ) -> Result<String, StageFailure> {
        let ext = match current.format {
            imgforge_domain::ports::ImageFormat::Png => "png",
            imgforge_domain::ports::ImageFormat::Jpg => "jpg",
            imgforge_domain::ports::ImageFormat::Webp => "webp",
        };
        let dest = output_dir.join(format!("{}_{}.{}", ctx.execution_id, ctx.mapping_id.0, ext));
        let source = buffer.into_final_path();

        if std::fs::rename(&source, &dest).is_err() {
            std::fs::copy(&source, &dest)
                .map_err(|err| StageFailure::new(StageName::Convert, format!("writing final artifact: {err}")))?;
            let _ = std::fs::remove_file(&source);
        }
        Ok(dest.display().to_string())
    }

    async fn persist(&self, ctx: &PipelineContext, outcome: &ImageOutcome) -> Result<(), DomainError> {
        match ctx.persist_mode {
            PersistMode::Insert => {
                with_busy_retry(|| async {
                    self.catalog
                        .save_image(NewGeneratedImage {
                            execution_id: Some(ctx.execution_id),
                            mapping_id: ctx.mapping_id,
                            prompt: ctx.prompt.clone(),
                            seed: ctx.seed,
                            qc_status: outcome.qc_status,
                            qc_reason: outcome.qc_reason.clone(),
                            final_path: outcome.final_path.clone(),
                            metadata: outcome.metadata.clone(),
                            processing_settings: outcome.processing_settings.clone(),
                        })
                        .await
                })
                .await?;
            }
            PersistMode::Overwrite => {
                // A retry that lands on Approved overwrites the row in full.
                // Anything else keeps the prior final_path/metadata (the last
                // good artifact) and only records the retry-failed status.
                let update = if matches!(outcome.qc_status, QcStatus::Approved) {
                    ImageUpdate {
                        qc_status: Some(outcome.qc_status),
                        qc_reason: Some(outcome.qc_reason.clone()),
                        final_path: Some(outcome.final_path.clone()),
                        metadata: Some(outcome.metadata.clone()),
                        processing_settings: Some(outcome.processing_settings.clone()),
                    }
                } else {
                    ImageUpdate {
                        qc_status: Some(QcStatus::RetryFailed),
                        qc_reason: Some(outcome.qc_reason.clone()),
                        ..Default::default()
                    }
                };
                with_busy_retry(|| async { self.catalog.update_image_by_mapping(ctx.execution_id, ctx.mapping_id, update.clone()).await }).await?;
            }
        }
        Ok(())
    }

    fn publish_settled(&self, ctx: &PipelineContext, outcome: &ImageOutcome) {
        let outcome_label = if outcome.is_pipeline_failure() {
            "failed"
        } else if matches!(outcome.qc_status, QcStatus::Approved) {
            "approved"
        } else {
            "qc_failed"
        };
        self.metrics.images_settled_total.with_label_values(&[outcome_label]).inc();

        self.events.publish_image_settled(ImageSettledEvent {
            execution_id: ctx.execution_id,
            mapping_id: ctx.mapping_id,
            timestamp: now_iso8601(),
            context: ctx.event_context,
            qc_status: outcome.qc_status,
            failed_stage: outcome.failed_stage,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use imgforge_domain::entities::{ImageFilter, NewConfiguration, NewExecution};
    use imgforge_domain::ports::{ImageFormat, MetadataResult, QcResult};
    use imgforge_domain::value_objects::settings::{ApiKeysConfig, FilePathsConfig, ParametersConfig, ProcessMode};

    struct NoopCancel;
    impl CancelSignal for NoopCancel {
        fn is_cancelled(&self) -> bool {
            false
        }
    }

    struct AlwaysCancel;
    impl CancelSignal for AlwaysCancel {
        fn is_cancelled(&self) -> bool {
            true
        }
    }

    struct FakeDownload;
    #[async_trait]
    impl DownloadStage for FakeDownload {
        async fn download(
            &self,
            _asset: &GeneratedAsset,
            temp_dir: &std::path::Path,
            file_stem: &str,
            _cancel: &dyn CancelSignal,
        ) -> Result<DownloadedAsset, StageFailure> {
            let path = temp_dir.join(format!("{file_stem}.png"));
            std::fs::write(&path, b"fake png bytes").unwrap();
            Ok(DownloadedAsset { temp_path: path, format: ImageFormat::Png })
        }
    }

    struct PassthroughRemoveBg;
    #[async_trait]
    impl RemoveBackgroundStage for PassthroughRemoveBg {
        async fn remove_background(
            &self,
            input: &DownloadedAsset,
            _settings: &Settings,
            _cancel: &dyn CancelSignal,
        ) -> Result<DownloadedAsset, StageFailure> {
            Ok(input.clone())
        }
    }

    struct PassthroughTrim;
    #[async_trait]
    impl TrimTransparentStage for PassthroughTrim {
        async fn trim_transparent(&self, input: &DownloadedAsset) -> Result<DownloadedAsset, StageFailure> {
            Ok(input.clone())
        }
    }

    struct PassthroughEnhance;
    #[async_trait]
    impl EnhanceStage for PassthroughEnhance {
        async fn enhance(&self, input: &DownloadedAsset, _sharpening: f64, _saturation: f64) -> Result<DownloadedAsset, StageFailure> {
            Ok(input.clone())
        }
    }

    struct PassthroughConvert;
    #[async_trait]
    impl ConvertStage for PassthroughConvert {
        async fn convert(
            &self,
            input: &DownloadedAsset,
            _format: ConvertFormat,
            _quality: u32,
            _background: Option<&str>,
        ) -> Result<DownloadedAsset, StageFailure> {
            Ok(input.clone())
        }
    }

    struct FixedQc(bool);
    #[async_trait]
    impl QualityCheckStage for FixedQc {
        async fn quality_check(
            &self,
            _input: &DownloadedAsset,
            _settings: &Settings,
            _cancel: &dyn CancelSignal,
        ) -> Result<QcResult, StageFailure> {
            Ok(QcResult { passed: self.0, reason: if self.0 { None } else { Some("too blurry".into()) } })
        }
    }

    struct FixedMetadata;
    #[async_trait]
    impl MetadataStage for FixedMetadata {
        async fn generate_metadata(
            &self,
            _input: &DownloadedAsset,
            _settings: &Settings,
            _cancel: &dyn CancelSignal,
        ) -> Result<MetadataResult, StageFailure> {
            Ok(MetadataResult { title: "t".into(), description: "d".into(), tags: vec!["a".into()] })
        }
    }

    struct AlwaysFailRemoveBg;
    #[async_trait]
    impl RemoveBackgroundStage for AlwaysFailRemoveBg {
        async fn remove_background(
            &self,
            _input: &DownloadedAsset,
            _settings: &Settings,
            _cancel: &dyn CancelSignal,
        ) -> Result<DownloadedAsset, StageFailure> {
            Err(StageFailure::new(StageName::RemoveBackground, "provider unavailable"))
        }
    }

    fn sample_settings(temp_dir: std::path::PathBuf, output_dir: std::path::PathBuf) -> Settings {
        Settings {
            api_keys: ApiKeysConfig::default(),
            file_paths: FilePathsConfig {
                output_directory: output_dir,
                temp_directory: temp_dir,
                system_prompt_file: "/tmp/sys.txt".into(),
                keywords_file: "/tmp/kw.txt".into(),
                quality_check_prompt_file: None,
                metadata_prompt_file: None,
            },
            parameters: ParametersConfig {
                process_mode: ProcessMode::Fast,
                aspect_ratios: vec![],
                openai_model: "gpt-4o".into(),
                polling_timeout: 60,
                enable_polling_timeout: false,
                keyword_random: false,
                count: 1,
                variations: 1,
            },
            processing: Default::default(),
            ai: Default::default(),
            advanced: Default::default(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn processor_with(
        remove_background: Arc<dyn RemoveBackgroundStage>,
        quality_check: Arc<dyn QualityCheckStage>,
        catalog: Arc<dyn CatalogRepository>,
        events: EventBus,
    ) -> ImageProcessor {
        ImageProcessor::new(
            Arc::new(FakeDownload),
            remove_background,
            Arc::new(PassthroughTrim),
            Arc::new(PassthroughEnhance),
            Arc::new(PassthroughConvert),
            quality_check,
            Arc::new(FixedMetadata),
            catalog,
            events,
            Arc::new(JobMetrics::new()),
        )
    }

    async fn seed_execution(catalog: &dyn CatalogRepository, settings: &Settings) -> i64 {
        let config_id = catalog
            .save_configuration(NewConfiguration { name: "cfg".into(), settings: settings.clone() })
            .await
            .unwrap();
        catalog
            .save_execution(NewExecution {
                configuration_id: Some(config_id),
                started_at: now_iso8601(),
                total: 1,
                label: None,
                settings_snapshot: settings.clone(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn approved_image_writes_final_path_and_one_row() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        let settings = sample_settings(temp_dir.path().to_path_buf(), output_dir.path().to_path_buf());
        let catalog: Arc<dyn CatalogRepository> = Arc::new(crate::infrastructure::catalog::InMemoryCatalog::new());
        let execution_id = seed_execution(catalog.as_ref(), &settings).await;

        let processor = processor_with(
            Arc::new(PassthroughRemoveBg),
            Arc::new(FixedQc(true)),
            catalog.clone(),
            EventBus::new(),
        );

        let ctx = PipelineContext {
            execution_id,
            mapping_id: MappingId(1),
            prompt: "a fox".into(),
            seed: Some(7),
            event_context: EventContext::Run,
            persist_mode: PersistMode::Insert,
        };
        let asset = GeneratedAsset { url: "https://example.test/1.png".into() };
        let processing_settings = ProcessingSettings::baseline(&settings);

        let outcome = processor
            .process(&ctx, &asset, &settings, processing_settings, Arc::new(NoopCancel))
            .await
            .unwrap();

        assert!(outcome.final_path.is_some());
        assert_eq!(outcome.qc_status, QcStatus::Approved);
        assert!(std::path::Path::new(outcome.final_path.as_ref().unwrap()).exists());

        let images = catalog.list_images(ImageFilter { execution_id: Some(execution_id), qc_status: None }).await.unwrap();
        assert_eq!(images.len(), 1);
    }

    #[tokio::test]
    async fn qc_rejection_still_writes_final_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        let mut settings = sample_settings(temp_dir.path().to_path_buf(), output_dir.path().to_path_buf());
        settings.ai.run_quality_check = true;
        let catalog: Arc<dyn CatalogRepository> = Arc::new(crate::infrastructure::catalog::InMemoryCatalog::new());
        let execution_id = seed_execution(catalog.as_ref(), &settings).await;

        let processor = processor_with(
            Arc::new(PassthroughRemoveBg),
            Arc::new(FixedQc(false)),
            catalog.clone(),
            EventBus::new(),
        );

        let ctx = PipelineContext {
            execution_id,
            mapping_id: MappingId(2),
            prompt: "a bear".into(),
            seed: None,
            event_context: EventContext::Run,
            persist_mode: PersistMode::Insert,
        };
        let asset = GeneratedAsset { url: "https://example.test/2.png".into() };
        let processing_settings = ProcessingSettings::baseline(&settings);

        let outcome = processor
            .process(&ctx, &asset, &settings, processing_settings, Arc::new(NoopCancel))
            .await
            .unwrap();

        assert!(outcome.final_path.is_some(), "qc_failed images still get a final_path per spec scenario 2");
        assert_eq!(outcome.qc_status, QcStatus::QcFailed);
        assert_eq!(outcome.qc_reason.as_deref(), Some("too blurry"));
    }

    #[tokio::test]
    async fn soft_remove_bg_failure_continues_with_original_buffer() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        let mut settings = sample_settings(temp_dir.path().to_path_buf(), output_dir.path().to_path_buf());
        settings.processing.remove_bg = true;
        settings.processing.remove_bg_failure_mode = FailureMode::Soft;
        let catalog: Arc<dyn CatalogRepository> = Arc::new(crate::infrastructure::catalog::InMemoryCatalog::new());
        let execution_id = seed_execution(catalog.as_ref(), &settings).await;

        let processor = processor_with(Arc::new(AlwaysFailRemoveBg), Arc::new(FixedQc(true)), catalog.clone(), EventBus::new());

        let ctx = PipelineContext {
            execution_id,
            mapping_id: MappingId(3),
            prompt: "p".into(),
            seed: None,
            event_context: EventContext::Run,
            persist_mode: PersistMode::Insert,
        };
        let asset = GeneratedAsset { url: "https://example.test/3.png".into() };
        let processing_settings = ProcessingSettings::baseline(&settings);

        let outcome = processor
            .process(&ctx, &asset, &settings, processing_settings, Arc::new(NoopCancel))
            .await
            .unwrap();

        assert!(outcome.final_path.is_some());
        assert!(!outcome.processing_settings.remove_bg_applied);
    }

    #[tokio::test]
    async fn hard_remove_bg_failure_records_pipeline_failure_with_no_final_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        let mut settings = sample_settings(temp_dir.path().to_path_buf(), output_dir.path().to_path_buf());
        settings.processing.remove_bg = true;
        settings.processing.remove_bg_failure_mode = FailureMode::Hard;
        let catalog: Arc<dyn CatalogRepository> = Arc::new(crate::infrastructure::catalog::InMemoryCatalog::new());
        let execution_id = seed_execution(catalog.as_ref(), &settings).await;

        let processor = processor_with(Arc::new(AlwaysFailRemoveBg), Arc::new(FixedQc(true)), catalog.clone(), EventBus::new());

        let ctx = PipelineContext {
            execution_id,
            mapping_id: MappingId(4),
            prompt: "p".into(),
            seed: None,
            event_context: EventContext::Run,
            persist_mode: PersistMode::Insert,
        };
        let asset = GeneratedAsset { url: "https://example.test/4.png".into() };
        let processing_settings = ProcessingSettings::baseline(&settings);

        let outcome = processor
            .process(&ctx, &asset, &settings, processing_settings, Arc::new(NoopCancel))
            .await
            .unwrap();

        assert!(outcome.final_path.is_none());
        assert_eq!(outcome.failed_stage, Some(StageName::RemoveBackground));
    }

    #[tokio::test]
    async fn cancellation_before_download_is_recorded_as_a_failure() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        let settings = sample_settings(temp_dir.path().to_path_buf(), output_dir.path().to_path_buf());
        let catalog: Arc<dyn CatalogRepository> = Arc::new(crate::infrastructure::catalog::InMemoryCatalog::new());
        let execution_id = seed_execution(catalog.as_ref(), &settings).await;

        let processor = processor_with(Arc::new(PassthroughRemoveBg), Arc::new(FixedQc(true)), catalog.clone(), EventBus::new());

        let ctx = PipelineContext {
            execution_id,
            mapping_id: MappingId(5),
            prompt: "p".into(),
            seed: None,
            event_context: EventContext::Run,
            persist_mode: PersistMode::Insert,
        };
        let asset = GeneratedAsset { url: "https://example.test/5.png".into() };
        let processing_settings = ProcessingSettings::baseline(&settings);

        let outcome = processor
            .process(&ctx, &asset, &settings, processing_settings, Arc::new(AlwaysCancel))
            .await
            .unwrap();

        assert!(outcome.final_path.is_none());
    }
}
