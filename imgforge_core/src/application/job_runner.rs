//! `JobRunner` — spec §4.6. Orchestrates one execution end-to-end: Plan,
//! then a bounded worker pool of Generate+`ImageProcessor::process` chains,
//! driving the in-memory `JobAggregate` state machine and mirroring every
//! transition into the `Execution` row and the event bus.
//!
//! Grounded on the teacher's `JobAggregate`-driving orchestrator shape
//! (aggregate raises events, a runner drains them into persistence/event-bus
//! side effects) generalized from file-processing jobs to image-generation
//! executions; the bounded worker pool is new, sized by
//! `WorkerCount::for_job` per spec §4.6 step 5.

use std::sync::Arc;

use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio_util::sync::CancellationToken;

use imgforge_domain::entities::{ExecutionFilter, ExecutionUpdate, JobAggregate, JobEvent};
use imgforge_domain::error::{DomainError, StageName};
use imgforge_domain::events::{EventContext, JobProgressEvent, JobStatusEvent};
use imgforge_domain::ports::{CancelSignal, CatalogRepository, GenerateStage, PlanStage};
use imgforge_domain::services::{now_iso8601, validate_settings};
use imgforge_domain::value_objects::{ExecutionStatus, MappingId, ProcessingSettings, Settings, WorkerCount};

use crate::application::image_processor::{ImageProcessor, PersistMode, PipelineContext};
use crate::application::services::event_bus::EventBus;
use crate::application::services::retry_policy::with_busy_retry;
use crate::infrastructure::metrics::JobMetrics;
use crate::infrastructure::runtime::TokioCancelSignal;

/// Expands a Plan-assigned, per-generation `mapping_id` into a stable,
/// per-image id so each of a generation's `variations` candidates gets its
/// own catalog row and retry key — spec's `(execution_id, mapping_id)`
/// identity only needs uniqueness within one execution, not globally.
fn image_mapping_id(generation_mapping_id: i64, variation_index: u32) -> MappingId {
    MappingId(generation_mapping_id * 10_000 + variation_index as i64 + 1)
}

struct RunningJob {
    execution_id: i64,
    aggregate: Arc<AsyncMutex<JobAggregate>>,
    cancel_token: CancellationToken,
}

/// Orchestrates at most one non-terminal execution per process (spec §4.6:
/// "concurrent `startJob` while non-terminal fails with `AlreadyRunning`").
pub struct JobRunner {
    catalog: Arc<dyn CatalogRepository>,
    plan: Arc<dyn PlanStage>,
    generate: Arc<dyn GenerateStage>,
    processor: Arc<ImageProcessor>,
    events: EventBus,
    metrics: Arc<JobMetrics>,
    running: AsyncMutex<Option<RunningJob>>,
}

impl JobRunner {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        plan: Arc<dyn PlanStage>,
        generate: Arc<dyn GenerateStage>,
        processor: Arc<ImageProcessor>,
        events: EventBus,
        metrics: Arc<JobMetrics>,
    ) -> Self {
        Self {
            catalog,
            plan,
            generate,
            processor,
            events,
            metrics,
            running: AsyncMutex::new(None),
        }
    }

    /// Crash-recovery: spec §4.6/§9 — "reconcile [totals] from images only
    /// at terminal time and on crash recovery." Any execution still marked
    /// `running` when this process starts was abandoned by a prior crash;
    /// it is reconciled from its images and marked `failed`. Call once at
    /// startup before accepting `startJob`.
    pub async fn recover_abandoned_executions(&self) -> Result<u64, DomainError> {
        let abandoned = self
            .catalog
            .list_executions(ExecutionFilter { status: Some(ExecutionStatus::Running), ..Default::default() }, 0, u32::MAX)
            .await?;

        let mut recovered = 0u64;
        for execution in abandoned {
            self.catalog.recompute_execution_totals(execution.id).await?;
            self.catalog
                .update_execution(
                    execution.id,
                    ExecutionUpdate {
                        status: Some(ExecutionStatus::Failed),
                        completed_at: Some(Some(now_iso8601())),
                        error_message: Some(Some("process restarted while execution was running".to_string())),
                        ..Default::default()
                    },
                )
                .await?;
            recovered += 1;
        }
        Ok(recovered)
    }

    /// The execution id of the currently running job, if any. The `Adapter`
    /// uses this to resolve `job:status`/`job:progress`/`job:logs` to a row
    /// without the CLI having to pass an execution id it has no way to know.
    pub async fn current_execution_id(&self) -> Option<i64> {
        self.running.lock().await.as_ref().map(|job| job.execution_id)
    }

    async fn refuse_if_running(&self) -> Result<(), DomainError> {
        let running = self.running.lock().await;
        if let Some(job) = running.as_ref() {
            let state = job.aggregate.lock().await.state();
            if !state.is_terminal() {
                return Err(DomainError::Internal("AlreadyRunning".to_string()));
            }
        }
        Ok(())
    }

    /// Spec §4.6 `startJob`. Validates and snapshots `settings`, inserts the
    /// `running` Execution row, then spawns the driving task and returns
    /// immediately with the new execution id — callers observe progress via
    /// the event bus, not by awaiting this call.
    pub async fn start_job(&self, mut settings: Settings, label: Option<String>) -> Result<i64, DomainError> {
        validate_settings(&mut settings)?;
        self.refuse_if_running().await?;

        let total_images = settings.parameters.count * settings.parameters.variations;
        let execution_id = self
            .catalog
            .save_execution(NewExecutionArgs {
                total: total_images,
                label,
                settings_snapshot: settings.clone(),
            }
            .into())
            .await?;

        let mut aggregate = JobAggregate::new(execution_id);
        aggregate.start(settings.parameters.count, total_images)?;
        self.drain_aggregate_events(&mut aggregate, execution_id);

        self.events.publish_job_status(JobStatusEvent {
            execution_id,
            timestamp: now_iso8601(),
            context: EventContext::Run,
            status: ExecutionStatus::Running,
            error_message: None,
        });

        let cancel_token = CancellationToken::new();
        let aggregate = Arc::new(AsyncMutex::new(aggregate));
        {
            let mut running = self.running.lock().await;
            *running = Some(RunningJob { execution_id, aggregate: aggregate.clone(), cancel_token: cancel_token.clone() });
        }

        let catalog = self.catalog.clone();
        let plan = self.plan.clone();
        let generate = self.generate.clone();
        let processor = self.processor.clone();
        let events = self.events.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(Self::drive(execution_id, settings, catalog, plan, generate, processor, events, metrics, aggregate, cancel_token));

        Ok(execution_id)
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        execution_id: i64,
        settings: Settings,
        catalog: Arc<dyn CatalogRepository>,
        plan: Arc<dyn PlanStage>,
        generate: Arc<dyn GenerateStage>,
        processor: Arc<ImageProcessor>,
        events: EventBus,
        metrics: Arc<JobMetrics>,
        aggregate: Arc<AsyncMutex<JobAggregate>>,
        cancel_token: CancellationToken,
    ) {
        let parameter_sets = match plan.plan(&settings).await {
            Ok(sets) => sets,
            Err(failure) => {
                Self::finish(execution_id, &catalog, &events, &aggregate, ExecutionStatus::Failed, Some(failure.cause)).await;
                return;
            }
        };

        {
            let mut guard = aggregate.lock().await;
            if guard.mark_running().is_ok() {
                Self::drain_locked(&mut guard, execution_id, &events);
            }
        }

        let cancel_signal: Arc<dyn CancelSignal> = Arc::new(TokioCancelSignal(cancel_token.clone()));
        let worker_count = WorkerCount::for_job(settings.parameters.count as usize);
        let semaphore = Arc::new(Semaphore::new(worker_count.get()));

        let mut handles = Vec::with_capacity(parameter_sets.len());
        for params in parameter_sets {
            let semaphore = semaphore.clone();
            let generate = generate.clone();
            let processor = processor.clone();
            let settings = settings.clone();
            let cancel_signal = cancel_signal.clone();
            let events = events.clone();
            let metrics = metrics.clone();
            let aggregate = aggregate.clone();
            let cancel_token = cancel_token.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed while job runs");
                if cancel_token.is_cancelled() {
                    return;
                }
                metrics.active_workers.inc();

                let generation_mapping_id = params.mapping_id;
                let variations = params.variations;
                let assets = match generate.generate(&params, &settings, cancel_signal.as_ref()).await {
                    Ok(assets) => assets,
                    Err(_failure) => {
                        metrics.stage_failures_total.with_label_values(&["generate"]).inc();
                        // No row is persisted for a generation that never yields an
                        // asset; `recompute_execution_totals` derives `failed` from
                        // `total - successful`, so the gap is accounted for without a
                        // synthetic row. Progress still advances for each expected
                        // variation so the execution can reach `images_total`.
                        for _ in 0..variations {
                            Self::settle_progress(&aggregate, execution_id, &events, Some(StageName::Generate)).await;
                        }
                        metrics.active_workers.dec();
                        return;
                    }
                };

                let processing_settings = ProcessingSettings::baseline(&settings);
                for (index, asset) in assets.into_iter().enumerate() {
                    if cancel_token.is_cancelled() {
                        break;
                    }
                    let mapping_id = image_mapping_id(generation_mapping_id, index as u32);
                    let ctx = PipelineContext {
                        execution_id,
                        mapping_id,
                        prompt: params.prompt.clone(),
                        seed: params.seed,
                        event_context: EventContext::Run,
                        persist_mode: PersistMode::Insert,
                    };
                    let outcome = processor
                        .process(&ctx, &asset, &settings, processing_settings.clone(), cancel_signal.clone())
                        .await;
                    let failed_stage = outcome.as_ref().ok().and_then(|o| o.failed_stage);
                    Self::settle_progress(&aggregate, execution_id, &events, failed_stage).await;
                }
                metrics.active_workers.dec();
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        let final_status = if cancel_token.is_cancelled() { ExecutionStatus::Stopped } else { ExecutionStatus::Completed };
        Self::finish(execution_id, &catalog, &events, &aggregate, final_status, None).await;
    }

    /// Bumps `images_done`, updates the Execution row's totals, and
    /// publishes `job.progress` — spec §4.6 step 6, run after every settled
    /// image (whether by `ImageProcessor` or a generation that never
    /// produced an asset at all).
    async fn settle_progress(
        aggregate: &Arc<AsyncMutex<JobAggregate>>,
        execution_id: i64,
        events: &EventBus,
        current_stage: Option<StageName>,
    ) {
        let mut guard = aggregate.lock().await;
        if guard.record_image_settled().is_ok() {
            let progress = guard.progress();
            Self::drain_locked(&mut guard, execution_id, events);
            events.publish_job_progress(JobProgressEvent {
                execution_id,
                timestamp: now_iso8601(),
                context: EventContext::Run,
                done: progress.images_done,
                total: progress.images_total,
                current_stage,
            });
        }
    }

    async fn finish(
        execution_id: i64,
        catalog: &Arc<dyn CatalogRepository>,
        events: &EventBus,
        aggregate: &Arc<AsyncMutex<JobAggregate>>,
        status: ExecutionStatus,
        error_message: Option<String>,
    ) {
        let _ = with_busy_retry(|| async { catalog.recompute_execution_totals(execution_id).await }).await;
        let _ = with_busy_retry(|| async {
            catalog
                .update_execution(
                    execution_id,
                    ExecutionUpdate {
                        status: Some(status),
                        completed_at: Some(Some(now_iso8601())),
                        error_message: Some(error_message.clone()),
                        ..Default::default()
                    },
                )
                .await
        })
        .await;

        {
            let mut guard = aggregate.lock().await;
            if guard.complete(status).is_ok() {
                Self::drain_locked(&mut guard, execution_id, events);
            }
        }

        events.publish_job_status(JobStatusEvent {
            execution_id,
            timestamp: now_iso8601(),
            context: EventContext::Run,
            status,
            error_message,
        });
    }

    fn drain_aggregate_events(&self, aggregate: &mut JobAggregate, execution_id: i64) {
        Self::drain_locked(aggregate, execution_id, &self.events);
    }

    /// Drains `JobAggregate`'s uncommitted events; currently only
    /// `StageEntered` needs no further action here (the bus only carries
    /// the coarse-grained topics `job.progress`/`job.status`), but draining
    /// unconditionally keeps the aggregate's event queue from growing
    /// unbounded across a long-running execution.
    fn drain_locked(aggregate: &mut JobAggregate, _execution_id: i64, _events: &EventBus) {
        for event in aggregate.take_uncommitted_events() {
            if let JobEvent::StageEntered { .. } = event {
                // Reserved for a future per-stage progress topic; the
                // current `job.progress` event only carries done/total.
            }
        }
    }

    /// Spec §4.6 step 7: cooperative stop. Marks the aggregate `stopping`
    /// and signals the cancellation token; in-flight pipelines finish or
    /// abort on their own, `drive`'s final status then resolves to
    /// `stopped`.
    pub async fn stop_job(&self) -> Result<(), DomainError> {
        let running = self.running.lock().await;
        let Some(job) = running.as_ref() else {
            return Err(DomainError::Internal("no execution is currently running".to_string()));
        };
        job.aggregate.lock().await.request_stop()?;
        job.cancel_token.cancel();
        Ok(())
    }

    /// `forceStopAll`: same cancellation signal as `stop_job`, but the
    /// caller does not wait for graceful drain — workers still finish
    /// in-flight catalog writes (cancellation aborts the HTTP call, not the
    /// persistence step), matching the "exactly one outcome per call"
    /// guarantee even under a forced stop.
    pub async fn force_stop_all(&self) -> Result<(), DomainError> {
        let running = self.running.lock().await;
        let Some(job) = running.as_ref() else {
            return Err(DomainError::Internal("no execution is currently running".to_string()));
        };
        job.aggregate.lock().await.force_stop()?;
        job.cancel_token.cancel();
        Ok(())
    }

    /// Spec §4.6: resets the row to `pending` with cleared totals/times and
    /// hands back its `settings_snapshot` for the caller to pass to a fresh
    /// `startJob`.
    pub async fn rerun_execution(&self, execution_id: i64) -> Result<Settings, DomainError> {
        let execution = self
            .catalog
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| DomainError::Internal(format!("execution {execution_id} not found")))?;

        self.catalog
            .update_execution(
                execution_id,
                ExecutionUpdate {
                    status: Some(ExecutionStatus::Pending),
                    completed_at: Some(None),
                    totals: Some(Default::default()),
                    error_message: Some(None),
                    ..Default::default()
                },
            )
            .await?;

        Ok(execution.settings_snapshot)
    }
}

/// Shim so `start_job` can build a `NewExecution` without repeating the
/// `configuration_id: None` every caller of this module would otherwise
/// have to spell out — `JobRunner` always starts ad hoc runs; configuration
/// persistence is a separate `Adapter` operation.
struct NewExecutionArgs {
    total: u32,
    label: Option<String>,
    settings_snapshot: Settings,
}

impl From<NewExecutionArgs> for imgforge_domain::entities::NewExecution {
    fn from(args: NewExecutionArgs) -> Self {
        imgforge_domain::entities::NewExecution {
            configuration_id: None,
            started_at: now_iso8601(),
            total: args.total,
            label: args.label,
            settings_snapshot: args.settings_snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use imgforge_domain::error::StageFailure;
    use imgforge_domain::ports::{
        CancelSignal, ConvertStage, DownloadStage, DownloadedAsset, EnhanceStage, GeneratedAsset, ImageFormat,
        MetadataResult, MetadataStage, ParameterSet, QcResult, QualityCheckStage, RemoveBackgroundStage,
        TrimTransparentStage,
    };
    use imgforge_domain::value_objects::settings::{ApiKeysConfig, ConvertFormat, FilePathsConfig, ParametersConfig, ProcessMode};

    struct FixedPlan(Vec<ParameterSet>);
    #[async_trait]
    impl PlanStage for FixedPlan {
        async fn plan(&self, _settings: &Settings) -> Result<Vec<ParameterSet>, StageFailure> {
            Ok(self.0.clone())
        }
    }

    struct OneAssetGenerate;
    #[async_trait]
    impl GenerateStage for OneAssetGenerate {
        async fn generate(
            &self,
            params: &ParameterSet,
            _settings: &Settings,
            _cancel: &dyn CancelSignal,
        ) -> Result<Vec<GeneratedAsset>, StageFailure> {
            Ok(vec![GeneratedAsset { url: format!("https://example.test/{}.png", params.mapping_id) }])
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
        async fn remove_background(&self, input: &DownloadedAsset, _s: &Settings, _c: &dyn CancelSignal) -> Result<DownloadedAsset, StageFailure> {
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
        async fn enhance(&self, input: &DownloadedAsset, _sh: f64, _sa: f64) -> Result<DownloadedAsset, StageFailure> {
            Ok(input.clone())
        }
    }
    struct PassthroughConvert;
    #[async_trait]
    impl ConvertStage for PassthroughConvert {
        async fn convert(&self, input: &DownloadedAsset, _f: ConvertFormat, _q: u32, _b: Option<&str>) -> Result<DownloadedAsset, StageFailure> {
            Ok(input.clone())
        }
    }
    struct AlwaysPassQc;
    #[async_trait]
    impl QualityCheckStage for AlwaysPassQc {
        async fn quality_check(&self, _i: &DownloadedAsset, _s: &Settings, _c: &dyn CancelSignal) -> Result<QcResult, StageFailure> {
            Ok(QcResult { passed: true, reason: None })
        }
    }
    struct FixedMetadata;
    #[async_trait]
    impl MetadataStage for FixedMetadata {
        async fn generate_metadata(&self, _i: &DownloadedAsset, _s: &Settings, _c: &dyn CancelSignal) -> Result<MetadataResult, StageFailure> {
            Ok(MetadataResult { title: "t".into(), description: "d".into(), tags: vec![] })
        }
    }

    fn sample_settings(temp_dir: std::path::PathBuf, output_dir: std::path::PathBuf, count: u32, variations: u32) -> Settings {
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
                count,
                variations,
            },
            processing: Default::default(),
            ai: Default::default(),
            advanced: Default::default(),
        }
    }

    fn build_runner(catalog: Arc<dyn CatalogRepository>, parameter_sets: Vec<ParameterSet>) -> JobRunner {
        let events = EventBus::new();
        let metrics = Arc::new(JobMetrics::new());
        let processor = Arc::new(ImageProcessor::new(
            Arc::new(FakeDownload),
            Arc::new(PassthroughRemoveBg),
            Arc::new(PassthroughTrim),
            Arc::new(PassthroughEnhance),
            Arc::new(PassthroughConvert),
            Arc::new(AlwaysPassQc),
            Arc::new(FixedMetadata),
            catalog.clone(),
            events.clone(),
            metrics.clone(),
        ));
        JobRunner::new(catalog, Arc::new(FixedPlan(parameter_sets)), Arc::new(OneAssetGenerate), processor, events, metrics)
    }

    #[tokio::test]
    async fn start_job_runs_to_completion_and_settles_every_image() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        let settings = sample_settings(temp_dir.path().to_path_buf(), output_dir.path().to_path_buf(), 2, 1);
        let catalog: Arc<dyn CatalogRepository> = Arc::new(crate::infrastructure::catalog::InMemoryCatalog::new());

        let parameter_sets = vec![
            ParameterSet { mapping_id: 1, prompt: "a".into(), seed: None, variations: 1, aspect_ratio: None },
            ParameterSet { mapping_id: 2, prompt: "b".into(), seed: None, variations: 1, aspect_ratio: None },
        ];
        let runner = build_runner(catalog.clone(), parameter_sets);

        let execution_id = runner.start_job(settings, Some("label".into())).await.unwrap();

        for _ in 0..100 {
            let execution = catalog.get_execution(execution_id).await.unwrap().unwrap();
            if execution.status.is_terminal() {
                assert_eq!(execution.status, ExecutionStatus::Completed);
                assert_eq!(execution.totals.successful, 2);
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("execution did not reach a terminal state in time");
    }

    #[tokio::test]
    async fn second_start_job_while_running_is_refused() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        let settings = sample_settings(temp_dir.path().to_path_buf(), output_dir.path().to_path_buf(), 1, 1);
        let catalog: Arc<dyn CatalogRepository> = Arc::new(crate::infrastructure::catalog::InMemoryCatalog::new());
        let parameter_sets = vec![ParameterSet { mapping_id: 1, prompt: "a".into(), seed: None, variations: 1, aspect_ratio: None }];
        let runner = build_runner(catalog.clone(), parameter_sets);

        runner.start_job(settings.clone(), None).await.unwrap();
        let err = runner.start_job(settings, None).await.unwrap_err();
        assert!(matches!(err, DomainError::Internal(msg) if msg == "AlreadyRunning"));
    }

    #[tokio::test]
    async fn recover_abandoned_executions_marks_running_rows_failed() {
        let catalog: Arc<dyn CatalogRepository> = Arc::new(crate::infrastructure::catalog::InMemoryCatalog::new());
        let settings = sample_settings("/tmp".into(), "/tmp".into(), 1, 1);
        let execution_id = catalog
            .save_execution(imgforge_domain::entities::NewExecution {
                configuration_id: None,
                started_at: now_iso8601(),
                total: 1,
                label: None,
                settings_snapshot: settings.clone(),
            })
            .await
            .unwrap();
        catalog
            .update_execution(execution_id, ExecutionUpdate { status: Some(ExecutionStatus::Running), ..Default::default() })
            .await
            .unwrap();

        let runner = build_runner(catalog.clone(), vec![]);
        let recovered = runner.recover_abandoned_executions().await.unwrap();
        assert_eq!(recovered, 1);

        let execution = catalog.get_execution(execution_id).await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.completed_at.is_some());
    }
}
