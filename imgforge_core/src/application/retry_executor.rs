//! `RetryExecutor` — spec §4.7. An independent, single-worker FIFO queue
//! that reprocesses previously-settled images through `ImageProcessor`,
//! overwriting their row by `(execution_id, mapping_id)` rather than
//! inserting a new one.
//!
//! Grounded on the same `JobAggregate`-adjacent orchestrator shape as
//! `JobRunner`, narrowed to `WorkerCount::ONE` (spec §4.7: "one worker
//! drains the queue serially — no parallelism within retries").

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use imgforge_domain::entities::ImageUpdate;
use imgforge_domain::error::DomainError;
use imgforge_domain::events::{EventContext, RetryJobState, RetryJobStatusEvent, RetryQueueUpdatedEvent, RetryStoppedEvent};
use imgforge_domain::ports::CatalogRepository;
use imgforge_domain::services::now_iso8601;
use imgforge_domain::value_objects::{ProcessingSettings, ProcessingSettingsOverride, QcStatus};

use crate::application::image_processor::{ImageProcessor, PersistMode, PipelineContext};
use crate::application::services::event_bus::EventBus;
use crate::application::services::retry_policy::with_busy_retry;
use crate::infrastructure::metrics::JobMetrics;
use crate::infrastructure::runtime::TokioCancelSignal;

/// One queued retry request (spec §4.7's `RetryJob`).
#[derive(Debug, Clone)]
pub struct RetryJob {
    pub image_id: i64,
    pub override_settings: Option<ProcessingSettingsOverride>,
    pub include_metadata: bool,
}

struct Inner {
    queue: VecDeque<RetryJob>,
    current_cancel: Option<CancellationToken>,
}

/// Drains a FIFO queue of [`RetryJob`]s one at a time against the same
/// `ImageProcessor` a fresh run would use, but always overwriting the
/// existing row instead of inserting a new one.
pub struct RetryExecutor {
    catalog: Arc<dyn CatalogRepository>,
    processor: Arc<ImageProcessor>,
    events: EventBus,
    metrics: Arc<JobMetrics>,
    inner: Arc<AsyncMutex<Inner>>,
    worker_started: std::sync::atomic::AtomicBool,
}

impl RetryExecutor {
    pub fn new(catalog: Arc<dyn CatalogRepository>, processor: Arc<ImageProcessor>, events: EventBus, metrics: Arc<JobMetrics>) -> Arc<Self> {
        let executor = Arc::new(Self {
            catalog,
            processor,
            events,
            metrics,
            inner: Arc::new(AsyncMutex::new(Inner { queue: VecDeque::new(), current_cancel: None })),
            worker_started: std::sync::atomic::AtomicBool::new(false),
        });
        executor.clone().spawn_worker();
        executor
    }

    /// Appends one job to the tail of the queue and emits
    /// `retry.queueUpdated`.
    pub async fn enqueue(&self, job: RetryJob) {
        let queue_length = {
            let mut inner = self.inner.lock().await;
            inner.queue.push_back(job);
            inner.queue.len()
        };
        self.metrics.retry_queue_depth.set(queue_length as i64);
        self.events.publish_retry_queue_updated(RetryQueueUpdatedEvent { timestamp: now_iso8601(), queue_length });
    }

    /// Spawns the single background worker that drains the queue for the
    /// lifetime of this executor. Idempotent — a second call is a no-op, so
    /// `new` can call it unconditionally without risking two workers.
    fn spawn_worker(self: Arc<Self>) {
        if self
            .worker_started
            .swap(true, std::sync::atomic::Ordering::SeqCst)
        {
            return;
        }
        tokio::spawn(async move {
            loop {
                let job = {
                    let mut inner = self.inner.lock().await;
                    inner.queue.pop_front()
                };
                let Some(job) = job else {
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    continue;
                };

                let queue_length = self.inner.lock().await.queue.len();
                self.metrics.retry_queue_depth.set(queue_length as i64);
                self.events.publish_retry_queue_updated(RetryQueueUpdatedEvent { timestamp: now_iso8601(), queue_length });

                let cancel_token = CancellationToken::new();
                {
                    let mut inner = self.inner.lock().await;
                    inner.current_cancel = Some(cancel_token.clone());
                }

                self.process_one(job, cancel_token).await;

                let mut inner = self.inner.lock().await;
                inner.current_cancel = None;
            }
        });
    }

    /// Spec §4.7 `processOne`, steps 1-5.
    async fn process_one(&self, job: RetryJob, cancel_token: CancellationToken) {
        let image = match self.catalog.get_image(job.image_id).await {
            Ok(Some(image)) => image,
            Ok(None) => {
                self.events.publish_retry_job_error(imgforge_domain::events::RetryJobErrorEvent {
                    timestamp: now_iso8601(),
                    image_id: job.image_id,
                    message: "image not found".to_string(),
                });
                return;
            }
            Err(err) => {
                self.events.publish_retry_job_error(imgforge_domain::events::RetryJobErrorEvent {
                    timestamp: now_iso8601(),
                    image_id: job.image_id,
                    message: err.to_string(),
                });
                return;
            }
        };

        let Some(execution_id) = image.execution_id else {
            self.mark_retry_failed(job.image_id, "image has no associated execution".to_string()).await;
            return;
        };

        let effective_settings = match &job.override_settings {
            Some(overrides) => image.processing_settings.merged_with(overrides),
            None => image.processing_settings.clone(),
        };
        let mut effective_settings = effective_settings;
        effective_settings.run_metadata_gen = job.include_metadata;

        let Some(final_path) = image.final_path.as_ref() else {
            self.mark_retry_failed(job.image_id, "no prior final_path to retry from".to_string()).await;
            return;
        };

        self.events.publish_retry_job_status(imgforge_domain::events::RetryJobStatusEvent {
            timestamp: now_iso8601(),
            image_id: job.image_id,
            state: RetryJobState::Processing,
        });

        let settings = match self.catalog.get_execution(execution_id).await {
            Ok(Some(execution)) => execution.settings_snapshot,
            Ok(None) => {
                self.mark_retry_failed(job.image_id, "owning execution no longer exists".to_string()).await;
                return;
            }
            Err(err) => {
                self.mark_retry_failed(job.image_id, err.to_string()).await;
                return;
            }
        };

        let format = infer_format(final_path);
        let ctx = PipelineContext {
            execution_id,
            mapping_id: image.mapping_id,
            prompt: image.prompt.clone(),
            seed: image.seed,
            event_context: EventContext::Retry,
            persist_mode: PersistMode::Overwrite,
        };
        let cancel_signal: Arc<dyn imgforge_domain::ports::CancelSignal> = Arc::new(TokioCancelSignal(cancel_token));

        let outcome = self
            .processor
            .process_retry(&ctx, std::path::Path::new(final_path), format, &settings, effective_settings, cancel_signal)
            .await;

        match outcome {
            Ok(outcome) if matches!(outcome.qc_status, QcStatus::Approved) => {
                self.events.publish_retry_job_status(imgforge_domain::events::RetryJobStatusEvent {
                    timestamp: now_iso8601(),
                    image_id: job.image_id,
                    state: RetryJobState::Completed,
                });
            }
            Ok(_) => {
                // `process_retry` already recorded qc_status=RetryFailed and
                // left final_path/metadata untouched in this case.
                self.events.publish_retry_job_status(imgforge_domain::events::RetryJobStatusEvent {
                    timestamp: now_iso8601(),
                    image_id: job.image_id,
                    state: RetryJobState::Failed,
                });
            }
            Err(err) => {
                self.mark_retry_failed(job.image_id, err.to_string()).await;
            }
        }
    }

    async fn mark_retry_failed(&self, image_id: i64, reason: String) {
        let _ = with_busy_retry(|| async {
            self.catalog
                .update_image(
                    image_id,
                    ImageUpdate {
                        qc_status: Some(QcStatus::RetryFailed),
                        qc_reason: Some(Some(reason.clone())),
                        ..Default::default()
                    },
                )
                .await
        })
        .await;
        self.events.publish_retry_job_error(imgforge_domain::events::RetryJobErrorEvent {
            timestamp: now_iso8601(),
            image_id,
            message: reason,
        });
    }

    /// Spec §4.7: clears the queue, cancels the in-flight pipeline (if
    /// any), and emits `retry.stopped` with the number of jobs dropped.
    pub async fn stop(&self) {
        let cleared = {
            let mut inner = self.inner.lock().await;
            let cleared = inner.queue.len();
            inner.queue.clear();
            if let Some(token) = inner.current_cancel.take() {
                token.cancel();
            }
            cleared
        };
        self.metrics.retry_queue_depth.set(0);
        self.events.publish_retry_stopped(RetryStoppedEvent { timestamp: now_iso8601(), cleared_queue_length: cleared });
    }

    pub async fn queue_length(&self) -> usize {
        self.inner.lock().await.queue.len()
    }
}

/// `GeneratedImage` doesn't carry a dedicated format column; it is read
/// back from the extension of its own `final_path`, which `ImageProcessor`
/// always writes using the current format's extension.
fn infer_format(final_path: &str) -> imgforge_domain::ports::ImageFormat {
    match std::path::Path::new(final_path).extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => imgforge_domain::ports::ImageFormat::Jpg,
        Some("webp") => imgforge_domain::ports::ImageFormat::Webp,
        _ => imgforge_domain::ports::ImageFormat::Png,
    }
}
