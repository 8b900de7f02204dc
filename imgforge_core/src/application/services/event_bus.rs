//! # Event Bus
//!
//! In-process publish/subscribe plumbing for the nine topics named in
//! spec §4.3. Each topic is backed by its own `tokio::sync::broadcast`
//! channel; publishers never block on slow subscribers and subscribers
//! never block publishers — the two failure modes the spec calls out are
//! handled per-topic:
//!
//! - **High-frequency topics** (`job.progress`, `job.log`,
//!   `retry.progress`) drop the oldest buffered event for a lagging
//!   subscriber rather than stall the publisher. A `RecvError::Lagged`
//!   is swallowed and the subscriber simply resumes from the next event.
//! - **All other topics** detach a subscriber that falls behind by more
//!   than `DETACH_AFTER_LAGS` consecutive lags — a wedged subscriber on
//!   `job.status` or `retry.jobError` should not be replayed forever.
//!
//! The bus holds no history beyond each channel's own ring buffer; a
//! subscriber that connects after an event was published simply misses
//! it, matching `tokio::sync::broadcast` semantics.

use std::sync::Arc;

use tokio::sync::broadcast;

use imgforge_domain::events::{
    ImageSettledEvent, JobLogEvent, JobProgressEvent, JobStatusEvent, RetryJobErrorEvent, RetryJobStatusEvent,
    RetryProgressEvent, RetryQueueUpdatedEvent, RetryStoppedEvent, Topic, ZipExportCompletedEvent,
    ZipExportErrorEvent, ZipExportProgressEvent,
};

/// Ring buffer capacity for each topic's broadcast channel.
const CHANNEL_CAPACITY: usize = 256;

/// Consecutive lags after which a subscriber on a non-high-frequency topic
/// is dropped rather than kept alive — see the `is_high_frequency` split
/// in `imgforge_domain::events::Topic`.
const DETACH_AFTER_LAGS: u32 = 3;

/// A single published event, tagged with the topic it was sent on.
///
/// The bus is typed per payload, not per envelope — subscribers receive
/// the concrete event type they asked for, never this enum. It exists
/// only so `EventBus::publish_any` (used by diagnostics and the
/// `protocol:refresh-roots` replay path) can move a dynamically-chosen
/// event across the same dispatch point.
#[derive(Debug, Clone)]
pub enum Event {
    JobProgress(JobProgressEvent),
    JobLog(JobLogEvent),
    JobStatus(JobStatusEvent),
    ImageSettled(ImageSettledEvent),
    RetryQueueUpdated(RetryQueueUpdatedEvent),
    RetryProgress(RetryProgressEvent),
    RetryJobStatus(RetryJobStatusEvent),
    RetryJobError(RetryJobErrorEvent),
    RetryStopped(RetryStoppedEvent),
    ZipExportProgress(ZipExportProgressEvent),
    ZipExportCompleted(ZipExportCompletedEvent),
    ZipExportError(ZipExportErrorEvent),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::JobProgress(_) => Topic::JobProgress,
            Event::JobLog(_) => Topic::JobLog,
            Event::JobStatus(_) => Topic::JobStatus,
            Event::ImageSettled(_) => Topic::ImageSettled,
            Event::RetryQueueUpdated(_) => Topic::RetryQueueUpdated,
            Event::RetryProgress(_) => Topic::RetryProgress,
            Event::RetryJobStatus(_) => Topic::RetryJobStatus,
            Event::RetryJobError(_) => Topic::RetryJobError,
            Event::RetryStopped(_) => Topic::RetryStopped,
            Event::ZipExportProgress(_) => Topic::ZipExportProgress,
            Event::ZipExportCompleted(_) => Topic::ZipExportCompleted,
            Event::ZipExportError(_) => Topic::ZipExportError,
        }
    }
}

struct Channels {
    job_progress: broadcast::Sender<JobProgressEvent>,
    job_log: broadcast::Sender<JobLogEvent>,
    job_status: broadcast::Sender<JobStatusEvent>,
    image_settled: broadcast::Sender<ImageSettledEvent>,
    retry_queue_updated: broadcast::Sender<RetryQueueUpdatedEvent>,
    retry_progress: broadcast::Sender<RetryProgressEvent>,
    retry_job_status: broadcast::Sender<RetryJobStatusEvent>,
    retry_job_error: broadcast::Sender<RetryJobErrorEvent>,
    retry_stopped: broadcast::Sender<RetryStoppedEvent>,
    zip_export_progress: broadcast::Sender<ZipExportProgressEvent>,
    zip_export_completed: broadcast::Sender<ZipExportCompletedEvent>,
    zip_export_error: broadcast::Sender<ZipExportErrorEvent>,
}

impl Channels {
    fn new() -> Self {
        Self {
            job_progress: broadcast::channel(CHANNEL_CAPACITY).0,
            job_log: broadcast::channel(CHANNEL_CAPACITY).0,
            job_status: broadcast::channel(CHANNEL_CAPACITY).0,
            image_settled: broadcast::channel(CHANNEL_CAPACITY).0,
            retry_queue_updated: broadcast::channel(CHANNEL_CAPACITY).0,
            retry_progress: broadcast::channel(CHANNEL_CAPACITY).0,
            retry_job_status: broadcast::channel(CHANNEL_CAPACITY).0,
            retry_job_error: broadcast::channel(CHANNEL_CAPACITY).0,
            retry_stopped: broadcast::channel(CHANNEL_CAPACITY).0,
            zip_export_progress: broadcast::channel(CHANNEL_CAPACITY).0,
            zip_export_completed: broadcast::channel(CHANNEL_CAPACITY).0,
            zip_export_error: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }
}

/// Shared, cloneable publish/subscribe bus. Cloning an `EventBus` shares the
/// same underlying channels — every clone publishes and subscribes to the
/// same nine topics.
#[derive(Clone)]
pub struct EventBus {
    channels: Arc<Channels>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { channels: Arc::new(Channels::new()) }
    }

    pub fn publish_job_progress(&self, event: JobProgressEvent) {
        let _ = self.channels.job_progress.send(event);
    }

    pub fn publish_job_log(&self, event: JobLogEvent) {
        let _ = self.channels.job_log.send(event);
    }

    pub fn publish_job_status(&self, event: JobStatusEvent) {
        let _ = self.channels.job_status.send(event);
    }

    pub fn publish_image_settled(&self, event: ImageSettledEvent) {
        let _ = self.channels.image_settled.send(event);
    }

    pub fn publish_retry_queue_updated(&self, event: RetryQueueUpdatedEvent) {
        let _ = self.channels.retry_queue_updated.send(event);
    }

    pub fn publish_retry_progress(&self, event: RetryProgressEvent) {
        let _ = self.channels.retry_progress.send(event);
    }

    pub fn publish_retry_job_status(&self, event: RetryJobStatusEvent) {
        let _ = self.channels.retry_job_status.send(event);
    }

    pub fn publish_retry_job_error(&self, event: RetryJobErrorEvent) {
        let _ = self.channels.retry_job_error.send(event);
    }

    pub fn publish_retry_stopped(&self, event: RetryStoppedEvent) {
        let _ = self.channels.retry_stopped.send(event);
    }

    pub fn publish_zip_export_progress(&self, event: ZipExportProgressEvent) {
        let _ = self.channels.zip_export_progress.send(event);
    }

    pub fn publish_zip_export_completed(&self, event: ZipExportCompletedEvent) {
        let _ = self.channels.zip_export_completed.send(event);
    }

    pub fn publish_zip_export_error(&self, event: ZipExportErrorEvent) {
        let _ = self.channels.zip_export_error.send(event);
    }

    pub fn subscribe_job_progress(&self) -> TopicSubscriber<JobProgressEvent> {
        TopicSubscriber::new(self.channels.job_progress.subscribe(), Topic::JobProgress)
    }

    pub fn subscribe_job_log(&self) -> TopicSubscriber<JobLogEvent> {
        TopicSubscriber::new(self.channels.job_log.subscribe(), Topic::JobLog)
    }

    pub fn subscribe_job_status(&self) -> TopicSubscriber<JobStatusEvent> {
        TopicSubscriber::new(self.channels.job_status.subscribe(), Topic::JobStatus)
    }

    pub fn subscribe_image_settled(&self) -> TopicSubscriber<ImageSettledEvent> {
        TopicSubscriber::new(self.channels.image_settled.subscribe(), Topic::ImageSettled)
    }

    pub fn subscribe_retry_queue_updated(&self) -> TopicSubscriber<RetryQueueUpdatedEvent> {
        TopicSubscriber::new(self.channels.retry_queue_updated.subscribe(), Topic::RetryQueueUpdated)
    }

    pub fn subscribe_retry_progress(&self) -> TopicSubscriber<RetryProgressEvent> {
        TopicSubscriber::new(self.channels.retry_progress.subscribe(), Topic::RetryProgress)
    }

    pub fn subscribe_retry_job_status(&self) -> TopicSubscriber<RetryJobStatusEvent> {
        TopicSubscriber::new(self.channels.retry_job_status.subscribe(), Topic::RetryJobStatus)
    }

    pub fn subscribe_retry_job_error(&self) -> TopicSubscriber<RetryJobErrorEvent> {
        TopicSubscriber::new(self.channels.retry_job_error.subscribe(), Topic::RetryJobError)
    }

    pub fn subscribe_retry_stopped(&self) -> TopicSubscriber<RetryStoppedEvent> {
        TopicSubscriber::new(self.channels.retry_stopped.subscribe(), Topic::RetryStopped)
    }

    pub fn subscribe_zip_export_progress(&self) -> TopicSubscriber<ZipExportProgressEvent> {
        TopicSubscriber::new(self.channels.zip_export_progress.subscribe(), Topic::ZipExportProgress)
    }

    pub fn subscribe_zip_export_completed(&self) -> TopicSubscriber<ZipExportCompletedEvent> {
        TopicSubscriber::new(self.channels.zip_export_completed.subscribe(), Topic::ZipExportCompleted)
    }

    pub fn subscribe_zip_export_error(&self) -> TopicSubscriber<ZipExportErrorEvent> {
        TopicSubscriber::new(self.channels.zip_export_error.subscribe(), Topic::ZipExportError)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps a `broadcast::Receiver` with the per-topic lag policy from spec
/// §4.3 so callers never have to match on `RecvError` themselves.
pub struct TopicSubscriber<T> {
    inner: broadcast::Receiver<T>,
    topic: Topic,
    consecutive_lags: u32,
}

impl<T: Clone> TopicSubscriber<T> {
    fn new(inner: broadcast::Receiver<T>, topic: Topic) -> Self {
        Self { inner, topic, consecutive_lags: 0 }
    }

    /// Awaits the next event, applying the topic's lag policy.
    ///
    /// Returns `Ok(None)` when a non-high-frequency subscriber has been
    /// detached after too many consecutive lags, and when the bus itself
    /// has been dropped (all senders gone).
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.inner.recv().await {
                Ok(event) => {
                    self.consecutive_lags = 0;
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    if self.topic.is_high_frequency() {
                        continue;
                    }
                    self.consecutive_lags += 1;
                    if self.consecutive_lags >= DETACH_AFTER_LAGS {
                        return None;
                    }
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe_job_status();

        bus.publish_job_status(JobStatusEvent {
            execution_id: 1,
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            context: imgforge_domain::events::EventContext::Run,
            status: imgforge_domain::value_objects::ExecutionStatus::Completed,
            error_message: None,
        });

        let received = sub.recv().await.expect("event should be delivered");
        assert_eq!(received.execution_id, 1);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error() {
        let bus = EventBus::new();
        bus.publish_retry_stopped(RetryStoppedEvent {
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            cleared_queue_length: 0,
        });
    }

    #[tokio::test]
    async fn lagged_high_frequency_subscriber_keeps_receiving() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe_job_progress();

        for done in 0..(CHANNEL_CAPACITY as u32 + 10) {
            bus.publish_job_progress(JobProgressEvent {
                execution_id: 1,
                timestamp: "2026-01-01T00:00:00Z".to_string(),
                context: imgforge_domain::events::EventContext::Run,
                done,
                total: 100,
                current_stage: None,
            });
        }

        let event = sub.recv().await.expect("lagged subscriber should resume, not detach");
        assert!(event.done > 0);
    }

    #[tokio::test]
    async fn lagged_low_frequency_subscriber_detaches_eventually() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe_job_status();

        for _ in 0..DETACH_AFTER_LAGS {
            for i in 0..(CHANNEL_CAPACITY as i64 + 10) {
                bus.publish_job_status(JobStatusEvent {
                    execution_id: i,
                    timestamp: "2026-01-01T00:00:00Z".to_string(),
                    context: imgforge_domain::events::EventContext::Run,
                    status: imgforge_domain::value_objects::ExecutionStatus::Completed,
                    error_message: None,
                });
            }
            if sub.recv().await.is_none() {
                return;
            }
        }
        panic!("subscriber should have detached after repeated lags");
    }
}
