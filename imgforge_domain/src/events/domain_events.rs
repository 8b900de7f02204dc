//! Event payloads for the topics named in spec §4.3:
//! `job.progress`, `job.log`, `job.status`, `image.settled`,
//! `retry.queueUpdated`, `retry.progress`, `retry.jobStatus`,
//! `retry.jobError`, `retry.stopped`, plus the zip-export topics
//! supplementing §4.1's bulk export operations.
//!
//! Every payload carries a monotonic `timestamp` and a `context` so a
//! subscriber fielding both a run and a retry batch can tell them apart
//! without inspecting the topic name.

use serde::{Deserialize, Serialize};

use crate::error::StageName;
use crate::value_objects::{ExecutionStatus, MappingId, QcStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventContext {
    Run,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    JobProgress,
    JobLog,
    JobStatus,
    ImageSettled,
    RetryQueueUpdated,
    RetryProgress,
    RetryJobStatus,
    RetryJobError,
    RetryStopped,
    ZipExportProgress,
    ZipExportCompleted,
    ZipExportError,
}

impl Topic {
    /// Spec §4.3: "`log`/`progress` drop oldest for slow subscribers;
    /// [others] are detached after K consecutive drops." The job/retry
    /// progress and log topics are the high-frequency ones; zip export
    /// progress joins them since it fires once per archived entry.
    pub fn is_high_frequency(self) -> bool {
        matches!(
            self,
            Topic::JobProgress | Topic::JobLog | Topic::RetryProgress | Topic::ZipExportProgress
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgressEvent {
    pub execution_id: i64,
    pub timestamp: String,
    pub context: EventContext,
    pub done: u32,
    pub total: u32,
    pub current_stage: Option<StageName>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLogEvent {
    pub execution_id: Option<i64>,
    pub timestamp: String,
    pub context: EventContext,
    pub level: LogLevel,
    /// Already passed through secret redaction before construction — spec
    /// §7: "any log, event, or error payload must mask API keys."
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusEvent {
    pub execution_id: i64,
    pub timestamp: String,
    pub context: EventContext,
    pub status: ExecutionStatus,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSettledEvent {
    pub execution_id: i64,
    pub mapping_id: MappingId,
    pub timestamp: String,
    pub context: EventContext,
    pub qc_status: QcStatus,
    pub failed_stage: Option<StageName>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryQueueUpdatedEvent {
    pub timestamp: String,
    pub queue_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryProgressEvent {
    pub timestamp: String,
    pub image_id: i64,
    pub current_stage: Option<StageName>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryJobState {
    Queued,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryJobStatusEvent {
    pub timestamp: String,
    pub image_id: i64,
    pub state: RetryJobState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryJobErrorEvent {
    pub timestamp: String,
    pub image_id: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryStoppedEvent {
    pub timestamp: String,
    pub cleared_queue_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZipExportProgressEvent {
    pub timestamp: String,
    /// `None` for an `image:export-zip` spanning images from more than one
    /// execution; `Some` when the export was scoped to one execution.
    pub execution_id: Option<i64>,
    pub archived: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZipExportCompletedEvent {
    pub timestamp: String,
    pub execution_id: Option<i64>,
    pub archive_path: String,
    pub entry_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZipExportErrorEvent {
    pub timestamp: String,
    pub execution_id: Option<i64>,
    /// Already passed through secret redaction before construction.
    pub message: String,
}
