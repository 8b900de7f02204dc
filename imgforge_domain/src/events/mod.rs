//! Event bus topics and payloads (spec §4.3).
//!
//! These types are pure data — the bus itself (pub/sub plumbing, drop
//! policies, subscriber detachment) is an infrastructure concern
//! implemented in `imgforge_core::application::services::event_bus`.

mod domain_events;

pub use domain_events::{
    EventContext, ImageSettledEvent, JobLogEvent, JobProgressEvent, JobStatusEvent, LogLevel, RetryJobErrorEvent,
    RetryJobState, RetryJobStatusEvent, RetryProgressEvent, RetryQueueUpdatedEvent, RetryStoppedEvent, Topic,
    ZipExportCompletedEvent, ZipExportErrorEvent, ZipExportProgressEvent,
};
