//! `JobAggregate` — the state machine driving one execution (spec §4.6).
//!
//! Grounded on the teacher's `PipelineAggregate`: a versioned aggregate root
//! that raises events for every state transition and exposes
//! `uncommitted_events`/`mark_events_as_committed` so a caller can persist
//! exactly the events produced by one transition. Unlike the teacher's
//! aggregate this one is transient (spec §3: "`Job` ... never persisted
//! as-is") — `JobRunner` drives it in memory and only the `Execution` row it
//! mirrors is durable.
//!
//! State machine: `idle → starting → running → (stopping | completing) →
//! terminal{completed|stopped|failed}`. Terminal is a sink; only one
//! non-terminal run may exist per `JobAggregate` instance, matching spec
//! §4.6: "concurrent `startJob` while non-terminal fails with
//! `AlreadyRunning`."

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, StageName};
use crate::value_objects::ExecutionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Idle,
    Starting,
    Running,
    Stopping,
    Completing,
    Terminal(ExecutionStatus),
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Terminal(_))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct JobProgress {
    pub generations_planned: u32,
    pub generations_done: u32,
    pub images_done: u32,
    pub images_total: u32,
}

/// Events raised by [`JobAggregate`] transitions. Consumed by `JobRunner` to
/// drive Catalog writes and event-bus emission; never persisted as an event
/// log themselves (the Execution row is the durable record of outcomes).
#[derive(Debug, Clone)]
pub enum JobEvent {
    Started { execution_id: i64 },
    ImageSettled { images_done: u32, images_total: u32 },
    StageEntered { stage: StageName },
    StopRequested,
    ForceStopRequested,
    Completed { status: ExecutionStatus },
}

/// The in-memory aggregate root for one execution run.
#[derive(Debug, Clone)]
pub struct JobAggregate {
    execution_id: i64,
    state: JobState,
    progress: JobProgress,
    version: u64,
    uncommitted: Vec<JobEvent>,
}

impl JobAggregate {
    pub fn new(execution_id: i64) -> Self {
        JobAggregate {
            execution_id,
            state: JobState::Idle,
            progress: JobProgress::default(),
            version: 0,
            uncommitted: Vec::new(),
        }
    }

    pub fn execution_id(&self) -> i64 {
        self.execution_id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn progress(&self) -> JobProgress {
        self.progress
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Drains events raised since the last call, incrementing the aggregate
    /// version by one per call (not per event) — mirrors the teacher's
    /// `mark_events_as_committed` contract.
    pub fn take_uncommitted_events(&mut self) -> Vec<JobEvent> {
        if !self.uncommitted.is_empty() {
            self.version += 1;
        }
        std::mem::take(&mut self.uncommitted)
    }

    fn raise(&mut self, event: JobEvent) {
        self.uncommitted.push(event);
    }

    /// `idle → starting`. Fails with `AlreadyRunning` (spec §4.6) unless the
    /// aggregate is fresh or already terminal.
    pub fn start(&mut self, generations_planned: u32, images_total: u32) -> Result<(), DomainError> {
        match self.state {
            JobState::Idle | JobState::Terminal(_) => {
                self.state = JobState::Starting;
                self.progress = JobProgress {
                    generations_planned,
                    generations_done: 0,
                    images_done: 0,
                    images_total,
                };
                self.raise(JobEvent::Started {
                    execution_id: self.execution_id,
                });
                Ok(())
            }
            _ => Err(DomainError::Internal("AlreadyRunning".to_string())),
        }
    }

    /// `starting → running`, once Plan has produced parameter sets and the
    /// worker pool is live.
    pub fn mark_running(&mut self) -> Result<(), DomainError> {
        if self.state != JobState::Starting {
            return Err(DomainError::Internal(format!(
                "cannot mark running from state {:?}",
                self.state
            )));
        }
        self.state = JobState::Running;
        Ok(())
    }

    /// Records one settled image (success or failure), bumping
    /// `images_done`. Valid from `running` or `stopping` — a drain in
    /// progress still settles in-flight images.
    pub fn record_image_settled(&mut self) -> Result<(), DomainError> {
        if !matches!(self.state, JobState::Running | JobState::Stopping) {
            return Err(DomainError::Internal(format!(
                "cannot settle an image from state {:?}",
                self.state
            )));
        }
        self.progress.images_done += 1;
        self.raise(JobEvent::ImageSettled {
            images_done: self.progress.images_done,
            images_total: self.progress.images_total,
        });
        Ok(())
    }

    pub fn enter_stage(&mut self, stage: StageName) {
        self.raise(JobEvent::StageEntered { stage });
    }

    /// `running → stopping`, cooperative: in-flight pipelines finish or are
    /// cancelled, no forced teardown (spec §4.6 step 7).
    pub fn request_stop(&mut self) -> Result<(), DomainError> {
        if !matches!(self.state, JobState::Starting | JobState::Running) {
            return Err(DomainError::Internal(format!("cannot stop from state {:?}", self.state)));
        }
        self.state = JobState::Stopping;
        self.raise(JobEvent::StopRequested);
        Ok(())
    }

    /// `forceStopAll`: tears down the pool without waiting for graceful
    /// drain (spec §4.6 step 7). Valid from any non-terminal state.
    pub fn force_stop(&mut self) -> Result<(), DomainError> {
        if self.state.is_terminal() {
            return Err(DomainError::Internal("already terminal".to_string()));
        }
        self.state = JobState::Stopping;
        self.raise(JobEvent::ForceStopRequested);
        Ok(())
    }

    /// Marks the run terminal. The terminal status update must be the last
    /// write for the execution (spec §4.6 "Ordering guarantees").
    pub fn complete(&mut self, status: ExecutionStatus) -> Result<(), DomainError> {
        if self.state.is_terminal() {
            return Err(DomainError::Internal("already terminal".to_string()));
        }
        if !status.is_terminal() {
            return Err(DomainError::Internal(format!(
                "{status} is not a terminal execution status"
            )));
        }
        self.state = JobState::Terminal(status);
        self.raise(JobEvent::Completed { status });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let mut job = JobAggregate::new(1);
        job.start(2, 2).unwrap();
        job.mark_running().unwrap();
        job.record_image_settled().unwrap();
        job.record_image_settled().unwrap();
        job.complete(ExecutionStatus::Completed).unwrap();
        assert!(job.state().is_terminal());
        assert_eq!(job.progress().images_done, 2);
    }

    #[test]
    fn rejects_double_start_while_running() {
        let mut job = JobAggregate::new(1);
        job.start(1, 1).unwrap();
        job.mark_running().unwrap();
        let err = job.start(1, 1).unwrap_err();
        assert!(matches!(err, DomainError::Internal(msg) if msg == "AlreadyRunning"));
    }

    #[test]
    fn stop_then_complete_stopped() {
        let mut job = JobAggregate::new(1);
        job.start(5, 5).unwrap();
        job.mark_running().unwrap();
        job.record_image_settled().unwrap();
        job.request_stop().unwrap();
        job.record_image_settled().unwrap();
        job.complete(ExecutionStatus::Stopped).unwrap();
        assert_eq!(job.state(), JobState::Terminal(ExecutionStatus::Stopped));
    }

    #[test]
    fn terminal_is_a_sink() {
        let mut job = JobAggregate::new(1);
        job.start(1, 1).unwrap();
        job.mark_running().unwrap();
        job.complete(ExecutionStatus::Completed).unwrap();
        assert!(job.complete(ExecutionStatus::Failed).is_err());
        assert!(job.request_stop().is_err());
    }

    #[test]
    fn draining_events_bumps_version_once() {
        let mut job = JobAggregate::new(1);
        job.start(1, 1).unwrap();
        let events = job.take_uncommitted_events();
        assert_eq!(events.len(), 1);
        assert_eq!(job.version(), 1);
        assert!(job.take_uncommitted_events().is_empty());
        assert_eq!(job.version(), 1);
    }
}
