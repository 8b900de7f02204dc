//! `Execution` — spec §3: a single job run.
//!
//! Invariants enforced by constructors/mutators here, and re-checked by the
//! Catalog before every write (spec §3: "`successful + failed ≤ total`;
//! terminal status requires `completed_at` set").

use serde::{Deserialize, Serialize};

use crate::value_objects::{ExecutionStatus, Settings};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExecutionTotals {
    pub total: u32,
    pub successful: u32,
    pub failed: u32,
}

impl ExecutionTotals {
    pub fn is_consistent(&self) -> bool {
        self.successful + self.failed <= self.total
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: i64,
    /// May be null after the source configuration is deleted (spec §3).
    pub configuration_id: Option<i64>,
    pub status: ExecutionStatus,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub totals: ExecutionTotals,
    pub label: Option<String>,
    pub error_message: Option<String>,
    pub settings_snapshot: Settings,
}

impl Execution {
    /// Spec §3: "terminal status requires `completed_at` set".
    pub fn is_well_formed(&self) -> bool {
        if self.status.is_terminal() && self.completed_at.is_none() {
            return false;
        }
        self.totals.is_consistent()
    }
}

/// Fields for inserting a new execution row (spec §4.6 step 3).
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub configuration_id: Option<i64>,
    pub started_at: String,
    pub total: u32,
    pub label: Option<String>,
    pub settings_snapshot: Settings,
}

/// A partial update applied by the Catalog in a single statement (spec
/// §4.1: `updateExecution(id, fields)`). `None` means "leave unchanged".
#[derive(Debug, Clone, Default)]
pub struct ExecutionUpdate {
    pub status: Option<ExecutionStatus>,
    pub completed_at: Option<Option<String>>,
    pub totals: Option<ExecutionTotals>,
    pub label: Option<Option<String>>,
    pub error_message: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub status: Option<ExecutionStatus>,
    pub label_contains: Option<String>,
    pub started_after: Option<String>,
    pub started_before: Option<String>,
    pub min_total: Option<u32>,
    pub max_total: Option<u32>,
}
