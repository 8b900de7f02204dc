//! `ImageStatistics` — the aggregate counts behind `execution:statistics`
//! and `image:statistics` (SPEC_FULL.md's supplemented-features section):
//! `{total, successful, failed, approved, qcFailed, retryPending, retryFailed}`,
//! derived from `generated_images` the same way `recompute_execution_totals`
//! derives an execution's totals — one Catalog aggregate query, not a loop
//! over `list_images` at the application layer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ImageStatistics {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub approved: u64,
    pub qc_failed: u64,
    pub retry_pending: u64,
    pub retry_failed: u64,
}
