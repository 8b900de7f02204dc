// /////////////////////////////////////////////////////////////////////////////
// imgforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker Count
//!
//! A validated bound on how many pipelines `JobRunner` may run concurrently
//! for one execution (spec §4.6 step 5: "a bounded worker pool of size
//! `W = min(4, count)`"). `RetryExecutor` always runs at `WorkerCount::ONE`
//! — spec §4.7: "one worker drains the queue serially".

use serde::{Deserialize, Serialize};

/// Upper bound on concurrent pipelines a single execution may run. Tunable,
/// but the contract is that at most this many `ImageProcessor::process`
/// calls are live at once for one job.
pub const MAX_WORKERS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerCount(usize);

impl WorkerCount {
    pub const ONE: WorkerCount = WorkerCount(1);

    /// `W = min(4, count)`, per spec §4.6. `count` is generations planned for
    /// the execution; zero generations still reserves one worker since the
    /// pool is created before Plan's output is known to be empty.
    pub fn for_job(count: usize) -> Self {
        WorkerCount(count.clamp(1, MAX_WORKERS))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for WorkerCount {
    fn default() -> Self {
        Self::ONE
    }
}

impl std::fmt::Display for WorkerCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_to_max_workers() {
        assert_eq!(WorkerCount::for_job(1).get(), 1);
        assert_eq!(WorkerCount::for_job(3).get(), 3);
        assert_eq!(WorkerCount::for_job(4).get(), 4);
        assert_eq!(WorkerCount::for_job(1000).get(), MAX_WORKERS);
    }

    #[test]
    fn never_zero() {
        assert_eq!(WorkerCount::for_job(0).get(), 1);
    }
}
