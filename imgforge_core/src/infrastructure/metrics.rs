// /////////////////////////////////////////////////////////////////////////////
// imgforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics
//!
//! Prometheus counters and gauges for the three things SPEC_FULL.md's
//! ambient stack section calls out: retry queue depth, worker pool
//! utilization, and per-stage failure counts. This is observability, not
//! the spec's distributed-scheduling non-goal, so it stays in scope even
//! though no Non-goal names it directly.
//!
//! Exposed behind an opt-in `/metrics` endpoint (`InfraConfig::metrics_enabled`)
//! served from a plain blocking `TcpListener` thread — the teacher's own
//! metrics endpoint pulls in an HTTP server dependency this workspace's
//! stack doesn't otherwise need, so a minimal hand-rolled responder avoids
//! adding one just to print a text/plain Prometheus exposition.

use std::io::Write;
use std::net::TcpListener;
use std::sync::Arc;

use prometheus::{IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

/// Process-wide metrics registry and the handles `JobRunner`/`RetryExecutor`
/// update as they run.
#[derive(Clone)]
pub struct JobMetrics {
    registry: Registry,
    pub active_workers: IntGauge,
    pub retry_queue_depth: IntGauge,
    pub stage_failures_total: IntCounterVec,
    pub images_settled_total: IntCounterVec,
}

impl JobMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let active_workers =
            IntGauge::new("imgforge_active_workers", "Number of JobRunner pipelines currently in flight")
                .expect("static metric name/help is valid");
        let retry_queue_depth =
            IntGauge::new("imgforge_retry_queue_depth", "Number of images waiting in the retry queue")
                .expect("static metric name/help is valid");
        let stage_failures_total = IntCounterVec::new(
            Opts::new("imgforge_stage_failures_total", "Pipeline stage failures by stage name"),
            &["stage"],
        )
        .expect("static metric name/help is valid");
        let images_settled_total = IntCounterVec::new(
            Opts::new("imgforge_images_settled_total", "Settled images by outcome (approved/qc_failed/failed)"),
            &["outcome"],
        )
        .expect("static metric name/help is valid");

        registry.register(Box::new(active_workers.clone())).expect("first registration of this metric");
        registry.register(Box::new(retry_queue_depth.clone())).expect("first registration of this metric");
        registry
            .register(Box::new(stage_failures_total.clone()))
            .expect("first registration of this metric");
        registry
            .register(Box::new(images_settled_total.clone()))
            .expect("first registration of this metric");

        Self {
            registry,
            active_workers,
            retry_queue_depth,
            stage_failures_total,
            images_settled_total,
        }
    }

    fn render(&self) -> String {
        let metric_families = self.registry.gather();
        TextEncoder::new()
            .encode_to_string(&metric_families)
            .unwrap_or_else(|e| format!("# encode error: {e}\n"))
    }

    /// Spawns a blocking thread that answers every connection on `port`
    /// with the current Prometheus exposition text, ignoring the request
    /// line entirely (the endpoint has exactly one resource). Intended for
    /// `InfraConfig::metrics_enabled` at process startup.
    pub fn serve(self: Arc<Self>, port: u16) -> std::io::Result<()> {
        let listener = TcpListener::bind(("127.0.0.1", port))?;
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let body = self.render();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        Ok(())
    }
}

impl Default for JobMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_registered_metric_names() {
        let metrics = JobMetrics::new();
        metrics.active_workers.set(3);
        metrics.stage_failures_total.with_label_values(&["download"]).inc();

        let text = metrics.render();
        assert!(text.contains("imgforge_active_workers 3"));
        assert!(text.contains("imgforge_stage_failures_total"));
    }
}
