// /////////////////////////////////////////////////////////////////////////////
// imgforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Configuration
//!
//! Process-level runtime tunables for the infrastructure layer — worker pool
//! sizing defaults, HTTP client timeouts, and the data directory the Catalog
//! and SecretsVault resolve against. Loaded by layering a default TOML, an
//! optional user file, and `IMGFORGE_*` environment overrides, file → env
//! precedence, the way the teacher's `infrastructure::config` module
//! documents.
//!
//! This is distinct from the per-job `Configuration`/`settings` document
//! (`imgforge_domain::value_objects::settings::Settings`), which is
//! application data the Catalog persists, not process configuration.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InfraConfig {
    /// Overrides the OS-convention data directory; see `infrastructure::paths`.
    pub data_dir: Option<String>,
    /// Hard cap on the JobRunner worker pool (spec §4.6 `W = min(4, count)`).
    pub max_workers: usize,
    /// Per-request HTTP client timeout, in seconds, for provider calls.
    pub http_timeout_secs: u64,
    /// Whether the tier-3 plaintext secrets fallback is permitted at all.
    /// Defaults to `false`; only enabled by explicit dev configuration.
    pub allow_plaintext_secrets: bool,
    /// Enables the `/metrics` Prometheus endpoint.
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

impl Default for InfraConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            max_workers: 4,
            http_timeout_secs: 60,
            allow_plaintext_secrets: false,
            metrics_enabled: false,
            metrics_port: 9898,
        }
    }
}

impl InfraConfig {
    /// Loads configuration by layering, in increasing precedence:
    /// 1. compiled-in defaults
    /// 2. an optional `imgforge.toml` in the current directory
    /// 3. `IMGFORGE_*` environment variables (e.g. `IMGFORGE_MAX_WORKERS=2`)
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("imgforge").required(false))
            .add_source(config::Environment::with_prefix("IMGFORGE").separator("__"));

        builder.build()?.try_deserialize()
    }
}
