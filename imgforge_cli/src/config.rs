// /////////////////////////////////////////////////////////////////////////////
// imgforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bootstrap Application Configuration
//!
//! Process-level configuration, resolved once at startup from CLI flags and
//! `IMGFORGE_*` environment overrides — distinct from the per-job
//! `Configuration`/`settings` document (spec §6), which is application data
//! the Catalog persists, not process config. Grounded on the teacher's
//! `AppConfig` builder.

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl LogLevel {
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

/// Immutable, resolved bootstrap configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    log_level: LogLevel,
    /// Overrides the OS-convention data directory (spec §6 "Persisted state
    /// layout"); primarily for test isolation, per spec §9's "Shared global
    /// DB path" redesign flag.
    data_dir: Option<PathBuf>,
    /// Mirrors `settings.advanced.debugMode` at the process level so
    /// bootstrap-phase logging (before any job has started) can also be
    /// verbose.
    debug_mode: bool,
}

impl AppConfig {
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn data_dir(&self) -> Option<&PathBuf> {
        self.data_dir.as_ref()
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    /// Resolves `IMGFORGE_DATA_DIR` / `IMGFORGE_LOG_LEVEL` environment
    /// overrides on top of whatever the builder already set, matching the
    /// teacher's "file -> env precedence" documented in `infrastructure::config`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("IMGFORGE_DATA_DIR") {
            if !dir.is_empty() {
                self.data_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(level) = std::env::var("IMGFORGE_LOG_LEVEL") {
            if let Some(parsed) = LogLevel::parse(&level) {
                self.log_level = parsed;
            }
        }
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfigBuilder {
    log_level: LogLevel,
    data_dir: Option<PathBuf>,
    debug_mode: bool,
}

impl AppConfigBuilder {
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn debug_mode(mut self, debug: bool) -> Self {
        self.debug_mode = debug;
        if debug {
            self.log_level = LogLevel::Debug;
        }
        self
    }

    pub fn build(self) -> AppConfig {
        AppConfig {
            log_level: self.log_level,
            data_dir: self.data_dir,
            debug_mode: self.debug_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_to_info() {
        let cfg = AppConfig::builder().build();
        assert_eq!(cfg.log_level(), LogLevel::Info);
        assert!(!cfg.debug_mode());
    }

    #[test]
    fn debug_mode_forces_debug_level() {
        let cfg = AppConfig::builder().debug_mode(true).build();
        assert_eq!(cfg.log_level(), LogLevel::Debug);
    }

    #[test]
    fn parses_known_log_levels() {
        assert_eq!(LogLevel::parse("WARN"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("nonsense"), None);
    }
}
