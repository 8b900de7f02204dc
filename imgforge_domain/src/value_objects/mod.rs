// /////////////////////////////////////////////////////////////////////////////
// imgforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain value objects: immutable, self-validating data with no identity
//! of their own.
//!
//! - [`MappingId`] — the retry-stable `(execution, mapping)` key.
//! - [`QcStatus`] / [`ExecutionStatus`] — the two status enums from spec §3.
//! - [`WorkerCount`] — the bounded worker-pool size from spec §4.6.
//! - [`settings::Settings`] — the configuration document (spec §6).
//! - [`processing_settings::ProcessingSettings`] — the per-image flag
//!   snapshot (spec §3) and its retry override.

pub mod execution_status;
pub mod mapping_id;
pub mod processing_settings;
pub mod qc_status;
pub mod settings;
pub mod worker_count;

pub use execution_status::ExecutionStatus;
pub use mapping_id::MappingId;
pub use processing_settings::{ProcessingSettings, ProcessingSettingsOverride};
pub use qc_status::QcStatus;
pub use settings::{
    AdvancedConfig, AiConfig, ApiKeysConfig, ConvertFormat, FailureMode, FilePathsConfig, GenerationProvider,
    ParametersConfig, ProcessMode, ProcessingConfig, RemoveBgSize, Settings,
};
pub use worker_count::WorkerCount;
