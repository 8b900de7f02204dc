// /////////////////////////////////////////////////////////////////////////////
// imgforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Settings — the per-job configuration document
//!
//! `Settings` is the document persisted verbatim in `Configuration.settings`
//! and `Execution.settings_snapshot` (spec §6). It is plain, serde-derived
//! data; validation and clamping live in
//! [`crate::services::validate_settings`] rather than on constructors, so a
//! `Settings` value deserialized from an old snapshot is never rejected just
//! for existing — only a fresh `startJob` call validates.
//!
//! `apiKeys` fields are flags, not secret material: spec §6 says the actual
//! credential is "looked up from SecretsVault; never persisted into the
//! snapshot". A `true` flag here means "this job expects a credential for
//! this service to be present in the vault at stage time".

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessMode {
    Relax,
    Fast,
    Turbo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoveBgSize {
    Auto,
    Preview,
    Full,
    #[serde(rename = "4k")]
    FourK,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    Soft,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvertFormat {
    Png,
    Jpg,
    Webp,
}

/// Which generation provider a stage call targets, resolving the Open
/// Question in spec §9: `piapi` and `runware` are two separate adapters
/// behind one trait, selected by configuration; a job naming both is
/// rejected rather than guessed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    Piapi,
    Runware,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeysConfig {
    #[serde(default)]
    pub openai: bool,
    #[serde(default)]
    pub piapi: bool,
    #[serde(default)]
    pub runware: bool,
    #[serde(default)]
    pub remove_bg: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePathsConfig {
    pub output_directory: PathBuf,
    pub temp_directory: PathBuf,
    pub system_prompt_file: PathBuf,
    pub keywords_file: PathBuf,
    #[serde(default)]
    pub quality_check_prompt_file: Option<PathBuf>,
    #[serde(default)]
    pub metadata_prompt_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParametersConfig {
    pub process_mode: ProcessMode,
    #[serde(default)]
    pub aspect_ratios: Vec<String>,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_polling_timeout")]
    pub polling_timeout: u32,
    #[serde(default)]
    pub enable_polling_timeout: bool,
    #[serde(default)]
    pub keyword_random: bool,
    pub count: u32,
    pub variations: u32,
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

fn default_polling_timeout() -> u32 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default)]
    pub remove_bg: bool,
    #[serde(default = "default_remove_bg_size")]
    pub remove_bg_size: RemoveBgSize,
    #[serde(default = "default_failure_mode")]
    pub remove_bg_failure_mode: FailureMode,
    #[serde(default)]
    pub image_convert: bool,
    #[serde(default)]
    pub convert_to_jpg: bool,
    #[serde(default)]
    pub convert_to_png: bool,
    #[serde(default)]
    pub convert_to_webp: bool,
    #[serde(default = "default_quality")]
    pub jpg_quality: u32,
    #[serde(default = "default_quality")]
    pub png_quality: u32,
    #[serde(default = "default_quality")]
    pub webp_quality: u32,
    #[serde(default)]
    pub jpg_background: Option<String>,
    #[serde(default)]
    pub trim_transparent_background: bool,
    #[serde(default)]
    pub image_enhancement: bool,
    #[serde(default)]
    pub sharpening: f64,
    #[serde(default = "default_saturation")]
    pub saturation: f64,
}

fn default_remove_bg_size() -> RemoveBgSize {
    RemoveBgSize::Auto
}

fn default_failure_mode() -> FailureMode {
    FailureMode::Soft
}

fn default_quality() -> u32 {
    90
}

fn default_saturation() -> f64 {
    1.0
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub run_quality_check: bool,
    #[serde(default)]
    pub run_metadata_gen: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdvancedConfig {
    #[serde(default)]
    pub debug_mode: bool,
}

/// The full configuration document: §6's `apiKeys` / `filePaths` /
/// `parameters` / `processing` / `ai` / `advanced` sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api_keys: ApiKeysConfig,
    pub file_paths: FilePathsConfig,
    pub parameters: ParametersConfig,
    #[serde(default = "ProcessingConfig::default")]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        ProcessingConfig {
            remove_bg: false,
            remove_bg_size: RemoveBgSize::Auto,
            remove_bg_failure_mode: FailureMode::Soft,
            image_convert: false,
            convert_to_jpg: false,
            convert_to_png: false,
            convert_to_webp: false,
            jpg_quality: 90,
            png_quality: 90,
            webp_quality: 90,
            jpg_background: None,
            trim_transparent_background: false,
            image_enhancement: false,
            sharpening: 0.0,
            saturation: 1.0,
        }
    }
}

impl Settings {
    /// The provider this job's generate stage targets, per the Open Question
    /// resolution in spec §9. `None` if neither `piapi` nor `runware` is
    /// configured (e.g. a config that only uses `openai` for other stages).
    pub fn generation_provider(&self) -> Option<GenerationProvider> {
        match (self.api_keys.piapi, self.api_keys.runware) {
            (true, false) => Some(GenerationProvider::Piapi),
            (false, true) => Some(GenerationProvider::Runware),
            _ => None,
        }
    }

    pub fn references_both_providers(&self) -> bool {
        self.api_keys.piapi && self.api_keys.runware
    }

    /// `jpgBackground` only applies when `removeBg ∧ imageConvert ∧
    /// convertToJpg` (spec §6, Feature dependencies).
    pub fn effective_jpg_background(&self) -> Option<&str> {
        if self.processing.remove_bg && self.processing.image_convert && self.processing.convert_to_jpg {
            self.processing.jpg_background.as_deref()
        } else {
            None
        }
    }
}
