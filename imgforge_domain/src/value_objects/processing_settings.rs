//! `ProcessingSettings` — the per-image snapshot of "which flags were
//! actually used" (spec §3: `processing_settings` JSON, "snapshot of
//! per-image flags used, so retry can re-use 'original settings'").
//!
//! This is deliberately a flatter, narrower structure than [`super::settings::Settings`]:
//! it records outcomes of stage decisions (did remove-bg actually apply?)
//! alongside the input flags, because scenario 4 in spec §8 requires
//! `processing_settings.removeBg_applied=false` to be observable after a
//! soft-policy failure even though the job's `removeBg` input was `true`.

use serde::{Deserialize, Serialize};

use super::settings::{FailureMode, RemoveBgSize, Settings};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingSettings {
    pub remove_bg_requested: bool,
    pub remove_bg_applied: bool,
    pub remove_bg_size: RemoveBgSize,
    pub remove_bg_failure_mode: FailureMode,
    pub trim_transparent_background: bool,
    pub image_enhancement: bool,
    pub sharpening: f64,
    pub saturation: f64,
    pub image_convert: bool,
    pub convert_to_jpg: bool,
    pub convert_to_png: bool,
    pub convert_to_webp: bool,
    pub jpg_quality: u32,
    pub png_quality: u32,
    pub webp_quality: u32,
    pub jpg_background: Option<String>,
    pub run_quality_check: bool,
    pub run_metadata_gen: bool,
}

impl ProcessingSettings {
    /// The per-image snapshot taken at the start of a fresh (non-retry)
    /// pipeline run: every `processing`/`ai` flag copied verbatim from the
    /// job's settings, with `remove_bg_applied` starting `false` since no
    /// stage has run yet.
    pub fn baseline(settings: &Settings) -> ProcessingSettings {
        let p = &settings.processing;
        ProcessingSettings {
            remove_bg_requested: p.remove_bg,
            remove_bg_applied: false,
            remove_bg_size: p.remove_bg_size,
            remove_bg_failure_mode: p.remove_bg_failure_mode,
            trim_transparent_background: p.trim_transparent_background,
            image_enhancement: p.image_enhancement,
            sharpening: p.sharpening,
            saturation: p.saturation,
            image_convert: p.image_convert,
            convert_to_jpg: p.convert_to_jpg,
            convert_to_png: p.convert_to_png,
            convert_to_webp: p.convert_to_webp,
            jpg_quality: p.jpg_quality,
            png_quality: p.png_quality,
            webp_quality: p.webp_quality,
            jpg_background: p.jpg_background.clone(),
            run_quality_check: settings.ai.run_quality_check,
            run_metadata_gen: settings.ai.run_metadata_gen,
        }
    }

    /// Merges `override_settings` on top of `self` field-by-field, per spec
    /// §4.7 step 2: "original ∪ override (override wins field-by-field)".
    /// `None` fields in the override leave the original value untouched.
    pub fn merged_with(&self, overrides: &ProcessingSettingsOverride) -> ProcessingSettings {
        let mut merged = self.clone();
        if let Some(v) = overrides.remove_bg_requested {
            merged.remove_bg_requested = v;
        }
        if let Some(v) = overrides.remove_bg_size {
            merged.remove_bg_size = v;
        }
        if let Some(v) = overrides.trim_transparent_background {
            merged.trim_transparent_background = v;
        }
        if let Some(v) = overrides.image_enhancement {
            merged.image_enhancement = v;
        }
        if let Some(v) = overrides.sharpening {
            merged.sharpening = v.clamp(0.0, 10.0);
        }
        if let Some(v) = overrides.saturation {
            merged.saturation = v.clamp(0.0, 3.0);
        }
        if let Some(v) = overrides.image_convert {
            merged.image_convert = v;
        }
        if let Some(v) = overrides.convert_to_jpg {
            merged.convert_to_jpg = v;
        }
        if let Some(v) = overrides.run_quality_check {
            merged.run_quality_check = v;
        }
        if let Some(v) = overrides.run_metadata_gen {
            merged.run_metadata_gen = v;
        }
        // remove_bg_applied is an outcome field, recomputed by the pipeline
        // itself; it never carries over from a prior run or an override.
        merged.remove_bg_applied = false;
        merged
    }
}

/// A retry's partial override of [`ProcessingSettings`]; every field is
/// optional so "unset" can be distinguished from "set to the default".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingSettingsOverride {
    pub remove_bg_requested: Option<bool>,
    pub remove_bg_size: Option<RemoveBgSize>,
    pub trim_transparent_background: Option<bool>,
    pub image_enhancement: Option<bool>,
    pub sharpening: Option<f64>,
    pub saturation: Option<f64>,
    pub image_convert: Option<bool>,
    pub convert_to_jpg: Option<bool>,
    pub run_quality_check: Option<bool>,
    pub run_metadata_gen: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::settings::{ApiKeysConfig, FilePathsConfig, ParametersConfig, ProcessMode};
    use std::path::PathBuf;

    fn sample_settings() -> Settings {
        Settings {
            api_keys: ApiKeysConfig::default(),
            file_paths: FilePathsConfig {
                output_directory: PathBuf::from("/tmp/out"),
                temp_directory: PathBuf::from("/tmp/tmp"),
                system_prompt_file: PathBuf::from("/tmp/sys.txt"),
                keywords_file: PathBuf::from("/tmp/kw.txt"),
                quality_check_prompt_file: None,
                metadata_prompt_file: None,
            },
            parameters: ParametersConfig {
                process_mode: ProcessMode::Fast,
                aspect_ratios: vec![],
                openai_model: "gpt-4o".into(),
                polling_timeout: 60,
                enable_polling_timeout: false,
                keyword_random: false,
                count: 1,
                variations: 1,
            },
            processing: Default::default(),
            ai: Default::default(),
            advanced: Default::default(),
        }
    }

    #[test]
    fn baseline_copies_flags_with_remove_bg_not_yet_applied() {
        let mut settings = sample_settings();
        settings.processing.remove_bg = true;
        settings.ai.run_quality_check = true;

        let baseline = ProcessingSettings::baseline(&settings);
        assert!(baseline.remove_bg_requested);
        assert!(!baseline.remove_bg_applied);
        assert!(baseline.run_quality_check);
    }

    #[test]
    fn merge_resets_remove_bg_applied_even_when_unset_in_override() {
        let mut settings = sample_settings();
        settings.processing.remove_bg = true;
        let mut baseline = ProcessingSettings::baseline(&settings);
        baseline.remove_bg_applied = true;

        let merged = baseline.merged_with(&ProcessingSettingsOverride::default());
        assert!(!merged.remove_bg_applied);
    }
}
