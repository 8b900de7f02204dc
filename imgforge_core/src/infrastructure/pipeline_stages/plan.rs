//! `LocalPlanStage` — spec §4.4 stage 1. Reads the keyword corpus and
//! prompt template named by `settings.file_paths` and expands them into one
//! `ParameterSet` per generation (`settings.parameters.count` of them).

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;

use imgforge_domain::error::{StageFailure, StageName};
use imgforge_domain::ports::{ParameterSet, PlanStage};
use imgforge_domain::value_objects::Settings;

pub struct LocalPlanStage;

impl Default for LocalPlanStage {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalPlanStage {
    pub fn new() -> Self {
        Self
    }
}

fn read_keywords(path: &std::path::Path) -> Result<Vec<String>, StageFailure> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| StageFailure::new(StageName::Plan, format!("reading keywords file: {err}")))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

fn read_prompt_template(path: &std::path::Path) -> Result<String, StageFailure> {
    std::fs::read_to_string(path).map_err(|err| StageFailure::new(StageName::Plan, format!("reading prompt template: {err}")))
}

#[async_trait]
impl PlanStage for LocalPlanStage {
    async fn plan(&self, settings: &Settings) -> Result<Vec<ParameterSet>, StageFailure> {
        let keywords = read_keywords(&settings.file_paths.keywords_file)?;
        if keywords.is_empty() {
            return Err(StageFailure::new(StageName::Plan, "keywords file contains no usable lines"));
        }
        let template = read_prompt_template(&settings.file_paths.system_prompt_file)?;

        let mut pool = keywords;
        let mut rng = rand::rng();
        if settings.parameters.keyword_random {
            pool.shuffle(&mut rng);
        }

        let count = settings.parameters.count as usize;
        let mut sets = Vec::with_capacity(count);
        for i in 0..count {
            let keyword = &pool[i % pool.len()];
            let prompt = template.replace("{{keyword}}", keyword);
            let aspect_ratio = if settings.parameters.aspect_ratios.is_empty() {
                None
            } else {
                Some(settings.parameters.aspect_ratios[i % settings.parameters.aspect_ratios.len()].clone())
            };
            sets.push(ParameterSet {
                mapping_id: i as i64 + 1,
                prompt,
                seed: Some(rng.random::<i64>().unsigned_abs() as i64),
                variations: settings.parameters.variations,
                aspect_ratio,
            });
        }
        Ok(sets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    fn sample_settings(keywords_path: std::path::PathBuf, prompt_path: std::path::PathBuf) -> Settings {
        use imgforge_domain::value_objects::settings::{ApiKeysConfig, FilePathsConfig, ParametersConfig, ProcessMode};
        Settings {
            api_keys: ApiKeysConfig::default(),
            file_paths: FilePathsConfig {
                output_directory: "/tmp/out".into(),
                temp_directory: "/tmp/work".into(),
                system_prompt_file: prompt_path,
                keywords_file: keywords_path,
                quality_check_prompt_file: None,
                metadata_prompt_file: None,
            },
            parameters: ParametersConfig {
                process_mode: ProcessMode::Fast,
                aspect_ratios: vec!["1:1".into(), "16:9".into()],
                openai_model: "gpt-4o".into(),
                polling_timeout: 60,
                enable_polling_timeout: false,
                keyword_random: false,
                count: 3,
                variations: 2,
            },
            processing: Default::default(),
            ai: Default::default(),
            advanced: Default::default(),
        }
    }

    #[tokio::test]
    async fn plans_one_parameter_set_per_count_with_cycled_keywords() {
        let keywords = write_temp("fox\nbear\n");
        let prompt = write_temp("a photo of a {{keyword}}");
        let settings = sample_settings(keywords.path().to_path_buf(), prompt.path().to_path_buf());

        let stage = LocalPlanStage::new();
        let sets = stage.plan(&settings).await.unwrap();

        assert_eq!(sets.len(), 3);
        assert_eq!(sets[0].prompt, "a photo of a fox");
        assert_eq!(sets[1].prompt, "a photo of a bear");
        assert_eq!(sets[2].prompt, "a photo of a fox");
        assert_eq!(sets[0].mapping_id, 1);
        assert_eq!(sets[0].variations, 2);
        assert_eq!(sets[0].aspect_ratio.as_deref(), Some("1:1"));
        assert_eq!(sets[1].aspect_ratio.as_deref(), Some("16:9"));
    }

    #[tokio::test]
    async fn rejects_empty_keywords_file() {
        let keywords = write_temp("\n \n");
        let prompt = write_temp("x");
        let settings = sample_settings(keywords.path().to_path_buf(), prompt.path().to_path_buf());

        let stage = LocalPlanStage::new();
        let err = stage.plan(&settings).await.unwrap_err();
        assert_eq!(err.stage, StageName::Plan);
    }
}
