//! `InMemoryCatalog` — a `CatalogRepository` test fake, grounded on the same
//! role the teacher's in-memory adapters play in its own test suite: fast,
//! deterministic storage that exercises calling code without a real
//! database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use imgforge_domain::entities::{
    Configuration, Execution, ExecutionFilter, ExecutionTotals, ExecutionUpdate, GeneratedImage, ImageFilter,
    ImageStatistics, ImageUpdate, NewConfiguration, NewExecution, NewGeneratedImage,
};
use imgforge_domain::error::{CatalogErrorKind, DomainError};
use imgforge_domain::ports::CatalogRepository;
use imgforge_domain::services::datetime::now_iso8601;
use imgforge_domain::value_objects::{MappingId, QcStatus};

#[derive(Default)]
struct State {
    next_configuration_id: i64,
    next_execution_id: i64,
    next_image_id: i64,
    configurations: HashMap<i64, Configuration>,
    executions: HashMap<i64, Execution>,
    images: HashMap<i64, GeneratedImage>,
}

/// An in-process `CatalogRepository`, for unit tests of `JobRunner`,
/// `RetryExecutor`, and the `Adapter` that don't need real persistence.
pub struct InMemoryCatalog {
    state: Mutex<State>,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn save_configuration(&self, config: NewConfiguration) -> Result<i64, DomainError> {
        let mut state = self.state.lock().unwrap();
        let now = now_iso8601();
        if let Some(existing) = state
            .configurations
            .values()
            .find(|c| c.name == config.name)
            .map(|c| c.id)
        {
            let entry = state.configurations.get_mut(&existing).unwrap();
            entry.settings = config.settings;
            entry.updated_at = now;
            return Ok(existing);
        }
        state.next_configuration_id += 1;
        let id = state.next_configuration_id;
        state.configurations.insert(
            id,
            Configuration {
                id,
                name: config.name,
                settings: config.settings,
                created_at: now.clone(),
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn get_configuration(&self, id: i64) -> Result<Option<Configuration>, DomainError> {
        Ok(self.state.lock().unwrap().configurations.get(&id).cloned())
    }

    async fn get_configuration_by_name(&self, name: &str) -> Result<Option<Configuration>, DomainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .configurations
            .values()
            .find(|c| c.name == name)
            .cloned())
    }

    async fn list_configurations(&self) -> Result<Vec<Configuration>, DomainError> {
        let mut configs: Vec<Configuration> = self.state.lock().unwrap().configurations.values().cloned().collect();
        configs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(configs)
    }

    async fn delete_configuration(&self, id: i64) -> Result<(), DomainError> {
        self.state.lock().unwrap().configurations.remove(&id);
        Ok(())
    }

    async fn rename_configuration(&self, id: i64, new_name: &str) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        let now = now_iso8601();
        let config = state
            .configurations
            .get_mut(&id)
            .ok_or_else(|| DomainError::configuration(format!("configuration {id} not found")))?;
        config.name = new_name.to_string();
        config.updated_at = now;
        Ok(())
    }

    async fn save_execution(&self, execution: NewExecution) -> Result<i64, DomainError> {
        let mut state = self.state.lock().unwrap();
        state.next_execution_id += 1;
        let id = state.next_execution_id;
        state.executions.insert(
            id,
            Execution {
                id,
                configuration_id: execution.configuration_id,
                status: imgforge_domain::value_objects::ExecutionStatus::Pending,
                started_at: execution.started_at,
                completed_at: None,
                totals: ExecutionTotals {
                    total: execution.total,
                    successful: 0,
                    failed: 0,
                },
                label: execution.label,
                error_message: None,
                settings_snapshot: execution.settings_snapshot,
            },
        );
        Ok(id)
    }

    async fn update_execution(&self, id: i64, update: ExecutionUpdate) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .executions
            .get_mut(&id)
            .ok_or_else(|| DomainError::catalog(CatalogErrorKind::Constraint, format!("no execution {id}")))?;
        if let Some(status) = update.status {
            entry.status = status;
        }
        if let Some(completed_at) = update.completed_at {
            entry.completed_at = completed_at;
        }
        if let Some(totals) = update.totals {
            entry.totals = totals;
        }
        if let Some(label) = update.label {
            entry.label = label;
        }
        if let Some(error_message) = update.error_message {
            entry.error_message = error_message;
        }
        Ok(())
    }

    async fn delete_execution(&self, id: i64) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        state.executions.remove(&id);
        // Mirrors the `ON DELETE SET NULL` foreign key in `0001_init.sql`:
        // the image row survives, only its execution link is cleared.
        for image in state.images.values_mut() {
            if image.execution_id == Some(id) {
                image.execution_id = None;
            }
        }
        Ok(())
    }

    async fn get_execution(&self, id: i64) -> Result<Option<Execution>, DomainError> {
        Ok(self.state.lock().unwrap().executions.get(&id).cloned())
    }

    async fn list_executions(
        &self,
        filter: ExecutionFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Execution>, DomainError> {
        let mut executions: Vec<Execution> = self
            .state
            .lock()
            .unwrap()
            .executions
            .values()
            .filter(|e| matches_execution_filter(e, &filter))
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        let start = (page as u64 * page_size as u64) as usize;
        Ok(executions.into_iter().skip(start).take(page_size as usize).collect())
    }

    async fn count_executions(&self, filter: ExecutionFilter) -> Result<u64, DomainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .executions
            .values()
            .filter(|e| matches_execution_filter(e, &filter))
            .count() as u64)
    }

    async fn save_image(&self, image: NewGeneratedImage) -> Result<i64, DomainError> {
        let mut state = self.state.lock().unwrap();
        state.next_image_id += 1;
        let id = state.next_image_id;
        state.images.insert(
            id,
            GeneratedImage {
                id,
                execution_id: image.execution_id,
                mapping_id: image.mapping_id,
                prompt: image.prompt,
                seed: image.seed,
                qc_status: image.qc_status,
                qc_reason: image.qc_reason,
                final_path: image.final_path,
                metadata: image.metadata,
                processing_settings: image.processing_settings,
                created_at: now_iso8601(),
            },
        );
        Ok(id)
    }

    async fn update_image(&self, id: i64, update: ImageUpdate) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .images
            .get_mut(&id)
            .ok_or_else(|| DomainError::catalog(CatalogErrorKind::Constraint, format!("no image {id}")))?;
        apply_image_update(entry, update);
        Ok(())
    }

    async fn update_image_by_mapping(
        &self,
        execution_id: i64,
        mapping_id: MappingId,
        update: ImageUpdate,
    ) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .images
            .values_mut()
            .find(|i| i.execution_id == Some(execution_id) && i.mapping_id == mapping_id)
            .ok_or_else(|| {
                DomainError::catalog(
                    CatalogErrorKind::Constraint,
                    format!("no image row for execution {execution_id}, mapping {mapping_id}"),
                )
            })?;
        apply_image_update(entry, update);
        Ok(())
    }

    async fn get_image(&self, id: i64) -> Result<Option<GeneratedImage>, DomainError> {
        Ok(self.state.lock().unwrap().images.get(&id).cloned())
    }

    async fn get_image_by_mapping(
        &self,
        execution_id: i64,
        mapping_id: MappingId,
    ) -> Result<Option<GeneratedImage>, DomainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .images
            .values()
            .find(|i| i.execution_id == Some(execution_id) && i.mapping_id == mapping_id)
            .cloned())
    }

    async fn list_images(&self, filter: ImageFilter) -> Result<Vec<GeneratedImage>, DomainError> {
        let mut images: Vec<GeneratedImage> = self
            .state
            .lock()
            .unwrap()
            .images
            .values()
            .filter(|i| {
                filter.execution_id.map_or(true, |id| i.execution_id == Some(id))
                    && filter.qc_status.map_or(true, |status| i.qc_status == status)
            })
            .cloned()
            .collect();
        images.sort_by_key(|i| i.mapping_id);
        Ok(images)
    }

    async fn bulk_delete_images(&self, ids: &[i64]) -> Result<u64, DomainError> {
        let mut state = self.state.lock().unwrap();
        let mut removed = 0u64;
        for id in ids {
            if state.images.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn recompute_execution_totals(&self, id: i64) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        let total = state.executions.get(&id).map(|e| e.totals.total).unwrap_or(0);
        let successful = state
            .images
            .values()
            .filter(|i| i.execution_id == Some(id) && i.final_path.is_some())
            .count() as u32;
        let failed = total.saturating_sub(successful);
        if let Some(entry) = state.executions.get_mut(&id) {
            entry.totals = ExecutionTotals {
                total,
                successful,
                failed,
            };
        }
        Ok(())
    }

    async fn image_statistics(&self, execution_id: Option<i64>) -> Result<ImageStatistics, DomainError> {
        let state = self.state.lock().unwrap();
        let mut stats = ImageStatistics::default();
        for image in state.images.values() {
            if let Some(id) = execution_id {
                if image.execution_id != Some(id) {
                    continue;
                }
            }
            stats.total += 1;
            if image.final_path.is_some() {
                stats.successful += 1;
            } else {
                stats.failed += 1;
            }
            match image.qc_status {
                QcStatus::Approved => stats.approved += 1,
                QcStatus::QcFailed => stats.qc_failed += 1,
                QcStatus::RetryPending => stats.retry_pending += 1,
                QcStatus::RetryFailed => stats.retry_failed += 1,
                QcStatus::Pending => {}
            }
        }
        Ok(stats)
    }
}

fn matches_execution_filter(execution: &Execution, filter: &ExecutionFilter) -> bool {
    if let Some(status) = filter.status {
        if execution.status != status {
            return false;
        }
    }
    if let Some(contains) = &filter.label_contains {
        if !execution.label.as_deref().unwrap_or_default().contains(contains.as_str()) {
            return false;
        }
    }
    if let Some(after) = &filter.started_after {
        if execution.started_at < *after {
            return false;
        }
    }
    if let Some(before) = &filter.started_before {
        if execution.started_at > *before {
            return false;
        }
    }
    if let Some(min_total) = filter.min_total {
        if execution.totals.total < min_total {
            return false;
        }
    }
    if let Some(max_total) = filter.max_total {
        if execution.totals.total > max_total {
            return false;
        }
    }
    true
}

fn apply_image_update(entry: &mut GeneratedImage, update: ImageUpdate) {
    if let Some(qc_status) = update.qc_status {
        entry.qc_status = qc_status;
    }
    if let Some(qc_reason) = update.qc_reason {
        entry.qc_reason = qc_reason;
    }
    if let Some(final_path) = update.final_path {
        entry.final_path = final_path;
    }
    if let Some(metadata) = update.metadata {
        entry.metadata = metadata;
    }
    if let Some(processing_settings) = update.processing_settings {
        entry.processing_settings = processing_settings;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgforge_domain::value_objects::settings::{ApiKeysConfig, FilePathsConfig, ParametersConfig, ProcessMode};
    use imgforge_domain::value_objects::{ProcessingSettings, QcStatus, Settings};

    fn sample_settings() -> Settings {
        Settings {
            api_keys: ApiKeysConfig::default(),
            file_paths: FilePathsConfig {
                output_directory: "/tmp/out".into(),
                temp_directory: "/tmp/work".into(),
                system_prompt_file: "/tmp/prompt.txt".into(),
                keywords_file: "/tmp/keywords.txt".into(),
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

    fn sample_processing_settings() -> ProcessingSettings {
        ProcessingSettings {
            remove_bg_requested: false,
            remove_bg_applied: false,
            remove_bg_size: imgforge_domain::value_objects::settings::RemoveBgSize::Auto,
            remove_bg_failure_mode: imgforge_domain::value_objects::settings::FailureMode::Soft,
            trim_transparent_background: false,
            image_enhancement: false,
            sharpening: 0.0,
            saturation: 1.0,
            image_convert: false,
            convert_to_jpg: false,
            convert_to_png: false,
            convert_to_webp: false,
            jpg_quality: 90,
            png_quality: 90,
            webp_quality: 90,
            jpg_background: None,
            run_quality_check: false,
            run_metadata_gen: false,
        }
    }

    #[tokio::test]
    async fn save_configuration_upserts_by_name() {
        let catalog = InMemoryCatalog::new();
        let first = catalog
            .save_configuration(NewConfiguration {
                name: "preset".into(),
                settings: sample_settings(),
            })
            .await
            .unwrap();
        let second = catalog
            .save_configuration(NewConfiguration {
                name: "preset".into(),
                settings: sample_settings(),
            })
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn rename_configuration_preserves_id() {
        let catalog = InMemoryCatalog::new();
        let id = catalog
            .save_configuration(NewConfiguration { name: "old-name".into(), settings: sample_settings() })
            .await
            .unwrap();

        catalog.rename_configuration(id, "new-name").await.unwrap();

        let renamed = catalog.get_configuration(id).await.unwrap().unwrap();
        assert_eq!(renamed.id, id);
        assert_eq!(renamed.name, "new-name");
        assert!(catalog.get_configuration_by_name("old-name").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rename_configuration_rejects_missing_id() {
        let catalog = InMemoryCatalog::new();
        assert!(catalog.rename_configuration(999, "whatever").await.is_err());
    }

    #[tokio::test]
    async fn update_image_by_mapping_requires_existing_row() {
        let catalog = InMemoryCatalog::new();
        let err = catalog
            .update_image_by_mapping(1, MappingId(1), ImageUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Catalog { .. }));
    }

    #[tokio::test]
    async fn recompute_execution_totals_counts_persisted_paths() {
        let catalog = InMemoryCatalog::new();
        let execution_id = catalog
            .save_execution(NewExecution {
                configuration_id: None,
                started_at: now_iso8601(),
                total: 2,
                label: None,
                settings_snapshot: sample_settings(),
            })
            .await
            .unwrap();
        catalog
            .save_image(NewGeneratedImage {
                execution_id: Some(execution_id),
                mapping_id: MappingId(1),
                prompt: "x".into(),
                seed: None,
                qc_status: QcStatus::Approved,
                qc_reason: None,
                final_path: Some("/out/1.png".into()),
                metadata: None,
                processing_settings: sample_processing_settings(),
            })
            .await
            .unwrap();

        catalog.recompute_execution_totals(execution_id).await.unwrap();
        let execution = catalog.get_execution(execution_id).await.unwrap().unwrap();
        assert_eq!(execution.totals.successful, 1);
        assert_eq!(execution.totals.failed, 1);
    }

    #[tokio::test]
    async fn list_images_filters_by_qc_status() {
        let catalog = InMemoryCatalog::new();
        let execution_id = catalog
            .save_execution(NewExecution {
                configuration_id: None,
                started_at: now_iso8601(),
                total: 2,
                label: None,
                settings_snapshot: sample_settings(),
            })
            .await
            .unwrap();
        for (mapping, status) in [(1, QcStatus::Approved), (2, QcStatus::QcFailed)] {
            catalog
                .save_image(NewGeneratedImage {
                    execution_id: Some(execution_id),
                    mapping_id: MappingId(mapping),
                    prompt: "x".into(),
                    seed: None,
                    qc_status: status,
                    qc_reason: None,
                    final_path: if status == QcStatus::Approved {
                        Some("/out.png".into())
                    } else {
                        None
                    },
                    metadata: None,
                    processing_settings: sample_processing_settings(),
                })
                .await
                .unwrap();
        }

        let approved = catalog
            .list_images(ImageFilter {
                execution_id: Some(execution_id),
                qc_status: Some(QcStatus::Approved),
            })
            .await
            .unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].mapping_id, MappingId(1));
    }
}
