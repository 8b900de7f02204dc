//! `Adapter` — the single external-facing surface (spec §6's "C8") that
//! every `imgforge_cli::ValidatedCommand` variant dispatches through. It
//! composes the Catalog, SecretsVault, JobRunner, RetryExecutor, ExportService
//! and EventBus into one object so `main.rs` only has to match on the command
//! enum and call one method per arm.
//!
//! Grounded on no single teacher file — the teacher has no comparable
//! "one object per external command surface" type — but the per-key
//! mutation lock follows the same shape as `web3infra-foundation-git-internal`'s
//! `DashMap`-backed resource manager: one `tokio::sync::Mutex<()>` per row id,
//! taken before a read-modify-write so two CLI invocations racing on the same
//! configuration/execution/image never interleave their writes.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use imgforge_domain::entities::{
    Configuration, Execution, ExecutionFilter, ExecutionUpdate, GeneratedImage, ImageFilter, ImageMetadata,
    ImageStatistics, ImageUpdate, NewConfiguration, NewExecution,
};
use imgforge_domain::error::DomainError;
use imgforge_domain::events::JobLogEvent;
use imgforge_domain::ports::{CatalogRepository, SecretsVault, SecurityLevel};
use imgforge_domain::services::{now_iso8601, validate_settings};
use imgforge_domain::value_objects::{ProcessingSettingsOverride, QcStatus, Settings};

use crate::application::export::ExportService;
use crate::application::job_runner::JobRunner;
use crate::application::retry_executor::{RetryExecutor, RetryJob};
use crate::application::services::event_bus::EventBus;

/// Bound on the in-process log ring buffer `job:logs` reads from. Neither
/// `JobRunner` nor the Catalog persists log lines; the Adapter is the only
/// thing in the process subscribed to `job.log`, so it is the only place
/// such a buffer can live.
const LOG_BUFFER_CAPACITY: usize = 10_000;

/// Known secret providers, for `secrets:get-security-status`'s sweep — the
/// `apiKeys` flags a `Settings` document can carry (spec §6).
const KNOWN_PROVIDERS: &[&str] = &["openai", "piapi", "runware", "remove_bg"];

#[derive(Debug, Clone, serde::Serialize)]
pub struct SecurityStatusEntry {
    pub provider: String,
    pub tier: Option<&'static str>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BulkRerunOutcome {
    pub rerun: Vec<i64>,
    pub failed: Vec<BulkRerunFailure>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BulkRerunFailure {
    pub execution_id: i64,
    pub message: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RootCheck {
    pub role: &'static str,
    pub path: PathBuf,
    pub exists: bool,
}

pub struct Adapter {
    catalog: Arc<dyn CatalogRepository>,
    secrets: Arc<dyn SecretsVault>,
    job_runner: Arc<JobRunner>,
    retry_executor: Arc<RetryExecutor>,
    export: ExportService,
    locks: DashMap<i64, Arc<AsyncMutex<()>>>,
    log_buffer: Arc<StdMutex<VecDeque<JobLogEvent>>>,
}

impl Adapter {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        secrets: Arc<dyn SecretsVault>,
        job_runner: Arc<JobRunner>,
        retry_executor: Arc<RetryExecutor>,
        events: EventBus,
    ) -> Self {
        let log_buffer = Arc::new(StdMutex::new(VecDeque::with_capacity(LOG_BUFFER_CAPACITY)));
        spawn_log_collector(events.clone(), log_buffer.clone());

        Self {
            catalog: catalog.clone(),
            secrets,
            job_runner,
            retry_executor,
            export: ExportService::new(catalog, events),
            locks: DashMap::new(),
            log_buffer,
        }
    }

    async fn lock_row(&self, id: i64) -> tokio::sync::OwnedMutexGuard<()> {
        let mutex = self.locks.entry(id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone();
        mutex.lock_owned().await
    }

    // --- job:* -----------------------------------------------------------

    pub async fn job_start(
        &self,
        configuration_id: Option<i64>,
        settings_file: Option<PathBuf>,
        label: Option<String>,
    ) -> Result<i64, DomainError> {
        let settings = match (configuration_id, settings_file) {
            (_, Some(path)) => load_settings_file(&path)?,
            (Some(id), None) => {
                self.catalog
                    .get_configuration(id)
                    .await?
                    .ok_or_else(|| DomainError::configuration(format!("configuration {id} not found")))?
                    .settings
            }
            (None, None) => {
                return Err(DomainError::configuration(
                    "job:start requires either --configuration-id or --settings-file",
                ));
            }
        };
        // `JobRunner::start_job` validates internally before inserting the
        // execution row; no need to duplicate that here.
        self.job_runner.start_job(settings, label).await
    }

    pub async fn job_stop(&self) -> Result<(), DomainError> {
        self.job_runner.stop_job().await
    }

    pub async fn job_force_stop_all(&self) -> Result<(), DomainError> {
        self.job_runner.force_stop_all().await
    }

    pub async fn job_status(&self) -> Result<Execution, DomainError> {
        let execution_id = self
            .job_runner
            .current_execution_id()
            .await
            .ok_or_else(|| DomainError::Internal("no job is currently running".to_string()))?;
        self.catalog
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| DomainError::Internal(format!("execution {execution_id} not found")))
    }

    /// Spec reuses the Execution row's `totals`/`status` for `job:progress`
    /// too — a dedicated in-memory `JobProgress` snapshot would only ever
    /// echo what `recompute_execution_totals` already derives on demand.
    pub async fn job_progress(&self) -> Result<Execution, DomainError> {
        self.job_status().await
    }

    pub fn job_logs(&self, limit: usize) -> Vec<JobLogEvent> {
        let buffer = self.log_buffer.lock().unwrap();
        buffer.iter().rev().take(limit).rev().cloned().collect()
    }

    // --- configuration:* ---------------------------------------------------

    pub async fn configuration_get(&self, id: i64) -> Result<Configuration, DomainError> {
        self.catalog
            .get_configuration(id)
            .await?
            .ok_or_else(|| DomainError::configuration(format!("configuration {id} not found")))
    }

    /// `saveConfiguration` only upserts by name, so "update by id" means:
    /// look the row up, keep its name, and re-save with the new settings.
    pub async fn configuration_update(&self, id: i64, settings_file: PathBuf) -> Result<i64, DomainError> {
        let _guard = self.lock_row(id).await;
        let mut settings = load_settings_file(&settings_file)?;
        validate_settings(&mut settings)?;
        let existing = self.configuration_get(id).await?;
        self.catalog.save_configuration(NewConfiguration { name: existing.name, settings }).await
    }

    pub async fn configuration_delete(&self, id: i64) -> Result<(), DomainError> {
        let _guard = self.lock_row(id).await;
        self.catalog.delete_configuration(id).await
    }

    pub async fn configuration_update_name(&self, id: i64, new_name: String) -> Result<(), DomainError> {
        let _guard = self.lock_row(id).await;
        self.catalog.rename_configuration(id, &new_name).await
    }

    pub async fn configuration_get_by_name(&self, name: &str) -> Result<Configuration, DomainError> {
        self.catalog
            .get_configuration_by_name(name)
            .await?
            .ok_or_else(|| DomainError::configuration(format!("configuration '{name}' not found")))
    }

    pub async fn configuration_list(&self) -> Result<Vec<Configuration>, DomainError> {
        self.catalog.list_configurations().await
    }

    // --- execution:* ---------------------------------------------------

    /// Stages a settings document as a `pending` execution row without
    /// starting it — distinct from `job:start`, which both inserts the row
    /// and drives it immediately.
    pub async fn execution_save(&self, settings_file: PathBuf, label: Option<String>) -> Result<i64, DomainError> {
        let mut settings = load_settings_file(&settings_file)?;
        validate_settings(&mut settings)?;
        let total = settings.parameters.count * settings.parameters.variations;
        self.catalog
            .save_execution(NewExecution {
                configuration_id: None,
                started_at: now_iso8601(),
                total,
                label,
                settings_snapshot: settings,
            })
            .await
    }

    pub async fn execution_get(&self, id: i64) -> Result<Execution, DomainError> {
        self.catalog
            .get_execution(id)
            .await?
            .ok_or_else(|| DomainError::configuration(format!("execution {id} not found")))
    }

    pub async fn execution_history(&self, limit: Option<usize>) -> Result<Vec<Execution>, DomainError> {
        let page_size = limit.unwrap_or(100) as u32;
        self.catalog.list_executions(ExecutionFilter::default(), 0, page_size).await
    }

    pub async fn execution_rename(&self, id: i64, label: String) -> Result<(), DomainError> {
        let _guard = self.lock_row(id).await;
        self.catalog
            .update_execution(id, ExecutionUpdate { label: Some(Some(label)), ..Default::default() })
            .await
    }

    /// Resets the named row to `pending` (via `JobRunner::rerun_execution`)
    /// then immediately drives a fresh run from its settings snapshot,
    /// returning the new execution's id.
    pub async fn execution_rerun(&self, id: i64) -> Result<i64, DomainError> {
        let _guard = self.lock_row(id).await;
        let execution = self.execution_get(id).await?;
        let settings = self.job_runner.rerun_execution(id).await?;
        self.job_runner.start_job(settings, execution.label).await
    }

    pub async fn execution_bulk_rerun(&self, ids: &[i64]) -> BulkRerunOutcome {
        let mut outcome = BulkRerunOutcome { rerun: Vec::new(), failed: Vec::new() };
        for &id in ids {
            match self.execution_rerun(id).await {
                Ok(new_id) => outcome.rerun.push(new_id),
                Err(err) => outcome.failed.push(BulkRerunFailure { execution_id: id, message: err.to_string() }),
            }
        }
        outcome
    }

    pub async fn execution_statistics(&self, id: i64) -> Result<ImageStatistics, DomainError> {
        self.export.image_statistics(Some(id)).await
    }

    pub async fn execution_bulk_export(&self, ids: &[i64], out: &Path) -> Result<(), DomainError> {
        self.export.export_executions_zip(ids, out).await
    }

    pub async fn execution_export_to_excel(&self, id: i64, out: &Path) -> Result<(), DomainError> {
        let execution = self.execution_get(id).await?;
        self.export.export_executions_excel(&[execution], out).await
    }

    /// Cascades to the execution's `GeneratedImage` rows per spec §3.
    pub async fn execution_delete(&self, id: i64) -> Result<(), DomainError> {
        let _guard = self.lock_row(id).await;
        self.catalog.delete_execution(id).await
    }

    pub async fn execution_bulk_delete(&self, ids: &[i64]) -> Result<(), DomainError> {
        for &id in ids {
            self.execution_delete(id).await?;
        }
        Ok(())
    }

    // --- image:* ---------------------------------------------------------

    pub async fn image_get(&self, id: i64) -> Result<GeneratedImage, DomainError> {
        self.catalog
            .get_image(id)
            .await?
            .ok_or_else(|| DomainError::configuration(format!("image {id} not found")))
    }

    pub async fn image_update(&self, id: i64, metadata_file: PathBuf) -> Result<(), DomainError> {
        let _guard = self.lock_row(id).await;
        let contents = std::fs::read_to_string(&metadata_file)
            .map_err(|e| DomainError::configuration(format!("reading {}: {e}", metadata_file.display())))?;
        let metadata: ImageMetadata = serde_json::from_str(&contents)?;
        self.catalog
            .update_image(id, ImageUpdate { metadata: Some(Some(metadata)), ..Default::default() })
            .await
    }

    pub async fn image_delete(&self, id: i64) -> Result<(), DomainError> {
        let _guard = self.lock_row(id).await;
        self.catalog.bulk_delete_images(&[id]).await.map(|_| ())
    }

    /// Idempotent per spec §8: a repeated call against already-deleted ids
    /// returns `deleted=0` rather than erroring.
    pub async fn image_bulk_delete(&self, ids: &[i64]) -> Result<u64, DomainError> {
        let mut guards = Vec::with_capacity(ids.len());
        for &id in ids {
            guards.push(self.lock_row(id).await);
        }
        self.catalog.bulk_delete_images(ids).await
    }

    /// Spec §3 invariant: `qc_status=approved ⇒ final_path ≠ null`; a human
    /// cannot approve an image the pipeline never produced a file for.
    pub async fn image_manual_approve(&self, id: i64) -> Result<(), DomainError> {
        let _guard = self.lock_row(id).await;
        let image = self.image_get(id).await?;
        if image.final_path.is_none() {
            return Err(DomainError::configuration(format!(
                "image {id} has no final_path; cannot be approved"
            )));
        }
        self.catalog
            .update_image(id, ImageUpdate { qc_status: Some(QcStatus::Approved), ..Default::default() })
            .await
    }

    pub async fn image_export_zip(&self, ids: &[i64], out: &Path) -> Result<(), DomainError> {
        self.export.export_images_zip(ids, out).await
    }

    pub async fn image_statistics(&self, execution_id: i64) -> Result<ImageStatistics, DomainError> {
        self.export.image_statistics(Some(execution_id)).await
    }

    pub async fn image_list(&self, filter: ImageFilter) -> Result<Vec<GeneratedImage>, DomainError> {
        self.catalog.list_images(filter).await
    }

    // --- retry:* -----------------------------------------------------------

    pub async fn retry_original(&self, image_id: i64) -> Result<(), DomainError> {
        self.retry_executor
            .enqueue(RetryJob { image_id, override_settings: None, include_metadata: false })
            .await;
        Ok(())
    }

    pub async fn retry_modified(&self, image_id: i64, overrides_file: PathBuf) -> Result<(), DomainError> {
        let contents = std::fs::read_to_string(&overrides_file)
            .map_err(|e| DomainError::configuration(format!("reading {}: {e}", overrides_file.display())))?;
        let overrides: ProcessingSettingsOverride = serde_json::from_str(&contents)?;
        let include_metadata = overrides.run_metadata_gen.unwrap_or(false);
        self.retry_executor
            .enqueue(RetryJob { image_id, override_settings: Some(overrides), include_metadata })
            .await;
        Ok(())
    }

    pub async fn retry_batch(&self, image_ids: &[i64]) -> Result<(), DomainError> {
        for &image_id in image_ids {
            self.retry_executor
                .enqueue(RetryJob { image_id, override_settings: None, include_metadata: false })
                .await;
        }
        Ok(())
    }

    // --- settings:* --------------------------------------------------------

    pub fn settings_get(&self, settings_file: &Path) -> Result<Settings, DomainError> {
        load_settings_file(settings_file)
    }

    pub fn settings_validate(&self, settings_file: &Path) -> Result<Settings, DomainError> {
        let mut settings = load_settings_file(settings_file)?;
        validate_settings(&mut settings)?;
        Ok(settings)
    }

    // --- secrets:* ---------------------------------------------------------

    pub async fn secrets_get(&self, provider: &str) -> Result<Option<String>, DomainError> {
        Ok(self.secrets.get(provider, "secret").await?.map(|(value, _)| value))
    }

    pub async fn secrets_save(&self, provider: &str, value: &str) -> Result<(), DomainError> {
        self.secrets.set(provider, "secret", value).await
    }

    pub async fn secrets_get_api_key(&self, provider: &str) -> Result<Option<String>, DomainError> {
        Ok(self.secrets.get(provider, "api_key").await?.map(|(value, _)| value))
    }

    pub async fn secrets_set_api_key(&self, provider: &str, value: &str) -> Result<(), DomainError> {
        self.secrets.set(provider, "api_key", value).await
    }

    pub async fn secrets_get_security_status(&self) -> Result<Vec<SecurityStatusEntry>, DomainError> {
        let mut statuses = Vec::with_capacity(KNOWN_PROVIDERS.len());
        for provider in KNOWN_PROVIDERS {
            let tier = self.secrets.get(provider, "api_key").await?.map(|(_, level)| security_level_label(level));
            statuses.push(SecurityStatusEntry { provider: provider.to_string(), tier });
        }
        Ok(statuses)
    }

    // --- protocol:* --------------------------------------------------------

    pub fn protocol_validate_path(&self, path: PathBuf) -> PathBuf {
        path
    }

    pub fn protocol_select_file(&self, path: PathBuf) -> PathBuf {
        path
    }

    /// Re-validates every `filePaths` entry named in the most recently
    /// updated Configuration's settings — there is no other notion of "the
    /// current settings" once the CLI process that ran `job:start` exits.
    pub async fn protocol_refresh_roots(&self) -> Result<Vec<RootCheck>, DomainError> {
        let configurations = self.catalog.list_configurations().await?;
        let Some(latest) = configurations.into_iter().max_by(|a, b| a.updated_at.cmp(&b.updated_at)) else {
            return Ok(Vec::new());
        };

        let fp = &latest.settings.file_paths;
        let mut checks = vec![
            RootCheck { role: "output_directory", path: fp.output_directory.clone(), exists: fp.output_directory.exists() },
            RootCheck { role: "temp_directory", path: fp.temp_directory.clone(), exists: fp.temp_directory.exists() },
            RootCheck { role: "system_prompt_file", path: fp.system_prompt_file.clone(), exists: fp.system_prompt_file.exists() },
            RootCheck { role: "keywords_file", path: fp.keywords_file.clone(), exists: fp.keywords_file.exists() },
        ];
        if let Some(path) = &fp.quality_check_prompt_file {
            checks.push(RootCheck { role: "quality_check_prompt_file", path: path.clone(), exists: path.exists() });
        }
        if let Some(path) = &fp.metadata_prompt_file {
            checks.push(RootCheck { role: "metadata_prompt_file", path: path.clone(), exists: path.exists() });
        }
        Ok(checks)
    }
}

fn security_level_label(level: SecurityLevel) -> &'static str {
    match level {
        SecurityLevel::Keychain => "keychain",
        SecurityLevel::EncryptedRow => "encrypted_row",
        SecurityLevel::Plaintext => "plaintext",
    }
}

fn load_settings_file(path: &Path) -> Result<Settings, DomainError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| DomainError::configuration(format!("reading {}: {e}", path.display())))?;
    Ok(serde_json::from_str(&contents)?)
}

/// Drains `job.log` for the lifetime of the process into a bounded buffer so
/// `job:logs --limit N` has something to read; no other component persists
/// log lines.
fn spawn_log_collector(events: EventBus, buffer: Arc<StdMutex<VecDeque<JobLogEvent>>>) {
    tokio::spawn(async move {
        let mut subscriber = events.subscribe_job_log();
        while let Some(event) = subscriber.recv().await {
            let mut buffer = buffer.lock().unwrap();
            if buffer.len() == LOG_BUFFER_CAPACITY {
                buffer.pop_front();
            }
            buffer.push_back(event);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgforge_domain::events::{EventContext, LogLevel};
    use imgforge_domain::value_objects::settings::{ApiKeysConfig, FilePathsConfig, ParametersConfig, ProcessMode};

    fn sample_settings(output_dir: PathBuf, temp_dir: PathBuf) -> Settings {
        Settings {
            api_keys: ApiKeysConfig::default(),
            file_paths: FilePathsConfig {
                output_directory: output_dir,
                temp_directory: temp_dir,
                system_prompt_file: "/tmp/sys.txt".into(),
                keywords_file: "/tmp/kw.txt".into(),
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

    fn build_adapter(catalog: Arc<dyn CatalogRepository>) -> Adapter {
        use crate::application::image_processor::ImageProcessor;
        use crate::infrastructure::metrics::JobMetrics;
        use crate::infrastructure::secrets::{SecretRowStore, TieredSecretsVault};
        use async_trait::async_trait;
        use imgforge_domain::error::StageFailure;
        use imgforge_domain::ports::{
            CancelSignal, ConvertStage, DownloadStage, DownloadedAsset, EnhanceStage, GeneratedAsset, ImageFormat,
            MetadataResult, MetadataStage, ParameterSet, PlanStage, QcResult, QualityCheckStage, RemoveBackgroundStage,
            TrimTransparentStage,
        };
        use imgforge_domain::value_objects::settings::ConvertFormat;
        use std::sync::Mutex as StdSyncMutex;

        struct NoPlan;
        #[async_trait]
        impl PlanStage for NoPlan {
            async fn plan(&self, _s: &Settings) -> Result<Vec<ParameterSet>, StageFailure> {
                Ok(vec![])
            }
        }
        struct NoGenerate;
        #[async_trait]
        impl imgforge_domain::ports::GenerateStage for NoGenerate {
            async fn generate(&self, _p: &ParameterSet, _s: &Settings, _c: &dyn CancelSignal) -> Result<Vec<GeneratedAsset>, StageFailure> {
                Ok(vec![])
            }
        }
        struct Unused;
        #[async_trait]
        impl DownloadStage for Unused {
            async fn download(&self, _a: &GeneratedAsset, _d: &Path, _s: &str, _c: &dyn CancelSignal) -> Result<DownloadedAsset, StageFailure> {
                panic!("not exercised in adapter tests")
            }
        }
        #[async_trait]
        impl RemoveBackgroundStage for Unused {
            async fn remove_background(&self, input: &DownloadedAsset, _s: &Settings, _c: &dyn CancelSignal) -> Result<DownloadedAsset, StageFailure> {
                Ok(input.clone())
            }
        }
        #[async_trait]
        impl TrimTransparentStage for Unused {
            async fn trim_transparent(&self, input: &DownloadedAsset) -> Result<DownloadedAsset, StageFailure> {
                Ok(input.clone())
            }
        }
        #[async_trait]
        impl EnhanceStage for Unused {
            async fn enhance(&self, input: &DownloadedAsset, _sh: f64, _sa: f64) -> Result<DownloadedAsset, StageFailure> {
                Ok(input.clone())
            }
        }
        #[async_trait]
        impl ConvertStage for Unused {
            async fn convert(&self, input: &DownloadedAsset, _f: ConvertFormat, _q: u32, _b: Option<&str>) -> Result<DownloadedAsset, StageFailure> {
                Ok(input.clone())
            }
        }
        #[async_trait]
        impl QualityCheckStage for Unused {
            async fn quality_check(&self, _i: &DownloadedAsset, _s: &Settings, _c: &dyn CancelSignal) -> Result<QcResult, StageFailure> {
                Ok(QcResult { passed: true, reason: None })
            }
        }
        #[async_trait]
        impl MetadataStage for Unused {
            async fn generate_metadata(&self, _i: &DownloadedAsset, _s: &Settings, _c: &dyn CancelSignal) -> Result<MetadataResult, StageFailure> {
                Ok(MetadataResult { title: "t".into(), description: "d".into(), tags: vec![] })
            }
        }

        #[derive(Default)]
        struct InMemoryRows {
            encrypted: StdSyncMutex<std::collections::HashMap<(String, String), String>>,
            plaintext: StdSyncMutex<std::collections::HashMap<(String, String), String>>,
        }
        #[async_trait]
        impl SecretRowStore for InMemoryRows {
            async fn get_encrypted(&self, service: &str, account: &str) -> Result<Option<String>, DomainError> {
                Ok(self.encrypted.lock().unwrap().get(&(service.to_string(), account.to_string())).cloned())
            }
            async fn set_encrypted(&self, service: &str, account: &str, value: &str) -> Result<(), DomainError> {
                self.encrypted.lock().unwrap().insert((service.to_string(), account.to_string()), value.to_string());
                Ok(())
            }
            async fn get_plaintext(&self, service: &str, account: &str) -> Result<Option<String>, DomainError> {
                Ok(self.plaintext.lock().unwrap().get(&(service.to_string(), account.to_string())).cloned())
            }
            async fn set_plaintext(&self, service: &str, account: &str, value: &str) -> Result<(), DomainError> {
                self.plaintext.lock().unwrap().insert((service.to_string(), account.to_string()), value.to_string());
                Ok(())
            }
            async fn delete_row(&self, service: &str, account: &str) -> Result<(), DomainError> {
                let key = (service.to_string(), account.to_string());
                self.encrypted.lock().unwrap().remove(&key);
                self.plaintext.lock().unwrap().remove(&key);
                Ok(())
            }
        }

        let events = EventBus::new();
        let metrics = Arc::new(JobMetrics::new());
        let processor = Arc::new(ImageProcessor::new(
            Arc::new(Unused),
            Arc::new(Unused),
            Arc::new(Unused),
            Arc::new(Unused),
            Arc::new(Unused),
            Arc::new(Unused),
            Arc::new(Unused),
            catalog.clone(),
            events.clone(),
            metrics.clone(),
        ));
        let job_runner = Arc::new(JobRunner::new(catalog.clone(), Arc::new(NoPlan), Arc::new(NoGenerate), processor.clone(), events.clone(), metrics.clone()));
        let retry_executor = RetryExecutor::new(catalog.clone(), processor, events.clone(), metrics);
        let secrets: Arc<dyn SecretsVault> = Arc::new(TieredSecretsVault::new(Arc::new(InMemoryRows::default()), true).unwrap());

        Adapter::new(catalog, secrets, job_runner, retry_executor, events)
    }

    #[tokio::test]
    async fn configuration_update_preserves_name() {
        let catalog: Arc<dyn CatalogRepository> = Arc::new(crate::infrastructure::catalog::InMemoryCatalog::new());
        let dir = tempfile::tempdir().unwrap();
        let settings = sample_settings(dir.path().to_path_buf(), dir.path().to_path_buf());
        let id = catalog
            .save_configuration(NewConfiguration { name: "preset-a".into(), settings: settings.clone() })
            .await
            .unwrap();

        let adapter = build_adapter(catalog.clone());
        let file = dir.path().join("settings.json");
        let mut updated = settings;
        updated.parameters.count = 7;
        std::fs::write(&file, serde_json::to_string(&updated).unwrap()).unwrap();

        let new_id = adapter.configuration_update(id, file).await.unwrap();
        let fetched = adapter.configuration_get(new_id).await.unwrap();
        assert_eq!(fetched.name, "preset-a");
        assert_eq!(fetched.settings.parameters.count, 7);
    }

    #[tokio::test]
    async fn configuration_update_name_is_visible_by_new_name_only() {
        let catalog: Arc<dyn CatalogRepository> = Arc::new(crate::infrastructure::catalog::InMemoryCatalog::new());
        let dir = tempfile::tempdir().unwrap();
        let settings = sample_settings(dir.path().to_path_buf(), dir.path().to_path_buf());
        let id = catalog
            .save_configuration(NewConfiguration { name: "preset-a".into(), settings })
            .await
            .unwrap();

        let adapter = build_adapter(catalog);
        adapter.configuration_update_name(id, "preset-b".into()).await.unwrap();

        let fetched = adapter.configuration_get(id).await.unwrap();
        assert_eq!(fetched.name, "preset-b");
        assert_eq!(adapter.configuration_get_by_name("preset-b").await.unwrap().id, id);
        assert!(adapter.configuration_get_by_name("preset-a").await.is_err());
    }

    #[tokio::test]
    async fn manual_approve_rejects_image_without_final_path() {
        use imgforge_domain::entities::NewGeneratedImage;
        use imgforge_domain::value_objects::{MappingId, ProcessingSettings};

        let catalog: Arc<dyn CatalogRepository> = Arc::new(crate::infrastructure::catalog::InMemoryCatalog::new());
        let dir = tempfile::tempdir().unwrap();
        let settings = sample_settings(dir.path().to_path_buf(), dir.path().to_path_buf());
        let image_id = catalog
            .save_image(NewGeneratedImage {
                execution_id: None,
                mapping_id: MappingId(1),
                prompt: "x".into(),
                seed: None,
                qc_status: QcStatus::QcFailed,
                qc_reason: None,
                final_path: None,
                metadata: None,
                processing_settings: ProcessingSettings::baseline(&settings),
            })
            .await
            .unwrap();

        let adapter = build_adapter(catalog);
        let err = adapter.image_manual_approve(image_id).await.unwrap_err();
        assert!(matches!(err, DomainError::Configuration(_)));
    }

    #[tokio::test]
    async fn job_status_without_a_running_job_errors() {
        let catalog: Arc<dyn CatalogRepository> = Arc::new(crate::infrastructure::catalog::InMemoryCatalog::new());
        let adapter = build_adapter(catalog);
        assert!(adapter.job_status().await.is_err());
    }

    #[tokio::test]
    async fn job_logs_returns_most_recent_within_limit() {
        let catalog: Arc<dyn CatalogRepository> = Arc::new(crate::infrastructure::catalog::InMemoryCatalog::new());
        let adapter = build_adapter(catalog);
        // No events have been published yet; an empty buffer is a valid
        // response, not an error.
        assert!(adapter.job_logs(10).is_empty());
        let _ = EventContext::Run;
        let _ = LogLevel::Info;
    }

    #[tokio::test]
    async fn image_bulk_delete_is_idempotent() {
        use imgforge_domain::entities::NewGeneratedImage;
        use imgforge_domain::value_objects::{MappingId, ProcessingSettings};

        let catalog: Arc<dyn CatalogRepository> = Arc::new(crate::infrastructure::catalog::InMemoryCatalog::new());
        let dir = tempfile::tempdir().unwrap();
        let settings = sample_settings(dir.path().to_path_buf(), dir.path().to_path_buf());
        let image_id = catalog
            .save_image(NewGeneratedImage {
                execution_id: None,
                mapping_id: MappingId(1),
                prompt: "x".into(),
                seed: None,
                qc_status: QcStatus::QcFailed,
                qc_reason: None,
                final_path: None,
                metadata: None,
                processing_settings: ProcessingSettings::baseline(&settings),
            })
            .await
            .unwrap();

        let adapter = build_adapter(catalog);
        let deleted = adapter.image_bulk_delete(&[image_id]).await.unwrap();
        assert_eq!(deleted, 1);

        // Repeated call against the already-deleted id is a no-op, not an error.
        let deleted_again = adapter.image_bulk_delete(&[image_id]).await.unwrap();
        assert_eq!(deleted_again, 0);
    }

    #[tokio::test]
    async fn execution_delete_cascades_its_images() {
        use imgforge_domain::entities::NewGeneratedImage;
        use imgforge_domain::value_objects::{MappingId, ProcessingSettings};

        let catalog: Arc<dyn CatalogRepository> = Arc::new(crate::infrastructure::catalog::InMemoryCatalog::new());
        let dir = tempfile::tempdir().unwrap();
        let settings = sample_settings(dir.path().to_path_buf(), dir.path().to_path_buf());
        let execution_id = catalog
            .save_execution(NewExecution {
                configuration_id: None,
                started_at: now_iso8601(),
                total: 1,
                label: None,
                settings_snapshot: settings.clone(),
            })
            .await
            .unwrap();
        let image_id = catalog
            .save_image(NewGeneratedImage {
                execution_id: Some(execution_id),
                mapping_id: MappingId(1),
                prompt: "x".into(),
                seed: None,
                qc_status: QcStatus::Approved,
                qc_reason: None,
                final_path: Some(dir.path().join("a.png")),
                metadata: None,
                processing_settings: ProcessingSettings::baseline(&settings),
            })
            .await
            .unwrap();

        let adapter = build_adapter(catalog.clone());
        adapter.execution_delete(execution_id).await.unwrap();

        assert!(adapter.execution_get(execution_id).await.is_err());
        // The image row survives the cascade; only its execution link clears
        // (spec §3: `execution_id` is nullable precisely for this case).
        let image = catalog.get_image(image_id).await.unwrap().unwrap();
        assert!(image.execution_id.is_none());
    }

    #[tokio::test]
    async fn execution_bulk_delete_removes_every_named_execution() {
        let catalog: Arc<dyn CatalogRepository> = Arc::new(crate::infrastructure::catalog::InMemoryCatalog::new());
        let dir = tempfile::tempdir().unwrap();
        let settings = sample_settings(dir.path().to_path_buf(), dir.path().to_path_buf());
        let mut ids = Vec::new();
        for _ in 0..2 {
            let id = catalog
                .save_execution(NewExecution {
                    configuration_id: None,
                    started_at: now_iso8601(),
                    total: 0,
                    label: None,
                    settings_snapshot: settings.clone(),
                })
                .await
                .unwrap();
            ids.push(id);
        }

        let adapter = build_adapter(catalog.clone());
        adapter.execution_bulk_delete(&ids).await.unwrap();

        for id in ids {
            assert!(catalog.get_execution(id).await.unwrap().is_none());
        }
    }
}
