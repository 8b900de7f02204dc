// /////////////////////////////////////////////////////////////////////////////
// imgforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Binary entry point. Parses and validates argv via `imgforge_cli`, wires
//! the application and infrastructure layers together, dispatches the one
//! parsed command through `Adapter`, prints the result as JSON, and maps the
//! outcome to the process exit code spec §6 defines.

use std::sync::Arc;
use std::time::Duration;

use imgforge_cli::cli::ValidatedCommand;
use imgforge_cli::config::AppConfig;
use imgforge_cli::shutdown::ShutdownCoordinator;
use imgforge_cli::signals::create_signal_handler;
use imgforge_cli::{bootstrap_cli, result_to_exit_code};
use imgforge_core::application::adapter::Adapter;
use imgforge_core::application::image_processor::ImageProcessor;
use imgforge_core::application::job_runner::JobRunner;
use imgforge_core::application::retry_executor::RetryExecutor;
use imgforge_core::application::services::event_bus::EventBus;
use imgforge_core::infrastructure::catalog::SqliteCatalog;
use imgforge_core::infrastructure::config::InfraConfig;
use imgforge_core::infrastructure::metrics::JobMetrics;
use imgforge_core::infrastructure::paths::DataPaths;
use imgforge_core::infrastructure::pipeline_stages::{
    HttpDownloadStage, LocalConvertStage, LocalEnhanceStage, LocalPlanStage, LocalTrimTransparentStage,
};
use imgforge_core::infrastructure::providers::{HttpGenerateStage, HttpRemoveBackgroundStage, OpenAiMetadataStage, OpenAiQualityCheckStage};
use imgforge_core::infrastructure::secrets::{SecretRowStore, TieredSecretsVault};
use imgforge_domain::error::DomainError;
use imgforge_domain::ports::{CatalogRepository, SecretsVault};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let parsed = match bootstrap_cli() {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("argument error: {err}");
            return ExitCodeKind::ConfigurationError.into();
        }
    };

    let app_config = AppConfig::builder().debug_mode(parsed.verbose).build();
    init_tracing(&app_config);

    match run(parsed).await {
        Ok(()) => result_to_exit_code(Ok(())),
        Err(err) => {
            tracing::error!("{}", imgforge_core::infrastructure::logging::redact(&err.to_string()));
            eprintln!("error: {}", imgforge_core::infrastructure::logging::redact(&err.to_string()));
            result_to_exit_code(Err(err))
        }
    }
}

// Aliased locally only so the early argument-parse failure path (before any
// `DomainError` exists to hand to `result_to_exit_code`) can still produce
// the same exit code `ExitCode::ConfigurationError` would.
type ExitCodeKind = imgforge_cli::exit_code::ExitCode;

fn init_tracing(config: &AppConfig) {
    let _ = tracing_subscriber::fmt().with_max_level(config.log_level().to_tracing_level()).try_init();
}

async fn run(parsed: imgforge_cli::ValidatedCli) -> Result<(), DomainError> {
    let infra = InfraConfig::load().map_err(|e| DomainError::configuration(format!("loading config: {e}")))?;

    let override_dir = parsed.data_dir.as_deref().or(infra.data_dir.as_deref().map(std::path::Path::new));
    let paths = DataPaths::resolve(override_dir)?;

    let db_url = format!("sqlite://{}", paths.catalog_file().display());
    let sqlite = Arc::new(SqliteCatalog::open(&db_url).await?);
    let catalog: Arc<dyn CatalogRepository> = sqlite.clone();
    let secret_rows: Arc<dyn SecretRowStore> = sqlite;
    let secrets: Arc<dyn SecretsVault> = Arc::new(TieredSecretsVault::new(secret_rows, infra.allow_plaintext_secrets)?);

    let events = EventBus::new();
    let metrics = Arc::new(JobMetrics::new());

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(infra.http_timeout_secs))
        .build()
        .map_err(|e| DomainError::configuration(format!("building HTTP client: {e}")))?;

    let processor = Arc::new(ImageProcessor::new(
        Arc::new(HttpGenerateStage::new(http_client.clone(), secrets.clone())),
        Arc::new(HttpRemoveBackgroundStage::new(http_client.clone(), secrets.clone())),
        Arc::new(LocalTrimTransparentStage::new()),
        Arc::new(LocalEnhanceStage::new()),
        Arc::new(LocalConvertStage::new()),
        Arc::new(OpenAiQualityCheckStage::new(http_client.clone(), secrets.clone())),
        Arc::new(OpenAiMetadataStage::new(http_client.clone(), secrets.clone())),
        catalog.clone(),
        events.clone(),
        metrics.clone(),
    ));

    let job_runner = Arc::new(JobRunner::new(
        catalog.clone(),
        Arc::new(LocalPlanStage::new()),
        Arc::new(HttpGenerateStage::new(http_client.clone(), secrets.clone())),
        processor.clone(),
        events.clone(),
        metrics.clone(),
    ));
    job_runner.recover_abandoned_executions().await?;

    let _download_stage = Arc::new(HttpDownloadStage::new(http_client));
    let retry_executor = RetryExecutor::new(catalog.clone(), processor, events.clone(), metrics);

    let shutdown = ShutdownCoordinator::default();
    let shutdown_for_signal = shutdown.clone();
    let job_runner_for_signal = job_runner.clone();
    tokio::spawn(async move {
        create_signal_handler()
            .wait_for_signal(Box::new(move || {
                shutdown_for_signal.initiate_shutdown();
                let runner = job_runner_for_signal.clone();
                tokio::spawn(async move {
                    let _ = runner.stop_job().await;
                });
            }))
            .await;
    });

    let adapter = Adapter::new(catalog, secrets, job_runner.clone(), retry_executor, events);

    let outcome = dispatch(&adapter, parsed.command).await;
    shutdown.complete_shutdown();
    outcome
}

/// Matches every `ValidatedCommand` variant to its `Adapter` method, printing
/// the successful result as pretty JSON. `main.rs` carries no business logic
/// of its own beyond this dispatch table.
async fn dispatch(adapter: &Adapter, command: ValidatedCommand) -> Result<(), DomainError> {
    match command {
        ValidatedCommand::JobStart { configuration_id, settings_file, label } => {
            print_json(&adapter.job_start(configuration_id, settings_file, label).await?)
        }
        ValidatedCommand::JobStop => {
            adapter.job_stop().await?;
            Ok(())
        }
        ValidatedCommand::JobForceStopAll => {
            adapter.job_force_stop_all().await?;
            Ok(())
        }
        ValidatedCommand::JobStatus => print_json(&adapter.job_status().await?),
        ValidatedCommand::JobProgress => print_json(&adapter.job_progress().await?),
        ValidatedCommand::JobLogs { limit } => print_json(&adapter.job_logs(limit)),

        ValidatedCommand::ConfigurationGet { id } => print_json(&adapter.configuration_get(id).await?),
        ValidatedCommand::ConfigurationGetByName { name } => print_json(&adapter.configuration_get_by_name(&name).await?),
        ValidatedCommand::ConfigurationUpdate { id, settings_file } => {
            print_json(&adapter.configuration_update(id, settings_file).await?)
        }
        ValidatedCommand::ConfigurationUpdateName { id, name } => {
            adapter.configuration_update_name(id, name).await?;
            Ok(())
        }
        ValidatedCommand::ConfigurationDelete { id } => {
            adapter.configuration_delete(id).await?;
            Ok(())
        }
        ValidatedCommand::ConfigurationList => print_json(&adapter.configuration_list().await?),

        ValidatedCommand::ExecutionSave { settings_file, label } => {
            print_json(&adapter.execution_save(settings_file, label).await?)
        }
        ValidatedCommand::ExecutionGet { id } => print_json(&adapter.execution_get(id).await?),
        ValidatedCommand::ExecutionHistory { limit } => print_json(&adapter.execution_history(limit).await?),
        ValidatedCommand::ExecutionRename { id, label } => {
            adapter.execution_rename(id, label).await?;
            Ok(())
        }
        ValidatedCommand::ExecutionRerun { id } => print_json(&adapter.execution_rerun(id).await?),
        ValidatedCommand::ExecutionStatistics { id } => print_json(&adapter.execution_statistics(id).await?),
        ValidatedCommand::ExecutionDelete { id } => {
            adapter.execution_delete(id).await?;
            Ok(())
        }
        ValidatedCommand::ExecutionBulkDelete { ids } => {
            adapter.execution_bulk_delete(&ids).await?;
            Ok(())
        }
        ValidatedCommand::ExecutionBulkExport { ids, out } => {
            adapter.execution_bulk_export(&ids, &out).await?;
            Ok(())
        }
        ValidatedCommand::ExecutionBulkRerun { ids } => print_json(&adapter.execution_bulk_rerun(&ids).await),
        ValidatedCommand::ExecutionExportToExcel { id, out } => {
            adapter.execution_export_to_excel(id, &out).await?;
            Ok(())
        }

        ValidatedCommand::ImageGet { id } => print_json(&adapter.image_get(id).await?),
        ValidatedCommand::ImageUpdate { id, metadata_file } => {
            adapter.image_update(id, metadata_file).await?;
            Ok(())
        }
        ValidatedCommand::ImageDelete { id } => {
            adapter.image_delete(id).await?;
            Ok(())
        }
        ValidatedCommand::ImageBulkDelete { ids } => print_json(&adapter.image_bulk_delete(&ids).await?),
        ValidatedCommand::ImageManualApprove { id } => {
            adapter.image_manual_approve(id).await?;
            Ok(())
        }
        ValidatedCommand::ImageExportZip { ids, out } => {
            adapter.image_export_zip(&ids, &out).await?;
            Ok(())
        }
        ValidatedCommand::ImageStatistics { execution_id } => print_json(&adapter.image_statistics(execution_id).await?),

        ValidatedCommand::RetryOriginal { image_id } => {
            adapter.retry_original(image_id).await?;
            Ok(())
        }
        ValidatedCommand::RetryModified { image_id, overrides_file } => {
            adapter.retry_modified(image_id, overrides_file).await?;
            Ok(())
        }
        ValidatedCommand::RetryBatch { image_ids } => {
            adapter.retry_batch(&image_ids).await?;
            Ok(())
        }

        ValidatedCommand::SettingsGet { settings_file } => print_json(&adapter.settings_get(&settings_file)?),
        ValidatedCommand::SettingsValidate { settings_file } => print_json(&adapter.settings_validate(&settings_file)?),

        ValidatedCommand::SecretsGet { provider } => print_json(&adapter.secrets_get(&provider).await?),
        ValidatedCommand::SecretsSave { provider, value } => {
            adapter.secrets_save(&provider, &value).await?;
            Ok(())
        }
        ValidatedCommand::SecretsGetApiKey { provider } => print_json(&adapter.secrets_get_api_key(&provider).await?),
        ValidatedCommand::SecretsSetApiKey { provider, value } => {
            adapter.secrets_set_api_key(&provider, &value).await?;
            Ok(())
        }
        ValidatedCommand::SecretsGetSecurityStatus => print_json(&adapter.secrets_get_security_status().await?),

        ValidatedCommand::ProtocolValidatePath { path } => print_json(&adapter.protocol_validate_path(path)),
        ValidatedCommand::ProtocolSelectFile { path } => print_json(&adapter.protocol_select_file(path)),
        ValidatedCommand::ProtocolRefreshRoots => print_json(&adapter.protocol_refresh_roots().await?),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), DomainError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{}", imgforge_core::infrastructure::logging::redact(&rendered));
    Ok(())
}
