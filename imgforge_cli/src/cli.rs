// /////////////////////////////////////////////////////////////////////////////
// imgforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface
//!
//! Bootstrap-layer CLI handling with security-first argument validation.
//!
//! ## Pipeline
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  1. parse_cli()                     │  Parse CLI with clap
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  2. validate_cli()                  │  Security validation
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  3. ValidatedCli                    │  Safe, validated command
//! └─────────────────────────────────────┘
//! ```
//!
//! The command surface mirrors the Adapter operations: `job`, `configuration`,
//! `execution`, `image`, `retry`, `settings`, `secrets`, and `protocol`.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use thiserror::Error;

/// Maximum argument count, to block argument-flooding denial of service.
const MAX_ARG_COUNT: usize = 200;
/// Maximum single argument length.
const MAX_ARG_LENGTH: usize = 4096;
/// Maximum path length after canonicalization.
const MAX_PATH_LENGTH: usize = 4096;

/// Patterns that indicate shell injection or path-traversal attempts in a
/// plain string argument (prompts, labels, tag lists). Paths are validated
/// separately via canonicalization rather than pattern matching.
const DANGEROUS_PATTERNS: &[&str] = &["`", ";", "&&", "|", "\n", "\r", "\0"];

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("too many arguments (max {MAX_ARG_COUNT})")]
    TooManyArguments,
    #[error("argument too long (max {MAX_ARG_LENGTH} characters): {0}")]
    ArgumentTooLong(String),
    #[error("dangerous pattern '{pattern}' detected in argument: {arg}")]
    DangerousPattern { pattern: String, arg: String },
    #[error("path exceeds maximum length (max {MAX_PATH_LENGTH})")]
    PathTooLong,
    #[error("path does not exist: {0}")]
    PathNotFound(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("invalid value for {arg}: {reason}")]
    InvalidValue { arg: String, reason: String },
}

/// Security-first argument parsing, grounded on the teacher's
/// `SecureArgParser`, trimmed to the patterns relevant to a JSON-document-
/// and-image-path CLI rather than a filesystem-pipeline one.
pub struct SecureArgParser;

impl SecureArgParser {
    pub fn validate_argument(arg: &str) -> Result<(), ParseError> {
        if arg.len() > MAX_ARG_LENGTH {
            return Err(ParseError::ArgumentTooLong(arg.chars().take(50).collect::<String>() + "..."));
        }
        for pattern in DANGEROUS_PATTERNS {
            if arg.contains(pattern) {
                return Err(ParseError::DangerousPattern {
                    pattern: pattern.to_string(),
                    arg: arg.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Validates a path that is expected to already exist (e.g. a keyword
    /// file, a select-file target), returning its canonical form.
    pub fn validate_existing_path(path: &str) -> Result<PathBuf, ParseError> {
        Self::validate_argument(path)?;
        let path_obj = Path::new(path);
        let canonical = path_obj.canonicalize().map_err(|_| {
            if path_obj.exists() {
                ParseError::InvalidPath(path.to_string())
            } else {
                ParseError::PathNotFound(path.to_string())
            }
        })?;
        if canonical.to_string_lossy().len() > MAX_PATH_LENGTH {
            return Err(ParseError::PathTooLong);
        }
        Ok(canonical)
    }

    /// Validates a path that may not exist yet (an export destination).
    pub fn validate_output_path(path: &str) -> Result<PathBuf, ParseError> {
        Self::validate_argument(path)?;
        Ok(PathBuf::from(path))
    }
}

#[derive(Parser, Debug)]
#[command(name = "imgforge", version, about = "Batch AI image generation pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose (debug-level) logging.
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Path to an optional bootstrap config file (see `imgforge_cli::config`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the data directory the catalog and secrets vault use.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start, stop, and observe a generation job.
    Job {
        #[command(subcommand)]
        action: JobAction,
    },
    /// Manage saved settings documents.
    Configuration {
        #[command(subcommand)]
        action: ConfigurationAction,
    },
    /// Manage execution (job run) records.
    Execution {
        #[command(subcommand)]
        action: ExecutionAction,
    },
    /// Manage generated image records.
    Image {
        #[command(subcommand)]
        action: ImageAction,
    },
    /// Submit images to the retry queue.
    Retry {
        #[command(subcommand)]
        action: RetryAction,
    },
    /// Read or validate the ambient `Settings` document.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Manage provider API key secrets.
    Secrets {
        #[command(subcommand)]
        action: SecretsAction,
    },
    /// Misc protocol-level maintenance operations.
    Protocol {
        #[command(subcommand)]
        action: ProtocolAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum JobAction {
    /// Start a job from a settings document (by configuration id, or `--settings-file`).
    Start {
        #[arg(long)]
        configuration_id: Option<i64>,
        #[arg(long)]
        settings_file: Option<PathBuf>,
        #[arg(long)]
        label: Option<String>,
    },
    /// Request a graceful stop of the running job.
    Stop,
    /// Force-stop all in-flight work immediately.
    ForceStopAll,
    /// Print the current job status.
    Status,
    /// Print the current job progress counters.
    Progress,
    /// Tail recent job log lines.
    Logs {
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigurationAction {
    Get { id: i64 },
    GetByName { name: String },
    Update { id: i64, settings_file: PathBuf },
    UpdateName { id: i64, name: String },
    Delete { id: i64 },
    List,
}

#[derive(Subcommand, Debug)]
pub enum ExecutionAction {
    Save { settings_file: PathBuf, label: Option<String> },
    Get { id: i64 },
    History {
        #[arg(long)]
        limit: Option<usize>,
    },
    Rename { id: i64, label: String },
    Rerun { id: i64 },
    Statistics { id: i64 },
    Delete { id: i64 },
    BulkDelete { ids: Vec<i64> },
    BulkExport {
        ids: Vec<i64>,
        #[arg(long)]
        out: PathBuf,
    },
    BulkRerun { ids: Vec<i64> },
    ExportToExcel {
        id: i64,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum ImageAction {
    Get { id: i64 },
    Update { id: i64, metadata_file: PathBuf },
    Delete { id: i64 },
    BulkDelete { ids: Vec<i64> },
    ManualApprove { id: i64 },
    ExportZip {
        ids: Vec<i64>,
        #[arg(long)]
        out: PathBuf,
    },
    Statistics { execution_id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum RetryAction {
    Original { image_id: i64 },
    Modified { image_id: i64, overrides_file: PathBuf },
    Batch { image_ids: Vec<i64> },
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    Get { settings_file: PathBuf },
    Validate { settings_file: PathBuf },
}

#[derive(Subcommand, Debug)]
pub enum SecretsAction {
    Get { provider: String },
    Save { provider: String, value: String },
    GetApiKey { provider: String },
    SetApiKey { provider: String, value: String },
    GetSecurityStatus,
}

#[derive(Subcommand, Debug)]
pub enum ProtocolAction {
    ValidatePath { path: String },
    SelectFile { path: String },
    RefreshRoots,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Validated CLI invocation: identical shape to [`Cli`] but every string and
/// path has passed [`SecureArgParser`].
#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub command: ValidatedCommand,
    pub verbose: bool,
    pub config: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum ValidatedCommand {
    JobStart {
        configuration_id: Option<i64>,
        settings_file: Option<PathBuf>,
        label: Option<String>,
    },
    JobStop,
    JobForceStopAll,
    JobStatus,
    JobProgress,
    JobLogs { limit: usize },
    ConfigurationGet { id: i64 },
    ConfigurationGetByName { name: String },
    ConfigurationUpdate { id: i64, settings_file: PathBuf },
    ConfigurationUpdateName { id: i64, name: String },
    ConfigurationDelete { id: i64 },
    ConfigurationList,
    ExecutionSave { settings_file: PathBuf, label: Option<String> },
    ExecutionGet { id: i64 },
    ExecutionHistory { limit: Option<usize> },
    ExecutionRename { id: i64, label: String },
    ExecutionRerun { id: i64 },
    ExecutionStatistics { id: i64 },
    ExecutionDelete { id: i64 },
    ExecutionBulkDelete { ids: Vec<i64> },
    ExecutionBulkExport { ids: Vec<i64>, out: PathBuf },
    ExecutionBulkRerun { ids: Vec<i64> },
    ExecutionExportToExcel { id: i64, out: PathBuf },
    ImageGet { id: i64 },
    ImageUpdate { id: i64, metadata_file: PathBuf },
    ImageDelete { id: i64 },
    ImageBulkDelete { ids: Vec<i64> },
    ImageManualApprove { id: i64 },
    ImageExportZip { ids: Vec<i64>, out: PathBuf },
    ImageStatistics { execution_id: i64 },
    RetryOriginal { image_id: i64 },
    RetryModified { image_id: i64, overrides_file: PathBuf },
    RetryBatch { image_ids: Vec<i64> },
    SettingsGet { settings_file: PathBuf },
    SettingsValidate { settings_file: PathBuf },
    SecretsGet { provider: String },
    SecretsSave { provider: String, value: String },
    SecretsGetApiKey { provider: String },
    SecretsSetApiKey { provider: String, value: String },
    SecretsGetSecurityStatus,
    ProtocolValidatePath { path: PathBuf },
    ProtocolSelectFile { path: PathBuf },
    ProtocolRefreshRoots,
}

pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    let cli = parse_cli();
    validate_cli(cli)
}

fn validate_cli(cli: Cli) -> Result<ValidatedCli, ParseError> {
    if let Some(ref path) = cli.config {
        SecureArgParser::validate_argument(&path.to_string_lossy())?;
    }
    if let Some(ref dir) = cli.data_dir {
        SecureArgParser::validate_argument(&dir.to_string_lossy())?;
    }

    let command = validate_command(cli.command)?;

    Ok(ValidatedCli {
        command,
        verbose: cli.verbose,
        config: cli.config,
        data_dir: cli.data_dir,
    })
}

fn validate_settings_file(path: PathBuf) -> Result<PathBuf, ParseError> {
    SecureArgParser::validate_existing_path(&path.to_string_lossy())
}

fn validate_out_path(path: PathBuf) -> Result<PathBuf, ParseError> {
    SecureArgParser::validate_output_path(&path.to_string_lossy())
}

fn validate_label(label: Option<String>) -> Result<Option<String>, ParseError> {
    if let Some(ref l) = label {
        SecureArgParser::validate_argument(l)?;
    }
    Ok(label)
}

fn validate_command(command: Commands) -> Result<ValidatedCommand, ParseError> {
    Ok(match command {
        Commands::Job { action } => match action {
            JobAction::Start {
                configuration_id,
                settings_file,
                label,
            } => {
                let settings_file = settings_file.map(validate_settings_file).transpose()?;
                ValidatedCommand::JobStart {
                    configuration_id,
                    settings_file,
                    label: validate_label(label)?,
                }
            }
            JobAction::Stop => ValidatedCommand::JobStop,
            JobAction::ForceStopAll => ValidatedCommand::JobForceStopAll,
            JobAction::Status => ValidatedCommand::JobStatus,
            JobAction::Progress => ValidatedCommand::JobProgress,
            JobAction::Logs { limit } => {
                if limit == 0 || limit > 100_000 {
                    return Err(ParseError::InvalidValue {
                        arg: "limit".to_string(),
                        reason: "must be between 1 and 100000".to_string(),
                    });
                }
                ValidatedCommand::JobLogs { limit }
            }
        },
        Commands::Configuration { action } => match action {
            ConfigurationAction::Get { id } => ValidatedCommand::ConfigurationGet { id },
            ConfigurationAction::GetByName { name } => {
                SecureArgParser::validate_argument(&name)?;
                ValidatedCommand::ConfigurationGetByName { name }
            }
            ConfigurationAction::Update { id, settings_file } => ValidatedCommand::ConfigurationUpdate {
                id,
                settings_file: validate_settings_file(settings_file)?,
            },
            ConfigurationAction::UpdateName { id, name } => {
                SecureArgParser::validate_argument(&name)?;
                ValidatedCommand::ConfigurationUpdateName { id, name }
            }
            ConfigurationAction::Delete { id } => ValidatedCommand::ConfigurationDelete { id },
            ConfigurationAction::List => ValidatedCommand::ConfigurationList,
        },
        Commands::Execution { action } => match action {
            ExecutionAction::Save { settings_file, label } => ValidatedCommand::ExecutionSave {
                settings_file: validate_settings_file(settings_file)?,
                label: validate_label(label)?,
            },
            ExecutionAction::Get { id } => ValidatedCommand::ExecutionGet { id },
            ExecutionAction::History { limit } => ValidatedCommand::ExecutionHistory { limit },
            ExecutionAction::Rename { id, label } => {
                SecureArgParser::validate_argument(&label)?;
                ValidatedCommand::ExecutionRename { id, label }
            }
            ExecutionAction::Rerun { id } => ValidatedCommand::ExecutionRerun { id },
            ExecutionAction::Statistics { id } => ValidatedCommand::ExecutionStatistics { id },
            ExecutionAction::Delete { id } => ValidatedCommand::ExecutionDelete { id },
            ExecutionAction::BulkDelete { ids } => {
                if ids.is_empty() {
                    return Err(ParseError::InvalidValue {
                        arg: "ids".to_string(),
                        reason: "must name at least one execution".to_string(),
                    });
                }
                ValidatedCommand::ExecutionBulkDelete { ids }
            }
            ExecutionAction::BulkExport { ids, out } => {
                if ids.is_empty() {
                    return Err(ParseError::InvalidValue {
                        arg: "ids".to_string(),
                        reason: "must name at least one execution".to_string(),
                    });
                }
                ValidatedCommand::ExecutionBulkExport {
                    ids,
                    out: validate_out_path(out)?,
                }
            }
            ExecutionAction::BulkRerun { ids } => {
                if ids.is_empty() {
                    return Err(ParseError::InvalidValue {
                        arg: "ids".to_string(),
                        reason: "must name at least one execution".to_string(),
                    });
                }
                ValidatedCommand::ExecutionBulkRerun { ids }
            }
            ExecutionAction::ExportToExcel { id, out } => ValidatedCommand::ExecutionExportToExcel {
                id,
                out: validate_out_path(out)?,
            },
        },
        Commands::Image { action } => match action {
            ImageAction::Get { id } => ValidatedCommand::ImageGet { id },
            ImageAction::Update { id, metadata_file } => ValidatedCommand::ImageUpdate {
                id,
                metadata_file: validate_settings_file(metadata_file)?,
            },
            ImageAction::Delete { id } => ValidatedCommand::ImageDelete { id },
            ImageAction::BulkDelete { ids } => {
                if ids.is_empty() {
                    return Err(ParseError::InvalidValue {
                        arg: "ids".to_string(),
                        reason: "must name at least one image".to_string(),
                    });
                }
                ValidatedCommand::ImageBulkDelete { ids }
            }
            ImageAction::ManualApprove { id } => ValidatedCommand::ImageManualApprove { id },
            ImageAction::ExportZip { ids, out } => {
                if ids.is_empty() {
                    return Err(ParseError::InvalidValue {
                        arg: "ids".to_string(),
                        reason: "must name at least one image".to_string(),
                    });
                }
                ValidatedCommand::ImageExportZip {
                    ids,
                    out: validate_out_path(out)?,
                }
            }
            ImageAction::Statistics { execution_id } => ValidatedCommand::ImageStatistics { execution_id },
        },
        Commands::Retry { action } => match action {
            RetryAction::Original { image_id } => ValidatedCommand::RetryOriginal { image_id },
            RetryAction::Modified { image_id, overrides_file } => ValidatedCommand::RetryModified {
                image_id,
                overrides_file: validate_settings_file(overrides_file)?,
            },
            RetryAction::Batch { image_ids } => {
                if image_ids.is_empty() {
                    return Err(ParseError::InvalidValue {
                        arg: "image_ids".to_string(),
                        reason: "must name at least one image".to_string(),
                    });
                }
                ValidatedCommand::RetryBatch { image_ids }
            }
        },
        Commands::Settings { action } => match action {
            SettingsAction::Get { settings_file } => ValidatedCommand::SettingsGet {
                settings_file: validate_settings_file(settings_file)?,
            },
            SettingsAction::Validate { settings_file } => ValidatedCommand::SettingsValidate {
                settings_file: validate_settings_file(settings_file)?,
            },
        },
        Commands::Secrets { action } => match action {
            SecretsAction::Get { provider } => {
                SecureArgParser::validate_argument(&provider)?;
                ValidatedCommand::SecretsGet { provider }
            }
            SecretsAction::Save { provider, value } => {
                SecureArgParser::validate_argument(&provider)?;
                ValidatedCommand::SecretsSave { provider, value }
            }
            SecretsAction::GetApiKey { provider } => {
                SecureArgParser::validate_argument(&provider)?;
                ValidatedCommand::SecretsGetApiKey { provider }
            }
            SecretsAction::SetApiKey { provider, value } => {
                SecureArgParser::validate_argument(&provider)?;
                ValidatedCommand::SecretsSetApiKey { provider, value }
            }
            SecretsAction::GetSecurityStatus => ValidatedCommand::SecretsGetSecurityStatus,
        },
        Commands::Protocol { action } => match action {
            ProtocolAction::ValidatePath { path } => {
                let validated = SecureArgParser::validate_existing_path(&path)?;
                ValidatedCommand::ProtocolValidatePath { path: validated }
            }
            ProtocolAction::SelectFile { path } => {
                let validated = SecureArgParser::validate_existing_path(&path)?;
                ValidatedCommand::ProtocolSelectFile { path: validated }
            }
            ProtocolAction::RefreshRoots => ValidatedCommand::ProtocolRefreshRoots,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_dangerous_patterns() {
        let err = SecureArgParser::validate_argument("label; rm -rf /").unwrap_err();
        assert!(matches!(err, ParseError::DangerousPattern { .. }));
    }

    #[test]
    fn rejects_oversized_argument() {
        let long = "a".repeat(MAX_ARG_LENGTH + 1);
        let err = SecureArgParser::validate_argument(&long).unwrap_err();
        assert!(matches!(err, ParseError::ArgumentTooLong(_)));
    }

    #[test]
    fn accepts_plain_label() {
        assert!(SecureArgParser::validate_argument("batch 42").is_ok());
    }

    #[test]
    fn missing_path_is_not_found() {
        let err = SecureArgParser::validate_existing_path("/no/such/path/imgforge-test").unwrap_err();
        assert!(matches!(err, ParseError::PathNotFound(_)));
    }
}
