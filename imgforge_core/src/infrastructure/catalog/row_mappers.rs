//! Maps `sqlx::sqlite::SqliteRow`s to domain entities.
//!
//! Enums are stored as their `Display` text (spec §4.1: "status values are
//! the enum's lowercase name, never an integer code, so the database is
//! readable without the application"); `Settings` / `ProcessingSettings` /
//! `ImageMetadata` are stored as JSON text columns.

use std::str::FromStr;

use imgforge_domain::entities::{Configuration, Execution, ExecutionTotals, GeneratedImage, ImageMetadata};
use imgforge_domain::error::{CatalogErrorKind, DomainError};
use imgforge_domain::value_objects::{ExecutionStatus, MappingId, ProcessingSettings, QcStatus, Settings};

fn corrupt(column: &str, err: impl std::fmt::Display) -> DomainError {
    DomainError::catalog(CatalogErrorKind::Corrupt, format!("column `{column}`: {err}"))
}

#[derive(sqlx::FromRow)]
pub struct ConfigurationRow {
    pub id: i64,
    pub name: String,
    pub settings: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ConfigurationRow {
    pub fn into_entity(self) -> Result<Configuration, DomainError> {
        Ok(Configuration {
            id: self.id,
            name: self.name,
            settings: serde_json::from_str::<Settings>(&self.settings).map_err(|e| corrupt("settings", e))?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct ExecutionRow {
    pub id: i64,
    pub configuration_id: Option<i64>,
    pub status: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub total: i64,
    pub successful: i64,
    pub failed: i64,
    pub label: Option<String>,
    pub error_message: Option<String>,
    pub settings_snapshot: String,
}

impl ExecutionRow {
    pub fn into_entity(self) -> Result<Execution, DomainError> {
        Ok(Execution {
            id: self.id,
            configuration_id: self.configuration_id,
            status: ExecutionStatus::from_str(&self.status).map_err(|e| corrupt("status", e))?,
            started_at: self.started_at,
            completed_at: self.completed_at,
            totals: ExecutionTotals {
                total: self.total as u32,
                successful: self.successful as u32,
                failed: self.failed as u32,
            },
            label: self.label,
            error_message: self.error_message,
            settings_snapshot: serde_json::from_str::<Settings>(&self.settings_snapshot)
                .map_err(|e| corrupt("settings_snapshot", e))?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct GeneratedImageRow {
    pub id: i64,
    pub execution_id: Option<i64>,
    pub mapping_id: i64,
    pub prompt: String,
    pub seed: Option<i64>,
    pub qc_status: String,
    pub qc_reason: Option<String>,
    pub final_path: Option<String>,
    pub metadata: Option<String>,
    pub processing_settings: String,
    pub created_at: String,
}

impl GeneratedImageRow {
    pub fn into_entity(self) -> Result<GeneratedImage, DomainError> {
        let metadata = self
            .metadata
            .as_deref()
            .map(serde_json::from_str::<ImageMetadata>)
            .transpose()
            .map_err(|e| corrupt("metadata", e))?;
        Ok(GeneratedImage {
            id: self.id,
            execution_id: self.execution_id,
            mapping_id: MappingId(self.mapping_id),
            prompt: self.prompt,
            seed: self.seed,
            qc_status: QcStatus::from_str(&self.qc_status).map_err(|e| corrupt("qc_status", e))?,
            qc_reason: self.qc_reason,
            final_path: self.final_path,
            metadata,
            processing_settings: serde_json::from_str::<ProcessingSettings>(&self.processing_settings)
                .map_err(|e| corrupt("processing_settings", e))?,
            created_at: self.created_at,
        })
    }
}
