//! `SqliteCatalog` — the sole production `CatalogRepository` implementation
//! (spec §4.1), backed by the `sqlx` SQLite driver and the migrations in
//! `infrastructure::repositories::schema`.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use imgforge_domain::entities::{
    Configuration, Execution, ExecutionFilter, ExecutionUpdate, GeneratedImage, ImageFilter, ImageStatistics,
    ImageUpdate, NewConfiguration, NewExecution, NewGeneratedImage,
};
use imgforge_domain::error::{CatalogErrorKind, DomainError};
use imgforge_domain::ports::CatalogRepository;
use imgforge_domain::services::datetime::now_iso8601;
use imgforge_domain::value_objects::MappingId;

use super::row_mappers::{ConfigurationRow, ExecutionRow, GeneratedImageRow};
use crate::infrastructure::repositories::schema;
use crate::infrastructure::secrets::SecretRowStore;

pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub async fn open(database_url: &str) -> Result<Self, DomainError> {
        let pool = schema::initialize_database(database_url)
            .await
            .map_err(map_sqlx_open)?;
        Ok(Self { pool })
    }

    /// Wraps an already-open pool, for tests and callers that manage the
    /// pool's lifecycle themselves.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn map_sqlx_open(err: sqlx::Error) -> DomainError {
    DomainError::catalog(CatalogErrorKind::Open, err.to_string())
}

/// `SQLITE_BUSY` surfaces through `sqlx` as a database error whose SQLite
/// result code is 5; the `JobRunner`/`RetryExecutor` retry loop (spec §4.1:
/// "retried by the caller up to 5x with 10-200ms jittered backoff") keys off
/// `CatalogErrorKind::Busy` specifically.
fn map_sqlx(err: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("5") {
            return DomainError::catalog(CatalogErrorKind::Busy, db_err.message().to_string());
        }
        if db_err.is_unique_violation() || db_err.is_foreign_key_violation() {
            return DomainError::catalog(CatalogErrorKind::Constraint, db_err.message().to_string());
        }
    }
    DomainError::catalog(CatalogErrorKind::Corrupt, err.to_string())
}

#[async_trait]
impl CatalogRepository for SqliteCatalog {
    async fn save_configuration(&self, config: NewConfiguration) -> Result<i64, DomainError> {
        let settings = serde_json::to_string(&config.settings)?;
        let now = now_iso8601();
        let id = sqlx::query(
            "INSERT INTO configurations (name, settings, created_at, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET settings = excluded.settings, updated_at = excluded.updated_at
             RETURNING id",
        )
        .bind(&config.name)
        .bind(&settings)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?
        .try_get::<i64, _>("id")
        .map_err(map_sqlx)?;
        Ok(id)
    }

    async fn get_configuration(&self, id: i64) -> Result<Option<Configuration>, DomainError> {
        let row: Option<ConfigurationRow> = sqlx::query_as("SELECT * FROM configurations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.map(ConfigurationRow::into_entity).transpose()
    }

    async fn get_configuration_by_name(&self, name: &str) -> Result<Option<Configuration>, DomainError> {
        let row: Option<ConfigurationRow> = sqlx::query_as("SELECT * FROM configurations WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.map(ConfigurationRow::into_entity).transpose()
    }

    async fn list_configurations(&self) -> Result<Vec<Configuration>, DomainError> {
        let rows: Vec<ConfigurationRow> = sqlx::query_as("SELECT * FROM configurations ORDER BY updated_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        rows.into_iter().map(ConfigurationRow::into_entity).collect()
    }

    async fn delete_configuration(&self, id: i64) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM configurations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn rename_configuration(&self, id: i64, new_name: &str) -> Result<(), DomainError> {
        let now = now_iso8601();
        let result = sqlx::query("UPDATE configurations SET name = ?, updated_at = ? WHERE id = ?")
            .bind(new_name)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(DomainError::configuration(format!("configuration {id} not found")));
        }
        Ok(())
    }

    async fn save_execution(&self, execution: NewExecution) -> Result<i64, DomainError> {
        let snapshot = serde_json::to_string(&execution.settings_snapshot)?;
        let row = sqlx::query(
            "INSERT INTO executions
                (configuration_id, status, started_at, total, successful, failed, label, settings_snapshot)
             VALUES (?, 'pending', ?, ?, 0, 0, ?, ?)
             RETURNING id",
        )
        .bind(execution.configuration_id)
        .bind(&execution.started_at)
        .bind(execution.total as i64)
        .bind(&execution.label)
        .bind(&snapshot)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.try_get::<i64, _>("id").map_err(map_sqlx)
    }

    async fn update_execution(&self, id: i64, update: ExecutionUpdate) -> Result<(), DomainError> {
        if let Some(status) = update.status {
            sqlx::query("UPDATE executions SET status = ? WHERE id = ?")
                .bind(status.to_string())
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
        }
        if let Some(completed_at) = update.completed_at {
            sqlx::query("UPDATE executions SET completed_at = ? WHERE id = ?")
                .bind(completed_at)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
        }
        if let Some(totals) = update.totals {
            sqlx::query("UPDATE executions SET total = ?, successful = ?, failed = ? WHERE id = ?")
                .bind(totals.total as i64)
                .bind(totals.successful as i64)
                .bind(totals.failed as i64)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
        }
        if let Some(label) = update.label {
            sqlx::query("UPDATE executions SET label = ? WHERE id = ?")
                .bind(label)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
        }
        if let Some(error_message) = update.error_message {
            sqlx::query("UPDATE executions SET error_message = ? WHERE id = ?")
                .bind(error_message)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
        }
        Ok(())
    }

    async fn delete_execution(&self, id: i64) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM executions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_execution(&self, id: i64) -> Result<Option<Execution>, DomainError> {
        let row: Option<ExecutionRow> = sqlx::query_as("SELECT * FROM executions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.map(ExecutionRow::into_entity).transpose()
    }

    async fn list_executions(
        &self,
        filter: ExecutionFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Execution>, DomainError> {
        let mut sql = String::from("SELECT * FROM executions WHERE 1=1");
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.label_contains.is_some() {
            sql.push_str(" AND label LIKE ?");
        }
        if filter.started_after.is_some() {
            sql.push_str(" AND started_at >= ?");
        }
        if filter.started_before.is_some() {
            sql.push_str(" AND started_at <= ?");
        }
        if filter.min_total.is_some() {
            sql.push_str(" AND total >= ?");
        }
        if filter.max_total.is_some() {
            sql.push_str(" AND total <= ?");
        }
        sql.push_str(" ORDER BY started_at DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query_as::<_, ExecutionRow>(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.to_string());
        }
        if let Some(contains) = &filter.label_contains {
            query = query.bind(format!("%{contains}%"));
        }
        if let Some(after) = &filter.started_after {
            query = query.bind(after.clone());
        }
        if let Some(before) = &filter.started_before {
            query = query.bind(before.clone());
        }
        if let Some(min_total) = filter.min_total {
            query = query.bind(min_total as i64);
        }
        if let Some(max_total) = filter.max_total {
            query = query.bind(max_total as i64);
        }
        query = query.bind(page_size as i64).bind((page as i64) * (page_size as i64));

        let rows = query.fetch_all(&self.pool).await.map_err(map_sqlx)?;
        rows.into_iter().map(ExecutionRow::into_entity).collect()
    }

    async fn count_executions(&self, filter: ExecutionFilter) -> Result<u64, DomainError> {
        let mut sql = String::from("SELECT COUNT(*) AS n FROM executions WHERE 1=1");
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.label_contains.is_some() {
            sql.push_str(" AND label LIKE ?");
        }
        if filter.started_after.is_some() {
            sql.push_str(" AND started_at >= ?");
        }
        if filter.started_before.is_some() {
            sql.push_str(" AND started_at <= ?");
        }
        if filter.min_total.is_some() {
            sql.push_str(" AND total >= ?");
        }
        if filter.max_total.is_some() {
            sql.push_str(" AND total <= ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.to_string());
        }
        if let Some(contains) = &filter.label_contains {
            query = query.bind(format!("%{contains}%"));
        }
        if let Some(after) = &filter.started_after {
            query = query.bind(after.clone());
        }
        if let Some(before) = &filter.started_before {
            query = query.bind(before.clone());
        }
        if let Some(min_total) = filter.min_total {
            query = query.bind(min_total as i64);
        }
        if let Some(max_total) = filter.max_total {
            query = query.bind(max_total as i64);
        }

        let row = query.fetch_one(&self.pool).await.map_err(map_sqlx)?;
        let n: i64 = row.try_get("n").map_err(map_sqlx)?;
        Ok(n as u64)
    }

    async fn save_image(&self, image: NewGeneratedImage) -> Result<i64, DomainError> {
        let metadata = image.metadata.as_ref().map(serde_json::to_string).transpose()?;
        let processing_settings = serde_json::to_string(&image.processing_settings)?;
        let now = now_iso8601();
        let row = sqlx::query(
            "INSERT INTO generated_images
                (execution_id, mapping_id, prompt, seed, qc_status, qc_reason, final_path, metadata,
                 processing_settings, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(image.execution_id)
        .bind(image.mapping_id.0)
        .bind(&image.prompt)
        .bind(image.seed)
        .bind(image.qc_status.to_string())
        .bind(&image.qc_reason)
        .bind(&image.final_path)
        .bind(&metadata)
        .bind(&processing_settings)
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.try_get::<i64, _>("id").map_err(map_sqlx)
    }

    async fn update_image(&self, id: i64, update: ImageUpdate) -> Result<(), DomainError> {
        self.apply_image_update("id", id, update).await
    }

    async fn update_image_by_mapping(
        &self,
        execution_id: i64,
        mapping_id: MappingId,
        update: ImageUpdate,
    ) -> Result<(), DomainError> {
        let existing = self.get_image_by_mapping(execution_id, mapping_id).await?;
        let Some(existing) = existing else {
            return Err(DomainError::catalog(
                CatalogErrorKind::Constraint,
                format!("no image row for execution {execution_id}, mapping {mapping_id}"),
            ));
        };
        self.apply_image_update("id", existing.id, update).await
    }

    async fn get_image(&self, id: i64) -> Result<Option<GeneratedImage>, DomainError> {
        let row: Option<GeneratedImageRow> = sqlx::query_as("SELECT * FROM generated_images WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.map(GeneratedImageRow::into_entity).transpose()
    }

    async fn get_image_by_mapping(
        &self,
        execution_id: i64,
        mapping_id: MappingId,
    ) -> Result<Option<GeneratedImage>, DomainError> {
        let row: Option<GeneratedImageRow> =
            sqlx::query_as("SELECT * FROM generated_images WHERE execution_id = ? AND mapping_id = ?")
                .bind(execution_id)
                .bind(mapping_id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;
        row.map(GeneratedImageRow::into_entity).transpose()
    }

    async fn list_images(&self, filter: ImageFilter) -> Result<Vec<GeneratedImage>, DomainError> {
        let mut sql = String::from("SELECT * FROM generated_images WHERE 1=1");
        if filter.execution_id.is_some() {
            sql.push_str(" AND execution_id = ?");
        }
        if filter.qc_status.is_some() {
            sql.push_str(" AND qc_status = ?");
        }
        sql.push_str(" ORDER BY mapping_id ASC");

        let mut query = sqlx::query_as::<_, GeneratedImageRow>(&sql);
        if let Some(execution_id) = filter.execution_id {
            query = query.bind(execution_id);
        }
        if let Some(qc_status) = filter.qc_status {
            query = query.bind(qc_status.to_string());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(map_sqlx)?;
        rows.into_iter().map(GeneratedImageRow::into_entity).collect()
    }

    async fn bulk_delete_images(&self, ids: &[i64]) -> Result<u64, DomainError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("DELETE FROM generated_images WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let result = query.execute(&self.pool).await.map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn recompute_execution_totals(&self, id: i64) -> Result<(), DomainError> {
        let row = sqlx::query(
            "SELECT
                (SELECT total FROM executions WHERE id = ?) AS total,
                (SELECT COUNT(*) FROM generated_images WHERE execution_id = ? AND final_path IS NOT NULL) AS successful",
        )
        .bind(id)
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        let total: i64 = row.try_get("total").map_err(map_sqlx)?;
        let successful: i64 = row.try_get("successful").map_err(map_sqlx)?;
        let failed = (total - successful).max(0);

        sqlx::query("UPDATE executions SET successful = ?, failed = ? WHERE id = ?")
            .bind(successful)
            .bind(failed)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn image_statistics(&self, execution_id: Option<i64>) -> Result<ImageStatistics, DomainError> {
        let sql = if execution_id.is_some() {
            "SELECT
                COUNT(*) AS total,
                SUM(CASE WHEN final_path IS NOT NULL THEN 1 ELSE 0 END) AS successful,
                SUM(CASE WHEN qc_status = 'approved' THEN 1 ELSE 0 END) AS approved,
                SUM(CASE WHEN qc_status = 'qc_failed' THEN 1 ELSE 0 END) AS qc_failed,
                SUM(CASE WHEN qc_status = 'retry_pending' THEN 1 ELSE 0 END) AS retry_pending,
                SUM(CASE WHEN qc_status = 'retry_failed' THEN 1 ELSE 0 END) AS retry_failed
             FROM generated_images WHERE execution_id = ?"
        } else {
            "SELECT
                COUNT(*) AS total,
                SUM(CASE WHEN final_path IS NOT NULL THEN 1 ELSE 0 END) AS successful,
                SUM(CASE WHEN qc_status = 'approved' THEN 1 ELSE 0 END) AS approved,
                SUM(CASE WHEN qc_status = 'qc_failed' THEN 1 ELSE 0 END) AS qc_failed,
                SUM(CASE WHEN qc_status = 'retry_pending' THEN 1 ELSE 0 END) AS retry_pending,
                SUM(CASE WHEN qc_status = 'retry_failed' THEN 1 ELSE 0 END) AS retry_failed
             FROM generated_images"
        };
        let mut query = sqlx::query(sql);
        if let Some(id) = execution_id {
            query = query.bind(id);
        }
        let row = query.fetch_one(&self.pool).await.map_err(map_sqlx)?;
        let total: i64 = row.try_get("total").map_err(map_sqlx)?;
        let successful: i64 = row.try_get::<Option<i64>, _>("successful").map_err(map_sqlx)?.unwrap_or(0);
        let approved: i64 = row.try_get::<Option<i64>, _>("approved").map_err(map_sqlx)?.unwrap_or(0);
        let qc_failed: i64 = row.try_get::<Option<i64>, _>("qc_failed").map_err(map_sqlx)?.unwrap_or(0);
        let retry_pending: i64 = row.try_get::<Option<i64>, _>("retry_pending").map_err(map_sqlx)?.unwrap_or(0);
        let retry_failed: i64 = row.try_get::<Option<i64>, _>("retry_failed").map_err(map_sqlx)?.unwrap_or(0);
        Ok(ImageStatistics {
            total: total as u64,
            successful: successful as u64,
            failed: (total - successful).max(0) as u64,
            approved: approved as u64,
            qc_failed: qc_failed as u64,
            retry_pending: retry_pending as u64,
            retry_failed: retry_failed as u64,
        })
    }
}

impl SqliteCatalog {
    async fn apply_image_update(&self, key_column: &str, id: i64, update: ImageUpdate) -> Result<(), DomainError> {
        if let Some(qc_status) = update.qc_status {
            let sql = format!("UPDATE generated_images SET qc_status = ? WHERE {key_column} = ?");
            sqlx::query(&sql)
                .bind(qc_status.to_string())
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
        }
        if let Some(qc_reason) = update.qc_reason {
            let sql = format!("UPDATE generated_images SET qc_reason = ? WHERE {key_column} = ?");
            sqlx::query(&sql)
                .bind(qc_reason)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
        }
        if let Some(final_path) = update.final_path {
            let sql = format!("UPDATE generated_images SET final_path = ? WHERE {key_column} = ?");
            sqlx::query(&sql)
                .bind(final_path)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
        }
        if let Some(metadata) = update.metadata {
            let encoded = metadata.as_ref().map(serde_json::to_string).transpose()?;
            let sql = format!("UPDATE generated_images SET metadata = ? WHERE {key_column} = ?");
            sqlx::query(&sql)
                .bind(encoded)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
        }
        if let Some(processing_settings) = update.processing_settings {
            let encoded = serde_json::to_string(&processing_settings)?;
            let sql = format!("UPDATE generated_images SET processing_settings = ? WHERE {key_column} = ?");
            sqlx::query(&sql)
                .bind(encoded)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
        }
        Ok(())
    }
}

#[async_trait]
impl SecretRowStore for SqliteCatalog {
    async fn get_encrypted(&self, service: &str, account: &str) -> Result<Option<String>, DomainError> {
        self.get_secret_row(service, account, "encrypted").await
    }

    async fn set_encrypted(&self, service: &str, account: &str, value: &str) -> Result<(), DomainError> {
        self.upsert_secret_row(service, account, "encrypted", value).await
    }

    async fn get_plaintext(&self, service: &str, account: &str) -> Result<Option<String>, DomainError> {
        self.get_secret_row(service, account, "plaintext").await
    }

    async fn set_plaintext(&self, service: &str, account: &str, value: &str) -> Result<(), DomainError> {
        self.upsert_secret_row(service, account, "plaintext", value).await
    }

    async fn delete_row(&self, service: &str, account: &str) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM secrets WHERE service = ? AND account = ?")
            .bind(service)
            .bind(account)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }
}

impl SqliteCatalog {
    async fn get_secret_row(&self, service: &str, account: &str, tier: &str) -> Result<Option<String>, DomainError> {
        let row = sqlx::query("SELECT value FROM secrets WHERE service = ? AND account = ? AND tier = ?")
            .bind(service)
            .bind(account)
            .bind(tier)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.map(|r| r.try_get::<String, _>("value").map_err(map_sqlx)).transpose()
    }

    async fn upsert_secret_row(&self, service: &str, account: &str, tier: &str, value: &str) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO secrets (service, account, tier, value) VALUES (?, ?, ?, ?)
             ON CONFLICT(service, account) DO UPDATE SET tier = excluded.tier, value = excluded.value",
        )
        .bind(service)
        .bind(account)
        .bind(tier)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgforge_domain::value_objects::settings::{ApiKeysConfig, FilePathsConfig, ParametersConfig, ProcessMode};
    use imgforge_domain::value_objects::{ProcessingSettings, Settings};
    use tempfile::NamedTempFile;

    async fn open_test_catalog() -> SqliteCatalog {
        let temp = NamedTempFile::new().unwrap();
        let db_url = format!("sqlite://{}", temp.path().to_str().unwrap());
        drop(temp);
        SqliteCatalog::open(&db_url).await.unwrap()
    }

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
                aspect_ratios: vec!["1:1".into()],
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
    async fn saves_and_fetches_configuration_by_name() {
        let catalog = open_test_catalog().await;
        let id = catalog
            .save_configuration(NewConfiguration {
                name: "default".into(),
                settings: sample_settings(),
            })
            .await
            .unwrap();

        let fetched = catalog.get_configuration(id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "default");

        let by_name = catalog.get_configuration_by_name("default").await.unwrap().unwrap();
        assert_eq!(by_name.id, id);
    }

    #[tokio::test]
    async fn save_configuration_upserts_by_name() {
        let catalog = open_test_catalog().await;
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
        assert_eq!(catalog.list_configurations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rename_configuration_preserves_id_and_updates_timestamp() {
        let catalog = open_test_catalog().await;
        let id = catalog
            .save_configuration(NewConfiguration { name: "old-name".into(), settings: sample_settings() })
            .await
            .unwrap();
        let before = catalog.get_configuration(id).await.unwrap().unwrap();

        catalog.rename_configuration(id, "new-name").await.unwrap();

        let renamed = catalog.get_configuration(id).await.unwrap().unwrap();
        assert_eq!(renamed.id, id);
        assert_eq!(renamed.name, "new-name");
        assert!(renamed.updated_at >= before.updated_at);
        assert!(catalog.get_configuration_by_name("old-name").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rename_configuration_rejects_missing_id() {
        let catalog = open_test_catalog().await;
        assert!(catalog.rename_configuration(999, "whatever").await.is_err());
    }

    #[tokio::test]
    async fn execution_and_image_round_trip_with_totals() {
        let catalog = open_test_catalog().await;
        let execution_id = catalog
            .save_execution(NewExecution {
                configuration_id: None,
                started_at: now_iso8601(),
                total: 2,
                label: Some("batch".into()),
                settings_snapshot: sample_settings(),
            })
            .await
            .unwrap();

        let image_id = catalog
            .save_image(NewGeneratedImage {
                execution_id: Some(execution_id),
                mapping_id: MappingId(1),
                prompt: "a cat".into(),
                seed: Some(7),
                qc_status: imgforge_domain::value_objects::QcStatus::Pending,
                qc_reason: None,
                final_path: None,
                metadata: None,
                processing_settings: sample_processing_settings(),
            })
            .await
            .unwrap();

        catalog
            .update_image(
                image_id,
                ImageUpdate {
                    qc_status: Some(imgforge_domain::value_objects::QcStatus::Approved),
                    final_path: Some(Some("/out/1.png".into())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        catalog.recompute_execution_totals(execution_id).await.unwrap();
        let execution = catalog.get_execution(execution_id).await.unwrap().unwrap();
        assert_eq!(execution.totals.successful, 1);
        assert_eq!(execution.totals.failed, 1);
    }

    #[tokio::test]
    async fn update_image_by_mapping_overwrites_retry_outcome() {
        let catalog = open_test_catalog().await;
        let execution_id = catalog
            .save_execution(NewExecution {
                configuration_id: None,
                started_at: now_iso8601(),
                total: 1,
                label: None,
                settings_snapshot: sample_settings(),
            })
            .await
            .unwrap();
        catalog
            .save_image(NewGeneratedImage {
                execution_id: Some(execution_id),
                mapping_id: MappingId(5),
                prompt: "a dog".into(),
                seed: None,
                qc_status: imgforge_domain::value_objects::QcStatus::RetryPending,
                qc_reason: Some("qc failed".into()),
                final_path: None,
                metadata: None,
                processing_settings: sample_processing_settings(),
            })
            .await
            .unwrap();

        catalog
            .update_image_by_mapping(
                execution_id,
                MappingId(5),
                ImageUpdate {
                    qc_status: Some(imgforge_domain::value_objects::QcStatus::Approved),
                    final_path: Some(Some("/out/5.png".into())),
                    qc_reason: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let image = catalog
            .get_image_by_mapping(execution_id, MappingId(5))
            .await
            .unwrap()
            .unwrap();
        assert!(image.qc_status.is_terminal_success());
        assert_eq!(image.final_path.as_deref(), Some("/out/5.png"));
        assert!(image.qc_reason.is_none());
    }

    #[tokio::test]
    async fn secret_row_store_round_trips_each_tier() {
        let catalog = open_test_catalog().await;
        catalog.set_encrypted("piapi", "api_key", "cipher-text").await.unwrap();
        assert_eq!(
            catalog.get_encrypted("piapi", "api_key").await.unwrap().as_deref(),
            Some("cipher-text")
        );
        assert!(catalog.get_plaintext("piapi", "api_key").await.unwrap().is_none());

        catalog.delete_row("piapi", "api_key").await.unwrap();
        assert!(catalog.get_encrypted("piapi", "api_key").await.unwrap().is_none());
    }
}
