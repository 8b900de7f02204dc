//! `ExportService` — SPEC_FULL.md's supplemented-features section:
//! `image:export-zip` / `execution:bulk-export` stream approved images plus
//! a `metadata.json` manifest into a zip archive; `execution:export-to-excel`
//! writes one row per execution mirroring `listExecutions`'s fields;
//! `execution:statistics` / `image:statistics` delegate to the Catalog's
//! single aggregate query rather than looping over `list_images` here.
//!
//! Grounded on no direct teacher precedent (the teacher's pipeline never
//! produces an archive or a spreadsheet); the `zip`/`rust_xlsxwriter`
//! dependencies are ecosystem imports noted in DESIGN.md, wrapped in the
//! same thin-adapter-over-a-port shape the teacher uses for its own I/O
//! adapters.

use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use zip::write::SimpleFileOptions;

use imgforge_domain::entities::{Execution, GeneratedImage, ImageFilter, ImageStatistics};
use imgforge_domain::error::DomainError;
use imgforge_domain::events::{ZipExportCompletedEvent, ZipExportErrorEvent, ZipExportProgressEvent};
use imgforge_domain::ports::CatalogRepository;
use imgforge_domain::services::now_iso8601;

use crate::application::services::event_bus::EventBus;

/// One `metadata.json` entry per archived image (spec's "approved images
/// plus a manifest").
#[derive(Debug, Serialize)]
struct ManifestEntry {
    image_id: i64,
    execution_id: Option<i64>,
    mapping_id: i64,
    prompt: String,
    seed: Option<i64>,
    qc_status: String,
    archive_name: String,
    title: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
}

pub struct ExportService {
    catalog: Arc<dyn CatalogRepository>,
    events: EventBus,
}

impl ExportService {
    pub fn new(catalog: Arc<dyn CatalogRepository>, events: EventBus) -> Self {
        Self { catalog, events }
    }

    /// `execution:statistics` / `image:statistics`: a single Catalog
    /// aggregate query, never an application-level loop over `list_images`.
    pub async fn image_statistics(&self, execution_id: Option<i64>) -> Result<ImageStatistics, DomainError> {
        self.catalog.image_statistics(execution_id).await
    }

    /// `image:export-zip`: the caller names arbitrary image ids, which may
    /// span more than one execution.
    pub async fn export_images_zip(&self, image_ids: &[i64], out: &Path) -> Result<(), DomainError> {
        let mut images = Vec::with_capacity(image_ids.len());
        for id in image_ids {
            if let Some(image) = self.catalog.get_image(*id).await? {
                images.push(image);
            }
        }
        let execution_id = single_execution_id(&images);
        self.write_zip(execution_id, images, out).await
    }

    /// `execution:bulk-export`: every approved image belonging to each
    /// named execution, one archive per call (spec §6's Adapter surface
    /// names the operation; this crate exports the named executions into
    /// the single `out` archive the caller chose, with one manifest
    /// covering all of them).
    pub async fn export_executions_zip(&self, execution_ids: &[i64], out: &Path) -> Result<(), DomainError> {
        let mut images = Vec::new();
        for execution_id in execution_ids {
            let mut batch = self
                .catalog
                .list_images(ImageFilter {
                    execution_id: Some(*execution_id),
                    qc_status: None,
                })
                .await?;
            images.append(&mut batch);
        }
        let execution_id = single_execution_id(&images);
        self.write_zip(execution_id, images, out).await
    }

    async fn write_zip(
        &self,
        execution_id: Option<i64>,
        images: Vec<GeneratedImage>,
        out: &Path,
    ) -> Result<(), DomainError> {
        let approved: Vec<&GeneratedImage> = images
            .iter()
            .filter(|image| image.qc_status.requires_final_path() && image.final_path.is_some())
            .collect();
        let total = approved.len() as u32;

        let result = self.write_zip_inner(&approved, out, execution_id, total).await;
        match &result {
            Ok(entry_count) => {
                self.events.publish_zip_export_completed(ZipExportCompletedEvent {
                    timestamp: now_iso8601(),
                    execution_id,
                    archive_path: out.display().to_string(),
                    entry_count: *entry_count,
                });
            }
            Err(err) => {
                self.events.publish_zip_export_error(ZipExportErrorEvent {
                    timestamp: now_iso8601(),
                    execution_id,
                    message: err.to_string(),
                });
            }
        }
        result.map(|_| ())
    }

    async fn write_zip_inner(
        &self,
        approved: &[&GeneratedImage],
        out: &Path,
        execution_id: Option<i64>,
        total: u32,
    ) -> Result<u32, DomainError> {
        let file = std::fs::File::create(out)
            .map_err(|e| DomainError::Internal(format!("creating zip archive {}: {e}", out.display())))?;
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        let mut manifest = Vec::with_capacity(approved.len());
        let mut archived = 0u32;
        for image in approved {
            let final_path = image.final_path.as_ref().expect("filtered to final_path.is_some()");
            let bytes = std::fs::read(final_path)
                .map_err(|e| DomainError::Internal(format!("reading {final_path} for export: {e}")))?;
            let archive_name = format!(
                "{}_{}.{}",
                image.execution_id.unwrap_or_default(),
                image.mapping_id,
                Path::new(final_path).extension().and_then(|e| e.to_str()).unwrap_or("bin")
            );

            writer
                .start_file(&archive_name, options)
                .map_err(|e| DomainError::Internal(format!("starting zip entry {archive_name}: {e}")))?;
            writer
                .write_all(&bytes)
                .map_err(|e| DomainError::Internal(format!("writing zip entry {archive_name}: {e}")))?;

            manifest.push(ManifestEntry {
                image_id: image.id,
                execution_id: image.execution_id,
                mapping_id: image.mapping_id.0,
                prompt: image.prompt.clone(),
                seed: image.seed,
                qc_status: image.qc_status.to_string(),
                archive_name,
                title: image.metadata.as_ref().map(|m| m.title.clone()),
                description: image.metadata.as_ref().map(|m| m.description.clone()),
                tags: image.metadata.as_ref().map(|m| m.tags.clone()).unwrap_or_default(),
            });

            archived += 1;
            self.events.publish_zip_export_progress(ZipExportProgressEvent {
                timestamp: now_iso8601(),
                execution_id,
                archived,
                total,
            });
        }

        let manifest_json = serde_json::to_vec_pretty(&manifest)?;
        writer
            .start_file("metadata.json", options)
            .map_err(|e| DomainError::Internal(format!("starting metadata.json entry: {e}")))?;
        writer
            .write_all(&manifest_json)
            .map_err(|e| DomainError::Internal(format!("writing metadata.json entry: {e}")))?;

        writer
            .finish()
            .map_err(|e| DomainError::Internal(format!("finalizing zip archive {}: {e}", out.display())))?;
        Ok(archived)
    }

    /// `execution:export-to-excel`: one row per execution, the same fields
    /// `listExecutions` returns.
    pub async fn export_executions_excel(&self, executions: &[Execution], out: &Path) -> Result<(), DomainError> {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet().set_name("Executions").map_err(xlsx_err)?;

        let headers = [
            "id",
            "label",
            "status",
            "started_at",
            "completed_at",
            "total",
            "successful",
            "failed",
            "error_message",
        ];
        for (col, header) in headers.iter().enumerate() {
            sheet.write_string(0, col as u16, *header).map_err(xlsx_err)?;
        }

        for (row, execution) in executions.iter().enumerate() {
            let row = (row + 1) as u32;
            sheet.write_number(row, 0, execution.id as f64).map_err(xlsx_err)?;
            sheet
                .write_string(row, 1, execution.label.as_deref().unwrap_or(""))
                .map_err(xlsx_err)?;
            sheet.write_string(row, 2, execution.status.to_string()).map_err(xlsx_err)?;
            sheet.write_string(row, 3, &execution.started_at).map_err(xlsx_err)?;
            sheet
                .write_string(row, 4, execution.completed_at.as_deref().unwrap_or(""))
                .map_err(xlsx_err)?;
            sheet.write_number(row, 5, execution.totals.total as f64).map_err(xlsx_err)?;
            sheet.write_number(row, 6, execution.totals.successful as f64).map_err(xlsx_err)?;
            sheet.write_number(row, 7, execution.totals.failed as f64).map_err(xlsx_err)?;
            sheet
                .write_string(row, 8, execution.error_message.as_deref().unwrap_or(""))
                .map_err(xlsx_err)?;
        }

        workbook
            .save(out)
            .map_err(|e| DomainError::Internal(format!("saving workbook {}: {e}", out.display())))?;
        Ok(())
    }
}

fn xlsx_err(err: rust_xlsxwriter::XlsxError) -> DomainError {
    DomainError::Internal(format!("xlsx write error: {err}"))
}

/// Returns `Some(id)` when every image in `images` belongs to the same
/// execution, `None` otherwise (a multi-execution export has no single
/// `execution_id` to tag its events with).
fn single_execution_id(images: &[GeneratedImage]) -> Option<i64> {
    let mut ids = images.iter().filter_map(|i| i.execution_id);
    let first = ids.next()?;
    if ids.all(|id| id == first) {
        Some(first)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgforge_domain::entities::{NewExecution, NewGeneratedImage};
    use imgforge_domain::value_objects::{MappingId, ProcessingSettings, QcStatus, Settings};
    use imgforge_domain::value_objects::settings::{ApiKeysConfig, FilePathsConfig, ParametersConfig, ProcessMode};

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
    async fn exports_approved_images_and_skips_unapproved() {
        let catalog: Arc<dyn CatalogRepository> = Arc::new(crate::infrastructure::catalog::InMemoryCatalog::new());
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

        let output_dir = tempfile::tempdir().unwrap();
        let approved_path = output_dir.path().join("approved.png");
        std::fs::write(&approved_path, b"approved bytes").unwrap();

        let approved_id = catalog
            .save_image(NewGeneratedImage {
                execution_id: Some(execution_id),
                mapping_id: MappingId(1),
                prompt: "a fox".into(),
                seed: None,
                qc_status: QcStatus::Approved,
                qc_reason: None,
                final_path: Some(approved_path.display().to_string()),
                metadata: None,
                processing_settings: sample_processing_settings(),
            })
            .await
            .unwrap();
        catalog
            .save_image(NewGeneratedImage {
                execution_id: Some(execution_id),
                mapping_id: MappingId(2),
                prompt: "a wolf".into(),
                seed: None,
                qc_status: QcStatus::QcFailed,
                qc_reason: Some("blurry".into()),
                final_path: None,
                metadata: None,
                processing_settings: sample_processing_settings(),
            })
            .await
            .unwrap();

        let export = ExportService::new(catalog.clone(), EventBus::new());
        let archive = output_dir.path().join("export.zip");
        export.export_executions_zip(&[execution_id], &archive).await.unwrap();

        let file = std::fs::File::open(&archive).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        assert_eq!(zip.len(), 2, "one approved image plus metadata.json");

        let manifest_raw = {
            let mut entry = zip.by_name("metadata.json").unwrap();
            let mut buf = String::new();
            std::io::Read::read_to_string(&mut entry, &mut buf).unwrap();
            buf
        };
        let manifest: Vec<serde_json::Value> = serde_json::from_str(&manifest_raw).unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0]["image_id"], approved_id);
    }

    #[tokio::test]
    async fn statistics_delegates_to_catalog_aggregate() {
        let catalog: Arc<dyn CatalogRepository> = Arc::new(crate::infrastructure::catalog::InMemoryCatalog::new());
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

        let export = ExportService::new(catalog, EventBus::new());
        let stats = export.image_statistics(Some(execution_id)).await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.approved, 1);
    }
}
