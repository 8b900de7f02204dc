//! `CatalogRepository` — the port spec §4.1 describes. `imgforge_core`
//! provides the sole implementation, `SqliteCatalog`, plus an in-memory fake
//! for tests.

use async_trait::async_trait;

use crate::entities::{
    Configuration, Execution, ExecutionFilter, ExecutionUpdate, GeneratedImage, ImageFilter, ImageStatistics,
    ImageUpdate, NewConfiguration, NewExecution, NewGeneratedImage,
};
use crate::error::DomainError;
use crate::value_objects::MappingId;

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn save_configuration(&self, config: NewConfiguration) -> Result<i64, DomainError>;
    async fn get_configuration(&self, id: i64) -> Result<Option<Configuration>, DomainError>;
    async fn get_configuration_by_name(&self, name: &str) -> Result<Option<Configuration>, DomainError>;
    async fn list_configurations(&self) -> Result<Vec<Configuration>, DomainError>;
    async fn delete_configuration(&self, id: i64) -> Result<(), DomainError>;

    /// `configuration:update-name` (spec §6): renames a configuration in
    /// place, preserving its id and referencing `Execution` rows. Distinct
    /// from `save_configuration`'s upsert-by-name, which would mint a new
    /// row rather than rename the existing one.
    async fn rename_configuration(&self, id: i64, new_name: &str) -> Result<(), DomainError>;

    async fn save_execution(&self, execution: NewExecution) -> Result<i64, DomainError>;
    async fn update_execution(&self, id: i64, update: ExecutionUpdate) -> Result<(), DomainError>;
    async fn delete_execution(&self, id: i64) -> Result<(), DomainError>;
    async fn get_execution(&self, id: i64) -> Result<Option<Execution>, DomainError>;
    /// `page` is 0-based: page `0` is the first `page_size` rows.
    async fn list_executions(
        &self,
        filter: ExecutionFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Execution>, DomainError>;
    async fn count_executions(&self, filter: ExecutionFilter) -> Result<u64, DomainError>;

    async fn save_image(&self, image: NewGeneratedImage) -> Result<i64, DomainError>;
    async fn update_image(&self, id: i64, update: ImageUpdate) -> Result<(), DomainError>;
    async fn update_image_by_mapping(
        &self,
        execution_id: i64,
        mapping_id: MappingId,
        update: ImageUpdate,
    ) -> Result<(), DomainError>;
    async fn get_image(&self, id: i64) -> Result<Option<GeneratedImage>, DomainError>;
    async fn get_image_by_mapping(
        &self,
        execution_id: i64,
        mapping_id: MappingId,
    ) -> Result<Option<GeneratedImage>, DomainError>;
    async fn list_images(&self, filter: ImageFilter) -> Result<Vec<GeneratedImage>, DomainError>;
    async fn bulk_delete_images(&self, ids: &[i64]) -> Result<u64, DomainError>;

    /// Spec §4.1: "derives `{total, successful, failed}` from
    /// `generated_images`: total = expected (already persisted on the
    /// row), successful = count with non-null `final_path`, failed =
    /// expected − persisted (images that never produced a row)."
    async fn recompute_execution_totals(&self, id: i64) -> Result<(), DomainError>;

    /// Aggregate `qc_status` counts over `generated_images`, scoped to one
    /// execution or the whole catalog (`execution:statistics` /
    /// `image:statistics`). A single grouped query, not a `list_images`
    /// scan at the application layer.
    async fn image_statistics(&self, execution_id: Option<i64>) -> Result<ImageStatistics, DomainError>;
}
