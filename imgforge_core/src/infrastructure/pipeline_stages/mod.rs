//! Local (non-HTTP) `PipelineStage` implementations: planning, downloading,
//! and the `image`-crate-backed trim/enhance/convert stages (spec §4.4
//! stages 1, 3, 5, 6, 7). The HTTP-calling stages (generate, remove-bg,
//! quality-check, metadata) live in `infrastructure::providers`.

pub mod convert;
pub mod download;
pub mod enhance;
pub mod plan;
pub mod trim_transparent;

pub use convert::LocalConvertStage;
pub use download::HttpDownloadStage;
pub use enhance::LocalEnhanceStage;
pub use plan::LocalPlanStage;
pub use trim_transparent::LocalTrimTransparentStage;
