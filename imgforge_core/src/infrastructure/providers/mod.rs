//! HTTP-calling provider adapters (spec §4.4's "external HTTP call" half of
//! each stage). Generation (`piapi`/`runware`), background removal, and the
//! OpenAI-based quality-check/metadata calls each get a thin adapter struct
//! implementing the matching domain `PipelineStage` trait, grounded on the
//! teacher's "thin adapter wraps one `reqwest::Client`" shape.

pub mod generation;
pub mod openai;
pub mod remove_bg;

pub use generation::HttpGenerateStage;
pub use openai::{OpenAiMetadataStage, OpenAiQualityCheckStage};
pub use remove_bg::HttpRemoveBackgroundStage;
