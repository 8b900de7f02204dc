//! Application layer: the use-case orchestrators that drive the domain
//! aggregate and compose the infrastructure ports — `JobRunner`,
//! `RetryExecutor`, `ImageProcessor`, the external-facing `Adapter`, and
//! the ambient `EventBus` service they all publish through.

pub mod adapter;
pub mod export;
pub mod image_processor;
pub mod job_runner;
pub mod retry_executor;
pub mod services;
