//! Runtime support the application layer needs but that isn't itself a
//! port implementation: cooperative cancellation and temp-file lifecycle.

mod cancellation;
mod temp_artifact;

pub use cancellation::TokioCancelSignal;
pub use temp_artifact::TempArtifact;
