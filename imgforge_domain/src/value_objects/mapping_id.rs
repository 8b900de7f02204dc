//! `MappingId` — spec GLOSSARY: "stable identifier `(execution_id,
//! mapping_id)` so retries can overwrite the original row." It is scoped to
//! one execution, not globally unique, so `(ExecutionId, MappingId)` is the
//! natural-key pair the Catalog enforces uniqueness over.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MappingId(pub i64);

impl std::fmt::Display for MappingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MappingId {
    fn from(v: i64) -> Self {
        MappingId(v)
    }
}
