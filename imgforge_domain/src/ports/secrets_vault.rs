//! `SecretsVault` — spec §4.2's tiered credential lookup, treated as an
//! external collaborator per spec §1 but the trait lives here so
//! `PipelineStage` implementations can depend on it without depending on a
//! concrete keychain/encryption backend.

use async_trait::async_trait;

use crate::error::DomainError;

/// Which tier actually served a read (spec §4.2: "report the tier used via
/// `securityLevel`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityLevel {
    Keychain,
    EncryptedRow,
    Plaintext,
}

#[async_trait]
pub trait SecretsVault: Send + Sync {
    /// Reads a credential, walking tiers in order. Returns `None` if no
    /// tier has a value for `(service, account)`.
    async fn get(&self, service: &str, account: &str) -> Result<Option<(String, SecurityLevel)>, DomainError>;

    /// Writes to the highest available tier. An empty or whitespace-only
    /// `value` is a delete (spec §4.2).
    async fn set(&self, service: &str, account: &str, value: &str) -> Result<(), DomainError>;

    async fn delete(&self, service: &str, account: &str) -> Result<(), DomainError>;
}
