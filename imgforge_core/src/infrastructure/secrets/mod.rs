//! # SecretsVault
//!
//! Spec §4.2's tiered credential lookup: OS keychain, then an AES-GCM
//! encrypted row in the Catalog, then a plaintext row (development only).
//! Writes go to the highest available tier; reads walk tiers in order and
//! report which one served the value.

mod encrypted_row;
mod keychain;

pub use encrypted_row::RowCipher;
pub use keychain::KeychainBackend;

use async_trait::async_trait;
use std::sync::Arc;

use imgforge_domain::error::DomainError;
use imgforge_domain::ports::secrets_vault::{SecretsVault, SecurityLevel};

/// Persistence for the tier-2 (encrypted) and tier-3 (plaintext) rows.
/// Implemented by the Catalog, kept separate from `CatalogRepository` so
/// `TieredSecretsVault` does not need the full catalog surface.
#[async_trait]
pub trait SecretRowStore: Send + Sync {
    async fn get_encrypted(&self, service: &str, account: &str) -> Result<Option<String>, DomainError>;
    async fn set_encrypted(&self, service: &str, account: &str, value: &str) -> Result<(), DomainError>;
    async fn get_plaintext(&self, service: &str, account: &str) -> Result<Option<String>, DomainError>;
    async fn set_plaintext(&self, service: &str, account: &str, value: &str) -> Result<(), DomainError>;
    async fn delete_row(&self, service: &str, account: &str) -> Result<(), DomainError>;
}

/// Tiered `SecretsVault` implementation: keychain → encrypted row →
/// plaintext row.
pub struct TieredSecretsVault {
    keychain: KeychainBackend,
    cipher: RowCipher,
    rows: Arc<dyn SecretRowStore>,
    allow_plaintext: bool,
}

impl TieredSecretsVault {
    pub fn new(rows: Arc<dyn SecretRowStore>, allow_plaintext: bool) -> Result<Self, DomainError> {
        Ok(Self {
            keychain: KeychainBackend::new(),
            cipher: RowCipher::from_machine_identity()?,
            rows,
            allow_plaintext,
        })
    }

    fn is_blank(value: &str) -> bool {
        value.trim().is_empty()
    }
}

#[async_trait]
impl SecretsVault for TieredSecretsVault {
    async fn get(&self, service: &str, account: &str) -> Result<Option<(String, SecurityLevel)>, DomainError> {
        if let Some(value) = self.keychain.get(service, account)? {
            return Ok(Some((value, SecurityLevel::Keychain)));
        }

        if let Some(encoded) = self.rows.get_encrypted(service, account).await? {
            // spec §4.2: "a failed decrypt for tier-2 returns the input
            // string unchanged (so legacy plaintext is not lost)."
            let value = self.cipher.decrypt(&encoded).unwrap_or(encoded);
            return Ok(Some((value, SecurityLevel::EncryptedRow)));
        }

        if let Some(value) = self.rows.get_plaintext(service, account).await? {
            return Ok(Some((value, SecurityLevel::Plaintext)));
        }

        Ok(None)
    }

    async fn set(&self, service: &str, account: &str, value: &str) -> Result<(), DomainError> {
        if Self::is_blank(value) {
            return self.delete(service, account).await;
        }

        if self.keychain.set(service, account, value).is_ok() {
            return Ok(());
        }

        let encoded = self.cipher.encrypt(value);
        match self.rows.set_encrypted(service, account, &encoded).await {
            Ok(()) => Ok(()),
            Err(e) if self.allow_plaintext => {
                tracing::warn!("falling back to plaintext secret storage for {service}/{account}: {e}");
                self.rows.set_plaintext(service, account, value).await
            }
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, service: &str, account: &str) -> Result<(), DomainError> {
        let _ = self.keychain.delete(service, account);
        self.rows.delete_row(service, account).await
    }
}
