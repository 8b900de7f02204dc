//! Tier 1 of the `SecretsVault` lookup: the OS-native credential store
//! (macOS Keychain, Windows Credential Manager, the Secret Service on
//! Linux), via the `keyring` crate.

use imgforge_domain::error::DomainError;

pub struct KeychainBackend;

impl KeychainBackend {
    pub fn new() -> Self {
        Self
    }

    fn entry(&self, service: &str, account: &str) -> Result<keyring::Entry, DomainError> {
        keyring::Entry::new(service, account)
            .map_err(|e| DomainError::external_service(false, format!("keychain unavailable: {e}")))
    }

    pub fn get(&self, service: &str, account: &str) -> Result<Option<String>, DomainError> {
        match self.entry(service, account)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(DomainError::external_service(false, format!("keychain read failed: {e}"))),
        }
    }

    pub fn set(&self, service: &str, account: &str, value: &str) -> Result<(), DomainError> {
        self.entry(service, account)?
            .set_password(value)
            .map_err(|e| DomainError::external_service(false, format!("keychain write failed: {e}")))
    }

    pub fn delete(&self, service: &str, account: &str) -> Result<(), DomainError> {
        match self.entry(service, account)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(DomainError::external_service(false, format!("keychain delete failed: {e}"))),
        }
    }
}

impl Default for KeychainBackend {
    fn default() -> Self {
        Self::new()
    }
}
