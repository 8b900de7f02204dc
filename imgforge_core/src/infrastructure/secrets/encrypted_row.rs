//! Tier 2 of the `SecretsVault` lookup: an AES-256-GCM encrypted row,
//! keyed by a machine-derived secret so the ciphertext is unreadable off
//! the machine that wrote it, but needs no separate key file to manage.
//!
//! Encoded form is `IV:AuthTag:Ciphertext`, each component base64 — spec
//! §4.2.

use aes_gcm::aead::AeadInPlace;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use argon2::Argon2;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use rand::RngCore;

use imgforge_domain::error::DomainError;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;
/// Fixed, non-secret salt — the secrecy comes from the machine-identity
/// password material, not the salt, matching Argon2's intended use as a
/// KDF rather than a password hash here.
const KDF_SALT: &[u8] = b"imgforge-secrets-vault-kdf-salt";

pub struct RowCipher {
    key: [u8; KEY_LEN],
}

impl RowCipher {
    /// Derives the row-encryption key from material specific to this
    /// machine (spec §4.2: "AES-GCM with a machine-derived 32-byte key").
    pub fn from_machine_identity() -> Result<Self, DomainError> {
        let material = machine_identity();
        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(material.as_bytes(), KDF_SALT, &mut key)
            .map_err(|e| DomainError::configuration(format!("deriving secrets-vault key: {e}")))?;
        Ok(Self { key })
    }

    pub fn encrypt(&self, plaintext: &str) -> String {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut buffer = plaintext.as_bytes().to_vec();
        cipher
            .encrypt_in_place(nonce, b"", &mut buffer)
            .expect("AES-256-GCM encryption with a fixed 32-byte key cannot fail");

        // `encrypt_in_place` appends the 16-byte auth tag to the buffer;
        // split it off so the encoded form carries it as its own component.
        let tag = buffer.split_off(buffer.len() - TAG_LEN);
        format!("{}:{}:{}", B64.encode(nonce_bytes), B64.encode(tag), B64.encode(buffer))
    }

    /// Returns `None` on any malformed or non-decryptable input, so the
    /// caller can fall back to treating the value as unmasked legacy
    /// plaintext (spec §4.2).
    pub fn decrypt(&self, encoded: &str) -> Option<String> {
        let mut parts = encoded.splitn(3, ':');
        let nonce_b64 = parts.next()?;
        let tag_b64 = parts.next()?;
        let ciphertext_b64 = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let nonce_bytes = B64.decode(nonce_b64).ok()?;
        let tag_bytes = B64.decode(tag_b64).ok()?;
        let ciphertext_bytes = B64.decode(ciphertext_b64).ok()?;
        if nonce_bytes.len() != NONCE_LEN || tag_bytes.len() != TAG_LEN {
            return None;
        }

        // Recombine into the ciphertext||tag layout `decrypt_in_place` expects.
        let mut buffer = ciphertext_bytes;
        buffer.extend_from_slice(&tag_bytes);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let nonce = Nonce::from_slice(&nonce_bytes);

        cipher.decrypt_in_place(nonce, b"", &mut buffer).ok()?;
        String::from_utf8(buffer).ok()
    }
}

fn machine_identity() -> String {
    if let Ok(id) = std::fs::read_to_string("/etc/machine-id") {
        let id = id.trim();
        if !id.is_empty() {
            return id.to_string();
        }
    }
    if let Some(home) = dirs::home_dir() {
        return home.display().to_string();
    }
    "imgforge-default-machine-identity".to_string()
}
