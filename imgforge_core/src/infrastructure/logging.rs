//! Structured logging bootstrap and secret redaction.
//!
//! `imgforge_cli::logger` installs the process-wide `tracing` subscriber at
//! startup (bootstrap concern); this module supplies the one thing the
//! application layer needs from logging that isn't a bootstrap concern:
//! masking API keys out of any message before it reaches a log line, an
//! event payload, or an error forwarded to the UI (spec §7, "any log,
//! event, or error payload must mask API keys by substring replacement
//! before emission").

use std::sync::RwLock;

/// Tracks the literal secret values seen so far so `redact` can substring-
/// replace them out of arbitrary text. Populated by `SecretsVault` reads —
/// every credential fetched at stage time is registered here before it is
/// used in an HTTP call, so any log line that echoes request details never
/// leaks it.
static KNOWN_SECRETS: RwLock<Vec<String>> = RwLock::new(Vec::new());

/// Registers a secret value for future redaction. No-op for blank strings,
/// since those aren't real credentials (spec §4.2: "empty ... write is a
/// delete").
pub fn register_secret(value: &str) {
    if value.trim().is_empty() {
        return;
    }
    let mut secrets = KNOWN_SECRETS.write().expect("secret registry lock poisoned");
    if !secrets.iter().any(|s| s == value) {
        secrets.push(value.to_string());
    }
}

/// Masks every registered secret out of `text` by substring replacement,
/// per spec §7. Short (<4 char) secrets are skipped to avoid mass-masking
/// incidental short substrings.
pub fn redact(text: &str) -> String {
    let secrets = KNOWN_SECRETS.read().expect("secret registry lock poisoned");
    let mut redacted = text.to_string();
    for secret in secrets.iter() {
        if secret.len() >= 4 {
            redacted = redacted.replace(secret.as_str(), "***REDACTED***");
        }
    }
    redacted
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test registers a secret unique to itself so the shared global
    // registry (unavoidable for a process-wide redaction list) never
    // causes cross-test interference.

    #[test]
    fn masks_registered_secret() {
        register_secret("sk-live-test-masks-registered-secret");
        let message = "calling provider with key sk-live-test-masks-registered-secret for prompt X";
        assert_eq!(redact(message), "calling provider with key ***REDACTED*** for prompt X");
    }

    #[test]
    fn leaves_unregistered_text_untouched() {
        assert_eq!(redact("nothing-secret-in-this-sentence"), "nothing-secret-in-this-sentence");
    }

    #[test]
    fn ignores_blank_registration() {
        register_secret("   ");
        assert_eq!(redact("   "), "   ");
    }
}
