// ABOUTME: Command implementations for the export CLI
// ABOUTME: Exports export, decrypt, verify-signature, public-key and import-key plus shared helpers

pub mod decrypt;
pub mod export;
pub mod import_key;
pub mod public_key;
pub mod verify_signature;

pub use decrypt::{decrypt, DecryptOptions, DecryptReport};
pub use export::{export, export_account, ExportOptions};
pub use import_key::{import_key, ImportKeyOptions};
pub use public_key::public_key;
pub use verify_signature::{verify_signature, VerifySignatureOptions};

use crate::crypto::KeyEntry;
use anyhow::{Context, Result};
use std::io::IsTerminal;
use zeroize::Zeroizing;

pub const PASSPHRASE_ENV: &str = "ACCOUNT_EXPORT_PASSPHRASE";
pub const KEY_ID_ENV: &str = "ACCOUNT_EXPORT_KEY_ID";
pub const KEYRING_ENV: &str = "ACCOUNT_EXPORT_KEYRING";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Explicit value, else the named environment variable.
pub(crate) fn flag_or_env(value: Option<String>, var: &str) -> Option<String> {
    value.or_else(|| std::env::var(var).ok().filter(|v| !v.is_empty()))
}

/// Find the passphrase for `entry`: flag, environment, then an interactive
/// prompt when stdin is a terminal. `None` lets the unlock step report
/// `PassphraseRequired`.
pub(crate) fn resolve_passphrase(
    entry: Option<&KeyEntry>,
    supplied: Option<String>,
) -> Result<Option<String>> {
    if let Some(passphrase) = flag_or_env(supplied, PASSPHRASE_ENV) {
        return Ok(Some(passphrase));
    }
    let Some(entry) = entry.filter(|e| e.requires_passphrase()) else {
        return Ok(None);
    };
    if !std::io::stdin().is_terminal() {
        return Ok(None);
    }

    let passphrase = dialoguer::Password::new()
        .with_prompt(format!("Passphrase for key {}", entry.public().key_id()))
        .allow_empty_password(true)
        .interact()
        .context("Failed to read passphrase")?;
    Ok(Some(passphrase).filter(|p| !p.is_empty()))
}

/// Passphrase protecting a newly imported secret key: flag, environment,
/// then a confirmed prompt when stdin is a terminal. Empty means none.
pub(crate) fn new_passphrase(supplied: Option<String>) -> Result<Option<Zeroizing<String>>> {
    if let Some(passphrase) = flag_or_env(supplied, PASSPHRASE_ENV) {
        return Ok(Some(passphrase).filter(|p| !p.is_empty()).map(Zeroizing::new));
    }
    if !std::io::stdin().is_terminal() {
        return Ok(None);
    }

    let passphrase = dialoguer::Password::new()
        .with_prompt("Passphrase to protect the imported key")
        .with_confirmation("Repeat passphrase", "Passphrases do not match")
        .interact()
        .context("Failed to read passphrase")?;
    Ok(Some(passphrase).filter(|p| !p.is_empty()).map(Zeroizing::new))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_wins_over_environment() {
        assert_eq!(
            flag_or_env(Some("flag".into()), "ACCOUNT_EXPORT_TEST_UNSET_VAR"),
            Some("flag".to_string())
        );
        assert_eq!(flag_or_env(None, "ACCOUNT_EXPORT_TEST_UNSET_VAR"), None);
    }

    #[test]
    fn test_empty_new_passphrase_is_none() {
        assert!(new_passphrase(Some(String::new())).unwrap().is_none());
        assert_eq!(
            new_passphrase(Some("pw".into())).unwrap().as_deref().map(String::as_str),
            Some("pw")
        );
    }

    #[test]
    fn test_supplied_passphrase_is_used() {
        assert_eq!(resolve_passphrase(None, Some("pw".into())).unwrap(), Some("pw".into()));
    }
}
