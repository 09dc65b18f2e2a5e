// ABOUTME: Public-key command implementation
// ABOUTME: Prints the armored public half of the export key for self-verification

use crate::commands::{flag_or_env, KEY_ID_ENV};
use crate::crypto::KeyStore;
use anyhow::{Context, Result};
use std::path::Path;

/// Armored public key for the selected keyring entry.
pub fn public_key(keyring: &Path, key_id: Option<String>) -> Result<String> {
    let store = KeyStore::load(keyring)
        .with_context(|| format!("Failed to open keyring {}", keyring.display()))?;
    let key_id = flag_or_env(key_id, KEY_ID_ENV);
    let public = store.public_key(key_id.as_deref())?;
    tracing::info!(
        "Public key {} (fingerprint {})",
        public.key_id(),
        public.fingerprint()
    );
    Ok(public.to_armored())
}
