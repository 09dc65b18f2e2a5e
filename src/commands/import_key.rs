// ABOUTME: Import-key command implementation - provision the keyring from key files
// ABOUTME: Accepts PKCS#8 PEM private keys or armored public keys and writes the keyring atomically

use crate::commands::new_passphrase;
use crate::crypto::{KdfParams, KeyEntry, KeyId, Keyring, PublicKey, SecretKey, TrustLevel};
use crate::utils::write_atomically;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

const PUBLIC_KEY_MARKER: &str = "-----BEGIN ACCOUNT EXPORT PUBLIC KEY-----";

#[derive(Debug, Clone)]
pub struct ImportKeyOptions {
    /// Ed25519 PKCS#8 PEM private key, or an armored public key.
    pub key_file: PathBuf,
    /// Optional X25519 PKCS#8 PEM private key used for encryption.
    pub encryption_key: Option<PathBuf>,
    pub keyring: PathBuf,
    pub uid: Option<String>,
    pub trust: TrustLevel,
    pub passphrase: Option<String>,
    pub no_passphrase: bool,
    pub kdf: KdfParams,
}

fn read_key_file(path: &Path) -> Result<Zeroizing<String>> {
    std::fs::read_to_string(path)
        .map(Zeroizing::new)
        .with_context(|| format!("Failed to read key file {}", path.display()))
}

/// Add one key to the keyring, creating the keyring file when absent.
///
/// A key already present under the same key id is replaced. Secret keys are
/// sealed under a passphrase unless `no_passphrase` is set.
pub fn import_key(options: ImportKeyOptions) -> Result<KeyId> {
    let raw = read_key_file(&options.key_file)?;
    let mut keyring = if options.keyring.exists() {
        Keyring::load(&options.keyring)
            .with_context(|| format!("Failed to open keyring {}", options.keyring.display()))?
    } else {
        Keyring::default()
    };

    let entry = if raw.contains(PUBLIC_KEY_MARKER) {
        let mut public = PublicKey::from_armored(raw.as_bytes())?;
        if let Some(uid) = options.uid {
            public.uid = uid;
        }
        KeyEntry::public_only(public, options.trust)
    } else {
        let uid = options
            .uid
            .context("--uid is required when importing a private key")?;
        let encryption = match &options.encryption_key {
            Some(path) => Some(read_key_file(path)?),
            None => None,
        };
        let secret = SecretKey::from_pkcs8_pem(&uid, &raw, encryption.as_deref().map(String::as_str))
            .with_context(|| format!("Failed to import {}", options.key_file.display()))?;

        let passphrase = if options.no_passphrase {
            tracing::warn!(
                "⚠ Storing secret key {} without a passphrase",
                secret.public().key_id()
            );
            None
        } else {
            Some(new_passphrase(options.passphrase)?.context(
                "A passphrase is required to protect the key (use --passphrase, \
                 ACCOUNT_EXPORT_PASSPHRASE or --no-passphrase)",
            )?)
        };
        KeyEntry::with_secret(
            &secret,
            options.trust,
            passphrase.as_ref().map(|p| (p.as_str(), options.kdf)),
        )?
    };

    let key_id = entry.public().key_id();
    let fingerprint = entry.public().fingerprint();
    let kind = if entry.has_secret() { "secret" } else { "public" };
    if keyring.find(&key_id).is_some() {
        tracing::info!("Replacing existing key {}", key_id);
    }
    keyring.insert(entry);

    let dir = options
        .keyring
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = options
        .keyring
        .file_name()
        .context("Keyring path has no file name")?
        .to_string_lossy()
        .into_owned();
    let json = Zeroizing::new(keyring.to_json()?);
    write_atomically(dir, &name, json.as_bytes())?;

    tracing::info!(
        "✓ Imported {} key {} (fingerprint {}) into {}",
        kind,
        key_id,
        fingerprint,
        options.keyring.display()
    );
    Ok(key_id)
}
