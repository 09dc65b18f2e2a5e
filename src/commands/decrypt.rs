// ABOUTME: Decrypt command implementation - open an export archive
// ABOUTME: Writes the recovered dump and signature copy, then reports verification

use crate::archive::ExportArchive;
use crate::commands::{flag_or_env, resolve_passphrase, KEY_ID_ENV};
use crate::crypto::envelope::recipient_of;
use crate::crypto::{Credentials, KeyStore, ReleasePolicy, VerificationResult};
use crate::utils::write_atomically;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Statements shown in the log after a successful decrypt.
pub const PREVIEW_STATEMENTS: usize = 5;

#[derive(Debug, Clone)]
pub struct DecryptOptions {
    pub archive: PathBuf,
    pub keyring: PathBuf,
    pub key_id: Option<String>,
    pub passphrase: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub require_valid: bool,
}

/// Files written by a decrypt run and the signature outcome.
#[derive(Debug)]
pub struct DecryptReport {
    pub dump_path: PathBuf,
    pub signature_path: PathBuf,
    pub statements: usize,
    pub verification: VerificationResult,
}

/// Decrypt an archive with the keyring's secret key.
///
/// Outputs land next to the archive unless `output_dir` is given. With
/// `require_valid`, nothing is written unless the signature is `Valid`.
pub async fn decrypt(options: DecryptOptions) -> Result<DecryptReport> {
    tracing::info!("Reading archive {}", options.archive.display());
    let bytes = std::fs::read(&options.archive)
        .with_context(|| format!("Failed to read {}", options.archive.display()))?;
    let archive = ExportArchive::from_bytes(&bytes)?;

    let store = KeyStore::load(&options.keyring)
        .with_context(|| format!("Failed to open keyring {}", options.keyring.display()))?;
    decrypt_archive(&store, archive, options).await
}

async fn decrypt_archive(
    store: &KeyStore,
    archive: ExportArchive,
    options: DecryptOptions,
) -> Result<DecryptReport> {
    let key_id = flag_or_env(options.key_id, KEY_ID_ENV);
    let entry = match key_id.as_deref() {
        Some(selector) => Some(store.keyring().select(Some(selector))?),
        None => recipient_of(&archive.sealed.ciphertext).and_then(|id| store.keyring().find(&id)),
    };
    let passphrase = resolve_passphrase(entry, options.passphrase)?;

    let policy = if options.require_valid {
        ReleasePolicy::RequireValid
    } else {
        ReleasePolicy::Permissive
    };
    let opened = store
        .open(
            Credentials::new(key_id, passphrase),
            archive.sealed.clone(),
            policy,
        )
        .await?;

    let output_dir = match options.output_dir {
        Some(dir) => dir,
        None => options
            .archive
            .parent()
            .map(PathBuf::from)
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    let dump_path = write_atomically(&output_dir, &archive.dump_name(), &opened.plaintext)?;
    let signature_path = match write_atomically(
        &output_dir,
        &archive.signature_name(),
        &archive.sealed.signature,
    ) {
        Ok(path) => path,
        Err(e) => {
            // Outputs are paired; never leave the dump behind alone
            let _ = std::fs::remove_file(&dump_path);
            return Err(e);
        }
    };

    tracing::info!("✓ Decrypted dump written to {}", dump_path.display());
    tracing::info!("✓ Signature saved to {}", signature_path.display());
    match &opened.verification {
        VerificationResult::Valid(signer) => {
            tracing::info!("✓ Signature is valid (signed by {})", signer);
        }
        VerificationResult::Untrusted(signer) => {
            tracing::warn!(
                "⚠ Signature is good but key {} is not fully trusted",
                signer
            );
        }
        VerificationResult::Invalid => {
            tracing::error!("✗ Signature is INVALID - treat this data as untrusted");
        }
    }

    tracing::info!("");
    tracing::info!(
        "First {} statements:",
        PREVIEW_STATEMENTS.min(opened.dump.len())
    );
    for statement in opened.dump.preview(PREVIEW_STATEMENTS) {
        tracing::info!("  {}", statement);
    }

    Ok(DecryptReport {
        dump_path,
        signature_path,
        statements: opened.dump.len(),
        verification: opened.verification.clone(),
    })
}
