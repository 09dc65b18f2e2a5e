// ABOUTME: Verify-signature command implementation
// ABOUTME: Checks a detached signature over a dump using only a public key

use crate::crypto::{verify_detached, PublicKey, TrustLevel, VerificationResult};
use anyhow::{Context, Result};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct VerifySignatureOptions {
    pub dump: PathBuf,
    pub signature: PathBuf,
    pub public_key: PathBuf,
    pub trust: TrustLevel,
}

/// Verify `signature` over the exact bytes of `dump`.
///
/// Needs no secret key, so holders of an export can check it themselves.
pub fn verify_signature(options: &VerifySignatureOptions) -> Result<VerificationResult> {
    let dump = std::fs::read(&options.dump)
        .with_context(|| format!("Failed to read {}", options.dump.display()))?;
    let signature = std::fs::read(&options.signature)
        .with_context(|| format!("Failed to read {}", options.signature.display()))?;
    let armored = std::fs::read(&options.public_key)
        .with_context(|| format!("Failed to read {}", options.public_key.display()))?;
    let public = PublicKey::from_armored(&armored)
        .with_context(|| format!("{} is not a public key", options.public_key.display()))?;

    let outcome = verify_detached(&public, options.trust, &dump, &signature);
    match &outcome {
        VerificationResult::Valid(signer) => {
            tracing::info!("✓ Good signature from {}", signer);
        }
        VerificationResult::Untrusted(signer) => {
            tracing::warn!(
                "⚠ Good signature from {}, but the key is only {:?}-trusted",
                signer,
                options.trust
            );
        }
        VerificationResult::Invalid => {
            tracing::error!(
                "✗ BAD signature: {} was not signed by key {}",
                options.dump.display(),
                public.key_id()
            );
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keyring::tests::test_secret;
    use crate::crypto::sign;

    fn write_fixture(dir: &std::path::Path, dump: &[u8], trust: TrustLevel) -> VerifySignatureOptions {
        let secret = test_secret(40);
        std::fs::write(dir.join("export.sql"), dump).unwrap();
        std::fs::write(
            dir.join("export.sql.asc"),
            sign(&secret, b"INSERT INTO \"Users\" (\"Id\") VALUES (42);\n"),
        )
        .unwrap();
        std::fs::write(dir.join("key.asc"), secret.public().to_armored()).unwrap();
        VerifySignatureOptions {
            dump: dir.join("export.sql"),
            signature: dir.join("export.sql.asc"),
            public_key: dir.join("key.asc"),
            trust,
        }
    }

    #[test]
    fn test_good_signature_with_public_key_only() {
        let dir = tempfile::tempdir().unwrap();
        let options = write_fixture(
            dir.path(),
            b"INSERT INTO \"Users\" (\"Id\") VALUES (42);\n",
            TrustLevel::Full,
        );
        assert!(verify_signature(&options).unwrap().is_valid());
    }

    #[test]
    fn test_edited_dump_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let options = write_fixture(
            dir.path(),
            b"INSERT INTO \"Users\" (\"Id\") VALUES (43);\n",
            TrustLevel::Full,
        );
        assert_eq!(verify_signature(&options).unwrap(), VerificationResult::Invalid);
    }

    #[test]
    fn test_unknown_trust_is_untrusted() {
        let dir = tempfile::tempdir().unwrap();
        let options = write_fixture(
            dir.path(),
            b"INSERT INTO \"Users\" (\"Id\") VALUES (42);\n",
            TrustLevel::Unknown,
        );
        assert!(matches!(
            verify_signature(&options).unwrap(),
            VerificationResult::Untrusted(_)
        ));
    }
}
