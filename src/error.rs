// ABOUTME: Typed error taxonomy for the export and verification pipeline
// ABOUTME: Maps every failure to a distinct, non-leaking user-facing message

use crate::crypto::VerificationResult;
use thiserror::Error;

/// Errors raised by the export/verify pipeline.
///
/// Every variant aborts only the current request. Skipped tables are not
/// errors and never appear here.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no account matches the supplied identity")]
    IdentityNotFound,

    #[error("unsupported value type '{type_name}' in {table}.{column}")]
    UnsupportedValueType {
        table: String,
        column: String,
        type_name: String,
    },

    #[error("row in {table} has no value for declared column {column}")]
    MissingColumn { table: String, column: String },

    #[error("secret key is protected and no passphrase was supplied")]
    PassphraseRequired,

    #[error("passphrase does not unlock the secret key")]
    PassphraseIncorrect,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("malformed export archive: {0}")]
    MalformedArchive(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("signature outcome {0} is not accepted by the release policy")]
    VerificationRefused(VerificationResult),

    #[error("invalid export policy: {0}")]
    Policy(String),

    #[error("invalid keyring: {0}")]
    Keyring(String),

    #[error("database query failed: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExportError {
    /// Message safe to show an end user.
    ///
    /// Cryptographic failures collapse into one generic message so callers
    /// cannot learn which step rejected their input.
    pub fn user_message(&self) -> &'static str {
        match self {
            ExportError::IdentityNotFound => "Invalid username or email",
            ExportError::UnsupportedValueType { .. } | ExportError::MissingColumn { .. } => {
                "The account data could not be serialized"
            }
            ExportError::PassphraseRequired => "A passphrase is required to unlock the key",
            ExportError::PassphraseIncorrect
            | ExportError::DecryptionFailed
            | ExportError::VerificationRefused(_) => "Decryption or verification failed",
            ExportError::MalformedArchive(_) => "The export archive is malformed",
            ExportError::KeyNotFound(_) | ExportError::Keyring(_) => {
                "The key material is not available"
            }
            ExportError::Policy(_) => "The export policy is invalid",
            ExportError::Database(_) => "The account database is unavailable",
            ExportError::Io(_) => "The export could not be written",
        }
    }
}

pub type Result<T, E = ExportError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_failures_share_one_message() {
        let generic = ExportError::DecryptionFailed.user_message();
        assert_eq!(ExportError::PassphraseIncorrect.user_message(), generic);
        assert_eq!(
            ExportError::VerificationRefused(VerificationResult::Invalid).user_message(),
            generic
        );
    }

    #[test]
    fn test_user_message_does_not_echo_details() {
        let err = ExportError::KeyNotFound("DEADBEEFCAFEF00D".to_string());
        assert!(!err.user_message().contains("DEADBEEF"));
        let err = ExportError::Keyring("secret material at /etc/keys".to_string());
        assert!(!err.user_message().contains("/etc/keys"));
    }

    #[test]
    fn test_each_kind_has_distinct_display() {
        let shown = [
            ExportError::IdentityNotFound.to_string(),
            ExportError::PassphraseRequired.to_string(),
            ExportError::PassphraseIncorrect.to_string(),
            ExportError::DecryptionFailed.to_string(),
            ExportError::MalformedArchive("x".into()).to_string(),
            ExportError::KeyNotFound("x".into()).to_string(),
        ];
        for (i, a) in shown.iter().enumerate() {
            for b in &shown[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
