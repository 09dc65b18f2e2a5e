// ABOUTME: KeyStore service wrapping the process-wide keyring
// ABOUTME: Runs crypto on the blocking pool behind a bounded semaphore

use crate::crypto::envelope::{
    self, OpenedExport, ReleasePolicy, SignedCiphertext, VerificationResult,
};
use crate::crypto::keyring::{KeyEntry, Keyring, PublicKey, SecretKey};
use crate::error::{ExportError, Result};
use crate::export::DumpDocument;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use zeroize::Zeroizing;

/// Concurrent crypto operations allowed by default.
pub const DEFAULT_CRYPTO_WORKERS: usize = 2;

/// Which key to use and how to unlock it.
#[derive(Clone, Default)]
pub struct Credentials {
    pub key_id: Option<String>,
    pub passphrase: Option<Zeroizing<String>>,
}

impl Credentials {
    pub fn new(key_id: Option<String>, passphrase: Option<String>) -> Self {
        Self {
            key_id,
            passphrase: passphrase.map(Zeroizing::new),
        }
    }

    fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref().map(String::as_str)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Shared, read-only key material with a bounded crypto worker pool.
///
/// Cloning is cheap; clones share the keyring and the permit pool.
#[derive(Clone)]
pub struct KeyStore {
    keyring: Arc<Keyring>,
    permits: Arc<Semaphore>,
}

impl KeyStore {
    pub fn new(keyring: Keyring, workers: usize) -> Self {
        Self {
            keyring: Arc::new(keyring),
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Load and permission-check a keyring file.
    pub fn load(path: &Path) -> Result<Self> {
        let keyring = Keyring::load(path)?;
        tracing::info!(
            keys = keyring.entries().len(),
            "Loaded keyring from {}",
            path.display()
        );
        Ok(Self::new(keyring, DEFAULT_CRYPTO_WORKERS))
    }

    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }

    /// Read-only public half for self-service verification.
    pub fn public_key(&self, key_id: Option<&str>) -> Result<PublicKey> {
        Ok(self.keyring.select(key_id)?.public().clone())
    }

    /// Whether unlocking the selected key needs a passphrase.
    pub fn requires_passphrase(&self, key_id: Option<&str>) -> Result<bool> {
        Ok(self.keyring.select(key_id)?.requires_passphrase())
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Keyring) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| ExportError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        let keyring = Arc::clone(&self.keyring);
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            op(&keyring)
        })
        .await
        .map_err(|e| ExportError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }

    pub async fn sign(
        &self,
        credentials: Credentials,
        plaintext: Zeroizing<Vec<u8>>,
    ) -> Result<Vec<u8>> {
        self.run_blocking(move |keyring| {
            let secret = keyring
                .select(credentials.key_id.as_deref())?
                .unlock(credentials.passphrase())?;
            Ok(envelope::sign(&secret, &plaintext))
        })
        .await
    }

    pub async fn encrypt(
        &self,
        key_id: Option<String>,
        plaintext: Zeroizing<Vec<u8>>,
    ) -> Result<Vec<u8>> {
        self.run_blocking(move |keyring| {
            let recipient = keyring.select(key_id.as_deref())?.public();
            envelope::encrypt(recipient, &plaintext)
        })
        .await
    }

    pub async fn decrypt(
        &self,
        credentials: Credentials,
        ciphertext: Vec<u8>,
    ) -> Result<Zeroizing<Vec<u8>>> {
        self.run_blocking(move |keyring| {
            let entry = recipient_entry(keyring, credentials.key_id.as_deref(), &ciphertext)?;
            let secret = unlock_for_decryption(entry, &credentials)?;
            envelope::decrypt(&secret, &ciphertext)
        })
        .await
    }

    /// Verify with whichever keyring entry the signature names.
    ///
    /// A signature from a key we do not hold is `Invalid`.
    pub async fn verify(
        &self,
        plaintext: Zeroizing<Vec<u8>>,
        signature: Vec<u8>,
    ) -> Result<VerificationResult> {
        self.run_blocking(move |keyring| {
            let outcome = match envelope::signer_of(&signature).and_then(|id| keyring.find(&id)) {
                Some(entry) => {
                    envelope::verify_detached(entry.public(), entry.trust(), &plaintext, &signature)
                }
                None => VerificationResult::Invalid,
            };
            Ok(outcome)
        })
        .await
    }

    /// Sign then encrypt a dump. Nothing is returned unless both succeed.
    pub async fn seal(
        &self,
        credentials: Credentials,
        dump: DumpDocument,
    ) -> Result<SignedCiphertext> {
        self.run_blocking(move |keyring| {
            let secret = keyring
                .select(credentials.key_id.as_deref())?
                .unlock(credentials.passphrase())?;
            envelope::seal(&secret, &dump)
        })
        .await
    }

    /// Decrypt then verify. Without an explicit key id the key is chosen by
    /// the recipient id in the ciphertext.
    pub async fn open(
        &self,
        credentials: Credentials,
        sealed: SignedCiphertext,
        policy: ReleasePolicy,
    ) -> Result<OpenedExport> {
        self.run_blocking(move |keyring| {
            let entry = recipient_entry(keyring, credentials.key_id.as_deref(), &sealed.ciphertext)?;
            let secret = unlock_for_decryption(entry, &credentials)?;
            envelope::open(&secret, entry.trust(), &sealed, policy)
        })
        .await
    }
}

/// Key that should open `ciphertext`. A missing key is a decryption failure.
fn recipient_entry<'k>(
    keyring: &'k Keyring,
    key_id: Option<&str>,
    ciphertext: &[u8],
) -> Result<&'k KeyEntry> {
    match key_id {
        Some(selector) => keyring.select(Some(selector)).map_err(|e| {
            tracing::debug!("No decryption key: {}", e);
            ExportError::DecryptionFailed
        }),
        None => envelope::recipient_of(ciphertext)
            .and_then(|id| keyring.find(&id))
            .ok_or(ExportError::DecryptionFailed),
    }
}

/// On the decrypt side a missing or wrong passphrase is reported as
/// `DecryptionFailed`, like any other reason the message cannot be opened.
fn unlock_for_decryption(entry: &KeyEntry, credentials: &Credentials) -> Result<SecretKey> {
    entry.unlock(credentials.passphrase()).map_err(|e| {
        tracing::debug!("Secret key {} not unlocked: {}", entry.public().key_id(), e);
        ExportError::DecryptionFailed
    })
}
