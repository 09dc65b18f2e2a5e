// ABOUTME: Sign-then-encrypt sealing and decrypt-then-verify opening of dumps
// ABOUTME: Detached Ed25519 signatures plus X25519/HKDF/XChaCha20-Poly1305 messages

use crate::crypto::armor::{self, ArmorKind};
use crate::crypto::keyring::{KeyId, PublicKey, SecretKey, TrustLevel};
use crate::error::{ExportError, Result};
use crate::export::DumpDocument;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use ed25519_dalek::{Signature, Signer as _};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use std::fmt;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroizing;

const FORMAT_VERSION: u8 = 1;
const MESSAGE_KEY_INFO: &[u8] = b"account-export v1 message key";

const KEY_ID_LEN: usize = 8;
const SIGNATURE_BODY_LEN: usize = 1 + KEY_ID_LEN + 64;
// version || recipient key id || ephemeral public key || nonce
const MESSAGE_HEADER_LEN: usize = 1 + KEY_ID_LEN + 32 + 24;

/// Who produced a verified signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signer {
    pub uid: String,
    pub key_id: KeyId,
}

impl fmt::Display for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.uid, self.key_id)
    }
}

/// Outcome of checking a detached signature against recovered plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    Valid(Signer),
    Invalid,
    Untrusted(Signer),
}

impl VerificationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationResult::Valid(_))
    }

    pub fn signer(&self) -> Option<&Signer> {
        match self {
            VerificationResult::Valid(s) | VerificationResult::Untrusted(s) => Some(s),
            VerificationResult::Invalid => None,
        }
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationResult::Valid(signer) => write!(f, "valid, signed by {}", signer),
            VerificationResult::Invalid => f.write_str("invalid"),
            VerificationResult::Untrusted(signer) => {
                write!(f, "untrusted, signed by {}", signer)
            }
        }
    }
}

/// Whether plaintext is released for a given verification outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReleasePolicy {
    /// Release for every outcome; the caller inspects the result.
    #[default]
    Permissive,
    AllowUntrusted,
    RequireValid,
}

impl ReleasePolicy {
    pub fn permits(self, outcome: &VerificationResult) -> bool {
        match self {
            ReleasePolicy::Permissive => true,
            ReleasePolicy::AllowUntrusted => !matches!(outcome, VerificationResult::Invalid),
            ReleasePolicy::RequireValid => outcome.is_valid(),
        }
    }
}

/// Armored ciphertext and detached signature over the same plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCiphertext {
    pub ciphertext: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Result of a successful `open`. The dump is untrusted unless
/// `verification` is `Valid`.
pub struct OpenedExport {
    pub dump: DumpDocument,
    /// Decrypted bytes exactly as signed.
    pub plaintext: Zeroizing<Vec<u8>>,
    pub verification: VerificationResult,
}

impl fmt::Debug for OpenedExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedExport")
            .field("dump", &self.dump)
            .field("plaintext_len", &self.plaintext.len())
            .field("verification", &self.verification)
            .finish()
    }
}

/// Detached, armored signature over `plaintext`.
pub fn sign(secret: &SecretKey, plaintext: &[u8]) -> Vec<u8> {
    let signature = secret.signing().sign(plaintext);
    let mut body = Vec::with_capacity(SIGNATURE_BODY_LEN);
    body.push(FORMAT_VERSION);
    body.extend_from_slice(&secret.public().key_id().0);
    body.extend_from_slice(&signature.to_bytes());
    armor::encode(ArmorKind::Signature, &body).into_bytes()
}

/// Key id named in an armored signature, if it parses.
pub fn signer_of(signature: &[u8]) -> Option<KeyId> {
    let body = armor::decode(ArmorKind::Signature, signature)?;
    if body.len() != SIGNATURE_BODY_LEN || body[0] != FORMAT_VERSION {
        return None;
    }
    let mut id = [0u8; KEY_ID_LEN];
    id.copy_from_slice(&body[1..1 + KEY_ID_LEN]);
    Some(KeyId(id))
}

/// Check a detached signature made by `public`, graded by `trust`.
///
/// Anything short of a strictly valid signature from exactly this key is
/// `Invalid`.
pub fn verify_detached(
    public: &PublicKey,
    trust: TrustLevel,
    plaintext: &[u8],
    signature: &[u8],
) -> VerificationResult {
    let Some(body) = armor::decode(ArmorKind::Signature, signature) else {
        return VerificationResult::Invalid;
    };
    if body.len() != SIGNATURE_BODY_LEN || body[0] != FORMAT_VERSION {
        return VerificationResult::Invalid;
    }
    let key_id = public.key_id();
    if body[1..1 + KEY_ID_LEN] != key_id.0 {
        return VerificationResult::Invalid;
    }
    let Ok(signature) = Signature::from_slice(&body[1 + KEY_ID_LEN..]) else {
        return VerificationResult::Invalid;
    };
    if public.signing.verify_strict(plaintext, &signature).is_err() {
        return VerificationResult::Invalid;
    }

    let signer = Signer {
        uid: public.uid.clone(),
        key_id,
    };
    if trust.is_sufficient() {
        VerificationResult::Valid(signer)
    } else {
        VerificationResult::Untrusted(signer)
    }
}

fn message_key(
    shared: &[u8; 32],
    ephemeral: &X25519Public,
    recipient: &X25519Public,
) -> Result<Zeroizing<[u8; 32]>> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral.as_bytes());
    salt[32..].copy_from_slice(recipient.as_bytes());
    let hk = Hkdf::<Sha256>::new(Some(&salt[..]), shared);
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(MESSAGE_KEY_INFO, okm.as_mut_slice())
        .map_err(|_| ExportError::DecryptionFailed)?;
    Ok(okm)
}

/// Encrypt `plaintext` to `recipient` under a fresh ephemeral key.
pub fn encrypt(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let ephemeral = StaticSecret::random_from_rng(OsRng);
    let ephemeral_public = X25519Public::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&recipient.encryption);
    if !shared.was_contributory() {
        return Err(ExportError::Keyring(
            "recipient encryption key is a low-order point".into(),
        ));
    }
    let key = message_key(shared.as_bytes(), &ephemeral_public, &recipient.encryption)?;
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let mut body = Vec::with_capacity(MESSAGE_HEADER_LEN + plaintext.len() + 16);
    body.push(FORMAT_VERSION);
    body.extend_from_slice(&recipient.key_id().0);
    body.extend_from_slice(ephemeral_public.as_bytes());
    body.extend_from_slice(&nonce);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_slice()));
    let ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad: &body,
            },
        )
        .map_err(|_| ExportError::Keyring("encryption failed".into()))?;
    body.extend_from_slice(&ciphertext);
    Ok(armor::encode(ArmorKind::Message, &body).into_bytes())
}

/// Recipient key id named in an armored message, if it parses.
pub fn recipient_of(ciphertext: &[u8]) -> Option<KeyId> {
    let body = armor::decode(ArmorKind::Message, ciphertext)?;
    if body.len() <= MESSAGE_HEADER_LEN || body[0] != FORMAT_VERSION {
        return None;
    }
    let mut id = [0u8; KEY_ID_LEN];
    id.copy_from_slice(&body[1..1 + KEY_ID_LEN]);
    Some(KeyId(id))
}

/// Decrypt an armored message. Every failure is `DecryptionFailed`.
pub fn decrypt(secret: &SecretKey, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let body = armor::decode(ArmorKind::Message, ciphertext).ok_or(ExportError::DecryptionFailed)?;
    if body.len() <= MESSAGE_HEADER_LEN || body[0] != FORMAT_VERSION {
        return Err(ExportError::DecryptionFailed);
    }
    let recipient = secret.public();
    if body[1..1 + KEY_ID_LEN] != recipient.key_id().0 {
        return Err(ExportError::DecryptionFailed);
    }

    let (header, sealed) = body.split_at(MESSAGE_HEADER_LEN);
    let mut ephemeral = [0u8; 32];
    ephemeral.copy_from_slice(&header[1 + KEY_ID_LEN..1 + KEY_ID_LEN + 32]);
    let ephemeral = X25519Public::from(ephemeral);
    let nonce = XNonce::from_slice(&header[1 + KEY_ID_LEN + 32..]);

    let shared = secret.encryption().diffie_hellman(&ephemeral);
    if !shared.was_contributory() {
        return Err(ExportError::DecryptionFailed);
    }
    let key = message_key(shared.as_bytes(), &ephemeral, &recipient.encryption)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_slice()));
    let plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: sealed,
                aad: header,
            },
        )
        .map_err(|_| ExportError::DecryptionFailed)?;
    Ok(Zeroizing::new(plaintext))
}

/// Sign the dump bytes, then encrypt the same bytes to the key's own public half.
pub fn seal(secret: &SecretKey, dump: &DumpDocument) -> Result<SignedCiphertext> {
    let plaintext = dump.to_bytes();
    let signature = sign(secret, &plaintext);
    let ciphertext = encrypt(secret.public(), &plaintext)?;
    Ok(SignedCiphertext {
        ciphertext,
        signature,
    })
}

/// Decrypt, then verify against the recovered plaintext, then apply `policy`.
///
/// Verification never runs on data that failed to decrypt.
pub fn open(
    secret: &SecretKey,
    trust: TrustLevel,
    sealed: &SignedCiphertext,
    policy: ReleasePolicy,
) -> Result<OpenedExport> {
    let plaintext = decrypt(secret, &sealed.ciphertext)?;
    let verification = verify_detached(secret.public(), trust, &plaintext, &sealed.signature);
    if !policy.permits(&verification) {
        return Err(ExportError::VerificationRefused(verification));
    }
    // Authenticated ciphertext that is not a line-oriented dump
    let dump = DumpDocument::from_bytes(&plaintext).map_err(|_| ExportError::DecryptionFailed)?;
    Ok(OpenedExport {
        dump,
        plaintext,
        verification,
    })
}
