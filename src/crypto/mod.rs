// ABOUTME: Signing, encryption and key management for account exports
// ABOUTME: Re-exports the envelope operations and the KeyStore service

pub mod armor;
pub mod envelope;
pub mod keyring;
pub mod keystore;

pub use envelope::{
    decrypt, encrypt, open, seal, sign, verify_detached, OpenedExport, ReleasePolicy,
    SignedCiphertext, Signer, VerificationResult,
};
pub use keyring::{KdfParams, KeyEntry, KeyId, Keyring, PublicKey, SecretKey, TrustLevel};
pub use keystore::{Credentials, KeyStore, DEFAULT_CRYPTO_WORKERS};
