use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("key derivation failed: {0}")]
    KdfFailed(String),

    #[error("unsupported sealed box version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}
