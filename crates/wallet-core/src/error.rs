use chain_ada::AdaError;
use crypto_utils::CryptoError;
use thiserror::Error;

use crate::provider::ProviderError;

#[derive(Debug, Error)]
pub enum WalletError {
    /// Engine failure; callers branch on the inner kind.
    #[error(transparent)]
    Chain(#[from] AdaError),

    #[error("submission rejected: {reason}")]
    SubmissionRejected { reason: String },

    #[error("submission unavailable after {attempts} attempts: {reason}")]
    SubmissionUnavailable { attempts: u32, reason: String },

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("key store error: {0}")]
    KeyStore(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("vault error: {0}")]
    Vault(#[from] CryptoError),
}

/// Query failures. Submission maps provider errors itself, since there a
/// rejection is terminal and an outage is retried.
impl From<ProviderError> for WalletError {
    fn from(e: ProviderError) -> Self {
        WalletError::ProviderUnavailable(e.to_string())
    }
}
