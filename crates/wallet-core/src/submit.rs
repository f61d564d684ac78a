//! Transaction submission with bounded retries.

use std::sync::Arc;
use std::time::Duration;

use chain_ada::{SignedTransaction, TxId};
use tracing::{info, warn};

use crate::error::WalletError;
use crate::provider::{ChainProvider, ProviderError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least one.
    pub attempts: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Sends signed transactions to a provider.
///
/// Outages are retried with the identical bytes, so a transaction whose
/// acceptance response was lost is simply reported again by an idempotent
/// provider. Rejections are returned at once.
#[derive(Clone)]
pub struct Submitter {
    provider: Arc<dyn ChainProvider>,
    policy: RetryPolicy,
}

impl Submitter {
    pub fn new(provider: Arc<dyn ChainProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn submit(&self, tx: &SignedTransaction) -> Result<TxId, WalletError> {
        self.dispatch(&tx.to_cbor(), tx.id()).await
    }

    /// Submit externally produced transaction bytes. The bytes are decoded
    /// first so malformed payloads never reach the provider, then sent
    /// verbatim.
    pub async fn submit_raw(&self, tx_cbor: &[u8]) -> Result<TxId, WalletError> {
        let tx = SignedTransaction::from_cbor(tx_cbor)?;
        self.dispatch(tx_cbor, tx.id()).await
    }

    async fn dispatch(&self, bytes: &[u8], expected: TxId) -> Result<TxId, WalletError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.provider.submit_tx(bytes).await {
                Ok(tx_id) => {
                    if tx_id != expected {
                        warn!(%tx_id, %expected, "provider reported a different transaction id");
                    }
                    info!(%tx_id, attempt, size = bytes.len(), "transaction submitted");
                    return Ok(tx_id);
                }
                Err(ProviderError::Rejected(reason)) => {
                    warn!(tx_id = %expected, %reason, "transaction rejected");
                    return Err(WalletError::SubmissionRejected { reason });
                }
                Err(ProviderError::Unavailable(reason)) => {
                    if attempt >= self.policy.attempts {
                        return Err(WalletError::SubmissionUnavailable {
                            attempts: attempt,
                            reason,
                        });
                    }
                    warn!(
                        tx_id = %expected,
                        attempt,
                        max_attempts = self.policy.attempts,
                        %reason,
                        "submission unavailable, retrying"
                    );
                    tokio::time::sleep(self.policy.backoff).await;
                }
            }
        }
    }
}
