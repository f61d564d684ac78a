//! Chain data providers.
//!
//! The engine reads unspent outputs and protocol parameters from, and
//! submits transactions to, a [`ChainProvider`]. Two implementations ship
//! with the crate: [`BlockfrostProvider`] talks to the Blockfrost REST API,
//! [`MemoryProvider`] is an in-process ledger view for tests and dry runs.

mod blockfrost;
mod memory;

use async_trait::async_trait;
use chain_ada::{Address, ProtocolParameters, TxId, Utxo};
use thiserror::Error;

pub use blockfrost::BlockfrostProvider;
pub use memory::MemoryProvider;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The ledger or provider refused the request; retrying the same request
    /// cannot succeed.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Transport failure, throttling or provider outage; the request may be
    /// retried unchanged.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Current unspent outputs locked by `address`.
    async fn utxos(&self, address: &Address) -> Result<Vec<Utxo>, ProviderError>;

    async fn protocol_parameters(&self) -> Result<ProtocolParameters, ProviderError>;

    /// Submit serialized transaction bytes. Submitting bytes the ledger has
    /// already accepted returns the same id.
    async fn submit_tx(&self, tx_cbor: &[u8]) -> Result<TxId, ProviderError>;

    /// Slot of the most recent block.
    async fn latest_slot(&self) -> Result<u64, ProviderError>;
}
