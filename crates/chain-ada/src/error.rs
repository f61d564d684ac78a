use thiserror::Error;

use crate::network::AdaNetwork;
use crate::value::Value;

/// Cardano engine errors.
///
/// Every variant carries enough detail for a caller to act on it without
/// re-deriving state: which network was expected, which asset was short,
/// which output fell under the ledger minimum.
#[derive(Debug, Error)]
pub enum AdaError {
    #[error("invalid address format: {0}")]
    InvalidAddressFormat(String),

    #[error("network mismatch: expected {expected}, found {found}")]
    NetworkMismatch {
        expected: AdaNetwork,
        found: AdaNetwork,
    },

    #[error("key load error: {0}")]
    KeyLoad(String),

    #[error("insufficient funds: short by {shortfall} (available {available})")]
    InsufficientFunds { shortfall: Value, available: Value },

    #[error("fee did not converge after {passes} passes (last fee {last_fee} lovelace)")]
    FeeConvergence { passes: usize, last_fee: u64 },

    #[error("output {index} carries {value} lovelace, below the minimum of {minimum}")]
    BelowMinimumUtxo { index: usize, value: u64, minimum: u64 },

    #[error("transaction size {size} bytes exceeds the maximum of {max}")]
    TransactionTooLarge { size: usize, max: usize },

    #[error("missing signing key for key hash {0}")]
    MissingSigningKey(String),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
