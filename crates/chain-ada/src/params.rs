//! Ledger protocol parameters consumed by fee and minimum-UTXO rules.

use serde::{Deserialize, Serialize};

use crate::transaction::encoded_output_len;
use crate::utxo::TransactionOutput;

/// Fixed per-entry overhead the ledger adds to an output's serialized size
/// when computing its minimum lovelace.
pub const UTXO_ENTRY_OVERHEAD: u64 = 160;

/// Fee and size parameters from the current epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParameters {
    /// `b` in `fee = a * size + b` (lovelace).
    pub min_fee_constant: u64,
    /// `a` in `fee = a * size + b` (lovelace per byte).
    pub min_fee_coefficient: u64,
    /// Flat lower bound on every output.
    pub min_utxo_value: u64,
    /// Size-based lower bound; zero disables it.
    #[serde(default)]
    pub coins_per_utxo_byte: u64,
    pub max_tx_size: usize,
}

impl Default for ProtocolParameters {
    /// Mainnet values at the time of writing.
    fn default() -> Self {
        Self {
            min_fee_constant: 155_381,
            min_fee_coefficient: 44,
            min_utxo_value: 1_000_000,
            coins_per_utxo_byte: 4_310,
            max_tx_size: 16_384,
        }
    }
}

impl ProtocolParameters {
    /// Linear fee for a transaction of `size` bytes, saturating.
    pub fn min_fee_for_size(&self, size: usize) -> u64 {
        self.min_fee_coefficient
            .saturating_mul(size as u64)
            .saturating_add(self.min_fee_constant)
    }

    /// Minimum lovelace `output` must carry to be accepted by the ledger.
    pub fn min_utxo_for(&self, output: &TransactionOutput) -> u64 {
        if self.coins_per_utxo_byte == 0 {
            return self.min_utxo_value;
        }
        let size_based = (UTXO_ENTRY_OVERHEAD + encoded_output_len(output) as u64)
            .saturating_mul(self.coins_per_utxo_byte);
        self.min_utxo_value.max(size_based)
    }
}
