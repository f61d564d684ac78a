//! Address balance queries.

use chain_ada::value::format_ada;
use chain_ada::{Address, Value};
use serde::Serialize;

use crate::error::WalletError;
use crate::provider::ChainProvider;

/// Sum of every unspent output currently locked by `address`. Always asks
/// the provider; nothing is cached.
pub async fn total(provider: &dyn ChainProvider, address: &Address) -> Result<Value, WalletError> {
    let utxos = provider.utxos(address).await?;
    Value::sum(utxos.iter().map(|u| u.value()))
        .ok_or_else(|| WalletError::ProviderUnavailable(format!("balance of {address} overflows")))
}

/// Display view of an address balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub address: String,
    pub lovelace: u64,
    /// Lovelace rendered as ADA with six decimals.
    pub ada: String,
    pub assets: Vec<AssetBalance>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetBalance {
    pub unit: String,
    pub quantity: u64,
}

impl Balance {
    pub fn new(address: &Address, value: &Value) -> Self {
        Self {
            address: address.to_bech32(),
            lovelace: value.coin,
            ada: format_ada(value.coin),
            assets: value
                .assets
                .iter()
                .map(|(asset, quantity)| AssetBalance {
                    unit: asset.unit(),
                    quantity,
                })
                .collect(),
        }
    }
}
