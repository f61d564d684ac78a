use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::address::Address;
use crate::error::AdaError;
use crate::hash::HASH32_LEN;
use crate::value::Value;

/// Transaction identifier: Blake2b-256 of the serialized body.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId([u8; HASH32_LEN]);

impl TxId {
    pub fn from_bytes(bytes: [u8; HASH32_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH32_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self.to_hex())
    }
}

impl FromStr for TxId {
    type Err = AdaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)
            .map_err(|e| AdaError::Serialization(format!("invalid transaction id {s}: {e}")))?;
        let arr: [u8; HASH32_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            AdaError::Serialization(format!(
                "transaction id must be {HASH32_LEN} bytes, got {}",
                b.len()
            ))
        })?;
        Ok(Self(arr))
    }
}

impl Serialize for TxId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TxId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Reference to an output of a previous transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionInput {
    pub tx_id: TxId,
    pub index: u32,
}

impl TransactionInput {
    pub fn new(tx_id: TxId, index: u32) -> Self {
        Self { tx_id, index }
    }
}

impl Ord for TransactionInput {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tx_id
            .cmp(&other.tx_id)
            .then_with(|| self.index.cmp(&other.index))
    }
}

impl PartialOrd for TransactionInput {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TransactionInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_id, self.index)
    }
}

/// A destination and the value it receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutput {
    pub address: Address,
    pub value: Value,
}

impl TransactionOutput {
    pub fn new(address: Address, value: Value) -> Self {
        Self { address, value }
    }
}

/// A single unspent transaction output (UTXO).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub input: TransactionInput,
    pub output: TransactionOutput,
}

impl Utxo {
    pub fn new(input: TransactionInput, output: TransactionOutput) -> Self {
        Self { input, output }
    }

    pub fn value(&self) -> &Value {
        &self.output.value
    }
}

/// Result of UTXO selection: the chosen UTXOs, in input order, and their
/// aggregate value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub selected: Vec<Utxo>,
    pub total: Value,
}

/// Candidates in canonical input order with duplicate references removed.
/// With `allow_assets == false` asset-bearing outputs are dropped.
pub(crate) fn spendable(candidates: &[Utxo], allow_assets: bool) -> Vec<&Utxo> {
    let mut seen = BTreeSet::new();
    let mut sorted: Vec<&Utxo> = candidates
        .iter()
        .filter(|u| allow_assets || !u.output.value.has_assets())
        .collect();
    sorted.sort_by(|a, b| a.input.cmp(&b.input));
    sorted.retain(|u| seen.insert(u.input));
    sorted
}

/// True if `utxo` adds to a component of `target` that `total` does not yet
/// cover.
fn contributes(utxo: &Utxo, total: &Value, target: &Value) -> bool {
    let value = utxo.value();
    (total.coin < target.coin && value.coin > 0)
        || target
            .assets
            .iter()
            .any(|(asset, qty)| total.assets.get(asset) < qty && value.assets.get(asset) > 0)
}

/// Select UTXOs covering every component of `target`.
///
/// Candidates are visited in ascending `(tx id, index)` order whatever order
/// the provider returned them in, so identical inputs always produce the same
/// selection. A candidate is taken only while it adds to a component that is
/// still short.
pub fn select_utxos(
    candidates: &[Utxo],
    target: &Value,
    allow_assets: bool,
) -> Result<Selection, AdaError> {
    let spendable = spendable(candidates, allow_assets);

    let mut selected = Vec::new();
    let mut total = Value::default();
    for utxo in &spendable {
        if total.covers(target) {
            break;
        }
        if !contributes(utxo, &total, target) {
            continue;
        }
        total = total
            .checked_add(utxo.value())
            .ok_or_else(|| AdaError::InvalidTransaction("selected value overflows".into()))?;
        selected.push((*utxo).clone());
    }

    if total.covers(target) {
        return Ok(Selection { selected, total });
    }

    let available = Value::sum(spendable.iter().map(|u| u.value()))
        .ok_or_else(|| AdaError::InvalidTransaction("available value overflows".into()))?;
    Err(AdaError::InsufficientFunds {
        shortfall: available.shortfall(target),
        available,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Credential;
    use crate::network::AdaNetwork;
    use crate::value::{AssetId, MultiAsset};

    fn addr() -> Address {
        Address::enterprise(Credential::Key([3u8; 28]), AdaNetwork::Testnet)
    }

    fn tx_id(b: u8) -> TxId {
        TxId::from_bytes([b; 32])
    }

    fn make_utxo(id: u8, index: u32, value: Value) -> Utxo {
        Utxo::new(
            TransactionInput::new(tx_id(id), index),
            TransactionOutput::new(addr(), value),
        )
    }

    fn token() -> AssetId {
        AssetId::new([7u8; 28], b"coin".to_vec()).unwrap()
    }

    fn with_token(coin: u64, qty: u64) -> Value {
        Value::new(coin, [(token(), qty)].into_iter().collect::<MultiAsset>())
    }

    #[test]
    fn tx_id_hex_roundtrip() {
        let id = tx_id(0xab);
        let parsed: TxId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("abcd".parse::<TxId>().is_err());
        assert!("zz".parse::<TxId>().is_err());
    }

    #[test]
    fn tx_id_serde_as_hex_string() {
        let id = tx_id(1);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(32)));
        let back: TxId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn inputs_order_by_tx_id_then_index() {
        let a = TransactionInput::new(tx_id(1), 5);
        let b = TransactionInput::new(tx_id(2), 0);
        let c = TransactionInput::new(tx_id(2), 1);
        let mut v = vec![c, a, b];
        v.sort();
        assert_eq!(v, vec![a, b, c]);
    }

    #[test]
    fn selects_in_canonical_order() {
        let utxos = vec![
            make_utxo(3, 0, Value::lovelace(5_000_000)),
            make_utxo(1, 0, Value::lovelace(2_000_000)),
            make_utxo(2, 0, Value::lovelace(2_000_000)),
        ];
        let selection = select_utxos(&utxos, &Value::lovelace(3_000_000), true).unwrap();
        let ids: Vec<_> = selection.selected.iter().map(|u| u.input.tx_id).collect();
        assert_eq!(ids, vec![tx_id(1), tx_id(2)]);
        assert_eq!(selection.total, Value::lovelace(4_000_000));
    }

    #[test]
    fn provider_order_is_irrelevant() {
        let mut utxos = vec![
            make_utxo(9, 1, Value::lovelace(1_500_000)),
            make_utxo(4, 0, Value::lovelace(700_000)),
            make_utxo(9, 0, Value::lovelace(3_000_000)),
        ];
        let target = Value::lovelace(2_000_000);
        let first = select_utxos(&utxos, &target, true).unwrap();
        utxos.reverse();
        let second = select_utxos(&utxos, &target, true).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn duplicates_collapse() {
        let utxo = make_utxo(1, 0, Value::lovelace(1_000_000));
        let utxos = vec![utxo.clone(), utxo];
        let err = select_utxos(&utxos, &Value::lovelace(1_500_000), true).unwrap_err();
        match err {
            AdaError::InsufficientFunds { available, .. } => {
                assert_eq!(available, Value::lovelace(1_000_000))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn insufficient_funds_reports_shortfall() {
        let utxos = vec![make_utxo(1, 0, Value::lovelace(900_000))];
        let err = select_utxos(&utxos, &Value::lovelace(1_000_000), true).unwrap_err();
        match err {
            AdaError::InsufficientFunds { shortfall, available } => {
                assert_eq!(shortfall, Value::lovelace(100_000));
                assert_eq!(available, Value::lovelace(900_000));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_candidates_are_insufficient() {
        let err = select_utxos(&[], &Value::lovelace(1), true).unwrap_err();
        assert!(err.to_string().contains("insufficient funds"));
    }

    #[test]
    fn asset_target_pulls_in_token_utxo() {
        let utxos = vec![
            make_utxo(1, 0, Value::lovelace(10_000_000)),
            make_utxo(2, 0, with_token(1_500_000, 50)),
        ];
        let target = with_token(2_000_000, 20);
        let selection = select_utxos(&utxos, &target, true).unwrap();
        assert_eq!(selection.selected.len(), 2);
        assert_eq!(selection.total.assets.get(&token()), 50);
    }

    #[test]
    fn token_utxo_counts_for_its_lovelace() {
        let utxos = vec![
            make_utxo(1, 0, with_token(1_500_000, 50)),
            make_utxo(2, 0, Value::lovelace(10_000_000)),
        ];
        let selection = select_utxos(&utxos, &Value::lovelace(1_000_000), true).unwrap();
        assert_eq!(selection.selected.len(), 1);
        assert_eq!(selection.selected[0].input.tx_id, tx_id(1));
    }

    #[test]
    fn pure_ada_utxo_skipped_once_coin_is_covered() {
        let utxos = vec![
            make_utxo(1, 0, Value::lovelace(10_000_000)),
            make_utxo(2, 0, Value::lovelace(1_000_000)),
            make_utxo(3, 0, with_token(1_200_000, 4)),
        ];
        let selection = select_utxos(&utxos, &with_token(2_000_000, 1), true).unwrap();
        let ids: Vec<_> = selection.selected.iter().map(|u| u.input.tx_id).collect();
        assert_eq!(ids, vec![tx_id(1), tx_id(3)]);
    }

    #[test]
    fn asset_shortfall_is_per_asset() {
        let utxos = vec![make_utxo(1, 0, with_token(5_000_000, 5))];
        let err = select_utxos(&utxos, &with_token(1_000_000, 8), true).unwrap_err();
        match err {
            AdaError::InsufficientFunds { shortfall, .. } => {
                assert_eq!(shortfall.coin, 0);
                assert_eq!(shortfall.assets.get(&token()), 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn asset_utxos_skipped_without_capability() {
        let utxos = vec![
            make_utxo(1, 0, with_token(9_000_000, 1)),
            make_utxo(2, 0, Value::lovelace(2_000_000)),
        ];
        let selection = select_utxos(&utxos, &Value::lovelace(1_000_000), false).unwrap();
        assert_eq!(selection.selected.len(), 1);
        assert_eq!(selection.selected[0].input.tx_id, tx_id(2));
        assert!(!selection.total.has_assets());
    }
}
