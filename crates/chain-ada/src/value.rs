//! Lovelace and native-asset bundles.
//!
//! All arithmetic is integer and checked. A [`MultiAsset`] never stores a
//! zero quantity, so two bundles holding the same assets compare equal no
//! matter how they were assembled.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::AdaError;
use crate::hash::HASH28_LEN;

/// Lovelace per ADA.
pub const LOVELACE_PER_ADA: u64 = 1_000_000;

/// Maximum asset-name length accepted by the ledger.
pub const MAX_ASSET_NAME_LEN: usize = 32;

/// Minting policy hash.
pub type PolicyId = [u8; HASH28_LEN];

/// A native asset: minting policy plus asset name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetId {
    pub policy: PolicyId,
    pub name: Vec<u8>,
}

impl AssetId {
    pub fn new(policy: PolicyId, name: Vec<u8>) -> Result<Self, AdaError> {
        if name.len() > MAX_ASSET_NAME_LEN {
            return Err(AdaError::InvalidTransaction(format!(
                "asset name is {} bytes, maximum is {MAX_ASSET_NAME_LEN}",
                name.len()
            )));
        }
        Ok(Self { policy, name })
    }

    /// Parse the concatenated `policy_hex || name_hex` unit string used by
    /// chain indexers.
    pub fn from_unit(unit: &str) -> Result<Self, AdaError> {
        let bytes = hex::decode(unit)
            .map_err(|e| AdaError::Serialization(format!("invalid asset unit {unit}: {e}")))?;
        if bytes.len() < HASH28_LEN {
            return Err(AdaError::Serialization(format!(
                "asset unit {unit} is shorter than a policy id"
            )));
        }
        let mut policy = [0u8; HASH28_LEN];
        policy.copy_from_slice(&bytes[..HASH28_LEN]);
        Self::new(policy, bytes[HASH28_LEN..].to_vec())
    }

    /// Inverse of [`from_unit`](Self::from_unit).
    pub fn unit(&self) -> String {
        format!("{}{}", hex::encode(self.policy), hex::encode(&self.name))
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", hex::encode(self.policy), hex::encode(&self.name))
    }
}

/// A bundle of native assets with strictly positive quantities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiAsset(BTreeMap<AssetId, u64>);

impl MultiAsset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the quantity of `asset`; a zero quantity removes it.
    pub fn insert(&mut self, asset: AssetId, quantity: u64) {
        if quantity == 0 {
            self.0.remove(&asset);
        } else {
            self.0.insert(asset, quantity);
        }
    }

    /// Add `quantity` of `asset`, failing on overflow.
    pub fn add(&mut self, asset: AssetId, quantity: u64) -> Option<()> {
        if quantity == 0 {
            return Some(());
        }
        let entry = self.0.entry(asset).or_insert(0);
        *entry = entry.checked_add(quantity)?;
        Some(())
    }

    pub fn get(&self, asset: &AssetId) -> u64 {
        self.0.get(asset).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AssetId, u64)> {
        self.0.iter().map(|(k, v)| (k, *v))
    }

    /// Group assets by policy, names in canonical CBOR key order
    /// (shorter first, then bytewise).
    pub fn by_policy(&self) -> BTreeMap<PolicyId, Vec<(&[u8], u64)>> {
        let mut grouped: BTreeMap<PolicyId, Vec<(&[u8], u64)>> = BTreeMap::new();
        for (asset, qty) in &self.0 {
            grouped
                .entry(asset.policy)
                .or_default()
                .push((asset.name.as_slice(), *qty));
        }
        for names in grouped.values_mut() {
            names.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(b.0)));
        }
        grouped
    }

    fn checked_add(&self, other: &MultiAsset) -> Option<MultiAsset> {
        let mut out = self.clone();
        for (asset, qty) in other.iter() {
            out.add(asset.clone(), qty)?;
        }
        Some(out)
    }

    fn checked_sub(&self, other: &MultiAsset) -> Option<MultiAsset> {
        let mut out = self.clone();
        for (asset, qty) in other.iter() {
            let have = out.get(asset);
            out.insert(asset.clone(), have.checked_sub(qty)?);
        }
        Some(out)
    }

    fn covers(&self, other: &MultiAsset) -> bool {
        other.iter().all(|(asset, qty)| self.get(asset) >= qty)
    }
}

impl FromIterator<(AssetId, u64)> for MultiAsset {
    fn from_iter<I: IntoIterator<Item = (AssetId, u64)>>(iter: I) -> Self {
        let mut out = MultiAsset::new();
        for (asset, qty) in iter {
            out.insert(asset, qty);
        }
        out
    }
}

/// Lovelace plus an optional native-asset bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Value {
    pub coin: u64,
    pub assets: MultiAsset,
}

impl Value {
    /// Pure-ADA value.
    pub fn lovelace(coin: u64) -> Self {
        Self {
            coin,
            assets: MultiAsset::new(),
        }
    }

    pub fn new(coin: u64, assets: MultiAsset) -> Self {
        Self { coin, assets }
    }

    pub fn is_zero(&self) -> bool {
        self.coin == 0 && self.assets.is_empty()
    }

    pub fn has_assets(&self) -> bool {
        !self.assets.is_empty()
    }

    pub fn checked_add(&self, other: &Value) -> Option<Value> {
        Some(Value {
            coin: self.coin.checked_add(other.coin)?,
            assets: self.assets.checked_add(&other.assets)?,
        })
    }

    /// `self - other`, or `None` if any component would go negative.
    pub fn checked_sub(&self, other: &Value) -> Option<Value> {
        Some(Value {
            coin: self.coin.checked_sub(other.coin)?,
            assets: self.assets.checked_sub(&other.assets)?,
        })
    }

    /// True when every component of `other` is available in `self`.
    pub fn covers(&self, other: &Value) -> bool {
        self.coin >= other.coin && self.assets.covers(&other.assets)
    }

    /// Per-component amount by which `self` falls short of `target`.
    pub fn shortfall(&self, target: &Value) -> Value {
        let assets = target
            .assets
            .iter()
            .map(|(asset, qty)| (asset.clone(), qty.saturating_sub(self.assets.get(asset))))
            .collect();
        Value {
            coin: target.coin.saturating_sub(self.coin),
            assets,
        }
    }

    /// Checked sum over a sequence of values.
    pub fn sum<'a, I>(values: I) -> Option<Value>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        values
            .into_iter()
            .try_fold(Value::default(), |acc, v| acc.checked_add(v))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} lovelace", self.coin)?;
        for (asset, qty) in self.assets.iter() {
            write!(f, " + {qty} {asset}")?;
        }
        Ok(())
    }
}

/// Parse a decimal ADA amount (`"2"`, `"2.5"`, `"0.000001"`) into lovelace
/// without going through floating point.
pub fn parse_ada(amount: &str) -> Result<u64, AdaError> {
    let invalid = || AdaError::InvalidTransaction(format!("invalid ADA amount: {amount:?}"));

    let (whole, frac) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac.len() > 6 {
        return Err(invalid());
    }

    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let frac_lovelace: u64 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<6}").parse().map_err(|_| invalid())?
    };

    whole
        .checked_mul(LOVELACE_PER_ADA)
        .and_then(|l| l.checked_add(frac_lovelace))
        .ok_or_else(invalid)
}

/// Render lovelace as ADA with six decimals.
pub fn format_ada(lovelace: u64) -> String {
    format!(
        "{}.{:06}",
        lovelace / LOVELACE_PER_ADA,
        lovelace % LOVELACE_PER_ADA
    )
}
