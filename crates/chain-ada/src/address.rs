//! Shelley address codec.
//!
//! Binary form is a one-byte header followed by credential hashes:
//!
//! ```text
//! header = address_type (high nibble) | network_id (low nibble)
//!
//! type 0  base       payment key    | stake key     (1 + 28 + 28 bytes)
//! type 1  base       payment script | stake key
//! type 2  base       payment key    | stake script
//! type 3  base       payment script | stake script
//! type 6  enterprise payment key                    (1 + 28 bytes)
//! type 7  enterprise payment script
//! ```
//!
//! Text form is Bech32 with HRP `addr` (mainnet) or `addr_test` (testnet).
//! Pointer, reward and Byron addresses are rejected.

use std::fmt;
use std::str::FromStr;

use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32, Hrp};

use crate::error::AdaError;
use crate::hash::HASH28_LEN;
use crate::keys::PaymentVerificationKey;
use crate::network::AdaNetwork;

const BASE_LEN: usize = 1 + 2 * HASH28_LEN;
const ENTERPRISE_LEN: usize = 1 + HASH28_LEN;

/// A payment or stake credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Credential {
    Key([u8; HASH28_LEN]),
    Script([u8; HASH28_LEN]),
}

impl Credential {
    pub fn hash(&self) -> &[u8; HASH28_LEN] {
        match self {
            Credential::Key(h) | Credential::Script(h) => h,
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(self, Credential::Script(_))
    }
}

/// A Shelley payment address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    network: AdaNetwork,
    payment: Credential,
    stake: Option<Credential>,
}

impl Address {
    /// Address with a payment part only.
    pub fn enterprise(payment: Credential, network: AdaNetwork) -> Self {
        Self {
            network,
            payment,
            stake: None,
        }
    }

    /// Address with both a payment and a stake part.
    pub fn base(payment: Credential, stake: Credential, network: AdaNetwork) -> Self {
        Self {
            network,
            payment,
            stake: Some(stake),
        }
    }

    /// Enterprise key address for `vkey` on `network`.
    pub fn derive(vkey: &PaymentVerificationKey, network: AdaNetwork) -> Self {
        Self::enterprise(Credential::Key(vkey.hash()), network)
    }

    pub fn network(&self) -> AdaNetwork {
        self.network
    }

    pub fn payment(&self) -> &Credential {
        &self.payment
    }

    pub fn stake(&self) -> Option<&Credential> {
        self.stake.as_ref()
    }

    /// Payment key hash, or `None` for script-locked addresses.
    pub fn payment_key_hash(&self) -> Option<&[u8; HASH28_LEN]> {
        match &self.payment {
            Credential::Key(h) => Some(h),
            Credential::Script(_) => None,
        }
    }

    fn header(&self) -> u8 {
        let address_type = match self.stake {
            Some(stake) => (self.payment.is_script() as u8) | ((stake.is_script() as u8) << 1),
            None => 6 | (self.payment.is_script() as u8),
        };
        (address_type << 4) | self.network.network_id()
    }

    /// Raw header + payload bytes, as carried in transaction outputs.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(BASE_LEN);
        out.push(self.header());
        out.extend_from_slice(self.payment.hash());
        if let Some(stake) = &self.stake {
            out.extend_from_slice(stake.hash());
        }
        out
    }

    /// Parse raw header + payload bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AdaError> {
        let header = *bytes
            .first()
            .ok_or_else(|| AdaError::InvalidAddressFormat("empty address".into()))?;
        let address_type = header >> 4;
        let network = AdaNetwork::from_network_id(header & 0x0f).ok_or_else(|| {
            AdaError::InvalidAddressFormat(format!("unknown network id {}", header & 0x0f))
        })?;

        let expected_len = match address_type {
            0..=3 => BASE_LEN,
            6 | 7 => ENTERPRISE_LEN,
            other => {
                return Err(AdaError::InvalidAddressFormat(format!(
                    "unsupported address type {other}"
                )))
            }
        };
        if bytes.len() != expected_len {
            return Err(AdaError::InvalidAddressFormat(format!(
                "address type {address_type} needs {expected_len} bytes, got {}",
                bytes.len()
            )));
        }

        let payment_hash = hash28(&bytes[1..1 + HASH28_LEN]);
        let payment = if address_type & 1 == 1 {
            Credential::Script(payment_hash)
        } else {
            Credential::Key(payment_hash)
        };

        let stake = if address_type <= 3 {
            let stake_hash = hash28(&bytes[1 + HASH28_LEN..]);
            Some(if address_type & 2 == 2 {
                Credential::Script(stake_hash)
            } else {
                Credential::Key(stake_hash)
            })
        } else {
            None
        };

        Ok(Self {
            network,
            payment,
            stake,
        })
    }

    /// Parse a Bech32 address without checking it against a network.
    /// Bech32m checksums are rejected.
    pub fn from_bech32(text: &str) -> Result<Self, AdaError> {
        let checked = CheckedHrpstring::new::<Bech32>(text)
            .map_err(|e| AdaError::InvalidAddressFormat(format!("bech32 decode failed: {e}")))?;
        let data: Vec<u8> = checked.byte_iter().collect();
        let address = Self::from_bytes(&data)?;

        let prefix = checked.hrp().as_str().to_ascii_lowercase();
        if prefix != address.network.address_hrp() {
            return Err(AdaError::InvalidAddressFormat(format!(
                "prefix {prefix} does not match {} header",
                address.network
            )));
        }
        Ok(address)
    }

    /// Bech32 text form.
    pub fn to_bech32(&self) -> String {
        self.to_string()
    }
}

fn hash28(bytes: &[u8]) -> [u8; HASH28_LEN] {
    let mut out = [0u8; HASH28_LEN];
    out.copy_from_slice(bytes);
    out
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hrp = Hrp::parse_unchecked(self.network.address_hrp());
        bech32::encode_to_fmt::<Bech32, _>(f, hrp, &self.to_bytes()).map_err(|_| fmt::Error)
    }
}

impl FromStr for Address {
    type Err = AdaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bech32(s)
    }
}

/// Decode a Bech32 address and require it to belong to `expected`.
pub fn decode(text: &str, expected: AdaNetwork) -> Result<Address, AdaError> {
    let address = Address::from_bech32(text)?;
    if address.network != expected {
        return Err(AdaError::NetworkMismatch {
            expected,
            found: address.network,
        });
    }
    Ok(address)
}

/// Encode an address to its Bech32 text form.
pub fn encode(address: &Address) -> String {
    address.to_bech32()
}

/// Derive the enterprise address controlled by `vkey`.
pub fn derive(vkey: &PaymentVerificationKey, network: AdaNetwork) -> Address {
    Address::derive(vkey, network)
}
