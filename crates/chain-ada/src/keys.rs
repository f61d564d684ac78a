//! Ed25519 payment keys.
//!
//! A payment signing key is a 32-byte Ed25519 seed. On disk and on the wire it
//! appears CBOR-wrapped as a 32-byte byte string (`5820 || seed`), usually
//! inside the JSON "text envelope" produced by the node CLI:
//!
//! ```json
//! { "type": "PaymentSigningKeyShelley_ed25519",
//!   "description": "Payment Signing Key",
//!   "cborHex": "5820..." }
//! ```

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::error::AdaError;
use crate::hash::{blake2b_224, HASH28_LEN};
use crate::transaction::{TransactionBody, VKeyWitness};
use crate::utxo::TxId;

pub const SIGNING_KEY_ENVELOPE_TYPE: &str = "PaymentSigningKeyShelley_ed25519";
pub const VERIFICATION_KEY_ENVELOPE_TYPE: &str = "PaymentVerificationKeyShelley_ed25519";

/// Ed25519 key and signature lengths.
pub const KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

// CBOR head of a 32-byte byte string.
const CBOR_BYTES32: [u8; 2] = [0x58, 0x20];

/// JSON envelope used by the node CLI for key files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextEnvelope {
    #[serde(rename = "type")]
    pub key_type: String,
    pub description: String,
    #[serde(rename = "cborHex")]
    pub cbor_hex: String,
}

fn unwrap_cbor_key(bytes: &[u8]) -> Result<[u8; KEY_LEN], AdaError> {
    let bad_length = || {
        AdaError::KeyLoad(format!(
            "expected a 32-byte key or its CBOR encoding, got {} bytes",
            bytes.len()
        ))
    };
    let raw = if bytes.len() == KEY_LEN {
        bytes
    } else {
        let mut d = minicbor::Decoder::new(bytes);
        let raw = d.bytes().map_err(|_| bad_length())?;
        if d.position() != bytes.len() {
            return Err(bad_length());
        }
        raw
    };
    raw.try_into().map_err(|_| bad_length())
}

fn wrap_cbor_key(key: &[u8; KEY_LEN]) -> Vec<u8> {
    let mut out = Vec::with_capacity(KEY_LEN + 2);
    out.extend_from_slice(&CBOR_BYTES32);
    out.extend_from_slice(key);
    out
}

// ---------------------------------------------------------------------------
// Signing key
// ---------------------------------------------------------------------------

/// A payment signing key. Wiped from memory on drop; `Debug` never prints
/// key material.
#[derive(Clone)]
pub struct PaymentSigningKey {
    inner: SigningKey,
}

impl PaymentSigningKey {
    /// Fresh key from the operating system's CSPRNG.
    pub fn generate() -> Self {
        Self {
            inner: SigningKey::generate(&mut OsRng),
        }
    }

    /// Load from a raw 32-byte seed or its CBOR byte-string wrapping.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AdaError> {
        let mut seed = unwrap_cbor_key(bytes)?;
        let inner = SigningKey::from_bytes(&seed);
        seed.zeroize();
        Ok(Self { inner })
    }

    pub fn from_cbor_hex(cbor_hex: &str) -> Result<Self, AdaError> {
        let bytes = Zeroizing::new(
            hex::decode(cbor_hex.trim())
                .map_err(|e| AdaError::KeyLoad(format!("invalid key hex: {e}")))?,
        );
        Self::from_bytes(&bytes)
    }

    /// CBOR-wrapped seed as hex, for handing to an encrypted store.
    pub fn to_cbor_hex(&self) -> Zeroizing<String> {
        let seed = Zeroizing::new(self.inner.to_bytes());
        let wrapped = Zeroizing::new(wrap_cbor_key(&seed));
        Zeroizing::new(hex::encode(wrapped.as_slice()))
    }

    /// Raw 32-byte seed.
    pub fn to_bytes(&self) -> Zeroizing<[u8; KEY_LEN]> {
        Zeroizing::new(self.inner.to_bytes())
    }

    pub fn from_text_envelope(json: &str) -> Result<Self, AdaError> {
        let envelope: TextEnvelope = serde_json::from_str(json)
            .map_err(|e| AdaError::KeyLoad(format!("invalid key envelope: {e}")))?;
        if !envelope.key_type.starts_with("PaymentSigningKey") {
            return Err(AdaError::KeyLoad(format!(
                "envelope holds {}, not a payment signing key",
                envelope.key_type
            )));
        }
        Self::from_cbor_hex(&envelope.cbor_hex)
    }

    pub fn to_text_envelope(&self) -> Result<Zeroizing<String>, AdaError> {
        let envelope = TextEnvelope {
            key_type: SIGNING_KEY_ENVELOPE_TYPE.into(),
            description: "Payment Signing Key".into(),
            cbor_hex: self.to_cbor_hex().to_string(),
        };
        let json = serde_json::to_string_pretty(&envelope)
            .map_err(|e| AdaError::Serialization(e.to_string()))?;
        let mut cbor_hex = envelope.cbor_hex;
        cbor_hex.zeroize();
        Ok(Zeroizing::new(json))
    }

    pub fn verification_key(&self) -> PaymentVerificationKey {
        PaymentVerificationKey(self.inner.verifying_key())
    }

    /// Ed25519 signature over `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.inner.sign(message).to_bytes()
    }

    /// Witness for the transaction identified by `tx_id`.
    pub fn witness(&self, tx_id: &TxId) -> VKeyWitness {
        VKeyWitness {
            vkey: self.verification_key(),
            signature: self.sign(tx_id.as_bytes()),
        }
    }
}

impl std::fmt::Debug for PaymentSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentSigningKey")
            .field("key_hash", &hex::encode(self.verification_key().hash()))
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Verification key
// ---------------------------------------------------------------------------

/// A payment verification key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentVerificationKey(VerifyingKey);

impl PaymentVerificationKey {
    pub fn from_bytes(bytes: &[u8; KEY_LEN]) -> Result<Self, AdaError> {
        VerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|e| AdaError::KeyLoad(format!("invalid verification key: {e}")))
    }

    pub fn from_cbor_hex(cbor_hex: &str) -> Result<Self, AdaError> {
        let bytes = hex::decode(cbor_hex.trim())
            .map_err(|e| AdaError::KeyLoad(format!("invalid key hex: {e}")))?;
        Self::from_bytes(&unwrap_cbor_key(&bytes)?)
    }

    pub fn to_bytes(&self) -> [u8; KEY_LEN] {
        self.0.to_bytes()
    }

    pub fn to_cbor_hex(&self) -> String {
        hex::encode(wrap_cbor_key(&self.to_bytes()))
    }

    pub fn to_text_envelope(&self) -> Result<String, AdaError> {
        serde_json::to_string_pretty(&TextEnvelope {
            key_type: VERIFICATION_KEY_ENVELOPE_TYPE.into(),
            description: "Payment Verification Key".into(),
            cbor_hex: self.to_cbor_hex(),
        })
        .map_err(|e| AdaError::Serialization(e.to_string()))
    }

    /// Blake2b-224 hash: the payment credential this key controls.
    pub fn hash(&self) -> [u8; HASH28_LEN] {
        blake2b_224(self.0.as_bytes())
    }

    pub fn verify(&self, message: &[u8], signature: &[u8; SIGNATURE_LEN]) -> bool {
        self.0
            .verify(message, &Signature::from_bytes(signature))
            .is_ok()
    }
}

// ---------------------------------------------------------------------------
// Key manager entry points
// ---------------------------------------------------------------------------

/// Generate a fresh key pair.
pub fn generate() -> (PaymentSigningKey, PaymentVerificationKey) {
    let skey = PaymentSigningKey::generate();
    let vkey = skey.verification_key();
    (skey, vkey)
}

/// Load a signing key from raw or CBOR-wrapped bytes.
pub fn load(bytes: &[u8]) -> Result<PaymentSigningKey, AdaError> {
    PaymentSigningKey::from_bytes(bytes)
}

/// Sign a transaction body.
pub fn sign(key: &PaymentSigningKey, body: &TransactionBody) -> Result<VKeyWitness, AdaError> {
    Ok(key.witness(&body.id()?))
}
