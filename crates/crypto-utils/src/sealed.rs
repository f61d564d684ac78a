//! Passphrase-sealed secrets.
//!
//! A passphrase is stretched with Argon2id into an AES-256-GCM key; the salt,
//! nonce and KDF cost travel with the ciphertext so a box can be opened
//! later with nothing but the passphrase.
//!
//! ```json
//! { "version": 1,
//!   "kdf": { "memory_kib": 65536, "iterations": 3, "parallelism": 4 },
//!   "salt": "<16 bytes hex>", "nonce": "<12 bytes hex>",
//!   "ciphertext": "<ciphertext + tag hex>" }
//! ```

use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::secret::SecretBytes;

pub const SEALED_BOX_VERSION: u8 = 1;

const SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    /// 64 MiB, 3 iterations, 4 lanes.
    fn default() -> Self {
        Self {
            memory_kib: 65_536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    fn derive_key(
        &self,
        passphrase: &[u8],
        salt: &[u8],
    ) -> Result<Zeroizing<[u8; KEY_SIZE]>, CryptoError> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| CryptoError::KdfFailed(format!("invalid argon2 params: {e}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        argon2
            .hash_password_into(passphrase, salt, &mut key[..])
            .map_err(|e| CryptoError::KdfFailed(format!("argon2 hash failed: {e}")))?;
        Ok(key)
    }
}

/// Ciphertext plus everything needed to re-derive its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBox {
    pub version: u8,
    pub kdf: KdfParams,
    #[serde(with = "hex_bytes")]
    pub salt: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub nonce: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub ciphertext: Vec<u8>,
}

impl SealedBox {
    pub fn to_json(&self) -> Result<String, CryptoError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CryptoError::InvalidInput(format!("sealed box serialization: {e}")))
    }

    pub fn from_json(json: &str) -> Result<Self, CryptoError> {
        serde_json::from_str(json)
            .map_err(|e| CryptoError::InvalidInput(format!("sealed box deserialization: {e}")))
    }
}

/// Seal `plaintext` under `passphrase` with the default KDF cost.
pub fn seal(plaintext: &[u8], passphrase: &[u8]) -> Result<SealedBox, CryptoError> {
    seal_with(plaintext, passphrase, KdfParams::default())
}

/// Seal `plaintext` under `passphrase` with an explicit KDF cost.
pub fn seal_with(
    plaintext: &[u8],
    passphrase: &[u8],
    kdf: KdfParams,
) -> Result<SealedBox, CryptoError> {
    if passphrase.is_empty() {
        return Err(CryptoError::InvalidInput("empty passphrase".into()));
    }
    let mut salt = vec![0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    let key = kdf.derive_key(passphrase, &salt)?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    Ok(SealedBox {
        version: SEALED_BOX_VERSION,
        kdf,
        salt,
        nonce: nonce.to_vec(),
        ciphertext,
    })
}

/// Open a box sealed by [`seal`]. A wrong passphrase and a tampered box
/// are indistinguishable and both fail with `DecryptionFailed`.
pub fn open(sealed: &SealedBox, passphrase: &[u8]) -> Result<SecretBytes, CryptoError> {
    if sealed.version != SEALED_BOX_VERSION {
        return Err(CryptoError::UnsupportedVersion(sealed.version));
    }
    if sealed.nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidInput(format!(
            "nonce must be {NONCE_SIZE} bytes, got {}",
            sealed.nonce.len()
        )));
    }
    if sealed.salt.len() < 8 {
        return Err(CryptoError::InvalidInput("salt too short".into()));
    }

    let key = sealed.kdf.derive_key(passphrase, &sealed.salt)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));
    cipher
        .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_slice())
        .map(SecretBytes::new)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
