//! # crypto-utils
//!
//! Passphrase sealing of signing-key material at rest and zeroizing secret
//! buffers for the payment engine.

pub mod error;
pub mod sealed;
pub mod secret;

pub use error::CryptoError;
pub use sealed::{open, seal, seal_with, KdfParams, SealedBox};
pub use secret::SecretBytes;
