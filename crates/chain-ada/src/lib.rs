//! Cardano chain support for the payment engine.
//!
//! Provides Shelley address encoding, Ed25519 payment keys, native-asset
//! value arithmetic, deterministic UTXO selection, linear fee estimation and
//! a bounded fee-convergence transaction builder. Transactions are serialized
//! in the ledger's canonical CBOR layout with `minicbor`; nothing in this
//! crate performs I/O.

pub mod address;
pub mod builder;
pub mod error;
pub mod fee;
pub mod hash;
pub mod keys;
pub mod network;
pub mod params;
pub mod transaction;
pub mod utxo;
pub mod value;

pub use address::{Address, Credential};
pub use builder::{TxBuilder, DEFAULT_MAX_FEE_PASSES};
pub use error::AdaError;
pub use keys::{PaymentSigningKey, PaymentVerificationKey};
pub use network::AdaNetwork;
pub use params::ProtocolParameters;
pub use transaction::{SignedTransaction, TransactionBody, UnsignedTransaction, VKeyWitness};
pub use utxo::{select_utxos, Selection, TransactionInput, TransactionOutput, TxId, Utxo};
pub use value::{AssetId, MultiAsset, Value};
