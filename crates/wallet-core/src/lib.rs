//! # wallet-core
//!
//! Orchestration layer of the payment engine. Wraps the pure transaction
//! engine in `chain-ada` with chain data providers, key custody, retrying
//! submission, layered configuration and logging, and exposes the wallet
//! operations through [`Engine`].

pub mod balance;
pub mod config;
pub mod engine;
pub mod error;
pub mod keystore;
pub mod logging;
pub mod provider;
pub mod submit;

pub use balance::Balance;
pub use config::EngineConfig;
pub use engine::{AddressGuard, AddressLocks, Engine, NewAddress, PaymentReceipt, PaymentRequest};
pub use error::WalletError;
pub use keystore::{FileKeyStore, KeyStore, MemoryKeyStore};
pub use logging::{init_logging, LogFormat};
pub use provider::{BlockfrostProvider, ChainProvider, MemoryProvider, ProviderError};
pub use submit::{RetryPolicy, Submitter};
