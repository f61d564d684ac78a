//! The payment engine context object.
//!
//! An [`Engine`] owns the configuration, a chain provider and a key store,
//! and exposes the wallet operations: address creation, balance queries,
//! payments, sweeps and submission of externally signed transactions.
//!
//! Keys are stored under the hex of their 28-byte key hash, so the key for
//! any enterprise or base address is found from the address alone.

use std::collections::HashMap;
use std::sync::Arc;

use chain_ada::value::parse_ada;
use chain_ada::{
    AdaError, AdaNetwork, Address, PaymentSigningKey, SignedTransaction, TransactionOutput, TxBuilder,
    TxId, UnsignedTransaction, Value,
};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tracing::{info, instrument};

use crate::balance::{self, Balance};
use crate::config::EngineConfig;
use crate::error::WalletError;
use crate::keystore::{load_key_file, FileKeyStore, KeyStore};
use crate::provider::{BlockfrostProvider, ChainProvider};
use crate::submit::Submitter;

/// Key id under which the key for `key_hash` is stored.
pub fn key_id_for(key_hash: &[u8; 28]) -> String {
    hex::encode(key_hash)
}

/// One async mutex per funding address.
///
/// Two flows spending from the same address would select the same UTXOs;
/// holding the address lock from selection through submission keeps them
/// apart. Entries nobody holds or waits on are dropped on release.
#[derive(Default)]
pub struct AddressLocks {
    table: Mutex<HashMap<Address, Arc<tokio::sync::Mutex<()>>>>,
}

impl AddressLocks {
    pub async fn acquire(&self, address: &Address) -> AddressGuard<'_> {
        let lock = self
            .table
            .lock()
            .entry(address.clone())
            .or_default()
            .clone();
        AddressGuard {
            locks: self,
            guard: Some(lock.lock_owned().await),
        }
    }

    fn prune(&self) {
        // The table's own reference is the last one once holders and waiters are gone.
        self.table
            .lock()
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

/// Held address lock; releasing it prunes idle table entries.
pub struct AddressGuard<'a> {
    locks: &'a AddressLocks,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for AddressGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.prune();
    }
}

/// A payment from one address to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub from: Address,
    pub to: Address,
    pub value: Value,
}

impl PaymentRequest {
    pub fn new(from: Address, to: Address, value: Value) -> Self {
        Self { from, to, value }
    }

    /// Pay a decimal ADA amount such as `"2.5"`.
    pub fn ada(from: Address, to: Address, amount: &str) -> Result<Self, WalletError> {
        Ok(Self::new(from, to, Value::lovelace(parse_ada(amount)?)))
    }
}

/// A freshly generated address. The signing key stays in the key store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewAddress {
    pub address: String,
    pub key_id: String,
    pub verification_key_cbor: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentReceipt {
    pub tx_id: TxId,
    pub fee: u64,
    pub explorer_url: String,
}

pub struct Engine {
    config: EngineConfig,
    provider: Arc<dyn ChainProvider>,
    keys: Arc<dyn KeyStore>,
    submitter: Submitter,
    locks: AddressLocks,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn ChainProvider>,
        keys: Arc<dyn KeyStore>,
    ) -> Self {
        let submitter = Submitter::new(provider.clone(), config.retry_policy());
        Self {
            config,
            provider,
            keys,
            submitter,
            locks: AddressLocks::default(),
        }
    }

    /// Wire up a Blockfrost provider and a file key store from `config`,
    /// importing the master key when `master_key_path` is set.
    pub fn from_config(mut config: EngineConfig) -> Result<Self, WalletError> {
        let project_id = config
            .project_id
            .clone()
            .ok_or_else(|| WalletError::Config("blockfrost project id is not set".into()))?;
        let provider = BlockfrostProvider::new(config.blockfrost_url.clone(), project_id);
        let keys = FileKeyStore::new(&config.key_dir, config.key_passphrase.clone());

        if let Some(path) = &config.master_key_path {
            let master = load_key_file(path)?;
            let derived = Address::derive(&master.verification_key(), config.network);
            let controls = config
                .master_address
                .as_ref()
                .map(|expected| expected.payment_key_hash() == derived.payment_key_hash());
            match controls {
                Some(true) => {}
                Some(false) => {
                    return Err(WalletError::Config(format!(
                        "master key at {} does not control the configured master address",
                        path.display()
                    )));
                }
                None => config.master_address = Some(derived),
            }
            let key_id = key_id_for(&master.verification_key().hash());
            if !keys.contains(&key_id) {
                keys.store(&key_id, &master)?;
            }
        }

        info!(
            network = %config.network,
            master = ?config.master_address.as_ref().map(|a| a.to_bech32()),
            "engine configured"
        );
        Ok(Self::new(config, Arc::new(provider), Arc::new(keys)))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn network(&self) -> AdaNetwork {
        self.config.network
    }

    pub fn provider(&self) -> &Arc<dyn ChainProvider> {
        &self.provider
    }

    /// Generate a key, store it and return its enterprise address.
    pub fn create_address(&self) -> Result<NewAddress, WalletError> {
        let key = PaymentSigningKey::generate();
        let vkey = key.verification_key();
        let key_id = key_id_for(&vkey.hash());
        self.keys.store(&key_id, &key)?;

        let address = Address::derive(&vkey, self.config.network);
        info!(%address, "created address");
        Ok(NewAddress {
            address: address.to_bech32(),
            key_id,
            verification_key_cbor: vkey.to_cbor_hex(),
        })
    }

    /// Store an existing key and return the address it controls.
    pub fn import_key(&self, key: &PaymentSigningKey) -> Result<Address, WalletError> {
        let vkey = key.verification_key();
        self.keys.store(&key_id_for(&vkey.hash()), key)?;
        Ok(Address::derive(&vkey, self.config.network))
    }

    pub async fn balance(&self, address: &Address) -> Result<Balance, WalletError> {
        self.check_network(address)?;
        let value = balance::total(self.provider.as_ref(), address).await?;
        Ok(Balance::new(address, &value))
    }

    /// Build a balanced, unsigned payment. Nothing is signed or submitted.
    #[instrument(skip_all, fields(from = %request.from, to = %request.to))]
    pub async fn build_unsigned(
        &self,
        request: &PaymentRequest,
    ) -> Result<UnsignedTransaction, WalletError> {
        self.check_network(&request.from)?;
        let builder = self.builder().await?;
        let utxos = self.provider.utxos(&request.from).await?;
        let outputs = vec![TransactionOutput::new(
            request.to.clone(),
            request.value.clone(),
        )];
        Ok(builder.build_payment(&utxos, outputs, &request.from)?)
    }

    /// Build, sign and submit a payment, returning change to the sender.
    #[instrument(skip_all, fields(from = %request.from, to = %request.to))]
    pub async fn send_payment(&self, request: &PaymentRequest) -> Result<PaymentReceipt, WalletError> {
        let _guard = self.locks.acquire(&request.from).await;
        let unsigned = self.build_unsigned(request).await?;
        self.sign_and_submit(unsigned).await
    }

    /// Move everything held by `from` to the configured master address.
    #[instrument(skip_all, fields(from = %from))]
    pub async fn withdraw_all(&self, from: &Address) -> Result<PaymentReceipt, WalletError> {
        let destination = self
            .config
            .master_address
            .clone()
            .ok_or_else(|| WalletError::Config("master address is not set".into()))?;
        self.check_network(from)?;

        let _guard = self.locks.acquire(from).await;
        let builder = self.builder().await?;
        let utxos = self.provider.utxos(from).await?;
        let unsigned = builder.build_sweep(&utxos, &destination)?;
        self.sign_and_submit(unsigned).await
    }

    /// Submit a transaction signed elsewhere, given as CBOR hex.
    pub async fn submit_signed(&self, tx_hex: &str) -> Result<PaymentReceipt, WalletError> {
        let bytes = hex::decode(tx_hex.trim())
            .map_err(|e| AdaError::Serialization(format!("transaction hex: {e}")))?;
        let tx = SignedTransaction::from_cbor(&bytes)?;
        let tx_id = self.submitter.submit_raw(&bytes).await?;
        Ok(self.receipt(tx_id, tx.body().fee))
    }

    async fn builder(&self) -> Result<TxBuilder, WalletError> {
        let params = self.provider.protocol_parameters().await?;
        let ttl = match self.config.ttl_offset {
            Some(offset) => Some(self.provider.latest_slot().await?.saturating_add(offset)),
            None => None,
        };
        Ok(TxBuilder::new(params, self.config.network)
            .with_native_assets(self.config.native_assets)
            .with_max_fee_passes(self.config.max_fee_passes)
            .with_ttl(ttl))
    }

    async fn sign_and_submit(&self, unsigned: UnsignedTransaction) -> Result<PaymentReceipt, WalletError> {
        let keys = unsigned
            .required_signers()
            .iter()
            .map(|hash| self.keys.load(&key_id_for(hash)))
            .collect::<Result<Vec<_>, _>>()?;
        let key_refs: Vec<&PaymentSigningKey> = keys.iter().collect();

        let fee = unsigned.fee();
        let signed = unsigned.sign(&key_refs)?;
        let tx_id = self.submitter.submit(&signed).await?;
        Ok(self.receipt(tx_id, fee))
    }

    fn receipt(&self, tx_id: TxId, fee: u64) -> PaymentReceipt {
        PaymentReceipt {
            tx_id,
            fee,
            explorer_url: self.config.network.explorer_url(&tx_id.to_hex()),
        }
    }

    fn check_network(&self, address: &Address) -> Result<(), WalletError> {
        if address.network() != self.config.network {
            return Err(AdaError::NetworkMismatch {
                expected: self.config.network,
                found: address.network(),
            }
            .into());
        }
        Ok(())
    }
}
