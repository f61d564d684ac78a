//! In-process ledger view.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chain_ada::hash::blake2b_256;
use chain_ada::{
    Address, Credential, ProtocolParameters, SignedTransaction, TransactionInput,
    TransactionOutput, TxId, Utxo, Value,
};
use parking_lot::Mutex;
use tracing::debug;

use super::{ChainProvider, ProviderError};

#[derive(Debug, Default)]
struct Ledger {
    utxos: BTreeMap<TransactionInput, TransactionOutput>,
    accepted: BTreeSet<TxId>,
    submissions: Vec<Vec<u8>>,
    slot: u64,
    funding_counter: u64,
    // Scripted faults, consumed one per call.
    unavailable_submissions: u32,
    lost_responses: u32,
    unavailable_queries: u32,
}

impl Ledger {
    fn take_query_fault(&mut self) -> Result<(), ProviderError> {
        if self.unavailable_queries > 0 {
            self.unavailable_queries -= 1;
            return Err(ProviderError::Unavailable("scripted query outage".into()));
        }
        Ok(())
    }

    fn validate(&self, tx: &SignedTransaction, size: usize, params: &ProtocolParameters) -> Result<(), String> {
        let body = tx.body();
        if body.inputs.is_empty() {
            return Err("transaction has no inputs".into());
        }
        let mut consumed = Value::default();
        let mut needed = BTreeSet::new();
        for input in &body.inputs {
            let spent = self
                .utxos
                .get(input)
                .ok_or_else(|| format!("BadInputsUTxO: {input} is unknown or already spent"))?;
            if let Credential::Key(hash) = spent.address.payment() {
                needed.insert(*hash);
            }
            consumed = consumed
                .checked_add(&spent.value)
                .ok_or("input value overflows")?;
        }

        tx.verify_witnesses().map_err(|e| e.to_string())?;
        let provided: BTreeSet<_> = tx.witnesses().iter().map(|w| w.vkey.hash()).collect();
        if let Some(missing) = needed.difference(&provided).next() {
            return Err(format!("MissingVKeyWitnesses: {}", hex::encode(missing)));
        }

        let produced = body
            .total_output()
            .and_then(|v| v.checked_add(&Value::lovelace(body.fee)))
            .ok_or("output value overflows")?;
        if consumed != produced {
            return Err(format!(
                "ValueNotConserved: consumed {consumed}, produced {produced}"
            ));
        }

        let min_fee = params.min_fee_for_size(size);
        if body.fee < min_fee {
            return Err(format!("FeeTooSmall: {} < {min_fee}", body.fee));
        }
        if size > params.max_tx_size {
            return Err(format!("MaxTxSizeExceeded: {size} > {}", params.max_tx_size));
        }
        for (index, output) in body.outputs.iter().enumerate() {
            let minimum = params.min_utxo_for(output);
            if output.value.coin < minimum {
                return Err(format!("OutputTooSmall: output {index} below {minimum}"));
            }
        }
        if let Some(ttl) = body.ttl {
            if ttl < self.slot {
                return Err(format!("ExpiredTx: ttl {ttl} before slot {}", self.slot));
            }
        }
        Ok(())
    }

    fn apply(&mut self, tx: &SignedTransaction) {
        let tx_id = tx.id();
        for input in &tx.body().inputs {
            self.utxos.remove(input);
        }
        for (index, output) in tx.body().outputs.iter().enumerate() {
            self.utxos
                .insert(TransactionInput::new(tx_id, index as u32), output.clone());
        }
        self.accepted.insert(tx_id);
    }
}

/// A ledger held in memory.
///
/// Accepted transactions spend their inputs and create their outputs, so
/// balances and UTXO sets move the way they would on chain. Resubmitting an
/// accepted transaction returns its id again. Outages can be scripted to
/// exercise retry paths.
#[derive(Debug)]
pub struct MemoryProvider {
    params: ProtocolParameters,
    ledger: Mutex<Ledger>,
}

impl MemoryProvider {
    pub fn new(params: ProtocolParameters) -> Self {
        Self {
            params,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Create a fresh UTXO paying `value` to `address`.
    pub fn fund(&self, address: &Address, value: Value) -> TransactionInput {
        let mut ledger = self.ledger.lock();
        ledger.funding_counter += 1;
        let seed = format!("funding-{}", ledger.funding_counter);
        let input = TransactionInput::new(TxId::from_bytes(blake2b_256(seed.as_bytes())), 0);
        ledger
            .utxos
            .insert(input, TransactionOutput::new(address.clone(), value));
        input
    }

    pub fn insert_utxo(&self, utxo: Utxo) {
        self.ledger.lock().utxos.insert(utxo.input, utxo.output);
    }

    pub fn set_slot(&self, slot: u64) {
        self.ledger.lock().slot = slot;
    }

    /// The next `n` submissions fail as unavailable without reaching the
    /// ledger.
    pub fn fail_next_submissions(&self, n: u32) {
        self.ledger.lock().unavailable_submissions = n;
    }

    /// The next `n` submissions are applied to the ledger but reported as
    /// unavailable, as when a response is lost after acceptance.
    pub fn lose_next_responses(&self, n: u32) {
        self.ledger.lock().lost_responses = n;
    }

    /// The next `n` queries fail as unavailable.
    pub fn fail_next_queries(&self, n: u32) {
        self.ledger.lock().unavailable_queries = n;
    }

    /// Every byte string passed to `submit_tx`, in order.
    pub fn submissions(&self) -> Vec<Vec<u8>> {
        self.ledger.lock().submissions.clone()
    }

    pub fn is_accepted(&self, tx_id: &TxId) -> bool {
        self.ledger.lock().accepted.contains(tx_id)
    }
}

#[async_trait]
impl ChainProvider for MemoryProvider {
    async fn utxos(&self, address: &Address) -> Result<Vec<Utxo>, ProviderError> {
        let mut ledger = self.ledger.lock();
        ledger.take_query_fault()?;
        Ok(ledger
            .utxos
            .iter()
            .filter(|(_, output)| &output.address == address)
            .map(|(input, output)| Utxo::new(*input, output.clone()))
            .collect())
    }

    async fn protocol_parameters(&self) -> Result<ProtocolParameters, ProviderError> {
        self.ledger.lock().take_query_fault()?;
        Ok(self.params.clone())
    }

    async fn submit_tx(&self, tx_cbor: &[u8]) -> Result<TxId, ProviderError> {
        let mut ledger = self.ledger.lock();
        ledger.submissions.push(tx_cbor.to_vec());
        if ledger.unavailable_submissions > 0 {
            ledger.unavailable_submissions -= 1;
            return Err(ProviderError::Unavailable("scripted submission outage".into()));
        }

        let tx = SignedTransaction::from_cbor(tx_cbor)
            .map_err(|e| ProviderError::Rejected(format!("DeserialiseFailure: {e}")))?;
        let tx_id = tx.id();
        if !ledger.accepted.contains(&tx_id) {
            ledger
                .validate(&tx, tx_cbor.len(), &self.params)
                .map_err(ProviderError::Rejected)?;
            ledger.apply(&tx);
            debug!(%tx_id, "memory ledger accepted transaction");
        }

        if ledger.lost_responses > 0 {
            ledger.lost_responses -= 1;
            return Err(ProviderError::Unavailable("scripted lost response".into()));
        }
        Ok(tx_id)
    }

    async fn latest_slot(&self) -> Result<u64, ProviderError> {
        let mut ledger = self.ledger.lock();
        ledger.take_query_fault()?;
        Ok(ledger.slot)
    }
}
