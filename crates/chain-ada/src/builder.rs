//! Balanced transaction construction.
//!
//! Selection and fee estimation depend on each other: the fee depends on the
//! size of the transaction, which depends on how many inputs were selected and
//! whether a change output exists, which in turn depends on the fee. The
//! builder iterates the pair to a fixed point:
//!
//! ```text
//! fee <- estimate(outputs only)
//! repeat up to max_fee_passes:
//!     select inputs covering outputs + fee + reserve
//!     remainder = inputs - outputs - fee
//!         zero                      -> no change output
//!         >= min UTXO               -> change output
//!         < min UTXO, ADA only      -> folded into the fee
//!         < min UTXO, with assets   -> reserve the change minimum, select again
//!     required = estimate(draft)
//!     required > fee paid, change   -> take the difference out of change
//!     required <= fee paid          -> done
//!     otherwise fee <- required     (the fee never decreases)
//! ```

use tracing::{debug, info};

use crate::address::Address;
use crate::error::AdaError;
use crate::fee::{draft_size, estimate_fee};
use crate::network::AdaNetwork;
use crate::params::ProtocolParameters;
use crate::transaction::{required_signers, TransactionBody, UnsignedTransaction};
use crate::utxo::{select_utxos, spendable, TransactionOutput, Utxo};
use crate::value::Value;

/// Default bound on selection/fee passes.
pub const DEFAULT_MAX_FEE_PASSES: usize = 4;

/// Builds balanced, unsigned transactions from a set of candidate UTXOs.
#[derive(Debug, Clone)]
pub struct TxBuilder {
    params: ProtocolParameters,
    network: AdaNetwork,
    native_assets: bool,
    max_fee_passes: usize,
    ttl: Option<u64>,
}

impl TxBuilder {
    pub fn new(params: ProtocolParameters, network: AdaNetwork) -> Self {
        Self {
            params,
            network,
            native_assets: true,
            max_fee_passes: DEFAULT_MAX_FEE_PASSES,
            ttl: None,
        }
    }

    /// When disabled, asset-bearing UTXOs are never spent and outputs may
    /// only carry lovelace.
    pub fn with_native_assets(mut self, enabled: bool) -> Self {
        self.native_assets = enabled;
        self
    }

    pub fn with_max_fee_passes(mut self, passes: usize) -> Self {
        self.max_fee_passes = passes.max(1);
        self
    }

    /// Last slot in which the built transaction is valid.
    pub fn with_ttl(mut self, ttl: Option<u64>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn params(&self) -> &ProtocolParameters {
        &self.params
    }

    pub fn network(&self) -> AdaNetwork {
        self.network
    }

    fn check_network(&self, address: &Address) -> Result<(), AdaError> {
        if address.network() != self.network {
            return Err(AdaError::NetworkMismatch {
                expected: self.network,
                found: address.network(),
            });
        }
        Ok(())
    }

    fn check_output(&self, index: usize, output: &TransactionOutput) -> Result<(), AdaError> {
        self.check_network(&output.address)?;
        if output.value.has_assets() && !self.native_assets {
            return Err(AdaError::InvalidTransaction(format!(
                "output {index} carries native assets but native assets are disabled"
            )));
        }
        let minimum = self.params.min_utxo_for(output);
        if output.value.coin < minimum {
            return Err(AdaError::BelowMinimumUtxo {
                index,
                value: output.value.coin,
                minimum,
            });
        }
        Ok(())
    }

    /// Minimum lovelace for a change output carrying `value`'s assets,
    /// measured at the coin width the output will actually have.
    fn change_minimum(&self, address: &Address, value: &Value) -> u64 {
        let mut draft = TransactionOutput::new(address.clone(), Value::new(0, value.assets.clone()));
        let mut minimum = self.params.min_utxo_for(&draft);
        draft.value.coin = minimum;
        minimum = minimum.max(self.params.min_utxo_for(&draft));
        minimum
    }

    fn finish(&self, body: TransactionBody, spent: Vec<Utxo>) -> Result<UnsignedTransaction, AdaError> {
        let consumed = Value::sum(spent.iter().map(Utxo::value));
        let produced = body
            .total_output()
            .and_then(|v| v.checked_add(&Value::lovelace(body.fee)));
        if consumed.is_none() || consumed != produced {
            return Err(AdaError::InvalidTransaction(
                "inputs do not equal outputs plus fee".into(),
            ));
        }
        let unsigned = UnsignedTransaction::new(body, spent)?;
        let size = draft_size(unsigned.body(), unsigned.required_signers().len());
        if size > self.params.max_tx_size {
            return Err(AdaError::TransactionTooLarge {
                size,
                max: self.params.max_tx_size,
            });
        }
        Ok(unsigned)
    }

    /// Build a transaction paying `outputs`, returning any change to
    /// `change_address`.
    pub fn build_payment(
        &self,
        candidates: &[Utxo],
        outputs: Vec<TransactionOutput>,
        change_address: &Address,
    ) -> Result<UnsignedTransaction, AdaError> {
        if outputs.is_empty() {
            return Err(AdaError::InvalidTransaction("no outputs".into()));
        }
        for (index, output) in outputs.iter().enumerate() {
            self.check_output(index, output)?;
        }
        self.check_network(change_address)?;

        let paid = Value::sum(outputs.iter().map(|o| &o.value))
            .ok_or_else(|| AdaError::InvalidTransaction("output total overflows".into()))?;

        let mut fee = estimate_fee(
            &TransactionBody {
                inputs: Vec::new(),
                outputs: outputs.clone(),
                fee: 0,
                ttl: self.ttl,
            },
            1,
            &self.params,
        );
        // Lovelace held back so that change carrying assets meets its minimum.
        let mut reserve = 0u64;

        for pass in 1..=self.max_fee_passes {
            let mut target = paid.clone();
            target.coin = paid
                .coin
                .checked_add(fee)
                .and_then(|c| c.checked_add(reserve))
                .ok_or_else(|| AdaError::InvalidTransaction("target overflows".into()))?;

            let selection = select_utxos(candidates, &target, self.native_assets)?;
            let signers = required_signers(&selection.selected)?.len();
            let inputs: Vec<_> = selection.selected.iter().map(|u| u.input).collect();
            let remainder = selection
                .total
                .checked_sub(&paid)
                .and_then(|v| v.checked_sub(&Value::lovelace(fee)))
                .ok_or_else(|| AdaError::InvalidTransaction("selection does not cover target".into()))?;

            let mut body = TransactionBody {
                inputs,
                outputs: outputs.clone(),
                fee,
                ttl: self.ttl,
            };
            let mut has_change = false;
            if !remainder.is_zero() {
                let change = TransactionOutput::new(change_address.clone(), remainder);
                let minimum = self.params.min_utxo_for(&change);
                if change.value.coin >= minimum {
                    body.outputs.push(change);
                    has_change = true;
                } else if !change.value.has_assets() {
                    body.fee += change.value.coin;
                } else {
                    let minimum = self.change_minimum(change_address, &change.value);
                    reserve = reserve.max(minimum);
                    body.outputs.push(TransactionOutput::new(
                        change_address.clone(),
                        Value::new(minimum, change.value.assets),
                    ));
                    fee = fee.max(estimate_fee(&body, signers, &self.params));
                    debug!(pass, fee, reserve, "asset change below minimum, reserving lovelace");
                    continue;
                }
            }

            let mut required = estimate_fee(&body, signers, &self.params);
            if required > body.fee && has_change {
                // Take the difference out of change when it stays above its minimum.
                let shortfall = required - body.fee;
                if let Some(change) = body.outputs.last() {
                    if let Some(coin) = change.value.coin.checked_sub(shortfall) {
                        let adjusted = TransactionOutput::new(
                            change.address.clone(),
                            Value::new(coin, change.value.assets.clone()),
                        );
                        if coin >= self.params.min_utxo_for(&adjusted) {
                            if let Some(last) = body.outputs.last_mut() {
                                *last = adjusted;
                            }
                            body.fee = required;
                            required = estimate_fee(&body, signers, &self.params);
                        }
                    }
                }
            }
            debug!(
                pass,
                fee = body.fee,
                required,
                inputs = body.inputs.len(),
                outputs = body.outputs.len(),
                "fee convergence pass"
            );

            if required <= body.fee {
                let unsigned = self.finish(body, selection.selected)?;
                info!(
                    tx_id = %unsigned.id(),
                    fee = unsigned.fee(),
                    passes = pass,
                    "built payment transaction"
                );
                return Ok(unsigned);
            }
            fee = fee.max(required);
        }

        Err(AdaError::FeeConvergence {
            passes: self.max_fee_passes,
            last_fee: fee,
        })
    }

    /// Build a transaction moving every spendable UTXO to `destination` as a
    /// single output of `total - fee`.
    pub fn build_sweep(
        &self,
        candidates: &[Utxo],
        destination: &Address,
    ) -> Result<UnsignedTransaction, AdaError> {
        self.check_network(destination)?;

        let spent: Vec<Utxo> = spendable(candidates, self.native_assets)
            .into_iter()
            .cloned()
            .collect();
        let total = Value::sum(spent.iter().map(Utxo::value))
            .ok_or_else(|| AdaError::InvalidTransaction("available value overflows".into()))?;
        if spent.is_empty() {
            return Err(AdaError::InsufficientFunds {
                shortfall: Value::lovelace(self.params.min_utxo_value),
                available: total,
            });
        }
        let inputs: Vec<_> = spent.iter().map(|u| u.input).collect();
        let signers = required_signers(&spent)?.len();

        let mut fee = 0u64;
        for pass in 1..=self.max_fee_passes {
            let coin = total.coin.checked_sub(fee).ok_or_else(|| AdaError::InsufficientFunds {
                shortfall: Value::lovelace(fee - total.coin),
                available: total.clone(),
            })?;
            let output = TransactionOutput::new(
                destination.clone(),
                Value::new(coin, total.assets.clone()),
            );
            let body = TransactionBody {
                inputs: inputs.clone(),
                outputs: vec![output],
                fee,
                ttl: self.ttl,
            };
            let required = estimate_fee(&body, signers, &self.params);
            debug!(pass, fee, required, inputs = inputs.len(), "sweep fee pass");

            if required <= fee {
                let minimum = self.params.min_utxo_for(&body.outputs[0]);
                if coin < minimum {
                    return Err(AdaError::BelowMinimumUtxo {
                        index: 0,
                        value: coin,
                        minimum,
                    });
                }
                let unsigned = self.finish(body, spent)?;
                info!(
                    tx_id = %unsigned.id(),
                    fee = unsigned.fee(),
                    swept = coin,
                    "built sweep transaction"
                );
                return Ok(unsigned);
            }
            fee = required;
        }

        Err(AdaError::FeeConvergence {
            passes: self.max_fee_passes,
            last_fee: fee,
        })
    }
}
