use crate::keys::{KEY_LEN, SIGNATURE_LEN};
use crate::params::ProtocolParameters;
use minicbor::CborLen;

use crate::transaction::{envelope_len, TransactionBody};

/// Serialized size of `body` wrapped in a full transaction carrying
/// `signers` witnesses.
///
/// Ed25519 keys and signatures have fixed lengths, so zero-filled
/// placeholders give the exact size the signed transaction will have.
/// Nothing is encoded; the length is computed from the structure.
pub fn draft_size(body: &TransactionBody, signers: usize) -> usize {
    let placeholders = vec![([0u8; KEY_LEN], [0u8; SIGNATURE_LEN]); signers];
    envelope_len(body.cbor_len(&mut ()), &placeholders)
}

/// Estimate the fee for `body` once signed by `signers` distinct keys.
///
/// Computes `min_fee_constant + min_fee_coefficient * size` over the draft
/// size from [`draft_size`].
pub fn estimate_fee(body: &TransactionBody, signers: usize, params: &ProtocolParameters) -> u64 {
    params.min_fee_for_size(draft_size(body, signers))
}
