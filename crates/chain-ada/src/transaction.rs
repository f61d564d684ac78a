//! Transaction bodies, witnesses and the signing typestate.
//!
//! ```text
//! transaction  = [body, witness_set, is_valid, auxiliary_data]
//! body         = { 0: [input], 1: [output], 2: fee, ? 3: ttl }
//! input        = [tx_id, index]
//! output       = [address_bytes, value]
//! value        = coin / [coin, { policy_id => { asset_name => quantity } }]
//! witness_set  = { ? 0: [[vkey, signature]] }
//! ```
//!
//! Encoding is canonical and definite-length. Decoding additionally accepts
//! tag-258 sets, map-form outputs, indefinite containers and the older
//! three-element envelope without `is_valid`.

use std::collections::BTreeSet;
use std::convert::Infallible;

use minicbor::data::Type;
use minicbor::encode::{self, Write};
use minicbor::{decode, CborLen, Decode, Decoder, Encode, Encoder};

use crate::address::{Address, Credential};
use crate::error::AdaError;
use crate::hash::{blake2b_256, HASH28_LEN};
use crate::keys::{PaymentSigningKey, PaymentVerificationKey, KEY_LEN, SIGNATURE_LEN};
use crate::utxo::{TransactionInput, TransactionOutput, TxId, Utxo};
use crate::value::{AssetId, MultiAsset, Value};

const BODY_INPUTS: u64 = 0;
const BODY_OUTPUTS: u64 = 1;
const BODY_FEE: u64 = 2;
const BODY_TTL: u64 = 3;

const WITNESS_VKEYS: u64 = 0;

const OUTPUT_ADDRESS: u64 = 0;
const OUTPUT_VALUE: u64 = 1;

/// Tag marking a mathematical set.
pub const TAG_SET: u64 = 258;

type RawWitness = ([u8; KEY_LEN], [u8; SIGNATURE_LEN]);

fn malformed(e: decode::Error) -> AdaError {
    AdaError::Serialization(e.to_string())
}

fn encoding(e: encode::Error<Infallible>) -> AdaError {
    AdaError::Serialization(e.to_string())
}

fn invalid(msg: impl std::fmt::Display) -> decode::Error {
    decode::Error::message(msg.to_string())
}

// ---------------------------------------------------------------------------
// Decoding helpers
// ---------------------------------------------------------------------------

fn is_unsigned(ty: Type) -> bool {
    matches!(ty, Type::U8 | Type::U16 | Type::U32 | Type::U64)
}

/// Drive a container loop: `true` while another element remains. The break
/// marker closing an indefinite container is consumed.
fn has_next(d: &mut Decoder<'_>, len: Option<u64>, seen: u64) -> Result<bool, decode::Error> {
    match len {
        Some(n) => Ok(seen < n),
        None if d.datatype()? == Type::Break => {
            d.set_position(d.position() + 1);
            Ok(false)
        }
        None => Ok(true),
    }
}

/// Byte string; indefinite-length chunks are concatenated.
fn byte_string(d: &mut Decoder<'_>) -> Result<Vec<u8>, decode::Error> {
    if d.datatype()? != Type::BytesIndef {
        return Ok(d.bytes()?.to_vec());
    }
    let mut out = Vec::new();
    for chunk in d.bytes_iter()? {
        out.extend_from_slice(chunk?);
    }
    Ok(out)
}

fn fixed_bytes<const N: usize>(d: &mut Decoder<'_>) -> Result<[u8; N], decode::Error> {
    let bytes = byte_string(d)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| invalid(format!("expected {N}-byte string, found {} bytes", bytes.len())))
}

/// Array, optionally wrapped in the set tag.
fn set(d: &mut Decoder<'_>) -> Result<Option<u64>, decode::Error> {
    if d.datatype()? == Type::Tag {
        let tag = d.tag()?;
        if tag.as_u64() != TAG_SET {
            return Err(invalid(format!("unexpected tag {}", tag.as_u64())));
        }
    }
    d.array()
}

fn pair(d: &mut Decoder<'_>, what: &str) -> Result<Option<u64>, decode::Error> {
    let len = d.array()?;
    if matches!(len, Some(n) if n != 2) {
        return Err(invalid(format!("{what} must be a two-element array")));
    }
    Ok(len)
}

fn end_pair(d: &mut Decoder<'_>, len: Option<u64>, what: &str) -> Result<(), decode::Error> {
    if len.is_none() && has_next(d, None, 0)? {
        return Err(invalid(format!("{what} must be a two-element array")));
    }
    Ok(())
}

fn finish(d: &Decoder<'_>) -> Result<(), AdaError> {
    let trailing = d.input().len().saturating_sub(d.position());
    if trailing > 0 {
        return Err(AdaError::Serialization(format!(
            "{trailing} trailing bytes after item"
        )));
    }
    Ok(())
}

// Encoded size of a head carrying `n`; the same for every major type.
fn head_len<C>(n: usize, ctx: &mut C) -> usize {
    (n as u64).cbor_len(ctx)
}

fn bytes_len<C>(len: usize, ctx: &mut C) -> usize {
    head_len(len, ctx) + len
}

// ---------------------------------------------------------------------------
// Values, inputs and outputs
// ---------------------------------------------------------------------------

impl<C> Encode<C> for Value {
    fn encode<W: Write>(&self, e: &mut Encoder<W>, _ctx: &mut C) -> Result<(), encode::Error<W::Error>> {
        if !self.has_assets() {
            e.u64(self.coin)?;
            return Ok(());
        }
        let grouped = self.assets.by_policy();
        e.array(2)?.u64(self.coin)?.map(grouped.len() as u64)?;
        for (policy, names) in &grouped {
            e.bytes(policy)?.map(names.len() as u64)?;
            for (name, qty) in names {
                e.bytes(name)?.u64(*qty)?;
            }
        }
        Ok(())
    }
}

impl<C> CborLen<C> for Value {
    fn cbor_len(&self, ctx: &mut C) -> usize {
        if !self.has_assets() {
            return self.coin.cbor_len(ctx);
        }
        let grouped = self.assets.by_policy();
        let mut len = head_len(2, ctx) + self.coin.cbor_len(ctx) + head_len(grouped.len(), ctx);
        for (policy, names) in &grouped {
            len += bytes_len(policy.len(), ctx) + head_len(names.len(), ctx);
            for (name, qty) in names {
                len += bytes_len(name.len(), ctx) + qty.cbor_len(ctx);
            }
        }
        len
    }
}

impl<'b, C> Decode<'b, C> for Value {
    fn decode(d: &mut Decoder<'b>, _ctx: &mut C) -> Result<Self, decode::Error> {
        if is_unsigned(d.datatype()?) {
            return Ok(Value::lovelace(d.u64()?));
        }
        let len = pair(d, "value")?;
        let coin = d.u64()?;
        let mut assets = MultiAsset::new();
        let policies = d.map()?;
        let mut seen = 0;
        while has_next(d, policies, seen)? {
            let policy = fixed_bytes::<HASH28_LEN>(d)?;
            let names = d.map()?;
            let mut seen_names = 0;
            while has_next(d, names, seen_names)? {
                let asset = AssetId::new(policy, byte_string(d)?).map_err(invalid)?;
                let qty = d.u64()?;
                assets
                    .add(asset, qty)
                    .ok_or_else(|| invalid("asset quantity overflows"))?;
                seen_names += 1;
            }
            seen += 1;
        }
        end_pair(d, len, "value")?;
        Ok(Value::new(coin, assets))
    }
}

impl<C> Encode<C> for TransactionInput {
    fn encode<W: Write>(&self, e: &mut Encoder<W>, _ctx: &mut C) -> Result<(), encode::Error<W::Error>> {
        e.array(2)?.bytes(self.tx_id.as_bytes())?.u32(self.index)?;
        Ok(())
    }
}

impl<C> CborLen<C> for TransactionInput {
    fn cbor_len(&self, ctx: &mut C) -> usize {
        head_len(2, ctx) + bytes_len(self.tx_id.as_bytes().len(), ctx) + self.index.cbor_len(ctx)
    }
}

impl<'b, C> Decode<'b, C> for TransactionInput {
    fn decode(d: &mut Decoder<'b>, _ctx: &mut C) -> Result<Self, decode::Error> {
        let len = pair(d, "input")?;
        let tx_id = TxId::from_bytes(fixed_bytes(d)?);
        let index = d.u32()?;
        end_pair(d, len, "input")?;
        Ok(TransactionInput { tx_id, index })
    }
}

impl<C> Encode<C> for TransactionOutput {
    fn encode<W: Write>(&self, e: &mut Encoder<W>, ctx: &mut C) -> Result<(), encode::Error<W::Error>> {
        e.array(2)?.bytes(&self.address.to_bytes())?;
        self.value.encode(e, ctx)
    }
}

impl<C> CborLen<C> for TransactionOutput {
    fn cbor_len(&self, ctx: &mut C) -> usize {
        head_len(2, ctx) + bytes_len(self.address.to_bytes().len(), ctx) + self.value.cbor_len(ctx)
    }
}

impl<'b, C> Decode<'b, C> for TransactionOutput {
    fn decode(d: &mut Decoder<'b>, ctx: &mut C) -> Result<Self, decode::Error> {
        match d.datatype()? {
            Type::Array | Type::ArrayIndef => {
                let len = d.array()?;
                let address = Address::from_bytes(&byte_string(d)?).map_err(invalid)?;
                let value = d.decode_with(ctx)?;
                // Trailing datum hash, ignored.
                let mut seen = 2;
                while has_next(d, len, seen)? {
                    d.skip()?;
                    seen += 1;
                }
                Ok(TransactionOutput { address, value })
            }
            Type::Map | Type::MapIndef => {
                let len = d.map()?;
                let mut address = None;
                let mut value = None;
                let mut seen = 0;
                while has_next(d, len, seen)? {
                    match d.u64()? {
                        OUTPUT_ADDRESS => {
                            address = Some(Address::from_bytes(&byte_string(d)?).map_err(invalid)?)
                        }
                        OUTPUT_VALUE => value = Some(d.decode_with(ctx)?),
                        _ => d.skip()?,
                    }
                    seen += 1;
                }
                Ok(TransactionOutput {
                    address: address.ok_or_else(|| invalid("output without address"))?,
                    value: value.ok_or_else(|| invalid("output without value"))?,
                })
            }
            other => Err(invalid(format!("unexpected output type {other:?}"))),
        }
    }
}

/// Serialized length of a single output.
pub fn encoded_output_len(output: &TransactionOutput) -> usize {
    output.cbor_len(&mut ())
}

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

/// The part of a transaction covered by signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionBody {
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub fee: u64,
    /// Last slot in which the transaction is valid.
    pub ttl: Option<u64>,
}

impl TransactionBody {
    pub fn to_cbor(&self) -> Result<Vec<u8>, AdaError> {
        minicbor::to_vec(self).map_err(encoding)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, AdaError> {
        let mut d = Decoder::new(bytes);
        let body = d.decode().map_err(malformed)?;
        finish(&d)?;
        Ok(body)
    }

    /// Blake2b-256 of the canonical encoding.
    pub fn id(&self) -> Result<TxId, AdaError> {
        Ok(TxId::from_bytes(blake2b_256(&self.to_cbor()?)))
    }

    /// Sum of output values, or `None` on overflow.
    pub fn total_output(&self) -> Option<Value> {
        Value::sum(self.outputs.iter().map(|o| &o.value))
    }

    fn field_count(&self) -> u64 {
        if self.ttl.is_some() {
            4
        } else {
            3
        }
    }
}

impl<C> Encode<C> for TransactionBody {
    fn encode<W: Write>(&self, e: &mut Encoder<W>, ctx: &mut C) -> Result<(), encode::Error<W::Error>> {
        e.map(self.field_count())?;

        e.u64(BODY_INPUTS)?.array(self.inputs.len() as u64)?;
        for input in &self.inputs {
            input.encode(e, ctx)?;
        }

        e.u64(BODY_OUTPUTS)?.array(self.outputs.len() as u64)?;
        for output in &self.outputs {
            output.encode(e, ctx)?;
        }

        e.u64(BODY_FEE)?.u64(self.fee)?;
        if let Some(ttl) = self.ttl {
            e.u64(BODY_TTL)?.u64(ttl)?;
        }
        Ok(())
    }
}

impl<C> CborLen<C> for TransactionBody {
    fn cbor_len(&self, ctx: &mut C) -> usize {
        let mut len = self.field_count().cbor_len(ctx);
        len += BODY_INPUTS.cbor_len(ctx) + head_len(self.inputs.len(), ctx);
        for input in &self.inputs {
            len += input.cbor_len(ctx);
        }
        len += BODY_OUTPUTS.cbor_len(ctx) + head_len(self.outputs.len(), ctx);
        for output in &self.outputs {
            len += output.cbor_len(ctx);
        }
        len += BODY_FEE.cbor_len(ctx) + self.fee.cbor_len(ctx);
        if let Some(ttl) = self.ttl {
            len += BODY_TTL.cbor_len(ctx) + ttl.cbor_len(ctx);
        }
        len
    }
}

impl<'b, C> Decode<'b, C> for TransactionBody {
    fn decode(d: &mut Decoder<'b>, ctx: &mut C) -> Result<Self, decode::Error> {
        let len = d.map()?;
        let mut inputs = None;
        let mut outputs = None;
        let mut fee = None;
        let mut ttl = None;
        let mut seen = 0;
        while has_next(d, len, seen)? {
            match d.u64()? {
                BODY_INPUTS => {
                    let n = set(d)?;
                    let mut list = Vec::new();
                    while has_next(d, n, list.len() as u64)? {
                        list.push(d.decode_with(ctx)?);
                    }
                    inputs = Some(list);
                }
                BODY_OUTPUTS => {
                    let n = d.array()?;
                    let mut list = Vec::new();
                    while has_next(d, n, list.len() as u64)? {
                        list.push(d.decode_with(ctx)?);
                    }
                    outputs = Some(list);
                }
                BODY_FEE => fee = Some(d.u64()?),
                BODY_TTL => ttl = Some(d.u64()?),
                _ => d.skip()?,
            }
            seen += 1;
        }
        Ok(Self {
            inputs: inputs.ok_or_else(|| invalid("body without inputs"))?,
            outputs: outputs.ok_or_else(|| invalid("body without outputs"))?,
            fee: fee.ok_or_else(|| invalid("body without fee"))?,
            ttl,
        })
    }
}

// ---------------------------------------------------------------------------
// Witnesses and the full envelope
// ---------------------------------------------------------------------------

/// A verification key and its signature over a transaction id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VKeyWitness {
    pub vkey: PaymentVerificationKey,
    pub signature: [u8; SIGNATURE_LEN],
}

impl VKeyWitness {
    pub fn verify(&self, tx_id: &TxId) -> bool {
        self.vkey.verify(tx_id.as_bytes(), &self.signature)
    }

    fn raw(&self) -> RawWitness {
        (self.vkey.to_bytes(), self.signature)
    }
}

struct WitnessSet<'a>(&'a [RawWitness]);

impl<C> Encode<C> for WitnessSet<'_> {
    fn encode<W: Write>(&self, e: &mut Encoder<W>, _ctx: &mut C) -> Result<(), encode::Error<W::Error>> {
        if self.0.is_empty() {
            e.map(0)?;
            return Ok(());
        }
        e.map(1)?.u64(WITNESS_VKEYS)?.array(self.0.len() as u64)?;
        for (vkey, signature) in self.0 {
            e.array(2)?.bytes(vkey)?.bytes(signature)?;
        }
        Ok(())
    }
}

impl<C> CborLen<C> for WitnessSet<'_> {
    fn cbor_len(&self, ctx: &mut C) -> usize {
        if self.0.is_empty() {
            return head_len(0, ctx);
        }
        let each = head_len(2, ctx) + bytes_len(KEY_LEN, ctx) + bytes_len(SIGNATURE_LEN, ctx);
        head_len(1, ctx)
            + WITNESS_VKEYS.cbor_len(ctx)
            + head_len(self.0.len(), ctx)
            + each * self.0.len()
    }
}

fn decode_witness_set(d: &mut Decoder<'_>) -> Result<Vec<VKeyWitness>, decode::Error> {
    let len = d.map()?;
    let mut witnesses = Vec::new();
    let mut seen = 0;
    while has_next(d, len, seen)? {
        if d.u64()? == WITNESS_VKEYS {
            let n = set(d)?;
            let mut count = 0;
            while has_next(d, n, count)? {
                let pair_len = pair(d, "vkey witness")?;
                let vkey = PaymentVerificationKey::from_bytes(&fixed_bytes(d)?).map_err(invalid)?;
                let signature = fixed_bytes(d)?;
                end_pair(d, pair_len, "vkey witness")?;
                witnesses.push(VKeyWitness { vkey, signature });
                count += 1;
            }
        } else {
            d.skip()?;
        }
        seen += 1;
    }
    Ok(witnesses)
}

/// `[body, witness_set, true, null]` around already-encoded body bytes.
struct Envelope<'a> {
    body: &'a [u8],
    witnesses: &'a [RawWitness],
}

impl<C> Encode<C> for Envelope<'_> {
    fn encode<W: Write>(&self, e: &mut Encoder<W>, ctx: &mut C) -> Result<(), encode::Error<W::Error>> {
        e.array(4)?;
        // Spliced verbatim: the id covers these exact bytes.
        e.writer_mut().write_all(self.body).map_err(encode::Error::write)?;
        WitnessSet(self.witnesses).encode(e, ctx)?;
        e.bool(true)?.null()?;
        Ok(())
    }
}

/// Size of a full transaction whose body encodes to `body_len` bytes.
pub(crate) fn envelope_len(body_len: usize, witnesses: &[RawWitness]) -> usize {
    let ctx = &mut ();
    head_len(4, ctx) + body_len + WitnessSet(witnesses).cbor_len(ctx) + true.cbor_len(ctx) + 1
}

fn encode_transaction(body_bytes: &[u8], witnesses: &[RawWitness]) -> Result<Vec<u8>, AdaError> {
    minicbor::to_vec(Envelope {
        body: body_bytes,
        witnesses,
    })
    .map_err(encoding)
}

/// Distinct payment key hashes controlling `inputs`, in ascending order.
pub fn required_signers(inputs: &[Utxo]) -> Result<Vec<[u8; HASH28_LEN]>, AdaError> {
    let mut signers = BTreeSet::new();
    for utxo in inputs {
        match utxo.output.address.payment() {
            Credential::Key(hash) => {
                signers.insert(*hash);
            }
            Credential::Script(_) => {
                return Err(AdaError::InvalidTransaction(format!(
                    "input {} is locked by a script",
                    utxo.input
                )))
            }
        }
    }
    Ok(signers.into_iter().collect())
}

/// A balanced transaction awaiting signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    body: TransactionBody,
    body_bytes: Vec<u8>,
    bytes: Vec<u8>,
    spent: Vec<Utxo>,
    signers: Vec<[u8; HASH28_LEN]>,
}

impl UnsignedTransaction {
    /// Wrap `body`, whose inputs are resolved by `spent`.
    pub fn new(body: TransactionBody, spent: Vec<Utxo>) -> Result<Self, AdaError> {
        let resolved: BTreeSet<_> = spent.iter().map(|u| u.input).collect();
        let referenced: BTreeSet<_> = body.inputs.iter().copied().collect();
        if resolved != referenced
            || referenced.len() != body.inputs.len()
            || spent.len() != body.inputs.len()
        {
            return Err(AdaError::InvalidTransaction(
                "spent outputs do not match body inputs".into(),
            ));
        }
        let signers = required_signers(&spent)?;
        let body_bytes = body.to_cbor()?;
        let bytes = encode_transaction(&body_bytes, &[])?;
        Ok(Self {
            body,
            body_bytes,
            bytes,
            spent,
            signers,
        })
    }

    pub fn body(&self) -> &TransactionBody {
        &self.body
    }

    pub fn body_bytes(&self) -> &[u8] {
        &self.body_bytes
    }

    pub fn id(&self) -> TxId {
        TxId::from_bytes(blake2b_256(&self.body_bytes))
    }

    pub fn fee(&self) -> u64 {
        self.body.fee
    }

    /// Outputs being spent, in input order.
    pub fn spent(&self) -> &[Utxo] {
        &self.spent
    }

    pub fn required_signers(&self) -> &[[u8; HASH28_LEN]] {
        &self.signers
    }

    /// Transaction bytes with an empty witness set, for external signing.
    pub fn to_cbor(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    /// Attach one witness per required signer. Keys that control none of
    /// the inputs are ignored.
    pub fn sign(self, keys: &[&PaymentSigningKey]) -> Result<SignedTransaction, AdaError> {
        let tx_id = self.id();
        let mut witnesses = Vec::with_capacity(self.signers.len());
        for signer in &self.signers {
            let key = keys
                .iter()
                .find(|k| k.verification_key().hash() == *signer)
                .ok_or_else(|| AdaError::MissingSigningKey(hex::encode(signer)))?;
            witnesses.push(key.witness(&tx_id));
        }
        SignedTransaction::assemble(self.body, self.body_bytes, witnesses)
    }
}

/// A transaction ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    body: TransactionBody,
    body_bytes: Vec<u8>,
    witnesses: Vec<VKeyWitness>,
    bytes: Vec<u8>,
}

impl SignedTransaction {
    fn assemble(
        body: TransactionBody,
        body_bytes: Vec<u8>,
        witnesses: Vec<VKeyWitness>,
    ) -> Result<Self, AdaError> {
        let raw: Vec<_> = witnesses.iter().map(VKeyWitness::raw).collect();
        let bytes = encode_transaction(&body_bytes, &raw)?;
        Ok(Self {
            body,
            body_bytes,
            witnesses,
            bytes,
        })
    }

    /// Decode a full transaction, keeping the body bytes exactly as
    /// received so the id matches what the signers signed.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, AdaError> {
        let mut d = Decoder::new(bytes);
        let len = d.array().map_err(malformed)?;
        if !matches!(len, None | Some(3) | Some(4)) {
            return Err(AdaError::Serialization(
                "transaction must have three or four elements".into(),
            ));
        }
        let start = d.position();
        let body: TransactionBody = d.decode().map_err(malformed)?;
        let body_bytes = bytes[start..d.position()].to_vec();
        let witnesses = decode_witness_set(&mut d).map_err(malformed)?;

        let mut seen = 2;
        while has_next(&mut d, len, seen).map_err(malformed)? {
            if seen >= 4 {
                return Err(AdaError::Serialization(
                    "transaction has too many elements".into(),
                ));
            }
            d.skip().map_err(malformed)?;
            seen += 1;
        }
        finish(&d)?;
        Self::assemble(body, body_bytes, witnesses)
    }

    /// Canonical four-element encoding around the original body bytes.
    pub fn to_cbor(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    pub fn id(&self) -> TxId {
        TxId::from_bytes(blake2b_256(&self.body_bytes))
    }

    pub fn body(&self) -> &TransactionBody {
        &self.body
    }

    pub fn witnesses(&self) -> &[VKeyWitness] {
        &self.witnesses
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Check every witness signature against the transaction id.
    pub fn verify_witnesses(&self) -> Result<(), AdaError> {
        let tx_id = self.id();
        match self.witnesses.iter().position(|w| !w.verify(&tx_id)) {
            Some(i) => Err(AdaError::InvalidTransaction(format!(
                "witness {i} does not verify against {tx_id}"
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::AdaNetwork;
    use minicbor::data::Tag;

    fn cbor(
        f: impl FnOnce(&mut Encoder<Vec<u8>>) -> Result<(), encode::Error<Infallible>>,
    ) -> Vec<u8> {
        let mut e = Encoder::new(Vec::new());
        f(&mut e).unwrap();
        e.into_writer()
    }

    fn addr(b: u8) -> Address {
        Address::enterprise(Credential::Key([b; 28]), AdaNetwork::Testnet)
    }

    fn simple_body() -> TransactionBody {
        TransactionBody {
            inputs: vec![TransactionInput::new(TxId::from_bytes([1u8; 32]), 0)],
            outputs: vec![TransactionOutput::new(addr(3), Value::lovelace(2_000_000))],
            fee: 170_000,
            ttl: None,
        }
    }

    fn token(name: &[u8]) -> AssetId {
        AssetId::new([5u8; 28], name.to_vec()).unwrap()
    }

    #[test]
    fn body_encoding_matches_ledger_layout() {
        let mut expected = vec![0xa3, 0x00, 0x81, 0x82, 0x58, 0x20];
        expected.extend_from_slice(&[1u8; 32]);
        expected.extend_from_slice(&[0x00, 0x01, 0x81, 0x82, 0x58, 0x1d, 0x60]);
        expected.extend_from_slice(&[3u8; 28]);
        expected.extend_from_slice(&[0x1a, 0x00, 0x1e, 0x84, 0x80]);
        expected.extend_from_slice(&[0x02, 0x1a, 0x00, 0x02, 0x98, 0x10]);
        assert_eq!(simple_body().to_cbor().unwrap(), expected);
    }

    #[test]
    fn ttl_adds_key_three() {
        let body = TransactionBody {
            ttl: Some(1000),
            ..simple_body()
        };
        let bytes = body.to_cbor().unwrap();
        assert_eq!(bytes[0], 0xa4);
        assert_eq!(&bytes[bytes.len() - 4..], &[0x03, 0x19, 0x03, 0xe8]);
        assert_eq!(TransactionBody::from_cbor(&bytes).unwrap(), body);
    }

    #[test]
    fn multi_asset_value_decodes_to_same_bundle() {
        let assets: MultiAsset = [(token(b"bb"), 1), (token(b"a"), 2), (token(b"ccc"), 3)]
            .into_iter()
            .collect();
        let body = TransactionBody {
            outputs: vec![TransactionOutput::new(addr(3), Value::new(1_500_000, assets))],
            ..simple_body()
        };
        assert_eq!(TransactionBody::from_cbor(&body.to_cbor().unwrap()).unwrap(), body);
    }

    #[test]
    fn computed_lengths_match_encodings() {
        let assets: MultiAsset = [(token(b"bb"), 1), (token(b"a"), 300), (token(b"ccc"), 70_000)]
            .into_iter()
            .collect();
        let body = TransactionBody {
            outputs: vec![
                TransactionOutput::new(addr(3), Value::new(1_500_000, assets)),
                TransactionOutput::new(addr(4), Value::lovelace(23)),
            ],
            ttl: Some(90_000_000),
            ..simple_body()
        };
        let bytes = body.to_cbor().unwrap();
        assert_eq!(body.cbor_len(&mut ()), bytes.len());
        for output in &body.outputs {
            assert_eq!(encoded_output_len(output), minicbor::to_vec(output).unwrap().len());
        }
        let witnesses = vec![([0u8; KEY_LEN], [0u8; SIGNATURE_LEN]); 3];
        assert_eq!(
            envelope_len(bytes.len(), &witnesses),
            encode_transaction(&bytes, &witnesses).unwrap().len()
        );
        assert_eq!(envelope_len(bytes.len(), &[]), encode_transaction(&bytes, &[]).unwrap().len());
    }

    #[test]
    fn asset_names_in_canonical_order() {
        let assets: MultiAsset = [(token(b"bb"), 1), (token(b"a"), 2)].into_iter().collect();
        let bytes = minicbor::to_vec(Value::new(1, assets)).unwrap();
        let a = bytes.windows(2).position(|w| w == [0x41, b'a']).unwrap();
        let bb = bytes.windows(3).position(|w| w == [0x42, b'b', b'b']).unwrap();
        assert!(a < bb);
    }

    #[test]
    fn tx_id_is_blake2b_256_of_body() {
        let body = simple_body();
        assert_eq!(
            body.id().unwrap(),
            TxId::from_bytes(blake2b_256(&body.to_cbor().unwrap()))
        );
    }

    #[test]
    fn decodes_tagged_sets_and_map_outputs() {
        let bytes = cbor(|e| {
            e.map(3)?.u64(0)?.tag(Tag::new(TAG_SET))?.array(1)?;
            e.array(2)?.bytes(&[1u8; 32])?.u64(0)?;
            e.u64(1)?.array(1)?.map(2)?;
            e.u64(0)?.bytes(&addr(3).to_bytes())?.u64(1)?.u64(2_000_000)?;
            e.u64(2)?.u64(170_000)?;
            Ok(())
        });
        let body = TransactionBody::from_cbor(&bytes).unwrap();
        assert_eq!(body, simple_body());
    }

    #[test]
    fn decodes_indefinite_containers() {
        let bytes = cbor(|e| {
            e.begin_map()?.u64(0)?;
            e.begin_array()?.array(2)?.bytes(&[1u8; 32])?.u64(0)?.end()?;
            e.u64(1)?.begin_array()?.encode(&simple_body().outputs[0])?.end()?;
            e.u64(2)?.u64(170_000)?.end()?;
            Ok(())
        });
        let body = TransactionBody::from_cbor(&bytes).unwrap();
        assert_eq!(body, simple_body());
    }

    #[test]
    fn unknown_body_keys_are_skipped() {
        let mut bytes = simple_body().to_cbor().unwrap();
        bytes[0] = 0xa4;
        bytes.extend_from_slice(&[0x08, 0x19, 0x01, 0x00]);
        assert_eq!(TransactionBody::from_cbor(&bytes).unwrap(), simple_body());
    }

    #[test]
    fn missing_fee_is_rejected() {
        let bytes = cbor(|e| {
            e.map(2)?.u64(0)?.array(0)?.u64(1)?.array(0)?;
            Ok(())
        });
        assert!(matches!(
            TransactionBody::from_cbor(&bytes),
            Err(AdaError::Serialization(_))
        ));
    }

    fn unsigned_for(key: &PaymentSigningKey) -> UnsignedTransaction {
        let owner = Address::derive(&key.verification_key(), AdaNetwork::Testnet);
        let input = TransactionInput::new(TxId::from_bytes([1u8; 32]), 0);
        let utxo = Utxo::new(
            input,
            TransactionOutput::new(owner, Value::lovelace(5_000_000)),
        );
        UnsignedTransaction::new(simple_body(), vec![utxo]).unwrap()
    }

    #[test]
    fn sign_produces_verifying_witness() {
        let key = PaymentSigningKey::generate();
        let unsigned = unsigned_for(&key);
        let id = unsigned.id();
        let signed = unsigned.sign(&[&key]).unwrap();
        assert_eq!(signed.id(), id);
        assert_eq!(signed.witnesses().len(), 1);
        signed.verify_witnesses().unwrap();
    }

    #[test]
    fn sign_without_matching_key_fails() {
        let key = PaymentSigningKey::generate();
        let other = PaymentSigningKey::generate();
        let err = unsigned_for(&key).sign(&[&other]).unwrap_err();
        assert!(matches!(err, AdaError::MissingSigningKey(_)));
    }

    #[test]
    fn unsigned_cbor_has_empty_witness_set() {
        let key = PaymentSigningKey::generate();
        let unsigned = unsigned_for(&key);
        let bytes = unsigned.to_cbor();
        let body_len = unsigned.body_bytes().len();
        assert_eq!(bytes[0], 0x84);
        assert_eq!(&bytes[1 + body_len..], &[0xa0, 0xf5, 0xf6]);
    }

    #[test]
    fn signed_transaction_decodes_back() {
        let key = PaymentSigningKey::generate();
        let signed = unsigned_for(&key).sign(&[&key]).unwrap();
        let bytes = signed.to_cbor();
        let decoded = SignedTransaction::from_cbor(&bytes).unwrap();
        assert_eq!(decoded, signed);
        assert_eq!(decoded.to_cbor(), bytes);
        assert_eq!(decoded.size(), bytes.len());
    }

    #[test]
    fn three_element_envelope_is_accepted() {
        let key = PaymentSigningKey::generate();
        let signed = unsigned_for(&key).sign(&[&key]).unwrap();
        let mut bytes = signed.to_cbor();
        // [body, witnesses, true, null] -> [body, witnesses, null]
        bytes[0] = 0x83;
        let len = bytes.len();
        bytes.remove(len - 2);
        let decoded = SignedTransaction::from_cbor(&bytes).unwrap();
        assert_eq!(decoded.id(), signed.id());
        decoded.verify_witnesses().unwrap();
    }

    #[test]
    fn non_canonical_body_keeps_original_id() {
        let key = PaymentSigningKey::generate();
        let signed = unsigned_for(&key).sign(&[&key]).unwrap();
        // Re-encode the body with a tagged input set: same content, new bytes.
        let body_bytes = cbor(|e| {
            e.map(3)?.u64(0)?.tag(Tag::new(TAG_SET))?.array(1)?;
            e.array(2)?.bytes(&[1u8; 32])?.u64(0)?;
            e.u64(1)?.array(1)?.encode(&simple_body().outputs[0])?;
            e.u64(2)?.u64(170_000)?;
            Ok(())
        });
        let tx = encode_transaction(&body_bytes, &[]).unwrap();
        let decoded = SignedTransaction::from_cbor(&tx).unwrap();
        assert_eq!(decoded.body(), signed.body());
        assert_eq!(decoded.id(), TxId::from_bytes(blake2b_256(&body_bytes)));
        assert_ne!(decoded.id(), signed.id());
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let key = PaymentSigningKey::generate();
        let mut signed = unsigned_for(&key).sign(&[&key]).unwrap();
        signed.witnesses[0].signature[0] ^= 0xff;
        assert!(signed.verify_witnesses().is_err());
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let key = PaymentSigningKey::generate();
        let mut bytes = unsigned_for(&key).to_cbor();
        bytes.push(0x00);
        assert!(SignedTransaction::from_cbor(&bytes).is_err());
    }

    #[test]
    fn script_inputs_cannot_be_key_signed() {
        let input = TransactionInput::new(TxId::from_bytes([1u8; 32]), 0);
        let script = Address::enterprise(Credential::Script([4u8; 28]), AdaNetwork::Testnet);
        let utxo = Utxo::new(input, TransactionOutput::new(script, Value::lovelace(1)));
        assert!(matches!(
            UnsignedTransaction::new(simple_body(), vec![utxo]),
            Err(AdaError::InvalidTransaction(_))
        ));
    }

    #[test]
    fn spent_outputs_must_match_inputs() {
        let key = PaymentSigningKey::generate();
        let owner = Address::derive(&key.verification_key(), AdaNetwork::Testnet);
        let wrong = Utxo::new(
            TransactionInput::new(TxId::from_bytes([9u8; 32]), 0),
            TransactionOutput::new(owner, Value::lovelace(1)),
        );
        assert!(UnsignedTransaction::new(simple_body(), vec![wrong]).is_err());
    }
}
