//! Blake2b digests used by the ledger: 224-bit for key and script hashes,
//! 256-bit for transaction ids.

/// Length of a verification-key or script hash.
pub const HASH28_LEN: usize = 28;

/// Length of a transaction id.
pub const HASH32_LEN: usize = 32;

/// Blake2b-224 digest.
pub fn blake2b_224(data: &[u8]) -> [u8; HASH28_LEN] {
    let hash = blake2b_simd::Params::new().hash_length(HASH28_LEN).hash(data);
    let mut out = [0u8; HASH28_LEN];
    out.copy_from_slice(hash.as_bytes());
    out
}

/// Blake2b-256 digest.
pub fn blake2b_256(data: &[u8]) -> [u8; HASH32_LEN] {
    let hash = blake2b_simd::Params::new().hash_length(HASH32_LEN).hash(data);
    let mut out = [0u8; HASH32_LEN];
    out.copy_from_slice(hash.as_bytes());
    out
}
