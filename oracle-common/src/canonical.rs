//! Byte-exact canonical encoding for `SubmitDataSet` signing.
//!
//! The source material defers to a protobuf helper for this; this rewrite pins a
//! concrete, dependency-free layout instead: each field is length-prefixed (fixed
//! 8-byte big-endian integers, 4-byte big-endian length prefixes for strings), in
//! declaration order, with the `signature` field excluded. The resulting bytes
//! are SHA-256 hashed before signing.

use sha2::{Digest, Sha256};

use crate::types::SubmitDataSet;

/// The message actually signed: SHA-256 of the canonical encoding of `dataset`
/// with its `signature` field excluded.
pub fn signing_hash(dataset: &SubmitDataSet) -> [u8; 32] {
    let bytes = canonical_bytes(dataset);
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hasher.finalize().into()
}

fn canonical_bytes(dataset: &SubmitDataSet) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + dataset.provider.len() + dataset.raw_data.len());
    buf.extend_from_slice(&dataset.request_id.to_be_bytes());
    buf.extend_from_slice(&dataset.nonce.to_be_bytes());
    write_length_prefixed(&mut buf, dataset.provider.as_bytes());
    write_length_prefixed(&mut buf, dataset.raw_data.as_bytes());
    buf
}

fn write_length_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}
