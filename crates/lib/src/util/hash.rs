//! Hashing helpers.
//!
//! Target identifiers embed a short digest of the directory a target was
//! declared in so that identically named targets in different directories do
//! not collide, while the identifier stays readable.

use sha2::{Digest, Sha256};

/// Full lowercase hex SHA-256 of `data`.
pub fn hash_bytes(data: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(data);
  hex::encode(hasher.finalize())
}

/// The first `len` hex characters of the SHA-256 of `text`.
pub fn short_hash(text: &str, len: usize) -> String {
  let mut full = hash_bytes(text.as_bytes());
  full.truncate(len);
  full
}
