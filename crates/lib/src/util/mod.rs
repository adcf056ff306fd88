//! Shared utilities: short content hashes and test helpers.

pub mod hash;

#[cfg(test)]
pub mod testutil;
