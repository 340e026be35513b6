//! 32-byte chain identifier type.
//!
//! `Key` carries the identifiers a contract call receives from the chain:
//! the contract id (SCID), the block id (BLID) and the transaction id (TXID).
//! It doubles as the output type of the incremental SHA3-256 builder used for
//! random-source seeding and digest internal functions.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt;

/// Chain identifier length in bytes.
pub const KEY_LEN: usize = 32;

/// Fixed-size 32-byte chain identifier.
///
/// This type is `Copy` - identifiers are read on every random draw and
/// should live on the stack rather than behind a reference.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Key(pub [u8; KEY_LEN]);

impl Key {
    /// Creates a zero-valued key (all bytes are 0x00).
    ///
    /// Used as a sentinel for test calls that have no real chain context.
    pub const fn zero() -> Key {
        Key([0u8; KEY_LEN])
    }

    /// Returns the key as a byte slice.
    pub const fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Creates a key from a byte slice.
    ///
    /// Returns `None` if the slice length is not exactly [`KEY_LEN`] bytes.
    pub fn from_slice(slice: &[u8]) -> Option<Key> {
        if slice.len() != KEY_LEN {
            return None;
        }
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(slice);
        Some(Key(bytes))
    }

    /// Parses a key from its lowercase or uppercase hex rendering.
    pub fn from_hex(text: &str) -> Option<Key> {
        let bytes = hex::decode(text).ok()?;
        Key::from_slice(&bytes)
    }

    /// Creates a new SHA3-256 builder for incremental hashing.
    pub fn sha3() -> KeyBuilder {
        KeyBuilder::new()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self)
    }
}

/// Incremental SHA3-256 builder producing a [`Key`].
pub struct KeyBuilder {
    hasher: Sha3_256,
}

impl KeyBuilder {
    /// Creates a new builder with empty input.
    pub fn new() -> Self {
        Self {
            hasher: Sha3_256::new(),
        }
    }

    /// Feeds data into the hash computation.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn chain(mut self, data: &[u8]) -> Self {
        self.hasher.update(data);
        self
    }

    /// Consumes the builder and returns the final key.
    pub fn finalize(self) -> Key {
        Key(self.hasher.finalize().into())
    }
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
