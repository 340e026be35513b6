//! Deterministic per-call random source.
//!
//! Seeded exactly once per top-level call from the chain identifiers
//! `(SCID, BLID, TXID)`, so every node validating the same transaction
//! draws the same sequence. Draws hash the seed together with a counter,
//! which keeps the sequence independent of platform word order and
//! allocator behavior.

use crate::types::key::Key;

/// Deterministic random stream.
#[derive(Clone, Debug)]
pub struct Rnd {
    seed: Key,
    counter: u64,
}

impl Rnd {
    /// Seeds the stream from the chain identifiers of the current call.
    pub fn new(scid: &Key, blid: &Key, txid: &Key) -> Rnd {
        let seed = Key::sha3()
            .chain(scid.as_slice())
            .chain(blid.as_slice())
            .chain(txid.as_slice())
            .finalize();
        Rnd { seed, counter: 0 }
    }

    /// Draws the next 64-bit value.
    pub fn next_u64(&mut self) -> u64 {
        let digest = Key::sha3()
            .chain(self.seed.as_slice())
            .chain(&self.counter.to_le_bytes())
            .finalize();
        self.counter += 1;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest.as_slice()[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Draws a value in `[0, limit)`. `limit` must be nonzero.
    pub fn next_below(&mut self, limit: u64) -> u64 {
        self.next_u64() % limit
    }
}
