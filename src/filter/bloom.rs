//! Bloom filter
//!
//! Plain bit-array Bloom filter. No removal: clearing a bit could erase
//! other keys that hash onto it.

use bitvec::prelude::*;

use super::hash::bit_positions;
use super::params::IndexParams;

/// Bit-array Bloom filter over byte strings
#[derive(Clone, Debug)]
pub struct BloomFilter {
    /// Filter state, m bits
    bits: BitVec<u64, Lsb0>,
    /// Size in bits (m)
    m: u64,
    /// Number of hash functions (k)
    k: u32,
    /// Insert calls so far, duplicates included
    inserted: u64,
}

impl BloomFilter {
    /// Allocate an empty filter sized by `params`
    pub fn with_params(params: &IndexParams) -> Self {
        Self::new(params.size_bits(), params.hash_count())
    }

    /// Allocate an empty filter of `m` bits and `k` hashes
    pub fn new(m: u64, k: u32) -> Self {
        let m = m.max(1);
        Self {
            bits: bitvec![u64, Lsb0; 0; m as usize],
            m,
            k: k.max(1),
            inserted: 0,
        }
    }

    /// Add a key. Inserting the same key twice sets the same bits.
    pub fn insert(&mut self, key: &[u8]) {
        for pos in bit_positions(key, self.k, self.m) {
            self.bits.set(pos, true);
        }
        self.inserted += 1;
    }

    /// `false` means the key was never inserted
    pub fn contains(&self, key: &[u8]) -> bool {
        bit_positions(key, self.k, self.m).all(|pos| self.bits[pos])
    }

    /// Number of bits currently set
    pub fn bits_set(&self) -> u64 {
        self.bits.count_ones() as u64
    }

    pub fn size_bits(&self) -> u64 {
        self.m
    }

    pub fn hash_count(&self) -> u32 {
        self.k
    }

    pub fn inserted(&self) -> u64 {
        self.inserted
    }

    /// Heap footprint of the bit array
    pub fn memory_bytes(&self) -> usize {
        self.bits.as_raw_slice().len() * std::mem::size_of::<u64>()
    }

    /// Current false-positive rate from the observed fill ratio: `(set / m)^k`
    pub fn fill_fpr(&self) -> f64 {
        let ratio = self.bits_set() as f64 / self.m as f64;
        ratio.powi(self.k as i32)
    }
}
