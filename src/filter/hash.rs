//! Bit position hashing
//!
//! One MurmurHash3 x64/128 pass per key; the two 64-bit halves drive
//! Kirsch–Mitzenmacher double hashing: `pos(i) = (h1 + i * h2) mod m`.

use std::io::Cursor;

/// Seed shared by every filter so positions are stable across rebuilds
const SEED: u32 = 0x5eed_7a11;

/// Split a key into the two base hashes
#[inline]
pub fn base_hashes(key: &[u8]) -> (u64, u64) {
    // Reading from an in-memory cursor cannot fail
    let hash = murmur3::murmur3_x64_128(&mut Cursor::new(key), SEED).unwrap_or(0);
    let h1 = hash as u64;
    // Odd step so consecutive probes never collapse onto one position
    let h2 = ((hash >> 64) as u64) | 1;
    (h1, h2)
}

/// Iterator over the `k` bit positions of `key` in a filter of `m` bits
#[inline]
pub fn bit_positions(key: &[u8], k: u32, m: u64) -> impl Iterator<Item = usize> {
    let (h1, h2) = base_hashes(key);
    (0..k as u64).map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % m) as usize)
}
