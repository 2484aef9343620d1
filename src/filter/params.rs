//! Filter sizing
//!
//! Formulas:
//! - m = ceil(-n * ln(p) / (ln 2)^2)   -- bits
//! - k = round((m / n) * ln 2)         -- hash functions
//! - FPR(m, n, k) = (1 - e^(-kn/m))^k

use std::f64::consts::LN_2;

use crate::error::{Result, SieveError};

/// Largest bit array a build may allocate (4 GiB of bits)
pub const MAX_FILTER_BITS: u64 = 1 << 35;

/// Upper bound on hash functions per key
pub const MAX_HASH_COUNT: u32 = 32;

/// Validated build parameters for a membership index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexParams {
    expected_count: u64,
    false_positive_rate: f64,
    size_bits: u64,
    hash_count: u32,
}

impl IndexParams {
    /// Validate `(n, p)` and derive `(m, k)`
    ///
    /// Rejects `n == 0`, `p` outside the open interval (0, 1), and sizes above
    /// [`MAX_FILTER_BITS`]. Nothing is allocated here.
    pub fn new(expected_count: u64, false_positive_rate: f64) -> Result<Self> {
        if expected_count == 0 {
            return Err(SieveError::Config(
                "expected_count must be greater than zero".to_string(),
            ));
        }

        if !false_positive_rate.is_finite()
            || false_positive_rate <= 0.0
            || false_positive_rate >= 1.0
        {
            return Err(SieveError::Config(format!(
                "false_positive_rate must be in (0, 1), got {}",
                false_positive_rate
            )));
        }

        let n = expected_count as f64;
        let m = (-n * false_positive_rate.ln() / (LN_2 * LN_2)).ceil();

        if m > MAX_FILTER_BITS as f64 {
            return Err(SieveError::Config(format!(
                "filter for {} keys at p={} needs {} bits (max {})",
                expected_count, false_positive_rate, m, MAX_FILTER_BITS
            )));
        }

        let size_bits = (m as u64).max(1);
        let k = ((size_bits as f64 / n) * LN_2).round() as u32;

        Ok(Self {
            expected_count,
            false_positive_rate,
            size_bits,
            hash_count: k.clamp(1, MAX_HASH_COUNT),
        })
    }

    pub fn expected_count(&self) -> u64 {
        self.expected_count
    }

    pub fn false_positive_rate(&self) -> f64 {
        self.false_positive_rate
    }

    /// Bit array size (m)
    pub fn size_bits(&self) -> u64 {
        self.size_bits
    }

    /// Number of hash functions (k)
    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    /// Predicted false-positive rate once `expected_count` keys are inserted
    pub fn predicted_fpr(&self) -> f64 {
        estimate_fpr(self.size_bits, self.expected_count, self.hash_count)
    }
}

/// False-positive rate for `n` keys in `m` bits with `k` hashes
pub fn estimate_fpr(m: u64, n: u64, k: u32) -> f64 {
    if m == 0 {
        return 1.0;
    }
    let exponent = -(k as f64) * (n as f64) / (m as f64);
    (1.0 - exponent.exp()).powi(k as i32)
}
