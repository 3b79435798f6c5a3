//! Bloom filter backing the admission filter
//!
//! A plain bit-vector filter with `k` probe positions derived from two
//! seeded hashes (Kirsch-Mitzenmacher double hashing). Guarantees no false
//! negatives for keys inserted into this instance; false positives occur at
//! the usual `(1 - e^(-kn/m))^k` rate.

use ahash::RandomState;

// Fixed seeds keep probe positions stable across filter rebuilds.
const SEED_A: (u64, u64, u64, u64) = (
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
);
const SEED_B: (u64, u64, u64, u64) = (
    0x4528_21e6_38d0_1377,
    0xbe54_66cf_34e9_0c6c,
    0xc0ac_29b7_c97c_50dd,
    0x3f84_d5b5_b547_0917,
);

pub(crate) struct Bloom {
    words: Vec<u64>,
    bits: u64,
    hashes: u32,
    /// Count of set bits, for cardinality and FPR estimates
    ones: u64,
    h1: RandomState,
    h2: RandomState,
}

impl std::fmt::Debug for Bloom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bloom")
            .field("bits", &self.bits)
            .field("hashes", &self.hashes)
            .field("ones", &self.ones)
            .finish()
    }
}

impl Bloom {
    pub(crate) fn new(bits: u64, hashes: u32) -> Self {
        let bits = bits.max(1);
        let words = vec![0u64; bits.div_ceil(64) as usize];
        Self {
            words,
            bits,
            hashes,
            ones: 0,
            h1: RandomState::with_seeds(SEED_A.0, SEED_A.1, SEED_A.2, SEED_A.3),
            h2: RandomState::with_seeds(SEED_B.0, SEED_B.1, SEED_B.2, SEED_B.3),
        }
    }

    pub(crate) fn insert(&mut self, key: &str) {
        let (h1, h2) = self.probe_pair(key);
        for i in 0..self.hashes {
            let bit = self.position(h1, h2, i);
            let word = (bit / 64) as usize;
            let mask = 1u64 << (bit % 64);
            if self.words[word] & mask == 0 {
                self.words[word] |= mask;
                self.ones += 1;
            }
        }
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        let (h1, h2) = self.probe_pair(key);
        (0..self.hashes).all(|i| {
            let bit = self.position(h1, h2, i);
            self.words[(bit / 64) as usize] & (1u64 << (bit % 64)) != 0
        })
    }

    /// Bit capacity `m`.
    pub(crate) fn capacity(&self) -> u64 {
        self.bits
    }

    pub(crate) fn hashes(&self) -> u32 {
        self.hashes
    }

    /// Estimated element count from the set-bit fraction:
    /// `n ≈ -(m/k) * ln(1 - X/m)` with `X` set bits.
    pub(crate) fn approximate_len(&self) -> u64 {
        if self.ones == 0 {
            return 0;
        }
        if self.ones >= self.bits {
            return self.bits;
        }
        let m = self.bits as f64;
        let k = self.hashes as f64;
        let fill = self.ones as f64 / m;
        (-(m / k) * (1.0 - fill).ln()).round() as u64
    }

    /// Estimated false positive rate at the current fill level.
    pub(crate) fn false_positive_rate(&self) -> f64 {
        let n = self.approximate_len();
        if self.bits == 0 || n == 0 {
            return 0.0;
        }
        let k = self.hashes as f64;
        let exponent = -(k * n as f64) / self.bits as f64;
        (1.0 - exponent.exp()).powf(k)
    }

    fn probe_pair(&self, key: &str) -> (u64, u64) {
        (self.h1.hash_one(key), self.h2.hash_one(key))
    }

    fn position(&self, h1: u64, h2: u64, i: u32) -> u64 {
        h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_keys_are_always_present() {
        let mut bloom = Bloom::new(4096, 4);
        for i in 0..200 {
            bloom.insert(&format!("key-{}", i));
        }
        for i in 0..200 {
            assert!(bloom.contains(&format!("key-{}", i)));
        }
    }

    #[test]
    fn empty_filter_contains_nothing() {
        let bloom = Bloom::new(4096, 4);
        assert!(!bloom.contains("anything"));
        assert_eq!(bloom.approximate_len(), 0);
        assert_eq!(bloom.false_positive_rate(), 0.0);
    }

    #[test]
    fn cardinality_estimate_is_in_the_right_range() {
        let mut bloom = Bloom::new(16384, 4);
        for i in 0..500 {
            bloom.insert(&format!("key-{}", i));
        }
        let estimate = bloom.approximate_len();
        assert!((400..=600).contains(&estimate), "estimate {}", estimate);
    }

    #[test]
    fn fpr_grows_with_fill() {
        let mut bloom = Bloom::new(1024, 4);
        bloom.insert("a");
        let sparse = bloom.false_positive_rate();
        for i in 0..400 {
            bloom.insert(&format!("key-{}", i));
        }
        assert!(bloom.false_positive_rate() > sparse);
    }
}
