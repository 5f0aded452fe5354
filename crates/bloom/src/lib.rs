//! # Bloom Filter
//!
//! A space-efficient probabilistic data structure for set membership testing.
//!
//! A bloom filter can tell you with certainty that a key is **not** in the set
//! (no false negatives), but may occasionally report that a key **is** in the
//! set when it isn't (false positives). The false positive rate depends on the
//! number of bits and hash functions used.
//!
//! ## Usage
//!
//! Every sorted run gets a filter built over its keys, persisted as the
//! run's `.filter` file. Only the raw bitset is written: the byte length and
//! the number of hash functions are not stored, so whoever loads the filter
//! must already know `k` (it comes from configuration).
//!
//! ## Hashing
//!
//! Hash function `i` (for `i` in `0..k`) is FNV-1a 64 over the 8-byte
//! little-endian encoding of `i` followed by the key. The bit index is that
//! hash modulo the number of bits; bit `b` lives in byte `b / 8` at position
//! `b % 8`, least significant bit first.
//!
//! ## Example
//!
//! ```rust
//! use bloom::BloomFilter;
//!
//! let mut bf = BloomFilter::new(1024, 3);
//! bf.add(b"hello");
//! assert!(bf.might_contain(b"hello"));
//! ```
use std::fs;
use std::io;
use std::path::Path;

/// A bloom filter backed by a byte-addressed bit vector with `k` seeded hash
/// functions.
#[derive(Clone, PartialEq, Eq)]
pub struct BloomFilter {
    /// The bit vector storing the filter state.
    bits: Vec<u8>,
    /// Number of hash functions (k).
    num_hashes: u32,
}

impl BloomFilter {
    /// Creates an empty filter of `m_bytes` bytes using `k` hash functions.
    ///
    /// # Panics
    ///
    /// Panics if `m_bytes` or `k` is 0.
    pub fn new(m_bytes: usize, k: u32) -> Self {
        assert!(m_bytes > 0, "m_bytes must be > 0");
        assert!(k > 0, "k must be > 0");
        Self {
            bits: vec![0u8; m_bytes],
            num_hashes: k,
        }
    }

    /// Rebuilds a filter from a persisted bitset.
    ///
    /// # Panics
    ///
    /// Panics if `bits` is empty or `k` is 0.
    pub fn from_bytes(bits: Vec<u8>, k: u32) -> Self {
        assert!(!bits.is_empty(), "m_bytes must be > 0");
        assert!(k > 0, "k must be > 0");
        Self {
            bits,
            num_hashes: k,
        }
    }

    /// Loads the bitset written by [`save`](BloomFilter::save).
    ///
    /// Returns `InvalidData` for an empty file.
    pub fn load<P: AsRef<Path>>(path: P, k: u32) -> io::Result<Self> {
        let bits = fs::read(path)?;
        if bits.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "bloom filter file is empty",
            ));
        }
        Ok(Self::from_bytes(bits, k))
    }

    /// Inserts a key into the bloom filter.
    pub fn add(&mut self, key: &[u8]) {
        for seed in 0..self.num_hashes {
            let bit_idx = self.bit_index(key, seed);
            self.set_bit(bit_idx);
        }
    }

    /// Returns `true` if the key **might** be in the set, `false` if it is
    /// **definitely not** in the set.
    #[must_use]
    pub fn might_contain(&self, key: &[u8]) -> bool {
        (0..self.num_hashes).all(|seed| self.get_bit(self.bit_index(key, seed)))
    }

    /// Writes the raw bitset to `path`, replacing any existing file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        fs::write(path, &self.bits)
    }

    /// The raw bitset, exactly as [`save`](BloomFilter::save) writes it.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Returns the number of bits in the filter.
    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.bits.len() as u64 * 8
    }

    /// Returns the number of hash functions.
    #[must_use]
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    // ---- Internal helpers ----

    fn bit_index(&self, key: &[u8], seed: u32) -> u64 {
        seeded_fnv1a_64(key, u64::from(seed)) % self.num_bits()
    }

    fn set_bit(&mut self, idx: u64) {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = (idx % 8) as u8;
        self.bits[byte_idx] |= 1 << bit_offset;
    }

    fn get_bit(&self, idx: u64) -> bool {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = (idx % 8) as u8;
        (self.bits[byte_idx] >> bit_offset) & 1 == 1
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits())
            .field("num_hashes", &self.num_hashes)
            .field("bytes", &self.bits.len())
            .finish()
    }
}

/// FNV-1a 64-bit hash of `seed.to_le_bytes() ‖ data`.
fn seeded_fnv1a_64(data: &[u8], seed: u64) -> u64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x00000100000001b3;
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in seed.to_le_bytes().iter().chain(data) {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests;
