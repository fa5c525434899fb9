//! Directory Hashing
//!
//! [`Hasher`] maps key bytes to a directory slot and carries the directory
//! depth. The hash is FNV-1a followed by an avalanche finalizer, computed in
//! wrapping signed 32-bit arithmetic and folded to a non-negative slot.

const OFFSET_BASIS: i32 = 2166136261u32 as i32;
const PRIME: i32 = 16777619;

/// Slot hash for a directory of `2^level` slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hasher {
    level: u32,
    maximum: u32,
    value: usize,
}

impl Hasher {
    pub fn new(level: u32, maximum: u32) -> Self {
        debug_assert!(level >= 1 && level <= maximum);

        Self {
            level,
            maximum,
            value: (1usize << level) - 1,
        }
    }

    #[inline]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Number of directory slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        1 << self.level
    }

    /// The bit separating slot `i` from its mirror `i + capacity / 2`.
    #[inline]
    pub fn mask(&self) -> usize {
        1 << (self.level - 1)
    }

    /// The hasher one level deeper, capped at the maximum.
    pub fn next(&self) -> Self {
        Self::new((self.level + 1).min(self.maximum), self.maximum)
    }

    #[inline]
    pub fn is_maximum(&self) -> bool {
        self.level >= self.maximum
    }

    pub fn hash(&self, data: &[u8]) -> usize {
        let mut hash = OFFSET_BASIS;

        for &byte in data {
            hash = (hash ^ byte as i32).wrapping_mul(PRIME);
        }

        hash = hash.wrapping_add(hash << 13);
        hash ^= hash >> 7;
        hash = hash.wrapping_add(hash << 3);
        hash ^= hash >> 17;
        hash = hash.wrapping_add(hash << 5);

        let positive = if hash >= 0 { hash } else { hash.wrapping_neg() };
        positive as u32 as usize & self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        let hasher = Hasher::new(4, 6);
        assert_eq!(hasher.capacity(), 16);
        assert_eq!(hasher.mask(), 8);
        assert!(!hasher.is_maximum());

        let hasher = hasher.next().next();
        assert_eq!(hasher.level(), 6);
        assert_eq!(hasher.capacity(), 64);
        assert_eq!(hasher.mask(), 32);
        assert!(hasher.is_maximum());

        assert_eq!(hasher.next(), hasher);
    }

    #[test]
    fn test_known_slots() {
        let hasher = Hasher::new(4, 4);

        assert_eq!(hasher.hash(&[10, 11, 12]), 11);
        assert_eq!(hasher.hash(&[20, 21, 22, 23]), 1);
        assert_eq!(hasher.hash(&[30, 31, 32, 33, 34, 35, 36]), 8);
        assert_eq!(hasher.hash(&[1, 2]), 15);
        assert_eq!(hasher.hash(&[20, 30, 40]), 14);
    }

    #[test]
    fn test_slot_is_low_bits_of_deeper_slot() {
        let narrow = Hasher::new(4, 10);
        let wide = Hasher::new(10, 10);

        for i in 0..1000u32 {
            let key = i.to_le_bytes();
            assert_eq!(wide.hash(&key) & 15, narrow.hash(&key));
        }
    }

    #[test]
    fn test_uniformity() {
        let hasher = Hasher::new(24, 24);
        let mut counts = vec![0u8; hasher.capacity()];

        for i in 0..hasher.capacity() {
            let key = [(i >> 16) as u8, (i >> 8) as u8, i as u8];
            let slot = hasher.hash(&key);
            counts[slot] = counts[slot].saturating_add(1);
        }

        let max = counts.iter().copied().max().unwrap_or(0);
        assert!(max <= 10, "most loaded slot received {} keys", max);
    }
}
