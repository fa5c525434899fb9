//! Bucket and Value Descriptors
//!
//! A descriptor tells the memory manager where a run of bytes lives. The
//! `region` field selects the tier:
//!
//! ```text
//! region >= 0            memory arena `region`
//! region == active id    the spill buffer currently being written
//! region <  0 otherwise  sealed spill file `-region - 1`
//! ```
//!
//! Value descriptors are stored inside buckets, so their 8-byte wire layout
//! is fixed (all fields little-endian):
//!
//! ```text
//! 0..2   region  i16
//! 2..6   offset  u32
//! 6..8   length  u16
//! ```

/// Encoded size of a [`ValueNode`].
pub const DESCRIPTOR_SIZE: usize = 8;

/// Keys carry a one-byte length.
pub const MAX_KEY_LENGTH: usize = u8::MAX as usize;

/// Values carry a 16-bit length.
pub const MAX_VALUE_LENGTH: usize = u16::MAX as usize;

/// Buckets carry a one-byte link count.
pub const MAX_LINKS: usize = u8::MAX as usize;

/// Location of one value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValueNode {
    pub region: i16,
    pub offset: u32,
    pub length: u16,
}

impl ValueNode {
    /// Decodes a descriptor from the first 8 bytes of `src`.
    #[inline]
    pub fn read(src: &[u8]) -> Self {
        Self {
            region: i16::from_le_bytes([src[0], src[1]]),
            offset: u32::from_le_bytes([src[2], src[3], src[4], src[5]]),
            length: u16::from_le_bytes([src[6], src[7]]),
        }
    }

    /// Encodes the descriptor into the first 8 bytes of `dst`.
    #[inline]
    pub fn write(&self, dst: &mut [u8]) {
        dst[0..2].copy_from_slice(&self.region.to_le_bytes());
        dst[2..6].copy_from_slice(&self.offset.to_le_bytes());
        dst[6..8].copy_from_slice(&self.length.to_le_bytes());
    }

    #[inline]
    pub fn in_memory(&self) -> bool {
        self.region >= 0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.length as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Location of one bucket plus its read counter.
///
/// The bucket length is not stored; it is recovered from the bucket header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeNode {
    pub region: i16,
    pub offset: u32,
    /// Reads since the last maintenance pass
    pub accessed: u16,
}

impl TreeNode {
    pub fn new(region: i16, offset: u32) -> Self {
        Self {
            region,
            offset,
            accessed: 0,
        }
    }

    #[inline]
    pub fn in_memory(&self) -> bool {
        self.region >= 0
    }

    /// Records one read, saturating at `u16::MAX`.
    #[inline]
    pub fn touch(&mut self) {
        self.accessed = self.accessed.saturating_add(1);
    }
}
