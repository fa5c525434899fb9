//! Fixed-Size Arenas
//!
//! A [`Block`] is a fixed-capacity byte buffer with a write cursor that only
//! moves forward, except when the most recent region is given back. Bytes
//! that die anywhere else are counted as `wasted` until a compaction pass
//! moves the live data out and recycles the whole buffer.
//!
//! ```text
//! 0                                   offset                 capacity
//! ├──────── live ──┬─ dead ─┬── live ──┼──────── free ───────────┤
//!                  └ wasted ┘
//! ```

use crate::tree::{tree_size, ValueNode};

/// A freshly reserved region, handed to a bucket operation to fill.
#[derive(Debug)]
pub struct Allocation<'a> {
    pub region: i16,
    pub offset: u32,
    pub data: &'a mut [u8],
}

/// One arena.
pub struct Block {
    index: i16,
    data: Box<[u8]>,
    offset: usize,
    wasted: usize,
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("index", &self.index)
            .field("capacity", &self.data.len())
            .field("offset", &self.offset)
            .field("wasted", &self.wasted)
            .finish()
    }
}

impl Block {
    pub fn new(index: i16, data: Box<[u8]>) -> Self {
        Self {
            index,
            data,
            offset: 0,
            wasted: 0,
        }
    }

    #[inline]
    pub fn index(&self) -> i16 {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: i16) {
        self.index = index;
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes written so far, live or dead.
    #[inline]
    pub fn written(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.offset - self.wasted
    }

    #[inline]
    pub fn left(&self) -> usize {
        self.data.len() - self.offset
    }

    #[inline]
    pub fn wasted(&self) -> usize {
        self.wasted
    }

    /// Reserves `size` bytes, returning their offset, or `None` when full.
    pub fn allocate(&mut self, size: usize) -> Option<u32> {
        if self.offset + size > self.data.len() {
            return None;
        }

        self.offset += size;
        Some((self.offset - size) as u32)
    }

    /// Mutable view over a region returned by [`allocate`](Self::allocate).
    pub fn extract(&mut self, offset: u32, size: usize) -> Allocation<'_> {
        let start = offset as usize;

        Allocation {
            region: self.index,
            offset,
            data: &mut self.data[start..start + size],
        }
    }

    /// Copies `bytes` behind the cursor.
    pub fn append(&mut self, bytes: &[u8]) -> Option<u32> {
        let offset = self.allocate(bytes.len())?;
        self.extract(offset, bytes.len()).data.copy_from_slice(bytes);
        Some(offset)
    }

    pub fn bytes(&self, offset: u32, length: usize) -> &[u8] {
        let start = offset as usize;
        &self.data[start..start + length]
    }

    /// The exact bytes of the bucket stored at `offset`.
    pub fn tree(&self, offset: u32) -> &[u8] {
        let start = offset as usize;
        let size = tree_size(&self.data[start..]);
        &self.data[start..start + size]
    }

    /// Replaces bytes in place without any accounting.
    pub fn write(&mut self, offset: u32, bytes: &[u8]) {
        let start = offset as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Rewrites a value with one that is not longer; the difference is wasted.
    pub fn overwrite(&mut self, node: ValueNode, value: &[u8]) {
        assert!(
            value.len() <= node.len(),
            "in-place overwrite of {} bytes with {} bytes",
            node.len(),
            value.len()
        );

        self.wasted += node.len() - value.len();
        self.write(node.offset, value);
    }

    /// Gives a region back; the tail region is reclaimed, anything else is wasted.
    pub fn remove(&mut self, offset: u32, length: usize) {
        let start = offset as usize;
        debug_assert!(start + length <= self.offset);

        if start + length == self.offset {
            self.offset = start;
        } else {
            self.wasted += length;
        }
    }

    /// Forgets every region, keeping the buffer.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.wasted = 0;
    }

    pub fn into_data(self) -> Box<[u8]> {
        self.data
    }
}
