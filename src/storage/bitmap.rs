//! Stable-Index Descriptor Storage
//!
//! Bucket descriptors are stored in fixed-size chunks and addressed by a
//! 32-bit index that never changes for the life of the table; relocating a
//! bucket rewrites the descriptor behind its index. Index `0` is reserved so
//! the directory can use it as "empty".

use crate::tree::TreeNode;

const CHUNK_BITS: u32 = 16;
const CHUNK_SIZE: usize = 1 << CHUNK_BITS;
const CHUNK_MASK: u32 = (CHUNK_SIZE - 1) as u32;

#[derive(Debug)]
pub struct TreeNodeBitmap {
    chunks: Vec<Box<[TreeNode]>>,
    next: u32,
}

impl Default for TreeNodeBitmap {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeNodeBitmap {
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            next: 1,
        }
    }

    /// Reserves a new descriptor index.
    pub fn allocate(&mut self) -> u32 {
        let index = self.next;
        let chunk = (index >> CHUNK_BITS) as usize;

        if chunk >= self.chunks.len() {
            self.chunks
                .push(vec![TreeNode::default(); CHUNK_SIZE].into_boxed_slice());
        }

        self.next += 1;
        index
    }

    pub fn get(&self, index: u32) -> TreeNode {
        debug_assert!(index != 0 && index < self.next);
        self.chunks[(index >> CHUNK_BITS) as usize][(index & CHUNK_MASK) as usize]
    }

    pub fn set(&mut self, index: u32, node: TreeNode) {
        debug_assert!(index != 0 && index < self.next);
        self.chunks[(index >> CHUNK_BITS) as usize][(index & CHUNK_MASK) as usize] = node;
    }

    pub fn size_in_bytes(&self) -> u64 {
        (self.chunks.len() * CHUNK_SIZE * std::mem::size_of::<TreeNode>()) as u64
    }
}
