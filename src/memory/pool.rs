//! Recycled arena buffers.

use std::collections::VecDeque;

/// Queue of arena-sized buffers freed by compaction.
#[derive(Debug)]
pub struct MemoryPool {
    arena_size: usize,
    free: VecDeque<Box<[u8]>>,
}

impl MemoryPool {
    pub fn new(arena_size: usize) -> Self {
        Self {
            arena_size,
            free: VecDeque::new(),
        }
    }

    #[inline]
    pub fn arena_size(&self) -> usize {
        self.arena_size
    }

    /// Hands out a recycled buffer, or a new zeroed one.
    pub fn acquire(&mut self) -> Box<[u8]> {
        self.free
            .pop_front()
            .unwrap_or_else(|| vec![0u8; self.arena_size].into_boxed_slice())
    }

    pub fn release(&mut self, data: Box<[u8]>) {
        debug_assert_eq!(data.len(), self.arena_size);
        self.free.push_back(data);
    }

    /// Number of buffers waiting for reuse.
    pub fn pooled(&self) -> usize {
        self.free.len()
    }

    pub fn size_in_bytes(&self) -> u64 {
        (self.arena_size * self.free.len()) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffers_are_recycled() {
        let mut pool = MemoryPool::new(128);

        let mut data = pool.acquire();
        assert_eq!(data.len(), 128);
        assert_eq!(pool.pooled(), 0);

        data[0] = 42;
        pool.release(data);
        assert_eq!(pool.pooled(), 1);
        assert_eq!(pool.size_in_bytes(), 128);

        let again = pool.acquire();
        assert_eq!(again[0], 42);
        assert_eq!(pool.pooled(), 0);
    }
}
