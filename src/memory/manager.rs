//! Memory Manager
//!
//! Owns every arena, the spill builder and the sealed spill files, and is
//! the only component that turns a descriptor `(region, offset)` into bytes.
//!
//! Running totals of declared, used and wasted arena bytes are kept up to
//! date on every mutation so that the table can check its memory ceiling
//! after each write without walking the arenas.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::{StoreError, StoreResult};
use crate::memory::block::{Allocation, Block};
use crate::memory::pool::MemoryPool;
use crate::memory::spill::{file_of, region_of, SpillBuilder, SpillFile};
use crate::tree::{TreeNode, ValueNode};

/// Where a region id points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Residence {
    Memory(usize),
    Active,
    Sealed(usize),
}

/// Snapshot of memory accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryInfo {
    /// Capacity of all live arenas.
    pub declared: u64,
    /// Live bytes inside arenas.
    pub used: u64,
    /// Dead bytes inside arenas, reclaimable by compaction.
    pub wasted: u64,
    /// Buffers held by the pool for reuse.
    pub pooled: u64,
    /// Bytes written to sealed spill files.
    pub spilled: u64,
    /// Bytes waiting in the spill builder.
    pub buffered: u64,
    pub arenas: usize,
    pub files: usize,
}

/// Arenas detached by [`MemoryManager::evolve`], still readable until the
/// pass that relocates their live data hands them back.
#[derive(Debug, Default)]
pub struct Evolution {
    abandoned: HashMap<i16, Block>,
}

impl Evolution {
    pub fn contains(&self, region: i16) -> bool {
        self.abandoned.contains_key(&region)
    }

    pub fn len(&self) -> usize {
        self.abandoned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.abandoned.is_empty()
    }

    pub fn value(&self, node: ValueNode) -> &[u8] {
        self.block(node.region).bytes(node.offset, node.len())
    }

    pub fn tree(&self, node: TreeNode) -> &[u8] {
        self.block(node.region).tree(node.offset)
    }

    fn block(&self, region: i16) -> &Block {
        self.abandoned
            .get(&region)
            .unwrap_or_else(|| panic!("arena {} is not part of this evolution", region))
    }
}

pub struct MemoryManager {
    pool: MemoryPool,
    blocks: Vec<Option<Block>>,
    vacant: Vec<usize>,
    available: usize,
    builder: SpillBuilder,
    files: Vec<SpillFile>,
    declared: u64,
    used: u64,
    wasted: u64,
    spilled: u64,
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("arena_size", &self.pool.arena_size())
            .field("arenas", &self.arenas())
            .field("declared", &self.declared)
            .field("used", &self.used)
            .field("wasted", &self.wasted)
            .field("spill_files", &self.files.len())
            .finish()
    }
}

fn slot(blocks: &[Option<Block>], index: usize) -> &Block {
    blocks
        .get(index)
        .and_then(Option::as_ref)
        .unwrap_or_else(|| panic!("descriptor points at retired arena {}", index))
}

fn slot_mut(blocks: &mut [Option<Block>], index: usize) -> &mut Block {
    blocks
        .get_mut(index)
        .and_then(Option::as_mut)
        .unwrap_or_else(|| panic!("descriptor points at retired arena {}", index))
}

impl MemoryManager {
    /// Creates a manager with one empty arena and an empty spill builder
    /// writing under `path`.
    pub fn new(path: impl Into<PathBuf>, arena_size: usize) -> Self {
        let mut pool = MemoryPool::new(arena_size);
        let builder = SpillBuilder::new(region_of(0) as i16, pool.acquire(), path);
        let first = Block::new(0, pool.acquire());

        Self {
            pool,
            blocks: vec![Some(first)],
            vacant: Vec::new(),
            available: 0,
            builder,
            files: Vec::new(),
            declared: arena_size as u64,
            used: 0,
            wasted: 0,
            spilled: 0,
        }
    }

    #[inline]
    pub fn arena_size(&self) -> usize {
        self.pool.arena_size()
    }

    /// Total capacity of the live arenas.
    #[inline]
    pub fn declared_memory(&self) -> u64 {
        self.declared
    }

    #[inline]
    pub fn used_memory(&self) -> u64 {
        self.used
    }

    #[inline]
    pub fn wasted_memory(&self) -> u64 {
        self.wasted
    }

    pub fn arenas(&self) -> usize {
        self.blocks.iter().flatten().count()
    }

    pub fn spill_files(&self) -> usize {
        self.files.len()
    }

    pub fn info(&self) -> MemoryInfo {
        MemoryInfo {
            declared: self.declared,
            used: self.used,
            wasted: self.wasted,
            pooled: self.pool.size_in_bytes(),
            spilled: self.spilled,
            buffered: self.builder.written() as u64,
            arenas: self.arenas(),
            files: self.files.len(),
        }
    }

    /// Heap bytes held: live arenas, pooled buffers and the spill builder.
    pub fn size_in_bytes(&self) -> u64 {
        self.declared + self.pool.size_in_bytes() + self.builder.capacity() as u64
    }

    fn residence(&self, region: i16) -> Residence {
        if region >= 0 {
            Residence::Memory(region as usize)
        } else if region == self.builder.id() {
            Residence::Active
        } else {
            Residence::Sealed(file_of(region))
        }
    }

    /// Whether bytes in `region` can still be rewritten in place.
    pub fn is_mutable(&self, region: i16) -> bool {
        !matches!(self.residence(region), Residence::Sealed(_))
    }

    fn file(&self, index: usize) -> &SpillFile {
        self.files
            .get(index)
            .unwrap_or_else(|| panic!("descriptor points at missing spill file {}", index))
    }

    /// Runs `f` on arena `index`, folding the change of its used and wasted
    /// bytes into the running totals.
    fn track<R>(&mut self, index: usize, f: impl FnOnce(&mut Block) -> R) -> R {
        let block = slot_mut(&mut self.blocks, index);
        let (used, wasted) = (block.used() as u64, block.wasted() as u64);

        let result = f(block);

        self.used = self.used - used + block.used() as u64;
        self.wasted = self.wasted - wasted + block.wasted() as u64;
        result
    }

    /// Reserves `size` contiguous bytes in some arena.
    ///
    /// The most recently used arena is tried first, then the others from
    /// the newest, then a slot retired by a completed evolution is refilled,
    /// and only then the arena list grows.
    pub fn allocate(&mut self, size: usize) -> StoreResult<Allocation<'_>> {
        let capacity = self.pool.arena_size();
        if size > capacity {
            return Err(StoreError::AllocationTooLarge { size, capacity });
        }

        let index = self.find(size)?;
        self.available = index;

        let offset = self.track(index, |block| block.allocate(size));
        let block = slot_mut(&mut self.blocks, index);

        match offset {
            Some(offset) => Ok(block.extract(offset, size)),
            None => unreachable!("arena {} was picked without {} free bytes", index, size),
        }
    }

    fn find(&mut self, size: usize) -> StoreResult<usize> {
        let fits = |block: &Option<Block>| block.as_ref().is_some_and(|b| b.left() >= size);

        if self.blocks.get(self.available).is_some_and(fits) {
            return Ok(self.available);
        }

        if let Some(index) = self.blocks.iter().rposition(fits) {
            return Ok(index);
        }

        let index = match self.vacant.pop() {
            Some(index) => index,
            None => {
                let index = self.blocks.len();
                if index > i16::MAX as usize {
                    return Err(StoreError::TooManyArenas(index));
                }
                self.blocks.push(None);
                index
            }
        };

        self.blocks[index] = Some(Block::new(index as i16, self.pool.acquire()));
        self.declared += self.pool.arena_size() as u64;

        trace!(arena = index, declared = self.declared, "Arena opened");
        Ok(index)
    }

    /// Bytes of the bucket behind `node`.
    pub fn tree(&self, node: TreeNode) -> StoreResult<Cow<'_, [u8]>> {
        Ok(match self.residence(node.region) {
            Residence::Memory(index) => Cow::Borrowed(slot(&self.blocks, index).tree(node.offset)),
            Residence::Active => Cow::Borrowed(self.builder.tree(node.offset)),
            Residence::Sealed(index) => Cow::Owned(self.file(index).tree(node.offset)?),
        })
    }

    /// Bytes of the value behind `node`.
    pub fn value(&self, node: ValueNode) -> StoreResult<Cow<'_, [u8]>> {
        let length = node.len();

        Ok(match self.residence(node.region) {
            Residence::Memory(index) => {
                Cow::Borrowed(slot(&self.blocks, index).bytes(node.offset, length))
            }
            Residence::Active => Cow::Borrowed(self.builder.bytes(node.offset, length)),
            Residence::Sealed(index) => Cow::Owned(self.file(index).read(node.offset, length)?),
        })
    }

    /// Replaces a value with one that is not longer.
    ///
    /// Arena and builder values are rewritten where they are. A value in a
    /// sealed file is written to the builder instead and `node` follows it.
    /// The length of `node` is updated in every case.
    pub fn overwrite(&mut self, node: &mut ValueNode, value: &[u8]) -> StoreResult<()> {
        match self.residence(node.region) {
            Residence::Memory(index) => self.track(index, |block| block.overwrite(*node, value)),
            Residence::Active => self.builder.overwrite(*node, value),
            Residence::Sealed(_) => {
                let offset = self.spill(value)?;
                node.region = self.builder.id();
                node.offset = offset;
            }
        }

        node.length = value.len() as u16;
        Ok(())
    }

    pub fn remove_value(&mut self, node: ValueNode) {
        self.remove(node.region, node.offset, node.len());
    }

    pub fn remove_tree(&mut self, node: TreeNode, size: usize) {
        self.remove(node.region, node.offset, size);
    }

    fn remove(&mut self, region: i16, offset: u32, length: usize) {
        match self.residence(region) {
            Residence::Memory(index) => self.track(index, |block| block.remove(offset, length)),
            Residence::Active => self.builder.remove(offset, length),
            Residence::Sealed(_) => {}
        }
    }

    /// Rewrites a bucket of unchanged size where it lives.
    pub fn rewrite_tree(&mut self, node: TreeNode, bytes: &[u8]) {
        match self.residence(node.region) {
            Residence::Memory(index) => slot_mut(&mut self.blocks, index).write(node.offset, bytes),
            Residence::Active => self.builder.write(node.offset, bytes),
            Residence::Sealed(index) => {
                panic!("bucket at {} in sealed spill file {} is read-only", node.offset, index)
            }
        }
    }

    /// Moves a spilled bucket back into an arena; values stay where they are.
    ///
    /// Returns whether `node` moved.
    pub fn promote(&mut self, node: &mut TreeNode) -> StoreResult<bool> {
        if node.in_memory() {
            return Ok(false);
        }

        let bytes = self.tree(*node)?.into_owned();
        let allocation = self.allocate(bytes.len())?;
        allocation.data.copy_from_slice(&bytes);

        let (region, offset) = (allocation.region, allocation.offset);
        self.remove_tree(*node, bytes.len());

        trace!(from = node.region, to = region, bytes = bytes.len(), "Bucket promoted");

        node.region = region;
        node.offset = offset;
        Ok(true)
    }

    /// Moves an arena value to the spill tier, returning the bytes freed.
    pub fn archive_value(&mut self, node: &mut ValueNode) -> StoreResult<usize> {
        let Residence::Memory(index) = self.residence(node.region) else {
            return Ok(0);
        };

        let length = node.len();
        let offset = self.spill_from(index, node.offset, length)?;

        node.region = self.builder.id();
        node.offset = offset;
        Ok(length)
    }

    /// Moves an arena bucket to the spill tier, returning the bytes freed.
    pub fn archive_tree(&mut self, node: &mut TreeNode) -> StoreResult<usize> {
        let Residence::Memory(index) = self.residence(node.region) else {
            return Ok(0);
        };

        let length = slot(&self.blocks, index).tree(node.offset).len();
        let offset = self.spill_from(index, node.offset, length)?;

        node.region = self.builder.id();
        node.offset = offset;
        Ok(length)
    }

    /// Copies an arena region into the builder and gives it back.
    fn spill_from(&mut self, index: usize, offset: u32, length: usize) -> StoreResult<u32> {
        self.prepare(length)?;

        let source = slot(&self.blocks, index).bytes(offset, length);
        let spilled = match self.builder.append(source) {
            Some(spilled) => spilled,
            None => unreachable!("spill builder prepared without {} free bytes", length),
        };

        self.track(index, |block| block.remove(offset, length));
        Ok(spilled)
    }

    fn spill(&mut self, bytes: &[u8]) -> StoreResult<u32> {
        self.prepare(bytes.len())?;

        match self.builder.append(bytes) {
            Some(offset) => Ok(offset),
            None => unreachable!("spill builder prepared without {} free bytes", bytes.len()),
        }
    }

    /// Seals the builder when it cannot take `size` more bytes.
    fn prepare(&mut self, size: usize) -> StoreResult<()> {
        if self.builder.left() >= size {
            return Ok(());
        }

        let capacity = self.pool.arena_size();
        if size > capacity {
            return Err(StoreError::AllocationTooLarge { size, capacity });
        }

        let next = region_of(self.files.len() + 1);
        if next < i16::MIN as i32 {
            return Err(StoreError::TooManySpillFiles(self.files.len()));
        }

        let file = self.builder.seal(next as i16)?;
        self.spilled += file.size();
        self.files.push(file);

        debug!(files = self.files.len(), spilled = self.spilled, "Spill builder rotated");
        Ok(())
    }

    /// Detaches every arena whose wasted share of its capacity exceeds
    /// `factor`. Descriptors into them stay readable through the returned
    /// [`Evolution`] until [`complete`](Self::complete).
    pub fn evolve(&mut self, factor: f64) -> Evolution {
        let capacity = self.pool.arena_size() as f64;
        let mut evolution = Evolution::default();

        for index in 0..self.blocks.len() {
            let retire = self.blocks[index]
                .as_ref()
                .is_some_and(|block| block.wasted() as f64 / capacity > factor);
            if !retire {
                continue;
            }

            if let Some(block) = self.blocks[index].take() {
                self.used -= block.used() as u64;
                self.wasted -= block.wasted() as u64;
                self.declared -= capacity as u64;
                evolution.abandoned.insert(block.index(), block);
            }
        }

        if !evolution.is_empty() {
            debug!(
                abandoned = evolution.len(),
                declared = self.declared,
                "Arenas detached for compaction"
            );
        }

        evolution
    }

    /// Returns the buffers of a finished evolution to the pool and frees
    /// their slots for new arenas.
    pub fn complete(&mut self, evolution: Evolution) {
        for (region, block) in evolution.abandoned {
            self.pool.release(block.into_data());
            self.vacant.push(region as usize);
        }
    }

    /// Uses up every region id and leaves `keep` free bytes in arena 0.
    #[cfg(test)]
    pub(crate) fn exhaust(&mut self, keep: usize) {
        self.blocks.resize_with(i16::MAX as usize + 1, || None);

        let left = slot(&self.blocks, 0).left();
        self.track(0, |block| block.allocate(left - keep));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{TreeInsert, TreeReference};

    fn manager(dir: &tempfile::TempDir) -> MemoryManager {
        MemoryManager::new(dir.path(), 256)
    }

    fn insert(memory: &mut MemoryManager, key: &[u8], value: &[u8]) -> TreeNode {
        let insert = TreeInsert::new(key, value);
        insert.apply(memory.allocate(insert.size()).unwrap())
    }

    fn value_of(memory: &MemoryManager, node: TreeNode) -> ValueNode {
        let tree = memory.tree(node).unwrap();
        TreeReference::new(&tree).value(0)
    }

    #[test]
    fn test_allocation_opens_arenas() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = manager(&dir);

        assert_eq!(memory.declared_memory(), 256);
        memory.allocate(200).unwrap();
        memory.allocate(100).unwrap();
        memory.allocate(150).unwrap();

        assert_eq!(memory.arenas(), 2);
        assert_eq!(memory.declared_memory(), 512);
        assert_eq!(memory.used_memory(), 450);

        // Only the older arena still has room for this one.
        let small = memory.allocate(50).unwrap();
        assert_eq!(small.region, 0);
        assert_eq!(small.offset, 200);
    }

    #[test]
    fn test_oversized_allocation_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = manager(&dir);

        let err = memory.allocate(257).unwrap_err();
        assert!(matches!(
            err,
            StoreError::AllocationTooLarge {
                size: 257,
                capacity: 256
            }
        ));
    }

    #[test]
    fn test_removal_is_accounted() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = manager(&dir);

        let first = insert(&mut memory, &[1, 2], &[10, 20, 30]);
        insert(&mut memory, &[3], &[40]);

        memory.remove_tree(first, 12);
        assert_eq!(memory.wasted_memory(), 12);
        assert_eq!(memory.used_memory(), 15);
    }

    #[test]
    fn test_archive_and_promote() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = manager(&dir);

        let mut node = insert(&mut memory, &[1, 2], &[10, 20, 30]);
        let mut value = value_of(&memory, node);

        assert_eq!(memory.archive_value(&mut value).unwrap(), 3);
        assert_eq!(value.region, -1);
        assert!(!value.in_memory());

        let mut tree = memory.tree(node).unwrap().into_owned();
        value.write(&mut tree[2..10]);
        memory.rewrite_tree(node, &tree);

        assert_eq!(memory.archive_tree(&mut node).unwrap(), 12);
        assert_eq!(node.region, -1);
        assert_eq!(memory.used_memory(), 0);

        assert!(memory.promote(&mut node).unwrap());
        assert!(node.in_memory());
        assert!(!memory.promote(&mut node).unwrap());

        let tree = memory.tree(node).unwrap();
        let tree = TreeReference::new(&tree);
        assert_eq!(tree.key(0), &[1, 2]);
        assert_eq!(memory.value(tree.value(0)).unwrap().as_ref(), &[10, 20, 30]);
    }

    #[test]
    fn test_sealed_files_remain_readable() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = manager(&dir);

        let mut values = Vec::new();
        for i in 0..40u8 {
            let node = insert(&mut memory, &[i], &[i; 20]);
            let mut value = value_of(&memory, node);
            memory.archive_value(&mut value).unwrap();
            values.push(value);
        }

        assert!(memory.spill_files() >= 2);
        assert_eq!(memory.info().files, memory.spill_files());

        for (i, value) in values.iter().enumerate() {
            assert_eq!(memory.value(*value).unwrap().as_ref(), &[i as u8; 20]);
        }
    }

    #[test]
    fn test_overwrite_sealed_value_moves_to_builder() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = manager(&dir);

        let node = insert(&mut memory, &[1], &[5; 200]);
        let mut value = value_of(&memory, node);
        memory.archive_value(&mut value).unwrap();

        // Push the builder over so the value ends up in a sealed file.
        let other = insert(&mut memory, &[2], &[6; 100]);
        let mut spare = value_of(&memory, other);
        memory.archive_value(&mut spare).unwrap();
        assert_eq!(memory.spill_files(), 1);
        assert!(!memory.is_mutable(value.region));

        memory.overwrite(&mut value, &[9, 9]).unwrap();
        assert!(memory.is_mutable(value.region));
        assert_eq!(value.length, 2);
        assert_eq!(memory.value(value).unwrap().as_ref(), &[9, 9]);
    }

    #[test]
    fn test_evolve_detaches_wasteful_arenas() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = manager(&dir);

        let first = insert(&mut memory, &[1], &[1; 100]);
        let second = insert(&mut memory, &[2], &[2; 100]);
        let third = insert(&mut memory, &[3], &[3; 100]);
        assert_eq!(third.region, 1);

        let value = value_of(&memory, first);
        memory.remove_tree(first, 11);
        memory.remove_value(value);

        let evolution = memory.evolve(0.1);
        assert!(evolution.contains(0));
        assert!(!evolution.contains(1));
        assert_eq!(evolution.tree(second).len(), 11);
        assert_eq!(memory.declared_memory(), 256);
        assert_eq!(memory.used_memory(), 111);

        // Retired slots stay unused while the evolution is alive.
        let during = memory.allocate(200).unwrap();
        assert_eq!(during.region, 2);

        memory.complete(evolution);
        assert_eq!(memory.info().pooled, 256);

        // Afterwards the retired slot is refilled from the pool.
        let reused = memory.allocate(200).unwrap();
        assert_eq!(reused.region, 0);
        assert_eq!(memory.info().pooled, 0);
    }

    #[test]
    #[should_panic(expected = "retired arena")]
    fn test_retired_arena_access_panics() {
        let dir = tempfile::tempdir().unwrap();
        let mut memory = manager(&dir);

        let node = insert(&mut memory, &[1], &[1; 100]);
        memory.allocate(20).unwrap();
        memory.remove_tree(node, 11);

        let evolution = memory.evolve(0.0);
        assert_eq!(evolution.len(), 1);
        let _ = memory.tree(node);
    }
}
