//! Table Orchestrator
//!
//! [`Table`] ties the hash directory, the descriptor bitmap and the memory
//! manager together and exposes `get` and `set`. Everything runs on the
//! caller's thread: directory growth and maintenance happen synchronously
//! inside the `set` that triggers them.
//!
//! ## Lookup Path
//!
//! ```text
//! key ──hash──▶ directory slot ──▶ descriptor index ──▶ TreeNode
//!                                                        │
//!                          (promote if spilled) ◀────────┘
//!                                   │
//!                          bucket bytes ──find──▶ ValueNode ──▶ value bytes
//! ```

use std::fs;

use bytes::Bytes;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::memory::{MemoryInfo, MemoryManager};
use crate::settings::Settings;
use crate::storage::bitmap::TreeNodeBitmap;
use crate::storage::directory::Directory;
use crate::storage::hasher::Hasher;
use crate::storage::maintenance::{Maintenance, MaintenanceReport};
use crate::tree::{
    TreeInsert, TreeNode, TreeReference, DESCRIPTOR_SIZE, MAX_KEY_LENGTH, MAX_LINKS,
    MAX_VALUE_LENGTH,
};

/// Operation counters of a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Distinct keys stored
    pub keys: usize,
    pub gets: u64,
    /// Gets that found their key
    pub hits: u64,
    pub sets: u64,
    /// Sets that stored a new key
    pub inserts: u64,
    /// Directory doublings
    pub growths: u64,
    pub maintenance_runs: u64,
    /// Buckets read back from the spill tier
    pub promotions: u64,
}

/// A single-threaded, memory-bounded key-value table.
pub struct Table {
    settings: Settings,
    hasher: Hasher,
    directory: Directory,
    bitmap: TreeNodeBitmap,
    memory: MemoryManager,
    size: usize,
    depth: usize,
    stats: TableStats,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("size", &self.size)
            .field("level", &self.hasher.level())
            .field("depth", &self.depth)
            .field("memory", &self.memory)
            .finish()
    }
}

impl Table {
    /// Opens an empty table, creating the spill directory if needed.
    pub fn open(settings: Settings) -> StoreResult<Self> {
        settings.validate()?;
        fs::create_dir_all(&settings.path)?;

        let hasher = Hasher::new(settings.initial_depth, settings.maximal_depth);
        let memory = MemoryManager::new(&settings.path, settings.arena_size);

        debug!(
            path = %settings.path.display(),
            arena_size = settings.arena_size,
            capacity = hasher.capacity(),
            "Table opened"
        );

        Ok(Self {
            directory: Directory::new(hasher.capacity()),
            bitmap: TreeNodeBitmap::new(),
            hasher,
            memory,
            settings,
            size: 0,
            depth: 0,
            stats: TableStats::default(),
        })
    }

    /// Returns a copy of the value stored under `key`.
    ///
    /// A bucket found in the spill tier is moved back into memory first, and
    /// its access counter is bumped.
    pub fn get(&mut self, key: &[u8]) -> StoreResult<Option<Bytes>> {
        self.stats.gets += 1;

        if key.len() > MAX_KEY_LENGTH {
            return Ok(None);
        }

        let index = self.directory.get(self.hasher.hash(key));
        if index == 0 {
            return Ok(None);
        }

        let mut node = self.bitmap.get(index);
        if self.memory.promote(&mut node)? {
            self.stats.promotions += 1;
        }
        node.touch();
        self.bitmap.set(index, node);

        let tree = self.memory.tree(node)?;
        let Some((_, link)) = TreeReference::new(&tree).find(key) else {
            return Ok(None);
        };

        let value = self.memory.value(link)?;
        self.stats.hits += 1;

        Ok(Some(Bytes::copy_from_slice(&value)))
    }

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// May grow the directory and run a maintenance pass before returning.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        if key.len() > MAX_KEY_LENGTH {
            return Err(StoreError::KeyTooLong {
                size: key.len(),
                max: MAX_KEY_LENGTH,
            });
        }

        if value.len() > MAX_VALUE_LENGTH {
            return Err(StoreError::ValueTooLong {
                size: value.len(),
                max: MAX_VALUE_LENGTH,
            });
        }

        self.stats.sets += 1;

        let slot = self.hasher.hash(key);
        let index = self.directory.get(slot);

        if index == 0 {
            let insert = TreeInsert::new(key, value);
            let node = insert.apply(self.memory.allocate(insert.size())?);
            let index = self.bitmap.allocate();

            self.bitmap.set(index, node);
            self.directory.set(slot, index);
            self.inserted(1);
        } else {
            self.update(index, key, value)?;
        }

        if self.size > self.hasher.capacity() && !self.hasher.is_maximum() {
            self.grow()?;
        }

        if self.memory.declared_memory() > self.settings.memory_ceiling {
            self.maintain()?;
        }

        Ok(())
    }

    /// Writes `key` into the existing bucket behind descriptor `index`.
    fn update(&mut self, index: u32, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let mut node = self.bitmap.get(index);
        if self.memory.promote(&mut node)? {
            self.stats.promotions += 1;
            self.bitmap.set(index, node);
        }

        let mut tree = self.memory.tree(node)?.into_owned();
        let reference = TreeReference::new(&tree);

        match reference.find(key) {
            Some((position, mut link)) if link.len() >= value.len() => {
                let at = reference.value_position(position);

                self.memory.overwrite(&mut link, value)?;
                link.write(&mut tree[at..at + DESCRIPTOR_SIZE]);
                self.memory.rewrite_tree(node, &tree);
            }
            Some((position, link)) => {
                let modify = reference.modify(position, value);
                let mut replaced = modify.apply(self.memory.allocate(modify.size())?);
                replaced.accessed = node.accessed;

                self.memory.remove_value(link);
                self.memory.remove_tree(node, tree.len());
                self.bitmap.set(index, replaced);
            }
            None => {
                let links = reference.links();
                if links >= MAX_LINKS {
                    return Err(StoreError::BucketFull(links));
                }

                let append = reference.append(key, value);
                let mut replaced = append.apply(self.memory.allocate(append.size())?);
                replaced.accessed = node.accessed;

                self.memory.remove_tree(node, tree.len());
                self.bitmap.set(index, replaced);
                self.inserted(links + 1);
            }
        }

        Ok(())
    }

    fn inserted(&mut self, links: usize) {
        self.size += 1;
        self.depth = self.depth.max(links);
        self.stats.inserts += 1;
    }

    /// Doubles the directory and splits every bucket along the new hash bit.
    fn grow(&mut self) -> StoreResult<()> {
        let previous = self.hasher.capacity();

        self.hasher = self.hasher.next();
        self.directory.grow(self.hasher.capacity());
        self.stats.growths += 1;

        let mask = self.hasher.mask();
        let (mut kept, mut moved, mut split) = (0usize, 0usize, 0usize);

        for slot in 0..previous {
            let index = self.directory.get(slot);
            if index == 0 {
                continue;
            }

            let node = self.bitmap.get(index);
            let tree = self.memory.tree(node)?.into_owned();
            let halves = TreeReference::new(&tree).split(&self.hasher);

            if halves.right_size() == 0 {
                kept += 1;
                continue;
            }

            if halves.left_size() == 0 {
                self.directory.set(slot + mask, index);
                self.directory.clear(slot);
                moved += 1;
                continue;
            }

            let left = halves.left(self.memory.allocate(halves.left_size())?);
            let right = match self.memory.allocate(halves.right_size()) {
                Ok(allocation) => halves.right(allocation),
                Err(error) => {
                    self.memory.remove_tree(left, halves.left_size());
                    return Err(error);
                }
            };
            self.memory.remove_tree(node, tree.len());

            let allocated = self.bitmap.allocate();
            self.bitmap.set(index, TreeNode { accessed: node.accessed, ..left });
            self.bitmap.set(allocated, TreeNode { accessed: node.accessed, ..right });
            self.directory.set(slot + mask, allocated);
            split += 1;
        }

        debug!(
            level = self.hasher.level(),
            capacity = self.hasher.capacity(),
            kept,
            moved,
            split,
            "Directory grown"
        );

        Ok(())
    }

    /// Runs a maintenance pass now: archive cold data, then compact.
    pub fn maintain(&mut self) -> StoreResult<MaintenanceReport> {
        self.stats.maintenance_runs += 1;

        Maintenance {
            directory: &self.directory,
            bitmap: &mut self.bitmap,
            memory: &mut self.memory,
        }
        .run(&self.settings.maintenance, &mut self.settings.hooks)
    }

    /// Number of distinct keys.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of directory slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.hasher.capacity()
    }

    /// Directory depth in bits.
    #[inline]
    pub fn level(&self) -> u32 {
        self.hasher.level()
    }

    /// Largest number of links ever held by one bucket.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Memory held by arenas, pooled buffers, the spill builder, the
    /// directory and the descriptor bitmap.
    pub fn size_in_bytes(&self) -> u64 {
        self.memory.size_in_bytes() + self.directory.size_in_bytes() + self.bitmap.size_in_bytes()
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            keys: self.size,
            ..self.stats
        }
    }

    pub fn memory_info(&self) -> MemoryInfo {
        self.memory.info()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
