//! Maintenance Pass
//!
//! Runs synchronously inside the `set` that pushed declared arena memory
//! over the ceiling. One pass:
//!
//! 1. Computes a budget: a fraction of the used arena bytes.
//! 2. Walks in-memory buckets least accessed first, smallest first among
//!    ties, until the budget is met. Each visited bucket loses its values
//!    and then its own bytes.
//! 3. Archives whole buckets whose values left memory earlier, again least
//!    accessed first.
//! 4. Resets every access counter (clock aging).
//! 5. Compacts: arenas above the wasted threshold are detached, every live
//!    bucket and value still inside them is copied out, and their buffers go
//!    back to the pool.

use tracing::{debug, info};

use crate::error::StoreResult;
use crate::memory::{Evolution, MemoryManager};
use crate::settings::{MaintenanceConfig, MaintenanceHooks};
use crate::storage::bitmap::TreeNodeBitmap;
use crate::storage::directory::Directory;
use crate::tree::{TreeReference, ValueNode, DESCRIPTOR_SIZE};

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub budget: u64,
    /// Value bytes moved to the spill tier
    pub archived_values: u64,
    /// Bucket bytes moved to the spill tier
    pub archived_trees: u64,
    pub abandoned_arenas: usize,
    /// Bytes copied out of abandoned arenas
    pub relocated: u64,
    pub declared_before: u64,
    pub declared_after: u64,
}

impl MaintenanceReport {
    pub fn archived(&self) -> u64 {
        self.archived_values + self.archived_trees
    }
}

/// The parts of a table a pass works on.
pub(crate) struct Maintenance<'a> {
    pub directory: &'a Directory,
    pub bitmap: &'a mut TreeNodeBitmap,
    pub memory: &'a mut MemoryManager,
}

/// Value descriptors of a bucket with their byte position inside it.
fn descriptors(tree: &[u8]) -> Vec<(usize, ValueNode)> {
    let reference = TreeReference::new(tree);

    (0..reference.links())
        .map(|i| (reference.value_position(i), reference.value(i)))
        .collect()
}

impl Maintenance<'_> {
    pub fn run(
        &mut self,
        config: &MaintenanceConfig,
        hooks: &mut MaintenanceHooks,
    ) -> StoreResult<MaintenanceReport> {
        let used = self.memory.used_memory();
        let mut report = MaintenanceReport {
            budget: (used as f64 * config.archive_fraction) as u64,
            declared_before: self.memory.declared_memory(),
            ..Default::default()
        };

        info!(
            budget = report.budget,
            declared = report.declared_before,
            used = used,
            "Maintenance started"
        );

        hooks.archiving();
        self.archive(&mut report)?;

        hooks.compacting_start();
        self.compact(config.compaction_threshold, &mut report)?;
        hooks.compacting_end();

        report.declared_after = self.memory.declared_memory();

        info!(
            archived_values = report.archived_values,
            archived_trees = report.archived_trees,
            abandoned = report.abandoned_arenas,
            relocated = report.relocated,
            declared = report.declared_after,
            "Maintenance finished"
        );

        Ok(report)
    }

    fn archive(&mut self, report: &mut MaintenanceReport) -> StoreResult<()> {
        let mut buckets: Vec<(u16, usize, u32)> = Vec::new();
        for (_, index) in self.directory.occupied() {
            let node = self.bitmap.get(index);
            let size = if node.in_memory() {
                self.memory.tree(node)?.len()
            } else {
                0
            };
            buckets.push((node.accessed, size, index));
        }

        // Coldest first, smallest first among equally cold.
        buckets.sort_by_key(|&(accessed, size, _)| (accessed, size));

        for &(_, _, index) in &buckets {
            if report.archived() >= report.budget {
                break;
            }
            report.archived_values += self.archive_values(index)? as u64;
            report.archived_trees += self.archive_tree(index)? as u64;
        }

        // Buckets whose values left memory in earlier passes.
        for &(_, _, index) in &buckets {
            if report.archived() >= report.budget {
                break;
            }
            report.archived_trees += self.archive_tree(index)? as u64;
        }

        for &(_, _, index) in &buckets {
            let mut node = self.bitmap.get(index);
            node.accessed = 0;
            self.bitmap.set(index, node);
        }

        debug!(
            buckets = buckets.len(),
            archived = report.archived(),
            "Archiving done"
        );
        Ok(())
    }

    /// Moves every in-memory value of one bucket to the spill tier.
    fn archive_values(&mut self, index: u32) -> StoreResult<usize> {
        let node = self.bitmap.get(index);
        if !node.in_memory() {
            return Ok(0);
        }

        let mut tree = self.memory.tree(node)?.into_owned();
        let mut archived = 0;
        let mut dirty = false;

        for (position, mut value) in descriptors(&tree) {
            if !value.in_memory() {
                continue;
            }

            archived += self.memory.archive_value(&mut value)?;
            value.write(&mut tree[position..position + DESCRIPTOR_SIZE]);
            dirty = true;
        }

        if dirty {
            self.memory.rewrite_tree(node, &tree);
        }

        Ok(archived)
    }

    /// Moves one bucket to the spill tier once none of its values is in memory.
    fn archive_tree(&mut self, index: u32) -> StoreResult<usize> {
        let mut node = self.bitmap.get(index);
        if !node.in_memory() {
            return Ok(0);
        }

        let pinned = TreeReference::new(&self.memory.tree(node)?)
            .iter()
            .any(|link| link.value.in_memory());

        if pinned {
            return Ok(0);
        }

        let archived = self.memory.archive_tree(&mut node)?;
        self.bitmap.set(index, node);
        Ok(archived)
    }

    fn compact(&mut self, threshold: f64, report: &mut MaintenanceReport) -> StoreResult<()> {
        let evolution = self.memory.evolve(threshold);
        report.abandoned_arenas = evolution.len();

        if !evolution.is_empty() {
            let indexes: Vec<u32> = self.directory.occupied().map(|(_, index)| index).collect();

            for index in indexes {
                report.relocated += self.relocate(index, &evolution)? as u64;
            }
        }

        self.memory.complete(evolution);
        Ok(())
    }

    /// Copies whatever one bucket still keeps in abandoned arenas.
    fn relocate(&mut self, index: u32, evolution: &Evolution) -> StoreResult<usize> {
        let mut node = self.bitmap.get(index);
        let moved = evolution.contains(node.region);

        let mut tree = if moved {
            evolution.tree(node).to_vec()
        } else {
            self.memory.tree(node)?.into_owned()
        };

        let mut relocated = 0;
        let mut dirty = false;

        for (position, mut value) in descriptors(&tree) {
            if !evolution.contains(value.region) {
                continue;
            }

            let bytes = evolution.value(value);
            let allocation = self.memory.allocate(bytes.len())?;
            allocation.data.copy_from_slice(bytes);

            value.region = allocation.region;
            value.offset = allocation.offset;
            value.write(&mut tree[position..position + DESCRIPTOR_SIZE]);

            relocated += bytes.len();
            dirty = true;
        }

        if moved || (dirty && !self.memory.is_mutable(node.region)) {
            let allocation = self.memory.allocate(tree.len())?;
            allocation.data.copy_from_slice(&tree);

            node.region = allocation.region;
            node.offset = allocation.offset;
            self.bitmap.set(index, node);

            relocated += tree.len();
        } else if dirty {
            self.memory.rewrite_tree(node, &tree);
        }

        Ok(relocated)
    }
}
