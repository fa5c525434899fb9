//! Memory Tier
//!
//! Buckets and values live in fixed-size arenas addressed by a signed 16-bit
//! region id and a 32-bit offset:
//!
//! - `region >= 0`: arena number `region`
//! - `region < 0`: the spill tier (builder or sealed file)
//!
//! ## Modules
//!
//! - `block`: a single arena with waste accounting
//! - `pool`: recycled arena buffers
//! - `spill`: spill builder and sealed spill files
//! - `manager`: allocation, residence and compaction support

pub mod block;
pub mod manager;
pub mod pool;
pub mod spill;

pub use block::{Allocation, Block};
pub use manager::{Evolution, MemoryInfo, MemoryManager};
pub use pool::MemoryPool;
pub use spill::{SpillBuilder, SpillFile};
