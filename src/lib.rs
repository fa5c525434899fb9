//! # BlockKV - An Embedded, Memory-Bounded Key-Value Engine
//!
//! BlockKV stores very large numbers of small key/value pairs while keeping
//! resident memory under a configured ceiling. Hot data lives in fixed-size
//! memory arenas, cold data is spilled to append-only files, and fragmented
//! arenas are compacted.
//!
//! ## Features
//!
//! - **Extendible hashing**: a power-of-two directory that doubles and splits
//!   buckets along one new hash bit
//! - **Packed buckets**: every bucket is a single position-independent byte
//!   blob, mutated copy-on-write
//! - **Tiered memory**: arenas in memory, a spill buffer and sealed spill files
//!   on disk, addressed uniformly by `(region, offset)`
//! - **Maintenance**: frequency-aware archiving plus arena compaction, run
//!   synchronously when declared memory crosses the ceiling
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                              Table                                │
//! │   get / set                                                       │
//! │      │                                                            │
//! │      ▼                                                            │
//! │  ┌────────┐   ┌───────────┐   ┌────────────────┐                  │
//! │  │ Hasher │──>│ Directory │──>│ TreeNodeBitmap │                  │
//! │  └────────┘   └───────────┘   └───────┬────────┘                  │
//! │                                       ▼                           │
//! │  ┌─────────────────────────────────────────────────────────────┐  │
//! │  │                       MemoryManager                         │  │
//! │  │  ┌────────┐ ┌────────┐ ┌────────┐   ┌─────────┐ ┌─────────┐ │  │
//! │  │  │Arena 0 │ │Arena 1 │ │...N    │   │ Spill   │ │ Sealed  │ │  │
//! │  │  │        │ │        │ │        │   │ builder │ │ files   │ │  │
//! │  │  └────────┘ └────────┘ └────────┘   └─────────┘ └─────────┘ │  │
//! │  └─────────────────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use blockkv::{Settings, Table};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let settings = Settings::new(dir.path())
//!     .with_arena_size(1024 * 1024)
//!     .with_memory_ceiling(16 * 1024 * 1024);
//!
//! let mut table = Table::open(settings).unwrap();
//! table.set(&[1, 2], &[20, 30, 40]).unwrap();
//! table.set(&[1, 2], &[50, 60]).unwrap();
//!
//! assert_eq!(table.get(&[1, 2]).unwrap().as_deref(), Some(&[50, 60][..]));
//! assert_eq!(table.size(), 1);
//! ```
//!
//! ## Module Overview
//!
//! - [`tree`]: bucket encoding and the insert/append/modify/split operations
//! - [`memory`]: arenas, the buffer pool and the spill tier
//! - [`storage`]: hasher, directory, descriptor bitmap, table and maintenance
//! - [`settings`]: table configuration and maintenance hooks
//! - [`error`]: the error type shared by all of the above
//!
//! ## Threading
//!
//! A [`Table`] is single-threaded and synchronous. Directory growth and
//! maintenance run to completion inside the `set` that triggers them, and
//! spill I/O is blocking. Wrap the table in a lock to share it.

pub mod error;
pub mod memory;
pub mod settings;
pub mod storage;
pub mod tree;

// Re-export commonly used types for convenience
pub use error::{StoreError, StoreResult};
pub use memory::MemoryInfo;
pub use settings::{MaintenanceConfig, MaintenanceHooks, Settings};
pub use storage::{Hasher, MaintenanceReport, Table, TableStats};

/// Version of BlockKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
