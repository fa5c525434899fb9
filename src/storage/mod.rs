//! Storage Module
//!
//! The hash directory and everything the table needs around it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                            Table                             │
//! │  ┌─────────┐   ┌───────────┐   ┌────────────────┐            │
//! │  │ Hasher  │──>│ Directory │──>│ TreeNodeBitmap │            │
//! │  │ (level) │   │ 2^level   │   │ stable indexes │            │
//! │  └─────────┘   └───────────┘   └───────┬────────┘            │
//! │                                        ▼                     │
//! │                              ┌───────────────────┐           │
//! │                              │  MemoryManager    │           │
//! │                              │  arenas + spill   │           │
//! │                              └───────────────────┘           │
//! └──────────────────────────────────────────────────────────────┘
//!                    ▲
//!                    │ when declared memory > ceiling
//!          ┌─────────┴──────────┐
//!          │ Maintenance pass   │
//!          │ archive + compact  │
//!          └────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use blockkv::{Settings, Table};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mut table = Table::open(Settings::new(dir.path()).with_arena_size(64 * 1024)).unwrap();
//!
//! table.set(b"color", b"blue").unwrap();
//! assert_eq!(table.get(b"color").unwrap().as_deref(), Some(&b"blue"[..]));
//! assert_eq!(table.get(b"other").unwrap(), None);
//! ```

pub mod bitmap;
pub mod directory;
pub mod hasher;
pub mod maintenance;
pub mod table;

pub use bitmap::TreeNodeBitmap;
pub use directory::Directory;
pub use hasher::Hasher;
pub use maintenance::MaintenanceReport;
pub use table::{Table, TableStats};
