//! Bucket ("Tree") Encoding
//!
//! All keys sharing a directory slot live in one packed byte blob, called a
//! tree for historical reasons. It is self-contained and position
//! independent, which is what lets the memory manager move it between
//! arenas and the spill tier by plain byte copies.
//!
//! ## Layout
//!
//! ```text
//! ┌───────┬────────────────┬──────────────────────┬────────────────────┐
//! │ N (1) │ key len × N    │ value descriptor × N │ key bytes          │
//! │       │ (1 byte each)  │ (8 bytes each)       │ (concatenated)     │
//! └───────┴────────────────┴──────────────────────┴────────────────────┘
//! ```
//!
//! Links keep insertion order. Values are stored elsewhere and reached
//! through the descriptors (see [`types`]).
//!
//! ## Modules
//!
//! - `types`: value and bucket descriptors
//! - `reference`: read view, lookup and split
//! - `ops`: insert/append/modify transformations

pub mod ops;
pub mod reference;
pub mod types;

pub use ops::{TreeAppend, TreeInsert, TreeModify};
pub use reference::{tree_size, Link, LinkIter, TreeReference, TreeSplit};
pub use types::{TreeNode, ValueNode, DESCRIPTOR_SIZE, MAX_KEY_LENGTH, MAX_LINKS, MAX_VALUE_LENGTH};

#[cfg(test)]
pub(crate) mod fixtures {
    pub(crate) const SINGLE: [u8; 13] = [
        1, 3, //
        100, 0, 0, 0, 1, 0, 200, 0, //
        10, 11, 12,
    ];

    pub(crate) const MULTIPLE: [u8; 42] = [
        3, 3, 4, 7, //
        100, 0, 0, 0, 1, 0, 200, 0, //
        101, 1, 0, 1, 0, 0, 201, 0, //
        102, 2, 7, 0, 0, 0, 202, 0, //
        10, 11, 12, //
        20, 21, 22, 23, //
        30, 31, 32, 33, 34, 35, 36,
    ];
}
