//! Bucket Transformations
//!
//! Every structural change to a bucket produces a complete new bucket in a
//! fresh allocation; the source bytes are never touched. Each operation
//! reports the exact allocation size it needs through `size()`, and
//! `apply()` fills an allocation of exactly that size:
//!
//! ```text
//! Insert  10 + |key| + |value|          one link, value at the tail
//! Append  existing + 9 + |key| + |value| new link appended, value at the tail
//! Modify  existing + |value|             one descriptor repointed, value at the tail
//! ```
//!
//! The value bytes written by insert/append/modify live right behind the
//! bucket in the same allocation, so the new descriptor points at
//! `allocation.offset + bucket size`.

use crate::memory::Allocation;
use crate::tree::reference::{header_size, Link, TreeReference};
use crate::tree::types::{TreeNode, ValueNode, DESCRIPTOR_SIZE};

/// Encodes `links` as a bucket at the start of `dst`, returning its size.
pub(crate) fn write_links(dst: &mut [u8], links: &[Link<'_>]) -> usize {
    debug_assert!(!links.is_empty() && links.len() <= u8::MAX as usize);

    let count = links.len();
    let mut key_offset = header_size(count);

    dst[0] = count as u8;

    for (i, link) in links.iter().enumerate() {
        let at = 1 + count + i * DESCRIPTOR_SIZE;

        dst[1 + i] = link.key.len() as u8;
        link.value.write(&mut dst[at..at + DESCRIPTOR_SIZE]);
        dst[key_offset..key_offset + link.key.len()].copy_from_slice(link.key);

        key_offset += link.key.len();
    }

    key_offset
}

/// Descriptor of `value` stored `tree_size` bytes into `allocation`.
fn tail_value(allocation: &Allocation<'_>, tree_size: usize, value: &[u8]) -> ValueNode {
    ValueNode {
        region: allocation.region,
        offset: allocation.offset + tree_size as u32,
        length: value.len() as u16,
    }
}

/// Builds a one-link bucket.
#[derive(Debug, Clone, Copy)]
pub struct TreeInsert<'k> {
    key: &'k [u8],
    value: &'k [u8],
}

impl<'k> TreeInsert<'k> {
    pub fn new(key: &'k [u8], value: &'k [u8]) -> Self {
        Self { key, value }
    }

    pub fn size(&self) -> usize {
        header_size(1) + self.key.len() + self.value.len()
    }

    pub fn apply(&self, allocation: Allocation<'_>) -> TreeNode {
        assert_eq!(allocation.data.len(), self.size(), "insert size mismatch");

        let tree_size = header_size(1) + self.key.len();
        let link = Link {
            key: self.key,
            value: tail_value(&allocation, tree_size, self.value),
        };

        write_links(allocation.data, &[link]);
        allocation.data[tree_size..].copy_from_slice(self.value);

        TreeNode::new(allocation.region, allocation.offset)
    }
}

/// Copies a bucket and appends one link.
#[derive(Debug, Clone, Copy)]
pub struct TreeAppend<'a, 'k> {
    tree: TreeReference<'a>,
    key: &'k [u8],
    value: &'k [u8],
}

impl<'a, 'k> TreeAppend<'a, 'k> {
    pub(crate) fn new(tree: TreeReference<'a>, key: &'k [u8], value: &'k [u8]) -> Self {
        Self { tree, key, value }
    }

    pub fn size(&self) -> usize {
        self.tree.size_in_bytes() + 1 + DESCRIPTOR_SIZE + self.key.len() + self.value.len()
    }

    pub fn apply(&self, allocation: Allocation<'_>) -> TreeNode {
        assert_eq!(allocation.data.len(), self.size(), "append size mismatch");

        let tree_size = self.size() - self.value.len();
        let mut links: Vec<Link<'_>> = self.tree.iter().collect();

        links.push(Link {
            key: self.key,
            value: tail_value(&allocation, tree_size, self.value),
        });

        write_links(allocation.data, &links);
        allocation.data[tree_size..].copy_from_slice(self.value);

        TreeNode::new(allocation.region, allocation.offset)
    }
}

/// Copies a bucket, repointing one link at a fresh copy of its value.
#[derive(Debug, Clone, Copy)]
pub struct TreeModify<'a, 'k> {
    tree: TreeReference<'a>,
    index: usize,
    value: &'k [u8],
}

impl<'a, 'k> TreeModify<'a, 'k> {
    pub(crate) fn new(tree: TreeReference<'a>, index: usize, value: &'k [u8]) -> Self {
        assert!(index < tree.links(), "link {} out of range", index);
        Self { tree, index, value }
    }

    pub fn size(&self) -> usize {
        self.tree.size_in_bytes() + self.value.len()
    }

    pub fn apply(&self, allocation: Allocation<'_>) -> TreeNode {
        assert_eq!(allocation.data.len(), self.size(), "modify size mismatch");

        let tree_size = self.tree.size_in_bytes();
        let mut links: Vec<Link<'_>> = self.tree.iter().collect();

        links[self.index].value = tail_value(&allocation, tree_size, self.value);

        write_links(allocation.data, &links);
        allocation.data[tree_size..].copy_from_slice(self.value);

        TreeNode::new(allocation.region, allocation.offset)
    }
}
