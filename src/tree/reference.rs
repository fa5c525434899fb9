//! Bucket Read View
//!
//! A [`TreeReference`] borrows the bytes of one encoded bucket and answers
//! questions about it without copying: how many links it has, where each
//! value lives, which link carries a given key. It is also the starting
//! point of every transformation (append, modify, split), because all of
//! them read the existing links and write a brand new bucket elsewhere.
//!
//! The view is only valid for the call that produced it; the next mutation
//! of the memory manager may move the underlying bytes.

use crate::memory::Allocation;
use crate::storage::Hasher;
use crate::tree::ops::{write_links, TreeAppend, TreeModify};
use crate::tree::types::{TreeNode, ValueNode, DESCRIPTOR_SIZE};

/// One key and its value descriptor, as stored in a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link<'a> {
    pub key: &'a [u8],
    pub value: ValueNode,
}

/// Total encoded size of the bucket starting at `data[0]`.
///
/// Only the header is inspected, so `data` may extend past the bucket.
pub fn tree_size(data: &[u8]) -> usize {
    let links = data[0] as usize;
    let keys: usize = data[1..=links].iter().map(|&len| len as usize).sum();

    header_size(links) + keys
}

/// Size of the count byte, key lengths and descriptors of `links` links.
#[inline]
pub(crate) fn header_size(links: usize) -> usize {
    1 + links + links * DESCRIPTOR_SIZE
}

/// Borrowed view over one encoded bucket.
#[derive(Debug, Clone, Copy)]
pub struct TreeReference<'a> {
    data: &'a [u8],
}

impl<'a> TreeReference<'a> {
    /// Wraps bucket bytes; `data[0]` must be the link count.
    pub fn new(data: &'a [u8]) -> Self {
        debug_assert!(!data.is_empty() && data.len() >= tree_size(data));
        Self { data }
    }

    /// Number of links.
    #[inline]
    pub fn links(&self) -> usize {
        self.data[0] as usize
    }

    /// Encoded size of the bucket in bytes.
    pub fn size_in_bytes(&self) -> usize {
        tree_size(self.data)
    }

    /// The exact bucket bytes.
    pub fn as_bytes(&self) -> &'a [u8] {
        &self.data[..self.size_in_bytes()]
    }

    #[inline]
    pub fn key_length(&self, index: usize) -> usize {
        self.data[1 + index] as usize
    }

    /// Value descriptor of link `index`.
    #[inline]
    pub fn value(&self, index: usize) -> ValueNode {
        let at = self.value_position(index);
        ValueNode::read(&self.data[at..at + DESCRIPTOR_SIZE])
    }

    /// Byte position of descriptor `index` within the bucket.
    #[inline]
    pub fn value_position(&self, index: usize) -> usize {
        1 + self.links() + index * DESCRIPTOR_SIZE
    }

    /// Key bytes of link `index`.
    pub fn key(&self, index: usize) -> &'a [u8] {
        let start = header_size(self.links())
            + (0..index).map(|i| self.key_length(i)).sum::<usize>();

        &self.data[start..start + self.key_length(index)]
    }

    /// Whether the value of link `index` is resident in a memory arena.
    pub fn in_memory(&self, index: usize) -> bool {
        self.value(index).in_memory()
    }

    /// Iterates links in bucket order.
    pub fn iter(&self) -> LinkIter<'a> {
        LinkIter {
            tree: *self,
            index: 0,
            key_offset: header_size(self.links()),
        }
    }

    /// Finds the link carrying `key`, returning its index and descriptor.
    ///
    /// The scan compares key lengths before key bytes; the first match wins.
    pub fn find(&self, key: &[u8]) -> Option<(usize, ValueNode)> {
        self.iter()
            .enumerate()
            .find(|(_, link)| link.key.len() == key.len() && link.key == key)
            .map(|(index, link)| (index, link.value))
    }

    /// Adds a new link carrying `key` and `value`.
    pub fn append<'k>(&self, key: &'k [u8], value: &'k [u8]) -> TreeAppend<'a, 'k> {
        TreeAppend::new(*self, key, value)
    }

    /// Points link `index` at a fresh copy of `value`.
    pub fn modify<'k>(&self, index: usize, value: &'k [u8]) -> TreeModify<'a, 'k> {
        TreeModify::new(*self, index, value)
    }

    /// Partitions the links by the bit `hasher.mask()` of their key hash.
    pub fn split(&self, hasher: &Hasher) -> TreeSplit<'a> {
        TreeSplit::new(*self, hasher)
    }
}

/// Iterator over the links of a bucket.
#[derive(Debug, Clone)]
pub struct LinkIter<'a> {
    tree: TreeReference<'a>,
    index: usize,
    key_offset: usize,
}

impl<'a> Iterator for LinkIter<'a> {
    type Item = Link<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.tree.links() {
            return None;
        }

        let length = self.tree.key_length(self.index);
        let key = &self.tree.data[self.key_offset..self.key_offset + length];
        let value = self.tree.value(self.index);

        self.index += 1;
        self.key_offset += length;

        Some(Link { key, value })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.tree.links() - self.index;
        (left, Some(left))
    }
}

impl ExactSizeIterator for LinkIter<'_> {}

/// A bucket partitioned for directory growth.
///
/// Links whose `hash(key) & mask` is zero stay "left" (the original slot);
/// the others go "right" (the mirror slot `slot + mask`). Value bytes are
/// never copied, only descriptors.
#[derive(Debug)]
pub struct TreeSplit<'a> {
    tree: TreeReference<'a>,
    right: Vec<bool>,
    left_size: usize,
    right_size: usize,
}

impl<'a> TreeSplit<'a> {
    fn new(tree: TreeReference<'a>, hasher: &Hasher) -> Self {
        let mask = hasher.mask();
        let mut right = Vec::with_capacity(tree.links());
        let (mut left_links, mut left_keys) = (0, 0);
        let (mut right_links, mut right_keys) = (0, 0);

        for link in tree.iter() {
            let goes_right = hasher.hash(link.key) & mask != 0;
            right.push(goes_right);

            if goes_right {
                right_links += 1;
                right_keys += link.key.len();
            } else {
                left_links += 1;
                left_keys += link.key.len();
            }
        }

        let size = |links: usize, keys: usize| {
            if links == 0 {
                0
            } else {
                header_size(links) + keys
            }
        };

        Self {
            tree,
            right,
            left_size: size(left_links, left_keys),
            right_size: size(right_links, right_keys),
        }
    }

    /// Encoded size of the left bucket, or 0 when every link goes right.
    pub fn left_size(&self) -> usize {
        self.left_size
    }

    /// Encoded size of the right bucket, or 0 when every link stays left.
    pub fn right_size(&self) -> usize {
        self.right_size
    }

    /// Whether link `index` of the source bucket goes right.
    pub fn goes_right(&self, index: usize) -> bool {
        self.right[index]
    }

    /// Writes the left links into `allocation`.
    pub fn left(&self, allocation: Allocation<'_>) -> TreeNode {
        assert_eq!(allocation.data.len(), self.left_size, "left split size mismatch");
        self.materialize(allocation, false)
    }

    /// Writes the right links into `allocation`.
    pub fn right(&self, allocation: Allocation<'_>) -> TreeNode {
        assert_eq!(allocation.data.len(), self.right_size, "right split size mismatch");
        self.materialize(allocation, true)
    }

    fn materialize(&self, allocation: Allocation<'_>, side: bool) -> TreeNode {
        let links: Vec<Link<'_>> = self
            .tree
            .iter()
            .zip(&self.right)
            .filter(|(_, &right)| right == side)
            .map(|(link, _)| link)
            .collect();

        write_links(allocation.data, &links);
        TreeNode::new(allocation.region, allocation.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::fixtures::{MULTIPLE, SINGLE};

    fn allocation(buffer: &mut [u8], offset: usize, size: usize) -> Allocation<'_> {
        Allocation {
            region: 13,
            offset: offset as u32,
            data: &mut buffer[offset..offset + size],
        }
    }

    #[test]
    fn test_single_link_tree() {
        let tree = TreeReference::new(&SINGLE);

        assert_eq!(tree.links(), 1);
        assert_eq!(tree.size_in_bytes(), 13);
        assert_eq!(tree.key(0), &[10, 11, 12]);

        let value = tree.value(0);
        assert_eq!(value.region, 100);
        assert_eq!(value.offset, 65536);
        assert_eq!(value.length, 200);
    }

    #[test]
    fn test_multiple_link_tree() {
        let tree = TreeReference::new(&MULTIPLE);

        assert_eq!(tree.links(), 3);
        assert_eq!(tree.size_in_bytes(), 42);

        let links: Vec<_> = tree.iter().collect();
        assert_eq!(links.len(), 3);

        assert_eq!(links[0].key, &[10, 11, 12]);
        assert_eq!(links[0].value.region, 100);
        assert_eq!(links[0].value.offset, 65536);
        assert_eq!(links[0].value.length, 200);

        assert_eq!(links[1].key, &[20, 21, 22, 23]);
        assert_eq!(links[1].value.region, 357);
        assert_eq!(links[1].value.offset, 256);
        assert_eq!(links[1].value.length, 201);

        assert_eq!(links[2].key, &[30, 31, 32, 33, 34, 35, 36]);
        assert_eq!(links[2].value.region, 614);
        assert_eq!(links[2].value.offset, 7);
        assert_eq!(links[2].value.length, 202);

        assert_eq!(tree.key(2), links[2].key);
        assert_eq!(tree.value_position(1), 12);
    }

    #[test]
    fn test_tree_size_ignores_trailing_bytes() {
        let mut data = SINGLE.to_vec();
        data.extend_from_slice(&[0xaa; 20]);

        assert_eq!(tree_size(&data), 13);
        assert_eq!(TreeReference::new(&data).as_bytes(), &SINGLE);
    }

    #[test]
    fn test_find() {
        let tree = TreeReference::new(&MULTIPLE);

        let (index, value) = tree.find(&[20, 21, 22, 23]).unwrap();
        assert_eq!(index, 1);
        assert_eq!(value.region, 357);

        assert_eq!(tree.find(&[30, 31, 32, 33, 34, 35, 36]).unwrap().0, 2);
        assert!(tree.find(&[20, 21, 22]).is_none());
        assert!(tree.find(&[20, 21, 22, 24]).is_none());
        assert!(tree.find(&[]).is_none());
    }

    #[test]
    fn test_memory_residence() {
        let tree = TreeReference::new(&MULTIPLE);
        for index in 0..tree.links() {
            assert!(tree.in_memory(index));
        }

        let mut data = SINGLE;
        ValueNode {
            region: -17,
            offset: 0,
            length: 1,
        }
        .write(&mut data[2..10]);
        assert!(!TreeReference::new(&data).in_memory(0));
    }

    #[test]
    fn test_split_single_link_tree() {
        let tree = TreeReference::new(&SINGLE);
        let split = tree.split(&Hasher::new(4, 4));

        assert_eq!(split.left_size(), 0);
        assert_eq!(split.right_size(), 13);
    }

    #[test]
    fn test_split_right_single_link_tree() {
        let tree = TreeReference::new(&SINGLE);
        let split = tree.split(&Hasher::new(4, 4));

        let mut buffer = [0u8; 33];
        let node = split.right(allocation(&mut buffer, 20, 13));

        assert_eq!(node, TreeNode::new(13, 20));

        let right = TreeReference::new(&buffer[20..]);
        assert_eq!(right.links(), 1);
        assert_eq!(right.size_in_bytes(), 13);
        assert_eq!(right.key(0), &[10, 11, 12]);
        assert_eq!(right.value(0), tree.value(0));
    }

    #[test]
    fn test_split_multiple_link_tree() {
        let tree = TreeReference::new(&MULTIPLE);
        let split = tree.split(&Hasher::new(4, 4));

        assert_eq!(split.left_size(), 2 + 8 + 4);
        assert_eq!(split.right_size(), 3 + 16 + 3 + 7);
        assert!(split.goes_right(0));
        assert!(!split.goes_right(1));
        assert!(split.goes_right(2));
    }

    #[test]
    fn test_split_right_multiple_link_tree() {
        let tree = TreeReference::new(&MULTIPLE);
        let split = tree.split(&Hasher::new(4, 4));

        let mut buffer = [0u8; 49];
        split.right(allocation(&mut buffer, 20, 29));

        let right = TreeReference::new(&buffer[20..]);
        assert_eq!(right.links(), 2);
        assert_eq!(right.size_in_bytes(), 29);

        assert_eq!(right.key(0), &[10, 11, 12]);
        assert_eq!(right.value(0).region, 100);
        assert_eq!(right.value(0).offset, 65536);
        assert_eq!(right.value(0).length, 200);

        assert_eq!(right.key(1), &[30, 31, 32, 33, 34, 35, 36]);
        assert_eq!(right.value(1).region, 614);
        assert_eq!(right.value(1).offset, 7);
        assert_eq!(right.value(1).length, 202);
    }

    #[test]
    fn test_split_left_multiple_link_tree() {
        let tree = TreeReference::new(&MULTIPLE);
        let split = tree.split(&Hasher::new(4, 4));

        let mut buffer = [0u8; 34];
        split.left(allocation(&mut buffer, 20, 14));

        let left = TreeReference::new(&buffer[20..]);
        assert_eq!(left.links(), 1);
        assert_eq!(left.size_in_bytes(), 14);

        assert_eq!(left.key(0), &[20, 21, 22, 23]);
        assert_eq!(left.value(0).region, 357);
        assert_eq!(left.value(0).offset, 256);
        assert_eq!(left.value(0).length, 201);
    }

    #[test]
    #[should_panic(expected = "left split size mismatch")]
    fn test_split_rejects_wrong_allocation() {
        let tree = TreeReference::new(&MULTIPLE);
        let split = tree.split(&Hasher::new(4, 4));

        let mut buffer = [0u8; 64];
        split.left(allocation(&mut buffer, 0, 20));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_links() -> impl Strategy<Value = Vec<(Vec<u8>, u16)>> {
            prop::collection::btree_map(
                prop::collection::vec(any::<u8>(), 0..24),
                any::<u16>(),
                1..40,
            )
            .prop_map(|links| links.into_iter().collect())
        }

        fn encode(links: &[(Vec<u8>, u16)]) -> Vec<u8> {
            let links: Vec<Link<'_>> = links
                .iter()
                .enumerate()
                .map(|(i, (key, length))| Link {
                    key,
                    value: ValueNode {
                        region: i as i16,
                        offset: i as u32 * 3,
                        length: *length,
                    },
                })
                .collect();

            let size = header_size(links.len()) + links.iter().map(|l| l.key.len()).sum::<usize>();
            let mut data = vec![0u8; size];
            write_links(&mut data, &links);
            data
        }

        proptest! {
            #[test]
            fn split_partitions_every_link(links in arb_links(), level in 1u32..20) {
                let data = encode(&links);
                let tree = TreeReference::new(&data);
                let hasher = Hasher::new(level, 20);
                let split = tree.split(&hasher);

                let mut left_buffer = vec![0u8; split.left_size()];
                let mut right_buffer = vec![0u8; split.right_size()];

                if split.left_size() > 0 {
                    split.left(Allocation { region: 0, offset: 0, data: &mut left_buffer });
                }
                if split.right_size() > 0 {
                    split.right(Allocation { region: 0, offset: 0, data: &mut right_buffer });
                }

                let mut sides: Vec<(bool, Link<'_>)> = Vec::new();

                if split.left_size() > 0 {
                    sides.extend(TreeReference::new(&left_buffer).iter().map(|l| (false, l)));
                }
                if split.right_size() > 0 {
                    sides.extend(TreeReference::new(&right_buffer).iter().map(|l| (true, l)));
                }

                prop_assert_eq!(sides.len(), tree.links());

                for original in tree.iter() {
                    let matches: Vec<_> = sides.iter().filter(|(_, l)| *l == original).collect();
                    prop_assert_eq!(matches.len(), 1);

                    let expected = hasher.hash(original.key) & hasher.mask() != 0;
                    prop_assert_eq!(matches[0].0, expected);
                }

                for side in [false, true] {
                    let order: Vec<_> = tree
                        .iter()
                        .filter(|l| (hasher.hash(l.key) & hasher.mask() != 0) == side)
                        .collect();
                    let written: Vec<_> = sides.iter().filter(|(s, _)| *s == side).map(|(_, l)| *l).collect();
                    prop_assert_eq!(order, written);
                }
            }
        }
    }
}
