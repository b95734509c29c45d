use crate::btree::IndexKey;

use super::btree_node::{BTreeNode, COMMON_HEADER_SIZE, NODE_TYPE_INTERNAL};
use super::{PageId, PAGE_SIZE};

// B+Tree Internal Node Page Layout:
//   Common node header (24 bytes, see btree_node)
//   Entries from offset 24, 12 bytes each:
//     [key: i64][child_page_id: u32]
//
// size counts children; the key of entry 0 is never read. For entries
// (_, C0), (K1, C1), (K2, C2):
//   C0: keys < K1
//   C1: K1 <= keys < K2
//   C2: keys >= K2

const HEADER_SIZE: usize = COMMON_HEADER_SIZE;
const ENTRY_SIZE: usize = IndexKey::ENCODED_SIZE + 4;

/// Physical child limit; configured max sizes must leave one slot of slack
/// for the transient overflow before a split.
pub const CAPACITY: usize = (PAGE_SIZE - HEADER_SIZE) / ENTRY_SIZE;

pub struct InternalNode;

impl InternalNode {
    pub fn init(data: &mut [u8], page_id: PageId, parent: Option<PageId>, max_size: usize) {
        assert!(max_size >= 3 && max_size < CAPACITY);
        BTreeNode::init(data, NODE_TYPE_INTERNAL, page_id, parent, max_size);
    }

    /// Underflow threshold: ceil(max_size / 2) children.
    pub fn min_size(data: &[u8]) -> usize {
        (BTreeNode::max_size(data) + 1) / 2
    }

    fn entry_offset(idx: usize) -> usize {
        HEADER_SIZE + idx * ENTRY_SIZE
    }

    pub fn key_at(data: &[u8], idx: usize) -> IndexKey {
        let offset = Self::entry_offset(idx);
        IndexKey::from_bytes(&data[offset..offset + IndexKey::ENCODED_SIZE])
    }

    pub fn set_key_at(data: &mut [u8], idx: usize, key: IndexKey) {
        let offset = Self::entry_offset(idx);
        data[offset..offset + IndexKey::ENCODED_SIZE].copy_from_slice(&key.to_bytes());
    }

    pub fn value_at(data: &[u8], idx: usize) -> PageId {
        let offset = Self::entry_offset(idx) + IndexKey::ENCODED_SIZE;
        PageId::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
    }

    fn set_value_at(data: &mut [u8], idx: usize, child: PageId) {
        let offset = Self::entry_offset(idx) + IndexKey::ENCODED_SIZE;
        data[offset..offset + 4].copy_from_slice(&child.to_le_bytes());
    }

    fn write_entry(data: &mut [u8], idx: usize, key: IndexKey, child: PageId) {
        Self::set_key_at(data, idx, key);
        Self::set_value_at(data, idx, child);
    }

    /// Index of the entry holding `child`, if present.
    pub fn value_index(data: &[u8], child: PageId) -> Option<usize> {
        (0..BTreeNode::size(data)).find(|&idx| Self::value_at(data, idx) == child)
    }

    /// The child page covering `key`: the child of the last separator <= key,
    /// or child 0 when key precedes every separator.
    pub fn lookup(data: &[u8], key: IndexKey) -> PageId {
        let mut left = 1;
        let mut right = BTreeNode::size(data);
        while left < right {
            let mid = left + (right - left) / 2;
            if Self::key_at(data, mid) <= key {
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        Self::value_at(data, left - 1)
    }

    /// Turns an empty node into a root with two children split by `key`.
    pub fn populate_new_root(data: &mut [u8], left_child: PageId, key: IndexKey, right_child: PageId) {
        Self::write_entry(data, 0, IndexKey(0), left_child);
        Self::write_entry(data, 1, key, right_child);
        BTreeNode::set_size(data, 2);
    }

    /// Inserts (key, new_child) directly after the entry holding old_child.
    /// Returns the new size.
    pub fn insert_node_after(
        data: &mut [u8],
        old_child: PageId,
        key: IndexKey,
        new_child: PageId,
    ) -> usize {
        let size = BTreeNode::size(data);
        assert!(size < CAPACITY);
        let idx = Self::value_index(data, old_child).expect("old child must be present") + 1;
        data.copy_within(
            Self::entry_offset(idx)..Self::entry_offset(size),
            Self::entry_offset(idx + 1),
        );
        Self::write_entry(data, idx, key, new_child);
        BTreeNode::set_size(data, size + 1);
        size + 1
    }

    /// Removes the entry at `idx` (separator and child together).
    pub fn remove(data: &mut [u8], idx: usize) {
        let size = BTreeNode::size(data);
        data.copy_within(
            Self::entry_offset(idx + 1)..Self::entry_offset(size),
            Self::entry_offset(idx),
        );
        BTreeNode::set_size(data, size - 1);
    }

    /// Empties a single-child root and hands back that child.
    pub fn remove_and_return_only_child(data: &mut [u8]) -> PageId {
        let child = Self::value_at(data, 0);
        BTreeNode::set_size(data, 0);
        child
    }

    /// Moves the upper half of `src` into the freshly initialized `dst`.
    /// dst's entry-0 key carries the separator to push up to the parent
    /// (dead once read). Returns the migrated child ids for re-parenting.
    pub fn move_half_to(src: &mut [u8], dst: &mut [u8]) -> Vec<PageId> {
        let size = BTreeNode::size(src);
        let mid = size / 2;

        dst[Self::entry_offset(0)..Self::entry_offset(size - mid)]
            .copy_from_slice(&src[Self::entry_offset(mid)..Self::entry_offset(size)]);
        BTreeNode::set_size(dst, size - mid);
        BTreeNode::set_size(src, mid);

        (0..size - mid).map(|idx| Self::value_at(dst, idx)).collect()
    }

    /// Appends every entry of `src` to its left sibling `dst`, reviving
    /// src's dead entry-0 key as `middle_key` (the parent separator between
    /// the two). Returns the migrated child ids.
    pub fn move_all_to(src: &mut [u8], dst: &mut [u8], middle_key: IndexKey) -> Vec<PageId> {
        Self::set_key_at(src, 0, middle_key);

        let src_size = BTreeNode::size(src);
        let dst_size = BTreeNode::size(dst);
        dst[Self::entry_offset(dst_size)..Self::entry_offset(dst_size + src_size)]
            .copy_from_slice(&src[Self::entry_offset(0)..Self::entry_offset(src_size)]);
        BTreeNode::set_size(dst, dst_size + src_size);
        BTreeNode::set_size(src, 0);

        (dst_size..dst_size + src_size)
            .map(|idx| Self::value_at(dst, idx))
            .collect()
    }

    /// Moves src's first child to the end of its left sibling `dst`, keyed by
    /// the parent separator. Returns the migrated child id.
    pub fn move_first_to_end_of(src: &mut [u8], dst: &mut [u8], middle_key: IndexKey) -> PageId {
        let child = Self::value_at(src, 0);
        let src_size = BTreeNode::size(src);
        src.copy_within(
            Self::entry_offset(1)..Self::entry_offset(src_size),
            Self::entry_offset(0),
        );
        BTreeNode::set_size(src, src_size - 1);

        let dst_size = BTreeNode::size(dst);
        Self::write_entry(dst, dst_size, middle_key, child);
        BTreeNode::set_size(dst, dst_size + 1);
        child
    }

    /// Moves src's last child to the front of its right sibling `dst`; dst's
    /// former first child is re-keyed by the parent separator. Returns the
    /// migrated child id.
    pub fn move_last_to_front_of(src: &mut [u8], dst: &mut [u8], middle_key: IndexKey) -> PageId {
        let src_size = BTreeNode::size(src);
        let child = Self::value_at(src, src_size - 1);
        BTreeNode::set_size(src, src_size - 1);

        let dst_size = BTreeNode::size(dst);
        dst.copy_within(
            Self::entry_offset(0)..Self::entry_offset(dst_size),
            Self::entry_offset(1),
        );
        Self::write_entry(dst, 0, IndexKey(0), child);
        Self::set_key_at(dst, 1, middle_key);
        BTreeNode::set_size(dst, dst_size + 1);
        child
    }
}
