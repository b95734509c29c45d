use super::{PageId, INVALID_PAGE_ID, PAGE_SIZE};

// Header shared by both B+Tree node kinds (24 bytes):
//   [0]      node_type: u8 (1 = internal, 2 = leaf)
//   [1..5]   lsn: u32 (reserved for log sequencing, written as 0)
//   [5..9]   size: u32 (current entry count)
//   [9..13]  max_size: u32
//   [13..17] parent_page_id: u32 (u32::MAX = root)
//   [17..21] page_id: u32
//   [21..24] reserved

pub const NODE_TYPE_INTERNAL: u8 = 1;
pub const NODE_TYPE_LEAF: u8 = 2;

pub const COMMON_HEADER_SIZE: usize = 24;

pub struct BTreeNode;

impl BTreeNode {
    pub fn init(
        data: &mut [u8],
        node_type: u8,
        page_id: PageId,
        parent: Option<PageId>,
        max_size: usize,
    ) {
        assert!(data.len() >= PAGE_SIZE);
        data[..COMMON_HEADER_SIZE].fill(0);
        data[0] = node_type;
        Self::set_size(data, 0);
        Self::set_max_size(data, max_size);
        Self::set_parent(data, parent);
        Self::set_page_id(data, page_id);
    }

    pub fn is_leaf(data: &[u8]) -> bool {
        data[0] == NODE_TYPE_LEAF
    }

    pub fn size(data: &[u8]) -> usize {
        u32::from_le_bytes(data[5..9].try_into().unwrap()) as usize
    }

    pub fn set_size(data: &mut [u8], size: usize) {
        data[5..9].copy_from_slice(&(size as u32).to_le_bytes());
    }

    pub fn max_size(data: &[u8]) -> usize {
        u32::from_le_bytes(data[9..13].try_into().unwrap()) as usize
    }

    pub fn set_max_size(data: &mut [u8], max_size: usize) {
        data[9..13].copy_from_slice(&(max_size as u32).to_le_bytes());
    }

    pub fn parent(data: &[u8]) -> Option<PageId> {
        let page_id = u32::from_le_bytes(data[13..17].try_into().unwrap());
        if page_id == INVALID_PAGE_ID {
            None
        } else {
            Some(page_id)
        }
    }

    pub fn set_parent(data: &mut [u8], parent: Option<PageId>) {
        let value = parent.unwrap_or(INVALID_PAGE_ID);
        data[13..17].copy_from_slice(&value.to_le_bytes());
    }

    pub fn is_root(data: &[u8]) -> bool {
        Self::parent(data).is_none()
    }

    pub fn page_id(data: &[u8]) -> PageId {
        u32::from_le_bytes(data[17..21].try_into().unwrap())
    }

    pub fn set_page_id(data: &mut [u8], page_id: PageId) {
        data[17..21].copy_from_slice(&page_id.to_le_bytes());
    }
}
