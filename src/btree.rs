use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{anyhow, bail, Result};
use log::debug;

use crate::buffer_pool::BufferPoolManager;
use crate::page::btree_internal::{self, InternalNode};
use crate::page::btree_leaf::{self, LeafNode};
use crate::page::btree_node::BTreeNode;
use crate::page::header::HeaderPage;
use crate::page::{Page, PageId, HEADER_PAGE_ID, INVALID_PAGE_ID};

pub mod iterator;

pub use iterator::IndexIterator;

// ============================================================================
// IndexKey / Rid
// ============================================================================

/// Fixed-width index key, ordered numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey(pub i64);

impl IndexKey {
    pub const ENCODED_SIZE: usize = 8;

    pub fn to_bytes(self) -> [u8; Self::ENCODED_SIZE] {
        self.0.to_le_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        IndexKey(i64::from_le_bytes(
            bytes[..Self::ENCODED_SIZE].try_into().unwrap(),
        ))
    }
}

/// Record identifier: the heap location an index entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rid {
    pub page_id: u32,
    pub slot_id: u16,
}

impl Rid {
    pub const ENCODED_SIZE: usize = 6;

    pub fn new(page_id: u32, slot_id: u16) -> Self {
        Rid { page_id, slot_id }
    }

    /// Synthetic rid derived from a key, used by the file-driven helpers.
    pub fn from_key(key: IndexKey) -> Self {
        Rid {
            page_id: key.0 as u32,
            slot_id: 0,
        }
    }

    pub fn to_bytes(self) -> [u8; Self::ENCODED_SIZE] {
        let mut buf = [0u8; Self::ENCODED_SIZE];
        buf[0..4].copy_from_slice(&self.page_id.to_le_bytes());
        buf[4..6].copy_from_slice(&self.slot_id.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Rid {
            page_id: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            slot_id: u16::from_le_bytes(bytes[4..6].try_into().unwrap()),
        }
    }
}

// ============================================================================
// BPlusTree
// ============================================================================

struct RootState {
    page_id: Option<PageId>,
    // Whether the header page already has a record for this index
    recorded: bool,
}

#[derive(Clone, Copy)]
enum Target {
    Leftmost,
    Key(IndexKey),
}

/// Disk-resident B+Tree over unique `IndexKey`s, backed entirely by the
/// buffer pool. Structural operations serialize through the tree latch;
/// lookups and iterators share it.
pub struct BPlusTree {
    index_name: String,
    bpm: Arc<Mutex<BufferPoolManager>>,
    leaf_max_size: usize,
    internal_max_size: usize,
    // The guarded state is the root pointer, so holding the latch is the
    // only way into the tree.
    latch: RwLock<RootState>,
}

impl BPlusTree {
    pub fn new(
        index_name: impl Into<String>,
        bpm: Arc<Mutex<BufferPoolManager>>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        let index_name = index_name.into();
        if leaf_max_size < 2 || leaf_max_size >= btree_leaf::CAPACITY {
            bail!("leaf_max_size {leaf_max_size} out of range");
        }
        if internal_max_size < 3 || internal_max_size >= btree_internal::CAPACITY {
            bail!("internal_max_size {internal_max_size} out of range");
        }

        // Pick up the persisted root id, if this index already has one.
        let stored = {
            let mut pool = bpm.lock().unwrap();
            let page = pool.fetch_page(HEADER_PAGE_ID)?;
            let root = HeaderPage::get_root_id(&page.read().unwrap().data, &index_name);
            pool.unpin_page(HEADER_PAGE_ID, false)?;
            root
        };
        let state = match stored {
            Some(INVALID_PAGE_ID) => RootState {
                page_id: None,
                recorded: true,
            },
            Some(page_id) => RootState {
                page_id: Some(page_id),
                recorded: true,
            },
            None => RootState {
                page_id: None,
                recorded: false,
            },
        };

        Ok(BPlusTree {
            index_name,
            bpm,
            leaf_max_size,
            internal_max_size,
            latch: RwLock::new(state),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.latch.read().unwrap().page_id.is_none()
    }

    pub fn root_page_id(&self) -> Option<PageId> {
        self.latch.read().unwrap().page_id
    }

    // ========================================================================
    // Search
    // ========================================================================

    pub fn get_value(&self, key: IndexKey) -> Result<Option<Rid>> {
        let state = self.latch.read().unwrap();
        let Some(root) = state.page_id else {
            return Ok(None);
        };
        let (leaf_id, page) = self.find_leaf_page(root, Target::Key(key))?;
        let result = LeafNode::lookup(&page.read().unwrap().data, key);
        self.bpm.lock().unwrap().unpin_page(leaf_id, false)?;
        Ok(result)
    }

    /// Descends to the leaf that covers the target. Returns the leaf pinned;
    /// every interior page visited is unpinned on the way down.
    fn find_leaf_page(
        &self,
        root: PageId,
        target: Target,
    ) -> Result<(PageId, Arc<RwLock<Page>>)> {
        let mut current = root;
        loop {
            let page = { self.bpm.lock().unwrap().fetch_page(current)? };
            let child = {
                let page = page.read().unwrap();
                if BTreeNode::is_leaf(&page.data) {
                    None
                } else {
                    Some(match target {
                        Target::Leftmost => InternalNode::value_at(&page.data, 0),
                        Target::Key(key) => InternalNode::lookup(&page.data, key),
                    })
                }
            };
            match child {
                None => return Ok((current, page)),
                Some(child_id) => {
                    self.bpm.lock().unwrap().unpin_page(current, false)?;
                    current = child_id;
                }
            }
        }
    }

    // ========================================================================
    // Insert
    // ========================================================================

    /// Inserts a key-rid pair. Returns false (and leaves the tree untouched)
    /// if the key is already present.
    pub fn insert(&self, key: IndexKey, rid: Rid) -> Result<bool> {
        let mut state = self.latch.write().unwrap();
        match state.page_id {
            None => {
                self.start_new_tree(&mut state, key, rid)?;
                Ok(true)
            }
            Some(root) => self.insert_into_leaf(&mut state, root, key, rid),
        }
    }

    fn start_new_tree(&self, state: &mut RootState, key: IndexKey, rid: Rid) -> Result<()> {
        let page_id = {
            let mut pool = self.bpm.lock().unwrap();
            let (page_id, page) = pool.new_page()?;
            {
                let mut page = page.write().unwrap();
                LeafNode::init(&mut page.data, page_id, None, self.leaf_max_size);
                LeafNode::insert(&mut page.data, key, rid);
            }
            pool.unpin_page(page_id, true)?;
            page_id
        };
        state.page_id = Some(page_id);
        debug!("{}: started new tree with root {page_id}", self.index_name);
        self.sync_root(state)
    }

    fn insert_into_leaf(
        &self,
        state: &mut RootState,
        root: PageId,
        key: IndexKey,
        rid: Rid,
    ) -> Result<bool> {
        let (leaf_id, page) = self.find_leaf_page(root, Target::Key(key))?;

        if LeafNode::lookup(&page.read().unwrap().data, key).is_some() {
            self.bpm.lock().unwrap().unpin_page(leaf_id, false)?;
            return Ok(false);
        }

        let overflow = {
            let mut pg = page.write().unwrap();
            let size = LeafNode::insert(&mut pg.data, key, rid);
            size > BTreeNode::max_size(&pg.data)
        };
        if overflow {
            self.split_leaf(state, leaf_id, &page)?;
        }
        self.bpm.lock().unwrap().unpin_page(leaf_id, true)?;
        Ok(true)
    }

    fn split_leaf(
        &self,
        state: &mut RootState,
        leaf_id: PageId,
        page: &Arc<RwLock<Page>>,
    ) -> Result<()> {
        let (new_id, new_page) = { self.bpm.lock().unwrap().new_page()? };
        let middle_key = {
            let mut old = page.write().unwrap();
            let mut new = new_page.write().unwrap();
            let parent = BTreeNode::parent(&old.data);
            LeafNode::init(&mut new.data, new_id, parent, self.leaf_max_size);
            LeafNode::move_half_to(&mut old.data, &mut new.data);
            LeafNode::set_next_page_id(&mut old.data, Some(new_id));
            LeafNode::key_at(&new.data, 0)
        };
        debug!("{}: split leaf {leaf_id} -> {new_id}", self.index_name);
        self.insert_into_parent(state, leaf_id, page, middle_key, new_id, &new_page)?;
        self.bpm.lock().unwrap().unpin_page(new_id, true)?;
        Ok(())
    }

    fn split_internal(
        &self,
        state: &mut RootState,
        node_id: PageId,
        page: &Arc<RwLock<Page>>,
    ) -> Result<()> {
        let (new_id, new_page) = { self.bpm.lock().unwrap().new_page()? };
        let (middle_key, moved) = {
            let mut old = page.write().unwrap();
            let mut new = new_page.write().unwrap();
            let parent = BTreeNode::parent(&old.data);
            InternalNode::init(&mut new.data, new_id, parent, self.internal_max_size);
            let moved = InternalNode::move_half_to(&mut old.data, &mut new.data);
            (InternalNode::key_at(&new.data, 0), moved)
        };
        self.reparent(&moved, new_id)?;
        debug!("{}: split internal {node_id} -> {new_id}", self.index_name);
        self.insert_into_parent(state, node_id, page, middle_key, new_id, &new_page)?;
        self.bpm.lock().unwrap().unpin_page(new_id, true)?;
        Ok(())
    }

    /// Links a freshly split pair into the tree: either grows a new root or
    /// inserts the separator into the existing parent, splitting it in turn
    /// when it overflows. `old` and `new` stay pinned by the caller.
    fn insert_into_parent(
        &self,
        state: &mut RootState,
        old_id: PageId,
        old_page: &Arc<RwLock<Page>>,
        key: IndexKey,
        new_id: PageId,
        new_page: &Arc<RwLock<Page>>,
    ) -> Result<()> {
        if state.page_id == Some(old_id) {
            let (root_id, root_page) = { self.bpm.lock().unwrap().new_page()? };
            {
                let mut root = root_page.write().unwrap();
                InternalNode::init(&mut root.data, root_id, None, self.internal_max_size);
                InternalNode::populate_new_root(&mut root.data, old_id, key, new_id);
            }
            BTreeNode::set_parent(&mut old_page.write().unwrap().data, Some(root_id));
            BTreeNode::set_parent(&mut new_page.write().unwrap().data, Some(root_id));
            self.bpm.lock().unwrap().unpin_page(root_id, true)?;
            state.page_id = Some(root_id);
            debug!("{}: grew new root {root_id}", self.index_name);
            return self.sync_root(state);
        }

        let parent_id = BTreeNode::parent(&old_page.read().unwrap().data)
            .ok_or_else(|| anyhow!("non-root page {old_id} has no parent"))?;
        let parent_page = { self.bpm.lock().unwrap().fetch_page(parent_id)? };
        let overflow = {
            let mut parent = parent_page.write().unwrap();
            let size = InternalNode::insert_node_after(&mut parent.data, old_id, key, new_id);
            size > BTreeNode::max_size(&parent.data)
        };
        if overflow {
            self.split_internal(state, parent_id, &parent_page)?;
        }
        self.bpm.lock().unwrap().unpin_page(parent_id, true)?;
        Ok(())
    }

    /// Rewrites the parent pointer of migrated children.
    fn reparent(&self, children: &[PageId], parent: PageId) -> Result<()> {
        let mut pool = self.bpm.lock().unwrap();
        for &child_id in children {
            let page = pool.fetch_page(child_id)?;
            BTreeNode::set_parent(&mut page.write().unwrap().data, Some(parent));
            pool.unpin_page(child_id, true)?;
        }
        Ok(())
    }

    // ========================================================================
    // Remove
    // ========================================================================

    /// Removes `key` if present; removing an absent key is a no-op.
    pub fn remove(&self, key: IndexKey) -> Result<()> {
        let mut state = self.latch.write().unwrap();
        let Some(root) = state.page_id else {
            return Ok(());
        };
        let (leaf_id, page) = self.find_leaf_page(root, Target::Key(key))?;

        let (removed, underflow) = {
            let mut pg = page.write().unwrap();
            let before = BTreeNode::size(&pg.data);
            let after = LeafNode::remove(&mut pg.data, key);
            (after != before, after < LeafNode::min_size(&pg.data))
        };
        if !removed {
            self.bpm.lock().unwrap().unpin_page(leaf_id, false)?;
            return Ok(());
        }

        let delete_leaf = if underflow {
            self.coalesce_or_redistribute(&mut state, leaf_id, &page)?
        } else {
            false
        };

        let mut pool = self.bpm.lock().unwrap();
        pool.unpin_page(leaf_id, true)?;
        if delete_leaf {
            pool.delete_page(leaf_id)?;
        }
        Ok(())
    }

    /// Repairs an underflowed node by borrowing from or merging with a
    /// sibling. Returns true when the node emptied into its left sibling and
    /// the caller must delete its page.
    fn coalesce_or_redistribute(
        &self,
        state: &mut RootState,
        node_id: PageId,
        page: &Arc<RwLock<Page>>,
    ) -> Result<bool> {
        if state.page_id == Some(node_id) {
            return self.adjust_root(state, page);
        }

        let parent_id = BTreeNode::parent(&page.read().unwrap().data)
            .ok_or_else(|| anyhow!("non-root page {node_id} has no parent"))?;
        let parent_page = { self.bpm.lock().unwrap().fetch_page(parent_id)? };

        let pos = InternalNode::value_index(&parent_page.read().unwrap().data, node_id)
            .ok_or_else(|| anyhow!("page {node_id} missing from parent {parent_id}"))?;
        // Prefer the left sibling; the leftmost child pairs with its right one.
        let sibling_pos = if pos > 0 { pos - 1 } else { pos + 1 };
        let sibling_id = InternalNode::value_at(&parent_page.read().unwrap().data, sibling_pos);
        let sibling_page = { self.bpm.lock().unwrap().fetch_page(sibling_id)? };

        let (node_size, node_max, sibling_size) = {
            let node = page.read().unwrap();
            let sibling = sibling_page.read().unwrap();
            (
                BTreeNode::size(&node.data),
                BTreeNode::max_size(&node.data),
                BTreeNode::size(&sibling.data),
            )
        };

        if node_size + sibling_size > node_max {
            self.redistribute(page, &sibling_page, &parent_page, pos, sibling_pos)?;
            let mut pool = self.bpm.lock().unwrap();
            pool.unpin_page(sibling_id, true)?;
            pool.unpin_page(parent_id, true)?;
            return Ok(false);
        }

        // Merge the right partner of the pair into the left one.
        let node_dies = sibling_pos < pos;
        if node_dies {
            let middle_key = InternalNode::key_at(&parent_page.read().unwrap().data, pos);
            self.merge(page, sibling_id, &sibling_page, middle_key)?;
            InternalNode::remove(&mut parent_page.write().unwrap().data, pos);
        } else {
            let middle_key = InternalNode::key_at(&parent_page.read().unwrap().data, sibling_pos);
            self.merge(&sibling_page, node_id, page, middle_key)?;
            InternalNode::remove(&mut parent_page.write().unwrap().data, sibling_pos);
        }

        {
            let mut pool = self.bpm.lock().unwrap();
            pool.unpin_page(sibling_id, true)?;
            if !node_dies {
                pool.delete_page(sibling_id)?;
            }
        }

        let parent_underflow = {
            let parent = parent_page.read().unwrap();
            BTreeNode::size(&parent.data) < InternalNode::min_size(&parent.data)
        };
        let delete_parent = if parent_underflow {
            self.coalesce_or_redistribute(state, parent_id, &parent_page)?
        } else {
            false
        };

        let mut pool = self.bpm.lock().unwrap();
        pool.unpin_page(parent_id, true)?;
        if delete_parent {
            pool.delete_page(parent_id)?;
        }
        Ok(node_dies)
    }

    /// Empties `src` into its left sibling `dst`; internal merges carry the
    /// parent separator down and re-parent the migrated children.
    fn merge(
        &self,
        src: &Arc<RwLock<Page>>,
        dst_id: PageId,
        dst: &Arc<RwLock<Page>>,
        middle_key: IndexKey,
    ) -> Result<()> {
        let moved = {
            let mut src = src.write().unwrap();
            let mut dst = dst.write().unwrap();
            if BTreeNode::is_leaf(&src.data) {
                LeafNode::move_all_to(&mut src.data, &mut dst.data);
                Vec::new()
            } else {
                InternalNode::move_all_to(&mut src.data, &mut dst.data, middle_key)
            }
        };
        self.reparent(&moved, dst_id)?;
        debug!("{}: coalesced into page {dst_id}", self.index_name);
        Ok(())
    }

    /// Moves one entry from the sibling into the underflowed node and fixes
    /// the separator between them.
    fn redistribute(
        &self,
        node: &Arc<RwLock<Page>>,
        sibling: &Arc<RwLock<Page>>,
        parent: &Arc<RwLock<Page>>,
        pos: usize,
        sibling_pos: usize,
    ) -> Result<()> {
        let node_id = BTreeNode::page_id(&node.read().unwrap().data);
        let moved_child = {
            let mut node = node.write().unwrap();
            let mut sibling = sibling.write().unwrap();
            let mut parent = parent.write().unwrap();
            if BTreeNode::is_leaf(&node.data) {
                if sibling_pos < pos {
                    LeafNode::move_last_to_front_of(&mut sibling.data, &mut node.data);
                    let separator = LeafNode::key_at(&node.data, 0);
                    InternalNode::set_key_at(&mut parent.data, pos, separator);
                } else {
                    LeafNode::move_first_to_end_of(&mut sibling.data, &mut node.data);
                    let separator = LeafNode::key_at(&sibling.data, 0);
                    InternalNode::set_key_at(&mut parent.data, sibling_pos, separator);
                }
                None
            } else if sibling_pos < pos {
                let middle_key = InternalNode::key_at(&parent.data, pos);
                let last = BTreeNode::size(&sibling.data) - 1;
                let separator = InternalNode::key_at(&sibling.data, last);
                let child =
                    InternalNode::move_last_to_front_of(&mut sibling.data, &mut node.data, middle_key);
                InternalNode::set_key_at(&mut parent.data, pos, separator);
                Some(child)
            } else {
                let middle_key = InternalNode::key_at(&parent.data, sibling_pos);
                let separator = InternalNode::key_at(&sibling.data, 1);
                let child =
                    InternalNode::move_first_to_end_of(&mut sibling.data, &mut node.data, middle_key);
                InternalNode::set_key_at(&mut parent.data, sibling_pos, separator);
                Some(child)
            }
        };
        if let Some(child) = moved_child {
            self.reparent(&[child], node_id)?;
        }
        debug!("{}: redistributed into page {node_id}", self.index_name);
        Ok(())
    }

    /// Shrinks the root after a deletion: an empty leaf root empties the
    /// tree; an internal root left with one child promotes it. Returns true
    /// when the old root page should be deleted.
    fn adjust_root(&self, state: &mut RootState, page: &Arc<RwLock<Page>>) -> Result<bool> {
        let (is_leaf, size) = {
            let page = page.read().unwrap();
            (BTreeNode::is_leaf(&page.data), BTreeNode::size(&page.data))
        };

        if is_leaf {
            if size > 0 {
                return Ok(false);
            }
            state.page_id = None;
            self.sync_root(state)?;
            debug!("{}: tree is now empty", self.index_name);
            return Ok(true);
        }

        if size > 1 {
            return Ok(false);
        }
        let child_id = InternalNode::remove_and_return_only_child(&mut page.write().unwrap().data);
        {
            let mut pool = self.bpm.lock().unwrap();
            let child = pool.fetch_page(child_id)?;
            BTreeNode::set_parent(&mut child.write().unwrap().data, None);
            pool.unpin_page(child_id, true)?;
        }
        state.page_id = Some(child_id);
        self.sync_root(state)?;
        debug!("{}: root collapsed to page {child_id}", self.index_name);
        Ok(true)
    }

    // ========================================================================
    // Iteration
    // ========================================================================

    /// Forward iterator over every entry, in key order.
    pub fn iter(&self) -> Result<IndexIterator<'_>> {
        let state = self.latch.read().unwrap();
        let leaf = match state.page_id {
            Some(root) => Some(self.find_leaf_page(root, Target::Leftmost)?),
            None => None,
        };
        Ok(IndexIterator::new(state, Arc::clone(&self.bpm), leaf, 0))
    }

    /// Forward iterator starting at the first entry with key >= `key`.
    pub fn iter_from(&self, key: IndexKey) -> Result<IndexIterator<'_>> {
        let state = self.latch.read().unwrap();
        let (leaf, idx) = match state.page_id {
            Some(root) => {
                let (leaf_id, page) = self.find_leaf_page(root, Target::Key(key))?;
                let idx = LeafNode::key_index(&page.read().unwrap().data, key);
                (Some((leaf_id, page)), idx)
            }
            None => (None, 0),
        };
        Ok(IndexIterator::new(state, Arc::clone(&self.bpm), leaf, idx))
    }

    // ========================================================================
    // Root persistence
    // ========================================================================

    /// Writes the current root id into the header page record for this
    /// index, creating the record on first use.
    fn sync_root(&self, state: &mut RootState) -> Result<()> {
        let root = state.page_id.unwrap_or(INVALID_PAGE_ID);
        let ok = {
            let mut pool = self.bpm.lock().unwrap();
            let page = pool.fetch_page(HEADER_PAGE_ID)?;
            let ok = {
                let mut page = page.write().unwrap();
                if state.recorded {
                    HeaderPage::update_record(&mut page.data, &self.index_name, root)
                } else {
                    HeaderPage::insert_record(&mut page.data, &self.index_name, root)
                }
            };
            pool.unpin_page(HEADER_PAGE_ID, true)?;
            ok
        };
        if !ok {
            bail!("cannot record root of index {:?} in header page", self.index_name);
        }
        state.recorded = true;
        Ok(())
    }

    // ========================================================================
    // Test helpers / debugging
    // ========================================================================

    /// Inserts whitespace-separated i64 keys read from a file, pairing each
    /// key with a rid derived from it.
    pub fn insert_from_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = fs::read_to_string(path)?;
        for token in contents.split_whitespace() {
            let key = IndexKey(token.parse()?);
            self.insert(key, Rid::from_key(key))?;
        }
        Ok(())
    }

    /// Removes whitespace-separated i64 keys read from a file.
    pub fn remove_from_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = fs::read_to_string(path)?;
        for token in contents.split_whitespace() {
            self.remove(IndexKey(token.parse()?))?;
        }
        Ok(())
    }

    /// Textual dump of the tree structure, one page per line.
    pub fn to_string_tree(&self) -> Result<String> {
        let state = self.latch.read().unwrap();
        let mut out = String::new();
        match state.page_id {
            Some(root) => self.dump_page(root, 0, &mut out)?,
            None => out.push_str("(empty)\n"),
        }
        Ok(out)
    }

    fn dump_page(&self, page_id: PageId, depth: usize, out: &mut String) -> Result<()> {
        let page = { self.bpm.lock().unwrap().fetch_page(page_id)? };
        let children = {
            let page = page.read().unwrap();
            let indent = "  ".repeat(depth);
            let size = BTreeNode::size(&page.data);
            if BTreeNode::is_leaf(&page.data) {
                let keys: Vec<String> = (0..size)
                    .map(|idx| LeafNode::key_at(&page.data, idx).0.to_string())
                    .collect();
                let next = LeafNode::next_page_id(&page.data);
                out.push_str(&format!(
                    "{indent}leaf {page_id} next={next:?} keys=[{}]\n",
                    keys.join(",")
                ));
                Vec::new()
            } else {
                let separators: Vec<String> = (1..size)
                    .map(|idx| InternalNode::key_at(&page.data, idx).0.to_string())
                    .collect();
                out.push_str(&format!(
                    "{indent}internal {page_id} separators=[{}]\n",
                    separators.join(",")
                ));
                (0..size)
                    .map(|idx| InternalNode::value_at(&page.data, idx))
                    .collect()
            }
        };
        self.bpm.lock().unwrap().unpin_page(page_id, false)?;
        for child in children {
            self.dump_page(child, depth + 1, out)?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
