use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};

use anyhow::Result;
use log::warn;

use crate::buffer_pool::BufferPoolManager;
use crate::page::btree_leaf::LeafNode;
use crate::page::btree_node::BTreeNode;
use crate::page::{Page, PageId};

use super::{IndexKey, Rid, RootState};

/// Forward cursor over the leaf chain. Exactly the current leaf is pinned;
/// advancing past it unpins and follows the sibling pointer. The iterator
/// shares the tree latch for its whole lifetime, so the chain cannot change
/// underneath it.
pub struct IndexIterator<'a> {
    bpm: Arc<Mutex<BufferPoolManager>>,
    leaf: Option<(PageId, Arc<RwLock<Page>>)>,
    idx: usize,
    _latch: RwLockReadGuard<'a, RootState>,
}

impl<'a> IndexIterator<'a> {
    pub(super) fn new(
        latch: RwLockReadGuard<'a, RootState>,
        bpm: Arc<Mutex<BufferPoolManager>>,
        leaf: Option<(PageId, Arc<RwLock<Page>>)>,
        idx: usize,
    ) -> Self {
        IndexIterator {
            bpm,
            leaf,
            idx,
            _latch: latch,
        }
    }

    /// Unpins the current leaf and pins its successor, if any.
    fn advance_leaf(&mut self) -> Result<()> {
        let Some((page_id, page)) = self.leaf.take() else {
            return Ok(());
        };
        let next = LeafNode::next_page_id(&page.read().unwrap().data);
        drop(page);

        let mut pool = self.bpm.lock().unwrap();
        pool.unpin_page(page_id, true)?;
        if let Some(next_id) = next {
            let next_page = pool.fetch_page(next_id)?;
            self.leaf = Some((next_id, next_page));
            self.idx = 0;
        }
        Ok(())
    }
}

impl Iterator for IndexIterator<'_> {
    type Item = (IndexKey, Rid);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (_, page) = self.leaf.as_ref()?;
            let item = {
                let page = page.read().unwrap();
                if self.idx < BTreeNode::size(&page.data) {
                    Some(LeafNode::item(&page.data, self.idx))
                } else {
                    None
                }
            };
            match item {
                Some(item) => {
                    self.idx += 1;
                    return Some(item);
                }
                None => {
                    if let Err(err) = self.advance_leaf() {
                        warn!("index iterator stopped early: {err}");
                        return None;
                    }
                }
            }
        }
    }
}

impl Drop for IndexIterator<'_> {
    fn drop(&mut self) {
        if let Some((page_id, page)) = self.leaf.take() {
            drop(page);
            if let Err(err) = self.bpm.lock().unwrap().unpin_page(page_id, true) {
                warn!("index iterator failed to unpin leaf {page_id}: {err}");
            }
        }
    }
}
