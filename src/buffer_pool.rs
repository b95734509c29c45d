use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, bail, Result};
use indexmap::IndexSet;
use log::debug;

use crate::disk::DiskManager;
use crate::page::{FrameId, Page, PageId, INVALID_PAGE_ID, PAGE_SIZE};

// Replacer trait for page replacement policies
pub trait Replacer {
    // Remove and return the frame to evict, oldest-unpinned first
    fn victim(&mut self) -> Option<FrameId>;
    // Mark a frame as pinned (not evictable)
    fn pin(&mut self, frame_id: FrameId);
    // Mark a frame as unpinned (evictable)
    fn unpin(&mut self, frame_id: FrameId);
    // Number of evictable frames
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct LruReplacer {
    evictable: IndexSet<FrameId>, // unpin order, O(1) lookup
}

impl LruReplacer {
    pub fn new() -> Self {
        LruReplacer {
            evictable: IndexSet::new(),
        }
    }
}

impl Default for LruReplacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Replacer for LruReplacer {
    fn victim(&mut self) -> Option<FrameId> {
        self.evictable.shift_remove_index(0)
    }

    fn pin(&mut self, frame_id: FrameId) {
        self.evictable.shift_remove(&frame_id);
    }

    fn unpin(&mut self, frame_id: FrameId) {
        // An already-evictable frame keeps its position: the pin count
        // reaching zero is the LRU event, not each unpin call.
        self.evictable.insert(frame_id);
    }

    fn len(&self) -> usize {
        self.evictable.len()
    }
}

struct Frame {
    page: Arc<RwLock<Page>>,
    page_id: Option<PageId>,
    pin_count: u32,
    is_dirty: bool,
}

impl Frame {
    fn new() -> Self {
        Frame {
            page: Arc::new(RwLock::new(Page::new())),
            page_id: None,
            pin_count: 0,
            is_dirty: false,
        }
    }
}

// A frame is always in exactly one of three states: on the free list,
// pinned (pin_count > 0), or evictable (tracked by the replacer).
pub struct BufferPoolManager<R: Replacer = LruReplacer> {
    frames: Vec<Frame>,
    free_list: VecDeque<FrameId>,
    page_table: HashMap<PageId, FrameId>, // page_id -> frame_id
    disk_manager: DiskManager,
    replacer: R,
}

impl BufferPoolManager<LruReplacer> {
    pub fn new(pool_size: usize, disk_manager: DiskManager) -> Self {
        Self::with_replacer(pool_size, disk_manager, LruReplacer::new())
    }
}

impl<R: Replacer> BufferPoolManager<R> {
    pub fn with_replacer(pool_size: usize, disk_manager: DiskManager, replacer: R) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            frames.push(Frame::new());
        }
        BufferPoolManager {
            frames,
            free_list: (0..pool_size).collect(),
            page_table: HashMap::new(),
            disk_manager,
            replacer,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    /// Writes back a victim frame and clears its page-table entry.
    fn evict(&mut self, frame_id: FrameId) -> Result<()> {
        let frame = &mut self.frames[frame_id];
        if let Some(old_page_id) = frame.page_id {
            debug!("evicting page {old_page_id} (dirty: {})", frame.is_dirty);
            if frame.is_dirty {
                let page = frame.page.read().unwrap();
                self.disk_manager.write_page(old_page_id, &page.data)?;
            }
            self.page_table.remove(&old_page_id);
        }
        let frame = &mut self.frames[frame_id];
        frame.page_id = None;
        frame.pin_count = 0;
        frame.is_dirty = false;
        Ok(())
    }

    /// Takes a frame for a new resident: free list first, then the replacer.
    fn take_frame(&mut self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_list.pop_front() {
            return Ok(frame_id);
        }
        let victim = self
            .replacer
            .victim()
            .ok_or_else(|| anyhow!("no victim frame: all frames pinned"))?;
        self.evict(victim)?;
        Ok(victim)
    }

    pub fn fetch_page(&mut self, page_id: PageId) -> Result<Arc<RwLock<Page>>> {
        // Already resident: pin and return
        if let Some(&frame_id) = self.page_table.get(&page_id) {
            self.frames[frame_id].pin_count += 1;
            self.replacer.pin(frame_id);
            return Ok(Arc::clone(&self.frames[frame_id].page));
        }

        let frame_id = self.take_frame()?;

        let mut data = [0u8; PAGE_SIZE];
        self.disk_manager.read_page(page_id, &mut data)?;

        let frame = &mut self.frames[frame_id];
        *frame.page.write().unwrap() = Page::from_bytes(&data);
        frame.page_id = Some(page_id);
        frame.pin_count = 1;
        frame.is_dirty = false;

        self.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);

        Ok(Arc::clone(&self.frames[frame_id].page))
    }

    pub fn new_page(&mut self) -> Result<(PageId, Arc<RwLock<Page>>)> {
        let frame_id = self.take_frame()?;
        let page_id = self.disk_manager.allocate_page()?;
        debug!("new page {page_id} in frame {frame_id}");

        let frame = &mut self.frames[frame_id];
        frame.page.write().unwrap().reset();
        frame.page_id = Some(page_id);
        frame.pin_count = 1;
        frame.is_dirty = false;

        self.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);

        Ok((page_id, Arc::clone(&self.frames[frame_id].page)))
    }

    pub fn unpin_page(&mut self, page_id: PageId, is_dirty: bool) -> Result<()> {
        let Some(&frame_id) = self.page_table.get(&page_id) else {
            bail!("page {page_id} not in buffer pool");
        };
        let frame = &mut self.frames[frame_id];
        if is_dirty {
            // Dirty is sticky until written back
            frame.is_dirty = true;
        }
        if frame.pin_count == 0 {
            bail!("page {page_id} is not pinned");
        }
        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            self.replacer.unpin(frame_id);
        }
        Ok(())
    }

    /// Writes the page to disk regardless of the dirty flag, then clears it.
    /// Returns false if the page id is invalid or not resident.
    pub fn flush_page(&mut self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Ok(false);
        }
        let Some(&frame_id) = self.page_table.get(&page_id) else {
            return Ok(false);
        };
        {
            let page = self.frames[frame_id].page.read().unwrap();
            self.disk_manager.write_page(page_id, &page.data)?;
        }
        self.frames[frame_id].is_dirty = false;
        Ok(true)
    }

    pub fn flush_all(&mut self) -> Result<()> {
        let page_ids: Vec<PageId> = self.page_table.keys().copied().collect();
        for page_id in page_ids {
            let frame_id = self.page_table[&page_id];
            if !self.frames[frame_id].is_dirty {
                continue;
            }
            {
                let page = self.frames[frame_id].page.read().unwrap();
                self.disk_manager.write_page(page_id, &page.data)?;
            }
            self.frames[frame_id].is_dirty = false;
        }
        Ok(())
    }

    /// Drops a resident page and frees its frame. Returns false if the page
    /// is still pinned; a page that is not resident counts as deleted.
    pub fn delete_page(&mut self, page_id: PageId) -> Result<bool> {
        let Some(&frame_id) = self.page_table.get(&page_id) else {
            return Ok(true);
        };
        if self.frames[frame_id].pin_count > 0 {
            return Ok(false);
        }
        debug!("deleting page {page_id}");
        self.replacer.pin(frame_id); // drop from the evictable set
        self.page_table.remove(&page_id);
        let frame = &mut self.frames[frame_id];
        frame.page.write().unwrap().reset();
        frame.page_id = None;
        frame.is_dirty = false;
        self.free_list.push_back(frame_id);
        self.disk_manager.deallocate_page(page_id);
        Ok(true)
    }

    /// Pin count of a resident page, None if not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let &frame_id = self.page_table.get(&page_id)?;
        Some(self.frames[frame_id].pin_count)
    }

    /// Dirty flag of a resident page, None if not resident.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let &frame_id = self.page_table.get(&page_id)?;
        Some(self.frames[frame_id].is_dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup_bpm(pool_size: usize) -> (BufferPoolManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let disk_manager = DiskManager::open(dir.path().join("test.db")).unwrap();
        (BufferPoolManager::new(pool_size, disk_manager), dir)
    }

    #[test]
    fn test_lru_victim_order() {
        let mut lru = LruReplacer::new();
        for frame_id in 1..=6 {
            lru.unpin(frame_id);
        }
        assert_eq!(lru.len(), 6);

        assert_eq!(lru.victim(), Some(1));
        assert_eq!(lru.victim(), Some(2));
        assert_eq!(lru.victim(), Some(3));

        lru.pin(3); // not tracked, no-op
        lru.pin(4);
        lru.unpin(4);

        assert_eq!(lru.victim(), Some(5));
        assert_eq!(lru.victim(), Some(6));
        assert_eq!(lru.victim(), Some(4));
        assert_eq!(lru.len(), 0);
        assert_eq!(lru.victim(), None);
    }

    #[test]
    fn test_lru_repeated_unpin_keeps_age() {
        let mut lru = LruReplacer::new();
        lru.unpin(1);
        lru.unpin(2);
        lru.unpin(1); // must not refresh recency
        assert_eq!(lru.victim(), Some(1));
        assert_eq!(lru.victim(), Some(2));
    }

    #[test]
    fn test_lru_pinned_frame_not_victim() {
        let mut lru = LruReplacer::new();
        lru.unpin(1);
        lru.pin(1);
        assert_eq!(lru.victim(), None);
    }

    #[test]
    fn test_new_page_pins_frame() {
        let (mut bpm, _dir) = setup_bpm(3);

        let (page_id, page) = bpm.new_page().unwrap();
        assert_eq!(bpm.pin_count(page_id), Some(1));
        assert_eq!(bpm.is_dirty(page_id), Some(false));
        assert!(page.read().unwrap().data.iter().all(|&b| b == 0));

        // Fetching the same page pins it again and shares the handle
        let again = bpm.fetch_page(page_id).unwrap();
        assert_eq!(bpm.pin_count(page_id), Some(2));
        assert!(Arc::ptr_eq(&page, &again));

        bpm.unpin_page(page_id, false).unwrap();
        bpm.unpin_page(page_id, true).unwrap();
        assert_eq!(bpm.pin_count(page_id), Some(0));
        assert_eq!(bpm.is_dirty(page_id), Some(true));
    }

    #[test]
    fn test_unpin_errors() {
        let (mut bpm, _dir) = setup_bpm(2);
        assert!(bpm.unpin_page(42, false).is_err());

        let (page_id, _page) = bpm.new_page().unwrap();
        bpm.unpin_page(page_id, false).unwrap();
        assert!(bpm.unpin_page(page_id, false).is_err());
    }

    #[test]
    fn test_eviction_writes_back_dirty_page() {
        let (mut bpm, _dir) = setup_bpm(2);

        let (p1, page1) = bpm.new_page().unwrap();
        let (p2, _page2) = bpm.new_page().unwrap();

        // Pool full and both pinned: no frame can be taken
        assert!(bpm.new_page().is_err());

        page1.write().unwrap().data[0] = 0x5A;
        bpm.unpin_page(p1, true).unwrap();

        // p3 reuses p1's frame, forcing the dirty writeback
        let (p3, _page3) = bpm.new_page().unwrap();
        assert_eq!(bpm.pin_count(p1), None);
        assert_eq!(bpm.pin_count(p2), Some(1));

        // Reading p1 back must hit disk and see the written byte
        bpm.unpin_page(p3, false).unwrap();
        let page1 = bpm.fetch_page(p1).unwrap();
        assert_eq!(page1.read().unwrap().data[0], 0x5A);
    }

    #[test]
    fn test_clean_page_eviction_skips_writeback() {
        let (mut bpm, _dir) = setup_bpm(1);

        let (p1, page1) = bpm.new_page().unwrap();
        page1.write().unwrap().data[0] = 0x77;
        bpm.unpin_page(p1, false).unwrap(); // never marked dirty

        let (_p2, _page2) = bpm.new_page().unwrap();

        // p1's frame was reused without writeback, so disk still has zeros
        bpm.unpin_page(_p2, false).unwrap();
        let page1 = bpm.fetch_page(p1).unwrap();
        assert_eq!(page1.read().unwrap().data[0], 0);
    }

    #[test]
    fn test_flush_page() {
        let (mut bpm, dir) = setup_bpm(2);

        let (page_id, page) = bpm.new_page().unwrap();
        page.write().unwrap().data[0] = 100;
        bpm.unpin_page(page_id, true).unwrap();
        assert_eq!(bpm.is_dirty(page_id), Some(true));

        assert!(bpm.flush_page(page_id).unwrap());
        assert_eq!(bpm.is_dirty(page_id), Some(false));

        assert!(!bpm.flush_page(INVALID_PAGE_ID).unwrap());
        assert!(!bpm.flush_page(12345).unwrap());

        // The bytes are on disk: reopen and read directly
        drop(bpm);
        let mut disk = DiskManager::open(dir.path().join("test.db")).unwrap();
        let mut buf = [0u8; PAGE_SIZE];
        disk.read_page(page_id, &mut buf).unwrap();
        assert_eq!(buf[0], 100);
    }

    #[test]
    fn test_flush_all_clears_dirty_bits() {
        let (mut bpm, _dir) = setup_bpm(3);

        let (p1, page1) = bpm.new_page().unwrap();
        let (p2, page2) = bpm.new_page().unwrap();
        page1.write().unwrap().data[0] = 1;
        page2.write().unwrap().data[0] = 2;
        bpm.unpin_page(p1, true).unwrap();
        bpm.unpin_page(p2, true).unwrap();

        bpm.flush_all().unwrap();
        assert_eq!(bpm.is_dirty(p1), Some(false));
        assert_eq!(bpm.is_dirty(p2), Some(false));
    }

    #[test]
    fn test_delete_page() {
        let (mut bpm, _dir) = setup_bpm(2);

        // Unknown pages count as already deleted
        assert!(bpm.delete_page(42).unwrap());

        let (page_id, _page) = bpm.new_page().unwrap();
        assert!(!bpm.delete_page(page_id).unwrap()); // pinned

        bpm.unpin_page(page_id, false).unwrap();
        assert!(bpm.delete_page(page_id).unwrap());
        assert_eq!(bpm.pin_count(page_id), None);

        // The freed frame is reusable: fill the pool again
        let (_p2, _) = bpm.new_page().unwrap();
        let (_p3, _) = bpm.new_page().unwrap();
    }
}
