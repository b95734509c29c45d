use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

use anyhow::Result;
use log::debug;

use crate::page::{PageId, PAGE_SIZE};

/// File-backed page store. Pages live at `page_id * PAGE_SIZE`; allocation
/// is append-only.
pub struct DiskManager {
    file: File,
    page_count: u32,
}

impl DiskManager {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        // Any torn tail rounds down to a whole page. Page 0 is the header
        // page, so an empty file grows to hold it right away.
        let mut page_count = (file.metadata()?.len() / PAGE_SIZE as u64) as u32;
        if page_count == 0 {
            file.set_len(PAGE_SIZE as u64)?;
            page_count = 1;
        }

        Ok(DiskManager { file, page_count })
    }

    pub fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        self.file.read_exact_at(buf, Self::offset_of(page_id))?;
        Ok(())
    }

    pub fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        self.file.write_all_at(data, Self::offset_of(page_id))?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Hands out the next page id, growing the file by one page. The new
    /// page reads back as zeroes until first written.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        let page_id = self.page_count;
        self.page_count += 1;
        self.file.set_len(Self::offset_of(self.page_count))?;
        debug!("allocated page {page_id}");
        Ok(page_id)
    }

    /// Releases `page_id`. No free-space map is kept, so freed pages are
    /// never handed out again.
    pub fn deallocate_page(&mut self, page_id: PageId) {
        debug!("deallocated page {page_id}");
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    fn offset_of(page_id: PageId) -> u64 {
        page_id as u64 * PAGE_SIZE as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_reserves_header_page() {
        let dir = tempdir().unwrap();
        let disk = DiskManager::open(dir.path().join("test.db")).unwrap();
        assert_eq!(disk.page_count(), 1);

        // The reserved header page reads back zeroed
        let mut buf = [0xFFu8; PAGE_SIZE];
        disk.read_page(0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_and_read_page() {
        let dir = tempdir().unwrap();
        let mut disk = DiskManager::open(dir.path().join("test.db")).unwrap();

        let page_id = disk.allocate_page().unwrap();
        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0xAB;
        data[PAGE_SIZE - 1] = 0xCD;
        disk.write_page(page_id, &data).unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        disk.read_page(page_id, &mut buf).unwrap();
        assert_eq!(buf[0], 0xAB);
        assert_eq!(buf[PAGE_SIZE - 1], 0xCD);
    }

    #[test]
    fn test_allocate_extends_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut disk = DiskManager::open(&path).unwrap();

        let p1 = disk.allocate_page().unwrap();
        let p2 = disk.allocate_page().unwrap();
        assert_eq!(p2, p1 + 1);
        assert_eq!(disk.page_count(), 3);

        // A fresh page reads back zeroed before its first write
        let mut buf = [0xFFu8; PAGE_SIZE];
        disk.read_page(p2, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));

        // Reopening sees the same page count.
        drop(disk);
        let disk = DiskManager::open(&path).unwrap();
        assert_eq!(disk.page_count(), 3);
    }
}
