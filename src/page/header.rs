use super::{PageId, PAGE_SIZE};

// Header Page Layout (page 0):
//   [0..4]   record_count: u32
//   Records from offset 4, 36 bytes each:
//     [name: 32 bytes, NUL-padded][root_page_id: u32]
//
// Each record maps an index name to its current root page id. A zeroed
// page is a valid empty header, so a freshly allocated page 0 needs no
// explicit initialization.

const RECORD_COUNT_SIZE: usize = 4;
const NAME_SIZE: usize = 32;
const RECORD_SIZE: usize = NAME_SIZE + 4;

pub const MAX_RECORDS: usize = (PAGE_SIZE - RECORD_COUNT_SIZE) / RECORD_SIZE;

pub struct HeaderPage;

impl HeaderPage {
    pub fn record_count(data: &[u8]) -> usize {
        u32::from_le_bytes(data[0..4].try_into().unwrap()) as usize
    }

    fn set_record_count(data: &mut [u8], count: usize) {
        data[0..4].copy_from_slice(&(count as u32).to_le_bytes());
    }

    fn record_offset(idx: usize) -> usize {
        RECORD_COUNT_SIZE + idx * RECORD_SIZE
    }

    fn name_at(data: &[u8], idx: usize) -> &[u8] {
        let offset = Self::record_offset(idx);
        let name = &data[offset..offset + NAME_SIZE];
        let len = name.iter().position(|&b| b == 0).unwrap_or(NAME_SIZE);
        &name[..len]
    }

    fn find_record(data: &[u8], name: &str) -> Option<usize> {
        (0..Self::record_count(data)).find(|&idx| Self::name_at(data, idx) == name.as_bytes())
    }

    fn write_record(data: &mut [u8], idx: usize, name: &str, root_page_id: PageId) {
        let offset = Self::record_offset(idx);
        data[offset..offset + NAME_SIZE].fill(0);
        data[offset..offset + name.len()].copy_from_slice(name.as_bytes());
        data[offset + NAME_SIZE..offset + RECORD_SIZE].copy_from_slice(&root_page_id.to_le_bytes());
    }

    /// Adds a record for `name`. Fails if the name is taken, too long, or
    /// the page is full.
    pub fn insert_record(data: &mut [u8], name: &str, root_page_id: PageId) -> bool {
        if name.is_empty() || name.len() > NAME_SIZE {
            return false;
        }
        let count = Self::record_count(data);
        if count >= MAX_RECORDS || Self::find_record(data, name).is_some() {
            return false;
        }
        Self::write_record(data, count, name, root_page_id);
        Self::set_record_count(data, count + 1);
        true
    }

    /// Rewrites the root id of an existing record. Fails if absent.
    pub fn update_record(data: &mut [u8], name: &str, root_page_id: PageId) -> bool {
        match Self::find_record(data, name) {
            Some(idx) => {
                Self::write_record(data, idx, name, root_page_id);
                true
            }
            None => false,
        }
    }

    /// Drops the record for `name`. Fails if absent.
    pub fn delete_record(data: &mut [u8], name: &str) -> bool {
        let Some(idx) = Self::find_record(data, name) else {
            return false;
        };
        let count = Self::record_count(data);
        data.copy_within(
            Self::record_offset(idx + 1)..Self::record_offset(count),
            Self::record_offset(idx),
        );
        Self::set_record_count(data, count - 1);
        true
    }

    /// The stored root page id for `name`. The stored value may be the
    /// on-disk "no root" sentinel when the tree exists but is empty.
    pub fn get_root_id(data: &[u8], name: &str) -> Option<PageId> {
        let idx = Self::find_record(data, name)?;
        let offset = Self::record_offset(idx) + NAME_SIZE;
        Some(PageId::from_le_bytes(data[offset..offset + 4].try_into().unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::INVALID_PAGE_ID;

    #[test]
    fn test_empty_header() {
        let data = vec![0u8; PAGE_SIZE];
        assert_eq!(HeaderPage::record_count(&data), 0);
        assert_eq!(HeaderPage::get_root_id(&data, "idx"), None);
    }

    #[test]
    fn test_insert_update_delete() {
        let mut data = vec![0u8; PAGE_SIZE];

        assert!(HeaderPage::insert_record(&mut data, "orders_pk", 7));
        assert!(HeaderPage::insert_record(&mut data, "users_pk", 9));
        assert!(!HeaderPage::insert_record(&mut data, "orders_pk", 8)); // taken
        assert_eq!(HeaderPage::get_root_id(&data, "orders_pk"), Some(7));
        assert_eq!(HeaderPage::get_root_id(&data, "users_pk"), Some(9));

        assert!(HeaderPage::update_record(&mut data, "orders_pk", INVALID_PAGE_ID));
        assert_eq!(
            HeaderPage::get_root_id(&data, "orders_pk"),
            Some(INVALID_PAGE_ID)
        );
        assert!(!HeaderPage::update_record(&mut data, "missing", 1));

        assert!(HeaderPage::delete_record(&mut data, "orders_pk"));
        assert!(!HeaderPage::delete_record(&mut data, "orders_pk"));
        assert_eq!(HeaderPage::get_root_id(&data, "orders_pk"), None);
        assert_eq!(HeaderPage::get_root_id(&data, "users_pk"), Some(9));
        assert_eq!(HeaderPage::record_count(&data), 1);
    }

    #[test]
    fn test_name_length_limits() {
        let mut data = vec![0u8; PAGE_SIZE];
        let long = "x".repeat(33);
        assert!(!HeaderPage::insert_record(&mut data, &long, 1));
        let exact = "y".repeat(32);
        assert!(HeaderPage::insert_record(&mut data, &exact, 2));
        assert_eq!(HeaderPage::get_root_id(&data, &exact), Some(2));
    }
}
