//! Fixed-size page buffer shared by the file header page and data pages
//! (spec.md DATA MODEL: `PageId`, `Frame`).

pub const PAGE_SIZE: usize = 4096;

/// File handle identifier. One `Fd` per open heap file.
pub type Fd = u32;

/// `page_no = INVALID_PAGE_NO` denotes "no page" (spec.md DATA MODEL).
pub const INVALID_PAGE_NO: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId {
    pub fd: Fd,
    pub page_no: i32,
}

impl PageId {
    pub fn new(fd: Fd, page_no: i32) -> Self {
        Self { fd, page_no }
    }

    pub fn is_valid(&self) -> bool {
        self.page_no != INVALID_PAGE_NO
    }
}

/// A raw, fixed-size block of bytes as cached by the buffer pool.
#[derive(Clone)]
pub struct Page {
    data: [u8; PAGE_SIZE],
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    pub fn new() -> Self {
        Self {
            data: [0u8; PAGE_SIZE],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert_eq!(bytes.len(), PAGE_SIZE);
        let mut page = Self::new();
        page.data.copy_from_slice(bytes);
        page
    }

    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.data
    }

    pub fn read(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    pub fn write(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}
