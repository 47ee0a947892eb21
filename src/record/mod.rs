//! Heap file / record manager: slotted pages over the buffer pool, with a
//! free-page chain and a full-table scan (spec.md §4.2).
//!
//! Grounded on the teacher's `table/mod.rs` + `pages/table_page.rs` shape
//! (a file handle wrapping a pinned buffer-pool frame per operation),
//! generalized from the teacher's variable-length/linked-tuple layout to the
//! fixed-width slotted-page layout `original_source/src/record/rm_file_handle.cpp`
//! actually implements.

pub mod layout;

use crate::buffer::BufferPoolManager;
use crate::error::Error;
use crate::page::{Fd, PageId};
use anyhow::Result;
use layout::{
    bit_is_set, bitmap_offset, clear_bit, first_clear_bit, next_set_bit, page_hdr_len, set_bit,
    slots_offset, FileHeader, PageHeader, RM_FIRST_RECORD_PAGE, RM_NO_PAGE,
};
use parking_lot::Mutex;
use std::sync::Arc;

pub use layout::{Record, Rid};

pub struct RmFileHandle {
    fd: Fd,
    bpm: Arc<Mutex<BufferPoolManager>>,
    file_hdr: Mutex<FileHeader>,
}

impl RmFileHandle {
    /// Creates a brand-new heap file: writes the header page only. Data
    /// pages are added lazily by `insert_record`.
    pub fn create(bpm: Arc<Mutex<BufferPoolManager>>, fd: Fd, record_size: usize) -> Result<Self> {
        let file_hdr = FileHeader::new(record_size);
        {
            let mut pool = bpm.lock();
            let (page_id, frame_id) = pool
                .new_page(fd)?
                .ok_or_else(|| Error::Internal("no frame available for file header".into()))?;
            if page_id.page_no != 0 {
                return Err(Error::Internal(format!(
                    "expected file header to land on page 0, got {}",
                    page_id.page_no
                ))
                .into());
            }
            pool.frame_data_mut(frame_id).write(0, &file_hdr.to_bytes());
            pool.unpin_page(page_id, true);
            pool.flush_page(page_id)?;
        }
        Ok(Self {
            fd,
            bpm,
            file_hdr: Mutex::new(file_hdr),
        })
    }

    /// Opens an existing heap file, reading its header page.
    pub fn open(bpm: Arc<Mutex<BufferPoolManager>>, fd: Fd) -> Result<Self> {
        let file_hdr = {
            let mut pool = bpm.lock();
            let frame_id = pool
                .fetch_page(PageId::new(fd, 0))?
                .ok_or_else(|| Error::Internal("no frame available for file header".into()))?;
            let hdr = FileHeader::from_bytes(pool.frame_data(frame_id).read(0, 20));
            pool.unpin_page(PageId::new(fd, 0), false);
            hdr
        };
        Ok(Self {
            fd,
            bpm,
            file_hdr: Mutex::new(file_hdr),
        })
    }

    pub fn fd(&self) -> Fd {
        self.fd
    }

    pub fn record_size(&self) -> usize {
        self.file_hdr.lock().record_size as usize
    }

    pub fn num_pages(&self) -> i32 {
        self.file_hdr.lock().num_pages
    }

    fn persist_file_hdr(&self, hdr: FileHeader) -> Result<()> {
        let mut pool = self.bpm.lock();
        let page_id = PageId::new(self.fd, 0);
        let frame_id = pool
            .fetch_page(page_id)?
            .ok_or_else(|| Error::Internal("no frame available for file header".into()))?;
        pool.frame_data_mut(frame_id).write(0, &hdr.to_bytes());
        pool.unpin_page(page_id, true);
        Ok(())
    }

    fn read_page_header(pool: &BufferPoolManager, frame_id: usize) -> PageHeader {
        PageHeader::from_bytes(pool.frame_data(frame_id).read(0, page_hdr_len()))
    }

    fn write_page_header(pool: &mut BufferPoolManager, frame_id: usize, hdr: PageHeader) {
        pool.frame_data_mut(frame_id).write(0, &hdr.to_bytes());
    }

    /// Allocates a new data page, initializes its header and bitmap, links it
    /// to the head of the free chain, and returns its page number.
    pub fn create_new_page_handle(&self) -> Result<i32> {
        let mut pool = self.bpm.lock();
        let (page_id, frame_id) = pool
            .new_page(self.fd)?
            .ok_or_else(|| Error::Internal("no frame available for new page".into()))?;

        let hdr = PageHeader {
            num_records: 0,
            next_free_page_no: RM_NO_PAGE,
        };
        Self::write_page_header(&mut pool, frame_id, hdr);
        pool.unpin_page(page_id, true);
        drop(pool);

        let mut file_hdr = self.file_hdr.lock();
        file_hdr.num_pages += 1;
        file_hdr.first_free_page_no = page_id.page_no;
        let snapshot = *file_hdr;
        drop(file_hdr);
        self.persist_file_hdr(snapshot)?;

        Ok(page_id.page_no)
    }

    fn unlink_from_free_chain(&self, page_no: i32) -> Result<()> {
        let mut file_hdr = self.file_hdr.lock();
        if file_hdr.first_free_page_no == page_no {
            let next = {
                let mut pool = self.bpm.lock();
                let id = PageId::new(self.fd, page_no);
                let frame_id = pool
                    .fetch_page(id)?
                    .ok_or_else(|| Error::Internal("no frame available".into()))?;
                let hdr = Self::read_page_header(&pool, frame_id);
                pool.unpin_page(id, false);
                hdr.next_free_page_no
            };
            file_hdr.first_free_page_no = next;
            let snapshot = *file_hdr;
            drop(file_hdr);
            return self.persist_file_hdr(snapshot);
        }
        drop(file_hdr);

        let mut cur = self.file_hdr.lock().first_free_page_no;
        while cur != RM_NO_PAGE {
            let cur_next = {
                let mut pool = self.bpm.lock();
                let id = PageId::new(self.fd, cur);
                let frame_id = pool
                    .fetch_page(id)?
                    .ok_or_else(|| Error::Internal("no frame available".into()))?;
                let hdr = Self::read_page_header(&pool, frame_id);
                pool.unpin_page(id, false);
                hdr.next_free_page_no
            };
            if cur_next == page_no {
                let target_next = {
                    let mut pool = self.bpm.lock();
                    let id = PageId::new(self.fd, page_no);
                    let frame_id = pool
                        .fetch_page(id)?
                        .ok_or_else(|| Error::Internal("no frame available".into()))?;
                    let hdr = Self::read_page_header(&pool, frame_id);
                    pool.unpin_page(id, false);
                    hdr.next_free_page_no
                };
                let mut pool = self.bpm.lock();
                let id = PageId::new(self.fd, cur);
                let frame_id = pool
                    .fetch_page(id)?
                    .ok_or_else(|| Error::Internal("no frame available".into()))?;
                let mut hdr = Self::read_page_header(&pool, frame_id);
                hdr.next_free_page_no = target_next;
                Self::write_page_header(&mut pool, frame_id, hdr);
                pool.unpin_page(id, true);
                return Ok(());
            }
            cur = cur_next;
        }
        Ok(())
    }

    fn link_into_free_chain(&self, page_no: i32) -> Result<()> {
        let mut file_hdr = self.file_hdr.lock();
        let old_head = file_hdr.first_free_page_no;

        let mut pool = self.bpm.lock();
        let id = PageId::new(self.fd, page_no);
        let frame_id = pool
            .fetch_page(id)?
            .ok_or_else(|| Error::Internal("no frame available".into()))?;
        let mut hdr = Self::read_page_header(&pool, frame_id);
        hdr.next_free_page_no = old_head;
        Self::write_page_header(&mut pool, frame_id, hdr);
        pool.unpin_page(id, true);
        drop(pool);

        file_hdr.first_free_page_no = page_no;
        let snapshot = *file_hdr;
        drop(file_hdr);
        self.persist_file_hdr(snapshot)
    }

    /// Inserts `buf`, choosing a page from the free chain (or allocating a
    /// new one), and returns the rid it was placed at.
    pub fn insert_record(&self, buf: &[u8]) -> Result<Rid> {
        let first_free = self.file_hdr.lock().first_free_page_no;
        let page_no = if first_free == RM_NO_PAGE {
            self.create_new_page_handle()?
        } else {
            first_free
        };

        let (num_records_per_page, bitmap_size, record_size) = {
            let hdr = self.file_hdr.lock();
            (
                hdr.num_records_per_page as usize,
                hdr.bitmap_size as usize,
                hdr.record_size as usize,
            )
        };

        let mut pool = self.bpm.lock();
        let id = PageId::new(self.fd, page_no);
        let frame_id = pool
            .fetch_page(id)?
            .ok_or_else(|| Error::Internal("no frame available".into()))?;

        let bitmap_off = bitmap_offset();
        let bitmap = pool.frame_data(frame_id).read(bitmap_off, bitmap_size).to_vec();
        let slot_no = first_clear_bit(&bitmap, num_records_per_page)
            .ok_or_else(|| Error::Internal(format!("page {page_no} reported free but full")))?;

        let slot_off = slots_offset(bitmap_size) + slot_no * record_size;
        pool.frame_data_mut(frame_id).write(slot_off, buf);

        let mut new_bitmap = bitmap;
        set_bit(&mut new_bitmap, slot_no);
        pool.frame_data_mut(frame_id).write(bitmap_off, &new_bitmap);

        let mut hdr = Self::read_page_header(&pool, frame_id);
        hdr.num_records += 1;
        let became_full = hdr.num_records as usize == num_records_per_page;
        Self::write_page_header(&mut pool, frame_id, hdr);
        pool.unpin_page(id, true);
        drop(pool);

        if became_full {
            self.unlink_from_free_chain(page_no)?;
        }

        Ok(Rid::new(page_no, slot_no as i32))
    }

    /// Positional insert used by undo: writes at the exact `rid`.
    pub fn insert_record_at(&self, rid: Rid, buf: &[u8]) -> Result<()> {
        let (num_records_per_page, bitmap_size, record_size) = {
            let hdr = self.file_hdr.lock();
            (
                hdr.num_records_per_page as usize,
                hdr.bitmap_size as usize,
                hdr.record_size as usize,
            )
        };

        let became_full = {
            let mut pool = self.bpm.lock();
            let id = PageId::new(self.fd, rid.page_no);
            let frame_id = pool
                .fetch_page(id)?
                .ok_or_else(|| Error::Internal("no frame available".into()))?;

            let bitmap_off = bitmap_offset();
            let mut bitmap = pool.frame_data(frame_id).read(bitmap_off, bitmap_size).to_vec();
            set_bit(&mut bitmap, rid.slot_no as usize);
            pool.frame_data_mut(frame_id).write(bitmap_off, &bitmap);

            let slot_off = slots_offset(bitmap_size) + rid.slot_no as usize * record_size;
            pool.frame_data_mut(frame_id).write(slot_off, buf);

            let mut hdr = Self::read_page_header(&pool, frame_id);
            hdr.num_records += 1;
            let became_full = hdr.num_records as usize == num_records_per_page;
            Self::write_page_header(&mut pool, frame_id, hdr);
            pool.unpin_page(id, true);
            became_full
        };

        if became_full {
            self.unlink_from_free_chain(rid.page_no)?;
        }
        Ok(())
    }

    pub fn get_record(&self, rid: Rid) -> Result<Record> {
        let (bitmap_size, record_size) = {
            let hdr = self.file_hdr.lock();
            (hdr.bitmap_size as usize, hdr.record_size as usize)
        };

        let mut pool = self.bpm.lock();
        let id = PageId::new(self.fd, rid.page_no);
        let frame_id = pool
            .fetch_page(id)?
            .ok_or_else(|| Error::Internal("no frame available".into()))?;

        let bitmap = pool.frame_data(frame_id).read(bitmap_offset(), bitmap_size);
        if !bit_is_set(bitmap, rid.slot_no as usize) {
            pool.unpin_page(id, false);
            return Err(Error::RecordNotFound(rid).into());
        }

        let slot_off = slots_offset(bitmap_size) + rid.slot_no as usize * record_size;
        let data = pool.frame_data(frame_id).read(slot_off, record_size).to_vec();
        pool.unpin_page(id, false);
        Ok(Record::new(data))
    }

    pub fn update_record(&self, rid: Rid, buf: &[u8]) -> Result<()> {
        let (bitmap_size, record_size) = {
            let hdr = self.file_hdr.lock();
            (hdr.bitmap_size as usize, hdr.record_size as usize)
        };

        let mut pool = self.bpm.lock();
        let id = PageId::new(self.fd, rid.page_no);
        let frame_id = pool
            .fetch_page(id)?
            .ok_or_else(|| Error::Internal("no frame available".into()))?;

        let bitmap = pool.frame_data(frame_id).read(bitmap_offset(), bitmap_size);
        if !bit_is_set(bitmap, rid.slot_no as usize) {
            pool.unpin_page(id, false);
            return Err(Error::RecordNotFound(rid).into());
        }

        let slot_off = slots_offset(bitmap_size) + rid.slot_no as usize * record_size;
        pool.frame_data_mut(frame_id).write(slot_off, buf);
        pool.unpin_page(id, true);
        Ok(())
    }

    pub fn delete_record(&self, rid: Rid) -> Result<()> {
        let (num_records_per_page, bitmap_size) = {
            let hdr = self.file_hdr.lock();
            (hdr.num_records_per_page as usize, hdr.bitmap_size as usize)
        };

        let was_full = {
            let mut pool = self.bpm.lock();
            let id = PageId::new(self.fd, rid.page_no);
            let frame_id = pool
                .fetch_page(id)?
                .ok_or_else(|| Error::Internal("no frame available".into()))?;

            let bitmap_off = bitmap_offset();
            let mut bitmap = pool.frame_data(frame_id).read(bitmap_off, bitmap_size).to_vec();
            if !bit_is_set(&bitmap, rid.slot_no as usize) {
                pool.unpin_page(id, false);
                return Err(Error::RecordNotFound(rid).into());
            }
            clear_bit(&mut bitmap, rid.slot_no as usize);
            pool.frame_data_mut(frame_id).write(bitmap_off, &bitmap);

            let mut hdr = Self::read_page_header(&pool, frame_id);
            let was_full = hdr.num_records as usize == num_records_per_page;
            hdr.num_records -= 1;
            Self::write_page_header(&mut pool, frame_id, hdr);
            pool.unpin_page(id, true);
            was_full
        };

        if was_full {
            self.link_into_free_chain(rid.page_no)?;
        }
        Ok(())
    }

    fn read_bitmap(&self, page_no: i32, bitmap_size: usize) -> Result<Vec<u8>> {
        let mut pool = self.bpm.lock();
        let id = PageId::new(self.fd, page_no);
        let frame_id = pool
            .fetch_page(id)?
            .ok_or_else(|| Error::Internal("no frame available".into()))?;
        let bitmap = pool.frame_data(frame_id).read(bitmap_offset(), bitmap_size).to_vec();
        pool.unpin_page(id, false);
        Ok(bitmap)
    }

    pub fn scan(self: &Arc<Self>) -> Result<RmScan> {
        RmScan::open(self.clone())
    }
}

/// Forward iterator over occupied rids in `(page_no, slot_no)` order.
pub struct RmScan {
    handle: Arc<RmFileHandle>,
    page_no: i32,
    slot_no: i32,
}

impl RmScan {
    pub fn open(handle: Arc<RmFileHandle>) -> Result<Self> {
        let mut scan = Self {
            handle,
            page_no: RM_FIRST_RECORD_PAGE,
            slot_no: -1,
        };
        scan.advance()?;
        Ok(scan)
    }

    pub fn is_end(&self) -> bool {
        self.page_no == RM_NO_PAGE
    }

    pub fn rid(&self) -> Rid {
        Rid::new(self.page_no, self.slot_no)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<()> {
        self.advance()
    }

    fn advance(&mut self) -> Result<()> {
        let (num_pages, num_records_per_page, bitmap_size) = {
            let hdr = self.handle.file_hdr.lock();
            (
                hdr.num_pages,
                hdr.num_records_per_page as usize,
                hdr.bitmap_size as usize,
            )
        };

        loop {
            if self.page_no >= num_pages {
                self.page_no = RM_NO_PAGE;
                self.slot_no = -1;
                return Ok(());
            }
            let bitmap = self.handle.read_bitmap(self.page_no, bitmap_size)?;
            if let Some(slot) = next_set_bit(&bitmap, num_records_per_page, self.slot_no) {
                self.slot_no = slot as i32;
                return Ok(());
            }
            self.page_no += 1;
            self.slot_no = -1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DiskManager;

    fn handle(record_size: usize, pool_size: usize) -> (Arc<RmFileHandle>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut disk = DiskManager::new(dir.path()).unwrap();
        let fd = disk.open_file("t").unwrap();
        let bpm = Arc::new(Mutex::new(BufferPoolManager::new(pool_size, disk)));
        let h = Arc::new(RmFileHandle::create(bpm, fd, record_size).unwrap());
        (h, dir)
    }

    #[test]
    fn insert_then_get_round_trips() {
        let (h, _dir) = handle(8, 10);
        let rid = h.insert_record(b"hellohi!").unwrap();
        let rec = h.get_record(rid).unwrap();
        assert_eq!(rec.data, b"hellohi!");
    }

    #[test]
    fn delete_then_reinsert_same_rid_round_trips() {
        let (h, _dir) = handle(8, 10);
        let rid = h.insert_record(b"aaaaaaaa").unwrap();
        h.delete_record(rid).unwrap();
        h.insert_record_at(rid, b"bbbbbbbb").unwrap();
        assert_eq!(h.get_record(rid).unwrap().data, b"bbbbbbbb");
    }

    #[test]
    fn get_on_deleted_slot_fails() {
        let (h, _dir) = handle(8, 10);
        let rid = h.insert_record(b"aaaaaaaa").unwrap();
        h.delete_record(rid).unwrap();
        assert!(h.get_record(rid).is_err());
    }

    #[test]
    fn scan_over_empty_table_is_immediately_done() {
        let (h, _dir) = handle(8, 10);
        let scan = h.scan().unwrap();
        assert!(scan.is_end());
    }

    #[test]
    fn scan_visits_all_inserted_records_in_order() {
        let (h, _dir) = handle(4, 10);
        let mut rids = vec![];
        for i in 0..20u32 {
            rids.push(h.insert_record(&i.to_le_bytes()).unwrap());
        }
        let mut scan = h.scan().unwrap();
        let mut seen = vec![];
        while !scan.is_end() {
            seen.push(scan.rid());
            scan.next().unwrap();
        }
        assert_eq!(seen.len(), 20);
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(seen, sorted);
    }

    #[test]
    fn filling_and_draining_a_page_maintains_free_chain() {
        let (h, _dir) = handle(100, 50);
        let (n, _) = layout::compute_layout(100);
        let mut rids = vec![];
        for i in 0..n {
            let mut buf = vec![0u8; 100];
            buf[0] = i as u8;
            rids.push(h.insert_record(&buf).unwrap());
        }
        assert!(h.file_hdr.lock().first_free_page_no != rids[0].page_no || n == 0);

        for rid in &rids {
            h.delete_record(*rid).unwrap();
        }
        assert_eq!(h.file_hdr.lock().first_free_page_no, rids[0].page_no);

        let rid = h.insert_record(&[9u8; 100]).unwrap();
        assert_eq!(rid.page_no, rids[0].page_no);
    }
}
