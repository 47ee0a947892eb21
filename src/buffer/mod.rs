//! Buffer pool: maps `PageId -> Frame`, under a single latch (spec.md §4.1).
//!
//! Grounded on the teacher's `buffer_pool/mod.rs` fetch/new/unpin/flush/delete
//! shape, generalized to the fixed-width slotted-page model instead of the
//! teacher's variable-length/shadow-page one.

pub mod frame;
pub mod replacer;

use crate::disk::DiskManager;
use crate::error::Error;
use crate::page::{Fd, Page, PageId};
use anyhow::Result;
use frame::Frame;
use replacer::{LruReplacer, Replacer};
use std::collections::{HashMap, VecDeque};

pub struct BufferPoolManager {
    frames: Vec<Frame>,
    page_table: HashMap<PageId, usize>,
    free_list: VecDeque<usize>,
    replacer: LruReplacer,
    disk: DiskManager,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk: DiskManager) -> Self {
        let frames = (0..pool_size).map(|_| Frame::empty()).collect();
        let free_list = (0..pool_size).collect();
        Self {
            frames,
            page_table: HashMap::new(),
            free_list,
            replacer: LruReplacer::new(),
            disk,
        }
    }

    pub fn disk_manager_mut(&mut self) -> &mut DiskManager {
        &mut self.disk
    }

    fn victim_frame(&mut self) -> Result<Option<usize>> {
        if let Some(id) = self.free_list.pop_front() {
            return Ok(Some(id));
        }
        let Some(id) = self.replacer.victim() else {
            return Ok(None);
        };
        self.write_back_if_dirty(id)?;
        if let Some(old_id) = self.frames[id].page_id.take() {
            self.page_table.remove(&old_id);
        }
        Ok(Some(id))
    }

    fn write_back_if_dirty(&mut self, frame_id: usize) -> Result<()> {
        let frame = &self.frames[frame_id];
        if frame.is_dirty {
            if let Some(page_id) = frame.page_id {
                self.disk.write_page(page_id, &frame.data)?;
            }
        }
        Ok(())
    }

    /// Pins `page_id`, loading it from disk on a cache miss. Returns the
    /// frame index, or `Ok(None)` if no victim could be found (pool full,
    /// everything pinned).
    pub fn fetch_page(&mut self, page_id: PageId) -> Result<Option<usize>> {
        if let Some(&frame_id) = self.page_table.get(&page_id) {
            let frame = &mut self.frames[frame_id];
            frame.pin_count += 1;
            self.replacer.pin(frame_id);
            return Ok(Some(frame_id));
        }

        let Some(frame_id) = self.victim_frame()? else {
            return Ok(None);
        };

        let data = self.disk.read_page(page_id)?;
        self.frames[frame_id].reset(page_id, data);
        self.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);
        log::debug!("buffer: fetched {:?} into frame {}", page_id, frame_id);
        Ok(Some(frame_id))
    }

    /// Allocates a brand new page on `fd`, pinned and zeroed. `Ok(None)` if
    /// no victim frame is available.
    pub fn new_page(&mut self, fd: Fd) -> Result<Option<(PageId, usize)>> {
        let Some(frame_id) = self.victim_frame()? else {
            return Ok(None);
        };

        let page_no = self.disk.allocate_page(fd)?;
        let page_id = PageId::new(fd, page_no);
        let frame = &mut self.frames[frame_id];
        frame.reset(page_id, Page::new());
        frame.is_dirty = true;
        self.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);
        log::debug!("buffer: allocated {:?} in frame {}", page_id, frame_id);
        Ok(Some((page_id, frame_id)))
    }

    /// Decrements the pin count; once it reaches zero the frame becomes
    /// evictable. Returns `false` if the page isn't mapped or already
    /// unpinned.
    pub fn unpin_page(&mut self, page_id: PageId, mark_dirty: bool) -> bool {
        let Some(&frame_id) = self.page_table.get(&page_id) else {
            return false;
        };
        let frame = &mut self.frames[frame_id];
        if frame.pin_count == 0 {
            return false;
        }
        if mark_dirty {
            frame.is_dirty = true;
        }
        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    pub fn flush_page(&mut self, page_id: PageId) -> Result<bool> {
        let Some(&frame_id) = self.page_table.get(&page_id) else {
            return Ok(false);
        };
        self.disk.write_page(page_id, &self.frames[frame_id].data)?;
        self.frames[frame_id].is_dirty = false;
        Ok(true)
    }

    pub fn flush_all_pages(&mut self, fd: Fd) -> Result<()> {
        let ids: Vec<PageId> = self
            .page_table
            .keys()
            .filter(|id| id.fd == fd)
            .copied()
            .collect();
        for id in ids {
            self.flush_page(id)?;
        }
        Ok(())
    }

    /// Removes `page_id` from the pool, deallocating its on-disk slot.
    /// Idempotent if unmapped; fails if still pinned.
    pub fn delete_page(&mut self, page_id: PageId) -> Result<bool> {
        let Some(&frame_id) = self.page_table.get(&page_id) else {
            return Ok(true);
        };
        if self.frames[frame_id].pin_count > 0 {
            return Ok(false);
        }
        self.replacer.pin(frame_id);
        self.page_table.remove(&page_id);
        self.frames[frame_id] = Frame::empty();
        self.disk.deallocate_page(page_id)?;
        self.free_list.push_back(frame_id);
        Ok(true)
    }

    pub fn frame_data(&self, frame_id: usize) -> &Page {
        &self.frames[frame_id].data
    }

    pub fn frame_data_mut(&mut self, frame_id: usize) -> &mut Page {
        self.frames[frame_id].is_dirty = true;
        &mut self.frames[frame_id].data
    }

    pub fn page_id_of(&self, frame_id: usize) -> Result<PageId> {
        self.frames[frame_id]
            .page_id
            .ok_or_else(|| Error::Internal(format!("frame {frame_id} is unmapped")).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DiskManager;

    fn pool(size: usize) -> (BufferPoolManager, tempfile::TempDir, Fd) {
        let dir = tempfile::tempdir().unwrap();
        let mut disk = DiskManager::new(dir.path()).unwrap();
        let fd = disk.open_file("t").unwrap();
        (BufferPoolManager::new(size, disk), dir, fd)
    }

    #[test]
    fn fetch_fails_when_pool_full_and_all_pinned() {
        let (mut bp, _dir, fd) = pool(2);
        let (p1, _) = bp.new_page(fd).unwrap().unwrap();
        let (p2, _) = bp.new_page(fd).unwrap().unwrap();
        let (p3, _) = (PageId::new(fd, 2), ());
        let _ = p3;
        assert!(bp.new_page(fd).unwrap().is_none());
        assert!(bp.fetch_page(p1).is_ok());
        assert!(bp.fetch_page(p2).is_ok());
    }

    #[test]
    fn unpinning_frees_a_victim_for_reuse() {
        let (mut bp, _dir, fd) = pool(2);
        let (p1, _) = bp.new_page(fd).unwrap().unwrap();
        let (p2, _) = bp.new_page(fd).unwrap().unwrap();
        assert!(bp.new_page(fd).unwrap().is_none());

        assert!(bp.unpin_page(p1, false));
        assert!(bp.unpin_page(p2, false));
        let third = bp.new_page(fd).unwrap();
        assert!(third.is_some());
    }

    #[test]
    fn delete_page_is_idempotent_when_unmapped() {
        let (mut bp, _dir, fd) = pool(2);
        let missing = PageId::new(fd, 99);
        assert!(bp.delete_page(missing).unwrap());
    }

    #[test]
    fn write_back_happens_on_eviction_not_unpin() {
        let (mut bp, _dir, fd) = pool(1);
        let (p1, f1) = bp.new_page(fd).unwrap().unwrap();
        bp.frame_data_mut(f1).write(0, b"abc");
        assert!(bp.unpin_page(p1, true));

        // forces eviction of p1 since pool size is 1
        let (p2, f2) = bp.new_page(fd).unwrap().unwrap();
        assert!(bp.unpin_page(p2, false));

        let reloaded = bp.fetch_page(p1).unwrap().unwrap();
        assert_eq!(bp.frame_data(reloaded).read(0, 3), b"abc");
        let _ = f2;
    }
}
