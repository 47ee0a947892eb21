//! LRU victim selection over unpinned frames (spec.md §4.1 "Replacer contract").
//!
//! Grounded on the teacher's `buffer_pool/replacer.rs`, which tracks recency
//! with a monotonic counter in a `PriorityQueue` rather than an intrusive
//! linked list.

use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::HashSet;

pub trait Replacer {
    /// Picks the unpinned frame with the oldest unpin time and removes it
    /// from the eviction set. `None` if no frame is evictable.
    fn victim(&mut self) -> Option<usize>;
    /// Removes `frame_id` from the eviction set (the frame just got pinned).
    fn pin(&mut self, frame_id: usize);
    /// Inserts `frame_id` at the most-recent end of the eviction set.
    fn unpin(&mut self, frame_id: usize);
}

pub struct LruReplacer {
    queue: PriorityQueue<usize, Reverse<u64>>,
    evictable: HashSet<usize>,
    clock: u64,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self {
            queue: PriorityQueue::new(),
            evictable: HashSet::new(),
            clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

impl Default for LruReplacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Replacer for LruReplacer {
    fn victim(&mut self) -> Option<usize> {
        let (frame_id, _) = self.queue.pop()?;
        self.evictable.remove(&frame_id);
        Some(frame_id)
    }

    fn pin(&mut self, frame_id: usize) {
        self.queue.remove(&frame_id);
        self.evictable.remove(&frame_id);
    }

    fn unpin(&mut self, frame_id: usize) {
        let ts = self.tick();
        self.queue.push(frame_id, Reverse(ts));
        self.evictable.insert(frame_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_unpin_first() {
        let mut r = LruReplacer::new();
        r.unpin(1);
        r.unpin(2);
        r.unpin(3);
        assert_eq!(r.victim(), Some(1));
        assert_eq!(r.victim(), Some(2));
        assert_eq!(r.victim(), Some(3));
        assert_eq!(r.victim(), None);
    }

    #[test]
    fn pin_removes_from_eviction_set() {
        let mut r = LruReplacer::new();
        r.unpin(1);
        r.unpin(2);
        r.pin(1);
        assert_eq!(r.victim(), Some(2));
        assert_eq!(r.victim(), None);
    }
}
