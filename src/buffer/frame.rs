use crate::page::{Page, PageId};

/// One cached page slot (spec.md DATA MODEL "Frame").
pub struct Frame {
    pub page_id: Option<PageId>,
    pub data: Page,
    pub pin_count: u32,
    pub is_dirty: bool,
}

impl Frame {
    pub fn empty() -> Self {
        Self {
            page_id: None,
            data: Page::new(),
            pin_count: 0,
            is_dirty: false,
        }
    }

    pub fn reset(&mut self, page_id: PageId, data: Page) {
        self.page_id = Some(page_id);
        self.data = data;
        self.pin_count = 1;
        self.is_dirty = false;
    }

    pub fn is_free(&self) -> bool {
        self.page_id.is_none()
    }
}
