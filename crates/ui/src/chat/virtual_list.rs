use std::ops::Range;

use crate::chat::size_cache::SizeCache;

pub const DEFAULT_OVERSCAN_ROWS: usize = 4;
/// Keeps a row that starts exactly at the viewport bottom out of the window.
const VIEWPORT_EDGE_EPSILON: f32 = 0.01;

/// Size of the scroll container in logical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width: width.max(1.0),
            height: height.max(0.0),
        }
    }
}

/// Where a row lands when scrolled into view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollAlignment {
    Start,
    Center,
    End,
    /// Moves the least distance needed to make the row fully visible.
    #[default]
    Auto,
}

/// Window geometry over a [`SizeCache`]; owns only the viewport and scroll position.
#[derive(Debug, Clone)]
pub struct VirtualList {
    viewport: Viewport,
    overscan: usize,
    scroll_offset: f32,
}

impl VirtualList {
    pub fn new(viewport: Viewport, overscan: usize) -> Self {
        Self {
            viewport,
            overscan,
            scroll_offset: 0.0,
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn overscan(&self) -> usize {
        self.overscan
    }

    pub fn scroll_offset(&self) -> f32 {
        self.scroll_offset
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn max_offset(&self, cache: &mut SizeCache) -> f32 {
        (cache.total_height() - self.viewport.height).max(0.0)
    }

    pub fn set_scroll_offset(&mut self, offset: f32, cache: &mut SizeCache) {
        let max_offset = self.max_offset(cache);
        self.scroll_offset = if offset.is_finite() {
            offset.clamp(0.0, max_offset)
        } else {
            0.0
        };
    }

    pub fn scroll_by(&mut self, delta: f32, cache: &mut SizeCache) {
        self.set_scroll_offset(self.scroll_offset + delta, cache);
    }

    pub fn scroll_to_bottom(&mut self, cache: &mut SizeCache) {
        let max_offset = self.max_offset(cache);
        self.scroll_offset = max_offset;
    }

    /// Indices intersecting the viewport plus `overscan` rows on each side.
    pub fn visible_range(&self, cache: &mut SizeCache) -> Range<usize> {
        let len = cache.len();
        if len == 0 {
            return 0..0;
        }

        let top = self.scroll_offset;
        let bottom = (top + self.viewport.height - VIEWPORT_EDGE_EPSILON).max(top);
        let first = cache.index_at_offset(top);
        let last = cache.index_at_offset(bottom);

        first.saturating_sub(self.overscan)..(last + 1 + self.overscan).min(len)
    }

    /// Indices whose rows intersect the viewport, without overscan.
    pub fn viewport_range(&self, cache: &mut SizeCache) -> Range<usize> {
        let len = cache.len();
        if len == 0 {
            return 0..0;
        }

        let top = self.scroll_offset;
        let bottom = (top + self.viewport.height - VIEWPORT_EDGE_EPSILON).max(top);
        cache.index_at_offset(top)..cache.index_at_offset(bottom) + 1
    }

    pub fn scroll_to_index(
        &mut self,
        index: usize,
        alignment: ScrollAlignment,
        cache: &mut SizeCache,
    ) {
        if cache.is_empty() {
            self.scroll_offset = 0.0;
            return;
        }

        let index = index.min(cache.len() - 1);
        let top = cache.offset_of(index);
        let height = cache.get(index);
        let viewport_height = self.viewport.height;

        let target = match alignment {
            ScrollAlignment::Start => top,
            ScrollAlignment::End => top + height - viewport_height,
            ScrollAlignment::Center => top + height / 2.0 - viewport_height / 2.0,
            ScrollAlignment::Auto => {
                if top < self.scroll_offset || height > viewport_height {
                    top
                } else if top + height > self.scroll_offset + viewport_height {
                    top + height - viewport_height
                } else {
                    self.scroll_offset
                }
            }
        };

        self.set_scroll_offset(target, cache);
    }
}
