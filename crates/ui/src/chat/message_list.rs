use std::collections::HashMap;

use crate::chat::markdown::{self, RenderedMarkdown};
use crate::chat::message::{Message, MessageId, MessageKind};
use crate::chat::message_store::MessageStore;
use crate::chat::scroll_manager::ScrollManager;
use crate::chat::size_cache::{DEFAULT_FALLBACK_HEIGHT, SizeCache};
use crate::chat::virtual_list::{DEFAULT_OVERSCAN_ROWS, ScrollAlignment, Viewport, VirtualList};

const LIST_HORIZONTAL_PADDING: f32 = 16.0;
const CONTENT_WIDTH_CHANGE_EPSILON: f32 = 1.0;
const ESTIMATED_TEXT_LINE_HEIGHT: f32 = 18.0;
const ESTIMATED_CHAR_WIDTH: f32 = 7.0;
/// Sender label plus the source/rendered toggle.
const ROW_HEADER_HEIGHT: f32 = 22.0;
const ROW_VERTICAL_PADDING: f32 = 4.0;
/// Upper bound on measure/re-layout rounds per frame.
const MAX_MEASURE_PASSES: usize = 4;

pub const DEFAULT_VIEWPORT_WIDTH: f32 = 720.0;
pub const DEFAULT_VIEWPORT_HEIGHT: f32 = 480.0;

/// What a mounted row displays; also the input to row measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct RowView {
    pub index: usize,
    pub message_id: MessageId,
    pub sender: String,
    pub timestamp: Option<String>,
    pub kind: MessageKind,
    pub show_source: bool,
    pub is_placeholder: bool,
    pub lines: Vec<String>,
    pub code_block_count: usize,
}

/// Reports the height a row occupies at a given content width.
pub trait RowMeasurer: Send {
    fn measure(&self, row: &RowView, content_width: f32) -> f32;
}

/// Estimates height from wrapped line count.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextMeasurer;

impl RowMeasurer for TextMeasurer {
    fn measure(&self, row: &RowView, content_width: f32) -> f32 {
        let chars_per_line = (content_width / ESTIMATED_CHAR_WIDTH).floor().max(1.0) as usize;
        let line_count: usize = row
            .lines
            .iter()
            .map(|line| line.chars().count().max(1).div_ceil(chars_per_line))
            .sum();

        ROW_VERTICAL_PADDING * 2.0
            + ROW_HEADER_HEIGHT
            + ESTIMATED_TEXT_LINE_HEIGHT * line_count.max(1) as f32
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MountedRow {
    pub index: usize,
    pub top: f32,
    pub height: f32,
    pub view: RowView,
}

/// One frame of the virtualized thread.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedWindow {
    pub rows: Vec<MountedRow>,
    pub total_height: f32,
    pub scroll_offset: f32,
    pub viewport: Viewport,
    pub following_bottom: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListConfig {
    pub viewport: Viewport,
    pub overscan: usize,
    pub fallback_row_height: f32,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::new(DEFAULT_VIEWPORT_WIDTH, DEFAULT_VIEWPORT_HEIGHT),
            overscan: DEFAULT_OVERSCAN_ROWS,
            fallback_row_height: DEFAULT_FALLBACK_HEIGHT,
        }
    }
}

/// Message history plus the virtualized layout that presents it.
///
/// Every store mutation goes through this type so the size cache never drifts from the
/// message indices it describes.
pub struct MessageList {
    store: MessageStore,
    size_cache: SizeCache,
    virtual_list: VirtualList,
    scroll_manager: ScrollManager,
    rendered: HashMap<MessageId, RenderedMarkdown>,
    measurer: Box<dyn RowMeasurer>,
    pending_alignment: Option<(usize, ScrollAlignment)>,
}

impl MessageList {
    pub fn new(config: ListConfig) -> Self {
        Self {
            store: MessageStore::new(),
            size_cache: SizeCache::new(config.fallback_row_height),
            virtual_list: VirtualList::new(config.viewport, config.overscan),
            scroll_manager: ScrollManager::new(),
            rendered: HashMap::new(),
            measurer: Box::new(TextMeasurer),
            pending_alignment: None,
        }
    }

    pub fn with_measurer(mut self, measurer: impl RowMeasurer + 'static) -> Self {
        self.measurer = Box::new(measurer);
        self.size_cache.invalidate_all();
        self
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn size_cache(&self) -> &SizeCache {
        &self.size_cache
    }

    pub fn viewport(&self) -> Viewport {
        self.virtual_list.viewport()
    }

    pub fn scroll_offset(&self) -> f32 {
        self.virtual_list.scroll_offset()
    }

    pub fn is_following_bottom(&self) -> bool {
        self.scroll_manager.is_following_bottom()
    }

    pub fn alloc_id(&mut self) -> MessageId {
        self.store.alloc_id()
    }

    pub fn append(&mut self, messages: Vec<Message>) {
        if messages.is_empty() {
            return;
        }

        let change = self.store.append(messages);
        self.size_cache.apply(change);
        self.scroll_manager.request_scroll_to_bottom_if_following();
    }

    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.rendered.clear();
        let change = self.store.replace_all(messages);
        self.size_cache.apply(change);
        self.pending_alignment = None;
        self.virtual_list.set_scroll_offset(0.0, &mut self.size_cache);
        self.scroll_manager.reset();
    }

    /// Flips one message between rendered and source view. Returns false when out of range.
    pub fn toggle_source(&mut self, index: usize) -> bool {
        let previous = self.size_cache.get(index);
        let above = self.is_above_viewport(index, previous);

        let Some(change) = self.store.toggle_source(index) else {
            return false;
        };
        self.size_cache.apply(change);

        if above {
            let delta = self.size_cache.get(index) - previous;
            self.shift_scroll(delta);
        }
        true
    }

    /// Swaps the message with `id` for `replacement`. Returns false when `id` is gone.
    pub fn replace_message(&mut self, id: MessageId, replacement: Vec<Message>) -> bool {
        let Some(index) = self.store.position(id) else {
            return false;
        };

        let previous = self.size_cache.get(index);
        let above = self.is_above_viewport(index, previous);
        let inserted = replacement.len();

        let Some(change) = self.store.replace_message(id, replacement) else {
            return false;
        };
        self.rendered.remove(&id);
        self.size_cache.apply(change);

        if above {
            let delta = (index..index + inserted)
                .map(|row| self.size_cache.get(row))
                .sum::<f32>()
                - previous;
            self.shift_scroll(delta);
        }
        self.scroll_manager.request_scroll_to_bottom_if_following();
        true
    }

    /// Resizes the container. A width change invalidates every measurement.
    pub fn set_viewport(&mut self, viewport: Viewport) -> bool {
        let previous = self.virtual_list.viewport();
        let width_changed =
            (previous.width - viewport.width).abs() > CONTENT_WIDTH_CHANGE_EPSILON;

        self.virtual_list.set_viewport(viewport);
        if width_changed {
            // Mark cached measurements dirty so heights are recalculated for the new width.
            self.size_cache.invalidate_all();
            tracing::debug!(
                width = viewport.width,
                height = viewport.height,
                "viewport width changed; row heights invalidated"
            );
        }

        let offset = self.virtual_list.scroll_offset();
        self.virtual_list.set_scroll_offset(offset, &mut self.size_cache);
        width_changed
    }

    pub fn scroll_by(&mut self, delta: f32) {
        self.pending_alignment = None;
        self.virtual_list.scroll_by(delta, &mut self.size_cache);
        self.record_user_scroll();
    }

    pub fn scroll_to_index(&mut self, index: usize, alignment: ScrollAlignment) {
        if self.store.is_empty() {
            return;
        }

        let index = index.min(self.store.len() - 1);
        self.pending_alignment = Some((index, alignment));
        self.virtual_list
            .scroll_to_index(index, alignment, &mut self.size_cache);
        self.record_user_scroll();
    }

    pub fn scroll_to_newest(&mut self) {
        self.pending_alignment = None;
        self.scroll_manager.request_scroll_to_bottom();
        self.virtual_list.scroll_to_bottom(&mut self.size_cache);
    }

    /// Text of one code block in the rendered form of a message.
    pub fn code_block(&mut self, message_index: usize, block_index: usize) -> Option<String> {
        let message = self.store.get(message_index)?;
        rendered_markdown(&mut self.rendered, message)
            .code_blocks
            .get(block_index)
            .map(|block| block.code.clone())
    }

    pub fn row_view(&mut self, index: usize) -> Option<RowView> {
        let message = self.store.get(index)?;
        let rendered = rendered_markdown(&mut self.rendered, message);
        let lines = if message.show_source {
            markdown::source_lines(&message.text)
        } else {
            rendered.lines.clone()
        };

        Some(RowView {
            index,
            message_id: message.id,
            sender: message.sender.clone(),
            timestamp: message.timestamp.clone(),
            kind: message.kind,
            show_source: message.show_source,
            is_placeholder: message.is_placeholder(),
            lines,
            code_block_count: rendered.code_blocks.len(),
        })
    }

    /// Measures the rows around the viewport until their heights settle and mounts them.
    pub fn render_window(&mut self) -> RenderedWindow {
        let content_width = self.content_width();

        for _ in 0..MAX_MEASURE_PASSES {
            self.position_viewport();
            if !self.measure_visible_rows(content_width) {
                break;
            }
        }
        self.position_viewport();
        self.pending_alignment = None;

        let range = self.virtual_list.visible_range(&mut self.size_cache);
        let mut rows = Vec::with_capacity(range.len());
        for index in range {
            let Some(view) = self.row_view(index) else {
                continue;
            };
            rows.push(MountedRow {
                index,
                top: self.size_cache.offset_of(index),
                height: self.size_cache.get(index),
                view,
            });
        }

        RenderedWindow {
            rows,
            total_height: self.size_cache.total_height(),
            scroll_offset: self.virtual_list.scroll_offset(),
            viewport: self.virtual_list.viewport(),
            following_bottom: self.scroll_manager.is_following_bottom(),
        }
    }

    fn content_width(&self) -> f32 {
        (self.virtual_list.viewport().width - LIST_HORIZONTAL_PADDING * 2.0).max(1.0)
    }

    /// Returns true when any mounted row changed height.
    fn measure_visible_rows(&mut self, content_width: f32) -> bool {
        let range = self.virtual_list.visible_range(&mut self.size_cache);
        let scroll_top = self.virtual_list.scroll_offset();
        let mut anchor_shift = 0.0;
        let mut changed = false;

        for index in range {
            let Some(view) = self.row_view(index) else {
                continue;
            };
            let previous = self.size_cache.get(index);
            let top = self.size_cache.offset_of(index);
            let measured = self.measurer.measure(&view, content_width);

            if self.size_cache.set(index, measured) {
                changed = true;
                // Rows wholly above the viewport push visible content; compensate.
                if top + previous <= scroll_top + anchor_shift {
                    anchor_shift += measured - previous;
                }
            }
        }

        if anchor_shift != 0.0 {
            self.shift_scroll(anchor_shift);
        }
        changed
    }

    fn position_viewport(&mut self) {
        self.sync_follow_state();

        if let Some((index, alignment)) = self.pending_alignment {
            self.virtual_list
                .scroll_to_index(index, alignment, &mut self.size_cache);
        } else if self.scroll_manager.apply_pending_scroll() {
            self.virtual_list.scroll_to_bottom(&mut self.size_cache);
        } else {
            let offset = self.virtual_list.scroll_offset();
            self.virtual_list.set_scroll_offset(offset, &mut self.size_cache);
        }

        // Record the programmatic position so it is not mistaken for user scrolling.
        self.sync_follow_state();
    }

    fn sync_follow_state(&mut self) {
        let offset = self.virtual_list.scroll_offset();
        let max_offset = self.virtual_list.max_offset(&mut self.size_cache);
        self.scroll_manager.update_follow_state(offset, max_offset);
    }

    fn record_user_scroll(&mut self) {
        let offset = self.virtual_list.scroll_offset();
        let max_offset = self.virtual_list.max_offset(&mut self.size_cache);
        self.scroll_manager.record_user_scroll(offset, max_offset);
    }

    fn is_above_viewport(&mut self, index: usize, height: f32) -> bool {
        if index >= self.size_cache.len() {
            return false;
        }
        self.size_cache.offset_of(index) + height <= self.virtual_list.scroll_offset()
    }

    fn shift_scroll(&mut self, delta: f32) {
        let offset = self.virtual_list.scroll_offset() + delta;
        self.virtual_list.set_scroll_offset(offset, &mut self.size_cache);
    }
}

impl Default for MessageList {
    fn default() -> Self {
        Self::new(ListConfig::default())
    }
}

fn rendered_markdown<'a>(
    cache: &'a mut HashMap<MessageId, RenderedMarkdown>,
    message: &Message,
) -> &'a RenderedMarkdown {
    cache
        .entry(message.id)
        .or_insert_with(|| markdown::render_markdown(&message.text))
}
