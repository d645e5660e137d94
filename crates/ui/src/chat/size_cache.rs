use std::iter;

use crate::chat::message_store::StoreChange;

/// Height assumed for rows that have not been measured yet: one text line, header and padding.
pub const DEFAULT_FALLBACK_HEIGHT: f32 = 48.0;
/// Measurements closer than this are treated as unchanged to ignore layout jitter.
const HEIGHT_EPSILON: f32 = 0.5;

/// Per-index row heights plus lazily maintained cumulative offsets.
///
/// `offsets[i]` is the top edge of row `i` and is trusted only for `i < offsets.len()`.
/// Any height change at index `i` truncates `offsets` to `i + 1`, so the next geometry query
/// recomputes forward from the changed row instead of from zero.
#[derive(Debug, Clone)]
pub struct SizeCache {
    heights: Vec<Option<f32>>,
    offsets: Vec<f32>,
    fallback: f32,
}

impl SizeCache {
    pub fn new(fallback: f32) -> Self {
        Self {
            heights: Vec::new(),
            offsets: vec![0.0],
            fallback: fallback.max(1.0),
        }
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    pub fn fallback(&self) -> f32 {
        self.fallback
    }

    /// Measured height of `index`, or the fallback estimate when unmeasured.
    pub fn get(&self, index: usize) -> f32 {
        self.heights
            .get(index)
            .copied()
            .flatten()
            .unwrap_or(self.fallback)
    }

    pub fn is_measured(&self, index: usize) -> bool {
        matches!(self.heights.get(index), Some(Some(_)))
    }

    pub fn measured_count(&self) -> usize {
        self.heights.iter().filter(|height| height.is_some()).count()
    }

    /// Number of leading rows whose top offset is currently trusted.
    pub fn valid_prefix(&self) -> usize {
        self.offsets.len()
    }

    /// Records a measurement; returns true when the row's effective height changed.
    pub fn set(&mut self, index: usize, height: f32) -> bool {
        let Some(slot) = self.heights.get_mut(index) else {
            return false;
        };

        let height = height.max(0.0);
        let previous = slot.unwrap_or(self.fallback);
        *slot = Some(height);

        let changed = (previous - height).abs() > HEIGHT_EPSILON;
        if changed {
            self.invalidate_offsets_after(index);
        }
        changed
    }

    pub fn invalidate(&mut self, index: usize) {
        let Some(slot) = self.heights.get_mut(index) else {
            return;
        };
        *slot = None;
        self.invalidate_offsets_after(index);
    }

    pub fn invalidate_all(&mut self) {
        for height in &mut self.heights {
            *height = None;
        }
        self.offsets.truncate(1);
    }

    pub fn clear(&mut self) {
        self.heights.clear();
        self.offsets.truncate(1);
    }

    pub fn push_unmeasured(&mut self, count: usize) {
        // Existing offsets stay valid: appended rows start where the old total ended.
        self.heights.extend(iter::repeat_n(None, count));
    }

    pub fn splice(&mut self, index: usize, removed: usize, inserted: usize) {
        let start = index.min(self.heights.len());
        let end = start.saturating_add(removed).min(self.heights.len());
        self.heights
            .splice(start..end, iter::repeat_n(None, inserted));
        self.invalidate_offsets_after(start);
    }

    /// Mirrors a store mutation: toggles invalidate one row, appends add unmeasured rows,
    /// full replacement clears everything.
    pub fn apply(&mut self, change: StoreChange) {
        match change {
            StoreChange::Appended { count, .. } => self.push_unmeasured(count),
            StoreChange::Replaced { count } => {
                self.clear();
                self.push_unmeasured(count);
            }
            StoreChange::Toggled(index) => self.invalidate(index),
            StoreChange::Spliced {
                index,
                removed,
                inserted,
            } => self.splice(index, removed, inserted),
        }
    }

    /// Top edge of `index`; `index == len()` yields the total height.
    pub fn offset_of(&mut self, index: usize) -> f32 {
        let index = index.min(self.heights.len());
        self.ensure_offsets(index);
        self.offsets[index]
    }

    pub fn total_height(&mut self) -> f32 {
        self.offset_of(self.heights.len())
    }

    /// Index of the row covering vertical position `y`, clamped to the last row.
    pub fn index_at_offset(&mut self, y: f32) -> usize {
        let len = self.heights.len();
        if len == 0 {
            return 0;
        }

        self.ensure_offsets(len);
        // offsets[1..=len] are row bottoms; the first bottom past `y` owns it.
        let bottoms = &self.offsets[1..=len];
        bottoms.partition_point(|bottom| *bottom <= y).min(len - 1)
    }

    fn invalidate_offsets_after(&mut self, index: usize) {
        self.offsets.truncate(index.saturating_add(1).max(1));
    }

    fn ensure_offsets(&mut self, upto: usize) {
        if self.offsets.is_empty() {
            self.offsets.push(0.0);
        }

        while self.offsets.len() <= upto {
            let row = self.offsets.len() - 1;
            let top = self.offsets[row];
            let height = self.get(row);
            self.offsets.push(top + height);
        }
    }
}

impl Default for SizeCache {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_HEIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with_rows(count: usize) -> SizeCache {
        let mut cache = SizeCache::new(40.0);
        cache.push_unmeasured(count);
        cache
    }

    #[test]
    fn unmeasured_rows_use_fallback() {
        let mut cache = cache_with_rows(3);

        assert_eq!(cache.get(1), 40.0);
        assert_eq!(cache.get(99), 40.0);
        assert_eq!(cache.total_height(), 120.0);
        assert!(!cache.is_measured(0));
    }

    #[test]
    fn changed_measurement_invalidates_offsets_forward_only() {
        let mut cache = cache_with_rows(10);
        assert_eq!(cache.total_height(), 400.0);
        assert_eq!(cache.valid_prefix(), 11);

        assert!(cache.set(4, 100.0));
        // Rows 0..=4 keep their tops; everything after row 4 is recomputed lazily.
        assert_eq!(cache.valid_prefix(), 5);
        assert_eq!(cache.offset_of(4), 160.0);
        assert_eq!(cache.offset_of(5), 260.0);
        assert_eq!(cache.total_height(), 460.0);
    }

    #[test]
    fn identical_measurement_keeps_geometry() {
        let mut cache = cache_with_rows(4);
        cache.total_height();

        assert!(!cache.set(2, 40.2));
        assert!(cache.is_measured(2));
        assert_eq!(cache.valid_prefix(), 5);
    }

    #[test]
    fn clear_after_replace_returns_fallback() {
        let mut cache = cache_with_rows(2);
        cache.set(0, 300.0);

        cache.apply(StoreChange::Replaced { count: 0 });

        assert_eq!(cache.get(0), 40.0);
        assert!(cache.is_empty());
        assert_eq!(cache.total_height(), 0.0);
    }

    #[test]
    fn toggle_change_invalidates_exactly_one_row() {
        let mut cache = cache_with_rows(3);
        cache.set(0, 10.0);
        cache.set(1, 20.0);
        cache.set(2, 30.0);

        cache.apply(StoreChange::Toggled(1));

        assert!(cache.is_measured(0));
        assert!(!cache.is_measured(1));
        assert!(cache.is_measured(2));
        assert_eq!(cache.total_height(), 10.0 + 40.0 + 30.0);
    }

    #[test]
    fn splice_shifts_measurements_after_the_splice_point() {
        let mut cache = cache_with_rows(3);
        cache.set(0, 10.0);
        cache.set(2, 30.0);

        cache.apply(StoreChange::Spliced {
            index: 1,
            removed: 1,
            inserted: 2,
        });

        assert_eq!(cache.len(), 4);
        assert!(cache.is_measured(0));
        assert!(!cache.is_measured(1));
        assert!(!cache.is_measured(2));
        assert_eq!(cache.get(3), 30.0);
    }

    #[test]
    fn index_lookup_uses_cumulative_offsets() {
        let mut cache = cache_with_rows(5);
        cache.set(1, 100.0);

        assert_eq!(cache.index_at_offset(0.0), 0);
        assert_eq!(cache.index_at_offset(39.9), 0);
        assert_eq!(cache.index_at_offset(40.0), 1);
        assert_eq!(cache.index_at_offset(139.0), 1);
        assert_eq!(cache.index_at_offset(140.0), 2);
        assert_eq!(cache.index_at_offset(10_000.0), 4);
    }
}
