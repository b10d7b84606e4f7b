//! Per-character indicator bitmaps.
//!
//! Every character in the buffer carries a 32-bit mask. Bit `n` set on a
//! character means indicator `n` covers it. A *run* is a maximal stretch of
//! characters that agree on one indicator's bit, set or unset.
//!
//! ## Learning: Parallel Vectors
//!
//! The layer keeps one `u32` per character, in lock-step with the rope.
//! Every insertion or removal on the text must be mirrored here, which is
//! why only `TextBuffer` is allowed to call `insert_space`/`remove_space`.

use std::ops::Range;

/// Number of distinct indicator ids a mask can hold.
pub const MAX_INDICATORS: u8 = 32;

/// Indicator masks for every character of a buffer.
#[derive(Debug, Clone, Default)]
pub struct IndicatorLayer {
    masks: Vec<u32>,
    current: u8,
}

impl IndicatorLayer {
    /// Creates a layer for `len` untagged characters.
    pub fn with_len(len: usize) -> Self {
        Self {
            masks: vec![0; len],
            current: 0,
        }
    }

    /// Number of characters covered by the layer.
    pub fn len(&self) -> usize {
        self.masks.len()
    }

    /// Returns true if the layer covers no characters.
    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    /// Selects the indicator used by `fill_range` and `clear_range`.
    pub fn set_current(&mut self, id: u8) {
        debug_assert!(id < MAX_INDICATORS);
        self.current = id % MAX_INDICATORS;
    }

    /// The indicator selected by `set_current`.
    pub fn current(&self) -> u8 {
        self.current
    }

    /// Makes room for `len` new characters at `pos`.
    ///
    /// A bit is carried onto the new characters only when it is set on both
    /// neighbours. Inserting at the edge of a run never extends the run.
    pub(crate) fn insert_space(&mut self, pos: usize, len: usize) {
        let pos = pos.min(self.masks.len());
        let before = if pos > 0 { self.masks[pos - 1] } else { 0 };
        let after = self.masks.get(pos).copied().unwrap_or(0);
        let inherited = before & after;
        self.masks
            .splice(pos..pos, std::iter::repeat(inherited).take(len));
    }

    /// Drops the masks of removed characters.
    pub(crate) fn remove_space(&mut self, range: Range<usize>) {
        let end = range.end.min(self.masks.len());
        let start = range.start.min(end);
        self.masks.drain(start..end);
    }

    /// Sets the current indicator over `len` characters from `start`.
    pub fn fill_range(&mut self, start: usize, len: usize) {
        self.fill_range_for(self.current, start, len);
    }

    /// Clears the current indicator over `len` characters from `start`.
    pub fn clear_range(&mut self, start: usize, len: usize) {
        self.clear_range_for(self.current, start, len);
    }

    /// Sets indicator `id` over `len` characters from `start`.
    pub fn fill_range_for(&mut self, id: u8, start: usize, len: usize) {
        let bit = bit(id);
        for mask in self.span_mut(start, len) {
            *mask |= bit;
        }
    }

    /// Clears indicator `id` over `len` characters from `start`.
    pub fn clear_range_for(&mut self, id: u8, start: usize, len: usize) {
        let bit = bit(id);
        for mask in self.span_mut(start, len) {
            *mask &= !bit;
        }
    }

    /// Returns true if indicator `id` covers the character at `pos`.
    pub fn value_at(&self, id: u8, pos: usize) -> bool {
        self.all_on_for(pos) & bit(id) != 0
    }

    /// Mask of every indicator covering the character at `pos`.
    ///
    /// Positions at or past the end report an empty mask.
    pub fn all_on_for(&self, pos: usize) -> u32 {
        self.masks.get(pos).copied().unwrap_or(0)
    }

    /// Intersection of the masks over `range`; empty for an empty range.
    pub fn common_over(&self, range: Range<usize>) -> u32 {
        let end = range.end.min(self.masks.len());
        let start = range.start.min(end);
        if start == end {
            return 0;
        }
        self.masks[start..end].iter().fold(u32::MAX, |acc, m| acc & m)
    }

    /// Start of the run of indicator `id` containing `pos`.
    pub fn start(&self, id: u8, pos: usize) -> usize {
        if pos >= self.masks.len() {
            return pos.min(self.masks.len());
        }
        let value = self.value_at(id, pos);
        let mut start = pos;
        while start > 0 && self.value_at(id, start - 1) == value {
            start -= 1;
        }
        start
    }

    /// End (exclusive) of the run of indicator `id` containing `pos`.
    pub fn end(&self, id: u8, pos: usize) -> usize {
        let len = self.masks.len();
        if pos >= len {
            return len;
        }
        let value = self.value_at(id, pos);
        let mut end = pos + 1;
        while end < len && self.value_at(id, end) == value {
            end += 1;
        }
        end
    }

    /// First run of indicator `id` that starts at or after `from`.
    pub fn next_run(&self, id: u8, from: usize) -> Option<Range<usize>> {
        let len = self.masks.len();
        if from >= len {
            return None;
        }
        let start = if self.value_at(id, from) {
            from
        } else {
            self.end(id, from)
        };
        if start >= len {
            return None;
        }
        Some(start..self.end(id, start))
    }

    fn span_mut(&mut self, start: usize, len: usize) -> &mut [u32] {
        let total = self.masks.len();
        let start = start.min(total);
        let end = start.saturating_add(len).min(total);
        &mut self.masks[start..end]
    }
}

/// Mask bit for indicator `id`.
#[inline]
pub fn bit(id: u8) -> u32 {
    1u32 << (id % MAX_INDICATORS)
}
