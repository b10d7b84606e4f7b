//! The insertion table.
//!
//! One record per tabstop, in document order. The table does not store
//! positions: edits move text around, so a record is turned back into a
//! range by searching the buffer for its indicator.
//!
//! ## Resolving
//!
//! Several records can share an indicator (allocation reuses tags once
//! their scope is closed). The k-th record tagged `X` maps to the k-th run
//! of `X` in the buffer, so resolution keeps one search cursor per
//! indicator. Zero-width markers can sit on neighbouring characters and
//! fuse into one run; inside such a run every grapheme is its own marker.
//! Zero-width tabstops with no text between them sit on the same character:
//! the later ones are flagged `shares_marker` and resolve to the marker of
//! the zero-width record before them.

use livetext_buffer::TextBuffer;
use serde::Serialize;
use std::collections::HashMap;
use std::ops::Range;

use crate::indicator::Indicator;
use crate::TabstopError;

/// One tabstop of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TabstopInsertionNode {
    pub indicator: Indicator,
    /// Number of a numbered backref; `None` for ordinary tabstops
    pub backref_number: Option<u32>,
    /// True for the first occurrence of a backref number
    pub is_backref_anchor: bool,
    /// Zero-width record on the same marker as the previous zero-width one
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub shares_marker: bool,
}

impl TabstopInsertionNode {
    /// An ordinary tabstop.
    pub fn single(indicator: Indicator) -> Self {
        Self {
            indicator,
            backref_number: None,
            is_backref_anchor: false,
            shares_marker: false,
        }
    }

    /// An occurrence of backref `number`.
    pub fn backref(indicator: Indicator, number: u32, is_anchor: bool) -> Self {
        Self {
            indicator,
            backref_number: Some(number),
            is_backref_anchor: is_anchor,
            shares_marker: false,
        }
    }

    pub fn is_backref(&self) -> bool {
        self.backref_number.is_some()
    }

    pub fn is_zero_width(&self) -> bool {
        self.indicator == Indicator::ZeroWidth
    }
}

/// Buffer location of one table record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedRange {
    pub start: usize,
    /// End of the tagged characters; for a zero-width record, the end of
    /// the marker grapheme
    pub end: usize,
    pub zero_width: bool,
}

impl ResolvedRange {
    /// The tabstop's text; empty for zero-width records.
    pub fn text_range(&self) -> Range<usize> {
        if self.zero_width {
            self.start..self.start
        } else {
            self.start..self.end
        }
    }

    /// The characters carrying the record's indicator.
    pub fn marker_range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// True if a record outside `consumed` resolved to the same zero-width
/// marker as `index`, so the marker must stay when `index` is consumed.
pub fn marker_shared(ranges: &[ResolvedRange], index: usize, consumed: &[usize]) -> bool {
    let Some(range) = ranges.get(index).filter(|r| r.zero_width) else {
        return false;
    };
    ranges
        .iter()
        .enumerate()
        .any(|(i, r)| !consumed.contains(&i) && r.zero_width && r.start == range.start)
}

/// Ordered tabstop records of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct InsertionTable {
    entries: Vec<TabstopInsertionNode>,
}

impl InsertionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record and returns its index.
    pub fn push(&mut self, entry: TabstopInsertionNode) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Replaces the record at `index`.
    pub fn set(&mut self, index: usize, entry: TabstopInsertionNode) {
        if let Some(slot) = self.entries.get_mut(index) {
            *slot = entry;
        }
    }

    pub fn get(&self, index: usize) -> Option<&TabstopInsertionNode> {
        self.entries.get(index)
    }

    /// Marks the zero-width record at `index` as sitting on the previous
    /// zero-width record's marker.
    pub fn set_shares_marker(&mut self, index: usize, shared: bool) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.shares_marker = shared && entry.is_zero_width();
        }
    }

    /// Removes and returns the record at `index`.
    pub fn remove(&mut self, index: usize) -> Option<TabstopInsertionNode> {
        if index >= self.entries.len() {
            return None;
        }
        let removed = self.entries.remove(index);
        // The next record on the same marker takes over as its owner
        if removed.is_zero_width() && !removed.shares_marker {
            if let Some(next) = self.entries[index..].iter_mut().find(|e| e.is_zero_width()) {
                next.shares_marker = false;
            }
        }
        Some(removed)
    }

    /// Removes the records at `indices`, which may come in any order.
    pub fn remove_all(&mut self, indices: &[usize]) {
        let mut sorted = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        for index in sorted.into_iter().rev() {
            self.remove(index);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &TabstopInsertionNode> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[TabstopInsertionNode] {
        &self.entries
    }

    /// Indices of the records of backref `number`, in document order.
    pub fn backref_members(&self, number: u32) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.backref_number == Some(number))
            .map(|(i, _)| i)
            .collect()
    }

    /// Locates every record in `buffer`, in table order.
    pub fn resolve(&self, buffer: &TextBuffer) -> Result<Vec<ResolvedRange>, TabstopError> {
        let layer = buffer.indicators();
        let mut next_from: HashMap<Indicator, usize> = HashMap::new();
        let mut resolved = Vec::with_capacity(self.entries.len());
        let mut last_marker: Option<ResolvedRange> = None;

        for entry in &self.entries {
            if entry.shares_marker {
                if let Some(marker) = last_marker {
                    resolved.push(marker);
                    continue;
                }
            }
            let from = next_from.get(&entry.indicator).copied().unwrap_or(0);
            let run = layer
                .next_run(entry.indicator.id(), from)
                .ok_or(TabstopError::IndicatorNotFound {
                    indicator: entry.indicator,
                    from,
                })?;

            let range = if entry.is_zero_width() {
                let marker = buffer.grapheme_len_at(run.start).max(1);
                ResolvedRange {
                    start: run.start,
                    end: (run.start + marker).min(run.end),
                    zero_width: true,
                }
            } else {
                ResolvedRange {
                    start: run.start,
                    end: run.end,
                    zero_width: false,
                }
            };
            next_from.insert(entry.indicator, range.end);
            if range.zero_width {
                last_marker = Some(range);
            }
            resolved.push(range);
        }

        Ok(resolved)
    }
}
