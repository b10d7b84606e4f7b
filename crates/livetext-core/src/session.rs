//! Per-document tabstop state.
//!
//! `TabstopState` sits next to a document's buffer and holds everything the
//! engine remembers between events: the insertion table of the last
//! snippet, the active linked group and work deferred out of mutation
//! callbacks. Navigation lives in `navigator`, edit synchronization in
//! `linker`; both are further `impl` blocks on this type.

use livetext_buffer::{BufferResult, CaretSubscription, TextBuffer};
use std::cell::Cell;
use std::collections::VecDeque;
use std::ops::Range;
use std::rc::Rc;
use tracing::debug;

use crate::indicator::Indicator;
use crate::table::InsertionTable;

/// Work that must not run inside a mutation callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeferredTask {
    ClearLinkedTabstops,
    EndCompositeEdit,
}

/// How a user deletion touches the linked group, noted before the delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingDelete {
    /// Removes text strictly within one member
    Inside,
    /// Removes all text of the member starting at the offset
    Emptied(usize),
}

/// The live-linked backref group.
pub(crate) struct LinkedGroup {
    pub(crate) backref: u32,
    pub(crate) members: usize,
    /// Set by the caret watcher when the caret leaves every member
    pub(crate) left: Rc<Cell<bool>>,
    pub(crate) _caret: CaretSubscription,
}

/// One linked member found in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Member {
    pub(crate) start: usize,
    pub(crate) end: usize,
    /// Empty member, marked by a follower character at `start`
    pub(crate) follower: bool,
}

impl Member {
    pub(crate) fn text_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Tabstop bookkeeping of one document.
#[derive(Default)]
pub struct TabstopState {
    pub(crate) table: InsertionTable,
    pub(crate) link: Option<LinkedGroup>,
    pub(crate) deferred: VecDeque<DeferredTask>,
    /// Zero-width markers to put back once a delete completes
    pub(crate) replant: Vec<usize>,
    pub(crate) pending_delete: Option<PendingDelete>,
}

impl TabstopState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the insertion table.
    pub fn install(&mut self, table: InsertionTable) {
        self.table = table;
    }

    pub fn table(&self) -> &InsertionTable {
        &self.table
    }

    /// Returns true while a backref group is linked.
    pub fn is_linked(&self) -> bool {
        self.link.is_some()
    }

    /// Backref number and member count of the linked group.
    pub fn linked_group(&self) -> Option<(u32, usize)> {
        self.link.as_ref().map(|l| (l.backref, l.members))
    }

    /// True once an explicit caret move has left every linked member.
    pub fn caret_left_group(&self) -> bool {
        self.link.as_ref().is_some_and(|l| l.left.get())
    }

    /// Returns true if deferred work is waiting for `run_deferred`.
    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Unlinks the active group, if any. Returns whether one was active.
    pub fn clear_linked_tabstops(&mut self, buffer: &mut TextBuffer) -> bool {
        self.unlink(buffer, false)
    }

    /// Drops the whole tabstop session: the linked group, the table and
    /// every tabstop indicator. Soft characters keep their tag.
    pub fn clear_tabstop_info(&mut self, buffer: &mut TextBuffer) {
        self.run_deferred(buffer);
        self.clear_linked_tabstops(buffer);
        self.table.clear();
        self.replant.clear();
        self.pending_delete = None;

        let len = buffer.len_chars();
        for indicator in Indicator::PLAIN.into_iter().chain([Indicator::ZeroWidth]) {
            buffer.set_current_indicator(indicator.id());
            buffer.clear_indicator_range(0, len);
        }
        debug!("cleared tabstop info");
    }

    /// Runs work deferred out of mutation callbacks.
    pub fn run_deferred(&mut self, buffer: &mut TextBuffer) {
        while let Some(task) = self.deferred.pop_front() {
            match task {
                DeferredTask::ClearLinkedTabstops => {
                    self.clear_linked_tabstops(buffer);
                }
                DeferredTask::EndCompositeEdit => buffer.end_composite_edit(),
            }
        }
    }

    /// Unlinks the group. Inside a mutation callback the composite edit is
    /// closed later, from `run_deferred`.
    pub(crate) fn unlink(&mut self, buffer: &mut TextBuffer, in_callback: bool) -> bool {
        let Some(link) = self.link.take() else {
            return false;
        };

        let len = buffer.len_chars();
        for indicator in Indicator::LINKED {
            buffer.set_current_indicator(indicator.id());
            buffer.clear_indicator_range(0, len);
        }
        if in_callback {
            self.deferred.push_back(DeferredTask::EndCompositeEdit);
        } else {
            buffer.end_composite_edit();
        }
        self.pending_delete = None;

        debug!(backref = link.backref, members = link.members, "unlinked group");
        drop(link);
        true
    }

    pub(crate) fn defer(&mut self, task: DeferredTask) {
        if !self.deferred.contains(&task) {
            self.deferred.push_back(task);
        }
    }
}

// ==================== Member Helpers ====================

/// Every linked member in the buffer, sorted by position.
pub(crate) fn linked_members(buffer: &TextBuffer) -> Vec<Member> {
    let layer = buffer.indicators();
    let mut members = Vec::new();

    let mut from = 0;
    while let Some(run) = layer.next_run(Indicator::LinkedText.id(), from) {
        from = run.end;
        members.push(Member {
            start: run.start,
            end: run.end,
            follower: false,
        });
    }

    let mut from = 0;
    while let Some(run) = layer.next_run(Indicator::LinkedZeroWidth.id(), from) {
        from = run.end;
        let mut pos = run.start;
        while pos < run.end {
            members.push(Member {
                start: pos,
                end: pos,
                follower: true,
            });
            pos += buffer.grapheme_len_at(pos).max(1);
        }
    }

    members.sort_by_key(|m| (m.start, m.follower));
    members
}

/// Plain indicators shared by every character of `range`, or by both
/// neighbours of an empty range.
pub(crate) fn enclosing_plain_bits(buffer: &TextBuffer, range: Range<usize>) -> u32 {
    let plain = Indicator::plain_mask();
    if range.is_empty() {
        let pos = range.start;
        if pos == 0 {
            return 0;
        }
        return buffer.indicators_at(pos - 1) & buffer.indicators_at(pos) & plain;
    }
    buffer.indicators().common_over(range) & plain
}

/// Sets each bit of `bits` over `len` characters from `start`.
pub(crate) fn restore_bits(buffer: &mut TextBuffer, bits: u32, start: usize, len: usize) {
    for indicator in Indicator::PLAIN {
        if bits & indicator.bit() != 0 {
            buffer.set_current_indicator(indicator.id());
            buffer.fill_indicator_range(start, len);
        }
    }
}

/// Tags the grapheme at `pos` as an empty member's follower, appending a
/// line ending at the end of the buffer.
pub(crate) fn plant_follower(buffer: &mut TextBuffer, pos: usize) -> BufferResult<()> {
    if pos >= buffer.len_chars() {
        let eol = buffer.config().line_ending.as_str();
        buffer.insert(buffer.len_chars(), eol)?;
    }
    let marker = buffer.grapheme_len_at(pos).max(1);
    buffer.set_current_indicator(Indicator::LinkedZeroWidth.id());
    buffer.fill_indicator_range(pos, marker);
    Ok(())
}

/// Rewrites `member` to `text` and tags it as linked. Returns the
/// member's new text range.
///
/// The target replace drops indicators at the member's edges, so the
/// enclosing plain bits are snapshotted first and set again afterwards.
pub(crate) fn write_member(
    buffer: &mut TextBuffer,
    member: Member,
    text: &str,
) -> BufferResult<Range<usize>> {
    let start = member.start;
    let len = text.chars().count();

    if member.follower {
        let marker = buffer.grapheme_len_at(start).max(1);
        buffer.set_current_indicator(Indicator::LinkedZeroWidth.id());
        buffer.clear_indicator_range(start, marker);
    }

    let current = buffer.slice(member.text_range())?;
    if current != text {
        let bits = enclosing_plain_bits(buffer, member.text_range());
        buffer.set_target(member.start, member.end);
        buffer.replace_target(text)?;
        restore_bits(buffer, bits, start, len);
    }

    if len == 0 {
        plant_follower(buffer, start)?;
    } else {
        buffer.set_current_indicator(Indicator::LinkedText.id());
        buffer.fill_indicator_range(start, len);
    }
    Ok(start..start + len)
}
