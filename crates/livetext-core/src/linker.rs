//! Live-link synchronization.
//!
//! `TabstopState` observes every edit made through the document. It keeps
//! the insertion table in step with deletions and, while a backref group is
//! linked, copies each edit of one member to all the others.
//!
//! ## Learning: Work That Must Wait
//!
//! Callbacks run in the middle of a buffer operation, with the undo history
//! half updated. Anything that touches history (closing the composite edit,
//! unlinking after an undo) is queued as a `DeferredTask` and performed by
//! `run_deferred` once the operation has returned.

use livetext_buffer::{Mutation, MutationKind, MutationObserver, MutationOrigin, TextBuffer};
use tracing::{debug, error, trace};

use crate::indicator::Indicator;
use crate::session::{
    enclosing_plain_bits, linked_members, plant_follower, restore_bits, write_member,
    DeferredTask, Member, PendingDelete, TabstopState,
};
use crate::TabstopError;

impl MutationObserver for TabstopState {
    fn on_mutation(&mut self, buffer: &mut TextBuffer, mutation: &Mutation<'_>) {
        match mutation.kind {
            MutationKind::BeforeDelete => {
                self.prune_table(buffer, mutation);
                self.classify_delete(buffer, mutation);
            }
            MutationKind::DeleteText => self.after_delete(buffer, mutation),
            MutationKind::InsertText => self.after_insert(buffer, mutation),
        }
    }
}

impl TabstopState {
    // ==================== Key Interception ====================

    /// Called before a backspace. Unlinks when the caret sits on a member's
    /// left edge, since the delete would cross it.
    pub fn intercept_backspace(&mut self, buffer: &mut TextBuffer) -> bool {
        if self.link.is_none() || !buffer.selection().is_empty() {
            return false;
        }
        let caret = buffer.caret();
        let linked = Indicator::LinkedText.id();
        let at_left_edge = buffer.indicator_value_at(linked, caret)
            && (caret == 0 || !buffer.indicator_value_at(linked, caret - 1));
        let at_follower = buffer.indicator_value_at(Indicator::LinkedZeroWidth.id(), caret);

        if at_left_edge || at_follower {
            debug!(caret, "backspace at group boundary");
            return self.clear_linked_tabstops(buffer);
        }
        false
    }

    /// Called before a forward delete. Unlinks when the caret sits on a
    /// member's right edge or on an empty member's follower.
    pub fn intercept_delete_forward(&mut self, buffer: &mut TextBuffer) -> bool {
        if self.link.is_none() || !buffer.selection().is_empty() {
            return false;
        }
        let caret = buffer.caret();
        let linked = Indicator::LinkedText.id();
        let at_right_edge = caret > 0
            && buffer.indicator_value_at(linked, caret - 1)
            && !buffer.indicator_value_at(linked, caret);
        let at_follower = buffer.indicator_value_at(Indicator::LinkedZeroWidth.id(), caret);

        if at_right_edge || at_follower {
            debug!(caret, "delete at group boundary");
            return self.clear_linked_tabstops(buffer);
        }
        false
    }

    // ==================== Deletion ====================

    /// Drops unvisited tabstops destroyed by the deletion. Zero-width
    /// markers sitting exactly at its start move to the character that
    /// follows it.
    fn prune_table(&mut self, buffer: &mut TextBuffer, mutation: &Mutation<'_>) {
        if self.table.is_empty() {
            return;
        }
        let ranges = match self.table.resolve(buffer) {
            Ok(ranges) => ranges,
            Err(err) => {
                error!(%err, "cannot resolve tabstops before delete");
                return;
            }
        };

        let deleted = mutation.range();
        let at_end = deleted.end >= buffer.len_chars();
        let mut doomed = Vec::new();

        for (index, (entry, range)) in self.table.iter().zip(&ranges).enumerate() {
            if range.zero_width {
                let point = range.start;
                if deleted.start < point && point < deleted.end {
                    doomed.push(index);
                } else if point == deleted.start && !deleted.is_empty() {
                    if at_end {
                        doomed.push(index);
                    } else {
                        self.replant.push(deleted.start);
                    }
                }
            } else if range.start < deleted.end && deleted.start < range.end {
                buffer.set_current_indicator(entry.indicator.id());
                buffer.clear_indicator_range(range.start, range.len());
                doomed.push(index);
            }
        }

        if !doomed.is_empty() {
            trace!(count = doomed.len(), "tabstops removed by delete");
            self.table.remove_all(&doomed);
        }
    }

    /// Works out what a user deletion does to the linked group.
    fn classify_delete(&mut self, buffer: &mut TextBuffer, mutation: &Mutation<'_>) {
        if self.link.is_none() || mutation.origin != MutationOrigin::User {
            return;
        }
        let deleted = mutation.range();
        let touched: Vec<Member> = linked_members(buffer)
            .into_iter()
            .filter(|m| {
                let end = if m.follower {
                    m.start + buffer.grapheme_len_at(m.start).max(1)
                } else {
                    m.end
                };
                m.start < deleted.end && deleted.start < end
            })
            .collect();

        self.pending_delete = match touched.as_slice() {
            [] => None,
            [member] if !member.follower => {
                if deleted.start == member.start && deleted.end == member.end {
                    Some(PendingDelete::Emptied(member.start))
                } else if deleted.start >= member.start && deleted.end <= member.end {
                    Some(PendingDelete::Inside)
                } else {
                    self.unlink(buffer, true);
                    None
                }
            }
            _ => {
                self.unlink(buffer, true);
                None
            }
        };
    }

    fn after_delete(&mut self, buffer: &mut TextBuffer, mutation: &Mutation<'_>) {
        let len = buffer.len_chars();
        for point in std::mem::take(&mut self.replant) {
            if point < len {
                let marker = buffer.grapheme_len_at(point).max(1);
                buffer.set_current_indicator(Indicator::ZeroWidth.id());
                buffer.fill_indicator_range(point, marker);
            }
        }

        if self.link.is_none() {
            return;
        }
        if mutation.origin != MutationOrigin::User {
            self.defer(DeferredTask::ClearLinkedTabstops);
            return;
        }

        match self.pending_delete.take() {
            Some(PendingDelete::Emptied(start)) => {
                if let Err(err) = plant_follower(buffer, start) {
                    error!(%err, "cannot mark emptied member");
                    return;
                }
                self.propagate(buffer, start, "");
            }
            Some(PendingDelete::Inside) => {
                let linked = Indicator::LinkedText.id();
                let pos = mutation.position;
                let at = if pos > 0 && buffer.indicator_value_at(linked, pos - 1) {
                    pos - 1
                } else {
                    pos
                };
                if !buffer.indicator_value_at(linked, at) {
                    return;
                }
                let start = buffer.indicator_start(linked, at);
                let end = buffer.indicator_end(linked, at);
                self.propagate_range(buffer, start, end);
            }
            None => {}
        }
    }

    // ==================== Insertion ====================

    fn after_insert(&mut self, buffer: &mut TextBuffer, mutation: &Mutation<'_>) {
        if self.link.is_none() {
            return;
        }
        if mutation.origin != MutationOrigin::User {
            self.defer(DeferredTask::ClearLinkedTabstops);
            return;
        }

        let linked = Indicator::LinkedText.id();
        let follower = Indicator::LinkedZeroWidth.id();
        let pos = mutation.position;
        let end = pos + mutation.length;

        let member = if buffer.indicator_value_at(linked, pos) {
            // Strictly inside: the new text inherited the tag
            (buffer.indicator_start(linked, pos), buffer.indicator_end(linked, pos))
        } else if buffer.indicator_value_at(follower, end) {
            let marker = buffer.grapheme_len_at(end).max(1);
            buffer.set_current_indicator(follower);
            buffer.clear_indicator_range(end, marker);
            buffer.set_current_indicator(linked);
            buffer.fill_indicator_range(pos, mutation.length);
            (pos, end)
        } else if pos > 0 && buffer.indicator_value_at(linked, pos - 1) {
            let start = buffer.indicator_start(linked, pos - 1);
            let bits = enclosing_plain_bits(buffer, start..pos);
            buffer.set_current_indicator(linked);
            buffer.fill_indicator_range(pos, mutation.length);
            restore_bits(buffer, bits, pos, mutation.length);
            (start, end)
        } else if buffer.indicator_value_at(linked, end) {
            let run_end = buffer.indicator_end(linked, end);
            let bits = enclosing_plain_bits(buffer, end..run_end);
            buffer.set_current_indicator(linked);
            buffer.fill_indicator_range(pos, mutation.length);
            restore_bits(buffer, bits, pos, mutation.length);
            (pos, run_end)
        } else {
            return;
        };

        self.propagate_range(buffer, member.0, member.1);
    }

    // ==================== Propagation ====================

    fn propagate_range(&mut self, buffer: &mut TextBuffer, start: usize, end: usize) {
        let text = match buffer.slice(start..end) {
            Ok(text) => text.into_owned(),
            Err(err) => {
                error!(%err, "cannot read edited member");
                return;
            }
        };
        self.propagate(buffer, start, &text);
    }

    /// Copies `text` to every member except the one starting at `edited`.
    fn propagate(&mut self, buffer: &mut TextBuffer, edited: usize, text: &str) {
        let Some(expected) = self.link.as_ref().map(|l| l.members) else {
            return;
        };
        let members = linked_members(buffer);
        if members.len() != expected {
            let err = TabstopError::MemberCountMismatch {
                expected,
                found: members.len(),
            };
            error!(%err, "linked group out of sync; not propagating");
            return;
        }

        for member in members.iter().rev().filter(|m| m.start != edited) {
            let tag = if member.follower {
                Indicator::LinkedZeroWidth
            } else {
                Indicator::LinkedText
            };
            if !buffer.indicator_value_at(tag.id(), member.start) {
                error!(err = %TabstopError::MemberLost(member.start), "stopping propagation");
                break;
            }
            if let Err(err) = write_member(buffer, *member, text) {
                error!(%err, "cannot update linked member");
                break;
            }
        }
        trace!(text, "propagated member text");
    }
}
