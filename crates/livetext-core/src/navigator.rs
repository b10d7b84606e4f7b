//! Tabstop navigation.
//!
//! Each advance unlinks any active group and then visits the next target in
//! the insertion table:
//!
//! 1. Ordinary tabstops, one per advance, in document order.
//! 2. A backref number other than 0, as soon as the scan reaches one: all
//!    of its members are linked together in a single advance.
//! 3. Backref 0 last, whatever its position in the table.
//!
//! A group with a single member behaves like an ordinary tabstop. So does
//! a group whose members touch: their linked runs fuse and can no longer
//! be told apart, so the first member is selected without linking.

use livetext_buffer::TextBuffer;
use serde::Serialize;
use std::cell::Cell;
use std::ops::Range;
use std::rc::Rc;
use tracing::{debug, error, warn};

use crate::indicator::Indicator;
use crate::session::{linked_members, write_member, LinkedGroup, Member, TabstopState};
use crate::table::{marker_shared, ResolvedRange};
use crate::TabstopError;

/// Result of one advance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Advance {
    /// A single tabstop was selected (empty range for a zero-width one)
    Selected { range: Range<usize> },
    /// A backref group was linked; `range` is the selected first member
    Linked {
        backref: u32,
        members: usize,
        range: Range<usize>,
    },
    /// The table was empty but a linked group was closed
    Unlinked,
    /// Nothing to do; the caller may fall back to its default action
    NotHandled,
}

impl Advance {
    /// Returns true if the request was consumed.
    pub fn is_handled(&self) -> bool {
        !matches!(self, Advance::NotHandled)
    }
}

impl TabstopState {
    /// Moves to the next tabstop.
    pub fn advance(&mut self, buffer: &mut TextBuffer) -> Advance {
        let unlinked = self.clear_linked_tabstops(buffer);
        if self.table.is_empty() {
            return if unlinked {
                Advance::Unlinked
            } else {
                Advance::NotHandled
            };
        }

        let ranges = match self.table.resolve(buffer) {
            Ok(ranges) => ranges,
            Err(err) => {
                error!(%err, "cannot resolve tabstops; advance aborted");
                return Advance::NotHandled;
            }
        };

        let target = self
            .table
            .iter()
            .position(|entry| entry.backref_number != Some(0));
        let result = match target {
            Some(index) => match self.table.get(index).and_then(|e| e.backref_number) {
                None => self.visit_single(buffer, index, &ranges),
                Some(number) => self.visit_group(buffer, number, &ranges),
            },
            None => self.visit_group(buffer, 0, &ranges),
        };

        match result {
            Ok(advance) => advance,
            Err(err) => {
                error!(%err, "advance aborted");
                Advance::NotHandled
            }
        }
    }

    fn visit_single(
        &mut self,
        buffer: &mut TextBuffer,
        index: usize,
        ranges: &[ResolvedRange],
    ) -> Result<Advance, TabstopError> {
        let (Some(entry), Some(range)) = (self.table.get(index).copied(), ranges.get(index).copied())
        else {
            return Ok(Advance::NotHandled);
        };
        self.table.remove(index);

        if !marker_shared(ranges, index, &[index]) {
            buffer.set_current_indicator(entry.indicator.id());
            buffer.clear_indicator_range(range.start, range.len());
        }

        let text = range.text_range();
        buffer.set_selection(text.start, text.end);
        buffer.scroll_to_caret();

        debug!(indicator = %entry.indicator, ?text, "selected tabstop");
        Ok(Advance::Selected { range: text })
    }

    fn visit_group(
        &mut self,
        buffer: &mut TextBuffer,
        number: u32,
        ranges: &[ResolvedRange],
    ) -> Result<Advance, TabstopError> {
        let indices = self.table.backref_members(number);
        match indices.as_slice() {
            [] => return Ok(Advance::NotHandled),
            [single] => return self.visit_single(buffer, *single, ranges),
            _ => {}
        }

        let anchor = indices
            .iter()
            .copied()
            .find(|&i| self.table.get(i).is_some_and(|e| e.is_backref_anchor))
            .unwrap_or(indices[0]);
        let canonical = match ranges.get(anchor) {
            Some(range) => buffer.slice(range.text_range())?.into_owned(),
            None => String::new(),
        };

        buffer.begin_composite_edit();
        let linked = self.link_members(buffer, &indices, ranges, &canonical);
        let first = match linked {
            Ok(first) => first,
            Err(err) => {
                buffer.end_composite_edit();
                return Err(err);
            }
        };
        self.table.remove_all(&indices);

        let found = linked_members(buffer).len();
        if found != indices.len() {
            warn!(
                backref = number,
                expected = indices.len(),
                found,
                "linked members touch; not linking"
            );
            let len = buffer.len_chars();
            for indicator in Indicator::LINKED {
                buffer.set_current_indicator(indicator.id());
                buffer.clear_indicator_range(0, len);
            }
            buffer.end_composite_edit();
            buffer.set_selection(first.start, first.end);
            buffer.scroll_to_caret();
            return Ok(Advance::Selected { range: first });
        }

        let left = Rc::new(Cell::new(false));
        let flag = Rc::clone(&left);
        let mask = Indicator::linked_mask();
        let caret = buffer.on_caret_moved(move |event| flag.set(!event.touches(mask)));

        self.link = Some(LinkedGroup {
            backref: number,
            members: indices.len(),
            left,
            _caret: caret,
        });

        buffer.set_selection(first.start, first.end);
        buffer.scroll_to_caret();

        debug!(backref = number, members = indices.len(), text = %canonical, "linked group");
        Ok(Advance::Linked {
            backref: number,
            members: indices.len(),
            range: first,
        })
    }

    /// Rewrites every member to `canonical`, last first so earlier ranges
    /// stay valid. Returns the new range of the first member.
    fn link_members(
        &mut self,
        buffer: &mut TextBuffer,
        indices: &[usize],
        ranges: &[ResolvedRange],
        canonical: &str,
    ) -> Result<Range<usize>, TabstopError> {
        let mut first = 0..0;
        for &index in indices.iter().rev() {
            let (Some(entry), Some(range)) = (self.table.get(index).copied(), ranges.get(index).copied())
            else {
                continue;
            };
            if !marker_shared(ranges, index, indices) {
                buffer.set_current_indicator(entry.indicator.id());
                buffer.clear_indicator_range(range.start, range.len());
            }

            let text = range.text_range();
            let member = Member {
                start: text.start,
                end: text.end,
                follower: false,
            };
            first = write_member(buffer, member, canonical)?;
        }
        Ok(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::writer::insert_live_text;
    use livetext_buffer::Selection;

    fn session(snippet: &str) -> (TextBuffer, TabstopState) {
        let mut buffer = TextBuffer::new();
        let live = parse(snippet).unwrap();
        insert_live_text(&mut buffer, 0, &live).unwrap();
        let mut state = TabstopState::new();
        state.install(live.table);
        (buffer, state)
    }

    fn count_linked(buffer: &TextBuffer) -> usize {
        (0..buffer.len_chars())
            .filter(|&p| buffer.indicators_at(p) & Indicator::linked_mask() != 0)
            .count()
    }

    #[test]
    fn test_empty_table_not_handled() {
        let mut buffer = TextBuffer::from("x");
        let mut state = TabstopState::new();
        assert_eq!(state.advance(&mut buffer), Advance::NotHandled);
        assert!(!state.advance(&mut buffer).is_handled());
    }

    #[test]
    fn test_singles_in_document_order() {
        let (mut buffer, mut state) = session("[[%tabstop:a]] [[%tabstop]]b [[%tabstop:cc]]");
        assert_eq!(buffer.text(), "a b cc");

        assert_eq!(state.advance(&mut buffer), Advance::Selected { range: 0..1 });
        assert_eq!(buffer.selection(), Selection::new(0, 1));
        assert!(buffer.take_scroll_request());

        assert_eq!(state.advance(&mut buffer), Advance::Selected { range: 2..2 });
        assert_eq!(buffer.selection(), Selection::caret_at(2));

        assert_eq!(state.advance(&mut buffer), Advance::Selected { range: 4..6 });
        assert_eq!(state.advance(&mut buffer), Advance::NotHandled);
        assert_eq!((0..buffer.len_chars()).map(|p| buffer.indicators_at(p)).sum::<u32>(), 0);
    }

    #[test]
    fn test_navigation_ordering() {
        let (mut buffer, mut state) = session(
            "[[%tabstop0:end]] [[%tabstop:a]] [[%tabstop:b]] [[%tabstop1:x]]=[[%tabstop1]]",
        );
        assert_eq!(buffer.text(), "end a b x=x");

        assert_eq!(state.advance(&mut buffer), Advance::Selected { range: 4..5 });
        assert_eq!(state.advance(&mut buffer), Advance::Selected { range: 6..7 });
        assert_eq!(
            state.advance(&mut buffer),
            Advance::Linked {
                backref: 1,
                members: 2,
                range: 8..9
            }
        );
        assert!(state.is_linked());
        assert_eq!(count_linked(&buffer), 2);

        assert_eq!(state.advance(&mut buffer), Advance::Selected { range: 0..3 });
        assert!(!state.is_linked());
        assert_eq!(count_linked(&buffer), 0);
        assert_eq!(buffer.composite_depth(), 0);

        assert_eq!(state.advance(&mut buffer), Advance::NotHandled);
    }

    #[test]
    fn test_single_member_group_is_a_single() {
        let (mut buffer, mut state) = session("[[%tabstop3:only]]");
        assert_eq!(state.advance(&mut buffer), Advance::Selected { range: 0..4 });
        assert!(!state.is_linked());
    }

    #[test]
    fn test_unlink_on_last_advance() {
        let (mut buffer, mut state) = session("[[%tabstop1:v]] [[%tabstop1]]");
        assert!(matches!(state.advance(&mut buffer), Advance::Linked { .. }));
        assert_eq!(buffer.composite_depth(), 1);

        assert_eq!(state.advance(&mut buffer), Advance::Unlinked);
        assert_eq!(buffer.composite_depth(), 0);
        assert_eq!(state.advance(&mut buffer), Advance::NotHandled);
    }

    #[test]
    fn test_linking_uses_anchor_text() {
        let (mut buffer, mut state) = session("[[%tabstop1:ab]]-[[%tabstop1]]");
        // Edit the second member before it is visited
        buffer.insert(4, "Z").unwrap();
        assert_eq!(buffer.text(), "ab-aZb");

        state.advance(&mut buffer);
        assert_eq!(buffer.text(), "ab-ab");
    }

    #[test]
    fn test_empty_members_get_followers() {
        let (mut buffer, mut state) = session("([[%tabstop2]],[[%tabstop2]])");
        assert_eq!(buffer.text(), "(,)");

        let advance = state.advance(&mut buffer);
        assert_eq!(
            advance,
            Advance::Linked {
                backref: 2,
                members: 2,
                range: 1..1
            }
        );
        assert!(buffer.indicator_value_at(Indicator::LinkedZeroWidth.id(), 1));
        assert!(buffer.indicator_value_at(Indicator::LinkedZeroWidth.id(), 2));
        assert!(!state.caret_left_group());

        buffer.set_selection(0, 0);
        assert!(state.caret_left_group());
    }

    #[test]
    fn test_adjacent_empty_tabstops_share_a_marker() {
        let (mut buffer, mut state) = session("([[%tabstop]][[%tabstop]])");
        assert_eq!(buffer.text(), "()");

        assert_eq!(state.advance(&mut buffer), Advance::Selected { range: 1..1 });
        assert!(buffer.indicator_value_at(Indicator::ZeroWidth.id(), 1));
        assert_eq!(state.advance(&mut buffer), Advance::Selected { range: 1..1 });
        assert!(!buffer.indicator_value_at(Indicator::ZeroWidth.id(), 1));
        assert!(state.table().is_empty());
        assert_eq!(state.advance(&mut buffer), Advance::NotHandled);
    }

    #[test]
    fn test_empty_nested_group_is_reachable() {
        let (mut buffer, mut state) = session("[[%tabstop:a]] f([[%tabstop:[[%tabstop]]]])");
        assert_eq!(buffer.text(), "a f()");
        assert_eq!(state.table().len(), 3);

        assert_eq!(state.advance(&mut buffer), Advance::Selected { range: 0..1 });
        assert_eq!(state.advance(&mut buffer), Advance::Selected { range: 4..4 });
        assert_eq!(state.advance(&mut buffer), Advance::Selected { range: 4..4 });
        assert_eq!(state.advance(&mut buffer), Advance::NotHandled);
        assert_eq!((0..buffer.len_chars()).map(|p| buffer.indicators_at(p)).sum::<u32>(), 0);
    }

    #[test]
    fn test_empty_tabstops_at_end_of_buffer() {
        let (mut buffer, mut state) = session("x[[%tabstop]][[%tabstop]]");
        assert_eq!(buffer.text(), "x\n");

        assert_eq!(state.advance(&mut buffer), Advance::Selected { range: 1..1 });
        assert_eq!(state.advance(&mut buffer), Advance::Selected { range: 1..1 });
        assert!(state.table().is_empty());
    }

    #[test]
    fn test_touching_members_are_not_linked() {
        let (mut buffer, mut state) = session("[[%tabstop1:a]][[%tabstop1]] [[%tabstop1]]");
        assert_eq!(buffer.text(), "aa a");

        assert_eq!(state.advance(&mut buffer), Advance::Selected { range: 0..1 });
        assert!(!state.is_linked());
        assert!(state.table().is_empty());
        assert_eq!(count_linked(&buffer), 0);
        assert_eq!(buffer.composite_depth(), 0);

        // Typing edits only the selected member
        buffer.replace_selection_observed("Z", &mut state).unwrap();
        assert_eq!(buffer.text(), "Za a");
    }

    #[test]
    fn test_missing_indicator_aborts_without_mutation() {
        let (mut buffer, mut state) = session("[[%tabstop:a]] [[%tabstop:b]]");
        buffer.set_current_indicator(Indicator::Tabstop2.id());
        buffer.clear_indicator_range(0, buffer.len_chars());

        assert_eq!(state.advance(&mut buffer), Advance::NotHandled);
        assert_eq!(state.table().len(), 2);
        assert_eq!(buffer.selection(), Selection::caret_at(0));
    }
}
