//! Core text buffer implementation using rope data structure.
//!
//! ## Why Rope?
//!
//! Traditional text editors use gap buffers or arrays, but ropes excel at:
//! - **Large files**: O(log n) insertions/deletions vs O(n) for arrays
//! - **Undo/Redo**: Efficient snapshots without full copies
//!
//! ## Learning: Ownership in Action
//!
//! ```rust,ignore
//! let buffer = TextBuffer::new();  // buffer OWNS the rope
//! let text = buffer.text();        // text BORROWS from buffer
//! // buffer.insert(0, "x");        // ERROR! Can't mutate while borrowed
//! drop(text);                      // Release borrow
//! buffer.insert(0, "x");           // Now OK!
//! ```
//!
//! ## Addressing
//!
//! Every offset taken or returned by this type is a character index, the
//! rope's native unit. Callers holding `&str` measure with
//! `chars().count()` at the boundary.

use ropey::Rope;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use unicode_segmentation::UnicodeSegmentation;

use crate::history::{Edit, EditKind, History};
use crate::indicator::IndicatorLayer;
use crate::mutation::{Mutation, MutationKind, MutationObserver, MutationOrigin};
use crate::selection::{CaretEvent, CaretListeners, CaretSubscription, Position, Selection};
use crate::{BufferError, BufferResult};

/// A text buffer backed by a rope, with an indicator layer on top.
///
/// # Thread Safety
///
/// Caret subscriptions are reference counted, so `TextBuffer` is neither
/// `Send` nor `Sync`. It lives on the editor's main sequence.
#[derive(Debug, Clone)]
pub struct TextBuffer {
    /// The rope holding our text content
    rope: Rope,

    /// Indicator masks, one per character
    indicators: IndicatorLayer,

    /// Edit history for undo/redo
    history: History,

    /// Current selection
    selection: Selection,

    /// Target range for search/replace
    target: Range<usize>,

    /// Listeners for explicit selection changes
    caret_listeners: CaretListeners,

    /// Set by `scroll_to_caret`, cleared by the view
    scroll_requested: bool,

    /// Whether the buffer has unsaved changes
    modified: bool,

    /// Bumped on every change to the text
    revision: u64,

    /// Buffer-specific settings
    config: BufferConfig,
}

/// Configuration for buffer behavior
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Maximum history entries to keep
    pub max_history: usize,

    /// Line ending used when the buffer has to add one
    pub line_ending: LineEnding,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_history: 1000,
            line_ending: LineEnding::default(),
        }
    }
}

/// Line ending style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    /// Unix-style: \n
    #[default]
    Lf,
    /// Windows-style: \r\n
    CrLf,
    /// Classic Mac: \r
    Cr,
}

impl LineEnding {
    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
            LineEnding::Cr => "\r",
        }
    }

    /// Detects line ending from text.
    pub fn detect(text: &str) -> Self {
        if text.contains("\r\n") {
            LineEnding::CrLf
        } else if text.contains('\r') {
            LineEnding::Cr
        } else {
            LineEnding::Lf
        }
    }
}

/// How an insertion moves a selection end sitting exactly on the insertion
/// point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InsertMode {
    /// The end stays before the new text
    Plain,
    /// The end moves past the new text (typing)
    Typing,
}

impl TextBuffer {
    /// Creates a new empty buffer.
    ///
    /// # Example
    /// ```
    /// use livetext_buffer::TextBuffer;
    ///
    /// let buffer = TextBuffer::new();
    /// assert!(buffer.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::with_config(BufferConfig::default())
    }

    /// Creates a buffer with custom configuration.
    pub fn with_config(config: BufferConfig) -> Self {
        Self {
            rope: Rope::new(),
            indicators: IndicatorLayer::default(),
            history: History::new(config.max_history),
            selection: Selection::default(),
            target: 0..0,
            caret_listeners: CaretListeners::default(),
            scroll_requested: false,
            modified: false,
            revision: 0,
            config,
        }
    }

    /// Creates a buffer holding `text` with custom configuration.
    pub fn from_str_with_config(text: &str, config: BufferConfig) -> Self {
        let rope = Rope::from_str(text);
        let indicators = IndicatorLayer::with_len(rope.len_chars());
        Self {
            rope,
            indicators,
            ..Self::with_config(config)
        }
    }

    // ==================== Text Access ====================

    /// Returns the entire text content as a `Cow<str>`.
    #[inline]
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        self.rope.slice(..).into()
    }

    /// Returns a slice of text by character range.
    pub fn slice(&self, range: Range<usize>) -> BufferResult<std::borrow::Cow<'_, str>> {
        self.check_range(&range)?;
        Ok(self.rope.slice(range).into())
    }

    /// Number of characters in the grapheme cluster starting at `char_idx`.
    ///
    /// Returns 0 at the end of the buffer.
    pub fn grapheme_len_at(&self, char_idx: usize) -> usize {
        let len = self.len_chars();
        if char_idx >= len {
            return 0;
        }
        // A cluster never spans a line ending, so the rest of the line is enough
        let line = self.rope.char_to_line(char_idx);
        let line_end = if line + 1 < self.len_lines() {
            self.rope.line_to_char(line + 1)
        } else {
            len
        };
        let chunk: String = self.rope.slice(char_idx..line_end).into();
        chunk
            .graphemes(true)
            .next()
            .map(|g| g.chars().count())
            .unwrap_or(1)
    }

    // ==================== Measurements ====================

    /// Returns true if the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rope.len_chars() == 0
    }

    /// Returns the number of characters in the buffer.
    #[inline]
    pub fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    /// Returns the number of bytes in the buffer.
    #[inline]
    pub fn len_bytes(&self) -> usize {
        self.rope.len_bytes()
    }

    /// Returns the number of lines in the buffer.
    ///
    /// An empty buffer has 1 line. A buffer ending with `\n` counts
    /// the empty line after it.
    #[inline]
    pub fn len_lines(&self) -> usize {
        self.rope.len_lines()
    }

    /// Converts a character index to a byte offset.
    pub fn char_to_byte(&self, char_idx: usize) -> BufferResult<usize> {
        if char_idx > self.len_chars() {
            return Err(BufferError::InvalidCharIndex(char_idx));
        }
        Ok(self.rope.char_to_byte(char_idx))
    }

    /// Converts a byte offset to a character index.
    pub fn byte_to_char(&self, byte_idx: usize) -> BufferResult<usize> {
        if byte_idx > self.len_bytes() {
            return Err(BufferError::InvalidByteIndex(byte_idx));
        }
        Ok(self.rope.byte_to_char(byte_idx))
    }

    /// Converts a character index to a Position (line, column).
    pub fn char_idx_to_position(&self, char_idx: usize) -> BufferResult<Position> {
        if char_idx > self.len_chars() {
            return Err(BufferError::InvalidCharIndex(char_idx));
        }

        let line = self.rope.char_to_line(char_idx);
        let column = char_idx - self.rope.line_to_char(line);
        Ok(Position { line, column })
    }

    // ==================== Mutations ====================

    /// Inserts text at a character index.
    ///
    /// # Learning: `&mut self`
    ///
    /// This method requires exclusive (mutable) access to the buffer.
    /// Rust's borrow checker ensures no other code can read or write
    /// the buffer while this method executes.
    pub fn insert(&mut self, char_idx: usize, text: &str) -> BufferResult<()> {
        self.insert_observed(char_idx, text, &mut ())
    }

    /// Inserts text and notifies `observer` afterwards.
    pub fn insert_observed<O>(&mut self, char_idx: usize, text: &str, observer: &mut O) -> BufferResult<()>
    where
        O: MutationObserver + ?Sized,
    {
        self.insert_with(char_idx, text, InsertMode::Plain, MutationOrigin::User, true, observer)
    }

    /// Deletes text in a character range.
    pub fn delete(&mut self, range: Range<usize>) -> BufferResult<String> {
        self.delete_observed(range, &mut ())
    }

    /// Deletes text, notifying `observer` before and after the removal.
    pub fn delete_observed<O>(&mut self, range: Range<usize>, observer: &mut O) -> BufferResult<String>
    where
        O: MutationObserver + ?Sized,
    {
        self.delete_with(range, MutationOrigin::User, true, observer)
    }

    /// Types `text` over the selection: the selection is deleted, the text
    /// inserted at the caret and the caret left after it.
    pub fn replace_selection_observed<O>(&mut self, text: &str, observer: &mut O) -> BufferResult<()>
    where
        O: MutationObserver + ?Sized,
    {
        let range = self.selection.range();
        if !range.is_empty() {
            self.delete_with(range, MutationOrigin::User, true, observer)?;
        }
        if text.is_empty() {
            return Ok(());
        }
        let at = self.selection.caret;
        self.selection = Selection::caret_at(at);
        self.insert_with(at, text, InsertMode::Typing, MutationOrigin::User, true, observer)
    }

    fn insert_with<O>(
        &mut self,
        char_idx: usize,
        text: &str,
        mode: InsertMode,
        origin: MutationOrigin,
        record: bool,
        observer: &mut O,
    ) -> BufferResult<()>
    where
        O: MutationObserver + ?Sized,
    {
        if char_idx > self.len_chars() {
            return Err(BufferError::InvalidCharIndex(char_idx));
        }
        if text.is_empty() {
            return Ok(());
        }

        if record {
            self.history.push(Edit::insert(char_idx, text));
        }

        let len = text.chars().count();
        self.rope.insert(char_idx, text);
        self.indicators.insert_space(char_idx, len);
        self.selection
            .shift_for_insert(char_idx, len, mode == InsertMode::Typing);
        self.modified = true;
        self.revision += 1;

        let mutation = Mutation::new(MutationKind::InsertText, char_idx, text, origin);
        observer.on_mutation(self, &mutation);
        Ok(())
    }

    fn delete_with<O>(
        &mut self,
        range: Range<usize>,
        origin: MutationOrigin,
        record: bool,
        observer: &mut O,
    ) -> BufferResult<String>
    where
        O: MutationObserver + ?Sized,
    {
        self.check_range(&range)?;
        if range.is_empty() {
            return Ok(String::new());
        }

        let deleted: String = self.rope.slice(range.clone()).into();
        let before = Mutation::new(MutationKind::BeforeDelete, range.start, &deleted, origin);
        observer.on_mutation(self, &before);

        if record {
            self.history.push(Edit::delete(range.start, deleted.clone()));
        }

        self.rope.remove(range.clone());
        self.indicators.remove_space(range.clone());
        self.selection.shift_for_delete(range.clone());
        self.modified = true;
        self.revision += 1;

        let after = Mutation::new(MutationKind::DeleteText, range.start, &deleted, origin);
        observer.on_mutation(self, &after);
        Ok(deleted)
    }

    fn check_range(&self, range: &Range<usize>) -> BufferResult<()> {
        if range.end > self.len_chars() {
            return Err(BufferError::InvalidCharIndex(range.end));
        }
        if range.start > range.end {
            return Err(BufferError::InvalidRange {
                start: range.start,
                end: range.end,
            });
        }
        Ok(())
    }

    // ==================== Target ====================

    /// Sets the target range used by `search_in_target` and `replace_target`.
    ///
    /// Bounds are clamped to the buffer.
    pub fn set_target(&mut self, start: usize, end: usize) {
        let len = self.len_chars();
        let end = end.min(len);
        self.target = start.min(end)..end;
    }

    /// Returns the current target range.
    pub fn target(&self) -> Range<usize> {
        self.target.clone()
    }

    /// Searches for `pattern` inside the target.
    ///
    /// On success the target narrows to the match and its start is returned.
    pub fn search_in_target(&mut self, pattern: &str) -> Option<usize> {
        if pattern.is_empty() {
            return None;
        }
        let haystack: String = self.rope.slice(self.target.clone()).into();
        let byte_offset = haystack.find(pattern)?;
        let start = self.target.start + haystack[..byte_offset].chars().count();
        self.target = start..start + pattern.chars().count();
        Some(start)
    }

    /// Replaces the target with `text` and returns its length in characters.
    ///
    /// The target then covers the new text. Indicator bits are not carried
    /// over the replaced span: only bits set on both sides of the target
    /// survive, like any insertion.
    pub fn replace_target(&mut self, text: &str) -> BufferResult<usize> {
        let range = self.target.clone();
        self.delete(range.clone())?;
        self.insert(range.start, text)?;
        let len = text.chars().count();
        self.target = range.start..range.start + len;
        Ok(len)
    }

    // ==================== Indicators ====================

    /// Selects the indicator used by `fill_indicator_range` and
    /// `clear_indicator_range`.
    pub fn set_current_indicator(&mut self, id: u8) {
        self.indicators.set_current(id);
    }

    /// Sets the current indicator over `len` characters from `start`.
    pub fn fill_indicator_range(&mut self, start: usize, len: usize) {
        self.indicators.fill_range(start, len);
    }

    /// Clears the current indicator over `len` characters from `start`.
    pub fn clear_indicator_range(&mut self, start: usize, len: usize) {
        self.indicators.clear_range(start, len);
    }

    /// Start of the run of indicator `id` containing `pos`.
    pub fn indicator_start(&self, id: u8, pos: usize) -> usize {
        self.indicators.start(id, pos)
    }

    /// End of the run of indicator `id` containing `pos`.
    pub fn indicator_end(&self, id: u8, pos: usize) -> usize {
        self.indicators.end(id, pos)
    }

    /// Returns true if indicator `id` covers the character at `pos`.
    pub fn indicator_value_at(&self, id: u8, pos: usize) -> bool {
        self.indicators.value_at(id, pos)
    }

    /// Mask of every indicator covering the character at `pos`.
    pub fn indicators_at(&self, pos: usize) -> u32 {
        self.indicators.all_on_for(pos)
    }

    /// The indicator layer, for range queries.
    pub fn indicators(&self) -> &IndicatorLayer {
        &self.indicators
    }

    // ==================== Selection ====================

    /// Returns the current selection.
    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Returns the caret offset.
    pub fn caret(&self) -> usize {
        self.selection.caret
    }

    /// Sets the selection and notifies caret subscribers.
    pub fn set_selection(&mut self, anchor: usize, caret: usize) {
        let len = self.len_chars();
        self.selection = Selection::new(anchor.min(len), caret.min(len));
        let position = self.selection.caret;
        let event = CaretEvent {
            position,
            before: position
                .checked_sub(1)
                .map(|p| self.indicators.all_on_for(p))
                .unwrap_or(0),
            at: self.indicators.all_on_for(position),
        };
        self.caret_listeners.notify(&event);
    }

    /// Subscribes to explicit selection changes.
    pub fn on_caret_moved(&mut self, callback: impl Fn(&CaretEvent) + 'static) -> CaretSubscription {
        self.caret_listeners.subscribe(callback)
    }

    /// Asks the view to bring the caret into view.
    pub fn scroll_to_caret(&mut self) {
        self.scroll_requested = true;
    }

    /// Returns and clears a pending scroll request.
    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.scroll_requested)
    }

    // ==================== Undo/Redo ====================

    /// Opens a composite edit scope; edits until the matching
    /// `end_composite_edit` undo as one step.
    pub fn begin_composite_edit(&mut self) {
        self.history.begin_group();
    }

    /// Closes the innermost composite edit scope.
    pub fn end_composite_edit(&mut self) {
        self.history.end_group();
    }

    /// Nesting depth of open composite edit scopes.
    pub fn composite_depth(&self) -> usize {
        self.history.group_depth()
    }

    /// Undoes the last edit group.
    pub fn undo(&mut self) -> BufferResult<()> {
        self.undo_observed(&mut ())
    }

    /// Undoes the last edit group, notifying `observer` for every step.
    ///
    /// # Learning: State Management
    ///
    /// Each group is popped from the undo stack and its edits are reversed
    /// newest-first. The reversal itself is not recorded.
    pub fn undo_observed<O>(&mut self, observer: &mut O) -> BufferResult<()>
    where
        O: MutationObserver + ?Sized,
    {
        let group = self.history.undo().ok_or(BufferError::NothingToUndo)?;
        for edit in group.edits.iter().rev() {
            self.apply_edit(&edit.inverse(), MutationOrigin::Undo, observer)?;
        }
        Ok(())
    }

    /// Redoes the last undone edit group.
    pub fn redo(&mut self) -> BufferResult<()> {
        self.redo_observed(&mut ())
    }

    /// Redoes the last undone edit group, notifying `observer`.
    pub fn redo_observed<O>(&mut self, observer: &mut O) -> BufferResult<()>
    where
        O: MutationObserver + ?Sized,
    {
        let group = self.history.redo().ok_or(BufferError::NothingToRedo)?;
        for edit in &group.edits {
            self.apply_edit(edit, MutationOrigin::Redo, observer)?;
        }
        Ok(())
    }

    fn apply_edit<O>(&mut self, edit: &Edit, origin: MutationOrigin, observer: &mut O) -> BufferResult<()>
    where
        O: MutationObserver + ?Sized,
    {
        match edit.kind {
            EditKind::Insert => {
                self.insert_with(edit.position, &edit.content, InsertMode::Plain, origin, false, observer)
            }
            EditKind::Delete => {
                let end = edit.position + edit.len_chars();
                self.delete_with(edit.position..end, origin, false, observer)
                    .map(|_| ())
            }
        }
    }

    /// Returns true if there are edits to undo.
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    /// Returns true if there are edits to redo.
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // ==================== State Queries ====================

    /// Returns true if the buffer has unsaved changes.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Counter bumped by every insertion and deletion, undo and redo
    /// included. Equal revisions mean the text was not touched in between.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns the buffer's configuration.
    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Sets a new configuration.
    pub fn set_config(&mut self, config: BufferConfig) {
        self.config = config;
    }
}

impl Default for TextBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for TextBuffer {
    fn from(s: &str) -> Self {
        Self::from_str_with_config(s, BufferConfig::default())
    }
}

impl From<String> for TextBuffer {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<(MutationKind, usize, String, MutationOrigin)>,
    }

    impl MutationObserver for Recorder {
        fn on_mutation(&mut self, _buffer: &mut TextBuffer, m: &Mutation<'_>) {
            self.seen
                .push((m.kind, m.position, m.text.to_string(), m.origin));
        }
    }

    #[test]
    fn test_indicators_follow_edits() {
        let mut buffer = TextBuffer::from("hello world");
        buffer.set_current_indicator(2);
        buffer.fill_indicator_range(6, 5);

        buffer.insert(0, ">> ").unwrap();
        assert_eq!(buffer.indicator_start(2, 10), 9);
        assert_eq!(buffer.indicator_end(2, 10), 14);

        buffer.delete(0..3).unwrap();
        assert!(buffer.indicator_value_at(2, 6));
        assert!(!buffer.indicator_value_at(2, 5));
    }

    #[test]
    fn test_observed_delete_order() {
        let mut buffer = TextBuffer::from("abcdef");
        let mut recorder = Recorder::default();

        buffer.delete_observed(1..3, &mut recorder).unwrap();

        assert_eq!(
            recorder.seen,
            vec![
                (MutationKind::BeforeDelete, 1, "bc".to_string(), MutationOrigin::User),
                (MutationKind::DeleteText, 1, "bc".to_string(), MutationOrigin::User),
            ]
        );
    }

    #[test]
    fn test_replace_selection_moves_caret() {
        let mut buffer = TextBuffer::from("one two");
        buffer.set_selection(4, 7);

        buffer.replace_selection_observed("2", &mut ()).unwrap();
        assert_eq!(buffer.text(), "one 2");
        assert_eq!(buffer.selection(), Selection::caret_at(5));
    }

    #[test]
    fn test_target_search_and_replace() {
        let mut buffer = TextBuffer::from("let x = x + 1;");
        buffer.set_target(5, 14);

        assert_eq!(buffer.search_in_target("x"), Some(8));
        assert_eq!(buffer.target(), 8..9);

        assert_eq!(buffer.replace_target("value").unwrap(), 5);
        assert_eq!(buffer.text(), "let x = value + 1;");
        assert_eq!(buffer.target(), 8..13);
    }

    #[test]
    fn test_composite_undo_with_origin() {
        let mut buffer = TextBuffer::from("ab");
        buffer.begin_composite_edit();
        buffer.insert(2, "c").unwrap();
        buffer.insert(0, "z").unwrap();
        buffer.end_composite_edit();
        assert_eq!(buffer.text(), "zabc");

        let mut recorder = Recorder::default();
        buffer.undo_observed(&mut recorder).unwrap();
        assert_eq!(buffer.text(), "ab");
        assert!(recorder
            .seen
            .iter()
            .all(|(_, _, _, origin)| *origin == MutationOrigin::Undo));

        buffer.redo().unwrap();
        assert_eq!(buffer.text(), "zabc");
    }

    #[test]
    fn test_revision_counts_text_changes() {
        let mut buffer = TextBuffer::from("ab");
        assert_eq!(buffer.revision(), 0);

        buffer.insert(1, "").unwrap();
        buffer.set_selection(0, 2);
        buffer.set_current_indicator(3);
        buffer.fill_indicator_range(0, 1);
        assert_eq!(buffer.revision(), 0);

        buffer.insert(1, "x").unwrap();
        buffer.delete(0..1).unwrap();
        assert_eq!(buffer.revision(), 2);

        buffer.undo().unwrap();
        assert!(buffer.revision() > 2);
    }

    #[test]
    fn test_caret_subscription_sees_indicators() {
        let mut buffer = TextBuffer::from("abcdef");
        buffer.set_current_indicator(4);
        buffer.fill_indicator_range(2, 2);

        let inside = Rc::new(Cell::new(false));
        let flag = Rc::clone(&inside);
        let _sub = buffer.on_caret_moved(move |event| flag.set(event.touches(1 << 4)));

        buffer.set_selection(4, 4);
        assert!(inside.get());
        buffer.set_selection(5, 5);
        assert!(!inside.get());
    }

    #[test]
    fn test_grapheme_len() {
        let buffer = TextBuffer::from("e\u{301}x\r\n");
        assert_eq!(buffer.grapheme_len_at(0), 2);
        assert_eq!(buffer.grapheme_len_at(2), 1);
        assert_eq!(buffer.grapheme_len_at(3), 2);
        assert_eq!(buffer.grapheme_len_at(5), 0);
    }
}
