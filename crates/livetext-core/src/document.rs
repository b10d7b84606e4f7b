//! Document management.
//!
//! A `Document` pairs a `TextBuffer` with the `TabstopState` that watches
//! it. Every edit goes through the observed buffer operations with the
//! tabstop state as observer, so the insertion table and the linked group
//! stay in step with the text.
//!
//! ## Learning: Type Aliases and Newtypes
//!
//! `DocumentId` is a newtype wrapper around `Uuid`. This provides:
//! - Type safety: Can't accidentally use a string as a document ID
//! - Encapsulation: Can change the underlying type without breaking APIs
//!
//! ## Learning: Split Borrows
//!
//! `self.buffer.delete_observed(range, &mut self.tabstops)` borrows two
//! different fields mutably at once. The borrow checker allows this because
//! the fields are disjoint; calling a `&mut self` helper in the middle would
//! not be.

use livetext_buffer::{LineEnding, Selection, TextBuffer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{Config, TabstopConfig};
use crate::navigator::Advance;
use crate::node::{LiveText, ParseWarning};
use crate::parser::Parser;
use crate::session::TabstopState;
use crate::writer::insert_live_text;
use crate::{CoreError, CoreResult};

/// Unique identifier for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Creates a new unique document ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of inserting a snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnippetInsertion {
    /// Where the snippet text landed
    pub range: Range<usize>,
    /// Number of tabstops installed
    pub tabstops: usize,
    /// The first advance, when configured to select the first tabstop
    pub advance: Option<Advance>,
    pub warnings: Vec<ParseWarning>,
}

/// A buffer being edited, with its tabstop session.
pub struct Document {
    /// Unique identifier
    id: DocumentId,

    /// Display name
    name: String,

    /// The underlying text buffer
    buffer: TextBuffer,

    /// Tabstop session observing the buffer
    tabstops: TabstopState,

    /// Snippet behavior
    settings: TabstopConfig,
}

impl Document {
    /// Creates a new empty document with default settings.
    pub fn new() -> Self {
        Self::with_text("", &Config::default())
    }

    /// Creates a document holding `text`. Text that already has line breaks
    /// keeps its own line ending.
    pub fn with_text(text: &str, config: &Config) -> Self {
        let mut buffer_config = config.buffer_config();
        if text.contains(['\n', '\r']) {
            buffer_config.line_ending = LineEnding::detect(text);
        }
        Self {
            id: DocumentId::new(),
            name: "Untitled".to_string(),
            buffer: TextBuffer::from_str_with_config(text, buffer_config),
            tabstops: TabstopState::new(),
            settings: config.tabstops.clone(),
        }
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    // ==================== Getters ====================

    /// Returns the document ID.
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Returns the display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if the document has unsaved changes.
    pub fn is_modified(&self) -> bool {
        self.buffer.is_modified()
    }

    /// Returns the text buffer.
    pub fn buffer(&self) -> &TextBuffer {
        &self.buffer
    }

    /// Returns the tabstop session.
    pub fn tabstops(&self) -> &TabstopState {
        &self.tabstops
    }

    /// Returns all text.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        self.buffer.text()
    }

    /// Returns the selection.
    pub fn selection(&self) -> Selection {
        self.buffer.selection()
    }

    /// Returns the selected text.
    pub fn selected_text(&self) -> String {
        self.buffer
            .slice(self.buffer.selection().range())
            .map(|s| s.into_owned())
            .unwrap_or_default()
    }

    /// Returns the snippet settings.
    pub fn settings(&self) -> &TabstopConfig {
        &self.settings
    }

    /// Replaces the snippet settings.
    pub fn set_settings(&mut self, settings: TabstopConfig) {
        self.settings = settings;
    }

    // ==================== Snippets ====================

    /// Inserts a snippet at the selection.
    ///
    /// The snippet is parsed before anything changes, so a parse error
    /// leaves the document untouched. Otherwise any previous tabstop session
    /// is dropped, the snippet is written as one undo step and its tabstops
    /// are installed.
    pub fn insert_snippet(&mut self, source: &str) -> CoreResult<SnippetInsertion> {
        let live = Parser::new(source)
            .with_policy(self.settings.backref_conflict)
            .parse()?;

        self.tabstops.clear_tabstop_info(&mut self.buffer);

        let selection = self.buffer.selection();
        self.buffer.begin_composite_edit();
        let written = self.write_snippet(selection, &live);
        self.buffer.end_composite_edit();
        let range = written?;

        let LiveText {
            table, warnings, ..
        } = live;
        let tabstops = table.len();
        self.tabstops.install(table);
        self.buffer.set_selection(range.end, range.end);

        info!(document = %self.id, ?range, tabstops, "inserted snippet");

        let advance = self
            .settings
            .select_first_tabstop
            .then(|| self.tabstops.advance(&mut self.buffer));

        Ok(SnippetInsertion {
            range,
            tabstops,
            advance,
            warnings,
        })
    }

    fn write_snippet(&mut self, selection: Selection, live: &LiveText) -> CoreResult<Range<usize>> {
        let at = if self.settings.replace_selection {
            if !selection.is_empty() {
                self.buffer.delete(selection.range())?;
            }
            selection.start()
        } else {
            selection.caret
        };
        let len = insert_live_text(&mut self.buffer, at, live)?;
        Ok(at..at + len)
    }

    /// Moves to the next tabstop.
    pub fn next_tabstop(&mut self) -> Advance {
        self.tabstops.advance(&mut self.buffer)
    }

    /// Drops the tabstop session.
    pub fn clear_tabstop_info(&mut self) {
        self.tabstops.clear_tabstop_info(&mut self.buffer);
    }

    /// Runs work the tabstop session deferred out of edit callbacks.
    pub fn run_deferred(&mut self) {
        self.tabstops.run_deferred(&mut self.buffer);
    }

    // ==================== Text Editing ====================

    /// Types `text` over the selection.
    pub fn type_text(&mut self, text: &str) -> CoreResult<()> {
        self.buffer
            .replace_selection_observed(text, &mut self.tabstops)?;
        Ok(())
    }

    /// Inserts `text` at `at` without moving the caret past it.
    pub fn insert_text(&mut self, at: usize, text: &str) -> CoreResult<()> {
        self.buffer.insert_observed(at, text, &mut self.tabstops)?;
        Ok(())
    }

    /// Deletes a character range.
    pub fn delete_range(&mut self, range: Range<usize>) -> CoreResult<String> {
        Ok(self.buffer.delete_observed(range, &mut self.tabstops)?)
    }

    /// Deletes the selection or the character before the caret.
    pub fn backspace(&mut self) -> CoreResult<()> {
        if self.tabstops.intercept_backspace(&mut self.buffer) {
            debug!(document = %self.id, "backspace left the linked group");
        }
        let selection = self.buffer.selection();
        let range = if selection.is_empty() {
            let caret = selection.caret;
            caret.saturating_sub(1)..caret
        } else {
            selection.range()
        };
        self.delete_range(range)?;
        Ok(())
    }

    /// Deletes the selection or the grapheme after the caret.
    pub fn delete_forward(&mut self) -> CoreResult<()> {
        if self.tabstops.intercept_delete_forward(&mut self.buffer) {
            debug!(document = %self.id, "delete left the linked group");
        }
        let selection = self.buffer.selection();
        let range = if selection.is_empty() {
            let caret = selection.caret;
            caret..caret + self.buffer.grapheme_len_at(caret)
        } else {
            selection.range()
        };
        self.delete_range(range)?;
        Ok(())
    }

    // ==================== Selection ====================

    /// Sets the selection. Leaving every member of the linked group ends it.
    pub fn set_selection(&mut self, anchor: usize, caret: usize) {
        self.buffer.set_selection(anchor, caret);
        if self.tabstops.caret_left_group() {
            debug!(document = %self.id, caret, "caret left the linked group");
            self.tabstops.clear_linked_tabstops(&mut self.buffer);
        }
    }

    /// Collapses the selection to a caret at `position`.
    pub fn move_caret(&mut self, position: usize) {
        self.set_selection(position, position);
    }

    // ==================== Undo/Redo ====================

    /// Undoes the last action.
    pub fn undo(&mut self) -> CoreResult<()> {
        self.buffer.undo_observed(&mut self.tabstops)?;
        Ok(())
    }

    /// Redoes the last undone action.
    pub fn redo(&mut self) -> CoreResult<()> {
        self.buffer.redo_observed(&mut self.tabstops)?;
        Ok(())
    }

    /// Drops the tabstop session ahead of closing.
    pub fn close(&mut self) {
        self.clear_tabstop_info();
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Manages multiple open documents.
pub struct DocumentManager {
    /// All open documents
    documents: HashMap<DocumentId, Document>,

    /// Order in which documents were opened
    order: Vec<DocumentId>,

    /// Currently active document
    active: Option<DocumentId>,
}

impl DocumentManager {
    /// Creates a new document manager.
    pub fn new() -> Self {
        Self {
            documents: HashMap::new(),
            order: Vec::new(),
            active: None,
        }
    }

    /// Adds a document and makes it active.
    pub fn add(&mut self, doc: Document) -> DocumentId {
        let id = doc.id();
        self.documents.insert(id, doc);
        self.order.push(id);
        self.active = Some(id);
        id
    }

    /// Closes a document, dropping its tabstop session first.
    pub fn close(&mut self, id: DocumentId) -> CoreResult<()> {
        let mut doc = self
            .documents
            .remove(&id)
            .ok_or(CoreError::DocumentNotFound(id))?;
        doc.close();
        self.order.retain(|&i| i != id);

        if self.active == Some(id) {
            self.active = self.order.last().copied();
        }

        Ok(())
    }

    /// Returns a document by ID.
    pub fn get(&self, id: DocumentId) -> Option<&Document> {
        self.documents.get(&id)
    }

    /// Returns a mutable document by ID.
    pub fn get_mut(&mut self, id: DocumentId) -> Option<&mut Document> {
        self.documents.get_mut(&id)
    }

    /// Returns the active document.
    pub fn active(&self) -> Option<&Document> {
        self.active.and_then(|id| self.documents.get(&id))
    }

    /// Returns a mutable reference to the active document.
    pub fn active_mut(&mut self) -> Option<&mut Document> {
        self.active.and_then(|id| self.documents.get_mut(&id))
    }

    /// Sets the active document.
    pub fn set_active(&mut self, id: DocumentId) {
        if self.documents.contains_key(&id) {
            self.active = Some(id);
        }
    }

    /// Returns an iterator over all documents.
    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.order.iter().filter_map(|id| self.documents.get(id))
    }

    /// Returns the number of open documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns true if no documents are open.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl Default for DocumentManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::Indicator;
    use crate::parser::{BackrefConflictPolicy, ParseErrorKind};

    fn doc(text: &str) -> Document {
        Document::with_text(text, &Config::default())
    }

    fn linked_bits(doc: &Document) -> usize {
        let buffer = doc.buffer();
        (0..buffer.len_chars())
            .filter(|&p| buffer.indicators_at(p) & Indicator::linked_mask() != 0)
            .count()
    }

    #[test]
    fn test_insert_snippet_replaces_selection() {
        let mut doc = doc("let x = OLD;");
        doc.set_selection(8, 11);

        let inserted = doc.insert_snippet("f([[%tabstop:a]])").unwrap();
        assert_eq!(doc.text(), "let x = f(a);");
        assert_eq!(inserted.range, 8..12);
        assert_eq!(inserted.tabstops, 1);
        assert_eq!(inserted.advance, Some(Advance::Selected { range: 10..11 }));
        assert_eq!(doc.selected_text(), "a");
    }

    #[test]
    fn test_insert_snippet_without_selecting() {
        let config = Config {
            tabstops: TabstopConfig {
                select_first_tabstop: false,
                replace_selection: false,
                ..TabstopConfig::default()
            },
            ..Config::default()
        };
        let mut doc = Document::with_text("ab", &config);
        doc.set_selection(0, 1);

        let inserted = doc.insert_snippet("<[[%tabstop:x]]>").unwrap();
        assert_eq!(doc.text(), "a<x>b");
        assert_eq!(inserted.advance, None);
        assert_eq!(doc.selection(), Selection::caret_at(4));
        assert_eq!(doc.next_tabstop(), Advance::Selected { range: 2..3 });
    }

    #[test]
    fn test_existing_line_ending_is_kept() {
        let mut doc = doc("a\r\nb");
        assert_eq!(doc.buffer().config().line_ending, LineEnding::CrLf);

        doc.move_caret(4);
        doc.insert_snippet("x[[%tabstop]]").unwrap();
        assert_eq!(doc.text(), "a\r\nbx\r\n");
        assert_eq!(doc.selection(), Selection::caret_at(5));
    }

    #[test]
    fn test_empty_nested_group_does_not_block_navigation() {
        let mut doc = doc("");
        let inserted = doc
            .insert_snippet("[[%tabstop:a]] f([[%tabstop:[[%tabstop]]]])")
            .unwrap();
        assert_eq!(inserted.advance, Some(Advance::Selected { range: 0..1 }));
        assert_eq!(doc.next_tabstop(), Advance::Selected { range: 4..4 });
        assert_eq!(doc.next_tabstop(), Advance::Selected { range: 4..4 });
        assert!(doc.tabstops().table().is_empty());
    }

    #[test]
    fn test_parse_error_leaves_document_untouched() {
        let mut doc = doc("keep");
        doc.insert_snippet("[[%tabstop:a]] [[%tabstop:b]]").unwrap();
        let before = doc.text().into_owned();

        let err = doc.insert_snippet("[[%tabstop:oops").unwrap_err();
        assert!(matches!(
            err,
            CoreError::Parse(ref e) if e.kind == ParseErrorKind::UnterminatedName
        ));
        assert_eq!(doc.text(), before);
        assert_eq!(doc.tabstops().table().len(), 1);
    }

    #[test]
    fn test_new_snippet_clears_previous_session() {
        let mut doc = doc("");
        doc.insert_snippet("[[%tabstop1:a]] [[%tabstop1]] [[%tabstop:z]]")
            .unwrap();
        assert!(doc.tabstops().is_linked());

        doc.move_caret(doc.buffer().len_chars());
        doc.insert_snippet("!").unwrap();
        assert!(!doc.tabstops().is_linked());
        assert!(doc.tabstops().table().is_empty());
        assert_eq!(doc.buffer().composite_depth(), 0);
        let buffer = doc.buffer();
        assert!((0..buffer.len_chars()).all(|p| buffer.indicators_at(p) == 0));
    }

    #[test]
    fn test_snippet_is_one_undo_step() {
        let mut doc = doc("x");
        doc.move_caret(1);
        doc.insert_snippet(" = [[%tabstop:value]];").unwrap();
        assert_eq!(doc.text(), "x = value;");

        doc.undo().unwrap();
        assert_eq!(doc.text(), "x");
    }

    #[test]
    fn test_linked_typing_and_deleting() {
        let mut doc = doc("");
        doc.insert_snippet("<[[%tabstop1:div]]></[[%tabstop1]]>").unwrap();
        assert_eq!(doc.selected_text(), "div");

        doc.type_text("span").unwrap();
        assert_eq!(doc.text(), "<span></span>");

        doc.backspace().unwrap();
        doc.backspace().unwrap();
        assert_eq!(doc.text(), "<sp></sp>");
        assert!(doc.tabstops().is_linked());
    }

    #[test]
    fn test_backspace_at_member_edge_unlinks_then_deletes() {
        let mut doc = doc("");
        doc.insert_snippet("([[%tabstop1:ab]] [[%tabstop1]])").unwrap();
        doc.move_caret(1);
        assert!(doc.tabstops().is_linked());

        doc.backspace().unwrap();
        assert_eq!(doc.text(), "ab ab)");
        assert!(!doc.tabstops().is_linked());
        assert_eq!(linked_bits(&doc), 0);
    }

    #[test]
    fn test_caret_leaving_group_unlinks() {
        let mut doc = doc("");
        doc.insert_snippet("[[%tabstop1:a]] + [[%tabstop1]];").unwrap();

        doc.move_caret(1);
        assert!(doc.tabstops().is_linked());
        doc.move_caret(4);
        assert!(doc.tabstops().is_linked());
        doc.move_caret(2);
        assert!(!doc.tabstops().is_linked());
        assert_eq!(doc.buffer().composite_depth(), 0);
    }

    #[test]
    fn test_conflict_policy_from_settings() {
        let mut doc = doc("");
        let snippet = "[[%tabstop1:a]] [[%tabstop1:b]]";

        let inserted = doc.insert_snippet(snippet).unwrap();
        assert_eq!(inserted.warnings.len(), 1);
        assert_eq!(doc.text(), "a a");

        doc.set_settings(TabstopConfig {
            backref_conflict: BackrefConflictPolicy::Reject,
            ..TabstopConfig::default()
        });
        assert!(doc.insert_snippet(snippet).is_err());
    }

    #[test]
    fn test_close_clears_tabstops() {
        let mut doc = doc("");
        doc.insert_snippet("[[%tabstop:a]][[%soft:;]]").unwrap();
        doc.close();
        assert!(doc.tabstops().table().is_empty());
        assert!(doc.buffer().indicator_value_at(Indicator::SoftChar.id(), 1));
    }

    #[test]
    fn test_manager_close_moves_active() {
        let mut manager = DocumentManager::new();
        let first = manager.add(Document::new().with_name("one"));
        let second = manager.add(Document::new().with_name("two"));
        assert_eq!(manager.active().map(Document::id), Some(second));

        manager.close(second).unwrap();
        assert_eq!(manager.active().map(Document::id), Some(first));
        assert!(matches!(
            manager.close(second),
            Err(CoreError::DocumentNotFound(id)) if id == second
        ));
        assert_eq!(manager.len(), 1);
    }
}
