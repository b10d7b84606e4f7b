//! Main editor orchestration.
//!
//! ## Learning: The Facade Pattern
//!
//! `Editor` acts as a facade, providing a simple interface to
//! complex subsystems. External code only needs to interact with
//! `Editor`, not individual components.
//!
//! Each `execute` call runs one command to completion, then the document's
//! deferred tabstop work, and only then publishes events. Subscribers never
//! observe a half-finished edit.

use crate::command::Command;
use crate::config::Config;
use crate::document::{Document, DocumentId, DocumentManager};
use crate::event::{EditorEvent, EventBus};
use crate::navigator::Advance;
use crate::{CoreError, CoreResult};

/// The main editor state.
///
/// ## Thread Safety
///
/// `Editor` is owned by a single thread. Buffers hold `Rc` caret listeners,
/// so it is not `Send`; other threads only see the events it broadcasts.
pub struct Editor {
    /// Document management
    documents: DocumentManager,

    /// Editor configuration
    config: Config,

    /// Event bus for notifications
    event_bus: EventBus,
}

/// What the editor compares around a command to derive events.
struct Snapshot {
    revision: u64,
    linked: Option<(u32, usize)>,
}

impl Snapshot {
    fn of(doc: &Document) -> Self {
        Self {
            revision: doc.buffer().revision(),
            linked: doc.tabstops().linked_group(),
        }
    }
}

impl Editor {
    /// Creates a new editor instance.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an editor with custom configuration.
    pub fn with_config(config: Config) -> Self {
        Self {
            documents: DocumentManager::new(),
            config,
            event_bus: EventBus::new(),
        }
    }

    // ==================== Document Operations ====================

    /// Creates a document holding `text` and makes it active.
    pub fn new_document(&mut self, text: &str) -> DocumentId {
        self.open(Document::with_text(text, &self.config))
    }

    /// Adds an existing document and makes it active.
    pub fn open(&mut self, doc: Document) -> DocumentId {
        let id = self.documents.add(doc);
        self.emit(EditorEvent::DocumentOpened { document: id });
        id
    }

    /// Closes a document, dropping its tabstop session.
    pub fn close_document(&mut self, id: DocumentId) -> CoreResult<()> {
        let had_tabstops = self
            .documents
            .get(id)
            .is_some_and(|d| d.tabstops().is_linked() || !d.tabstops().table().is_empty());
        self.documents.close(id)?;
        if had_tabstops {
            self.emit(EditorEvent::TabstopsCleared { document: id });
        }
        self.emit(EditorEvent::DocumentClosed { document: id });
        Ok(())
    }

    /// Makes `id` the active document.
    pub fn focus(&mut self, id: DocumentId) -> CoreResult<()> {
        if self.documents.get(id).is_none() {
            return Err(CoreError::DocumentNotFound(id));
        }
        self.documents.set_active(id);
        Ok(())
    }

    /// Returns the active document.
    pub fn active_document(&self) -> CoreResult<&Document> {
        self.documents.active().ok_or(CoreError::NoActiveDocument)
    }

    /// Returns a mutable reference to the active document.
    pub fn active_document_mut(&mut self) -> CoreResult<&mut Document> {
        self.documents
            .active_mut()
            .ok_or(CoreError::NoActiveDocument)
    }

    /// Returns a document by ID.
    pub fn document(&self, id: DocumentId) -> CoreResult<&Document> {
        self.documents
            .get(id)
            .ok_or(CoreError::DocumentNotFound(id))
    }

    /// Returns all open documents.
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    // ==================== Commands ====================

    /// Runs a command against the active document.
    pub fn execute(&mut self, command: Command) -> CoreResult<()> {
        tracing::debug!(command = command.display_name(), "execute");

        let doc = self
            .documents
            .active_mut()
            .ok_or(CoreError::NoActiveDocument)?;
        let id = doc.id();

        if command == Command::CloseDocument {
            return self.close_document(id);
        }

        let before = Snapshot::of(doc);
        let mut events = Vec::new();
        let result = Self::apply(doc, command, &before, &mut events);
        doc.run_deferred();
        let after = Snapshot::of(doc);

        let unlinked = EditorEvent::GroupUnlinked { document: id };
        if before.linked.is_some() && after.linked.is_none() && !events.contains(&unlinked) {
            events.push(unlinked);
        }
        if before.revision != after.revision {
            events.push(EditorEvent::DocumentChanged { document: id });
        }

        for event in events {
            self.event_bus.emit(event);
        }
        result
    }

    /// Runs commands in order, stopping at the first error.
    pub fn execute_all(&mut self, commands: impl IntoIterator<Item = Command>) -> CoreResult<()> {
        commands
            .into_iter()
            .try_for_each(|command| self.execute(command))
    }

    fn apply(
        doc: &mut Document,
        command: Command,
        before: &Snapshot,
        events: &mut Vec<EditorEvent>,
    ) -> CoreResult<()> {
        let id = doc.id();
        match command {
            Command::InsertSnippet { source } => {
                let inserted = doc.insert_snippet(&source)?;
                if before.linked.is_some() {
                    events.push(EditorEvent::GroupUnlinked { document: id });
                }
                events.push(EditorEvent::SnippetInserted {
                    document: id,
                    range: inserted.range,
                    tabstops: inserted.tabstops,
                });
                if let Some(advance) = inserted.advance {
                    advance_events(id, &advance, false, events);
                }
            }
            Command::NextTabstop => {
                let advance = doc.next_tabstop();
                advance_events(id, &advance, before.linked.is_some(), events);
            }
            Command::ClearTabstops => {
                doc.clear_tabstop_info();
                if before.linked.is_some() {
                    events.push(EditorEvent::GroupUnlinked { document: id });
                }
                events.push(EditorEvent::TabstopsCleared { document: id });
            }
            Command::TypeText { text } => doc.type_text(&text)?,
            Command::Backspace => doc.backspace()?,
            Command::DeleteForward => doc.delete_forward()?,
            Command::Undo => doc.undo()?,
            Command::Redo => doc.redo()?,
            Command::MoveCaret { position } => doc.move_caret(position),
            Command::Select { anchor, caret } => doc.set_selection(anchor, caret),
            Command::CloseDocument => {}
        }
        Ok(())
    }

    // ==================== Configuration ====================

    /// Returns the editor configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Updates the configuration. Snippet settings apply to open documents
    /// at once; buffer settings only to new ones.
    pub fn set_config(&mut self, config: Config) {
        for id in self.documents.iter().map(Document::id).collect::<Vec<_>>() {
            if let Some(doc) = self.documents.get_mut(id) {
                doc.set_settings(config.tabstops.clone());
            }
        }
        self.config = config;
    }

    // ==================== Events ====================

    /// Subscribes to editor events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EditorEvent> {
        self.event_bus.subscribe()
    }

    fn emit(&self, event: EditorEvent) {
        self.event_bus.emit(event);
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

fn advance_events(id: DocumentId, advance: &Advance, was_linked: bool, events: &mut Vec<EditorEvent>) {
    if was_linked {
        events.push(EditorEvent::GroupUnlinked { document: id });
    }
    match advance {
        Advance::Selected { range } => events.push(EditorEvent::TabstopSelected {
            document: id,
            range: range.clone(),
        }),
        Advance::Linked {
            backref, members, ..
        } => events.push(EditorEvent::GroupLinked {
            document: id,
            backref: *backref,
            members: *members,
        }),
        Advance::Unlinked | Advance::NotHandled => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::parse_key_script;
    use crate::event::EventHandler;

    #[test]
    fn test_snippet_session_events() {
        let mut editor = Editor::new();
        let id = editor.new_document("");
        let mut events = EventHandler::new(editor.subscribe());

        editor
            .execute(Command::InsertSnippet {
                source: "[[%tabstop:a]] [[%tabstop1:b]]=[[%tabstop1]]".to_string(),
            })
            .unwrap();
        editor.execute(Command::NextTabstop).unwrap();
        editor.execute(Command::NextTabstop).unwrap();

        assert_eq!(
            events.drain(),
            vec![
                EditorEvent::SnippetInserted {
                    document: id,
                    range: 0..5,
                    tabstops: 3,
                },
                EditorEvent::TabstopSelected {
                    document: id,
                    range: 0..1,
                },
                EditorEvent::DocumentChanged { document: id },
                EditorEvent::GroupLinked {
                    document: id,
                    backref: 1,
                    members: 2,
                },
                EditorEvent::GroupUnlinked { document: id },
            ]
        );
    }

    #[test]
    fn test_key_script_drives_linked_edit() {
        let mut editor = Editor::new();
        editor.new_document("");
        editor
            .execute(Command::InsertSnippet {
                source: "let [[%tabstop1:x]] = [[%tabstop:0]]; use([[%tabstop1]]);".to_string(),
            })
            .unwrap();

        editor
            .execute_all(parse_key_script("type:count,tab,type:42,tab").unwrap())
            .unwrap();
        let doc = editor.active_document().unwrap();
        assert_eq!(doc.text(), "let count = 42; use(count);");
        assert!(!doc.tabstops().is_linked());
        assert_eq!(doc.buffer().composite_depth(), 0);
    }

    #[test]
    fn test_undo_while_linked_unlinks_after_command() {
        let mut editor = Editor::new();
        let id = editor.new_document("");
        editor
            .execute(Command::InsertSnippet {
                source: "[[%tabstop1:a]] [[%tabstop1]];".to_string(),
            })
            .unwrap();
        editor.execute(Command::TypeText { text: "b".to_string() }).unwrap();
        assert_eq!(editor.document(id).unwrap().text(), "b b;");

        let mut events = EventHandler::new(editor.subscribe());
        editor.execute(Command::Undo).unwrap();
        let doc = editor.document(id).unwrap();
        assert!(!doc.tabstops().is_linked());
        assert!(!doc.tabstops().has_deferred());
        assert_eq!(doc.buffer().composite_depth(), 0);
        assert!(events.drain().contains(&EditorEvent::GroupUnlinked { document: id }));
    }

    #[test]
    fn test_close_document() {
        let mut editor = Editor::new();
        let first = editor.new_document("one");
        let second = editor.new_document("two");
        editor
            .execute(Command::InsertSnippet {
                source: "[[%tabstop:x]][[%tabstop:y]]".to_string(),
            })
            .unwrap();

        let mut events = EventHandler::new(editor.subscribe());
        editor.execute(Command::CloseDocument).unwrap();
        assert_eq!(
            events.drain(),
            vec![
                EditorEvent::TabstopsCleared { document: second },
                EditorEvent::DocumentClosed { document: second },
            ]
        );
        assert_eq!(editor.active_document().unwrap().id(), first);

        editor.close_document(first).unwrap();
        assert!(matches!(
            editor.execute(Command::NextTabstop),
            Err(CoreError::NoActiveDocument)
        ));
    }

    #[test]
    fn test_change_events_follow_edits_only() {
        let mut editor = Editor::new();
        let id = editor.new_document("abc");
        let mut events = EventHandler::new(editor.subscribe());

        editor.execute(Command::MoveCaret { position: 1 }).unwrap();
        editor.execute(Command::Select { anchor: 0, caret: 2 }).unwrap();
        assert!(events.drain().is_empty());

        editor.execute(Command::Backspace).unwrap();
        assert_eq!(events.drain(), vec![EditorEvent::DocumentChanged { document: id }]);
        assert_eq!(editor.document(id).unwrap().text(), "c");
    }

    #[test]
    fn test_parse_error_is_returned() {
        let mut editor = Editor::new();
        editor.new_document("text");
        let err = editor
            .execute(Command::InsertSnippet {
                source: "[[%tabstopX]]".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Parse(_)));
        assert_eq!(editor.active_document().unwrap().text(), "text");
    }

    #[test]
    fn test_set_config_updates_open_documents() {
        let mut editor = Editor::new();
        let id = editor.new_document("");
        let mut config = Config::default();
        config.tabstops.select_first_tabstop = false;
        editor.set_config(config);

        assert!(!editor.document(id).unwrap().settings().select_first_tabstop);
        assert!(editor.focus(DocumentId::new()).is_err());
    }
}
