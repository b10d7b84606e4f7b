//! Event system for editor notifications.
//!
//! ## Learning: Observer Pattern in Rust
//!
//! Rust's ownership model makes traditional observer patterns tricky.
//! We use `tokio::sync::broadcast` for a safe, async-friendly event bus.
//!
//! Key differences from OOP observers:
//! - No object references to manage
//! - Events are values, not callbacks
//! - Subscribers receive copies (Clone)
//!
//! The buffer's own mutation notifications are a different beast: they are
//! synchronous and must finish before the edit completes. Events here are
//! published afterwards, once a command has run to completion.

use serde::Serialize;
use std::ops::Range;
use tokio::sync::broadcast;

use crate::document::DocumentId;

/// Events that can occur in the editor.
///
/// ## Learning: Enum Variants
///
/// Rust enums can hold data, unlike C-style enums.
/// Each variant can have different associated data.
/// Pattern matching ensures all cases are handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EditorEvent {
    // Document events
    /// A document was opened
    DocumentOpened { document: DocumentId },
    /// A document was closed
    DocumentClosed { document: DocumentId },
    /// A document's content changed
    DocumentChanged { document: DocumentId },

    // Tabstop events
    /// A snippet was written into a document
    SnippetInserted {
        document: DocumentId,
        range: Range<usize>,
        tabstops: usize,
    },
    /// A tabstop was selected
    TabstopSelected {
        document: DocumentId,
        range: Range<usize>,
    },
    /// A backref group became live-linked
    GroupLinked {
        document: DocumentId,
        backref: u32,
        members: usize,
    },
    /// The live-linked group was released
    GroupUnlinked { document: DocumentId },
    /// Every remaining tabstop was dropped
    TabstopsCleared { document: DocumentId },
}

impl EditorEvent {
    /// The document the event is about.
    pub fn document(&self) -> DocumentId {
        match self {
            EditorEvent::DocumentOpened { document }
            | EditorEvent::DocumentClosed { document }
            | EditorEvent::DocumentChanged { document }
            | EditorEvent::SnippetInserted { document, .. }
            | EditorEvent::TabstopSelected { document, .. }
            | EditorEvent::GroupLinked { document, .. }
            | EditorEvent::GroupUnlinked { document }
            | EditorEvent::TabstopsCleared { document } => *document,
        }
    }
}

/// Event bus for broadcasting editor events.
///
/// ## Design
///
/// Using a broadcast channel allows:
/// - Multiple subscribers (CLI output, tests, a future UI)
/// - Async reception
/// - Lagged receivers don't block senders
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EditorEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    pub fn new() -> Self {
        // Capacity of 256 events in the buffer
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    /// Emits an event to all subscribers.
    pub fn emit(&self, event: EditorEvent) {
        tracing::trace!(?event, "emit");
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribes to events.
    ///
    /// Returns a receiver that will get all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<EditorEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper for processing events asynchronously.
///
/// ## Example
///
/// ```ignore
/// let mut handler = EventHandler::new(editor.subscribe());
///
/// tokio::spawn(async move {
///     while let Some(event) = handler.next().await {
///         if let EditorEvent::GroupLinked { backref, .. } = event {
///             println!("editing backref {backref}");
///         }
///     }
/// });
/// ```
pub struct EventHandler {
    receiver: broadcast::Receiver<EditorEvent>,
}

impl EventHandler {
    /// Creates a new event handler.
    pub fn new(receiver: broadcast::Receiver<EditorEvent>) -> Self {
        Self { receiver }
    }

    /// Waits for the next event.
    pub async fn next(&mut self) -> Option<EditorEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Event handler lagged, missed {} events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns every event already queued without waiting.
    pub fn drain(&mut self) -> Vec<EditorEvent> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!("Event handler lagged, missed {} events", n);
                }
                Err(_) => return events,
            }
        }
    }
}
