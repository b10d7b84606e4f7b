//! Mutation notifications.
//!
//! ## Learning: Passing `&mut` Down Instead of Up
//!
//! A listener that wants to react to an edit usually needs to edit the
//! buffer again. Storing the listener inside the buffer would mean two
//! mutable paths to the same data, which the borrow checker rejects.
//! Instead, the caller hands an observer to each observed operation and
//! the buffer passes itself back in: `observer.on_mutation(self, ..)`.

use serde::{Deserialize, Serialize};

use crate::TextBuffer;

/// What happened to the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    /// Text is about to be removed; ranges can still be resolved
    BeforeDelete,
    /// Text was inserted
    InsertText,
    /// Text was removed
    DeleteText,
}

/// Which path produced the mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MutationOrigin {
    /// A direct edit
    #[default]
    User,
    /// Replaying history backwards
    Undo,
    /// Replaying history forwards
    Redo,
}

/// A single notification, delivered synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mutation<'a> {
    pub kind: MutationKind,
    /// Character offset of the edit
    pub position: usize,
    /// Inserted text, or the text being deleted
    pub text: &'a str,
    /// Length of `text` in characters
    pub length: usize,
    pub origin: MutationOrigin,
}

impl<'a> Mutation<'a> {
    pub(crate) fn new(
        kind: MutationKind,
        position: usize,
        text: &'a str,
        origin: MutationOrigin,
    ) -> Self {
        Self {
            kind,
            position,
            text,
            length: text.chars().count(),
            origin,
        }
    }

    /// Character range touched by the mutation.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.position..self.position + self.length
    }

    /// Returns true if the mutation replays history.
    pub fn is_history_replay(&self) -> bool {
        self.origin != MutationOrigin::User
    }
}

/// Receives mutation notifications from observed buffer operations.
///
/// Observers may change indicators and the selection at any point, and may
/// edit text on `InsertText`/`DeleteText`. They must not edit text while
/// handling `BeforeDelete`.
pub trait MutationObserver {
    fn on_mutation(&mut self, buffer: &mut TextBuffer, mutation: &Mutation<'_>);
}

/// The unit observer ignores everything; plain edits go through it.
impl MutationObserver for () {
    fn on_mutation(&mut self, _buffer: &mut TextBuffer, _mutation: &Mutation<'_>) {}
}
