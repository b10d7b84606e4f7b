//! Undo/redo history management.
//!
//! ## Learning: The Command Pattern
//!
//! Each edit is stored as a command that can be:
//! - Executed (applied to the buffer)
//! - Undone (reversed)
//! - Redone (re-applied after undo)
//!
//! Edits are collected into groups. A group is one undo step: rapid
//! adjacent keystrokes coalesce into the same group, and everything done
//! inside a composite edit scope lands in a single group.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// The type of edit operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditKind {
    /// Text was inserted
    Insert,
    /// Text was deleted
    Delete,
}

/// A single edit operation.
///
/// ## Learning: Clone vs Copy
///
/// `Edit` implements `Clone` but not `Copy` because it contains
/// a `String`, which owns heap memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    /// What kind of edit this is
    pub kind: EditKind,
    /// Character position where the edit occurred
    pub position: usize,
    /// The text that was inserted or deleted
    pub content: String,
}

impl Edit {
    /// Creates an insert edit.
    pub fn insert(position: usize, content: impl Into<String>) -> Self {
        Self {
            kind: EditKind::Insert,
            position,
            content: content.into(),
        }
    }

    /// Creates a delete edit.
    pub fn delete(position: usize, content: impl Into<String>) -> Self {
        Self {
            kind: EditKind::Delete,
            position,
            content: content.into(),
        }
    }

    /// Returns the inverse of this edit (for undo).
    pub fn inverse(&self) -> Self {
        Self {
            kind: match self.kind {
                EditKind::Insert => EditKind::Delete,
                EditKind::Delete => EditKind::Insert,
            },
            position: self.position,
            content: self.content.clone(),
        }
    }

    /// Length of the edited text in characters.
    pub fn len_chars(&self) -> usize {
        self.content.chars().count()
    }

    /// Returns true if this edit can be coalesced with another.
    ///
    /// Two edits can be coalesced if:
    /// - They're the same kind
    /// - They're adjacent (next character for insert, same position for delete)
    /// - Neither is a newline
    pub fn can_coalesce(&self, other: &Edit) -> bool {
        if self.kind != other.kind {
            return false;
        }

        if self.content.contains('\n') || other.content.contains('\n') {
            return false;
        }

        match self.kind {
            EditKind::Insert => self.position + self.len_chars() == other.position,
            EditKind::Delete => {
                // Backspace runs leftwards, forward delete stays put
                other.position + other.len_chars() == self.position
                    || self.position == other.position
            }
        }
    }

    /// Coalesces another edit into this one.
    pub fn coalesce(&mut self, other: Edit) {
        match self.kind {
            EditKind::Insert => {
                self.content.push_str(&other.content);
            }
            EditKind::Delete => {
                if other.position < self.position {
                    self.content = other.content + &self.content;
                    self.position = other.position;
                } else {
                    self.content.push_str(&other.content);
                }
            }
        }
    }
}

/// A group of edits that should be undone/redone together.
#[derive(Debug, Clone)]
pub struct EditGroup {
    /// The edits in the order they were made
    pub edits: Vec<Edit>,
    /// Last time the group grew; `None` seals it against coalescing
    pub timestamp: Option<Instant>,
}

impl EditGroup {
    /// Creates a new edit group.
    pub fn new(edit: Edit) -> Self {
        Self {
            edits: vec![edit],
            timestamp: Some(Instant::now()),
        }
    }

    /// Adds an edit to this group.
    pub fn push(&mut self, edit: Edit) {
        self.edits.push(edit);
        self.timestamp = Some(Instant::now());
    }

    /// Returns a mutable reference to the last edit.
    pub fn last_mut(&mut self) -> Option<&mut Edit> {
        self.edits.last_mut()
    }

    fn seal(&mut self) {
        self.timestamp = None;
    }
}

/// Manages undo/redo history.
///
/// ## Design Decisions
///
/// 1. **Bounded history**: Limits memory usage for long editing sessions
/// 2. **Edit coalescing**: Combines rapid keystrokes into single undo steps
/// 3. **Composite scopes**: `begin_group`/`end_group` nest; the outermost
///    pair delimits one undo step
#[derive(Debug, Clone)]
pub struct History {
    /// Stack of undoable edit groups
    undo_stack: VecDeque<EditGroup>,
    /// Stack of redoable edit groups
    redo_stack: Vec<EditGroup>,
    /// Maximum number of edit groups to keep
    max_size: usize,
    /// Time threshold for coalescing edits
    coalesce_threshold: Duration,
    /// Nesting depth of open composite scopes
    group_depth: usize,
    /// Whether the open composite scope already owns the back group
    group_started: bool,
}

impl History {
    /// Creates a new history with the given capacity.
    pub fn new(max_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::with_capacity(max_size.min(64)),
            redo_stack: Vec::new(),
            max_size: max_size.max(1),
            coalesce_threshold: Duration::from_millis(300),
            group_depth: 0,
            group_started: false,
        }
    }

    /// Pushes an edit onto the history.
    ///
    /// Clears the redo stack (can't redo after new edit).
    pub fn push(&mut self, edit: Edit) {
        self.redo_stack.clear();

        if self.group_depth > 0 {
            if self.group_started {
                if let Some(group) = self.undo_stack.back_mut() {
                    group.push(edit);
                    return;
                }
            }
            self.group_started = true;
            self.push_group(EditGroup::new(edit));
            return;
        }

        if let Some(last_group) = self.undo_stack.back_mut() {
            let recent = last_group
                .timestamp
                .is_some_and(|t| t.elapsed() < self.coalesce_threshold);
            if recent {
                if let Some(last_edit) = last_group.last_mut() {
                    if last_edit.can_coalesce(&edit) {
                        last_edit.coalesce(edit);
                        last_group.timestamp = Some(Instant::now());
                        return;
                    }
                }
            }
        }

        self.push_group(EditGroup::new(edit));
    }

    fn push_group(&mut self, group: EditGroup) {
        self.undo_stack.push_back(group);
        while self.undo_stack.len() > self.max_size {
            self.undo_stack.pop_front();
        }
    }

    /// Opens a composite scope.
    ///
    /// All edits until the matching `end_group()` form one undo step.
    pub fn begin_group(&mut self) {
        if self.group_depth == 0 {
            self.group_started = false;
        }
        self.group_depth += 1;
    }

    /// Closes the innermost composite scope.
    pub fn end_group(&mut self) {
        if self.group_depth == 0 {
            return;
        }
        self.group_depth -= 1;
        if self.group_depth == 0 {
            if self.group_started {
                if let Some(group) = self.undo_stack.back_mut() {
                    group.seal();
                }
            }
            self.group_started = false;
        }
    }

    /// Nesting depth of open composite scopes.
    pub fn group_depth(&self) -> usize {
        self.group_depth
    }

    /// Pops the last group for undoing. Edits are in the order they were made.
    pub fn undo(&mut self) -> Option<EditGroup> {
        let mut group = self.undo_stack.pop_back()?;
        group.seal();
        self.redo_stack.push(group.clone());
        // A scope still open must not append to the group before this one
        self.group_started = false;
        Some(group)
    }

    /// Pops the last undone group for redoing.
    pub fn redo(&mut self) -> Option<EditGroup> {
        let group = self.redo_stack.pop()?;
        self.undo_stack.push_back(group.clone());
        self.group_started = false;
        Some(group)
    }

    /// Returns true if there are edits to undo.
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Returns true if there are edits to redo.
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Clears all history.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Returns the number of undo steps available.
    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    /// Returns the number of redo steps available.
    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_inverse() {
        let insert = Edit::insert(0, "hello");
        let inverse = insert.inverse();

        assert_eq!(inverse.kind, EditKind::Delete);
        assert_eq!(inverse.position, 0);
        assert_eq!(inverse.content, "hello");
    }

    #[test]
    fn test_history_undo_redo() {
        let mut history = History::new(100);

        history.push(Edit::insert(0, "a"));
        history.push(Edit::insert(5, "b"));

        assert_eq!(history.undo_count(), 2);
        let group = history.undo().unwrap();
        assert_eq!(group.edits, vec![Edit::insert(5, "b")]);

        assert!(history.can_redo());
        let group = history.redo().unwrap();
        assert_eq!(group.edits[0].content, "b");
    }

    #[test]
    fn test_edit_coalescing() {
        let mut e1 = Edit::insert(0, "a");
        let e2 = Edit::insert(1, "b");

        assert!(e1.can_coalesce(&e2));
        e1.coalesce(e2);
        assert_eq!(e1.content, "ab");
    }

    #[test]
    fn test_composite_scope_is_one_step() {
        let mut history = History::new(100);
        history.push(Edit::insert(0, "x\n"));

        history.begin_group();
        history.push(Edit::insert(10, "a"));
        history.begin_group();
        history.push(Edit::delete(20, "zz"));
        history.end_group();
        history.push(Edit::insert(30, "c"));
        history.end_group();

        assert_eq!(history.undo_count(), 2);
        let group = history.undo().unwrap();
        assert_eq!(group.edits.len(), 3);
        assert_eq!(history.group_depth(), 0);
    }

    #[test]
    fn test_sealed_group_does_not_coalesce() {
        let mut history = History::new(100);
        history.begin_group();
        history.push(Edit::insert(0, "a"));
        history.end_group();
        history.push(Edit::insert(1, "b"));

        assert_eq!(history.undo_count(), 2);
    }
}
