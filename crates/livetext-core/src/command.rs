//! Command system for editor actions.
//!
//! ## Learning: The Command Pattern
//!
//! Commands encapsulate actions as values:
//! - Actions become first-class values
//! - Can be stored, queued, serialized
//! - A recorded key script replays as a plain `Vec<Command>`

use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

/// Built-in editor commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    // Tabstops
    InsertSnippet { source: String },
    NextTabstop,
    ClearTabstops,

    // Editing
    TypeText { text: String },
    Backspace,
    DeleteForward,
    Undo,
    Redo,

    // Caret
    MoveCaret { position: usize },
    Select { anchor: usize, caret: usize },

    // Documents
    CloseDocument,
}

impl Command {
    /// Returns the command's display name.
    pub fn display_name(&self) -> &str {
        match self {
            Command::InsertSnippet { .. } => "Insert Snippet",
            Command::NextTabstop => "Next Tabstop",
            Command::ClearTabstops => "Clear Tabstops",
            Command::TypeText { .. } => "Type Text",
            Command::Backspace => "Backspace",
            Command::DeleteForward => "Delete Forward",
            Command::Undo => "Undo",
            Command::Redo => "Redo",
            Command::MoveCaret { .. } => "Move Caret",
            Command::Select { .. } => "Select",
            Command::CloseDocument => "Close Document",
        }
    }

    /// Returns true if the command can change the text.
    pub fn edits_text(&self) -> bool {
        matches!(
            self,
            Command::InsertSnippet { .. }
                | Command::TypeText { .. }
                | Command::Backspace
                | Command::DeleteForward
                | Command::Undo
                | Command::Redo
        )
    }
}

/// Parses a comma-separated key script.
///
/// Keys: `tab`, `bs`, `del`, `esc`, `undo`, `redo`, `type:<text>`,
/// `caret:<n>` and `select:<anchor>-<caret>`. Inside `type:` a backslash
/// escapes the next character, so `type:a\,b` types `a,b`.
pub fn parse_key_script(script: &str) -> CoreResult<Vec<Command>> {
    split_keys(script)
        .into_iter()
        .filter(|key| !key.trim().is_empty())
        .map(|key| parse_key(&key))
        .collect()
}

fn parse_key(key: &str) -> CoreResult<Command> {
    // Typed text keeps trailing spaces
    if let Some(text) = key.trim_start().strip_prefix("type:") {
        return Ok(Command::TypeText {
            text: text.to_string(),
        });
    }

    let key = key.trim();
    if let Some(position) = key.strip_prefix("caret:") {
        return Ok(Command::MoveCaret {
            position: parse_offset(position, key)?,
        });
    }
    if let Some(range) = key.strip_prefix("select:") {
        let (anchor, caret) = range
            .split_once('-')
            .ok_or_else(|| CoreError::InvalidCommand(key.to_string()))?;
        return Ok(Command::Select {
            anchor: parse_offset(anchor, key)?,
            caret: parse_offset(caret, key)?,
        });
    }

    match key {
        "tab" => Ok(Command::NextTabstop),
        "bs" => Ok(Command::Backspace),
        "del" => Ok(Command::DeleteForward),
        "esc" => Ok(Command::ClearTabstops),
        "undo" => Ok(Command::Undo),
        "redo" => Ok(Command::Redo),
        _ => Err(CoreError::InvalidCommand(key.to_string())),
    }
}

fn parse_offset(value: &str, key: &str) -> CoreResult<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| CoreError::InvalidCommand(key.to_string()))
}

/// Splits on unescaped commas, resolving escapes.
fn split_keys(script: &str) -> Vec<String> {
    let mut keys = vec![String::new()];
    let mut chars = script.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let (Some(next), Some(key)) = (chars.next(), keys.last_mut()) {
                    key.push(next);
                }
            }
            ',' => keys.push(String::new()),
            _ => {
                if let Some(key) = keys.last_mut() {
                    key.push(c);
                }
            }
        }
    }
    keys
}
