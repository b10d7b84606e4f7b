//! # LiveText Core
//!
//! Snippet tabstop engine: parsing, navigation and live-linked editing.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Editor                            │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐│
//! │  │   Config    │ │  EventBus   │ │      Commands       ││
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘│
//! │  ┌─────────────────────────────────────────┐            │
//! │  │            Document Manager              │            │
//! │  │  ┌──────────────────────────────────┐   │            │
//! │  │  │ Document: TextBuffer + Tabstop-  │   │            │
//! │  │  │ State (navigator, linker)        │   │            │
//! │  │  └──────────────────────────────────┘   │            │
//! │  └─────────────────────────────────────────┘            │
//! └─────────────────────────────────────────────────────────┘
//!
//!   snippet ──parser──▶ LiveText ──writer──▶ buffer + InsertionTable
//! ```
//!
//! ## Learning: Module Organization
//!
//! Rust modules map to files:
//! - `mod foo;` looks for `foo.rs` or `foo/mod.rs`
//! - `pub use` re-exports items for cleaner public APIs
//! - `TabstopState` is declared in `session` but `navigator` and `linker`
//!   add `impl` blocks to it from their own files

pub mod command;
pub mod config;
pub mod document;
pub mod editor;
pub mod event;
pub mod indicator;
mod linker;
pub mod navigator;
pub mod node;
pub mod parser;
pub mod session;
pub mod table;
pub mod writer;

pub use command::{parse_key_script, Command};
pub use config::{Config, ConfigError, EditorConfig, TabstopConfig};
pub use document::{Document, DocumentId, DocumentManager, SnippetInsertion};
pub use editor::Editor;
pub use event::{EditorEvent, EventBus, EventHandler};
pub use indicator::Indicator;
pub use navigator::Advance;
pub use node::{BackrefTable, LiveText, Node, ParseWarning};
pub use parser::{parse, BackrefConflictPolicy, ParseError, ParseErrorKind, Parser};
pub use session::TabstopState;
pub use table::{InsertionTable, ResolvedRange, TabstopInsertionNode};
pub use writer::insert_live_text;

use livetext_buffer::BufferError;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Document not found: {0}")]
    DocumentNotFound(DocumentId),

    #[error("No active document")]
    NoActiveDocument,

    #[error("Snippet error: {0}")]
    Parse(#[from] ParseError),

    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

/// Internal inconsistencies found while navigating or synchronizing.
///
/// These never reach callers of `advance` or the mutation observer; they
/// are logged and the operation stops.
#[derive(Debug, thiserror::Error)]
pub enum TabstopError {
    #[error("indicator {indicator} not found at or after {from}")]
    IndicatorNotFound { indicator: Indicator, from: usize },

    #[error("expected {expected} linked members, found {found}")]
    MemberCountMismatch { expected: usize, found: usize },

    #[error("linked member at {0} lost its indicator")]
    MemberLost(usize),

    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),
}
