//! # LiveText Buffer
//!
//! Text buffer capability consumed by the tabstop engine.
//!
//! ## Key Concepts for Learning Rust
//!
//! ### Ownership & Borrowing
//! - `TextBuffer` owns the rope and the indicator layer
//! - Methods like `text()` return borrowed references
//! - Mutations require `&mut self` (exclusive access)
//!
//! ### What the buffer provides
//! - Character-addressed text backed by a rope
//! - Indicators: numbered tags over character ranges, one bit each
//! - A target range with search and replace
//! - Selection, caret subscriptions and composite (grouped) undo
//! - Synchronous mutation notifications through `MutationObserver`

mod buffer;
mod history;
mod indicator;
mod mutation;
mod selection;

pub use buffer::{BufferConfig, LineEnding, TextBuffer};
pub use history::{Edit, EditGroup, EditKind, History};
pub use indicator::{bit as indicator_bit, IndicatorLayer, MAX_INDICATORS};
pub use mutation::{Mutation, MutationKind, MutationObserver, MutationOrigin};
pub use selection::{CaretEvent, CaretSubscription, Position, Selection};

/// Result type for buffer operations
pub type BufferResult<T> = Result<T, BufferError>;

/// Errors that can occur during buffer operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("Invalid byte index: {0}")]
    InvalidByteIndex(usize),

    #[error("Invalid character index: {0}")]
    InvalidCharIndex(usize),

    #[error("Invalid range: start {start} is after end {end}")]
    InvalidRange { start: usize, end: usize },

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_buffer_creation() {
        let buffer = TextBuffer::new();
        assert!(buffer.is_empty());
        assert_eq!(buffer.len_chars(), 0);
    }

    #[test]
    fn test_insert_and_delete() {
        let mut buffer = TextBuffer::new();
        buffer.insert(0, "Hello").unwrap();
        assert_eq!(buffer.text(), "Hello");

        buffer.insert(5, ", World!").unwrap();
        assert_eq!(buffer.text(), "Hello, World!");

        buffer.delete(5..7).unwrap();
        assert_eq!(buffer.text(), "HelloWorld!");
    }

    #[test]
    fn test_undo_redo() {
        let mut buffer = TextBuffer::new();
        buffer.insert(0, "Hello\n").unwrap();
        buffer.insert(6, "World").unwrap();

        assert_eq!(buffer.text(), "Hello\nWorld");

        buffer.undo().unwrap();
        assert_eq!(buffer.text(), "Hello\n");

        buffer.redo().unwrap();
        assert_eq!(buffer.text(), "Hello\nWorld");
    }

    #[test]
    fn test_out_of_range_is_an_error() {
        let mut buffer = TextBuffer::from("abc");
        assert_eq!(buffer.insert(4, "x"), Err(BufferError::InvalidCharIndex(4)));
        assert!(buffer.delete(2..5).is_err());
    }

    #[test]
    fn test_line_positions() {
        let buffer = TextBuffer::from("Line 1\nLine 2\nLine 3");
        assert_eq!(buffer.len_lines(), 3);
        assert_eq!(
            buffer.char_idx_to_position(9).unwrap(),
            Position::new(1, 2)
        );
    }

    #[test]
    fn test_byte_and_char_offsets() {
        let buffer = TextBuffer::from("héllo");
        assert_eq!(buffer.len_bytes(), 6);
        assert_eq!(buffer.char_to_byte(2).unwrap(), 3);
        assert_eq!(buffer.byte_to_char(3).unwrap(), 2);
        assert!(buffer.byte_to_char(7).is_err());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Insert(usize, String),
        Delete(usize, usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..64, "[a-zé\n]{1,6}").prop_map(|(at, s)| Op::Insert(at, s)),
            (0usize..64, 0usize..8).prop_map(|(at, n)| Op::Delete(at, n)),
        ]
    }

    proptest! {
        #[test]
        fn indicator_layer_tracks_text_length(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let mut buffer = TextBuffer::from("seed text");
            buffer.set_current_indicator(7);
            buffer.fill_indicator_range(2, 4);

            for op in ops {
                let len = buffer.len_chars();
                match op {
                    Op::Insert(at, s) => buffer.insert(at.min(len), &s).unwrap(),
                    Op::Delete(at, n) => {
                        let start = at.min(len);
                        let end = (start + n).min(len);
                        buffer.delete(start..end).unwrap();
                    }
                }
                prop_assert_eq!(buffer.indicators().len(), buffer.len_chars());
            }
        }
    }
}
