//! Writes a parsed snippet into a buffer.
//!
//! ## Learning: Writing Right to Left
//!
//! Inserting at a fixed offset pushes everything after it to the right. By
//! walking the nodes backwards and always inserting at the same `at`, every
//! node lands in front of the ones already written and no offset ever has
//! to be recomputed. The total length is a plain fold over the results.

use livetext_buffer::{BufferResult, TextBuffer};

use crate::indicator::Indicator;
use crate::node::{LiveText, Node};

/// Writes `live` at `at` and returns the number of characters inserted.
///
/// Zero-width markers at the end of the buffer add a line ending, which is
/// not counted.
pub fn insert_live_text(buffer: &mut TextBuffer, at: usize, live: &LiveText) -> BufferResult<usize> {
    insert_nodes(buffer, at, &live.nodes)
}

fn insert_nodes(buffer: &mut TextBuffer, at: usize, nodes: &[Node]) -> BufferResult<usize> {
    nodes
        .iter()
        .rev()
        .try_fold(0, |total, node| Ok(total + insert_node(buffer, at, node)?))
}

fn insert_node(buffer: &mut TextBuffer, at: usize, node: &Node) -> BufferResult<usize> {
    match node {
        Node::PlainText { text } => {
            buffer.insert(at, text)?;
            Ok(text.chars().count())
        }
        Node::SoftChars { text } => insert_tagged(buffer, at, text, Indicator::SoftChar),
        Node::EmptyTabstop { indicator } => mark_zero_width(buffer, at, *indicator),
        Node::TextTabstop { indicator, text }
        | Node::BackrefDef {
            indicator, text, ..
        }
        | Node::BackrefUse {
            indicator, text, ..
        } => {
            if text.is_empty() {
                mark_zero_width(buffer, at, *indicator)
            } else {
                insert_tagged(buffer, at, text, *indicator)
            }
        }
        Node::NestedGroup {
            indicator,
            children,
        } => {
            let len = insert_nodes(buffer, at, children)?;
            if len == 0 {
                mark_zero_width(buffer, at, *indicator)?;
            } else {
                tag(buffer, *indicator, at, len);
            }
            Ok(len)
        }
    }
}

fn insert_tagged(
    buffer: &mut TextBuffer,
    at: usize,
    text: &str,
    indicator: Indicator,
) -> BufferResult<usize> {
    buffer.insert(at, text)?;
    let len = text.chars().count();
    tag(buffer, indicator, at, len);
    Ok(len)
}

fn tag(buffer: &mut TextBuffer, indicator: Indicator, start: usize, len: usize) {
    buffer.set_current_indicator(indicator.id());
    buffer.fill_indicator_range(start, len);
}

/// Tags the grapheme at `at` with `indicator`, appending a line ending
/// first when `at` is the end of the buffer. Writes no snippet text, so
/// it always reports 0.
pub(crate) fn mark_zero_width(
    buffer: &mut TextBuffer,
    at: usize,
    indicator: Indicator,
) -> BufferResult<usize> {
    if at >= buffer.len_chars() {
        let eol = buffer.config().line_ending.as_str();
        buffer.insert(buffer.len_chars(), eol)?;
    }
    let marker = buffer.grapheme_len_at(at).max(1);
    tag(buffer, indicator, at, marker);
    Ok(0)
}
