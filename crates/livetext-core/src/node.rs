//! Parse tree for LiveText.
//!
//! ## Learning: Closed Enums Instead of Class Hierarchies
//!
//! The node kinds are a small set known at compile time, so they are one
//! enum. Every operation over the tree (writing it into a buffer, measuring
//! it, describing it) is a `match`, and the compiler checks that each one
//! handles every kind.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use crate::indicator::Indicator;
use crate::table::InsertionTable;

/// One node of a parsed snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    /// Literal text
    PlainText { text: String },
    /// Literal text tagged as soft characters
    SoftChars { text: String },
    /// A tabstop with no text
    EmptyTabstop { indicator: Indicator },
    /// A named tabstop
    TextTabstop { indicator: Indicator, text: String },
    /// First occurrence of a numbered backref; defines its text
    BackrefDef {
        indicator: Indicator,
        number: u32,
        text: String,
    },
    /// Later occurrence of a numbered backref; carries the defined text
    BackrefUse {
        indicator: Indicator,
        number: u32,
        text: String,
    },
    /// A tabstop whose body is itself LiveText
    NestedGroup {
        indicator: Indicator,
        children: Vec<Node>,
    },
}

impl Node {
    /// Indicator of a tabstop node; `None` for literal text.
    pub fn indicator(&self) -> Option<Indicator> {
        match self {
            Node::PlainText { .. } | Node::SoftChars { .. } => None,
            Node::EmptyTabstop { indicator }
            | Node::TextTabstop { indicator, .. }
            | Node::BackrefDef { indicator, .. }
            | Node::BackrefUse { indicator, .. }
            | Node::NestedGroup { indicator, .. } => Some(*indicator),
        }
    }

    /// Number of characters the node writes into a buffer.
    pub fn char_len(&self) -> usize {
        match self {
            Node::PlainText { text }
            | Node::SoftChars { text }
            | Node::TextTabstop { text, .. }
            | Node::BackrefDef { text, .. }
            | Node::BackrefUse { text, .. } => text.chars().count(),
            Node::EmptyTabstop { .. } => 0,
            Node::NestedGroup { children, .. } => children.iter().map(Node::char_len).sum(),
        }
    }

    /// Appends the literal text the node writes.
    pub fn push_text(&self, out: &mut String) {
        match self {
            Node::PlainText { text }
            | Node::SoftChars { text }
            | Node::TextTabstop { text, .. }
            | Node::BackrefDef { text, .. }
            | Node::BackrefUse { text, .. } => out.push_str(text),
            Node::EmptyTabstop { .. } => {}
            Node::NestedGroup { children, .. } => {
                for child in children {
                    child.push_text(out);
                }
            }
        }
    }

    fn describe_into(&self, out: &mut String, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        match self {
            Node::PlainText { text } => writeln!(out, "{indent}text {text:?}"),
            Node::SoftChars { text } => writeln!(out, "{indent}soft {text:?}"),
            Node::EmptyTabstop { indicator } => writeln!(out, "{indent}tabstop [{indicator}]"),
            Node::TextTabstop { indicator, text } => {
                writeln!(out, "{indent}tabstop [{indicator}] {text:?}")
            }
            Node::BackrefDef {
                indicator,
                number,
                text,
            } => writeln!(out, "{indent}backref-def #{number} [{indicator}] {text:?}"),
            Node::BackrefUse {
                indicator,
                number,
                text,
            } => writeln!(out, "{indent}backref-use #{number} [{indicator}] {text:?}"),
            Node::NestedGroup {
                indicator,
                children,
            } => {
                writeln!(out, "{indent}group [{indicator}]")?;
                for child in children {
                    child.describe_into(out, depth + 1)?;
                }
                Ok(())
            }
        }
    }
}

/// Canonical text of each backref number, scoped to one parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackrefTable {
    texts: BTreeMap<u32, String>,
}

impl BackrefTable {
    /// Registers the text of backref `number`. Returns false if it was
    /// already defined.
    pub fn define(&mut self, number: u32, text: impl Into<String>) -> bool {
        match self.texts.entry(number) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(text.into());
                true
            }
        }
    }

    /// Text of backref `number`, if defined.
    pub fn get(&self, number: u32) -> Option<&str> {
        self.texts.get(&number).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Definitions in number order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.texts.iter().map(|(n, t)| (*n, t.as_str()))
    }
}

/// A non-fatal problem found while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ParseWarning {
    /// A later occurrence of a backref supplied different text, which was ignored
    BackrefConflict {
        number: u32,
        kept: String,
        ignored: String,
    },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::BackrefConflict {
                number,
                kept,
                ignored,
            } => write!(
                f,
                "backref #{number}: ignored {ignored:?}, keeping {kept:?}"
            ),
        }
    }
}

/// A parsed snippet: the tree, its backref table and its insertion table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LiveText {
    pub nodes: Vec<Node>,
    pub backrefs: BackrefTable,
    pub table: InsertionTable,
    pub warnings: Vec<ParseWarning>,
}

impl LiveText {
    /// The literal text the snippet writes, without any markers.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            node.push_text(&mut out);
        }
        out
    }

    /// Number of characters the snippet writes.
    pub fn char_len(&self) -> usize {
        self.nodes.iter().map(Node::char_len).sum()
    }

    /// Indented, one-node-per-line description of the tree.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            // Writing into a String cannot fail
            let _ = node.describe_into(&mut out, 0);
        }
        out
    }
}

impl fmt::Display for LiveText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Node> {
        vec![
            Node::PlainText {
                text: "fn ".into(),
            },
            Node::NestedGroup {
                indicator: Indicator::Tabstop1,
                children: vec![
                    Node::TextTabstop {
                        indicator: Indicator::Tabstop2,
                        text: "name".into(),
                    },
                    Node::PlainText { text: "()".into() },
                ],
            },
            Node::EmptyTabstop {
                indicator: Indicator::ZeroWidth,
            },
        ]
    }

    #[test]
    fn test_lengths_and_text() {
        let live = LiveText {
            nodes: sample(),
            ..LiveText::default()
        };
        assert_eq!(live.plain_text(), "fn name()");
        assert_eq!(live.char_len(), 9);
        assert_eq!(live.nodes[1].indicator(), Some(Indicator::Tabstop1));
        assert_eq!(live.nodes[0].indicator(), None);
    }

    #[test]
    fn test_describe() {
        let live = LiveText {
            nodes: sample(),
            ..LiveText::default()
        };
        assert_eq!(
            live.describe(),
            "text \"fn \"\ngroup [T1]\n  tabstop [T2] \"name\"\n  text \"()\"\ntabstop [zw]\n"
        );
    }

    #[test]
    fn test_backref_table_keeps_first_definition() {
        let mut table = BackrefTable::default();
        assert!(table.define(1, "foo"));
        assert!(!table.define(1, "bar"));
        assert_eq!(table.get(1), Some("foo"));
        assert_eq!(table.get(2), None);
    }
}
