//! LiveText parser.
//!
//! ## Grammar
//!
//! ```text
//! LiveText  ::= (Text | Tabstop | SoftChars)*
//! Tabstop   ::= '[[%tabstop' Body ']]'
//! Body      ::= ''                      empty tabstop
//!             | Digits (':' Name)?      numbered backref
//!             | ':' Name                named tabstop
//!             | ':' LiveText            nested group
//! SoftChars ::= '[[%soft:' Any ']]'
//! ```
//!
//! A `:` body is a nested group when `[[%tabstop` or `[[%soft:` shows up
//! before the `]]` that would close it as a name. Names recognise `\]` and
//! `\\` as escapes.
//!
//! ## Indicator Allocation
//!
//! Only five plain indicators exist, and two runs carrying the same one
//! fuse when they touch. The parser therefore tracks, per open scope, the
//! indicators handed out in it. When a nested scope closes, its indicators
//! go back to the pool at once, except the ones whose runs end exactly at
//! the close: those wait in `pending` until some text has been emitted, so
//! a reused tag can never touch the run it came from. Tabstops with no text
//! take the zero-width tag and cost nothing.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::indicator::Indicator;
use crate::node::{BackrefTable, LiveText, Node, ParseWarning};
use crate::table::{InsertionTable, TabstopInsertionNode};

const TABSTOP_OPEN: &str = "[[%tabstop";
const SOFT_OPEN: &str = "[[%soft:";
const CLOSE: &str = "]]";

/// What to do when a later backref occurrence supplies different text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackrefConflictPolicy {
    /// Keep the first text, log and record a warning
    #[default]
    Warn,
    /// Fail the parse
    Reject,
}

/// Why a snippet failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("unterminated tabstop")]
    UnterminatedTabstop,

    #[error("tabstop name is missing its closing `]]`")]
    UnterminatedName,

    #[error("unterminated soft characters")]
    UnterminatedSoftChars,

    #[error("malformed tabstop")]
    MalformedTabstop,

    #[error("snippet too complex: more than {0} tabstops open at once")]
    TooComplex(usize),

    #[error("backref #{number} expects {expected:?} but was given {found:?}")]
    BackrefConflict {
        number: u32,
        expected: String,
        found: String,
    },
}

/// A parse failure, carrying the raw snippet for display.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at character {offset} of snippet {snippet:?}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// Character offset of the offending directive
    pub offset: usize,
    pub snippet: String,
}

/// Parses `source` with the default backref policy.
pub fn parse(source: &str) -> Result<LiveText, ParseError> {
    Parser::new(source).parse()
}

/// Single-use LiveText parser.
pub struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
    policy: BackrefConflictPolicy,

    /// Free plain indicators; the top of the stack is handed out next
    available: Vec<Indicator>,
    /// Indicators in use, per open scope (outermost first)
    scopes: Vec<Vec<Indicator>>,
    /// Indicators of closed scopes whose runs end here, freed once text
    /// follows them
    pending: Vec<Indicator>,
    /// Plain indicators whose runs end at the current position
    trailing: Vec<Indicator>,
    /// A zero-width record was pushed and no text has followed it yet
    open_marker: bool,

    backrefs: BackrefTable,
    table: InsertionTable,
    warnings: Vec<ParseWarning>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
            policy: BackrefConflictPolicy::default(),
            available: Indicator::PLAIN.iter().rev().copied().collect(),
            scopes: vec![Vec::new()],
            pending: Vec::new(),
            trailing: Vec::new(),
            open_marker: false,
            backrefs: BackrefTable::default(),
            table: InsertionTable::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: BackrefConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Parses the whole source.
    pub fn parse(mut self) -> Result<LiveText, ParseError> {
        let nodes = self.parse_sequence(false)?;
        debug!(
            nodes = nodes.len(),
            tabstops = self.table.len(),
            backrefs = self.backrefs.len(),
            "parsed snippet"
        );
        Ok(LiveText {
            nodes,
            backrefs: self.backrefs,
            table: self.table,
            warnings: self.warnings,
        })
    }

    // ==================== Sequences ====================

    fn parse_sequence(&mut self, nested: bool) -> Result<Vec<Node>, ParseError> {
        let mut nodes = Vec::new();
        let mut text = String::new();

        while self.pos < self.chars.len() {
            if nested && self.looking_at(self.pos, CLOSE) {
                break;
            }
            if self.looking_at(self.pos, TABSTOP_OPEN) {
                self.flush_text(&mut text, &mut nodes);
                let node = self.parse_tabstop()?;
                nodes.push(node);
            } else if self.looking_at(self.pos, SOFT_OPEN) {
                self.flush_text(&mut text, &mut nodes);
                if let Some(node) = self.parse_soft()? {
                    nodes.push(node);
                }
            } else {
                text.push(self.chars[self.pos]);
                self.pos += 1;
            }
        }

        self.flush_text(&mut text, &mut nodes);
        Ok(nodes)
    }

    fn flush_text(&mut self, text: &mut String, nodes: &mut Vec<Node>) {
        if text.is_empty() {
            return;
        }
        self.release_pending();
        nodes.push(Node::PlainText {
            text: std::mem::take(text),
        });
    }

    fn parse_soft(&mut self) -> Result<Option<Node>, ParseError> {
        let start = self.pos;
        let body = start + SOFT_OPEN.chars().count();
        let close = self
            .find(body, CLOSE)
            .ok_or_else(|| self.error(ParseErrorKind::UnterminatedSoftChars, start))?;

        let text: String = self.chars[body..close].iter().collect();
        self.pos = close + CLOSE.len();
        if text.is_empty() {
            return Ok(None);
        }
        self.release_pending();
        Ok(Some(Node::SoftChars { text }))
    }

    // ==================== Tabstops ====================

    fn parse_tabstop(&mut self) -> Result<Node, ParseError> {
        let start = self.pos;
        self.pos += TABSTOP_OPEN.chars().count();

        let Some(&next) = self.chars.get(self.pos) else {
            return Err(self.error(ParseErrorKind::UnterminatedTabstop, start));
        };

        if self.looking_at(self.pos, CLOSE) {
            self.pos += CLOSE.len();
            return Ok(self.empty_tabstop());
        }
        if next.is_ascii_digit() {
            return self.parse_backref(start);
        }
        if next == ':' {
            self.pos += 1;
            if self.opens_nested_group() {
                return self.parse_group(start);
            }
            let name = self.parse_name(start)?;
            return self.text_tabstop(name, start);
        }
        Err(self.error(ParseErrorKind::MalformedTabstop, start))
    }

    fn empty_tabstop(&mut self) -> Node {
        self.push_record(TabstopInsertionNode::single(Indicator::ZeroWidth));
        Node::EmptyTabstop {
            indicator: Indicator::ZeroWidth,
        }
    }

    fn text_tabstop(&mut self, text: String, start: usize) -> Result<Node, ParseError> {
        if text.is_empty() {
            return Ok(self.empty_tabstop());
        }
        let indicator = self.allocate_for(&text, start)?;
        self.push_record(TabstopInsertionNode::single(indicator));
        Ok(Node::TextTabstop { indicator, text })
    }

    fn parse_backref(&mut self, start: usize) -> Result<Node, ParseError> {
        let digits_start = self.pos;
        while self.chars.get(self.pos).is_some_and(char::is_ascii_digit) {
            self.pos += 1;
        }
        let digits: String = self.chars[digits_start..self.pos].iter().collect();
        let number: u32 = digits
            .parse()
            .map_err(|_| self.error(ParseErrorKind::MalformedTabstop, start))?;

        let supplied = if self.looking_at(self.pos, CLOSE) {
            self.pos += CLOSE.len();
            None
        } else {
            match self.chars.get(self.pos).copied() {
                Some(':') => {
                    self.pos += 1;
                    Some(self.parse_name(start)?)
                }
                Some(_) => return Err(self.error(ParseErrorKind::MalformedTabstop, start)),
                None => return Err(self.error(ParseErrorKind::UnterminatedTabstop, start)),
            }
        };

        match self.backrefs.get(number).map(str::to_owned) {
            None => {
                let text = supplied.unwrap_or_default();
                self.backrefs.define(number, text.clone());
                let indicator = self.allocate_for(&text, start)?;
                self.push_record(TabstopInsertionNode::backref(indicator, number, true));
                Ok(Node::BackrefDef {
                    indicator,
                    number,
                    text,
                })
            }
            Some(text) => {
                if let Some(found) = supplied.filter(|s| *s != text) {
                    self.backref_conflict(number, &text, found, start)?;
                }
                let indicator = self.allocate_for(&text, start)?;
                self.push_record(TabstopInsertionNode::backref(indicator, number, false));
                Ok(Node::BackrefUse {
                    indicator,
                    number,
                    text,
                })
            }
        }
    }

    fn backref_conflict(
        &mut self,
        number: u32,
        kept: &str,
        ignored: String,
        start: usize,
    ) -> Result<(), ParseError> {
        match self.policy {
            BackrefConflictPolicy::Warn => {
                warn!(number, kept, ignored = %ignored, "ignoring conflicting backref text");
                self.warnings.push(ParseWarning::BackrefConflict {
                    number,
                    kept: kept.to_string(),
                    ignored,
                });
                Ok(())
            }
            BackrefConflictPolicy::Reject => Err(self.error(
                ParseErrorKind::BackrefConflict {
                    number,
                    expected: kept.to_string(),
                    found: ignored,
                },
                start,
            )),
        }
    }

    fn parse_group(&mut self, start: usize) -> Result<Node, ParseError> {
        let indicator = self.allocate(start)?;
        let marker_before = self.open_marker;
        let record = self.push_record(TabstopInsertionNode::single(indicator));

        self.scopes.push(Vec::new());
        let children = self.parse_sequence(true)?;
        if !self.looking_at(self.pos, CLOSE) {
            return Err(self.error(ParseErrorKind::UnterminatedTabstop, start));
        }
        self.pos += CLOSE.len();
        let closed = self.scopes.pop().unwrap_or_default();

        let len: usize = children.iter().map(Node::char_len).sum();
        if len > 0 {
            self.trailing.push(indicator);
            self.release_closed(closed);
            return Ok(Node::NestedGroup {
                indicator,
                children,
            });
        }

        // Nothing to tag; hand the plain indicator straight back
        self.release_closed(closed);
        if let Some(scope) = self.scopes.last_mut() {
            scope.retain(|i| *i != indicator);
        }
        self.available.push(indicator);
        // The group and everything in it share one marker
        self.table
            .set(record, TabstopInsertionNode::single(Indicator::ZeroWidth));
        self.table.set_shares_marker(record, marker_before);
        for child in record + 1..self.table.len() {
            self.table.set_shares_marker(child, true);
        }
        self.open_marker = true;
        Ok(Node::NestedGroup {
            indicator: Indicator::ZeroWidth,
            children,
        })
    }

    /// Reads name text up to and including the closing `]]`.
    fn parse_name(&mut self, start: usize) -> Result<String, ParseError> {
        let mut name = String::new();
        loop {
            let Some(&c) = self.chars.get(self.pos) else {
                return Err(self.error(ParseErrorKind::UnterminatedName, start));
            };
            if c == '\\' && matches!(self.chars.get(self.pos + 1).copied(), Some(']' | '\\')) {
                name.push(self.chars[self.pos + 1]);
                self.pos += 2;
            } else if self.looking_at(self.pos, CLOSE) {
                self.pos += CLOSE.len();
                return Ok(name);
            } else {
                name.push(c);
                self.pos += 1;
            }
        }
    }

    /// True if a directive opens before the `]]` that would end a name here.
    fn opens_nested_group(&self) -> bool {
        let mut i = self.pos;
        while i < self.chars.len() {
            if self.chars[i] == '\\' && matches!(self.chars.get(i + 1).copied(), Some(']' | '\\')) {
                i += 2;
                continue;
            }
            if self.looking_at(i, CLOSE) {
                return false;
            }
            if self.looking_at(i, TABSTOP_OPEN) || self.looking_at(i, SOFT_OPEN) {
                return true;
            }
            i += 1;
        }
        false
    }

    // ==================== Indicators ====================

    fn allocate(&mut self, start: usize) -> Result<Indicator, ParseError> {
        let indicator = self
            .available
            .pop()
            .ok_or_else(|| self.error(ParseErrorKind::TooComplex(Indicator::PLAIN.len()), start))?;
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(indicator);
        }
        Ok(indicator)
    }

    /// Indicator for a tabstop showing `text`. The tabstop's own text
    /// frees pending indicators, after it has taken its own.
    fn allocate_for(&mut self, text: &str, start: usize) -> Result<Indicator, ParseError> {
        if text.is_empty() {
            return Ok(Indicator::ZeroWidth);
        }
        let indicator = self.allocate(start)?;
        self.release_pending();
        self.trailing = vec![indicator];
        Ok(indicator)
    }

    /// Text was emitted: nothing before it touches what comes next.
    fn release_pending(&mut self) {
        self.available.append(&mut self.pending);
        self.trailing.clear();
        self.open_marker = false;
    }

    /// Appends a record. Zero-width records with no text since the last
    /// one land on the same marker character.
    fn push_record(&mut self, entry: TabstopInsertionNode) -> usize {
        let index = self.table.push(entry);
        if entry.is_zero_width() {
            self.table.set_shares_marker(index, self.open_marker);
            self.open_marker = true;
        }
        index
    }

    /// Returns a closed scope's indicators to the pool, holding back the
    /// ones whose runs end at the current position.
    fn release_closed(&mut self, closed: Vec<Indicator>) {
        let trailing = &self.trailing;
        let (held, freed): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .chain(closed)
            .partition(|i| trailing.contains(i));
        if !freed.is_empty() {
            debug!(?freed, "released closed scope indicators");
        }
        self.available.extend(freed);
        self.pending = held;
    }

    // ==================== Scanning ====================

    fn looking_at(&self, at: usize, pattern: &str) -> bool {
        let mut i = at;
        for expected in pattern.chars() {
            if self.chars.get(i) != Some(&expected) {
                return false;
            }
            i += 1;
        }
        true
    }

    fn find(&self, from: usize, pattern: &str) -> Option<usize> {
        (from..self.chars.len()).find(|&i| self.looking_at(i, pattern))
    }

    fn error(&self, kind: ParseErrorKind, offset: usize) -> ParseError {
        ParseError {
            kind,
            offset,
            snippet: self.source.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use crate::indicator::Indicator::*;

    fn text_tabstop(indicator: Indicator, text: &str) -> Node {
        Node::TextTabstop {
            indicator,
            text: text.to_string(),
        }
    }

    fn plain(text: &str) -> Node {
        Node::PlainText {
            text: text.to_string(),
        }
    }

    #[test]
    fn test_plain_text_only() {
        let live = parse("abc").unwrap();
        assert_eq!(live.nodes, vec![plain("abc")]);
        assert!(live.table.is_empty());
        assert!(live.backrefs.is_empty());
    }

    #[test]
    fn test_siblings_get_distinct_indicators() {
        let live = parse("[[%tabstop:a]] [[%tabstop:b]]").unwrap();
        assert_eq!(
            live.nodes,
            vec![text_tabstop(Tabstop1, "a"), plain(" "), text_tabstop(Tabstop2, "b")]
        );
        assert_eq!(live.table.len(), 2);
    }

    #[test]
    fn test_empty_forms_are_zero_width() {
        let live = parse("[[%tabstop]][[%tabstop:]][[%tabstop4]]").unwrap();
        assert!(live.nodes.iter().all(|n| n.indicator() == Some(ZeroWidth)));
        assert!(live.table.iter().all(|e| e.is_zero_width()));
        assert_eq!(live.backrefs.get(4), Some(""));
        let shared: Vec<_> = live.table.iter().map(|e| e.shares_marker).collect();
        assert_eq!(shared, vec![false, true, true]);

        let live = parse("[[%tabstop]]-[[%tabstop]]").unwrap();
        assert!(live.table.iter().all(|e| !e.shares_marker));
    }

    #[test]
    fn test_nested_group() {
        let live = parse("[[%tabstop:f([[%tabstop:x]])]]").unwrap();
        assert_eq!(
            live.nodes,
            vec![Node::NestedGroup {
                indicator: Tabstop1,
                children: vec![plain("f("), text_tabstop(Tabstop2, "x"), plain(")")],
            }]
        );
        let indicators: Vec<_> = live.table.iter().map(|e| e.indicator).collect();
        assert_eq!(indicators, vec![Tabstop1, Tabstop2]);
    }

    #[test]
    fn test_closed_scope_released_after_text() {
        let live = parse(
            "[[%tabstop:([[%tabstop:x]])]] [[%tabstop:[[%tabstop:y]]]] [[%tabstop:z]]",
        )
        .unwrap();
        let indicators: Vec<_> = live.table.iter().map(|e| e.indicator).collect();
        // g1, x, g2, y, z in document order
        assert_eq!(indicators, vec![Tabstop1, Tabstop2, Tabstop2, Tabstop3, Tabstop3]);
    }

    #[test]
    fn test_released_indicator_not_reused_by_next_tabstop_text() {
        // y follows the closed group directly, so it must not take x's tag
        let live = parse("[[%tabstop:[[%tabstop:x]]]][[%tabstop:[[%tabstop:y]]]]").unwrap();
        let indicators: Vec<_> = live.table.iter().map(|e| e.indicator).collect();
        assert_eq!(indicators, vec![Tabstop1, Tabstop2, Tabstop3, Tabstop4]);
    }

    #[test]
    fn test_full_group_frees_inner_tags_for_next_tabstop() {
        let live = parse(
            "[[%tabstop:[[%tabstop:a]]-[[%tabstop:b]]-[[%tabstop:c]]-[[%tabstop:d]]]][[%tabstop:e]]",
        )
        .unwrap();
        let indicators: Vec<_> = live.table.iter().map(|e| e.indicator).collect();
        assert_eq!(indicators[..5], [Tabstop1, Tabstop2, Tabstop3, Tabstop4, Tabstop5]);

        // e touches the group and d, and nothing else
        let e = indicators[5];
        assert_ne!(e, Tabstop1);
        assert_ne!(e, Tabstop5);
        assert_eq!(live.plain_text(), "a-b-c-de");
    }

    #[test]
    fn test_nested_chain_held_until_text() {
        // y ends both inner groups, so z may not reuse y's tag or the inner group's
        let live = parse(
            "[[%tabstop:x[[%tabstop:[[%tabstop:y]]]]]][[%tabstop:z]] [[%tabstop:w]]",
        )
        .unwrap();
        let indicators: Vec<_> = live.table.iter().map(|e| e.indicator).collect();
        assert_eq!(indicators[..3], [Tabstop1, Tabstop2, Tabstop3]);
        assert!(![Tabstop1, Tabstop2, Tabstop3].contains(&indicators[3]));
        assert_ne!(indicators[4], indicators[3]);
    }

    #[test]
    fn test_empty_group_returns_indicator() {
        let live = parse("[[%tabstop:[[%tabstop]]]] [[%tabstop:a]]").unwrap();
        assert_eq!(live.nodes[0].indicator(), Some(ZeroWidth));
        assert_eq!(live.nodes[2], text_tabstop(Tabstop1, "a"));
        assert!(live.table.get(0).unwrap().is_zero_width());
        let shared: Vec<_> = live.table.iter().map(|e| e.shares_marker).collect();
        assert_eq!(shared, vec![false, true, false]);
    }

    #[test]
    fn test_backref_consistency() {
        let live = parse("[[%tabstop1:foo]] [[%tabstop1]]").unwrap();
        assert_eq!(
            live.nodes[0],
            Node::BackrefDef {
                indicator: Tabstop1,
                number: 1,
                text: "foo".into()
            }
        );
        assert_eq!(
            live.nodes[2],
            Node::BackrefUse {
                indicator: Tabstop2,
                number: 1,
                text: "foo".into()
            }
        );
        let anchors: Vec<_> = live
            .table
            .iter()
            .map(|e| (e.backref_number, e.is_backref_anchor))
            .collect();
        assert_eq!(anchors, vec![(Some(1), true), (Some(1), false)]);
    }

    #[test]
    fn test_backref_conflict_warns() {
        let live = parse("[[%tabstop2:a]][[%tabstop2:b]]").unwrap();
        assert_eq!(
            live.warnings,
            vec![ParseWarning::BackrefConflict {
                number: 2,
                kept: "a".into(),
                ignored: "b".into()
            }]
        );
        assert_eq!(live.plain_text(), "aa");
    }

    #[test]
    fn test_backref_conflict_rejects() {
        let err = Parser::new("[[%tabstop2:a]][[%tabstop2:b]]")
            .with_policy(BackrefConflictPolicy::Reject)
            .parse()
            .unwrap_err();
        assert_eq!(err.offset, 15);
        assert!(matches!(
            err.kind,
            ParseErrorKind::BackrefConflict { number: 2, .. }
        ));
    }

    #[test]
    fn test_name_escapes() {
        let live = parse(r"[[%tabstop:a\]\\b\c]]").unwrap();
        assert_eq!(live.nodes, vec![text_tabstop(Tabstop1, r"a]\b\c")]);
    }

    #[test]
    fn test_soft_chars() {
        let live = parse("x[[%soft:;]]y").unwrap();
        assert_eq!(
            live.nodes,
            vec![
                plain("x"),
                Node::SoftChars { text: ";".into() },
                plain("y")
            ]
        );
        assert!(live.table.is_empty());
    }

    #[test]
    fn test_soft_chars_make_a_group() {
        let live = parse("[[%tabstop:a[[%soft:,]]b]]").unwrap();
        assert!(matches!(live.nodes[0], Node::NestedGroup { .. }));
        assert_eq!(live.plain_text(), "a,b");
    }

    #[test]
    fn test_errors() {
        let kind = |s: &str| parse(s).unwrap_err().kind;
        assert_eq!(kind("[[%tabstop"), ParseErrorKind::UnterminatedTabstop);
        assert_eq!(kind("[[%tabstopx]]"), ParseErrorKind::MalformedTabstop);
        assert_eq!(kind("[[%tabstop7x]]"), ParseErrorKind::MalformedTabstop);
        assert_eq!(kind("[[%soft:abc"), ParseErrorKind::UnterminatedSoftChars);
        assert_eq!(
            kind("[[%tabstop:a[[%tabstop:b]]"),
            ParseErrorKind::UnterminatedTabstop
        );

        let err = parse("abc[[%tabstop:x").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnterminatedName);
        assert_eq!(err.offset, 3);
        assert_eq!(err.snippet, "abc[[%tabstop:x");
    }

    #[test]
    fn test_too_complex() {
        let source = vec!["[[%tabstop:a]]"; 6].join(" ");
        let err = parse(&source).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::TooComplex(5));
        assert_eq!(err.offset, 75);
    }

    proptest! {
        #[test]
        fn siblings_never_share_indicators(names in prop::collection::vec("[a-z]{1,4}", 1..=5)) {
            let source: String = names
                .iter()
                .map(|n| format!("[[%tabstop:{n}]]"))
                .collect::<Vec<_>>()
                .join("-");
            let live = parse(&source).unwrap();
            let mut indicators: Vec<_> = live.table.iter().map(|e| e.indicator).collect();
            indicators.sort();
            indicators.dedup();
            prop_assert_eq!(indicators.len(), names.len());
        }

        #[test]
        fn more_than_five_siblings_fail(n in 6usize..12) {
            let source = vec!["[[%tabstop:t]]"; n].join(" ");
            let err = parse(&source).unwrap_err();
            prop_assert_eq!(err.kind, ParseErrorKind::TooComplex(5));
        }
    }
}
