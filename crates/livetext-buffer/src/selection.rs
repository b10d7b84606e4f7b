//! Selection, caret positions and caret-move subscriptions.
//!
//! ## Learning: Range Types
//!
//! Offsets are character indices with exclusive ends, like
//! `std::ops::Range`. Empty selections (anchor == caret) are natural and
//! length is simply `end - start`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::rc::{Rc, Weak};

/// A line/column position, used for display only.
///
/// Both line and column are 0-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 1-indexed for user-facing output
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

/// The buffer selection.
///
/// `anchor` is where the selection started and `caret` is the active end.
/// Either may come first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: usize,
    pub caret: usize,
}

impl Selection {
    /// Creates a selection from `anchor` to `caret`.
    pub fn new(anchor: usize, caret: usize) -> Self {
        Self { anchor, caret }
    }

    /// Creates an empty selection (just a caret).
    pub fn caret_at(position: usize) -> Self {
        Self::new(position, position)
    }

    /// Lower bound of the selection.
    pub fn start(&self) -> usize {
        self.anchor.min(self.caret)
    }

    /// Upper bound (exclusive) of the selection.
    pub fn end(&self) -> usize {
        self.anchor.max(self.caret)
    }

    /// The selected range, normalized.
    pub fn range(&self) -> Range<usize> {
        self.start()..self.end()
    }

    /// Returns true if nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.anchor == self.caret
    }

    /// Moves both ends for an insertion of `len` characters at `at`.
    ///
    /// Ends strictly after `at` shift. An end sitting exactly on `at` only
    /// shifts when `sticky` is set, which is how typing pushes the caret
    /// past what it just typed.
    pub(crate) fn shift_for_insert(&mut self, at: usize, len: usize, sticky: bool) {
        let shift = |p: usize| if p > at || (sticky && p == at) { p + len } else { p };
        self.anchor = shift(self.anchor);
        self.caret = shift(self.caret);
    }

    /// Moves both ends for the removal of `range`.
    pub(crate) fn shift_for_delete(&mut self, range: Range<usize>) {
        let len = range.end - range.start;
        let shift = |p: usize| {
            if p >= range.end {
                p - len
            } else if p > range.start {
                range.start
            } else {
                p
            }
        };
        self.anchor = shift(self.anchor);
        self.caret = shift(self.caret);
    }
}

/// Delivered to caret subscribers whenever the selection is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaretEvent {
    /// New caret offset
    pub position: usize,
    /// Indicator mask of the character before the caret
    pub before: u32,
    /// Indicator mask of the character at the caret
    pub at: u32,
}

impl CaretEvent {
    /// Returns true if any bit of `mask` touches the caret from either side.
    pub fn touches(&self, mask: u32) -> bool {
        (self.before | self.at) & mask != 0
    }
}

type CaretCallback = dyn Fn(&CaretEvent);

/// Keeps a caret listener attached; dropping it detaches the listener.
///
/// ## Learning: RAII Subscriptions
///
/// The buffer only holds a `Weak` pointer to the callback. Once the last
/// `Rc` (owned by this handle) is dropped, the `Weak` can no longer be
/// upgraded and the buffer prunes it on the next notification.
#[must_use = "dropping the subscription detaches the listener"]
pub struct CaretSubscription {
    callback: Rc<CaretCallback>,
}

impl CaretSubscription {
    /// Returns true while the buffer can still reach this listener.
    pub fn is_attached(&self) -> bool {
        Rc::weak_count(&self.callback) > 0
    }
}

impl fmt::Debug for CaretSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaretSubscription").finish_non_exhaustive()
    }
}

/// Weakly-held caret listeners.
#[derive(Clone, Default)]
pub(crate) struct CaretListeners {
    listeners: Vec<Weak<CaretCallback>>,
}

impl CaretListeners {
    pub(crate) fn subscribe(&mut self, callback: impl Fn(&CaretEvent) + 'static) -> CaretSubscription {
        let callback: Rc<CaretCallback> = Rc::new(callback);
        self.listeners.push(Rc::downgrade(&callback));
        CaretSubscription { callback }
    }

    pub(crate) fn notify(&mut self, event: &CaretEvent) {
        self.listeners.retain(|weak| weak.strong_count() > 0);
        for callback in self.listeners.iter().filter_map(Weak::upgrade) {
            callback(event);
        }
    }

    pub(crate) fn live_count(&self) -> usize {
        self.listeners
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl fmt::Debug for CaretListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaretListeners")
            .field("live", &self.live_count())
            .finish()
    }
}
