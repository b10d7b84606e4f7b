//! Indicator tags used by the tabstop engine.
//!
//! The buffer knows indicators only as numbered bits. This module gives the
//! engine's nine tags names and fixes their ids.

use livetext_buffer::indicator_bit;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest buffer indicator id used by tabstops; ids below are left to the host.
const BASE_ID: u8 = 8;

/// A tabstop indicator tag.
///
/// Five plain tags mark unvisited tabstops. Two linked tags mark the members
/// of the active backref group, one of them for empty members. One tag marks
/// empty tabstops and one marks soft characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Tabstop1,
    Tabstop2,
    Tabstop3,
    Tabstop4,
    Tabstop5,
    /// Text of a live-linked group member
    LinkedText,
    /// Follower character of an empty live-linked member
    LinkedZeroWidth,
    /// Character following an empty tabstop
    ZeroWidth,
    /// Placeholder punctuation
    SoftChar,
}

impl Indicator {
    /// The plain tags, in allocation order.
    pub const PLAIN: [Indicator; 5] = [
        Indicator::Tabstop1,
        Indicator::Tabstop2,
        Indicator::Tabstop3,
        Indicator::Tabstop4,
        Indicator::Tabstop5,
    ];

    /// Every tag.
    pub const ALL: [Indicator; 9] = [
        Indicator::Tabstop1,
        Indicator::Tabstop2,
        Indicator::Tabstop3,
        Indicator::Tabstop4,
        Indicator::Tabstop5,
        Indicator::LinkedText,
        Indicator::LinkedZeroWidth,
        Indicator::ZeroWidth,
        Indicator::SoftChar,
    ];

    /// The two tags of an active group.
    pub const LINKED: [Indicator; 2] = [Indicator::LinkedText, Indicator::LinkedZeroWidth];

    /// Buffer indicator id.
    pub fn id(self) -> u8 {
        BASE_ID + self as u8
    }

    /// Buffer mask bit.
    pub fn bit(self) -> u32 {
        indicator_bit(self.id())
    }

    /// Returns true for the five plain tags.
    pub fn is_plain(self) -> bool {
        Self::PLAIN.contains(&self)
    }

    /// Combined mask of `indicators`.
    pub fn mask_of(indicators: &[Indicator]) -> u32 {
        indicators.iter().fold(0, |mask, i| mask | i.bit())
    }

    /// Mask of the plain tags.
    pub fn plain_mask() -> u32 {
        Self::mask_of(&Self::PLAIN)
    }

    /// Mask of the linked tags.
    pub fn linked_mask() -> u32 {
        Self::mask_of(&Self::LINKED)
    }

    /// Short label used in descriptions.
    pub fn label(self) -> &'static str {
        match self {
            Indicator::Tabstop1 => "T1",
            Indicator::Tabstop2 => "T2",
            Indicator::Tabstop3 => "T3",
            Indicator::Tabstop4 => "T4",
            Indicator::Tabstop5 => "T5",
            Indicator::LinkedText => "linked",
            Indicator::LinkedZeroWidth => "linked-zw",
            Indicator::ZeroWidth => "zw",
            Indicator::SoftChar => "soft",
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
