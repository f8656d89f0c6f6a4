#![forbid(unsafe_code)]

//! The packed cell — the atomic unit of the terminal grid.
//!
//! Each screen position is one [`Cell`], packed into exactly **8 bytes**
//! (two `u32` words) so a full 200×50 grid is 80 KB per buffer and cell
//! comparison is two integer compares.
//!
//! # Layout (8 bytes, non-negotiable)
//!
//! ```text
//! w0: [31-24: attr byte][23-21: reserved][20-0: Unicode scalar]
//! w1: [31-16: packed fg][15-0: packed bg]
//! ```
//!
//! 21 bits cover every Unicode scalar (max U+10FFFF); colors use the 16-bit
//! encoding from [`crate::color`]. The empty cell (space, no attributes,
//! default colors) is the identity for "nothing rendered here".

use crate::color::{Color, PackedColor};

bitflags::bitflags! {
    /// 8-bit cell attribute byte.
    ///
    /// Bit positions are part of the cell encoding; bits 6-7 are reserved
    /// and must stay clear.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Attr: u8 {
        /// SGR 1 — increased intensity.
        const BOLD          = 1 << 0;
        /// SGR 2 — decreased intensity.
        const DIM           = 1 << 1;
        /// SGR 3 — italic.
        const ITALIC        = 1 << 2;
        /// SGR 4 — underline.
        const UNDERLINE     = 1 << 3;
        /// SGR 7 — swap foreground and background.
        const REVERSE       = 1 << 4;
        /// SGR 9 — crossed-out text.
        const STRIKETHROUGH = 1 << 5;
    }
}

/// Style triple applied to a cell: attribute byte plus both colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Style {
    /// Attribute flags.
    pub attr: Attr,
    /// Foreground color.
    pub fg: Color,
    /// Background color.
    pub bg: Color,
}

impl Style {
    /// The empty style: no attributes, both colors default.
    pub const NONE: Self = Self {
        attr: Attr::empty(),
        fg: Color::Default,
        bg: Color::Default,
    };

    /// Set the attribute flags.
    #[inline]
    #[must_use]
    pub const fn with_attr(mut self, attr: Attr) -> Self {
        self.attr = attr;
        self
    }

    /// Set the foreground color.
    #[inline]
    #[must_use]
    pub const fn with_fg(mut self, fg: Color) -> Self {
        self.fg = fg;
        self
    }

    /// Set the background color.
    #[inline]
    #[must_use]
    pub const fn with_bg(mut self, bg: Color) -> Self {
        self.bg = bg;
        self
    }
}

/// A single terminal cell, packed into two 32-bit words.
///
/// Equality is word-wise: two cells are equal exactly when both words
/// match, which is what the diff loop compares.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Cell {
    w0: u32,
    w1: u32,
}

// Two words, no padding.
const _: () = assert!(core::mem::size_of::<Cell>() == 8);

/// Mask for the codepoint bits of `w0`.
const CODEPOINT_MASK: u32 = 0x001F_FFFF;

impl Cell {
    /// The empty cell: space, no attributes, default colors.
    pub const EMPTY: Self = Self {
        w0: b' ' as u32,
        w1: 0,
    };

    /// Pack a codepoint with an explicit attribute byte and colors.
    #[must_use]
    pub const fn pack(ch: char, attr: Attr, fg: Color, bg: Color) -> Self {
        Self {
            w0: ((attr.bits() as u32) << 24) | (ch as u32 & CODEPOINT_MASK),
            w1: ((PackedColor::from_color(fg).raw() as u32) << 16)
                | PackedColor::from_color(bg).raw() as u32,
        }
    }

    /// A cell with the given character and no styling.
    #[inline]
    #[must_use]
    pub const fn new(ch: char) -> Self {
        Self::pack(ch, Attr::empty(), Color::Default, Color::Default)
    }

    /// Pack a character with a [`Style`].
    #[inline]
    #[must_use]
    pub const fn styled(ch: char, style: Style) -> Self {
        Self::pack(ch, style.attr, style.fg, style.bg)
    }

    /// Rebuild a cell from its raw words.
    #[inline]
    #[must_use]
    pub const fn from_words(w0: u32, w1: u32) -> Self {
        Self { w0, w1 }
    }

    /// The raw `(w0, w1)` words.
    #[inline]
    #[must_use]
    pub const fn words(self) -> (u32, u32) {
        (self.w0, self.w1)
    }

    /// The stored character.
    ///
    /// Total: words holding an invalid scalar (only reachable through
    /// [`from_words`](Self::from_words)) decode to U+FFFD.
    #[inline]
    #[must_use]
    pub const fn ch(self) -> char {
        match char::from_u32(self.w0 & CODEPOINT_MASK) {
            Some(c) => c,
            None => char::REPLACEMENT_CHARACTER,
        }
    }

    /// The attribute byte. Reserved bits are dropped.
    #[inline]
    #[must_use]
    pub const fn attr(self) -> Attr {
        Attr::from_bits_truncate((self.w0 >> 24) as u8)
    }

    /// The packed foreground color.
    #[inline]
    #[must_use]
    pub const fn fg(self) -> PackedColor {
        PackedColor((self.w1 >> 16) as u16)
    }

    /// The packed background color.
    #[inline]
    #[must_use]
    pub const fn bg(self) -> PackedColor {
        PackedColor(self.w1 as u16)
    }

    /// Whether this equals the empty cell.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.w0 == Self::EMPTY.w0 && self.w1 == Self::EMPTY.w1
    }

    /// Whether two cells share the same `(attr, fg, bg)` triple.
    ///
    /// The diff loop groups adjacent cells into runs by this predicate.
    #[inline]
    #[must_use]
    pub const fn same_style(self, other: Self) -> bool {
        (self.w0 >> 24) == (other.w0 >> 24) && self.w1 == other.w1
    }

    /// Replace the character, preserving style.
    #[inline]
    #[must_use]
    pub const fn with_ch(self, ch: char) -> Self {
        Self {
            w0: (self.w0 & !CODEPOINT_MASK) | (ch as u32 & CODEPOINT_MASK),
            w1: self.w1,
        }
    }
}

impl Default for Cell {
    #[inline]
    fn default() -> Self {
        Self::EMPTY
    }
}

impl core::fmt::Debug for Cell {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Cell({:?}", self.ch())?;
        if !self.attr().is_empty() {
            write!(f, ", {:?}", self.attr())?;
        }
        if !self.fg().is_default() {
            write!(f, ", fg={:?}", self.fg().unpack())?;
        }
        if !self.bg().is_default() {
            write!(f, ", bg={:?}", self.bg().unpack())?;
        }
        write!(f, ")")
    }
}

/// Reset every slot in `buf[lo..hi]` to the empty cell.
///
/// The range is clamped to the buffer; `lo >= hi` is a no-op. Calling this
/// twice with the same arguments is observationally one call.
pub fn clear_range(buf: &mut [Cell], lo: usize, hi: usize) {
    let hi = hi.min(buf.len());
    if lo >= hi {
        return;
    }
    buf[lo..hi].fill(Cell::EMPTY);
}


#[cfg(test)]
mod cell_proptests {
    use super::{Attr, Cell};
    use crate::color::Color;
    use proptest::prelude::*;

    fn arb_color() -> impl Strategy<Value = Color> {
        prop_oneof![
            Just(Color::Default),
            any::<u8>().prop_map(Color::Palette),
            (any::<u8>(), any::<u8>(), any::<u8>()).prop_map(|(r, g, b)| Color::Rgb(r, g, b)),
        ]
    }

    fn arb_attr() -> impl Strategy<Value = Attr> {
        any::<u8>().prop_map(Attr::from_bits_truncate)
    }

    proptest! {
        #[test]
        fn char_and_attr_round_trip(
            (ch, attr, fg, bg) in (any::<char>(), arb_attr(), arb_color(), arb_color()),
        ) {
            let cell = Cell::pack(ch, attr, fg, bg);
            prop_assert_eq!(cell.ch(), ch);
            prop_assert_eq!(cell.attr(), attr);
        }

        #[test]
        fn palette_and_default_colors_round_trip(
            (ch, fg, bg) in (
                any::<char>(),
                prop_oneof![Just(Color::Default), any::<u8>().prop_map(Color::Palette)],
                prop_oneof![Just(Color::Default), any::<u8>().prop_map(Color::Palette)],
            ),
        ) {
            let cell = Cell::pack(ch, Attr::empty(), fg, bg);
            prop_assert_eq!(cell.fg().unpack(), fg);
            prop_assert_eq!(cell.bg().unpack(), bg);
        }

        #[test]
        fn words_round_trip(cell in (any::<char>(), arb_attr()).prop_map(|(c, a)| {
            Cell::pack(c, a, Color::Default, Color::Default)
        })) {
            let (w0, w1) = cell.words();
            prop_assert_eq!(Cell::from_words(w0, w1), cell);
        }

        #[test]
        fn equal_cells_share_style(
            (ch, attr, fg, bg) in (any::<char>(), arb_attr(), arb_color(), arb_color()),
        ) {
            let a = Cell::pack(ch, attr, fg, bg);
            let b = Cell::pack(ch, attr, fg, bg);
            prop_assert_eq!(a, b);
            prop_assert!(a.same_style(b));
        }
    }
}
