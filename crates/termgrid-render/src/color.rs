#![forbid(unsafe_code)]

//! Cell color model and its 16-bit storage encoding.
//!
//! Colors live in two representations:
//!
//! - [`Color`] is what callers hand to the grid: default (inherit), a
//!   256-color palette index, or 24-bit RGB.
//! - [`PackedColor`] is the 16-bit form stored inside a cell word:
//!
//! ```text
//! 0            default / inherit
//! 1..=256      palette index + 1
//! 257..=65535  truecolor, 5-6-5 RGB offset by 257
//! ```
//!
//! Truecolor loses precision on the way in (8 bits per channel down to
//! 5-6-5) and is reconstructed by bit replication on the way out, so RGB
//! round-trips are approximate while palette and default round-trip exactly.
//! Every conversion here is total: malformed hex input decodes to the
//! default color, never an error.

/// A caller-facing terminal color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Color {
    /// Inherit the terminal's default foreground/background.
    #[default]
    Default,
    /// One of the 256 indexed palette colors.
    Palette(u8),
    /// 24-bit RGB.
    Rgb(u8, u8, u8),
}

impl Color {
    /// Parse a `#RRGGBB` hex string.
    ///
    /// Total over all inputs: wrong length, missing `#`, or non-hex digits
    /// all yield [`Color::Default`].
    #[must_use]
    pub fn from_hex(s: &str) -> Self {
        let Some(hex) = s.strip_prefix('#') else {
            return Self::Default;
        };
        if hex.len() != 6 || !hex.is_ascii() {
            return Self::Default;
        }
        let Ok(r) = u8::from_str_radix(&hex[0..2], 16) else {
            return Self::Default;
        };
        let Ok(g) = u8::from_str_radix(&hex[2..4], 16) else {
            return Self::Default;
        };
        let Ok(b) = u8::from_str_radix(&hex[4..6], 16) else {
            return Self::Default;
        };
        Self::Rgb(r, g, b)
    }

    /// Whether this is the default (inherit) color.
    #[inline]
    #[must_use]
    pub const fn is_default(self) -> bool {
        matches!(self, Self::Default)
    }

    /// Encode into the 16-bit storage form.
    #[inline]
    #[must_use]
    pub const fn pack(self) -> PackedColor {
        PackedColor::from_color(self)
    }
}

/// The 16-bit encoded color stored in a cell word.
///
/// See the module docs for the value layout. The truecolor band holds
/// `257 + (r5 << 11 | g6 << 5 | b5)`; the 257 near-white codes that would
/// overflow 16 bits saturate to `0xFFFF`, which reconstructs as pure white.
/// This keeps the palette and default bands unambiguous while `#000000`
/// and `#ffffff` both survive a round-trip exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct PackedColor(pub u16);

/// First encoded value of the truecolor band.
const TRUECOLOR_BASE: u32 = 257;

impl PackedColor {
    /// The default (inherit) color.
    pub const DEFAULT: Self = Self(0);

    /// Encode a [`Color`].
    #[must_use]
    pub const fn from_color(color: Color) -> Self {
        match color {
            Color::Default => Self::DEFAULT,
            Color::Palette(p) => Self(1 + p as u16),
            Color::Rgb(r, g, b) => Self::from_rgb(r, g, b),
        }
    }

    /// Encode 24-bit RGB into the 5-6-5 truecolor band.
    #[must_use]
    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        let packed = ((r as u32 >> 3) << 11) | ((g as u32 >> 2) << 5) | (b as u32 >> 3);
        let value = TRUECOLOR_BASE + packed;
        if value > u16::MAX as u32 {
            Self(u16::MAX)
        } else {
            Self(value as u16)
        }
    }

    /// Encode a palette index.
    #[inline]
    #[must_use]
    pub const fn from_palette(index: u8) -> Self {
        Self(1 + index as u16)
    }

    /// Whether this is the default (inherit) color.
    #[inline]
    #[must_use]
    pub const fn is_default(self) -> bool {
        self.0 == 0
    }

    /// The palette index, if this value sits in the palette band.
    #[inline]
    #[must_use]
    pub const fn palette_index(self) -> Option<u8> {
        if self.0 >= 1 && self.0 <= 256 {
            Some((self.0 - 1) as u8)
        } else {
            None
        }
    }

    /// Reconstructed RGB channels, if this value sits in the truecolor band.
    ///
    /// Channels are expanded from 5-6-5 by bit replication so full-scale
    /// values come back at exactly 255.
    #[must_use]
    pub const fn rgb(self) -> Option<(u8, u8, u8)> {
        if (self.0 as u32) < TRUECOLOR_BASE {
            return None;
        }
        let packed = if self.0 == u16::MAX {
            0xFFFF
        } else {
            self.0 as u32 - TRUECOLOR_BASE
        };
        let r5 = (packed >> 11) & 0x1F;
        let g6 = (packed >> 5) & 0x3F;
        let b5 = packed & 0x1F;
        Some((
            ((r5 << 3) | (r5 >> 2)) as u8,
            ((g6 << 2) | (g6 >> 4)) as u8,
            ((b5 << 3) | (b5 >> 2)) as u8,
        ))
    }

    /// Decode back to a [`Color`].
    #[must_use]
    pub const fn unpack(self) -> Color {
        if self.is_default() {
            return Color::Default;
        }
        if let Some(p) = self.palette_index() {
            return Color::Palette(p);
        }
        match self.rgb() {
            Some((r, g, b)) => Color::Rgb(r, g, b),
            // Unreachable: every non-zero u16 is palette or truecolor.
            None => Color::Default,
        }
    }

    /// The raw 16-bit value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl From<Color> for PackedColor {
    fn from(color: Color) -> Self {
        Self::from_color(color)
    }
}

#[cfg(test)]
mod tests {
    use super::{Color, PackedColor};

    #[test]
    fn packed_color_is_2_bytes() {
        assert_eq!(core::mem::size_of::<PackedColor>(), 2);
    }

    #[test]
    fn default_encodes_to_zero() {
        assert_eq!(Color::Default.pack(), PackedColor(0));
        assert!(PackedColor(0).is_default());
        assert_eq!(PackedColor(0).unpack(), Color::Default);
    }

    #[test]
    fn palette_round_trips_exactly() {
        for p in 0..=255u8 {
            let packed = Color::Palette(p).pack();
            assert_eq!(packed.raw(), 1 + u16::from(p));
            assert_eq!(packed.unpack(), Color::Palette(p));
        }
    }

    #[test]
    fn palette_band_boundaries() {
        assert_eq!(PackedColor(1).palette_index(), Some(0));
        assert_eq!(PackedColor(256).palette_index(), Some(255));
        assert_eq!(PackedColor(257).palette_index(), None);
        assert_eq!(PackedColor(0).palette_index(), None);
    }

    #[test]
    fn black_round_trips_exactly() {
        let packed = Color::Rgb(0, 0, 0).pack();
        assert_eq!(packed.raw(), 257);
        assert_eq!(packed.unpack(), Color::Rgb(0, 0, 0));
    }

    #[test]
    fn white_round_trips_exactly() {
        let packed = Color::Rgb(255, 255, 255).pack();
        assert_eq!(packed.raw(), u16::MAX);
        assert_eq!(packed.unpack(), Color::Rgb(255, 255, 255));
    }

    #[test]
    fn truecolor_error_is_bounded_by_quantization() {
        // 5-bit channels lose 3 bits, 6-bit channels lose 2; replication
        // keeps full-scale exact and the error under one quantization step.
        for v in [0u8, 1, 7, 8, 100, 127, 128, 200, 254, 255] {
            let packed = Color::Rgb(v, v, v).pack();
            let Color::Rgb(r, g, b) = packed.unpack() else {
                panic!("truecolor decoded as {:?}", packed.unpack());
            };
            assert!(u8::abs_diff(r, v) <= 7, "r {r} vs {v}");
            assert!(u8::abs_diff(g, v) <= 3, "g {g} vs {v}");
            assert!(u8::abs_diff(b, v) <= 7, "b {b} vs {v}");
        }
    }

    #[test]
    fn white_decodes_within_tolerance() {
        let Color::Rgb(r, g, b) = Color::from_hex("#ffffff").pack().unpack() else {
            panic!("expected rgb");
        };
        assert!(u8::abs_diff(r, 255) <= 4);
        assert!(u8::abs_diff(g, 255) <= 4);
        assert!(u8::abs_diff(b, 255) <= 4);
    }

    #[test]
    fn hex_parses_valid_input() {
        assert_eq!(Color::from_hex("#ff0000"), Color::Rgb(255, 0, 0));
        assert_eq!(Color::from_hex("#00ff7f"), Color::Rgb(0, 255, 127));
        assert_eq!(Color::from_hex("#000000"), Color::Rgb(0, 0, 0));
    }

    #[test]
    fn hex_is_total_over_garbage() {
        for s in [
            "", "#", "#fff", "#fffffff", "ff0000", "#gg0000", "#ff 000", "red", "#FF00",
            "#\u{1F600}00",
        ] {
            assert_eq!(Color::from_hex(s), Color::Default, "input {s:?}");
        }
    }

    #[test]
    fn hex_accepts_uppercase_digits() {
        assert_eq!(Color::from_hex("#FF00AA"), Color::Rgb(255, 0, 170));
    }

    #[test]
    fn near_white_saturates_to_white() {
        // Codes past the top of the 16-bit range all land on 0xFFFF.
        let packed = Color::Rgb(255, 255, 200).pack();
        assert_eq!(packed.raw(), u16::MAX);
        assert_eq!(packed.unpack(), Color::Rgb(255, 255, 255));
    }

    #[test]
    fn every_nonzero_value_decodes() {
        // Total decoding: no u16 value may panic or fall through.
        for raw in [1u16, 2, 255, 256, 257, 258, 1000, 32768, 65534, 65535] {
            let _ = PackedColor(raw).unpack();
        }
    }
}
