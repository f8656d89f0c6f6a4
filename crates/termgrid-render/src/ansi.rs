#![forbid(unsafe_code)]

//! ANSI escape sequence generation.
//!
//! Pure string builders plus one precomputed table. No state lives here;
//! the [`crate::renderer`] tracks what the terminal currently shows and
//! decides *which* of these sequences to emit.
//!
//! Every function is total: out-of-range and degenerate inputs produce the
//! empty string rather than an error.
//!
//! # Sequence Reference
//!
//! | Category | Sequence | Description |
//! |----------|----------|-------------|
//! | SGR | `ESC [ 0 ; codes m` | attribute base (see [`attr_lut`]) |
//! | SGR | `ESC [ 38/48 ; 5 ; n m` | palette color |
//! | SGR | `ESC [ 38/48 ; 2 ; r ; g ; b m` | truecolor |
//! | CUP | `ESC [ row ; col H` | cursor position (1-based) |
//! | CUU/CUD/CUF/CUB | `ESC [ n A/B/C/D` | relative cursor motion |

use std::sync::LazyLock;

use crate::cell::Attr;
use crate::color::{Color, PackedColor};

// =============================================================================
// Named sequences
// =============================================================================

/// SGR reset: `CSI 0 m`.
pub const SGR_RESET: &str = "\x1b[0m";

/// Default background inside a delta: `CSI 49 m`.
pub const BG_RESET: &str = "\x1b[49m";

/// Hide cursor: `CSI ? 25 l`.
pub const CURSOR_HIDE: &str = "\x1b[?25l";

/// Show cursor: `CSI ? 25 h`.
pub const CURSOR_SHOW: &str = "\x1b[?25h";

/// Cursor to home position: `CSI H`.
pub const CURSOR_HOME: &str = "\x1b[H";

/// Erase the whole display: `CSI 2 J`.
pub const CLEAR_SCREEN: &str = "\x1b[2J";

/// Begin synchronized update: `CSI ? 2026 h`.
pub const SYNC_BEGIN: &str = "\x1b[?2026h";

/// End synchronized update: `CSI ? 2026 l`.
pub const SYNC_END: &str = "\x1b[?2026l";

/// Enter the alternate screen buffer: `CSI ? 1049 h`.
pub const ALT_SCREEN_ENTER: &str = "\x1b[?1049h";

/// Leave the alternate screen buffer: `CSI ? 1049 l`.
pub const ALT_SCREEN_LEAVE: &str = "\x1b[?1049l";

// =============================================================================
// Attribute lookup table
// =============================================================================

/// SGR codes for each attribute bit, in emission order.
const ATTR_CODES: [(Attr, u8); 6] = [
    (Attr::BOLD, 1),
    (Attr::DIM, 2),
    (Attr::ITALIC, 3),
    (Attr::UNDERLINE, 4),
    (Attr::REVERSE, 7),
    (Attr::STRIKETHROUGH, 9),
];

static ATTR_LUT: LazyLock<[String; 256]> = LazyLock::new(|| {
    core::array::from_fn(|byte| {
        let attr = Attr::from_bits_truncate(byte as u8);
        let mut seq = String::from("\x1b[0");
        for (flag, code) in ATTR_CODES {
            if attr.contains(flag) {
                seq.push(';');
                push_num(&mut seq, u32::from(code));
            }
        }
        seq.push('m');
        seq
    })
});

/// The precomputed SGR base for an attribute byte: `ESC [ 0 ; codes m`.
///
/// Codes are the sorted subset of `{1,2,3,4,7,9}` for the set bits;
/// reserved bits 6-7 contribute nothing. `attr_lut(0)` is [`SGR_RESET`].
#[inline]
#[must_use]
pub fn attr_lut(attr: u8) -> &'static str {
    &ATTR_LUT[attr as usize]
}

// =============================================================================
// Cursor motion
// =============================================================================

/// Absolute cursor position, 1-based: `ESC [ row ; col H`.
#[must_use]
pub fn move_to(row: u16, col: u16) -> String {
    let mut seq = String::with_capacity(10);
    push_move_to(&mut seq, row, col);
    seq
}

/// Append [`move_to`] onto an output buffer without an intermediate alloc.
pub fn push_move_to(out: &mut String, row: u16, col: u16) {
    out.push_str("\x1b[");
    push_num(out, u32::from(row));
    out.push(';');
    push_num(out, u32::from(col));
    out.push('H');
}

/// Relative cursor motion: `ESC [ n A` (up). Empty for `n <= 0`.
#[must_use]
pub fn move_up(n: i32) -> String {
    relative_move(n, 'A')
}

/// Relative cursor motion: `ESC [ n B` (down). Empty for `n <= 0`.
#[must_use]
pub fn move_down(n: i32) -> String {
    relative_move(n, 'B')
}

/// Relative cursor motion: `ESC [ n C` (right). Empty for `n <= 0`.
#[must_use]
pub fn move_right(n: i32) -> String {
    relative_move(n, 'C')
}

/// Relative cursor motion: `ESC [ n D` (left). Empty for `n <= 0`.
#[must_use]
pub fn move_left(n: i32) -> String {
    relative_move(n, 'D')
}

fn relative_move(n: i32, dir: char) -> String {
    if n <= 0 {
        return String::new();
    }
    let mut seq = String::with_capacity(8);
    seq.push_str("\x1b[");
    push_num(&mut seq, n as u32);
    seq.push(dir);
    seq
}

// =============================================================================
// Color sequences
// =============================================================================

/// A standalone SGR sequence for one color: `ESC [ 38/48 ; … m`.
///
/// The default color produces the empty string (inherit).
#[must_use]
pub fn color_to_ansi(color: Color, is_bg: bool) -> String {
    let mut seq = String::new();
    let mut body = String::new();
    push_color_codes(&mut body, PackedColor::from_color(color), is_bg);
    if body.is_empty() {
        return seq;
    }
    seq.push_str("\x1b[");
    seq.push_str(&body);
    seq.push('m');
    seq
}

/// Append the parameter portion (`38;5;n` / `48;2;r;g;b`) for a packed
/// color. Appends nothing for the default color.
pub fn push_color_codes(out: &mut String, color: PackedColor, is_bg: bool) {
    if let Some(index) = color.palette_index() {
        out.push_str(if is_bg { "48;5;" } else { "38;5;" });
        push_num(out, u32::from(index));
    } else if let Some((r, g, b)) = color.rgb() {
        out.push_str(if is_bg { "48;2;" } else { "38;2;" });
        push_num(out, u32::from(r));
        out.push(';');
        push_num(out, u32::from(g));
        out.push(';');
        push_num(out, u32::from(b));
    }
}

/// The full SGR sequence for a style triple, as a single `ESC [ … m`.
///
/// Starts from the attribute base (which resets prior state) and appends
/// any non-default colors. With no attributes and no colors this is
/// exactly [`SGR_RESET`].
#[must_use]
pub fn build_sgr(attr: u8, fg: PackedColor, bg: PackedColor) -> String {
    let mut seq = String::with_capacity(24);
    let base = attr_lut(attr);
    // Splice colors inside the base sequence's trailing 'm'.
    seq.push_str(&base[..base.len() - 1]);
    let mut body = String::new();
    push_color_codes(&mut body, fg, false);
    if !body.is_empty() {
        seq.push(';');
        seq.push_str(&body);
    }
    body.clear();
    push_color_codes(&mut body, bg, true);
    if !body.is_empty() {
        seq.push(';');
        seq.push_str(&body);
    }
    seq.push('m');
    seq
}

/// The color-only delta sequence: `ESC [ [49;] fg-codes [;] bg-codes m`.
///
/// `reset_bg` prepends the `49` default-background code; used when a run
/// transitions from a colored background back to the default one. Returns
/// the empty string when there is nothing to emit.
#[must_use]
pub fn color_delta(fg: PackedColor, bg: PackedColor, reset_bg: bool) -> String {
    let mut body = String::new();
    if reset_bg {
        body.push_str("49");
    }
    let mut part = String::new();
    push_color_codes(&mut part, fg, false);
    if !part.is_empty() {
        if !body.is_empty() {
            body.push(';');
        }
        body.push_str(&part);
    }
    part.clear();
    push_color_codes(&mut part, bg, true);
    if !part.is_empty() {
        if !body.is_empty() {
            body.push(';');
        }
        body.push_str(&part);
    }
    if body.is_empty() {
        return String::new();
    }
    let mut seq = String::with_capacity(body.len() + 3);
    seq.push_str("\x1b[");
    seq.push_str(&body);
    seq.push('m');
    seq
}

/// Append a decimal number without going through `fmt`.
fn push_num(out: &mut String, mut n: u32) {
    let mut digits = [0u8; 10];
    let mut i = digits.len();
    loop {
        i -= 1;
        digits[i] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    for &d in &digits[i..] {
        out.push(d as char);
    }
}
