#![forbid(unsafe_code)]

//! Per-terminal input quirks.
//!
//! A small remap table consulted by the decoder when quirks are enabled.
//! Three classes of compensation:
//!
//! - control bytes that a terminal emits for chorded navigation
//!   (iTerm sends `0x15` for Meta+Backspace, `0x01`/`0x05` for
//!   Meta+Left/Right);
//! - the readline-era `ESC b` / `ESC f` word-motion pair, remapped to
//!   Alt+Left/Right;
//! - Kitty-protocol modifier scalars numbered per the upstream protocol
//!   instead of the layout this decoder expects.
//!
//! Modern terminals (Kitty, Ghostty) pass through every path unmodified.

use crate::capabilities::TerminalKind;
use crate::event::{KeyCode, Modifiers};

/// Whether the quirk tables apply to this terminal at all.
///
/// Kitty and Ghostty implement the protocols correctly; everything they
/// send is taken at face value.
#[must_use]
pub const fn applies_to(terminal: TerminalKind) -> bool {
    !matches!(terminal, TerminalKind::Kitty | TerminalKind::Ghostty)
}

/// Remap a C0 control byte to a key chord, when the terminal uses one as
/// a navigation shorthand.
#[must_use]
pub fn control_byte_override(
    terminal: TerminalKind,
    byte: u8,
) -> Option<(KeyCode, Modifiers)> {
    if !applies_to(terminal) {
        return None;
    }
    match (terminal, byte) {
        (TerminalKind::ITerm, 0x15) => Some((KeyCode::Backspace, Modifiers::META)),
        (TerminalKind::ITerm, 0x01) => Some((KeyCode::Left, Modifiers::META)),
        (TerminalKind::ITerm, 0x05) => Some((KeyCode::Right, Modifiers::META)),
        _ => None,
    }
}

/// Remap `ESC <letter>` to a key chord.
///
/// `ESC b` / `ESC f` are the word-motion escapes emitted for
/// Option+Left/Right by terminals configured with "natural text editing".
#[must_use]
pub fn escape_letter_override(
    terminal: TerminalKind,
    byte: u8,
) -> Option<(KeyCode, Modifiers)> {
    if !applies_to(terminal) {
        return None;
    }
    match byte {
        b'b' => Some((KeyCode::Left, Modifiers::ALT)),
        b'f' => Some((KeyCode::Right, Modifiers::ALT)),
        _ => None,
    }
}

/// Remap a Kitty-protocol modifier scalar emitted with upstream numbering
/// onto the scalar this decoder's tables expect.
///
/// The decoder assigns `57441..=57451` as Shift L/R, Control L/R, Alt L/R,
/// Meta L/R, CapsLock, NumLock, ScrollLock. Terminals that number the
/// left-hand modifiers Shift, Control, Alt, Super (with right-hand
/// variants from 57447) get translated here; scalars outside the modifier
/// range pass through untouched.
#[must_use]
pub const fn remap_modifier_scalar(terminal: TerminalKind, scalar: u32) -> u32 {
    if !applies_to(terminal) {
        return scalar;
    }
    match scalar {
        57_441 => 57_441, // left shift
        57_442 => 57_443, // left control
        57_443 => 57_445, // left alt
        57_444 => 57_447, // left super -> meta
        57_447 => 57_442, // right shift
        57_448 => 57_444, // right control
        57_449 => 57_446, // right alt
        57_450 => 57_448, // right super -> meta
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modern_terminals_pass_through() {
        for terminal in [TerminalKind::Kitty, TerminalKind::Ghostty] {
            assert!(!applies_to(terminal));
            assert_eq!(control_byte_override(terminal, 0x15), None);
            assert_eq!(escape_letter_override(terminal, b'b'), None);
            assert_eq!(remap_modifier_scalar(terminal, 57_442), 57_442);
        }
    }

    #[test]
    fn iterm_control_bytes_become_meta_chords() {
        assert_eq!(
            control_byte_override(TerminalKind::ITerm, 0x15),
            Some((KeyCode::Backspace, Modifiers::META))
        );
        assert_eq!(
            control_byte_override(TerminalKind::ITerm, 0x01),
            Some((KeyCode::Left, Modifiers::META))
        );
        assert_eq!(
            control_byte_override(TerminalKind::ITerm, 0x05),
            Some((KeyCode::Right, Modifiers::META))
        );
    }

    #[test]
    fn other_terminals_keep_plain_control_bytes() {
        assert_eq!(control_byte_override(TerminalKind::Unknown, 0x15), None);
        assert_eq!(control_byte_override(TerminalKind::Tmux, 0x01), None);
        assert_eq!(control_byte_override(TerminalKind::ITerm, 0x02), None);
    }

    #[test]
    fn escape_letters_become_alt_arrows() {
        for terminal in [
            TerminalKind::ITerm,
            TerminalKind::Tmux,
            TerminalKind::Ssh,
            TerminalKind::Unknown,
        ] {
            assert_eq!(
                escape_letter_override(terminal, b'b'),
                Some((KeyCode::Left, Modifiers::ALT)),
                "{terminal}"
            );
            assert_eq!(
                escape_letter_override(terminal, b'f'),
                Some((KeyCode::Right, Modifiers::ALT)),
                "{terminal}"
            );
        }
        assert_eq!(escape_letter_override(TerminalKind::ITerm, b'x'), None);
    }

    #[test]
    fn upstream_modifier_numbering_is_translated() {
        let t = TerminalKind::ITerm;
        // Upstream "left control" decodes as Control.
        assert_eq!(remap_modifier_scalar(t, 57_442), 57_443);
        assert_eq!(remap_modifier_scalar(t, 57_443), 57_445);
        assert_eq!(remap_modifier_scalar(t, 57_444), 57_447);
        // Right-hand variants.
        assert_eq!(remap_modifier_scalar(t, 57_447), 57_442);
        assert_eq!(remap_modifier_scalar(t, 57_448), 57_444);
        assert_eq!(remap_modifier_scalar(t, 57_449), 57_446);
        assert_eq!(remap_modifier_scalar(t, 57_450), 57_448);
    }

    #[test]
    fn non_modifier_scalars_pass_through() {
        assert_eq!(remap_modifier_scalar(TerminalKind::ITerm, 97), 97);
        assert_eq!(remap_modifier_scalar(TerminalKind::ITerm, 57_449 + 100), 57_549);
        assert_eq!(remap_modifier_scalar(TerminalKind::Unknown, 13), 13);
    }
}
