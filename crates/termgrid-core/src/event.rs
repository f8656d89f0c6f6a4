#![forbid(unsafe_code)]

//! Canonical input event types.
//!
//! Every event the decoder produces — and the resize events the host
//! injects — is an [`Event`]. Key and mouse events carry a `raw` field
//! holding the UTF-8 rendering of the bytes that produced them, so hosts
//! can log or echo unrecognized input faithfully.
//!
//! # Design Notes
//!
//! - Mouse coordinates are 1-based, exactly as the wire protocols report
//!   them.
//! - [`KeyEventKind`] defaults to `Press`; repeat/release only appear when
//!   the Kitty keyboard protocol is active.
//! - [`Modifiers`] use bitflags for easy combination.

use bitflags::bitflags;

bitflags! {
    /// Modifier keys held during an event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        /// Shift key.
        const SHIFT = 0b0001;
        /// Alt/Option key.
        const ALT   = 0b0010;
        /// Control key.
        const CTRL  = 0b0100;
        /// Meta/Super/Command key.
        const META  = 0b1000;
    }
}

impl Modifiers {
    /// Decode the xterm parameter encoding: `value = 1 + bits`.
    #[must_use]
    pub fn from_xterm(value: u32) -> Self {
        let bits = value.saturating_sub(1);
        let mut mods = Self::empty();
        if bits & 1 != 0 {
            mods |= Self::SHIFT;
        }
        if bits & 2 != 0 {
            mods |= Self::ALT;
        }
        if bits & 4 != 0 {
            mods |= Self::CTRL;
        }
        if bits & 8 != 0 {
            mods |= Self::META;
        }
        mods
    }
}

/// Key identity: a named key or a single Unicode scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// A regular character key.
    Char(char),
    /// Enter/Return.
    Enter,
    /// Escape.
    Escape,
    /// Backspace.
    Backspace,
    /// Tab.
    Tab,
    /// Shift+Tab.
    BackTab,
    /// Delete forward.
    Delete,
    /// Insert.
    Insert,
    /// Home.
    Home,
    /// End.
    End,
    /// Page Up.
    PageUp,
    /// Page Down.
    PageDown,
    /// Up arrow.
    Up,
    /// Down arrow.
    Down,
    /// Left arrow.
    Left,
    /// Right arrow.
    Right,
    /// Function key F1-F12.
    F(u8),
    /// Shift as a key of its own (Kitty protocol).
    Shift,
    /// Control as a key of its own (Kitty protocol).
    Control,
    /// Alt as a key of its own (Kitty protocol).
    Alt,
    /// Meta/Super as a key of its own (Kitty protocol).
    Meta,
    /// Caps Lock.
    CapsLock,
    /// Num Lock.
    NumLock,
    /// Scroll Lock.
    ScrollLock,
    /// Diagnostic stand-in for an unrecognized sequence.
    ///
    /// Only produced when the decoder's debug switch is on; the `raw`
    /// field of the carrying event holds the offending bytes.
    Unknown,
}

impl KeyCode {
    /// Whether this is a modifier or lock key.
    #[must_use]
    pub const fn is_modifier(self) -> bool {
        matches!(
            self,
            Self::Shift
                | Self::Control
                | Self::Alt
                | Self::Meta
                | Self::CapsLock
                | Self::NumLock
                | Self::ScrollLock
        )
    }

    /// The self-modifier bit for a modifier key, if any.
    #[must_use]
    pub const fn self_modifier(self) -> Option<Modifiers> {
        match self {
            Self::Shift => Some(Modifiers::SHIFT),
            Self::Control => Some(Modifiers::CTRL),
            Self::Alt => Some(Modifiers::ALT),
            Self::Meta => Some(Modifiers::META),
            _ => None,
        }
    }
}

/// Press / repeat / release, reported only under the Kitty protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyEventKind {
    /// Key went down (the default when the terminal cannot distinguish).
    #[default]
    Press,
    /// Key is being held.
    Repeat,
    /// Key came up.
    Release,
}

/// A keyboard event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    /// The key.
    pub code: KeyCode,
    /// Modifiers held during the event.
    pub modifiers: Modifiers,
    /// Press/repeat/release (Kitty protocol only; `Press` otherwise).
    pub kind: KeyEventKind,
    /// Whether this is an auto-repeat of a held key.
    pub repeat: bool,
    /// UTF-8 rendering of the originating bytes.
    pub raw: String,
}

impl KeyEvent {
    /// A press of `code` with no modifiers and empty raw bytes.
    #[must_use]
    pub fn new(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: Modifiers::empty(),
            kind: KeyEventKind::Press,
            repeat: false,
            raw: String::new(),
        }
    }

    /// Set the modifier mask.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Set the event kind; `Repeat` also sets the `repeat` flag.
    #[must_use]
    pub fn with_kind(mut self, kind: KeyEventKind) -> Self {
        self.kind = kind;
        self.repeat = matches!(kind, KeyEventKind::Repeat);
        self
    }

    /// Attach the originating bytes.
    #[must_use]
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = raw.into();
        self
    }

    /// Whether this event is a specific character key.
    #[must_use]
    pub fn is_char(&self, c: char) -> bool {
        matches!(self.code, KeyCode::Char(ch) if ch == c)
    }

    /// Whether Control is held.
    #[must_use]
    pub fn ctrl(&self) -> bool {
        self.modifiers.contains(Modifiers::CTRL)
    }

    /// Whether Alt is held.
    #[must_use]
    pub fn alt(&self) -> bool {
        self.modifiers.contains(Modifiers::ALT)
    }

    /// Whether Shift is held.
    #[must_use]
    pub fn shift(&self) -> bool {
        self.modifiers.contains(Modifiers::SHIFT)
    }
}

/// The shape of a mouse event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseEventKind {
    /// Button went down.
    Down,
    /// Button came up.
    Up,
    /// Motion with a button held.
    Drag,
    /// Motion with no button held.
    Move,
    /// Wheel movement.
    Scroll,
}

/// Mouse button identity, wheels included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Button 1.
    Left,
    /// Button 2.
    Middle,
    /// Button 3.
    Right,
    /// Wheel up.
    WheelUp,
    /// Wheel down.
    WheelDown,
    /// Wheel left.
    WheelLeft,
    /// Wheel right.
    WheelRight,
}

/// A mouse event with 1-based coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MouseEvent {
    /// Down/up/drag/move/scroll.
    pub kind: MouseEventKind,
    /// The button involved, when one is.
    pub button: Option<MouseButton>,
    /// Column, 1-based.
    pub x: u16,
    /// Row, 1-based.
    pub y: u16,
    /// Modifiers held during the event.
    pub modifiers: Modifiers,
    /// UTF-8 rendering of the originating bytes.
    pub raw: String,
}

/// Text delivered through bracketed paste.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasteEvent {
    /// The pasted text.
    pub content: String,
}

/// Clipboard content from an OSC 52 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardEvent {
    /// The clipboard text, base64-decoded.
    pub content: String,
}

/// A decoded terminal input event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Keyboard input.
    Key(KeyEvent),
    /// Mouse input.
    Mouse(MouseEvent),
    /// Bracketed paste.
    Paste(PasteEvent),
    /// Focus gained (`true`) or lost (`false`).
    Focus(bool),
    /// OSC 52 clipboard response.
    Clipboard(ClipboardEvent),
    /// Terminal dimensions changed.
    Resize {
        /// New row count.
        rows: u16,
        /// New column count.
        cols: u16,
    },
}
