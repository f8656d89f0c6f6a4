#![forbid(unsafe_code)]

//! Byte-level terminal input decoder.
//!
//! [`Decoder::feed`] consumes arbitrary byte chunks and enqueues typed
//! [`Event`]s; [`Decoder::next`] pops them. The machine is driven one byte
//! at a time, so sequences split across reads decode identically to
//! sequences fed whole.
//!
//! Handled input: UTF-8 text, C0 controls, CSI/SS3/OSC/DCS escape
//! sequences, the Kitty keyboard protocol (`CSI … u`), SGR and X10 mouse
//! reports, bracketed paste, focus reports, and OSC 52 clipboard
//! responses.
//!
//! # Bounds
//!
//! Steady-state allocation per byte is zero. Every accumulator is capped:
//! CSI parameters at 16 entries of at most `0xFFFFFF`, the raw-byte echo
//! at 256 bytes, OSC payloads at 10 000 bytes (oversized payloads are
//! abandoned), paste content at 1 MiB (the terminator is still detected
//! past the cap).
//!
//! # Malformed input
//!
//! A malformed sequence resets the machine silently and never poisons the
//! bytes that follow. With [`DecoderOptions::debug_unknown`] set, the two
//! diagnostic paths (`ESC` followed by a control byte, unrecognized CSI
//! finals) surface `KeyCode::Unknown` events carrying the raw bytes.

use std::collections::VecDeque;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::capabilities::{Capabilities, Feature, TerminalKind};
use crate::event::{
    ClipboardEvent, Event, KeyCode, KeyEvent, KeyEventKind, Modifiers, MouseButton, MouseEvent,
    MouseEventKind, PasteEvent,
};
use crate::quirks;

/// Cap on the raw-byte echo kept for event reporting.
const RAW_CAP: usize = 256;

/// Cap on CSI parameter count.
const PARAM_CAP: usize = 16;

/// Cap on a single CSI parameter value.
const PARAM_VALUE_CAP: u32 = 0x00FF_FFFF;

/// Cap on accumulated OSC payload bytes.
const OSC_CAP: usize = 10_000;

/// Cap on stored paste content.
const PASTE_CAP: usize = 1024 * 1024;

/// Bracketed paste terminator.
const PASTE_END: &[u8] = b"\x1b[201~";

/// Decoder configuration.
#[derive(Debug, Clone, Copy)]
pub struct DecoderOptions {
    /// Whether the Kitty keyboard protocol is active. Printable bytes are
    /// then suppressed in favor of the `CSI … u` reports that follow.
    pub kitty_keyboard: bool,
    /// Whether the per-terminal quirk tables apply.
    pub quirks: bool,
    /// The terminal the quirk tables are indexed by.
    pub terminal: TerminalKind,
    /// Emit `KeyCode::Unknown` diagnostics for unrecognized sequences.
    pub debug_unknown: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            kitty_keyboard: false,
            quirks: false,
            terminal: TerminalKind::Unknown,
            debug_unknown: false,
        }
    }
}

impl DecoderOptions {
    /// Derive options from a detected capability record.
    ///
    /// Quirks engage for every terminal except the protocol-correct
    /// moderns; the debug switch follows `DEBUG_TERMGRID_INPUT`.
    #[must_use]
    pub fn from_capabilities(caps: &Capabilities) -> Self {
        Self {
            kitty_keyboard: caps.supports(Feature::KittyKeyboard).is_available(),
            quirks: quirks::applies_to(caps.terminal),
            terminal: caps.terminal,
            debug_unknown: crate::logging::debug_flag("DEBUG_TERMGRID_INPUT"),
        }
    }
}

/// Parser state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    /// Plain text and control bytes.
    #[default]
    Idle,
    /// After `ESC`.
    Escape,
    /// After `ESC [`, before any parameter byte.
    Csi,
    /// Collecting CSI parameters.
    CsiParam,
    /// Collecting CSI intermediate bytes.
    CsiIntermediate,
    /// After `ESC O`.
    Ss3,
    /// Collecting an OSC payload.
    Osc,
    /// Consuming a DCS payload (discarded).
    Dcs,
    /// Collecting bracketed-paste content.
    Paste,
}

/// Tri-state physical-modifier shadow.
///
/// `Unknown` until a modifier key report has been seen; thereafter tracks
/// the last observed transition so stuck-modifier reports can be
/// corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ModState {
    #[default]
    Unknown,
    Pressed,
    Released,
}

/// One CSI parameter: primary value plus the first colon sub-parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Param {
    value: u32,
    sub: Option<u32>,
}

/// The input state machine.
#[derive(Debug)]
pub struct Decoder {
    opts: DecoderOptions,
    state: State,
    queue: VecDeque<Event>,

    /// Bytes of the in-flight sequence, echoed on emitted events.
    raw: Vec<u8>,

    // CSI accumulation.
    params: Vec<Param>,
    cur: Param,
    sub_depth: u8,
    param_seen: bool,
    intermediates: Vec<u8>,
    private: Option<u8>,

    // OSC / DCS.
    osc: Vec<u8>,
    osc_overflow: bool,
    string_esc: bool,

    // Paste.
    paste: Vec<u8>,
    paste_tail: Vec<u8>,

    // UTF-8 reassembly.
    utf8: [u8; 4],
    utf8_len: u8,
    utf8_need: u8,

    // X10 mouse trailer.
    x10: [u8; 3],
    x10_pending: u8,

    /// Button latched by the last SGR/X10 press, for drag vs move.
    last_button: Option<MouseButton>,

    /// Physical shadow for Shift, Alt, Ctrl, Meta.
    shadow: [ModState; 4],
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(DecoderOptions::default())
    }
}

impl Decoder {
    /// A decoder with the given options.
    #[must_use]
    pub fn new(opts: DecoderOptions) -> Self {
        Self {
            opts,
            state: State::Idle,
            queue: VecDeque::new(),
            raw: Vec::with_capacity(64),
            params: Vec::with_capacity(PARAM_CAP),
            cur: Param::default(),
            sub_depth: 0,
            param_seen: false,
            intermediates: Vec::with_capacity(4),
            private: None,
            osc: Vec::new(),
            osc_overflow: false,
            string_esc: false,
            paste: Vec::new(),
            paste_tail: Vec::new(),
            utf8: [0; 4],
            utf8_len: 0,
            utf8_need: 0,
            x10: [0; 3],
            x10_pending: 0,
            last_button: None,
            shadow: [ModState::Unknown; 4],
        }
    }

    /// The active options.
    #[must_use]
    pub const fn options(&self) -> &DecoderOptions {
        &self.opts
    }

    /// Feed a chunk of bytes through the machine.
    ///
    /// Chunk boundaries are irrelevant: feeding byte-by-byte produces the
    /// same event sequence as feeding everything at once.
    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.push_raw(byte);
            if let Some(event) = self.step(byte) {
                self.queue.push_back(event);
            }
        }
    }

    /// Pop the oldest decoded event.
    pub fn next(&mut self) -> Option<Event> {
        self.queue.pop_front()
    }

    /// Whether any decoded events are waiting.
    #[must_use]
    pub fn has_events(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Discard the completed-event queue. Partial sequence state is kept;
    /// a half-received escape sequence still completes afterwards.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    // ── Byte dispatch ────────────────────────────────────────────────────

    fn step(&mut self, byte: u8) -> Option<Event> {
        if self.x10_pending > 0 {
            return self.collect_x10(byte);
        }
        match self.state {
            State::Idle => self.on_idle(byte),
            State::Escape => self.on_escape(byte),
            State::Csi | State::CsiParam | State::CsiIntermediate => self.on_csi(byte),
            State::Ss3 => self.on_ss3(byte),
            State::Osc => self.on_osc(byte),
            State::Dcs => self.on_dcs(byte),
            State::Paste => self.on_paste(byte),
        }
    }

    fn push_raw(&mut self, byte: u8) {
        if self.raw.len() == RAW_CAP {
            self.raw.remove(0);
        }
        self.raw.push(byte);
    }

    fn take_raw(&mut self) -> String {
        let raw = String::from_utf8_lossy(&self.raw).into_owned();
        self.raw.clear();
        raw
    }

    fn drop_raw(&mut self) {
        self.raw.clear();
    }

    /// Reset to `Idle`, dropping any partial sequence.
    fn reset(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::trace!(state = ?self.state, "malformed sequence dropped");
        self.state = State::Idle;
        self.drop_raw();
    }

    fn debug_unknown_key(&mut self) -> Option<Event> {
        if self.opts.debug_unknown {
            let raw = self.take_raw();
            Some(Event::Key(KeyEvent::new(KeyCode::Unknown).with_raw(raw)))
        } else {
            self.drop_raw();
            None
        }
    }

    // ── Idle ─────────────────────────────────────────────────────────────

    fn on_idle(&mut self, byte: u8) -> Option<Event> {
        if self.utf8_need > 0 {
            return self.on_utf8_continuation(byte);
        }
        // A fresh Idle byte starts a fresh raw echo.
        let last = self.raw.pop().unwrap_or(byte);
        self.raw.clear();
        self.raw.push(last);

        match byte {
            0x1B => {
                self.state = State::Escape;
                None
            }
            b if b < 0x20 || b == 0x7F => self.control_key(b),
            0x20..=0x7E => {
                if self.opts.kitty_keyboard {
                    // The Kitty tail reports the keystroke with modifiers
                    // and kind; the plain byte is the legacy echo.
                    self.drop_raw();
                    None
                } else {
                    let raw = self.take_raw();
                    Some(Event::Key(
                        KeyEvent::new(KeyCode::Char(byte as char)).with_raw(raw),
                    ))
                }
            }
            0xC0..=0xDF => self.start_utf8(byte, 2),
            0xE0..=0xEF => self.start_utf8(byte, 3),
            0xF0..=0xF7 => self.start_utf8(byte, 4),
            // Stray continuation or invalid lead byte.
            _ => {
                self.drop_raw();
                None
            }
        }
    }

    fn control_key(&mut self, byte: u8) -> Option<Event> {
        if self.opts.quirks {
            if let Some((code, mods)) = quirks::control_byte_override(self.opts.terminal, byte) {
                let raw = self.take_raw();
                return Some(Event::Key(
                    KeyEvent::new(code).with_modifiers(mods).with_raw(raw),
                ));
            }
        }
        let (code, mods) = match byte {
            0x0D => (KeyCode::Enter, Modifiers::empty()),
            0x09 => (KeyCode::Tab, Modifiers::empty()),
            0x08 | 0x7F => (KeyCode::Backspace, Modifiers::empty()),
            0x00 => (KeyCode::Char(' '), Modifiers::CTRL),
            0x01..=0x1A => (KeyCode::Char((byte - 1 + b'a') as char), Modifiers::CTRL),
            0x1C..=0x1F => (KeyCode::Char((byte + 0x40) as char), Modifiers::CTRL),
            _ => {
                self.drop_raw();
                return None;
            }
        };
        let raw = self.take_raw();
        Some(Event::Key(
            KeyEvent::new(code).with_modifiers(mods).with_raw(raw),
        ))
    }

    // ── UTF-8 ────────────────────────────────────────────────────────────

    fn start_utf8(&mut self, byte: u8, need: u8) -> Option<Event> {
        self.utf8[0] = byte;
        self.utf8_len = 1;
        self.utf8_need = need;
        None
    }

    fn on_utf8_continuation(&mut self, byte: u8) -> Option<Event> {
        if byte & 0xC0 != 0x80 {
            // Broken sequence: emit a replacement for the dropped lead
            // bytes, then reprocess the offending byte from Idle.
            self.utf8_len = 0;
            self.utf8_need = 0;
            let _ = self.raw.pop();
            let broken = self.take_raw();
            if !self.opts.kitty_keyboard {
                self.queue.push_back(Event::Key(
                    KeyEvent::new(KeyCode::Char(char::REPLACEMENT_CHARACTER)).with_raw(broken),
                ));
            }
            self.push_raw(byte);
            return self.on_idle(byte);
        }

        self.utf8[usize::from(self.utf8_len)] = byte;
        self.utf8_len += 1;
        if self.utf8_len < self.utf8_need {
            return None;
        }

        let len = usize::from(self.utf8_len);
        self.utf8_len = 0;
        self.utf8_need = 0;
        let decoded = core::str::from_utf8(&self.utf8[..len])
            .ok()
            .and_then(|s| s.chars().next());
        match decoded {
            Some(ch) => {
                if self.opts.kitty_keyboard {
                    self.drop_raw();
                    None
                } else {
                    let raw = self.take_raw();
                    Some(Event::Key(KeyEvent::new(KeyCode::Char(ch)).with_raw(raw)))
                }
            }
            None => {
                self.drop_raw();
                None
            }
        }
    }

    // ── Escape ───────────────────────────────────────────────────────────

    fn on_escape(&mut self, byte: u8) -> Option<Event> {
        match byte {
            b'[' => {
                self.enter_csi();
                None
            }
            b'O' => {
                self.state = State::Ss3;
                None
            }
            b']' => {
                self.state = State::Osc;
                self.osc.clear();
                self.osc_overflow = false;
                self.string_esc = false;
                None
            }
            b'P' => {
                self.state = State::Dcs;
                self.string_esc = false;
                None
            }
            0x1B => {
                // ESC ESC: Alt+Escape.
                self.state = State::Idle;
                let raw = self.take_raw();
                Some(Event::Key(
                    KeyEvent::new(KeyCode::Escape)
                        .with_modifiers(Modifiers::ALT)
                        .with_raw(raw),
                ))
            }
            0x20..=0x7E => {
                self.state = State::Idle;
                if self.opts.quirks {
                    if let Some((code, mods)) =
                        quirks::escape_letter_override(self.opts.terminal, byte)
                    {
                        let raw = self.take_raw();
                        return Some(Event::Key(
                            KeyEvent::new(code).with_modifiers(mods).with_raw(raw),
                        ));
                    }
                }
                let raw = self.take_raw();
                Some(Event::Key(
                    KeyEvent::new(KeyCode::Char(byte as char))
                        .with_modifiers(Modifiers::ALT)
                        .with_raw(raw),
                ))
            }
            _ => {
                // ESC followed by a control byte: diagnostic territory.
                self.state = State::Idle;
                self.debug_unknown_key()
            }
        }
    }

    // ── CSI ──────────────────────────────────────────────────────────────

    fn enter_csi(&mut self) {
        self.state = State::Csi;
        self.params.clear();
        self.cur = Param::default();
        self.sub_depth = 0;
        self.param_seen = false;
        self.intermediates.clear();
        self.private = None;
    }

    fn push_param(&mut self) {
        if self.params.len() < PARAM_CAP {
            self.params.push(self.cur);
        }
        self.cur = Param::default();
        self.sub_depth = 0;
    }

    fn param_digit(&mut self, digit: u8) {
        let d = u32::from(digit - b'0');
        if self.sub_depth == 0 {
            self.cur.value = (self.cur.value.saturating_mul(10).saturating_add(d))
                .min(PARAM_VALUE_CAP);
        } else if self.sub_depth == 1 {
            let sub = self.cur.sub.unwrap_or(0);
            self.cur.sub =
                Some((sub.saturating_mul(10).saturating_add(d)).min(PARAM_VALUE_CAP));
        }
        // Deeper sub-parameters are ignored.
        self.param_seen = true;
    }

    fn on_csi(&mut self, byte: u8) -> Option<Event> {
        match byte {
            // ESC restarts: the partial sequence is dropped.
            0x1B => {
                self.state = State::Escape;
                self.drop_raw();
                self.push_raw(0x1B);
                None
            }
            b'0'..=b'9' => {
                if self.state == State::CsiIntermediate {
                    // Parameters after intermediates are malformed.
                    self.reset();
                    return None;
                }
                self.state = State::CsiParam;
                self.param_digit(byte);
                None
            }
            b';' => {
                if self.state == State::CsiIntermediate {
                    self.reset();
                    return None;
                }
                self.state = State::CsiParam;
                self.param_seen = true;
                self.push_param();
                None
            }
            b':' => {
                if self.state == State::CsiIntermediate {
                    self.reset();
                    return None;
                }
                self.state = State::CsiParam;
                self.param_seen = true;
                self.sub_depth = self.sub_depth.saturating_add(1);
                if self.sub_depth == 1 && self.cur.sub.is_none() {
                    self.cur.sub = Some(0);
                }
                None
            }
            b'<' | b'=' | b'>' | b'?' => {
                if self.state != State::Csi {
                    self.reset();
                    return None;
                }
                self.private = Some(byte);
                self.state = State::CsiParam;
                None
            }
            0x20..=0x2F => {
                if self.intermediates.len() < 4 {
                    self.intermediates.push(byte);
                }
                self.state = State::CsiIntermediate;
                None
            }
            0x40..=0x7E => {
                if self.param_seen {
                    self.push_param();
                }
                self.state = State::Idle;
                self.dispatch_csi(byte)
            }
            _ => {
                // Malformed: drop the partial sequence and the byte.
                self.reset();
                None
            }
        }
    }

    fn param(&self, index: usize) -> u32 {
        self.params.get(index).map_or(0, |p| p.value)
    }

    fn param_or(&self, index: usize, default: u32) -> u32 {
        match self.params.get(index) {
            Some(p) => p.value,
            None => default,
        }
    }

    /// Modifier mask from the second CSI parameter.
    fn csi_modifiers(&self) -> Modifiers {
        Modifiers::from_xterm(self.param_or(1, 1))
    }

    /// Event kind from the third parameter or the second's sub-parameter.
    fn csi_kind(&self) -> KeyEventKind {
        let code = match self.params.get(2) {
            Some(p) => p.value,
            None => self
                .params
                .get(1)
                .and_then(|p| p.sub)
                .unwrap_or(1),
        };
        match code {
            2 => KeyEventKind::Repeat,
            3 => KeyEventKind::Release,
            _ => KeyEventKind::Press,
        }
    }

    fn dispatch_csi(&mut self, final_byte: u8) -> Option<Event> {
        // SGR mouse carries the `<` private marker.
        if self.private == Some(b'<') && (final_byte == b'M' || final_byte == b'm') {
            return self.sgr_mouse(final_byte);
        }
        if self.private.is_some() {
            // Other private-marked reports (e.g. DEC mode replies) are not
            // part of the event vocabulary.
            return self.debug_unknown_key();
        }

        match final_byte {
            b'~' if self.param(0) == 200 => {
                self.state = State::Paste;
                self.paste.clear();
                self.paste_tail.clear();
                self.drop_raw();
                None
            }
            b'~' => self.csi_tilde(),
            b'u' if self.intermediates.is_empty() => self.kitty_key(),
            b'M' if self.params.is_empty() && self.intermediates.is_empty() => {
                // X10 report: three coordinate bytes follow the final.
                self.x10_pending = 3;
                None
            }
            b'I' if self.params.is_empty() => {
                self.drop_raw();
                Some(Event::Focus(true))
            }
            b'O' if self.params.is_empty() => {
                self.drop_raw();
                Some(Event::Focus(false))
            }
            b'A' => self.csi_key(KeyCode::Up),
            b'B' => self.csi_key(KeyCode::Down),
            b'C' => self.csi_key(KeyCode::Right),
            b'D' => self.csi_key(KeyCode::Left),
            b'H' => self.csi_key(KeyCode::Home),
            b'F' => self.csi_key(KeyCode::End),
            b'Z' => self.csi_key(KeyCode::BackTab),
            _ => self.debug_unknown_key(),
        }
    }

    fn csi_key(&mut self, code: KeyCode) -> Option<Event> {
        let mods = self.csi_modifiers();
        let kind = self.csi_kind();
        let raw = self.take_raw();
        Some(Event::Key(
            KeyEvent::new(code)
                .with_modifiers(mods)
                .with_kind(kind)
                .with_raw(raw),
        ))
    }

    fn csi_tilde(&mut self) -> Option<Event> {
        let code = match self.param(0) {
            1 | 7 => KeyCode::Home,
            2 => KeyCode::Insert,
            3 => KeyCode::Delete,
            4 | 8 => KeyCode::End,
            5 => KeyCode::PageUp,
            6 => KeyCode::PageDown,
            11 => KeyCode::F(1),
            12 => KeyCode::F(2),
            13 => KeyCode::F(3),
            14 => KeyCode::F(4),
            15 => KeyCode::F(5),
            17 => KeyCode::F(6),
            18 => KeyCode::F(7),
            19 => KeyCode::F(8),
            20 => KeyCode::F(9),
            21 => KeyCode::F(10),
            23 => KeyCode::F(11),
            24 => KeyCode::F(12),
            _ => return self.debug_unknown_key(),
        };
        self.csi_key(code)
    }

    // ── Kitty keyboard ───────────────────────────────────────────────────

    fn kitty_key(&mut self) -> Option<Event> {
        let Some(first) = self.params.first().copied() else {
            return self.debug_unknown_key();
        };
        let scalar = if self.opts.quirks {
            quirks::remap_modifier_scalar(self.opts.terminal, first.value)
        } else {
            first.value
        };
        let Some(code) = kitty_scalar_to_code(scalar) else {
            return self.debug_unknown_key();
        };

        let mut mods = self.csi_modifiers();
        let kind = self.csi_kind();

        // A modifier key never carries its own bit.
        if let Some(self_bit) = code.self_modifier() {
            mods.remove(self_bit);
        }

        // Track physical transitions, then correct stuck modifiers.
        if let Some(slot) = shadow_slot(code) {
            self.shadow[slot] = match kind {
                KeyEventKind::Release => ModState::Released,
                _ => ModState::Pressed,
            };
        }
        if self.opts.quirks {
            for (bit, slot) in [
                (Modifiers::SHIFT, 0),
                (Modifiers::ALT, 1),
                (Modifiers::CTRL, 2),
                (Modifiers::META, 3),
            ] {
                if mods.contains(bit) && self.shadow[slot] == ModState::Released {
                    mods.remove(bit);
                }
            }
        }

        let raw = self.take_raw();
        Some(Event::Key(
            KeyEvent::new(code)
                .with_modifiers(mods)
                .with_kind(kind)
                .with_raw(raw),
        ))
    }

    // ── Mouse ────────────────────────────────────────────────────────────

    fn sgr_mouse(&mut self, final_byte: u8) -> Option<Event> {
        if self.params.len() < 3 {
            self.drop_raw();
            return None;
        }
        let code = self.param(0);
        let x = clamp_u16(self.param(1));
        let y = clamp_u16(self.param(2));
        let release = final_byte == b'm';
        let raw = self.take_raw();
        Some(self.mouse_event(code, x, y, release, raw))
    }

    fn collect_x10(&mut self, byte: u8) -> Option<Event> {
        let slot = 3 - self.x10_pending;
        self.x10[usize::from(slot)] = byte;
        self.x10_pending -= 1;
        if self.x10_pending > 0 {
            return None;
        }

        let [cb, cx, cy] = self.x10;
        if cb < 32 || cx < 32 || cy < 32 {
            // Malformed report.
            self.drop_raw();
            return None;
        }
        let code = u32::from(cb - 32);
        let x = u16::from(cx - 32);
        let y = u16::from(cy - 32);
        // X10 release: button bits 0b11 with neither motion nor wheel set.
        let release = code & 3 == 3 && code & 0x60 == 0;
        let raw = self.take_raw();
        Some(self.mouse_event(code, x, y, release, raw))
    }

    /// Shared button-code decoding for SGR and X10 reports.
    fn mouse_event(&mut self, code: u32, x: u16, y: u16, release: bool, raw: String) -> Event {
        let mut mods = Modifiers::empty();
        if code & 4 != 0 {
            mods |= Modifiers::SHIFT;
        }
        if code & 8 != 0 {
            mods |= Modifiers::ALT;
        }
        if code & 16 != 0 {
            mods |= Modifiers::CTRL;
        }

        let wheel = code & 64 != 0;
        let motion = code & 32 != 0;

        let (kind, button) = if wheel {
            let button = match code & 3 {
                0 => MouseButton::WheelUp,
                1 => MouseButton::WheelDown,
                2 => MouseButton::WheelLeft,
                _ => MouseButton::WheelRight,
            };
            (MouseEventKind::Scroll, Some(button))
        } else if release {
            let button = pressed_button(code);
            self.last_button = None;
            (MouseEventKind::Up, button)
        } else if motion {
            match self.last_button {
                Some(button) => (MouseEventKind::Drag, Some(button)),
                None => (MouseEventKind::Move, None),
            }
        } else {
            let button = pressed_button(code);
            self.last_button = button;
            (MouseEventKind::Down, button)
        };

        Event::Mouse(MouseEvent {
            kind,
            button,
            x,
            y,
            modifiers: mods,
            raw,
        })
    }

    // ── SS3 ──────────────────────────────────────────────────────────────

    fn on_ss3(&mut self, byte: u8) -> Option<Event> {
        if byte == 0x1B {
            self.state = State::Escape;
            self.drop_raw();
            self.push_raw(0x1B);
            return None;
        }
        self.state = State::Idle;
        let code = match byte {
            b'P' => KeyCode::F(1),
            b'Q' => KeyCode::F(2),
            b'R' => KeyCode::F(3),
            b'S' => KeyCode::F(4),
            b'A' => KeyCode::Up,
            b'B' => KeyCode::Down,
            b'C' => KeyCode::Right,
            b'D' => KeyCode::Left,
            b'H' => KeyCode::Home,
            b'F' => KeyCode::End,
            _ => return self.debug_unknown_key(),
        };
        let raw = self.take_raw();
        Some(Event::Key(KeyEvent::new(code).with_raw(raw)))
    }

    // ── OSC / DCS ────────────────────────────────────────────────────────

    fn on_osc(&mut self, byte: u8) -> Option<Event> {
        if self.string_esc {
            self.string_esc = false;
            if byte == b'\\' {
                self.state = State::Idle;
                return self.finish_osc();
            }
            // ESC followed by anything else cancels the string; the byte
            // restarts parsing from the Escape state.
            self.osc.clear();
            self.osc_overflow = false;
            self.state = State::Escape;
            self.drop_raw();
            self.push_raw(0x1B);
            self.push_raw(byte);
            return self.on_escape(byte);
        }
        match byte {
            0x07 => {
                self.state = State::Idle;
                self.finish_osc()
            }
            0x1B => {
                self.string_esc = true;
                None
            }
            _ => {
                if self.osc_overflow {
                    return None;
                }
                if self.osc.len() >= OSC_CAP {
                    // Abandon the payload but keep consuming to the
                    // terminator.
                    #[cfg(feature = "tracing")]
                    tracing::trace!(cap = OSC_CAP, "oversized OSC payload abandoned");
                    self.osc.clear();
                    self.osc_overflow = true;
                    return None;
                }
                self.osc.push(byte);
                None
            }
        }
    }

    fn finish_osc(&mut self) -> Option<Event> {
        self.drop_raw();
        if self.osc_overflow {
            self.osc_overflow = false;
            return None;
        }
        let payload = std::mem::take(&mut self.osc);

        // OSC 52: `52 ; <selection> ; <base64>` — clipboard data.
        let rest = payload.strip_prefix(b"52;")?;
        let sep = rest.iter().position(|&b| b == b';')?;
        let (selection, data) = rest.split_at(sep);
        if !selection.contains(&b'c') {
            return None;
        }
        let decoded = BASE64.decode(&data[1..]).ok()?;
        Some(Event::Clipboard(ClipboardEvent {
            content: String::from_utf8_lossy(&decoded).into_owned(),
        }))
    }

    fn on_dcs(&mut self, byte: u8) -> Option<Event> {
        if self.string_esc {
            self.string_esc = false;
            if byte == b'\\' {
                self.state = State::Idle;
                self.drop_raw();
                return None;
            }
            self.state = State::Escape;
            self.drop_raw();
            self.push_raw(0x1B);
            self.push_raw(byte);
            return self.on_escape(byte);
        }
        if byte == 0x1B {
            self.string_esc = true;
        }
        None
    }

    // ── Bracketed paste ──────────────────────────────────────────────────

    fn on_paste(&mut self, byte: u8) -> Option<Event> {
        self.drop_raw();
        if self.paste.len() < PASTE_CAP {
            self.paste.push(byte);
            if self.paste.ends_with(PASTE_END) {
                let content_len = self.paste.len() - PASTE_END.len();
                return Some(self.finish_paste(content_len));
            }
            return None;
        }

        // Content cap reached: stop storing, keep a terminator window.
        if self.paste_tail.len() == PASTE_END.len() {
            self.paste_tail.remove(0);
        }
        self.paste_tail.push(byte);

        // The terminator may straddle the stored content and the tail.
        let tail_len = self.paste_tail.len();
        let from_paste = PASTE_END.len() - tail_len;
        let mut window = [0u8; 6];
        window[..from_paste].copy_from_slice(&self.paste[self.paste.len() - from_paste..]);
        window[from_paste..].copy_from_slice(&self.paste_tail);
        if window == PASTE_END {
            let content_len = self.paste.len() - from_paste;
            return Some(self.finish_paste(content_len));
        }
        None
    }

    fn finish_paste(&mut self, content_len: usize) -> Event {
        self.state = State::Idle;
        let content = String::from_utf8_lossy(&self.paste[..content_len]).into_owned();
        self.paste.clear();
        self.paste.shrink_to_fit();
        self.paste_tail.clear();
        Event::Paste(PasteEvent { content })
    }
}

/// Map a Kitty key scalar to a key code.
fn kitty_scalar_to_code(scalar: u32) -> Option<KeyCode> {
    match scalar {
        9 => Some(KeyCode::Tab),
        13 => Some(KeyCode::Enter),
        27 => Some(KeyCode::Escape),
        8 | 127 => Some(KeyCode::Backspace),
        // Legacy CSI-letter codes packed as integers: ESC [ A..D.
        0x1B_5B_41 => Some(KeyCode::Up),
        0x1B_5B_42 => Some(KeyCode::Down),
        0x1B_5B_43 => Some(KeyCode::Right),
        0x1B_5B_44 => Some(KeyCode::Left),
        // Modifier and lock keys.
        57_441 | 57_442 => Some(KeyCode::Shift),
        57_443 | 57_444 => Some(KeyCode::Control),
        57_445 | 57_446 => Some(KeyCode::Alt),
        57_447 | 57_448 => Some(KeyCode::Meta),
        57_449 => Some(KeyCode::CapsLock),
        57_450 => Some(KeyCode::NumLock),
        57_451 => Some(KeyCode::ScrollLock),
        // Remaining private-use scalars are not part of the vocabulary.
        57_344..=63_743 => None,
        s if s >= 32 => char::from_u32(s).map(KeyCode::Char),
        _ => None,
    }
}

/// Shadow-array slot for a modifier key code.
const fn shadow_slot(code: KeyCode) -> Option<usize> {
    match code {
        KeyCode::Shift => Some(0),
        KeyCode::Alt => Some(1),
        KeyCode::Control => Some(2),
        KeyCode::Meta => Some(3),
        _ => None,
    }
}

/// Button identity for a press/release code's low bits.
const fn pressed_button(code: u32) -> Option<MouseButton> {
    match code & 3 {
        0 => Some(MouseButton::Left),
        1 => Some(MouseButton::Middle),
        2 => Some(MouseButton::Right),
        _ => None,
    }
}

const fn clamp_u16(v: u32) -> u16 {
    if v > u16::MAX as u32 {
        u16::MAX
    } else {
        v as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> Decoder {
        Decoder::default()
    }

    fn kitty_decoder() -> Decoder {
        Decoder::new(DecoderOptions {
            kitty_keyboard: true,
            ..DecoderOptions::default()
        })
    }

    fn drain(decoder: &mut Decoder) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = decoder.next() {
            events.push(event);
        }
        events
    }

    fn feed_all(decoder: &mut Decoder, bytes: &[u8]) -> Vec<Event> {
        decoder.feed(bytes);
        drain(decoder)
    }

    fn key(event: &Event) -> &KeyEvent {
        match event {
            Event::Key(k) => k,
            other => panic!("expected key event, got {other:?}"),
        }
    }

    fn mouse(event: &Event) -> &MouseEvent {
        match event {
            Event::Mouse(m) => m,
            other => panic!("expected mouse event, got {other:?}"),
        }
    }

    // ── Plain text ───────────────────────────────────────────────────────

    #[test]
    fn ascii_characters() {
        let mut d = decoder();
        let events = feed_all(&mut d, b"abc");
        assert_eq!(events.len(), 3);
        assert_eq!(key(&events[0]).code, KeyCode::Char('a'));
        assert_eq!(key(&events[1]).code, KeyCode::Char('b'));
        assert_eq!(key(&events[2]).code, KeyCode::Char('c'));
        assert_eq!(key(&events[0]).raw, "a");
    }

    #[test]
    fn utf8_characters() {
        let mut d = decoder();
        let events = feed_all(&mut d, "é日🔥".as_bytes());
        assert_eq!(events.len(), 3);
        assert_eq!(key(&events[0]).code, KeyCode::Char('é'));
        assert_eq!(key(&events[1]).code, KeyCode::Char('日'));
        assert_eq!(key(&events[2]).code, KeyCode::Char('🔥'));
        assert_eq!(key(&events[2]).raw, "🔥");
    }

    #[test]
    fn broken_utf8_recovers() {
        let mut d = decoder();
        // Lead byte for a 2-byte sequence followed by ASCII.
        let events = feed_all(&mut d, &[0xC3, b'x']);
        assert_eq!(events.len(), 2);
        assert_eq!(key(&events[0]).code, KeyCode::Char(char::REPLACEMENT_CHARACTER));
        assert_eq!(key(&events[1]).code, KeyCode::Char('x'));
    }

    #[test]
    fn control_characters() {
        let mut d = decoder();
        let events = feed_all(&mut d, &[0x01, 0x0D, 0x09, 0x7F, 0x08, 0x00]);
        assert_eq!(key(&events[0]).code, KeyCode::Char('a'));
        assert!(key(&events[0]).ctrl());
        assert_eq!(key(&events[1]).code, KeyCode::Enter);
        assert_eq!(key(&events[2]).code, KeyCode::Tab);
        assert_eq!(key(&events[3]).code, KeyCode::Backspace);
        assert_eq!(key(&events[4]).code, KeyCode::Backspace);
        assert_eq!(key(&events[5]).code, KeyCode::Char(' '));
        assert!(key(&events[5]).ctrl());
    }

    #[test]
    fn high_c0_controls() {
        let mut d = decoder();
        let events = feed_all(&mut d, &[0x1C, 0x1F]);
        assert_eq!(key(&events[0]).code, KeyCode::Char('\\'));
        assert!(key(&events[0]).ctrl());
        assert_eq!(key(&events[1]).code, KeyCode::Char('_'));
    }

    // ── Escape prefix ────────────────────────────────────────────────────

    #[test]
    fn alt_letter() {
        let mut d = decoder();
        let events = feed_all(&mut d, b"\x1ba");
        assert_eq!(events.len(), 1);
        assert_eq!(key(&events[0]).code, KeyCode::Char('a'));
        assert!(key(&events[0]).alt());
        assert_eq!(key(&events[0]).raw, "\u{1b}a");
    }

    #[test]
    fn double_escape_is_alt_escape() {
        let mut d = decoder();
        let events = feed_all(&mut d, b"\x1b\x1b");
        assert_eq!(events.len(), 1);
        assert_eq!(key(&events[0]).code, KeyCode::Escape);
        assert!(key(&events[0]).alt());

        // And the machine is back in a clean state.
        let events = feed_all(&mut d, b"z");
        assert_eq!(key(&events[0]).code, KeyCode::Char('z'));
        assert!(key(&events[0]).modifiers.is_empty());
    }

    #[test]
    fn escape_then_control_byte_is_silent_by_default() {
        let mut d = decoder();
        let events = feed_all(&mut d, &[0x1B, 0x02, b'q']);
        assert_eq!(events.len(), 1);
        assert_eq!(key(&events[0]).code, KeyCode::Char('q'));
    }

    #[test]
    fn escape_then_control_byte_is_diagnosed_in_debug() {
        let mut d = Decoder::new(DecoderOptions {
            debug_unknown: true,
            ..DecoderOptions::default()
        });
        let events = feed_all(&mut d, &[0x1B, 0x02]);
        assert_eq!(events.len(), 1);
        assert_eq!(key(&events[0]).code, KeyCode::Unknown);
        assert!(!key(&events[0]).raw.is_empty());
    }

    // ── CSI keys ─────────────────────────────────────────────────────────

    #[test]
    fn arrow_keys() {
        let mut d = decoder();
        assert_eq!(key(&feed_all(&mut d, b"\x1b[A")[0]).code, KeyCode::Up);
        assert_eq!(key(&feed_all(&mut d, b"\x1b[B")[0]).code, KeyCode::Down);
        assert_eq!(key(&feed_all(&mut d, b"\x1b[C")[0]).code, KeyCode::Right);
        assert_eq!(key(&feed_all(&mut d, b"\x1b[D")[0]).code, KeyCode::Left);
    }

    #[test]
    fn arrow_raw_preserved() {
        let mut d = decoder();
        let events = feed_all(&mut d, b"\x1b[A");
        assert_eq!(key(&events[0]).raw, "\u{1b}[A");
    }

    #[test]
    fn home_end_backtab() {
        let mut d = decoder();
        assert_eq!(key(&feed_all(&mut d, b"\x1b[H")[0]).code, KeyCode::Home);
        assert_eq!(key(&feed_all(&mut d, b"\x1b[F")[0]).code, KeyCode::End);
        assert_eq!(key(&feed_all(&mut d, b"\x1b[Z")[0]).code, KeyCode::BackTab);
    }

    #[test]
    fn csi_modifier_parameters() {
        let mut d = decoder();
        let events = feed_all(&mut d, b"\x1b[1;2A");
        assert_eq!(key(&events[0]).code, KeyCode::Up);
        assert!(key(&events[0]).shift());

        let events = feed_all(&mut d, b"\x1b[1;5C");
        assert_eq!(key(&events[0]).code, KeyCode::Right);
        assert!(key(&events[0]).ctrl());

        let events = feed_all(&mut d, b"\x1b[1;9D");
        assert!(key(&events[0]).modifiers.contains(Modifiers::META));
    }

    #[test]
    fn csi_event_type_third_parameter() {
        let mut d = decoder();
        let events = feed_all(&mut d, b"\x1b[1;1;3A");
        assert_eq!(key(&events[0]).kind, KeyEventKind::Release);

        let events = feed_all(&mut d, b"\x1b[1;1:2B");
        assert_eq!(key(&events[0]).kind, KeyEventKind::Repeat);
        assert!(key(&events[0]).repeat);
    }

    #[test]
    fn tilde_navigation_keys() {
        let mut d = decoder();
        let cases: &[(&[u8], KeyCode)] = &[
            (b"\x1b[1~", KeyCode::Home),
            (b"\x1b[2~", KeyCode::Insert),
            (b"\x1b[3~", KeyCode::Delete),
            (b"\x1b[4~", KeyCode::End),
            (b"\x1b[5~", KeyCode::PageUp),
            (b"\x1b[6~", KeyCode::PageDown),
            (b"\x1b[15~", KeyCode::F(5)),
            (b"\x1b[17~", KeyCode::F(6)),
            (b"\x1b[24~", KeyCode::F(12)),
        ];
        for (bytes, code) in cases {
            let events = feed_all(&mut d, bytes);
            assert_eq!(key(&events[0]).code, *code, "{bytes:?}");
        }
    }

    #[test]
    fn tilde_with_modifiers() {
        let mut d = decoder();
        let events = feed_all(&mut d, b"\x1b[3;5~");
        assert_eq!(key(&events[0]).code, KeyCode::Delete);
        assert!(key(&events[0]).ctrl());
    }

    #[test]
    fn ss3_keys() {
        let mut d = decoder();
        assert_eq!(key(&feed_all(&mut d, b"\x1bOP")[0]).code, KeyCode::F(1));
        assert_eq!(key(&feed_all(&mut d, b"\x1bOS")[0]).code, KeyCode::F(4));
        assert_eq!(key(&feed_all(&mut d, b"\x1bOA")[0]).code, KeyCode::Up);
        assert_eq!(key(&feed_all(&mut d, b"\x1bOH")[0]).code, KeyCode::Home);
    }

    #[test]
    fn focus_events() {
        let mut d = decoder();
        assert_eq!(feed_all(&mut d, b"\x1b[I"), vec![Event::Focus(true)]);
        assert_eq!(feed_all(&mut d, b"\x1b[O"), vec![Event::Focus(false)]);
    }

    // ── Incomplete and malformed sequences ───────────────────────────────

    #[test]
    fn incomplete_csi_yields_nothing_then_completes() {
        let mut d = decoder();
        assert!(feed_all(&mut d, b"\x1b[").is_empty());
        let events = feed_all(&mut d, b"A");
        assert_eq!(events.len(), 1);
        assert_eq!(key(&events[0]).code, KeyCode::Up);
    }

    #[test]
    fn esc_inside_csi_restarts_cleanly() {
        let mut d = decoder();
        let events = feed_all(&mut d, b"\x1b[1;\x1b[B");
        assert_eq!(events.len(), 1);
        assert_eq!(key(&events[0]).code, KeyCode::Down);
    }

    #[test]
    fn malformed_csi_byte_resets_silently() {
        let mut d = decoder();
        let events = feed_all(&mut d, b"\x1b[1\x01x");
        // The partial sequence and the stray control byte are dropped;
        // 'x' survives.
        assert_eq!(events.len(), 1);
        assert_eq!(key(&events[0]).code, KeyCode::Char('x'));
    }

    #[test]
    fn unknown_final_is_silent_without_debug() {
        let mut d = decoder();
        let events = feed_all(&mut d, b"\x1b[5q after");
        assert_eq!(key(&events[0]).code, KeyCode::Char(' '));
        assert_eq!(events.len(), " after".len());
    }

    #[test]
    fn parameter_count_is_capped() {
        let mut d = decoder();
        let mut seq = b"\x1b[".to_vec();
        for _ in 0..50 {
            seq.extend_from_slice(b"1;");
        }
        seq.push(b'A');
        let events = feed_all(&mut d, &seq);
        // Still decodes (params silently capped at 16).
        assert_eq!(events.len(), 1);
        assert_eq!(key(&events[0]).code, KeyCode::Up);
    }

    #[test]
    fn parameter_value_is_capped() {
        let mut d = decoder();
        let events = feed_all(&mut d, b"\x1b[99999999999999;2A");
        assert_eq!(events.len(), 1);
        assert!(key(&events[0]).shift());
    }

    // ── Kitty keyboard ───────────────────────────────────────────────────

    #[test]
    fn kitty_suppresses_plain_byte_and_reports_press() {
        let mut d = kitty_decoder();
        let events = feed_all(
            &mut d,
            &[0x61, 0x1B, 0x5B, 0x39, 0x37, 0x3B, 0x31, 0x3A, 0x31, 0x75],
        );
        assert_eq!(events.len(), 1, "{events:?}");
        let k = key(&events[0]);
        assert_eq!(k.code, KeyCode::Char('a'));
        assert_eq!(k.kind, KeyEventKind::Press);
        assert!(!k.repeat);
        assert!(k.modifiers.is_empty());
    }

    #[test]
    fn kitty_release_event() {
        let mut d = kitty_decoder();
        let events = feed_all(
            &mut d,
            &[0x61, 0x1B, 0x5B, 0x39, 0x37, 0x3B, 0x31, 0x3A, 0x33, 0x75],
        );
        assert_eq!(events.len(), 1);
        assert_eq!(key(&events[0]).kind, KeyEventKind::Release);
    }

    #[test]
    fn kitty_modifiers_and_repeat() {
        let mut d = kitty_decoder();
        let events = feed_all(&mut d, b"\x1b[97;5:2u");
        let k = key(&events[0]);
        assert_eq!(k.code, KeyCode::Char('a'));
        assert!(k.ctrl());
        assert_eq!(k.kind, KeyEventKind::Repeat);
        assert!(k.repeat);
    }

    #[test]
    fn kitty_defaults_when_tails_omitted() {
        let mut d = kitty_decoder();
        let events = feed_all(&mut d, b"\x1b[97u");
        let k = key(&events[0]);
        assert_eq!(k.code, KeyCode::Char('a'));
        assert!(k.modifiers.is_empty());
        assert_eq!(k.kind, KeyEventKind::Press);
    }

    #[test]
    fn kitty_special_scalars() {
        let mut d = kitty_decoder();
        assert_eq!(key(&feed_all(&mut d, b"\x1b[13u")[0]).code, KeyCode::Enter);
        assert_eq!(key(&feed_all(&mut d, b"\x1b[27u")[0]).code, KeyCode::Escape);
        assert_eq!(key(&feed_all(&mut d, b"\x1b[9u")[0]).code, KeyCode::Tab);
        assert_eq!(
            key(&feed_all(&mut d, b"\x1b[127u")[0]).code,
            KeyCode::Backspace
        );
        assert_eq!(
            key(&feed_all(&mut d, b"\x1b[1792833u")[0]).code,
            KeyCode::Up
        );
    }

    #[test]
    fn kitty_modifier_keys_decode_without_self_bit() {
        let mut d = kitty_decoder();
        // Shift press: reported modifier mask asserts shift (2), but the
        // event must not carry the key's own bit.
        let events = feed_all(&mut d, b"\x1b[57441;2u");
        let k = key(&events[0]);
        assert_eq!(k.code, KeyCode::Shift);
        assert!(k.modifiers.is_empty());
    }

    #[test]
    fn kitty_lock_keys() {
        let mut d = kitty_decoder();
        assert_eq!(
            key(&feed_all(&mut d, b"\x1b[57449u")[0]).code,
            KeyCode::CapsLock
        );
        assert_eq!(
            key(&feed_all(&mut d, b"\x1b[57450u")[0]).code,
            KeyCode::NumLock
        );
        assert_eq!(
            key(&feed_all(&mut d, b"\x1b[57451u")[0]).code,
            KeyCode::ScrollLock
        );
    }

    #[test]
    fn kitty_unassigned_private_scalars_are_dropped() {
        let mut d = kitty_decoder();
        assert!(feed_all(&mut d, b"\x1b[57400u").is_empty());
        // Machine still healthy.
        assert_eq!(key(&feed_all(&mut d, b"\x1b[13u")[0]).code, KeyCode::Enter);
    }

    #[test]
    fn stuck_modifier_is_cleared_after_release() {
        let mut d = Decoder::new(DecoderOptions {
            kitty_keyboard: true,
            quirks: true,
            terminal: TerminalKind::ITerm,
            ..DecoderOptions::default()
        });
        // Control press (upstream numbering 57442 remaps to Control).
        feed_all(&mut d, b"\x1b[57442;5u");
        // Key with ctrl held: kept.
        let events = feed_all(&mut d, b"\x1b[97;5u");
        assert!(key(&events[0]).ctrl());
        // Control release.
        feed_all(&mut d, b"\x1b[57442;5:3u");
        // Buggy terminal still asserts ctrl on the next key: cleared.
        let events = feed_all(&mut d, b"\x1b[98;5u");
        assert!(!key(&events[0]).ctrl());
    }

    #[test]
    fn shadow_does_not_clear_before_any_observation() {
        let mut d = Decoder::new(DecoderOptions {
            kitty_keyboard: true,
            quirks: true,
            terminal: TerminalKind::ITerm,
            ..DecoderOptions::default()
        });
        // No modifier reports seen yet: asserted modifiers are trusted.
        let events = feed_all(&mut d, b"\x1b[97;5u");
        assert!(key(&events[0]).ctrl());
    }

    // ── SGR mouse ────────────────────────────────────────────────────────

    #[test]
    fn sgr_mouse_click() {
        let mut d = decoder();
        let events = feed_all(&mut d, b"\x1b[<0;10;5M");
        let m = mouse(&events[0]);
        assert_eq!(m.kind, MouseEventKind::Down);
        assert_eq!(m.button, Some(MouseButton::Left));
        assert_eq!((m.x, m.y), (10, 5));
        assert!(m.modifiers.is_empty());
        assert_eq!(m.raw, "\u{1b}[<0;10;5M");
    }

    #[test]
    fn sgr_mouse_release() {
        let mut d = decoder();
        feed_all(&mut d, b"\x1b[<0;10;5M");
        let events = feed_all(&mut d, b"\x1b[<0;10;5m");
        let m = mouse(&events[0]);
        assert_eq!(m.kind, MouseEventKind::Up);
        assert_eq!(m.button, Some(MouseButton::Left));
    }

    #[test]
    fn sgr_mouse_buttons() {
        let mut d = decoder();
        assert_eq!(
            mouse(&feed_all(&mut d, b"\x1b[<1;1;1M")[0]).button,
            Some(MouseButton::Middle)
        );
        assert_eq!(
            mouse(&feed_all(&mut d, b"\x1b[<2;1;1M")[0]).button,
            Some(MouseButton::Right)
        );
    }

    #[test]
    fn sgr_mouse_wheel() {
        let mut d = decoder();
        let cases: &[(&[u8], MouseButton)] = &[
            (b"\x1b[<64;5;5M", MouseButton::WheelUp),
            (b"\x1b[<65;5;5M", MouseButton::WheelDown),
            (b"\x1b[<66;5;5M", MouseButton::WheelLeft),
            (b"\x1b[<67;5;5M", MouseButton::WheelRight),
        ];
        for (bytes, button) in cases {
            let events = feed_all(&mut d, bytes);
            let m = mouse(&events[0]);
            assert_eq!(m.kind, MouseEventKind::Scroll, "{bytes:?}");
            assert_eq!(m.button, Some(*button), "{bytes:?}");
        }
    }

    #[test]
    fn sgr_mouse_drag_requires_latched_button() {
        let mut d = decoder();
        // Motion without a prior press: move.
        let events = feed_all(&mut d, b"\x1b[<35;3;3M");
        assert_eq!(mouse(&events[0]).kind, MouseEventKind::Move);
        assert_eq!(mouse(&events[0]).button, None);

        // Press, then motion: drag with the latched button.
        feed_all(&mut d, b"\x1b[<0;3;3M");
        let events = feed_all(&mut d, b"\x1b[<32;4;3M");
        assert_eq!(mouse(&events[0]).kind, MouseEventKind::Drag);
        assert_eq!(mouse(&events[0]).button, Some(MouseButton::Left));

        // Release clears the latch.
        feed_all(&mut d, b"\x1b[<0;4;3m");
        let events = feed_all(&mut d, b"\x1b[<35;5;3M");
        assert_eq!(mouse(&events[0]).kind, MouseEventKind::Move);
    }

    #[test]
    fn sgr_mouse_modifier_bits() {
        let mut d = decoder();
        let events = feed_all(&mut d, b"\x1b[<28;2;2M");
        let m = mouse(&events[0]);
        // 28 = shift(4) + alt(8) + ctrl(16), button bits 0.
        assert!(m.modifiers.contains(Modifiers::SHIFT));
        assert!(m.modifiers.contains(Modifiers::ALT));
        assert!(m.modifiers.contains(Modifiers::CTRL));
    }

    #[test]
    fn sgr_mouse_with_missing_params_is_dropped() {
        let mut d = decoder();
        assert!(feed_all(&mut d, b"\x1b[<0;10M").is_empty());
        // Machine recovers.
        assert_eq!(
            mouse(&feed_all(&mut d, b"\x1b[<0;1;1M")[0]).kind,
            MouseEventKind::Down
        );
    }

    // ── X10 mouse ────────────────────────────────────────────────────────

    #[test]
    fn x10_mouse_click() {
        let mut d = decoder();
        // button 0, x 10, y 5 — each offset by 32.
        let events = feed_all(&mut d, &[0x1B, b'[', b'M', 32, 42, 37]);
        let m = mouse(&events[0]);
        assert_eq!(m.kind, MouseEventKind::Down);
        assert_eq!(m.button, Some(MouseButton::Left));
        assert_eq!((m.x, m.y), (10, 5));
    }

    #[test]
    fn x10_mouse_release() {
        let mut d = decoder();
        feed_all(&mut d, &[0x1B, b'[', b'M', 32, 42, 37]);
        let events = feed_all(&mut d, &[0x1B, b'[', b'M', 35, 42, 37]);
        let m = mouse(&events[0]);
        assert_eq!(m.kind, MouseEventKind::Up);
        assert_eq!(m.button, None);
    }

    #[test]
    fn x10_mouse_wheel() {
        let mut d = decoder();
        let events = feed_all(&mut d, &[0x1B, b'[', b'M', 32 + 64, 33, 33]);
        assert_eq!(mouse(&events[0]).kind, MouseEventKind::Scroll);
        assert_eq!(mouse(&events[0]).button, Some(MouseButton::WheelUp));
    }

    #[test]
    fn x10_bytes_below_offset_are_discarded() {
        let mut d = decoder();
        let events = feed_all(&mut d, &[0x1B, b'[', b'M', 10, 42, 37]);
        assert!(events.is_empty());
        // Subsequent input decodes normally.
        let events = feed_all(&mut d, b"x");
        assert_eq!(key(&events[0]).code, KeyCode::Char('x'));
    }

    #[test]
    fn x10_large_coordinates_pass_through() {
        let mut d = decoder();
        let events = feed_all(&mut d, &[0x1B, b'[', b'M', 32, 255, 255]);
        let m = mouse(&events[0]);
        assert_eq!((m.x, m.y), (223, 223));
    }

    // ── Bracketed paste ──────────────────────────────────────────────────

    #[test]
    fn bracketed_paste_round_trip() {
        let mut d = decoder();
        let events = feed_all(&mut d, b"\x1b[200~hello world\x1b[201~");
        assert_eq!(
            events,
            vec![Event::Paste(PasteEvent {
                content: "hello world".into()
            })]
        );
    }

    #[test]
    fn paste_swallows_escape_sequences() {
        let mut d = decoder();
        let events = feed_all(&mut d, b"\x1b[200~key: \x1b[A up\x1b[201~");
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Paste(p) => assert_eq!(p.content, "key: \u{1b}[A up"),
            other => panic!("expected paste, got {other:?}"),
        }
    }

    #[test]
    fn paste_split_across_feeds() {
        let mut d = decoder();
        d.feed(b"\x1b[200~hel");
        d.feed(b"lo\x1b[2");
        d.feed(b"01~");
        let events = drain(&mut d);
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Paste(p) => assert_eq!(p.content, "hello"),
            other => panic!("expected paste, got {other:?}"),
        }
    }

    #[test]
    fn oversized_paste_still_terminates() {
        let mut d = decoder();
        d.feed(b"\x1b[200~");
        let blob = vec![b'x'; PASTE_CAP + 100];
        d.feed(&blob);
        d.feed(PASTE_END);
        let events = drain(&mut d);
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Paste(p) => assert_eq!(p.content.len(), PASTE_CAP),
            other => panic!("expected paste, got {other:?}"),
        }
        // Machine is healthy afterwards.
        let events = feed_all(&mut d, b"k");
        assert_eq!(key(&events[0]).code, KeyCode::Char('k'));
    }

    #[test]
    fn empty_paste() {
        let mut d = decoder();
        let events = feed_all(&mut d, b"\x1b[200~\x1b[201~");
        assert_eq!(
            events,
            vec![Event::Paste(PasteEvent {
                content: String::new()
            })]
        );
    }

    // ── OSC ──────────────────────────────────────────────────────────────

    #[test]
    fn osc52_clipboard_bel_terminated() {
        let mut d = decoder();
        // "hello" in base64.
        let events = feed_all(&mut d, b"\x1b]52;c;aGVsbG8=\x07");
        assert_eq!(
            events,
            vec![Event::Clipboard(ClipboardEvent {
                content: "hello".into()
            })]
        );
    }

    #[test]
    fn osc52_clipboard_st_terminated() {
        let mut d = decoder();
        let events = feed_all(&mut d, b"\x1b]52;c;aGVsbG8=\x1b\\");
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::Clipboard(c) if c.content == "hello"));
    }

    #[test]
    fn osc52_non_clipboard_selection_ignored() {
        let mut d = decoder();
        assert!(feed_all(&mut d, b"\x1b]52;p;aGVsbG8=\x07").is_empty());
    }

    #[test]
    fn osc52_invalid_base64_ignored() {
        let mut d = decoder();
        assert!(feed_all(&mut d, b"\x1b]52;c;!!!\x07").is_empty());
        // Machine still decodes afterwards.
        let events = feed_all(&mut d, b"a");
        assert_eq!(key(&events[0]).code, KeyCode::Char('a'));
    }

    #[test]
    fn other_osc_sequences_are_consumed_silently() {
        let mut d = decoder();
        assert!(feed_all(&mut d, b"\x1b]0;window title\x07").is_empty());
        assert!(feed_all(&mut d, b"\x1b]8;;http://x\x1b\\").is_empty());
    }

    #[test]
    fn oversized_osc_is_abandoned() {
        let mut d = decoder();
        let mut seq = b"\x1b]52;c;".to_vec();
        seq.extend(std::iter::repeat_n(b'A', OSC_CAP + 500));
        seq.push(0x07);
        assert!(feed_all(&mut d, &seq).is_empty());
        // Recovery check.
        let events = feed_all(&mut d, b"\x1b[A");
        assert_eq!(key(&events[0]).code, KeyCode::Up);
    }

    // ── DCS ──────────────────────────────────────────────────────────────

    #[test]
    fn dcs_is_consumed_without_events() {
        let mut d = decoder();
        assert!(feed_all(&mut d, b"\x1bP1$r0m\x1b\\").is_empty());
        let events = feed_all(&mut d, b"x");
        assert_eq!(key(&events[0]).code, KeyCode::Char('x'));
    }

    // ── Queue operations ─────────────────────────────────────────────────

    #[test]
    fn clear_drops_events_but_not_partial_state() {
        let mut d = decoder();
        d.feed(b"ab\x1b[1;");
        assert!(d.has_events());
        d.clear();
        assert!(!d.has_events());
        // The partial CSI still completes.
        d.feed(b"2A");
        let events = drain(&mut d);
        assert_eq!(events.len(), 1);
        assert_eq!(key(&events[0]).code, KeyCode::Up);
        assert!(key(&events[0]).shift());
    }

    #[test]
    fn events_pop_in_arrival_order() {
        let mut d = decoder();
        d.feed(b"ab");
        assert!(d.has_events());
        assert!(matches!(d.next(), Some(Event::Key(k)) if k.code == KeyCode::Char('a')));
        assert!(matches!(d.next(), Some(Event::Key(k)) if k.code == KeyCode::Char('b')));
        assert!(d.next().is_none());
        assert!(!d.has_events());
    }

    // ── Chunking invariance ──────────────────────────────────────────────

    #[test]
    fn byte_at_a_time_equals_single_chunk() {
        let stream: &[u8] =
            b"hi\x1b[A\x1b[<0;3;4M\x1b[200~paste!\x1b[201~\x1b[97;5u\x1bOQ\x1b]52;c;eg==\x07\xC3\xA9";

        let mut whole = decoder();
        let whole_events = feed_all(&mut whole, stream);

        let mut split = decoder();
        for &byte in stream {
            split.feed(&[byte]);
        }
        let split_events = drain(&mut split);

        assert_eq!(whole_events, split_events);
        assert!(!whole_events.is_empty());
    }

    #[test]
    fn noise_never_wedges_the_machine() {
        let mut d = decoder();
        let noise: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        d.feed(&noise);
        drain(&mut d);

        d.feed(b"\x1b[B");
        let events = drain(&mut d);
        assert!(
            events
                .iter()
                .any(|e| matches!(e, Event::Key(k) if k.code == KeyCode::Down))
        );
    }
}
