#![forbid(unsafe_code)]

//! Terminal identity detection and the feature-support matrix.
//!
//! Detection is a pure function of an [`EnvSnapshot`], so tests never have
//! to mutate the process environment. The live path is
//! `Capabilities::detect()`, which snapshots the real environment first.
//!
//! # Detection Priority
//!
//! 1. `TERM_PROGRAM` names a known terminal.
//! 2. `TERM` contains a known terminal substring.
//! 3. `TMUX` is set.
//! 4. `SSH_CONNECTION` is set.
//! 5. Otherwise the terminal is [`TerminalKind::Unknown`].
//!
//! The multiplexer/remote markers also apply *downgrades* on top of the
//! seeded matrix: SSH demotes clipboard to partial and focus events to
//! none; tmux demotes the Kitty keyboard protocol and focus events to
//! none. A Kitty terminal reached over SSH keeps its identity but loses
//! what the transport cannot carry.

use std::env;

/// Detected terminal family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalKind {
    /// Kitty.
    Kitty,
    /// Ghostty.
    Ghostty,
    /// iTerm2.
    ITerm,
    /// Inside a tmux server (and no more specific identity).
    Tmux,
    /// A plain SSH session with no other identity.
    Ssh,
    /// Anything else.
    Unknown,
}

impl TerminalKind {
    /// Human-readable name, used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Kitty => "kitty",
            Self::Ghostty => "ghostty",
            Self::ITerm => "iterm",
            Self::Tmux => "tmux",
            Self::Ssh => "ssh",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TerminalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A feature the controller can enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Mouse press/motion/wheel reporting.
    MouseTracking,
    /// The Kitty keyboard protocol.
    KittyKeyboard,
    /// Bracketed paste delimiters.
    BracketedPaste,
    /// Focus in/out reporting.
    FocusEvents,
    /// OSC 52 clipboard access.
    Clipboard,
}

impl Feature {
    /// Every feature, in matrix order.
    pub const ALL: [Self; 5] = [
        Self::MouseTracking,
        Self::KittyKeyboard,
        Self::BracketedPaste,
        Self::FocusEvents,
        Self::Clipboard,
    ];

    /// Human-readable name, used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MouseTracking => "mouse-tracking",
            Self::KittyKeyboard => "kitty-keyboard",
            Self::BracketedPaste => "bracketed-paste",
            Self::FocusEvents => "focus-events",
            Self::Clipboard => "clipboard",
        }
    }

    #[inline]
    const fn index(self) -> usize {
        match self {
            Self::MouseTracking => 0,
            Self::KittyKeyboard => 1,
            Self::BracketedPaste => 2,
            Self::FocusEvents => 3,
            Self::Clipboard => 4,
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How well a terminal supports a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Support {
    /// Works as specified.
    Full,
    /// Works with caveats (e.g. clipboard through a multiplexer).
    Partial,
    /// Absent.
    #[default]
    None,
}

impl Support {
    /// Whether the feature is usable at all.
    #[must_use]
    pub const fn is_available(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// A snapshot of the environment variables detection consumes.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    /// `TERM`.
    pub term: String,
    /// `TERM_PROGRAM`.
    pub term_program: String,
    /// `TERM_PROGRAM_VERSION`.
    pub term_program_version: String,
    /// Whether `SSH_CONNECTION` is set and non-empty.
    pub ssh: bool,
    /// Whether `TMUX` is set and non-empty.
    pub tmux: bool,
}

impl EnvSnapshot {
    /// Snapshot the live process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let non_empty = |key: &str| env::var(key).is_ok_and(|v| !v.is_empty());
        Self {
            term: env::var("TERM").unwrap_or_default(),
            term_program: env::var("TERM_PROGRAM").unwrap_or_default(),
            term_program_version: env::var("TERM_PROGRAM_VERSION").unwrap_or_default(),
            ssh: non_empty("SSH_CONNECTION"),
            tmux: non_empty("TMUX"),
        }
    }
}

/// The capability record for one terminal session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Detected terminal family.
    pub terminal: TerminalKind,
    /// Version reported by `TERM_PROGRAM_VERSION`, when present.
    pub version: Option<String>,
    /// Whether the session runs over SSH.
    pub is_ssh: bool,
    /// Whether the session runs inside tmux.
    pub is_tmux: bool,
    features: [Support; Feature::ALL.len()],
}

/// Seed support matrix, one row per terminal.
const fn seed_matrix(kind: TerminalKind) -> [Support; 5] {
    use Support::{Full, None as No, Partial};
    match kind {
        // mouse, kitty-kb, paste, focus, clipboard
        TerminalKind::Kitty | TerminalKind::Ghostty => [Full, Full, Full, Full, Full],
        TerminalKind::ITerm => [Partial, No, Full, Full, Full],
        TerminalKind::Tmux => [Partial, No, Full, No, Partial],
        TerminalKind::Ssh => [Partial, No, Partial, No, No],
        TerminalKind::Unknown => [No, No, No, No, No],
    }
}

impl Capabilities {
    /// Detect from the live environment.
    #[must_use]
    pub fn detect() -> Self {
        Self::detect_from(&EnvSnapshot::from_env())
    }

    /// Detect from a snapshot (pure, deterministic).
    #[must_use]
    pub fn detect_from(snapshot: &EnvSnapshot) -> Self {
        let terminal = detect_terminal(snapshot);
        let mut features = seed_matrix(terminal);

        if snapshot.ssh {
            // The transport drops focus reporting and makes OSC 52 a
            // best-effort write.
            if features[Feature::Clipboard.index()] == Support::Full {
                features[Feature::Clipboard.index()] = Support::Partial;
            }
            features[Feature::FocusEvents.index()] = Support::None;
        }
        if snapshot.tmux {
            features[Feature::KittyKeyboard.index()] = Support::None;
            features[Feature::FocusEvents.index()] = Support::None;
        }

        let version = if snapshot.term_program_version.is_empty() {
            None
        } else {
            Some(snapshot.term_program_version.clone())
        };

        Self {
            terminal,
            version,
            is_ssh: snapshot.ssh,
            is_tmux: snapshot.tmux,
            features,
        }
    }

    /// A record with every feature at a fixed support level, for tests and
    /// hosts that bypass detection.
    #[must_use]
    pub fn uniform(terminal: TerminalKind, support: Support) -> Self {
        Self {
            terminal,
            version: None,
            is_ssh: false,
            is_tmux: false,
            features: [support; Feature::ALL.len()],
        }
    }

    /// Support level for one feature.
    #[must_use]
    pub fn supports(&self, feature: Feature) -> Support {
        self.features[feature.index()]
    }

    /// Override one feature's support level.
    pub fn set_support(&mut self, feature: Feature, support: Support) {
        self.features[feature.index()] = support;
    }
}

fn detect_terminal(snapshot: &EnvSnapshot) -> TerminalKind {
    let program = snapshot.term_program.to_ascii_lowercase();
    if program.contains("iterm") {
        return TerminalKind::ITerm;
    }
    if program.contains("ghostty") {
        return TerminalKind::Ghostty;
    }
    if program.contains("kitty") {
        return TerminalKind::Kitty;
    }
    if program.contains("tmux") {
        return TerminalKind::Tmux;
    }

    let term = snapshot.term.to_ascii_lowercase();
    if term.contains("kitty") {
        return TerminalKind::Kitty;
    }
    if term.contains("ghostty") {
        return TerminalKind::Ghostty;
    }

    if snapshot.tmux {
        return TerminalKind::Tmux;
    }
    if snapshot.ssh {
        return TerminalKind::Ssh;
    }
    TerminalKind::Unknown
}

/// Explicitly-invalidated capability cache.
///
/// Detection is cheap but not free, and its answer is stable for a
/// session; the controller owns one of these and hands out the cached
/// record. Hosts wanting process-wide sharing construct one and pass it
/// around — there is no global.
#[derive(Debug, Default)]
pub struct CapabilityCache {
    cached: Option<Capabilities>,
}

impl CapabilityCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached record, detecting from the live environment on first use.
    pub fn get_or_detect(&mut self) -> &Capabilities {
        self.cached.get_or_insert_with(Capabilities::detect)
    }

    /// The cached record, detecting from `snapshot` on first use.
    pub fn get_or_detect_from(&mut self, snapshot: &EnvSnapshot) -> &Capabilities {
        self.cached
            .get_or_insert_with(|| Capabilities::detect_from(snapshot))
    }

    /// Replace the cached record.
    pub fn set(&mut self, caps: Capabilities) {
        self.cached = Some(caps);
    }

    /// Drop the cached record; the next read re-detects.
    pub fn clear_cache(&mut self) {
        self.cached = None;
    }
}

// ── Kitty keyboard probe ─────────────────────────────────────────────────

/// Query for Kitty keyboard protocol support: `CSI ? u`.
pub const KITTY_PROBE_QUERY: &[u8] = b"\x1b[?u";

/// Whether `bytes` is exactly a Kitty probe reply:
/// `ESC [ ? <digits> ; <digits> u`.
#[must_use]
pub fn is_kitty_probe_reply(bytes: &[u8]) -> bool {
    let Some(rest) = bytes.strip_prefix(b"\x1b[?") else {
        return false;
    };
    let Some(rest) = rest.strip_suffix(b"u") else {
        return false;
    };
    let mut fields = rest.split(|&b| b == b';');
    let (Some(first), Some(second), None) = (fields.next(), fields.next(), fields.next()) else {
        return false;
    };
    let all_digits = |f: &[u8]| !f.is_empty() && f.iter().all(u8::is_ascii_digit);
    all_digits(first) && all_digits(second)
}

/// Whether a read buffer contains a Kitty probe reply anywhere.
///
/// Probe responses can arrive interleaved with queued input; this scans
/// for the `ESC [ ?` introducer and checks each candidate.
#[must_use]
pub fn buffer_has_kitty_probe_reply(buf: &[u8]) -> bool {
    let mut start = 0;
    while let Some(at) = find_escape(&buf[start..]) {
        let candidate = &buf[start + at..];
        if let Some(end) = candidate.iter().position(|&b| b == b'u') {
            if is_kitty_probe_reply(&candidate[..=end]) {
                return true;
            }
        }
        start += at + 1;
    }
    false
}

fn find_escape(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == 0x1B)
}
