#![forbid(unsafe_code)]

//! Feature enable/disable control.
//!
//! The controller is the sole writer of terminal-mode escape sequences:
//! it takes the host's requested feature set, checks it against the
//! detected [`Capabilities`], writes the enable sequences into the byte
//! sink, and on reset replays the matching disable sequences in reverse
//! order. Reset is idempotent, so signal-triggered cleanup may race a
//! normal shutdown safely.
//!
//! | Feature           | Enable                        | Disable          |
//! |-------------------|-------------------------------|------------------|
//! | Mouse tracking    | `CSI ?1000h` `CSI ?1002h` (+ `?1003h`, `?1006h`) | reverse `l` forms |
//! | Kitty keyboard    | `CSI > flags u`               | `CSI < u`        |
//! | Bracketed paste   | `CSI ?2004h`                  | `CSI ?2004l`     |
//! | Focus events      | `CSI ?1004h`                  | `CSI ?1004l`     |
//! | Clipboard         | none (helper-only capability) | none             |
//!
//! The only error the controller raises is a `required` feature the
//! matrix reports unsupported; everything else is skipped silently.

use std::io::{self, Write};

use crate::capabilities::{Capabilities, CapabilityCache, Feature, TerminalKind};

// ── Escape sequences ─────────────────────────────────────────────────────

const ENABLE_MOUSE_TRACKING: &[u8] = b"\x1b[?1000h";
const DISABLE_MOUSE_TRACKING: &[u8] = b"\x1b[?1000l";
const ENABLE_MOUSE_BUTTONS: &[u8] = b"\x1b[?1002h";
const DISABLE_MOUSE_BUTTONS: &[u8] = b"\x1b[?1002l";
const ENABLE_MOUSE_ALL: &[u8] = b"\x1b[?1003h";
const DISABLE_MOUSE_ALL: &[u8] = b"\x1b[?1003l";
const ENABLE_SGR_MOUSE: &[u8] = b"\x1b[?1006h";
const DISABLE_SGR_MOUSE: &[u8] = b"\x1b[?1006l";
const ENABLE_BRACKETED_PASTE: &[u8] = b"\x1b[?2004h";
const DISABLE_BRACKETED_PASTE: &[u8] = b"\x1b[?2004l";
const ENABLE_FOCUS_EVENTS: &[u8] = b"\x1b[?1004h";
const DISABLE_FOCUS_EVENTS: &[u8] = b"\x1b[?1004l";
const KITTY_POP: &[u8] = b"\x1b[<u";

/// Kitty keyboard protocol progressive-enhancement flags.
pub mod kitty_flags {
    /// Disambiguate escape codes.
    pub const DISAMBIGUATE_ESCAPES: u8 = 1;
    /// Report press/repeat/release event types.
    pub const REPORT_EVENT_TYPES: u8 = 2;
    /// Report alternate key layouts.
    pub const REPORT_ALTERNATE_KEYS: u8 = 4;
    /// Report every key (modifiers included) as an escape code.
    pub const REPORT_ALL_KEYS_AS_ESCAPE_CODES: u8 = 8;
    /// Report associated text with key events.
    pub const REPORT_ASSOCIATED_TEXT: u8 = 16;

    /// The flag set pushed by default.
    pub const DEFAULT: u8 =
        DISAMBIGUATE_ESCAPES | REPORT_EVENT_TYPES | REPORT_ALL_KEYS_AS_ESCAPE_CODES;
}

/// The Kitty push sequence for a flag set: `CSI > flags u`.
#[must_use]
pub fn kitty_push(flags: u8) -> Vec<u8> {
    let mut seq = Vec::with_capacity(8);
    seq.extend_from_slice(b"\x1b[>");
    seq.extend_from_slice(flags.to_string().as_bytes());
    seq.push(b'u');
    seq
}

// ── Request model ────────────────────────────────────────────────────────

/// One feature's request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureRequest {
    /// Ask for the feature.
    pub enabled: bool,
    /// Fail setup when the terminal cannot provide it.
    pub required: bool,
}

impl FeatureRequest {
    /// Request the feature, tolerating absence.
    pub const ON: Self = Self {
        enabled: true,
        required: false,
    };

    /// Request the feature and fail without it.
    pub const REQUIRED: Self = Self {
        enabled: true,
        required: true,
    };

    /// Leave the feature off.
    pub const OFF: Self = Self {
        enabled: false,
        required: false,
    };
}

/// Mouse-tracking sub-options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseOptions {
    /// Also report motion with no button held (`CSI ?1003h`).
    pub any_motion: bool,
    /// Use SGR extended coordinates (`CSI ?1006h`).
    pub sgr: bool,
}

impl Default for MouseOptions {
    fn default() -> Self {
        Self {
            any_motion: false,
            sgr: true,
        }
    }
}

/// The host's full feature configuration.
#[derive(Debug, Clone, Copy)]
pub struct SessionFeatures {
    /// Mouse tracking request.
    pub mouse: FeatureRequest,
    /// Mouse tracking sub-options.
    pub mouse_options: MouseOptions,
    /// Kitty keyboard protocol request.
    pub kitty_keyboard: FeatureRequest,
    /// Kitty flag set to push.
    pub kitty_flags: u8,
    /// Bracketed paste request.
    pub bracketed_paste: FeatureRequest,
    /// Focus reporting request.
    pub focus_events: FeatureRequest,
    /// Clipboard capability request (no wire sequence; gate for the
    /// clipboard helper).
    pub clipboard: FeatureRequest,
}

impl Default for SessionFeatures {
    fn default() -> Self {
        Self {
            mouse: FeatureRequest::OFF,
            mouse_options: MouseOptions::default(),
            kitty_keyboard: FeatureRequest::OFF,
            kitty_flags: kitty_flags::DEFAULT,
            bracketed_paste: FeatureRequest::OFF,
            focus_events: FeatureRequest::OFF,
            clipboard: FeatureRequest::OFF,
        }
    }
}

impl SessionFeatures {
    /// Everything on, nothing required: the common interactive setup.
    #[must_use]
    pub fn everything() -> Self {
        Self {
            mouse: FeatureRequest::ON,
            kitty_keyboard: FeatureRequest::ON,
            bracketed_paste: FeatureRequest::ON,
            focus_events: FeatureRequest::ON,
            clipboard: FeatureRequest::ON,
            ..Self::default()
        }
    }

    fn request(&self, feature: Feature) -> FeatureRequest {
        match feature {
            Feature::MouseTracking => self.mouse,
            Feature::KittyKeyboard => self.kitty_keyboard,
            Feature::BracketedPaste => self.bracketed_paste,
            Feature::FocusEvents => self.focus_events,
            Feature::Clipboard => self.clipboard,
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────────────

/// Controller setup failure.
#[derive(Debug)]
pub enum SetupError {
    /// A `required` feature is absent from the capability matrix.
    FeatureUnsupported {
        /// The missing feature.
        feature: Feature,
        /// The terminal it is missing on.
        terminal: TerminalKind,
    },
    /// Writing an enable sequence to the sink failed.
    Io(io::Error),
}

impl std::fmt::Display for SetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FeatureUnsupported { feature, terminal } => write!(
                f,
                "required feature {feature} is not supported on {terminal}",
            ),
            Self::Io(err) => write!(f, "writing terminal setup sequence: {err}"),
        }
    }
}

impl std::error::Error for SetupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::FeatureUnsupported { .. } => None,
        }
    }
}

impl From<io::Error> for SetupError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

// ── Controller ───────────────────────────────────────────────────────────

/// Record of what was switched on, for reverse-order teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Enabled {
    Mouse { any_motion: bool, sgr: bool },
    KittyKeyboard,
    BracketedPaste,
    FocusEvents,
}

/// The capability controller.
///
/// Owns the capability cache and the stack of applied features.
#[derive(Debug, Default)]
pub struct FeatureController {
    cache: CapabilityCache,
    enabled: Vec<Enabled>,
}

impl FeatureController {
    /// A controller that detects capabilities on first use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A controller seeded with a known capability record.
    #[must_use]
    pub fn with_capabilities(caps: Capabilities) -> Self {
        let mut cache = CapabilityCache::new();
        cache.set(caps);
        Self {
            cache,
            enabled: Vec::new(),
        }
    }

    /// The capability record, detecting on first use.
    pub fn capabilities(&mut self) -> &Capabilities {
        let caps = self.cache.get_or_detect();
        #[cfg(feature = "tracing")]
        if crate::logging::debug_flag("DEBUG_TERMGRID_CAPS") {
            tracing::debug!(terminal = %caps.terminal, ssh = caps.is_ssh, tmux = caps.is_tmux,
                "capability detection");
        }
        caps
    }

    /// Mutable access to the capability cache, for probe refinement and
    /// explicit invalidation.
    pub fn cache_mut(&mut self) -> &mut CapabilityCache {
        &mut self.cache
    }

    /// Whether any feature is currently applied.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.enabled.is_empty()
    }

    /// Validate the request set and write the enable sequences.
    ///
    /// Validation happens before the first byte is written: a failing
    /// `required` feature leaves the terminal untouched. Unsupported
    /// non-required features are skipped silently.
    pub fn enable<W: Write>(
        &mut self,
        sink: &mut W,
        features: &SessionFeatures,
    ) -> Result<(), SetupError> {
        let caps = self.cache.get_or_detect().clone();

        for feature in Feature::ALL {
            let request = features.request(feature);
            if request.enabled && request.required && !caps.supports(feature).is_available() {
                return Err(SetupError::FeatureUnsupported {
                    feature,
                    terminal: caps.terminal,
                });
            }
        }

        for feature in Feature::ALL {
            let request = features.request(feature);
            if !request.enabled || !caps.supports(feature).is_available() {
                continue;
            }
            match feature {
                Feature::MouseTracking => {
                    let opts = features.mouse_options;
                    sink.write_all(ENABLE_MOUSE_TRACKING)?;
                    sink.write_all(ENABLE_MOUSE_BUTTONS)?;
                    if opts.any_motion {
                        sink.write_all(ENABLE_MOUSE_ALL)?;
                    }
                    if opts.sgr {
                        sink.write_all(ENABLE_SGR_MOUSE)?;
                    }
                    self.enabled.push(Enabled::Mouse {
                        any_motion: opts.any_motion,
                        sgr: opts.sgr,
                    });
                }
                Feature::KittyKeyboard => {
                    sink.write_all(&kitty_push(features.kitty_flags))?;
                    self.enabled.push(Enabled::KittyKeyboard);
                }
                Feature::BracketedPaste => {
                    sink.write_all(ENABLE_BRACKETED_PASTE)?;
                    self.enabled.push(Enabled::BracketedPaste);
                }
                Feature::FocusEvents => {
                    sink.write_all(ENABLE_FOCUS_EVENTS)?;
                    self.enabled.push(Enabled::FocusEvents);
                }
                // No wire sequence; availability is the whole feature.
                Feature::Clipboard => {}
            }
            #[cfg(feature = "tracing")]
            tracing::trace!(%feature, "feature enabled");
        }

        sink.flush()?;
        Ok(())
    }

    /// Write the disable sequences for everything applied, most recent
    /// first. Safe to call any number of times.
    pub fn reset<W: Write>(&mut self, sink: &mut W) -> io::Result<()> {
        if self.enabled.is_empty() {
            return Ok(());
        }
        while let Some(entry) = self.enabled.pop() {
            match entry {
                Enabled::Mouse { any_motion, sgr } => {
                    if sgr {
                        sink.write_all(DISABLE_SGR_MOUSE)?;
                    }
                    if any_motion {
                        sink.write_all(DISABLE_MOUSE_ALL)?;
                    }
                    sink.write_all(DISABLE_MOUSE_BUTTONS)?;
                    sink.write_all(DISABLE_MOUSE_TRACKING)?;
                }
                Enabled::KittyKeyboard => sink.write_all(KITTY_POP)?,
                Enabled::BracketedPaste => sink.write_all(DISABLE_BRACKETED_PASTE)?,
                Enabled::FocusEvents => sink.write_all(DISABLE_FOCUS_EVENTS)?,
            }
        }
        sink.flush()
    }
}
