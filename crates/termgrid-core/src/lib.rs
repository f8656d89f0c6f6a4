#![forbid(unsafe_code)]

//! Terminal input decoding, the event model, and capability control.
//!
//! The decoder turns raw terminal bytes into typed [`event::Event`]s; the
//! capability layer detects what the terminal can do and switches the
//! corresponding input modes on and off.

pub mod capabilities;
pub mod controller;
pub mod decoder;
pub mod event;
pub mod logging;
pub mod quirks;

pub use capabilities::{
    Capabilities, CapabilityCache, EnvSnapshot, Feature, Support, TerminalKind,
};
pub use controller::{
    FeatureController, FeatureRequest, MouseOptions, SessionFeatures, SetupError,
};
pub use decoder::{Decoder, DecoderOptions};
pub use event::{
    ClipboardEvent, Event, KeyCode, KeyEvent, KeyEventKind, Modifiers, MouseButton, MouseEvent,
    MouseEventKind, PasteEvent,
};
