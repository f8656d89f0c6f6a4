#![forbid(unsafe_code)]

//! Logging support.
//!
//! Re-exports the tracing macros when the `tracing` feature is enabled.
//! Call sites in hot paths stay behind `#[cfg(feature = "tracing")]` so
//! the decoder and renderer compile to nothing extra without it.

#[cfg(feature = "tracing")]
pub use tracing::{debug, debug_span, error, info, info_span, trace, trace_span, warn};

/// Whether a `DEBUG_*` toggle is present in the environment.
///
/// The conventional switches are `DEBUG_TERMGRID_INPUT` (decoder
/// diagnostics) and `DEBUG_TERMGRID_CAPS` (detection verdicts).
#[must_use]
pub fn debug_flag(name: &str) -> bool {
    std::env::var_os(name).is_some()
}
