#![forbid(unsafe_code)]

//! Native Unix terminal backend.
//!
//! The byte source and sink around the core: raw-mode toggling, the
//! poll-driven event pump that feeds the decoder, SIGWINCH resize
//! delivery, SIGINT/SIGTERM cleanup, the optional Kitty keyboard probe,
//! and the clipboard helper.
//!
//! Everything here is an external collaborator of the core — the decoder
//! and renderer never touch an fd themselves.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use termgrid_core::capabilities::{
    Feature, KITTY_PROBE_QUERY, Support, TerminalKind, buffer_has_kitty_probe_reply,
};
use termgrid_core::controller::{FeatureController, SessionFeatures, SetupError};
use termgrid_core::decoder::{Decoder, DecoderOptions};
use termgrid_core::event::Event;
use termgrid_render::ansi;

#[cfg(unix)]
use signal_hook::consts::signal::{SIGINT, SIGTERM, SIGWINCH};
#[cfg(unix)]
use signal_hook::iterator::Signals;

/// Default Kitty probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(200);

// ── Raw mode ─────────────────────────────────────────────────────────────

/// RAII guard that puts the controlling terminal into raw mode and
/// restores the saved termios on drop.
///
/// Restoration failures are logged, never raised: the rest of the reset
/// sequence must still run.
#[cfg(unix)]
pub struct RawModeGuard {
    original: nix::sys::termios::Termios,
    tty: std::fs::File,
}

#[cfg(unix)]
impl RawModeGuard {
    /// Enter raw mode on `/dev/tty`.
    pub fn enter() -> io::Result<Self> {
        let tty = std::fs::File::open("/dev/tty")?;
        let original = nix::sys::termios::tcgetattr(&tty).map_err(io::Error::other)?;

        let mut raw = original.clone();
        nix::sys::termios::cfmakeraw(&mut raw);
        nix::sys::termios::tcsetattr(&tty, nix::sys::termios::SetArg::TCSAFLUSH, &raw)
            .map_err(io::Error::other)?;

        Ok(Self { original, tty })
    }

    /// Restore the saved termios now, keeping the guard alive.
    pub fn restore(&self) {
        if let Err(err) = nix::sys::termios::tcsetattr(
            &self.tty,
            nix::sys::termios::SetArg::TCSAFLUSH,
            &self.original,
        ) {
            tracing::warn!(%err, "failed to restore cooked mode");
        }
    }
}

#[cfg(unix)]
impl Drop for RawModeGuard {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Current terminal dimensions as `(rows, cols)`.
#[cfg(unix)]
pub fn terminal_size() -> io::Result<(u16, u16)> {
    let tty = std::fs::File::open("/dev/tty")?;
    let ws = rustix::termios::tcgetwinsize(&tty).map_err(io::Error::other)?;
    if ws.ws_row == 0 || ws.ws_col == 0 {
        return Err(io::Error::other("terminal reports zero dimensions"));
    }
    Ok((ws.ws_row, ws.ws_col))
}

// ── Resize signal ────────────────────────────────────────────────────────

// SIGWINCH is delivered through a dedicated thread so no handler code
// runs in signal context. Notifications coalesce: one pending wakeup is
// enough, the authoritative size comes from the winsize ioctl.
#[cfg(unix)]
#[derive(Debug)]
struct ResizeSignalGuard {
    handle: signal_hook::iterator::Handle,
    thread: Option<std::thread::JoinHandle<()>>,
}

#[cfg(unix)]
impl ResizeSignalGuard {
    fn new(tx: mpsc::SyncSender<()>) -> io::Result<Self> {
        let mut signals = Signals::new([SIGWINCH]).map_err(io::Error::other)?;
        let handle = signals.handle();
        let thread = std::thread::spawn(move || {
            for _ in signals.forever() {
                let _ = tx.try_send(());
            }
        });
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

#[cfg(unix)]
impl Drop for ResizeSignalGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

// ── Emergency reset ──────────────────────────────────────────────────────

/// SIGINT/SIGTERM hook that replays the teardown bytes and restores
/// cooked mode before the default handler terminates the process.
#[cfg(unix)]
struct ShutdownGuard {
    handle: signal_hook::iterator::Handle,
    thread: Option<std::thread::JoinHandle<()>>,
}

#[cfg(unix)]
impl ShutdownGuard {
    fn install(
        reset_bytes: Vec<u8>,
        original: nix::sys::termios::Termios,
    ) -> io::Result<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(io::Error::other)?;
        let handle = signals.handle();
        let thread = std::thread::spawn(move || {
            if let Some(signal) = signals.forever().next() {
                let mut out = io::stdout();
                let _ = out.write_all(&reset_bytes);
                let _ = out.flush();
                if let Ok(tty) = std::fs::File::open("/dev/tty") {
                    if let Err(err) = nix::sys::termios::tcsetattr(
                        &tty,
                        nix::sys::termios::SetArg::TCSAFLUSH,
                        &original,
                    ) {
                        tracing::warn!(%err, "signal cleanup could not restore cooked mode");
                    }
                }
                let _ = signal_hook::low_level::emulate_default_handler(signal);
            }
        });
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

#[cfg(unix)]
impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

// ── Event pump ───────────────────────────────────────────────────────────

/// Poll-driven input source: raw tty bytes in, [`Event`]s out.
///
/// Wraps a [`Decoder`] plus the resize channel. In headless mode there is
/// no fd; bytes arrive through [`feed`](Self::feed), which is also the
/// test entry point.
pub struct TtyInput {
    decoder: Decoder,
    pending: VecDeque<Event>,
    reader: Option<std::fs::File>,
    dims: (u16, u16),
    #[cfg(unix)]
    resize_rx: Option<mpsc::Receiver<()>>,
    #[cfg(unix)]
    _resize_guard: Option<ResizeSignalGuard>,
}

impl TtyInput {
    /// A headless input source with fixed dimensions.
    #[must_use]
    pub fn headless(rows: u16, cols: u16, options: DecoderOptions) -> Self {
        Self {
            decoder: Decoder::new(options),
            pending: VecDeque::new(),
            reader: None,
            dims: (rows, cols),
            #[cfg(unix)]
            resize_rx: None,
            #[cfg(unix)]
            _resize_guard: None,
        }
    }

    /// A live input source reading from `/dev/tty`.
    #[cfg(unix)]
    pub fn open(options: DecoderOptions) -> io::Result<Self> {
        let reader = std::fs::File::open("/dev/tty")?;
        let dims = terminal_size().unwrap_or((24, 80));

        let (resize_guard, resize_rx) = {
            let (tx, rx) = mpsc::sync_channel(1);
            match ResizeSignalGuard::new(tx) {
                Ok(guard) => (Some(guard), Some(rx)),
                Err(_) => (None, None),
            }
        };

        Ok(Self {
            decoder: Decoder::new(options),
            pending: VecDeque::new(),
            reader: Some(reader),
            dims,
            resize_rx,
            _resize_guard: resize_guard,
        })
    }

    /// Last known dimensions as `(rows, cols)`.
    #[must_use]
    pub const fn size(&self) -> (u16, u16) {
        self.dims
    }

    /// Push bytes straight into the decoder (headless/testing path).
    pub fn feed(&mut self, bytes: &[u8]) {
        self.decoder.feed(bytes);
        self.drain_decoder();
    }

    /// Inject a resize, as the host does from its own SIGWINCH handling.
    pub fn inject_resize(&mut self, rows: u16, cols: u16) {
        self.dims = (rows, cols);
        self.pending.push_back(Event::Resize { rows, cols });
    }

    fn drain_decoder(&mut self) {
        while let Some(event) = self.decoder.next() {
            self.pending.push_back(event);
        }
    }

    /// Pop an already-decoded event without touching the fd.
    pub fn try_next(&mut self) -> Option<Event> {
        self.pending.pop_front()
    }

    /// Wait up to `timeout` for one event.
    ///
    /// Returns `Ok(None)` on timeout. Interrupted polls and empty reads
    /// are transparent retries; read errors after the stream closed
    /// propagate. A cancelled wait never corrupts decoder state — partial
    /// sequences stay buffered for the next call.
    #[cfg(unix)]
    pub fn poll_event(&mut self, timeout: Duration) -> io::Result<Option<Event>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(event) = self.shift_event() {
                return Ok(Some(event));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            if !self.wait_readable(deadline - now)? {
                continue;
            }
            self.read_available()?;
        }
    }

    /// Block until the next event arrives.
    #[cfg(unix)]
    pub fn read_event(&mut self) -> io::Result<Event> {
        loop {
            if let Some(event) = self.poll_event(Duration::from_millis(500))? {
                return Ok(event);
            }
        }
    }

    /// Pending event or freshly-detected resize, if any.
    fn shift_event(&mut self) -> Option<Event> {
        #[cfg(unix)]
        if let Some(rx) = &self.resize_rx {
            if rx.try_recv().is_ok() {
                let (rows, cols) = terminal_size().unwrap_or(self.dims);
                self.dims = (rows, cols);
                self.pending.push_back(Event::Resize { rows, cols });
            }
        }
        self.pending.pop_front()
    }

    #[cfg(unix)]
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        use std::os::fd::AsFd;
        let Some(reader) = &self.reader else {
            // Headless: nothing will ever arrive; burn the timeout.
            std::thread::sleep(timeout.min(Duration::from_millis(10)));
            return Ok(false);
        };
        let mut fds = [nix::poll::PollFd::new(
            reader.as_fd(),
            nix::poll::PollFlags::POLLIN,
        )];
        let millis: u16 = timeout.as_millis().try_into().unwrap_or(u16::MAX);
        match nix::poll::poll(&mut fds, nix::poll::PollTimeout::from(millis)) {
            Ok(n) => Ok(n > 0),
            Err(nix::errno::Errno::EINTR) => Ok(false),
            Err(err) => Err(io::Error::other(err)),
        }
    }

    #[cfg(unix)]
    fn read_available(&mut self) -> io::Result<()> {
        let Some(reader) = &mut self.reader else {
            return Ok(());
        };
        let mut buf = [0u8; 1024];
        match reader.read(&mut buf) {
            Ok(0) => Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                self.decoder.feed(&buf[..n]);
                self.drain_decoder();
                Ok(())
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Probe for Kitty keyboard support over the live tty.
    ///
    /// Writes `CSI ? u` and waits up to `timeout` for a flags report. Any
    /// unrelated bytes that arrive meanwhile are fed to the decoder so no
    /// input is lost; the probe reply itself decodes to nothing.
    #[cfg(unix)]
    pub fn probe_kitty_keyboard(
        &mut self,
        out: &mut impl Write,
        timeout: Duration,
    ) -> io::Result<bool> {
        if self.reader.is_none() {
            return Ok(false);
        }
        out.write_all(KITTY_PROBE_QUERY)?;
        out.flush()?;

        let deadline = Instant::now() + timeout;
        let mut scan = Vec::new();
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            if !self.wait_readable(deadline - now)? {
                continue;
            }
            let Some(reader) = &mut self.reader else {
                return Ok(false);
            };
            let mut buf = [0u8; 256];
            match reader.read(&mut buf) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    scan.extend_from_slice(&buf[..n]);
                    self.decoder.feed(&buf[..n]);
                    self.drain_decoder();
                    if buffer_has_kitty_probe_reply(&scan) {
                        return Ok(true);
                    }
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) => {}
                Err(err) => return Err(err),
            }
        }
    }
}

// ── Session ──────────────────────────────────────────────────────────────

/// Options for opening a full terminal session.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Enter the alternate screen buffer.
    pub alternate_screen: bool,
    /// Hide the cursor while the session runs.
    pub hide_cursor: bool,
    /// Feature set to enable.
    pub features: SessionFeatures,
    /// Probe unknown terminals for Kitty keyboard support.
    pub probe_kitty: bool,
    /// Probe timeout.
    pub probe_timeout: Duration,
    /// Install the SIGINT/SIGTERM emergency reset.
    pub signal_reset: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            alternate_screen: true,
            hide_cursor: true,
            features: SessionFeatures::everything(),
            probe_kitty: false,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            signal_reset: true,
        }
    }
}

/// A live terminal session: raw mode, enabled features, and the event
/// pump, torn down in reverse on [`close`](Self::close) or drop.
#[cfg(unix)]
pub struct TtySession {
    controller: FeatureController,
    input: TtyInput,
    raw: Option<RawModeGuard>,
    _shutdown: Option<ShutdownGuard>,
    alternate_screen: bool,
    hide_cursor: bool,
    closed: bool,
}

#[cfg(unix)]
impl TtySession {
    /// Open a session on the controlling terminal.
    ///
    /// Order: detect capabilities, enter raw mode, run the optional Kitty
    /// probe, write screen setup, enable features, install the signal
    /// reset. The only non-I/O failure is a `required` feature the
    /// terminal cannot provide.
    pub fn open(options: SessionOptions) -> Result<Self, SetupError> {
        let mut controller = FeatureController::new();
        let caps = controller.capabilities().clone();

        let raw = RawModeGuard::enter()?;
        let original = raw.original.clone();

        let mut decoder_options = DecoderOptions::from_capabilities(&caps);
        let mut input = TtyInput::open(decoder_options)?;

        let mut out = io::stdout();

        if options.probe_kitty
            && caps.terminal == TerminalKind::Unknown
            && input.probe_kitty_keyboard(&mut out, options.probe_timeout)?
        {
            let mut refined = caps.clone();
            refined.set_support(Feature::KittyKeyboard, Support::Full);
            controller.cache_mut().set(refined.clone());
            decoder_options = DecoderOptions::from_capabilities(&refined);
            input.decoder = Decoder::new(decoder_options);
        }

        if options.alternate_screen {
            out.write_all(ansi::ALT_SCREEN_ENTER.as_bytes())
                .map_err(SetupError::Io)?;
        }
        out.write_all(ansi::CLEAR_SCREEN.as_bytes())
            .map_err(SetupError::Io)?;
        out.write_all(ansi::CURSOR_HOME.as_bytes())
            .map_err(SetupError::Io)?;
        if options.hide_cursor {
            out.write_all(ansi::CURSOR_HIDE.as_bytes())
                .map_err(SetupError::Io)?;
        }

        controller.enable(&mut out, &options.features)?;

        let shutdown = if options.signal_reset {
            let reset = Self::teardown_bytes(
                &options.features,
                controller.capabilities(),
                options.alternate_screen,
                options.hide_cursor,
            );
            ShutdownGuard::install(reset, original).ok()
        } else {
            None
        };

        Ok(Self {
            controller,
            input,
            raw: Some(raw),
            _shutdown: shutdown,
            alternate_screen: options.alternate_screen,
            hide_cursor: options.hide_cursor,
            closed: false,
        })
    }

    /// The event pump.
    pub fn input(&mut self) -> &mut TtyInput {
        &mut self.input
    }

    /// Current `(rows, cols)`.
    #[must_use]
    pub const fn size(&self) -> (u16, u16) {
        self.input.size()
    }

    /// The detected capability record.
    pub fn capabilities(&mut self) -> &termgrid_core::Capabilities {
        self.controller.capabilities()
    }

    /// Write frame bytes to the terminal.
    pub fn write_frame(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut out = io::stdout();
        out.write_all(bytes)?;
        out.flush()
    }

    /// Tear the session down: disable features, restore the screen and
    /// cooked mode. Idempotent; also runs on drop.
    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut out = io::stdout();
        let result = self.controller.reset(&mut out);
        if let Err(err) = &result {
            tracing::warn!(%err, "feature reset failed");
        }
        if self.hide_cursor {
            let _ = out.write_all(ansi::CURSOR_SHOW.as_bytes());
        }
        let _ = out.write_all(ansi::SGR_RESET.as_bytes());
        if self.alternate_screen {
            let _ = out.write_all(ansi::ALT_SCREEN_LEAVE.as_bytes());
        }
        let _ = out.flush();

        // Cooked mode last, after every escape left the building.
        self.raw.take();
        result
    }

    /// The byte stream the emergency handler replays: feature disables in
    /// reverse order, cursor restore, screen restore.
    fn teardown_bytes(
        features: &SessionFeatures,
        caps: &termgrid_core::Capabilities,
        alternate_screen: bool,
        hide_cursor: bool,
    ) -> Vec<u8> {
        // Re-derive the disable set with a scratch controller; the live
        // one keeps its state for the normal close path.
        let mut scratch = FeatureController::with_capabilities(caps.clone());
        let mut bytes = Vec::new();
        if scratch.enable(&mut io::sink(), features).is_ok() {
            let _ = scratch.reset(&mut bytes);
        }
        if hide_cursor {
            bytes.extend_from_slice(ansi::CURSOR_SHOW.as_bytes());
        }
        bytes.extend_from_slice(ansi::SGR_RESET.as_bytes());
        if alternate_screen {
            bytes.extend_from_slice(ansi::ALT_SCREEN_LEAVE.as_bytes());
        }
        bytes
    }
}

#[cfg(unix)]
impl Drop for TtySession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

// ── Clipboard helper ─────────────────────────────────────────────────────

/// Clipboard failure.
#[derive(Debug)]
pub enum ClipboardError {
    /// No backend available on this host/terminal.
    NotAvailable,
    /// Spawning or driving the external tool failed.
    Tool(io::Error),
    /// The external tool exited unsuccessfully.
    ToolFailed(String),
}

impl std::fmt::Display for ClipboardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAvailable => write!(f, "no clipboard backend available"),
            Self::Tool(err) => write!(f, "clipboard tool failed: {err}"),
            Self::ToolFailed(tool) => write!(f, "clipboard tool exited with failure: {tool}"),
        }
    }
}

impl std::error::Error for ClipboardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Tool(err) => Some(err),
            _ => None,
        }
    }
}

/// External clipboard tool families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalTool {
    /// `pbcopy` / `pbpaste`.
    MacOs,
    /// `wl-copy` / `wl-paste`.
    Wayland,
    /// `xclip`.
    X11,
    /// `clip.exe` / PowerShell `Get-Clipboard`.
    Windows,
}

impl ExternalTool {
    /// Pick the tool for this host, judged by platform and display
    /// environment.
    #[must_use]
    pub fn detect() -> Option<Self> {
        if cfg!(target_os = "macos") {
            return Some(Self::MacOs);
        }
        if cfg!(windows) {
            return Some(Self::Windows);
        }
        if std::env::var_os("WAYLAND_DISPLAY").is_some() {
            return Some(Self::Wayland);
        }
        if std::env::var_os("DISPLAY").is_some() {
            return Some(Self::X11);
        }
        None
    }

    fn copy_command(self) -> Command {
        match self {
            Self::MacOs => Command::new("pbcopy"),
            Self::Wayland => Command::new("wl-copy"),
            Self::X11 => {
                let mut cmd = Command::new("xclip");
                cmd.args(["-selection", "clipboard"]);
                cmd
            }
            Self::Windows => Command::new("clip.exe"),
        }
    }

    fn paste_command(self) -> Command {
        match self {
            Self::MacOs => Command::new("pbpaste"),
            Self::Wayland => {
                let mut cmd = Command::new("wl-paste");
                cmd.arg("--no-newline");
                cmd
            }
            Self::X11 => {
                let mut cmd = Command::new("xclip");
                cmd.args(["-selection", "clipboard", "-o"]);
                cmd
            }
            Self::Windows => {
                let mut cmd = Command::new("powershell.exe");
                cmd.args(["-NoProfile", "-Command", "Get-Clipboard"]);
                cmd
            }
        }
    }
}

/// The OSC 52 clipboard-set sequence for a payload.
#[must_use]
pub fn osc52_set(text: &str) -> String {
    format!("\x1b]52;c;{}\x07", BASE64.encode(text.as_bytes()))
}

/// Clipboard access via OSC 52 with an external-tool fallback.
#[derive(Debug, Clone, Copy)]
pub struct Clipboard {
    osc52: bool,
    external: Option<ExternalTool>,
}

impl Clipboard {
    /// Choose backends from the capability record and host environment.
    #[must_use]
    pub fn detect(caps: &termgrid_core::Capabilities) -> Self {
        Self {
            osc52: caps.supports(Feature::Clipboard).is_available(),
            external: ExternalTool::detect(),
        }
    }

    /// A clipboard with explicit backends (test seam).
    #[must_use]
    pub const fn with_backends(osc52: bool, external: Option<ExternalTool>) -> Self {
        Self { osc52, external }
    }

    /// Whether any copy path exists.
    #[must_use]
    pub const fn can_copy(&self) -> bool {
        self.osc52 || self.external.is_some()
    }

    /// Copy `text`, preferring OSC 52 through the terminal sink.
    pub fn copy(&self, sink: &mut impl Write, text: &str) -> Result<(), ClipboardError> {
        if self.osc52 {
            sink.write_all(osc52_set(text).as_bytes())
                .and_then(|()| sink.flush())
                .map_err(ClipboardError::Tool)?;
            return Ok(());
        }
        let Some(tool) = self.external else {
            return Err(ClipboardError::NotAvailable);
        };
        let mut child = tool
            .copy_command()
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(ClipboardError::Tool)?;
        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(text.as_bytes())
                .map_err(ClipboardError::Tool)?;
        }
        let status = child.wait().map_err(ClipboardError::Tool)?;
        if status.success() {
            Ok(())
        } else {
            Err(ClipboardError::ToolFailed(format!("{tool:?}")))
        }
    }

    /// Read the clipboard through the external tool.
    ///
    /// OSC 52 reads arrive asynchronously as [`Event::Clipboard`] through
    /// the decoder; this is the synchronous fallback.
    pub fn paste(&self) -> Result<String, ClipboardError> {
        let Some(tool) = self.external else {
            return Err(ClipboardError::NotAvailable);
        };
        let output = tool
            .paste_command()
            .stderr(Stdio::null())
            .output()
            .map_err(ClipboardError::Tool)?;
        if !output.status.success() {
            return Err(ClipboardError::ToolFailed(format!("{tool:?}")));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
