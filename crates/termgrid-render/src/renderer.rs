#![forbid(unsafe_code)]

//! Run-oriented diff renderer.
//!
//! Owns the double buffer and produces, per frame, the shortest escape
//! stream that reconciles what the terminal shows (front buffer) with what
//! the host drew (back buffer).
//!
//! The pipeline per frame:
//!
//! 1. Walk rows in order, skipping rows whose dirty flag is clear.
//! 2. Group each dirty row's cells into **runs** sharing one
//!    `(attr, fg, bg)` style triple.
//! 3. Skip runs whose cells all match the front buffer; cursor motion
//!    jumps over them.
//! 4. For emitted runs: position the cursor if needed, emit the minimal
//!    style delta from the live ANSI state, then the characters.
//! 5. Copy emitted cells into the front buffer and clear the row flag.
//! 6. Append one `SGR` reset iff any non-default style was set.
//!
//! The live ANSI state (attribute byte, both colors, and a
//! has-set-background latch) starts each frame at the reset state. The
//! latch drives the `49` background reset that prevents color bleed when a
//! run returns to the default background after a colored one appeared
//! earlier in the frame.
//!
//! All operations are total: out-of-range writes are no-ops and the diff
//! of an unchanged grid is the empty string.

use std::io::{self, Write};

use crate::ansi;
use crate::cell::{Cell, Style};
use crate::color::PackedColor;
use crate::grid::Grid;
use crate::sgr_cache::SgrCache;

/// Counters from one `compute_diff` pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiffStats {
    /// Cells whose characters were written this frame.
    pub cells_written: usize,
    /// Runs that produced output.
    pub runs_emitted: usize,
    /// Bytes of escape stream produced.
    pub bytes: usize,
}

/// Live terminal-state model for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AnsiState {
    attr: u8,
    fg: PackedColor,
    bg: PackedColor,
    /// Latched once any non-default background was emitted this frame.
    has_set_bg: bool,
}

impl AnsiState {
    const RESET: Self = Self {
        attr: 0,
        fg: PackedColor::DEFAULT,
        bg: PackedColor::DEFAULT,
        has_set_bg: false,
    };
}

/// Double-buffered diff renderer.
#[derive(Debug)]
pub struct Renderer {
    grid: Grid,
    cache: SgrCache,
    sync_updates: bool,
    stats: DiffStats,
}

impl Renderer {
    /// A renderer for a `rows × cols` grid (dimensions clamped to ≥ 1).
    #[must_use]
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            grid: Grid::new(rows, cols),
            cache: SgrCache::new(),
            sync_updates: false,
            stats: DiffStats::default(),
        }
    }

    /// Number of rows.
    #[inline]
    #[must_use]
    pub const fn rows(&self) -> u16 {
        self.grid.rows()
    }

    /// Number of columns.
    #[inline]
    #[must_use]
    pub const fn cols(&self) -> u16 {
        self.grid.cols()
    }

    /// Wrap [`render_to`](Self::render_to) frames in synchronized-update
    /// markers (`CSI ?2026 h/l`).
    pub fn set_sync_updates(&mut self, enabled: bool) {
        self.sync_updates = enabled;
    }

    /// Write a character with a style into the back buffer.
    ///
    /// Out-of-range coordinates are ignored; writing a cell equal to the
    /// current back-buffer cell leaves the row clean.
    pub fn set_cell(&mut self, row: u16, col: u16, ch: char, style: Style) {
        self.grid.set(row, col, Cell::styled(ch, style));
    }

    /// Write an already-packed cell into the back buffer.
    pub fn set_cell_packed(&mut self, row: u16, col: u16, cell: Cell) {
        self.grid.set(row, col, cell);
    }

    /// Read a back-buffer cell; the empty cell out of range.
    #[must_use]
    pub fn get_cell(&self, row: u16, col: u16) -> Cell {
        self.grid.get(row, col)
    }

    /// Fill the back buffer with empty cells and mark every row dirty.
    pub fn clear(&mut self) {
        self.grid.clear();
    }

    /// Advisory dirty mark for one row; safe out of range.
    pub fn mark_dirty(&mut self, row: u16) {
        self.grid.mark_dirty(row);
    }

    /// Mark every row dirty.
    pub fn mark_all_dirty(&mut self) {
        self.grid.mark_all_dirty();
    }

    /// Resize both buffers, discarding contents; the host re-renders.
    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.grid.resize(rows, cols);
    }

    /// Counters from the most recent diff pass.
    #[must_use]
    pub const fn last_stats(&self) -> DiffStats {
        self.stats
    }

    /// Compute the escape stream that reconciles front with back.
    ///
    /// Updates the front buffer and clears every dirty flag on the way.
    /// Calling this twice without intervening mutation yields the empty
    /// string the second time.
    pub fn compute_diff(&mut self) -> String {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!(
            "compute_diff",
            rows = self.grid.rows(),
            cols = self.grid.cols(),
        )
        .entered();

        let mut out = String::new();
        let mut state = AnsiState::RESET;
        let mut cursor: Option<(u16, u16)> = None;
        let mut styled = false;
        let mut stats = DiffStats::default();

        for row in 0..self.grid.rows() {
            if !self.grid.is_row_dirty(row) {
                continue;
            }
            self.emit_row(row, &mut out, &mut state, &mut cursor, &mut styled, &mut stats);
            self.grid.clear_row_dirty(row);
        }

        if styled {
            out.push_str(ansi::SGR_RESET);
        }

        stats.bytes = out.len();
        self.stats = stats;

        #[cfg(feature = "tracing")]
        tracing::trace!(
            cells = stats.cells_written,
            runs = stats.runs_emitted,
            bytes = stats.bytes,
            "frame diffed"
        );

        out
    }

    /// Diff and write the frame to a byte sink.
    ///
    /// Empty frames write nothing. When synchronized updates are enabled
    /// the frame is wrapped in `CSI ?2026 h/l` so the terminal presents it
    /// atomically.
    pub fn render_to<W: Write>(&mut self, w: &mut W) -> io::Result<DiffStats> {
        let frame = self.compute_diff();
        if frame.is_empty() {
            return Ok(self.stats);
        }
        if self.sync_updates {
            w.write_all(ansi::SYNC_BEGIN.as_bytes())?;
        }
        w.write_all(frame.as_bytes())?;
        if self.sync_updates {
            w.write_all(ansi::SYNC_END.as_bytes())?;
        }
        w.flush()?;
        Ok(self.stats)
    }

    /// Emit one dirty row as a sequence of style runs.
    #[allow(clippy::too_many_arguments)]
    fn emit_row(
        &mut self,
        row: u16,
        out: &mut String,
        state: &mut AnsiState,
        cursor: &mut Option<(u16, u16)>,
        styled: &mut bool,
        stats: &mut DiffStats,
    ) {
        let cols = self.grid.cols();
        let mut col = 0u16;
        while col < cols {
            let (end, changed) = {
                let back = self.grid.back_row(row);
                let front = self.grid.front_row(row);
                let anchor = back[usize::from(col)];
                let mut end = col + 1;
                let mut changed = anchor != front[usize::from(col)];
                while end < cols && back[usize::from(end)].same_style(anchor) {
                    changed |= back[usize::from(end)] != front[usize::from(end)];
                    end += 1;
                }
                (end, changed)
            };

            if !changed {
                // Clean run: cursor motion jumps over it.
                col = end;
                continue;
            }

            if *cursor != Some((row, col)) {
                ansi::push_move_to(out, row + 1, col + 1);
            }

            let anchor = self.grid.get(row, col);
            let (attr, fg, bg) = (anchor.attr().bits(), anchor.fg(), anchor.bg());
            self.emit_style_delta(out, state, attr, fg, bg);
            if attr != 0 || !fg.is_default() || !bg.is_default() {
                *styled = true;
            }

            for c in col..end {
                out.push(self.grid.get(row, c).ch());
            }
            *cursor = Some((row, end));

            self.grid.commit_run(row, col, end);
            stats.cells_written += usize::from(end - col);
            stats.runs_emitted += 1;
            col = end;
        }
    }

    /// Emit the shortest delta that moves the terminal from `state` to the
    /// run's style triple.
    ///
    /// Selection order:
    /// - unchanged triple: nothing;
    /// - attribute-only change onto default colors: the attribute LUT
    ///   (whose leading `0` may reset colors, harmless when both are
    ///   default);
    /// - color-only change that keeps a concrete foreground: the cached
    ///   color delta, `49`-prefixed when the background returns to default
    ///   after a colored background this frame;
    /// - everything else: the full SGR builder.
    fn emit_style_delta(
        &mut self,
        out: &mut String,
        state: &mut AnsiState,
        attr: u8,
        fg: PackedColor,
        bg: PackedColor,
    ) {
        let same_colors = fg == state.fg && bg == state.bg;
        if attr == state.attr && same_colors {
            return;
        }

        if attr == state.attr {
            // Dropping a concrete foreground back to default has no
            // standalone code in the delta vocabulary; route through the
            // full builder so the stale foreground cannot bleed.
            let fg_needs_full = fg.is_default() && !state.fg.is_default();
            if fg_needs_full {
                out.push_str(&ansi::build_sgr(attr, fg, bg));
            } else {
                let reset_bg =
                    bg.is_default() && (!state.bg.is_default() || state.has_set_bg);
                out.push_str(self.cache.delta(fg, bg, reset_bg));
            }
        } else if same_colors && fg.is_default() && bg.is_default() {
            out.push_str(ansi::attr_lut(attr));
        } else {
            out.push_str(&ansi::build_sgr(attr, fg, bg));
        }

        state.attr = attr;
        state.fg = fg;
        state.bg = bg;
        if !bg.is_default() {
            state.has_set_bg = true;
        }
    }
}
