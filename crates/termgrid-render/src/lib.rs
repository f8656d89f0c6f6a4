#![forbid(unsafe_code)]

//! Render kernel: packed cells, the double-buffered grid, and the diff
//! renderer that turns back-buffer mutations into a minimal ANSI stream.

pub mod ansi;
pub mod cell;
pub mod color;
pub mod grid;
pub mod renderer;
pub mod sgr_cache;

pub use cell::{Attr, Cell, Style};
pub use color::{Color, PackedColor};
pub use grid::Grid;
pub use renderer::{DiffStats, Renderer};
