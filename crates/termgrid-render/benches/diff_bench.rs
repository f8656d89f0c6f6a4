//! Diff-loop benchmarks: steady-state frames on an editor-sized grid.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use termgrid_render::{Attr, Color, Renderer, Style};

const ROWS: u16 = 50;
const COLS: u16 = 200;

fn fill(renderer: &mut Renderer) {
    for row in 0..ROWS {
        for col in 0..COLS {
            renderer.set_cell(row, col, char::from(b'a' + (col % 26) as u8), Style::NONE);
        }
    }
}

fn bench_idle_frame(c: &mut Criterion) {
    let mut renderer = Renderer::new(ROWS, COLS);
    fill(&mut renderer);
    renderer.compute_diff();

    c.bench_function("diff_idle_frame", |b| {
        b.iter(|| black_box(renderer.compute_diff()));
    });
}

fn bench_single_row_update(c: &mut Criterion) {
    let mut renderer = Renderer::new(ROWS, COLS);
    fill(&mut renderer);
    renderer.compute_diff();

    let mut tick = 0u32;
    c.bench_function("diff_single_row", |b| {
        b.iter(|| {
            tick = tick.wrapping_add(1);
            let ch = char::from(b'0' + (tick % 10) as u8);
            for col in 0..COLS {
                renderer.set_cell(25, col, ch, Style::NONE);
            }
            black_box(renderer.compute_diff())
        });
    });
}

fn bench_styled_repaint(c: &mut Criterion) {
    let mut renderer = Renderer::new(ROWS, COLS);
    let styles = [
        Style::NONE,
        Style::NONE.with_attr(Attr::BOLD),
        Style::NONE.with_fg(Color::Palette(4)),
        Style::NONE.with_bg(Color::Rgb(30, 30, 46)),
    ];

    let mut flip = false;
    c.bench_function("diff_styled_repaint", |b| {
        b.iter(|| {
            flip = !flip;
            let shift = usize::from(flip);
            for row in 0..ROWS {
                for col in 0..COLS {
                    let style = styles[(usize::from(row + col) + shift) % styles.len()];
                    renderer.set_cell(row, col, 'x', style);
                }
            }
            black_box(renderer.compute_diff())
        });
    });
}

criterion_group!(
    benches,
    bench_idle_frame,
    bench_single_row_update,
    bench_styled_repaint
);
criterion_main!(benches);
