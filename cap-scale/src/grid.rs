// SPDX-License-Identifier: MIT
//! Fixed R×C grid splitting.
//!
//! [`gundam`](crate::gundam) picks its own grid size from the input
//! dimensions and overlaps tiles for OCR context. A motion-detection tile
//! dispatcher needs the opposite: caller-supplied `(rows, cols)` and
//! abutting, non-overlapping tiles so every source pixel belongs to exactly
//! one tile. `split_grid` is `gundam::mk_grid` with `overlap_frac` fixed at
//! zero and the grid size taken as a parameter instead of computed.

use crate::gundam::Rect;

/// Split a `w × h` frame into a `rows × cols` grid of abutting tiles, in
/// row-major `(row, col)` order. The last row/column absorbs any remainder
/// pixels from integer division, so tiles are not all exactly equal size
/// when `w`/`h` do not divide evenly by `cols`/`rows`.
pub fn split_grid(w: u32, h: u32, rows: u32, cols: u32) -> Vec<(u32, u32, Rect)> {
    assert!(rows > 0 && cols > 0, "grid must have at least one row/col");
    let step_w = w / cols;
    let step_h = h / rows;
    let mut out = Vec::with_capacity((rows * cols) as usize);
    for row in 0..rows {
        for col in 0..cols {
            let x = col * step_w;
            let y = row * step_h;
            let tile_w = if col + 1 == cols { w - x } else { step_w };
            let tile_h = if row + 1 == rows { h - y } else { step_h };
            out.push((
                row,
                col,
                Rect {
                    x,
                    y,
                    w: tile_w.max(1),
                    h: tile_h.max(1),
                },
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_whole_frame_exactly_once() {
        let tiles = split_grid(100, 100, 2, 2);
        assert_eq!(tiles.len(), 4);
        // every tile starts at a multiple of the step size
        assert_eq!(tiles[0].2.x, 0);
        assert_eq!(tiles[0].2.y, 0);
        assert_eq!(tiles[3].2.x, 50);
        assert_eq!(tiles[3].2.y, 50);
    }

    #[test]
    fn row_col_order_is_row_major() {
        let tiles = split_grid(90, 60, 2, 3);
        let coords: Vec<(u32, u32)> = tiles.iter().map(|(r, c, _)| (*r, *c)).collect();
        assert_eq!(
            coords,
            vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]
        );
    }

    #[test]
    fn remainder_pixels_absorbed_by_last_tile() {
        let tiles = split_grid(101, 101, 2, 2);
        // step = 50, last col/row should take the extra pixel
        let last = tiles.last().unwrap();
        assert_eq!(last.2.w, 51);
        assert_eq!(last.2.h, 51);
    }
}
