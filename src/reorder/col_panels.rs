use crate::matrix::{MatrixView, MatrixViewMut, TileDims};

fn check_b(k: usize, n: usize, panels_len: usize, width: usize) {
    assert!(
        n % width == 0,
        "n={} is not a multiple of tile width {}",
        n,
        width
    );
    assert_eq!(panels_len, k * n, "B panels: expected {}x{}={} elements", k, n, k * n);
}

/// Reorder B (k × n) into column panels.
///
/// Each panel of `tile.width` columns is stored as all `k` of its rows, one
/// after the other. Only `tile.width` matters here, so the column-panel
/// kernel reuses this with its own panel width.
///
/// # Panics
///
/// Panics if `n` is not a multiple of `tile.width` or `out.len() != k·n`.
pub fn reorder_b(b: MatrixView, out: &mut [f32], tile: TileDims) {
    reorder_b_panels(b, out, tile.width);
}

pub(crate) fn reorder_b_panels(b: MatrixView, out: &mut [f32], width: usize) {
    let (k, n) = (b.rows(), b.cols());
    check_b(k, n, out.len(), width);

    let mut pos = 0;
    for nn in (0..n).step_by(width) {
        for row in 0..k {
            out[pos..pos + width].copy_from_slice(&b.row(row)[nn..nn + width]);
            pos += width;
        }
    }
}

/// Inverse of [`reorder_b`].
pub fn restore_b(panels: &[f32], mut b: MatrixViewMut, tile: TileDims) {
    let (k, n) = (b.rows(), b.cols());
    let width = tile.width;
    check_b(k, n, panels.len(), width);

    let mut pos = 0;
    for nn in (0..n).step_by(width) {
        for row in 0..k {
            b.row_mut(row)[nn..nn + width].copy_from_slice(&panels[pos..pos + width]);
            pos += width;
        }
    }
}
