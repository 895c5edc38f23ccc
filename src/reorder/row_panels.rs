use crate::matrix::{MatrixView, MatrixViewMut, TileDims};

fn check_a(m: usize, k: usize, panels_len: usize, tile: TileDims) {
    assert!(
        m % tile.height == 0,
        "m={} is not a multiple of tile height {}",
        m,
        tile.height
    );
    assert!(
        k % tile.depth == 0,
        "k={} is not a multiple of vector width {}",
        k,
        tile.depth
    );
    assert_eq!(panels_len, m * k, "A panels: expected {}x{}={} elements", m, k, m * k);
}

/// Reorder A (m × k) into row panels.
///
/// For every band of `tile.height` rows, and every group of `tile.depth`
/// columns inside it, the `height × depth` block is written row by row.
/// The kernel then reads one block per reduction step without jumping.
///
/// # Panics
///
/// Panics if `m` or `k` do not divide into whole tiles, or `out.len() != m·k`.
pub fn reorder_a(a: MatrixView, out: &mut [f32], tile: TileDims) {
    let (m, k) = (a.rows(), a.cols());
    check_a(m, k, out.len(), tile);

    let mut pos = 0;
    for mm in (0..m).step_by(tile.height) {
        for col in (0..k).step_by(tile.depth) {
            for row in mm..mm + tile.height {
                out[pos..pos + tile.depth].copy_from_slice(&a.row(row)[col..col + tile.depth]);
                pos += tile.depth;
            }
        }
    }
}

/// Inverse of [`reorder_a`]: write the row panels back as a row-major matrix.
pub fn restore_a(panels: &[f32], mut a: MatrixViewMut, tile: TileDims) {
    let (m, k) = (a.rows(), a.cols());
    check_a(m, k, panels.len(), tile);

    let mut pos = 0;
    for mm in (0..m).step_by(tile.height) {
        for col in (0..k).step_by(tile.depth) {
            for row in mm..mm + tile.height {
                a.row_mut(row)[col..col + tile.depth]
                    .copy_from_slice(&panels[pos..pos + tile.depth]);
                pos += tile.depth;
            }
        }
    }
}
