//! Layout reorder: rewrite A and B into panel order for the tiled kernels.
//!
//! After reordering, the kernel's inner loop reads both operands strictly
//! sequentially. Both transforms are pure permutations: the output has
//! exactly as many elements as the input, with no padding, and the inverse
//! functions recover the original matrices bit for bit.
//!
//! ```text
//! A (m × k), tile height 4, depth 2      reordered A
//!
//!   a00 a01 | a02 a03                    a00 a01 a10 a11 a20 a21 a30 a31
//!   a10 a11 | a12 a13          ->        a02 a03 a12 a13 a22 a23 a32 a33
//!   a20 a21 | a22 a23                    ...next row panel...
//!   a30 a31 | a32 a33
//! ```
//!
//! B is cut into column panels of `tile.width` columns, and each panel is
//! stored as its `k` rows back to back.

mod col_panels;
mod row_panels;

pub use col_panels::{reorder_b, restore_b};
pub(crate) use col_panels::reorder_b_panels;
pub use row_panels::{reorder_a, restore_a};

use crate::matrix::{GemmShape, MatrixView, TileDims};

/// Reorder both operands of `a × b` for a kernel with tile `tile`.
///
/// `a_out` must hold exactly `m·k` elements and `b_out` exactly `k·n`.
///
/// # Panics
///
/// Panics if the shape is not a whole number of tiles or an output buffer
/// has the wrong length.
pub fn reorder(a: MatrixView, b: MatrixView, a_out: &mut [f32], b_out: &mut [f32], tile: TileDims) {
    GemmShape::of(&a, &b).assert_fits(tile);
    reorder_a(a, a_out, tile);
    reorder_b(b, b_out, tile);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::MatrixViewMut;

    #[test]
    fn test_layout_matches_diagram() {
        // 4x4 A with tile height 4 and depth 2, values are 10*row + col
        let tile = TileDims::new(4, 2, 2);
        let a: Vec<f32> = (0..4)
            .flat_map(|r| (0..4).map(move |c| (10 * r + c) as f32))
            .collect();
        let b = vec![0.0; 4 * 2];
        let mut a_tx = vec![0.0; 16];
        let mut b_tx = vec![0.0; 8];

        reorder(
            MatrixView::new(&a, 4, 4),
            MatrixView::new(&b, 4, 2),
            &mut a_tx,
            &mut b_tx,
            tile,
        );

        assert_eq!(
            a_tx,
            vec![
                0.0, 1.0, 10.0, 11.0, 20.0, 21.0, 30.0, 31.0, //
                2.0, 3.0, 12.0, 13.0, 22.0, 23.0, 32.0, 33.0,
            ]
        );
    }

    #[test]
    fn test_round_trip_is_exact() {
        let tile = TileDims::new(8, 8, 4);
        let (m, n, k) = (16, 32, 12);
        let a: Vec<f32> = (0..m * k).map(|i| (i as f32).sin()).collect();
        let b: Vec<f32> = (0..k * n).map(|i| (i as f32).cos() * 1e-3).collect();
        let mut a_tx = vec![0.0; m * k];
        let mut b_tx = vec![0.0; k * n];

        reorder(
            MatrixView::new(&a, m, k),
            MatrixView::new(&b, k, n),
            &mut a_tx,
            &mut b_tx,
            tile,
        );
        assert_ne!(a_tx, a);
        assert_ne!(b_tx, b);

        let mut a_back = vec![0.0; m * k];
        let mut b_back = vec![0.0; k * n];
        restore_a(&a_tx, MatrixViewMut::new(&mut a_back, m, k), tile);
        restore_b(&b_tx, MatrixViewMut::new(&mut b_back, k, n), tile);

        assert_eq!(a_back, a);
        assert_eq!(b_back, b);
    }

    #[test]
    #[should_panic(expected = "n=12 is not a multiple of tile width 8")]
    fn test_rejects_partial_tiles() {
        let tile = TileDims::new(8, 8, 4);
        let a = vec![0.0; 8 * 4];
        let b = vec![0.0; 4 * 12];
        let mut a_tx = vec![0.0; 8 * 4];
        let mut b_tx = vec![0.0; 4 * 12];

        reorder(
            MatrixView::new(&a, 8, 4),
            MatrixView::new(&b, 4, 12),
            &mut a_tx,
            &mut b_tx,
            tile,
        );
    }
}
