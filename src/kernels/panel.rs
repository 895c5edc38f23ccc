//! Column-panel kernel: one row of C at a time, B reordered into panels.

use super::PORTABLE_REGISTER_FILE_BYTES;
use crate::matrix::{GemmShape, MatrixView, MatrixViewMut};
use crate::reorder::reorder_b_panels;

/// C = A * B, computed one `PW`-wide row segment of C at a time.
///
/// B is first reordered into column panels of width `PW` (a scratch copy
/// owned by this call and freed when it returns). A stays in row-major
/// order: each step broadcasts one element of A against one row of the
/// current B panel. Only `n` has to be a multiple of `PW`; `m` and `k` are
/// free.
///
/// This is cheaper to set up than the tile kernels since A is never copied,
/// but it loads a row of B for every single A element.
///
/// # Panics
///
/// Panics if `n % PW != 0`, `k == 0`, or the view shapes are inconsistent.
pub fn multiply_panel<const PW: usize>(a: MatrixView, b: MatrixView, mut c: MatrixViewMut) {
    // the accumulator row stays live across k, plus one broadcast A value
    // and one B vector per step
    const {
        assert!(PW > 0 && PW % 4 == 0, "panel width must be a multiple of 4");
        assert!(
            std::mem::size_of::<f32>() * (PW + 4 + 4) <= PORTABLE_REGISTER_FILE_BYTES,
            "panel does not fit in the vector register file"
        );
    }

    let GemmShape { m, n, k } = GemmShape::of_output(&a, &b, &c);
    assert!(k > 0, "k must be at least 1");
    assert!(n % PW == 0, "n={} is not a multiple of panel width {}", n, PW);

    let mut b_panels = vec![0.0f32; k * n];
    reorder_b_panels(b, &mut b_panels, PW);

    for (panel, b_panel) in b_panels.chunks_exact(k * PW).enumerate() {
        let nn = panel * PW;
        for row in 0..m {
            let a_row = a.row(row);
            let mut acc = [0.0f32; PW];
            for (a_val, b_row) in a_row.iter().zip(b_panel.chunks_exact(PW)) {
                for w in 0..PW {
                    acc[w] += a_val * b_row[w];
                }
            }
            c.row_mut(row)[nn..nn + PW].copy_from_slice(&acc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::reference::reference_multiply;

    #[test]
    fn test_panel_24_matches_reference() {
        // m and k need not be tile multiples
        let (m, n, k) = (7, 48, 5);
        let a: Vec<f32> = (0..m * k).map(|i| (i % 11) as f32 - 5.0).collect();
        let b: Vec<f32> = (0..k * n).map(|i| (i % 13) as f32).collect();

        let mut c = vec![f32::NAN; m * n];
        multiply_panel::<24>(
            MatrixView::new(&a, m, k),
            MatrixView::new(&b, k, n),
            MatrixViewMut::new(&mut c, m, n),
        );

        let mut expected = vec![0.0; m * n];
        reference_multiply(
            MatrixView::new(&a, m, k),
            MatrixView::new(&b, k, n),
            MatrixViewMut::new(&mut expected, m, n),
        );
        assert_eq!(c, expected);
    }

    #[test]
    #[should_panic(expected = "n=20 is not a multiple of panel width 8")]
    fn test_rejects_partial_panel() {
        let a = vec![0.0; 4];
        let b = vec![0.0; 4 * 20];
        let mut c = vec![0.0; 20];

        multiply_panel::<8>(
            MatrixView::new(&a, 1, 4),
            MatrixView::new(&b, 4, 20),
            MatrixViewMut::new(&mut c, 1, 20),
        );
    }
}
