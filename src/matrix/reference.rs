use super::{GemmShape, MatrixView, MatrixViewMut};

/// Reference matrix multiplication: C = A * B
///
/// Uses i-k-j loop order, so A and B are both read row by row. Each
/// output element is still summed in the order `l = 0..k`, with the first
/// product assigned rather than added to zero. That order is the ground truth
/// the optimized kernels are checked against.
///
/// No blocking, no SIMD. Works for any shape and any row stride.
///
/// # Panics
///
/// Panics if the view shapes are inconsistent or `k == 0`.
///
/// # Example
///
/// ```
/// use panel_gemm::{MatrixView, MatrixViewMut, reference_multiply};
///
/// let a = [1.0, 2.0, 3.0,
///          4.0, 5.0, 6.0];
/// let b = [7.0, 8.0,
///          9.0, 10.0,
///          11.0, 12.0];
/// let mut c = [0.0; 4];
///
/// reference_multiply(
///     MatrixView::new(&a, 2, 3),
///     MatrixView::new(&b, 3, 2),
///     MatrixViewMut::new(&mut c, 2, 2),
/// );
/// assert_eq!(c, [58.0, 64.0, 139.0, 154.0]);
/// ```
pub fn reference_multiply(a: MatrixView, b: MatrixView, mut c: MatrixViewMut) {
    let shape = GemmShape::of_output(&a, &b, &c);
    assert!(shape.k > 0, "k must be at least 1");

    for i in 0..shape.m {
        let a_row = a.row(i);
        let c_row = c.row_mut(i);

        let b_row = b.row(0);
        for j in 0..shape.n {
            c_row[j] = a_row[0] * b_row[j];
        }
        for p in 1..shape.k {
            let a_ip = a_row[p];
            let b_row = b.row(p);
            for j in 0..shape.n {
                c_row[j] += a_ip * b_row[j];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_fill_8x8x4() {
        let (m, n, k) = (8, 8, 4);
        let a: Vec<f32> = (0..m * k).map(|i| i as f32).collect();
        let b: Vec<f32> = (0..k * n).map(|i| i as f32).collect();
        let mut c = vec![0.0; m * n];

        reference_multiply(
            MatrixView::new(&a, m, k),
            MatrixView::new(&b, k, n),
            MatrixViewMut::new(&mut c, m, n),
        );

        // 0*0 + 1*8 + 2*16 + 3*24
        assert_eq!(c[0], 112.0);
        // row 7, col 7: sum of (28+l) * (8l+7)
        assert_eq!(c[63], 28.0 * 7.0 + 29.0 * 15.0 + 30.0 * 23.0 + 31.0 * 31.0);
    }

    #[test]
    fn test_overwrites_output() {
        let a = [2.0];
        let b = [3.0];
        let mut c = [100.0];

        reference_multiply(
            MatrixView::new(&a, 1, 1),
            MatrixView::new(&b, 1, 1),
            MatrixViewMut::new(&mut c, 1, 1),
        );

        assert_eq!(c, [6.0]);
    }

    #[test]
    fn test_strided_views() {
        // 2x2 identity and a 2x2 matrix, both with a padding column
        let a = [1.0, 0.0, f32::NAN, 0.0, 1.0];
        let b = [5.0, 6.0, f32::NAN, 7.0, 8.0];
        let mut c = [0.0, 0.0, -1.0, 0.0, 0.0];

        reference_multiply(
            MatrixView::with_stride(&a, 2, 2, 3),
            MatrixView::with_stride(&b, 2, 2, 3),
            MatrixViewMut::with_stride(&mut c, 2, 2, 3),
        );

        assert_eq!(c, [5.0, 6.0, -1.0, 7.0, 8.0]);
    }

    #[test]
    #[should_panic(expected = "A has 3 columns but B has 2 rows")]
    fn test_inner_dimension_mismatch() {
        let a = [0.0; 6];
        let b = [0.0; 4];
        let mut c = [0.0; 4];

        reference_multiply(
            MatrixView::new(&a, 2, 3),
            MatrixView::new(&b, 2, 2),
            MatrixViewMut::new(&mut c, 2, 2),
        );
    }
}
