//! 4×8 AVX2 tiled kernel.

use super::{AVX2_REGISTER_FILE_BYTES, Kernel, check_packed, check_unpacked, register_tile};
use crate::matrix::{GemmShape, MatrixView, MatrixViewMut, TileDims};

const TH: usize = 4;
const TW: usize = 8;
const VW: usize = 8;

/// Tiled kernel using AVX2 and FMA.
///
/// One YMM register holds a full row of the 4×8 tile, so the tile needs 4
/// accumulators. Each reduction step covers 8 columns of A: for every
/// component, one row of the B slab is loaded and multiplied against the
/// broadcast A values with fused multiply-add.
///
/// FMA rounds once per term instead of twice, so results can differ from
/// [`reference_multiply`](crate::reference_multiply) in the last bits.
///
/// The kernel can only be obtained through [`AvxKernel::detect`], which
/// checks the CPU first. That is what makes the safe trait methods sound.
#[derive(Debug)]
pub struct AvxKernel {
    _private: (),
}

static AVX: AvxKernel = AvxKernel { _private: () };

impl AvxKernel {
    /// Tile of this kernel (checked against the register file at compile time).
    pub const TILE: TileDims = register_tile(TH, TW, VW, AVX2_REGISTER_FILE_BYTES);

    /// Returns the kernel if this CPU supports AVX2 and FMA.
    pub fn detect() -> Option<&'static AvxKernel> {
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            Some(&AVX)
        } else {
            None
        }
    }
}

impl Kernel for AvxKernel {
    fn name(&self) -> &'static str {
        "avx2-4x8"
    }

    fn tile(&self) -> TileDims {
        Self::TILE
    }

    fn multiply_packed(&self, a_panels: &[f32], b_panels: &[f32], mut c: MatrixViewMut, shape: GemmShape) {
        check_packed(a_panels, b_panels, &c, shape, Self::TILE);
        let ldc = c.row_stride();
        // Safety: the CPU was checked in `detect`, and `check_packed` verified
        // the panel lengths and that C holds m rows of n columns.
        unsafe { multiply_packed_avx(a_panels, b_panels, c.data_mut(), ldc, shape) }
    }

    fn multiply_unpacked(&self, a: MatrixView, b: MatrixView, mut c: MatrixViewMut) {
        let shape = check_unpacked(&a, &b, &c, Self::TILE);
        let ldc = c.row_stride();
        // Safety: as above, with the view constructors having checked that
        // each buffer covers its rows at the given stride.
        unsafe {
            multiply_unpacked_avx(
                a.data(),
                a.row_stride(),
                b.data(),
                b.row_stride(),
                c.data_mut(),
                ldc,
                shape,
            )
        }
    }
}

/// Computes C from reordered panels, one 4×8 tile at a time.
///
/// # Safety
///
/// Caller must ensure:
/// - CPU supports AVX2 and FMA
/// - `a_panels` holds `m * k` and `b_panels` `k * n` elements in reorder layout
/// - `c` holds `m` rows of `n` elements at stride `ldc`
/// - `m % 4 == 0`, `n % 8 == 0`, `k % 8 == 0`
#[target_feature(enable = "avx2,fma")]
#[allow(unsafe_op_in_unsafe_fn)]
unsafe fn multiply_packed_avx(
    a_panels: &[f32],
    b_panels: &[f32],
    c: &mut [f32],
    ldc: usize,
    shape: GemmShape,
) {
    use std::arch::x86_64::*;

    let GemmShape { m, n, k } = shape;
    let c_base = c.as_mut_ptr();

    for nn in (0..n).step_by(TW) {
        for mm in (0..m).step_by(TH) {
            let mut a_ptr = a_panels.as_ptr().add(mm * k);
            let mut b_ptr = b_panels.as_ptr().add(nn * k);

            let mut c0 = _mm256_setzero_ps();
            let mut c1 = _mm256_setzero_ps();
            let mut c2 = _mm256_setzero_ps();
            let mut c3 = _mm256_setzero_ps();

            for _ in (0..k).step_by(VW) {
                // a_ptr: 4 rows x 8 components, b_ptr: 8 rows x 8 columns
                for v in 0..VW {
                    let b_vec = _mm256_loadu_ps(b_ptr.add(v * TW));
                    c0 = _mm256_fmadd_ps(_mm256_broadcast_ss(&*a_ptr.add(0 * VW + v)), b_vec, c0);
                    c1 = _mm256_fmadd_ps(_mm256_broadcast_ss(&*a_ptr.add(1 * VW + v)), b_vec, c1);
                    c2 = _mm256_fmadd_ps(_mm256_broadcast_ss(&*a_ptr.add(2 * VW + v)), b_vec, c2);
                    c3 = _mm256_fmadd_ps(_mm256_broadcast_ss(&*a_ptr.add(3 * VW + v)), b_vec, c3);
                }
                a_ptr = a_ptr.add(TH * VW);
                b_ptr = b_ptr.add(VW * TW);
            }

            let c_ptr = c_base.add(mm * ldc + nn);
            _mm256_storeu_ps(c_ptr.add(0 * ldc), c0);
            _mm256_storeu_ps(c_ptr.add(1 * ldc), c1);
            _mm256_storeu_ps(c_ptr.add(2 * ldc), c2);
            _mm256_storeu_ps(c_ptr.add(3 * ldc), c3);
        }
    }
}

/// Computes C from row-major A and B without reordering.
///
/// # Safety
///
/// Same as [`multiply_packed_avx`], except A holds `m` rows of `k` elements
/// at stride `lda` and B holds `k` rows of `n` elements at stride `ldb`.
#[target_feature(enable = "avx2,fma")]
#[allow(unsafe_op_in_unsafe_fn)]
unsafe fn multiply_unpacked_avx(
    a: &[f32],
    lda: usize,
    b: &[f32],
    ldb: usize,
    c: &mut [f32],
    ldc: usize,
    shape: GemmShape,
) {
    use std::arch::x86_64::*;

    let GemmShape { m, n, k } = shape;
    let c_base = c.as_mut_ptr();

    for nn in (0..n).step_by(TW) {
        for mm in (0..m).step_by(TH) {
            let a_ptr = a.as_ptr().add(mm * lda);

            let mut c0 = _mm256_setzero_ps();
            let mut c1 = _mm256_setzero_ps();
            let mut c2 = _mm256_setzero_ps();
            let mut c3 = _mm256_setzero_ps();

            for kk in (0..k).step_by(VW) {
                for v in 0..VW {
                    let p = kk + v;
                    let b_vec = _mm256_loadu_ps(b.as_ptr().add(p * ldb + nn));
                    c0 = _mm256_fmadd_ps(_mm256_broadcast_ss(&*a_ptr.add(0 * lda + p)), b_vec, c0);
                    c1 = _mm256_fmadd_ps(_mm256_broadcast_ss(&*a_ptr.add(1 * lda + p)), b_vec, c1);
                    c2 = _mm256_fmadd_ps(_mm256_broadcast_ss(&*a_ptr.add(2 * lda + p)), b_vec, c2);
                    c3 = _mm256_fmadd_ps(_mm256_broadcast_ss(&*a_ptr.add(3 * lda + p)), b_vec, c3);
                }
            }

            let c_ptr = c_base.add(mm * ldc + nn);
            _mm256_storeu_ps(c_ptr.add(0 * ldc), c0);
            _mm256_storeu_ps(c_ptr.add(1 * ldc), c1);
            _mm256_storeu_ps(c_ptr.add(2 * ldc), c2);
            _mm256_storeu_ps(c_ptr.add(3 * ldc), c3);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::reference::reference_multiply;

    #[test]
    fn test_single_tile_single_step() {
        let Some(kernel) = AvxKernel::detect() else {
            println!("Skipping - AVX2/FMA not available");
            return;
        };

        // m == tile height, n == tile width, k == vector width
        let (m, n, k) = (4, 8, 8);
        let a: Vec<f32> = (0..m * k).map(|i| i as f32).collect();
        let b: Vec<f32> = (0..k * n).map(|i| (i % 10) as f32).collect();
        let mut a_tx = vec![0.0; m * k];
        let mut b_tx = vec![0.0; k * n];
        kernel.reorder(MatrixView::new(&a, m, k), MatrixView::new(&b, k, n), &mut a_tx, &mut b_tx);

        let mut c = vec![f32::NAN; m * n];
        kernel.multiply_packed(&a_tx, &b_tx, MatrixViewMut::new(&mut c, m, n), GemmShape::new(m, n, k));

        let mut expected = vec![0.0; m * n];
        reference_multiply(
            MatrixView::new(&a, m, k),
            MatrixView::new(&b, k, n),
            MatrixViewMut::new(&mut expected, m, n),
        );

        // integer inputs well below 2^24, so FMA is exact too
        assert_eq!(c, expected);
    }

    #[test]
    fn test_unpacked_strided_matches_packed() {
        let Some(kernel) = AvxKernel::detect() else {
            println!("Skipping - AVX2/FMA not available");
            return;
        };

        let (m, n, k) = (8, 16, 16);
        let a: Vec<f32> = (0..m * k).map(|i| (i % 7) as f32).collect();
        let b: Vec<f32> = (0..k * n).map(|i| (i % 3) as f32).collect();

        let mut a_tx = vec![0.0; m * k];
        let mut b_tx = vec![0.0; k * n];
        kernel.reorder(MatrixView::new(&a, m, k), MatrixView::new(&b, k, n), &mut a_tx, &mut b_tx);
        let mut packed = vec![0.0; m * n];
        kernel.multiply_packed(&a_tx, &b_tx, MatrixViewMut::new(&mut packed, m, n), GemmShape::new(m, n, k));

        // same C written through a view with 8 padding columns per row
        let ldc = n + 8;
        let mut strided = vec![-1.0; (m - 1) * ldc + n];
        kernel.multiply_unpacked(
            MatrixView::new(&a, m, k),
            MatrixView::new(&b, k, n),
            MatrixViewMut::with_stride(&mut strided, m, n, ldc),
        );

        for i in 0..m {
            assert_eq!(&strided[i * ldc..i * ldc + n], &packed[i * n..(i + 1) * n]);
        }
        assert!(strided[n..ldc].iter().all(|&x| x == -1.0));
    }
}
