//! Checking kernel output against the reference multiply.
//!
//! The tiled kernels sum in a different order from the oracle (and the AVX2
//! kernel rounds differently through FMA), so results are compared with a
//! tolerance, never with exact equality. The rounding error of a dot product
//! is bounded by the size of its terms, not of its result: when signed terms
//! cancel, a small result can carry the error of large products. The bound
//! for each element is therefore scaled by `Σ_l |A[i][l]|·|B[l][j]|`, see
//! [`term_magnitudes`].

use thiserror::Error;

use crate::matrix::reference::reference_multiply;
use crate::matrix::{MatrixView, MatrixViewMut};

/// Tolerance for comparing two GEMM results.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tolerance {
    relative: f32,
}

impl Tolerance {
    /// Tolerance for dot products of length `k`: `2 · k · f32::EPSILON`
    /// times the summed term magnitude. `k · f32::EPSILON` already covers the
    /// rounding of both the kernel's sum and the oracle's.
    pub fn for_depth(k: usize) -> Self {
        Tolerance {
            relative: 2.0 * k.max(1) as f32 * f32::EPSILON,
        }
    }

    /// Largest difference allowed for an element whose products have
    /// absolute values summing to `magnitude`.
    pub fn allowed(&self, magnitude: f32) -> f32 {
        self.relative * magnitude.abs()
    }

    pub fn accepts(&self, expected: f32, actual: f32, magnitude: f32) -> bool {
        (expected - actual).abs() <= self.allowed(magnitude)
    }
}

/// `Σ_l |A[i][l]|·|B[l][j]|` for every element of `A * B`, in row-major
/// order.
///
/// Computed by the reference multiply on `|A|` and `|B|`, so it carries the
/// same rounding as the oracle, which is far below the tolerance.
///
/// # Panics
///
/// Panics if the shapes are inconsistent or `k == 0`.
pub fn term_magnitudes(a: MatrixView, b: MatrixView) -> Vec<f32> {
    let abs = |view: MatrixView| -> Vec<f32> {
        (0..view.rows())
            .flat_map(|i| view.row(i).iter().map(|x| x.abs()))
            .collect()
    };
    let a_abs = abs(a);
    let b_abs = abs(b);

    let mut magnitudes = vec![0.0; a.rows() * b.cols()];
    reference_multiply(
        MatrixView::new(&a_abs, a.rows(), a.cols()),
        MatrixView::new(&b_abs, b.rows(), b.cols()),
        MatrixViewMut::new(&mut magnitudes, a.rows(), b.cols()),
    );
    magnitudes
}

/// First element that differs from the reference by more than the tolerance.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("mismatch at {index}: expected {expected}, got {actual} (allowed difference {allowed})")]
pub struct Mismatch {
    /// Flat index into the compared buffers
    pub index: usize,
    pub expected: f32,
    pub actual: f32,
    pub allowed: f32,
}

/// Compare `actual` against `expected` element by element, with
/// `magnitudes` from [`term_magnitudes`] scaling the tolerance.
///
/// Returns the first element outside the tolerance. NaN never compares
/// equal, so a NaN anywhere in `actual` is reported.
///
/// # Panics
///
/// Panics if the buffers have different lengths.
pub fn compare(
    expected: &[f32],
    actual: &[f32],
    magnitudes: &[f32],
    tolerance: Tolerance,
) -> Result<(), Mismatch> {
    assert_eq!(expected.len(), actual.len(), "result length mismatch");
    assert_eq!(expected.len(), magnitudes.len(), "magnitude length mismatch");

    for (index, ((&e, &a), &magnitude)) in expected.iter().zip(actual).zip(magnitudes).enumerate() {
        if !tolerance.accepts(e, a, magnitude) {
            return Err(Mismatch {
                index,
                expected: e,
                actual: a,
                allowed: tolerance.allowed(magnitude),
            });
        }
    }
    Ok(())
}

/// Largest absolute difference between two results.
pub fn max_abs_diff(expected: &[f32], actual: &[f32]) -> f32 {
    expected
        .iter()
        .zip(actual)
        .map(|(e, a)| (e - a).abs())
        .fold(0.0, f32::max)
}
