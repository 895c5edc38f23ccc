//! Portable register-tiled kernel.

use super::{Kernel, PORTABLE_REGISTER_FILE_BYTES, check_packed, check_unpacked, register_tile};
use crate::matrix::{GemmShape, MatrixView, MatrixViewMut, TileDims};

/// Portable tiled kernel with a `TH × TW` tile and reduction step `VW`.
///
/// The tile buffers are fixed-size arrays indexed by the const parameters,
/// so every loop below has constant bounds and the compiler can keep the
/// whole tile in vector registers. The code is compiled for the baseline
/// instruction set, so tiles that could not fit in its register file
/// ([`PORTABLE_REGISTER_FILE_BYTES`](super::PORTABLE_REGISTER_FILE_BYTES))
/// are rejected at compile time by [`TileKernel::TILE`].
///
/// Each output element is summed in the order `l = 0..k` with separate
/// multiply and add, which is the same rounding as
/// [`reference_multiply`](crate::reference_multiply).
///
/// # Example
///
/// ```
/// use panel_gemm::{Kernel, MatrixView, MatrixViewMut, PortableKernel};
///
/// let a = vec![1.0; 8 * 4];
/// let b = vec![2.0; 4 * 8];
/// let mut c = vec![0.0; 8 * 8];
///
/// PortableKernel::default().multiply_unpacked(
///     MatrixView::new(&a, 8, 4),
///     MatrixView::new(&b, 4, 8),
///     MatrixViewMut::new(&mut c, 8, 8),
/// );
/// assert!(c.iter().all(|&x| x == 8.0));
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct TileKernel<const TH: usize, const TW: usize, const VW: usize>;

/// The default portable kernel: 4×4 tile with reduction step 4, the largest
/// that fits the 16 XMM registers.
#[cfg(target_arch = "x86_64")]
pub type PortableKernel = TileKernel<4, 4, 4>;

/// The default portable kernel: 8×8 tile with reduction step 4, which fills
/// the 32 NEON registers.
#[cfg(not(target_arch = "x86_64"))]
pub type PortableKernel = TileKernel<8, 8, 4>;

impl<const TH: usize, const TW: usize, const VW: usize> TileKernel<TH, TW, VW> {
    /// Tile of this kernel. Fails to compile if the tile is invalid or does
    /// not fit in the vector register file.
    pub const TILE: TileDims = register_tile(TH, TW, VW, PORTABLE_REGISTER_FILE_BYTES);
}

/// tile_c += tile_a * tile_b, one outer product per component of the slab.
#[inline(always)]
fn accumulate<const TH: usize, const TW: usize, const VW: usize>(
    tile_c: &mut [[f32; TW]; TH],
    tile_a: &[[f32; VW]; TH],
    tile_b: &[[f32; TW]; VW],
) {
    for h in 0..TH {
        for v in 0..VW {
            let a = tile_a[h][v];
            for w in 0..TW {
                tile_c[h][w] += a * tile_b[v][w];
            }
        }
    }
}

#[inline(always)]
fn store<const TH: usize, const TW: usize>(
    tile_c: &[[f32; TW]; TH],
    c: &mut MatrixViewMut,
    mm: usize,
    nn: usize,
) {
    for h in 0..TH {
        c.row_mut(mm + h)[nn..nn + TW].copy_from_slice(&tile_c[h]);
    }
}

impl<const TH: usize, const TW: usize, const VW: usize> Kernel for TileKernel<TH, TW, VW> {
    fn name(&self) -> &'static str {
        match (TH, TW, VW) {
            (8, 8, 4) => "tile-8x8",
            (4, 8, 4) => "tile-4x8",
            (8, 4, 4) => "tile-8x4",
            (4, 4, 4) => "tile-4x4",
            (4, 8, 2) => "tile-4x8-d2",
            (8, 4, 2) => "tile-8x4-d2",
            (4, 4, 2) => "tile-4x4-d2",
            _ => "tile",
        }
    }

    fn tile(&self) -> TileDims {
        Self::TILE
    }

    fn multiply_packed(&self, a_panels: &[f32], b_panels: &[f32], mut c: MatrixViewMut, shape: GemmShape) {
        check_packed(a_panels, b_panels, &c, shape, Self::TILE);
        let GemmShape { m, n, k } = shape;

        let mut tile_a = [[0.0f32; VW]; TH];
        let mut tile_b = [[0.0f32; TW]; VW];

        // nn: first column of the C tile, mm: first row
        for nn in (0..n).step_by(TW) {
            let b_panel = &b_panels[nn * k..(nn + TW) * k];
            for mm in (0..m).step_by(TH) {
                let a_panel = &a_panels[mm * k..(mm + TH) * k];
                let mut tile_c = [[0.0f32; TW]; TH];

                // one slab per step: TH rows of A and VW rows of B, both contiguous
                for (a_slab, b_slab) in a_panel
                    .chunks_exact(TH * VW)
                    .zip(b_panel.chunks_exact(VW * TW))
                {
                    for (dst, src) in tile_a.iter_mut().zip(a_slab.chunks_exact(VW)) {
                        dst.copy_from_slice(src);
                    }
                    for (dst, src) in tile_b.iter_mut().zip(b_slab.chunks_exact(TW)) {
                        dst.copy_from_slice(src);
                    }
                    accumulate(&mut tile_c, &tile_a, &tile_b);
                }

                store(&tile_c, &mut c, mm, nn);
            }
        }
    }

    fn multiply_unpacked(&self, a: MatrixView, b: MatrixView, mut c: MatrixViewMut) {
        let GemmShape { m, n, k } = check_unpacked(&a, &b, &c, Self::TILE);

        let mut tile_a = [[0.0f32; VW]; TH];
        let mut tile_b = [[0.0f32; TW]; VW];

        for nn in (0..n).step_by(TW) {
            for mm in (0..m).step_by(TH) {
                let mut tile_c = [[0.0f32; TW]; TH];

                for kk in (0..k).step_by(VW) {
                    for h in 0..TH {
                        tile_a[h].copy_from_slice(&a.row(mm + h)[kk..kk + VW]);
                    }
                    for v in 0..VW {
                        tile_b[v].copy_from_slice(&b.row(kk + v)[nn..nn + TW]);
                    }
                    accumulate(&mut tile_c, &tile_a, &tile_b);
                }

                store(&tile_c, &mut c, mm, nn);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::reference::reference_multiply;

    fn sequential(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32).collect()
    }

    fn run_packed<K: Kernel>(kernel: &K, a: &[f32], b: &[f32], shape: GemmShape) -> Vec<f32> {
        let GemmShape { m, n, k } = shape;
        let mut a_tx = vec![0.0; m * k];
        let mut b_tx = vec![0.0; k * n];
        kernel.reorder(MatrixView::new(a, m, k), MatrixView::new(b, k, n), &mut a_tx, &mut b_tx);

        let mut c = vec![f32::NAN; m * n];
        kernel.multiply_packed(&a_tx, &b_tx, MatrixViewMut::new(&mut c, m, n), shape);
        c
    }

    fn run_reference(a: &[f32], b: &[f32], shape: GemmShape) -> Vec<f32> {
        let GemmShape { m, n, k } = shape;
        let mut c = vec![0.0; m * n];
        reference_multiply(
            MatrixView::new(a, m, k),
            MatrixView::new(b, k, n),
            MatrixViewMut::new(&mut c, m, n),
        );
        c
    }

    #[test]
    fn test_8x8x4_sequential_fill() {
        let shape = GemmShape::new(8, 8, 4);
        let a = sequential(32);
        let b = sequential(32);

        let c = run_packed(&PortableKernel::default(), &a, &b, shape);

        assert_eq!(c[0], 112.0);
        // same accumulation order as the reference, and small integers
        // are exact, so the results are identical
        assert_eq!(c, run_reference(&a, &b, shape));
    }

    #[test]
    fn test_packed_and_unpacked_agree() {
        let shape = GemmShape::new(16, 24, 12);
        let a: Vec<f32> = (0..16 * 12).map(|i| (i % 7) as f32 - 3.0).collect();
        let b: Vec<f32> = (0..12 * 24).map(|i| (i % 5) as f32 - 2.0).collect();
        let kernel = PortableKernel::default();

        let packed = run_packed(&kernel, &a, &b, shape);
        let mut unpacked = vec![f32::NAN; 16 * 24];
        kernel.multiply_unpacked(
            MatrixView::new(&a, 16, 12),
            MatrixView::new(&b, 12, 24),
            MatrixViewMut::new(&mut unpacked, 16, 24),
        );

        assert_eq!(packed, unpacked);
        assert_eq!(packed, run_reference(&a, &b, shape));
    }

    #[test]
    fn test_other_tile_shapes() {
        let shape = GemmShape::new(16, 16, 8);
        let a: Vec<f32> = (0..16 * 8).map(|i| (i % 9) as f32).collect();
        let b: Vec<f32> = (0..8 * 16).map(|i| (i % 4) as f32).collect();
        let expected = run_reference(&a, &b, shape);

        // shallow slabs keep the wider tiles inside every register file
        assert_eq!(run_packed(&TileKernel::<4, 8, 2>, &a, &b, shape), expected);
        assert_eq!(run_packed(&TileKernel::<8, 4, 2>, &a, &b, shape), expected);
        assert_eq!(run_packed(&TileKernel::<4, 4, 4>, &a, &b, shape), expected);
        assert_eq!(run_packed(&TileKernel::<4, 4, 2>, &a, &b, shape), expected);
    }

    #[test]
    fn test_unpacked_writes_only_inside_strided_c() {
        let kernel = PortableKernel::default();
        let a = vec![1.0; 8 * 4];
        let b = vec![1.0; 4 * 8];
        // stride 10: two padding elements after each row
        let mut c = vec![-7.0; 7 * 10 + 8];

        kernel.multiply_unpacked(
            MatrixView::new(&a, 8, 4),
            MatrixView::new(&b, 4, 8),
            MatrixViewMut::with_stride(&mut c, 8, 8, 10),
        );

        for row in 0..8 {
            assert!(c[row * 10..row * 10 + 8].iter().all(|&x| x == 4.0));
            if row < 7 {
                assert_eq!(&c[row * 10 + 8..row * 10 + 10], &[-7.0, -7.0]);
            }
        }
    }

    #[test]
    #[should_panic(expected = "m=6 is not a multiple of tile height 4")]
    fn test_partial_tile_panics() {
        let a = vec![0.0; 6 * 4];
        let b = vec![0.0; 4 * 8];
        let mut c = vec![0.0; 6 * 8];

        TileKernel::<4, 4, 4>.multiply_unpacked(
            MatrixView::new(&a, 6, 4),
            MatrixView::new(&b, 4, 8),
            MatrixViewMut::new(&mut c, 6, 8),
        );
    }
}
