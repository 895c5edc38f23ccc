//! Register-tiled multiply kernels.
//!
//! A kernel computes C one `height × width` tile at a time. The tile's
//! accumulators stay in vector registers for the whole pass over k, and each
//! reduction step is an outer product of a `height × depth` slab of A with a
//! `depth × width` slab of B, so the hot loop needs no horizontal sums.
//!
//! Tiles are visited column panel first: every row panel of A is multiplied
//! against one panel of B before moving to the next, which keeps that B panel
//! in cache.
//!
//! Available kernels:
//! - [`TileKernel`]: portable const-generic kernel, [`PortableKernel`] picks
//!   the largest tile that fits the baseline register file (4×4 on x86_64,
//!   8×8 on aarch64, both with depth 4)
//! - [`AvxKernel`]: 4×8 tile with depth 8, AVX2 + FMA intrinsics (x86_64 only)
//! - [`multiply_panel`]: one row of C per pass, only B is reordered
//!
//! Each tile kernel has two explicit strategies: [`Kernel::multiply_packed`]
//! reads operands that went through [`crate::reorder`], and
//! [`Kernel::multiply_unpacked`] reads plain row-major matrices.

use std::sync::OnceLock;

use crate::matrix::{GemmShape, MatrixView, MatrixViewMut, TileDims};

pub mod panel;
pub mod tile;
#[cfg(target_arch = "x86_64")]
pub mod tile_avx;

pub use panel::multiply_panel;
pub use tile::{PortableKernel, TileKernel};
#[cfg(target_arch = "x86_64")]
pub use tile_avx::AvxKernel;

/// Vector register file available to plain Rust code.
///
/// Without `#[target_feature]` x86_64 code only has the 16 × 128-bit SSE2
/// XMM registers.
#[cfg(target_arch = "x86_64")]
pub const PORTABLE_REGISTER_FILE_BYTES: usize = 16 * 16;

/// Vector register file available to plain Rust code.
///
/// 32 × 128-bit NEON registers on aarch64.
#[cfg(not(target_arch = "x86_64"))]
pub const PORTABLE_REGISTER_FILE_BYTES: usize = 32 * 16;

/// 16 × 256-bit YMM registers, for code compiled with AVX2 enabled.
#[cfg(target_arch = "x86_64")]
pub const AVX2_REGISTER_FILE_BYTES: usize = 16 * 32;

/// Bytes of register storage one reduction step needs: an A slab, a B slab
/// and the accumulators.
pub const fn tile_footprint(tile: TileDims) -> usize {
    std::mem::size_of::<f32>()
        * (tile.height * tile.depth + tile.depth * tile.width + tile.height * tile.width)
}

/// Build the tile of a kernel, checking that it fits in the `file_bytes`
/// register file of the instruction set the kernel is compiled for.
///
/// Meant to be evaluated in a `const` so that an oversized tile fails the
/// build instead of silently spilling.
pub const fn register_tile(height: usize, width: usize, depth: usize, file_bytes: usize) -> TileDims {
    let tile = TileDims::new(height, width, depth);
    assert!(
        tile_footprint(tile) <= file_bytes,
        "tile does not fit in the vector register file"
    );
    tile
}

/// A tiled GEMM kernel.
///
/// Kernels are stateless, so one instance can be shared by all worker
/// threads.
pub trait Kernel: Sync {
    /// Short name used in logs and by the harness.
    fn name(&self) -> &'static str;

    /// Register tile, which also fixes the reorder layout.
    fn tile(&self) -> TileDims;

    /// Reorder `a` and `b` into this kernel's panel layout.
    ///
    /// `a_out` must hold `m·k` elements and `b_out` `k·n` elements.
    fn reorder(&self, a: MatrixView, b: MatrixView, a_out: &mut [f32], b_out: &mut [f32]) {
        crate::reorder::reorder(a, b, a_out, b_out, self.tile());
    }

    /// C = A * B from operands reordered with [`Kernel::reorder`].
    ///
    /// C is overwritten, never read.
    ///
    /// # Panics
    ///
    /// Panics if `shape` is not a whole number of tiles or a buffer does not
    /// match `shape`.
    fn multiply_packed(&self, a_panels: &[f32], b_panels: &[f32], c: MatrixViewMut, shape: GemmShape);

    /// C = A * B from plain row-major operands, skipping the reorder.
    ///
    /// Same arithmetic as [`Kernel::multiply_packed`], but A and B are read
    /// with row strides instead of sequentially.
    ///
    /// # Panics
    ///
    /// Panics if the shape is not a whole number of tiles.
    fn multiply_unpacked(&self, a: MatrixView, b: MatrixView, c: MatrixViewMut);
}

/// Precondition check shared by the packed strategies.
pub(crate) fn check_packed(
    a_panels: &[f32],
    b_panels: &[f32],
    c: &MatrixViewMut,
    shape: GemmShape,
    tile: TileDims,
) {
    shape.assert_fits(tile);
    shape.assert_output(c);
    assert_eq!(
        a_panels.len(),
        shape.a_len(),
        "A panels: expected {}x{}={} elements",
        shape.m,
        shape.k,
        shape.a_len()
    );
    assert_eq!(
        b_panels.len(),
        shape.b_len(),
        "B panels: expected {}x{}={} elements",
        shape.k,
        shape.n,
        shape.b_len()
    );
}

/// Precondition check shared by the unpacked strategies.
pub(crate) fn check_unpacked(a: &MatrixView, b: &MatrixView, c: &MatrixViewMut, tile: TileDims) -> GemmShape {
    let shape = GemmShape::of_output(a, b, c);
    shape.assert_fits(tile);
    shape
}

static PORTABLE: PortableKernel = TileKernel;

/// Every kernel the current CPU can run, fastest last.
pub fn available_kernels() -> Vec<&'static dyn Kernel> {
    #[allow(unused_mut)]
    let mut kernels: Vec<&'static dyn Kernel> = vec![&PORTABLE as &'static dyn Kernel];

    #[cfg(target_arch = "x86_64")]
    if let Some(avx) = AvxKernel::detect() {
        kernels.push(avx);
    }

    kernels
}

/// Look up a kernel by [`Kernel::name`].
pub fn kernel_by_name(name: &str) -> Option<&'static dyn Kernel> {
    available_kernels().into_iter().find(|k| k.name() == name)
}

/// The fastest available kernel whose tile divides `shape` exactly.
pub fn kernel_for(shape: GemmShape) -> Option<&'static dyn Kernel> {
    available_kernels()
        .into_iter()
        .rev()
        .find(|kernel| shape.fits(kernel.tile()))
}

/// The fastest kernel for this CPU.
///
/// Feature detection runs once per process; later calls return the cached
/// choice.
pub fn select_kernel() -> &'static dyn Kernel {
    static SELECTED: OnceLock<&'static dyn Kernel> = OnceLock::new();
    *SELECTED.get_or_init(|| {
        let kernel = available_kernels()
            .pop()
            .unwrap_or(&PORTABLE as &'static dyn Kernel);
        log::debug!("selected GEMM kernel {} (tile {})", kernel.name(), kernel.tile());
        kernel
    })
}
