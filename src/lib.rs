//! Register-tiled f32 matrix multiplication for batches of small matrices.
//!
//! The idea: rewrite A and B into panels once so the kernel's inner loop
//! reads memory strictly in order, then compute C one register-sized tile
//! at a time. A batch driver runs the reorder and the multiply as two
//! separate parallel phases over many independent triples.
//!
//! ## Usage
//!
//! ```
//! use panel_gemm::{MatrixView, MatrixViewMut, multiply};
//!
//! let a = vec![1.0f32; 64 * 32];
//! let b = vec![1.0f32; 32 * 64];
//! let mut c = vec![0.0f32; 64 * 64];
//!
//! multiply(
//!     MatrixView::new(&a, 64, 32),
//!     MatrixView::new(&b, 32, 64),
//!     MatrixViewMut::new(&mut c, 64, 64),
//! );
//! assert!(c.iter().all(|&x| x == 32.0));
//! ```
//!
//! To reuse a reorder across several multiplies, pack once with
//! [`PanelBuffer::pack`]. For whole batches see [`batch`].
//!
//! ## What's inside
//!
//! - Portable const-generic tile kernel, sized to the baseline register file
//! - 4×8 AVX2 + FMA kernel, picked at runtime
//! - Column-panel kernel that only reorders B
//! - Static and pooled batch schedules

pub mod batch;
pub mod error;
pub mod kernels;
pub mod matrix;
pub mod reorder;
pub mod verify;

pub use error::{Error, Result};
#[cfg(target_arch = "x86_64")]
pub use kernels::AvxKernel;
pub use kernels::{Kernel, PortableKernel, TileKernel, available_kernels, kernel_by_name, multiply_panel, select_kernel};
pub use matrix::panel::PanelBuffer;
pub use matrix::reference::reference_multiply;
pub use matrix::{GemmShape, MatrixView, MatrixViewMut, TileDims};

/// C = A * B with the fastest kernel whose tile fits the shape.
///
/// Packs A and B into a temporary [`PanelBuffer`], multiplies, and frees
/// the panels before returning. C is overwritten.
///
/// # Panics
///
/// Panics if the views have inconsistent shapes or no available kernel
/// tiles `m × n × k` exactly.
pub fn multiply(a: MatrixView, b: MatrixView, c: MatrixViewMut) {
    let shape = GemmShape::of_output(&a, &b, &c);
    let kernel = kernels::kernel_for(shape).unwrap_or_else(|| {
        // report the mismatch against the preferred kernel
        let kernel = select_kernel();
        shape.assert_fits(kernel.tile());
        kernel
    });

    let panels = PanelBuffer::pack(kernel, a, b);
    panels.multiply(kernel, c);
}

/// Reorder A and B into the layout of [`select_kernel`].
///
/// `a_out` must hold exactly `m·k` elements and `b_out` `k·n`.
pub fn reorder(a: MatrixView, b: MatrixView, a_out: &mut [f32], b_out: &mut [f32]) {
    select_kernel().reorder(a, b, a_out, b_out);
}

/// C = A * B from panels produced by [`reorder`].
pub fn multiply_packed(a_panels: &[f32], b_panels: &[f32], c: MatrixViewMut, shape: GemmShape) {
    select_kernel().multiply_packed(a_panels, b_panels, c, shape);
}
