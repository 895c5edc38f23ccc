//! Owned scratch storage for reordered operands.

use super::{GemmShape, MatrixView, MatrixViewMut, TileDims};
use crate::kernels::Kernel;

/// Reordered A and B for one multiply, tagged with the layout they use.
///
/// The buffer owns its storage, so the panels are released when it is
/// dropped, including when a multiply panics part way through. Keep one
/// around and call [`repack`](PanelBuffer::repack) to reuse the allocation
/// across iterations, or multiply against the same panels several times to
/// amortize the reorder.
#[derive(Clone, Debug)]
pub struct PanelBuffer {
    a: Vec<f32>,
    b: Vec<f32>,
    shape: GemmShape,
    tile: TileDims,
}

impl PanelBuffer {
    /// Allocate zeroed panels for `shape` in `kernel`'s layout.
    ///
    /// # Panics
    ///
    /// Panics if `shape` is not a whole number of the kernel's tiles.
    pub fn new(kernel: &dyn Kernel, shape: GemmShape) -> Self {
        let tile = kernel.tile();
        shape.assert_fits(tile);
        PanelBuffer {
            a: vec![0.0; shape.a_len()],
            b: vec![0.0; shape.b_len()],
            shape,
            tile,
        }
    }

    /// Reorder `a` and `b` into freshly allocated panels.
    pub fn pack(kernel: &dyn Kernel, a: MatrixView, b: MatrixView) -> Self {
        let mut panels = PanelBuffer::new(kernel, GemmShape::of(&a, &b));
        panels.repack(kernel, a, b);
        panels
    }

    /// Reorder new operands into the existing allocation.
    ///
    /// # Panics
    ///
    /// Panics if the operands or the kernel differ in shape or tile from the
    /// ones this buffer was created for.
    pub fn repack(&mut self, kernel: &dyn Kernel, a: MatrixView, b: MatrixView) {
        assert_eq!(GemmShape::of(&a, &b), self.shape, "operand shape changed");
        assert_eq!(kernel.tile(), self.tile, "kernel tile changed");
        kernel.reorder(a, b, &mut self.a, &mut self.b);
    }

    /// Multiply the packed operands into `c` using `kernel`.
    ///
    /// # Panics
    ///
    /// Panics if `kernel` uses a different tile than the one the panels were
    /// packed for.
    pub fn multiply(&self, kernel: &dyn Kernel, c: MatrixViewMut) {
        assert_eq!(
            kernel.tile(),
            self.tile,
            "panels were packed for tile {}, kernel {} uses {}",
            self.tile,
            kernel.name(),
            kernel.tile()
        );
        kernel.multiply_packed(&self.a, &self.b, c, self.shape);
    }

    pub fn shape(&self) -> GemmShape {
        self.shape
    }

    pub fn tile(&self) -> TileDims {
        self.tile
    }

    /// Reordered A, `m·k` elements.
    pub fn a(&self) -> &[f32] {
        &self.a
    }

    /// Reordered B, `k·n` elements.
    pub fn b(&self) -> &[f32] {
        &self.b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::PortableKernel;
    use crate::reorder::{restore_a, restore_b};

    #[test]
    fn test_pack_sizes_and_restore() {
        let kernel = PortableKernel::default();
        let (m, n, k) = (16, 24, 8);
        let a: Vec<f32> = (0..m * k).map(|i| i as f32).collect();
        let b: Vec<f32> = (0..k * n).map(|i| -(i as f32)).collect();

        let panels = PanelBuffer::pack(&kernel, MatrixView::new(&a, m, k), MatrixView::new(&b, k, n));

        assert_eq!(panels.a().len(), m * k);
        assert_eq!(panels.b().len(), k * n);

        let mut a_back = vec![0.0; m * k];
        let mut b_back = vec![0.0; k * n];
        restore_a(panels.a(), MatrixViewMut::new(&mut a_back, m, k), panels.tile());
        restore_b(panels.b(), MatrixViewMut::new(&mut b_back, k, n), panels.tile());
        assert_eq!(a_back, a);
        assert_eq!(b_back, b);
    }

    #[test]
    fn test_reuse_panels_across_multiplies() {
        let kernel = PortableKernel::default();
        let (m, n, k) = (8, 16, 4);
        let a: Vec<f32> = (0..m * k).map(|i| (i % 5) as f32).collect();
        let b: Vec<f32> = (0..k * n).map(|i| (i % 3) as f32).collect();
        let panels = PanelBuffer::pack(&kernel, MatrixView::new(&a, m, k), MatrixView::new(&b, k, n));

        let mut first = vec![0.0; m * n];
        let mut second = vec![f32::NAN; m * n];
        panels.multiply(&kernel, MatrixViewMut::new(&mut first, m, n));
        panels.multiply(&kernel, MatrixViewMut::new(&mut second, m, n));

        assert_eq!(first, second);
    }

    #[test]
    #[should_panic(expected = "operand shape changed")]
    fn test_repack_rejects_new_shape() {
        let kernel = PortableKernel::default();
        let mut panels = PanelBuffer::new(&kernel, GemmShape::new(8, 8, 4));
        let a = vec![0.0; 16 * 4];
        let b = vec![0.0; 4 * 8];

        panels.repack(&kernel, MatrixView::new(&a, 16, 4), MatrixView::new(&b, 4, 8));
    }
}
