//! Matrix views, shapes and the reference multiply.
//!
//! These are the building blocks shared by the reorder transform, the
//! tiled kernels and the batch driver.

use std::fmt;

pub mod panel;
pub mod reference;
mod view;

pub use view::{MatrixView, MatrixViewMut};

/// Dimensions of one `C (m×n) = A (m×k) × B (k×n)` problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GemmShape {
    pub m: usize,
    pub n: usize,
    pub k: usize,
}

impl GemmShape {
    pub const fn new(m: usize, n: usize, k: usize) -> Self {
        GemmShape { m, n, k }
    }

    /// Shape of `a × b`.
    ///
    /// # Panics
    ///
    /// Panics if the columns of `a` do not match the rows of `b`.
    pub fn of(a: &MatrixView, b: &MatrixView) -> Self {
        assert_eq!(
            a.cols(),
            b.rows(),
            "A has {} columns but B has {} rows",
            a.cols(),
            b.rows()
        );
        GemmShape::new(a.rows(), b.cols(), a.cols())
    }

    /// Shape of `a × b`, checked against the output view.
    pub fn of_output(a: &MatrixView, b: &MatrixView, c: &MatrixViewMut) -> Self {
        let shape = Self::of(a, b);
        shape.assert_output(c);
        shape
    }

    pub fn a_len(&self) -> usize {
        self.m * self.k
    }

    pub fn b_len(&self) -> usize {
        self.k * self.n
    }

    pub fn c_len(&self) -> usize {
        self.m * self.n
    }

    /// Floating point operations for one multiply (one mul + one add per term).
    pub fn flops(&self) -> f64 {
        2.0 * (self.m * self.n * self.k) as f64
    }

    /// True if any dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.m == 0 || self.n == 0 || self.k == 0
    }

    /// True if the shape is made of whole tiles.
    pub fn fits(&self, tile: TileDims) -> bool {
        self.m % tile.height == 0 && self.n % tile.width == 0 && self.k % tile.depth == 0
    }

    /// Fail fast if the shape is not a whole number of tiles.
    ///
    /// There is no remainder path, so this is a precondition of every
    /// reorder and tiled multiply.
    pub fn assert_fits(&self, tile: TileDims) {
        assert!(
            self.m % tile.height == 0,
            "m={} is not a multiple of tile height {}",
            self.m,
            tile.height
        );
        assert!(
            self.n % tile.width == 0,
            "n={} is not a multiple of tile width {}",
            self.n,
            tile.width
        );
        assert!(
            self.k % tile.depth == 0,
            "k={} is not a multiple of vector width {}",
            self.k,
            tile.depth
        );
    }

    pub fn assert_output(&self, c: &MatrixViewMut) {
        assert!(
            c.rows() == self.m && c.cols() == self.n,
            "C is {}x{}, expected {}x{}",
            c.rows(),
            c.cols(),
            self.m,
            self.n
        );
    }
}

impl fmt::Display for GemmShape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}x{}", self.m, self.n, self.k)
    }
}

/// Register tile of a kernel.
///
/// `height` rows and `width` columns of C are accumulated together, and the
/// shared dimension is consumed `depth` elements (one vector) at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileDims {
    pub height: usize,
    pub width: usize,
    pub depth: usize,
}

impl TileDims {
    /// # Panics
    ///
    /// Panics unless `height % 4 == 0` and `width % depth == 0`.
    pub const fn new(height: usize, width: usize, depth: usize) -> Self {
        assert!(height > 0 && height % 4 == 0, "tile height must be a multiple of 4");
        assert!(
            depth > 0 && width > 0 && width % depth == 0,
            "tile width must be a multiple of the vector width"
        );
        TileDims {
            height,
            width,
            depth,
        }
    }
}

impl fmt::Display for TileDims {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}/{}", self.height, self.width, self.depth)
    }
}
