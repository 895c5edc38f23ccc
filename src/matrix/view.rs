/// Borrowed view of a row-major f32 matrix.
///
/// The view never owns its data. Rows are `row_stride` elements apart,
/// and only the first `cols` elements of each row belong to the matrix.
///
/// # Example
///
/// ```
/// use panel_gemm::MatrixView;
///
/// let data = [1.0, 2.0, 3.0,
///             4.0, 5.0, 6.0];
/// let m = MatrixView::new(&data, 2, 3);
///
/// assert_eq!(m.row(1), &[4.0, 5.0, 6.0]);
/// assert_eq!(m.get(0, 2), 3.0);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct MatrixView<'a> {
    data: &'a [f32],
    rows: usize,
    cols: usize,
    row_stride: usize,
}

/// Mutable counterpart of [`MatrixView`], used for the output matrix C.
#[derive(Debug)]
pub struct MatrixViewMut<'a> {
    data: &'a mut [f32],
    rows: usize,
    cols: usize,
    row_stride: usize,
}

/// Minimum buffer length for a `rows × cols` matrix with the given stride.
fn required_len(rows: usize, cols: usize, row_stride: usize) -> usize {
    if rows == 0 {
        0
    } else {
        (rows - 1) * row_stride + cols
    }
}

fn check_layout(len: usize, rows: usize, cols: usize, row_stride: usize) {
    assert!(
        row_stride >= cols,
        "row stride {} is smaller than column count {}",
        row_stride,
        cols
    );
    let needed = required_len(rows, cols, row_stride);
    assert!(
        len >= needed,
        "buffer holds {} elements, {}x{} matrix with stride {} needs {}",
        len,
        rows,
        cols,
        row_stride,
        needed
    );
}

impl<'a> MatrixView<'a> {
    /// View over a fully packed matrix (`row_stride == cols`).
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != rows * cols`.
    pub fn new(data: &'a [f32], rows: usize, cols: usize) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "expected {}x{}={} elements",
            rows,
            cols,
            rows * cols
        );
        Self::with_stride(data, rows, cols, cols)
    }

    /// View whose rows are `row_stride` elements apart.
    ///
    /// # Panics
    ///
    /// Panics if `row_stride < cols` or the buffer is too short.
    pub fn with_stride(data: &'a [f32], rows: usize, cols: usize, row_stride: usize) -> Self {
        check_layout(data.len(), rows, cols, row_stride);
        MatrixView {
            data,
            rows,
            cols,
            row_stride,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    /// True if rows follow each other without gaps.
    pub fn is_packed(&self) -> bool {
        self.row_stride == self.cols
    }

    /// The underlying buffer, including any padding between rows.
    pub fn data(&self) -> &'a [f32] {
        self.data
    }

    /// Row `i`, without the stride padding.
    pub fn row(&self, i: usize) -> &'a [f32] {
        let start = i * self.row_stride;
        &self.data[start..start + self.cols]
    }

    pub fn get(&self, i: usize, j: usize) -> f32 {
        assert!(j < self.cols, "column {} out of range {}", j, self.cols);
        self.data[i * self.row_stride + j]
    }
}

impl<'a> MatrixViewMut<'a> {
    /// Mutable view over a fully packed matrix.
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != rows * cols`.
    pub fn new(data: &'a mut [f32], rows: usize, cols: usize) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "expected {}x{}={} elements",
            rows,
            cols,
            rows * cols
        );
        Self::with_stride(data, rows, cols, cols)
    }

    /// Mutable view whose rows are `row_stride` elements apart.
    pub fn with_stride(data: &'a mut [f32], rows: usize, cols: usize, row_stride: usize) -> Self {
        check_layout(data.len(), rows, cols, row_stride);
        MatrixViewMut {
            data,
            rows,
            cols,
            row_stride,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub fn row(&self, i: usize) -> &[f32] {
        let start = i * self.row_stride;
        &self.data[start..start + self.cols]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        let start = i * self.row_stride;
        &mut self.data[start..start + self.cols]
    }

    /// The underlying buffer, including any padding between rows.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut *self.data
    }

    pub fn as_view(&self) -> MatrixView<'_> {
        MatrixView {
            data: &*self.data,
            rows: self.rows,
            cols: self.cols,
            row_stride: self.row_stride,
        }
    }
}
