use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use rand_distr::Normal;

use crate::error::{fatal, GradError};
use crate::mat::numeric::Float;
use crate::mat::pool::FillPolicy;

/// Dense row-major 2-D matrix. Scalars are `1x1` matrices and vectors are
/// matrices with a single row or a single column.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

fn shape_mismatch(operation: &str, expected: (usize, usize), actual: (usize, usize)) -> ! {
    fatal(GradError::ShapeMismatch {
        operation: operation.to_string(),
        expected,
        actual,
    })
}

impl<T: Float> Matrix<T> {
    pub(crate) fn from_raw(rows: usize, cols: usize, data: Vec<T>) -> Self {
        Matrix { rows, cols, data }
    }

    /// Creates a matrix from row-major data.
    ///
    /// # Panics
    /// If `data.len() != rows * cols`.
    pub fn new(rows: usize, cols: usize, data: Vec<T>) -> Self {
        if data.len() != rows * cols {
            shape_mismatch("Matrix::new", (rows, cols), (data.len(), 1));
        }
        Matrix { rows, cols, data }
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix::full(rows, cols, T::zero())
    }

    pub fn ones(rows: usize, cols: usize) -> Self {
        Matrix::full(rows, cols, T::one())
    }

    pub fn full(rows: usize, cols: usize, value: T) -> Self {
        Matrix {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    pub fn scalar(value: T) -> Self {
        Matrix::full(1, 1, value)
    }

    /// Column vector holding `data`.
    pub fn from_vec(data: Vec<T>) -> Self {
        Matrix {
            rows: data.len(),
            cols: 1,
            data,
        }
    }

    pub fn row_vector(data: Vec<T>) -> Self {
        Matrix {
            rows: 1,
            cols: data.len(),
            data,
        }
    }

    pub fn identity(size: usize) -> Self {
        let mut m = Matrix::zeros(size, size);
        for i in 0..size {
            m.data[i * size + i] = T::one();
        }
        m
    }

    /// Matrix with elements drawn from `N(mean, std)`.
    pub fn random_normal<R: Rng + ?Sized>(
        rows: usize,
        cols: usize,
        mean: f64,
        std: f64,
        rng: &mut R,
    ) -> Result<Self, GradError> {
        let normal = Normal::new(mean, std).map_err(|e| GradError::InvalidArgument {
            operation: "random_normal".to_string(),
            message: e.to_string(),
        })?;
        let data = (0..rows * cols).map(|_| T::cast(normal.sample(rng))).collect();
        Ok(Matrix { rows, cols, data })
    }

    /// Matrix with elements drawn uniformly from `[low, high)`.
    pub fn random_uniform<R: Rng + ?Sized>(
        rows: usize,
        cols: usize,
        low: f64,
        high: f64,
        rng: &mut R,
    ) -> Result<Self, GradError> {
        if !(low < high) {
            return Err(GradError::InvalidArgument {
                operation: "random_uniform".to_string(),
                message: format!("empty range [{}, {})", low, high),
            });
        }
        let uniform = Uniform::new(low, high);
        let data = (0..rows * cols).map(|_| T::cast(uniform.sample(rng))).collect();
        Ok(Matrix { rows, cols, data })
    }

    // --- Pool integration ---

    /// Takes a matrix from the process-wide pool of this element width.
    pub fn acquire(rows: usize, cols: usize, fill: FillPolicy) -> Self {
        T::pool().acquire(rows, cols, fill)
    }

    pub(crate) fn acquire_full(rows: usize, cols: usize, value: T) -> Self {
        let mut m = Matrix::acquire(rows, cols, FillPolicy::Uninitialized);
        m.data.iter_mut().for_each(|v| *v = value);
        m
    }

    pub(crate) fn acquire_from_slice(rows: usize, cols: usize, data: &[T]) -> Self {
        if data.len() != rows * cols {
            shape_mismatch("Matrix::acquire_from_slice", (rows, cols), (data.len(), 1));
        }
        let mut m = Matrix::acquire(rows, cols, FillPolicy::Uninitialized);
        m.data.copy_from_slice(data);
        m
    }

    /// Hands the buffer back to the pool. The matrix is consumed, so it
    /// cannot be read afterwards.
    pub fn release(self) {
        T::pool().release(self)
    }

    /// Copy backed by a pooled buffer.
    pub fn copy_pooled(&self) -> Self {
        Matrix::acquire_from_slice(self.rows, self.cols, &self.data)
    }

    pub(crate) fn into_data(self) -> Vec<T> {
        self.data
    }

    // --- Shape ---

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of elements.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_scalar(&self) -> bool {
        self.data.len() == 1
    }

    pub fn is_vector(&self) -> bool {
        self.rows == 1 || self.cols == 1
    }

    pub fn same_dims(&self, other: &Matrix<T>) -> bool {
        self.rows == other.rows && self.cols == other.cols
    }

    /// True when both are vectors with the same number of elements,
    /// whatever their orientation.
    pub fn vectors_of_same_size(&self, other: &Matrix<T>) -> bool {
        self.is_vector() && other.is_vector() && self.size() == other.size()
    }

    /// Elementwise compatibility rule shared by all elementwise operations.
    pub(crate) fn check_compatible(&self, other: &Matrix<T>, operation: &str) {
        if !(self.same_dims(other) || self.vectors_of_same_size(other)) {
            shape_mismatch(operation, self.shape(), other.shape());
        }
    }

    // --- Access ---

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    fn check_index(&self, row: usize, col: usize) {
        if row >= self.rows || col >= self.cols {
            fatal(GradError::IndexOutOfBounds {
                row,
                col,
                shape: self.shape(),
            });
        }
    }

    pub fn at(&self, row: usize, col: usize) -> T {
        self.check_index(row, col);
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: T) {
        self.check_index(row, col);
        self.data[row * self.cols + col] = value;
    }

    /// The only element of a `1x1` matrix.
    pub fn scalar_value(&self) -> T {
        if !self.is_scalar() {
            fatal(GradError::NotAScalar {
                operation: "scalar_value".to_string(),
                rows: self.rows,
                cols: self.cols,
            });
        }
        self.data[0]
    }

    pub fn row(&self, i: usize) -> &[T] {
        self.check_index(i, 0);
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Copy of row `i` as a `1 x cols` row vector.
    pub fn extract_row(&self, i: usize) -> Matrix<T> {
        Matrix::acquire_from_slice(1, self.cols, self.row(i))
    }

    /// Copy of column `j` as a `rows x 1` column vector.
    pub fn column(&self, j: usize) -> Matrix<T> {
        self.check_index(0, j);
        let mut out = Matrix::acquire(self.rows, 1, FillPolicy::Uninitialized);
        for i in 0..self.rows {
            out.data[i] = self.data[i * self.cols + j];
        }
        out
    }

    /// Sub-matrix of rows `row_start..row_end` and columns `col_start..col_end`.
    pub fn slice(&self, row_start: usize, col_start: usize, row_end: usize, col_end: usize) -> Matrix<T> {
        if row_start > row_end || col_start > col_end || row_end > self.rows || col_end > self.cols {
            fatal(GradError::IndexOutOfBounds {
                row: row_end,
                col: col_end,
                shape: self.shape(),
            });
        }
        let (rows, cols) = (row_end - row_start, col_end - col_start);
        let mut out = Matrix::acquire(rows, cols, FillPolicy::Uninitialized);
        for i in 0..rows {
            let src = (row_start + i) * self.cols + col_start;
            out.data[i * cols..(i + 1) * cols].copy_from_slice(&self.data[src..src + cols]);
        }
        out
    }

    // --- Elementwise ---

    pub fn map(&self, f: impl Fn(T) -> T) -> Matrix<T> {
        let mut out = Matrix::acquire(self.rows, self.cols, FillPolicy::Uninitialized);
        for (o, &v) in out.data.iter_mut().zip(&self.data) {
            *o = f(v);
        }
        out
    }

    /// Applies `f` pairwise; the result has the shape of `self`.
    pub fn zip_map(&self, other: &Matrix<T>, operation: &str, f: impl Fn(T, T) -> T) -> Matrix<T> {
        self.check_compatible(other, operation);
        let mut out = Matrix::acquire(self.rows, self.cols, FillPolicy::Uninitialized);
        for ((o, &a), &b) in out.data.iter_mut().zip(&self.data).zip(&other.data) {
            *o = f(a, b);
        }
        out
    }

    pub fn add(&self, other: &Matrix<T>) -> Matrix<T> {
        self.zip_map(other, "Add", |a, b| a + b)
    }

    pub fn sub(&self, other: &Matrix<T>) -> Matrix<T> {
        self.zip_map(other, "Sub", |a, b| a - b)
    }

    /// Hadamard product.
    pub fn prod(&self, other: &Matrix<T>) -> Matrix<T> {
        self.zip_map(other, "Prod", |a, b| a * b)
    }

    pub fn div(&self, other: &Matrix<T>) -> Matrix<T> {
        self.zip_map(other, "Div", |a, b| a / b)
    }

    pub fn add_in_place(&mut self, other: &Matrix<T>) {
        self.check_compatible(other, "AddInPlace");
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
    }

    pub fn sub_in_place(&mut self, other: &Matrix<T>) {
        self.check_compatible(other, "SubInPlace");
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a -= b;
        }
    }

    pub fn prod_in_place(&mut self, other: &Matrix<T>) {
        self.check_compatible(other, "ProdInPlace");
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a *= b;
        }
    }

    pub fn scale(&self, factor: T) -> Matrix<T> {
        self.map(|v| v * factor)
    }

    pub fn scale_in_place(&mut self, factor: T) {
        self.data.iter_mut().for_each(|v| *v *= factor);
    }

    pub fn add_scalar(&self, s: T) -> Matrix<T> {
        self.map(|v| v + s)
    }

    pub fn sub_scalar(&self, s: T) -> Matrix<T> {
        self.map(|v| v - s)
    }

    // --- Reductions ---

    pub fn sum(&self) -> T {
        self.data.iter().fold(T::zero(), |acc, &v| acc + v)
    }

    pub fn max(&self) -> T {
        self.data[self.argmax()]
    }

    /// Flat index of the first maximum element.
    pub fn argmax(&self) -> usize {
        if self.data.is_empty() {
            fatal(GradError::EmptyOperands("argmax".to_string()));
        }
        let mut best = 0;
        for (i, &v) in self.data.iter().enumerate().skip(1) {
            if v > self.data[best] {
                best = i;
            }
        }
        best
    }

    /// Euclidean norm of all elements.
    pub fn norm(&self) -> T {
        self.data.iter().fold(T::zero(), |acc, &v| acc + v * v).sqrt()
    }

    /// Inner product of two vectors of the same size.
    pub fn dot(&self, other: &Matrix<T>) -> T {
        self.check_compatible(other, "Dot");
        self.data
            .iter()
            .zip(&other.data)
            .fold(T::zero(), |acc, (&a, &b)| acc + a * b)
    }

    /// Numerically stable softmax over all elements.
    pub fn softmax(&self) -> Matrix<T> {
        let max = self.max();
        let mut out = self.map(|v| (v - max).exp());
        let total = out.sum();
        out.data.iter_mut().for_each(|v| *v /= total);
        out
    }

    // --- Linear algebra ---

    /// Matrix product `self · other`.
    pub fn mul(&self, other: &Matrix<T>) -> Matrix<T> {
        if self.cols != other.rows {
            shape_mismatch("Mul", (self.cols, other.cols), (other.rows, other.cols));
        }
        let (n, k, m) = (self.rows, self.cols, other.cols);
        let mut out = Matrix::acquire(n, m, FillPolicy::Zeroed);
        for i in 0..n {
            for p in 0..k {
                let a = self.data[i * k + p];
                if a == T::zero() {
                    continue;
                }
                let out_row = &mut out.data[i * m..(i + 1) * m];
                let b_row = &other.data[p * m..(p + 1) * m];
                for (o, &b) in out_row.iter_mut().zip(b_row) {
                    *o += a * b;
                }
            }
        }
        out
    }

    pub fn transpose(&self) -> Matrix<T> {
        let mut out = Matrix::acquire(self.cols, self.rows, FillPolicy::Uninitialized);
        for i in 0..self.rows {
            for j in 0..self.cols {
                out.data[j * self.rows + i] = self.data[i * self.cols + j];
            }
        }
        out
    }

    // --- Structural ---

    /// Same elements in row-major order under a new shape.
    pub fn reshape(&self, rows: usize, cols: usize) -> Matrix<T> {
        if rows * cols != self.size() {
            shape_mismatch("Reshape", (rows, cols), self.shape());
        }
        Matrix::acquire_from_slice(rows, cols, &self.data)
    }

    /// `self` followed by one extra row per vector in `vs`.
    pub fn append_rows(&self, vs: &[&Matrix<T>]) -> Matrix<T> {
        let mut out = Matrix::acquire(self.rows + vs.len(), self.cols, FillPolicy::Uninitialized);
        out.data[..self.size()].copy_from_slice(&self.data);
        for (i, v) in vs.iter().enumerate() {
            if !v.is_vector() || v.size() != self.cols {
                shape_mismatch("AppendRows", (1, self.cols), v.shape());
            }
            let start = (self.rows + i) * self.cols;
            out.data[start..start + self.cols].copy_from_slice(&v.data);
        }
        out
    }

    /// One row per operand; every operand must hold the same number of elements.
    pub fn stack(vs: &[&Matrix<T>]) -> Matrix<T> {
        let first = match vs.first() {
            Some(first) => first,
            None => fatal(GradError::EmptyOperands("Stack".to_string())),
        };
        let cols = first.size();
        let mut out = Matrix::acquire(vs.len(), cols, FillPolicy::Uninitialized);
        for (i, v) in vs.iter().enumerate() {
            if v.size() != cols {
                shape_mismatch("Stack", (1, cols), v.shape());
            }
            out.data[i * cols..(i + 1) * cols].copy_from_slice(&v.data);
        }
        out
    }

    /// Column vector holding the elements of every operand in turn.
    pub fn concat_vectors(vs: &[&Matrix<T>]) -> Matrix<T> {
        if vs.is_empty() {
            fatal(GradError::EmptyOperands("Concat".to_string()));
        }
        let size = vs.iter().map(|v| v.size()).sum();
        let mut out = Matrix::acquire(size, 1, FillPolicy::Uninitialized);
        let mut offset = 0;
        for v in vs {
            out.data[offset..offset + v.size()].copy_from_slice(&v.data);
            offset += v.size();
        }
        out
    }

    /// Splits the elements into consecutive column vectors of the given sizes.
    pub fn split_vector(&self, sizes: &[usize]) -> Vec<Matrix<T>> {
        let total: usize = sizes.iter().sum();
        if total != self.size() {
            shape_mismatch("SplitVector", (total, 1), self.shape());
        }
        let mut offset = 0;
        sizes
            .iter()
            .map(|&size| {
                let part = Matrix::acquire_from_slice(size, 1, &self.data[offset..offset + size]);
                offset += size;
                part
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "matrix_test.rs"]
mod tests;
