//! Core tensor data structures and operations.
//!
//! # Core Tensor Utilities
//!
//! This module defines the numeric array every other module computes with.
//!
//! It supports:
//! - Construction of N-dimensional tensors with shape and row-major data layout
//! - Elementwise arithmetic and unary maps
//! - Column broadcasting of `[rows, 1]` bias tensors across a batch
//! - Transpose, matrix product and row reduction on 2D tensors
//! - Slicing along the leading (sample) axis
//! - Compile-time tensor literals through [`tensor!`](crate::tensor)
//!
//! ## Layout conventions
//! - Dense activations are column-major in the *batch* sense: `[features, batch]`.
//! - Spatial activations are batch-first NHWC: `[batch, height, width, channels]`.
//! - Datasets arrive batch-first (`[samples, ...]`) and are sliced along axis 0.
//!
//! ## Limitations
//! - Row-major only
//! - Shape mismatches are programmer errors and panic
//!
//! ## Example
//!
//! ```rust
//! use netvis::tensors::Tensor;
//! let t = Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! assert_eq!(t.shape, vec![2, 3]);
//! assert_eq!(t.transpose().shape, vec![3, 2]);
//! ```

use core::ops::Range;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Represents an N-dimensional tensor with a shape and flat row-major data.
///
/// - All elements must be the same type (`T`).
/// - `shape` defines the structure, e.g., `[2, 3]` for a 2×3 matrix.
/// - `data` holds the flattened content in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    pub shape: Vec<usize>,
    pub data: Vec<T>,
}

/// The tensor every propagation routine works with.
pub type Ten64 = Tensor<f64>;

impl<T> Tensor<T> {
    /// Creates a new tensor with the given shape and flat data.
    ///
    /// # Panics
    /// Panics if the number of elements in `data` does not match the shape product.
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Self {
        let shape = shape.into();
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape {:?} is incompatible with {} data elements",
            shape,
            data.len()
        );
        Self { shape, data }
    }

    /// Number of stored elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Reinterprets the data under a new shape of equal volume.
    ///
    /// # Panics
    /// Panics if the element counts differ.
    #[must_use]
    pub fn reshape(self, shape: impl Into<Vec<usize>>) -> Self {
        Self::new(shape, self.data)
    }
}

impl Ten64 {
    /// A tensor of the given shape filled with `0.0`.
    #[must_use]
    pub fn zeros(shape: impl Into<Vec<usize>>) -> Self {
        let shape = shape.into();
        let len = shape.iter().product();
        Self::new(shape, vec![0.0; len])
    }

    /// Standard-normal samples multiplied by `scale`.
    pub fn randn<R: Rng + ?Sized>(shape: impl Into<Vec<usize>>, scale: f64, rng: &mut R) -> Self {
        let shape = shape.into();
        let len = shape.iter().product();
        let data = (0..len)
            .map(|_| {
                let z: f64 = StandardNormal.sample(rng);
                z * scale
            })
            .collect();
        Self::new(shape, data)
    }

    /// Rows of a 2D tensor.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    /// Columns of a 2D tensor.
    #[must_use]
    pub fn cols(&self) -> usize {
        self.shape[1]
    }

    /// Element at `(row, col)` of a 2D tensor.
    #[must_use]
    pub fn at(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.shape[1] + col]
    }

    /// Applies `f` to every element.
    #[must_use]
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self::new(self.shape.clone(), self.data.iter().map(|&x| f(x)).collect())
    }

    /// Combines two equally shaped tensors element by element.
    ///
    /// # Panics
    /// Panics if shapes do not match.
    #[must_use]
    pub fn zip_map(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        assert_eq!(self.shape, other.shape, "elementwise shape mismatch");
        Self::new(
            self.shape.clone(),
            self.data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        )
    }

    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        self.zip_map(other, |a, b| a + b)
    }

    #[must_use]
    pub fn sub(&self, other: &Self) -> Self {
        self.zip_map(other, |a, b| a - b)
    }

    #[must_use]
    pub fn mul(&self, other: &Self) -> Self {
        self.zip_map(other, |a, b| a * b)
    }

    #[must_use]
    pub fn div(&self, other: &Self) -> Self {
        self.zip_map(other, |a, b| a / b)
    }

    #[must_use]
    pub fn scale(&self, k: f64) -> Self {
        self.map(|x| x * k)
    }

    /// In-place `self -= lr * grad`.
    ///
    /// # Panics
    /// Panics if shapes do not match.
    pub fn sub_scaled(&mut self, grad: &Self, lr: f64) {
        assert_eq!(self.shape, grad.shape, "update shape mismatch");
        for (w, g) in self.data.iter_mut().zip(&grad.data) {
            *w -= lr * g;
        }
    }

    /// Adds a `[rows, 1]` column to every column of a `[rows, cols]` tensor.
    ///
    /// # Panics
    /// Panics if `self` is not 2D or the column height differs.
    #[must_use]
    pub fn add_column(&self, column: &Self) -> Self {
        assert_eq!(self.rank(), 2, "column broadcast needs a 2D tensor");
        assert_eq!(
            column.shape,
            vec![self.rows(), 1],
            "bias shape {:?} does not broadcast over {:?}",
            column.shape,
            self.shape
        );
        let cols = self.cols();
        let data = self
            .data
            .chunks(cols)
            .zip(&column.data)
            .flat_map(|(row, &b)| row.iter().map(move |&x| x + b))
            .collect();
        Self::new(self.shape.clone(), data)
    }

    /// Transpose of a 2D tensor.
    ///
    /// # Panics
    /// Panics if `self` is not 2D.
    #[must_use]
    pub fn transpose(&self) -> Self {
        assert_eq!(self.rank(), 2, "transpose needs a 2D tensor");
        let (r, c) = (self.rows(), self.cols());
        let mut data = vec![0.0; r * c];
        for i in 0..r {
            for j in 0..c {
                data[j * r + i] = self.data[i * c + j];
            }
        }
        Self::new(vec![c, r], data)
    }

    /// Matrix product `self · other` for `[m, k] · [k, n]`.
    ///
    /// # Panics
    /// Panics if the inner dimensions differ or either operand is not 2D.
    #[must_use]
    pub fn matmul(&self, other: &Self) -> Self {
        assert!(self.rank() == 2 && other.rank() == 2, "matmul needs 2D tensors");
        let (m, k, n) = (self.rows(), self.cols(), other.cols());
        assert_eq!(k, other.rows(), "matmul shape mismatch");
        Self::new(vec![m, n], crate::ops::cpu::matmul(&self.data, &other.data, m, k, n))
    }

    /// Sums each row of a 2D tensor, keeping the reduced axis: `[r, c] -> [r, 1]`.
    #[must_use]
    pub fn sum_rows(&self) -> Self {
        assert_eq!(self.rank(), 2, "row sum needs a 2D tensor");
        let data = self.data.chunks(self.cols()).map(|row| row.iter().sum()).collect();
        Self::new(vec![self.rows(), 1], data)
    }

    /// Sum of all elements.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Whether every element is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }

    /// Samples `range` along axis 0, keeping every trailing axis.
    ///
    /// # Panics
    /// Panics if the range exceeds the leading dimension.
    #[must_use]
    pub fn slice_samples(&self, range: Range<usize>) -> Self {
        assert!(range.end <= self.shape[0], "sample range out of bounds");
        let stride: usize = self.shape[1..].iter().product();
        let mut shape = self.shape.clone();
        shape[0] = range.len();
        Self::new(shape, self.data[range.start * stride..range.end * stride].to_vec())
    }

    /// Index of the largest entry in column `col` of a 2D tensor.
    #[must_use]
    pub fn argmax_column(&self, col: usize) -> usize {
        (0..self.rows())
            .max_by(|&a, &b| self.at(a, col).total_cmp(&self.at(b, col)))
            .unwrap_or(0)
    }
}

/// Defines a tensor from nested literal arrays.
///
/// Supports arbitrary dimensionality as long as sublists are uniform in shape.
/// Leaves are arbitrary numeric expressions, so negative literals work.
///
/// # Example
/// ```
/// use netvis::tensor;
/// let t = tensor!([[1.0, -2.0], [3.0, 4.0]]);
/// assert_eq!(t.shape, vec![2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    ([ $( [ $($inner:tt)* ] ),+ $(,)? ]) => {{
        let children = vec![ $( $crate::tensor!([ $($inner)* ]) ),+ ];
        let first_shape = children[0].shape.clone();
        assert!(children.iter().all(|c| c.shape == first_shape),
            "ragged tensor literal (rows have mismatched shapes)");
        let mut shape = vec![children.len()];
        shape.extend_from_slice(&first_shape);
        let mut data: Vec<f64> = Vec::with_capacity(children.len() * children[0].data.len());
        for c in children { data.extend(c.data); }
        $crate::tensors::Tensor::new(shape, data)
    }};

    ([ $( $x:expr ),+ $(,)? ]) => {{
        let data: Vec<f64> = vec![ $( $x as f64 ),+ ];
        $crate::tensors::Tensor::new(vec![data.len()], data)
    }};
}
