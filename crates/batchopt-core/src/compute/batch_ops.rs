//! Batch storage and vector algebra.
//!
//! A batch of `n` problems of dimension `d` is stored row by row in one
//! contiguous buffer: `[x₀₀ … x₀ₐ, x₁₀ … x₁ₐ, …]`, so every element's vector
//! is a contiguous slice. All the free functions below work on slices of
//! equal length and reduce strictly in index order, which keeps results
//! bit-for-bit reproducible whatever the batch layout or thread count.

use crate::{
    error::{OptimizerError, OptimizerResult},
    types::{DMatrix, DVector, Scalar},
};
use nalgebra::{DVectorView, DVectorViewMut};
use num_traits::Float;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Row-major batch of equally sized vectors, one row per batch element.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Batch<T: Scalar> {
    /// Contiguous storage for all rows
    data: Vec<T>,
    /// Dimension of each row
    dim: usize,
    /// Number of rows in the batch
    n_rows: usize,
}

impl<T: Scalar> Batch<T> {
    /// Creates a zero-filled batch of `n_rows` vectors of dimension `dim`.
    pub fn zeros(n_rows: usize, dim: usize) -> Self {
        Self {
            data: vec![T::zero(); n_rows * dim],
            dim,
            n_rows,
        }
    }

    /// Creates a batch from a flat row-major buffer.
    pub fn from_flat(n_rows: usize, dim: usize, data: Vec<T>) -> OptimizerResult<Self> {
        if data.len() != n_rows * dim {
            return Err(OptimizerError::dimension_mismatch(
                format!("{} values for a {}x{} batch", n_rows * dim, n_rows, dim),
                format!("{} values", data.len()),
            ));
        }
        Ok(Self { data, dim, n_rows })
    }

    /// Creates a batch from a list of rows, which must all share one length.
    pub fn from_rows(rows: &[DVector<T>]) -> OptimizerResult<Self> {
        let dim = rows.first().map_or(0, DVector::len);
        let mut data = Vec::with_capacity(rows.len() * dim);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(OptimizerError::dimension_mismatch(
                    format!("row {i} of dimension {dim}"),
                    format!("dimension {}", row.len()),
                ));
            }
            data.extend(row.iter().copied());
        }
        Ok(Self {
            data,
            dim,
            n_rows: rows.len(),
        })
    }

    /// Creates a batch of size one holding a single vector.
    pub fn from_vector(vector: &DVector<T>) -> Self {
        Self {
            data: vector.iter().copied().collect(),
            dim: vector.len(),
            n_rows: 1,
        }
    }

    /// Creates a batch from a matrix whose rows are the batch elements.
    pub fn from_matrix(matrix: &DMatrix<T>) -> Self {
        let (n_rows, dim) = matrix.shape();
        let mut data = Vec::with_capacity(n_rows * dim);
        for row in matrix.row_iter() {
            data.extend(row.iter().copied());
        }
        Self { data, dim, n_rows }
    }

    /// Converts the batch to a matrix whose rows are the batch elements.
    pub fn to_matrix(&self) -> DMatrix<T> {
        DMatrix::from_row_slice(self.n_rows, self.dim, &self.data)
    }

    /// Returns the dimension of each row.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Returns the number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.n_rows
    }

    /// Returns true if the batch holds no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    /// Gets an immutable slice for a row (zero-copy access).
    #[inline]
    pub fn row(&self, index: usize) -> &[T] {
        debug_assert!(index < self.n_rows);
        let start = index * self.dim;
        &self.data[start..start + self.dim]
    }

    /// Gets a mutable slice for a row (zero-copy access).
    #[inline]
    pub fn row_mut(&mut self, index: usize) -> &mut [T] {
        debug_assert!(index < self.n_rows);
        let start = index * self.dim;
        &mut self.data[start..start + self.dim]
    }

    /// Gets an immutable nalgebra view of a row.
    #[inline]
    pub fn row_view(&self, index: usize) -> DVectorView<'_, T> {
        DVectorView::from_slice(self.row(index), self.dim)
    }

    /// Gets a mutable nalgebra view of a row.
    #[inline]
    pub fn row_view_mut(&mut self, index: usize) -> DVectorViewMut<'_, T> {
        let dim = self.dim;
        DVectorViewMut::from_slice(self.row_mut(index), dim)
    }

    /// Copies a row into an owned vector.
    pub fn row_vector(&self, index: usize) -> DVector<T> {
        DVector::from_column_slice(self.row(index))
    }

    /// Overwrites a row.
    pub fn set_row(&mut self, index: usize, values: &[T]) {
        self.row_mut(index).copy_from_slice(values);
    }

    /// Iterates over the rows in batch order.
    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        // `max(1)` keeps chunks_exact valid for zero-dimensional rows.
        self.data.chunks_exact(self.dim.max(1)).take(self.n_rows)
    }

    /// Returns true if every entry of the row is finite.
    pub fn is_finite_row(&self, index: usize) -> bool {
        all_finite(self.row(index))
    }

    /// Flat row-major view of the whole batch.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Applies `op` to every row and collects one output per row, in row order.
    ///
    /// With the `parallel` feature the rows are processed by rayon; the
    /// collected output order is still the row order.
    #[cfg(feature = "parallel")]
    pub fn map_rows<R, F>(&self, op: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize, &[T]) -> R + Sync + Send,
    {
        (0..self.n_rows)
            .into_par_iter()
            .map(|i| op(i, self.row(i)))
            .collect()
    }

    /// Applies `op` to every row and collects one output per row, in row order.
    #[cfg(not(feature = "parallel"))]
    pub fn map_rows<R, F>(&self, op: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize, &[T]) -> R + Sync + Send,
    {
        (0..self.n_rows).map(|i| op(i, self.row(i))).collect()
    }
}

/// Dot product `⟨a, b⟩`, accumulated in index order.
#[inline]
pub fn dot<T: Scalar>(a: &[T], b: &[T]) -> T {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .fold(T::zero(), |acc, (&x, &y)| acc + x * y)
}

/// Euclidean norm `‖a‖₂`.
#[inline]
pub fn norm<T: Scalar>(a: &[T]) -> T {
    Float::sqrt(dot(a, a))
}

/// Infinity norm `max |aᵢ|`. NaN entries propagate.
#[inline]
pub fn inf_norm<T: Scalar>(a: &[T]) -> T {
    a.iter().fold(T::zero(), |acc, &x| {
        let ax = Float::abs(x);
        if Float::is_nan(ax) || ax > acc {
            ax
        } else {
            acc
        }
    })
}

/// In-place `y ← y + alpha·x`.
#[inline]
pub fn axpy<T: Scalar>(alpha: T, x: &[T], y: &mut [T]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, &xi) in y.iter_mut().zip(x.iter()) {
        *yi += alpha * xi;
    }
}

/// In-place `x ← alpha·x`.
#[inline]
pub fn scale<T: Scalar>(alpha: T, x: &mut [T]) {
    for xi in x.iter_mut() {
        *xi *= alpha;
    }
}

/// Returns `x + alpha·d` as a new vector.
pub fn add_scaled<T: Scalar>(x: &[T], alpha: T, d: &[T]) -> Vec<T> {
    debug_assert_eq!(x.len(), d.len());
    x.iter().zip(d.iter()).map(|(&xi, &di)| xi + alpha * di).collect()
}

/// Returns `a - b` as a new vector.
pub fn sub<T: Scalar>(a: &[T], b: &[T]) -> Vec<T> {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(&x, &y)| x - y).collect()
}

/// Returns true if every entry is finite.
#[inline]
pub fn all_finite<T: Scalar>(a: &[T]) -> bool {
    a.iter().all(|&x| Float::is_finite(x))
}

/// Row-wise dot products of two batches of equal shape.
pub fn row_dots<T: Scalar>(a: &Batch<T>, b: &Batch<T>) -> Vec<T> {
    debug_assert_eq!((a.len(), a.dim()), (b.len(), b.dim()));
    (0..a.len()).map(|i| dot(a.row(i), b.row(i))).collect()
}

/// Row-wise infinity norms.
pub fn row_inf_norms<T: Scalar>(a: &Batch<T>) -> Vec<T> {
    (0..a.len()).map(|i| inf_norm(a.row(i))).collect()
}
