//! Per-element state for batched quasi-Newton optimization.
//!
//! Every batch element owns an [`ElementState`]: its current iterate, the
//! objective value and gradient there, its status, and a bounded
//! [`CurvatureHistory`] of recent `(sₖ, yₖ)` pairs where
//! `sₖ = xₖ₊₁ − xₖ` and `yₖ = gₖ₊₁ − gₖ`.

use crate::{
    compute::batch_ops::{all_finite, dot},
    optimization::optimizer::ElementStatus,
    types::{DMatrix, DVector, Scalar},
};
use num_traits::Float;

/// Fixed-capacity FIFO of curvature pairs stored in flat ring buffers.
///
/// Pushing into a full history overwrites the oldest pair in O(1); nothing is
/// shifted. Logical index 0 is always the oldest stored pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CurvatureHistory<T: Scalar> {
    s_flat: Vec<T>,
    y_flat: Vec<T>,
    rho: Vec<T>,
    dim: usize,
    capacity: usize,
    head: usize,
    len: usize,
}

impl<T: Scalar> CurvatureHistory<T> {
    /// Creates an empty history holding at most `capacity` pairs of dimension `dim`.
    pub fn new(capacity: usize, dim: usize) -> Self {
        debug_assert!(capacity > 0, "history capacity must be > 0");
        Self {
            s_flat: vec![T::zero(); capacity * dim],
            y_flat: vec![T::zero(); capacity * dim],
            rho: vec![T::zero(); capacity],
            dim,
            capacity,
            head: 0,
            len: 0,
        }
    }

    /// Checks the secant condition `⟨y, s⟩ > 0` on finite deltas.
    ///
    /// Pairs failing this check would make the implied inverse Hessian
    /// indefinite and must not be stored.
    pub fn curvature_valid(s: &[T], y: &[T]) -> bool {
        if !all_finite(s) || !all_finite(y) {
            return false;
        }
        let sy = dot(y, s);
        sy > T::MIN_CURVATURE && Float::is_finite(T::one() / sy)
    }

    /// Pushes a pair, evicting the oldest one when full.
    ///
    /// No curvature check is made; use [`Self::try_push`] for validated input.
    pub fn push(&mut self, s: &[T], y: &[T]) {
        debug_assert_eq!(s.len(), self.dim);
        debug_assert_eq!(y.len(), self.dim);
        let slot = if self.len < self.capacity {
            let slot = (self.head + self.len) % self.capacity;
            self.len += 1;
            slot
        } else {
            let slot = self.head;
            self.head = (self.head + 1) % self.capacity;
            slot
        };
        let off = slot * self.dim;
        self.s_flat[off..off + self.dim].copy_from_slice(s);
        self.y_flat[off..off + self.dim].copy_from_slice(y);
        self.rho[slot] = T::one() / dot(y, s);
    }

    /// Pushes the pair if it satisfies [`Self::curvature_valid`].
    ///
    /// Returns whether the pair was stored. A rejected pair leaves the
    /// history untouched.
    pub fn try_push(&mut self, s: &[T], y: &[T]) -> bool {
        if Self::curvature_valid(s, y) {
            self.push(s, y);
            true
        } else {
            false
        }
    }

    /// Number of stored pairs.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no pair is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of stored pairs.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Dimension of the stored vectors.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    fn slot(&self, i: usize) -> usize {
        debug_assert!(i < self.len);
        (self.head + i) % self.capacity
    }

    /// Position delta at logical index `i` (0 = oldest).
    #[inline]
    pub fn s(&self, i: usize) -> &[T] {
        let off = self.slot(i) * self.dim;
        &self.s_flat[off..off + self.dim]
    }

    /// Gradient delta at logical index `i`.
    #[inline]
    pub fn y(&self, i: usize) -> &[T] {
        let off = self.slot(i) * self.dim;
        &self.y_flat[off..off + self.dim]
    }

    /// `1 / ⟨yᵢ, sᵢ⟩` at logical index `i`.
    #[inline]
    pub fn rho(&self, i: usize) -> T {
        self.rho[self.slot(i)]
    }

    /// Most recently stored pair, if any.
    pub fn newest(&self) -> Option<(&[T], &[T])> {
        self.len.checked_sub(1).map(|i| (self.s(i), self.y(i)))
    }

    /// Removes every stored pair.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Stored position deltas, one row per pair, oldest first.
    pub fn position_deltas(&self) -> DMatrix<T> {
        DMatrix::from_fn(self.len, self.dim, |i, j| self.s(i)[j])
    }

    /// Stored gradient deltas, one row per pair, oldest first.
    pub fn gradient_deltas(&self) -> DMatrix<T> {
        DMatrix::from_fn(self.len, self.dim, |i, j| self.y(i)[j])
    }
}

/// State of one batch element.
#[derive(Debug, Clone)]
pub struct ElementState<T: Scalar> {
    /// Current iterate
    pub position: DVector<T>,
    /// Objective value at `position`
    pub value: T,
    /// Objective gradient at `position`
    pub gradient: DVector<T>,
    /// Lifecycle status
    pub status: ElementStatus,
    /// Completed outer iterations
    pub iterations: usize,
    /// Recent curvature pairs
    pub history: CurvatureHistory<T>,
}

impl<T: Scalar> ElementState<T> {
    /// Creates a running element at `position` with the given evaluation.
    pub fn new(position: DVector<T>, value: T, gradient: DVector<T>, memory_size: usize) -> Self {
        let dim = position.len();
        Self {
            position,
            value,
            gradient,
            status: ElementStatus::Running,
            iterations: 0,
            history: CurvatureHistory::new(memory_size, dim),
        }
    }

    /// Returns true while the element still takes part in iterations.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    /// Moves to an accepted point and records the curvature pair.
    ///
    /// Returns whether the pair passed the curvature check. Terminal elements
    /// are left untouched.
    pub fn advance(&mut self, position: DVector<T>, value: T, gradient: DVector<T>) -> bool {
        if !self.is_running() {
            return false;
        }
        let s = &position - &self.position;
        let y = &gradient - &self.gradient;
        let stored = self.history.try_push(s.as_slice(), y.as_slice());

        self.position = position;
        self.value = value;
        self.gradient = gradient;
        stored
    }

    /// Sets the status, unless the element is already terminal.
    pub fn finish(&mut self, status: ElementStatus) {
        if self.is_running() {
            self.status = status;
        }
    }
}
