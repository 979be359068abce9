//! 2-opt segment reversal over a cyclic tour.
//!
//! A move `(i, j)` reverses the tour between positions `i` and `j`
//! (inclusive). Swap pairs are indexed modulo the tour length, so the
//! operator is well defined on the cyclic tour rather than only on the
//! underlying array.
//!
//! The move is an involution: applying it twice restores the original
//! order exactly. The search backends rely on this to undo rejected
//! candidates in place.
//!
//! # References
//!
//! - Croes (1958), "A Method for Solving Traveling-Salesman Problems"

use rand::Rng;

/// A pair of tour positions whose enclosed segment is reversed.
///
/// Positions are normalized on construction so that `i <= j`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TwoOptMove {
    i: usize,
    j: usize,
}

impl TwoOptMove {
    /// Creates a move from two positions in either order.
    pub fn new(a: usize, b: usize) -> Self {
        if a <= b {
            Self { i: a, j: b }
        } else {
            Self { i: b, j: a }
        }
    }

    /// Lower position.
    pub fn i(&self) -> usize {
        self.i
    }

    /// Upper position.
    pub fn j(&self) -> usize {
        self.j
    }

    /// `true` when both positions coincide. Such a move changes nothing and
    /// callers should skip it instead of evaluating it.
    pub fn is_degenerate(&self) -> bool {
        self.i == self.j
    }

    /// Reverses the segment in place.
    ///
    /// Generic over the element type so device-side `i32` slots share the
    /// same operator.
    ///
    /// # Panics
    /// Panics if `j` is not a valid position of `order`.
    pub fn apply_in_place<T>(&self, order: &mut [T]) {
        let n = order.len();
        assert!(self.j < n, "move ({}, {}) out of range for tour of {n}", self.i, self.j);
        let swaps = (self.j - self.i + 1) / 2;
        for k in 0..swaps {
            order.swap((self.i + k) % n, (self.j - k) % n);
        }
    }

    /// Returns a new order with the segment reversed.
    ///
    /// # Panics
    /// Panics if `j` is not a valid position of `order`.
    pub fn apply<T: Clone>(&self, order: &[T]) -> Vec<T> {
        let mut next = order.to_vec();
        self.apply_in_place(&mut next);
        next
    }
}

/// Reverses the tour between positions `i` and `j`, returning a new order.
///
/// # Examples
///
/// ```
/// use u_tsp::two_opt::two_opt_swap;
///
/// let order = vec![0, 1, 2, 3, 4, 5];
/// assert_eq!(two_opt_swap(&order, 4, 1), vec![0, 4, 3, 2, 1, 5]);
/// ```
pub fn two_opt_swap(order: &[usize], i: usize, j: usize) -> Vec<usize> {
    TwoOptMove::new(i, j).apply(order)
}

/// Draws two independent uniform positions in `0..n`.
///
/// Returns `None` when the draws coincide; the caller still counts the
/// attempt against its budget.
///
/// # Panics
/// Panics if `n == 0`.
pub fn random_move<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Option<TwoOptMove> {
    let a = rng.random_range(0..n);
    let b = rng.random_range(0..n);
    let mv = TwoOptMove::new(a, b);
    (!mv.is_degenerate()).then_some(mv)
}
