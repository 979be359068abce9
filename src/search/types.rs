//! Search result and the strategy capability shared by all backends.

use crate::error::Result;
use crate::geometry::City;
use rand::Rng;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one search call.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchResult {
    /// Best order found. Always a permutation of the city indices.
    pub order: Vec<usize>,

    /// Cyclic length of `order`.
    pub fitness: f64,

    /// Cyclic length of the order the search started from.
    pub initial_fitness: f64,

    /// Move draws consumed (sequential) or trials issued across all workers
    /// (accelerator).
    pub iterations: usize,

    /// Number of accepted, strictly improving moves. Accelerator runs report
    /// 1 when the reduced order beats the initial one, 0 otherwise.
    pub improving_moves: usize,

    /// Wall-clock time of the call.
    pub elapsed: Duration,

    /// Whether the cancellation token or the time limit stopped the search.
    pub cancelled: bool,

    /// Name of the backend that produced this result.
    pub backend: String,

    /// Best fitness sampled at regular intervals. Non-increasing.
    pub fitness_history: Vec<f64>,
}

impl SearchResult {
    /// Relative improvement over the starting order, in `[0, 1]`.
    pub fn improvement(&self) -> f64 {
        if self.initial_fitness > 0.0 {
            (self.initial_fitness - self.fitness) / self.initial_fitness
        } else {
            0.0
        }
    }
}

/// A tour search backend.
///
/// Every backend accepts the same input and returns the same result shape,
/// so callers and tests can swap them freely. Results are not bit-identical
/// across backends.
pub trait SearchStrategy {
    /// Short backend name, used in logs and [`SearchResult::backend`].
    fn name(&self) -> &'static str;

    /// Searches for a shorter tour starting from `initial`.
    ///
    /// `rng` is the only source of randomness; a seeded generator makes the
    /// sequential backend fully reproducible.
    fn search_with_cancel<R: Rng + ?Sized>(
        &self,
        cities: &[City],
        initial: &[usize],
        rng: &mut R,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<SearchResult>;

    /// Searches without a cancellation token.
    fn search<R: Rng + ?Sized>(
        &self,
        cities: &[City],
        initial: &[usize],
        rng: &mut R,
    ) -> Result<SearchResult> {
        self.search_with_cancel(cities, initial, rng, None)
    }
}
