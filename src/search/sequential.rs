//! Sequential hill-climbing loop.
//!
//! # Algorithm
//!
//! 1. Start from the caller's order; its fitness is the best so far
//! 2. Each iteration draws two uniform positions `i`, `j`
//!    - `i == j`: skip, the draw still consumes the iteration
//!    - otherwise reverse the segment and evaluate the candidate
//! 3. Keep the candidate only if it is strictly shorter (greedy acceptance)
//! 4. After the budget is spent, return the best order
//!
//! Rejected candidates are undone by applying the same move again, so the
//! loop needs no per-iteration allocation.

use super::config::SearchConfig;
use super::types::{SearchResult, SearchStrategy};
use crate::error::Result;
use crate::geometry::{tour_length, validate_tour, City};
use crate::two_opt::random_move;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// How often the wall-clock limit is polled, in iterations.
const DEADLINE_POLL: usize = 256;

/// Single-threaded randomized 2-opt hill climbing.
#[derive(Debug, Clone, Default)]
pub struct SequentialRunner {
    config: SearchConfig,
}

impl SequentialRunner {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }
}

impl SearchStrategy for SequentialRunner {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn search_with_cancel<R: Rng + ?Sized>(
        &self,
        cities: &[City],
        initial: &[usize],
        rng: &mut R,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<SearchResult> {
        self.config.validate()?;
        validate_tour(cities, initial)?;

        let start = Instant::now();
        let deadline = self.config.time_limit.map(|limit| start + limit);
        let n = cities.len();

        info!(
            event = "search_start",
            backend = self.name(),
            cities = n,
            iterations = self.config.iterations,
        );

        let mut best = initial.to_vec();
        let initial_fitness = tour_length(cities, &best);
        let mut best_fitness = initial_fitness;

        let history_interval = self.config.history_interval;
        let mut fitness_history = Vec::new();
        if history_interval > 0 {
            fitness_history.push(best_fitness);
        }

        let mut iterations = 0usize;
        let mut improving_moves = 0usize;
        let mut cancelled = false;

        while iterations < self.config.iterations {
            if let Some(ref flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    cancelled = true;
                    break;
                }
            }
            if let Some(deadline) = deadline {
                if iterations % DEADLINE_POLL == 0 && Instant::now() >= deadline {
                    cancelled = true;
                    break;
                }
            }

            iterations += 1;

            if let Some(mv) = random_move(n, rng) {
                mv.apply_in_place(&mut best);
                let candidate_fitness = tour_length(cities, &best);
                if candidate_fitness < best_fitness {
                    best_fitness = candidate_fitness;
                    improving_moves += 1;
                } else {
                    mv.apply_in_place(&mut best);
                }
            }

            if history_interval > 0 && iterations % history_interval == 0 {
                fitness_history.push(best_fitness);
            }
        }

        if history_interval > 0
            && fitness_history
                .last()
                .is_none_or(|&last| (last - best_fitness).abs() > 1e-15)
        {
            fitness_history.push(best_fitness);
        }

        if cancelled {
            debug!(event = "search_cancelled", backend = self.name(), iterations);
        }

        let elapsed = start.elapsed();
        info!(
            event = "search_end",
            backend = self.name(),
            duration_ms = elapsed.as_millis() as u64,
            iterations,
            improving_moves,
            fitness = best_fitness,
        );

        Ok(SearchResult {
            order: best,
            fitness: best_fitness,
            initial_fitness,
            iterations,
            improving_moves,
            elapsed,
            cancelled,
            backend: self.name().to_string(),
            fitness_history,
        })
    }
}
