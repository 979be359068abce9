//! Randomized 2-opt tour search.
//!
//! Every backend implements [`SearchStrategy`]: same input (cities, an
//! initial order, a random source), same [`SearchResult`]. The
//! [`SequentialRunner`] is a single-threaded greedy hill climber; the
//! accelerator backends in [`crate::accel`] run many independent climbers
//! in one dispatch. [`Strategy`] picks one from a [`SearchConfig`].
//!
//! Only strictly improving moves are accepted. There is no annealing and
//! no acceptance of worse tours, so the result is a local optimum of the
//! 2-opt neighborhood at best.

mod config;
mod sequential;
mod strategy;
mod types;

pub use config::{Backend, SearchConfig, MAX_WORKERS};
pub use sequential::SequentialRunner;
pub use strategy::{with_fallback, Strategy};
pub use types::{SearchResult, SearchStrategy};
