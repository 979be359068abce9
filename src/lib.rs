//! Randomized 2-opt local search for the Traveling Salesman Problem.
//!
//! Given 2-D city coordinates and an initial visiting order, the search
//! repeatedly reverses random tour segments and keeps every reversal that
//! shortens the cyclic tour. It is a stochastic improvement heuristic, not
//! an exact solver.
//!
//! - **Geometry**: cities, Euclidean distance, cyclic tour fitness
//! - **2-opt**: segment reversal over a cyclic order (an involution)
//! - **Sequential search**: single-threaded greedy hill climbing
//! - **Accelerator search**: many independent climbers in one data-parallel
//!   dispatch, reduced to the best tour on the host. Runs on the
//!   host-emulated device or, with the `cuda` feature, on a CUDA GPU.
//! - **TSPLIB**: reading `NODE_COORD_SECTION` problem files
//!
//! Backends share the [`search::SearchStrategy`] contract, so any of them
//! can be selected from a [`search::SearchConfig`] and a device failure can
//! fall back to the sequential search.
//!
//! # Examples
//!
//! ```
//! use u_tsp::geometry::City;
//! use u_tsp::random::create_rng;
//! use u_tsp::search::{SearchConfig, SearchStrategy, SequentialRunner};
//!
//! let cities = vec![
//!     City::new(0.0, 0.0),
//!     City::new(1.0, 1.0),
//!     City::new(0.0, 1.0),
//!     City::new(1.0, 0.0),
//! ];
//! let runner = SequentialRunner::new(SearchConfig::default().with_iterations(2000));
//! let result = runner.search(&cities, &[0, 1, 2, 3], &mut create_rng(42)).unwrap();
//! assert!((result.fitness - 4.0).abs() < 1e-9);
//! ```

pub mod accel;
pub mod error;
pub mod geometry;
pub mod kernel;
pub mod problem;
pub mod random;
pub mod search;
pub mod two_opt;

pub use error::{Result, SearchError};
