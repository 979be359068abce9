//! Search configuration and backend selection.

use crate::error::{Result, SearchError};
use crate::random::create_rng;
use rand::rngs::StdRng;
use std::time::Duration;

/// Largest worker count a dispatch can index (`i32` work-item ids).
pub const MAX_WORKERS: usize = i32::MAX as usize;

/// Which implementation of the search runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Backend {
    /// Single-threaded host hill climbing.
    #[default]
    Sequential,

    /// Data-parallel dispatch on the host-emulated device.
    Host,

    /// Data-parallel dispatch on a CUDA device. Requires the `cuda` feature.
    Cuda,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Sequential => "sequential",
            Backend::Host => "host",
            Backend::Cuda => "cuda",
        }
    }

    /// `true` for backends that dispatch to a compute device.
    pub fn is_accelerated(&self) -> bool {
        !matches!(self, Backend::Sequential)
    }
}

impl std::str::FromStr for Backend {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" | "cpu" => Ok(Backend::Sequential),
            "host" => Ok(Backend::Host),
            "cuda" | "gpu" => Ok(Backend::Cuda),
            other => Err(SearchError::Config(format!("unknown backend '{other}'"))),
        }
    }
}

/// Configuration for a tour search.
///
/// The sequential backend uses `iterations`; the accelerator backends use
/// `workers`, `work_group_size` and `trials_per_worker`. Both honour
/// `time_limit` and the cancellation token passed to the runner.
///
/// # Examples
///
/// ```
/// use u_tsp::search::{Backend, SearchConfig};
///
/// let config = SearchConfig::default()
///     .with_iterations(20_000)
///     .with_backend(Backend::Host)
///     .with_work_group_size(32)
///     .with_seed(7);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SearchConfig {
    /// Number of random move draws for the sequential backend. Degenerate
    /// draws (`i == j`) consume a slot without being evaluated.
    pub iterations: usize,

    /// Random seed. `None` seeds from entropy.
    pub seed: Option<u64>,

    /// Wall-clock budget. `None` = no limit.
    pub time_limit: Option<Duration>,

    /// Which backend [`Strategy::from_config`](super::Strategy::from_config)
    /// builds.
    pub backend: Backend,

    /// Work-items per work-group on the device.
    pub work_group_size: usize,

    /// Number of parallel workers. `None` = one per city.
    pub workers: Option<usize>,

    /// Random 2-opt trials each worker performs.
    pub trials_per_worker: usize,

    /// Whether the host device runs work-groups on the rayon pool.
    pub parallel: bool,

    /// Retry on the sequential backend when the device fails.
    pub fallback_to_sequential: bool,

    /// Record the best fitness every this many iterations. 0 disables the
    /// history.
    pub history_interval: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            iterations: 1000,
            seed: None,
            time_limit: None,
            backend: Backend::default(),
            work_group_size: 64,
            workers: None,
            trials_per_worker: 1000,
            parallel: true,
            fallback_to_sequential: true,
            history_interval: 100,
        }
    }
}

impl SearchConfig {
    pub fn with_iterations(mut self, n: usize) -> Self {
        self.iterations = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_work_group_size(mut self, n: usize) -> Self {
        self.work_group_size = n;
        self
    }

    pub fn with_workers(mut self, n: usize) -> Self {
        self.workers = Some(n);
        self
    }

    pub fn with_trials_per_worker(mut self, n: usize) -> Self {
        self.trials_per_worker = n;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback_to_sequential = fallback;
        self
    }

    pub fn with_history_interval(mut self, n: usize) -> Self {
        self.history_interval = n;
        self
    }

    /// Builds the random source for one search call.
    pub fn rng(&self) -> StdRng {
        create_rng(self.seed.unwrap_or_else(rand::random))
    }

    /// Number of workers for a tour of `n` cities.
    pub fn worker_count(&self, n: usize) -> usize {
        self.workers.unwrap_or(n).max(1)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.work_group_size == 0 {
            return Err(SearchError::Config("work_group_size must be positive".into()));
        }
        if self.work_group_size > 1024 {
            return Err(SearchError::Config(format!(
                "work_group_size must be at most 1024, got {}",
                self.work_group_size
            )));
        }
        if self.workers == Some(0) {
            return Err(SearchError::Config("workers must be positive".into()));
        }
        if let Some(workers) = self.workers.filter(|&w| w > MAX_WORKERS) {
            return Err(SearchError::Config(format!(
                "workers must be at most {MAX_WORKERS}, got {workers}"
            )));
        }
        if self.trials_per_worker > u32::MAX as usize {
            return Err(SearchError::Config(format!(
                "trials_per_worker must fit in 32 bits, got {}",
                self.trials_per_worker
            )));
        }
        if self.time_limit == Some(Duration::ZERO) {
            return Err(SearchError::Config("time_limit must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
impl SearchConfig {
    /// Parses a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: SearchConfig =
            toml::from_str(s).map_err(|e| SearchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| SearchError::io(path, e))?;
        Self::from_toml_str(&text)
    }
}
