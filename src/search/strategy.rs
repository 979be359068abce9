//! Backend selection by configuration, with sequential fallback.

use super::config::{Backend, SearchConfig};
use super::sequential::SequentialRunner;
use super::types::{SearchResult, SearchStrategy};
use crate::accel::{AcceleratorRunner, HostDevice};
#[cfg(feature = "cuda")]
use crate::accel::CudaDevice;
use crate::error::Result;
use crate::geometry::City;
use crate::kernel::KernelSource;
use rand::Rng;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::warn;

/// The backend chosen by [`SearchConfig::backend`].
///
/// Accelerated variants carry a sequential runner when
/// `fallback_to_sequential` is set; a device failure is then logged and the
/// same input is searched on the host instead.
///
/// # Examples
///
/// ```
/// use u_tsp::geometry::City;
/// use u_tsp::kernel::KernelSource;
/// use u_tsp::search::{Backend, SearchConfig, SearchStrategy, Strategy};
///
/// let cities = [
///     City::new(0.0, 0.0),
///     City::new(0.0, 1.0),
///     City::new(1.0, 1.0),
///     City::new(1.0, 0.0),
/// ];
/// let config = SearchConfig::default().with_backend(Backend::Host).with_seed(1);
/// let strategy = Strategy::from_config(&config, KernelSource::bundled());
/// let result = strategy.search(&cities, &[0, 2, 1, 3], &mut config.rng()).unwrap();
/// assert!((result.fitness - 4.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub enum Strategy {
    Sequential(SequentialRunner),
    Host {
        accelerator: AcceleratorRunner<HostDevice>,
        fallback: Option<SequentialRunner>,
    },
    #[cfg(feature = "cuda")]
    Cuda {
        accelerator: AcceleratorRunner<CudaDevice>,
        fallback: Option<SequentialRunner>,
    },
}

impl Strategy {
    /// Builds the configured backend.
    ///
    /// Without the `cuda` feature, [`Backend::Cuda`] degrades to the
    /// sequential backend when fallback is enabled, and to a strategy that
    /// fails with [`SearchError::Platform`](crate::error::SearchError::Platform)
    /// otherwise.
    pub fn from_config(config: &SearchConfig, kernel: KernelSource) -> Self {
        let fallback = config
            .fallback_to_sequential
            .then(|| SequentialRunner::new(config.clone()));
        match config.backend {
            Backend::Sequential => Strategy::Sequential(SequentialRunner::new(config.clone())),
            Backend::Host => Strategy::Host {
                accelerator: AcceleratorRunner::new(
                    HostDevice::new().with_parallel(config.parallel),
                    kernel,
                    config.clone(),
                ),
                fallback,
            },
            #[cfg(feature = "cuda")]
            Backend::Cuda => Strategy::Cuda {
                accelerator: AcceleratorRunner::new(CudaDevice::default(), kernel, config.clone()),
                fallback,
            },
            #[cfg(not(feature = "cuda"))]
            Backend::Cuda => {
                warn!(
                    event = "backend_unavailable",
                    backend = "cuda",
                    reason = "built without the `cuda` feature",
                );
                Strategy::Host {
                    accelerator: AcceleratorRunner::new(
                        HostDevice::unavailable(),
                        kernel,
                        config.clone(),
                    ),
                    fallback,
                }
            }
        }
    }
}

impl SearchStrategy for Strategy {
    fn name(&self) -> &'static str {
        match self {
            Strategy::Sequential(runner) => runner.name(),
            Strategy::Host { accelerator, .. } => accelerator.name(),
            #[cfg(feature = "cuda")]
            Strategy::Cuda { accelerator, .. } => accelerator.name(),
        }
    }

    fn search_with_cancel<R: Rng + ?Sized>(
        &self,
        cities: &[City],
        initial: &[usize],
        rng: &mut R,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<SearchResult> {
        match self {
            Strategy::Sequential(runner) => runner.search_with_cancel(cities, initial, rng, cancel),
            Strategy::Host {
                accelerator,
                fallback,
            } => with_fallback(accelerator, fallback.as_ref(), cities, initial, rng, cancel),
            #[cfg(feature = "cuda")]
            Strategy::Cuda {
                accelerator,
                fallback,
            } => with_fallback(accelerator, fallback.as_ref(), cities, initial, rng, cancel),
        }
    }
}

/// Runs `primary`; on a device error, retries on `fallback` if present.
pub fn with_fallback<S, R>(
    primary: &S,
    fallback: Option<&SequentialRunner>,
    cities: &[City],
    initial: &[usize],
    rng: &mut R,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<SearchResult>
where
    S: SearchStrategy,
    R: Rng + ?Sized,
{
    match primary.search_with_cancel(cities, initial, rng, cancel.clone()) {
        Err(err) if err.is_device_error() => match fallback {
            Some(runner) => {
                warn!(
                    event = "fallback",
                    from = primary.name(),
                    to = runner.name(),
                    error = %err,
                );
                runner.search_with_cancel(cities, initial, rng, cancel)
            }
            None => Err(err),
        },
        other => other,
    }
}

impl From<SequentialRunner> for Strategy {
    fn from(runner: SequentialRunner) -> Self {
        Strategy::Sequential(runner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::Stage;
    use crate::error::SearchError;
    use crate::random::create_rng;

    fn square() -> Vec<City> {
        vec![
            City::new(0.0, 0.0),
            City::new(0.0, 1.0),
            City::new(1.0, 1.0),
            City::new(1.0, 0.0),
        ]
    }

    #[test]
    fn test_selects_sequential() {
        let strategy = Strategy::from_config(&SearchConfig::default(), KernelSource::bundled());
        assert_eq!(strategy.name(), "sequential");
    }

    #[test]
    fn test_selects_host() {
        let config = SearchConfig::default().with_backend(Backend::Host);
        let strategy = Strategy::from_config(&config, KernelSource::bundled());
        assert_eq!(strategy.name(), "host");
    }

    #[test]
    fn test_fallback_on_device_error() {
        let config = SearchConfig::default().with_iterations(2000);
        let accelerator = AcceleratorRunner::new(
            HostDevice::new().with_fault(Stage::Build),
            KernelSource::bundled(),
            config.clone(),
        );
        let fallback = SequentialRunner::new(config);
        let result = with_fallback(
            &accelerator,
            Some(&fallback),
            &square(),
            &[0, 2, 1, 3],
            &mut create_rng(3),
            None,
        )
        .unwrap();
        assert_eq!(result.backend, "sequential");
        assert!((result.fitness - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_fallback_returns_error() {
        let config = SearchConfig::default();
        let accelerator = AcceleratorRunner::new(
            HostDevice::unavailable(),
            KernelSource::bundled(),
            config,
        );
        let err = with_fallback(&accelerator, None, &square(), &[0, 1, 2, 3], &mut create_rng(3), None)
            .unwrap_err();
        assert!(matches!(err, SearchError::Platform(_)));
    }

    #[test]
    fn test_invalid_input_never_falls_back() {
        let config = SearchConfig::default().with_backend(Backend::Host);
        let strategy = Strategy::from_config(&config, KernelSource::bundled());
        let err = strategy
            .search(&square(), &[0, 1, 2], &mut create_rng(1))
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidInput(_)));
    }

    #[test]
    fn test_bad_kernel_falls_back() {
        let config = SearchConfig::default()
            .with_backend(Backend::Host)
            .with_iterations(2000);
        let strategy = Strategy::from_config(&config, KernelSource::from_text("int main() {}"));
        let result = strategy
            .search(&square(), &[0, 2, 1, 3], &mut create_rng(8))
            .unwrap();
        assert_eq!(result.backend, "sequential");
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_cuda_without_feature() {
        let config = SearchConfig::default().with_backend(Backend::Cuda);
        let strategy = Strategy::from_config(&config, KernelSource::bundled());
        let result = strategy
            .search(&square(), &[0, 1, 2, 3], &mut create_rng(1))
            .unwrap();
        assert_eq!(result.backend, "sequential");

        let strict = Strategy::from_config(&config.with_fallback(false), KernelSource::bundled());
        assert!(matches!(
            strict.search(&square(), &[0, 1, 2, 3], &mut create_rng(1)),
            Err(SearchError::Platform(_))
        ));
    }
}
