//! Accelerator search: marshal, dispatch, reduce.

use super::device::{ComputeDevice, DeviceJob, DeviceOutput};
use crate::error::{Result, SearchError};
use crate::geometry::{tour_length, validate_tour, City};
use crate::kernel::KernelSource;
use crate::search::{SearchConfig, SearchResult, SearchStrategy};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runs the 2-opt search as one data-parallel dispatch on a
/// [`ComputeDevice`].
///
/// Each worker writes only its own result slot. The slots are reduced on
/// the host to the minimum-fitness tour (lowest worker index on ties).
#[derive(Debug, Clone)]
pub struct AcceleratorRunner<D> {
    device: D,
    kernel: KernelSource,
    config: SearchConfig,
}

impl<D: ComputeDevice> AcceleratorRunner<D> {
    pub fn new(device: D, kernel: KernelSource, config: SearchConfig) -> Self {
        Self {
            device,
            kernel,
            config,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn kernel(&self) -> &KernelSource {
        &self.kernel
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }
}

impl<D: ComputeDevice> SearchStrategy for AcceleratorRunner<D> {
    fn name(&self) -> &'static str {
        self.device.name()
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
        let n = cities.len();
        if n > i32::MAX as usize {
            return Err(SearchError::InvalidInput(format!(
                "{n} cities exceed the device index range"
            )));
        }

        let start = Instant::now();
        let deadline = self.config.time_limit.map(|limit| start + limit);
        let initial_fitness = tour_length(cities, initial);
        let workers = self.config.worker_count(n);
        let trials = self.config.trials_per_worker as u32;
        let iterations = workers.checked_mul(trials as usize).ok_or_else(|| {
            SearchError::Config(format!(
                "{workers} workers x {trials} trials overflow the iteration count"
            ))
        })?;

        info!(
            event = "search_start",
            backend = self.name(),
            cities = n,
            workers,
            trials_per_worker = trials,
            work_group_size = self.config.work_group_size,
        );

        let result = |order: Vec<usize>, fitness: f64, iterations: usize, cancelled: bool| {
            let fitness_history = if self.config.history_interval > 0 {
                vec![initial_fitness, fitness]
            } else {
                Vec::new()
            };
            SearchResult {
                order,
                fitness,
                initial_fitness,
                iterations,
                improving_moves: usize::from(fitness < initial_fitness),
                elapsed: start.elapsed(),
                cancelled,
                backend: self.name().to_string(),
                fitness_history,
            }
        };

        if cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            debug!(event = "search_cancelled", backend = self.name());
            return Ok(result(initial.to_vec(), initial_fitness, 0, true));
        }

        let coords: Vec<f64> = cities.iter().flat_map(|c| [c.x, c.y]).collect();
        let order: Vec<i32> = initial.iter().map(|&c| c as i32).collect();
        let job = DeviceJob {
            coords: &coords,
            order: &order,
            workers,
            work_group_size: self.config.work_group_size,
            trials_per_worker: trials,
            seed: rng.random(),
            kernel: &self.kernel,
            cancel: cancel.as_deref(),
            deadline,
        };

        let output = self.device.execute(&job).inspect_err(|e| {
            warn!(event = "device_error", backend = self.name(), error = %e);
        })?;
        let (best_worker, best_order) = reduce_slots(&output, cities, workers)?;
        let best_fitness = tour_length(cities, &best_order);
        let device_fitness = output.slot_fitness[best_worker];
        if (device_fitness - best_fitness).abs() > 1e-6 * best_fitness.max(1.0) {
            debug!(
                event = "fitness_mismatch",
                device_fitness,
                host_fitness = best_fitness,
            );
        }

        let (order, fitness) = if best_fitness < initial_fitness {
            (best_order, best_fitness)
        } else {
            (initial.to_vec(), initial_fitness)
        };
        let cancelled = cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed))
            || deadline.is_some_and(|d| Instant::now() >= d);

        let result = result(order, fitness, iterations, cancelled);
        info!(
            event = "search_end",
            backend = self.name(),
            duration_ms = result.elapsed.as_millis() as u64,
            best_worker,
            fitness = result.fitness,
        );
        Ok(result)
    }
}

/// Selects the minimum-fitness worker slot and returns it as a tour.
///
/// NaN fitness values never win. Ties go to the lowest worker index.
///
/// # Errors
/// [`SearchError::Dispatch`] if the output has the wrong shape or the
/// winning slot is not a permutation of the city indices.
pub fn reduce_slots(
    output: &DeviceOutput,
    cities: &[City],
    workers: usize,
) -> Result<(usize, Vec<usize>)> {
    let n = cities.len();
    if output.slot_fitness.len() != workers || Some(output.slot_orders.len()) != workers.checked_mul(n) {
        return Err(SearchError::Dispatch(format!(
            "device returned {} fitness values and {} order entries for {workers} workers of {n} cities",
            output.slot_fitness.len(),
            output.slot_orders.len()
        )));
    }

    let (best_worker, _) = output
        .slot_fitness
        .iter()
        .enumerate()
        .filter(|(_, f)| !f.is_nan())
        .min_by(|a, b| a.1.total_cmp(b.1))
        .ok_or_else(|| SearchError::Dispatch("no worker produced a fitness".into()))?;

    let slot = &output.slot_orders[best_worker * n..(best_worker + 1) * n];
    let order = slot
        .iter()
        .map(|&c| usize::try_from(c))
        .collect::<std::result::Result<Vec<usize>, _>>()
        .map_err(|_| SearchError::Dispatch(format!("worker {best_worker} wrote a negative index")))?;
    validate_tour(cities, &order).map_err(|e| {
        SearchError::Dispatch(format!("worker {best_worker} wrote an invalid tour: {e}"))
    })?;

    Ok((best_worker, order))
}
