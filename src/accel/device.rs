//! The compute-device seam.

use crate::error::{Result, SearchError};
use crate::kernel::KernelSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// One data-parallel search, marshalled into device-friendly form.
///
/// Coordinates are interleaved (`x0, y0, x1, y1, ...`) and the order is
/// stored as `i32`, matching the kernel's argument types.
#[derive(Debug, Clone, Copy)]
pub struct DeviceJob<'a> {
    pub coords: &'a [f64],
    pub order: &'a [i32],
    pub workers: usize,
    pub work_group_size: usize,
    pub trials_per_worker: u32,
    pub seed: u64,
    pub kernel: &'a KernelSource,
    pub cancel: Option<&'a AtomicBool>,
    pub deadline: Option<Instant>,
}

impl DeviceJob<'_> {
    /// Tour length `N`.
    pub fn cities(&self) -> usize {
        self.order.len()
    }

    /// Number of work-groups; the last one may be partially filled.
    pub fn groups(&self) -> usize {
        self.workers.div_ceil(self.work_group_size)
    }

    /// Total work-items launched, including the idle tail of the last group.
    pub fn global_size(&self) -> usize {
        self.groups() * self.work_group_size
    }

    /// Entries in the per-worker result-order buffer, `workers * N`.
    /// `None` if the size does not fit in `usize`.
    pub fn slot_entries(&self) -> Option<usize> {
        self.workers.checked_mul(self.cities())
    }

    /// `true` once the cancellation token is set or the deadline passed.
    pub fn should_stop(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Per-worker results read back from the device.
///
/// Worker `w` owns `slot_orders[w * N .. (w + 1) * N]` and `slot_fitness[w]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceOutput {
    pub slot_orders: Vec<i32>,
    pub slot_fitness: Vec<f64>,
}

impl DeviceOutput {
    /// Output of a dispatch in which no worker ran a trial: every slot
    /// holds the initial order and its length.
    ///
    /// Devices return this when the job is cancelled or past its deadline
    /// before launch.
    pub fn unchanged(job: &DeviceJob<'_>) -> Result<Self> {
        let entries = job.slot_entries().ok_or_else(|| {
            Stage::Allocate(BufferRole::ResultOrders).error("slot size overflows usize")
        })?;
        let mut slot_orders = Vec::new();
        slot_orders
            .try_reserve_exact(entries)
            .map_err(|e| Stage::Allocate(BufferRole::ResultOrders).error(e))?;
        for _ in 0..job.workers {
            slot_orders.extend_from_slice(job.order);
        }
        let mut slot_fitness = Vec::new();
        slot_fitness
            .try_reserve_exact(job.workers)
            .map_err(|e| Stage::Allocate(BufferRole::ResultFitness).error(e))?;
        slot_fitness.resize(job.workers, slot_length(job.coords, job.order));
        Ok(Self {
            slot_orders,
            slot_fitness,
        })
    }
}

/// Cyclic tour length over interleaved coordinates.
pub(crate) fn slot_length(coords: &[f64], slot: &[i32]) -> f64 {
    let n = slot.len();
    (0..n)
        .map(|k| {
            let a = slot[k] as usize;
            let b = slot[(k + 1) % n] as usize;
            let dx = coords[2 * b] - coords[2 * a];
            let dy = coords[2 * b + 1] - coords[2 * a + 1];
            (dx * dx + dy * dy).sqrt()
        })
        .sum()
}

/// A step of the device protocol. Used to attribute failures and to
/// inject them in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Platform,
    Context,
    Queue,
    Allocate(BufferRole),
    Upload,
    Build,
    Kernel,
    Dispatch,
    Readback,
}

impl Stage {
    /// The error a failure at this stage is reported as.
    pub fn error(self, detail: impl std::fmt::Display) -> SearchError {
        let msg = format!("{self:?}: {detail}");
        match self {
            Stage::Platform | Stage::Context | Stage::Queue => SearchError::Platform(msg),
            Stage::Allocate(_) | Stage::Upload => SearchError::Allocation(msg),
            Stage::Build | Stage::Kernel => SearchError::Compile(msg),
            Stage::Dispatch | Stage::Readback => SearchError::Dispatch(msg),
        }
    }
}

/// The four device buffers of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    /// Read-only city coordinates.
    Coordinates,
    /// Read-write initial order.
    Order,
    /// Write-only per-worker result orders.
    ResultOrders,
    /// Write-only per-worker result fitness.
    ResultFitness,
}

/// A device that can run the `local_search` kernel.
///
/// Implementations acquire context, queue, the four buffers, program and
/// kernel in that order, each as a scoped value, so every exit path
/// (including `?` returns) releases them in exactly the reverse order.
pub trait ComputeDevice {
    /// Short device name, e.g. `"host"` or `"cuda"`.
    fn name(&self) -> &'static str;

    /// Runs one dispatch and reads back every worker slot.
    ///
    /// Blocks until the device has finished.
    fn execute(&self, job: &DeviceJob<'_>) -> Result<DeviceOutput>;
}

impl<D: ComputeDevice + ?Sized> ComputeDevice for &D {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn execute(&self, job: &DeviceJob<'_>) -> Result<DeviceOutput> {
        (**self).execute(job)
    }
}
