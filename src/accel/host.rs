//! Host-emulated compute device.
//!
//! [`HostDevice`] follows the same protocol as a real device (context,
//! queue, four buffers, program, kernel, dispatch, readback) but runs the
//! work-items on the host. Work-groups execute as rayon tasks; the
//! work-items of one group run in order, as on a single compute unit.
//!
//! The host device does not compile kernel text. Building the program
//! checks that the source declares the entry point and then runs the
//! built-in work-item routine, which implements the same contract as the
//! bundled kernel.
//!
//! Every resource is recorded in a [`ResourceLedger`], which makes the
//! release order observable.

use super::device::{slot_length, BufferRole, ComputeDevice, DeviceJob, DeviceOutput, Stage};
use crate::error::Result;
use crate::kernel::{KernelSource, KERNEL_ENTRY};
use crate::random::{create_rng, worker_seed};
use crate::two_opt::random_move;
use rayon::prelude::*;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// A device-side resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Context,
    Queue,
    Buffer(BufferRole),
    Program,
    Kernel,
}

/// An acquire or release of a [`Resource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEvent {
    Acquired(Resource),
    Released(Resource),
}

/// Shared log of resource acquisition and release.
#[derive(Debug, Clone, Default)]
pub struct ResourceLedger {
    events: Arc<Mutex<Vec<LedgerEvent>>>,
}

impl ResourceLedger {
    fn lock(&self) -> MutexGuard<'_, Vec<LedgerEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, event: LedgerEvent) {
        self.lock().push(event);
    }

    /// All events in the order they happened.
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.lock().clone()
    }

    pub fn acquired(&self) -> Vec<Resource> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                LedgerEvent::Acquired(r) => Some(*r),
                LedgerEvent::Released(_) => None,
            })
            .collect()
    }

    pub fn released(&self) -> Vec<Resource> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                LedgerEvent::Released(r) => Some(*r),
                LedgerEvent::Acquired(_) => None,
            })
            .collect()
    }

    /// Resources acquired but not yet released.
    pub fn live(&self) -> Vec<Resource> {
        let mut live = Vec::new();
        for event in self.lock().iter() {
            match event {
                LedgerEvent::Acquired(r) => live.push(*r),
                LedgerEvent::Released(r) => {
                    if let Some(pos) = live.iter().rposition(|x| x == r) {
                        live.remove(pos);
                    }
                }
            }
        }
        live
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// A value that records its release in the ledger when dropped.
struct Tracked<T> {
    resource: Resource,
    ledger: ResourceLedger,
    value: T,
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Tracked<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T> Drop for Tracked<T> {
    fn drop(&mut self) {
        debug!(event = "release", device = "host", resource = ?self.resource);
        self.ledger.record(LedgerEvent::Released(self.resource));
    }
}

/// Compute device emulated on the host CPU.
#[derive(Debug, Clone)]
pub struct HostDevice {
    available: bool,
    parallel: bool,
    fault: Option<Stage>,
    ledger: ResourceLedger,
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HostDevice {
    pub fn new() -> Self {
        Self {
            available: true,
            parallel: true,
            fault: None,
            ledger: ResourceLedger::default(),
        }
    }

    /// A device whose platform discovery finds nothing.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Whether work-groups run on the rayon pool or one after another.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Makes the given protocol stage fail.
    pub fn with_fault(mut self, stage: Stage) -> Self {
        self.fault = Some(stage);
        self
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    fn check(&self, stage: Stage) -> Result<()> {
        if self.fault == Some(stage) {
            return Err(stage.error("injected fault"));
        }
        Ok(())
    }

    fn acquire<T>(&self, stage: Stage, resource: Resource, value: T) -> Result<Tracked<T>> {
        self.check(stage)?;
        debug!(event = "acquire", device = "host", resource = ?resource);
        self.ledger.record(LedgerEvent::Acquired(resource));
        Ok(Tracked {
            resource,
            ledger: self.ledger.clone(),
            value,
        })
    }

    fn buffer<T: Clone>(&self, role: BufferRole, len: usize, fill: T) -> Result<Tracked<Vec<T>>> {
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|e| Stage::Allocate(role).error(e))?;
        data.resize(len, fill);
        self.acquire(Stage::Allocate(role), Resource::Buffer(role), data)
    }
}

impl ComputeDevice for HostDevice {
    fn name(&self) -> &'static str {
        "host"
    }

    fn execute(&self, job: &DeviceJob<'_>) -> Result<DeviceOutput> {
        if !self.available {
            return Err(Stage::Platform.error("no host compute platform available"));
        }
        self.check(Stage::Platform)?;

        let n = job.cities();
        let _context = self.acquire(Stage::Context, Resource::Context, ())?;
        let _queue = self.acquire(Stage::Queue, Resource::Queue, ())?;

        let mut coords = self.buffer(BufferRole::Coordinates, job.coords.len(), 0.0f64)?;
        let mut order = self.buffer(BufferRole::Order, n, 0i32)?;
        let entries = job.slot_entries().ok_or_else(|| {
            Stage::Allocate(BufferRole::ResultOrders).error("slot size overflows usize")
        })?;
        let mut slot_orders = self.buffer(BufferRole::ResultOrders, entries, 0i32)?;
        let mut slot_fitness = self.buffer(BufferRole::ResultFitness, job.workers, f64::INFINITY)?;

        self.check(Stage::Upload)?;
        coords.copy_from_slice(job.coords);
        order.copy_from_slice(job.order);

        let _program = self.acquire(Stage::Build, Resource::Program, job.kernel.text())?;
        if !job.kernel.declares_entry() {
            return Err(Stage::Build.error(format!(
                "program does not declare entry point `{KERNEL_ENTRY}`"
            )));
        }
        if let Some(path) = uncompiled_file(job.kernel) {
            warn!(
                event = "kernel_not_compiled",
                device = "host",
                path = %path.display(),
                "host device runs its built-in work-item routine; the kernel file is only checked for `{KERNEL_ENTRY}`"
            );
        }
        let _kernel = self.acquire(Stage::Kernel, Resource::Kernel, KERNEL_ENTRY)?;

        self.check(Stage::Dispatch)?;
        debug!(
            event = "dispatch",
            device = "host",
            workers = job.workers,
            groups = job.groups(),
            work_group_size = job.work_group_size,
        );

        let wg = job.work_group_size;
        let run_group = |(group, (orders, fitness)): (usize, (&mut [i32], &mut [f64]))| {
            for (local, (slot, cell)) in orders.chunks_mut(n).zip(fitness.iter_mut()).enumerate() {
                let gid = group * wg + local;
                *cell = run_work_item(&coords, &order, slot, gid, job);
            }
        };
        if self.parallel {
            slot_orders
                .par_chunks_mut(wg * n)
                .zip(slot_fitness.par_chunks_mut(wg))
                .enumerate()
                .for_each(run_group);
        } else {
            slot_orders
                .chunks_mut(wg * n)
                .zip(slot_fitness.chunks_mut(wg))
                .enumerate()
                .for_each(run_group);
        }

        self.check(Stage::Readback)?;
        Ok(DeviceOutput {
            slot_orders: slot_orders.to_vec(),
            slot_fitness: slot_fitness.to_vec(),
        })
    }
}

/// One work-item: independent random 2-opt trials in its own slot.
///
/// Improving moves are kept; any other move is undone by applying it a
/// second time.
fn run_work_item(coords: &[f64], initial: &[i32], slot: &mut [i32], gid: usize, job: &DeviceJob<'_>) -> f64 {
    let n = slot.len();
    slot.copy_from_slice(initial);
    let mut best = slot_length(coords, slot);
    let mut rng = create_rng(worker_seed(job.seed, gid as u64));

    for trial in 0..job.trials_per_worker {
        if trial % 64 == 0 && job.should_stop() {
            break;
        }
        let Some(mv) = random_move(n, &mut rng) else {
            continue;
        };
        mv.apply_in_place(slot);
        let candidate = slot_length(coords, slot);
        if candidate < best {
            best = candidate;
        } else {
            mv.apply_in_place(slot);
        }
    }
    best
}

/// The file a kernel was loaded from, when the host device will not run
/// its text.
fn uncompiled_file(kernel: &KernelSource) -> Option<&Path> {
    kernel.origin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SearchError;
    use crate::kernel::KernelSource;
    use std::sync::atomic::AtomicBool;

    const ACQUISITION: [Resource; 8] = [
        Resource::Context,
        Resource::Queue,
        Resource::Buffer(BufferRole::Coordinates),
        Resource::Buffer(BufferRole::Order),
        Resource::Buffer(BufferRole::ResultOrders),
        Resource::Buffer(BufferRole::ResultFitness),
        Resource::Program,
        Resource::Kernel,
    ];

    // Unit square, listed so that the identity order crosses itself.
    const COORDS: [f64; 8] = [0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 0.0];
    const ORDER: [i32; 4] = [0, 1, 2, 3];

    fn job<'a>(kernel: &'a KernelSource, workers: usize, wg: usize) -> DeviceJob<'a> {
        DeviceJob {
            coords: &COORDS,
            order: &ORDER,
            workers,
            work_group_size: wg,
            trials_per_worker: 200,
            seed: 42,
            kernel,
            cancel: None,
            deadline: None,
        }
    }

    fn assert_reverse_release(ledger: &ResourceLedger) {
        let mut acquired = ledger.acquired();
        acquired.reverse();
        assert_eq!(ledger.released(), acquired);
        assert!(ledger.live().is_empty(), "leaked: {:?}", ledger.live());
    }

    #[test]
    fn test_execute_fills_every_slot() {
        let kernel = KernelSource::bundled();
        let device = HostDevice::new();
        let out = device.execute(&job(&kernel, 6, 4)).unwrap();
        assert_eq!(out.slot_orders.len(), 6 * 4);
        assert_eq!(out.slot_fitness.len(), 6);
        for (slot, &fit) in out.slot_orders.chunks(4).zip(&out.slot_fitness) {
            let mut sorted = slot.to_vec();
            sorted.sort_unstable();
            assert_eq!(sorted, vec![0, 1, 2, 3]);
            assert!((slot_length(&COORDS, slot) - fit).abs() < 1e-12);
            assert!((fit - 4.0).abs() < 1e-9, "worker stuck at {fit}");
        }
    }

    #[test]
    fn test_release_in_reverse_order() {
        let kernel = KernelSource::bundled();
        let device = HostDevice::new();
        device.execute(&job(&kernel, 4, 2)).unwrap();
        assert_eq!(device.ledger().acquired(), ACQUISITION.to_vec());
        assert_reverse_release(device.ledger());
    }

    #[test]
    fn test_release_on_every_failure_stage() {
        let kernel = KernelSource::bundled();
        let stages = [
            Stage::Context,
            Stage::Queue,
            Stage::Allocate(BufferRole::Coordinates),
            Stage::Allocate(BufferRole::ResultOrders),
            Stage::Allocate(BufferRole::ResultFitness),
            Stage::Upload,
            Stage::Build,
            Stage::Kernel,
            Stage::Dispatch,
            Stage::Readback,
        ];
        for stage in stages {
            let device = HostDevice::new().with_fault(stage);
            let err = device.execute(&job(&kernel, 4, 2)).unwrap_err();
            assert!(err.is_device_error(), "{stage:?} -> {err}");
            assert_reverse_release(device.ledger());
        }
    }

    #[test]
    fn test_allocation_fault_releases_earlier_buffers() {
        let kernel = KernelSource::bundled();
        let device = HostDevice::new().with_fault(Stage::Allocate(BufferRole::ResultOrders));
        let err = device.execute(&job(&kernel, 4, 2)).unwrap_err();
        assert!(matches!(err, SearchError::Allocation(_)));
        assert_eq!(
            device.ledger().released(),
            vec![
                Resource::Buffer(BufferRole::Order),
                Resource::Buffer(BufferRole::Coordinates),
                Resource::Queue,
                Resource::Context,
            ]
        );
    }

    #[test]
    fn test_unavailable_acquires_nothing() {
        let kernel = KernelSource::bundled();
        let device = HostDevice::unavailable();
        let err = device.execute(&job(&kernel, 4, 2)).unwrap_err();
        assert!(matches!(err, SearchError::Platform(_)));
        assert!(device.ledger().events().is_empty());
    }

    #[test]
    fn test_missing_entry_point_is_compile_error() {
        let kernel = KernelSource::from_text("__global__ void other_kernel() {}");
        let device = HostDevice::new();
        let err = device.execute(&job(&kernel, 4, 2)).unwrap_err();
        assert!(matches!(err, SearchError::Compile(_)));
        assert!(!device.ledger().acquired().contains(&Resource::Kernel));
        assert_reverse_release(device.ledger());
    }

    #[test]
    fn test_oversized_dispatch_is_allocation_error() {
        let kernel = KernelSource::bundled();
        let device = HostDevice::new();
        let err = device.execute(&job(&kernel, usize::MAX / 2, 64)).unwrap_err();
        assert!(matches!(err, SearchError::Allocation(_)), "{err}");
        assert!(!device
            .ledger()
            .acquired()
            .contains(&Resource::Buffer(BufferRole::ResultOrders)));
        assert_reverse_release(device.ledger());
    }

    #[test]
    fn test_unreservable_buffer_is_allocation_error() {
        let device = HostDevice::new();
        let err = device
            .buffer(BufferRole::ResultFitness, usize::MAX, 0.0f64)
            .err()
            .unwrap();
        assert!(matches!(err, SearchError::Allocation(_)));
        assert!(device.ledger().events().is_empty());
    }

    #[test]
    fn test_loaded_kernel_file_is_reported_uncompiled() {
        let path = std::env::temp_dir().join(format!("u-tsp-host-{}.cu", std::process::id()));
        std::fs::write(&path, "local_search( this is not C at all").unwrap();
        let kernel = KernelSource::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(uncompiled_file(&kernel), Some(path.as_path()));
        assert_eq!(uncompiled_file(&KernelSource::bundled()), None);
        assert!(HostDevice::new().execute(&job(&kernel, 4, 2)).is_ok());
    }

    #[test]
    fn test_parallel_matches_serial() {
        let kernel = KernelSource::bundled();
        let a = HostDevice::new().with_parallel(true).execute(&job(&kernel, 37, 8)).unwrap();
        let b = HostDevice::new().with_parallel(false).execute(&job(&kernel, 37, 8)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_cancelled_workers_keep_initial_order() {
        let kernel = KernelSource::bundled();
        let flag = AtomicBool::new(true);
        let mut j = job(&kernel, 3, 2);
        j.cancel = Some(&flag);
        let out = HostDevice::new().execute(&j).unwrap();
        for slot in out.slot_orders.chunks(4) {
            assert_eq!(slot, &ORDER);
        }
    }
}
