//! CUDA device via `cudarc`.
//!
//! The kernel source is compiled at run time with NVRTC. Each worker is one
//! CUDA thread; a work-group is a thread block.
//!
//! A launch cannot observe the host's cancellation token, so cancellation
//! and the deadline are only honoured before the dispatch. A job stopped
//! there skips the launch and reports every slot at the initial order.

use super::device::{BufferRole, ComputeDevice, DeviceJob, DeviceOutput, Stage};
use crate::error::Result;
use crate::kernel::KERNEL_ENTRY;
use cudarc::driver::{CudaContext, LaunchConfig, PushKernelArg};
use cudarc::nvrtc::compile_ptx;
use tracing::debug;

/// A CUDA device selected by ordinal.
#[derive(Debug, Clone, Copy, Default)]
pub struct CudaDevice {
    ordinal: usize,
}

impl CudaDevice {
    pub fn new(ordinal: usize) -> Self {
        Self { ordinal }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

impl ComputeDevice for CudaDevice {
    fn name(&self) -> &'static str {
        "cuda"
    }

    fn execute(&self, job: &DeviceJob<'_>) -> Result<DeviceOutput> {
        let n = job.cities();
        let entries = job.slot_entries().ok_or_else(|| {
            Stage::Allocate(BufferRole::ResultOrders).error("slot size overflows usize")
        })?;
        let grid = u32::try_from(job.groups())
            .map_err(|_| Stage::Dispatch.error(format!("{} blocks exceed the grid", job.groups())))?;
        let block = u32::try_from(job.work_group_size)
            .map_err(|_| Stage::Dispatch.error("work-group size exceeds the block"))?;
        let num_cities = i32::try_from(n)
            .map_err(|_| Stage::Upload.error(format!("{n} cities exceed the i32 index range")))?;
        let num_workers = i32::try_from(job.workers)
            .map_err(|_| Stage::Dispatch.error(format!("{} workers exceed the i32 id range", job.workers)))?;

        let context = CudaContext::new(self.ordinal).map_err(|e| Stage::Context.error(format!("{e:?}")))?;
        let stream = context
            .new_stream()
            .map_err(|e| Stage::Queue.error(format!("{e:?}")))?;

        let coords = stream
            .memcpy_stod(job.coords)
            .map_err(|e| Stage::Allocate(BufferRole::Coordinates).error(format!("{e:?}")))?;
        let order = stream
            .memcpy_stod(job.order)
            .map_err(|e| Stage::Allocate(BufferRole::Order).error(format!("{e:?}")))?;
        let mut slot_orders = stream
            .alloc_zeros::<i32>(entries)
            .map_err(|e| Stage::Allocate(BufferRole::ResultOrders).error(format!("{e:?}")))?;
        let mut slot_fitness = stream
            .alloc_zeros::<f64>(job.workers)
            .map_err(|e| Stage::Allocate(BufferRole::ResultFitness).error(format!("{e:?}")))?;

        let ptx = compile_ptx(job.kernel.text()).map_err(|e| Stage::Build.error(format!("{e:?}")))?;
        let module = context
            .load_module(ptx)
            .map_err(|e| Stage::Build.error(format!("{e:?}")))?;
        let function = module
            .load_function(KERNEL_ENTRY)
            .map_err(|e| Stage::Kernel.error(format!("{e:?}")))?;

        if job.should_stop() {
            debug!(event = "launch_skipped", device = "cuda", ordinal = self.ordinal);
            return DeviceOutput::unchanged(job);
        }

        let cfg = LaunchConfig {
            grid_dim: (grid, 1, 1),
            block_dim: (block, 1, 1),
            shared_mem_bytes: 0,
        };
        debug!(
            event = "dispatch",
            device = "cuda",
            ordinal = self.ordinal,
            workers = job.workers,
            groups = job.groups(),
            work_group_size = job.work_group_size,
        );

        unsafe {
            stream
                .launch_builder(&function)
                .arg(&coords)
                .arg(&num_cities)
                .arg(&order)
                .arg(&num_workers)
                .arg(&job.trials_per_worker)
                .arg(&job.seed)
                .arg(&mut slot_orders)
                .arg(&mut slot_fitness)
                .launch(cfg)
        }
        .map_err(|e| Stage::Dispatch.error(format!("{e:?}")))?;
        stream
            .synchronize()
            .map_err(|e| Stage::Dispatch.error(format!("{e:?}")))?;

        let host_orders = stream
            .memcpy_dtov(&slot_orders)
            .map_err(|e| Stage::Readback.error(format!("{e:?}")))?;
        let host_fitness = stream
            .memcpy_dtov(&slot_fitness)
            .map_err(|e| Stage::Readback.error(format!("{e:?}")))?;

        Ok(DeviceOutput {
            slot_orders: host_orders,
            slot_fitness: host_fitness,
        })
    }
}
