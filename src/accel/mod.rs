//! Accelerator search backend.
//!
//! Runs the randomized 2-opt search as a single data-parallel dispatch:
//!
//! 1. Discover the device and acquire a context and a queue
//! 2. Allocate coordinate, order, result-order and result-fitness buffers
//! 3. Upload coordinates and the initial order
//! 4. Build the kernel program from source and bind its arguments
//! 5. Dispatch one work-item per worker, in fixed-size work-groups
//! 6. Read back every worker's slot and reduce them on the host
//!
//! Resources are released in reverse acquisition order on every path.
//! Device failures come back as [`SearchError`](crate::error::SearchError)
//! values so the caller can retry on the sequential backend.

#[cfg(feature = "cuda")]
mod cuda;
mod device;
mod host;
mod runner;

#[cfg(feature = "cuda")]
pub use cuda::CudaDevice;
pub use device::{BufferRole, ComputeDevice, DeviceJob, DeviceOutput, Stage};
pub use host::{HostDevice, LedgerEvent, Resource, ResourceLedger};
pub use runner::{reduce_slots, AcceleratorRunner};
