//! Device backends for the ferrocl runtime
//!
//! This crate provides:
//! - **Backend trait**: [`DeviceBackend`], the narrow interface the engine
//!   drives devices through (submit a job, observe its completion)
//! - **Operations**: the resolved form of every command a device executes
//! - **Memory**: reference-counted device and host storage, strided copy
//!   geometry
//! - **Kernel interface**: what a kernel compiler hands back ([`KernelEntry`])
//! - **CPU backend**: reference host-thread implementation on a rayon pool
//!
//! # Usage
//!
//! ```rust
//! use std::sync::mpsc;
//! use ferrocl_backends::{CpuBackend, CpuBackendConfig, DeviceBackend, Job, JobObserver, Operation};
//!
//! struct Done(mpsc::Sender<bool>);
//!
//! impl JobObserver for Done {
//!     fn started(&self) {}
//!     fn finished(self: Box<Self>, result: ferrocl_backends::Result<()>) {
//!         let _ = self.0.send(result.is_ok());
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = CpuBackend::with_config(CpuBackendConfig::default().with_workers(1))?;
//! let (tx, rx) = mpsc::channel();
//! backend.submit(Job::new(Operation::Nop, Box::new(Done(tx))))?;
//! assert!(rx.recv()?);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod backends;
pub mod error;
pub mod kernel;
pub mod memory;
pub mod rect;

pub use backend::{
    DeviceBackend, DeviceInfo, DeviceKind, ExecCapabilities, Job, JobObserver, NativeArgs, NativeCall, NativeFn,
    Operation, QueueProperties,
};
pub use backends::cpu::{CpuBackend, CpuBackendConfig};
pub use error::{BackendError, Result};
pub use kernel::{ArgValue, FnKernel, GroupContext, KernelArgs, KernelEntry, KernelLaunch, NdRange, WorkGroup};
pub use memory::{DeviceMemory, HostBuffer, MemRegion};
pub use rect::RectCopy;
