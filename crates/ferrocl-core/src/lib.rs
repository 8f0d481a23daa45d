//! # ferrocl-core - Command/Event Execution Engine
//!
//! Applications queue work (transfers, kernel launches, host functions) on
//! command queues; the engine runs it asynchronously on device backends in
//! the order the queues and wait lists demand, and reports completion or
//! failure through events.
//!
//! ## Architecture
//!
//! - **Events** ([`Event`], [`UserEvent`]): one asynchronous operation each,
//!   moving `Queued → Submitted → Running → Complete`, or to `Error` from any
//!   state. Failures cascade to dependents without touching the device.
//! - **Queues** ([`CommandQueue`]): in-order or out-of-order; ordering is
//!   expressed as wait-list edges when a command is queued.
//! - **Dispatcher**: an event is dispatched by whichever thread resolves its
//!   last dependency and becomes one backend job.
//! - **Memory** ([`MemObject`], [`HostBuffer`], [`Mapping`]): shared handles;
//!   a command keeps everything it touches alive until it is terminal.
//! - **Kernels** ([`Kernel`]): argument bindings snapshotted at enqueue
//!   time, entry points supplied by a [`KernelCompiler`].
//!
//! Every handle is reference counted: cloning retains, dropping releases.
//!
//! ## Example
//!
//! ```rust
//! use ferrocl_core::{Context, Device, HostBuffer, MemFlags, QueueProperties};
//!
//! # fn main() -> ferrocl_core::Result<()> {
//! let device = Device::cpu()?;
//! let context = Context::new(vec![device.clone()])?;
//! let queue = context.create_command_queue(&device, QueueProperties::empty())?;
//!
//! let buffer = context.create_buffer(MemFlags::READ_WRITE, 16)?;
//! let input = HostBuffer::from_slice(&[1u32, 2, 3, 4]);
//! queue.enqueue_write_buffer(&buffer, false, 0, 16, &input, &[])?;
//!
//! let output = HostBuffer::new(16);
//! queue.enqueue_read_buffer(&buffer, true, 0, 16, &output, &[])?;
//! assert_eq!(output.to_vec::<u32>(), vec![1, 2, 3, 4]);
//! # Ok(())
//! # }
//! ```

mod command;
pub mod context;
pub mod device;
mod dispatch;
pub mod enqueue;
pub mod error;
pub mod event;
pub mod image;
pub mod kernel;
pub mod map;
pub mod mem;
pub mod queue;

pub use context::Context;
pub use device::{Device, DeviceStats};
pub use enqueue::RectRegion;
pub use error::{Error, Result};
pub use event::{
    wait_for_events, CommandKind, Event, EventCallback, EventError, EventStatus, ProfilingInfo, UserEvent, WeakEvent,
};
pub use image::{ChannelOrder, ChannelType, ImageFormat};
pub use kernel::{Kernel, KernelArg, KernelCompiler, Prebuilt};
pub use map::{Mapping, PendingMap, UnmapError};
pub use mem::{ImageInfo, MapFlags, MemFlags, MemObject, MemObjectType};
pub use queue::CommandQueue;

pub use ferrocl_backends::{
    ArgValue, BackendError, CpuBackendConfig, DeviceBackend, DeviceInfo, DeviceKind, ExecCapabilities, FnKernel,
    GroupContext, HostBuffer, Job, JobObserver, KernelArgs, KernelEntry, MemRegion, NativeArgs, NdRange, Operation,
    QueueProperties,
};
