//! Backend abstraction layer
//!
//! The engine drives devices exclusively through [`DeviceBackend`]; the
//! operations it hands over are described by [`Operation`].

mod traits;
mod types;

pub use traits::{DeviceBackend, Job, JobObserver};
pub use types::{DeviceInfo, DeviceKind, ExecCapabilities, NativeArgs, NativeCall, NativeFn, Operation, QueueProperties};
