//! Device description and operation payloads

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, Result};
use crate::kernel::KernelLaunch;
use crate::memory::{DeviceMemory, HostBuffer, MemRegion};
use crate::rect::RectCopy;

bitflags! {
    /// Command-queue properties a device supports or a queue requests.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct QueueProperties: u32 {
        const OUT_OF_ORDER_EXEC_MODE = 1 << 0;
        const PROFILING = 1 << 1;
    }
}

bitflags! {
    /// What kind of code a device can execute.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ExecCapabilities: u32 {
        const KERNEL = 1 << 0;
        const NATIVE_KERNEL = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    Cpu,
    Gpu,
    Accelerator,
}

/// Static description of a device, consulted by enqueue-time validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub kind: DeviceKind,
    pub compute_units: u32,
    pub max_work_group_size: usize,
    pub max_work_item_sizes: [usize; 3],
    /// Required sub-buffer offset alignment, in bits; 0 disables the check.
    pub mem_base_addr_align: u32,
    pub queue_properties: QueueProperties,
    pub exec_capabilities: ExecCapabilities,
    pub image_support: bool,
}

impl DeviceInfo {
    /// Sub-buffer offset alignment in bytes; 1 when unconstrained.
    pub fn base_align_bytes(&self) -> usize {
        ((self.mem_base_addr_align / 8) as usize).max(1)
    }
}

pub type NativeFn = Box<dyn FnOnce(&mut NativeArgs) -> std::result::Result<(), i32> + Send>;

/// Memory handed to a native host function, in the order the caller listed
/// the memory objects, plus an opaque byte payload.
#[derive(Debug, Clone, Default)]
pub struct NativeArgs {
    pub memory: Vec<MemRegion>,
    pub payload: Vec<u8>,
}

impl NativeArgs {
    pub fn region(&self, index: usize) -> Result<&MemRegion> {
        self.memory
            .get(index)
            .ok_or_else(|| BackendError::invalid_arg(index, "no memory object at this position"))
    }
}

/// Host function executed by a worker with its arguments.
pub struct NativeCall {
    pub func: NativeFn,
    pub args: NativeArgs,
}

impl fmt::Debug for NativeCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCall").field("args", &self.args).finish_non_exhaustive()
    }
}

/// Device work, already validated and resolved to storages.
#[derive(Debug)]
pub enum Operation {
    /// Device to host.
    Read { src: DeviceMemory, dst: HostBuffer, rect: RectCopy },
    /// Host to device.
    Write { src: HostBuffer, dst: DeviceMemory, rect: RectCopy },
    /// Device to device; `src` and `dst` may share storage.
    Copy { src: DeviceMemory, dst: DeviceMemory, rect: RectCopy },
    /// Repeat `pattern` over `len` bytes at `offset`.
    Fill { dst: DeviceMemory, offset: usize, len: usize, pattern: Vec<u8> },
    Kernel(KernelLaunch),
    Native(NativeCall),
    /// Nothing to do on the device, but ordered like real work.
    Nop,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Read { .. } => "read",
            Self::Write { .. } => "write",
            Self::Copy { .. } => "copy",
            Self::Fill { .. } => "fill",
            Self::Kernel(_) => "kernel",
            Self::Native(_) => "native",
            Self::Nop => "nop",
        }
    }

    /// Bytes moved, for transfer operations.
    pub fn byte_len(&self) -> usize {
        match self {
            Self::Read { rect, .. } | Self::Write { rect, .. } | Self::Copy { rect, .. } => rect.byte_len(),
            Self::Fill { len, .. } => *len,
            _ => 0,
        }
    }
}
