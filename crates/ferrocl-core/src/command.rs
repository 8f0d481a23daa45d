//! Command payloads carried by events
//!
//! Each variant owns the handles its command needs, so memory objects and
//! host buffers stay alive until the event is terminal. Offsets in the
//! geometry are already in storage coordinates.

use ferrocl_backends::{HostBuffer, KernelLaunch, NativeCall, Operation, RectCopy};

use crate::map::Mapping;
use crate::mem::MemObject;

#[derive(Debug)]
pub(crate) enum Command {
    Read {
        src: MemObject,
        dst: HostBuffer,
        rect: RectCopy,
    },
    Write {
        src: HostBuffer,
        dst: MemObject,
        rect: RectCopy,
    },
    Copy {
        src: MemObject,
        dst: MemObject,
        rect: RectCopy,
    },
    Fill {
        dst: MemObject,
        offset: usize,
        len: usize,
        pattern: Vec<u8>,
    },
    /// Device contents into the mapping's staging buffer.
    Map {
        mem: MemObject,
        staging: HostBuffer,
        rect: RectCopy,
    },
    /// Write-back of a mapping; the mapping is released with the command.
    Unmap { mapping: Mapping },
    /// `_retained` keeps argument objects alive while the launch runs.
    Kernel {
        launch: KernelLaunch,
        _retained: Vec<MemObject>,
    },
    Native {
        call: Option<NativeCall>,
        _retained: Vec<MemObject>,
    },
    /// Marker, barrier and wait-for-events carry nothing.
    Sync,
}

impl Command {
    /// Backend operation for this command. `None` for synchronisation
    /// commands and for a native call already handed out.
    pub(crate) fn operation(&mut self) -> Option<Operation> {
        let operation = match self {
            Self::Read { src, dst, rect } => Operation::Read {
                src: src.storage().clone(),
                dst: dst.clone(),
                rect: *rect,
            },
            Self::Write { src, dst, rect } => Operation::Write {
                src: src.clone(),
                dst: dst.storage().clone(),
                rect: *rect,
            },
            Self::Copy { src, dst, rect } => Operation::Copy {
                src: src.storage().clone(),
                dst: dst.storage().clone(),
                rect: *rect,
            },
            Self::Fill {
                dst,
                offset,
                len,
                pattern,
            } => Operation::Fill {
                dst: dst.storage().clone(),
                offset: *offset,
                len: *len,
                pattern: pattern.clone(),
            },
            Self::Map { mem, staging, rect } => Operation::Read {
                src: mem.storage().clone(),
                dst: staging.clone(),
                rect: *rect,
            },
            Self::Unmap { mapping } => mapping.write_back(),
            Self::Kernel { launch, .. } => Operation::Kernel(launch.clone()),
            Self::Native { call, .. } => Operation::Native(call.take()?),
            Self::Sync => return None,
        };
        Some(operation)
    }
}
