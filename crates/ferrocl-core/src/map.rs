//! Host mappings of memory objects
//!
//! A map command copies the mapped region into a staging [`HostBuffer`].
//! The staging bytes are reachable only through a [`Mapping`], and a
//! [`Mapping`] is only handed out by [`PendingMap::wait`] after the map
//! event completed, so nothing can read the mapped bytes before they are
//! valid. Unmapping consumes the [`Mapping`]; the region stays registered
//! on its buffer until the unmap event finishes.

use bytemuck::Pod;
use ferrocl_backends::{HostBuffer, Operation, RectCopy};
use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard};

use crate::error::{Error, Result};
use crate::event::Event;
use crate::mem::{MapFlags, MapRegistration, MemObject};

/// A completed mapping.
#[derive(Debug)]
pub struct Mapping {
    mem: MemObject,
    staging: HostBuffer,
    flags: MapFlags,
    /// Device to staging geometry.
    rect: RectCopy,
    event: Event,
    _registration: MapRegistration,
}

impl Mapping {
    pub(crate) fn new(
        mem: MemObject,
        staging: HostBuffer,
        flags: MapFlags,
        rect: RectCopy,
        event: Event,
        registration: MapRegistration,
    ) -> Self {
        Self {
            mem,
            staging,
            flags,
            rect,
            event,
            _registration: registration,
        }
    }

    pub fn mem(&self) -> &MemObject {
        &self.mem
    }

    pub fn flags(&self) -> MapFlags {
        self.flags
    }

    /// The map event.
    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn len(&self) -> usize {
        self.staging.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staging.is_empty()
    }

    /// Bytes between rows of the mapped region; images map tightly packed.
    pub fn row_pitch(&self) -> usize {
        self.rect.dst_row_pitch
    }

    pub fn slice_pitch(&self) -> usize {
        self.rect.dst_slice_pitch
    }

    pub fn bytes(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        self.staging.read()
    }

    /// Writable view; only for mappings created with [`MapFlags::WRITE`].
    pub fn bytes_mut(&self) -> Result<MappedRwLockWriteGuard<'_, [u8]>> {
        if !self.flags.contains(MapFlags::WRITE) {
            return Err(Error::invalid_operation("mapping is not writable"));
        }
        Ok(self.staging.write())
    }

    pub fn to_vec<T: Pod>(&self) -> Vec<T> {
        self.staging.to_vec()
    }

    pub fn copy_from_slice<T: Pod>(&self, values: &[T]) -> Result<()> {
        if !self.flags.contains(MapFlags::WRITE) {
            return Err(Error::invalid_operation("mapping is not writable"));
        }
        Ok(self.staging.copy_from_slice(values)?)
    }

    /// Operation publishing host writes back to the device.
    pub(crate) fn write_back(&self) -> Operation {
        if self.flags.contains(MapFlags::WRITE) {
            Operation::Write {
                src: self.staging.clone(),
                dst: self.mem.storage().clone(),
                rect: self.rect.reversed(),
            }
        } else {
            Operation::Nop
        }
    }
}

/// A rejected unmap. The mapping is handed back untouched so it can still
/// be unmapped on a queue of its own context.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct UnmapError {
    pub error: Error,
    pub mapping: Mapping,
}

impl From<UnmapError> for Error {
    fn from(err: UnmapError) -> Self {
        err.error
    }
}

/// A map command in flight.
#[derive(Debug)]
pub struct PendingMap {
    mapping: Mapping,
}

impl PendingMap {
    pub(crate) fn new(mapping: Mapping) -> Self {
        Self { mapping }
    }

    pub fn event(&self) -> &Event {
        &self.mapping.event
    }

    /// Wait for the map event and hand out the mapping. On failure the
    /// region is unregistered.
    pub fn wait(self) -> Result<Mapping> {
        self.mapping.event.wait()?;
        Ok(self.mapping)
    }
}
