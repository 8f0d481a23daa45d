//! Device and host memory shared between the engine and its backends.
//!
//! Both kinds of storage are reference counted: every job that touches a
//! region holds its own handle, so storage outlives any in-flight transfer
//! regardless of what the application releases meanwhile.
//!
//! Lock order when one job needs two storages: device before host, and
//! between two device storages the lower id first. A copy within a single
//! storage takes one write lock.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{BackendError, Result};

static NEXT_STORAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Validate `offset + len <= size` without overflowing.
pub fn check_range(offset: usize, len: usize, size: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(BackendError::out_of_bounds(offset, len, size)),
    }
}

#[derive(Clone)]
struct Storage {
    id: u64,
    len: usize,
    bytes: Arc<RwLock<Box<[u8]>>>,
}

impl Storage {
    fn new(bytes: Box<[u8]>) -> Self {
        Self {
            id: NEXT_STORAGE_ID.fetch_add(1, Ordering::Relaxed),
            len: bytes.len(),
            bytes: Arc::new(RwLock::new(bytes)),
        }
    }

    fn len(&self) -> usize {
        self.len
    }

    fn read(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.bytes.read(), |bytes| &bytes[..])
    }

    fn write(&self) -> MappedRwLockWriteGuard<'_, [u8]> {
        RwLockWriteGuard::map(self.bytes.write(), |bytes| &mut bytes[..])
    }
}

/// Device-resident allocation backing a memory object.
#[derive(Clone)]
pub struct DeviceMemory(Storage);

impl DeviceMemory {
    pub fn zeroed(len: usize) -> Self {
        Self(Storage::new(vec![0; len].into_boxed_slice()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(Storage::new(bytes.into()))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when both handles refer to the same allocation.
    pub fn same_storage(&self, other: &DeviceMemory) -> bool {
        Arc::ptr_eq(&self.0.bytes, &other.0.bytes)
    }

    pub fn read(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        self.0.read()
    }

    pub fn write(&self) -> MappedRwLockWriteGuard<'_, [u8]> {
        self.0.write()
    }

    pub fn read_into(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        let bytes = self.read();
        check_range(offset, out.len(), bytes.len())?;
        out.copy_from_slice(&bytes[offset..offset + out.len()]);
        Ok(())
    }

    pub fn write_from(&self, offset: usize, data: &[u8]) -> Result<()> {
        let mut bytes = self.write();
        check_range(offset, data.len(), bytes.len())?;
        bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Borrow `len` bytes at `offset` as a region.
    pub fn region(&self, offset: usize, len: usize) -> Result<MemRegion> {
        check_range(offset, len, self.len())?;
        Ok(MemRegion {
            memory: self.clone(),
            offset,
            len,
        })
    }
}

impl fmt::Debug for DeviceMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceMemory")
            .field("id", &self.0.id)
            .field("len", &self.len())
            .finish()
    }
}

/// Host allocation used as the source or destination of transfers and as
/// the staging area of a mapping.
#[derive(Clone)]
pub struct HostBuffer(Storage);

impl HostBuffer {
    pub fn new(len: usize) -> Self {
        Self(Storage::new(vec![0; len].into_boxed_slice()))
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(Storage::new(bytes.into_boxed_slice()))
    }

    pub fn from_slice<T: Pod>(values: &[T]) -> Self {
        Self::from_vec(bytemuck::cast_slice(values).to_vec())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn read(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        self.0.read()
    }

    pub fn write(&self) -> MappedRwLockWriteGuard<'_, [u8]> {
        self.0.write()
    }

    /// Copy the contents out as a typed vector; trailing bytes that do not
    /// fill a whole `T` are ignored.
    pub fn to_vec<T: Pod>(&self) -> Vec<T> {
        let bytes = self.read();
        let whole = bytes.len() - bytes.len() % std::mem::size_of::<T>().max(1);
        bytemuck::pod_collect_to_vec(&bytes[..whole])
    }

    /// Overwrite the leading bytes with `values`.
    pub fn copy_from_slice<T: Pod>(&self, values: &[T]) -> Result<()> {
        let src: &[u8] = bytemuck::cast_slice(values);
        let mut bytes = self.write();
        check_range(0, src.len(), bytes.len())?;
        bytes[..src.len()].copy_from_slice(src);
        Ok(())
    }
}

impl fmt::Debug for HostBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBuffer").field("len", &self.len()).finish()
    }
}

/// A bounded window into device memory.
#[derive(Clone, Debug)]
pub struct MemRegion {
    pub memory: DeviceMemory,
    pub offset: usize,
    pub len: usize,
}

impl MemRegion {
    pub fn read_into(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        check_range(offset, out.len(), self.len)?;
        self.memory.read_into(self.offset + offset, out)
    }

    pub fn write_from(&self, offset: usize, data: &[u8]) -> Result<()> {
        check_range(offset, data.len(), self.len)?;
        self.memory.write_from(self.offset + offset, data)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.memory.read()[self.offset..self.offset + self.len].to_vec()
    }

    /// Load the `index`-th element of type `T`.
    pub fn load<T: Pod>(&self, index: usize) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let offset = index.checked_mul(size).ok_or_else(|| BackendError::out_of_bounds(usize::MAX, size, self.len))?;
        check_range(offset, size, self.len)?;
        let bytes = self.memory.read();
        let start = self.offset + offset;
        Ok(bytemuck::pod_read_unaligned(&bytes[start..start + size]))
    }

    /// Store `value` as the `index`-th element of type `T`.
    pub fn store<T: Pod>(&self, index: usize, value: T) -> Result<()> {
        let size = std::mem::size_of::<T>();
        let offset = index.checked_mul(size).ok_or_else(|| BackendError::out_of_bounds(usize::MAX, size, self.len))?;
        self.write_from(offset, bytemuck::bytes_of(&value))
    }

    /// Run `f` over the region's bytes under the write lock.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut bytes = self.memory.write();
        f(&mut bytes[self.offset..self.offset + self.len])
    }
}
