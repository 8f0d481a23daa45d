//! Memory objects: buffers, sub-buffers and images
//!
//! A [`MemObject`] is a shared handle. Commands clone the handle into their
//! event, so the object (and its device storage) outlives every command that
//! touches it no matter when the application drops its own handle.
//!
//! ```text
//! SubBuffer ──parent──▶ Buffer ──▶ DeviceMemory
//!     └──────────────── shares ──────────┘
//! ```
//!
//! A parent never references its sub-buffers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use ferrocl_backends::{DeviceInfo, DeviceMemory, MemRegion};
use parking_lot::Mutex;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::image::ImageFormat;

static NEXT_MEM_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_MAP_ID: AtomicU64 = AtomicU64::new(1);

bitflags! {
    /// Allocation and access flags of a memory object.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemFlags: u32 {
        const READ_WRITE = 1 << 0;
        const WRITE_ONLY = 1 << 1;
        const READ_ONLY = 1 << 2;
        const ALLOC_HOST_PTR = 1 << 4;
        const COPY_HOST_PTR = 1 << 5;
        const HOST_WRITE_ONLY = 1 << 7;
        const HOST_READ_ONLY = 1 << 8;
        const HOST_NO_ACCESS = 1 << 9;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
    }
}

const DEVICE_ACCESS: MemFlags = MemFlags::READ_WRITE.union(MemFlags::WRITE_ONLY).union(MemFlags::READ_ONLY);
const HOST_ACCESS: MemFlags = MemFlags::HOST_WRITE_ONLY
    .union(MemFlags::HOST_READ_ONLY)
    .union(MemFlags::HOST_NO_ACCESS);
const HOST_PTR: MemFlags = MemFlags::ALLOC_HOST_PTR.union(MemFlags::COPY_HOST_PTR);

impl MemFlags {
    pub fn host_can_read(self) -> bool {
        !self.intersects(MemFlags::HOST_WRITE_ONLY | MemFlags::HOST_NO_ACCESS)
    }

    pub fn host_can_write(self) -> bool {
        !self.intersects(MemFlags::HOST_READ_ONLY | MemFlags::HOST_NO_ACCESS)
    }

    /// Check the flag combination and default the device access to
    /// `READ_WRITE`.
    fn normalize(self, with_data: bool) -> Result<Self> {
        if (self & DEVICE_ACCESS).bits().count_ones() > 1 {
            return Err(Error::invalid_value("conflicting device access flags"));
        }
        if (self & HOST_ACCESS).bits().count_ones() > 1 {
            return Err(Error::invalid_value("conflicting host access flags"));
        }
        if self.contains(MemFlags::COPY_HOST_PTR) != with_data {
            return Err(Error::invalid_value("COPY_HOST_PTR requires initial data and vice versa"));
        }
        let mut flags = self;
        if !flags.intersects(DEVICE_ACCESS) {
            flags |= MemFlags::READ_WRITE;
        }
        Ok(flags)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemObjectType {
    Buffer,
    SubBuffer,
    Image2D,
    Image3D,
}

/// Image geometry; pitches are in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: usize,
    pub height: usize,
    /// 1 for 2D images.
    pub depth: usize,
    pub row_pitch: usize,
    pub slice_pitch: usize,
}

impl ImageInfo {
    pub fn pixel_size(&self) -> usize {
        self.format.pixel_size()
    }

    pub fn is_3d(&self) -> bool {
        self.depth > 1
    }
}

enum MemKind {
    Buffer,
    SubBuffer { parent: MemObject, offset: usize },
    Image(ImageInfo),
}

type Destructor = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy)]
struct MapRecord {
    id: u64,
    start: usize,
    end: usize,
    write: bool,
}

struct MemInner {
    id: u64,
    context: Context,
    flags: MemFlags,
    kind: MemKind,
    size: usize,
    storage: DeviceMemory,
    /// Offset of this object inside `storage`.
    base_offset: usize,
    destructors: Mutex<Vec<Destructor>>,
    maps: Mutex<Vec<MapRecord>>,
}

impl Drop for MemInner {
    fn drop(&mut self) {
        let destructors = std::mem::take(self.destructors.get_mut());
        tracing::debug!(mem = self.id, callbacks = destructors.len(), "mem_object_destroyed");
        for destructor in destructors.into_iter().rev() {
            destructor();
        }
    }
}

/// Shared handle to a buffer, sub-buffer or image.
#[derive(Clone)]
pub struct MemObject {
    inner: Arc<MemInner>,
}

impl MemObject {
    fn new(context: &Context, flags: MemFlags, kind: MemKind, size: usize, storage: DeviceMemory, base_offset: usize) -> Self {
        let id = NEXT_MEM_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(mem = id, size, flags = flags.bits(), "mem_object_created");
        Self {
            inner: Arc::new(MemInner {
                id,
                context: context.clone(),
                flags,
                kind,
                size,
                storage,
                base_offset,
                destructors: Mutex::new(Vec::new()),
                maps: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    pub fn flags(&self) -> MemFlags {
        self.inner.flags
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.inner.size
    }

    pub fn mem_type(&self) -> MemObjectType {
        match &self.inner.kind {
            MemKind::Buffer => MemObjectType::Buffer,
            MemKind::SubBuffer { .. } => MemObjectType::SubBuffer,
            MemKind::Image(info) if info.is_3d() => MemObjectType::Image3D,
            MemKind::Image(_) => MemObjectType::Image2D,
        }
    }

    /// Parent buffer of a sub-buffer.
    pub fn parent(&self) -> Option<&MemObject> {
        match &self.inner.kind {
            MemKind::SubBuffer { parent, .. } => Some(parent),
            _ => None,
        }
    }

    /// Offset inside the parent; 0 for anything but a sub-buffer.
    pub fn offset(&self) -> usize {
        match &self.inner.kind {
            MemKind::SubBuffer { offset, .. } => *offset,
            _ => 0,
        }
    }

    pub fn image_info(&self) -> Option<&ImageInfo> {
        match &self.inner.kind {
            MemKind::Image(info) => Some(info),
            _ => None,
        }
    }

    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Live mappings of the underlying buffer.
    pub fn map_count(&self) -> usize {
        self.root().inner.maps.lock().len()
    }

    /// Register `f` to run when the object is destroyed. Callbacks run in
    /// reverse registration order.
    pub fn set_destructor_callback<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.destructors.lock().push(Box::new(f));
    }

    #[tracing::instrument(skip(self), fields(parent = self.inner.id))]
    pub fn create_sub_buffer(&self, flags: MemFlags, offset: usize, size: usize) -> Result<MemObject> {
        if self.mem_type() != MemObjectType::Buffer {
            return Err(Error::invalid_mem("sub-buffers can only be created from a buffer"));
        }
        if size == 0 {
            return Err(Error::InvalidBufferSize("sub-buffer size is zero".into()));
        }
        if offset.checked_add(size).is_none_or(|end| end > self.size()) {
            return Err(Error::InvalidBufferSize(format!(
                "sub-buffer {offset}+{size} exceeds parent size {}",
                self.size()
            )));
        }
        if flags.intersects(HOST_PTR) {
            return Err(Error::invalid_value("host pointer flags are not allowed on sub-buffers"));
        }
        let parent_flags = self.flags();
        let access = flags & DEVICE_ACCESS;
        if access.bits().count_ones() > 1 {
            return Err(Error::invalid_value("conflicting device access flags"));
        }
        if (parent_flags.contains(MemFlags::WRITE_ONLY) && access.intersects(MemFlags::READ_WRITE | MemFlags::READ_ONLY))
            || (parent_flags.contains(MemFlags::READ_ONLY) && access.intersects(MemFlags::READ_WRITE | MemFlags::WRITE_ONLY))
        {
            return Err(Error::invalid_value("access flags are wider than the parent's"));
        }
        let host = flags & HOST_ACCESS;
        if host.bits().count_ones() > 1 {
            return Err(Error::invalid_value("conflicting host access flags"));
        }
        let parent_host = parent_flags & HOST_ACCESS;
        if !host.is_empty() && !parent_host.is_empty() && host != parent_host {
            return Err(Error::invalid_value("host access flags conflict with the parent's"));
        }
        let mut resolved = flags;
        if access.is_empty() {
            resolved |= parent_flags & DEVICE_ACCESS;
        }
        if host.is_empty() {
            resolved |= parent_host;
        }
        Ok(MemObject::new(
            &self.inner.context,
            resolved,
            MemKind::SubBuffer {
                parent: self.clone(),
                offset,
            },
            size,
            self.inner.storage.clone(),
            self.inner.base_offset + offset,
        ))
    }

    pub(crate) fn storage(&self) -> &DeviceMemory {
        &self.inner.storage
    }

    pub(crate) fn base_offset(&self) -> usize {
        self.inner.base_offset
    }

    /// The whole object as a backend region.
    pub(crate) fn region(&self) -> Result<MemRegion> {
        Ok(self.inner.storage.region(self.inner.base_offset, self.inner.size)?)
    }

    fn root(&self) -> &MemObject {
        self.parent().unwrap_or(self)
    }

    pub(crate) fn is_buffer(&self) -> bool {
        matches!(self.inner.kind, MemKind::Buffer | MemKind::SubBuffer { .. })
    }

    pub(crate) fn require_buffer(&self) -> Result<()> {
        if self.is_buffer() {
            Ok(())
        } else {
            Err(Error::invalid_mem(format!("mem object {} is not a buffer", self.id())))
        }
    }

    pub(crate) fn require_image(&self) -> Result<&ImageInfo> {
        self.image_info()
            .ok_or_else(|| Error::invalid_mem(format!("mem object {} is not an image", self.id())))
    }

    pub(crate) fn check_host_read(&self) -> Result<()> {
        if self.flags().host_can_read() {
            Ok(())
        } else {
            Err(Error::invalid_operation("host reads are not allowed on this object"))
        }
    }

    pub(crate) fn check_host_write(&self) -> Result<()> {
        if self.flags().host_can_write() {
            Ok(())
        } else {
            Err(Error::invalid_operation("host writes are not allowed on this object"))
        }
    }

    /// Sub-buffer offsets must honour the device's base alignment.
    pub(crate) fn check_alignment(&self, info: &DeviceInfo) -> Result<()> {
        let align = info.base_align_bytes();
        match self.inner.kind {
            MemKind::SubBuffer { offset, .. } if offset % align != 0 => {
                Err(Error::MisalignedSubBufferOffset { offset, align })
            }
            _ => Ok(()),
        }
    }

    /// Record a mapping of storage bytes `start..start + len`.
    pub(crate) fn register_map(&self, start: usize, len: usize, flags: MapFlags) -> Result<MapRegistration> {
        let root = self.root();
        let write = flags.contains(MapFlags::WRITE);
        let end = start + len;
        let mut maps = root.inner.maps.lock();
        if maps
            .iter()
            .any(|map| map.start < end && start < map.end && (map.write || write))
        {
            return Err(Error::invalid_operation("region overlaps a write mapping"));
        }
        let id = NEXT_MAP_ID.fetch_add(1, Ordering::Relaxed);
        maps.push(MapRecord { id, start, end, write });
        Ok(MapRegistration { root: root.clone(), id })
    }
}

impl PartialEq for MemObject {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for MemObject {}

impl fmt::Debug for MemObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemObject")
            .field("id", &self.inner.id)
            .field("type", &self.mem_type())
            .field("size", &self.inner.size)
            .field("flags", &self.inner.flags)
            .finish()
    }
}

/// Keeps a mapping registered on its buffer until dropped.
pub(crate) struct MapRegistration {
    root: MemObject,
    id: u64,
}

impl Drop for MapRegistration {
    fn drop(&mut self) {
        self.root.inner.maps.lock().retain(|map| map.id != self.id);
    }
}

impl fmt::Debug for MapRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapRegistration")
            .field("mem", &self.root.id())
            .field("id", &self.id)
            .finish()
    }
}

fn check_alloc_size(size: usize) -> Result<()> {
    if size == 0 {
        return Err(Error::InvalidBufferSize("size is zero".into()));
    }
    if isize::try_from(size).is_err() {
        return Err(Error::InvalidBufferSize(format!("{size} bytes is too large")));
    }
    Ok(())
}

/// Resolve requested pitches against the packed ones.
fn image_pitches(format: &ImageFormat, dims: [usize; 3], row_pitch: usize, slice_pitch: usize) -> Result<(usize, usize)> {
    let [width, height, _] = dims;
    let pixel = format.pixel_size();
    let packed_row = width
        .checked_mul(pixel)
        .ok_or_else(|| Error::InvalidImageSize("row size overflows".into()))?;
    let row = match row_pitch {
        0 => packed_row,
        pitch if pitch < packed_row || pitch % pixel != 0 => {
            return Err(Error::InvalidImageSize(format!(
                "row pitch {pitch} must be a multiple of {pixel} and at least {packed_row}"
            )))
        }
        pitch => pitch,
    };
    let packed_slice = row
        .checked_mul(height)
        .ok_or_else(|| Error::InvalidImageSize("slice size overflows".into()))?;
    let slice = match slice_pitch {
        0 => packed_slice,
        pitch if pitch < packed_slice || pitch % row != 0 => {
            return Err(Error::InvalidImageSize(format!(
                "slice pitch {pitch} must be a multiple of {row} and at least {packed_slice}"
            )))
        }
        pitch => pitch,
    };
    Ok((row, slice))
}

impl Context {
    #[tracing::instrument(skip(self), fields(context = self.id()))]
    pub fn create_buffer(&self, flags: MemFlags, size: usize) -> Result<MemObject> {
        let flags = flags.normalize(false)?;
        check_alloc_size(size)?;
        Ok(MemObject::new(self, flags, MemKind::Buffer, size, DeviceMemory::zeroed(size), 0))
    }

    /// Buffer initialised from `data`; implies `COPY_HOST_PTR`.
    #[tracing::instrument(skip(self, data), fields(context = self.id(), size = data.len()))]
    pub fn create_buffer_with_data(&self, flags: MemFlags, data: &[u8]) -> Result<MemObject> {
        let flags = (flags | MemFlags::COPY_HOST_PTR).normalize(true)?;
        check_alloc_size(data.len())?;
        Ok(MemObject::new(
            self,
            flags,
            MemKind::Buffer,
            data.len(),
            DeviceMemory::from_bytes(data),
            0,
        ))
    }

    /// 2D image; a zero `row_pitch` means tightly packed rows.
    pub fn create_image_2d(
        &self,
        flags: MemFlags,
        format: ImageFormat,
        width: usize,
        height: usize,
        row_pitch: usize,
    ) -> Result<MemObject> {
        self.create_image(flags, format, [width, height, 1], [row_pitch, 0])
    }

    /// 3D image of `[width, height, depth]` with `[row_pitch, slice_pitch]`;
    /// zero pitches are derived from the packed layout.
    pub fn create_image_3d(
        &self,
        flags: MemFlags,
        format: ImageFormat,
        dims: [usize; 3],
        pitches: [usize; 2],
    ) -> Result<MemObject> {
        if dims[2] < 2 {
            return Err(Error::InvalidImageSize("3D images need a depth of at least 2".into()));
        }
        self.create_image(flags, format, dims, pitches)
    }

    #[tracing::instrument(skip(self), fields(context = self.id()))]
    fn create_image(&self, flags: MemFlags, format: ImageFormat, dims: [usize; 3], pitches: [usize; 2]) -> Result<MemObject> {
        let flags = flags.normalize(false)?;
        if !self.supports_images() {
            return Err(Error::invalid_operation("no device in the context supports images"));
        }
        format.validate()?;
        let [width, height, depth] = dims;
        if width == 0 || height == 0 || depth == 0 {
            return Err(Error::InvalidImageSize(format!("{width}x{height}x{depth}")));
        }
        let (row_pitch, slice_pitch) = image_pitches(&format, dims, pitches[0], pitches[1])?;
        let size = if depth > 1 {
            slice_pitch.checked_mul(depth)
        } else {
            Some(row_pitch * height)
        }
        .ok_or_else(|| Error::InvalidImageSize("image size overflows".into()))?;
        check_alloc_size(size)?;
        let info = ImageInfo {
            format,
            width,
            height,
            depth,
            row_pitch,
            slice_pitch: if depth > 1 { slice_pitch } else { 0 },
        };
        Ok(MemObject::new(self, flags, MemKind::Image(info), size, DeviceMemory::zeroed(size), 0))
    }
}
