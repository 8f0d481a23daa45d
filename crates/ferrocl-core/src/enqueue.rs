//! The enqueue API
//!
//! Every `enqueue_*` method validates its arguments, builds the command
//! payload and hands it to [`CommandQueue::queue_event`]. Validation
//! failures are returned before any event exists. Blocking variants wait
//! for the event and return its terminal error; non-blocking variants
//! return the event and report errors only through it.
//!
//! Host memory is always a [`HostBuffer`], which the command keeps alive
//! until it is terminal.

use ferrocl_backends::{ExecCapabilities, HostBuffer, NativeArgs, NativeCall, NdRange, RectCopy};
use ferrocl_tracing::timed;

use crate::command::Command;
use crate::error::{Error, Result};
use crate::event::{CommandKind, Event};
use crate::kernel::{resolve_range, Kernel};
use crate::map::{Mapping, PendingMap, UnmapError};
use crate::mem::{ImageInfo, MapFlags, MemObject};
use crate::queue::CommandQueue;

const FILL_PATTERN_SIZES: [usize; 8] = [1, 2, 4, 8, 16, 32, 64, 128];

/// Geometry of a rectangular buffer transfer, in bytes.
///
/// `src` and `dst` follow the data: for a read the buffer is the source and
/// host memory the destination, for a write the other way round. A pitch of
/// zero means tightly packed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RectRegion {
    pub src_origin: [usize; 3],
    pub dst_origin: [usize; 3],
    /// Width in bytes, rows, slices.
    pub region: [usize; 3],
    pub src_row_pitch: usize,
    pub src_slice_pitch: usize,
    pub dst_row_pitch: usize,
    pub dst_slice_pitch: usize,
}

impl RectRegion {
    pub fn new(region: [usize; 3]) -> Self {
        Self {
            region,
            ..Self::default()
        }
    }

    pub fn with_origins(mut self, src_origin: [usize; 3], dst_origin: [usize; 3]) -> Self {
        self.src_origin = src_origin;
        self.dst_origin = dst_origin;
        self
    }

    pub fn with_src_pitches(mut self, row_pitch: usize, slice_pitch: usize) -> Self {
        self.src_row_pitch = row_pitch;
        self.src_slice_pitch = slice_pitch;
        self
    }

    pub fn with_dst_pitches(mut self, row_pitch: usize, slice_pitch: usize) -> Self {
        self.dst_row_pitch = row_pitch;
        self.dst_slice_pitch = slice_pitch;
        self
    }

    /// Resolve default pitches and check both sides, relative to the start
    /// of each object.
    fn resolve(&self, src_len: usize, dst_len: usize) -> Result<RectCopy> {
        if self.region.contains(&0) {
            return Err(Error::invalid_value(format!("region {:?} has a zero component", self.region)));
        }
        let (src_row_pitch, src_slice_pitch) = pitches(self.region, self.src_row_pitch, self.src_slice_pitch)?;
        let (dst_row_pitch, dst_slice_pitch) = pitches(self.region, self.dst_row_pitch, self.dst_slice_pitch)?;
        let offset = |origin: [usize; 3], row: usize, slice: usize| {
            origin[2]
                .checked_mul(slice)
                .and_then(|z| origin[1].checked_mul(row).and_then(|y| z.checked_add(y)))
                .and_then(|zy| zy.checked_add(origin[0]))
                .ok_or_else(|| Error::invalid_value("rect origin overflows"))
        };
        let rect = RectCopy {
            src_offset: offset(self.src_origin, src_row_pitch, src_slice_pitch)?,
            dst_offset: offset(self.dst_origin, dst_row_pitch, dst_slice_pitch)?,
            region: self.region,
            src_row_pitch,
            src_slice_pitch,
            dst_row_pitch,
            dst_slice_pitch,
        };
        rect.check_bounds(src_len, dst_len)
            .map_err(|err| Error::invalid_value(err.to_string()))?;
        Ok(rect)
    }
}

fn pitches(region: [usize; 3], row_pitch: usize, slice_pitch: usize) -> Result<(usize, usize)> {
    let row_pitch = if row_pitch == 0 { region[0] } else { row_pitch };
    if row_pitch < region[0] {
        return Err(Error::invalid_value(format!("row pitch {row_pitch} is smaller than the row width {}", region[0])));
    }
    let packed_slice = row_pitch
        .checked_mul(region[1])
        .ok_or_else(|| Error::invalid_value("slice pitch overflows"))?;
    let slice_pitch = if slice_pitch == 0 { packed_slice } else { slice_pitch };
    if slice_pitch < packed_slice || slice_pitch % row_pitch != 0 {
        return Err(Error::invalid_value(format!(
            "slice pitch {slice_pitch} must be a multiple of the row pitch {row_pitch} and at least {packed_slice}"
        )));
    }
    Ok((row_pitch, slice_pitch))
}

fn check_range(offset: usize, size: usize, total: usize) -> Result<()> {
    if size == 0 {
        return Err(Error::invalid_value("transfer size must be non-zero"));
    }
    match offset.checked_add(size) {
        Some(end) if end <= total => Ok(()),
        _ => Err(Error::invalid_value(format!("{offset}+{size} exceeds object size {total}"))),
    }
}

fn check_host(host: &HostBuffer, needed: usize) -> Result<()> {
    if host.len() < needed {
        return Err(Error::invalid_value(format!(
            "host buffer holds {} bytes, {needed} needed",
            host.len()
        )));
    }
    Ok(())
}

fn shifted(mut rect: RectCopy, src_base: usize, dst_base: usize) -> RectCopy {
    rect.src_offset += src_base;
    rect.dst_offset += dst_base;
    rect
}

/// One side of an image transfer: storage offset and pitches.
struct ImageSide {
    offset: usize,
    row_pitch: usize,
    slice_pitch: usize,
}

/// Validate `origin`/`region` (in pixels) against the image and return the
/// storage side plus the region in bytes.
fn image_side(image: &MemObject, info: &ImageInfo, origin: [usize; 3], region: [usize; 3]) -> Result<(ImageSide, [usize; 3])> {
    if region.contains(&0) {
        return Err(Error::invalid_value(format!("region {region:?} has a zero component")));
    }
    if !info.is_3d() && (origin[2] != 0 || region[2] != 1) {
        return Err(Error::invalid_value("2D images need origin[2] == 0 and region[2] == 1"));
    }
    let extent = [info.width, info.height, info.depth];
    for dim in 0..3 {
        if origin[dim].checked_add(region[dim]).is_none_or(|end| end > extent[dim]) {
            return Err(Error::invalid_value(format!(
                "origin {origin:?} + region {region:?} exceeds image {extent:?}"
            )));
        }
    }
    let pixel = info.pixel_size();
    let side = ImageSide {
        offset: image.base_offset() + origin[0] * pixel + origin[1] * info.row_pitch + origin[2] * info.slice_pitch,
        row_pitch: info.row_pitch,
        slice_pitch: info.slice_pitch,
    };
    Ok((side, [region[0] * pixel, region[1], region[2]]))
}

/// Tightly packed layout for `bytes`: `(row_pitch, slice_pitch, total)`.
fn packed(bytes: [usize; 3]) -> (usize, usize, usize) {
    let row = bytes[0];
    let slice = row * bytes[1];
    (row, slice, slice * bytes[2])
}

fn rect_between(src: &ImageSide, dst: &ImageSide, region: [usize; 3]) -> RectCopy {
    RectCopy {
        src_offset: src.offset,
        dst_offset: dst.offset,
        region,
        src_row_pitch: src.row_pitch,
        src_slice_pitch: src.slice_pitch,
        dst_row_pitch: dst.row_pitch,
        dst_slice_pitch: dst.slice_pitch,
    }
}

fn packed_side(offset: usize, bytes: [usize; 3]) -> (ImageSide, usize) {
    let (row_pitch, slice_pitch, total) = packed(bytes);
    (
        ImageSide {
            offset,
            row_pitch,
            slice_pitch,
        },
        total,
    )
}

impl CommandQueue {
    fn check_buffer(&self, mem: &MemObject) -> Result<()> {
        mem.require_buffer()?;
        self.check_mem(mem)
    }

    fn check_image<'m>(&self, mem: &'m MemObject) -> Result<&'m ImageInfo> {
        if !self.device().info().image_support {
            return Err(Error::invalid_operation(format!("{} has no image support", self.device().name())));
        }
        let info = mem.require_image()?;
        self.check_mem(mem)?;
        Ok(info)
    }

    fn complete_if_blocking(&self, event: Event, blocking: bool) -> Result<Event> {
        if blocking {
            let (result, waited_us) = timed!("blocking_wait", { event.wait() });
            tracing::trace!(queue = self.id(), event = event.id(), waited_us, "blocking_enqueue_done");
            result?;
        }
        Ok(event)
    }

    /// Read `size` bytes at `offset` of `buffer` into the start of `dst`.
    #[tracing::instrument(level = "debug", skip_all, fields(queue = self.id(), mem = buffer.id(), offset = offset, size = size))]
    pub fn enqueue_read_buffer(
        &self,
        buffer: &MemObject,
        blocking: bool,
        offset: usize,
        size: usize,
        dst: &HostBuffer,
        wait_list: &[Event],
    ) -> Result<Event> {
        self.check_usable()?;
        self.check_buffer(buffer)?;
        buffer.check_host_read()?;
        check_range(offset, size, buffer.size())?;
        check_host(dst, size)?;
        let command = Command::Read {
            src: buffer.clone(),
            dst: dst.clone(),
            rect: RectCopy::linear(buffer.base_offset() + offset, 0, size),
        };
        let event = self.queue_event(CommandKind::ReadBuffer, command, wait_list)?;
        self.complete_if_blocking(event, blocking)
    }

    /// Write the first `size` bytes of `src` to `buffer` at `offset`.
    #[tracing::instrument(level = "debug", skip_all, fields(queue = self.id(), mem = buffer.id(), offset = offset, size = size))]
    pub fn enqueue_write_buffer(
        &self,
        buffer: &MemObject,
        blocking: bool,
        offset: usize,
        size: usize,
        src: &HostBuffer,
        wait_list: &[Event],
    ) -> Result<Event> {
        self.check_usable()?;
        self.check_buffer(buffer)?;
        buffer.check_host_write()?;
        check_range(offset, size, buffer.size())?;
        check_host(src, size)?;
        let command = Command::Write {
            src: src.clone(),
            dst: buffer.clone(),
            rect: RectCopy::linear(0, buffer.base_offset() + offset, size),
        };
        let event = self.queue_event(CommandKind::WriteBuffer, command, wait_list)?;
        self.complete_if_blocking(event, blocking)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(queue = self.id(), src = src.id(), dst = dst.id(), size = size))]
    pub fn enqueue_copy_buffer(
        &self,
        src: &MemObject,
        dst: &MemObject,
        src_offset: usize,
        dst_offset: usize,
        size: usize,
        wait_list: &[Event],
    ) -> Result<Event> {
        self.check_usable()?;
        self.check_buffer(src)?;
        self.check_buffer(dst)?;
        check_range(src_offset, size, src.size())?;
        check_range(dst_offset, size, dst.size())?;
        let rect = RectCopy::linear(src.base_offset() + src_offset, dst.base_offset() + dst_offset, size);
        if src.storage().same_storage(dst.storage()) && rect.overlaps() {
            return Err(Error::MemCopyOverlap);
        }
        let command = Command::Copy {
            src: src.clone(),
            dst: dst.clone(),
            rect,
        };
        self.queue_event(CommandKind::CopyBuffer, command, wait_list)
    }

    /// Rectangular read; the buffer is the source side of `rect`.
    #[tracing::instrument(level = "debug", skip_all, fields(queue = self.id(), mem = buffer.id()))]
    pub fn enqueue_read_buffer_rect(
        &self,
        buffer: &MemObject,
        blocking: bool,
        rect: &RectRegion,
        dst: &HostBuffer,
        wait_list: &[Event],
    ) -> Result<Event> {
        self.check_usable()?;
        self.check_buffer(buffer)?;
        buffer.check_host_read()?;
        let geometry = shifted(rect.resolve(buffer.size(), dst.len())?, buffer.base_offset(), 0);
        let command = Command::Read {
            src: buffer.clone(),
            dst: dst.clone(),
            rect: geometry,
        };
        let event = self.queue_event(CommandKind::ReadBufferRect, command, wait_list)?;
        self.complete_if_blocking(event, blocking)
    }

    /// Rectangular write; host memory is the source side of `rect`.
    #[tracing::instrument(level = "debug", skip_all, fields(queue = self.id(), mem = buffer.id()))]
    pub fn enqueue_write_buffer_rect(
        &self,
        buffer: &MemObject,
        blocking: bool,
        rect: &RectRegion,
        src: &HostBuffer,
        wait_list: &[Event],
    ) -> Result<Event> {
        self.check_usable()?;
        self.check_buffer(buffer)?;
        buffer.check_host_write()?;
        let geometry = shifted(rect.resolve(src.len(), buffer.size())?, 0, buffer.base_offset());
        let command = Command::Write {
            src: src.clone(),
            dst: buffer.clone(),
            rect: geometry,
        };
        let event = self.queue_event(CommandKind::WriteBufferRect, command, wait_list)?;
        self.complete_if_blocking(event, blocking)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(queue = self.id(), src = src.id(), dst = dst.id()))]
    pub fn enqueue_copy_buffer_rect(
        &self,
        src: &MemObject,
        dst: &MemObject,
        rect: &RectRegion,
        wait_list: &[Event],
    ) -> Result<Event> {
        self.check_usable()?;
        self.check_buffer(src)?;
        self.check_buffer(dst)?;
        let geometry = shifted(rect.resolve(src.size(), dst.size())?, src.base_offset(), dst.base_offset());
        if src.storage().same_storage(dst.storage()) && geometry.overlaps() {
            return Err(Error::MemCopyOverlap);
        }
        let command = Command::Copy {
            src: src.clone(),
            dst: dst.clone(),
            rect: geometry,
        };
        self.queue_event(CommandKind::CopyBufferRect, command, wait_list)
    }

    /// Fill `size` bytes at `offset` with repetitions of `pattern`.
    #[tracing::instrument(level = "debug", skip_all, fields(queue = self.id(), mem = buffer.id(), offset = offset, size = size))]
    pub fn enqueue_fill_buffer(
        &self,
        buffer: &MemObject,
        pattern: &[u8],
        offset: usize,
        size: usize,
        wait_list: &[Event],
    ) -> Result<Event> {
        self.check_usable()?;
        self.check_buffer(buffer)?;
        let width = pattern.len();
        if !FILL_PATTERN_SIZES.contains(&width) {
            return Err(Error::invalid_value(format!("fill pattern of {width} bytes")));
        }
        if offset % width != 0 || size % width != 0 {
            return Err(Error::invalid_value(format!(
                "offset {offset} and size {size} must be multiples of the pattern size {width}"
            )));
        }
        check_range(offset, size, buffer.size())?;
        let command = Command::Fill {
            dst: buffer.clone(),
            offset: buffer.base_offset() + offset,
            len: size,
            pattern: pattern.to_vec(),
        };
        self.queue_event(CommandKind::FillBuffer, command, wait_list)
    }

    /// Read `region` pixels at `origin` into `dst`, tightly packed.
    #[tracing::instrument(level = "debug", skip_all, fields(queue = self.id(), mem = image.id()))]
    pub fn enqueue_read_image(
        &self,
        image: &MemObject,
        blocking: bool,
        origin: [usize; 3],
        region: [usize; 3],
        dst: &HostBuffer,
        wait_list: &[Event],
    ) -> Result<Event> {
        self.check_usable()?;
        let info = self.check_image(image)?;
        image.check_host_read()?;
        let (side, bytes) = image_side(image, info, origin, region)?;
        let (host, total) = packed_side(0, bytes);
        check_host(dst, total)?;
        let command = Command::Read {
            src: image.clone(),
            dst: dst.clone(),
            rect: rect_between(&side, &host, bytes),
        };
        let event = self.queue_event(CommandKind::ReadImage, command, wait_list)?;
        self.complete_if_blocking(event, blocking)
    }

    /// Write tightly packed pixels from `src` into `region` at `origin`.
    #[tracing::instrument(level = "debug", skip_all, fields(queue = self.id(), mem = image.id()))]
    pub fn enqueue_write_image(
        &self,
        image: &MemObject,
        blocking: bool,
        origin: [usize; 3],
        region: [usize; 3],
        src: &HostBuffer,
        wait_list: &[Event],
    ) -> Result<Event> {
        self.check_usable()?;
        let info = self.check_image(image)?;
        image.check_host_write()?;
        let (side, bytes) = image_side(image, info, origin, region)?;
        let (host, total) = packed_side(0, bytes);
        check_host(src, total)?;
        let command = Command::Write {
            src: src.clone(),
            dst: image.clone(),
            rect: rect_between(&host, &side, bytes),
        };
        let event = self.queue_event(CommandKind::WriteImage, command, wait_list)?;
        self.complete_if_blocking(event, blocking)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(queue = self.id(), src = src.id(), dst = dst.id()))]
    pub fn enqueue_copy_image(
        &self,
        src: &MemObject,
        dst: &MemObject,
        src_origin: [usize; 3],
        dst_origin: [usize; 3],
        region: [usize; 3],
        wait_list: &[Event],
    ) -> Result<Event> {
        self.check_usable()?;
        let src_info = self.check_image(src)?;
        let dst_info = self.check_image(dst)?;
        if src_info.format != dst_info.format {
            return Err(Error::ImageFormatMismatch);
        }
        let (src_side, bytes) = image_side(src, src_info, src_origin, region)?;
        let (dst_side, _) = image_side(dst, dst_info, dst_origin, region)?;
        let rect = rect_between(&src_side, &dst_side, bytes);
        if src.storage().same_storage(dst.storage()) && rect.overlaps() {
            return Err(Error::MemCopyOverlap);
        }
        let command = Command::Copy {
            src: src.clone(),
            dst: dst.clone(),
            rect,
        };
        self.queue_event(CommandKind::CopyImage, command, wait_list)
    }

    /// Copy image pixels into `dst` at `dst_offset`, tightly packed.
    #[tracing::instrument(level = "debug", skip_all, fields(queue = self.id(), src = src.id(), dst = dst.id()))]
    pub fn enqueue_copy_image_to_buffer(
        &self,
        src: &MemObject,
        dst: &MemObject,
        src_origin: [usize; 3],
        region: [usize; 3],
        dst_offset: usize,
        wait_list: &[Event],
    ) -> Result<Event> {
        self.check_usable()?;
        let info = self.check_image(src)?;
        self.check_buffer(dst)?;
        let (image, bytes) = image_side(src, info, src_origin, region)?;
        let (buffer, total) = packed_side(dst.base_offset() + dst_offset, bytes);
        check_range(dst_offset, total, dst.size())?;
        let command = Command::Copy {
            src: src.clone(),
            dst: dst.clone(),
            rect: rect_between(&image, &buffer, bytes),
        };
        self.queue_event(CommandKind::CopyImageToBuffer, command, wait_list)
    }

    /// Copy tightly packed pixels at `src_offset` of a buffer into an image.
    #[tracing::instrument(level = "debug", skip_all, fields(queue = self.id(), src = src.id(), dst = dst.id()))]
    pub fn enqueue_copy_buffer_to_image(
        &self,
        src: &MemObject,
        dst: &MemObject,
        src_offset: usize,
        dst_origin: [usize; 3],
        region: [usize; 3],
        wait_list: &[Event],
    ) -> Result<Event> {
        self.check_usable()?;
        self.check_buffer(src)?;
        let info = self.check_image(dst)?;
        let (image, bytes) = image_side(dst, info, dst_origin, region)?;
        let (buffer, total) = packed_side(src.base_offset() + src_offset, bytes);
        check_range(src_offset, total, src.size())?;
        let command = Command::Copy {
            src: src.clone(),
            dst: dst.clone(),
            rect: rect_between(&buffer, &image, bytes),
        };
        self.queue_event(CommandKind::CopyBufferToImage, command, wait_list)
    }

    /// Map `size` bytes at `offset` of `buffer` into host memory.
    ///
    /// The bytes become reachable through [`PendingMap::wait`] once the map
    /// command completed. With `blocking` the command has already completed
    /// when this returns.
    #[tracing::instrument(level = "debug", skip_all, fields(queue = self.id(), mem = buffer.id(), offset = offset, size = size))]
    pub fn enqueue_map_buffer(
        &self,
        buffer: &MemObject,
        blocking: bool,
        flags: MapFlags,
        offset: usize,
        size: usize,
        wait_list: &[Event],
    ) -> Result<PendingMap> {
        self.check_usable()?;
        self.check_buffer(buffer)?;
        self.check_map_flags(buffer, flags)?;
        check_range(offset, size, buffer.size())?;
        let start = buffer.base_offset() + offset;
        let registration = buffer.register_map(start, size, flags)?;
        let staging = HostBuffer::new(size);
        let rect = RectCopy::linear(start, 0, size);
        let command = Command::Map {
            mem: buffer.clone(),
            staging: staging.clone(),
            rect,
        };
        let event = self.queue_event(CommandKind::MapBuffer, command, wait_list)?;
        self.finish_map(Mapping::new(buffer.clone(), staging, flags, rect, event, registration), blocking)
    }

    /// Map `region` pixels at `origin`; the mapping is tightly packed.
    #[tracing::instrument(level = "debug", skip_all, fields(queue = self.id(), mem = image.id()))]
    pub fn enqueue_map_image(
        &self,
        image: &MemObject,
        blocking: bool,
        flags: MapFlags,
        origin: [usize; 3],
        region: [usize; 3],
        wait_list: &[Event],
    ) -> Result<PendingMap> {
        self.check_usable()?;
        let info = self.check_image(image)?;
        self.check_map_flags(image, flags)?;
        let (side, bytes) = image_side(image, info, origin, region)?;
        let (host, total) = packed_side(0, bytes);
        let rect = rect_between(&side, &host, bytes);
        let span = rect
            .src_end()
            .map(|end| end - rect.src_offset)
            .ok_or_else(|| Error::invalid_value("image region overflows"))?;
        let registration = image.register_map(rect.src_offset, span, flags)?;
        let staging = HostBuffer::new(total);
        let command = Command::Map {
            mem: image.clone(),
            staging: staging.clone(),
            rect,
        };
        let event = self.queue_event(CommandKind::MapImage, command, wait_list)?;
        self.finish_map(Mapping::new(image.clone(), staging, flags, rect, event, registration), blocking)
    }

    fn check_map_flags(&self, mem: &MemObject, flags: MapFlags) -> Result<()> {
        if flags.is_empty() {
            return Err(Error::invalid_value("map flags must include READ or WRITE"));
        }
        if flags.contains(MapFlags::READ) {
            mem.check_host_read()?;
        }
        if flags.contains(MapFlags::WRITE) {
            mem.check_host_write()?;
        }
        Ok(())
    }

    fn finish_map(&self, mapping: Mapping, blocking: bool) -> Result<PendingMap> {
        let pending = PendingMap::new(mapping);
        if blocking {
            let (result, waited_us) = timed!("blocking_map", { pending.event().wait() });
            tracing::trace!(queue = self.id(), event = pending.event().id(), waited_us, "blocking_map_done");
            result?;
        }
        Ok(pending)
    }

    /// Release a mapping, writing host changes back for write mappings.
    ///
    /// The unmap command waits for the map command in addition to
    /// `wait_list`. The mapped region stays registered until it finishes.
    /// A rejected unmap hands the mapping back inside the [`UnmapError`].
    #[tracing::instrument(level = "debug", skip_all, fields(queue = self.id(), mem = mapping.mem().id()))]
    pub fn enqueue_unmap_mem_object(
        &self,
        mapping: Mapping,
        wait_list: &[Event],
    ) -> std::result::Result<Event, UnmapError> {
        let mut dependencies = wait_list.to_vec();
        dependencies.push(mapping.event().clone());
        let checked = self
            .check_usable()
            .and_then(|()| self.check_mem(mapping.mem()))
            .and_then(|()| self.check_wait_list(&dependencies));
        if let Err(error) = checked {
            tracing::debug!(queue = self.id(), code = error.code(), "unmap_rejected");
            return Err(UnmapError { error, mapping });
        }
        Ok(self.push_event(CommandKind::UnmapMemObject, Command::Unmap { mapping }, &dependencies))
    }

    /// Launch `kernel` over an N-dimensional range. Without `local_size` the
    /// work-group size is chosen from the device limits.
    #[tracing::instrument(level = "debug", skip_all, fields(queue = self.id(), kernel = kernel.name(), work_dim = global_size.len()))]
    pub fn enqueue_nd_range_kernel(
        &self,
        kernel: &Kernel,
        global_offset: Option<&[usize]>,
        global_size: &[usize],
        local_size: Option<&[usize]>,
        wait_list: &[Event],
    ) -> Result<Event> {
        self.check_usable()?;
        let range = resolve_range(global_offset, global_size, local_size, self.device().info())?;
        self.launch(CommandKind::NdRangeKernel, kernel, range, wait_list)
    }

    /// Run `kernel` as a single work-item.
    #[tracing::instrument(level = "debug", skip_all, fields(queue = self.id(), kernel = kernel.name()))]
    pub fn enqueue_task(&self, kernel: &Kernel, wait_list: &[Event]) -> Result<Event> {
        self.check_usable()?;
        self.launch(CommandKind::Task, kernel, NdRange::single(), wait_list)
    }

    fn launch(&self, kind: CommandKind, kernel: &Kernel, range: NdRange, wait_list: &[Event]) -> Result<Event> {
        let info = self.device().info();
        if !info.exec_capabilities.contains(ExecCapabilities::KERNEL) {
            return Err(Error::invalid_operation(format!("{} cannot run kernels", info.name)));
        }
        if kernel.context() != self.context() {
            return Err(Error::InvalidContext);
        }
        let (launch, retained) = kernel.prepare(range, info)?;
        for mem in &retained {
            self.check_mem(mem)?;
        }
        tracing::trace!(kernel = kernel.name(), range = %launch.range, "kernel_prepared");
        self.queue_event(kind, Command::Kernel { launch, _retained: retained }, wait_list)
    }

    /// Run a host function on a worker. `mem` objects are passed to it as
    /// regions, in order, through [`NativeArgs::memory`].
    #[tracing::instrument(level = "debug", skip_all, fields(queue = self.id(), mem_objects = mem.len()))]
    pub fn enqueue_native_kernel<F>(
        &self,
        func: F,
        mem: &[MemObject],
        payload: Vec<u8>,
        wait_list: &[Event],
    ) -> Result<Event>
    where
        F: FnOnce(&mut NativeArgs) -> std::result::Result<(), i32> + Send + 'static,
    {
        self.check_usable()?;
        if !self
            .device()
            .info()
            .exec_capabilities
            .contains(ExecCapabilities::NATIVE_KERNEL)
        {
            return Err(Error::invalid_operation(format!(
                "{} cannot run native kernels",
                self.device().name()
            )));
        }
        let mut memory = Vec::with_capacity(mem.len());
        for object in mem {
            self.check_mem(object)?;
            memory.push(object.region()?);
        }
        let call = NativeCall {
            func: Box::new(func),
            args: NativeArgs { memory, payload },
        };
        let command = Command::Native {
            call: Some(call),
            _retained: mem.to_vec(),
        };
        self.queue_event(CommandKind::NativeKernel, command, wait_list)
    }

    /// Event completing once everything queued so far is terminal.
    pub fn enqueue_marker(&self) -> Result<Event> {
        self.queue_event(CommandKind::Marker, Command::Sync, &[])
    }

    /// Nothing queued after this runs before everything queued before it is
    /// terminal.
    pub fn enqueue_barrier(&self) -> Result<()> {
        self.queue_event(CommandKind::Barrier, Command::Sync, &[])?;
        Ok(())
    }

    /// Hold back everything queued later until `events` are terminal.
    pub fn enqueue_wait_for_events(&self, events: &[Event]) -> Result<()> {
        if events.is_empty() {
            return Err(Error::InvalidEventWaitList);
        }
        self.queue_event(CommandKind::WaitForEvents, Command::Sync, events)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pitches_pack_the_region() {
        let rect = RectRegion::new([4, 3, 2]).resolve(24, 24).expect("rect");
        assert_eq!((rect.src_row_pitch, rect.src_slice_pitch), (4, 12));
        assert_eq!(rect.byte_len(), 24);
    }

    #[test]
    fn origins_use_resolved_pitches() {
        let rect = RectRegion::new([2, 2, 1])
            .with_origins([1, 1, 0], [0, 0, 1])
            .with_src_pitches(8, 0)
            .with_dst_pitches(2, 4)
            .resolve(64, 8)
            .expect("rect");
        assert_eq!(rect.src_offset, 9);
        assert_eq!(rect.dst_offset, 4);
        assert_eq!(rect.src_slice_pitch, 16);
    }

    #[test]
    fn rect_rejections() {
        assert!(matches!(RectRegion::new([0, 1, 1]).resolve(8, 8), Err(Error::InvalidValue(_))));
        assert!(matches!(
            RectRegion::new([4, 2, 1]).with_src_pitches(3, 0).resolve(64, 64),
            Err(Error::InvalidValue(_))
        ));
        assert!(matches!(
            RectRegion::new([4, 2, 1]).with_src_pitches(4, 6).resolve(64, 64),
            Err(Error::InvalidValue(_))
        ));
        assert!(matches!(RectRegion::new([4, 4, 1]).resolve(15, 64), Err(Error::InvalidValue(_))));
    }

    #[test]
    fn range_checks() {
        assert!(check_range(0, 4, 4).is_ok());
        assert!(check_range(1, 4, 4).is_err());
        assert!(check_range(0, 0, 4).is_err());
        assert!(check_range(usize::MAX, 2, 4).is_err());
    }
}
