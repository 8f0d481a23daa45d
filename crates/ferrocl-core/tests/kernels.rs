//! Kernel launches, native host functions, images and rectangular
//! transfers on the CPU device.

mod common;

use std::sync::Arc;

use common::cpu_queue;
use ferrocl_backends::BackendError;
use ferrocl_core::{
    ChannelOrder, ChannelType, DeviceInfo, Error, FnKernel, HostBuffer, ImageFormat, Kernel, KernelCompiler,
    KernelEntry, MemFlags, NdRange, QueueProperties, RectRegion, Result,
};
use parking_lot::Mutex;

fn scaled_add() -> Arc<FnKernel> {
    Arc::new(FnKernel::per_item("scaled_add", |gid, args| {
        let i = gid[0];
        let scale = args.scalar::<u32>(3)?;
        let value = args.memory(0)?.load::<u32>(i)? * scale + args.memory(1)?.load::<u32>(i)?;
        args.memory(2)?.store(i, value)
    }))
}

// ============================================================================
// Kernels
// ============================================================================

#[test]
fn test_nd_range_kernel_runs_every_work_item() -> Result<()> {
    let (ctx, queue) = cpu_queue(QueueProperties::empty())?;
    let n = 256;
    let a = ctx.create_buffer_with_data(MemFlags::READ_ONLY, bytemuck::cast_slice(&(0..n as u32).collect::<Vec<_>>()))?;
    let b = ctx.create_buffer_with_data(MemFlags::READ_ONLY, bytemuck::cast_slice(&vec![1u32; n]))?;
    let c = ctx.create_buffer(MemFlags::WRITE_ONLY, n * 4)?;

    let kernel = Kernel::from_entry(&ctx, scaled_add(), 4);
    kernel.set_arg_buffer(0, &a)?;
    kernel.set_arg_buffer(1, &b)?;
    kernel.set_arg_buffer(2, &c)?;
    kernel.set_arg_scalar(3, 3u32)?;
    queue.enqueue_nd_range_kernel(&kernel, None, &[n], Some(&[64]), &[])?;

    let out = HostBuffer::new(n * 4);
    queue.enqueue_read_buffer(&c, true, 0, n * 4, &out, &[])?;
    let expected: Vec<u32> = (0..n as u32).map(|i| i * 3 + 1).collect();
    assert_eq!(out.to_vec::<u32>(), expected);
    Ok(())
}

#[test]
fn test_arguments_are_captured_at_enqueue() -> Result<()> {
    let (ctx, queue) = cpu_queue(QueueProperties::empty())?;
    let gate = ctx.create_user_event();
    let a = ctx.create_buffer_with_data(MemFlags::READ_WRITE, bytemuck::cast_slice(&[5u32; 8]))?;
    let b = ctx.create_buffer(MemFlags::READ_WRITE, 32)?;
    let c = ctx.create_buffer(MemFlags::READ_WRITE, 32)?;

    let kernel = Kernel::from_entry(&ctx, scaled_add(), 4);
    kernel.set_arg_buffer(0, &a)?;
    kernel.set_arg_buffer(1, &b)?;
    kernel.set_arg_buffer(2, &c)?;
    kernel.set_arg_scalar(3, 2u32)?;
    let launch = queue.enqueue_nd_range_kernel(&kernel, None, &[8], None, &[gate.event().clone()])?;
    kernel.set_arg_scalar(3, 100u32)?;
    kernel.set_arg_buffer(2, &b)?;
    gate.complete()?;
    launch.wait()?;

    let out = HostBuffer::new(32);
    queue.enqueue_read_buffer(&c, true, 0, 32, &out, &[])?;
    assert_eq!(out.to_vec::<u32>(), vec![10; 8]);
    Ok(())
}

#[test]
fn test_two_dimensional_range_honours_offset() -> Result<()> {
    let (ctx, queue) = cpu_queue(QueueProperties::empty())?;
    let grid = ctx.create_buffer(MemFlags::READ_WRITE, 64)?;
    let entry = Arc::new(FnKernel::per_item("mark", |gid, args| {
        args.memory(0)?.store(gid[1] * 8 + gid[0], 1u8)
    }));
    let kernel = Kernel::from_entry(&ctx, entry, 1);
    kernel.set_arg_buffer(0, &grid)?;
    queue.enqueue_nd_range_kernel(&kernel, Some(&[2, 1]), &[4, 4], None, &[])?;

    let out = HostBuffer::new(64);
    queue.enqueue_read_buffer(&grid, true, 0, 64, &out, &[])?;
    for (index, value) in out.to_vec::<u8>().into_iter().enumerate() {
        let (x, y) = (index % 8, index / 8);
        let inside = (2..6).contains(&x) && (1..5).contains(&y);
        assert_eq!(value, u8::from(inside), "cell ({x}, {y})");
    }
    Ok(())
}

#[test]
fn test_local_memory_is_private_to_each_group() -> Result<()> {
    let (ctx, queue) = cpu_queue(QueueProperties::empty())?;
    let input = ctx.create_buffer_with_data(MemFlags::READ_ONLY, bytemuck::cast_slice(&(0..64u32).collect::<Vec<_>>()))?;
    let sums = ctx.create_buffer(MemFlags::WRITE_ONLY, 4 * 4)?;
    let entry = Arc::new(FnKernel::new("group_sum", |ctx| {
        let args = ctx.args;
        let group = ctx.group;
        let scratch = ctx.local_mut(2)?;
        for local in group.local_ids() {
            let value = args.memory(0)?.load::<u32>(group.global_id(local)[0])?;
            let total = u32::from_ne_bytes([scratch[0], scratch[1], scratch[2], scratch[3]]) + value;
            scratch[..4].copy_from_slice(&total.to_ne_bytes());
        }
        let total = u32::from_ne_bytes([scratch[0], scratch[1], scratch[2], scratch[3]]);
        args.memory(1)?.store(group.group_id[0], total)
    }));
    let kernel = Kernel::from_entry(&ctx, entry, 3);
    kernel.set_arg_buffer(0, &input)?;
    kernel.set_arg_buffer(1, &sums)?;
    kernel.set_arg_local(2, 4)?;
    queue.enqueue_nd_range_kernel(&kernel, None, &[64], Some(&[16]), &[])?;

    let out = HostBuffer::new(16);
    queue.enqueue_read_buffer(&sums, true, 0, 16, &out, &[])?;
    let expected: Vec<u32> = (0..4u32).map(|g| (g * 16..(g + 1) * 16).sum()).collect();
    assert_eq!(out.to_vec::<u32>(), expected);
    Ok(())
}

#[test]
fn test_task_runs_a_single_work_item() -> Result<()> {
    let (ctx, queue) = cpu_queue(QueueProperties::empty())?;
    let counter = ctx.create_buffer(MemFlags::READ_WRITE, 4)?;
    let entry = Arc::new(FnKernel::per_item("bump", |_, args| {
        let counter = args.memory(0)?;
        counter.store(0, counter.load::<u32>(0)? + 1)
    }));
    let kernel = Kernel::from_entry(&ctx, entry, 1);
    kernel.set_arg_buffer(0, &counter)?;
    for _ in 0..3 {
        queue.enqueue_task(&kernel, &[])?;
    }

    let out = HostBuffer::new(4);
    queue.enqueue_read_buffer(&counter, true, 0, 4, &out, &[])?;
    assert_eq!(out.to_vec::<u32>(), vec![3]);
    Ok(())
}

struct RecordingCompiler {
    ranges: Arc<Mutex<Vec<NdRange>>>,
}

impl KernelCompiler for RecordingCompiler {
    fn compile(
        &self,
        name: &str,
        range: &NdRange,
        device: &DeviceInfo,
    ) -> ferrocl_backends::Result<Arc<dyn KernelEntry>> {
        if range.work_group_size() > device.max_work_group_size {
            return Err(BackendError::unsupported("group too large"));
        }
        self.ranges.lock().push(*range);
        let entry: Arc<dyn KernelEntry> = Arc::new(FnKernel::new(name, |_| Ok(())));
        Ok(entry)
    }
}

#[test]
fn test_compiler_receives_derived_geometry() -> Result<()> {
    let (ctx, queue) = cpu_queue(QueueProperties::empty())?;
    let ranges = Arc::default();
    let kernel = Kernel::new(&ctx, "noop", 0, RecordingCompiler { ranges: Arc::clone(&ranges) });
    queue.enqueue_nd_range_kernel(&kernel, None, &[12, 300], None, &[])?.wait()?;

    let ranges = ranges.lock();
    let range = ranges.first().ok_or(Error::InvalidOperation("compiler not called".into()))?;
    assert_eq!(range.work_dim, 2);
    assert_eq!(&range.global_size[..2], &[12, 300]);
    assert_eq!(range.global_size[0] % range.local_size[0], 0);
    assert_eq!(range.global_size[1] % range.local_size[1], 0);
    assert!(range.work_group_size() <= queue.device().info().max_work_group_size);
    Ok(())
}

#[test]
fn test_kernel_failure_is_reported_on_the_event() -> Result<()> {
    let (ctx, queue) = cpu_queue(QueueProperties::empty())?;
    let entry = Arc::new(FnKernel::new("trap", |_| Err(BackendError::kernel_failed("trap"))));
    let kernel = Kernel::from_entry(&ctx, entry, 0);
    let launch = queue.enqueue_task(&kernel, &[])?;
    assert_eq!(launch.wait(), Err(Error::BackendExecutionFailed(-5)));
    Ok(())
}

// ============================================================================
// Native kernels
// ============================================================================

#[test]
fn test_native_kernel_sees_memory_and_payload() -> Result<()> {
    let (ctx, queue) = cpu_queue(QueueProperties::empty())?;
    let src = ctx.create_buffer_with_data(MemFlags::READ_WRITE, bytemuck::cast_slice(&[1u32, 2, 3, 4]))?;
    let parent = ctx.create_buffer(MemFlags::READ_WRITE, 1024)?;
    let dst = parent.create_sub_buffer(MemFlags::empty(), 512, 16)?;

    queue.enqueue_native_kernel(
        |args| {
            let factor = u32::from_ne_bytes(args.payload[..4].try_into().map_err(|_| -1)?);
            let (src, dst) = (args.region(0).map_err(|_| -2)?, args.region(1).map_err(|_| -2)?);
            for i in 0..4 {
                let value = src.load::<u32>(i).map_err(|_| -3)?;
                dst.store(i, value * factor).map_err(|_| -3)?;
            }
            Ok(())
        },
        &[src, dst.clone()],
        7u32.to_ne_bytes().to_vec(),
        &[],
    )?;

    let out = HostBuffer::new(16);
    queue.enqueue_read_buffer(&parent, true, 512, 16, &out, &[])?;
    assert_eq!(out.to_vec::<u32>(), vec![7, 14, 21, 28]);
    Ok(())
}

// ============================================================================
// Images
// ============================================================================

fn rgba8() -> ImageFormat {
    ImageFormat::new(ChannelOrder::Rgba, ChannelType::UnsignedInt8)
}

#[test]
fn test_image_write_read_respects_row_pitch() -> Result<()> {
    let (ctx, queue) = cpu_queue(QueueProperties::empty())?;
    let image = ctx.create_image_2d(MemFlags::READ_WRITE, rgba8(), 8, 4, 48)?;
    assert_eq!(image.size(), 48 * 4);

    let pixels: Vec<u8> = (0..8 * 4 * 4).map(|v| v as u8).collect();
    queue.enqueue_write_image(&image, false, [0, 0, 0], [8, 4, 1], &HostBuffer::from_vec(pixels.clone()), &[])?;
    let corner = HostBuffer::new(2 * 2 * 4);
    queue.enqueue_read_image(&image, true, [6, 2, 0], [2, 2, 1], &corner, &[])?;

    let row = |y: usize| &pixels[y * 32 + 24..y * 32 + 32];
    assert_eq!(corner.to_vec::<u8>(), [row(2), row(3)].concat());
    Ok(())
}

#[test]
fn test_copy_between_images() -> Result<()> {
    let (ctx, queue) = cpu_queue(QueueProperties::empty())?;
    let src = ctx.create_image_2d(MemFlags::READ_WRITE, rgba8(), 4, 4, 0)?;
    let dst = ctx.create_image_2d(MemFlags::READ_WRITE, rgba8(), 4, 4, 0)?;
    let pixels: Vec<u8> = (0..64).collect();
    queue.enqueue_write_image(&src, false, [0, 0, 0], [4, 4, 1], &HostBuffer::from_vec(pixels.clone()), &[])?;
    queue.enqueue_copy_image(&src, &dst, [0, 0, 0], [2, 2, 0], [2, 2, 1], &[])?;

    let out = HostBuffer::new(64);
    queue.enqueue_read_image(&dst, true, [0, 0, 0], [4, 4, 1], &out, &[])?;
    let out = out.to_vec::<u8>();
    assert_eq!(&out[2 * 16 + 8..2 * 16 + 16], &pixels[0..8]);
    assert_eq!(&out[3 * 16 + 8..3 * 16 + 16], &pixels[16..24]);
    assert!(out[..2 * 16].iter().all(|&b| b == 0));

    let other = ctx.create_image_2d(MemFlags::READ_WRITE, ImageFormat::new(ChannelOrder::R, ChannelType::Float), 4, 4, 0)?;
    assert_eq!(
        queue.enqueue_copy_image(&src, &other, [0, 0, 0], [0, 0, 0], [1, 1, 1], &[]).err(),
        Some(Error::ImageFormatMismatch)
    );
    Ok(())
}

#[test]
fn test_image_buffer_round_trip_through_3d_image() -> Result<()> {
    let (ctx, queue) = cpu_queue(QueueProperties::empty())?;
    let format = ImageFormat::new(ChannelOrder::R, ChannelType::UnsignedInt8);
    let volume = ctx.create_image_3d(MemFlags::READ_WRITE, format, [4, 4, 4], [0, 0])?;
    let staging = ctx.create_buffer_with_data(MemFlags::READ_WRITE, &(0..8).collect::<Vec<u8>>())?;

    // A 2x2x2 cube at (1, 1, 1).
    queue.enqueue_copy_buffer_to_image(&staging, &volume, 0, [1, 1, 1], [2, 2, 2], &[])?;
    let back = ctx.create_buffer(MemFlags::READ_WRITE, 16)?;
    queue.enqueue_copy_image_to_buffer(&volume, &back, [1, 1, 1], [2, 2, 2], 8, &[])?;

    let whole = HostBuffer::new(64);
    queue.enqueue_read_image(&volume, true, [0, 0, 0], [4, 4, 4], &whole, &[])?;
    let whole = whole.to_vec::<u8>();
    assert_eq!(whole[16 + 4 + 1], 0);
    assert_eq!(whole[16 + 4 + 2], 1);
    assert_eq!(whole[2 * 16 + 2 * 4 + 2], 7);
    assert_eq!(whole.iter().filter(|&&b| b != 0).count(), 7);

    let out = HostBuffer::new(16);
    queue.enqueue_read_buffer(&back, true, 0, 16, &out, &[])?;
    assert_eq!(out.to_vec::<u8>(), [vec![0; 8], (0..8).collect()].concat());
    Ok(())
}

// ============================================================================
// Rectangular buffer transfers
// ============================================================================

#[test]
fn test_rect_write_then_read() -> Result<()> {
    let (ctx, queue) = cpu_queue(QueueProperties::empty())?;
    // A 16x4 byte surface; write a 4x2 block at (3, 1).
    let surface = ctx.create_buffer(MemFlags::READ_WRITE, 64)?;
    let block = HostBuffer::from_vec(vec![1, 2, 3, 4, 5, 6, 7, 8]);
    let write = RectRegion::new([4, 2, 1])
        .with_origins([0, 0, 0], [3, 1, 0])
        .with_dst_pitches(16, 0);
    queue.enqueue_write_buffer_rect(&surface, false, &write, &block, &[])?;

    let linear = HostBuffer::new(64);
    queue.enqueue_read_buffer(&surface, true, 0, 64, &linear, &[])?;
    let linear = linear.to_vec::<u8>();
    assert_eq!(&linear[19..23], &[1, 2, 3, 4]);
    assert_eq!(&linear[35..39], &[5, 6, 7, 8]);
    assert_eq!(linear.iter().filter(|&&b| b != 0).count(), 8);

    // Read it back into a host area with a wider pitch.
    let host = HostBuffer::new(2 * 6);
    let read = RectRegion::new([4, 2, 1])
        .with_origins([3, 1, 0], [1, 0, 0])
        .with_src_pitches(16, 0)
        .with_dst_pitches(6, 0);
    queue.enqueue_read_buffer_rect(&surface, true, &read, &host, &[])?;
    assert_eq!(host.to_vec::<u8>(), vec![0, 1, 2, 3, 4, 0, 0, 5, 6, 7, 8, 0]);
    Ok(())
}

#[test]
fn test_copy_buffer_rect_between_buffers() -> Result<()> {
    let (ctx, queue) = cpu_queue(QueueProperties::empty())?;
    let src = ctx.create_buffer_with_data(MemFlags::READ_WRITE, &(0..32).collect::<Vec<u8>>())?;
    let dst = ctx.create_buffer(MemFlags::READ_WRITE, 32)?;
    // Columns 2..4 of an 8-wide source into columns 0..2 of a 4-wide target.
    let rect = RectRegion::new([2, 4, 1])
        .with_origins([2, 0, 0], [0, 0, 0])
        .with_src_pitches(8, 0)
        .with_dst_pitches(4, 0);
    queue.enqueue_copy_buffer_rect(&src, &dst, &rect, &[])?;

    let out = HostBuffer::new(16);
    queue.enqueue_read_buffer(&dst, true, 0, 16, &out, &[])?;
    assert_eq!(
        out.to_vec::<u8>(),
        vec![2, 3, 0, 0, 10, 11, 0, 0, 18, 19, 0, 0, 26, 27, 0, 0]
    );
    Ok(())
}
