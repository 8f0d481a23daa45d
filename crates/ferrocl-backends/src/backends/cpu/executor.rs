//! Execution of individual operations on a CPU worker thread.

use std::panic::{self, AssertUnwindSafe};

use ferrocl_tracing::perf_span;
use rayon::prelude::*;

use crate::backend::{NativeCall, Operation};
use crate::error::{BackendError, Result};
use crate::kernel::{GroupContext, KernelLaunch, WorkGroup};
use crate::rect::{copy_rect, copy_rect_within};

/// Run `operation` to completion. Panics inside kernels or native functions
/// are reported as kernel failures instead of tearing down the worker.
pub(crate) fn execute(operation: Operation) -> Result<()> {
    let _span = perf_span!("cpu_execute", op = operation.name(), bytes = operation.byte_len());
    panic::catch_unwind(AssertUnwindSafe(move || execute_inner(operation)))
        .unwrap_or_else(|_| Err(BackendError::kernel_failed("worker panicked while executing operation")))
}

fn execute_inner(operation: Operation) -> Result<()> {
    match operation {
        Operation::Read { src, dst, rect } => {
            let src = src.read();
            let mut dst = dst.write();
            copy_rect(&src, &mut dst, &rect)
        }
        Operation::Write { src, dst, rect } => {
            let mut dst = dst.write();
            let src = src.read();
            copy_rect(&src, &mut dst, &rect)
        }
        Operation::Copy { src, dst, rect } => {
            if src.same_storage(&dst) {
                copy_rect_within(&mut dst.write(), &rect)
            } else if src.id() < dst.id() {
                let src = src.read();
                let mut dst = dst.write();
                copy_rect(&src, &mut dst, &rect)
            } else {
                let mut dst = dst.write();
                let src = src.read();
                copy_rect(&src, &mut dst, &rect)
            }
        }
        Operation::Fill {
            dst,
            offset,
            len,
            pattern,
        } => {
            if pattern.is_empty() {
                return Err(BackendError::unsupported("empty fill pattern"));
            }
            dst.region(offset, len)?.with_bytes_mut(|bytes| {
                for chunk in bytes.chunks_mut(pattern.len()) {
                    chunk.copy_from_slice(&pattern[..chunk.len()]);
                }
            });
            Ok(())
        }
        Operation::Kernel(launch) => run_kernel(&launch),
        Operation::Native(call) => run_native(call),
        Operation::Nop => Ok(()),
    }
}

fn run_kernel(launch: &KernelLaunch) -> Result<()> {
    let _span = perf_span!(
        "cpu_run_kernel",
        groups = launch.range.total_groups(),
        group_size = launch.range.work_group_size()
    );
    (0..launch.range.total_groups()).into_par_iter().try_for_each(|linear| {
        let mut ctx = GroupContext::new(WorkGroup::new(launch.range, linear), &launch.args);
        launch.entry.run_group(&mut ctx)
    })
}

fn run_native(call: NativeCall) -> Result<()> {
    let NativeCall { func, mut args } = call;
    func(&mut args).map_err(BackendError::NativeKernelFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{ArgValue, FnKernel, KernelArgs, NdRange};
    use crate::memory::{DeviceMemory, HostBuffer};
    use crate::rect::RectCopy;
    use std::sync::Arc;

    #[test]
    fn read_and_write_linear() -> Result<()> {
        let device = DeviceMemory::from_bytes(&[1, 2, 3, 4]);
        let host = HostBuffer::new(2);
        execute(Operation::Read {
            src: device.clone(),
            dst: host.clone(),
            rect: RectCopy::linear(1, 0, 2),
        })?;
        assert_eq!(&*host.read(), &[2, 3]);

        execute(Operation::Write {
            src: host,
            dst: device.clone(),
            rect: RectCopy::linear(0, 2, 2),
        })?;
        assert_eq!(&*device.read(), &[1, 2, 2, 3]);
        Ok(())
    }

    #[test]
    fn copy_handles_both_lock_orders() -> Result<()> {
        let a = DeviceMemory::from_bytes(&[7; 4]);
        let b = DeviceMemory::zeroed(4);
        execute(Operation::Copy {
            src: b.clone(),
            dst: a.clone(),
            rect: RectCopy::linear(0, 0, 2),
        })?;
        execute(Operation::Copy {
            src: a.clone(),
            dst: b.clone(),
            rect: RectCopy::linear(0, 0, 4),
        })?;
        assert_eq!(&*b.read(), &[0, 0, 7, 7]);
        Ok(())
    }

    #[test]
    fn copy_within_one_storage() -> Result<()> {
        let memory = DeviceMemory::from_bytes(&[1, 2, 3, 4, 0, 0, 0, 0]);
        execute(Operation::Copy {
            src: memory.clone(),
            dst: memory.clone(),
            rect: RectCopy::linear(0, 4, 4),
        })?;
        assert_eq!(&*memory.read(), &[1, 2, 3, 4, 1, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn fill_repeats_pattern() -> Result<()> {
        let memory = DeviceMemory::zeroed(8);
        execute(Operation::Fill {
            dst: memory.clone(),
            offset: 2,
            len: 4,
            pattern: vec![0xab, 0xcd],
        })?;
        assert_eq!(&*memory.read(), &[0, 0, 0xab, 0xcd, 0xab, 0xcd, 0, 0]);
        Ok(())
    }

    #[test]
    fn fill_outside_memory_fails() {
        let memory = DeviceMemory::zeroed(8);
        let result = execute(Operation::Fill {
            dst: memory.clone(),
            offset: 6,
            len: 4,
            pattern: vec![0xff],
        });
        assert!(matches!(result, Err(BackendError::OutOfBounds { .. })));
        assert_eq!(&*memory.read(), &[0; 8]);
    }

    #[test]
    fn out_of_bounds_transfer_fails() {
        let result = execute(Operation::Read {
            src: DeviceMemory::zeroed(4),
            dst: HostBuffer::new(8),
            rect: RectCopy::linear(0, 0, 8),
        });
        assert!(matches!(result, Err(BackendError::OutOfBounds { .. })));
    }

    #[test]
    fn kernel_runs_every_group() -> Result<()> {
        let memory = DeviceMemory::zeroed(64);
        let args = KernelArgs::new(vec![ArgValue::Memory(memory.region(0, 64)?), ArgValue::Scalar(3u32.to_ne_bytes().to_vec())]);
        let entry = FnKernel::per_item("scale", |gid, args| {
            let factor: u32 = args.scalar(1)?;
            args.memory(0)?.store::<u32>(gid[0], gid[0] as u32 * factor)
        });
        execute(Operation::Kernel(KernelLaunch {
            entry: Arc::new(entry),
            range: NdRange::new(&[], &[16], &[4]),
            args,
        }))?;
        let values: Vec<u32> = bytemuck::pod_collect_to_vec(&memory.read()[..]);
        assert_eq!(values, (0..16u32).map(|i| i * 3).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn kernel_panic_becomes_error() {
        let entry = FnKernel::new("boom", |_| panic!("kernel trap"));
        let result = execute(Operation::Kernel(KernelLaunch {
            entry: Arc::new(entry),
            range: NdRange::single(),
            args: KernelArgs::default(),
        }));
        assert!(matches!(result, Err(BackendError::KernelFailed(_))));
    }

    #[test]
    fn native_error_code_is_preserved() {
        let call = NativeCall {
            func: Box::new(|_| Err(-77)),
            args: Default::default(),
        };
        let result = execute(Operation::Native(call));
        assert_eq!(result.map_err(|e| e.code()), Err(-77));
    }
}
