//! Kernel entry points as seen by a backend.
//!
//! The engine never generates code. A kernel compiler (external) hands it an
//! [`KernelEntry`] that runs one work-group at a time; backends decide how the
//! groups of an [`NdRange`] are scheduled.

use std::fmt;
use std::sync::Arc;

use bytemuck::Pod;

use crate::error::{BackendError, Result};
use crate::memory::MemRegion;

/// Iteration space of a kernel launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NdRange {
    /// Number of meaningful dimensions, 1 to 3.
    pub work_dim: u32,
    pub global_offset: [usize; 3],
    pub global_size: [usize; 3],
    pub local_size: [usize; 3],
}

impl NdRange {
    /// Build a range; unused dimensions are padded with offset 0 and size 1.
    pub fn new(global_offset: &[usize], global_size: &[usize], local_size: &[usize]) -> Self {
        let pad = |values: &[usize], fill: usize| {
            let mut out = [fill; 3];
            for (slot, value) in out.iter_mut().zip(values) {
                *slot = *value;
            }
            out
        };
        Self {
            work_dim: global_size.len() as u32,
            global_offset: pad(global_offset, 0),
            global_size: pad(global_size, 1),
            local_size: pad(local_size, 1),
        }
    }

    /// A single work-item in a single group.
    pub const fn single() -> Self {
        Self {
            work_dim: 1,
            global_offset: [0; 3],
            global_size: [1; 3],
            local_size: [1; 3],
        }
    }

    pub fn num_groups(&self) -> [usize; 3] {
        [0usize, 1, 2].map(|d| self.global_size[d] / self.local_size[d].max(1))
    }

    pub fn total_groups(&self) -> usize {
        self.num_groups().iter().product()
    }

    pub fn work_group_size(&self) -> usize {
        self.local_size.iter().product()
    }

    pub fn total_work_items(&self) -> usize {
        self.global_size.iter().product()
    }

    /// Group coordinates for a linear group index (x fastest).
    pub fn group_id(&self, linear: usize) -> [usize; 3] {
        let [gx, gy, _] = self.num_groups();
        let per_slice = gx * gy;
        [linear % gx, (linear % per_slice) / gx, linear / per_slice]
    }
}

impl fmt::Display for NdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims = self.work_dim as usize;
        write!(
            f,
            "global={:?} local={:?}",
            &self.global_size[..dims],
            &self.local_size[..dims]
        )
    }
}

/// One work-group's position in the launch.
#[derive(Debug, Clone, Copy)]
pub struct WorkGroup {
    pub group_id: [usize; 3],
    pub range: NdRange,
}

impl WorkGroup {
    pub fn new(range: NdRange, linear: usize) -> Self {
        Self {
            group_id: range.group_id(linear),
            range,
        }
    }

    /// Global id of the work-item at `local_id` in this group.
    pub fn global_id(&self, local_id: [usize; 3]) -> [usize; 3] {
        [0usize, 1, 2].map(|d| self.range.global_offset[d] + self.group_id[d] * self.range.local_size[d] + local_id[d])
    }

    /// Every local id of the group, x fastest.
    pub fn local_ids(&self) -> impl Iterator<Item = [usize; 3]> {
        let [lx, ly, lz] = self.range.local_size;
        (0..lz).flat_map(move |z| (0..ly).flat_map(move |y| (0..lx).map(move |x| [x, y, z])))
    }
}

/// A bound kernel argument.
#[derive(Debug, Clone)]
pub enum ArgValue {
    Memory(MemRegion),
    Scalar(Vec<u8>),
    /// Per-group scratch of the given size, zeroed for every group.
    Local(usize),
}

/// Argument snapshot taken at enqueue time.
#[derive(Debug, Clone, Default)]
pub struct KernelArgs(Vec<ArgValue>);

impl KernelArgs {
    pub fn new(values: Vec<ArgValue>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&ArgValue> {
        self.0
            .get(index)
            .ok_or_else(|| BackendError::invalid_arg(index, "index out of range"))
    }

    pub fn memory(&self, index: usize) -> Result<&MemRegion> {
        match self.get(index)? {
            ArgValue::Memory(region) => Ok(region),
            _ => Err(BackendError::invalid_arg(index, "expected a memory object")),
        }
    }

    pub fn scalar<T: Pod>(&self, index: usize) -> Result<T> {
        match self.get(index)? {
            ArgValue::Scalar(bytes) if bytes.len() == std::mem::size_of::<T>() => {
                Ok(bytemuck::pod_read_unaligned(bytes))
            }
            ArgValue::Scalar(bytes) => Err(BackendError::invalid_arg(
                index,
                format!("scalar is {} bytes, expected {}", bytes.len(), std::mem::size_of::<T>()),
            )),
            _ => Err(BackendError::invalid_arg(index, "expected a scalar")),
        }
    }

    fn local_sizes(&self) -> Vec<Option<usize>> {
        self.0
            .iter()
            .map(|arg| match arg {
                ArgValue::Local(size) => Some(*size),
                _ => None,
            })
            .collect()
    }
}

/// Everything a work-group body can touch.
pub struct GroupContext<'a> {
    pub group: WorkGroup,
    pub args: &'a KernelArgs,
    locals: Vec<Option<Vec<u8>>>,
}

impl<'a> GroupContext<'a> {
    pub fn new(group: WorkGroup, args: &'a KernelArgs) -> Self {
        let locals = args
            .local_sizes()
            .into_iter()
            .map(|size| size.map(|len| vec![0; len]))
            .collect();
        Self { group, args, locals }
    }

    /// Scratch memory bound to argument `index`.
    pub fn local_mut(&mut self, index: usize) -> Result<&mut [u8]> {
        self.locals
            .get_mut(index)
            .and_then(Option::as_mut)
            .map(Vec::as_mut_slice)
            .ok_or_else(|| BackendError::invalid_arg(index, "expected local memory"))
    }
}

/// Compiled kernel: runs all work-items of one group.
pub trait KernelEntry: Send + Sync {
    fn name(&self) -> &str;

    fn run_group(&self, ctx: &mut GroupContext<'_>) -> Result<()>;
}

type GroupFn = dyn Fn(&mut GroupContext<'_>) -> Result<()> + Send + Sync;

/// [`KernelEntry`] backed by a closure.
pub struct FnKernel {
    name: String,
    body: Box<GroupFn>,
}

impl FnKernel {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut GroupContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: Box::new(body),
        }
    }

    /// Entry that calls `item` once per work-item with its global id.
    pub fn per_item<F>(name: impl Into<String>, item: F) -> Self
    where
        F: Fn([usize; 3], &KernelArgs) -> Result<()> + Send + Sync + 'static,
    {
        Self::new(name, move |ctx| {
            for local in ctx.group.local_ids() {
                item(ctx.group.global_id(local), ctx.args)?;
            }
            Ok(())
        })
    }
}

impl KernelEntry for FnKernel {
    fn name(&self) -> &str {
        &self.name
    }

    fn run_group(&self, ctx: &mut GroupContext<'_>) -> Result<()> {
        (self.body)(ctx)
    }
}

impl fmt::Debug for FnKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnKernel").field("name", &self.name).finish_non_exhaustive()
    }
}

/// A launch ready for a backend.
#[derive(Clone)]
pub struct KernelLaunch {
    pub entry: Arc<dyn KernelEntry>,
    pub range: NdRange,
    pub args: KernelArgs,
}

impl fmt::Debug for KernelLaunch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelLaunch")
            .field("entry", &self.entry.name())
            .field("range", &self.range)
            .finish()
    }
}
