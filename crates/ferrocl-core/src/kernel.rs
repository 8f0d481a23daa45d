//! Kernels: argument binding and launch geometry
//!
//! The engine does not compile kernels. A [`KernelCompiler`] turns a kernel
//! name plus the launch geometry into a [`KernelEntry`] the backend can run;
//! [`Prebuilt`] covers entries that exist ahead of time.

use std::fmt;
use std::sync::Arc;

use bytemuck::Pod;
use ferrocl_backends::{ArgValue, DeviceInfo, KernelArgs, KernelEntry, KernelLaunch, NdRange};
use parking_lot::Mutex;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::mem::MemObject;

/// Produces an executable entry for a kernel launched over a given range.
pub trait KernelCompiler: Send + Sync {
    fn compile(
        &self,
        name: &str,
        range: &NdRange,
        device: &DeviceInfo,
    ) -> ferrocl_backends::Result<Arc<dyn KernelEntry>>;
}

/// Compiler that always returns the same entry.
pub struct Prebuilt(pub Arc<dyn KernelEntry>);

impl KernelCompiler for Prebuilt {
    fn compile(&self, _: &str, _: &NdRange, _: &DeviceInfo) -> ferrocl_backends::Result<Arc<dyn KernelEntry>> {
        Ok(Arc::clone(&self.0))
    }
}

/// A value bound to one kernel argument.
#[derive(Debug, Clone)]
pub enum KernelArg {
    Buffer(MemObject),
    Scalar(Vec<u8>),
    /// Per-work-group scratch of this many bytes.
    Local(usize),
}

struct KernelInner {
    name: String,
    context: Context,
    compiler: Box<dyn KernelCompiler>,
    args: Mutex<Vec<Option<KernelArg>>>,
}

/// A kernel and its current argument bindings. Cloning shares both.
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

impl Kernel {
    pub fn new(context: &Context, name: impl Into<String>, num_args: usize, compiler: impl KernelCompiler + 'static) -> Self {
        Self {
            inner: Arc::new(KernelInner {
                name: name.into(),
                context: context.clone(),
                compiler: Box::new(compiler),
                args: Mutex::new(vec![None; num_args]),
            }),
        }
    }

    /// Kernel backed by a ready-made entry point.
    pub fn from_entry(context: &Context, entry: Arc<dyn KernelEntry>, num_args: usize) -> Self {
        let name = entry.name().to_owned();
        Self::new(context, name, num_args, Prebuilt(entry))
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    pub fn num_args(&self) -> usize {
        self.inner.args.lock().len()
    }

    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn set_arg(&self, index: usize, arg: KernelArg) -> Result<()> {
        match &arg {
            KernelArg::Buffer(mem) if mem.context() != self.context() => return Err(Error::InvalidContext),
            KernelArg::Local(0) => return Err(Error::invalid_value("local argument size must be non-zero")),
            _ => {}
        }
        let mut args = self.inner.args.lock();
        let slot = args.get_mut(index).ok_or(Error::InvalidArgIndex(index))?;
        *slot = Some(arg);
        Ok(())
    }

    pub fn set_arg_buffer(&self, index: usize, mem: &MemObject) -> Result<()> {
        self.set_arg(index, KernelArg::Buffer(mem.clone()))
    }

    pub fn set_arg_scalar<T: Pod>(&self, index: usize, value: T) -> Result<()> {
        self.set_arg(index, KernelArg::Scalar(bytemuck::bytes_of(&value).to_vec()))
    }

    pub fn set_arg_local(&self, index: usize, size: usize) -> Result<()> {
        self.set_arg(index, KernelArg::Local(size))
    }

    /// Compile for `range` and snapshot the current arguments. Later
    /// `set_arg` calls do not affect the returned launch. The memory objects
    /// bound as arguments are returned so the command can keep them alive.
    pub(crate) fn prepare(&self, range: NdRange, device: &DeviceInfo) -> Result<(KernelLaunch, Vec<MemObject>)> {
        let (args, retained) = self.snapshot()?;
        let entry = self
            .inner
            .compiler
            .compile(&self.inner.name, &range, device)
            .map_err(|err| Error::InvalidProgramExecutable(format!("{}: {err}", self.inner.name)))?;
        Ok((KernelLaunch { entry, range, args }, retained))
    }

    fn snapshot(&self) -> Result<(KernelArgs, Vec<MemObject>)> {
        let args = self.inner.args.lock();
        let missing: Vec<usize> = args
            .iter()
            .enumerate()
            .filter_map(|(index, arg)| arg.is_none().then_some(index))
            .collect();
        if !missing.is_empty() {
            return Err(Error::InvalidKernelArgs(missing));
        }
        let mut values = Vec::with_capacity(args.len());
        let mut retained = Vec::new();
        for arg in args.iter().flatten() {
            values.push(match arg {
                KernelArg::Buffer(mem) => {
                    retained.push(mem.clone());
                    ArgValue::Memory(mem.region()?)
                }
                KernelArg::Scalar(bytes) => ArgValue::Scalar(bytes.clone()),
                KernelArg::Local(size) => ArgValue::Local(*size),
            });
        }
        Ok((KernelArgs::new(values), retained))
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("name", &self.inner.name)
            .field("num_args", &self.num_args())
            .finish()
    }
}

/// Validate a launch geometry against `device` and fill in the work-group
/// size when the caller left it to the runtime.
pub(crate) fn resolve_range(
    global_offset: Option<&[usize]>,
    global_size: &[usize],
    local_size: Option<&[usize]>,
    device: &DeviceInfo,
) -> Result<NdRange> {
    let work_dim = global_size.len();
    if !(1..=3).contains(&work_dim) {
        return Err(Error::InvalidWorkDimension(u32::try_from(work_dim).unwrap_or(u32::MAX)));
    }
    if global_offset.is_some_and(|offset| offset.len() != work_dim) {
        return Err(Error::invalid_value("global offset must have one entry per dimension"));
    }
    if global_size.contains(&0) {
        return Err(Error::InvalidGlobalWorkSize(format!("{global_size:?} has a zero dimension")));
    }
    if global_size.iter().try_fold(1usize, |total, &g| total.checked_mul(g)).is_none() {
        return Err(Error::InvalidGlobalWorkSize(format!("{global_size:?} overflows the work-item count")));
    }
    for (dim, &g) in global_size.iter().enumerate() {
        let offset = global_offset.and_then(|offset| offset.get(dim)).copied().unwrap_or(0);
        if offset.checked_add(g).is_none() {
            return Err(Error::invalid_value(format!(
                "global offset {offset} plus size {g} overflows in dimension {dim}"
            )));
        }
    }
    let local = match local_size {
        Some(local) => {
            check_local(global_size, local, device)?;
            local.to_vec()
        }
        None => derive_local(global_size, device),
    };
    Ok(NdRange::new(global_offset.unwrap_or(&[]), global_size, &local))
}

fn check_local(global: &[usize], local: &[usize], device: &DeviceInfo) -> Result<()> {
    if local.len() != global.len() {
        return Err(Error::InvalidWorkGroupSize(format!(
            "local size has {} dimensions, global size {}",
            local.len(),
            global.len()
        )));
    }
    for (dim, (&g, &l)) in global.iter().zip(local).enumerate() {
        if l == 0 || g % l != 0 {
            return Err(Error::InvalidWorkGroupSize(format!(
                "local size {l} does not divide global size {g} in dimension {dim}"
            )));
        }
        if l > device.max_work_item_sizes[dim] {
            return Err(Error::InvalidWorkItemSize(format!(
                "local size {l} exceeds {} in dimension {dim}",
                device.max_work_item_sizes[dim]
            )));
        }
    }
    let total: usize = local.iter().product();
    if total > device.max_work_group_size {
        return Err(Error::InvalidWorkGroupSize(format!(
            "{total} work-items per group exceeds {}",
            device.max_work_group_size
        )));
    }
    Ok(())
}

/// Largest divisor of each global size that fits the remaining group budget,
/// filled from the first dimension.
fn derive_local(global: &[usize], device: &DeviceInfo) -> Vec<usize> {
    let mut budget = device.max_work_group_size.max(1);
    global
        .iter()
        .enumerate()
        .map(|(dim, &g)| {
            let limit = g.min(budget).min(device.max_work_item_sizes[dim].max(1));
            let local = (1..=limit).rev().find(|l| g % l == 0).unwrap_or(1);
            budget /= local;
            local
        })
        .collect()
}
