//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ferrocl_backends::{BackendError, CpuBackendConfig, DeviceBackend, DeviceInfo, Job};
use ferrocl_core::{CommandQueue, Context, Device, QueueProperties, Result};
use parking_lot::{Condvar, Mutex};

/// How long a test waits before deciding something is stuck.
pub const TIMEOUT: Duration = Duration::from_secs(10);

/// CPU device, context and queue with `properties`.
pub fn cpu_queue(properties: QueueProperties) -> Result<(Context, CommandQueue)> {
    cpu_queue_with(CpuBackendConfig::default().with_workers(4), properties)
}

pub fn cpu_queue_with(config: CpuBackendConfig, properties: QueueProperties) -> Result<(Context, CommandQueue)> {
    ferrocl_tracing::init_test_tracing();
    let device = Device::with_cpu_config(config)?;
    let context = Context::new(vec![device.clone()])?;
    let queue = context.create_command_queue(&device, properties)?;
    Ok((context, queue))
}

/// Counting semaphore jobs wait on while a backend is gated.
#[derive(Default)]
struct Permits {
    available: Mutex<usize>,
    changed: Condvar,
}

impl Permits {
    fn acquire(&self) {
        let deadline = Instant::now() + TIMEOUT;
        let mut available = self.available.lock();
        while *available == 0 {
            if self.changed.wait_until(&mut available, deadline).timed_out() {
                return;
            }
        }
        *available -= 1;
    }

    fn release(&self, count: usize) {
        *self.available.lock() += count;
        self.changed.notify_all();
    }
}

/// Backend that never touches memory. Every job runs on a fresh thread,
/// records its operation name and finishes with the configured result.
pub struct RecordingBackend {
    info: DeviceInfo,
    invoked: AtomicUsize,
    operations: Mutex<Vec<&'static str>>,
    failure: Mutex<Option<BackendError>>,
    gated: AtomicBool,
    permits: Arc<Permits>,
}

impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        let mut info = CpuBackendConfig::default().with_workers(1).device_info();
        info.name = "recording".to_string();
        Arc::new(Self {
            info,
            invoked: AtomicUsize::new(0),
            operations: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            gated: AtomicBool::new(false),
            permits: Arc::default(),
        })
    }

    /// Backend whose jobs all fail with `error`.
    pub fn failing(error: BackendError) -> Arc<Self> {
        let backend = Self::new();
        *backend.failure.lock() = Some(error);
        backend
    }

    /// Jobs submitted from now on block in `Running` until released.
    pub fn gate(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    /// Let `count` gated jobs finish.
    pub fn release(&self, count: usize) {
        self.permits.release(count);
    }

    pub fn invocations(&self) -> usize {
        self.invoked.load(Ordering::SeqCst)
    }

    pub fn operations(&self) -> Vec<&'static str> {
        self.operations.lock().clone()
    }

    /// Device, context and queue on this backend.
    pub fn queue(self: &Arc<Self>, properties: QueueProperties) -> Result<(Context, CommandQueue)> {
        ferrocl_tracing::init_test_tracing();
        let device = Device::new(self.clone());
        let context = Context::new(vec![device.clone()])?;
        let queue = context.create_command_queue(&device, properties)?;
        Ok((context, queue))
    }
}

impl DeviceBackend for RecordingBackend {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn submit(&self, job: Job) -> ferrocl_backends::Result<()> {
        self.invoked.fetch_add(1, Ordering::SeqCst);
        self.operations.lock().push(job.operation.name());
        let result = match self.failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        };
        let permits = self.gated.load(Ordering::SeqCst).then(|| Arc::clone(&self.permits));
        std::thread::spawn(move || {
            job.observer.started();
            if let Some(permits) = permits {
                permits.acquire();
            }
            job.observer.finished(result);
        });
        Ok(())
    }
}

/// Poll `condition` until it holds or [`TIMEOUT`] passes.
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}
