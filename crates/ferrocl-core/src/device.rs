//! Devices: a backend plus the counters the dispatcher keeps for it

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ferrocl_backends::{CpuBackend, CpuBackendConfig, DeviceBackend, DeviceInfo};

use crate::error::Result;

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Job counters for one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Jobs handed to the backend.
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

struct DeviceInner {
    id: u64,
    backend: Arc<dyn DeviceBackend>,
    counters: Counters,
}

/// A compute device. Cloning shares the device.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    pub fn new(backend: Arc<dyn DeviceBackend>) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                id: NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed),
                backend,
                counters: Counters::default(),
            }),
        }
    }

    /// Host CPU device configured from the environment.
    pub fn cpu() -> Result<Self> {
        Ok(Self::new(Arc::new(CpuBackend::new()?)))
    }

    pub fn with_cpu_config(config: CpuBackendConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(CpuBackend::with_config(config)?)))
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn info(&self) -> &DeviceInfo {
        self.inner.backend.info()
    }

    pub fn name(&self) -> &str {
        &self.info().name
    }

    pub fn is_available(&self) -> bool {
        self.inner.backend.is_available()
    }

    /// Stop the backend accepting work. Queues on this device reject new
    /// commands afterwards; work already handed over still completes.
    pub fn shutdown(&self) {
        tracing::debug!(device = self.inner.id, "device_shutdown");
        self.inner.backend.shutdown();
    }

    pub fn stats(&self) -> DeviceStats {
        let counters = &self.inner.counters;
        DeviceStats {
            submitted: counters.submitted.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn backend(&self) -> &dyn DeviceBackend {
        self.inner.backend.as_ref()
    }

    pub(crate) fn record_submitted(&self) {
        self.inner.counters.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_finished(&self, ok: bool) {
        let counter = if ok {
            &self.inner.counters.completed
        } else {
            &self.inner.counters.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Device {}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.inner.id)
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu() -> Device {
        Device::with_cpu_config(CpuBackendConfig::default().with_workers(1)).expect("cpu device")
    }

    #[test]
    fn devices_compare_by_identity() {
        let a = cpu();
        let b = cpu();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn shutdown_makes_device_unavailable() {
        let device = cpu();
        assert!(device.is_available());
        device.shutdown();
        assert!(!device.is_available());
    }

    #[test]
    fn counters_start_at_zero() {
        let device = cpu();
        device.record_submitted();
        device.record_finished(false);
        assert_eq!(
            device.stats(),
            DeviceStats {
                submitted: 1,
                completed: 0,
                failed: 1
            }
        );
    }
}
