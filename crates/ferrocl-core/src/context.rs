//! Contexts group devices and own everything created in them

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ferrocl_backends::QueueProperties;

use crate::device::Device;
use crate::error::{Error, Result};
use crate::event::UserEvent;
use crate::queue::CommandQueue;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

struct ContextInner {
    id: u64,
    devices: Vec<Device>,
}

/// Reference root for queues, memory objects, kernels and events.
///
/// Every object created in a context holds a handle to it, so the context
/// lives as long as the longest-lived of them.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    #[tracing::instrument(skip_all, fields(devices = devices.len()))]
    pub fn new(devices: Vec<Device>) -> Result<Self> {
        if devices.is_empty() {
            return Err(Error::invalid_value("a context needs at least one device"));
        }
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(context = id, "context_created");
        Ok(Self {
            inner: Arc::new(ContextInner { id, devices }),
        })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn devices(&self) -> &[Device] {
        &self.inner.devices
    }

    pub fn has_device(&self, device: &Device) -> bool {
        self.inner.devices.contains(device)
    }

    /// Handles currently alive, including those held by child objects.
    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn create_command_queue(&self, device: &Device, properties: QueueProperties) -> Result<CommandQueue> {
        CommandQueue::new(self, device, properties)
    }

    pub fn create_user_event(&self) -> UserEvent {
        UserEvent::new(self)
    }

    pub(crate) fn supports_images(&self) -> bool {
        self.inner.devices.iter().any(|device| device.info().image_support)
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Context {}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("devices", &self.inner.devices)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrocl_backends::CpuBackendConfig;

    fn cpu() -> Device {
        Device::with_cpu_config(CpuBackendConfig::default().with_workers(1)).expect("cpu device")
    }

    #[test]
    fn empty_device_list_is_rejected() {
        assert!(matches!(Context::new(Vec::new()), Err(Error::InvalidValue(_))));
    }

    #[test]
    fn queue_device_must_belong_to_context() {
        let context = Context::new(vec![cpu()]).expect("context");
        let stranger = cpu();
        assert!(context.has_device(&context.devices()[0]));
        assert!(!context.has_device(&stranger));
        assert_eq!(
            context
                .create_command_queue(&stranger, QueueProperties::empty())
                .err(),
            Some(Error::InvalidDevice)
        );
    }

    #[test]
    fn children_hold_the_context() {
        let context = Context::new(vec![cpu()]).expect("context");
        let device = context.devices()[0].clone();
        let queue = context
            .create_command_queue(&device, QueueProperties::empty())
            .expect("queue");
        assert_eq!(context.reference_count(), 2);
        drop(queue);
        assert_eq!(context.reference_count(), 1);
    }

    #[test]
    fn image_support_follows_devices() {
        let plain = Device::with_cpu_config(CpuBackendConfig {
            image_support: false,
            ..CpuBackendConfig::default().with_workers(1)
        })
        .expect("cpu device");
        assert!(!Context::new(vec![plain]).expect("context").supports_images());
        assert!(Context::new(vec![cpu()]).expect("context").supports_images());
    }
}
