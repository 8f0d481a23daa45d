//! Command queues
//!
//! A queue turns its ordering discipline into wait-list edges when an event
//! is queued, after which the event is scheduled purely by its
//! dependencies:
//!
//! - in-order: every event waits for the one queued just before it
//! - marker and barrier: wait for everything pending on the queue
//! - barrier and wait-for-events: everything queued later waits for them
//!
//! The queue keeps each event in its pending set until the event is
//! terminal. Leaving the pending set happens under the queue lock together
//! with the terminal transition, so an event being queued either sees a
//! predecessor as pending (and waits for it) or not at all.
//!
//! Lock order: queue state before any event state.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ferrocl_backends::QueueProperties;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::command::Command;
use crate::context::Context;
use crate::device::Device;
use crate::dispatch;
use crate::error::{Error, Result};
use crate::event::{CommandKind, Event};
use crate::mem::MemObject;

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
pub(crate) struct QueueState {
    /// Queued, not yet terminal, in queue order.
    pending: Vec<Event>,
    /// Most recent event of an in-order queue.
    last: Option<Event>,
    /// Latest barrier or wait-for-events command.
    barrier: Option<Event>,
}

impl QueueState {
    fn implicit_dependencies(&self, kind: CommandKind, in_order: bool) -> Vec<Event> {
        let mut dependencies = Vec::new();
        if matches!(kind, CommandKind::Marker | CommandKind::Barrier) {
            dependencies.extend(self.pending.iter().cloned());
        }
        if in_order {
            dependencies.extend(self.last.iter().cloned());
        }
        dependencies.extend(self.barrier.iter().cloned());
        dependencies
    }
}

struct QueueInner {
    id: u64,
    context: Context,
    device: Device,
    properties: QueueProperties,
    state: Mutex<QueueState>,
    drained: Condvar,
}

/// Shared handle to a command queue on one device.
#[derive(Clone)]
pub struct CommandQueue {
    inner: Arc<QueueInner>,
}

impl CommandQueue {
    #[tracing::instrument(skip_all, fields(context = context.id(), device = device.id(), properties = properties.bits()))]
    pub(crate) fn new(context: &Context, device: &Device, properties: QueueProperties) -> Result<Self> {
        if !context.has_device(device) {
            return Err(Error::InvalidDevice);
        }
        let supported = device.info().queue_properties;
        if !supported.contains(properties) {
            return Err(Error::InvalidQueueProperties(format!(
                "{:?} not supported by {}",
                properties.difference(supported),
                device.name()
            )));
        }
        let id = NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(queue = id, "command_queue_created");
        Ok(Self {
            inner: Arc::new(QueueInner {
                id,
                context: context.clone(),
                device: device.clone(),
                properties,
                state: Mutex::new(QueueState::default()),
                drained: Condvar::new(),
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    pub fn properties(&self) -> QueueProperties {
        self.inner.properties
    }

    pub fn is_out_of_order(&self) -> bool {
        self.inner.properties.contains(QueueProperties::OUT_OF_ORDER_EXEC_MODE)
    }

    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Every queued command is already visible to the dispatcher; this only
    /// exists for symmetry with `finish`.
    pub fn flush(&self) {
        tracing::trace!(queue = self.inner.id, "flush");
    }

    /// Block until every command queued so far is terminal.
    pub fn finish(&self) {
        let mut state = self.inner.state.lock();
        while !state.pending.is_empty() {
            self.inner.drained.wait(&mut state);
        }
    }

    /// Snapshot of the events not yet terminal, in queue order.
    pub fn pending_events(&self) -> Vec<Event> {
        self.inner.state.lock().pending.clone()
    }

    pub(crate) fn check_usable(&self) -> Result<()> {
        if self.inner.device.is_available() {
            Ok(())
        } else {
            Err(Error::InvalidCommandQueue)
        }
    }

    /// Memory objects must come from this queue's context and respect the
    /// device's sub-buffer alignment.
    pub(crate) fn check_mem(&self, mem: &MemObject) -> Result<()> {
        if mem.context() != self.context() {
            return Err(Error::InvalidContext);
        }
        mem.check_alignment(self.inner.device.info())
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.inner.state.lock()
    }

    /// Remove a terminal event from the queue bookkeeping.
    pub(crate) fn retire(&self, state: &mut QueueState, event: &Event) {
        state.pending.retain(|pending| pending != event);
        if state.last.as_ref() == Some(event) {
            state.last = None;
        }
        if state.barrier.as_ref() == Some(event) {
            state.barrier = None;
        }
        if state.pending.is_empty() {
            self.inner.drained.notify_all();
        }
    }

    /// Queue a new event carrying `command`.
    ///
    /// The event's wait list is the caller's list plus the queue's implicit
    /// dependencies, deduplicated. The event is dispatched from here if it
    /// is ready immediately, otherwise by whichever dependency finishes last.
    pub(crate) fn queue_event(&self, kind: CommandKind, command: Command, wait_list: &[Event]) -> Result<Event> {
        self.check_wait_list(wait_list)?;
        Ok(self.push_event(kind, command, wait_list))
    }

    /// The queue must be usable and every wait-list event must share its
    /// context.
    pub(crate) fn check_wait_list(&self, wait_list: &[Event]) -> Result<()> {
        self.check_usable()?;
        if wait_list.iter().any(|event| event.context() != self.context()) {
            return Err(Error::InvalidContext);
        }
        Ok(())
    }

    /// Queue an already validated command. A device lost after validation
    /// is reported on the event at submission.
    pub(crate) fn push_event(&self, kind: CommandKind, command: Command, wait_list: &[Event]) -> Event {
        let event = Event::new(kind, self.inner.context.clone(), Some(self.clone()), Some(command));
        {
            let mut state = self.inner.state.lock();
            let implicit = state.implicit_dependencies(kind, !self.is_out_of_order());
            let mut dependencies: Vec<Event> = Vec::with_capacity(wait_list.len() + implicit.len());
            for dependency in wait_list.iter().chain(&implicit) {
                if !dependencies.contains(dependency) {
                    dependencies.push(dependency.clone());
                }
            }
            for dependency in &dependencies {
                event.depend_on(dependency);
            }
            event.set_wait_list(dependencies);
            event.stamp_queued();
            state.pending.push(event.clone());
            if !self.is_out_of_order() {
                state.last = Some(event.clone());
            }
            if matches!(kind, CommandKind::Barrier | CommandKind::WaitForEvents) {
                state.barrier = Some(event.clone());
            }
        }
        tracing::debug!(queue = self.inner.id, event = event.id(), command = kind.name(), "event_queued");
        if event.release_hold() {
            dispatch::run(vec![event.clone()]);
        }
        event
    }
}

impl PartialEq for CommandQueue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for CommandQueue {}

impl fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandQueue")
            .field("id", &self.inner.id)
            .field("device", &self.inner.device.id())
            .field("properties", &self.inner.properties)
            .finish()
    }
}
