//! Events: the state machine every command moves through
//!
//! ```text
//! Queued ──▶ Submitted ──▶ Running ──▶ Complete
//!    │           │            │
//!    └───────────┴────────────┴──────▶ Error(code)
//! ```
//!
//! Status only moves forward. Once terminal, an event drops its command
//! payload (and with it the memory objects the command used) and its
//! wait list, fires its callbacks and releases its dependents.
//!
//! # Readiness
//!
//! Every event counts the dependencies it still waits for. The count starts
//! at one, a hold owned by whoever is building the event; each dependency
//! that is not yet terminal adds one and subtracts it again when it
//! finishes. The event is ready exactly once, when the count reaches zero,
//! whichever thread gets it there.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

use ferrocl_backends::{Operation, QueueProperties};
use parking_lot::{Condvar, Mutex};

use crate::command::Command;
use crate::context::Context;
use crate::dispatch;
use crate::error::{Error, Result};
use crate::queue::CommandQueue;

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);
static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Nanoseconds since the first timestamp taken in this process.
fn now_ns() -> u64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    u64::try_from(epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

/// What an event stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    ReadBuffer,
    WriteBuffer,
    CopyBuffer,
    ReadBufferRect,
    WriteBufferRect,
    CopyBufferRect,
    FillBuffer,
    ReadImage,
    WriteImage,
    CopyImage,
    CopyImageToBuffer,
    CopyBufferToImage,
    MapBuffer,
    MapImage,
    UnmapMemObject,
    NdRangeKernel,
    Task,
    NativeKernel,
    Marker,
    Barrier,
    WaitForEvents,
    User,
}

impl CommandKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::ReadBuffer => "ReadBuffer",
            Self::WriteBuffer => "WriteBuffer",
            Self::CopyBuffer => "CopyBuffer",
            Self::ReadBufferRect => "ReadBufferRect",
            Self::WriteBufferRect => "WriteBufferRect",
            Self::CopyBufferRect => "CopyBufferRect",
            Self::FillBuffer => "FillBuffer",
            Self::ReadImage => "ReadImage",
            Self::WriteImage => "WriteImage",
            Self::CopyImage => "CopyImage",
            Self::CopyImageToBuffer => "CopyImageToBuffer",
            Self::CopyBufferToImage => "CopyBufferToImage",
            Self::MapBuffer => "MapBuffer",
            Self::MapImage => "MapImage",
            Self::UnmapMemObject => "UnmapMemObject",
            Self::NdRangeKernel => "NDRangeKernel",
            Self::Task => "Task",
            Self::NativeKernel => "NativeKernel",
            Self::Marker => "Marker",
            Self::Barrier => "Barrier",
            Self::WaitForEvents => "WaitForEvents",
            Self::User => "UserEvent",
        }
    }

    /// Commands with no device work; they complete as soon as they are ready.
    pub fn is_instantaneous(self) -> bool {
        matches!(self, Self::Marker | Self::Barrier | Self::WaitForEvents | Self::User)
    }
}

/// Why an event ended in error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventError {
    /// A wait-list member failed; the command never ran.
    UpstreamDependencyFailed,
    /// The backend reported this code.
    Backend(i32),
    /// Set by the application on a user event.
    Application(i32),
}

impl EventError {
    pub fn code(self) -> i32 {
        match self {
            Self::UpstreamDependencyFailed => -14,
            Self::Backend(code) | Self::Application(code) => code,
        }
    }
}

impl From<EventError> for Error {
    fn from(err: EventError) -> Self {
        match err {
            EventError::UpstreamDependencyFailed => Error::UpstreamDependencyFailed,
            EventError::Backend(code) => Error::BackendExecutionFailed(code),
            EventError::Application(code) => Error::EventFailed(code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventStatus {
    Queued,
    Submitted,
    Running,
    Complete,
    Error(EventError),
}

impl EventStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Submitted => 1,
            Self::Running => 2,
            Self::Complete | Self::Error(_) => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 3
    }

    /// Execution status code: 3 queued down to 0 complete, negative on error.
    pub fn code(self) -> i32 {
        match self {
            Self::Queued => 3,
            Self::Submitted => 2,
            Self::Running => 1,
            Self::Complete => 0,
            Self::Error(err) => err.code(),
        }
    }

    fn into_result(self) -> Result<()> {
        match self {
            Self::Error(err) => Err(err.into()),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfilingInfo {
    Queued,
    Submit,
    Start,
    End,
}

#[derive(Debug, Default, Clone, Copy)]
struct Timing {
    queued: Option<u64>,
    submit: Option<u64>,
    start: Option<u64>,
    end: Option<u64>,
}

pub type EventCallback = Box<dyn FnOnce(&Event, EventStatus) + Send>;

/// Result of registering a dependent on an event.
pub(crate) enum Dependency {
    Added,
    Complete,
    Failed,
}

struct EventState {
    status: EventStatus,
    command: Option<Command>,
    wait_list: Vec<Event>,
    /// Events waiting on this one; strong so they stay alive until notified.
    dependents: Vec<Event>,
    callbacks: Vec<EventCallback>,
    timing: Timing,
}

/// What a terminal transition hands back to be dropped or run outside the
/// lock.
struct Released {
    command: Option<Command>,
    wait_list: Vec<Event>,
    dependents: Vec<Event>,
    callbacks: Vec<EventCallback>,
}

struct EventInner {
    id: u64,
    kind: CommandKind,
    context: Context,
    queue: Option<CommandQueue>,
    profiling: bool,
    pending: AtomicUsize,
    dependency_failed: AtomicBool,
    state: Mutex<EventState>,
    changed: Condvar,
}

/// Shared handle to one asynchronous operation.
///
/// Cloning is retaining, dropping is releasing: the event, its command
/// payload and everything that payload references live until the last
/// handle goes and, independently, until the event is terminal.
#[derive(Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

impl Event {
    pub(crate) fn new(kind: CommandKind, context: Context, queue: Option<CommandQueue>, command: Option<Command>) -> Self {
        let profiling = queue
            .as_ref()
            .is_some_and(|queue| queue.properties().contains(QueueProperties::PROFILING));
        Self {
            inner: Arc::new(EventInner {
                id: NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed),
                kind,
                context,
                queue,
                profiling,
                pending: AtomicUsize::new(1),
                dependency_failed: AtomicBool::new(false),
                state: Mutex::new(EventState {
                    status: EventStatus::Queued,
                    command,
                    wait_list: Vec::new(),
                    dependents: Vec::new(),
                    callbacks: Vec::new(),
                    timing: Timing::default(),
                }),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn command_kind(&self) -> CommandKind {
        self.inner.kind
    }

    pub fn name(&self) -> &'static str {
        self.inner.kind.name()
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    /// Owning queue; `None` for user events.
    pub fn queue(&self) -> Option<&CommandQueue> {
        self.inner.queue.as_ref()
    }

    pub fn status(&self) -> EventStatus {
        self.inner.state.lock().status
    }

    /// Events this one still references as prerequisites. Empty once terminal.
    pub fn wait_list(&self) -> Vec<Event> {
        self.inner.state.lock().wait_list.clone()
    }

    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn downgrade(&self) -> WeakEvent {
        WeakEvent(Arc::downgrade(&self.inner))
    }

    /// Block until terminal; errors carry the terminal error.
    pub fn wait(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        while !state.status.is_terminal() {
            self.inner.changed.wait(&mut state);
        }
        state.status.into_result()
    }

    /// Like [`Event::wait`], giving up after `timeout` with `None`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<()>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while !state.status.is_terminal() {
            if self.inner.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.status.is_terminal().then(|| state.status.into_result())
    }

    /// Run `callback` once the event is terminal.
    ///
    /// Only [`EventStatus::Complete`] is accepted as a trigger; the callback
    /// also fires on error and receives the actual status. If the event is
    /// already terminal the callback runs immediately on this thread.
    pub fn set_callback<F>(&self, trigger: EventStatus, callback: F) -> Result<()>
    where
        F: FnOnce(&Event, EventStatus) + Send + 'static,
    {
        if trigger != EventStatus::Complete {
            return Err(Error::invalid_value(format!("callbacks cannot trigger on {trigger:?}")));
        }
        let status = {
            let mut state = self.inner.state.lock();
            if !state.status.is_terminal() {
                state.callbacks.push(Box::new(callback));
                return Ok(());
            }
            state.status
        };
        self.run_callback(Box::new(callback), status);
        Ok(())
    }

    /// A panicking callback is logged and swallowed so the rest of the
    /// completion path still runs.
    fn run_callback(&self, callback: EventCallback, status: EventStatus) {
        if panic::catch_unwind(AssertUnwindSafe(|| callback(self, status))).is_err() {
            tracing::error!(event = self.id(), ?status, "callback_panicked");
        }
    }

    /// Timestamp in nanoseconds. Only available on complete events of
    /// profiling queues.
    pub fn profiling_info(&self, info: ProfilingInfo) -> Result<u64> {
        if !self.inner.profiling {
            return Err(Error::ProfilingInfoNotAvailable);
        }
        let state = self.inner.state.lock();
        if state.status != EventStatus::Complete {
            return Err(Error::ProfilingInfoNotAvailable);
        }
        let timing = state.timing;
        match info {
            ProfilingInfo::Queued => timing.queued,
            ProfilingInfo::Submit => timing.submit,
            ProfilingInfo::Start => timing.start,
            ProfilingInfo::End => timing.end,
        }
        .ok_or(Error::ProfilingInfoNotAvailable)
    }

    pub(crate) fn set_wait_list(&self, wait_list: Vec<Event>) {
        self.inner.state.lock().wait_list = wait_list;
    }

    pub(crate) fn stamp_queued(&self) {
        if self.inner.profiling {
            self.inner.state.lock().timing.queued = Some(now_ns());
        }
    }

    /// Register `dependent` to be notified when this event finishes.
    pub(crate) fn add_dependent(&self, dependent: &Event) -> Dependency {
        let mut state = self.inner.state.lock();
        match state.status {
            EventStatus::Complete => Dependency::Complete,
            EventStatus::Error(_) => Dependency::Failed,
            _ => {
                state.dependents.push(dependent.clone());
                Dependency::Added
            }
        }
    }

    /// Make this event wait for `dependency`. Must be called while the
    /// construction hold is still in place.
    pub(crate) fn depend_on(&self, dependency: &Event) {
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        let ready = match dependency.add_dependent(self) {
            Dependency::Added => false,
            Dependency::Complete => self.resolve_dependency(false),
            Dependency::Failed => self.resolve_dependency(true),
        };
        debug_assert!(!ready, "construction hold released early");
    }

    /// Drop the construction hold; true when the event is now ready.
    pub(crate) fn release_hold(&self) -> bool {
        self.resolve_dependency(false)
    }

    fn resolve_dependency(&self, failed: bool) -> bool {
        if failed {
            self.inner.dependency_failed.store(true, Ordering::Release);
        }
        self.inner.pending.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub(crate) fn dependency_failed(&self) -> bool {
        self.inner.dependency_failed.load(Ordering::Acquire)
    }

    /// Backend payload of the command, taken once.
    pub(crate) fn take_operation(&self) -> Option<Operation> {
        self.inner.state.lock().command.as_mut().and_then(Command::operation)
    }

    pub(crate) fn mark_submitted(&self) {
        self.advance(EventStatus::Submitted);
    }

    pub(crate) fn mark_running(&self) {
        self.advance(EventStatus::Running);
    }

    fn advance(&self, status: EventStatus) {
        let mut state = self.inner.state.lock();
        if state.status.rank() >= status.rank() {
            return;
        }
        state.status = status;
        if self.inner.profiling {
            let now = Some(now_ns());
            match status {
                EventStatus::Submitted => state.timing.submit = now,
                EventStatus::Running => state.timing.start = now,
                _ => {}
            }
        }
    }

    /// Move to the terminal `status`.
    ///
    /// Under the queue lock (when there is a queue) and the event lock the
    /// status is set, waiters are woken and the event leaves its queue's
    /// pending set. Afterwards, with no lock held, the command payload and
    /// wait list are dropped, callbacks run in registration order and
    /// dependents are notified. Returns the dependents that became ready,
    /// or `None` if the event was already terminal.
    pub(crate) fn finish(&self, status: EventStatus) -> Option<Vec<Event>> {
        debug_assert!(status.is_terminal());
        let queue = self.inner.queue.as_ref();
        let mut queue_state = queue.map(CommandQueue::lock_state);
        let released = {
            let mut state = self.inner.state.lock();
            if state.status.is_terminal() {
                return None;
            }
            state.status = status;
            if self.inner.profiling {
                let now = now_ns();
                state.timing.submit.get_or_insert(now);
                state.timing.start.get_or_insert(now);
                state.timing.end = Some(now);
            }
            self.inner.changed.notify_all();
            Released {
                command: state.command.take(),
                wait_list: std::mem::take(&mut state.wait_list),
                dependents: std::mem::take(&mut state.dependents),
                callbacks: std::mem::take(&mut state.callbacks),
            }
        };
        if let (Some(queue), Some(queue_state)) = (queue, queue_state.as_mut()) {
            queue.retire(queue_state, self);
        }
        drop(queue_state);

        let Released {
            command,
            wait_list,
            dependents,
            callbacks,
        } = released;
        drop(command);
        drop(wait_list);
        for callback in callbacks {
            self.run_callback(callback, status);
        }
        let failed = matches!(status, EventStatus::Error(_));
        Some(
            dependents
                .into_iter()
                .filter(|dependent| dependent.resolve_dependency(failed))
                .collect(),
        )
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Event {}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("status", &self.status())
            .finish()
    }
}

/// Non-owning event handle.
#[derive(Clone)]
pub struct WeakEvent(Weak<EventInner>);

impl WeakEvent {
    pub fn upgrade(&self) -> Option<Event> {
        self.0.upgrade().map(|inner| Event { inner })
    }

    /// True once every strong handle is gone and the event is destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.0.strong_count() == 0
    }
}

impl fmt::Debug for WeakEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakEvent").field("alive", &!self.is_destroyed()).finish()
    }
}

/// An event completed by the application instead of a device.
#[derive(Clone, Debug)]
pub struct UserEvent {
    event: Event,
}

impl UserEvent {
    pub(crate) fn new(context: &Context) -> Self {
        let event = Event::new(CommandKind::User, context.clone(), None, None);
        tracing::debug!(event = event.id(), "user_event_created");
        Self { event }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Set the terminal status: `Complete` or an application error with a
    /// negative code. Fails with `InvalidOperation` once already set.
    pub fn set_status(&self, status: EventStatus) -> Result<()> {
        match status {
            EventStatus::Complete => {}
            EventStatus::Error(EventError::Application(code)) if code < 0 => {}
            other => {
                return Err(Error::invalid_value(format!("{other:?} is not a valid user event status")));
            }
        }
        let ready = self
            .event
            .finish(status)
            .ok_or_else(|| Error::invalid_operation("user event status already set"))?;
        tracing::debug!(event = self.event.id(), code = status.code(), "user_event_set");
        dispatch::run(ready);
        Ok(())
    }

    pub fn complete(&self) -> Result<()> {
        self.set_status(EventStatus::Complete)
    }

    pub fn fail(&self, code: i32) -> Result<()> {
        self.set_status(EventStatus::Error(EventError::Application(code)))
    }
}

impl Deref for UserEvent {
    type Target = Event;

    fn deref(&self) -> &Event {
        &self.event
    }
}

impl From<UserEvent> for Event {
    fn from(user: UserEvent) -> Self {
        user.event
    }
}

/// Wait for every event in `events`.
///
/// All events must share one context. Returns `UpstreamDependencyFailed` if
/// any of them ended in error, after all of them are terminal.
pub fn wait_for_events(events: &[Event]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(Error::invalid_value("no events to wait for"));
    };
    if events.iter().any(|event| event.context() != first.context()) {
        return Err(Error::InvalidContext);
    }
    let failed = events.iter().fold(false, |failed, event| event.wait().is_err() || failed);
    if failed {
        Err(Error::UpstreamDependencyFailed)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use ferrocl_backends::CpuBackendConfig;
    use std::sync::mpsc;

    fn context() -> Context {
        let device = Device::with_cpu_config(CpuBackendConfig::default().with_workers(1)).expect("cpu device");
        Context::new(vec![device]).expect("context")
    }

    /// A queue-less marker: completes as soon as its dependencies do.
    fn gated_on(context: &Context, gates: &[&Event]) -> Event {
        let event = Event::new(CommandKind::Marker, context.clone(), None, None);
        for gate in gates {
            event.depend_on(gate);
        }
        if event.release_hold() {
            dispatch::run(vec![event.clone()]);
        }
        event
    }

    #[test]
    fn user_event_status_rules() {
        let ctx = context();
        let user = ctx.create_user_event();
        assert_eq!(user.status(), EventStatus::Queued);
        assert!(matches!(user.set_status(EventStatus::Running), Err(Error::InvalidValue(_))));
        assert!(matches!(user.fail(0), Err(Error::InvalidValue(_))));
        assert!(matches!(
            user.set_status(EventStatus::Error(EventError::Backend(-5))),
            Err(Error::InvalidValue(_))
        ));
        user.complete().expect("first set");
        assert!(matches!(user.complete(), Err(Error::InvalidOperation(_))));
        assert!(matches!(user.fail(-1), Err(Error::InvalidOperation(_))));
        assert_eq!(user.status(), EventStatus::Complete);
    }

    #[test]
    fn terminal_status_never_changes() {
        let ctx = context();
        let user = ctx.create_user_event();
        user.fail(-42).expect("set");
        assert!(user.event().finish(EventStatus::Complete).is_none());
        user.mark_running();
        assert_eq!(user.status(), EventStatus::Error(EventError::Application(-42)));
        assert_eq!(user.wait(), Err(Error::EventFailed(-42)));
    }

    #[test]
    fn callbacks_fire_once_in_order() {
        let ctx = context();
        let user = ctx.create_user_event();
        let (tx, rx) = mpsc::channel();
        for tag in 0..2 {
            let tx = tx.clone();
            user.set_callback(EventStatus::Complete, move |_, status| {
                let _ = tx.send((tag, status));
            })
            .expect("register");
        }
        user.complete().expect("set");
        assert_eq!(rx.try_recv().ok(), Some((0, EventStatus::Complete)));
        assert_eq!(rx.try_recv().ok(), Some((1, EventStatus::Complete)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn panicking_callback_does_not_stop_the_others() {
        let ctx = context();
        let user = ctx.create_user_event();
        let (tx, rx) = mpsc::channel();
        user.set_callback(EventStatus::Complete, |_, _| panic!("callback failure"))
            .expect("register");
        user.set_callback(EventStatus::Complete, move |_, status| {
            let _ = tx.send(status);
        })
        .expect("register");
        user.complete().expect("set");
        assert_eq!(rx.try_recv().ok(), Some(EventStatus::Complete));

        user.set_callback(EventStatus::Complete, |_, _| panic!("late callback failure"))
            .expect("late callback panic is contained");
    }

    #[test]
    fn callback_trigger_must_be_complete() {
        let ctx = context();
        let user = ctx.create_user_event();
        for trigger in [EventStatus::Queued, EventStatus::Submitted, EventStatus::Running] {
            assert!(matches!(user.set_callback(trigger, |_, _| {}), Err(Error::InvalidValue(_))));
        }
    }

    #[test]
    fn late_callback_fires_immediately() {
        let ctx = context();
        let user = ctx.create_user_event();
        user.fail(-3).expect("set");
        let (tx, rx) = mpsc::channel();
        user.set_callback(EventStatus::Complete, move |event, status| {
            let _ = tx.send((event.id(), status));
        })
        .expect("register");
        assert_eq!(
            rx.try_recv().ok(),
            Some((user.id(), EventStatus::Error(EventError::Application(-3))))
        );
    }

    #[test]
    fn dependents_complete_after_gate() {
        let ctx = context();
        let gate = ctx.create_user_event();
        let marker = gated_on(&ctx, &[gate.event()]);
        assert_eq!(marker.status(), EventStatus::Queued);
        gate.complete().expect("set");
        assert_eq!(marker.status(), EventStatus::Complete);
    }

    #[test]
    fn failure_cascades_through_chain() {
        let ctx = context();
        let gate = ctx.create_user_event();
        let first = gated_on(&ctx, &[gate.event()]);
        let second = gated_on(&ctx, &[&first]);
        gate.fail(-7).expect("set");
        assert_eq!(first.status(), EventStatus::Error(EventError::UpstreamDependencyFailed));
        assert_eq!(second.status(), EventStatus::Error(EventError::UpstreamDependencyFailed));
        assert_eq!(second.wait(), Err(Error::UpstreamDependencyFailed));
    }

    #[test]
    fn already_failed_dependency_cascades_immediately() {
        let ctx = context();
        let gate = ctx.create_user_event();
        gate.fail(-1).expect("set");
        let done = ctx.create_user_event();
        done.complete().expect("set");
        let marker = gated_on(&ctx, &[done.event(), gate.event()]);
        assert_eq!(marker.status(), EventStatus::Error(EventError::UpstreamDependencyFailed));
    }

    #[test]
    fn wait_timeout_reports_pending() {
        let ctx = context();
        let user = ctx.create_user_event();
        assert_eq!(user.wait_timeout(Duration::from_millis(5)), None);
        user.complete().expect("set");
        assert_eq!(user.wait_timeout(Duration::from_millis(5)), Some(Ok(())));
    }

    #[test]
    fn wait_for_events_validation() {
        let ctx = context();
        let other = context();
        assert!(matches!(wait_for_events(&[]), Err(Error::InvalidValue(_))));
        let a = ctx.create_user_event();
        let b = other.create_user_event();
        assert_eq!(
            wait_for_events(&[a.event().clone(), b.event().clone()]),
            Err(Error::InvalidContext)
        );
        let c = ctx.create_user_event();
        a.complete().expect("set");
        c.fail(-2).expect("set");
        assert_eq!(
            wait_for_events(&[a.event().clone(), c.event().clone()]),
            Err(Error::UpstreamDependencyFailed)
        );
    }

    #[test]
    fn user_events_have_no_profiling() {
        let ctx = context();
        let user = ctx.create_user_event();
        user.complete().expect("set");
        assert_eq!(user.profiling_info(ProfilingInfo::End), Err(Error::ProfilingInfoNotAvailable));
        assert!(user.queue().is_none());
        assert_eq!(user.name(), "UserEvent");
    }

    #[test]
    fn weak_handle_observes_destruction() {
        let ctx = context();
        let user = ctx.create_user_event();
        let weak = user.downgrade();
        let clone = user.event().clone();
        drop(user);
        assert!(!weak.is_destroyed());
        assert_eq!(weak.upgrade().map(|e| e.id()), Some(clone.id()));
        drop(clone);
        assert!(weak.is_destroyed());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn status_codes() {
        assert_eq!(EventStatus::Queued.code(), 3);
        assert_eq!(EventStatus::Complete.code(), 0);
        assert_eq!(EventStatus::Error(EventError::UpstreamDependencyFailed).code(), -14);
        assert!(CommandKind::Barrier.is_instantaneous());
        assert!(!CommandKind::CopyBuffer.is_instantaneous());
    }
}
