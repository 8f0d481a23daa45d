//! Dispatcher: hands ready events to their device
//!
//! An event reaches [`run`] exactly once, when its last dependency resolved.
//! From there it either finishes on the spot (failed dependency,
//! synchronisation command, nothing to execute) or becomes one backend job
//! whose observer finishes it. Finishing an event can make dependents
//! ready; they go through the same worklist instead of recursing, so long
//! chains never grow the stack.

use std::collections::VecDeque;

use ferrocl_backends::{Job, JobObserver};
use ferrocl_tracing::perf_span;

use crate::device::Device;
use crate::event::{Event, EventError, EventStatus};

/// Dispatch every event in `ready` and everything that becomes ready as a
/// consequence on this thread.
pub(crate) fn run(ready: Vec<Event>) {
    if ready.is_empty() {
        return;
    }
    let _guard = perf_span!("dispatch", ready = ready.len());
    let mut worklist = VecDeque::from(ready);
    while let Some(event) = worklist.pop_front() {
        worklist.extend(dispatch(&event));
    }
}

/// Returns the dependents made ready if the event finished synchronously.
fn dispatch(event: &Event) -> Vec<Event> {
    if event.dependency_failed() {
        tracing::debug!(event = event.id(), command = event.name(), "event_dependency_failed");
        return finish(event, EventStatus::Error(EventError::UpstreamDependencyFailed));
    }
    if event.command_kind().is_instantaneous() {
        return finish(event, EventStatus::Complete);
    }
    let Some(device) = event.queue().map(|queue| queue.device().clone()) else {
        return finish(event, EventStatus::Complete);
    };
    event.mark_submitted();
    let Some(operation) = event.take_operation() else {
        return finish(event, EventStatus::Complete);
    };
    tracing::trace!(event = event.id(), operation = operation.name(), bytes = operation.byte_len(), "event_submitted");

    device.record_submitted();
    let observer = EventObserver {
        event: event.clone(),
        device: device.clone(),
    };
    match device.backend().submit(Job::new(operation, Box::new(observer))) {
        Ok(()) => Vec::new(),
        Err(err) => {
            tracing::warn!(event = event.id(), command = event.name(), error = %err, "backend_rejected_job");
            device.record_finished(false);
            finish(event, EventStatus::Error(EventError::Backend(err.code())))
        }
    }
}

fn finish(event: &Event, status: EventStatus) -> Vec<Event> {
    event.finish(status).unwrap_or_default()
}

/// Relays backend progress into the event it was submitted for.
struct EventObserver {
    event: Event,
    device: Device,
}

impl JobObserver for EventObserver {
    fn started(&self) {
        self.event.mark_running();
    }

    fn finished(self: Box<Self>, result: ferrocl_backends::Result<()>) {
        let status = match result {
            Ok(()) => EventStatus::Complete,
            Err(err) => {
                tracing::warn!(
                    event = self.event.id(),
                    command = self.event.name(),
                    code = err.code(),
                    error = %err,
                    "command_failed"
                );
                EventStatus::Error(EventError::Backend(err.code()))
            }
        };
        self.device.record_finished(status == EventStatus::Complete);
        if let Some(ready) = self.event.finish(status) {
            run(ready);
        }
    }
}
