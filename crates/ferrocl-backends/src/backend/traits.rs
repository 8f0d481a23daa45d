//! Backend trait for asynchronous job execution
//!
//! A backend owns the device-side workers. The engine submits one [`Job`]
//! per ready event and learns about progress only through the job's
//! [`JobObserver`]:
//!
//! ```text
//! engine ── submit(Job) ──▶ backend ready queue ──▶ worker
//!                                                     │ started()
//!                                                     │ execute(operation)
//!   ◀──────────────────────── finished(result) ───────┘
//! ```
//!
//! Whether the worker is a local thread or a co-processor behind an IPC
//! transport is invisible to the engine.

use super::types::{DeviceInfo, Operation};
use crate::error::Result;

/// Progress sink for one submitted job.
pub trait JobObserver: Send {
    /// A worker picked the job up and is about to execute it.
    fn started(&self);

    /// Called exactly once, after execution.
    fn finished(self: Box<Self>, result: Result<()>);
}

/// One unit of device work.
pub struct Job {
    pub operation: Operation,
    pub observer: Box<dyn JobObserver>,
}

impl Job {
    pub fn new(operation: Operation, observer: Box<dyn JobObserver>) -> Self {
        Self { operation, observer }
    }
}

/// Device backend interface.
///
/// `submit` must not block on the job's completion and must not call the
/// observer on the submitting thread. An `Err` means the job was dropped
/// without being run; the observer is then never called.
pub trait DeviceBackend: Send + Sync {
    fn info(&self) -> &DeviceInfo;

    fn submit(&self, job: Job) -> Result<()>;

    /// Whether `submit` currently accepts work.
    fn is_available(&self) -> bool {
        true
    }

    /// Stop accepting work. Jobs already accepted still run to completion.
    fn shutdown(&self) {}
}
