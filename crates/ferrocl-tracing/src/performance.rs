//! Timing guards for hot paths.
//!
//! A [`PerformanceSpan`] measures the time between its creation and drop and
//! emits a `performance_span_complete` debug event when performance tracing
//! is enabled and the duration reaches the configured threshold.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use crate::TracingConfig;

static ENABLED: AtomicBool = AtomicBool::new(cfg!(debug_assertions));
const NO_THRESHOLD: u64 = u64::MAX;
static THRESHOLD_US: AtomicU64 = AtomicU64::new(NO_THRESHOLD);

/// Apply the performance settings of `config` process-wide.
pub fn configure(config: &TracingConfig) {
    ENABLED.store(config.enable_performance_tracing, Ordering::Relaxed);
    THRESHOLD_US.store(config.performance_threshold_us.unwrap_or(NO_THRESHOLD), Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

fn global_threshold() -> Option<u64> {
    match THRESHOLD_US.load(Ordering::Relaxed) {
        NO_THRESHOLD => None,
        value => Some(value),
    }
}

/// RAII timer; logs on drop.
pub struct PerformanceSpan {
    name: &'static str,
    threshold_us: Option<u64>,
    start: Instant,
    span: tracing::Span,
}

impl PerformanceSpan {
    /// Timer that uses the process-wide threshold.
    pub fn new(name: &'static str) -> Self {
        Self::with_threshold(name, global_threshold())
    }

    /// Timer that only logs when the measured duration is at least `threshold_us`.
    pub fn with_threshold(name: &'static str, threshold_us: Option<u64>) -> Self {
        let span = if is_enabled() {
            tracing::debug_span!("perf", name)
        } else {
            tracing::Span::none()
        };
        Self {
            name,
            threshold_us,
            start: Instant::now(),
            span,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn elapsed_us(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

impl Drop for PerformanceSpan {
    fn drop(&mut self) {
        if !is_enabled() {
            return;
        }
        let elapsed_us = self.elapsed_us();
        if self.threshold_us.is_none_or(|threshold| elapsed_us >= threshold) {
            let _entered = self.span.enter();
            tracing::debug!(
                name = self.name,
                duration_us = elapsed_us,
                "performance_span_complete"
            );
        }
    }
}
