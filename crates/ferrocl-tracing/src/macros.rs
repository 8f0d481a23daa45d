//! Instrumentation macros used on the dispatch and backend hot paths.

/// Start a [`PerformanceSpan`](crate::performance::PerformanceSpan) guard.
///
/// Extra `field = value` pairs are logged once, when the guard is created.
///
/// ```rust
/// use ferrocl_tracing::perf_span;
///
/// let _guard = perf_span!("copy_rect", rows = 16, bytes = 4096);
/// ```
#[macro_export]
macro_rules! perf_span {
    ($name:expr) => {
        $crate::performance::PerformanceSpan::new($name)
    };
    ($name:expr, $($field:ident = $value:expr),+ $(,)?) => {{
        let guard = $crate::performance::PerformanceSpan::new($name);
        if $crate::performance::is_enabled() {
            $crate::tracing::debug!(parent: guard.span(), perf = $name, $($field = $value),+, "performance_span_start");
        }
        guard
    }};
}

/// Emit a one-off performance event at debug level.
#[macro_export]
macro_rules! perf_event {
    ($name:expr, $($field:ident = $value:expr),+ $(,)?) => {
        if $crate::performance::is_enabled() {
            $crate::tracing::debug!(event = $name, $($field = $value),+);
        }
    };
}

/// Evaluate a block and return `(result, elapsed_us)`.
#[macro_export]
macro_rules! timed {
    ($name:expr, $block:block) => {{
        let start = ::std::time::Instant::now();
        let result = $block;
        let elapsed_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
        $crate::perf_event!($name, duration_us = elapsed_us);
        (result, elapsed_us)
    }};
}
