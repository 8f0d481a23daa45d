//! Subscriber configuration presets and environment overrides.

use std::env;

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use crate::TracingSetupError;

pub(crate) const ENV_PROFILE: &str = "FERROCL_TRACING_PROFILE";
pub(crate) const ENV_DIRECTIVES: &str = "FERROCL_TRACING_DIRECTIVES";
pub(crate) const ENV_FORMAT: &str = "FERROCL_TRACING_FORMAT";
pub(crate) const ENV_REDACT_FIELDS: &str = "FERROCL_TRACING_REDACT_FIELDS";
pub(crate) const ENV_REDACT_TOKEN: &str = "FERROCL_TRACING_REDACT_TOKEN";
pub(crate) const ENV_PERF_TRACING: &str = "FERROCL_PERF_TRACING";
pub(crate) const ENV_PERF_THRESHOLD_US: &str = "FERROCL_PERF_THRESHOLD_US";

const DEFAULT_REDACTION: &str = "***REDACTED***";

/// Output format for the formatter layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingOutput {
    Compact,
    Pretty,
    Json,
}

impl TracingOutput {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// How the runtime's tracing subscriber should behave.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Explicit filter directives (e.g. `ferrocl_core=debug,info`). When absent
    /// `RUST_LOG` is consulted, then [`TracingConfig::default_directive`].
    pub directives: Option<String>,
    /// Filter used when nothing else resolves.
    pub default_directive: String,
    /// Print event targets (module paths).
    pub include_targets: bool,
    /// ANSI colouring for text output.
    pub ansi: bool,
    /// Span lifecycle events to emit.
    pub span_events: FmtSpan,
    pub output: TracingOutput,
    /// Field names whose values are replaced by [`TracingConfig::redaction_text`].
    pub redacted_fields: Vec<String>,
    pub redaction_text: String,
    /// When false, `perf_span!` guards never log.
    pub enable_performance_tracing: bool,
    /// Performance spans shorter than this are not logged.
    pub performance_threshold_us: Option<u64>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::for_local()
    }
}

impl TracingConfig {
    /// Pretty, coloured output for a developer terminal.
    pub fn for_local() -> Self {
        Self {
            directives: None,
            default_directive: "info".to_string(),
            include_targets: true,
            ansi: true,
            span_events: FmtSpan::NONE,
            output: TracingOutput::Pretty,
            redacted_fields: Vec::new(),
            redaction_text: DEFAULT_REDACTION.to_string(),
            enable_performance_tracing: cfg!(debug_assertions),
            performance_threshold_us: None,
        }
    }

    /// JSON lines without colour, for CI and log collectors.
    pub fn for_ci() -> Self {
        Self {
            ansi: false,
            output: TracingOutput::Json,
            enable_performance_tracing: false,
            ..Self::for_local()
        }
    }

    /// Debug-level engine logs with span timings, for profiling dispatch.
    pub fn for_performance() -> Self {
        Self {
            directives: Some("ferrocl_core=debug,ferrocl_backends=debug".to_string()),
            ansi: false,
            span_events: FmtSpan::ENTER | FmtSpan::CLOSE,
            output: TracingOutput::Json,
            enable_performance_tracing: true,
            ..Self::for_local()
        }
    }

    /// Start from the preset named by `FERROCL_TRACING_PROFILE` and apply
    /// the remaining `FERROCL_*` overrides on top.
    pub fn from_env() -> Self {
        let profile = env::var(ENV_PROFILE).unwrap_or_default().to_ascii_lowercase();
        let mut config = match profile.as_str() {
            "ci" => Self::for_ci(),
            "performance" => Self::for_performance(),
            _ => Self::for_local(),
        };

        if let Some(directives) = non_empty_var(ENV_DIRECTIVES) {
            config.directives = Some(directives);
        }

        if let Some(output) = env::var(ENV_FORMAT).ok().and_then(|v| TracingOutput::parse(&v)) {
            config.output = output;
            if output == TracingOutput::Json {
                config.ansi = false;
            }
        }

        if let Some(fields) = non_empty_var(ENV_REDACT_FIELDS) {
            let fields: Vec<String> = fields
                .split(',')
                .map(str::trim)
                .filter(|field| !field.is_empty())
                .map(String::from)
                .collect();
            if !fields.is_empty() {
                config.redacted_fields = fields;
            }
        }

        if let Some(token) = non_empty_var(ENV_REDACT_TOKEN) {
            config.redaction_text = token;
        }

        if let Ok(flag) = env::var(ENV_PERF_TRACING) {
            config.enable_performance_tracing = matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        if let Some(threshold) = env::var(ENV_PERF_THRESHOLD_US).ok().and_then(|v| v.trim().parse().ok()) {
            config.performance_threshold_us = Some(threshold);
        }

        config
    }

    pub(crate) fn resolve_filter(&self) -> Result<EnvFilter, TracingSetupError> {
        match &self.directives {
            Some(directives) => {
                EnvFilter::try_new(directives).map_err(|err| TracingSetupError::InvalidFilter(err.to_string()))
            }
            None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL_KEYS: &[&str] = &[
        ENV_PROFILE,
        ENV_DIRECTIVES,
        ENV_FORMAT,
        ENV_REDACT_FIELDS,
        ENV_REDACT_TOKEN,
        ENV_PERF_TRACING,
        ENV_PERF_THRESHOLD_US,
    ];

    fn clear_env() {
        for key in ALL_KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn profile_and_format_overrides() {
        clear_env();
        env::set_var(ENV_PROFILE, "ci");
        env::set_var(ENV_FORMAT, "compact");
        env::set_var(ENV_DIRECTIVES, "ferrocl_core=trace");
        env::set_var(ENV_REDACT_FIELDS, "host_ptr, user_data");
        env::set_var(ENV_REDACT_TOKEN, "[hidden]");

        let config = TracingConfig::from_env();
        clear_env();

        assert_eq!(config.directives.as_deref(), Some("ferrocl_core=trace"));
        assert_eq!(config.output, TracingOutput::Compact);
        assert!(!config.ansi);
        assert_eq!(config.redacted_fields, vec!["host_ptr", "user_data"]);
        assert_eq!(config.redaction_text, "[hidden]");
    }

    #[test]
    #[serial]
    fn performance_overrides() {
        clear_env();
        env::set_var(ENV_PERF_TRACING, "yes");
        env::set_var(ENV_PERF_THRESHOLD_US, "250");

        let config = TracingConfig::from_env();
        clear_env();

        assert!(config.enable_performance_tracing);
        assert_eq!(config.performance_threshold_us, Some(250));
    }

    #[test]
    #[serial]
    fn json_format_disables_ansi() {
        clear_env();
        env::set_var(ENV_FORMAT, "json");
        let config = TracingConfig::from_env();
        clear_env();

        assert_eq!(config.output, TracingOutput::Json);
        assert!(!config.ansi);
    }

    #[test]
    fn performance_preset_targets_engine_crates() {
        let config = TracingConfig::for_performance();
        assert!(config.enable_performance_tracing);
        assert_eq!(config.output, TracingOutput::Json);
        assert!(config.directives.as_deref().is_some_and(|d| d.contains("ferrocl_core")));
    }

    #[test]
    fn unknown_format_is_ignored() {
        assert_eq!(TracingOutput::parse("yaml"), None);
        assert_eq!(TracingOutput::parse(" Pretty "), Some(TracingOutput::Pretty));
    }
}
