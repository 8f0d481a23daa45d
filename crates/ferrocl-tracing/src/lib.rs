//! Shared `tracing` setup for the ferrocl runtime.
//!
//! Binaries, tests and benchmarks install their subscriber through this
//! crate so the engine's log surface (targets, redaction, performance spans)
//! looks the same everywhere.

pub mod config;
pub mod performance;
mod redact;

#[macro_use]
pub mod macros;

pub use config::{TracingConfig, TracingOutput};
pub use tracing;

use tracing::Subscriber;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Registry};

use redact::{JsonRedactingFields, Redaction, TextRedactingFields};

/// Failure to configure or install the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TracingSetupError {
    #[error("invalid tracing directive: {0}")]
    InvalidFilter(String),

    /// Usually means another subscriber is already installed.
    #[error("failed to install global tracing subscriber: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Build a subscriber for `config` without installing it.
pub fn build_subscriber(config: &TracingConfig) -> Result<impl Subscriber + Send + Sync, TracingSetupError> {
    let (filter, layer) = subscriber_layers(config)?;
    Ok(Registry::default().with(layer).with(filter))
}

/// Filter and formatter layers, for callers composing their own registry.
pub fn subscriber_layers(config: &TracingConfig) -> Result<(EnvFilter, BoxedLayer), TracingSetupError> {
    let filter = config.resolve_filter()?;
    let redaction = Redaction::new(&config.redacted_fields, &config.redaction_text);

    let layer: BoxedLayer = match config.output {
        TracingOutput::Compact => {
            let layer = tracing_fmt::layer()
                .compact()
                .with_target(config.include_targets)
                .with_ansi(config.ansi)
                .with_span_events(config.span_events.clone());
            if redaction.is_empty() {
                Box::new(layer)
            } else {
                Box::new(layer.fmt_fields(TextRedactingFields(redaction)))
            }
        }
        TracingOutput::Pretty => {
            let layer = tracing_fmt::layer()
                .pretty()
                .with_target(config.include_targets)
                .with_ansi(config.ansi)
                .with_span_events(config.span_events.clone());
            if redaction.is_empty() {
                Box::new(layer)
            } else {
                Box::new(layer.fmt_fields(TextRedactingFields(redaction)))
            }
        }
        TracingOutput::Json => {
            let layer = tracing_fmt::layer()
                .json()
                .with_target(config.include_targets)
                .with_ansi(false)
                .with_span_events(config.span_events.clone());
            if redaction.is_empty() {
                Box::new(layer)
            } else {
                Box::new(layer.fmt_fields(JsonRedactingFields(redaction)))
            }
        }
    };

    Ok((filter, layer))
}

/// Install the subscriber process-wide and apply the performance settings.
pub fn init_global_tracing(config: &TracingConfig) -> Result<(), TracingSetupError> {
    performance::configure(config);
    build_subscriber(config)?.try_init()?;
    tracing::debug!(output = ?config.output, "tracing_initialized");
    Ok(())
}

/// Install a CI-style subscriber for tests; repeated calls are harmless.
pub fn init_test_tracing() {
    let config = TracingConfig {
        default_directive: "warn".to_string(),
        ..TracingConfig::for_ci()
    };
    let _ = init_global_tracing(&config);
}
