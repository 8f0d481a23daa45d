//! Field formatters that mask configured field values.
//!
//! Both formatters share one visitor that captures every field as a
//! `serde_json::Value`; the text formatter then renders `key=value` pairs and
//! the JSON formatter emits an object.

use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};
use tracing::field::{Field, Visit};
use tracing_subscriber::field::RecordFields;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::FormatFields;

#[derive(Clone, Debug)]
pub(crate) struct Redaction {
    fields: Arc<HashSet<String>>,
    replacement: Arc<str>,
}

impl Redaction {
    pub(crate) fn new(fields: &[String], replacement: &str) -> Self {
        Self {
            fields: Arc::new(fields.iter().cloned().collect()),
            replacement: Arc::from(replacement),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn collect<R: RecordFields>(&self, fields: R) -> Vec<(&'static str, JsonValue)> {
        let mut collector = Collector {
            redaction: self,
            entries: Vec::new(),
        };
        fields.record(&mut collector);
        collector.entries
    }
}

struct Collector<'a> {
    redaction: &'a Redaction,
    entries: Vec<(&'static str, JsonValue)>,
}

impl Collector<'_> {
    fn push(&mut self, field: &Field, value: JsonValue) {
        let value = if self.redaction.fields.contains(field.name()) {
            JsonValue::String(self.redaction.replacement.to_string())
        } else {
            value
        };
        self.entries.push((field.name(), value));
    }
}

impl Visit for Collector<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, JsonValue::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, JsonValue::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, JsonValue::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, JsonValue::Number(value.into()));
    }

    fn record_i128(&mut self, field: &Field, value: i128) {
        self.push(field, JsonValue::String(value.to_string()));
    }

    fn record_u128(&mut self, field: &Field, value: u128) {
        self.push(field, JsonValue::String(value.to_string()));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = JsonNumber::from_f64(value)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(value.to_string()));
        self.push(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, JsonValue::Bool(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        self.push(field, JsonValue::String(value.to_string()));
    }
}

/// `key=value` output with redaction.
#[derive(Clone, Debug)]
pub(crate) struct TextRedactingFields(pub(crate) Redaction);

impl<'writer> FormatFields<'writer> for TextRedactingFields {
    fn format_fields<R: RecordFields>(&self, mut writer: Writer<'writer>, fields: R) -> fmt::Result {
        for (index, (key, value)) in self.0.collect(fields).into_iter().enumerate() {
            if index > 0 {
                writer.write_char(' ')?;
            }
            match value {
                JsonValue::String(text) => write!(writer, "{key}={text:?}")?,
                other => write!(writer, "{key}={other}")?,
            }
        }
        Ok(())
    }
}

/// JSON object output with redaction.
#[derive(Clone, Debug)]
pub(crate) struct JsonRedactingFields(pub(crate) Redaction);

impl<'writer> FormatFields<'writer> for JsonRedactingFields {
    fn format_fields<R: RecordFields>(&self, mut writer: Writer<'writer>, fields: R) -> fmt::Result {
        let object: JsonMap<String, JsonValue> = self
            .0
            .collect(fields)
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect();
        let serialized = serde_json::to_string(&JsonValue::Object(object)).map_err(|_| fmt::Error)?;
        writer.write_str(&serialized)
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("capture lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn render<F>(fields: F) -> String
    where
        F: for<'writer> FormatFields<'writer> + Send + Sync + 'static,
    {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .with_level(false)
            .with_target(false)
            .fmt_fields(fields)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(token = "secret", count = 3_u64, "queued");
        });
        let bytes = captured.0.lock().expect("capture lock").clone();
        String::from_utf8(bytes).expect("utf-8 output")
    }

    fn redaction() -> Redaction {
        Redaction::new(&["token".to_string()], "[redacted]")
    }

    #[test]
    fn text_fields_mask_configured_names() {
        let line = render(TextRedactingFields(redaction()));
        assert!(line.contains("token=\"[redacted]\""), "{line}");
        assert!(line.contains("count=3"), "{line}");
        assert!(!line.contains("secret"), "{line}");
    }

    #[test]
    fn json_fields_mask_configured_names() {
        let line = render(JsonRedactingFields(redaction()));
        assert!(line.contains("\"token\":\"[redacted]\""), "{line}");
        assert!(line.contains("\"count\":3"), "{line}");
        assert!(!line.contains("secret"), "{line}");
    }
}
