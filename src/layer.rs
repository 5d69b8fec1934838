use crate::context::{current_request, ExceptionContext};
use crate::encode::LogValue;
use crate::error::SanitizeError;
use crate::filter::RequestFilter;
use crate::record::{Level, LogEvent};
use crate::shared::SharedSanitizer;
use chrono::Utc;
use std::io::Write;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that turns events into sanitized JSON lines.
///
/// Each event at or above `min_level` becomes a [`LogEvent`]; an `error`
/// field becomes its [`ExceptionContext`] and the request installed with
/// [`with_request`](crate::context::with_request) (if any) is attached.
/// Every line is written synchronously to the configured writer.
pub struct SanitizingLayer<W> {
    sanitizer: Arc<SharedSanitizer>,
    make_writer: W,
    min_level: tracing::Level,
    filter: RequestFilter,
}

impl<W> SanitizingLayer<W>
where
    W: for<'a> MakeWriter<'a> + 'static,
{
    pub fn new(sanitizer: Arc<SharedSanitizer>, make_writer: W) -> Self {
        Self {
            sanitizer,
            make_writer,
            min_level: tracing::Level::INFO,
            filter: RequestFilter,
        }
    }

    pub fn with_min_level(mut self, level: tracing::Level) -> Self {
        self.min_level = level;
        self
    }
}

impl<S, W> Layer<S> for SanitizingLayer<W>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'a> MakeWriter<'a> + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > self.min_level || meta.target() == crate::INTERNAL_TARGET {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut log_event = LogEvent::new(Level::from(meta.level()), visitor.message.unwrap_or_default())
            .at(Utc::now())
            .with_target(meta.target());
        for (name, value) in visitor.fields {
            log_event.extras.set(&name, value);
        }

        let request = current_request();
        if let Some(request) = request.as_deref() {
            self.filter.filter(&mut log_event, Some(request));
        }

        let sanitizer = self.sanitizer.load();
        let mut line = match sanitizer.format(&log_event, request.as_deref(), visitor.exception.as_ref()) {
            Ok(line) => line,
            Err(err) => degraded_record(&log_event, &err),
        };
        line.push(b'\n');

        let mut writer = self.make_writer.make_writer_for(meta);
        if let Err(e) = writer.write_all(&line) {
            eprintln!("failed to write sanitized log record: {}", e);
        }
    }
}

/// Replacement line when an event cannot be formatted: its level and the
/// error, nothing else.
fn degraded_record(event: &LogEvent, err: &SanitizeError) -> Vec<u8> {
    let fallback = serde_json::json!({
        "levelname": event.level.as_str(),
        "error": err.to_string(),
    });
    serde_json::to_vec(&fallback).unwrap_or_default()
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<(String, LogValue)>,
    exception: Option<ExceptionContext>,
}

impl FieldVisitor {
    fn capture_rendered_error(&mut self, text: String) {
        if self.exception.is_none() {
            self.exception = Some(ExceptionContext::from_rendered(text));
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else if field.name() == "error" {
            self.capture_rendered_error(value.to_string());
        } else {
            self.fields.push((field.name().to_string(), LogValue::from(value)));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.push((field.name().to_string(), LogValue::from(value)));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.push((field.name().to_string(), LogValue::from(value)));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.push((field.name().to_string(), LogValue::from(value)));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.push((field.name().to_string(), LogValue::from(value)));
    }

    fn record_error(&mut self, _field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.exception = Some(ExceptionContext::from_error(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else if field.name() == "error" {
            // `error = %e` and `error = ?e` arrive here as rendered text.
            self.capture_rendered_error(format!("{:?}", value));
        } else {
            self.fields.push((field.name().to_string(), LogValue::from(format!("{:?}", value))));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::RecordSanitizer;
    use std::sync::Mutex;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn lines(capture: &Capture) -> Vec<serde_json::Value> {
        let bytes = capture.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn events_below_min_level_are_skipped() {
        let capture = Capture::default();
        let shared = Arc::new(SharedSanitizer::new(RecordSanitizer::default()));
        let layer = SanitizingLayer::new(shared, capture.clone()).with_min_level(tracing::Level::WARN);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("ignored");
            tracing::warn!(username = "alice", password = "hunter2", "kept");
        });

        let out = lines(&capture);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["message"], "kept");
        assert_eq!(out[0]["levelname"], "WARNING");
        assert_eq!(out[0]["username"], "alice");
        assert!(out[0].get("password").is_none());
    }
}
