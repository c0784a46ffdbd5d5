//! Capturing `tracing` events for assertions.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedEvent {
    /// Event level.
    pub level: Level,
    /// Formatted message.
    pub message: String,
    /// Other fields, rendered with `Debug` (strings without quotes).
    ///
    /// The event's own fields come first, followed by the fields of each
    /// enclosing span from the innermost outwards.
    pub fields: Vec<(String, String)>,
}

impl CapturedEvent {
    /// Returns a field value by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields
                .push((field.name().to_string(), format!("{value:?}")));
        }
    }
}

/// Fields recorded on a span, kept in the span's extensions.
struct SpanFields(Vec<(String, String)>);

/// A layer that stores every event it sees.
///
/// Clones share the same buffer.
#[derive(Clone, Default)]
pub struct LogCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl LogCapture {
    /// Creates an empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` with this capture installed as the thread's subscriber.
    pub fn capture<R>(&self, f: impl FnOnce() -> R) -> R {
        self.capture_at("debug", f)
    }

    /// Like [`capture`](Self::capture), filtering with an `EnvFilter`
    /// directive such as `"warn"` or `"treesync_core=info"`.
    pub fn capture_at<R>(&self, directive: &str, f: impl FnOnce() -> R) -> R {
        let subscriber = tracing_subscriber::registry()
            .with(EnvFilter::new(directive))
            .with(self.clone());
        tracing::subscriber::with_default(subscriber, f)
    }

    /// Returns a copy of every captured event.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().clone()
    }

    /// Returns the captured error-level events.
    pub fn errors(&self) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.level == Level::ERROR)
            .cloned()
            .collect()
    }

    /// Returns true if an event contains `message` and, if given, carries
    /// the `status` field value.
    pub fn has(&self, message: &str, status: Option<&str>) -> bool {
        self.events.lock().iter().any(|event| {
            event.message.contains(message)
                && status.map_or(true, |status| event.field("status") == Some(status))
        })
    }

    /// Drops everything captured so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl<S> Layer<S> for LogCapture
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = EventVisitor::default();
        attrs.record(&mut visitor);
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanFields(visitor.fields));
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = EventVisitor::default();
        values.record(&mut visitor);
        if let Some(fields) = span.extensions_mut().get_mut::<SpanFields>() {
            fields.0.extend(visitor.fields);
        };
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);
        let mut fields = visitor.fields;
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(span_fields) = span.extensions().get::<SpanFields>() {
                    fields.extend(span_fields.0.iter().cloned());
                }
            }
        }
        self.events.lock().push(CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.message,
            fields,
        });
    }
}

/// Installs a console subscriber for tests, honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_logging() {
    treesync_core::logging::enable_console_logging(0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{error, info, info_span, warn};

    #[test]
    fn captures_message_and_fields() {
        let capture = LogCapture::new();
        capture.capture(|| {
            info!(status = "success", "Created successfully");
            error!(status = "error", "boom");
        });

        assert!(capture.has("Created successfully", Some("success")));
        assert!(!capture.has("Created successfully", Some("error")));
        assert_eq!(capture.errors().len(), 1);
        assert_eq!(capture.errors()[0].message, "boom");

        capture.clear();
        assert!(capture.events().is_empty());
    }

    #[test]
    fn events_inherit_span_fields() {
        let capture = LogCapture::new();
        capture.capture(|| {
            let outer = info_span!("sync", src = "left");
            let _outer = outer.enter();
            let inner = info_span!("element", unique_id = "nyc", status = "pending");
            let _inner = inner.enter();
            error!(status = "error", "boom");
        });

        let event = &capture.errors()[0];
        assert_eq!(event.field("unique_id"), Some("nyc"));
        assert_eq!(event.field("src"), Some("left"));
        // The event's own value wins over the span's
        assert_eq!(event.field("status"), Some("error"));
    }

    #[test]
    fn capture_at_filters_by_level() {
        let capture = LogCapture::new();
        capture.capture_at("warn", || {
            let span = info_span!("element", unique_id = "nyc");
            let _enter = span.enter();
            info!("dropped");
            warn!("kept");
        });

        let events = capture.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "kept");
        // Disabled spans contribute nothing
        assert_eq!(events[0].field("unique_id"), None);
    }

    #[test]
    fn events_outside_capture_are_ignored() {
        let capture = LogCapture::new();
        info!("not captured");
        assert!(capture.events().is_empty());
    }
}
