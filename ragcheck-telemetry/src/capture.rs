use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::Subscriber;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, layer::Context, registry::LookupSpan};

/// A single event recorded by [`EventCapture`].
#[derive(Debug, Clone, Serialize)]
pub struct CapturedEvent {
    pub level: String,
    pub target: String,
    pub message: String,
    /// Structured fields other than `message`.
    pub fields: HashMap<String, serde_json::Value>,
    /// Name of the span the event was emitted in, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
}

impl CapturedEvent {
    /// Field value rendered as a string, if present.
    pub fn field(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// A tracing layer that keeps every event in shared memory.
///
/// Cloning an `EventCapture` shares the storage, so a test can install one
/// clone as a layer and inspect the events through another.
///
/// ```rust,ignore
/// let capture = EventCapture::new();
/// let _guard = capture.set_default();
/// tracing::warn!(document.id = "doc_2", "skipping document with empty text");
/// assert!(capture.contains("WARN", "skipping document"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct EventCapture {
    events: Arc<RwLock<Vec<CapturedEvent>>>,
}

impl EventCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a registry with only this layer as the thread's default
    /// subscriber until the guard is dropped.
    pub fn set_default(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::registry().with(self.clone());
        tracing::subscriber::set_default(subscriber)
    }

    /// Snapshot of the events recorded so far, oldest first.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.read().map(|events| events.clone()).unwrap_or_default()
    }

    /// Events at `level` (e.g. `"WARN"`).
    pub fn at_level(&self, level: &str) -> Vec<CapturedEvent> {
        self.events().into_iter().filter(|e| e.level == level).collect()
    }

    /// Whether an event at `level` has a message containing `needle`.
    pub fn contains(&self, level: &str, needle: &str) -> bool {
        self.events().iter().any(|e| e.level == level && e.message.contains(needle))
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
    }

    fn push(&self, event: CapturedEvent) {
        if let Ok(mut events) = self.events.write() {
            events.push(event);
        }
    }
}

impl<S> Layer<S> for EventCapture
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        let mut fields = visitor.0;

        let message = match fields.remove("message") {
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let metadata = event.metadata();

        self.push(CapturedEvent {
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message,
            fields,
            span: ctx.event_span(event).map(|span| span.name().to_string()),
        });
    }
}

#[derive(Default)]
struct JsonVisitor(HashMap<String, serde_json::Value>);

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::Value::Bool(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_message_fields_and_span() {
        let capture = EventCapture::new();
        let _guard = capture.set_default();

        let span = tracing::info_span!("ingest", collection = "docs");
        {
            let _entered = span.enter();
            tracing::warn!(document.id = "doc_2", skipped = 1u64, "skipping document");
        }

        let events = capture.at_level("WARN");
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.message, "skipping document");
        assert_eq!(event.field("document.id").as_deref(), Some("doc_2"));
        assert_eq!(event.field("skipped").as_deref(), Some("1"));
        assert_eq!(event.span.as_deref(), Some("ingest"));
    }

    #[test]
    fn clones_share_storage() {
        let capture = EventCapture::new();
        let observer = capture.clone();
        let _guard = capture.set_default();

        tracing::info!("first");
        assert!(observer.contains("INFO", "first"));

        observer.clear();
        assert!(capture.events().is_empty());
    }

    #[test]
    fn captured_events_serialize_without_empty_span() {
        let event = CapturedEvent {
            level: "INFO".into(),
            target: "ragcheck".into(),
            message: "done".into(),
            fields: HashMap::new(),
            span: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"message\":\"done\""));
        assert!(!json.contains("\"span\""));
    }
}
