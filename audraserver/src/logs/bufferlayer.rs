use super::{LogEntry, LogState};
use std::fmt::Write as _;
use std::time::SystemTime;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Layer tracing qui alimente le buffer circulaire du [`LogState`]
#[derive(Clone)]
pub struct BufferLayer {
    state: LogState,
}

impl BufferLayer {
    pub fn new(state: LogState) -> Self {
        Self { state }
    }
}

/// Collecte le message et les champs structurés d'un événement
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

impl<S: Subscriber> Layer<S> for BufferLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        self.state.push(LogEntry {
            timestamp: SystemTime::now(),
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message: visitor.message + &visitor.fields,
        });
    }
}
