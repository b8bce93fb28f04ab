//! Log forwarding (§6): every `INFO`/`WARN`/`ERROR` tracing event is also
//! posted to the `Logs` collection as a JSON document shaped
//! `{log, timestamp, level, message, module, line}`, alongside the usual
//! `tracing_subscriber::fmt` console output.
//!
//! Forwarding happens off an unbounded channel rather than inserting
//! inline from `on_event`, so a slow or unreachable database never
//! blocks the call site that emitted the log.

use crate::domain::ports::{Collection, DocumentStore};
use crate::time::now_iso8601;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

const SERVICE_NAME: &str = "bacnet-gateway";

struct QueuedLog {
    level: &'static str,
    message: String,
    module: String,
    line: u32,
}

/// Pulls the `message` field off an event; tracing events can carry
/// arbitrary structured fields, but the `Logs` collection only wants
/// the human-readable summary the way the other log fields do.
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}").trim_matches('"').to_string();
        }
    }
}

/// A `tracing_subscriber::Layer` that mirrors `INFO`-and-above events
/// into the `Logs` collection via a background drain task.
pub struct LogForwardingLayer {
    sender: mpsc::UnboundedSender<QueuedLog>,
}

impl LogForwardingLayer {
    /// Construct the layer and spawn the task draining its queue into
    /// `store`'s `Logs` collection. Register the returned layer with
    /// `tracing_subscriber::registry()` alongside the console formatter.
    pub fn spawn(store: Arc<dyn DocumentStore>, tz: String) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<QueuedLog>();
        tokio::spawn(async move {
            while let Some(record) = receiver.recv().await {
                let document = json!({
                    "log": SERVICE_NAME,
                    "timestamp": now_iso8601(&tz),
                    "level": record.level,
                    "message": record.message,
                    "module": record.module,
                    "line": record.line,
                });
                if let Err(e) = store.insert_one(Collection::Logs, document).await {
                    eprintln!("log forwarding to database failed: {e}");
                }
            }
        });
        Self { sender }
    }
}

impl<S: Subscriber> Layer<S> for LogForwardingLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > Level::INFO {
            return;
        }
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        let _ = self.sender.send(QueuedLog {
            level: level_name(metadata.level()),
            message: visitor.0,
            module: metadata.module_path().unwrap_or("unknown").to_string(),
            line: metadata.line().unwrap_or(0),
        });
    }
}

fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARN",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory_store::InMemoryStore;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    #[tokio::test]
    async fn info_event_is_forwarded_to_logs_collection() {
        let store = Arc::new(InMemoryStore::new());
        let layer = LogForwardingLayer::spawn(store.clone(), "UTC".to_string());

        let _guard = tracing_subscriber::registry().with(layer).set_default();
        tracing::info!("device discovery started...");

        // Give the background drain task a turn to run.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let count = store
            .count_documents(crate::domain::ports::Collection::Logs)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
