//! Terminal rendering of run events.

use async_trait::async_trait;

use crate::core::{DeliveryError, Subscriber};
use crate::domain::{EventKind, LogEvent};

/// Prints run events to stderr as they are broadcast
pub struct ConsoleSubscriber;

#[async_trait]
impl Subscriber for ConsoleSubscriber {
    fn name(&self) -> &str {
        "console"
    }

    async fn deliver(&self, event: &LogEvent) -> Result<(), DeliveryError> {
        // Hub membership notices carry no run
        if event.run_id.is_none() {
            return Ok(());
        }
        eprintln!("{}", render(event));
        Ok(())
    }
}

fn render(event: &LogEvent) -> String {
    let time = event.timestamp.format("%H:%M:%S");
    let marker = match event.kind {
        EventKind::PhaseStart => ">>",
        EventKind::PhaseComplete | EventKind::PipelineComplete => "ok",
        EventKind::PhaseFailed | EventKind::ValidationFailed => "!!",
        _ => "--",
    };
    format!("{} {} [{}] {}", time, marker, event.source, event.message)
}
