//! A [`Publisher`] that writes events to the log.
//!
//! The chat-platform adapter is not part of this process; until one is
//! plugged in, broadcasts go to the structured log with a synthetic link
//! so the ticker's bookkeeping runs end to end.

use async_trait::async_trait;
use larue_core::scheduler::{PublishError, Published, Publisher};
use larue_types::ScheduledEvent;
use tracing::info;
use uuid::Uuid;

/// Logs each event and reports it as posted to `destination`.
#[derive(Debug, Clone)]
pub struct LogPublisher {
    destination: String,
}

impl LogPublisher {
    /// Publish under the given destination name.
    pub fn new(destination: &str) -> Self {
        Self {
            destination: destination.to_owned(),
        }
    }
}

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, event: &ScheduledEvent) -> Result<Published, PublishError> {
        let message_id = Uuid::new_v4().to_string();
        let jump_url = format!("log://{}/{message_id}", self.destination);
        info!(
            event = %event.id,
            kind = %event.kind,
            title = %event.title,
            starts_at = %event.starts_at,
            payload = %event.payload,
            destination = %self.destination,
            "Broadcast"
        );
        Ok(Published {
            destination: self.destination.clone(),
            message_id,
            jump_url,
        })
    }
}
