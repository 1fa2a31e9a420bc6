pub mod pubsub;

use tracing::info;

use crate::domain::{Error, Event};

/// Publishes a persisted event to subscribers. Implementations block until
/// the event is acknowledged (or fail), so a successful return is a delivery
/// receipt the caller may durably record.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, event: &Event) -> Result<(), Error>;
}

/// Notifier for local and test runs: every event lands on the structured
/// log and always succeeds.
#[derive(Debug, Clone, Default)]
pub struct LoggerNotifier;

#[async_trait::async_trait]
impl Notifier for LoggerNotifier {
    async fn publish(&self, event: &Event) -> Result<(), Error> {
        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            payload = %String::from_utf8_lossy(&event.payload),
            "published notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn logger_notifier_always_succeeds() {
        let event = Event {
            id: Uuid::new_v4(),
            event_type: "CreateUser".into(),
            payload: br#"{"email":"e@x.pt"}"#.to_vec(),
        };
        assert_eq!(LoggerNotifier.publish(&event).await, Ok(()));
    }
}
