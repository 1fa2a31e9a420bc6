use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use google_cloud_googleapis::pubsub::v1::PubsubMessage;
use google_cloud_pubsub::client::{Client, ClientConfig};
use google_cloud_pubsub::publisher::Publisher;
use serde::Serialize;
use serde_json::value::RawValue;
use tracing::{debug, error, warn};

use crate::config::PubSubConfig;
use crate::domain::{Error, Event};
use crate::health::Monitored;
use crate::notifier::Notifier;

const CONNECT_ATTEMPTS: u32 = 10;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Wire envelope for broker messages. The payload is embedded exactly as it
/// was persisted in the outbox row, without re-encoding.
#[derive(Serialize)]
struct BrokerEvent<'a> {
    #[serde(rename = "type")]
    event_type: &'a str,
    payload: &'a RawValue,
}

fn message_attributes() -> HashMap<String, String> {
    HashMap::from([
        ("origin".to_owned(), "users-service".to_owned()),
        ("source".to_owned(), "pubsub-notifier".to_owned()),
    ])
}

/// All three event types land on the users topic.
fn is_users_topic_event(event_type: &str) -> bool {
    matches!(event_type, "CreateUser" | "UpdateUser" | "DeleteUser")
}

fn encode_broker_event(event_type: &str, payload: &[u8]) -> Result<Vec<u8>, Error> {
    let raw = std::str::from_utf8(payload).map_err(|err| {
        error!(error = %err, "outbox payload is not utf-8");
        Error::FailedToProcessData
    })?;
    let raw: &RawValue = serde_json::from_str(raw).map_err(|err| {
        error!(error = %err, "outbox payload is not json");
        Error::FailedToProcessData
    })?;
    serde_json::to_vec(&BrokerEvent {
        event_type,
        payload: raw,
    })
    .map_err(|err| {
        error!(error = %err, "failed to serialize broker event");
        Error::FailedToProcessData
    })
}

/// Pub/Sub connection manager. When disabled it holds no client and reports
/// healthy, so the liveness equation ignores it.
pub struct PubSub {
    client: Option<Client>,
    enabled: bool,
    users_topic: String,
}

impl PubSub {
    pub async fn connect(cfg: &PubSubConfig) -> anyhow::Result<Self> {
        if !cfg.enabled {
            return Ok(Self {
                client: None,
                enabled: false,
                users_topic: cfg.users_topic.clone(),
            });
        }

        let config = ClientConfig {
            project_id: Some(cfg.project_id.clone()),
            ..ClientConfig::default()
        }
        .with_auth()
        .await
        .context("pubsub auth")?;
        let client = Client::new(config).await.context("pubsub client")?;

        let pubsub = Self {
            client: Some(client),
            enabled: true,
            users_topic: cfg.users_topic.clone(),
        };

        let mut attempts = CONNECT_ATTEMPTS;
        while !pubsub.ping().await {
            attempts -= 1;
            if attempts == 0 {
                anyhow::bail!("pubsub failed to connect");
            }
            warn!(attempts_left = attempts, "pubsub is trying to connect");
            tokio::time::sleep(CONNECT_RETRY_DELAY).await;
        }

        Ok(pubsub)
    }

    /// Builds the broker notifier. Only callable when the client is enabled.
    pub fn notifier(&self) -> anyhow::Result<PubSubNotifier> {
        let client = self
            .client
            .as_ref()
            .context("pubsub notifier requires an enabled pubsub client")?;
        let publisher = client.topic(&self.users_topic).new_publisher(None);
        Ok(PubSubNotifier { publisher })
    }
}

#[async_trait::async_trait]
impl Monitored for PubSub {
    async fn ping(&self) -> bool {
        match &self.client {
            Some(client) => client
                .topic(&self.users_topic)
                .exists(None)
                .await
                .unwrap_or(false),
            None => true,
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Broker-backed notifier: serialises `{type, payload}`, attaches the
/// constant attribute map and blocks until the per-message ack.
pub struct PubSubNotifier {
    publisher: Publisher,
}

#[async_trait::async_trait]
impl Notifier for PubSubNotifier {
    async fn publish(&self, event: &Event) -> Result<(), Error> {
        if !is_users_topic_event(&event.event_type) {
            error!(event_type = %event.event_type, "unknown event type");
            return Err(Error::NotificationNotSent);
        }

        let body = encode_broker_event(&event.event_type, &event.payload)?;
        let message = PubsubMessage {
            data: body.into(),
            attributes: message_attributes(),
            ..Default::default()
        };

        let awaiter = self.publisher.publish(message).await;
        awaiter.get().await.map_err(|err| {
            debug!(error = %err, "failed to publish message");
            Error::NotificationNotSent
        })?;

        debug!(event_id = %event.id, event_type = %event.event_type, "published notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_event_types_resolve_to_the_users_topic() {
        for ty in ["CreateUser", "UpdateUser", "DeleteUser"] {
            assert!(is_users_topic_event(ty));
        }
        assert!(!is_users_topic_event("RenameUser"));
        assert!(!is_users_topic_event(""));
    }

    #[test]
    fn broker_event_embeds_the_payload_verbatim() {
        let payload = br#"{"b":1,"a":2,"nested":{"z":true}}"#;
        let body = encode_broker_event("CreateUser", payload).unwrap();
        let body = String::from_utf8(body).unwrap();
        assert_eq!(
            body,
            r#"{"type":"CreateUser","payload":{"b":1,"a":2,"nested":{"z":true}}}"#
        );
    }

    #[test]
    fn broker_event_rejects_non_json_payloads() {
        assert_eq!(
            encode_broker_event("CreateUser", b"not-json"),
            Err(Error::FailedToProcessData)
        );
        assert_eq!(
            encode_broker_event("CreateUser", &[0xff, 0xfe]),
            Err(Error::FailedToProcessData)
        );
    }

    #[test]
    fn message_attributes_are_constant() {
        let attrs = message_attributes();
        assert_eq!(attrs["origin"], "users-service");
        assert_eq!(attrs["source"], "pubsub-notifier");
    }
}
