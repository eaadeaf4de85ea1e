// Message bus
//
// Outbound side of the protocol. Responses travel to the destination the
// requester named in `reply_to`; alarms go to the configured alarm
// destination. Inbound messages arrive through the HTTP API, or directly at
// the mediator when the pillar is embedded.

use crate::alarm::Alarm;
use crate::error::{PillarError, Result};
use crate::types::messages::{MessageResponse, ResponseStage};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

/// Everything the pillar sends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum OutboundMessage {
    Response(MessageResponse),
    Alarm(Alarm),
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Send one message. At-least-once from the bus's point of view; the
    /// pillar does not deduplicate.
    async fn send(&self, message: OutboundMessage) -> Result<()>;
}

/// In-process bus keeping every sent message, optionally forwarding them to
/// a channel.
#[derive(Default)]
pub struct LocalMessageBus {
    sent: Mutex<Vec<OutboundMessage>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<OutboundMessage>>>,
}

impl LocalMessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every message sent from now on
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<OutboundMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    /// Responses of one conversation, in send order
    pub fn responses_for(&self, correlation_id: &str) -> Vec<MessageResponse> {
        self.sent
            .lock()
            .iter()
            .filter_map(|message| match message {
                OutboundMessage::Response(r) if r.correlation_id == correlation_id => {
                    Some(r.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// The final response of one conversation, if sent
    pub fn final_response(&self, correlation_id: &str) -> Option<MessageResponse> {
        self.responses_for(correlation_id)
            .into_iter()
            .find(|r| r.stage == ResponseStage::Final)
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl MessageBus for LocalMessageBus {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(message.clone()).is_ok());
        self.sent.lock().push(message);
        Ok(())
    }
}

/// Bus posting JSON messages over HTTP
pub struct HttpMessageBus {
    client: Client,
    alarm_destination: Option<String>,
}

impl HttpMessageBus {
    pub fn new(timeout: Duration, alarm_destination: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PillarError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            alarm_destination,
        })
    }

    async fn post(&self, destination: &str, message: &OutboundMessage) -> Result<()> {
        let url = Url::parse(destination)
            .map_err(|e| PillarError::MessageBus(format!("Invalid destination '{}': {}", destination, e)))?;
        self.client
            .post(url)
            .json(message)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| PillarError::MessageBus(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl MessageBus for HttpMessageBus {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        match &message {
            OutboundMessage::Response(response) => {
                debug!(
                    "Sending {:?} {} response for {} to {}",
                    response.stage, response.operation, response.correlation_id, response.to
                );
                self.post(&response.to, &message).await
            }
            OutboundMessage::Alarm(alarm) => match &self.alarm_destination {
                Some(destination) => self.post(destination, &message).await,
                None => {
                    warn!("No alarm destination configured, dropping alarm: {}", alarm.alarm_text);
                    Ok(())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::AlarmCode;
    use chrono::Utc;

    fn alarm() -> OutboundMessage {
        OutboundMessage::Alarm(Alarm {
            alarm_code: AlarmCode::ComponentFailure,
            alarm_text: "test".to_string(),
            alarm_raiser: "pillar-1".to_string(),
            collection_id: None,
            file_id: None,
            orig_date_time: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_local_bus_records_and_forwards() {
        let bus = LocalMessageBus::new();
        let mut rx = bus.subscribe();

        bus.send(alarm()).await.unwrap();

        assert_eq!(bus.sent().len(), 1);
        assert!(matches!(rx.recv().await, Some(OutboundMessage::Alarm(_))));
    }

    #[tokio::test]
    async fn test_http_bus_without_alarm_destination_drops_alarms() {
        let bus = HttpMessageBus::new(Duration::from_secs(1), None).unwrap();
        assert!(bus.send(alarm()).await.is_ok());
    }
}
