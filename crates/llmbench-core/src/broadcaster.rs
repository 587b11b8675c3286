//! Best-effort progress events for experiment subscribers.
//!
//! The orchestrator publishes through [`ProgressBroadcaster`], which wraps a
//! [`BroadcastTransport`]. Transport failures are logged and counted, never
//! returned.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use llmbench_state::ExperimentId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

use crate::metrics::METRICS;
use crate::obs;

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Progress,
    RunStarted,
    RunCompleted,
    ExperimentCompleted,
    ExperimentPaused,
    Error,
}

/// Message delivered to subscribers of an experiment's topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub experiment_id: ExperimentId,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn new(experiment_id: ExperimentId, message_type: MessageType, payload: Value) -> Self {
        Self {
            message_type,
            experiment_id,
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Topic every event for `experiment_id` is published on.
pub fn progress_topic(experiment_id: ExperimentId) -> String {
    format!("/experiments/{experiment_id}/progress")
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
#[error("broadcast transport failed: {0}")]
pub struct TransportError(pub String);

/// Delivers envelopes to whoever listens on a topic.
#[async_trait]
pub trait BroadcastTransport: Send + Sync {
    async fn publish(&self, topic: &str, envelope: &Envelope) -> Result<(), TransportError>;
}

/// In-process transport fanning envelopes out over a
/// `tokio::sync::broadcast` channel.
///
/// Publishing with no subscribers succeeds; the envelope is dropped.
#[derive(Clone)]
pub struct ChannelTransport {
    tx: broadcast::Sender<(String, Envelope)>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Receive every envelope published on `topic` from now on.
    pub fn subscribe(&self, topic: impl Into<String>) -> TopicSubscription {
        TopicSubscription {
            topic: topic.into(),
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl BroadcastTransport for ChannelTransport {
    async fn publish(&self, topic: &str, envelope: &Envelope) -> Result<(), TransportError> {
        if self.tx.send((topic.to_string(), envelope.clone())).is_err() {
            debug!(topic, "no subscribers");
        }
        Ok(())
    }
}

/// Receiving side of [`ChannelTransport::subscribe`].
pub struct TopicSubscription {
    topic: String,
    rx: broadcast::Receiver<(String, Envelope)>,
}

impl TopicSubscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next envelope for this topic, or `None` once the transport is gone.
    ///
    /// A lagging subscriber skips what it missed and keeps going.
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            match self.rx.recv().await {
                Ok((topic, envelope)) if topic == self.topic => return Some(envelope),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(topic = %self.topic, skipped, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Broadcaster
// ---------------------------------------------------------------------------

/// Publishes experiment lifecycle events without ever failing the caller.
#[derive(Clone)]
pub struct ProgressBroadcaster {
    transport: Arc<dyn BroadcastTransport>,
}

impl ProgressBroadcaster {
    pub fn new(transport: Arc<dyn BroadcastTransport>) -> Self {
        Self { transport }
    }

    pub async fn publish(
        &self,
        experiment_id: ExperimentId,
        message_type: MessageType,
        payload: Value,
    ) {
        let topic = progress_topic(experiment_id);
        let envelope = Envelope::new(experiment_id, message_type, payload);
        if let Err(e) = self.transport.publish(&topic, &envelope).await {
            METRICS.inc_broadcasts_dropped();
            obs::emit_broadcast_failed(experiment_id, &topic, &e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FailingTransport;

    #[async_trait]
    impl BroadcastTransport for FailingTransport {
        async fn publish(&self, _topic: &str, _envelope: &Envelope) -> Result<(), TransportError> {
            Err(TransportError("socket closed".into()))
        }
    }

    #[test]
    fn test_topic_format() {
        assert_eq!(progress_topic(12), "/experiments/12/progress");
    }

    #[test]
    fn test_envelope_wire_shape() {
        let env = Envelope::new(3, MessageType::RunCompleted, json!({"iteration": 1}));
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["type"], "RUN_COMPLETED");
        assert_eq!(v["experimentId"], 3);
        assert_eq!(v["payload"]["iteration"], 1);
        assert!(v["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_failed_transport_is_swallowed() {
        let broadcaster = ProgressBroadcaster::new(Arc::new(FailingTransport));
        broadcaster
            .publish(1, MessageType::Progress, json!({}))
            .await;
    }

    #[tokio::test]
    async fn test_subscription_filters_by_topic() {
        let transport = ChannelTransport::new(16);
        let mut sub = transport.subscribe(progress_topic(2));
        assert_eq!(sub.topic(), "/experiments/2/progress");
        let broadcaster = ProgressBroadcaster::new(Arc::new(transport.clone()));

        broadcaster.publish(1, MessageType::Progress, json!({})).await;
        broadcaster
            .publish(2, MessageType::ExperimentCompleted, json!({}))
            .await;

        let env = sub.recv().await.unwrap();
        assert_eq!(env.experiment_id, 2);
        assert_eq!(env.message_type, MessageType::ExperimentCompleted);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let transport = ChannelTransport::default();
        let env = Envelope::new(1, MessageType::Progress, json!({}));
        assert!(transport.publish("/experiments/1/progress", &env).await.is_ok());
    }
}
