//! Lifecycle events
//!
//! Coordinators publish `SwarmEvent`s to an `EventSink`. Publishing is
//! best-effort: a failing sink is logged and never changes the outcome of
//! the operation being observed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SwarmEventKind {
    HandoffStarted {
        source: String,
        target: String,
    },
    HandoffAttemptFailed {
        attempt: u32,
        error: String,
    },
    HandoffCompleted {
        target: String,
        attempts: u32,
        elapsed_ms: u64,
    },
    HandoffFailed {
        error: String,
    },
    TransferInitiated {
        source: String,
        target: String,
        compressed_size: usize,
    },
    TransferCompleted {
        claimed_by: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmEvent {
    /// Handoff id the event belongs to
    pub handoff_id: String,
    pub task_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: SwarmEventKind,
}

impl SwarmEvent {
    pub fn new(handoff_id: impl Into<String>, kind: SwarmEventKind) -> Self {
        Self {
            handoff_id: handoff_id.into(),
            task_id: None,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Short name used in log lines
    pub fn name(&self) -> &'static str {
        match self.kind {
            SwarmEventKind::HandoffStarted { .. } => "handoff_started",
            SwarmEventKind::HandoffAttemptFailed { .. } => "handoff_attempt_failed",
            SwarmEventKind::HandoffCompleted { .. } => "handoff_completed",
            SwarmEventKind::HandoffFailed { .. } => "handoff_failed",
            SwarmEventKind::TransferInitiated { .. } => "transfer_initiated",
            SwarmEventKind::TransferCompleted { .. } => "transfer_completed",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EventError {
    #[error("Event channel closed")]
    ChannelClosed,
    #[error("Event sink error: {0}")]
    Sink(String),
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: SwarmEvent) -> Result<(), EventError>;
}

/// Publish and log a failure instead of returning it
pub async fn publish_best_effort(sink: &dyn EventSink, event: SwarmEvent) {
    let name = event.name();
    let handoff_id = event.handoff_id.clone();
    if let Err(e) = sink.publish(event).await {
        warn!(event = name, handoff_id = %handoff_id, error = %e, "Failed to publish event");
    }
}

/// Writes events to the tracing subscriber
#[derive(Debug, Default, Clone)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, event: SwarmEvent) -> Result<(), EventError> {
        match &event.kind {
            SwarmEventKind::HandoffAttemptFailed { .. } | SwarmEventKind::HandoffFailed { .. } => {
                warn!(
                    event = event.name(),
                    handoff_id = %event.handoff_id,
                    kind = ?event.kind,
                    "Swarm event"
                );
            }
            _ => {
                info!(
                    event = event.name(),
                    handoff_id = %event.handoff_id,
                    kind = ?event.kind,
                    "Swarm event"
                );
            }
        }
        Ok(())
    }
}

/// Forwards events to an mpsc receiver
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: mpsc::Sender<SwarmEvent>,
}

impl ChannelEventSink {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<SwarmEvent>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn publish(&self, event: SwarmEvent) -> Result<(), EventError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| EventError::ChannelClosed)
    }
}

#[derive(Debug, Default, Clone)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn publish(&self, event: SwarmEvent) -> Result<(), EventError> {
        debug!(event = event.name(), "Dropping event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers() {
        let (sink, mut rx) = ChannelEventSink::new(4);
        let event = SwarmEvent::new(
            "h-1",
            SwarmEventKind::HandoffStarted {
                source: "a".to_string(),
                target: "b".to_string(),
            },
        )
        .with_task("t-1");

        sink.publish(event.clone()).await.unwrap();
        assert_eq!(rx.recv().await, Some(event));
    }

    #[tokio::test]
    async fn test_closed_channel_is_logged_not_raised() {
        let (sink, rx) = ChannelEventSink::new(1);
        drop(rx);

        let event = SwarmEvent::new("h-2", SwarmEventKind::HandoffFailed { error: "x".into() });
        assert_eq!(
            sink.publish(event.clone()).await,
            Err(EventError::ChannelClosed)
        );
        publish_best_effort(&sink, event).await;
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = SwarmEvent::new(
            "h-3",
            SwarmEventKind::TransferCompleted {
                claimed_by: "reviewer".to_string(),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "transfer_completed");
        assert_eq!(json["claimed_by"], "reviewer");
        assert_eq!(json["handoff_id"], "h-3");
    }
}
