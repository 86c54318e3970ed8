//! Engine event publishing.
//!
//! Purely observational: events never affect control flow, and a publish
//! failure (closed channel, no subscriber) must never fail the run. The
//! publisher carries an atomic active flag so emission is a cheap no-op when
//! nothing is listening.

use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::run::RunStatus;

/// Whether a step event marks dispatch or completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStage {
    Start,
    Complete,
}

/// Events emitted to the subscriber bus.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Step {
        run_id: String,
        stage: StepStage,
        node_id: String,
        node_kind: String,
        payload: Value,
    },
    Status {
        run_id: String,
        status: RunStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Fire-and-forget sender side of the event bus.
#[derive(Clone)]
pub struct EventPublisher {
    tx: Option<mpsc::UnboundedSender<EngineEvent>>,
    active: Arc<AtomicBool>,
}

impl EventPublisher {
    /// Create a publisher together with its subscriber end.
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            EventPublisher {
                tx: Some(tx),
                active: Arc::new(AtomicBool::new(true)),
            },
            rx,
        )
    }

    /// A publisher that drops everything. Used when no observer is attached.
    pub fn disabled() -> Self {
        EventPublisher {
            tx: None,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Emit an event. Never fails; a closed channel deactivates the
    /// publisher and drops the event.
    pub fn publish(&self, event: EngineEvent) {
        if !self.is_active() {
            return;
        }
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::debug!("event subscriber dropped, disabling publisher");
                self.active.store(false, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let (publisher, mut rx) = EventPublisher::channel();
        publisher.publish(EngineEvent::Step {
            run_id: "r1".to_string(),
            stage: StepStage::Start,
            node_id: "n1".to_string(),
            node_kind: "tool".to_string(),
            payload: json!({}),
        });

        match rx.recv().await.unwrap() {
            EngineEvent::Step { node_id, stage, .. } => {
                assert_eq!(node_id, "n1");
                assert_eq!(stage, StepStage::Start);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_publish_after_subscriber_drop_is_silent() {
        let (publisher, rx) = EventPublisher::channel();
        drop(rx);
        publisher.publish(EngineEvent::Status {
            run_id: "r1".to_string(),
            status: RunStatus::Running,
            output: None,
            error: None,
        });
        assert!(!publisher.is_active());
        // Subsequent publishes are no-ops, not panics.
        publisher.publish(EngineEvent::Status {
            run_id: "r1".to_string(),
            status: RunStatus::Completed,
            output: None,
            error: None,
        });
    }

    #[test]
    fn test_disabled_publisher() {
        let publisher = EventPublisher::disabled();
        assert!(!publisher.is_active());
        publisher.publish(EngineEvent::Status {
            run_id: "r1".to_string(),
            status: RunStatus::Running,
            output: None,
            error: None,
        });
    }
}
