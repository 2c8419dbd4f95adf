//! Progress broadcaster.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel. Publishing is
//! best-effort and never blocks: with no subscribers the event is dropped,
//! and a subscriber that falls behind loses the oldest events. Events for a
//! single job are published from one task, so per-job order is preserved.
//!
//! The bus performs no filtering; [`OwnerSubscription`] filters on the
//! subscriber side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ids::{JobId, OwnerId};
use crate::job::SafetyVerdict;

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// Coarse event kind, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Progress,
    Completed,
    Failed,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// What happened to the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EventPayload {
    Progress { percent: u8, stage: String },
    Completed { verdict: SafetyVerdict, score: f64 },
    Failed { error: String },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Progress { .. } => EventKind::Progress,
            Self::Completed { .. } => EventKind::Completed,
            Self::Failed { .. } => EventKind::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// A timestamped job event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub job_id: JobId,
    pub owner_id: OwnerId,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl JobEvent {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(job_id: JobId, owner_id: OwnerId, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            job_id,
            owner_id,
            payload,
        }
    }

    pub fn progress(job_id: JobId, owner_id: OwnerId, percent: u8, stage: impl Into<String>) -> Self {
        Self::new(
            job_id,
            owner_id,
            EventPayload::Progress {
                percent,
                stage: stage.into(),
            },
        )
    }

    pub fn completed(job_id: JobId, owner_id: OwnerId, verdict: SafetyVerdict, score: f64) -> Self {
        Self::new(job_id, owner_id, EventPayload::Completed { verdict, score })
    }

    pub fn failed(job_id: JobId, owner_id: OwnerId, error: impl Into<String>) -> Self {
        Self::new(
            job_id,
            owner_id,
            EventPayload::Failed {
                error: error.into(),
            },
        )
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel for job events.
pub struct EventBus {
    tx: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a new event bus whose subscribers buffer at most `capacity`
    /// events before lagging.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to every event on the bus.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    /// Subscribe to the events of a single owner.
    pub fn subscribe_owner(&self, owner_id: OwnerId) -> OwnerSubscription {
        OwnerSubscription {
            owner_id,
            rx: self.tx.subscribe(),
        }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: JobEvent) {
        tracing::trace!(job_id = %event.job_id, kind = ?event.kind(), "publishing event");
        // Ignore send errors (no subscribers).
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// A subscription that yields only one owner's events.
pub struct OwnerSubscription {
    owner_id: OwnerId,
    rx: broadcast::Receiver<JobEvent>,
}

impl OwnerSubscription {
    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    /// Wait for the next event belonging to this owner.
    ///
    /// Returns `None` once the bus is dropped. Lagging skips the lost events
    /// and keeps going; missed events are not replayed.
    pub async fn recv(&mut self) -> Option<JobEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.owner_id == self.owner_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(owner_id = %self.owner_id, skipped = n, "event subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let job_id = JobId::new();
        bus.publish(JobEvent::progress(job_id, OwnerId::from("alice"), 10, "Validating"));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.job_id, job_id);
        assert_eq!(event.kind(), EventKind::Progress);
        match event.payload {
            EventPayload::Progress { percent, .. } => assert_eq!(percent, 10),
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn no_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.publish(JobEvent::failed(JobId::new(), OwnerId::from("a"), "boom"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn owner_subscription_filters_other_owners() {
        let bus = EventBus::new(16);
        let mut alice = bus.subscribe_owner(OwnerId::from("alice"));

        let bob_job = JobId::new();
        let alice_job = JobId::new();
        bus.publish(JobEvent::progress(bob_job, OwnerId::from("bob"), 10, "x"));
        bus.publish(JobEvent::completed(alice_job, OwnerId::from("alice"), SafetyVerdict::Safe, 12.0));

        let event = alice.recv().await.unwrap();
        assert_eq!(event.job_id, alice_job);
        assert_eq!(event.kind(), EventKind::Completed);
    }

    #[tokio::test]
    async fn owner_subscription_survives_lag() {
        let bus = EventBus::new(2);
        let owner = OwnerId::from("alice");
        let mut sub = bus.subscribe_owner(owner.clone());

        let job = JobId::new();
        for p in 0..5u8 {
            bus.publish(JobEvent::progress(job, owner.clone(), p * 10, "x"));
        }

        // The oldest events are gone; the subscriber resumes with what is left.
        let event = sub.recv().await.unwrap();
        match event.payload {
            EventPayload::Progress { percent, .. } => assert_eq!(percent, 30),
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn owner_subscription_ends_when_bus_dropped() {
        let bus = EventBus::new(4);
        let mut sub = bus.subscribe_owner(OwnerId::from("alice"));
        drop(bus);
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn event_json_shape() {
        let event = JobEvent::failed(JobId::new(), OwnerId::from("alice"), "corrupt upload");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "failed");
        assert_eq!(json["owner_id"], "alice");
        assert_eq!(json["error"], "corrupt upload");

        let back: JobEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.payload, event.payload);
    }
}
