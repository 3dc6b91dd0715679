//! Post-commit hooks.
//!
//! The transactional core never calls audit logging, notifications or music enrichment
//! directly. It publishes a [`PipelineEvent`] to an [`EventSink`] after the owning
//! transaction has committed, and collaborators subscribe. Publishing cannot fail from
//! the core's point of view: a sink that cannot deliver drops the event and logs.

use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// One audit log record: `LogAction(actorID, action, entityType, entityID, metadata)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    /// User who performed the action
    pub actor_id: i64,
    /// e.g. `"approve_show"`, `"verify_venue"`
    pub action: &'static str,
    /// e.g. `"show"`, `"venue"`, `"venue_edit"`
    pub entity_type: &'static str,
    /// Id of the affected record
    pub entity_id: i64,
    /// Action-specific details such as a rejection reason
    pub metadata: Value,
}

/// Something the pipeline committed that collaborators may care about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A new show entered the catalog (`NotifyNewShow`)
    ShowSubmitted {
        /// New show
        show_id: i64,
        /// Show title
        title: String,
        /// Submitter's user id
        submitted_by: i64,
        /// Status the show started in
        status: String,
    },
    /// `NotifyShowApproved`
    ShowApproved {
        /// Approved show
        show_id: i64,
        /// Show title
        title: String,
        /// Submitter to notify
        submitted_by: i64,
    },
    /// `NotifyShowRejected`
    ShowRejected {
        /// Rejected show
        show_id: i64,
        /// Show title
        title: String,
        /// Submitter to notify
        submitted_by: i64,
        /// Reason given by the admin
        reason: String,
    },
    /// `NotifyNewVenue`
    VenueCreated {
        /// New venue
        venue_id: i64,
        /// Venue name
        name: String,
        /// Whether it was created verified
        verified: bool,
    },
    /// A venue was marked verified, directly or by cascade
    VenueVerified {
        /// Verified venue
        venue_id: i64,
        /// Venue name
        name: String,
    },
    /// `NotifyPendingVenueEdit`
    PendingVenueEditCreated {
        /// Queued edit
        edit_id: i64,
        /// Venue the edit targets
        venue_id: i64,
        /// Proposer's user id
        proposed_by: i64,
    },
    /// An admin approved or rejected a queued edit
    VenueEditReviewed {
        /// Reviewed edit
        edit_id: i64,
        /// Venue the edit targeted
        venue_id: i64,
        /// `true` when the edit was applied
        approved: bool,
    },
    /// Triggers `DiscoverMusicForArtist(id, name)`
    ArtistCreated {
        /// New artist
        artist_id: i64,
        /// Artist name
        name: String,
    },
    /// `LogAction`
    Audit(AuditEntry),
}

impl PipelineEvent {
    /// Builds an [`PipelineEvent::Audit`] event.
    #[must_use]
    pub const fn audit(
        actor_id: i64,
        action: &'static str,
        entity_type: &'static str,
        entity_id: i64,
        metadata: Value,
    ) -> Self {
        Self::Audit(AuditEntry {
            actor_id,
            action,
            entity_type,
            entity_id,
            metadata,
        })
    }
}

/// Receiver of post-commit events. Implementations must not block.
pub trait EventSink: Send + Sync {
    /// Hands an event to the collaborator. Fire-and-forget.
    fn publish(&self, event: PipelineEvent);

    /// Publishes a batch in order.
    fn publish_all(&self, events: Vec<PipelineEvent>) {
        for event in events {
            self.publish(event);
        }
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: PipelineEvent) {}
}

/// Writes every event to the tracing log. Audit entries go out at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: PipelineEvent) {
        match &event {
            PipelineEvent::Audit(entry) => info!(
                actor_id = entry.actor_id,
                action = entry.action,
                entity_type = entry.entity_type,
                entity_id = entry.entity_id,
                metadata = %entry.metadata,
                "audit"
            ),
            other => debug!(?other, "pipeline event"),
        }
    }
}

/// Fans events out to any number of subscribers over a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<PipelineEvent>,
}

impl BroadcastSink {
    /// Creates a sink buffering up to `capacity` events per lagging subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribes a new collaborator (audit writer, notifier, enrichment worker).
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, event: PipelineEvent) {
        if self.tx.send(event).is_err() {
            warn!("Pipeline event dropped: no subscribers");
        }
    }
}

/// Keeps every event in memory for later inspection.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl RecordingSink {
    /// Snapshot of everything published so far.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Only the audit entries.
    #[must_use]
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PipelineEvent::Audit(entry) => Some(entry),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: PipelineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_broadcast_sink_delivers_to_subscribers() {
        let sink = BroadcastSink::new(8);
        let mut rx = sink.subscribe();

        sink.publish(PipelineEvent::ArtistCreated {
            artist_id: 3,
            name: "Dry Cleaning".to_string(),
        });

        let received = rx.recv().await.unwrap();
        assert_eq!(
            received,
            PipelineEvent::ArtistCreated {
                artist_id: 3,
                name: "Dry Cleaning".to_string()
            }
        );
    }

    #[test]
    fn test_broadcast_without_subscribers_does_not_panic() {
        let sink = BroadcastSink::new(1);
        sink.publish(PipelineEvent::VenueVerified {
            venue_id: 1,
            name: "Valley Bar".to_string(),
        });
    }

    #[test]
    fn test_recording_sink_filters_audit() {
        let sink = RecordingSink::default();
        sink.publish_all(vec![
            PipelineEvent::audit(1, "verify_venue", "venue", 9, json!({})),
            PipelineEvent::VenueVerified {
                venue_id: 9,
                name: "Crescent Ballroom".to_string(),
            },
        ]);
        assert_eq!(sink.events().len(), 2);
        let audit = sink.audit_entries();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, "verify_venue");
    }
}
