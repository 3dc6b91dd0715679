//! Shared context handed to every pipeline operation.

use crate::{
    config::limits::BatchLimits,
    core::events::{EventSink, PipelineEvent, TracingSink},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Database handle, post-commit event sink and batch caps.
///
/// Concurrent request handlers share one pipeline by reference; the connection
/// pool inside `database` does the multiplexing.
pub struct Pipeline {
    /// Database connection for all catalog reads and writes
    pub database: DatabaseConnection,
    /// Receiver of audit, notification and enrichment events
    pub events: Arc<dyn EventSink>,
    /// Caps enforced by the bulk entry points
    pub limits: BatchLimits,
}

impl Pipeline {
    /// Creates a pipeline that logs its events and uses default limits.
    #[must_use]
    pub fn new(database: DatabaseConnection) -> Self {
        Self {
            database,
            events: Arc::new(TracingSink),
            limits: BatchLimits::default(),
        }
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Replaces the batch limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: BatchLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Publishes events gathered during a committed unit of work.
    pub(crate) fn emit(&self, events: Vec<PipelineEvent>) {
        self.events.publish_all(events);
    }
}
