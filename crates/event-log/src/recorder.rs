use async_trait::async_trait;

use crate::{EventQuery, EventRecord, Result};

/// Core trait for event log implementations.
///
/// All implementations must be thread-safe (Send + Sync). Writes are
/// independent of any checkout transaction.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    /// Appends a single record.
    async fn record(&self, event: EventRecord) -> Result<()>;

    /// Appends several records atomically.
    async fn record_all(&self, events: Vec<EventRecord>) -> Result<()>;

    /// Retrieves records matching a query, oldest first.
    async fn query(&self, query: EventQuery) -> Result<Vec<EventRecord>>;
}

/// Extension trait providing convenience methods for recorders.
#[async_trait]
pub trait EventRecorderExt: EventRecorder {
    /// Records an event, logging and discarding any failure.
    ///
    /// Returns whether the write succeeded so callers can count drops.
    async fn record_best_effort(&self, event: EventRecord) -> bool {
        let action = event.action.clone();
        match self.record(event).await {
            Ok(()) => {
                metrics::counter!("events_recorded_total").increment(1);
                true
            }
            Err(e) => {
                metrics::counter!("events_dropped_total").increment(1);
                tracing::warn!(%action, error = %e, "failed to record event");
                false
            }
        }
    }
}

// Blanket implementation for all EventRecorder implementations
impl<T: EventRecorder + ?Sized> EventRecorderExt for T {}

/// Returns true if the record satisfies every filter of the query.
///
/// Limit and offset are not applied here.
pub(crate) fn matches(query: &EventQuery, e: &EventRecord) -> bool {
    if let Some(ref actions) = query.actions
        && !actions.contains(&e.action)
    {
        return false;
    }
    if let Some(ref entity_type) = query.entity_type
        && &e.entity_type != entity_type
    {
        return false;
    }
    if let Some(ref entity_id) = query.entity_id
        && &e.entity_id != entity_id
    {
        return false;
    }
    if let Some(ref actor) = query.actor
        && e.actor.as_ref() != Some(actor)
    {
        return false;
    }
    if let Some(from) = query.from_timestamp
        && e.timestamp < from
    {
        return false;
    }
    if let Some(to) = query.to_timestamp
        && e.timestamp > to
    {
        return false;
    }
    true
}
