use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    EventLogError, EventQuery, EventRecord, Result,
    recorder::{EventRecorder, matches},
};

/// In-memory event recorder for tests and the database-less dev server.
#[derive(Clone, Default)]
pub struct InMemoryEventRecorder {
    events: Arc<RwLock<Vec<EventRecord>>>,
    fail_on_record: Arc<AtomicBool>,
}

impl InMemoryEventRecorder {
    /// Creates a new empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Returns all events with the given action.
    pub async fn events_with_action(&self, action: &str) -> Vec<EventRecord> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }

    /// Makes every subsequent write fail until reset.
    pub fn set_fail_on_record(&self, fail: bool) {
        self.fail_on_record.store(fail, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.fail_on_record.load(Ordering::SeqCst) {
            return Err(EventLogError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    async fn matching(&self, query: &EventQuery) -> Vec<EventRecord> {
        let store = self.events.read().await;
        let mut events: Vec<_> = store.iter().filter(|e| matches(query, e)).cloned().collect();

        events.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.event_id.cmp(&b.event_id))
        });

        let offset = query.offset.unwrap_or(0);
        let events = events.into_iter().skip(offset);
        match query.limit {
            Some(limit) => events.take(limit).collect(),
            None => events.collect(),
        }
    }
}

#[async_trait]
impl EventRecorder for InMemoryEventRecorder {
    async fn record(&self, event: EventRecord) -> Result<()> {
        self.check_available()?;
        self.events.write().await.push(event);
        Ok(())
    }

    async fn record_all(&self, events: Vec<EventRecord>) -> Result<()> {
        self.check_available()?;
        self.events.write().await.extend(events);
        Ok(())
    }

    async fn query(&self, query: EventQuery) -> Result<Vec<EventRecord>> {
        Ok(self.matching(&query).await)
    }
}
