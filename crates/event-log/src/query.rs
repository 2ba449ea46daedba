use chrono::{DateTime, Utc};

/// Builder for constructing event queries.
///
/// Allows filtering events by action, entity, actor and time range.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Filter by actions (any of these).
    pub actions: Option<Vec<String>>,

    /// Filter by entity type.
    pub entity_type: Option<String>,

    /// Filter by entity ID.
    pub entity_id: Option<String>,

    /// Filter by actor.
    pub actor: Option<String>,

    /// Filter by events at or after this timestamp.
    pub from_timestamp: Option<DateTime<Utc>>,

    /// Filter by events at or before this timestamp.
    pub to_timestamp: Option<DateTime<Utc>>,

    /// Maximum number of events to return.
    pub limit: Option<usize>,

    /// Number of events to skip.
    pub offset: Option<usize>,
}

impl EventQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for events about a specific entity.
    pub fn for_entity(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: Some(entity_type.into()),
            entity_id: Some(entity_id.into()),
            ..Default::default()
        }
    }

    /// Filters by a single action.
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.actions = Some(vec![action.into()]);
        self
    }

    /// Filters by multiple actions (any of these).
    pub fn actions(mut self, actions: Vec<String>) -> Self {
        self.actions = Some(actions);
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Filters to events at or after this timestamp.
    pub fn from_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.from_timestamp = Some(timestamp);
        self
    }

    /// Filters to events at or before this timestamp.
    pub fn to_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.to_timestamp = Some(timestamp);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}
