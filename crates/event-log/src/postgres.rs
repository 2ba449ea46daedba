use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    EventId, EventQuery, EventRecord, Result,
    recorder::EventRecorder,
};

const SELECT_COLUMNS: &str =
    "SELECT id, action, entity_type, entity_id, actor, payload, recorded_at FROM audit_events";

/// PostgreSQL-backed event recorder.
///
/// Writes go straight to the pool, never through a checkout transaction.
#[derive(Clone)]
pub struct PostgresEventRecorder {
    pool: PgPool,
}

impl PostgresEventRecorder {
    /// Creates a new PostgreSQL event recorder.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_event(row: PgRow) -> Result<EventRecord> {
        Ok(EventRecord {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            action: row.try_get("action")?,
            entity_type: row.try_get("entity_type")?,
            entity_id: row.try_get("entity_id")?,
            actor: row.try_get("actor")?,
            payload: row.try_get("payload")?,
            timestamp: row.try_get("recorded_at")?,
        })
    }

    fn build_query(query: &EventQuery) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(SELECT_COLUMNS);
        qb.push(" WHERE 1=1");

        if let Some(ref actions) = query.actions {
            qb.push(" AND action = ANY(").push_bind(actions.clone()).push(")");
        }
        if let Some(ref entity_type) = query.entity_type {
            qb.push(" AND entity_type = ").push_bind(entity_type.clone());
        }
        if let Some(ref entity_id) = query.entity_id {
            qb.push(" AND entity_id = ").push_bind(entity_id.clone());
        }
        if let Some(ref actor) = query.actor {
            qb.push(" AND actor = ").push_bind(actor.clone());
        }
        if let Some(from) = query.from_timestamp {
            qb.push(" AND recorded_at >= ").push_bind(from);
        }
        if let Some(to) = query.to_timestamp {
            qb.push(" AND recorded_at <= ").push_bind(to);
        }

        qb.push(" ORDER BY recorded_at ASC, id ASC");

        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            qb.push(" OFFSET ").push_bind(offset as i64);
        }
        qb
    }
}

#[async_trait]
impl EventRecorder for PostgresEventRecorder {
    async fn record(&self, event: EventRecord) -> Result<()> {
        self.record_all(vec![event]).await
    }

    async fn record_all(&self, events: Vec<EventRecord>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for event in &events {
            sqlx::query(
                r#"
                INSERT INTO audit_events (id, action, entity_type, entity_id, actor, payload, recorded_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(&event.action)
            .bind(&event.entity_type)
            .bind(&event.entity_id)
            .bind(&event.actor)
            .bind(&event.payload)
            .bind(event.timestamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, query: EventQuery) -> Result<Vec<EventRecord>> {
        let mut qb = Self::build_query(&query);
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_event).collect()
    }
}
