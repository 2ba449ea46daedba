//! Append-only event log used as both audit trail and analytics source.
//!
//! Records are never updated or deleted. Readers must not assume ordering or
//! uniqueness: the same logical event may be recorded twice, and timestamps
//! from different writers may interleave.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod recorder;

pub use error::{EventLogError, Result};
pub use event::{EventId, EventRecord};
pub use memory::InMemoryEventRecorder;
pub use postgres::PostgresEventRecorder;
pub use query::EventQuery;
pub use recorder::{EventRecorder, EventRecorderExt};
