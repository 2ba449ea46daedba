//! Persistence boundary for the checkout core.
//!
//! [`CommerceStore`] covers plain reads and writes; [`StoreTransaction`] is
//! the atomic scope checkout and experiment promotion run inside. Dropping a
//! transaction without committing rolls it back.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryCommerceStore, InMemoryTransaction};
pub use postgres::{PostgresCommerceStore, PostgresTransaction};
pub use store::{CommerceStore, CouponOutcomes, StoreTransaction};
