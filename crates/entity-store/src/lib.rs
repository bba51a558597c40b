//! Versioned record persistence.
//!
//! Entities are stored as JSON records keyed by `(kind, id)` with a
//! monotonically increasing version per record. Writers declare the version
//! they expect to replace; a mismatch surfaces as a typed conflict so
//! callers can reload and retry.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use record::{Entity, Expected, Version, VersionedRecord};
pub use store::{EntityStore, EntityStoreExt};
