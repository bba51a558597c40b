use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Version number of a stored record, used for optimistic concurrency.
///
/// Version 0 means the record does not exist; the first write produces
/// version 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Version(i64);

impl Version {
    /// Creates a version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a record that does not exist yet (0).
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the version produced by the first write (1).
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// The version a writer expects to replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// The record must not exist yet.
    New,
    /// The record must currently be at exactly this version.
    Version(Version),
    /// No version check; last writer wins.
    Any,
}

/// A stored record along with its concurrency metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedRecord {
    pub id: String,
    pub version: Version,
    pub record: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl VersionedRecord {
    /// Deserializes the record payload into a typed entity.
    pub fn decode<E: DeserializeOwned>(&self) -> Result<E, serde_json::Error> {
        serde_json::from_value(self.record.clone())
    }
}

/// A domain type that can be persisted as a versioned record.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    /// The record kind this entity is stored under.
    const KIND: &'static str;

    /// The record id for this entity instance.
    fn entity_id(&self) -> String;
}
