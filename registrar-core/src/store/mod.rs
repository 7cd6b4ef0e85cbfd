//! Catalog store contract.
//!
//! The upsert engine only needs four operations from the store: look up
//! identifiers, insert, update and delete by constraint. Implementations are
//! free to index whatever they like from a [`CatalogEntry`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    iso::IsoSummary,
    record::{BoundingBox, RecordPayload, TemporalExtent},
};

#[cfg(feature = "store-sqlite")]
mod sqlite;

#[cfg(feature = "store-sqlite")]
pub use sqlite::SqliteCatalogStore;

/// Errors reported by catalog store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An insert collided with an existing identifier.
    #[error("record {identifier} already exists")]
    Conflict {
        /// Identifier that already exists.
        identifier: String,
    },
    /// An update targeted an identifier that does not exist.
    #[error("record {identifier} does not exist")]
    NotFound {
        /// Identifier that was not found.
        identifier: String,
    },
    /// A stored value could not be encoded or decoded.
    #[error("failed to encode {field} for record {identifier}: {source}")]
    Encoding {
        /// Identifier of the affected record.
        identifier: String,
        /// Field being encoded.
        field: &'static str,
        /// Serialization failure.
        #[source]
        source: serde_json::Error,
    },
    /// The SQLite backend failed.
    #[cfg(feature = "store-sqlite")]
    #[error("SQLite {operation} failed: {source}")]
    Sqlite {
        /// Operation being performed.
        operation: &'static str,
        /// Error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Any other backend failure.
    #[error("catalog backend failed: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}

/// Filter selecting records to delete.
///
/// Constraints are always rendered as parameterised queries; values are
/// never spliced into SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteConstraint {
    /// Match the record whose identifier equals the value.
    IdentifierEquals(String),
    /// Match every record whose parent identifier equals the value.
    ParentEquals(String),
}

impl DeleteConstraint {
    /// SQL filter with a single `?1` placeholder and its bound value.
    #[must_use]
    pub fn to_sql(&self) -> (&'static str, &str) {
        match self {
            Self::IdentifierEquals(identifier) => ("identifier = ?1", identifier.as_str()),
            Self::ParentEquals(parent) => ("parent_identifier = ?1", parent.as_str()),
        }
    }

    /// Whether `entry` satisfies the constraint.
    #[must_use]
    pub fn matches(&self, entry: &CatalogEntry) -> bool {
        match self {
            Self::IdentifierEquals(expected) => *expected == entry.identifier,
            Self::ParentEquals(expected) => {
                entry.parent_identifier.as_deref() == Some(expected.as_str())
            }
        }
    }
}

/// A record as handed to the catalog store.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    /// Primary key.
    pub identifier: String,
    /// Parent record identifier.
    pub parent_identifier: Option<String>,
    /// Hierarchy level scope code.
    pub record_type: String,
    /// Display title.
    pub title: Option<String>,
    /// Display abstract.
    pub abstract_text: Option<String>,
    /// Geographic extent.
    pub bbox: Option<BoundingBox>,
    /// Start of the temporal extent.
    pub time_begin: Option<String>,
    /// End of the temporal extent.
    pub time_end: Option<String>,
    /// Flattened keywords.
    pub keywords: Vec<String>,
    /// Online resource URLs.
    pub links: Vec<String>,
    /// Serialized record.
    pub payload: RecordPayload,
}

impl CatalogEntry {
    /// Build an entry from the summary of an ISO document and the document itself.
    #[must_use]
    pub fn from_iso(summary: IsoSummary, xml: String) -> Self {
        let (time_begin, time_end) = match summary.temporal {
            Some(TemporalExtent::Instant(instant)) => (Some(instant.clone()), Some(instant)),
            Some(TemporalExtent::Interval { begin, end }) => (Some(begin), end),
            None => (None, None),
        };
        Self {
            identifier: summary.identifier,
            parent_identifier: summary.parent_identifier,
            record_type: summary.hierarchy_level.scope_code().to_owned(),
            title: summary.title,
            abstract_text: summary.abstract_text,
            bbox: summary.bbox,
            time_begin,
            time_end,
            keywords: summary.keywords,
            links: summary.links,
            payload: RecordPayload::IsoXml(xml),
        }
    }
}

/// Persistent catalog of metadata records.
///
/// Implementations must be shareable across threads; the gateway worker and
/// the CLI both hold a store behind an `Arc`.
pub trait CatalogStore: Send + Sync {
    /// Return the subset of `identifiers` present in the store.
    fn query_ids(&self, identifiers: &[&str]) -> Result<Vec<String>, StoreError>;

    /// Insert a new record, failing with [`StoreError::Conflict`] if the
    /// identifier already exists.
    fn insert(
        &self,
        entry: &CatalogEntry,
        source_label: &str,
        inserted_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Replace an existing record.
    fn update(&self, entry: &CatalogEntry) -> Result<(), StoreError>;

    /// Delete every record matching `constraint` and return the row count.
    fn delete(&self, constraint: &DeleteConstraint) -> Result<usize, StoreError>;
}

impl<T: CatalogStore + ?Sized> CatalogStore for Arc<T> {
    fn query_ids(&self, identifiers: &[&str]) -> Result<Vec<String>, StoreError> {
        (**self).query_ids(identifiers)
    }

    fn insert(
        &self,
        entry: &CatalogEntry,
        source_label: &str,
        inserted_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self).insert(entry, source_label, inserted_at)
    }

    fn update(&self, entry: &CatalogEntry) -> Result<(), StoreError> {
        (**self).update(entry)
    }

    fn delete(&self, constraint: &DeleteConstraint) -> Result<usize, StoreError> {
        (**self).delete(constraint)
    }
}
