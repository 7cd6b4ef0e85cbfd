//! Idempotent catalog upserts and identifier-reconciling deletes.
//!
//! Every write follows the same sequence: serialize the record, parse the
//! serialized form back, look the identifier up and then update or insert.
//! The lookup and the write are not transactional, so an insert that loses a
//! race to a concurrent writer is retried once as an update.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    iso::{IsoReadError, IsoWriteError, parse_iso_summary, to_iso_xml},
    record::{CanonicalRecord, RecordPayload},
    store::{CatalogEntry, CatalogStore, DeleteConstraint, StoreError},
};

/// Packaging suffix probed when a delete finds no exact identifier match.
pub const PACKAGING_SUFFIX: &str = ".SAFE";

/// Source label recorded with every insert.
pub const DEFAULT_SOURCE_LABEL: &str = "local";

/// Legacy replace flag accepted by [`CatalogUpserter::upsert`].
///
/// The upserter always checks for an existing record and updates it, so the
/// hint no longer changes behaviour. It is kept so that callers written
/// against the insert-then-update policy keep compiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplaceHint {
    /// Overwrite an existing record.
    #[default]
    Replace,
    /// Historically: leave an existing record untouched.
    Keep,
}

/// Source of insert timestamps.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Errors raised by [`CatalogUpserter`], tagged with the failing stage.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UpsertError {
    /// The record could not be serialized.
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] IsoWriteError),
    /// The serialized payload is not a well-formed catalog record.
    #[error("failed to parse serialized record: {0}")]
    Parse(#[from] IsoReadError),
    /// A JSON payload has no usable identifier.
    #[error("JSON payload has no string `id` field")]
    MissingJsonIdentifier,
    /// Looking up existing identifiers failed.
    #[error("failed to query catalog for {identifier}: {source}")]
    Query {
        /// Identifier being looked up.
        identifier: String,
        /// Store failure.
        #[source]
        source: StoreError,
    },
    /// Inserting or updating failed.
    #[error("failed to write record {identifier}: {source}")]
    Write {
        /// Identifier being written.
        identifier: String,
        /// Store failure.
        #[source]
        source: StoreError,
    },
    /// Deleting failed.
    #[error("failed to delete record {identifier}: {source}")]
    Delete {
        /// Identifier being deleted.
        identifier: String,
        /// Store failure.
        #[source]
        source: StoreError,
    },
}

/// Whether an upsert created or replaced its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    /// No record existed; one was inserted.
    Inserted,
    /// An existing record was replaced.
    Updated,
}

/// Writes records into a [`CatalogStore`].
///
/// # Examples
///
/// ```
/// use registrar_core::{
///     CanonicalRecord, HierarchyLevel,
///     store::SqliteCatalogStore,
///     upsert::{CatalogUpserter, ReplaceHint, UpsertAction},
/// };
///
/// let store = SqliteCatalogStore::open_in_memory().expect("open store");
/// let upserter = CatalogUpserter::new(store);
/// let record = CanonicalRecord::new("S2A_TILE", HierarchyLevel::Dataset, "2024-01-01T00:00:00Z");
///
/// let first = upserter.upsert(&record, ReplaceHint::Replace).expect("insert");
/// let second = upserter.upsert(&record, ReplaceHint::Replace).expect("update");
/// assert_eq!(first, UpsertAction::Inserted);
/// assert_eq!(second, UpsertAction::Updated);
/// ```
#[derive(Debug)]
pub struct CatalogUpserter<S, C = SystemClock> {
    store: S,
    clock: C,
    source_label: String,
}

impl<S: CatalogStore> CatalogUpserter<S> {
    /// Create an upserter stamping inserts with the wall clock.
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: SystemClock,
            source_label: DEFAULT_SOURCE_LABEL.to_owned(),
        }
    }
}

impl<S: CatalogStore, C: Clock> CatalogUpserter<S, C> {
    /// Replace the clock used for insert timestamps.
    #[must_use]
    pub fn with_clock<D: Clock>(self, clock: D) -> CatalogUpserter<S, D> {
        CatalogUpserter {
            store: self.store,
            clock,
            source_label: self.source_label,
        }
    }

    /// Override the source label stored with inserts.
    #[must_use]
    pub fn with_source_label(mut self, label: impl Into<String>) -> Self {
        self.source_label = label.into();
        self
    }

    /// Borrow the underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Serialize `record` as ISO XML and upsert it.
    pub fn upsert(
        &self,
        record: &CanonicalRecord,
        hint: ReplaceHint,
    ) -> Result<UpsertAction, UpsertError> {
        let xml = to_iso_xml(record)?;
        self.upsert_payload(RecordPayload::IsoXml(xml), hint)
    }

    /// Upsert an already-serialized payload.
    pub fn upsert_payload(
        &self,
        payload: RecordPayload,
        hint: ReplaceHint,
    ) -> Result<UpsertAction, UpsertError> {
        self.upsert_entry(&CatalogEntry::try_from(payload)?, hint)
    }

    /// Upsert an entry built from an already-parsed payload.
    pub fn upsert_entry(
        &self,
        entry: &CatalogEntry,
        hint: ReplaceHint,
    ) -> Result<UpsertAction, UpsertError> {
        if hint == ReplaceHint::Keep {
            debug!(
                "replace hint `keep` for {} is superseded by existence-checked upserts",
                entry.identifier
            );
        }
        self.write(entry)
    }

    /// Whether a record with `identifier` exists.
    pub fn exists(&self, identifier: &str) -> Result<bool, UpsertError> {
        let found = self
            .store
            .query_ids(&[identifier])
            .map_err(|source| UpsertError::Query {
                identifier: identifier.to_owned(),
                source,
            })?;
        Ok(!found.is_empty())
    }

    /// Delete `identifier`, falling back to its packaged form.
    ///
    /// Returns the number of records removed; zero when neither form exists.
    pub fn delete(&self, identifier: &str) -> Result<usize, UpsertError> {
        let target = if self.exists(identifier)? {
            identifier.to_owned()
        } else {
            let packaged = format!("{identifier}{PACKAGING_SUFFIX}");
            if !self.exists(&packaged)? {
                info!("no catalog record for {identifier} or {packaged}");
                return Ok(0);
            }
            packaged
        };
        let removed = self
            .store
            .delete(&DeleteConstraint::IdentifierEquals(target.clone()))
            .map_err(|source| UpsertError::Delete {
                identifier: target.clone(),
                source,
            })?;
        info!("deleted {removed} record(s) for {target}");
        Ok(removed)
    }

    /// Delete every record whose parent is `parent`.
    pub fn delete_children(&self, parent: &str) -> Result<usize, UpsertError> {
        let removed = self
            .store
            .delete(&DeleteConstraint::ParentEquals(parent.to_owned()))
            .map_err(|source| UpsertError::Delete {
                identifier: parent.to_owned(),
                source,
            })?;
        info!("deleted {removed} child record(s) of {parent}");
        Ok(removed)
    }

    fn write(&self, entry: &CatalogEntry) -> Result<UpsertAction, UpsertError> {
        if self.exists(&entry.identifier)? {
            self.update(entry)?;
            return Ok(UpsertAction::Updated);
        }
        match self
            .store
            .insert(entry, &self.source_label, self.clock.now())
        {
            Ok(()) => {
                info!("inserted record {}", entry.identifier);
                Ok(UpsertAction::Inserted)
            }
            Err(StoreError::Conflict { .. }) => {
                warn!(
                    "record {} appeared during upsert; retrying as update",
                    entry.identifier
                );
                self.update(entry)?;
                Ok(UpsertAction::Updated)
            }
            Err(source) => Err(UpsertError::Write {
                identifier: entry.identifier.clone(),
                source,
            }),
        }
    }

    fn update(&self, entry: &CatalogEntry) -> Result<(), UpsertError> {
        self.store
            .update(entry)
            .map_err(|source| UpsertError::Write {
                identifier: entry.identifier.clone(),
                source,
            })?;
        info!("updated record {}", entry.identifier);
        Ok(())
    }
}

impl TryFrom<RecordPayload> for CatalogEntry {
    type Error = UpsertError;

    /// Index a serialized payload.
    ///
    /// ISO payloads are parsed to recover the identifier and indexed fields;
    /// JSON payloads must carry a string `id`.
    fn try_from(payload: RecordPayload) -> Result<Self, Self::Error> {
        match payload {
            RecordPayload::IsoXml(xml) => {
                let summary = parse_iso_summary(&xml)?;
                Ok(Self::from_iso(summary, xml))
            }
            RecordPayload::Json(value) => json_entry(value),
        }
    }
}

fn json_entry(value: serde_json::Value) -> Result<CatalogEntry, UpsertError> {
    let text = |key: &str| value.get(key).and_then(|v| v.as_str()).map(str::to_owned);
    let identifier = text("id").ok_or(UpsertError::MissingJsonIdentifier)?;
    let title = text("title");
    let abstract_text = text("description");
    let record_type = text("type").unwrap_or_else(|| "dataset".to_owned());
    Ok(CatalogEntry {
        identifier,
        parent_identifier: text("collection"),
        record_type,
        title,
        abstract_text,
        bbox: None,
        time_begin: None,
        time_end: None,
        keywords: Vec::new(),
        links: Vec::new(),
        payload: RecordPayload::Json(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{record::HierarchyLevel, test_support::MemoryCatalogStore};
    use chrono::TimeZone;
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn upserter() -> CatalogUpserter<MemoryCatalogStore, FixedClock> {
        let stamp = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .expect("valid timestamp");
        CatalogUpserter::new(MemoryCatalogStore::default()).with_clock(FixedClock(stamp))
    }

    fn record(identifier: &str, title: &str) -> CanonicalRecord {
        let mut record =
            CanonicalRecord::new(identifier, HierarchyLevel::Dataset, "2024-01-01T00:00:00Z");
        record.title = Some(title.into());
        record
    }

    #[rstest]
    fn second_upsert_updates(upserter: CatalogUpserter<MemoryCatalogStore, FixedClock>) {
        upserter
            .upsert(&record("a", "first"), ReplaceHint::Replace)
            .expect("insert");
        let action = upserter
            .upsert(&record("a", "second"), ReplaceHint::Keep)
            .expect("update");
        assert_eq!(action, UpsertAction::Updated);
        let stored = upserter.store().entry("a").expect("stored");
        assert_eq!(stored.title.as_deref(), Some("second"));
        assert_eq!(upserter.store().len(), 1);
    }

    #[rstest]
    fn conflicting_insert_is_retried_as_update(
        upserter: CatalogUpserter<MemoryCatalogStore, FixedClock>,
    ) {
        upserter.store().hide_from_queries("a");
        upserter
            .store()
            .seed(CatalogEntry::from_iso(
                parse_iso_summary(&to_iso_xml(&record("a", "old")).expect("xml")).expect("parse"),
                String::new(),
            ));
        let action = upserter
            .upsert(&record("a", "new"), ReplaceHint::Replace)
            .expect("retry as update");
        assert_eq!(action, UpsertAction::Updated);
        let stored = upserter.store().entry("a").expect("stored");
        assert_eq!(stored.title.as_deref(), Some("new"));
    }

    #[rstest]
    fn insert_records_source_label_and_clock(
        upserter: CatalogUpserter<MemoryCatalogStore, FixedClock>,
    ) {
        let upserter = upserter.with_source_label("harvest");
        upserter
            .upsert(&record("a", "A"), ReplaceHint::Replace)
            .expect("insert");
        let (label, stamp) = upserter.store().insert_metadata("a").expect("metadata");
        assert_eq!(label, "harvest");
        assert_eq!(stamp.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[rstest]
    fn malformed_payload_reports_parse_stage(
        upserter: CatalogUpserter<MemoryCatalogStore, FixedClock>,
    ) {
        let err = upserter
            .upsert_payload(RecordPayload::IsoXml("<gmd:MD_Metadata>".into()), ReplaceHint::Replace)
            .expect_err("malformed");
        assert!(matches!(err, UpsertError::Parse(_)));
        assert!(upserter.store().is_empty());
    }

    #[rstest]
    fn store_failures_report_write_stage(
        upserter: CatalogUpserter<MemoryCatalogStore, FixedClock>,
    ) {
        upserter.store().fail_writes();
        let err = upserter
            .upsert(&record("a", "A"), ReplaceHint::Replace)
            .expect_err("write failure");
        assert!(matches!(err, UpsertError::Write { .. }));
    }

    #[rstest]
    fn delete_falls_back_to_packaged_identifier(
        upserter: CatalogUpserter<MemoryCatalogStore, FixedClock>,
    ) {
        upserter
            .upsert(&record("X.SAFE", "packaged"), ReplaceHint::Replace)
            .expect("insert");
        assert_eq!(upserter.delete("X").expect("delete"), 1);
        assert!(upserter.store().is_empty());
    }

    #[rstest]
    fn delete_prefers_exact_identifier(upserter: CatalogUpserter<MemoryCatalogStore, FixedClock>) {
        for id in ["X", "X.SAFE"] {
            upserter
                .upsert(&record(id, id), ReplaceHint::Replace)
                .expect("insert");
        }
        assert_eq!(upserter.delete("X").expect("delete"), 1);
        assert!(upserter.exists("X.SAFE").expect("query"));
    }

    #[rstest]
    fn delete_of_unknown_identifier_removes_nothing(
        upserter: CatalogUpserter<MemoryCatalogStore, FixedClock>,
    ) {
        assert_eq!(upserter.delete("ghost").expect("delete"), 0);
    }

    #[rstest]
    fn indexed_payload_is_upserted_as_parsed(
        upserter: CatalogUpserter<MemoryCatalogStore, FixedClock>,
    ) {
        let mut child = record("svc/processes/echo", "Echo");
        child.parent_identifier = Some("svc".into());
        let xml = to_iso_xml(&child).expect("xml");
        let entry = CatalogEntry::try_from(RecordPayload::IsoXml(xml)).expect("index");
        assert_eq!(entry.identifier, "svc/processes/echo");
        assert_eq!(entry.parent_identifier.as_deref(), Some("svc"));

        let action = upserter
            .upsert_entry(&entry, ReplaceHint::Replace)
            .expect("insert");
        assert_eq!(action, UpsertAction::Inserted);
        assert_eq!(upserter.store().entry("svc/processes/echo"), Some(entry));
    }

    #[rstest]
    fn children_are_deleted_by_parent(upserter: CatalogUpserter<MemoryCatalogStore, FixedClock>) {
        let mut child = record("svc/processes/echo", "Echo");
        child.parent_identifier = Some("svc".into());
        for record in [record("svc", "Service"), child, record("other", "Other")] {
            upserter
                .upsert(&record, ReplaceHint::Replace)
                .expect("insert");
        }
        assert_eq!(upserter.delete_children("svc").expect("delete"), 1);
        assert_eq!(upserter.store().identifiers(), vec!["other".to_owned(), "svc".to_owned()]);
    }

    #[rstest]
    fn json_payload_requires_identifier(upserter: CatalogUpserter<MemoryCatalogStore, FixedClock>) {
        let err = upserter
            .upsert_payload(RecordPayload::Json(json!({"title": "x"})), ReplaceHint::Replace)
            .expect_err("missing id");
        assert!(matches!(err, UpsertError::MissingJsonIdentifier));

        let action = upserter
            .upsert_payload(
                RecordPayload::Json(json!({"id": "j", "title": "J"})),
                ReplaceHint::Replace,
            )
            .expect("insert");
        assert_eq!(action, UpsertAction::Inserted);
    }
}
