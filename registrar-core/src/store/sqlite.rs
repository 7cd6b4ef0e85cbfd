//! SQLite-backed catalog store.

use std::{
    fmt,
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, params, params_from_iter};
use serde::Serialize;

use crate::record::{RecordPayload, format_timestamp};

use super::{CatalogEntry, CatalogStore, DeleteConstraint, StoreError};

/// SQLite limits bound parameters per statement to 999 by default. Identifier
/// lookups are chunked to remain below that ceiling.
const SQLITE_MAX_VARIABLE_NUMBER: usize = 999;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS records (
    identifier TEXT PRIMARY KEY NOT NULL,
    parent_identifier TEXT,
    record_type TEXT NOT NULL,
    title TEXT,
    abstract TEXT,
    min_x REAL,
    min_y REAL,
    max_x REAL,
    max_y REAL,
    time_begin TEXT,
    time_end TEXT,
    keywords TEXT NOT NULL,
    links TEXT NOT NULL,
    payload_format TEXT NOT NULL,
    payload TEXT NOT NULL,
    source TEXT NOT NULL,
    inserted_at TEXT NOT NULL
)";

/// Catalog store persisting records into a single SQLite table.
///
/// # Examples
///
/// ```
/// use registrar_core::store::{CatalogStore, DeleteConstraint, SqliteCatalogStore};
///
/// let store = SqliteCatalogStore::open_in_memory().expect("open store");
/// assert!(store.query_ids(&["missing"]).expect("query").is_empty());
/// let removed = store
///     .delete(&DeleteConstraint::IdentifierEquals("missing".into()))
///     .expect("delete");
/// assert_eq!(removed, 0);
/// ```
pub struct SqliteCatalogStore {
    connection: Mutex<Connection>,
}

impl fmt::Debug for SqliteCatalogStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteCatalogStore").finish_non_exhaustive()
    }
}

impl SqliteCatalogStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let connection = Connection::open(path).map_err(sqlite("open database"))?;
        Self::from_connection(connection)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory().map_err(sqlite("open database"))?;
        Self::from_connection(connection)
    }

    fn from_connection(connection: Connection) -> Result<Self, StoreError> {
        connection
            .execute(SCHEMA, [])
            .map_err(sqlite("initialise schema"))?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn connection(&self) -> MutexGuard<'_, Connection> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the stored payload for `identifier`.
    pub fn payload(&self, identifier: &str) -> Result<Option<RecordPayload>, StoreError> {
        let connection = self.connection();
        let mut statement = connection
            .prepare_cached("SELECT payload_format, payload FROM records WHERE identifier = ?1")
            .map_err(sqlite("prepare payload lookup"))?;
        let mut rows = statement
            .query([identifier])
            .map_err(sqlite("load payload"))?;
        let Some(row) = rows.next().map_err(sqlite("load payload"))? else {
            return Ok(None);
        };
        let format: String = row.get(0).map_err(sqlite("read payload format"))?;
        let body: String = row.get(1).map_err(sqlite("read payload"))?;
        if format == "json" {
            let value = serde_json::from_str(&body).map_err(|source| StoreError::Encoding {
                identifier: identifier.to_owned(),
                field: "payload",
                source,
            })?;
            return Ok(Some(RecordPayload::Json(value)));
        }
        Ok(Some(RecordPayload::IsoXml(body)))
    }
}

impl CatalogStore for SqliteCatalogStore {
    fn query_ids(&self, identifiers: &[&str]) -> Result<Vec<String>, StoreError> {
        let connection = self.connection();
        let mut found = Vec::new();
        for chunk in identifiers.chunks(SQLITE_MAX_VARIABLE_NUMBER) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let query =
                format!("SELECT identifier FROM records WHERE identifier IN ({placeholders})");
            let mut statement = connection
                .prepare(&query)
                .map_err(sqlite("prepare identifier lookup"))?;
            let rows = statement
                .query_map(params_from_iter(chunk.iter()), |row| row.get::<_, String>(0))
                .map_err(sqlite("query identifiers"))?;
            for row in rows {
                found.push(row.map_err(sqlite("read identifier"))?);
            }
        }
        Ok(found)
    }

    fn insert(
        &self,
        entry: &CatalogEntry,
        source_label: &str,
        inserted_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let columns = EncodedEntry::new(entry)?;
        let connection = self.connection();
        let mut statement = connection
            .prepare_cached(
                "INSERT INTO records (
                    identifier, parent_identifier, record_type, title, abstract,
                    min_x, min_y, max_x, max_y, time_begin, time_end,
                    keywords, links, payload_format, payload, source, inserted_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            )
            .map_err(sqlite("prepare insert"))?;
        let result = statement.execute(params![
            entry.identifier,
            entry.parent_identifier,
            entry.record_type,
            entry.title,
            entry.abstract_text,
            columns.bounds.map(|b| b[0]),
            columns.bounds.map(|b| b[1]),
            columns.bounds.map(|b| b[2]),
            columns.bounds.map(|b| b[3]),
            entry.time_begin,
            entry.time_end,
            columns.keywords,
            columns.links,
            entry.payload.format(),
            columns.payload,
            source_label,
            format_timestamp(&inserted_at),
        ]);
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Conflict {
                    identifier: entry.identifier.clone(),
                })
            }
            Err(source) => Err(StoreError::Sqlite {
                operation: "insert record",
                source,
            }),
        }
    }

    fn update(&self, entry: &CatalogEntry) -> Result<(), StoreError> {
        let columns = EncodedEntry::new(entry)?;
        let connection = self.connection();
        let mut statement = connection
            .prepare_cached(
                "UPDATE records SET
                    parent_identifier = ?2, record_type = ?3, title = ?4, abstract = ?5,
                    min_x = ?6, min_y = ?7, max_x = ?8, max_y = ?9,
                    time_begin = ?10, time_end = ?11, keywords = ?12, links = ?13,
                    payload_format = ?14, payload = ?15
                WHERE identifier = ?1",
            )
            .map_err(sqlite("prepare update"))?;
        let changed = statement
            .execute(params![
                entry.identifier,
                entry.parent_identifier,
                entry.record_type,
                entry.title,
                entry.abstract_text,
                columns.bounds.map(|b| b[0]),
                columns.bounds.map(|b| b[1]),
                columns.bounds.map(|b| b[2]),
                columns.bounds.map(|b| b[3]),
                entry.time_begin,
                entry.time_end,
                columns.keywords,
                columns.links,
                entry.payload.format(),
                columns.payload,
            ])
            .map_err(sqlite("update record"))?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                identifier: entry.identifier.clone(),
            });
        }
        Ok(())
    }

    fn delete(&self, constraint: &DeleteConstraint) -> Result<usize, StoreError> {
        let (filter, value) = constraint.to_sql();
        let query = format!("DELETE FROM records WHERE {filter}");
        let connection = self.connection();
        let mut statement = connection
            .prepare_cached(&query)
            .map_err(sqlite("prepare delete"))?;
        statement.execute([value]).map_err(sqlite("delete records"))
    }
}

struct EncodedEntry {
    bounds: Option<[f64; 4]>,
    keywords: String,
    links: String,
    payload: String,
}

impl EncodedEntry {
    fn new(entry: &CatalogEntry) -> Result<Self, StoreError> {
        let payload = match &entry.payload {
            RecordPayload::IsoXml(xml) => xml.clone(),
            RecordPayload::Json(value) => encode(entry, "payload", value)?,
        };
        Ok(Self {
            bounds: entry
                .bbox
                .as_ref()
                .map(|bbox| [bbox.min_x(), bbox.min_y(), bbox.max_x(), bbox.max_y()]),
            keywords: encode(entry, "keywords", &entry.keywords)?,
            links: encode(entry, "links", &entry.links)?,
            payload,
        })
    }
}

fn encode<T: Serialize + ?Sized>(
    entry: &CatalogEntry,
    field: &'static str,
    value: &T,
) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Encoding {
        identifier: entry.identifier.clone(),
        field,
        source,
    })
}

fn sqlite(operation: &'static str) -> impl Fn(rusqlite::Error) -> StoreError {
    move |source| StoreError::Sqlite { operation, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::BoundingBox;
    use rstest::{fixture, rstest};
    use serde_json::json;
    use tempfile::TempDir;

    fn entry(identifier: &str, title: &str) -> CatalogEntry {
        CatalogEntry {
            identifier: identifier.into(),
            parent_identifier: None,
            record_type: "dataset".into(),
            title: Some(title.into()),
            abstract_text: None,
            bbox: Some(BoundingBox::from_corners(1.0, 2.0, 3.0, 4.0)),
            time_begin: Some("2020-01-01T00:00:00Z".into()),
            time_end: None,
            keywords: vec!["optical".into()],
            links: vec![],
            payload: RecordPayload::IsoXml(format!("<title>{title}</title>")),
        }
    }

    #[fixture]
    fn store() -> SqliteCatalogStore {
        SqliteCatalogStore::open_in_memory().expect("open in-memory store")
    }

    #[rstest]
    fn insert_then_query(store: SqliteCatalogStore) {
        store
            .insert(&entry("a", "A"), "local", Utc::now())
            .expect("insert");
        let found = store.query_ids(&["a", "b"]).expect("query");
        assert_eq!(found, vec!["a".to_owned()]);
    }

    #[rstest]
    fn duplicate_insert_conflicts(store: SqliteCatalogStore) {
        store
            .insert(&entry("a", "A"), "local", Utc::now())
            .expect("insert");
        let err = store
            .insert(&entry("a", "B"), "local", Utc::now())
            .expect_err("duplicate");
        assert!(matches!(err, StoreError::Conflict { identifier } if identifier == "a"));
    }

    #[rstest]
    fn update_replaces_payload(store: SqliteCatalogStore) {
        store
            .insert(&entry("a", "A"), "local", Utc::now())
            .expect("insert");
        store.update(&entry("a", "B")).expect("update");
        let payload = store.payload("a").expect("load").expect("present");
        assert_eq!(payload, RecordPayload::IsoXml("<title>B</title>".into()));
    }

    #[rstest]
    fn update_of_missing_record_fails(store: SqliteCatalogStore) {
        let err = store.update(&entry("ghost", "G")).expect_err("missing");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[rstest]
    fn delete_is_parameterised(store: SqliteCatalogStore) {
        store
            .insert(&entry("a", "A"), "local", Utc::now())
            .expect("insert");
        let hostile = DeleteConstraint::IdentifierEquals("a' OR '1'='1".into());
        assert_eq!(store.delete(&hostile).expect("delete"), 0);
        let exact = DeleteConstraint::IdentifierEquals("a".into());
        assert_eq!(store.delete(&exact).expect("delete"), 1);
        assert!(store.query_ids(&["a"]).expect("query").is_empty());
    }

    #[rstest]
    fn delete_by_parent_keeps_other_records(store: SqliteCatalogStore) {
        let mut child = entry("svc/processes/ndvi", "NDVI");
        child.parent_identifier = Some("svc".into());
        for record in [entry("svc", "Service"), child, entry("other", "Other")] {
            store.insert(&record, "local", Utc::now()).expect("insert");
        }
        let removed = store
            .delete(&DeleteConstraint::ParentEquals("svc".into()))
            .expect("delete");
        assert_eq!(removed, 1);
        let mut left = store
            .query_ids(&["svc", "svc/processes/ndvi", "other"])
            .expect("query");
        left.sort();
        assert_eq!(left, vec!["other".to_owned(), "svc".to_owned()]);
    }

    #[rstest]
    fn json_payload_round_trips(store: SqliteCatalogStore) {
        let mut json_entry = entry("j", "J");
        json_entry.payload = RecordPayload::Json(json!({"id": "j"}));
        store
            .insert(&json_entry, "local", Utc::now())
            .expect("insert");
        let payload = store.payload("j").expect("load");
        assert_eq!(payload, Some(RecordPayload::Json(json!({"id": "j"}))));
    }

    #[rstest]
    fn persists_to_disk() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("catalog.db");
        {
            let store = SqliteCatalogStore::open(&path).expect("open");
            store
                .insert(&entry("a", "A"), "local", Utc::now())
                .expect("insert");
        }
        let reopened = SqliteCatalogStore::open(&path).expect("reopen");
        assert_eq!(reopened.query_ids(&["a"]).expect("query"), vec!["a"]);
    }
}
