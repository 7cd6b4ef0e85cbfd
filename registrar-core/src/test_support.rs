//! Test doubles shared across the workspace.

use std::{
    collections::{BTreeMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};

use crate::store::{CatalogEntry, CatalogStore, DeleteConstraint, StoreError};

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<String, (CatalogEntry, String, DateTime<Utc>)>,
    hidden: HashSet<String>,
    fail_writes: bool,
}

/// In-memory [`CatalogStore`] with hooks for simulating races and failures.
#[derive(Debug, Default)]
pub struct MemoryCatalogStore {
    state: Mutex<MemoryState>,
}

impl MemoryCatalogStore {
    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stored entry for `identifier`.
    #[must_use]
    pub fn entry(&self, identifier: &str) -> Option<CatalogEntry> {
        self.state()
            .entries
            .get(identifier)
            .map(|(entry, _, _)| entry.clone())
    }

    /// Source label and timestamp recorded when `identifier` was inserted.
    #[must_use]
    pub fn insert_metadata(&self, identifier: &str) -> Option<(String, DateTime<Utc>)> {
        self.state()
            .entries
            .get(identifier)
            .map(|(_, label, stamp)| (label.clone(), *stamp))
    }

    /// Stored identifiers in lexical order.
    #[must_use]
    pub fn identifiers(&self) -> Vec<String> {
        self.state().entries.keys().cloned().collect()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }

    /// Store `entry` directly, bypassing conflict checks.
    pub fn seed(&self, entry: CatalogEntry) {
        self.state().entries.insert(
            entry.identifier.clone(),
            (entry, "seed".to_owned(), DateTime::<Utc>::UNIX_EPOCH),
        );
    }

    /// Make `identifier` invisible to [`CatalogStore::query_ids`], as if a
    /// concurrent writer inserted it between lookup and insert.
    pub fn hide_from_queries(&self, identifier: &str) {
        self.state().hidden.insert(identifier.to_owned());
    }

    /// Fail every subsequent insert, update and delete.
    pub fn fail_writes(&self) {
        self.state().fail_writes = true;
    }
}

fn injected_failure() -> StoreError {
    StoreError::Backend {
        message: "injected write failure".to_owned(),
    }
}

impl CatalogStore for MemoryCatalogStore {
    fn query_ids(&self, identifiers: &[&str]) -> Result<Vec<String>, StoreError> {
        let state = self.state();
        Ok(identifiers
            .iter()
            .filter(|id| state.entries.contains_key(**id) && !state.hidden.contains(**id))
            .map(|id| (*id).to_owned())
            .collect())
    }

    fn insert(
        &self,
        entry: &CatalogEntry,
        source_label: &str,
        inserted_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(injected_failure());
        }
        if state.entries.contains_key(&entry.identifier) {
            return Err(StoreError::Conflict {
                identifier: entry.identifier.clone(),
            });
        }
        state.entries.insert(
            entry.identifier.clone(),
            (entry.clone(), source_label.to_owned(), inserted_at),
        );
        Ok(())
    }

    fn update(&self, entry: &CatalogEntry) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(injected_failure());
        }
        let Some(slot) = state.entries.get_mut(&entry.identifier) else {
            return Err(StoreError::NotFound {
                identifier: entry.identifier.clone(),
            });
        };
        slot.0 = entry.clone();
        Ok(())
    }

    fn delete(&self, constraint: &DeleteConstraint) -> Result<usize, StoreError> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(injected_failure());
        }
        let before = state.entries.len();
        state.entries.retain(|_, (entry, _, _)| !constraint.matches(entry));
        Ok(before.saturating_sub(state.entries.len()))
    }
}
