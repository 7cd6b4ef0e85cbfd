//! Facade crate for the EO metadata registrar.
//!
//! This crate re-exports the canonical record model and upsert engine, and
//! exposes the normalizers, backends and registration gateway behind
//! feature flags.

#![forbid(unsafe_code)]

pub use registrar_core::{
    BoundingBox, CanonicalRecord, CatalogEntry, CatalogStore, CatalogUpserter, Clock,
    DeleteConstraint, DistributionLink, HierarchyLevel, RecordPayload, ReplaceHint, StoreError,
    SystemClock, UpsertAction, UpsertError, parse_iso_summary, to_iso_xml,
};

#[cfg(feature = "store-sqlite")]
pub use registrar_core::store::SqliteCatalogStore;

#[cfg(feature = "data")]
pub use registrar_data::{
    HttpSource, LocalSource, NormalizeContext, NormalizeError, Registrar, RegistrationBackend,
    RegistrationError, RegistrationOutcome, ResourceKind, Source, TransferError,
    detect_and_harvest, select_adapter,
};

#[cfg(feature = "gateway")]
pub use registrar_gateway::{
    AppState, CompletionWaiter, JobQueue, MemoryJobQueue, RegistrationJob, process_next, router,
};

#[cfg(feature = "queue-redis")]
pub use registrar_gateway::RedisJobQueue;
