//! Core domain types for the EO metadata registrar.
//!
//! Normalizers build a [`CanonicalRecord`] per source document, the
//! [`iso`] module serializes it, and the [`upsert`] engine writes it into a
//! [`store::CatalogStore`]. Nothing in this crate performs network access.

pub mod iso;
pub mod record;
pub mod store;
pub mod upsert;
pub mod xml;

#[doc(hidden)]
pub mod test_support;

pub use iso::{IsoReadError, IsoSummary, IsoWriteError, parse_iso_summary, to_iso_xml};
pub use record::{
    BoundingBox, BoundingBoxError, CanonicalRecord, Contact, ContactRole, Crs, DEFAULT_LANGUAGE,
    Dimension, DistributionLink, EmptyHierarchyLevel, HierarchyLevel, Instrument, KeywordSet,
    Platform, RecordPayload, TemporalExtent, WCS_RELATION, WGS84_EPSG, WMS_RELATION,
    format_timestamp,
};
pub use store::{CatalogEntry, CatalogStore, DeleteConstraint, StoreError};
pub use upsert::{
    CatalogUpserter, Clock, FixedClock, ReplaceHint, SystemClock, UpsertAction, UpsertError,
};
