//! Retrieval, normalization and registration of EO metadata.
//!
//! Responsibilities:
//! - Retrieve source documents from local or HTTP [`source::Source`]s and
//!   stage them in scoped temporary storage.
//! - Map vendor, STAC, Landsat, CWL and service descriptions onto
//!   [`registrar_core::CanonicalRecord`]s.
//! - Select the adapter for an item, detect remote catalogue protocols and
//!   drive registrations through typed backends.
//!
//! Boundaries:
//! - Record layout, ISO encoding and the upsert policy live in
//!   `registrar-core`.
//! - Blocking callers drive async HTTP through [`http::BlockingHttp`].
//!
//! Invariants:
//! - Normalization is deterministic for a fixed [`normalize::NormalizeContext`].
//! - Staged files never outlive the registration that staged them.

pub mod backend;
pub mod detect;
pub mod dispatch;
mod error;
pub mod http;
pub mod normalize;
pub mod source;
pub mod staging;

#[doc(hidden)]
pub mod test_support;

#[cfg(test)]
#[path = "../tests/support.rs"]
mod fixtures;

pub use backend::{
    Backend, RegistrationBackend, RegistrationOutcome, Registrar, ResourceKind,
};
pub use detect::{HarvestedDescription, detect_and_harvest};
pub use dispatch::{ItemAssets, ItemRegistration, PreparedItem, SourceAdapter, select_adapter};
pub use error::RegistrationError;
pub use http::{HttpBuildError, HttpConfig, HttpFetch, ReqwestFetcher};
pub use normalize::{NormalizeContext, NormalizeError};
pub use source::{HttpSource, LocalSource, Source, TransferError};
pub use staging::Staging;
