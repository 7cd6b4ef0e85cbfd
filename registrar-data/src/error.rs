//! Errors raised by a registration.

use registrar_core::UpsertError;
use thiserror::Error;

use crate::{http::HttpBuildError, normalize::NormalizeError, source::TransferError};

/// Errors raised while registering or deregistering a resource.
///
/// Each variant keeps the failing stage distinguishable: retrieval,
/// mapping, or the catalog write.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistrationError {
    /// Retrieving a source document failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),
    /// A source document could not be mapped onto a record.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    /// Writing to or deleting from the catalog failed.
    #[error(transparent)]
    Upsert(#[from] UpsertError),
    /// An HTTP collaborator could not be built.
    #[error(transparent)]
    Http(#[from] HttpBuildError),
    /// The declared resource type is not supported.
    #[error("unknown resource type `{kind}`")]
    UnknownKind {
        /// Rejected type string.
        kind: String,
    },
    /// An item lacks an asset its adapter requires.
    #[error("item {item} has no `{asset}` asset")]
    MissingAsset {
        /// Item path.
        item: String,
        /// Missing asset key.
        asset: &'static str,
    },
}
