//! Error types emitted by the registrar CLI.
//!
//! Keep this error type reasonably small, as many CLI helpers return
//! `Result<_, CliError>` and the workspace enables `clippy::result_large_err`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use registrar_core::{IsoWriteError, StoreError};
use registrar_data::{HttpBuildError, RegistrationError, TransferError};
use registrar_gateway::QueueError;
use thiserror::Error;

/// Errors emitted by the registrar CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// The requested operation requires a missing compile-time feature.
    #[error("{action} requires the `{feature}` feature to be enabled")]
    MissingFeature {
        feature: &'static str,
        action: &'static str,
    },
    /// A duration option is negative or not finite.
    #[error("{field} must be a non-negative number of seconds, got {value}")]
    InvalidDuration { field: &'static str, value: f64 },
    /// A URL option could not be parsed.
    #[error("{field} is not a valid URL ({value:?}): {source}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
    /// Opening the catalog database failed.
    #[error("failed to open catalog at {path:?}: {source}")]
    OpenCatalog {
        path: Utf8PathBuf,
        #[source]
        source: StoreError,
    },
    /// Opening the local source directory failed.
    #[error("failed to open source: {0}")]
    OpenSource(#[source] TransferError),
    /// Constructing an HTTP client failed.
    #[error(transparent)]
    BuildHttp(#[from] HttpBuildError),
    /// Registering or deregistering a resource failed.
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    /// No catalogue protocol answered at the harvested URL.
    #[error("no supported catalogue protocol answered at {url}")]
    NotHarvested { url: String },
    /// Encoding a harvested record as ISO XML failed.
    #[error("failed to encode harvested record: {0}")]
    EncodeIso(#[source] IsoWriteError),
    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
    /// Starting the async runtime failed.
    #[error("failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// Binding the gateway listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// The gateway stopped with an IO error.
    #[error("gateway failed: {0}")]
    Serve(#[source] std::io::Error),
    /// The job queue could not be reached.
    #[error(transparent)]
    Queue(#[from] QueueError),
}
