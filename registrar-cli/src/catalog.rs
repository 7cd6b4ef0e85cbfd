//! Catalog and source wiring shared by the registration subcommands.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::DateTime;
use registrar_core::store::SqliteCatalogStore;
use registrar_data::{
    HttpSource, LocalSource, NormalizeContext, Registrar, ReqwestFetcher, Source,
};
use url::Url;

use crate::{ARG_SOURCE_URL, CliError};

/// Catalog database used when none is configured.
pub(crate) const DEFAULT_DATABASE: &str = "catalog.db";

/// Where registration inputs are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SourceLocation {
    /// A local directory.
    Local(Utf8PathBuf),
    /// An HTTP(S) base URL.
    Http(Url),
}

impl SourceLocation {
    /// Prefer `url` when given, otherwise the local `root` (default `.`).
    pub(crate) fn resolve(
        root: Option<Utf8PathBuf>,
        url: Option<String>,
    ) -> Result<Self, CliError> {
        match url {
            Some(value) => Url::parse(&value).map(Self::Http).map_err(|source| {
                CliError::InvalidUrl {
                    field: ARG_SOURCE_URL,
                    value,
                    source,
                }
            }),
            None => Ok(Self::Local(root.unwrap_or_else(|| Utf8PathBuf::from(".")))),
        }
    }

    fn open(&self) -> Result<Box<dyn Source>, CliError> {
        Ok(match self {
            Self::Local(root) => Box::new(LocalSource::open(root).map_err(CliError::OpenSource)?),
            Self::Http(base) => Box::new(HttpSource::new(base.clone())?),
        })
    }
}

/// Resolved settings for opening a [`Registrar`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CatalogConfig {
    /// SQLite catalog database.
    pub(crate) database: Utf8PathBuf,
    /// Registration input location.
    pub(crate) source: SourceLocation,
    /// Base URL for distribution links.
    pub(crate) base_url: Option<String>,
    /// Map and coverage service endpoint.
    pub(crate) ows_url: Option<String>,
    /// Public base URL of registered documents.
    pub(crate) public_url: Option<String>,
    /// Known collection identifiers.
    pub(crate) collections: Vec<String>,
}

impl CatalogConfig {
    /// Collect resolved options, defaulting the database to `catalog.db`.
    pub(crate) fn new(
        database: Option<Utf8PathBuf>,
        source: SourceLocation,
        base_url: Option<String>,
        ows_url: Option<String>,
        public_url: Option<String>,
        collections: Vec<String>,
    ) -> Self {
        Self {
            database: database.unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DATABASE)),
            source,
            base_url,
            ows_url,
            public_url,
            collections,
        }
    }

    /// Normalization settings without a pinned time; the registrar
    /// refreshes `now` for every registration.
    pub(crate) fn context(&self) -> NormalizeContext {
        let mut ctx = NormalizeContext::new(DateTime::UNIX_EPOCH)
            .with_collections(self.collections.iter().cloned());
        ctx.base_url.clone_from(&self.base_url);
        ctx.ows_url.clone_from(&self.ows_url);
        ctx.public_url.clone_from(&self.public_url);
        ctx
    }

    /// Open the catalog and source and assemble a registrar.
    pub(crate) fn open(&self) -> Result<Registrar<SqliteCatalogStore>, CliError> {
        let store = open_store(&self.database)?;
        let source = self.source.open()?;
        let fetcher = Box::new(ReqwestFetcher::new()?);
        Ok(Registrar::new(store, source, fetcher, self.context()))
    }
}

fn open_store(path: &Utf8Path) -> Result<SqliteCatalogStore, CliError> {
    SqliteCatalogStore::open(path).map_err(|source| CliError::OpenCatalog {
        path: path.to_path_buf(),
        source,
    })
}
