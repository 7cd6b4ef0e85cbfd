//! Sources from which registration inputs are retrieved.
//!
//! A [`Source`] copies files into local staging storage and lists candidate
//! files under a path. Transfer failures always propagate; nothing here
//! retries.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs_utf8;
use futures_util::TryStreamExt;
use log::debug;
use thiserror::Error;
use tokio_util::io::StreamReader;
use url::Url;

use crate::http::{BlockingHttp, HttpBuildError, HttpConfig};

/// Errors raised while retrieving source files or documents.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransferError {
    /// The server answered with a non-success status.
    #[error("request to {url} failed with HTTP status {status}")]
    Http {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },
    /// The request timed out.
    #[error("request to {url} timed out")]
    Timeout {
        /// Requested URL.
        url: String,
    },
    /// The request failed before a response arrived.
    #[error("request to {url} failed: {source}")]
    Network {
        /// Requested URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// Local filesystem access failed.
    #[error("failed to access {path}: {source}")]
    Io {
        /// Path being accessed.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The location cannot be served by this source.
    #[error("unsupported location {location}")]
    Unsupported {
        /// Rejected path or URL.
        location: String,
    },
}

impl TransferError {
    pub(crate) fn io(path: impl Into<String>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

/// Location that registration inputs are read from.
pub trait Source: Send + Sync {
    /// Copy the file at `path` to the local file `dest`.
    fn get_file(&self, path: &str, dest: &Utf8Path) -> Result<(), TransferError>;

    /// List files at or directly below `path` whose names match `patterns`.
    fn list_files(&self, path: &str, patterns: &[String]) -> Result<Vec<String>, TransferError>;
}

/// Source rooted at a local directory.
///
/// # Examples
///
/// ```no_run
/// use camino::Utf8Path;
/// use registrar_data::source::{LocalSource, Source};
///
/// let source = LocalSource::open(Utf8Path::new("/data/products"))?;
/// let found = source.list_files("S2A.SAFE", &["*.xml".to_owned()])?;
/// # Ok::<(), registrar_data::source::TransferError>(())
/// ```
#[derive(Debug)]
pub struct LocalSource {
    root: fs_utf8::Dir,
    root_path: Utf8PathBuf,
}

impl LocalSource {
    /// Open `root` as the source directory.
    pub fn open(root: &Utf8Path) -> Result<Self, TransferError> {
        let dir = registrar_fs::open_root(root).map_err(TransferError::io(root.as_str()))?;
        Ok(Self {
            root: dir,
            root_path: root.to_path_buf(),
        })
    }

    /// Directory the source is rooted at.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root_path
    }
}

impl Source for LocalSource {
    fn get_file(&self, path: &str, dest: &Utf8Path) -> Result<(), TransferError> {
        let relative = registrar_fs::root_relative(path);
        debug!("copying {relative} from {} to {dest}", self.root_path);
        registrar_fs::copy_from_root(&self.root, relative, dest)
            .map(|_| ())
            .map_err(TransferError::io(path))
    }

    fn list_files(&self, path: &str, patterns: &[String]) -> Result<Vec<String>, TransferError> {
        let relative = registrar_fs::root_relative(path);
        let found = registrar_fs::list_matching(&self.root, relative, patterns)
            .map_err(TransferError::io(path))?;
        Ok(found.into_iter().map(Utf8PathBuf::into_string).collect())
    }
}

/// Source serving files over HTTP(S) below a base URL.
#[derive(Debug)]
pub struct HttpSource {
    base: Url,
    http: BlockingHttp,
}

impl HttpSource {
    /// Create a source resolving relative paths against `base`.
    pub fn new(base: Url) -> Result<Self, HttpBuildError> {
        Self::with_config(base, HttpConfig::default())
    }

    /// Create a source with explicit HTTP configuration.
    pub fn with_config(base: Url, config: HttpConfig) -> Result<Self, HttpBuildError> {
        Ok(Self {
            base: with_trailing_slash(base),
            http: BlockingHttp::new(config)?,
        })
    }

    /// Resolve `path` to an absolute HTTP(S) URL.
    pub fn resolve(&self, path: &str) -> Result<Url, TransferError> {
        let url = if path.contains("://") {
            Url::parse(path)
        } else {
            self.base.join(path.trim_start_matches('/'))
        }
        .map_err(|_| TransferError::Unsupported {
            location: path.to_owned(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            _ => Err(TransferError::Unsupported {
                location: path.to_owned(),
            }),
        }
    }

    async fn download(&self, url: &Url, dest: &Utf8Path) -> Result<u64, TransferError> {
        let response = self.http.get(url.as_str()).await?;
        let stream = response.bytes_stream().map_err(io::Error::other);
        let mut reader = StreamReader::new(stream);
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(TransferError::io(dest.as_str()))?;
        tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(TransferError::io(url.as_str()))
    }
}

impl Source for HttpSource {
    fn get_file(&self, path: &str, dest: &Utf8Path) -> Result<(), TransferError> {
        let url = self.resolve(path)?;
        registrar_fs::ensure_parent_dir(dest).map_err(TransferError::io(dest.as_str()))?;
        let written = self.http.block_on(self.download(&url, dest))?;
        debug!("downloaded {written} bytes from {url} to {dest}");
        Ok(())
    }

    fn list_files(&self, path: &str, patterns: &[String]) -> Result<Vec<String>, TransferError> {
        let url = self.resolve(path)?;
        let name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default();
        Ok(if registrar_fs::matches_any(name, patterns) {
            vec![path.to_owned()]
        } else {
            Vec::new()
        })
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
