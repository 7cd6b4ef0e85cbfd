//! Test doubles for sources, HTTP fetchers and clocks.

use std::{
    collections::BTreeMap,
    io,
    sync::{Mutex, MutexGuard, PoisonError},
};

use camino::Utf8Path;
use chrono::{DateTime, TimeZone, Utc};

use crate::{
    http::{Fetched, HttpFetch},
    normalize::NormalizeContext,
    source::{Source, TransferError},
};

/// Instant every test context is pinned to: `2024-05-02T08:00:00Z`.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Empty context pinned to [`fixed_now`].
#[must_use]
pub fn fixed_context() -> NormalizeContext {
    NormalizeContext::new(fixed_now())
}

/// In-memory [`Source`] serving files from a path-to-content map.
#[derive(Debug, Clone, Default)]
pub struct StubSource {
    files: BTreeMap<String, String>,
}

impl StubSource {
    /// Serve `content` at `path`.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

impl Source for StubSource {
    fn get_file(&self, path: &str, dest: &Utf8Path) -> Result<(), TransferError> {
        let content = self.files.get(path).ok_or_else(|| TransferError::Io {
            path: path.to_owned(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such stub file"),
        })?;
        registrar_fs::write_file(dest, content).map_err(TransferError::io(dest.as_str()))
    }

    fn list_files(&self, path: &str, patterns: &[String]) -> Result<Vec<String>, TransferError> {
        if self.files.contains_key(path) {
            return Ok(vec![path.to_owned()]);
        }
        let prefix = format!("{}/", path.trim_end_matches('/'));
        Ok(self
            .files
            .keys()
            .filter_map(|key| {
                let name = key.strip_prefix(&prefix)?;
                (!name.contains('/') && registrar_fs::matches_any(name, patterns))
                    .then(|| key.clone())
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
enum StubResponse {
    Body {
        content_type: Option<String>,
        body: String,
    },
    Status(u16),
    Timeout,
}

/// [`HttpFetch`] double answering from canned responses.
///
/// Unknown URLs answer with HTTP 404. Every requested URL is recorded.
#[derive(Debug, Default)]
pub struct StubFetcher {
    responses: BTreeMap<String, StubResponse>,
    requests: Mutex<Vec<String>>,
}

impl StubFetcher {
    /// Answer `url` with `body`.
    #[must_use]
    pub fn with_body(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.responses.insert(
            url.into(),
            StubResponse::Body {
                content_type: None,
                body: body.into(),
            },
        );
        self
    }

    /// Answer `url` with `body` declared as `content_type`.
    #[must_use]
    pub fn with_typed_body(
        mut self,
        url: impl Into<String>,
        content_type: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        self.responses.insert(
            url.into(),
            StubResponse::Body {
                content_type: Some(content_type.into()),
                body: body.into(),
            },
        );
        self
    }

    /// Answer `url` with a non-success `status`.
    #[must_use]
    pub fn with_status(mut self, url: impl Into<String>, status: u16) -> Self {
        self.responses
            .insert(url.into(), StubResponse::Status(status));
        self
    }

    /// Time out requests to `url`.
    #[must_use]
    pub fn with_timeout(mut self, url: impl Into<String>) -> Self {
        self.responses.insert(url.into(), StubResponse::Timeout);
        self
    }

    fn requests(&self) -> MutexGuard<'_, Vec<String>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// URLs requested so far, in order.
    #[must_use]
    pub fn requested(&self) -> Vec<String> {
        self.requests().clone()
    }
}

impl HttpFetch for StubFetcher {
    fn get(&self, url: &str) -> Result<Fetched, TransferError> {
        self.requests().push(url.to_owned());
        match self.responses.get(url).cloned() {
            Some(StubResponse::Body { content_type, body }) => Ok(Fetched {
                url: url.to_owned(),
                content_type,
                body,
            }),
            Some(StubResponse::Status(status)) => Err(TransferError::Http {
                url: url.to_owned(),
                status,
            }),
            Some(StubResponse::Timeout) => Err(TransferError::Timeout {
                url: url.to_owned(),
            }),
            None => Err(TransferError::Http {
                url: url.to_owned(),
                status: 404,
            }),
        }
    }
}
