//! Registration jobs exchanged between the gateway and its workers.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Correlation identifier of a queued registration.
///
/// Two submissions of the same URL get distinct identifiers, so their
/// completions are never confused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Draw a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value).map(Self)
    }
}

/// A registration request waiting for, or taken by, a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationJob {
    /// Correlation identifier.
    pub id: JobId,
    /// Declared resource type, such as `item` or `cwl`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Resource location, reduced to host and path.
    pub url: String,
    /// When the gateway accepted the request.
    pub enqueued_at: DateTime<Utc>,
}

impl RegistrationJob {
    /// Create a job for `url` with a fresh identifier.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::Utc;
    /// use registrar_gateway::RegistrationJob;
    ///
    /// let job = RegistrationJob::new("item", "https://data.example.com/S2A/item.json", Utc::now());
    /// assert_eq!(job.url, "data.example.com/S2A/item.json");
    /// ```
    #[must_use]
    pub fn new(kind: impl Into<String>, url: &str, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            kind: kind.into(),
            url: normalize_item_url(url),
            enqueued_at,
        }
    }

    /// Encode as the JSON message stored on the queue.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a queued JSON message.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Reduce a submitted URL to `host[:port]` followed by its path.
///
/// Values that do not parse as URLs are kept as submitted.
#[must_use]
pub fn normalize_item_url(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return url.to_owned();
    };
    let host = parsed.host_str().unwrap_or_default();
    let port = parsed
        .port()
        .map(|port| format!(":{port}"))
        .unwrap_or_default();
    format!("{host}{port}{}", parsed.path())
}
