//! Parameters shared by every normalizer call.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use registrar_core::format_timestamp;
use url::Url;

/// Contextual inputs for a normalization.
///
/// The context is plain data: normalizers read it and never keep it, so the
/// same context can drive any number of calls. `now` is injected so that
/// repeated normalizations of the same document produce identical output.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use registrar_data::normalize::NormalizeContext;
///
/// let now = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
/// let ctx = NormalizeContext::new(now)
///     .with_base_url("s3://bucket/S2A.SAFE")
///     .with_collections(["S2MSI1C"]);
///
/// assert_eq!(ctx.join_url("GRANULE/B01.jp2"), "s3://bucket/S2A.SAFE/GRANULE/B01.jp2");
/// assert!(ctx.is_known_collection("S2MSI1C"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeContext {
    /// Base URL that relative asset references resolve against.
    pub base_url: Option<String>,
    /// Identifiers of collections records may declare membership of.
    pub collections: BTreeSet<String>,
    /// Map and coverage service endpoint for derived access links.
    pub ows_url: Option<String>,
    /// Public URL at which the source document is served.
    pub public_url: Option<String>,
    /// Externally supplied catalog identifier.
    pub item_id: Option<String>,
    /// Explicit parent identifier, overriding collection membership.
    pub parent_identifier: Option<String>,
    /// Timestamp used for records without a native datestamp.
    pub now: DateTime<Utc>,
}

impl NormalizeContext {
    /// Create an empty context pinned to `now`.
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            base_url: None,
            collections: BTreeSet::new(),
            ows_url: None,
            public_url: None,
            item_id: None,
            parent_identifier: None,
            now,
        }
    }

    /// Set the base URL for distribution links.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Replace the known collections.
    #[must_use]
    pub fn with_collections<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collections = collections.into_iter().map(Into::into).collect();
        self
    }

    /// Set the service endpoint used for derived WMS/WCS links.
    #[must_use]
    pub fn with_ows_url(mut self, ows_url: impl Into<String>) -> Self {
        self.ows_url = Some(ows_url.into());
        self
    }

    /// Set the public URL of the source document.
    #[must_use]
    pub fn with_public_url(mut self, public_url: impl Into<String>) -> Self {
        self.public_url = Some(public_url.into());
        self
    }

    /// Set the externally supplied item identifier.
    #[must_use]
    pub fn with_item_id(mut self, item_id: impl Into<String>) -> Self {
        self.item_id = Some(item_id.into());
        self
    }

    /// Set an explicit parent identifier.
    #[must_use]
    pub fn with_parent_identifier(mut self, parent: impl Into<String>) -> Self {
        self.parent_identifier = Some(parent.into());
        self
    }

    /// Datestamp for records without one of their own.
    #[must_use]
    pub fn datestamp(&self) -> String {
        format_timestamp(&self.now)
    }

    /// Whether `collection` is a known collection identifier.
    #[must_use]
    pub fn is_known_collection(&self, collection: &str) -> bool {
        self.collections.contains(collection)
    }

    /// Parent for a record whose native collection is `collection`.
    ///
    /// An explicit parent wins; otherwise the collection is used only when it
    /// is known. Unknown collections leave the parent unset.
    #[must_use]
    pub fn parent_for(&self, collection: Option<&str>) -> Option<String> {
        self.parent_identifier.clone().or_else(|| {
            collection
                .filter(|name| self.is_known_collection(name))
                .map(str::to_owned)
        })
    }

    /// Base URL with exactly one trailing slash.
    #[must_use]
    pub fn base_dir(&self) -> Option<String> {
        self.base_url
            .as_deref()
            .map(|base| format!("{}/", base.trim_end_matches('/')))
    }

    /// Resolve `href` against the base URL.
    ///
    /// Without a base URL the reference is returned unchanged.
    #[must_use]
    pub fn join_url(&self, href: &str) -> String {
        match self.base_dir() {
            Some(base) => join_url(&base, href),
            None => href.to_owned(),
        }
    }
}

/// Resolve `href` against `base` with RFC 3986 semantics.
///
/// Object storage schemes such as `s3://` resolve like `http://`. If `base`
/// is not a URL the two are concatenated.
#[must_use]
pub fn join_url(base: &str, href: &str) -> String {
    Url::parse(base)
        .and_then(|base_url| base_url.join(href))
        .map_or_else(|_| format!("{base}{href}"), String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn ctx() -> NormalizeContext {
        let now = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .expect("valid timestamp");
        NormalizeContext::new(now)
    }

    #[rstest]
    #[case("s3://bucket/prefix", "a.tif", "s3://bucket/prefix/a.tif")]
    #[case("s3://bucket/prefix/", "sub/a.tif", "s3://bucket/prefix/sub/a.tif")]
    #[case("https://host/root", "https://other/b.tif", "https://other/b.tif")]
    #[case("https://host/root", "../a.tif", "https://host/a.tif")]
    fn joins_relative_to_base(#[case] base: &str, #[case] href: &str, #[case] expected: &str) {
        assert_eq!(ctx().with_base_url(base).join_url(href), expected);
    }

    #[rstest]
    fn join_without_base_keeps_reference() {
        assert_eq!(ctx().join_url("a.tif"), "a.tif");
    }

    #[rstest]
    fn join_with_non_url_base_concatenates() {
        assert_eq!(join_url("data/", "a.tif"), "data/a.tif");
    }

    #[rstest]
    #[case(None, Some("S2MSI1C"), Some("S2MSI1C"))]
    #[case(None, Some("UNKNOWN"), None)]
    #[case(None, None, None)]
    #[case(Some("explicit"), Some("S2MSI1C"), Some("explicit"))]
    fn parent_requires_known_collection(
        #[case] explicit: Option<&str>,
        #[case] collection: Option<&str>,
        #[case] expected: Option<&str>,
    ) {
        let mut ctx = ctx().with_collections(["S2MSI1C"]);
        ctx.parent_identifier = explicit.map(str::to_owned);
        assert_eq!(ctx.parent_for(collection).as_deref(), expected);
    }

    #[rstest]
    fn datestamp_uses_injected_clock() {
        assert_eq!(ctx().datestamp(), "2024-05-01T12:00:00Z");
    }
}
