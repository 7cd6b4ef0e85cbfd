//! Catalogue protocol detection and landing-page harvesting.
//!
//! A remote catalogue is probed with a fixed fallback chain. Each probe
//! either yields a [`HarvestedDescription`] or fails with a classified
//! [`ProbeError`], and [`Probe::next`] maps that failure onto the probe to
//! try next:
//!
//! | Probe | Failure | Next |
//! |-------|---------|------|
//! | OGC API Records | any | CSW |
//! | CSW | XML syntax, transport | STAC catalog |
//! | CSW | runtime | OpenSearch |
//! | STAC catalog | any | OpenSearch |
//! | OpenSearch | any | none |
//!
//! Harvesting is best effort: when every probe fails the caller receives
//! `None` and decides how to proceed.

use indexmap::IndexMap;
use log::{debug, info, warn};
use registrar_core::{
    CanonicalRecord, DistributionLink, HierarchyLevel, KeywordSet,
    xml::{XmlElement, parse_document},
};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::{
    http::HttpFetch,
    normalize::{NormalizeContext, stac::keyed_links},
    source::TransferError,
};

/// Conformance URI fragment identifying a STAC API.
const STAC_API_CONFORMANCE: &str = "api.stacspec.org";

/// Classified failure of a single probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The response was not JSON.
    #[error("response is not JSON: {0}")]
    JsonDecode(#[from] serde_json::Error),
    /// The response was not well-formed XML.
    #[error("response is not well-formed XML: {0}")]
    XmlSyntax(#[from] registrar_core::xml::XmlError),
    /// The service answered, but not with the expected document.
    #[error("{0}")]
    Runtime(String),
    /// The request itself failed.
    #[error(transparent)]
    Transport(#[from] TransferError),
}

/// Catalogue protocols, in probing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// OGC API Records landing page, possibly a STAC API.
    OgcApiRecords,
    /// OGC CSW 2.0.2 capabilities.
    Csw,
    /// Static STAC catalog root.
    StacCatalog,
    /// OpenSearch description document.
    OpenSearch,
}

impl Probe {
    /// First probe of the chain.
    pub const FIRST: Self = Self::OgcApiRecords;

    /// Probe to try after `self` failed with `error`.
    ///
    /// # Examples
    ///
    /// ```
    /// use registrar_data::detect::{Probe, ProbeError};
    ///
    /// let runtime = ProbeError::Runtime("not a capabilities document".to_owned());
    /// assert_eq!(Probe::Csw.next(&runtime), Some(Probe::OpenSearch));
    /// assert_eq!(Probe::OpenSearch.next(&runtime), None);
    /// ```
    #[must_use]
    pub const fn next(self, error: &ProbeError) -> Option<Self> {
        match (self, error) {
            (Self::OgcApiRecords, _) => Some(Self::Csw),
            (Self::Csw, ProbeError::Runtime(_)) => Some(Self::OpenSearch),
            (Self::Csw, _) => Some(Self::StacCatalog),
            (Self::StacCatalog, _) => Some(Self::OpenSearch),
            (Self::OpenSearch, _) => None,
        }
    }

    /// URL requested for `base_url`.
    #[must_use]
    pub fn url(self, base_url: &str) -> String {
        match self {
            Self::OgcApiRecords => with_query(base_url, "f=json"),
            Self::Csw => with_query(base_url, "service=CSW&version=2.0.2&request=GetCapabilities"),
            Self::StacCatalog => catalog_url(base_url),
            Self::OpenSearch => base_url.to_owned(),
        }
    }

    /// Fetch and interpret the landing document of `base_url`.
    pub fn run(
        self,
        fetcher: &dyn HttpFetch,
        base_url: &str,
    ) -> Result<HarvestedDescription, ProbeError> {
        let url = self.url(base_url);
        debug!("probing {base_url} as {self:?} at {url}");
        let body = fetcher.get(&url)?.body;
        let mut description = match self {
            Self::OgcApiRecords => records_landing(&serde_json::from_str(&body)?),
            Self::Csw => csw_capabilities(&parse_document(&body)?)?,
            Self::StacCatalog => stac_catalog(&serde_json::from_str(&body)?)?,
            Self::OpenSearch => opensearch_description(&parse_document(&body)?)?,
        };
        base_url.clone_into(&mut description.url);
        Ok(description)
    }
}

fn with_query(base_url: &str, query: &str) -> String {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!("{base_url}{separator}{query}")
}

/// Root catalog document below `base_url`, keeping any query string.
fn catalog_url(base_url: &str) -> String {
    let Ok(mut url) = Url::parse(base_url) else {
        return if base_url.ends_with(".json") {
            base_url.to_owned()
        } else {
            format!("{}/catalog.json", base_url.trim_end_matches('/'))
        };
    };
    if !url.path().ends_with(".json") {
        let path = format!("{}/catalog.json", url.path().trim_end_matches('/'));
        url.set_path(&path);
    }
    url.into()
}

/// Protocol a catalogue was recognised as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogueProtocol {
    /// OGC API Records.
    OgcApiRecords,
    /// STAC API, an OGC API Records profile.
    StacApi,
    /// OGC CSW.
    Csw,
    /// Static STAC catalog.
    StacCatalog,
    /// OpenSearch.
    OpenSearch,
}

impl CatalogueProtocol {
    /// Keyword naming the protocol.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::OgcApiRecords => "OGC API - Records",
            Self::StacApi => "STAC API",
            Self::Csw => "CSW",
            Self::StacCatalog => "STAC",
            Self::OpenSearch => "OpenSearch",
        }
    }
}

/// Landing page content recovered from a catalogue.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestedDescription {
    /// Base URL that was probed.
    pub url: String,
    /// Recognised protocol.
    pub protocol: CatalogueProtocol,
    /// Advertised title.
    pub title: Option<String>,
    /// Advertised description.
    pub abstract_text: Option<String>,
    /// Advertised links, keyed.
    pub links: IndexMap<String, DistributionLink>,
}

impl HarvestedDescription {
    fn new(protocol: CatalogueProtocol) -> Self {
        Self {
            url: String::new(),
            protocol,
            title: None,
            abstract_text: None,
            links: IndexMap::new(),
        }
    }

    /// Build the service-level record describing the catalogue.
    #[must_use]
    pub fn into_record(self, ctx: &NormalizeContext) -> CanonicalRecord {
        let mut record =
            CanonicalRecord::new(self.url.clone(), HierarchyLevel::Service, ctx.datestamp());
        record.parent_identifier = ctx.parent_identifier.clone();
        record.title = Some(self.title.clone().unwrap_or_else(|| self.url.clone()));
        record.abstract_text = self.abstract_text;
        record.add_keywords(
            "default",
            KeywordSet::theme(["catalogue", "service", self.protocol.keyword()]),
        );
        let mut service = DistributionLink::new("service", self.url.as_str())
            .with_mime_type(self.protocol.keyword())
            .with_function("service");
        if let Some(title) = self.title {
            service = service.labelled(title);
        }
        record.set_link("http", service);
        for (key, link) in self.links {
            record.set_link(key, link);
        }
        record
    }
}

/// Any JSON landing page is accepted; only an object can declare STAC API
/// conformance.
fn records_landing(landing: &Value) -> HarvestedDescription {
    let stac_api = landing.get("stac_version").is_some()
        || landing
            .get("conformsTo")
            .and_then(Value::as_array)
            .is_some_and(|classes| {
                classes
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|class| class.contains(STAC_API_CONFORMANCE))
            });
    let protocol = if stac_api {
        CatalogueProtocol::StacApi
    } else {
        CatalogueProtocol::OgcApiRecords
    };
    json_description(protocol, landing)
}

fn stac_catalog(root: &Value) -> Result<HarvestedDescription, ProbeError> {
    let is_catalog = root.get("type").and_then(Value::as_str) == Some("Catalog")
        || root.get("stac_version").is_some();
    if !is_catalog {
        return Err(ProbeError::Runtime("document is not a STAC catalog".to_owned()));
    }
    Ok(json_description(CatalogueProtocol::StacCatalog, root))
}

fn json_description(protocol: CatalogueProtocol, document: &Value) -> HarvestedDescription {
    let text = |field: &str| document.get(field).and_then(Value::as_str).map(str::to_owned);
    HarvestedDescription {
        title: text("title").or_else(|| text("id")),
        abstract_text: text("description"),
        links: keyed_links(document.get("links")),
        ..HarvestedDescription::new(protocol)
    }
}

fn csw_capabilities(root: &XmlElement) -> Result<HarvestedDescription, ProbeError> {
    if root.local_name != "Capabilities" {
        return Err(ProbeError::Runtime(format!(
            "expected CSW capabilities, found <{}>",
            root.name
        )));
    }
    let identification = root.child("ServiceIdentification");
    let text = |name: &str| {
        identification
            .and_then(|node| node.child(name))
            .and_then(XmlElement::non_empty_text)
            .map(str::to_owned)
    };
    let mut description = HarvestedDescription {
        title: text("Title"),
        abstract_text: text("Abstract"),
        ..HarvestedDescription::new(CatalogueProtocol::Csw)
    };
    for operation in root.descendants("Operation") {
        let (Some(name), Some(href)) = (
            operation.attr("name"),
            operation
                .descendant("Get")
                .or_else(|| operation.descendant("Post"))
                .and_then(|method| method.attr("href")),
        ) else {
            continue;
        };
        description.links.insert(
            name.to_owned(),
            DistributionLink::new("service", href)
                .with_mime_type("OGC:CSW")
                .labelled(name)
                .with_function(name),
        );
    }
    Ok(description)
}

fn opensearch_description(root: &XmlElement) -> Result<HarvestedDescription, ProbeError> {
    if root.local_name != "OpenSearchDescription" {
        return Err(ProbeError::Runtime(format!(
            "expected an OpenSearch description, found <{}>",
            root.name
        )));
    }
    let text = |name: &str| {
        root.child(name)
            .and_then(XmlElement::non_empty_text)
            .map(str::to_owned)
    };
    let mut description = HarvestedDescription {
        title: text("LongName").or_else(|| text("ShortName")),
        abstract_text: text("Description"),
        ..HarvestedDescription::new(CatalogueProtocol::OpenSearch)
    };
    for (index, template) in root.children_named("Url").enumerate() {
        let Some(href) = template.attr("template") else {
            continue;
        };
        let media_type = template.attr("type").unwrap_or("application/xml");
        let relation = template.attr("rel").unwrap_or("results");
        let key = if description.links.contains_key(media_type) {
            format!("{media_type}-{}", index + 1)
        } else {
            media_type.to_owned()
        };
        description.links.insert(
            key,
            DistributionLink::new(relation, href)
                .with_mime_type(media_type)
                .with_function("search"),
        );
    }
    Ok(description)
}

/// Probe `base_url` until one protocol answers.
///
/// Returns `None` when every probe in the chain fails.
pub fn detect_and_harvest(fetcher: &dyn HttpFetch, base_url: &str) -> Option<HarvestedDescription> {
    let mut probe = Some(Probe::FIRST);
    while let Some(current) = probe {
        match current.run(fetcher, base_url) {
            Ok(description) => {
                info!(
                    "harvested {base_url} as {}",
                    description.protocol.keyword()
                );
                return Some(description);
            }
            Err(error) => {
                debug!("{current:?} probe of {base_url} failed: {error}");
                probe = current.next(&error);
            }
        }
    }
    warn!("no supported catalogue protocol answered at {base_url}");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{StubFetcher, fixed_context};
    use rstest::rstest;
    use serde_json::json;

    const BASE: &str = "https://catalog.example.com";

    fn csw_url() -> String {
        Probe::Csw.url(BASE)
    }

    #[rstest]
    #[case(Probe::OgcApiRecords, "https://catalog.example.com?f=json")]
    #[case(
        Probe::Csw,
        "https://catalog.example.com?service=CSW&version=2.0.2&request=GetCapabilities"
    )]
    #[case(Probe::StacCatalog, "https://catalog.example.com/catalog.json")]
    #[case(Probe::OpenSearch, "https://catalog.example.com")]
    fn builds_probe_urls(#[case] probe: Probe, #[case] expected: &str) {
        assert_eq!(probe.url(BASE), expected);
    }

    #[rstest]
    fn static_catalog_urls_are_used_verbatim() {
        assert_eq!(
            Probe::StacCatalog.url("https://host/stac/root.json"),
            "https://host/stac/root.json"
        );
        assert_eq!(
            Probe::OgcApiRecords.url("https://host/api?lang=en"),
            "https://host/api?lang=en&f=json"
        );
    }

    #[rstest]
    #[case("https://host/stac?token=abc", "https://host/stac/catalog.json?token=abc")]
    #[case("https://host/stac/?token=abc", "https://host/stac/catalog.json?token=abc")]
    #[case("https://host/root.json?token=abc", "https://host/root.json?token=abc")]
    fn static_catalog_urls_keep_the_query(#[case] base: &str, #[case] expected: &str) {
        assert_eq!(Probe::StacCatalog.url(base), expected);
    }

    #[rstest]
    fn non_object_landing_pages_are_plain_records() {
        let fetcher = StubFetcher::default()
            .with_body(Probe::OgcApiRecords.url(BASE), r#"["api.stacspec.org"]"#);
        let description = detect_and_harvest(&fetcher, BASE).expect("harvested");
        assert_eq!(description.protocol, CatalogueProtocol::OgcApiRecords);
        assert_eq!(description.title, None);
        assert_eq!(fetcher.requested(), vec![Probe::OgcApiRecords.url(BASE)]);
    }

    #[rstest]
    fn transitions_follow_failure_kind() {
        let runtime = || ProbeError::Runtime("wrong document".to_owned());
        let transport = || {
            ProbeError::Transport(TransferError::Timeout {
                url: BASE.to_owned(),
            })
        };
        let syntax = || match parse_document("<open>") {
            Err(err) => ProbeError::XmlSyntax(err),
            Ok(_) => panic!("document should be malformed"),
        };
        assert_eq!(Probe::OgcApiRecords.next(&runtime()), Some(Probe::Csw));
        assert_eq!(Probe::OgcApiRecords.next(&transport()), Some(Probe::Csw));
        assert_eq!(Probe::Csw.next(&syntax()), Some(Probe::StacCatalog));
        assert_eq!(Probe::Csw.next(&transport()), Some(Probe::StacCatalog));
        assert_eq!(Probe::Csw.next(&runtime()), Some(Probe::OpenSearch));
        assert_eq!(Probe::StacCatalog.next(&syntax()), Some(Probe::OpenSearch));
        assert_eq!(Probe::OpenSearch.next(&runtime()), None);
    }

    #[rstest]
    fn classifies_stac_apis_by_conformance() {
        let landing = json!({
            "title": "Earth Search",
            "conformsTo": ["https://api.stacspec.org/v1.0.0/core"],
            "links": [{"rel": "self", "href": "https://catalog.example.com"}]
        });
        let fetcher = StubFetcher::default().with_body(Probe::OgcApiRecords.url(BASE), landing.to_string());
        let description = detect_and_harvest(&fetcher, BASE).expect("harvested");
        assert_eq!(description.protocol, CatalogueProtocol::StacApi);
        assert_eq!(description.title.as_deref(), Some("Earth Search"));
        assert!(description.links.contains_key("self"));
    }

    #[rstest]
    fn falls_back_to_static_catalog_after_malformed_capabilities() {
        let catalog = json!({"type": "Catalog", "id": "root", "description": "Static", "links": []});
        let fetcher = StubFetcher::default()
            .with_body(Probe::OgcApiRecords.url(BASE), "<html>")
            .with_body(csw_url(), "<html><body>")
            .with_body(Probe::StacCatalog.url(BASE), catalog.to_string());
        let description = detect_and_harvest(&fetcher, BASE).expect("harvested");
        assert_eq!(description.protocol, CatalogueProtocol::StacCatalog);
        assert_eq!(description.title.as_deref(), Some("root"));
        assert_eq!(
            fetcher.requested(),
            vec![
                Probe::OgcApiRecords.url(BASE),
                csw_url(),
                Probe::StacCatalog.url(BASE),
            ]
        );
    }

    #[rstest]
    fn runtime_csw_failure_skips_to_opensearch() {
        let opensearch = r#"<OpenSearchDescription xmlns="http://a9.com/-/spec/opensearch/1.1/">
            <ShortName>EO search</ShortName>
            <Description>Search products</Description>
            <Url type="application/atom+xml" template="https://catalog.example.com/search?q={searchTerms}"/>
        </OpenSearchDescription>"#;
        let fetcher = StubFetcher::default()
            .with_body(csw_url(), "<ExceptionReport/>")
            .with_body(BASE, opensearch);
        let description = detect_and_harvest(&fetcher, BASE).expect("harvested");
        assert_eq!(description.protocol, CatalogueProtocol::OpenSearch);
        assert_eq!(description.abstract_text.as_deref(), Some("Search products"));
        assert!(description.links.contains_key("application/atom+xml"));
        assert!(!fetcher.requested().contains(&Probe::StacCatalog.url(BASE)));
    }

    #[rstest]
    fn reads_csw_operations() {
        let capabilities = r#"<csw:Capabilities xmlns:csw="http://www.opengis.net/cat/csw/2.0.2"
            xmlns:ows="http://www.opengis.net/ows" xmlns:xlink="http://www.w3.org/1999/xlink">
          <ows:ServiceIdentification>
            <ows:Title>pycsw</ows:Title>
            <ows:Abstract>Catalogue</ows:Abstract>
          </ows:ServiceIdentification>
          <ows:OperationsMetadata>
            <ows:Operation name="GetRecords">
              <ows:DCP><ows:HTTP><ows:Get xlink:href="https://catalog.example.com/csw"/></ows:HTTP></ows:DCP>
            </ows:Operation>
          </ows:OperationsMetadata>
        </csw:Capabilities>"#;
        let fetcher = StubFetcher::default().with_body(csw_url(), capabilities);
        let description = detect_and_harvest(&fetcher, BASE).expect("harvested");
        assert_eq!(description.protocol, CatalogueProtocol::Csw);
        assert_eq!(description.title.as_deref(), Some("pycsw"));
        assert_eq!(
            description.links["GetRecords"].url,
            "https://catalog.example.com/csw"
        );
    }

    #[rstest]
    fn exhausted_chain_yields_nothing() {
        let fetcher = StubFetcher::default();
        assert!(detect_and_harvest(&fetcher, BASE).is_none());
        assert_eq!(fetcher.requested().len(), 4);
    }

    #[rstest]
    fn description_becomes_a_service_record() {
        let landing = json!({"title": "Records", "description": "All records"});
        let fetcher =
            StubFetcher::default().with_body(Probe::OgcApiRecords.url(BASE), landing.to_string());
        let record = detect_and_harvest(&fetcher, BASE)
            .expect("harvested")
            .into_record(&fixed_context());
        assert_eq!(record.identifier, BASE);
        assert!(record.hierarchy_level.is_service());
        assert_eq!(
            record.keywords["default"].keywords,
            vec!["catalogue", "service", "OGC API - Records"]
        );
        assert_eq!(record.distribution_links["http"].url, BASE);
    }
}
