//! Derived map and coverage service links.

use registrar_core::{CanonicalRecord, DistributionLink, WCS_RELATION, WMS_RELATION};
use url::form_urlencoded;

use super::NormalizeContext;

/// Link key of the derived WMS link.
pub const WMS_LINK_KEY: &str = "wms_link";
/// Link key of the derived WCS link.
pub const WCS_LINK_KEY: &str = "wcs_link";

/// WMS capabilities link filtered to `identifier`.
///
/// # Examples
///
/// ```
/// use registrar_data::normalize::links::wms_link;
///
/// let link = wms_link("https://ows.example.com/ows", "S2A_TILE");
/// assert_eq!(
///     link.url,
///     "https://ows.example.com/ows?service=WMS&version=1.3.0&request=GetCapabilities&cql=identifier%3D%22S2A_TILE%22"
/// );
/// assert_eq!(link.mime_type.as_deref(), Some("OGC:WMS"));
/// ```
#[must_use]
pub fn wms_link(ows_url: &str, identifier: &str) -> DistributionLink {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("service", "WMS")
        .append_pair("version", "1.3.0")
        .append_pair("request", "GetCapabilities")
        .append_pair("cql", &format!("identifier=\"{identifier}\""))
        .finish();
    DistributionLink::new(WMS_RELATION, format!("{ows_url}?{query}"))
        .with_mime_type("OGC:WMS")
        .with_name(identifier)
        .with_description(format!("WMS URL for {identifier}"))
}

/// WCS coverage-set link for `identifier`.
#[must_use]
pub fn wcs_link(ows_url: &str, identifier: &str) -> DistributionLink {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("service", "WCS")
        .append_pair("version", "2.0.1")
        .append_pair("request", "DescribeEOCoverageSet")
        .append_pair("eoid", identifier)
        .finish();
    DistributionLink::new(WCS_RELATION, format!("{ows_url}?{query}"))
        .with_mime_type("OGC:WCS")
        .with_name(identifier)
        .with_description(format!("WCS URL for {identifier}"))
}

/// Append both service links when the context names a service endpoint.
pub fn add_service_links(record: &mut CanonicalRecord, ctx: &NormalizeContext) {
    let Some(ows_url) = ctx.ows_url.as_deref() else {
        return;
    };
    let identifier = record.identifier.clone();
    record.set_link(WMS_LINK_KEY, wms_link(ows_url, &identifier));
    record.set_link(WCS_LINK_KEY, wcs_link(ows_url, &identifier));
}
