//! STAC items and collections.

use indexmap::IndexMap;
use log::debug;
use registrar_core::{
    BoundingBox, CanonicalRecord, Dimension, DistributionLink, HierarchyLevel, Instrument,
    KeywordSet, Platform, TemporalExtent,
};
use serde_json::{Map, Value};

use super::{
    NormalizeContext, NormalizeError, default_title, json_numbers, json_str, json_strings,
    links::add_service_links, parse_json, required_json_str,
};

const ITEM: &str = "STAC item";
const COLLECTION: &str = "STAC collection";

/// Build a record from a STAC item document.
///
/// # Examples
///
/// ```
/// use chrono::DateTime;
/// use registrar_data::normalize::{NormalizeContext, stac::from_stac_item};
///
/// let item = r#"{
///     "id": "result-1",
///     "bbox": [10.0, 40.0, 11.0, 41.0],
///     "properties": {"datetime": "2024-05-01T10:00:00Z"},
///     "assets": {"data": {"href": "result.tif", "type": "image/tiff"}}
/// }"#;
/// let ctx = NormalizeContext::new(DateTime::UNIX_EPOCH).with_base_url("s3://out/job-1");
/// let record = from_stac_item(item, &ctx)?;
///
/// assert_eq!(record.identifier, "result-1");
/// assert_eq!(record.distribution_links["data"].url, "s3://out/job-1/result.tif");
/// # Ok::<(), registrar_data::normalize::NormalizeError>(())
/// ```
pub fn from_stac_item(
    item_json: &str,
    ctx: &NormalizeContext,
) -> Result<CanonicalRecord, NormalizeError> {
    let item = parse_json(item_json, ITEM)?;
    let identifier = required_json_str(&item, "/id", ITEM)?;
    let datestamp = item_datetime(&item)?;
    let mut record = CanonicalRecord::new(identifier, HierarchyLevel::Dataset, datestamp);
    apply_stac_item(&mut record, &item, ctx)?;
    Ok(record)
}

/// Overlay the fields of a parsed STAC item onto `record`.
///
/// Scalar fields are replaced when the item carries them and distribution
/// links are written by key, so links from an earlier pass survive unless
/// the item defines the same key.
pub fn apply_stac_item(
    record: &mut CanonicalRecord,
    item: &Value,
    ctx: &NormalizeContext,
) -> Result<(), NormalizeError> {
    let identifier = required_json_str(item, "/id", ITEM)?;
    let properties = item.get("properties").unwrap_or(&Value::Null);
    let datetime = item_datetime(item)?;
    debug!("applying STAC item {identifier}");

    record.datestamp = datetime.to_owned();
    record.creation_date = Some(datetime.to_owned());
    record.publication_date = Some(datetime.to_owned());
    record.temporal_extent = Some(temporal_extent(properties, datetime));
    if let Some(title) = json_str(properties, "/title") {
        record.title = Some(title.to_owned());
    }
    default_title(record, identifier);
    if let Some(description) = json_str(properties, "/description") {
        record.abstract_text = Some(description.to_owned());
    }
    if let Some(bbox) = item.get("bbox") {
        let values = json_numbers(bbox, "bbox", ITEM)?;
        record.spatial_extent =
            Some(BoundingBox::from_stac_bbox(&values).map_err(|source| {
                NormalizeError::BoundingBox {
                    document: ITEM,
                    source,
                }
            })?);
    }
    if let Some(parent) = ctx.parent_for(json_str(item, "/collection")) {
        record.parent_identifier = Some(parent);
    }

    let assets = item.get("assets").and_then(Value::as_object);
    let bands = bands(properties, assets);
    if !bands.is_empty() {
        record.content_dimensions = bands
            .iter()
            .filter_map(|band| json_str(band, "/name").or_else(|| json_str(band, "/common_name")))
            .map(Dimension::named)
            .collect();
        let common_names: Vec<_> = bands
            .iter()
            .filter_map(|band| json_str(band, "/common_name"))
            .collect();
        if !common_names.is_empty() {
            record.add_keywords("eo:bands", KeywordSet::theme(common_names));
        }
    }
    record.add_keywords("default", KeywordSet::theme(["processing"]));

    if let Some(cover) = properties.get("eo:cloud_cover").and_then(Value::as_f64) {
        record.cloud_cover = Some(cover);
    }
    if let Some(level) = json_str(properties, "/processing:level") {
        record.processing_level = Some(level.to_owned());
    }
    apply_acquisition(record, properties);

    if let Some(assets) = assets {
        for (key, asset) in assets {
            record.set_link(key.as_str(), asset_link(key, asset, ctx)?);
        }
    }
    if let Some(base) = ctx.base_url.as_deref() {
        record.set_link(
            identifier,
            DistributionLink::new("enclosure", base)
                .with_mime_type("enclosure")
                .labelled("product")
                .with_function("download"),
        );
    }
    add_service_links(record, ctx);
    Ok(())
}

fn item_datetime(item: &Value) -> Result<&str, NormalizeError> {
    ["/properties/datetime", "/properties/start_datetime", "/properties/end_datetime"]
        .into_iter()
        .find_map(|pointer| json_str(item, pointer))
        .ok_or_else(|| NormalizeError::missing(ITEM, "/properties/datetime"))
}

fn temporal_extent(properties: &Value, datetime: &str) -> TemporalExtent {
    match json_str(properties, "/start_datetime") {
        Some(begin) if json_str(properties, "/datetime").is_none() => TemporalExtent::Interval {
            begin: begin.to_owned(),
            end: json_str(properties, "/end_datetime").map(str::to_owned),
        },
        _ => TemporalExtent::Instant(datetime.to_owned()),
    }
}

/// Bands declared on the item, or else collected from its assets.
fn bands<'a>(properties: &'a Value, assets: Option<&'a Map<String, Value>>) -> Vec<&'a Value> {
    if let Some(Value::Array(bands)) = properties.get("eo:bands") {
        return bands.iter().collect();
    }
    assets
        .into_iter()
        .flat_map(Map::values)
        .filter_map(|asset| asset.get("eo:bands").and_then(Value::as_array))
        .flatten()
        .collect()
}

fn apply_acquisition(record: &mut CanonicalRecord, properties: &Value) {
    let platforms = json_strings(
        properties
            .get("platform")
            .or_else(|| properties.get("eo:platform")),
    );
    let instruments = json_strings(
        properties
            .get("instruments")
            .or_else(|| properties.get("instrument"))
            .or_else(|| properties.get("eo:instrument")),
    );
    if platforms.is_empty() && instruments.is_empty() {
        return;
    }
    let platform = platforms.join(",");
    let instrument = instruments.join(",");
    record.lineage = Some(format!(
        "Processed from platform {platform}, instrument {instrument}"
    ));
    record.acquisition = vec![Platform {
        identifier: platform.clone(),
        description: platform,
        instruments: instruments
            .into_iter()
            .map(|name| Instrument {
                identifier: name.clone(),
                kind: name,
            })
            .collect(),
    }];
}

fn asset_link(
    key: &str,
    asset: &Value,
    ctx: &NormalizeContext,
) -> Result<DistributionLink, NormalizeError> {
    let href = json_str(asset, "/href")
        .ok_or_else(|| NormalizeError::missing(ITEM, format!("/assets/{key}/href")))?;
    let mut link = DistributionLink::new("data", ctx.join_url(href)).with_function("download");
    if let Some(media_type) = json_str(asset, "/type") {
        link = link.with_mime_type(media_type);
    }
    if let Some(title) = json_str(asset, "/title") {
        link = link.labelled(title);
    }
    Ok(link)
}

/// Build a collection-level record from a STAC collection document.
///
/// Both the standard `extent` member and the legacy `extents` spelling are
/// accepted. Links may be an array or a legacy object keyed by name; array
/// links are keyed by relation, with repeated relations numbered.
pub fn from_stac_collection(
    collection_json: &str,
    ctx: &NormalizeContext,
) -> Result<CanonicalRecord, NormalizeError> {
    let collection = parse_json(collection_json, COLLECTION)?;
    let identifier = required_json_str(&collection, "/id", COLLECTION)?;
    debug!("normalizing STAC collection {identifier}");

    let mut record =
        CanonicalRecord::new(identifier, HierarchyLevel::Collection, ctx.datestamp());
    record.title = Some(
        json_str(&collection, "/title")
            .unwrap_or(identifier)
            .to_owned(),
    );
    record.abstract_text = json_str(&collection, "/description").map(str::to_owned);
    record.parent_identifier = ctx.parent_identifier.clone();
    record.access_constraints = json_str(&collection, "/license").map(str::to_owned);

    let extent = collection
        .get("extent")
        .or_else(|| collection.get("extents"))
        .unwrap_or(&Value::Null);
    if let Some(bbox) = extent.pointer("/spatial/bbox/0") {
        let values = json_numbers(bbox, "extent.spatial.bbox", COLLECTION)?;
        record.spatial_extent = Some(BoundingBox::from_stac_bbox(&values).map_err(|source| {
            NormalizeError::BoundingBox {
                document: COLLECTION,
                source,
            }
        })?);
    }
    if let Some(begin) = json_str(extent, "/temporal/interval/0/0") {
        record.temporal_extent = Some(TemporalExtent::Interval {
            begin: begin.to_owned(),
            end: json_str(extent, "/temporal/interval/0/1").map(str::to_owned),
        });
    }

    let mut keywords = vec!["collection".to_owned()];
    keywords.extend(json_strings(collection.get("keywords")));
    record.add_keywords("default", KeywordSet::theme(keywords));

    for (key, link) in keyed_links(collection.get("links")) {
        record.set_link(key, link);
    }
    Ok(record)
}

/// Key a STAC link list by relation, suffixing repeats as `{rel}-{n}`.
///
/// Link objects keyed by name keep their own keys.
pub(crate) fn keyed_links(links: Option<&Value>) -> IndexMap<String, DistributionLink> {
    let mut keyed = IndexMap::new();
    match links {
        Some(Value::Array(items)) => {
            let mut seen: IndexMap<String, usize> = IndexMap::new();
            for item in items {
                let Some(link) = link_from_json(item) else {
                    continue;
                };
                let count = seen.entry(link.relation.clone()).or_insert(0);
                *count += 1;
                let key = if *count == 1 {
                    link.relation.clone()
                } else {
                    format!("{}-{count}", link.relation)
                };
                keyed.insert(key, link);
            }
        }
        Some(Value::Object(entries)) => {
            for (key, item) in entries {
                if let Some(link) = link_from_json(item) {
                    keyed.insert(key.clone(), link);
                }
            }
        }
        _ => {}
    }
    keyed
}

fn link_from_json(item: &Value) -> Option<DistributionLink> {
    let href = json_str(item, "/href")?;
    let relation = json_str(item, "/rel").unwrap_or("related");
    let mut link = DistributionLink::new(relation, href).with_function(relation);
    if let Some(media_type) = json_str(item, "/type") {
        link = link.with_mime_type(media_type);
    }
    if let Some(title) = json_str(item, "/title") {
        link = link.labelled(title);
    }
    Some(link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fixtures::fixture, test_support::fixed_context};
    use registrar_core::to_iso_xml;
    use rstest::rstest;
    use serde_json::json;

    fn item(ctx: &NormalizeContext) -> CanonicalRecord {
        from_stac_item(&fixture("stac_item.json"), ctx).expect("normalize item")
    }

    #[rstest]
    fn maps_item_core_fields() {
        let record = item(&fixed_context());
        assert_eq!(record.identifier, "S2B_T32TQM_20240501_ndvi");
        assert_eq!(record.datestamp, "2024-05-01T10:20:21Z");
        assert_eq!(
            record.temporal_extent,
            Some(TemporalExtent::Instant("2024-05-01T10:20:21Z".to_owned()))
        );
        let bbox = record.spatial_extent.expect("bbox");
        assert_eq!((bbox.min_x(), bbox.max_y()), (11.0, 46.0));
        assert_eq!(record.keywords["default"].keywords, vec!["processing"]);
        assert_eq!(record.keywords["eo:bands"].keywords, vec!["red", "nir"]);
        assert_eq!(
            record.lineage.as_deref(),
            Some("Processed from platform sentinel-2b, instrument msi")
        );
    }

    #[rstest]
    fn bands_fall_back_to_assets() {
        let record = item(&fixed_context());
        let names: Vec<_> = record
            .content_dimensions
            .iter()
            .map(|band| band.name.as_str())
            .collect();
        assert_eq!(names, vec!["B04", "B08"]);
    }

    #[rstest]
    fn item_level_bands_take_precedence() {
        let doc = json!({
            "id": "x",
            "properties": {
                "datetime": "2024-01-01T00:00:00Z",
                "eo:bands": [{"name": "pan", "common_name": "pan"}]
            },
            "assets": {"a": {"href": "a.tif", "eo:bands": [{"name": "B01"}]}}
        });
        let record = from_stac_item(&doc.to_string(), &fixed_context()).expect("normalize");
        assert_eq!(record.content_dimensions, vec![Dimension::named("pan")]);
    }

    #[rstest]
    fn asset_links_resolve_against_base() {
        let record = item(&fixed_context().with_base_url("s3://processing/job-42/"));
        let ndvi = &record.distribution_links["ndvi"];
        assert_eq!(ndvi.url, "s3://processing/job-42/ndvi.tif");
        assert_eq!(ndvi.relation, "data");
        assert_eq!(ndvi.function.as_deref(), Some("download"));
        let product = &record.distribution_links["S2B_T32TQM_20240501_ndvi"];
        assert_eq!(product.relation, "enclosure");
    }

    #[rstest]
    fn product_link_requires_base_url() {
        let record = item(&fixed_context());
        assert!(
            !record
                .distribution_links
                .contains_key("S2B_T32TQM_20240501_ndvi")
        );
    }

    #[rstest]
    #[case(vec!["sentinel-2-l2a"], Some("sentinel-2-l2a"))]
    #[case(vec![], None)]
    fn parent_from_known_collection(
        #[case] collections: Vec<&str>,
        #[case] expected: Option<&str>,
    ) {
        let record = item(&fixed_context().with_collections(collections));
        assert_eq!(record.parent_identifier.as_deref(), expected);
    }

    #[rstest]
    fn interval_items_use_start_datetime() {
        let doc = json!({
            "id": "x",
            "properties": {
                "datetime": null,
                "start_datetime": "2024-01-01T00:00:00Z",
                "end_datetime": "2024-01-31T00:00:00Z"
            }
        });
        let record = from_stac_item(&doc.to_string(), &fixed_context()).expect("normalize");
        assert_eq!(record.datestamp, "2024-01-01T00:00:00Z");
        assert_eq!(
            record.temporal_extent,
            Some(TemporalExtent::Interval {
                begin: "2024-01-01T00:00:00Z".to_owned(),
                end: Some("2024-01-31T00:00:00Z".to_owned()),
            })
        );
    }

    #[rstest]
    #[case(r#"{"properties": {"datetime": "2024-01-01T00:00:00Z"}}"#, "/id")]
    #[case(r#"{"id": "x", "properties": {}}"#, "/properties/datetime")]
    fn missing_required_fields_are_reported(#[case] doc: &str, #[case] field: &str) {
        let err = from_stac_item(doc, &fixed_context()).expect_err("missing field");
        assert!(
            matches!(&err, NormalizeError::MissingField { field: missing, .. } if missing == field),
            "unexpected error {err:?}"
        );
    }

    #[rstest]
    fn malformed_bbox_is_rejected() {
        let doc = json!({
            "id": "x",
            "bbox": [1, 2, 3],
            "properties": {"datetime": "2024-01-01T00:00:00Z"}
        });
        let err = from_stac_item(&doc.to_string(), &fixed_context()).expect_err("bad bbox");
        assert!(matches!(err, NormalizeError::BoundingBox { .. }));
    }

    #[rstest]
    fn item_normalization_is_deterministic() {
        let ctx = fixed_context()
            .with_base_url("s3://processing/job-42/")
            .with_ows_url("https://ows.example.com/ows");
        let first = to_iso_xml(&item(&ctx)).expect("serialize");
        let second = to_iso_xml(&item(&ctx)).expect("serialize");
        assert_eq!(first, second);
    }

    #[rstest]
    fn maps_collection_extent_and_links() {
        let record = from_stac_collection(&fixture("stac_collection.json"), &fixed_context())
            .expect("normalize collection");
        assert_eq!(record.identifier, "sentinel-2-l2a");
        assert_eq!(record.hierarchy_level, HierarchyLevel::Collection);
        assert_eq!(record.datestamp, "2024-05-02T08:00:00Z");
        let bbox = record.spatial_extent.expect("bbox");
        assert_eq!(
            (bbox.min_x(), bbox.min_y(), bbox.max_x(), bbox.max_y()),
            (-180.0, -56.0, 180.0, 83.0)
        );
        assert_eq!(
            record.keywords["default"].keywords,
            vec!["collection", "sentinel", "copernicus"]
        );
        let keys: Vec<_> = record.distribution_links.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["self", "license", "item", "item-2"]);
    }

    #[rstest]
    fn accepts_legacy_collection_shape() {
        let doc = json!({
            "id": "legacy",
            "description": "Legacy collection",
            "extents": {"spatial": {"bbox": [[0, 0, 1, 1]]}},
            "links": {"home": {"rel": "about", "href": "https://example.com"}}
        });
        let record = from_stac_collection(&doc.to_string(), &fixed_context()).expect("normalize");
        assert_eq!(record.abstract_text.as_deref(), Some("Legacy collection"));
        assert_eq!(record.distribution_links["home"].relation, "about");
        assert!(record.spatial_extent.is_some());
    }
}
