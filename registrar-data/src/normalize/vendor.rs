//! Vendor product metadata paired with an INSPIRE record.
//!
//! The product document (for example a Sentinel-2 `MTD_MSIL1C.xml`) supplies
//! the identifier, footprint, timing, bands and granule files. The INSPIRE
//! document supplies hierarchy level, keyword sets, topic category and access
//! constraints.

use log::{debug, warn};
use registrar_core::{
    BoundingBox, CanonicalRecord, Contact, ContactRole, Dimension, DistributionLink,
    HierarchyLevel, Instrument, KeywordSet, Platform, TemporalExtent, upsert::PACKAGING_SUFFIX,
    xml::XmlElement,
};

use super::{
    NormalizeContext, NormalizeError, join_url, links::add_service_links, parse_number,
    parse_xml, required_text,
};

const PRODUCT: &str = "product metadata";
const INSPIRE: &str = "INSPIRE metadata";

/// Product elements copied into the `product` keyword set.
const PRODUCT_KEYWORDS: [(&str, &str); 4] = [
    ("eo:productType", "PRODUCT_TYPE"),
    ("eo:orbitNumber", "SENSING_ORBIT_NUMBER"),
    ("eo:orbitDirection", "SENSING_ORBIT_DIRECTION"),
    ("eo:snowCover", "SNOW_ICE_PERCENTAGE"),
];

/// Media type and file extension of granule images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageFormat {
    /// Media type advertised on granule links.
    pub mime_type: &'static str,
    /// Extension appended to `IMAGE_FILE` entries.
    pub extension: &'static str,
}

impl ImageFormat {
    /// Map a granule `imageFormat` attribute.
    ///
    /// Unknown formats log a warning and map to `NA`.
    #[must_use]
    pub fn from_granule_format(format: Option<&str>) -> Self {
        match format {
            Some("JPEG2000") => Self {
                mime_type: "image/jp2",
                extension: "jp2",
            },
            Some("TIFF") => Self {
                mime_type: "image/x.geotiff",
                extension: "tif",
            },
            other => {
                warn!("unknown product format: {}", other.unwrap_or("<none>"));
                Self {
                    mime_type: "NA",
                    extension: "NA",
                }
            }
        }
    }
}

/// Logical identifier for a product manifest URI.
///
/// # Examples
///
/// ```
/// use registrar_data::normalize::vendor::logical_identifier;
///
/// assert_eq!(logical_identifier("S2A_MSIL1C_20240501.SAFE"), "S2A_MSIL1C_20240501");
/// assert_eq!(logical_identifier("LC08_L1TP"), "LC08_L1TP");
/// ```
#[must_use]
pub fn logical_identifier(product_uri: &str) -> &str {
    product_uri
        .strip_suffix(PACKAGING_SUFFIX)
        .unwrap_or(product_uri)
}

/// Build a record from a vendor product document and its INSPIRE record.
pub fn from_vendor_inspire(
    product_xml: &str,
    inspire_xml: &str,
    ctx: &NormalizeContext,
) -> Result<CanonicalRecord, NormalizeError> {
    let product = parse_xml(product_xml, PRODUCT)?;
    let inspire = parse_xml(inspire_xml, INSPIRE)?;

    let product_type = required_text(&product, "PRODUCT_TYPE", PRODUCT)?;
    let product_uri = required_text(&product, "PRODUCT_URI", PRODUCT)?;
    let product_info = product
        .descendant("Product_Info")
        .ok_or_else(|| NormalizeError::missing(PRODUCT, "Product_Info"))?;
    let generated = required_text(product_info, "GENERATION_TIME", PRODUCT)?;
    let start = required_text(product_info, "PRODUCT_START_TIME", PRODUCT)?;
    let stop = required_text(product_info, "PRODUCT_STOP_TIME", PRODUCT)?;

    let identifier = ctx
        .item_id
        .clone()
        .unwrap_or_else(|| logical_identifier(product_uri).to_owned());
    debug!("normalizing vendor product {product_uri} as {identifier}");

    let mut record = CanonicalRecord::new(identifier, hierarchy_level(&inspire), generated);
    record.parent_identifier = ctx.parent_for(Some(product_type));
    record.title = Some(product_uri.to_owned());
    record.abstract_text = Some(product_uri.to_owned());
    record.creation_date = Some(generated.to_owned());
    record.publication_date = Some(generated.to_owned());
    record.spatial_extent = Some(footprint(&product)?);
    record.temporal_extent = Some(TemporalExtent::Interval {
        begin: start.to_owned(),
        end: Some(stop.to_owned()),
    });

    add_inspire_keywords(&mut record, &inspire);
    record.add_keywords("product", product_keywords(&product));

    record.topic_categories = inspire
        .descendant_text("MD_TopicCategoryCode")
        .map(|code| vec![code.to_owned()])
        .unwrap_or_default();
    record.access_constraints = inspire
        .descendant("accessConstraints")
        .and_then(code_list_value)
        .map(str::to_owned);
    if let Some(party) = inspire.descendant("contact") {
        record.set_contact(ContactRole::PointOfContact, contact(party));
    }

    record.cloud_cover = product
        .descendant_text("Cloud_Coverage_Assessment")
        .map(|text| parse_number(text, "Cloud_Coverage_Assessment", PRODUCT))
        .transpose()?;
    record.processing_level =
        Some(required_text(&product, "PROCESSING_LEVEL", PRODUCT)?.to_owned());
    record.content_dimensions = spectral_bands(&product)?;

    add_product_links(&mut record, &product, product_uri, ctx);
    add_service_links(&mut record, ctx);

    if let Some(spacecraft) = product.descendant_text("SPACECRAFT_NAME") {
        record.acquisition.push(Platform {
            identifier: spacecraft.to_owned(),
            description: spacecraft.to_owned(),
            instruments: product
                .descendant_text("DATATAKE_TYPE")
                .map(|datatake| Instrument {
                    identifier: datatake.to_owned(),
                    kind: product_type.to_owned(),
                })
                .into_iter()
                .collect(),
        });
    }

    Ok(record)
}

fn hierarchy_level(inspire: &XmlElement) -> HierarchyLevel {
    inspire
        .descendant("hierarchyLevel")
        .and_then(code_list_value)
        .and_then(|code| code.parse().ok())
        .unwrap_or(HierarchyLevel::Dataset)
}

/// `codeListValue` of the first code element below `element`, or its text.
fn code_list_value(element: &XmlElement) -> Option<&str> {
    let code = element.children.first()?;
    code.attr("codeListValue")
        .filter(|value| !value.is_empty())
        .or_else(|| code.non_empty_text())
}

fn footprint(product: &XmlElement) -> Result<BoundingBox, NormalizeError> {
    let positions = product
        .descendant("Global_Footprint")
        .and_then(|footprint| footprint.descendant_text("EXT_POS_LIST"))
        .ok_or_else(|| NormalizeError::missing(PRODUCT, "Global_Footprint/EXT_POS_LIST"))?;
    let values = positions
        .split_whitespace()
        .map(|value| parse_number(value, "EXT_POS_LIST", PRODUCT))
        .collect::<Result<Vec<_>, _>>()?;
    BoundingBox::from_lat_lon_pairs(&values).map_err(|source| NormalizeError::BoundingBox {
        document: PRODUCT,
        source,
    })
}

fn add_inspire_keywords(record: &mut CanonicalRecord, inspire: &XmlElement) {
    for (index, group) in inspire.descendants("MD_Keywords").enumerate() {
        let keywords: Vec<String> = group
            .children_named("keyword")
            .filter_map(|keyword| {
                keyword
                    .non_empty_text()
                    .or_else(|| keyword.children.iter().find_map(XmlElement::non_empty_text))
            })
            .map(str::to_owned)
            .collect();
        let keyword_type = group
            .child("type")
            .and_then(code_list_value)
            .unwrap_or("theme");
        record.add_keywords(format!("kw{index}"), KeywordSet::typed(keywords, keyword_type));
    }
}

fn product_keywords(product: &XmlElement) -> KeywordSet {
    KeywordSet::theme(PRODUCT_KEYWORDS.iter().filter_map(|(key, element)| {
        product
            .descendant_text(element)
            .map(|value| format!("{key}:{value}"))
    }))
}

fn contact(party: &XmlElement) -> Contact {
    Contact {
        individual_name: party.descendant_text("individualName").map(str::to_owned),
        organization: party.descendant_text("organisationName").map(str::to_owned),
        email: party
            .descendant_text("electronicMailAddress")
            .map(str::to_owned),
    }
}

fn spectral_bands(product: &XmlElement) -> Result<Vec<Dimension>, NormalizeError> {
    let Some(list) = product.descendant("Spectral_Information_List") else {
        return Ok(Vec::new());
    };
    list.children_named("Spectral_Information")
        .map(|band| {
            let bound = |name: &str| {
                band.descendant_text(name)
                    .map(|text| parse_number(text, name, PRODUCT))
                    .transpose()
            };
            Ok(Dimension {
                name: band
                    .attr("physicalBand")
                    .unwrap_or_default()
                    .to_owned(),
                units: band
                    .descendant("CENTRAL")
                    .and_then(|central| central.attr("unit"))
                    .map(str::to_owned),
                min: bound("MIN")?,
                max: bound("MAX")?,
            })
        })
        .collect()
}

fn add_product_links(
    record: &mut CanonicalRecord,
    product: &XmlElement,
    product_uri: &str,
    ctx: &NormalizeContext,
) {
    if let Some(base) = ctx.base_dir() {
        record.set_link(
            product_uri,
            DistributionLink::new("alternate", base)
                .with_mime_type("application/octet-stream")
                .labelled("product")
                .with_function("download"),
        );
    }

    let format = ImageFormat::from_granule_format(
        product
            .descendants("Granule")
            .find_map(|granule| granule.attr("imageFormat")),
    );
    let manifest = format!("{}/", ctx.join_url(product_uri).trim_end_matches('/'));
    let Some(organisation) = product.descendant("Product_Organisation") else {
        return;
    };
    for image in organisation
        .descendants("IMAGE_FILE")
        .filter_map(XmlElement::non_empty_text)
    {
        record.set_link(
            image,
            DistributionLink::new(
                "enclosure",
                join_url(&manifest, &format!("{image}.{}", format.extension)),
            )
            .with_mime_type(format.mime_type)
            .labelled("granule")
            .with_function("download"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fixtures::fixture, test_support::fixed_context};
    use registrar_core::{WCS_RELATION, WMS_RELATION, to_iso_xml};
    use rstest::rstest;

    fn product_xml() -> String {
        fixture("s2_product.xml")
    }

    fn inspire_xml() -> String {
        fixture("inspire.xml")
    }

    fn normalize(ctx: &NormalizeContext) -> CanonicalRecord {
        from_vendor_inspire(&product_xml(), &inspire_xml(), ctx).expect("normalize")
    }

    #[rstest]
    fn identifier_strips_packaging_suffix() {
        let record = normalize(&fixed_context());
        assert_eq!(record.identifier, "S2A_MSIL1C_20240501T102021_N0510_R065_T32TQM");
        assert_eq!(
            record.title.as_deref(),
            Some("S2A_MSIL1C_20240501T102021_N0510_R065_T32TQM.SAFE")
        );
    }

    #[rstest]
    fn external_item_id_wins() {
        let record = normalize(&fixed_context().with_item_id("catalog-item"));
        assert_eq!(record.identifier, "catalog-item");
    }

    #[rstest]
    fn footprint_uses_axis_extremes() {
        let bbox = normalize(&fixed_context()).spatial_extent.expect("bbox");
        assert_eq!(
            (bbox.min_x(), bbox.min_y(), bbox.max_x(), bbox.max_y()),
            (20.0, 10.0, 25.0, 15.0)
        );
    }

    #[rstest]
    #[case(vec!["S2MSI1C"], Some("S2MSI1C"))]
    #[case(vec!["OTHER"], None)]
    fn parent_only_for_known_collections(
        #[case] collections: Vec<&str>,
        #[case] expected: Option<&str>,
    ) {
        let record = normalize(&fixed_context().with_collections(collections));
        assert_eq!(record.parent_identifier.as_deref(), expected);
    }

    #[rstest]
    fn product_keywords_carry_element_values() {
        let record = normalize(&fixed_context());
        assert_eq!(
            record.keywords["product"].keywords,
            vec![
                "eo:productType:S2MSI1C",
                "eo:orbitNumber:65",
                "eo:orbitDirection:DESCENDING",
            ]
        );
        assert_eq!(record.keywords["kw0"].keywords, vec!["Orthoimagery"]);
        assert_eq!(record.keywords["kw1"].keyword_type, "place");
    }

    #[rstest]
    fn bands_are_read_per_element() {
        let record = normalize(&fixed_context());
        let bands: Vec<_> = record
            .content_dimensions
            .iter()
            .map(|band| (band.name.as_str(), band.min, band.max))
            .collect();
        assert_eq!(
            bands,
            vec![("B1", Some(430.0), Some(457.0)), ("B2", Some(440.0), Some(538.0))]
        );
        assert_eq!(
            record
                .content_dimensions
                .first()
                .and_then(|band| band.units.as_deref()),
            Some("nm")
        );
    }

    #[rstest]
    fn granule_links_resolve_below_the_manifest() {
        let record = normalize(&fixed_context().with_base_url("s3://eodata/2024/05/01"));
        let granule = &record.distribution_links["GRANULE/L1C_T32TQM/IMG_DATA/T32TQM_B01"];
        assert_eq!(
            granule.url,
            "s3://eodata/2024/05/01/S2A_MSIL1C_20240501T102021_N0510_R065_T32TQM.SAFE/GRANULE/L1C_T32TQM/IMG_DATA/T32TQM_B01.jp2"
        );
        assert_eq!(granule.mime_type.as_deref(), Some("image/jp2"));
        let product = &record.distribution_links["S2A_MSIL1C_20240501T102021_N0510_R065_T32TQM.SAFE"];
        assert_eq!(product.url, "s3://eodata/2024/05/01/");
    }

    #[rstest]
    fn service_links_follow_the_context() {
        let without = normalize(&fixed_context());
        assert!(
            without
                .distribution_links
                .values()
                .all(|link| link.relation != WMS_RELATION)
        );
        let with = normalize(&fixed_context().with_ows_url("https://ows.example.com/ows"));
        let relations: Vec<_> = with
            .distribution_links
            .values()
            .map(|link| link.relation.as_str())
            .collect();
        assert!(relations.contains(&WMS_RELATION));
        assert!(relations.contains(&WCS_RELATION));
    }

    #[rstest]
    fn missing_footprint_is_a_mapping_error() {
        let product = product_xml().replace("EXT_POS_LIST", "OTHER_LIST");
        let err = from_vendor_inspire(&product, &inspire_xml(), &fixed_context())
            .expect_err("no footprint");
        assert!(matches!(err, NormalizeError::MissingField { .. }));
    }

    #[rstest]
    fn malformed_inspire_document_is_a_parse_error() {
        let err = from_vendor_inspire(&product_xml(), "<MD_Metadata>", &fixed_context())
            .expect_err("malformed");
        assert!(matches!(err, NormalizeError::Xml { document, .. } if document == INSPIRE));
    }

    #[rstest]
    fn normalization_is_deterministic() {
        let ctx = fixed_context().with_ows_url("https://ows.example.com/ows");
        let first = to_iso_xml(&normalize(&ctx)).expect("serialize");
        let second = to_iso_xml(&normalize(&ctx)).expect("serialize");
        assert_eq!(first, second);
    }

    #[rstest]
    #[case(Some("TIFF"), "image/x.geotiff", "tif")]
    #[case(Some("PNG"), "NA", "NA")]
    #[case(None, "NA", "NA")]
    fn maps_granule_formats(
        #[case] format: Option<&str>,
        #[case] mime_type: &str,
        #[case] extension: &str,
    ) {
        let mapped = ImageFormat::from_granule_format(format);
        assert_eq!((mapped.mime_type, mapped.extension), (mime_type, extension));
    }
}
