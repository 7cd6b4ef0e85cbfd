//! Landsat scenes described by an MTL metadata file.
//!
//! The MTL pass populates identity, timing, footprint and per-band links.
//! When the scene also has a STAC item, the generic STAC pass runs second
//! and overwrites links that share a key, so derived links win.

use indexmap::IndexMap;
use log::debug;
use registrar_core::{
    BoundingBox, CanonicalRecord, DistributionLink, HierarchyLevel, Instrument, KeywordSet,
    Platform, TemporalExtent,
};

use super::{
    NormalizeContext, NormalizeError, links::add_service_links, parse_json, parse_number,
    parse_xml, stac::apply_stac_item,
};

const MTL: &str = "Landsat MTL";
const BAND_FILE_PREFIX: &str = "FILE_NAME_BAND_";
const BAND_MIME_TYPE: &str = "image/tiff; application=geotiff";

/// Product corners in footprint order, as `(latitude, longitude)` keys.
const CORNERS: [(&str, &str); 4] = [
    ("CORNER_UL_LAT_PRODUCT", "CORNER_UL_LON_PRODUCT"),
    ("CORNER_UR_LAT_PRODUCT", "CORNER_UR_LON_PRODUCT"),
    ("CORNER_LR_LAT_PRODUCT", "CORNER_LR_LON_PRODUCT"),
    ("CORNER_LL_LAT_PRODUCT", "CORNER_LL_LON_PRODUCT"),
];

/// Flattened `KEY = value` pairs of an MTL file.
///
/// Group structure is discarded; the first occurrence of a key wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MtlFields {
    fields: IndexMap<String, String>,
}

impl MtlFields {
    /// Parse an MTL file in either the ODL text or the XML encoding.
    ///
    /// # Examples
    ///
    /// ```
    /// use registrar_data::normalize::landsat::MtlFields;
    ///
    /// let fields = MtlFields::parse(
    ///     "GROUP = PRODUCT_CONTENTS\n  LANDSAT_PRODUCT_ID = \"LC08_X\"\nEND_GROUP\nEND\n",
    /// )?;
    /// assert_eq!(fields.get("LANDSAT_PRODUCT_ID"), Some("LC08_X"));
    /// # Ok::<(), registrar_data::normalize::NormalizeError>(())
    /// ```
    pub fn parse(text: &str) -> Result<Self, NormalizeError> {
        if text.trim_start().starts_with('<') {
            return Self::parse_xml(text);
        }
        let mut fields = IndexMap::new();
        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if matches!(key, "GROUP" | "END_GROUP") || key.is_empty() {
                continue;
            }
            fields
                .entry(key.to_owned())
                .or_insert_with(|| value.trim().trim_matches('"').to_owned());
        }
        Ok(Self { fields })
    }

    fn parse_xml(text: &str) -> Result<Self, NormalizeError> {
        let root = parse_xml(text, MTL)?;
        let mut fields = IndexMap::new();
        let mut stack = vec![&root];
        while let Some(element) = stack.pop() {
            if element.children.is_empty() {
                if let Some(value) = element.non_empty_text() {
                    fields
                        .entry(element.local_name.clone())
                        .or_insert_with(|| value.to_owned());
                }
            } else {
                stack.extend(element.children.iter().rev());
            }
        }
        Ok(Self { fields })
    }

    /// Value of `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &str) -> Result<&str, NormalizeError> {
        self.get(key)
            .ok_or_else(|| NormalizeError::missing(MTL, key))
    }

    fn number(&self, key: &str) -> Result<Option<f64>, NormalizeError> {
        self.get(key)
            .map(|value| parse_number(value, key, MTL))
            .transpose()
    }

    /// Band files in file order, keyed `B{n}` for numbered bands and by
    /// their suffix otherwise.
    pub fn band_files(&self) -> impl Iterator<Item = (String, &str)> {
        self.fields.iter().filter_map(|(key, value)| {
            let band = key.strip_prefix(BAND_FILE_PREFIX)?;
            let link_key = if band.chars().all(|ch| ch.is_ascii_digit()) {
                format!("B{band}")
            } else {
                band.to_owned()
            };
            Some((link_key, value.as_str()))
        })
    }
}

/// Build a record from an MTL file and, optionally, the scene's STAC item.
pub fn from_landsat(
    mtl_text: &str,
    item_json: Option<&str>,
    ctx: &NormalizeContext,
) -> Result<CanonicalRecord, NormalizeError> {
    let mtl = MtlFields::parse(mtl_text)?;
    let product_id = mtl.required("LANDSAT_PRODUCT_ID")?;
    let acquired = mtl.required("DATE_ACQUIRED")?;
    let datestamp = match mtl.get("SCENE_CENTER_TIME") {
        Some(time) => format!("{acquired}T{time}"),
        None => acquired.to_owned(),
    };
    let identifier = ctx.item_id.as_deref().unwrap_or(product_id);
    debug!("normalizing Landsat scene {product_id} as {identifier}");

    let mut record = CanonicalRecord::new(identifier, HierarchyLevel::Dataset, datestamp.clone());
    record.title = Some(product_id.to_owned());
    record.abstract_text = Some(product_id.to_owned());
    record.creation_date = Some(datestamp.clone());
    record.temporal_extent = Some(TemporalExtent::Instant(datestamp));
    record.parent_identifier = ctx.parent_identifier.clone();
    record.spatial_extent = footprint(&mtl)?;
    record.cloud_cover = mtl.number("CLOUD_COVER")?;
    record.processing_level = mtl.get("PROCESSING_LEVEL").map(str::to_owned);

    let spacecraft = mtl.get("SPACECRAFT_ID");
    let mut keywords = vec!["landsat".to_owned()];
    keywords.extend(spacecraft.map(str::to_owned));
    record.add_keywords("default", KeywordSet::theme(keywords));
    if let Some(spacecraft) = spacecraft {
        record.acquisition.push(Platform {
            identifier: spacecraft.to_owned(),
            description: spacecraft.to_owned(),
            instruments: mtl
                .get("SENSOR_ID")
                .map(|sensor| Instrument {
                    identifier: sensor.to_owned(),
                    kind: sensor.to_owned(),
                })
                .into_iter()
                .collect(),
        });
    }

    for (key, file) in mtl.band_files() {
        record.set_link(
            key,
            DistributionLink::new("data", ctx.join_url(file))
                .with_mime_type(BAND_MIME_TYPE)
                .labelled(file)
                .with_function("download"),
        );
    }
    add_service_links(&mut record, ctx);

    if let Some(item_json) = item_json {
        let item = parse_json(item_json, "STAC item")?;
        apply_stac_item(&mut record, &item, ctx)?;
    }
    Ok(record)
}

fn footprint(mtl: &MtlFields) -> Result<Option<BoundingBox>, NormalizeError> {
    let mut values = Vec::with_capacity(CORNERS.len() * 2);
    for (lat, lon) in CORNERS {
        let (Some(lat), Some(lon)) = (mtl.number(lat)?, mtl.number(lon)?) else {
            return Ok(None);
        };
        values.extend([lat, lon]);
    }
    BoundingBox::from_lat_lon_pairs(&values)
        .map(Some)
        .map_err(|source| NormalizeError::BoundingBox {
            document: MTL,
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fixtures::fixture, test_support::fixed_context};
    use rstest::rstest;

    const PRODUCT_ID: &str = "LC08_L1TP_193029_20240501_20240510_02_T1";

    #[rstest]
    #[case("landsat_mtl.txt")]
    #[case("landsat_mtl.xml")]
    fn both_encodings_yield_the_same_record(#[case] name: &str) {
        let record = from_landsat(&fixture(name), None, &fixed_context()).expect("normalize");
        assert_eq!(record.identifier, PRODUCT_ID);
        assert_eq!(record.datestamp, "2024-05-01T09:55:12.1234560Z");
        assert_eq!(record.cloud_cover, Some(12.34));
        assert_eq!(record.processing_level.as_deref(), Some("L1TP"));
        let bbox = record.spatial_extent.expect("bbox");
        assert_eq!(
            (bbox.min_x(), bbox.min_y(), bbox.max_x(), bbox.max_y()),
            (11.5, 44.0, 14.5, 46.0)
        );
        let keys: Vec<_> = record.distribution_links.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["B1", "B2"]);
    }

    #[rstest]
    fn stac_pass_overwrites_links_by_key() {
        let ctx = fixed_context().with_base_url("s3://usgs-landsat/scene");
        let record = from_landsat(
            &fixture("landsat_mtl.txt"),
            Some(&fixture("landsat_item.json")),
            &ctx,
        )
        .expect("normalize");
        let band = &record.distribution_links["B1"];
        assert_eq!(band.url, "https://landsat.example.com/scene/B1.TIF");
        assert_eq!(band.name.as_deref(), Some("Coastal aerosol"));
        assert_eq!(
            record.distribution_links["B2"].url,
            format!("s3://usgs-landsat/scene/{PRODUCT_ID}_B2.TIF")
        );
        assert_eq!(record.datestamp, "2024-05-01T09:55:12Z");
        assert_eq!(record.title.as_deref(), Some(PRODUCT_ID));
    }

    #[rstest]
    fn missing_product_id_is_a_mapping_error() {
        let err = from_landsat("DATE_ACQUIRED = 2024-05-01\n", None, &fixed_context())
            .expect_err("missing id");
        assert!(
            matches!(&err, NormalizeError::MissingField { field, .. } if field == "LANDSAT_PRODUCT_ID")
        );
    }

    #[rstest]
    fn incomplete_corners_leave_extent_unset() {
        let mtl = "LANDSAT_PRODUCT_ID = \"X\"\nDATE_ACQUIRED = 2024-05-01\nCORNER_UL_LAT_PRODUCT = 1.0\n";
        let record = from_landsat(mtl, None, &fixed_context()).expect("normalize");
        assert!(record.spatial_extent.is_none());
        assert_eq!(record.datestamp, "2024-05-01");
    }
}
