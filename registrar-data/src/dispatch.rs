//! Source adapter selection for catalog items.
//!
//! An item declares named assets; the assets present decide which
//! normalizer runs. The rules overlap, so their order matters:
//!
//! 1. `inspire-metadata` and `product-metadata` → vendor/INSPIRE pair
//! 2. `iso-metadata` → ISO passthrough
//! 3. `MTL` → Landsat
//! 4. anything else → generic STAC item

use indexmap::IndexMap;
use log::{debug, info};
use registrar_core::{CanonicalRecord, RecordPayload};
use serde_json::Value;

use crate::{
    error::RegistrationError,
    normalize::{
        NormalizeContext, NormalizeError, landsat, parse_json, passthrough, required_json_str,
        stac, vendor,
    },
    source::Source,
    staging::Staging,
};

/// Asset key of the INSPIRE record of a vendor product.
pub const INSPIRE_METADATA: &str = "inspire-metadata";
/// Asset key of the vendor product metadata document.
pub const PRODUCT_METADATA: &str = "product-metadata";
/// Asset key of a ready-made ISO record.
pub const ISO_METADATA: &str = "iso-metadata";
/// Asset key of a Landsat MTL file.
pub const LANDSAT_METADATA: &str = "MTL";

/// Named assets of an item, mapped to their references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemAssets {
    assets: IndexMap<String, String>,
}

impl ItemAssets {
    /// Add an asset.
    #[must_use]
    pub fn with_asset(mut self, key: impl Into<String>, href: impl Into<String>) -> Self {
        self.assets.insert(key.into(), href.into());
        self
    }

    /// Collect the assets of a parsed STAC item.
    ///
    /// Assets without an `href` are ignored.
    #[must_use]
    pub fn from_stac_item(item: &Value) -> Self {
        let assets = item
            .get("assets")
            .and_then(Value::as_object)
            .into_iter()
            .flatten()
            .filter_map(|(key, asset)| {
                let href = asset.get("href").and_then(Value::as_str)?;
                Some((key.clone(), href.to_owned()))
            })
            .collect();
        Self { assets }
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.assets.contains_key(key)
    }

    /// Reference of `key`.
    #[must_use]
    pub fn href(&self, key: &str) -> Option<&str> {
        self.assets.get(key).map(String::as_str)
    }
}

/// Normalizer chosen for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceAdapter {
    /// Vendor product metadata with its INSPIRE record.
    VendorInspire,
    /// Ready-made ISO record upserted verbatim.
    IsoPassthrough,
    /// Landsat MTL followed by the generic STAC pass.
    Landsat,
    /// Generic STAC item.
    GenericStac,
}

/// Choose the adapter for `assets`.
///
/// # Examples
///
/// ```
/// use registrar_data::dispatch::{ItemAssets, SourceAdapter, select_adapter};
///
/// let assets = ItemAssets::default()
///     .with_asset("MTL", "scene_MTL.txt")
///     .with_asset("iso-metadata", "scene_iso.xml");
/// assert_eq!(select_adapter(&assets), SourceAdapter::IsoPassthrough);
/// ```
#[must_use]
pub fn select_adapter(assets: &ItemAssets) -> SourceAdapter {
    if assets.contains(INSPIRE_METADATA) && assets.contains(PRODUCT_METADATA) {
        SourceAdapter::VendorInspire
    } else if assets.contains(ISO_METADATA) {
        SourceAdapter::IsoPassthrough
    } else if assets.contains(LANDSAT_METADATA) {
        SourceAdapter::Landsat
    } else {
        SourceAdapter::GenericStac
    }
}

/// Output of an item registration, ready for the upserter.
#[derive(Debug, Clone, PartialEq)]
pub enum PreparedItem {
    /// A normalized record.
    Record(Box<CanonicalRecord>),
    /// A payload accepted verbatim.
    Payload(RecordPayload),
}

/// Resolve an asset reference relative to the item that declares it.
///
/// Absolute URLs and root-relative paths are returned unchanged.
#[must_use]
pub fn resolve_asset(item_path: &str, href: &str) -> String {
    if href.contains("://") || href.starts_with('/') {
        return href.to_owned();
    }
    let href = href.trim_start_matches("./");
    match item_path.rsplit_once('/') {
        Some((dir, _)) => format!("{dir}/{href}"),
        None => href.to_owned(),
    }
}

/// Stages and normalizes one catalog item.
///
/// Staged files live in a scoped temporary directory that is removed when
/// [`ItemRegistration::prepare`] returns, whether it succeeds or fails.
pub struct ItemRegistration<'a> {
    source: &'a dyn Source,
    ctx: &'a NormalizeContext,
}

impl<'a> ItemRegistration<'a> {
    /// Create a registration reading from `source`.
    #[must_use]
    pub const fn new(source: &'a dyn Source, ctx: &'a NormalizeContext) -> Self {
        Self { source, ctx }
    }

    /// Read the item at `item_path` and produce its catalog payload.
    pub fn prepare(&self, item_path: &str) -> Result<PreparedItem, RegistrationError> {
        let staging = Staging::new()?;
        let item_json = staging.read(self.source, item_path)?;
        let item = parse_json(&item_json, "STAC item")?;
        let item_id = required_json_str(&item, "/id", "STAC item")?;
        let assets = ItemAssets::from_stac_item(&item);
        let adapter = select_adapter(&assets);
        info!("registering item {item_id} with the {adapter:?} adapter");

        let mut ctx = self.ctx.clone();
        if ctx.item_id.is_none() {
            ctx.item_id = Some(item_id.to_owned());
        }
        let fetch = |key: &'static str| -> Result<String, RegistrationError> {
            let href = assets
                .href(key)
                .ok_or_else(|| RegistrationError::MissingAsset {
                    item: item_path.to_owned(),
                    asset: key,
                })?;
            let path = resolve_asset(item_path, href);
            debug!("staging {key} asset {path}");
            Ok(staging.read(self.source, &path)?)
        };

        let prepared = match adapter {
            SourceAdapter::VendorInspire => {
                let product = fetch(PRODUCT_METADATA)?;
                let inspire = fetch(INSPIRE_METADATA)?;
                let record = vendor::from_vendor_inspire(&product, &inspire, &ctx)?;
                PreparedItem::Record(Box::new(record))
            }
            SourceAdapter::IsoPassthrough => {
                PreparedItem::Payload(passthrough::iso_xml(&fetch(ISO_METADATA)?)?)
            }
            SourceAdapter::Landsat => {
                let mtl = fetch(LANDSAT_METADATA)?;
                let record = landsat::from_landsat(&mtl, Some(&item_json), &ctx)?;
                PreparedItem::Record(Box::new(record))
            }
            SourceAdapter::GenericStac => {
                let record = generic_item(&item, &ctx)?;
                PreparedItem::Record(Box::new(record))
            }
        };
        staging.close()?;
        Ok(prepared)
    }
}

fn generic_item(item: &Value, ctx: &NormalizeContext) -> Result<CanonicalRecord, NormalizeError> {
    let mut record = stac::from_stac_item(&item.to_string(), ctx)?;
    if let Some(item_id) = ctx.item_id.as_deref() {
        record.identifier = item_id.to_owned();
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fixtures::fixture,
        source::TransferError,
        test_support::{StubSource, fixed_context},
    };
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(&[INSPIRE_METADATA, PRODUCT_METADATA, ISO_METADATA, LANDSAT_METADATA], SourceAdapter::VendorInspire)]
    #[case(&[INSPIRE_METADATA, ISO_METADATA], SourceAdapter::IsoPassthrough)]
    #[case(&[ISO_METADATA, LANDSAT_METADATA], SourceAdapter::IsoPassthrough)]
    #[case(&[PRODUCT_METADATA, LANDSAT_METADATA], SourceAdapter::Landsat)]
    #[case(&[INSPIRE_METADATA], SourceAdapter::GenericStac)]
    #[case(&[], SourceAdapter::GenericStac)]
    fn applies_rules_in_order(#[case] keys: &[&str], #[case] expected: SourceAdapter) {
        let assets = keys
            .iter()
            .fold(ItemAssets::default(), |assets, key| assets.with_asset(*key, "x"));
        assert_eq!(select_adapter(&assets), expected);
    }

    #[rstest]
    #[case("items/S2A/item.json", "MTD.xml", "items/S2A/MTD.xml")]
    #[case("items/S2A/item.json", "./INSPIRE.xml", "items/S2A/INSPIRE.xml")]
    #[case("item.json", "MTD.xml", "MTD.xml")]
    #[case("items/item.json", "https://host/MTD.xml", "https://host/MTD.xml")]
    fn resolves_assets_beside_the_item(
        #[case] item: &str,
        #[case] href: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(resolve_asset(item, href), expected);
    }

    fn vendor_item() -> String {
        json!({
            "id": "S2A_MSIL1C_20240501T102021_N0510_R065_T32TQM",
            "properties": {"datetime": "2024-05-01T10:20:21Z"},
            "assets": {
                "product-metadata": {"href": "MTD_MSIL1C.xml"},
                "inspire-metadata": {"href": "INSPIRE.xml"}
            }
        })
        .to_string()
    }

    #[rstest]
    fn vendor_items_are_normalized_from_staged_files() {
        let source = StubSource::default()
            .with_file("S2A/item.json", vendor_item())
            .with_file("S2A/MTD_MSIL1C.xml", fixture("s2_product.xml"))
            .with_file("S2A/INSPIRE.xml", fixture("inspire.xml"));
        let ctx = fixed_context();
        let prepared = ItemRegistration::new(&source, &ctx)
            .prepare("S2A/item.json")
            .expect("prepare");
        let PreparedItem::Record(record) = prepared else {
            panic!("expected a record");
        };
        assert_eq!(
            record.identifier,
            "S2A_MSIL1C_20240501T102021_N0510_R065_T32TQM"
        );
        assert_eq!(record.processing_level.as_deref(), Some("Level-1C"));
    }

    #[rstest]
    fn iso_assets_win_over_landsat_metadata() {
        let item = json!({
            "id": "scene",
            "properties": {"datetime": "2024-05-01T00:00:00Z"},
            "assets": {
                "MTL": {"href": "scene_MTL.txt"},
                "iso-metadata": {"href": "scene_iso.xml"}
            }
        });
        let iso = "<gmd:MD_Metadata xmlns:gmd=\"http://www.isotc211.org/2005/gmd\"/>";
        let source = StubSource::default()
            .with_file("scene/item.json", item.to_string())
            .with_file("scene/scene_iso.xml", iso);
        let ctx = fixed_context();
        let prepared = ItemRegistration::new(&source, &ctx)
            .prepare("scene/item.json")
            .expect("prepare");
        assert_eq!(prepared, PreparedItem::Payload(RecordPayload::IsoXml(iso.to_owned())));
    }

    #[rstest]
    fn transfer_failures_abort_the_item() {
        let source = StubSource::default().with_file("S2A/item.json", vendor_item());
        let ctx = fixed_context();
        let err = ItemRegistration::new(&source, &ctx)
            .prepare("S2A/item.json")
            .expect_err("product metadata is missing");
        assert!(matches!(
            err,
            RegistrationError::Transfer(TransferError::Io { .. })
        ));
    }

    #[rstest]
    fn generic_items_keep_their_identifier() {
        let source = StubSource::default().with_file("out/item.json", fixture("stac_item.json"));
        let ctx = fixed_context();
        let prepared = ItemRegistration::new(&source, &ctx)
            .prepare("out/item.json")
            .expect("prepare");
        let PreparedItem::Record(record) = prepared else {
            panic!("expected a record");
        };
        assert_eq!(record.identifier, "S2B_T32TQM_20240501_ndvi");
    }
}
