//! Format normalizers mapping source documents onto [`CanonicalRecord`]s.
//!
//! Each normalizer is a pure function of its input documents and a
//! [`NormalizeContext`]. Records are built from scratch on every call.
//!
//! | Source shape                  | Entry point                          |
//! |-------------------------------|--------------------------------------|
//! | Vendor product + INSPIRE XML  | [`vendor::from_vendor_inspire`]      |
//! | STAC item                     | [`stac::from_stac_item`]             |
//! | STAC collection               | [`stac::from_stac_collection`]       |
//! | Landsat MTL (+ STAC item)     | [`landsat::from_landsat`]            |
//! | CWL workflow descriptor       | [`cwl::from_cwl`]                    |
//! | OGC API Processes service     | [`service::from_service`]            |
//! | ISO XML or JSON record        | [`passthrough::iso_xml`], [`passthrough::json`] |

use registrar_core::{
    CanonicalRecord,
    xml::{XmlElement, parse_document},
};
use serde_json::Value;

mod context;
mod error;

pub mod cwl;
pub mod landsat;
pub mod links;
pub mod passthrough;
pub mod service;
pub mod stac;
pub mod vendor;

pub use context::{NormalizeContext, join_url};
pub use error::NormalizeError;

pub(crate) fn parse_json(text: &str, document: &'static str) -> Result<Value, NormalizeError> {
    serde_json::from_str(text).map_err(|source| NormalizeError::Json { document, source })
}

pub(crate) fn parse_xml(text: &str, document: &'static str) -> Result<XmlElement, NormalizeError> {
    parse_document(text).map_err(|source| NormalizeError::Xml { document, source })
}

/// Non-empty string at a JSON pointer.
pub(crate) fn json_str<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}

pub(crate) fn required_json_str<'a>(
    value: &'a Value,
    pointer: &str,
    document: &'static str,
) -> Result<&'a str, NormalizeError> {
    json_str(value, pointer).ok_or_else(|| NormalizeError::missing(document, pointer))
}

/// Strings from a JSON value that is either a string or an array of them.
pub(crate) fn json_strings(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(text)) if !text.is_empty() => vec![text.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    }
}

/// Numbers from a JSON array, failing on any non-numeric entry.
pub(crate) fn json_numbers(
    value: &Value,
    field: &str,
    document: &'static str,
) -> Result<Vec<f64>, NormalizeError> {
    let items = value
        .as_array()
        .ok_or_else(|| NormalizeError::invalid(document, field, value.to_string()))?;
    items
        .iter()
        .map(|item| {
            item.as_f64()
                .ok_or_else(|| NormalizeError::invalid(document, field, item.to_string()))
        })
        .collect()
}

pub(crate) fn required_text<'a>(
    root: &'a XmlElement,
    local_name: &str,
    document: &'static str,
) -> Result<&'a str, NormalizeError> {
    root.descendant_text(local_name)
        .ok_or_else(|| NormalizeError::missing(document, local_name))
}

pub(crate) fn parse_number(
    text: &str,
    field: &str,
    document: &'static str,
) -> Result<f64, NormalizeError> {
    text.trim()
        .parse()
        .map_err(|_| NormalizeError::invalid(document, field, text))
}

/// Set title and abstract when the record has none yet.
pub(crate) fn default_title(record: &mut CanonicalRecord, title: &str) {
    if record.title.is_none() {
        record.title = Some(title.to_owned());
    }
}
