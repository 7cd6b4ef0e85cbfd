//! Errors raised while mapping source documents onto records.

use registrar_core::{BoundingBoxError, xml::XmlError};
use thiserror::Error;

/// Errors raised by the normalizers.
///
/// Parse failures name the document that failed; mapping failures also name
/// the field that was absent or unusable.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NormalizeError {
    /// A JSON document is malformed.
    #[error("malformed JSON in {document}: {source}")]
    Json {
        /// Document being parsed.
        document: &'static str,
        /// Decoder failure.
        #[source]
        source: serde_json::Error,
    },
    /// A YAML document is malformed.
    #[error("malformed YAML in {document}: {source}")]
    Yaml {
        /// Document being parsed.
        document: &'static str,
        /// Decoder failure.
        #[source]
        source: serde_yaml::Error,
    },
    /// An XML document is malformed.
    #[error("malformed XML in {document}: {source}")]
    Xml {
        /// Document being parsed.
        document: &'static str,
        /// Parser failure.
        #[source]
        source: XmlError,
    },
    /// A required field is absent.
    #[error("{document} is missing required field `{field}`")]
    MissingField {
        /// Document being mapped.
        document: &'static str,
        /// Path of the missing field.
        field: String,
    },
    /// A field is present but cannot be interpreted.
    #[error("{document} field `{field}` has invalid value {value:?}")]
    InvalidValue {
        /// Document being mapped.
        document: &'static str,
        /// Path of the offending field.
        field: String,
        /// Offending value.
        value: String,
    },
    /// A workflow descriptor defines no `Workflow` node.
    #[error("workflow descriptor contains no node of class `Workflow`")]
    NoWorkflow,
    /// Coordinates do not form a valid extent.
    #[error("invalid extent in {document}: {source}")]
    BoundingBox {
        /// Document being mapped.
        document: &'static str,
        /// Extent failure.
        #[source]
        source: BoundingBoxError,
    },
}

impl NormalizeError {
    pub(crate) fn missing(document: &'static str, field: impl Into<String>) -> Self {
        Self::MissingField {
            document,
            field: field.into(),
        }
    }

    pub(crate) fn invalid(
        document: &'static str,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            document,
            field: field.into(),
            value: value.into(),
        }
    }
}
