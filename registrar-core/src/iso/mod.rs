//! ISO 19139 encoding and read-back.
//!
//! [`to_iso_xml`] serializes a [`CanonicalRecord`](crate::CanonicalRecord);
//! [`parse_iso_summary`] reads the indexable fields back out of any ISO
//! document, whether produced here or supplied verbatim.

use thiserror::Error;

use crate::xml::XmlError;

mod reader;
mod writer;

pub use reader::{IsoSummary, parse_iso_summary};
pub use writer::to_iso_xml;

/// Errors raised while serializing a record.
#[derive(Debug, Error)]
pub enum IsoWriteError {
    /// The record has no identifier.
    #[error("record identifier must be set before serialization")]
    MissingIdentifier,
    /// The XML writer failed.
    #[error("failed to write XML: {0}")]
    Xml(#[from] quick_xml::Error),
    /// The underlying buffer rejected a write.
    #[error("failed to write XML: {0}")]
    Io(#[from] std::io::Error),
    /// The writer produced invalid UTF-8.
    #[error("serialized XML is not valid UTF-8: {0}")]
    Utf8(#[source] std::string::FromUtf8Error),
}

/// Errors raised while reading an ISO document back.
#[derive(Debug, Error)]
pub enum IsoReadError {
    /// The document is not well-formed XML.
    #[error(transparent)]
    Xml(#[from] XmlError),
    /// The root element is not an ISO metadata record.
    #[error("unexpected root element `{found}`; expected MD_Metadata or MI_Metadata")]
    UnexpectedRoot {
        /// Local name of the root element found.
        found: String,
    },
    /// The record has no `fileIdentifier`.
    #[error("ISO record has no fileIdentifier")]
    MissingIdentifier,
    /// A bounding box coordinate could not be parsed.
    #[error("invalid {field} value `{value}`")]
    InvalidCoordinate {
        /// Element holding the value.
        field: &'static str,
        /// Raw text.
        value: String,
    },
}

#[cfg(test)]
mod tests;
