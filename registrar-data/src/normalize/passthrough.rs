//! Records that are already in a catalog encoding.
//!
//! Passthrough documents are not mapped onto a canonical record; they are
//! checked for well-formedness and handed to the upserter verbatim.

use registrar_core::RecordPayload;

use super::{NormalizeError, parse_json, parse_xml};

/// Accept an ISO 19139 document as-is.
pub fn iso_xml(document: &str) -> Result<RecordPayload, NormalizeError> {
    parse_xml(document, "ISO metadata")?;
    Ok(RecordPayload::IsoXml(document.to_owned()))
}

/// Accept a JSON record as-is.
pub fn json(document: &str) -> Result<RecordPayload, NormalizeError> {
    parse_json(document, "JSON record").map(RecordPayload::Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn keeps_iso_documents_verbatim() {
        let document = "<gmd:MD_Metadata xmlns:gmd=\"http://www.isotc211.org/2005/gmd\"/>";
        assert_eq!(
            iso_xml(document).expect("well formed"),
            RecordPayload::IsoXml(document.to_owned())
        );
    }

    #[rstest]
    fn rejects_malformed_documents() {
        assert!(matches!(
            iso_xml("<gmd:MD_Metadata>"),
            Err(NormalizeError::Xml { .. })
        ));
        assert!(matches!(json("{"), Err(NormalizeError::Json { .. })));
    }
}
