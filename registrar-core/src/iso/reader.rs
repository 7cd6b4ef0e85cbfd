//! Extraction of indexable fields from ISO metadata documents.

use crate::{
    record::{BoundingBox, HierarchyLevel, TemporalExtent},
    xml::{XmlElement, parse_document},
};

use super::IsoReadError;

/// Fields of an ISO record that the catalog indexes.
#[derive(Debug, Clone, PartialEq)]
pub struct IsoSummary {
    /// `fileIdentifier`.
    pub identifier: String,
    /// `parentIdentifier`, if present.
    pub parent_identifier: Option<String>,
    /// First `hierarchyLevel` scope code, defaulting to `dataset`.
    pub hierarchy_level: HierarchyLevel,
    /// Citation title.
    pub title: Option<String>,
    /// Identification abstract.
    pub abstract_text: Option<String>,
    /// First geographic bounding box.
    pub bbox: Option<BoundingBox>,
    /// First temporal extent.
    pub temporal: Option<TemporalExtent>,
    /// Every keyword across all keyword sets, in document order.
    pub keywords: Vec<String>,
    /// Every online resource URL, in document order.
    pub links: Vec<String>,
}

/// Parse `document` and summarise it.
pub fn parse_iso_summary(document: &str) -> Result<IsoSummary, IsoReadError> {
    let root = parse_document(document)?;
    if root.local_name != "MD_Metadata" && root.local_name != "MI_Metadata" {
        return Err(IsoReadError::UnexpectedRoot {
            found: root.local_name,
        });
    }

    let identifier = root
        .child("fileIdentifier")
        .and_then(character_string)
        .ok_or(IsoReadError::MissingIdentifier)?;
    let parent_identifier = root.child("parentIdentifier").and_then(character_string);
    let hierarchy_level = root
        .child("hierarchyLevel")
        .and_then(|level| level.child("MD_ScopeCode"))
        .and_then(code_value)
        .and_then(|code| code.parse().ok())
        .unwrap_or(HierarchyLevel::Dataset);

    let identification = root
        .child("identificationInfo")
        .and_then(|info| info.children.first());
    let title = identification
        .and_then(|ident| ident.path(&["citation", "CI_Citation", "title"]))
        .and_then(character_string);
    let abstract_text = identification
        .and_then(|ident| ident.child("abstract"))
        .and_then(character_string);
    let bbox = identification
        .and_then(|ident| ident.descendant("EX_GeographicBoundingBox"))
        .map(read_bbox)
        .transpose()?;
    let temporal = identification
        .and_then(|ident| ident.descendant("EX_TemporalExtent"))
        .and_then(read_temporal);

    let keywords = root
        .descendants("keyword")
        .filter_map(character_string)
        .collect();
    let links = root
        .descendants("URL")
        .filter_map(XmlElement::non_empty_text)
        .map(str::to_owned)
        .collect();

    Ok(IsoSummary {
        identifier,
        parent_identifier,
        hierarchy_level,
        title,
        abstract_text,
        bbox,
        temporal,
        keywords,
        links,
    })
}

fn character_string(element: &XmlElement) -> Option<String> {
    element
        .children
        .iter()
        .find(|child| child.local_name == "CharacterString" || child.local_name == "Anchor")
        .and_then(XmlElement::non_empty_text)
        .map(str::to_owned)
}

fn code_value(element: &XmlElement) -> Option<String> {
    element
        .attr("codeListValue")
        .or_else(|| element.non_empty_text())
        .map(str::to_owned)
}

fn read_bbox(element: &XmlElement) -> Result<BoundingBox, IsoReadError> {
    let west = decimal(element, "westBoundLongitude")?;
    let east = decimal(element, "eastBoundLongitude")?;
    let south = decimal(element, "southBoundLatitude")?;
    let north = decimal(element, "northBoundLatitude")?;
    Ok(BoundingBox::from_corners(west, south, east, north))
}

fn decimal(parent: &XmlElement, field: &'static str) -> Result<f64, IsoReadError> {
    let raw = parent
        .child(field)
        .and_then(|wrapper| wrapper.children.first())
        .map(XmlElement::text)
        .unwrap_or_default();
    raw.parse().map_err(|_| IsoReadError::InvalidCoordinate {
        field,
        value: raw.to_owned(),
    })
}

fn read_temporal(element: &XmlElement) -> Option<TemporalExtent> {
    if let Some(period) = element.descendant("TimePeriod") {
        let begin = period.descendant_text("beginPosition")?.to_owned();
        let end = period.descendant_text("endPosition").map(str::to_owned);
        return Some(TemporalExtent::Interval { begin, end });
    }
    element
        .descendant_text("timePosition")
        .map(|instant| TemporalExtent::Instant(instant.to_owned()))
}
