//! Canonical discovery-metadata record.
//!
//! Every normalizer produces a [`CanonicalRecord`]; the ISO writer and the
//! upsert engine consume it. Records are plain values built fresh for each
//! source document, so nothing is shared between normalizations.

use std::{fmt, str::FromStr};

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use thiserror::Error;

mod distribution;
mod extent;

pub use distribution::{DistributionLink, WCS_RELATION, WMS_RELATION};
pub use extent::{BoundingBox, BoundingBoxError, Crs, TemporalExtent, WGS84_EPSG};

/// Default metadata language (ISO 639-2).
pub const DEFAULT_LANGUAGE: &str = "eng";

/// Scope of the resource a record describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HierarchyLevel {
    /// An executable application package, such as a workflow.
    Application,
    /// A single data product.
    Dataset,
    /// A series of related datasets.
    Series,
    /// A collection of products.
    Collection,
    /// A network service.
    Service,
    /// Software artefacts.
    Software,
    /// Any other ISO scope code.
    Other(String),
}

impl HierarchyLevel {
    /// ISO 19115 `MD_ScopeCode` value for this level.
    #[must_use]
    pub fn scope_code(&self) -> &str {
        match self {
            Self::Application => "application",
            Self::Dataset => "dataset",
            Self::Series => "series",
            Self::Collection => "collection",
            Self::Service => "service",
            Self::Software => "software",
            Self::Other(code) => code,
        }
    }

    /// Whether the record describes a service rather than data.
    #[must_use]
    pub const fn is_service(&self) -> bool {
        matches!(self, Self::Service)
    }
}

impl fmt::Display for HierarchyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scope_code())
    }
}

/// Error returned when parsing an empty hierarchy level.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("hierarchy level must not be empty")]
pub struct EmptyHierarchyLevel;

impl FromStr for HierarchyLevel {
    type Err = EmptyHierarchyLevel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Ok(match trimmed.to_ascii_lowercase().as_str() {
            "" => return Err(EmptyHierarchyLevel),
            "application" => Self::Application,
            "dataset" => Self::Dataset,
            "series" => Self::Series,
            "collection" => Self::Collection,
            "service" => Self::Service,
            "software" => Self::Software,
            _ => Self::Other(trimmed.to_owned()),
        })
    }
}

/// Named group of keywords sharing a theme type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordSet {
    /// Keywords in insertion order.
    pub keywords: Vec<String>,
    /// ISO `MD_KeywordTypeCode` such as `theme` or `place`.
    pub keyword_type: String,
}

impl KeywordSet {
    /// Build a `theme` keyword set.
    pub fn theme<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::typed(keywords, "theme")
    }

    /// Build a keyword set with an explicit type code.
    pub fn typed<I, S>(keywords: I, keyword_type: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            keyword_type: keyword_type.into(),
        }
    }
}

/// A band or other named content dimension.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dimension {
    /// Band name.
    pub name: String,
    /// Unit of `min`/`max`, such as `nm`.
    pub units: Option<String>,
    /// Lower bound of the band.
    pub min: Option<f64>,
    /// Upper bound of the band.
    pub max: Option<f64>,
}

impl Dimension {
    /// A dimension carrying only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Instrument carried by a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    /// Instrument identifier.
    pub identifier: String,
    /// Instrument type description.
    pub kind: String,
}

/// Acquisition platform and its instruments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Platform identifier, such as a spacecraft name.
    pub identifier: String,
    /// Free-text description.
    pub description: String,
    /// Instruments on board.
    pub instruments: Vec<Instrument>,
}

/// Role of a contact attached to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactRole {
    /// `pointOfContact`.
    PointOfContact,
    /// `author`.
    Author,
    /// `distributor`.
    Distributor,
}

impl ContactRole {
    /// ISO `CI_RoleCode` value.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::PointOfContact => "pointOfContact",
            Self::Author => "author",
            Self::Distributor => "distributor",
        }
    }
}

/// Responsible party for the described resource.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Contact {
    /// Person name.
    pub individual_name: Option<String>,
    /// Organisation name.
    pub organization: Option<String>,
    /// E-mail address.
    pub email: Option<String>,
}

/// Serialized record in the catalog store's native encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordPayload {
    /// ISO 19139 / 19139-2 XML document.
    IsoXml(String),
    /// JSON document accepted verbatim.
    Json(serde_json::Value),
}

impl RecordPayload {
    /// Short label naming the payload encoding.
    #[must_use]
    pub const fn format(&self) -> &'static str {
        match self {
            Self::IsoXml(_) => "iso19139",
            Self::Json(_) => "json",
        }
    }
}

/// In-memory discovery-metadata record shared by all normalizers.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use registrar_core::{
///     CanonicalRecord, DistributionLink, HierarchyLevel, KeywordSet, format_timestamp,
/// };
///
/// let stamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
/// let mut record =
///     CanonicalRecord::new("S2A_TILE", HierarchyLevel::Dataset, format_timestamp(&stamp));
/// record.add_keywords("default", KeywordSet::theme(["processing"]));
/// record.set_link("product", DistributionLink::new("alternate", "s3://bucket/S2A_TILE"));
/// record.set_link("product", DistributionLink::new("enclosure", "s3://bucket/other"));
///
/// assert_eq!(record.distribution_links.len(), 1);
/// assert_eq!(record.distribution_links["product"].url, "s3://bucket/other");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    /// Catalog-wide unique identifier.
    pub identifier: String,
    /// Identifier of the collection or service this record belongs to.
    pub parent_identifier: Option<String>,
    /// Scope of the described resource.
    pub hierarchy_level: HierarchyLevel,
    /// Metadata language.
    pub language: String,
    /// Display title.
    pub title: Option<String>,
    /// Display abstract.
    pub abstract_text: Option<String>,
    /// Edition or version string.
    pub edition: Option<String>,
    /// Metadata timestamp (ISO 8601).
    pub datestamp: String,
    /// Resource creation date.
    pub creation_date: Option<String>,
    /// Resource publication date.
    pub publication_date: Option<String>,
    /// ISO `MD_ProgressCode`.
    pub status: String,
    /// ISO `MD_MaintenanceFrequencyCode`.
    pub maintenance_frequency: String,
    /// ISO topic categories.
    pub topic_categories: Vec<String>,
    /// Free-text access constraints.
    pub access_constraints: Option<String>,
    /// Geographic extent.
    pub spatial_extent: Option<BoundingBox>,
    /// Temporal extent.
    pub temporal_extent: Option<TemporalExtent>,
    /// Keyword sets keyed by name.
    pub keywords: IndexMap<String, KeywordSet>,
    /// Bands and other content dimensions, in order.
    pub content_dimensions: Vec<Dimension>,
    /// Cloud cover percentage.
    pub cloud_cover: Option<f64>,
    /// Product processing level.
    pub processing_level: Option<String>,
    /// Distribution links keyed by name; a later write to a key replaces it.
    pub distribution_links: IndexMap<String, DistributionLink>,
    /// Responsible parties by role.
    pub contacts: IndexMap<ContactRole, Contact>,
    /// Lineage statement.
    pub lineage: Option<String>,
    /// Acquisition platforms.
    pub acquisition: Vec<Platform>,
}

impl CanonicalRecord {
    /// Start a record with the mandatory fields.
    pub fn new(
        identifier: impl Into<String>,
        hierarchy_level: HierarchyLevel,
        datestamp: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            parent_identifier: None,
            hierarchy_level,
            language: DEFAULT_LANGUAGE.to_owned(),
            title: None,
            abstract_text: None,
            edition: None,
            datestamp: datestamp.into(),
            creation_date: None,
            publication_date: None,
            status: "onGoing".to_owned(),
            maintenance_frequency: "continual".to_owned(),
            topic_categories: Vec::new(),
            access_constraints: None,
            spatial_extent: None,
            temporal_extent: None,
            keywords: IndexMap::new(),
            content_dimensions: Vec::new(),
            cloud_cover: None,
            processing_level: None,
            distribution_links: IndexMap::new(),
            contacts: IndexMap::new(),
            lineage: None,
            acquisition: Vec::new(),
        }
    }

    /// Add a keyword set, appending to an existing set of the same name.
    pub fn add_keywords(&mut self, name: impl Into<String>, set: KeywordSet) {
        match self.keywords.entry(name.into()) {
            indexmap::map::Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                for keyword in set.keywords {
                    if !existing.keywords.contains(&keyword) {
                        existing.keywords.push(keyword);
                    }
                }
            }
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(set);
            }
        }
    }

    /// Insert or replace the link stored under `key`.
    ///
    /// Replacing keeps the original position of the key.
    pub fn set_link(&mut self, key: impl Into<String>, link: DistributionLink) {
        self.distribution_links.insert(key.into(), link);
    }

    /// Attach a contact for `role`, replacing any previous one.
    pub fn set_contact(&mut self, role: ContactRole, contact: Contact) {
        self.contacts.insert(role, contact);
    }

    /// Whether acquisition information requires the 19139-2 encoding.
    #[must_use]
    pub fn has_acquisition(&self) -> bool {
        !self.acquisition.is_empty()
    }
}

/// Format a timestamp the way records store them.
#[must_use]
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}
