//! Distribution links advertised by a record.

/// Relation used by derived map-service links.
pub const WMS_RELATION: &str = "http://www.opengis.net/def/serviceType/ogc/wms";
/// Relation used by derived coverage-service links.
pub const WCS_RELATION: &str = "http://www.opengis.net/def/serviceType/ogc/wcs";

/// A single online resource through which the described resource is
/// distributed or documented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionLink {
    /// Link relation, such as `data`, `enclosure` or a service type URI.
    pub relation: String,
    /// Target URL.
    pub url: String,
    /// Media type or OGC protocol label.
    pub mime_type: Option<String>,
    /// Short name.
    pub name: Option<String>,
    /// Longer description.
    pub description: Option<String>,
    /// Online function code, such as `download`.
    pub function: Option<String>,
}

impl DistributionLink {
    /// Create a link with only a relation and URL.
    pub fn new(relation: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            url: url.into(),
            mime_type: None,
            name: None,
            description: None,
            function: None,
        }
    }

    /// Set the media type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set both name and description to the same label.
    #[must_use]
    pub fn labelled(self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.with_name(label.clone()).with_description(label)
    }

    /// Set the online function code.
    #[must_use]
    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }
}
