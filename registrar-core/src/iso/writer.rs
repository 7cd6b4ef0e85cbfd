//! ISO 19139 / 19139-2 encoding of canonical records.

use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

use crate::record::{
    BoundingBox, CanonicalRecord, Contact, ContactRole, Dimension, DistributionLink, KeywordSet,
    Platform, TemporalExtent,
};

use super::IsoWriteError;

const NS_GMD: &str = "http://www.isotc211.org/2005/gmd";
const NS_GCO: &str = "http://www.isotc211.org/2005/gco";
const NS_GMI: &str = "http://www.isotc211.org/2005/gmi";
const NS_GML: &str = "http://www.opengis.net/gml/3.2";
const NS_SRV: &str = "http://www.isotc211.org/2005/srv";
const NS_XLINK: &str = "http://www.w3.org/1999/xlink";
const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";

const CODE_LIST_BASE: &str =
    "http://standards.iso.org/iso/19139/resources/gmxCodelists.xml";
const LANGUAGE_CODE_LIST: &str = "http://www.loc.gov/standards/iso639-2/";

type XmlResult = Result<(), IsoWriteError>;

/// Serialize `record` as an ISO metadata document.
///
/// Records carrying acquisition information are written as
/// `gmi:MI_Metadata` (19139-2); all others as `gmd:MD_Metadata`. Output is a
/// pure function of the record.
pub fn to_iso_xml(record: &CanonicalRecord) -> Result<String, IsoWriteError> {
    if record.identifier.trim().is_empty() {
        return Err(IsoWriteError::MissingIdentifier);
    }

    let mut doc = IsoDocument::new();
    doc.write_record(record)?;
    String::from_utf8(doc.into_bytes()).map_err(IsoWriteError::Utf8)
}

struct IsoDocument {
    xml: Writer<Vec<u8>>,
    gml_ids: usize,
}

impl IsoDocument {
    fn new() -> Self {
        Self {
            xml: Writer::new_with_indent(Vec::new(), b' ', 2),
            gml_ids: 0,
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        self.xml.into_inner()
    }

    fn next_gml_id(&mut self, prefix: &str) -> String {
        self.gml_ids += 1;
        format!("{prefix}{:03}", self.gml_ids)
    }

    fn write_record(&mut self, record: &CanonicalRecord) -> XmlResult {
        let root = if record.has_acquisition() {
            "gmi:MI_Metadata"
        } else {
            "gmd:MD_Metadata"
        };

        self.xml
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let mut start = BytesStart::new(root);
        for (prefix, ns) in [
            ("xmlns:gmd", NS_GMD),
            ("xmlns:gco", NS_GCO),
            ("xmlns:gmi", NS_GMI),
            ("xmlns:gml", NS_GML),
            ("xmlns:srv", NS_SRV),
            ("xmlns:xlink", NS_XLINK),
            ("xmlns:xsi", NS_XSI),
        ] {
            start.push_attribute((prefix, ns));
        }
        self.xml.write_event(Event::Start(start))?;

        self.char_string("gmd:fileIdentifier", &record.identifier)?;
        self.language("gmd:language", &record.language)?;
        self.code("gmd:characterSet", "gmd:MD_CharacterSetCode", "utf8")?;
        if let Some(parent) = &record.parent_identifier {
            self.char_string("gmd:parentIdentifier", parent)?;
        }
        self.code(
            "gmd:hierarchyLevel",
            "gmd:MD_ScopeCode",
            record.hierarchy_level.scope_code(),
        )?;
        if let Some(contact) = record.contacts.get(&ContactRole::PointOfContact) {
            self.contact("gmd:contact", contact, ContactRole::PointOfContact)?;
        }
        self.wrapped_text("gmd:dateStamp", "gco:DateTime", &record.datestamp)?;
        self.char_string(
            "gmd:metadataStandardName",
            if record.has_acquisition() {
                "ISO 19115-2 Geographic Information - Metadata Part 2 Extensions for imagery and gridded data"
            } else {
                "ISO 19115:2003 - Geographic information - Metadata"
            },
        )?;
        self.char_string(
            "gmd:metadataStandardVersion",
            if record.has_acquisition() {
                "ISO 19115-2:2009(E)"
            } else {
                "ISO 19115:2003"
            },
        )?;
        if let Some(bbox) = &record.spatial_extent {
            self.reference_system(bbox)?;
        }
        self.identification(record)?;
        self.content_info(record)?;
        self.distribution(record)?;
        self.data_quality(record)?;
        if record.has_acquisition() {
            self.acquisition(&record.acquisition)?;
        }

        self.end(root)
    }

    fn reference_system(&mut self, bbox: &BoundingBox) -> XmlResult {
        let crate::record::Crs::Epsg(code) = bbox.crs;
        self.start("gmd:referenceSystemInfo")?;
        self.start("gmd:MD_ReferenceSystem")?;
        self.start("gmd:referenceSystemIdentifier")?;
        self.start("gmd:RS_Identifier")?;
        self.char_string("gmd:code", &code.to_string())?;
        self.char_string("gmd:codeSpace", "EPSG")?;
        self.end("gmd:RS_Identifier")?;
        self.end("gmd:referenceSystemIdentifier")?;
        self.end("gmd:MD_ReferenceSystem")?;
        self.end("gmd:referenceSystemInfo")
    }

    fn identification(&mut self, record: &CanonicalRecord) -> XmlResult {
        let service = record.hierarchy_level.is_service();
        let element = if service {
            "srv:SV_ServiceIdentification"
        } else {
            "gmd:MD_DataIdentification"
        };

        self.start("gmd:identificationInfo")?;
        self.start(element)?;
        self.citation(record)?;
        self.char_string(
            "gmd:abstract",
            record.abstract_text.as_deref().unwrap_or_default(),
        )?;
        self.code("gmd:status", "gmd:MD_ProgressCode", &record.status)?;
        for (role, contact) in &record.contacts {
            if *role != ContactRole::PointOfContact {
                self.contact("gmd:pointOfContact", contact, *role)?;
            }
        }
        self.start("gmd:resourceMaintenance")?;
        self.start("gmd:MD_MaintenanceInformation")?;
        self.code(
            "gmd:maintenanceAndUpdateFrequency",
            "gmd:MD_MaintenanceFrequencyCode",
            &record.maintenance_frequency,
        )?;
        self.end("gmd:MD_MaintenanceInformation")?;
        self.end("gmd:resourceMaintenance")?;
        for (name, set) in &record.keywords {
            self.keywords(name, set)?;
        }
        if let Some(constraints) = &record.access_constraints {
            self.start("gmd:resourceConstraints")?;
            self.start("gmd:MD_LegalConstraints")?;
            self.code(
                "gmd:accessConstraints",
                "gmd:MD_RestrictionCode",
                "otherRestrictions",
            )?;
            self.char_string("gmd:otherConstraints", constraints)?;
            self.end("gmd:MD_LegalConstraints")?;
            self.end("gmd:resourceConstraints")?;
        }

        if service {
            self.wrapped_text("srv:serviceType", "gco:LocalName", "other")?;
            self.extent("srv:extent", record)?;
        } else {
            self.language("gmd:language", &record.language)?;
            self.code("gmd:characterSet", "gmd:MD_CharacterSetCode", "utf8")?;
            for category in &record.topic_categories {
                self.wrapped_text("gmd:topicCategory", "gmd:MD_TopicCategoryCode", category)?;
            }
            self.extent("gmd:extent", record)?;
        }

        self.end(element)?;
        self.end("gmd:identificationInfo")
    }

    fn citation(&mut self, record: &CanonicalRecord) -> XmlResult {
        self.start("gmd:citation")?;
        self.start("gmd:CI_Citation")?;
        self.char_string("gmd:title", record.title.as_deref().unwrap_or_default())?;
        for (date, kind) in [
            (&record.creation_date, "creation"),
            (&record.publication_date, "publication"),
        ] {
            if let Some(date) = date {
                self.start("gmd:date")?;
                self.start("gmd:CI_Date")?;
                self.wrapped_text("gmd:date", "gco:DateTime", date)?;
                self.code("gmd:dateType", "gmd:CI_DateTypeCode", kind)?;
                self.end("gmd:CI_Date")?;
                self.end("gmd:date")?;
            }
        }
        if let Some(edition) = &record.edition {
            self.char_string("gmd:edition", edition)?;
        }
        self.start("gmd:identifier")?;
        self.start("gmd:MD_Identifier")?;
        self.char_string("gmd:code", &record.identifier)?;
        self.end("gmd:MD_Identifier")?;
        self.end("gmd:identifier")?;
        self.end("gmd:CI_Citation")?;
        self.end("gmd:citation")
    }

    fn keywords(&mut self, name: &str, set: &KeywordSet) -> XmlResult {
        if set.keywords.is_empty() {
            return Ok(());
        }
        self.start("gmd:descriptiveKeywords")?;
        self.start("gmd:MD_Keywords")?;
        for keyword in &set.keywords {
            self.char_string("gmd:keyword", keyword)?;
        }
        self.code("gmd:type", "gmd:MD_KeywordTypeCode", &set.keyword_type)?;
        self.start("gmd:thesaurusName")?;
        self.start("gmd:CI_Citation")?;
        self.char_string("gmd:title", name)?;
        self.end("gmd:CI_Citation")?;
        self.end("gmd:thesaurusName")?;
        self.end("gmd:MD_Keywords")?;
        self.end("gmd:descriptiveKeywords")
    }

    fn extent(&mut self, wrapper: &str, record: &CanonicalRecord) -> XmlResult {
        if record.spatial_extent.is_none() && record.temporal_extent.is_none() {
            return Ok(());
        }
        self.start(wrapper)?;
        self.start("gmd:EX_Extent")?;
        if let Some(bbox) = &record.spatial_extent {
            self.start("gmd:geographicElement")?;
            self.start("gmd:EX_GeographicBoundingBox")?;
            self.decimal("gmd:westBoundLongitude", bbox.min_x())?;
            self.decimal("gmd:eastBoundLongitude", bbox.max_x())?;
            self.decimal("gmd:southBoundLatitude", bbox.min_y())?;
            self.decimal("gmd:northBoundLatitude", bbox.max_y())?;
            self.end("gmd:EX_GeographicBoundingBox")?;
            self.end("gmd:geographicElement")?;
        }
        if let Some(temporal) = &record.temporal_extent {
            self.start("gmd:temporalElement")?;
            self.start("gmd:EX_TemporalExtent")?;
            self.start("gmd:extent")?;
            match temporal {
                TemporalExtent::Instant(instant) => {
                    let id = self.next_gml_id("TI");
                    self.start_with("gml:TimeInstant", &[("gml:id", id.as_str())])?;
                    self.text_element("gml:timePosition", instant)?;
                    self.end("gml:TimeInstant")?;
                }
                TemporalExtent::Interval { begin, end } => {
                    let id = self.next_gml_id("TP");
                    self.start_with("gml:TimePeriod", &[("gml:id", id.as_str())])?;
                    self.text_element("gml:beginPosition", begin)?;
                    match end {
                        Some(end) => self.text_element("gml:endPosition", end)?,
                        None => self.empty("gml:endPosition", &[("indeterminatePosition", "now")])?,
                    }
                    self.end("gml:TimePeriod")?;
                }
            }
            self.end("gmd:extent")?;
            self.end("gmd:EX_TemporalExtent")?;
            self.end("gmd:temporalElement")?;
        }
        self.end("gmd:EX_Extent")?;
        self.end(wrapper)
    }

    fn content_info(&mut self, record: &CanonicalRecord) -> XmlResult {
        if record.content_dimensions.is_empty()
            && record.cloud_cover.is_none()
            && record.processing_level.is_none()
        {
            return Ok(());
        }
        let element = if record.has_acquisition() {
            "gmi:MI_CoverageDescription"
        } else {
            "gmd:MD_ImageDescription"
        };
        self.start("gmd:contentInfo")?;
        self.start(element)?;
        self.start("gmd:attributeDescription")?;
        self.text_element("gco:RecordType", "image")?;
        self.end("gmd:attributeDescription")?;
        self.code(
            "gmd:contentType",
            "gmd:MD_CoverageContentTypeCode",
            "physicalMeasurement",
        )?;
        for dimension in &record.content_dimensions {
            self.band(dimension)?;
        }
        if let Some(level) = &record.processing_level {
            self.start("gmd:processingLevelCode")?;
            self.start("gmd:MD_Identifier")?;
            self.char_string("gmd:code", level)?;
            self.end("gmd:MD_Identifier")?;
            self.end("gmd:processingLevelCode")?;
        }
        if let Some(cloud_cover) = record.cloud_cover {
            self.decimal_as("gmd:cloudCoverPercentage", "gco:Real", cloud_cover)?;
        }
        self.end(element)?;
        self.end("gmd:contentInfo")
    }

    fn band(&mut self, dimension: &Dimension) -> XmlResult {
        self.start("gmd:dimension")?;
        self.start("gmd:MD_Band")?;
        self.start("gmd:sequenceIdentifier")?;
        self.start("gco:MemberName")?;
        self.char_string("gco:aName", &dimension.name)?;
        self.start("gco:attributeType")?;
        self.text_element("gco:TypeName", "band")?;
        self.end("gco:attributeType")?;
        self.end("gco:MemberName")?;
        self.end("gmd:sequenceIdentifier")?;
        if let Some(max) = dimension.max {
            self.decimal_as("gmd:maxValue", "gco:Real", max)?;
        }
        if let Some(min) = dimension.min {
            self.decimal_as("gmd:minValue", "gco:Real", min)?;
        }
        if let Some(units) = &dimension.units {
            let id = self.next_gml_id("U");
            self.start("gmd:units")?;
            self.start_with("gml:UnitDefinition", &[("gml:id", id.as_str())])?;
            self.start_with("gml:identifier", &[("codeSpace", "")])?;
            self.text(units)?;
            self.end("gml:identifier")?;
            self.end("gml:UnitDefinition")?;
            self.end("gmd:units")?;
        }
        self.end("gmd:MD_Band")?;
        self.end("gmd:dimension")
    }

    fn distribution(&mut self, record: &CanonicalRecord) -> XmlResult {
        if record.distribution_links.is_empty() {
            return Ok(());
        }
        self.start("gmd:distributionInfo")?;
        self.start("gmd:MD_Distribution")?;
        self.start("gmd:transferOptions")?;
        self.start("gmd:MD_DigitalTransferOptions")?;
        for link in record.distribution_links.values() {
            self.online_resource(link)?;
        }
        self.end("gmd:MD_DigitalTransferOptions")?;
        self.end("gmd:transferOptions")?;
        self.end("gmd:MD_Distribution")?;
        self.end("gmd:distributionInfo")
    }

    fn online_resource(&mut self, link: &DistributionLink) -> XmlResult {
        self.start("gmd:onLine")?;
        self.start("gmd:CI_OnlineResource")?;
        self.wrapped_text("gmd:linkage", "gmd:URL", &link.url)?;
        if let Some(mime_type) = &link.mime_type {
            self.char_string("gmd:protocol", mime_type)?;
        }
        self.char_string("gmd:applicationProfile", &link.relation)?;
        if let Some(name) = &link.name {
            self.char_string("gmd:name", name)?;
        }
        if let Some(description) = &link.description {
            self.char_string("gmd:description", description)?;
        }
        if let Some(function) = &link.function {
            self.code("gmd:function", "gmd:CI_OnLineFunctionCode", function)?;
        }
        self.end("gmd:CI_OnlineResource")?;
        self.end("gmd:onLine")
    }

    fn data_quality(&mut self, record: &CanonicalRecord) -> XmlResult {
        let Some(statement) = &record.lineage else {
            return Ok(());
        };
        self.start("gmd:dataQualityInfo")?;
        self.start("gmd:DQ_DataQuality")?;
        self.start("gmd:scope")?;
        self.start("gmd:DQ_Scope")?;
        self.code(
            "gmd:level",
            "gmd:MD_ScopeCode",
            record.hierarchy_level.scope_code(),
        )?;
        self.end("gmd:DQ_Scope")?;
        self.end("gmd:scope")?;
        self.start("gmd:lineage")?;
        self.start("gmd:LI_Lineage")?;
        self.char_string("gmd:statement", statement)?;
        self.end("gmd:LI_Lineage")?;
        self.end("gmd:lineage")?;
        self.end("gmd:DQ_DataQuality")?;
        self.end("gmd:dataQualityInfo")
    }

    fn acquisition(&mut self, platforms: &[Platform]) -> XmlResult {
        self.start("gmi:acquisitionInformation")?;
        self.start("gmi:MI_AcquisitionInformation")?;
        for platform in platforms {
            self.start("gmi:platform")?;
            self.start("gmi:MI_Platform")?;
            self.md_identifier("gmi:identifier", &platform.identifier)?;
            self.char_string("gmi:description", &platform.description)?;
            for instrument in &platform.instruments {
                self.start("gmi:instrument")?;
                self.start("gmi:MI_Instrument")?;
                self.md_identifier("gmi:identifier", &instrument.identifier)?;
                self.char_string("gmi:type", &instrument.kind)?;
                self.end("gmi:MI_Instrument")?;
                self.end("gmi:instrument")?;
            }
            self.end("gmi:MI_Platform")?;
            self.end("gmi:platform")?;
        }
        self.end("gmi:MI_AcquisitionInformation")?;
        self.end("gmi:acquisitionInformation")
    }

    fn contact(&mut self, wrapper: &str, contact: &Contact, role: ContactRole) -> XmlResult {
        self.start(wrapper)?;
        self.start("gmd:CI_ResponsibleParty")?;
        if let Some(name) = &contact.individual_name {
            self.char_string("gmd:individualName", name)?;
        }
        if let Some(organization) = &contact.organization {
            self.char_string("gmd:organisationName", organization)?;
        }
        if let Some(email) = &contact.email {
            self.start("gmd:contactInfo")?;
            self.start("gmd:CI_Contact")?;
            self.start("gmd:address")?;
            self.start("gmd:CI_Address")?;
            self.char_string("gmd:electronicMailAddress", email)?;
            self.end("gmd:CI_Address")?;
            self.end("gmd:address")?;
            self.end("gmd:CI_Contact")?;
            self.end("gmd:contactInfo")?;
        }
        self.code("gmd:role", "gmd:CI_RoleCode", role.code())?;
        self.end("gmd:CI_ResponsibleParty")?;
        self.end(wrapper)
    }

    fn md_identifier(&mut self, wrapper: &str, code: &str) -> XmlResult {
        self.start(wrapper)?;
        self.start("gmd:MD_Identifier")?;
        self.char_string("gmd:code", code)?;
        self.end("gmd:MD_Identifier")?;
        self.end(wrapper)
    }

    fn language(&mut self, wrapper: &str, language: &str) -> XmlResult {
        self.start(wrapper)?;
        self.start_with(
            "gmd:LanguageCode",
            &[("codeList", LANGUAGE_CODE_LIST), ("codeListValue", language)],
        )?;
        self.text(language)?;
        self.end("gmd:LanguageCode")?;
        self.end(wrapper)
    }

    fn code(&mut self, wrapper: &str, element: &str, value: &str) -> XmlResult {
        let code_name = element.split_once(':').map_or(element, |(_, local)| local);
        let code_list = format!("{CODE_LIST_BASE}#{code_name}");
        self.start(wrapper)?;
        self.start_with(element, &[("codeList", code_list.as_str()), ("codeListValue", value)])?;
        self.text(value)?;
        self.end(element)?;
        self.end(wrapper)
    }

    fn char_string(&mut self, wrapper: &str, value: &str) -> XmlResult {
        self.wrapped_text(wrapper, "gco:CharacterString", value)
    }

    fn decimal(&mut self, wrapper: &str, value: f64) -> XmlResult {
        self.decimal_as(wrapper, "gco:Decimal", value)
    }

    fn decimal_as(&mut self, wrapper: &str, element: &str, value: f64) -> XmlResult {
        self.wrapped_text(wrapper, element, &value.to_string())
    }

    fn wrapped_text(&mut self, wrapper: &str, element: &str, value: &str) -> XmlResult {
        self.start(wrapper)?;
        self.text_element(element, value)?;
        self.end(wrapper)
    }

    fn text_element(&mut self, element: &str, value: &str) -> XmlResult {
        self.start(element)?;
        self.text(value)?;
        self.end(element)
    }

    fn start(&mut self, element: &str) -> XmlResult {
        self.xml.write_event(Event::Start(BytesStart::new(element)))?;
        Ok(())
    }

    fn start_with(&mut self, element: &str, attributes: &[(&str, &str)]) -> XmlResult {
        let mut start = BytesStart::new(element);
        for &attribute in attributes {
            start.push_attribute(attribute);
        }
        self.xml.write_event(Event::Start(start))?;
        Ok(())
    }

    fn empty(&mut self, element: &str, attributes: &[(&str, &str)]) -> XmlResult {
        let mut start = BytesStart::new(element);
        for &attribute in attributes {
            start.push_attribute(attribute);
        }
        self.xml.write_event(Event::Empty(start))?;
        Ok(())
    }

    fn text(&mut self, value: &str) -> XmlResult {
        self.xml.write_event(Event::Text(BytesText::new(value)))?;
        Ok(())
    }

    fn end(&mut self, element: &str) -> XmlResult {
        self.xml.write_event(Event::End(BytesEnd::new(element)))?;
        Ok(())
    }
}
