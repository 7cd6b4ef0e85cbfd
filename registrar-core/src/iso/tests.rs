//! Unit tests for ISO encoding and read-back.

use super::*;
use crate::record::{
    BoundingBox, CanonicalRecord, Contact, ContactRole, Dimension, DistributionLink,
    HierarchyLevel, Instrument, KeywordSet, Platform, TemporalExtent,
};
use rstest::{fixture, rstest};

#[fixture]
fn dataset() -> CanonicalRecord {
    let mut record = CanonicalRecord::new(
        "S2A_MSIL1C_20200101",
        HierarchyLevel::Dataset,
        "2020-01-01T10:00:00Z",
    );
    record.title = Some("Tile <A> & B".into());
    record.abstract_text = Some("Level-1C tile".into());
    record.parent_identifier = Some("S2MSI1C".into());
    record.creation_date = Some("2020-01-01T10:00:00Z".into());
    record.spatial_extent = Some(BoundingBox::from_corners(20.0, 10.0, 25.5, 15.0));
    record.temporal_extent = Some(TemporalExtent::Interval {
        begin: "2020-01-01T10:00:00Z".into(),
        end: Some("2020-01-01T10:05:00Z".into()),
    });
    record.add_keywords("default", KeywordSet::theme(["processing", "optical"]));
    record.content_dimensions.push(Dimension {
        name: "B1".into(),
        units: Some("nm".into()),
        min: Some(430.0),
        max: Some(457.0),
    });
    record.cloud_cover = Some(12.5);
    record.set_link(
        "product",
        DistributionLink::new("alternate", "s3://bucket/S2A.SAFE")
            .with_mime_type("application/octet-stream")
            .labelled("product")
            .with_function("download"),
    );
    record.lineage = Some("Processed from platform Sentinel-2A".into());
    record
}

#[rstest]
fn writes_plain_iso_without_acquisition(dataset: CanonicalRecord) {
    let xml = to_iso_xml(&dataset).expect("serialize");
    assert!(xml.contains("<gmd:MD_Metadata"));
    assert!(!xml.contains("MI_Metadata"));
    assert!(xml.contains("Tile &lt;A&gt; &amp; B"));
    assert!(xml.contains("<gco:Decimal>25.5</gco:Decimal>"));
}

#[rstest]
fn writes_imagery_profile_when_acquisition_present(mut dataset: CanonicalRecord) {
    dataset.acquisition.push(Platform {
        identifier: "Sentinel-2A".into(),
        description: "Sentinel-2A".into(),
        instruments: vec![Instrument {
            identifier: "INS-NOBS".into(),
            kind: "S2MSI1C".into(),
        }],
    });
    let xml = to_iso_xml(&dataset).expect("serialize");
    assert!(xml.contains("<gmi:MI_Metadata"));
    assert!(xml.contains("<gmi:MI_AcquisitionInformation>"));
    assert!(xml.contains("INS-NOBS"));
}

#[rstest]
fn output_is_deterministic(dataset: CanonicalRecord) {
    let first = to_iso_xml(&dataset).expect("serialize");
    let second = to_iso_xml(&dataset.clone()).expect("serialize");
    assert_eq!(first, second);
}

#[rstest]
fn rejects_blank_identifier(mut dataset: CanonicalRecord) {
    dataset.identifier = "  ".into();
    let err = to_iso_xml(&dataset).expect_err("blank identifier");
    assert!(matches!(err, IsoWriteError::MissingIdentifier));
}

#[rstest]
fn omits_parent_identifier_when_unset(mut dataset: CanonicalRecord) {
    dataset.parent_identifier = None;
    let xml = to_iso_xml(&dataset).expect("serialize");
    assert!(!xml.contains("parentIdentifier"));
}

#[rstest]
fn summary_reads_back_written_fields(dataset: CanonicalRecord) {
    let xml = to_iso_xml(&dataset).expect("serialize");
    let summary = parse_iso_summary(&xml).expect("parse back");

    assert_eq!(summary.identifier, "S2A_MSIL1C_20200101");
    assert_eq!(summary.parent_identifier.as_deref(), Some("S2MSI1C"));
    assert_eq!(summary.hierarchy_level, HierarchyLevel::Dataset);
    assert_eq!(summary.title.as_deref(), Some("Tile <A> & B"));
    assert_eq!(summary.bbox, dataset.spatial_extent);
    assert_eq!(summary.temporal, dataset.temporal_extent);
    assert_eq!(summary.keywords, vec!["processing", "optical"]);
    assert_eq!(summary.links, vec!["s3://bucket/S2A.SAFE"]);
}

#[rstest]
fn service_records_use_service_identification() {
    let mut record = CanonicalRecord::new(
        "https://ades.example.com",
        HierarchyLevel::Service,
        "2024-01-01T00:00:00Z",
    );
    record.title = Some("ADES".into());
    record.set_contact(
        ContactRole::Author,
        Contact {
            individual_name: Some("Jane".into()),
            ..Contact::default()
        },
    );
    let xml = to_iso_xml(&record).expect("serialize");
    assert!(xml.contains("<srv:SV_ServiceIdentification>"));
    assert!(xml.contains("codeListValue=\"author\""));

    let summary = parse_iso_summary(&xml).expect("parse back");
    assert_eq!(summary.hierarchy_level, HierarchyLevel::Service);
    assert_eq!(summary.title.as_deref(), Some("ADES"));
    assert_eq!(summary.bbox, None);
}

#[rstest]
#[case("<foo/>")]
#[case("<gmd:MD_Metadata xmlns:gmd='urn:gmd'/>")]
fn summary_rejects_non_records(#[case] input: &str) {
    assert!(parse_iso_summary(input).is_err());
}

#[rstest]
fn summary_rejects_malformed_xml() {
    let err = parse_iso_summary("<gmd:MD_Metadata>").expect_err("malformed");
    assert!(matches!(err, IsoReadError::Xml(_)));
}
