//! OGC API Processes services (ADES) and the processes they expose.

use log::debug;
use registrar_core::{BoundingBox, CanonicalRecord, DistributionLink, HierarchyLevel, KeywordSet};
use serde_json::Value;

use super::{NormalizeContext, NormalizeError, json_str, parse_json};

const LANDING: &str = "service landing page";
const PROCESSES: &str = "process list";

const SERVICE_KEYWORDS: [&str; 5] = [
    "application",
    "ADES",
    "OGC API - Processes",
    "service",
    "process",
];

/// How much of a processing service is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceMode {
    /// Only the service record.
    #[default]
    Ades,
    /// The service record plus one child record per process.
    Processes,
}

impl ServiceMode {
    /// Whether the process list must be fetched.
    #[must_use]
    pub const fn includes_processes(self) -> bool {
        matches!(self, Self::Processes)
    }
}

/// URL of the process list below a service root.
#[must_use]
pub fn processes_url(service_url: &str) -> String {
    format!("{}/processes", service_url.trim_end_matches('/'))
}

/// Build the service record and, when a process list is supplied, one
/// child record per process.
///
/// The service record comes first; children follow in list order.
pub fn from_service(
    service_url: &str,
    landing_json: &str,
    processes_json: Option<&str>,
    ctx: &NormalizeContext,
) -> Result<Vec<CanonicalRecord>, NormalizeError> {
    let landing = parse_json(landing_json, LANDING)?;
    let service = service_record(service_url, &landing, ctx);
    let mut records = vec![service];
    if let Some(processes_json) = processes_json {
        let list = parse_json(processes_json, PROCESSES)?;
        let processes = match &list {
            Value::Array(items) => items.as_slice(),
            other => other
                .get("processes")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .ok_or_else(|| NormalizeError::missing(PROCESSES, "processes"))?,
        };
        for process in processes {
            records.push(process_record(service_url, process, ctx)?);
        }
    }
    Ok(records)
}

fn service_record(service_url: &str, landing: &Value, ctx: &NormalizeContext) -> CanonicalRecord {
    debug!("normalizing processing service {service_url}");
    let title = json_str(landing, "/title");
    let description = json_str(landing, "/description");

    let mut record =
        CanonicalRecord::new(service_url, HierarchyLevel::Service, ctx.datestamp());
    record.parent_identifier = ctx.parent_identifier.clone();
    record.title = title.map(str::to_owned);
    record.abstract_text = description.map(str::to_owned);
    record.creation_date = Some(ctx.datestamp());
    record.spatial_extent = Some(BoundingBox::global());
    record.add_keywords("default", KeywordSet::theme(SERVICE_KEYWORDS));

    let mut service_link = DistributionLink::new("service", service_url)
        .with_mime_type("application/json")
        .with_function("service");
    if let Some(title) = title {
        service_link = service_link.with_name(title);
    }
    if let Some(description) = description {
        service_link = service_link.with_description(description);
    }
    record.set_link("http", service_link);

    for link in landing
        .get("links")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let (Some(href), Some(relation)) = (json_str(link, "/href"), json_str(link, "/rel"))
        else {
            continue;
        };
        let key = json_str(link, "/title").unwrap_or(relation);
        let mut entry = DistributionLink::new(relation, href)
            .labelled(key)
            .with_function(relation);
        if let Some(media_type) = json_str(link, "/type") {
            entry = entry.with_mime_type(media_type);
        }
        record.set_link(key, entry);
    }
    record
}

fn process_record(
    service_url: &str,
    process: &Value,
    ctx: &NormalizeContext,
) -> Result<CanonicalRecord, NormalizeError> {
    let process_id = json_str(process, "/id")
        .ok_or_else(|| NormalizeError::missing(PROCESSES, "processes[].id"))?;
    let url = format!("{}/{process_id}", processes_url(service_url));

    let mut record = CanonicalRecord::new(url.clone(), HierarchyLevel::Application, ctx.datestamp());
    record.parent_identifier = Some(service_url.to_owned());
    record.title = Some(json_str(process, "/title").unwrap_or(process_id).to_owned());
    record.abstract_text = json_str(process, "/description").map(str::to_owned);
    record.edition = json_str(process, "/version").map(str::to_owned);
    record.spatial_extent = Some(BoundingBox::global());
    record.add_keywords(
        "default",
        KeywordSet::theme(["process", "OGC API - Processes"]),
    );
    record.set_link(
        "process",
        DistributionLink::new("process", url)
            .with_mime_type("application/json")
            .labelled(process_id)
            .with_function("information"),
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fixtures::fixture, test_support::fixed_context};
    use rstest::rstest;

    const SERVICE: &str = "https://ades.example.com/ogc-api";

    #[rstest]
    fn service_record_carries_landing_metadata() {
        let records =
            from_service(SERVICE, &fixture("ades_landing.json"), None, &fixed_context())
                .expect("normalize");
        assert_eq!(records.len(), 1);
        let service = records.first().expect("service record");
        assert_eq!(service.identifier, SERVICE);
        assert!(service.hierarchy_level.is_service());
        assert_eq!(service.title.as_deref(), Some("Example ADES"));
        assert_eq!(service.keywords["default"].keywords, SERVICE_KEYWORDS.to_vec());
        let keys: Vec<_> = service.distribution_links.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["http", "this document", "conformance", "processes"]);
    }

    #[rstest]
    fn process_mode_adds_child_records() {
        let records = from_service(
            SERVICE,
            &fixture("ades_landing.json"),
            Some(&fixture("ades_processes.json")),
            &fixed_context(),
        )
        .expect("normalize");
        let children: Vec<_> = records
            .iter()
            .skip(1)
            .map(|record| {
                (
                    record.identifier.as_str(),
                    record.parent_identifier.as_deref(),
                    record.edition.as_deref(),
                )
            })
            .collect();
        assert_eq!(
            children,
            vec![
                (
                    "https://ades.example.com/ogc-api/processes/water-bodies",
                    Some(SERVICE),
                    Some("1.0.0"),
                ),
                (
                    "https://ades.example.com/ogc-api/processes/echo",
                    Some(SERVICE),
                    None,
                ),
            ]
        );
    }

    #[rstest]
    fn bare_process_arrays_are_accepted() {
        let records = from_service(
            SERVICE,
            "{}",
            Some(r#"[{"id": "echo"}]"#),
            &fixed_context(),
        )
        .expect("normalize");
        assert_eq!(records.len(), 2);
    }

    #[rstest]
    fn process_without_id_is_rejected() {
        let err = from_service(
            SERVICE,
            "{}",
            Some(r#"{"processes": [{"title": "anonymous"}]}"#),
            &fixed_context(),
        )
        .expect_err("missing id");
        assert!(matches!(err, NormalizeError::MissingField { .. }));
    }

    #[rstest]
    #[case("https://ades.example.com/", "https://ades.example.com/processes")]
    #[case("https://ades.example.com", "https://ades.example.com/processes")]
    fn builds_process_list_url(#[case] service: &str, #[case] expected: &str) {
        assert_eq!(processes_url(service), expected);
    }
}
