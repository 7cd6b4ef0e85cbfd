//! CWL application packages.
//!
//! A descriptor either is a `Workflow` itself or packs several processes in
//! a `$graph` list, of which exactly the `Workflow` node is registered.
//! Schema.org annotations (`s:` prefix) on the document supply versioning,
//! authorship and related links.

use log::debug;
use registrar_core::{
    BoundingBox, CanonicalRecord, Contact, ContactRole, DistributionLink, HierarchyLevel,
    KeywordSet,
};
use serde_yaml::Value;

use super::{NormalizeContext, NormalizeError};

const CWL_MIME_TYPE: &str = "application/x-yaml";

/// Annotations rendered as plain related links: `(annotation, key, relation, description, function)`.
const RELATED_LINKS: [(&str, &str, &str, &str, &str); 4] = [
    ("s:citation", "citation", "cite-as", "citation", "cite-as"),
    (
        "s:codeRepository",
        "codeRepository",
        "related",
        "code repository",
        "working-copy-of",
    ),
    ("s:license", "license", "license", "license", "license"),
    ("s:logo", "logo", "icon", "logo", "icon"),
];

/// Build an application record from a CWL descriptor in YAML or JSON.
///
/// # Examples
///
/// ```
/// use chrono::DateTime;
/// use registrar_data::normalize::{NormalizeContext, cwl::from_cwl};
///
/// let cwl = "
/// cwlVersion: v1.0
/// $graph:
///   - class: CommandLineTool
///     id: step
///   - class: Workflow
///     id: ndvi
///     label: NDVI
///     doc: Computes NDVI
/// ";
/// let record = from_cwl(cwl, &NormalizeContext::new(DateTime::UNIX_EPOCH))?;
/// assert_eq!(record.identifier, "ndvi");
/// assert_eq!(record.title.as_deref(), Some("NDVI"));
/// # Ok::<(), registrar_data::normalize::NormalizeError>(())
/// ```
pub fn from_cwl(text: &str, ctx: &NormalizeContext) -> Result<CanonicalRecord, NormalizeError> {
    let document: Value = serde_yaml::from_str(text).map_err(|source| NormalizeError::Yaml {
        document: "CWL descriptor",
        source,
    })?;
    let workflow = find_workflow(&document).ok_or(NormalizeError::NoWorkflow)?;
    let identifier = scalar(workflow.get("id"))
        .ok_or_else(|| NormalizeError::missing("CWL workflow", "id"))?;
    let label = scalar(workflow.get("label"));
    let doc = scalar(workflow.get("doc"));
    debug!("normalizing CWL workflow {identifier}");

    let mut record =
        CanonicalRecord::new(identifier, HierarchyLevel::Application, ctx.datestamp());
    record.parent_identifier = ctx.parent_identifier.clone();
    record.title.clone_from(&label);
    record.abstract_text.clone_from(&doc);
    record.spatial_extent = Some(BoundingBox::global());

    let mut keywords = Vec::new();
    if let Some(version) = annotation(&document, "s:softwareVersion") {
        keywords.push(format!("softwareVersion:{version}"));
    }
    keywords.extend(["application".to_owned(), "CWL".to_owned()]);
    record.add_keywords("default", KeywordSet::theme(keywords));

    if let Some(notes) = annotation(&document, "s:releaseNotes") {
        record.lineage = Some(notes.clone());
        record.set_link(
            "releaseNotes",
            DistributionLink::new("related", notes)
                .with_mime_type("text/html")
                .with_name("releaseNotes")
                .with_description("release notes")
                .with_function("version-history"),
        );
    }
    record.edition = annotation(&document, "s:version");
    record.creation_date = annotation(&document, "s:dateCreated");
    if let Some(author) = person(&document, "s:author") {
        record.set_contact(ContactRole::Author, author);
    }
    if let Some(contributor) = person(&document, "s:contributor") {
        record.set_contact(ContactRole::PointOfContact, contributor);
    }

    let described = |link: DistributionLink| {
        let link = link.with_mime_type(CWL_MIME_TYPE).with_function("enclosure");
        let link = match &label {
            Some(label) => link.with_name(label.clone()),
            None => link,
        };
        match &doc {
            Some(doc) => link.with_description(doc.clone()),
            None => link,
        }
    };
    if let Some(base) = ctx.base_url.as_deref() {
        record.set_link(
            "cwl",
            described(DistributionLink::new("manifest", base.trim_end_matches('/'))),
        );
    }
    if let Some(public_url) = ctx.public_url.as_deref() {
        record.set_link("http", described(DistributionLink::new("data", public_url)));
    }
    for (field, key, relation, description, function) in RELATED_LINKS {
        if let Some(url) = annotation(&document, field) {
            record.set_link(
                key,
                DistributionLink::new(relation, url)
                    .with_mime_type("text/html")
                    .with_name(key)
                    .with_description(description)
                    .with_function(function),
            );
        }
    }
    Ok(record)
}

/// Identifier of the workflow a descriptor registers.
pub fn workflow_identifier(text: &str) -> Result<String, NormalizeError> {
    let document: Value = serde_yaml::from_str(text).map_err(|source| NormalizeError::Yaml {
        document: "CWL descriptor",
        source,
    })?;
    let workflow = find_workflow(&document).ok_or(NormalizeError::NoWorkflow)?;
    scalar(workflow.get("id")).ok_or_else(|| NormalizeError::missing("CWL workflow", "id"))
}

fn find_workflow(document: &Value) -> Option<&Value> {
    if let Some(graph) = document.get("$graph").and_then(Value::as_sequence) {
        return graph.iter().find(|node| is_workflow(node));
    }
    is_workflow(document).then_some(document)
}

fn is_workflow(node: &Value) -> bool {
    node.get("class").and_then(Value::as_str) == Some("Workflow")
}

/// A scalar rendered as text; numbers such as `version: 1.2` count.
fn scalar(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn annotation(document: &Value, key: &str) -> Option<String> {
    scalar(document.get(key))
}

/// First person of a schema.org person annotation, which may be a list.
fn person(document: &Value, key: &str) -> Option<Contact> {
    let value = document.get(key)?;
    let entry = value
        .as_sequence()
        .map_or(Some(value), |people| people.first())?;
    Some(Contact {
        individual_name: scalar(entry.get("s:name")),
        organization: scalar(entry.get("s:affiliation")),
        email: scalar(entry.get("s:email")),
    })
}
