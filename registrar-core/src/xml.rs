//! Minimal XML element tree for reading metadata documents.
//!
//! Lookups match on local names, so namespace prefixes in the source do
//! not matter. Whitespace-only text between elements is dropped and element
//! text is trimmed.

use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use thiserror::Error;

/// Errors raised while reading an XML document.
#[derive(Debug, Error)]
pub enum XmlError {
    /// The document is not well-formed.
    #[error("malformed XML: {0}")]
    Syntax(#[from] quick_xml::Error),
    /// A name or value was not valid UTF-8.
    #[error("XML contains invalid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    /// Elements were left open at the end of input.
    #[error("XML ended with {open} unclosed element(s)")]
    Unclosed {
        /// Number of elements still open.
        open: usize,
    },
    /// The input contained no root element.
    #[error("XML document has no root element")]
    Empty,
}

/// An attribute with its qualified and local names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    /// Qualified name, such as `xlink:href`.
    pub name: String,
    /// Local part of the name, such as `href`.
    pub local_name: String,
    /// Unescaped value.
    pub value: String,
}

/// A parsed element with its children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    /// Qualified name.
    pub name: String,
    /// Local part of the name.
    pub local_name: String,
    /// Attributes in document order.
    pub attributes: Vec<XmlAttribute>,
    /// Child elements in document order.
    pub children: Vec<XmlElement>,
    text: String,
}

impl XmlElement {
    /// Trimmed text directly inside this element.
    #[must_use]
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Text if non-empty.
    #[must_use]
    pub fn non_empty_text(&self) -> Option<&str> {
        Some(self.text()).filter(|text| !text.is_empty())
    }

    /// Value of the attribute with the given local name.
    #[must_use]
    pub fn attr(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.local_name == local_name)
            .map(|attr| attr.value.as_str())
    }

    /// First direct child with the given local name.
    #[must_use]
    pub fn child(&self, local_name: &str) -> Option<&Self> {
        self.children
            .iter()
            .find(|child| child.local_name == local_name)
    }

    /// All direct children with the given local name.
    pub fn children_named<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = &'a Self> {
        self.children
            .iter()
            .filter(move |child| child.local_name == local_name)
    }

    /// Follow a chain of direct children by local name.
    #[must_use]
    pub fn path(&self, steps: &[&str]) -> Option<&Self> {
        steps
            .iter()
            .try_fold(self, |element, step| element.child(step))
    }

    /// First descendant (depth-first, document order) with the given local name.
    #[must_use]
    pub fn descendant(&self, local_name: &str) -> Option<&Self> {
        self.descendants(local_name).next()
    }

    /// All descendants with the given local name in document order.
    pub fn descendants<'a, 'b>(
        &'a self,
        local_name: &'b str,
    ) -> impl Iterator<Item = &'a Self> + use<'a, 'b> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
        .filter(move |element| element.local_name == local_name)
    }

    /// Text of the first descendant with the given local name, if non-empty.
    #[must_use]
    pub fn descendant_text(&self, local_name: &str) -> Option<&str> {
        self.descendant(local_name)
            .and_then(Self::non_empty_text)
    }
}

struct Descendants<'a> {
    stack: Vec<&'a XmlElement>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a XmlElement;

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.stack.pop()?;
        self.stack.extend(element.children.iter().rev());
        Some(element)
    }
}

/// Parse a document and return its root element.
///
/// # Examples
///
/// ```
/// use registrar_core::xml::parse_document;
///
/// let root = parse_document("<a:Root xmlns:a='urn:a'><a:Item kind='x'> v </a:Item></a:Root>")?;
/// let item = root.descendant("Item").expect("item element");
/// assert_eq!(item.text(), "v");
/// assert_eq!(item.attr("kind"), Some("x"));
/// # Ok::<(), registrar_core::xml::XmlError>(())
/// ```
pub fn parse_document(input: &str) -> Result<XmlElement, XmlError> {
    let mut reader = Reader::from_str(input);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(open_element(&start)?),
            Event::Empty(start) => {
                let element = open_element(&start)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(std::str::from_utf8(&data)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Unclosed { open: stack.len() });
    }
    root.ok_or(XmlError::Empty)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn open_element(start: &BytesStart<'_>) -> Result<XmlElement, XmlError> {
    let name = std::str::from_utf8(start.name().as_ref())?.to_owned();
    let local_name = std::str::from_utf8(start.local_name().as_ref())?.to_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        attributes.push(XmlAttribute {
            name: std::str::from_utf8(attr.key.as_ref())?.to_owned(),
            local_name: std::str::from_utf8(attr.key.local_name().as_ref())?.to_owned(),
            value: attr.unescape_value()?.into_owned(),
        });
    }
    Ok(XmlElement {
        name,
        local_name,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
        <n1:Level-1C_User_Product xmlns:n1="urn:x">
          <General_Info>
            <Product_Info>
              <PRODUCT_URI>S2A.SAFE</PRODUCT_URI>
              <GENERATION_TIME>2020-01-01T00:00:00Z</GENERATION_TIME>
            </Product_Info>
          </General_Info>
          <Band physicalBand="B1"><MIN>1</MIN></Band>
          <Band physicalBand="B2"><MIN>2</MIN></Band>
          <Empty/>
          <Escaped>a &amp; b</Escaped>
        </n1:Level-1C_User_Product>"#;

    #[rstest]
    fn finds_descendants_by_local_name() {
        let root = parse_document(SAMPLE).expect("parse");
        assert_eq!(root.local_name, "Level-1C_User_Product");
        assert_eq!(root.descendant_text("PRODUCT_URI"), Some("S2A.SAFE"));
        assert_eq!(
            root.path(&["General_Info", "Product_Info", "GENERATION_TIME"])
                .map(XmlElement::text),
            Some("2020-01-01T00:00:00Z")
        );
    }

    #[rstest]
    fn keeps_document_order_and_relative_lookups() {
        let root = parse_document(SAMPLE).expect("parse");
        let mins: Vec<_> = root
            .descendants("Band")
            .map(|band| {
                (
                    band.attr("physicalBand").unwrap_or_default().to_owned(),
                    band.descendant_text("MIN").unwrap_or_default().to_owned(),
                )
            })
            .collect();
        assert_eq!(
            mins,
            vec![("B1".to_owned(), "1".to_owned()), ("B2".to_owned(), "2".to_owned())]
        );
    }

    #[rstest]
    fn unescapes_text_and_handles_empty_elements() {
        let root = parse_document(SAMPLE).expect("parse");
        assert_eq!(root.descendant_text("Escaped"), Some("a & b"));
        assert!(root.descendant("Empty").is_some());
        assert_eq!(root.descendant_text("Empty"), None);
    }

    #[rstest]
    #[case("<a><b></a>")]
    #[case("not xml at all <")]
    fn rejects_malformed_documents(#[case] input: &str) {
        assert!(parse_document(input).is_err());
    }

    #[rstest]
    fn rejects_unclosed_elements() {
        let err = parse_document("<a><b>").expect_err("should fail");
        assert!(matches!(err, XmlError::Unclosed { open: 2 } | XmlError::Syntax(_)));
    }

    #[rstest]
    fn rejects_documents_without_root() {
        let err = parse_document("   ").expect_err("should fail");
        assert!(matches!(err, XmlError::Empty));
    }
}
