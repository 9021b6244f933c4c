use std::io::{self, Read};
use std::str::FromStr;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Error, Result};

/// Element of an S3 response body: local name, text and children. Attributes
/// are not kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// First direct child called `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(Element::text)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Depth-first search, this element included.
    pub fn find(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    root: Element,
}

impl Document {
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(xml);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    stack.push(Element::new(name));
                }
                Event::Empty(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    attach(&mut stack, &mut root, Element::new(name))?;
                }
                Event::End(_) => {
                    let mut element = stack
                        .pop()
                        .ok_or_else(|| invalid("closing tag without an open element"))?;
                    // Indentation between children; leaf text stays verbatim.
                    if !element.children.is_empty() && element.text.trim().is_empty() {
                        element.text.clear();
                    }
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(e) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&e.unescape()?);
                    }
                }
                Event::CData(e) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                Event::Eof => break,
                // Declaration, comments, processing instructions, doctype.
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(invalid(&format!("unclosed element <{}>", open.name)));
        }
        root.map(|root| Self { root })
            .ok_or_else(|| invalid("document has no root element"))
    }

    /// Read the whole body, then parse it.
    pub fn from_reader(mut body: impl Read) -> Result<Self> {
        let mut xml = Vec::new();
        body.read_to_end(&mut xml)?;
        Self::parse(&xml)
    }

    #[inline]
    pub fn root(&self) -> &Element {
        &self.root
    }

    #[inline]
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.root.find(name)
    }
}

impl FromStr for Document {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s.as_bytes())
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(invalid("more than one root element")),
    }
    Ok(())
}

fn invalid(msg: &str) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::InvalidData, msg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_BUCKETS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListAllMyBucketsResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Owner><ID>owner-id</ID><DisplayName>owner</DisplayName></Owner>
  <Buckets>
    <Bucket><Name>alpha</Name><CreationDate>2024-01-01T00:00:00.000Z</CreationDate></Bucket>
    <Bucket><Name>beta &amp; co</Name><CreationDate>2024-02-01T00:00:00.000Z</CreationDate></Bucket>
  </Buckets>
  <ContinuationToken/>
</ListAllMyBucketsResult>"#;

    #[test]
    fn test_should_parse_nested_elements() {
        let doc: Document = LIST_BUCKETS.parse().unwrap();
        assert_eq!(doc.root().name(), "ListAllMyBucketsResult");

        let buckets = doc.root().child("Buckets").unwrap();
        let names: Vec<&str> = buckets
            .children_named("Bucket")
            .filter_map(|b| b.child_text("Name"))
            .collect();
        assert_eq!(names, vec!["alpha", "beta & co"]);
        assert_eq!(doc.find("DisplayName").unwrap().text(), "owner");
        assert_eq!(doc.root().child_text("ContinuationToken"), Some(""));
    }

    #[test]
    fn test_should_keep_leaf_text_verbatim() {
        let doc: Document = "<R>\n  <Key>  padded key  </Key>\n  <Blank>   </Blank>\n</R>"
            .parse()
            .unwrap();
        assert_eq!(doc.root().text(), "");
        assert_eq!(doc.root().child_text("Key"), Some("  padded key  "));
        assert_eq!(doc.root().child_text("Blank"), Some("   "));
    }

    #[test]
    fn test_should_find_root_itself() {
        let doc: Document = "<Error><Code>x</Code></Error>".parse().unwrap();
        assert_eq!(doc.find("Error").unwrap().name(), "Error");
        assert!(doc.find("Missing").is_none());
    }

    #[test]
    fn test_should_keep_cdata_text() {
        let doc: Document = "<R><K><![CDATA[a<b]]></K></R>".parse().unwrap();
        assert_eq!(doc.root().child_text("K"), Some("a<b"));
    }

    #[test]
    fn test_should_reject_malformed_documents() {
        for xml in ["", "<A><B></A>", "<A>", "<A/><B/>"] {
            let err = Document::parse(xml.as_bytes()).unwrap_err();
            assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::InvalidData));
        }
    }

    #[test]
    fn test_should_parse_from_reader() {
        let doc = Document::from_reader(LIST_BUCKETS.as_bytes()).unwrap();
        assert_eq!(doc.root().children().len(), 3);
    }
}
