//! Minimal XML document model for metadata files and the manifest writer.

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

use crate::manifest::ManifestDescriptor;

pub const METADATA_NAMESPACE: &str = "http://soap.sforce.com/2006/04/metadata";

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("malformed XML at byte {position}: {source}")]
    Syntax {
        position: usize,
        source: quick_xml::Error,
    },

    #[error("unexpected closing tag </{found}>")]
    UnbalancedClose { found: String },

    #[error("document ended with <{0}> still open")]
    Unclosed(String),

    #[error("document has no root element")]
    NoRoot,

    #[error("failed to write XML: {0}")]
    Write(#[from] quick_xml::Error),

    #[error("manifest is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// An element with its text content and child elements. Attributes are not
/// kept; metadata files carry their data in elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            ..Element::default()
        }
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }
}

/// Parse a document and return its root element.
pub fn parse(content: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut open: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        let event = reader.read_event().map_err(|source| XmlError::Syntax {
            position: reader.buffer_position(),
            source,
        })?;

        match event {
            Event::Start(start) => open.push(Element::new(element_name(&start))),
            Event::Empty(start) => {
                let element = Element::new(element_name(&start));
                attach(&mut open, &mut root, element);
            }
            Event::End(end) => {
                let found = String::from_utf8_lossy(end.local_name().as_ref()).into_owned();
                match open.pop() {
                    Some(element) if element.name == found => {
                        attach(&mut open, &mut root, element)
                    }
                    _ => return Err(XmlError::UnbalancedClose { found }),
                }
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|source| XmlError::Syntax {
                    position: reader.buffer_position(),
                    source,
                })?;
                if let Some(current) = open.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(current) = open.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(element) = open.pop() {
        return Err(XmlError::Unclosed(element.name));
    }
    root.ok_or(XmlError::NoRoot)
}

fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn attach(open: &mut [Element], root: &mut Option<Element>, element: Element) {
    match open.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

/// Render the manifest as a `package.xml` document.
pub fn write_manifest(manifest: &ManifestDescriptor) -> Result<String, XmlError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 4);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    writer.write_event(Event::Start(
        BytesStart::new("Package").with_attributes([("xmlns", METADATA_NAMESPACE)]),
    ))?;

    for category in manifest.categories() {
        writer.write_event(Event::Start(BytesStart::new("types")))?;
        for member in category.members() {
            write_text_element(&mut writer, "members", member)?;
        }
        write_text_element(&mut writer, "name", category.name())?;
        writer.write_event(Event::End(BytesEnd::new("types")))?;
    }

    write_text_element(&mut writer, "version", manifest.version())?;
    writer.write_event(Event::End(BytesEnd::new("Package")))?;

    let mut xml = String::from_utf8(writer.into_inner().into_inner())?;
    xml.push('\n');
    Ok(xml)
}

fn write_text_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    text: &str,
) -> Result<(), XmlError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
