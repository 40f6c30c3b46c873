//! Minimal namespace-aware element tree on top of `quick_xml`.
//!
//! Bank statements are small, so the whole document is read into memory and
//! queried by relative paths of local names within one namespace.

use quick_xml::encoding::{Decoder, EncodingError};
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum XmlError {
    #[error("XML syntax error: {0}")]
    Syntax(String),
    #[error("Undecodable text: {0}")]
    Encoding(String),
    #[error("Unbound namespace prefix '{0}'")]
    UnboundPrefix(String),
    #[error("Document has no root element")]
    NoRoot,
    #[error("Document has more than one root element")]
    MultipleRoots,
    #[error("Unexpected end of document")]
    Truncated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Resolved namespace URI, empty when the element has none.
    pub namespace: String,
    /// Local name, without prefix.
    pub name: String,
    /// Character data directly inside this element, untrimmed.
    pub raw_text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn text(&self) -> &str {
        self.raw_text.trim()
    }

    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.namespace == namespace && self.name == name
    }

    /// Every element reached from `self` by following `path` child by child,
    /// in document order. An empty path yields `self`.
    pub fn find_all<'a>(&'a self, namespace: &str, path: &[&str]) -> Vec<&'a XmlElement> {
        let mut out = Vec::new();
        self.collect_path(namespace, path, &mut out);
        out
    }

    pub fn find<'a>(&'a self, namespace: &str, path: &[&str]) -> Option<&'a XmlElement> {
        self.find_all(namespace, path).into_iter().next()
    }

    /// Text of the first element on `path` that has any.
    pub fn find_text<'a>(&'a self, namespace: &str, path: &[&str]) -> Option<&'a str> {
        self.find_all(namespace, path)
            .into_iter()
            .map(XmlElement::text)
            .find(|t| !t.is_empty())
    }

    /// All descendants (not `self`) with the given name, in document order.
    pub fn descendants<'a>(&'a self, namespace: &str, name: &str) -> Vec<&'a XmlElement> {
        let mut out = Vec::new();
        self.collect_descendants(namespace, name, &mut out);
        out
    }

    fn collect_path<'a>(&'a self, namespace: &str, path: &[&str], out: &mut Vec<&'a XmlElement>) {
        match path.split_first() {
            None => out.push(self),
            Some((head, rest)) => {
                for child in self.children.iter().filter(|c| c.is(namespace, head)) {
                    child.collect_path(namespace, rest, out);
                }
            }
        }
    }

    fn collect_descendants<'a>(&'a self, namespace: &str, name: &str, out: &mut Vec<&'a XmlElement>) {
        for child in &self.children {
            if child.is(namespace, name) {
                out.push(child);
            }
            child.collect_descendants(namespace, name, out);
        }
    }
}

pub fn parse_document(bytes: &[u8]) -> Result<XmlElement, XmlError> {
    let mut reader = NsReader::from_reader(bytes);
    let mut buf = Vec::new();

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let element = open_element(&reader, e)?;
                stack.push(element);
            }
            Ok(Event::Empty(ref e)) => {
                let element = open_element(&reader, e)?;
                attach(element, &mut stack, &mut root)?;
            }
            Ok(Event::End(_)) => {
                let element = stack.pop().ok_or(XmlError::Truncated)?;
                attach(element, &mut stack, &mut root)?;
            }
            Ok(Event::Text(ref t)) => {
                if let Some(top) = stack.last_mut() {
                    top.raw_text.push_str(&t.decode().map_err(encoding_error)?);
                }
            }
            Ok(Event::CData(ref t)) => {
                if let Some(top) = stack.last_mut() {
                    top.raw_text.push_str(&t.decode().map_err(encoding_error)?);
                }
            }
            Ok(Event::GeneralRef(ref r)) => {
                if let Some(top) = stack.last_mut() {
                    push_reference(top, r)?;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(XmlError::Syntax(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(XmlError::Truncated);
    }
    root.ok_or(XmlError::NoRoot)
}

fn open_element<R>(reader: &NsReader<R>, start: &BytesStart<'_>) -> Result<XmlElement, XmlError> {
    let decoder = reader.decoder();
    let (namespace, local) = reader.resolve_element(start.name());
    let namespace = match namespace {
        ResolveResult::Bound(Namespace(uri)) => decode(decoder, uri)?,
        ResolveResult::Unbound => String::new(),
        ResolveResult::Unknown(prefix) => return Err(XmlError::UnboundPrefix(decode(decoder, &prefix)?)),
    };

    Ok(XmlElement {
        namespace,
        name: decode(decoder, local.as_ref())?,
        ..XmlElement::default()
    })
}

/// Appends a character reference or predefined entity to the element text.
fn push_reference(element: &mut XmlElement, reference: &BytesRef<'_>) -> Result<(), XmlError> {
    if let Some(c) = reference
        .resolve_char_ref()
        .map_err(|e| XmlError::Syntax(e.to_string()))?
    {
        element.raw_text.push(c);
        return Ok(());
    }
    let name = reference.decode().map_err(encoding_error)?;
    let text = resolve_predefined_entity(&name)
        .ok_or_else(|| XmlError::Syntax(format!("unknown entity '&{name};'")))?;
    element.raw_text.push_str(text);
    Ok(())
}

fn decode(decoder: Decoder, bytes: &[u8]) -> Result<String, XmlError> {
    decoder
        .decode(bytes)
        .map(|text| text.into_owned())
        .map_err(encoding_error)
}

fn encoding_error(e: EncodingError) -> XmlError {
    XmlError::Encoding(e.to_string())
}

fn attach(
    element: XmlElement,
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(XmlError::MultipleRoots);
    }
    *root = Some(element);
    Ok(())
}
