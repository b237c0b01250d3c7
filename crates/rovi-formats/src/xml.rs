//! Owned XML tree over quick-xml
//!
//! The Xacro expander, the MJCF pre-passes, and the ground-plane injector
//! all rewrite documents before handing them on. This tree keeps element
//! order, attribute order, and comments, so rewritten output stays close
//! to its input.

use quick_xml::Reader;
use quick_xml::events::Event;

/// An XML element with ordered attributes and children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlChild>,
}

/// Child content of an element.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlChild {
    Element(XmlNode),
    Text(String),
    Comment(String),
}

impl XmlNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.attrs.push((name, value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let idx = self.attrs.iter().position(|(k, _)| k == name)?;
        Some(self.attrs.remove(idx).1)
    }

    /// First element child with the given tag.
    pub fn child(&self, tag: &str) -> Option<&XmlNode> {
        self.elements().find(|e| e.tag == tag)
    }

    pub fn child_mut(&mut self, tag: &str) -> Option<&mut XmlNode> {
        self.elements_mut().find(|e| e.tag == tag)
    }

    /// Element children with the given tag, in document order.
    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.elements().filter(move |e| e.tag == tag)
    }

    /// All element children, in document order.
    pub fn elements(&self) -> impl Iterator<Item = &XmlNode> {
        self.children.iter().filter_map(|c| match c {
            XmlChild::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlNode> {
        self.children.iter_mut().filter_map(|c| match c {
            XmlChild::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn push(&mut self, node: XmlNode) {
        self.children.push(XmlChild::Element(node));
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(XmlChild::Text(text.into()));
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            if let XmlChild::Text(t) = child {
                out.push_str(t);
            }
        }
        out
    }

    /// True when any element in this subtree, including self, satisfies
    /// the predicate.
    pub fn any_element(&self, predicate: &dyn Fn(&XmlNode) -> bool) -> bool {
        if predicate(self) {
            return true;
        }
        self.elements().any(|e| e.any_element(predicate))
    }

    /// Serialize the subtree.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_into(&mut out);
        out
    }

    fn write_into(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (k, v) in &self.attrs {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            out.push_str(&escape_xml(v));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                XmlChild::Element(e) => e.write_into(out),
                XmlChild::Text(t) => out.push_str(&escape_xml(t)),
                XmlChild::Comment(c) => {
                    out.push_str("<!--");
                    out.push_str(c);
                    out.push_str("-->");
                }
            }
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }
}

/// Parse a document and return its root element. Comments are preserved
/// as tree children; the XML declaration and doctype are dropped.
pub fn parse_document(xml: &str) -> Result<XmlNode, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if root.is_some() && stack.is_empty() {
                    return Err(XmlError::Invalid("content after root element".into()));
                }
                stack.push(element_from_start(e)?);
            }
            Ok(Event::Empty(ref e)) => {
                let node = element_from_start(e)?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| XmlError::Invalid("unmatched closing tag".into()))?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| XmlError::Invalid(e.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    top.push_text(text.into_owned());
                }
            }
            Ok(Event::CData(t)) => {
                if let Some(top) = stack.last_mut() {
                    top.push_text(String::from_utf8_lossy(&t).into_owned());
                }
            }
            Ok(Event::Comment(t)) => {
                if let Some(top) = stack.last_mut() {
                    top.children
                        .push(XmlChild::Comment(String::from_utf8_lossy(&t).into_owned()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(XmlError::Invalid(e.to_string())),
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(XmlError::UnexpectedEof);
    }
    root.ok_or(XmlError::NoRootElement)
}

fn element_from_start(e: &quick_xml::events::BytesStart) -> Result<XmlNode, XmlError> {
    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut node = XmlNode::new(tag);
    for attr in e.attributes() {
        let attr = attr.map_err(|e| XmlError::Invalid(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Invalid(e.to_string()))?
            .into_owned();
        node.attrs.push((key, value));
    }
    Ok(node)
}

fn attach(
    stack: &mut [XmlNode],
    root: &mut Option<XmlNode>,
    node: XmlNode,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.push(node);
            Ok(())
        }
        None => {
            if root.is_some() {
                return Err(XmlError::Invalid("multiple root elements".into()));
            }
            *root = Some(node);
            Ok(())
        }
    }
}

pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

// ============== Errors ==============

#[derive(Debug, Clone, thiserror::Error)]
pub enum XmlError {
    #[error("Invalid XML: {0}")]
    Invalid(String),

    #[error("Unexpected end of document")]
    UnexpectedEof,

    #[error("Document has no root element")]
    NoRootElement,
}
