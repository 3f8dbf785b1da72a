#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};

use crate::error::{GradingError, GradingResult};

/// Deepest element nesting a document may have.
pub const MAX_ELEMENT_DEPTH: usize = 1024;

/// An owned XML element with namespace prefixes stripped.
///
/// ProFormA documents are small, so they are read into this tree once and then
/// converted into typed structures; nothing downstream re-queries raw markup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    /// Local name of the element.
    pub name:       String,
    /// Attributes in document order, keyed by local name.
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order.
    pub children:   Vec<Element>,
    /// Concatenated text and CDATA content, untrimmed.
    pub text:       String,
}

impl Element {
    /// Parses a complete document and returns its root element.
    pub fn parse(xml: &str) -> GradingResult<Element> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    if stack.len() >= MAX_ELEMENT_DEPTH {
                        return Err(GradingError::MalformedDocument(format!(
                            "elements nest deeper than {MAX_ELEMENT_DEPTH} levels"
                        )));
                    }
                    stack.push(Self::open(&start)?);
                }
                Event::Empty(start) => {
                    let element = Self::open(&start)?;
                    Self::attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| {
                        GradingError::MalformedDocument("unbalanced closing tag".into())
                    })?;
                    Self::attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text.unescape()?);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(GradingError::MalformedDocument(format!(
                "element `{}` is never closed",
                open.name
            )));
        }

        root.ok_or_else(|| GradingError::MalformedDocument("document has no root element".into()))
    }

    /// Builds an element from a start tag, without children.
    fn open(start: &BytesStart<'_>) -> GradingResult<Element> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            if attr.key.as_ref().starts_with(b"xmlns") {
                continue;
            }
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }

        Ok(Element {
            name,
            attributes,
            ..Default::default()
        })
    }

    /// Hands a finished element to its parent, or makes it the root.
    fn attach(
        stack: &mut [Element],
        root: &mut Option<Element>,
        element: Element,
    ) -> GradingResult<()> {
        match stack.last_mut() {
            Some(parent) => parent.children.push(element),
            None if root.is_none() => *root = Some(element),
            None => {
                return Err(GradingError::MalformedDocument(
                    "document has more than one root element".into(),
                ));
            }
        }
        Ok(())
    }

    /// Returns the value of an attribute by local name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the first child with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Returns all children with the given local name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Returns the trimmed text content.
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Returns the trimmed text of a named child, `None` when absent or blank.
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name)
            .map(Element::text)
            .filter(|text| !text.is_empty())
            .map(str::to_owned)
    }

    /// Finds the first element with the given local name, searching depth-first
    /// and including `self`.
    pub fn find(&self, name: &str) -> Option<&Element> {
        let mut pending = vec![self];
        while let Some(element) = pending.pop() {
            if element.name == name {
                return Some(element);
            }
            pending.extend(element.children.iter().rev());
        }
        None
    }
}
