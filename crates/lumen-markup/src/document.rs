use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ParseError;

// ── Element tree ──────────────────────────────────────────────────────────

/// A prefixed XML name as written in the source (`x:Key`, `Button.Content`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QName {
    /// Namespace prefix, empty when the name is unprefixed.
    pub prefix: String,
    pub local: String,
}

impl QName {
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((prefix, local)) => Self { prefix: prefix.to_string(), local: local.to_string() },
            None => Self { prefix: String::new(), local: raw.to_string() },
        }
    }

    pub fn is_prefixed(&self) -> bool {
        !self.prefix.is_empty()
    }

    /// `Owner.Member` split of the local part, `None` for plain names.
    pub fn member_parts(&self) -> Option<(&str, &str)> {
        self.local.split_once('.')
    }
}

impl std::fmt::Display for QName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "{}", self.local)
        } else {
            write!(f, "{}:{}", self.prefix, self.local)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: QName,
    /// Unescaped attribute text.
    pub value: String,
    pub line: usize,
    pub col: usize,
}

impl Attribute {
    /// `xmlns` and `xmlns:p` declarations.
    pub fn is_namespace_declaration(&self) -> bool {
        (self.name.prefix.is_empty() && self.name.local == "xmlns") || self.name.prefix == "xmlns"
    }

    /// The prefix an `xmlns` attribute declares (empty for the default namespace).
    pub fn declared_prefix(&self) -> &str {
        if self.name.prefix == "xmlns" { &self.name.local } else { "" }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    /// Non-blank character data, trimmed. CDATA sections arrive here verbatim.
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: QName,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    pub line: usize,
    pub col: usize,
}

impl Element {
    /// Member-element syntax: `<Owner.Member>`.
    pub fn is_member_element(&self) -> bool {
        self.name.member_parts().is_some()
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Concatenated text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    pub fn attribute(&self, qualified: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name.to_string() == qualified)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub root: Element,
}

// ── Reader ────────────────────────────────────────────────────────────────

/// Maps byte offsets in the source to 1-based line/column pairs.
struct LineIndex<'s> {
    src: &'s str,
    starts: Vec<usize>,
}

impl<'s> LineIndex<'s> {
    fn new(src: &'s str) -> Self {
        let mut starts = vec![0];
        starts.extend(src.match_indices('\n').map(|(i, _)| i + 1));
        Self { src, starts }
    }

    fn position(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.src.len());
        let line = self.starts.partition_point(|&s| s <= offset).max(1);
        let start = self.starts[line - 1];
        let col = self.src.get(start..offset).map_or(1, |s| s.chars().count() + 1);
        (line, col)
    }
}

/// Parse a markup document into its element tree.
///
/// Comments, processing instructions and the XML declaration are skipped;
/// whitespace-only text is dropped and remaining text is trimmed.
pub fn parse_document(src: &str) -> Result<Document, ParseError> {
    let lines = LineIndex::new(src);
    let mut reader = Reader::from_str(src);
    let mut open: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let offset = reader.buffer_position();
        let event = reader.read_event().map_err(|e| {
            let (line, col) = lines.position(reader.buffer_position());
            ParseError::new(e.to_string(), line, col)
        })?;
        let (line, col) = lines.position(offset);
        match event {
            Event::Start(start) => {
                open.push(read_element(&start, line, col)?);
            }
            Event::Empty(start) => {
                let element = read_element(&start, line, col)?;
                attach(element, &mut open, &mut root, line, col)?;
            }
            Event::End(end) => {
                let name = utf8(end.name().as_ref(), line, col)?;
                let Some(element) = open.pop() else {
                    return Err(ParseError::new(format!("unexpected closing tag </{}>", name), line, col));
                };
                if element.name.to_string() != name {
                    return Err(ParseError::new(
                        format!("expected </{}>, found </{}>", element.name, name),
                        line,
                        col,
                    ));
                }
                attach(element, &mut open, &mut root, line, col)?;
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| ParseError::new(e.to_string(), line, col))?;
                push_text(&mut open, text.trim(), line, col)?;
            }
            Event::CData(data) => {
                let raw = data.into_inner();
                let text = utf8(&raw, line, col)?;
                if let Some(parent) = open.last_mut() {
                    parent.children.push(Node::Text(text));
                } else {
                    return Err(ParseError::new("character data outside the root element", line, col));
                }
            }
            Event::Eof => break,
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
        }
    }

    if let Some(unclosed) = open.last() {
        return Err(ParseError::new(
            format!("element <{}> is not closed", unclosed.name),
            unclosed.line,
            unclosed.col,
        ));
    }
    let (line, col) = lines.position(src.len());
    root.map(|root| Document { root })
        .ok_or_else(|| ParseError::new("document has no root element", line, col))
}

fn read_element(start: &BytesStart<'_>, line: usize, col: usize) -> Result<Element, ParseError> {
    let name = QName::parse(&utf8(start.name().as_ref(), line, col)?);
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseError::new(e.to_string(), line, col))?;
        let key = utf8(attr.key.as_ref(), line, col)?;
        let value = attr
            .unescape_value()
            .map_err(|e| ParseError::new(e.to_string(), line, col))?;
        attributes.push(Attribute { name: QName::parse(&key), value: value.into_owned(), line, col });
    }
    Ok(Element { name, attributes, children: Vec::new(), line, col })
}

fn attach(
    element: Element,
    open: &mut [Element],
    root: &mut Option<Element>,
    line: usize,
    col: usize,
) -> Result<(), ParseError> {
    if let Some(parent) = open.last_mut() {
        parent.children.push(Node::Element(element));
        return Ok(());
    }
    if root.is_some() {
        return Err(ParseError::new("document has more than one root element", line, col));
    }
    *root = Some(element);
    Ok(())
}

fn push_text(open: &mut [Element], text: &str, line: usize, col: usize) -> Result<(), ParseError> {
    if text.is_empty() {
        return Ok(());
    }
    match open.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Text(text.to_string()));
            Ok(())
        }
        None => Err(ParseError::new("text outside the root element", line, col)),
    }
}

fn utf8(bytes: &[u8], line: usize, col: usize) -> Result<String, ParseError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| ParseError::new(format!("invalid UTF-8: {}", e), line, col))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_one_based() {
        let doc = parse_document("<A>\n  <B x=\"1\"/>\n</A>").unwrap();
        let b = doc.root.child_elements().next().unwrap();
        assert_eq!((doc.root.line, doc.root.col), (1, 1));
        assert_eq!((b.line, b.col), (2, 3));
        assert_eq!(b.attributes[0].value, "1");
    }

    #[test]
    fn text_is_trimmed_and_blank_text_dropped() {
        let doc = parse_document("<A>\n   <B/>\n  hello  \n</A>").unwrap();
        assert_eq!(doc.root.children.len(), 2);
        assert_eq!(doc.root.text(), "hello");
    }

    #[test]
    fn entities_are_unescaped() {
        let doc = parse_document(r#"<A v="a &amp; b">&lt;x&gt;</A>"#).unwrap();
        assert_eq!(doc.root.attributes[0].value, "a & b");
        assert_eq!(doc.root.text(), "<x>");
    }

    #[test]
    fn namespace_declarations() {
        let doc = parse_document(r#"<A xmlns="urn:a" xmlns:x="urn:x" x:Key="k"/>"#).unwrap();
        let attrs = &doc.root.attributes;
        assert!(attrs[0].is_namespace_declaration());
        assert_eq!(attrs[0].declared_prefix(), "");
        assert_eq!(attrs[1].declared_prefix(), "x");
        assert!(!attrs[2].is_namespace_declaration());
        assert_eq!(attrs[2].name.to_string(), "x:Key");
    }

    #[test]
    fn member_elements() {
        let doc = parse_document("<Button><Button.Content>Hi</Button.Content></Button>").unwrap();
        let member = doc.root.child_elements().next().unwrap();
        assert!(member.is_member_element());
        assert_eq!(member.name.member_parts(), Some(("Button", "Content")));
    }

    #[test]
    fn mismatched_close_reports_position() {
        let err = parse_document("<A>\n<B></C></A>").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn unclosed_root() {
        assert!(parse_document("<A><B/>").is_err());
    }

    #[test]
    fn empty_document() {
        assert!(parse_document("<!-- nothing -->").is_err());
    }
}
