//! Tolerant XML element tree built on `quick-xml`.
//!
//! Feeds in the wild are frequently broken: unclosed tags, stray end tags,
//! undeclared entities. The reader here keeps whatever it managed to read
//! before the first hard error instead of failing the whole document, and
//! leaves entity decoding to the caller so unknown entities never abort it.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;

use crate::util::decode_entities;

/// SEC-003: Deeper nesting than this stops the reader.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Element(Element),
    /// Raw (still escaped) character data.
    Text(String),
    CData(String),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Element {
    /// Qualified name, lowercased (`content:encoded`).
    pub name: String,
    /// Attribute names lowercased, values entity-decoded.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

/// Result of reading a document.
#[derive(Debug)]
pub(crate) struct Document {
    /// Synthetic container holding the top-level elements.
    pub top: Element,
    /// True when reading stopped early on a syntax error or depth limit.
    pub truncated: bool,
}

impl Document {
    /// First top-level element.
    pub fn root(&self) -> Option<&Element> {
        self.top.elements().next()
    }
}

impl Element {
    fn new(name: String, attrs: Vec<(String, String)>) -> Self {
        Self {
            name,
            attrs,
            children: Vec::new(),
        }
    }

    /// Name without namespace prefix.
    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// First child whose qualified name matches exactly.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    /// Children whose local name matches, whatever their prefix.
    pub fn children_local<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.elements().filter(move |e| e.local_name() == name)
    }

    /// First element in document order (depth-first, excluding self) with
    /// the given local name.
    pub fn find_local(&self, name: &str) -> Option<&Element> {
        for element in self.elements() {
            if element.local_name() == name {
                return Some(element);
            }
            if let Some(found) = element.find_local(name) {
                return Some(found);
            }
        }
        None
    }

    /// All elements with the given local name, not descending into matches.
    pub fn collect_local<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        for element in self.elements() {
            if element.local_name() == name {
                out.push(element);
            } else {
                element.collect_local(name, out);
            }
        }
    }

    /// Plain text content with entities decoded.
    ///
    /// CDATA sections take precedence over ordinary text when both exist.
    pub fn text(&self) -> String {
        let cdata: String = self
            .children
            .iter()
            .filter_map(|node| match node {
                Node::CData(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();

        let raw = if cdata.trim().is_empty() {
            self.children
                .iter()
                .filter_map(|node| match node {
                    Node::Text(s) => Some(s.as_str()),
                    _ => None,
                })
                .collect()
        } else {
            cdata
        };

        decode_entities(raw.trim()).into_owned()
    }

    /// Markup content suitable for an HTML body.
    ///
    /// Escaped text is unescaped once, CDATA is taken verbatim, and child
    /// elements (Atom `type="xhtml"`) are re-serialized.
    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                Node::Text(raw) => out.push_str(&decode_entities(raw)),
                Node::CData(s) => out.push_str(s),
                Node::Element(element) => element.write_markup(&mut out),
            }
        }
        out.trim().to_owned()
    }

    fn write_markup(&self, out: &mut String) {
        out.push('<');
        out.push_str(self.local_name());
        for (key, value) in &self.attrs {
            if key.starts_with("xmlns") {
                continue;
            }
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&value.replace('&', "&amp;").replace('"', "&quot;"));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for node in &self.children {
            match node {
                // Raw text is still escaped, which is what markup wants
                Node::Text(raw) => out.push_str(raw),
                Node::CData(s) => out.push_str(&escape_text(s)),
                Node::Element(element) => element.write_markup(out),
            }
        }
        out.push_str("</");
        out.push_str(self.local_name());
        out.push('>');
    }
}

fn local(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name)
}

fn escape_text(s: &str) -> Cow<'_, str> {
    if s.contains(['&', '<', '>']) {
        Cow::Owned(
            s.replace('&', "&amp;")
                .replace('<', "&lt;")
                .replace('>', "&gt;"),
        )
    } else {
        Cow::Borrowed(s)
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn start_element(e: &quick_xml::events::BytesStart<'_>) -> Element {
    let name = lossy(e.name().as_ref()).to_ascii_lowercase();
    let mut attributes = e.attributes();
    attributes.with_checks(false);
    let attrs = attributes
        .flatten()
        .map(|attr| {
            let key = lossy(attr.key.as_ref()).to_ascii_lowercase();
            let value = decode_entities(&String::from_utf8_lossy(&attr.value)).into_owned();
            (key, value)
        })
        .collect();
    Element::new(name, attrs)
}

/// Pops the top of the stack into its parent.
fn close_top(stack: &mut Vec<Element>) {
    if stack.len() < 2 {
        return;
    }
    if let Some(done) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(Node::Element(done));
        }
    }
}

/// Reads a document into an element tree, tolerating damage.
///
/// Mismatched end tags close every element opened after the matching start
/// tag; end tags matching nothing open are ignored. A syntax error ends
/// reading and everything read so far is kept.
pub(crate) fn read_document(text: &str) -> Document {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = false;

    let mut stack: Vec<Element> = vec![Element::default()];
    let mut truncated = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if stack.len() > MAX_DEPTH {
                    tracing::warn!(depth = MAX_DEPTH, "XML nesting too deep, truncating document");
                    truncated = true;
                    break;
                }
                stack.push(start_element(&e));
            }
            Ok(Event::Empty(e)) => {
                let element = start_element(&e);
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Element(element));
                }
            }
            Ok(Event::End(e)) => {
                let name = lossy(e.name().as_ref()).to_ascii_lowercase();
                if let Some(pos) = stack.iter().skip(1).rposition(|el| el.name == name) {
                    // rposition over skip(1) is relative to index 1
                    let target = pos + 1;
                    while stack.len() > target {
                        close_top(&mut stack);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                // Whitespace-only runs are kept: between inline elements
                // they are the only thing separating words.
                let raw = lossy(&t.into_inner());
                if let Some(current) = stack.last_mut() {
                    current.children.push(Node::Text(raw));
                }
            }
            Ok(Event::CData(c)) => {
                let raw = lossy(&c.into_inner());
                if let Some(current) = stack.last_mut() {
                    current.children.push(Node::CData(raw));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    position = reader.buffer_position(),
                    error = %e,
                    "XML syntax error, keeping content read so far"
                );
                truncated = true;
                break;
            }
        }
    }

    while stack.len() > 1 {
        close_top(&mut stack);
    }

    Document {
        top: stack.pop().unwrap_or_default(),
        truncated,
    }
}
