//! Minimal lenient HTML tree for the segment codec.
//!
//! Parses real-world marketing pages into a node forest and serializes them
//! back. This is deliberately not a spec HTML5 parser: no implied `html`/
//! `body` wrappers, no entity decoding, no adoption-agency repair. Text is
//! kept verbatim so a parse→serialize round trip of well-formed input is
//! byte-identical outside the constructs the parser normalizes (tag case,
//! attribute quoting, stray close tags).
//!
//! Leniency rules:
//! - unclosed elements are closed at end of input,
//! - a close tag with no matching open tag is dropped,
//! - a `<` that does not start a tag, comment, or declaration is literal text,
//! - `script`/`style` bodies are raw text up to the matching close tag.

/// One node in the parsed forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Raw text exactly as it appeared in the source; entities are untouched.
    Text(String),
    /// Comment body without the `<!--`/`-->` delimiters.
    Comment(String),
    /// Declaration body without the `<!`/`>` delimiters (doctype, CDATA).
    Doctype(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercased tag name.
    pub tag: String,
    /// Attributes in source order; `None` for valueless attributes.
    pub attrs: Vec<(String, Option<String>)>,
    pub children: Vec<Node>,
    /// Whether the source tag ended in `/>`.
    pub self_closing: bool,
}

impl Element {
    /// Look up an attribute value by name, case-insensitively.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_deref())
    }
}

/// Elements that never have children or a close tag.
const VOID_TAGS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose body is raw text (no nested markup).
const RAW_TEXT_TAGS: [&str; 2] = ["script", "style"];

pub fn is_void(tag: &str) -> bool {
    VOID_TAGS.contains(&tag)
}

fn is_raw_text(tag: &str) -> bool {
    RAW_TEXT_TAGS.contains(&tag)
}

/// Escape a string for use as text-node content.
///
/// Replacement text supplied by an editor must pass through here so markup
/// delimiters in an edit stay data instead of becoming structure.
pub fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Parse an HTML document (or fragment) into a node forest.
pub fn parse(input: &str) -> Vec<Node> {
    Parser {
        input,
        bytes: input.as_bytes(),
        pos: 0,
    }
    .run()
}

/// Serialize a node forest back to HTML.
pub fn serialize(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(node, &mut out);
    }
    out
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Text(t) => out.push_str(t),
        Node::Comment(c) => {
            out.push_str("<!--");
            out.push_str(c);
            out.push_str("-->");
        }
        Node::Doctype(d) => {
            out.push_str("<!");
            out.push_str(d);
            out.push('>');
        }
        Node::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            for (name, value) in &el.attrs {
                out.push(' ');
                out.push_str(name);
                if let Some(v) = value {
                    out.push_str("=\"");
                    out.push_str(&v.replace('"', "&quot;"));
                    out.push('"');
                }
            }
            if el.self_closing {
                out.push_str("/>");
                return;
            }
            out.push('>');
            if is_void(&el.tag) {
                return;
            }
            for child in &el.children {
                write_node(child, out);
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn run(mut self) -> Vec<Node> {
        let mut roots: Vec<Node> = Vec::new();
        let mut stack: Vec<Element> = Vec::new();

        while self.pos < self.bytes.len() {
            match self.find(b'<') {
                None => {
                    let text = &self.input[self.pos..];
                    attach_text(&mut stack, &mut roots, text);
                    self.pos = self.bytes.len();
                }
                Some(lt) => {
                    if lt > self.pos {
                        let text = &self.input[self.pos..lt];
                        attach_text(&mut stack, &mut roots, text);
                        self.pos = lt;
                    }
                    match self.bytes.get(self.pos + 1) {
                        Some(b'!') => {
                            let node = self.parse_declaration();
                            attach(&mut stack, &mut roots, node);
                        }
                        Some(b'/') => {
                            if let Some(name) = self.parse_close_tag() {
                                close_element(&mut stack, &mut roots, &name);
                            }
                        }
                        Some(c) if c.is_ascii_alphabetic() => {
                            self.parse_open_tag(&mut stack, &mut roots);
                        }
                        _ => {
                            // Literal '<' in text.
                            attach_text(&mut stack, &mut roots, "<");
                            self.pos += 1;
                        }
                    }
                }
            }
        }

        // Unclosed elements are closed at end of input.
        while let Some(el) = stack.pop() {
            attach(&mut stack, &mut roots, Node::Element(el));
        }

        roots
    }

    fn find(&self, byte: u8) -> Option<usize> {
        self.bytes[self.pos..]
            .iter()
            .position(|&b| b == byte)
            .map(|off| self.pos + off)
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    /// `<!-- ... -->`, `<!DOCTYPE ...>`, and other declarations.
    fn parse_declaration(&mut self) -> Node {
        if self.input[self.pos..].starts_with("<!--") {
            self.pos += 4;
            let start = self.pos;
            match self.input[self.pos..].find("-->") {
                Some(rel) => {
                    self.pos += rel + 3;
                    Node::Comment(self.input[start..start + rel].to_string())
                }
                None => {
                    self.pos = self.bytes.len();
                    Node::Comment(self.input[start..].to_string())
                }
            }
        } else {
            self.pos += 2;
            let start = self.pos;
            match self.find(b'>') {
                Some(gt) => {
                    self.pos = gt + 1;
                    Node::Doctype(self.input[start..gt].to_string())
                }
                None => {
                    self.pos = self.bytes.len();
                    Node::Doctype(self.input[start..].to_string())
                }
            }
        }
    }

    /// `</name ...>` — returns the lowercased name, or None for garbage.
    fn parse_close_tag(&mut self) -> Option<String> {
        self.pos += 2;
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos] != b'>' {
            self.pos += 1;
        }
        let inner = &self.input[start..self.pos];
        if self.pos < self.bytes.len() {
            self.pos += 1; // consume '>'
        }
        let name = inner.split_ascii_whitespace().next().unwrap_or("");
        if name.is_empty() || !name.as_bytes()[0].is_ascii_alphabetic() {
            return None;
        }
        Some(name.to_ascii_lowercase())
    }

    fn parse_open_tag(&mut self, stack: &mut Vec<Element>, roots: &mut Vec<Node>) {
        self.pos += 1; // consume '<'
        let start = self.pos;
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_alphanumeric() || self.bytes[self.pos] == b'-')
        {
            self.pos += 1;
        }
        let tag = self.input[start..self.pos].to_ascii_lowercase();

        let mut attrs = Vec::new();
        let mut self_closing = false;
        loop {
            self.skip_whitespace();
            match self.bytes.get(self.pos) {
                None => break,
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(b'/') if self.bytes.get(self.pos + 1) == Some(&b'>') => {
                    self_closing = true;
                    self.pos += 2;
                    break;
                }
                Some(b'/') => {
                    self.pos += 1;
                }
                _ => {
                    if let Some(attr) = self.parse_attr() {
                        attrs.push(attr);
                    }
                }
            }
        }

        let mut element = Element {
            tag,
            attrs,
            children: Vec::new(),
            self_closing,
        };

        if self_closing || is_void(&element.tag) {
            attach(stack, roots, Node::Element(element));
        } else if is_raw_text(&element.tag) {
            let body = self.consume_raw_text(&element.tag);
            if !body.is_empty() {
                element.children.push(Node::Text(body));
            }
            attach(stack, roots, Node::Element(element));
        } else {
            stack.push(element);
        }
    }

    fn parse_attr(&mut self) -> Option<(String, Option<String>)> {
        let start = self.pos;
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if b.is_ascii_whitespace() || b == b'=' || b == b'>' || b == b'/' {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            // Junk byte; skip it so the attribute loop makes progress.
            self.pos += 1;
            return None;
        }
        let name = self.input[start..self.pos].to_string();

        self.skip_whitespace();
        if self.bytes.get(self.pos) != Some(&b'=') {
            return Some((name, None));
        }
        self.pos += 1;
        self.skip_whitespace();

        let value = match self.bytes.get(self.pos) {
            Some(&q) if q == b'"' || q == b'\'' => {
                self.pos += 1;
                let vstart = self.pos;
                match self.bytes[self.pos..].iter().position(|&b| b == q) {
                    Some(rel) => {
                        self.pos += rel + 1;
                        self.input[vstart..vstart + rel].to_string()
                    }
                    None => {
                        // Unterminated quote: take the rest of the input.
                        self.pos = self.bytes.len();
                        self.input[vstart..].to_string()
                    }
                }
            }
            _ => {
                let vstart = self.pos;
                while self.pos < self.bytes.len() {
                    let b = self.bytes[self.pos];
                    if b.is_ascii_whitespace() || b == b'>' {
                        break;
                    }
                    if b == b'/' && self.bytes.get(self.pos + 1) == Some(&b'>') {
                        break;
                    }
                    self.pos += 1;
                }
                self.input[vstart..self.pos].to_string()
            }
        };
        Some((name, Some(value)))
    }

    /// Raw body of a `script`/`style` element, up to its close tag.
    fn consume_raw_text(&mut self, tag: &str) -> String {
        let needle: Vec<u8> = format!("</{}", tag).into_bytes();
        match find_ci(&self.bytes[self.pos..], &needle) {
            Some(rel) => {
                let body = self.input[self.pos..self.pos + rel].to_string();
                self.pos += rel;
                while self.pos < self.bytes.len() && self.bytes[self.pos] != b'>' {
                    self.pos += 1;
                }
                if self.pos < self.bytes.len() {
                    self.pos += 1;
                }
                body
            }
            None => {
                let body = self.input[self.pos..].to_string();
                self.pos = self.bytes.len();
                body
            }
        }
    }
}

/// Case-insensitive byte search.
fn find_ci(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&i| {
        haystack[i..i + needle.len()]
            .iter()
            .zip(needle)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    })
}

fn attach(stack: &mut [Element], roots: &mut Vec<Node>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}

/// Attach text, merging with an adjacent text sibling so ignored constructs
/// (stray close tags) do not split one logical text run into two nodes.
fn attach_text(stack: &mut [Element], roots: &mut Vec<Node>, text: &str) {
    let children = match stack.last_mut() {
        Some(parent) => &mut parent.children,
        None => roots,
    };
    if let Some(Node::Text(prev)) = children.last_mut() {
        prev.push_str(text);
    } else {
        children.push(Node::Text(text.to_string()));
    }
}

fn close_element(stack: &mut Vec<Element>, roots: &mut Vec<Node>, name: &str) {
    let Some(open_at) = stack.iter().rposition(|el| el.tag == name) else {
        return; // stray close tag
    };
    while stack.len() > open_at {
        let el = stack.pop().expect("non-empty stack");
        attach(stack, roots, Node::Element(el));
    }
}
