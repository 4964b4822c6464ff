//! Minimal XML writing and reading helpers for the wire codec.
//!
//! Documents are written without a declaration or whitespace between
//! elements, so the same value always produces byte-identical text.
//! Parsing is done with `roxmltree`; [`ElementCursor`] walks the element
//! children of a node and lets the decoder peek at the next element name.

use roxmltree::Node;

use super::error::{Result, WirecallError};

/// Append-only XML text builder.
#[derive(Debug, Default)]
pub struct XmlWriter {
    buf: String,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, name: &str) {
        self.buf.push('<');
        self.buf.push_str(name);
        self.buf.push('>');
    }

    pub fn end(&mut self, name: &str) {
        self.buf.push_str("</");
        self.buf.push_str(name);
        self.buf.push('>');
    }

    /// Writes a self-closing element.
    pub fn empty(&mut self, name: &str) {
        self.buf.push('<');
        self.buf.push_str(name);
        self.buf.push_str("/>");
    }

    /// Writes escaped character data.
    ///
    /// Fails for characters XML 1.0 cannot carry at all (most C0 controls).
    /// Carriage returns are written as character references so parsers do
    /// not normalize them away.
    pub fn text(&mut self, text: &str) -> Result<()> {
        for c in text.chars() {
            match c {
                '&' => self.buf.push_str("&amp;"),
                '<' => self.buf.push_str("&lt;"),
                '>' => self.buf.push_str("&gt;"),
                '\r' => self.buf.push_str("&#13;"),
                '\t' | '\n' => self.buf.push(c),
                c if (c as u32) < 0x20 || c == '\u{FFFE}' || c == '\u{FFFF}' => {
                    return Err(WirecallError::invalid_value(
                        "xml text",
                        format!("U+{:04X}", c as u32),
                    ));
                }
                c => self.buf.push(c),
            }
        }
        Ok(())
    }

    /// Writes `<name>text</name>`.
    pub fn leaf(&mut self, name: &str, text: &str) -> Result<()> {
        self.start(name);
        self.text(text)?;
        self.end(name);
        Ok(())
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

/// Whether `name` can be used as an element name.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    !name.to_ascii_lowercase().starts_with("xml")
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Concatenated character data directly inside `node`.
pub fn text_content(node: Node<'_, '_>) -> String {
    node.children()
        .filter(|child| child.is_text())
        .filter_map(|child| child.text())
        .collect()
}

/// Forward cursor over the element children of one node.
pub struct ElementCursor<'a, 'input> {
    parent: Node<'a, 'input>,
    elements: Vec<Node<'a, 'input>>,
    position: usize,
}

impl<'a, 'input> ElementCursor<'a, 'input> {
    pub fn new(parent: Node<'a, 'input>) -> Self {
        Self {
            parent,
            elements: parent.children().filter(|child| child.is_element()).collect(),
            position: 0,
        }
    }

    /// Name of the next element without consuming it.
    pub fn peek_name(&self) -> Option<&'a str> {
        self.elements
            .get(self.position)
            .map(|node| node.tag_name().name())
    }

    pub fn next_element(&mut self) -> Option<Node<'a, 'input>> {
        let node = self.elements.get(self.position).copied();
        if node.is_some() {
            self.position += 1;
        }
        node
    }

    /// Consumes the next element, which must be named `name`.
    pub fn expect(&mut self, name: &str) -> Result<Node<'a, 'input>> {
        match self.elements.get(self.position).copied() {
            Some(node) if node.tag_name().name() == name => {
                self.position += 1;
                Ok(node)
            }
            Some(node) => Err(WirecallError::MalformedDocument(format!(
                "expected <{}> inside <{}>, found <{}>",
                name,
                self.parent.tag_name().name(),
                node.tag_name().name()
            ))),
            None => Err(WirecallError::MalformedDocument(format!(
                "expected <{}> inside <{}>, found end of element",
                name,
                self.parent.tag_name().name()
            ))),
        }
    }

    /// Fails if any element children remain unread.
    pub fn finish(self) -> Result<()> {
        match self.peek_name() {
            None => Ok(()),
            Some(found) => Err(WirecallError::MalformedDocument(format!(
                "unexpected <{}> inside <{}>",
                found,
                self.parent.tag_name().name()
            ))),
        }
    }
}

/// Root element of `doc`, which must be named `name`.
pub fn expect_root<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
    name: &str,
) -> Result<Node<'a, 'input>> {
    let root = doc.root_element();
    if root.tag_name().name() != name {
        return Err(WirecallError::MalformedDocument(format!(
            "expected root <{}>, found <{}>",
            name,
            root.tag_name().name()
        )));
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_escapes_markup() {
        let mut writer = XmlWriter::new();
        writer.leaf("data", "a < b && c > d\r\n").unwrap();
        assert_eq!(writer.finish(), "<data>a &lt; b &amp;&amp; c &gt; d&#13;\n</data>");
    }

    #[test]
    fn test_writer_rejects_control_characters() {
        let mut writer = XmlWriter::new();
        assert!(writer.text("bell\u{7}").is_err());
    }

    #[test]
    fn test_escaped_text_survives_parsing() {
        let original = "  <tag> & \"quotes\" 'apostrophes'\r\n\ttabs  ";
        let mut writer = XmlWriter::new();
        writer.leaf("data", original).unwrap();
        let xml = writer.finish();

        let doc = roxmltree::Document::parse(&xml).unwrap();
        assert_eq!(text_content(doc.root_element()), original);
    }

    #[test]
    fn test_name_validation() {
        assert!(is_valid_name("point"));
        assert!(is_valid_name("_private.type-2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("2fast"));
        assert!(!is_valid_name("has space"));
        assert!(!is_valid_name("xmlThing"));
    }

    #[test]
    fn test_cursor_peeks_without_consuming() {
        let doc = roxmltree::Document::parse("<root><a/>text<b>x</b></root>").unwrap();
        let mut cursor = ElementCursor::new(doc.root_element());

        assert_eq!(cursor.peek_name(), Some("a"));
        assert_eq!(cursor.peek_name(), Some("a"));
        cursor.expect("a").unwrap();
        assert!(cursor.expect("c").is_err());
        assert_eq!(cursor.expect("b").unwrap().text(), Some("x"));
        cursor.finish().unwrap();
    }

    #[test]
    fn test_cursor_finish_reports_leftovers() {
        let doc = roxmltree::Document::parse("<root><a/><b/></root>").unwrap();
        let mut cursor = ElementCursor::new(doc.root_element());
        cursor.expect("a").unwrap();
        assert!(matches!(cursor.finish(), Err(WirecallError::MalformedDocument(_))));
    }
}
