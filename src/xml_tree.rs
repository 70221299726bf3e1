use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};
use quick_xml::Reader;
use quick_xml::events::BytesStart;
use quick_xml::events::Event as XmlEvent;

use crate::error::IngestError;

/// Owned element node. `name` keeps any namespace prefix (`ss:Row`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// Attribute lookup by qualified or local key, so `ss:Index` answers to `Index`.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key || local_part(k) == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, local: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.local_name() == local)
    }

    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.local_name() == local)
    }

    /// Pre-order walk over every element below this one, in document order.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: self.children.iter().rev().collect() }
    }

    pub fn text_content(&self) -> String {
        let mut out = self.text.clone();
        for d in self.descendants() { out.push_str(&d.text); }
        out
    }

    /// Like [`XmlNode::text_content`] but leaves out child subtrees named `skip`.
    pub fn text_content_skipping(&self, skip: &str) -> String {
        let mut out = self.text.clone();
        for c in self.children.iter().filter(|c| c.local_name() != skip) {
            out.push_str(&c.text_content_skipping(skip));
        }
        out
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a XmlNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a XmlNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

fn local_part(name: &str) -> &str {
    match name.rfind(':') {
        Some(i) => &name[i + 1..],
        None => name,
    }
}

fn parse_failure(message: impl ToString, position: u64) -> IngestError {
    IngestError::Parse { message: message.to_string(), position }
}

fn element(e: &BytesStart<'_>, position: u64) -> Result<XmlNode, IngestError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for a in e.attributes() {
        let a = a.map_err(|err| parse_failure(err, position))?;
        let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
        let value = a.unescape_value().map_err(|err| parse_failure(err, position))?;
        attributes.push((key, value.into_owned()));
    }
    Ok(XmlNode { name, attributes, ..Default::default() })
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode, position: u64) -> Result<(), IngestError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }
    if root.is_some() { return Err(parse_failure(format!("second root element <{}>", node.name), position)); }
    *root = Some(node);
    Ok(())
}

/// Decodes raw input using its BOM, else the declared `encoding`, else UTF-8.
/// Bytes that do not decode cleanly are a parse failure.
pub fn decode_document(bytes: &[u8]) -> Result<String, IngestError> {
    let encoding = match Encoding::for_bom(bytes) {
        Some((enc, _)) => enc,
        None => declared_encoding(bytes)?.unwrap_or(UTF_8),
    };
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(parse_failure(format!("input is not valid {}", used.name()), 0));
    }
    Ok(text.into_owned())
}

fn declared_encoding(bytes: &[u8]) -> Result<Option<&'static Encoding>, IngestError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let Ok(XmlEvent::Decl(decl)) = reader.read_event_into(&mut buf) else { return Ok(None) };
    let Some(label) = decl.encoding() else { return Ok(None) };
    let label = label.map_err(|err| parse_failure(err, 0))?;
    let Some(enc) = Encoding::for_label(&label) else {
        return Err(parse_failure(format!("unsupported encoding {:?}", String::from_utf8_lossy(&label)), 0));
    };
    // A declaration readable as ASCII without a BOM cannot be UTF-16.
    if enc == UTF_16LE || enc == UTF_16BE { return Ok(None); }
    Ok(Some(enc))
}

/// Parses a whole document into its root element.
pub fn parse_document(xml: &str) -> Result<XmlNode, IngestError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;
    loop {
        let position = reader.buffer_position() as u64;
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(e)) => {
                if stack.is_empty() && root.is_some() {
                    return Err(parse_failure("content after the root element", position));
                }
                stack.push(element(&e, position)?);
            }
            Ok(XmlEvent::Empty(e)) => {
                let node = element(&e, position)?;
                attach(&mut stack, &mut root, node, position)?;
            }
            Ok(XmlEvent::End(_)) => {
                let Some(node) = stack.pop() else {
                    return Err(parse_failure("unexpected closing tag", position));
                };
                attach(&mut stack, &mut root, node, position)?;
            }
            Ok(XmlEvent::Text(t)) => {
                let v = t.unescape().map_err(|err| parse_failure(err, position))?;
                match stack.last_mut() {
                    Some(cur) => cur.text.push_str(&v),
                    None if v.trim().is_empty() => {}
                    None => return Err(parse_failure("text outside the root element", position)),
                }
            }
            Ok(XmlEvent::CData(c)) => {
                if let Some(cur) = stack.last_mut() { cur.text.push_str(&String::from_utf8_lossy(&c)); }
            }
            Ok(XmlEvent::Eof) => break,
            Err(e) => return Err(parse_failure(e, reader.buffer_position() as u64)),
            _ => {}
        }
        buf.clear();
    }
    if let Some(open) = stack.last() {
        return Err(parse_failure(format!("unclosed element <{}>", open.name), reader.buffer_position() as u64));
    }
    root.ok_or_else(|| parse_failure("document has no root element", 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_tree_with_attrs() {
        let xml = "<?xml version=\"1.0\"?><incidencies><incidencia id=\"7\"><nom> Ana &amp; co </nom><aula/></incidencia></incidencies>";
        let root = parse_document(xml).unwrap();
        assert_eq!(root.name, "incidencies");
        let inc = root.child("incidencia").unwrap();
        assert_eq!(inc.attr("id"), Some("7"));
        assert_eq!(inc.child("nom").unwrap().text, "Ana & co");
        assert!(inc.child("aula").unwrap().text.is_empty());
        assert!(inc.child("equip").is_none());
    }

    #[test]
    fn local_names_and_prefixed_attrs() {
        let xml = "<ss:Workbook xmlns:ss=\"urn:schemas-microsoft-com:office:spreadsheet\"><ss:Row><ss:Cell ss:Index=\"3\"><ss:Data>x</ss:Data></ss:Cell></ss:Row></ss:Workbook>";
        let root = parse_document(xml).unwrap();
        assert_eq!(root.local_name(), "Workbook");
        let cell = root.descendants().find(|n| n.local_name() == "Cell").unwrap();
        assert_eq!(cell.attr("Index"), Some("3"));
        assert_eq!(cell.text_content(), "x");
    }

    #[test]
    fn descendants_are_in_document_order() {
        let root = parse_document("<a><b><c/></b><d/></a>").unwrap();
        let names: Vec<&str> = root.descendants().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "d"]);
    }

    #[test]
    fn cdata_counts_as_text() {
        let root = parse_document("<a><![CDATA[1 < 2]]></a>").unwrap();
        assert_eq!(root.text, "1 < 2");
    }

    #[test]
    fn text_content_can_skip_subtrees() {
        let root = parse_document("<Cell><Data>A12</Data><Comment><Data>check</Data></Comment></Cell>").unwrap();
        assert_eq!(root.text_content(), "A12check");
        assert_eq!(root.text_content_skipping("Comment"), "A12");
    }

    #[test]
    fn decodes_declared_latin1() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>Descripci\xF3</a>";
        let text = decode_document(bytes).unwrap();
        assert_eq!(parse_document(&text).unwrap().text, "Descripció");
    }

    #[test]
    fn decodes_utf8_and_strips_bom() {
        let text = decode_document("\u{feff}<a>Descripció</a>".as_bytes()).unwrap();
        assert_eq!(text, "<a>Descripció</a>");
        assert_eq!(decode_document(b"<a/>").unwrap(), "<a/>");
    }

    #[test]
    fn undecodable_input_is_parse_failure() {
        assert!(matches!(decode_document(b"<a>\xF3</a>").unwrap_err(), IngestError::Parse { .. }));
        let unknown = b"<?xml version=\"1.0\" encoding=\"x-klingon\"?><a/>";
        assert!(matches!(decode_document(unknown).unwrap_err(), IngestError::Parse { .. }));
    }

    #[test]
    fn malformed_documents_are_parse_failures() {
        for bad in ["<a><b></a>", "<a>", "", "   ", "<a/><b/>", "<a/>tail", "plain text"] {
            let err = parse_document(bad).unwrap_err();
            assert!(matches!(err, IngestError::Parse { .. }), "{bad:?} gave {err:?}");
        }
    }
}
