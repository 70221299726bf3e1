use crate::xml_tree::XmlNode;

/// Trimmed text of a field node, or empty when the node is absent or blank.
pub fn extract(node: Option<&XmlNode>) -> String {
    node.map(|n| n.text.trim().to_string()).unwrap_or_default()
}

/// Named child of a record-like node, via `extract`.
pub fn extract_child(parent: &XmlNode, field: &str) -> String {
    extract(parent.child(field))
}
