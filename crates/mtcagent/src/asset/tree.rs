// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Asset XML tree.
//!
//! Asset bodies are held as a tagged-variant tree (element | text) with
//! child lists and no upward references. Parsing goes through `roxmltree`;
//! serialization walks the tree back out with escaping. Updates are
//! depth-first by element name, first match wins.

use std::fmt::Write as _;

use crate::error::{Error, Result};

/// One tree node: an element or a text run.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An element with attributes and ordered children.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    /// Parse an XML document or fragment into a tree.
    pub fn parse(xml: &str) -> Result<XmlElement> {
        let doc = roxmltree::Document::parse(xml).map_err(|e| Error::Xml(e.to_string()))?;
        Ok(convert(doc.root_element()))
    }

    /// Concatenated text content of direct text children.
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// First element with the given name, depth-first, self excluded.
    #[must_use]
    pub fn find_first(&self, name: &str) -> Option<&XmlElement> {
        for child in &self.children {
            if let XmlNode::Element(el) = child {
                if el.name == name {
                    return Some(el);
                }
                if let Some(found) = el.find_first(name) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Replace the text content of the first element with the given name,
    /// depth-first. A comma-separated value expands the matched element into
    /// repeated siblings of the same tag, one per value, order preserved
    /// (multi-status fields such as `CutterStatus`).
    ///
    /// Returns false when no element matched.
    pub fn update_text_first(&mut self, name: &str, value: &str) -> bool {
        for idx in 0..self.children.len() {
            let XmlNode::Element(ref el) = self.children[idx] else {
                continue;
            };
            if el.name == name {
                if value.contains(',') {
                    let template = match &self.children[idx] {
                        XmlNode::Element(el) => el.clone(),
                        XmlNode::Text(_) => unreachable!("matched an element above"),
                    };
                    let replacements: Vec<XmlNode> = value
                        .split(',')
                        .map(|part| {
                            let mut copy = template.clone();
                            copy.children = vec![XmlNode::Text(part.to_string())];
                            XmlNode::Element(copy)
                        })
                        .collect();
                    self.children.splice(idx..=idx, replacements);
                } else if let XmlNode::Element(ref mut el) = self.children[idx] {
                    el.children = vec![XmlNode::Text(value.to_string())];
                }
                return true;
            }
            if let XmlNode::Element(ref mut el) = self.children[idx] {
                if el.update_text_first(name, value) {
                    return true;
                }
            }
        }
        false
    }

    /// Replace the first element matching `fragment.name`, depth-first, with
    /// the fragment. Returns false when no element matched.
    pub fn replace_element_first(&mut self, fragment: &XmlElement) -> bool {
        for child in &mut self.children {
            let XmlNode::Element(el) = child else {
                continue;
            };
            if el.name == fragment.name {
                *el = fragment.clone();
                return true;
            }
            if el.replace_element_first(fragment) {
                return true;
            }
        }
        false
    }

    /// Serialize back to XML text.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_into(&mut out);
        out
    }

    fn write_into(&self, out: &mut String) {
        let _ = write!(out, "<{}", self.name);
        for (key, value) in &self.attributes {
            let _ = write!(out, " {}=\"{}\"", key, escape_attr(value));
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                XmlNode::Element(el) => el.write_into(out),
                XmlNode::Text(t) => out.push_str(&escape_text(t)),
            }
        }
        let _ = write!(out, "</{}>", self.name);
    }
}

fn convert(node: roxmltree::Node<'_, '_>) -> XmlElement {
    let mut children = Vec::new();
    for child in node.children() {
        if child.is_element() {
            children.push(XmlNode::Element(convert(child)));
        } else if child.is_text() {
            let text = child.text().unwrap_or("");
            // Pretty-print whitespace between elements is not content.
            if !text.trim().is_empty() {
                children.push(XmlNode::Text(text.trim().to_string()));
            }
        }
    }
    XmlElement {
        name: node.tag_name().name().to_string(),
        attributes: node
            .attributes()
            .map(|a| (a.name().to_string(), a.value().to_string()))
            .collect(),
        children,
    }
}

/// Escape text content.
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape attribute values.
pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const TOOL: &str = r#"<CuttingTool serialNumber="1" toolId="KSSP300R4SD43L240">
        <CuttingToolLifeCycle>
            <ToolLife type="MINUTES">240</ToolLife>
            <CutterStatus><Status>NEW</Status></CutterStatus>
            <Measurements>
                <CuttingDiameterMax code="DC">25</CuttingDiameterMax>
            </Measurements>
        </CuttingToolLifeCycle>
    </CuttingTool>"#;

    #[test]
    fn parse_keeps_structure() {
        let tree = XmlElement::parse(TOOL).expect("tool parses");
        assert_eq!(tree.name, "CuttingTool");
        assert_eq!(tree.attributes.len(), 2);
        let life = tree.find_first("ToolLife").expect("ToolLife present");
        assert_eq!(life.text(), "240");
        assert_eq!(life.attributes, vec![("type".to_string(), "MINUTES".to_string())]);
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(XmlElement::parse("<open").is_err());
    }

    #[test]
    fn update_text_first_match_wins() {
        let mut tree = XmlElement::parse(TOOL).expect("tool parses");
        assert!(tree.update_text_first("ToolLife", "120"));
        assert_eq!(
            tree.find_first("ToolLife").expect("present").text(),
            "120"
        );
        // Attributes survive a text update.
        assert_eq!(
            tree.find_first("ToolLife").expect("present").attributes[0].1,
            "MINUTES"
        );
    }

    #[test]
    fn update_unknown_element_returns_false() {
        let mut tree = XmlElement::parse(TOOL).expect("tool parses");
        assert!(!tree.update_text_first("NoSuch", "1"));
    }

    #[test]
    fn comma_value_expands_to_repeated_elements() {
        let mut tree = XmlElement::parse(TOOL).expect("tool parses");
        assert!(tree.update_text_first("CutterStatus", "USED,AVAILABLE"));

        let cycle = tree
            .find_first("CuttingToolLifeCycle")
            .expect("cycle present");
        let statuses: Vec<&XmlElement> = cycle
            .children
            .iter()
            .filter_map(|c| match c {
                XmlNode::Element(el) if el.name == "CutterStatus" => Some(el),
                _ => None,
            })
            .collect();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].text(), "USED");
        assert_eq!(statuses[1].text(), "AVAILABLE");
    }

    #[test]
    fn replace_element_swaps_subtree() {
        let mut tree = XmlElement::parse(TOOL).expect("tool parses");
        let fragment =
            XmlElement::parse(r#"<ToolLife type="PART_COUNT">15</ToolLife>"#).expect("parses");
        assert!(tree.replace_element_first(&fragment));

        let life = tree.find_first("ToolLife").expect("present");
        assert_eq!(life.text(), "15");
        assert_eq!(life.attributes[0].1, "PART_COUNT");
    }

    #[test]
    fn serialize_round_trips() {
        let tree = XmlElement::parse(TOOL).expect("tool parses");
        let xml = tree.to_xml();
        let again = XmlElement::parse(&xml).expect("serialized form parses");
        assert_eq!(tree, again);
    }

    #[test]
    fn serialize_escapes_content() {
        let el = XmlElement {
            name: "Message".to_string(),
            attributes: vec![("note".to_string(), "a\"b&c".to_string())],
            children: vec![XmlNode::Text("1 < 2 & 3".to_string())],
        };
        let xml = el.to_xml();
        assert_eq!(
            xml,
            r#"<Message note="a&quot;b&amp;c">1 &lt; 2 &amp; 3</Message>"#
        );
    }
}
