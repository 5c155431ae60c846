//! Tag-name search over labeled document trees.
//!
//! Harvest parsers locate metadata fragments with [`find_all_by_tag_name`]
//! regardless of how deeply a source nests them. Any tree exposing a tag name
//! and ordered children can be searched by implementing [`TreeNode`].

use serde::Serialize;
use serde_json::Value;

/// A labeled node with ordered children.
pub trait TreeNode {
    type Children<'a>: Iterator<Item = &'a Self>
    where
        Self: 'a;

    fn tag_name(&self) -> &str;

    /// Child nodes in document order.
    fn children(&self) -> Self::Children<'_>;
}

/// Returns every node in `root`'s subtree whose tag equals `tag_name`,
/// in document (preorder, depth-first) order. `root` itself is included
/// when it matches.
pub fn find_all_by_tag_name<'a, N: TreeNode>(root: &'a N, tag_name: &str) -> Vec<&'a N> {
    let mut found = Vec::new();
    collect_matches(root, tag_name, &mut found);
    found
}

fn collect_matches<'a, N: TreeNode>(node: &'a N, tag_name: &str, found: &mut Vec<&'a N>) {
    if node.tag_name() == tag_name {
        found.push(node);
    }
    for child in node.children() {
        collect_matches(child, tag_name, found);
    }
}

/// First match in document order, stopping as soon as one is found.
pub fn find_first_by_tag_name<'a, N: TreeNode>(root: &'a N, tag_name: &str) -> Option<&'a N> {
    if root.tag_name() == tag_name {
        return Some(root);
    }
    root.children()
        .find_map(|child| find_first_by_tag_name(child, tag_name))
}

/// Owned document element produced by the harvest parsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Element {
    tag: String,
    text: Option<String>,
    children: Vec<Element>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(child);
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// First direct child with the given tag.
    pub fn child(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Text of the first direct child with the given tag.
    pub fn child_text(&self, tag: &str) -> Option<&str> {
        self.child(tag).and_then(Element::text)
    }

    /// Texts of every direct child with the given tag, in order.
    pub fn child_texts(&self, tag: &str) -> Vec<&str> {
        self.children
            .iter()
            .filter(|c| c.tag == tag)
            .filter_map(Element::text)
            .collect()
    }

    /// Builds an element tree from a JSON value.
    ///
    /// Object members become children tagged with their key, and array members
    /// become repeated siblings sharing the enclosing tag, the same shape a
    /// repeated XML element has. Scalars become element text; `null` has none.
    /// Object members keep the order they have in the source document.
    pub fn from_json(tag: impl Into<String>, value: &Value) -> Self {
        let mut element = Element::new(tag);
        match value {
            Value::Object(members) => {
                for (key, member) in members {
                    append_json(&mut element, key, member);
                }
            }
            Value::Array(items) => {
                let tag = element.tag.clone();
                for item in items {
                    element.push_child(Element::from_json(tag.as_str(), item));
                }
            }
            Value::String(s) => element.text = Some(s.clone()),
            Value::Number(n) => element.text = Some(n.to_string()),
            Value::Bool(b) => element.text = Some(b.to_string()),
            Value::Null => {}
        }
        element
    }
}

fn append_json(parent: &mut Element, key: &str, value: &Value) {
    match value {
        Value::Array(items) => {
            for item in items {
                parent.push_child(Element::from_json(key, item));
            }
        }
        other => parent.push_child(Element::from_json(key, other)),
    }
}

impl TreeNode for Element {
    type Children<'a> = std::slice::Iter<'a, Element>;

    fn tag_name(&self) -> &str {
        &self.tag
    }

    fn children(&self) -> Self::Children<'_> {
        self.children.iter()
    }
}
