//! Element tree → canonical record
//!
//! Pure recursive builder: each element yields the entries it contributes to
//! its parent, never mutating a shared structure.
//!
//! Rules:
//! - no attributes, children or text → `null`
//! - text only → trimmed text
//! - attribute `a` on element `T` → sibling entry `"T@a"`, emitted before `T`
//! - child tag seen once → child's entries merged into the parent
//! - child tag seen more than once → `tag: [value, value, ...]`, with the
//!   repeated child's attributes keyed `"@a"` inside its own object
//! - text together with child elements → [`CodecError::MixedContent`]

use super::node::{Entries, Node};
use super::tree::Element;
use super::CodecError;
use std::collections::HashMap;

/// How an element's attributes are keyed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// Attributes become `"T@a"` siblings of the element's own entry
    Flattened,
    /// Element is an array item; attributes become `"@a"` inside its object
    ArrayItem,
}

/// Fold a root element into the entries of a canonical record
pub fn fold_root(root: &Element) -> Result<Entries, CodecError> {
    let mut entries = Entries::new();
    for (key, node) in fold_flattened(root)? {
        entries.insert(key, node);
    }
    Ok(entries)
}

/// Entries an element contributes to its parent when its tag occurs once
fn fold_flattened(element: &Element) -> Result<Vec<(String, Node)>, CodecError> {
    let mut emitted: Vec<(String, Node)> = element
        .attributes
        .iter()
        .map(|(name, value)| (format!("{}@{}", element.tag, name), Node::text(value.as_str())))
        .collect();
    let value = fold_value(element, Placement::Flattened)?;
    emitted.push((element.tag.clone(), value));
    Ok(emitted)
}

fn fold_value(element: &Element, placement: Placement) -> Result<Node, CodecError> {
    let text = element.text.trim();
    if !text.is_empty() && !element.children.is_empty() {
        return Err(CodecError::MixedContent {
            tag: element.tag.clone(),
        });
    }

    let mut body = Entries::new();

    if placement == Placement::ArrayItem {
        for (name, value) in &element.attributes {
            body.insert(format!("@{}", name), Node::text(value.as_str()));
        }
    }

    let mut occurrences: HashMap<&str, usize> = HashMap::new();
    for child in &element.children {
        *occurrences.entry(child.tag.as_str()).or_insert(0) += 1;
    }

    for child in &element.children {
        if occurrences[child.tag.as_str()] == 1 {
            for (key, node) in fold_flattened(child)? {
                body.insert(key, node);
            }
        } else {
            let item = fold_value(child, Placement::ArrayItem)?;
            let slot = body
                .entry(child.tag.clone())
                .or_insert_with(|| Node::Array(Vec::new()));
            if let Node::Array(items) = slot {
                items.push(item);
            } else {
                *slot = Node::Array(vec![item]);
            }
        }
    }

    // Text replaces the body outright; for an array item this drops its "@a" entries.
    if !text.is_empty() {
        return Ok(Node::text(text));
    }

    if body.is_empty() {
        Ok(Node::Null)
    } else {
        Ok(Node::Object(body))
    }
}
