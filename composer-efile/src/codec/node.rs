//! Canonical record tree

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered key → node mapping. Key order is first-occurrence document order.
pub type Entries = IndexMap<String, Node>;

/// Output of [`convert`](super::convert): the root element's entries
/// (`"Return@returnVersion"`, `"Return"`).
pub type CanonicalRecord = Entries;

/// One value in a canonical record
///
/// Serialized untagged, so a record maps directly onto plain JSON:
/// `null`, a string, an array, or an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Null,
    Text(String),
    Array(Vec<Node>),
    Object(Entries),
}

impl Node {
    pub fn text(value: impl Into<String>) -> Self {
        Node::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Node::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Entries> {
        match self {
            Node::Object(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Node]> {
        match self {
            Node::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Walk a path of object keys
    pub fn pointer<'a>(&'a self, path: &[&str]) -> Option<&'a Node> {
        path.iter().try_fold(self, |node, key| node.as_object()?.get(*key))
    }
}
