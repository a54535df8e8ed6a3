//! Domain models for parsed trees, parts, and `$ref` sites.

use serde_json::{Map, Value};

use crate::domain::pointer::JsonPath;

pub const REF_KEY: &str = "$ref";

/// Index of a part within its owning document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartId(pub(crate) usize);

impl PartId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Location of a node: the part it lives in and its path inside that part's tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Site {
    pub part: PartId,
    pub path: JsonPath,
}

impl Site {
    pub fn new(part: PartId, path: JsonPath) -> Self {
        Self { part, path }
    }
}

/// Shape of a tree node, with `$ref` objects as their own variant.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Ref(RefNode<'a>),
    Object(&'a Map<String, Value>),
    Array(&'a [Value]),
    Scalar(&'a Value),
}

impl<'a> Node<'a> {
    pub fn classify(value: &'a Value) -> Self {
        match value {
            Value::Object(object) => match object.get(REF_KEY) {
                Some(Value::String(target)) => Node::Ref(RefNode {
                    target: target.as_str(),
                    object,
                }),
                _ => Node::Object(object),
            },
            Value::Array(items) => Node::Array(items),
            scalar => Node::Scalar(scalar),
        }
    }

    pub fn as_ref_node(&self) -> Option<&RefNode<'a>> {
        match self {
            Node::Ref(node) => Some(node),
            _ => None,
        }
    }
}

/// A `$ref` object: its raw target and the object carrying it.
#[derive(Debug, Clone, Copy)]
pub struct RefNode<'a> {
    pub target: &'a str,
    pub object: &'a Map<String, Value>,
}

impl<'a> RefNode<'a> {
    /// An extended ref carries sibling fields next to `$ref`.
    pub fn is_extended(&self) -> bool {
        self.object.len() > 1
    }

    pub fn siblings(&self) -> impl Iterator<Item = (&'a String, &'a Value)> + 'a {
        self.object.iter().filter(|(key, _)| key.as_str() != REF_KEY)
    }
}

/// Look up a direct child: an object field, or an array element by decimal index.
pub fn child<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(object) => object.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    }
}

/// Walk `path` from `value`, returning the node it addresses.
pub fn node_at<'a>(value: &'a Value, path: &JsonPath) -> Option<&'a Value> {
    path.iter().try_fold(value, |node, key| child(node, key))
}

/// Merge an extended ref's sibling fields over the object it resolves to.
///
/// Sibling fields win; fields only present in `value` are appended after them. Non-object
/// values cannot absorb siblings and are returned unchanged.
pub fn merge_extended(reference: &RefNode<'_>, value: Value) -> Value {
    let fields = match value {
        Value::Object(fields) => fields,
        other => {
            tracing::warn!(
                target_ref = reference.target,
                "extended $ref resolves to a non-object value, sibling fields dropped"
            );
            return other;
        }
    };

    let mut merged: Map<String, Value> = reference
        .siblings()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    for (key, value) in fields {
        merged.entry(key).or_insert(value);
    }
    Value::Object(merged)
}
