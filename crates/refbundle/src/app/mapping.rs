//! Provenance of bundled values: output location back to source file and pointer.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::pointer::{JsonPath, JsonPointer};

/// Original source of a bundled value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    /// Source file, relative to the root document's directory.
    pub file: String,
    /// Pointer inside `file`.
    pub pointer: String,
}

/// Tree mirroring the bundled output, carrying a [`Location`] wherever a copied value starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Mapping {
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<Location>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    children: BTreeMap<String, Mapping>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }

    /// Record that the value at `path` in the output was copied from `location`.
    pub fn insert(&mut self, path: &JsonPath, location: Location) {
        let node = path.iter().fold(self, |node, key| {
            node.children.entry(key.clone()).or_default()
        });
        node.value = Some(location);
    }

    /// Origin of the output node at `pointer`.
    ///
    /// Uses the deepest recorded ancestor and appends the unmatched suffix to its pointer.
    /// Returns `None` for invalid pointers and for locations native to the root document.
    pub fn find(&self, pointer: &str) -> Option<Location> {
        let path = JsonPointer::parse(pointer).ok()?.to_path();

        let mut current = self;
        let mut best: Option<(&Location, usize)> = current.value.as_ref().map(|loc| (loc, 0));
        for (depth, key) in path.iter().enumerate() {
            let Some(next) = current.children.get(key) else {
                break;
            };
            current = next;
            if let Some(location) = &current.value {
                best = Some((location, depth + 1));
            }
        }

        let (location, matched) = best?;
        if matched == path.len() {
            return Some(location.clone());
        }
        let remaining: JsonPath = path[matched..].iter().cloned().collect();
        Some(Location {
            file: location.file.clone(),
            pointer: format!("{}{}", location.pointer, remaining.to_pointer()),
        })
    }
}
