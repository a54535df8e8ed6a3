//! Document graph: the root part plus every file part reachable from it.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use url::Url;

use crate::domain::model::PartId;
use crate::infra::parser::Parser;
use crate::infra::workspace::{ContentKind, Workspace};

/// Failure to fetch or decode one file of the document graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to load {uri}: {reason}")]
pub struct DocumentLoadError {
    pub uri: Url,
    pub reason: String,
}

impl DocumentLoadError {
    fn new(uri: &Url, reason: impl ToString) -> Self {
        Self {
            uri: uri.clone(),
            reason: reason.to_string(),
        }
    }
}

/// One parsed file: its location (without fragment) and its immutable tree.
#[derive(Debug, Clone)]
pub struct Part {
    pub id: PartId,
    pub location: Url,
    pub kind: ContentKind,
    tree: Arc<Value>,
}

impl Part {
    pub fn tree(&self) -> &Value {
        &self.tree
    }

    /// Shared handle to the tree, independent of the document borrow.
    pub fn tree_handle(&self) -> Arc<Value> {
        Arc::clone(&self.tree)
    }
}

/// Registry of parts keyed by normalized URI. Parts are only ever appended.
pub struct Document<'w> {
    workspace: &'w dyn Workspace,
    parser: Parser,
    base: Url,
    parts: Vec<Part>,
    index: HashMap<Url, PartId>,
    failed: HashMap<Url, DocumentLoadError>,
}

impl<'w> Document<'w> {
    /// Load the root file and start a new graph around it.
    pub fn open(
        workspace: &'w dyn Workspace,
        parser: Parser,
        root: &Url,
    ) -> Result<Self, DocumentLoadError> {
        let location = part_uri(root);
        // Directory of the root file; relative filenames are measured from here.
        let base = location
            .join(".")
            .map_err(|err| DocumentLoadError::new(&location, err))?;
        let mut document = Self {
            workspace,
            parser,
            base,
            parts: Vec::new(),
            index: HashMap::new(),
            failed: HashMap::new(),
        };
        document.create_or_get_part(&location)?;
        Ok(document)
    }

    pub fn root(&self) -> &Part {
        &self.parts[0]
    }

    pub fn root_id(&self) -> PartId {
        PartId(0)
    }

    pub fn part(&self, id: PartId) -> &Part {
        &self.parts[id.0]
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Cached part for `uri` (fragment ignored), loading and decoding it on first use.
    pub fn create_or_get_part(&mut self, uri: &Url) -> Result<PartId, DocumentLoadError> {
        let location = part_uri(uri);
        if let Some(id) = self.index.get(&location) {
            return Ok(*id);
        }
        if let Some(err) = self.failed.get(&location) {
            return Err(err.clone());
        }

        match self.load(&location) {
            Ok((tree, kind)) => {
                let id = PartId(self.parts.len());
                tracing::debug!(uri = %location, part = id.0, "loaded document part");
                self.parts.push(Part {
                    id,
                    location: location.clone(),
                    kind,
                    tree: Arc::new(tree),
                });
                self.index.insert(location, id);
                Ok(id)
            }
            Err(err) => {
                tracing::debug!(uri = %location, error = %err, "failed to load document part");
                self.failed.insert(location, err.clone());
                Err(err)
            }
        }
    }

    fn load(&self, location: &Url) -> Result<(Value, ContentKind), DocumentLoadError> {
        let exists = self
            .workspace
            .exists(location)
            .map_err(|err| DocumentLoadError::new(location, err))?;
        if !exists {
            return Err(DocumentLoadError::new(location, "file not found"));
        }
        let content = self
            .workspace
            .read(location)
            .map_err(|err| DocumentLoadError::new(location, err))?;
        let tree = self
            .parser
            .decode(&content)
            .map_err(|err| DocumentLoadError::new(location, err))?;
        Ok((tree, content.kind))
    }

    /// Resolve a possibly relative, possibly fragmented reference against a part's location.
    pub fn resolve(&self, part: PartId, reference: &str) -> Result<Url, url::ParseError> {
        self.part(part).location.join(reference)
    }

    /// Whether `part` is the root document's own file.
    pub fn is_root(&self, part: PartId) -> bool {
        part == self.root_id()
    }

    /// Location of `part` relative to the root document's directory, e.g. `schemas/pet.yaml`.
    pub fn filename(&self, part: PartId) -> String {
        let location = &self.part(part).location;
        self.base
            .make_relative(location)
            .unwrap_or_else(|| location.to_string())
    }
}

/// File identity of a reference URI: the URI with its fragment stripped.
pub fn part_uri(uri: &Url) -> Url {
    let mut location = uri.clone();
    location.set_fragment(None);
    location
}
