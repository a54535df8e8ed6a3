//! Bundling: rewrite the root document so every `$ref` is local, copying external values in.

use std::collections::HashMap;

use serde_json::{Map, Value};
use url::Url;

use crate::app::components::{ComponentBags, component_name};
use crate::app::crawler::{CrawlOutcome, crawl};
use crate::app::document::{Document, DocumentLoadError};
use crate::app::inventory::{Entry, Inventory};
use crate::app::mapping::{Location, Mapping};
use crate::domain::errors::BundlingError;
use crate::domain::model::{Node, PartId, REF_KEY, Site, merge_extended, node_at};
use crate::domain::pointer::{JsonPath, JsonPointer};
use crate::infra::config::Config;
use crate::infra::parser::Parser;
use crate::infra::serializer::{EncodeError, Serializer};
use crate::infra::workspace::{ContentKind, Workspace};

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error(transparent)]
    Load(#[from] DocumentLoadError),
    #[error(transparent)]
    Bundling(#[from] BundlingError),
    #[error("output location '{pointer}' already holds a value")]
    Conflict { pointer: JsonPointer },
    #[error("value for '{pointer}' would have to be placed inside itself")]
    Placement { pointer: JsonPointer },
}

/// A self-contained document plus the provenance of every copied value.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub tree: Value,
    pub mapping: Mapping,
    /// Content kind of the root document.
    pub kind: ContentKind,
}

impl Bundle {
    pub fn encode(&self, serializer: &Serializer) -> Result<String, EncodeError> {
        serializer.encode(&self.tree, self.kind)
    }
}

/// Bundle the document rooted at `root` into a single tree.
///
/// Every reachable reference is resolved first; if any of them fails, all failures are
/// returned together and nothing is rewritten.
pub fn bundle(
    workspace: &dyn Workspace,
    root: &Url,
    config: &Config,
) -> Result<Bundle, BundleError> {
    let parser = Parser::new(config.parser.options());
    let mut document = Document::open(workspace, parser, root)?;

    let CrawlOutcome {
        mut inventory,
        failures,
    } = crawl(&mut document);
    if !failures.is_empty() {
        tracing::debug!(root = %root, failures = failures.len(), "bundling aborted");
        return Err(BundlingError {
            root: document.root().location.clone(),
            failures,
        }
        .into());
    }
    inventory.sort();

    let bags = config.placement.component_bags();
    let (tree, mapping) = Remapper::new(&document, &inventory, &bags).run()?;

    tracing::info!(
        root = %root,
        parts = document.len(),
        refs = inventory.len(),
        "bundled document"
    );
    Ok(Bundle {
        tree,
        mapping,
        kind: document.root().kind,
    })
}

/// Output location chosen for one inventory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    /// Resolved into the root document; point at the resolved path.
    Local(JsonPath),
    /// Reuse the copy placed for another entry, descending by `tail`.
    Alias { entry: usize, tail: Vec<String> },
    /// Copy into a component bag under a synthesized name.
    Placed(JsonPath),
    /// Copy over the ref site itself.
    Inline,
    /// Circular with nothing to alias: point at the ref's own output location.
    OwnSite,
}

struct Remapper<'d, 'w> {
    document: &'d Document<'w>,
    inventory: &'d Inventory,
    entries: &'d [Entry],
    bags: &'d ComponentBags,
    targets: Vec<Target>,
    paths: Vec<Option<JsonPath>>,
    in_progress: Vec<bool>,
    materializing: Vec<usize>,
}

impl<'d, 'w> Remapper<'d, 'w> {
    fn new(document: &'d Document<'w>, inventory: &'d Inventory, bags: &'d ComponentBags) -> Self {
        let entries = inventory.entries();
        Self {
            document,
            inventory,
            entries,
            bags,
            targets: vec![Target::OwnSite; entries.len()],
            paths: vec![None; entries.len()],
            in_progress: vec![false; entries.len()],
            materializing: Vec::new(),
        }
    }

    fn run(mut self) -> Result<(Value, Mapping), BundleError> {
        self.plan();

        let root = self.document.root_id();
        let mut tree = self.materialize(root, &JsonPath::root())?;
        let mut mapping = Mapping::new();

        let entries = self.entries;
        for (index, entry) in entries.iter().enumerate() {
            let copied = match self.targets[index].clone() {
                Target::Placed(destination) => {
                    let value = self.copy_target(index)?;
                    write(&mut tree, &destination, value)?;
                    true
                }
                Target::Inline => true,
                _ => false,
            };
            if copied {
                let path = self.target_path(index)?;
                mapping.insert(
                    &path,
                    Location {
                        file: self.document.filename(entry.part),
                        pointer: entry.pointer.to_string(),
                    },
                );
            }
        }
        Ok((tree, mapping))
    }

    /// Decide a target for every entry, walking them in canonical order.
    fn plan(&mut self) {
        let entries = self.entries;
        let mut placed: HashMap<PartId, Vec<usize>> = HashMap::new();

        for (index, entry) in entries.iter().enumerate() {
            if entry.circular {
                continue;
            }
            let target = if !entry.external {
                Target::Local(entry.path.clone())
            } else if let Some((alias, tail)) = self.nearest_placed(entry, &placed) {
                Target::Alias { entry: alias, tail }
            } else {
                // Extended entries are placed too; later refs share the merged copy.
                let target = match self.bags.locate(&entry.path) {
                    Some(found) => {
                        let filename = self.document.filename(entry.part);
                        let name = component_name(&filename, &found.component);
                        Target::Placed(
                            found
                                .bag
                                .with_key(name)
                                .with_keys(found.rest.iter().cloned()),
                        )
                    }
                    None => Target::Inline,
                };
                placed.entry(entry.part).or_default().push(index);
                target
            };
            self.targets[index] = target;
        }

        for (index, entry) in entries.iter().enumerate() {
            if !entry.circular {
                continue;
            }
            self.targets[index] = if !entry.external {
                Target::Local(entry.path.clone())
            } else if let Some((alias, tail)) = self.nearest_placed(entry, &placed) {
                Target::Alias { entry: alias, tail }
            } else {
                Target::OwnSite
            };
        }
    }

    /// The placed entry in the same part whose path is the longest prefix of `entry`'s.
    fn nearest_placed(
        &self,
        entry: &Entry,
        placed: &HashMap<PartId, Vec<usize>>,
    ) -> Option<(usize, Vec<String>)> {
        placed
            .get(&entry.part)?
            .iter()
            .filter_map(|&candidate| {
                entry
                    .path
                    .tail_after(&self.entries[candidate].path)
                    .map(|tail| (candidate, tail))
            })
            .min_by_key(|(_, tail)| tail.len())
            .map(|(candidate, tail)| (candidate, tail.to_vec()))
    }

    /// Output path the rewritten `$ref` of entry `index` points at.
    fn target_path(&mut self, index: usize) -> Result<JsonPath, BundleError> {
        if let Some(path) = &self.paths[index] {
            return Ok(path.clone());
        }
        if self.in_progress[index] {
            return Err(self.placement_error(index));
        }
        self.in_progress[index] = true;

        let path = match self.targets[index].clone() {
            Target::Local(path) | Target::Placed(path) => path,
            Target::Alias { entry, tail } => self.target_path(entry)?.with_keys(tail),
            Target::Inline | Target::OwnSite => self.site_path(index)?,
        };

        self.in_progress[index] = false;
        self.paths[index] = Some(path.clone());
        Ok(path)
    }

    /// Output path of the ref object of entry `index`.
    fn site_path(&mut self, index: usize) -> Result<JsonPath, BundleError> {
        let entries = self.entries;
        let entry = &entries[index];
        if self.document.is_root(entry.site.part) {
            return Ok(entry.site.path.clone());
        }
        // Sites outside the root part sit below the copy made for the ref that led there.
        let via = entry
            .via
            .as_ref()
            .and_then(|site| self.inventory.position(site))
            .ok_or_else(|| self.placement_error(index))?;
        let tail = entry
            .site
            .path
            .tail_after(&entries[via].path)
            .ok_or_else(|| self.placement_error(index))?;
        Ok(self.target_path(via)?.with_keys(tail.iter().cloned()))
    }

    fn placement_error(&self, index: usize) -> BundleError {
        BundleError::Placement {
            pointer: self.entries[index].site.path.to_pointer(),
        }
    }

    /// Output copy of the node at `path` in `part`, with every ref site rewritten.
    fn materialize(&mut self, part: PartId, path: &JsonPath) -> Result<Value, BundleError> {
        let tree = self.document.part(part).tree_handle();
        let node = node_at(&tree, path).ok_or_else(|| BundleError::Placement {
            pointer: path.to_pointer(),
        })?;
        self.copy(part, node, path.clone())
    }

    fn copy(&mut self, part: PartId, node: &Value, path: JsonPath) -> Result<Value, BundleError> {
        let site = Site::new(part, path);
        if let Some(index) = self.inventory.position(&site) {
            return self.rewrite(index, node);
        }
        let Site { path, .. } = site;

        match node {
            Value::Object(object) => {
                let mut out = Map::with_capacity(object.len());
                for (key, value) in object {
                    let copied = self.copy(part, value, path.with_key(key.as_str()))?;
                    out.insert(key.clone(), copied);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, value)| self.copy(part, value, path.with_key(index.to_string())))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            scalar => Ok(scalar.clone()),
        }
    }

    /// Copy of the value entry `index` resolves to, with an extended ref's siblings merged in.
    fn copy_target(&mut self, index: usize) -> Result<Value, BundleError> {
        let entries = self.entries;
        let entry = &entries[index];
        if self.materializing.contains(&index) {
            return Err(self.placement_error(index));
        }
        self.materializing.push(index);
        let value = self.materialize(entry.part, &entry.path);
        self.materializing.pop();
        let value = value?;
        if !entry.extended {
            return Ok(value);
        }

        let site_tree = self.document.part(entry.site.part).tree_handle();
        Ok(match node_at(&site_tree, &entry.site.path).map(Node::classify) {
            Some(Node::Ref(reference)) => merge_extended(&reference, value),
            _ => value,
        })
    }

    fn rewrite(&mut self, index: usize, node: &Value) -> Result<Value, BundleError> {
        if self.targets[index] == Target::Inline {
            return self.copy_target(index);
        }
        // Siblings of a placed ref already live in the placed copy.
        let mut object = if matches!(self.targets[index], Target::Placed(_)) {
            Map::new()
        } else {
            node.as_object().cloned().unwrap_or_default()
        };
        let pointer = self.target_path(index)?.to_pointer();
        object.insert(REF_KEY.to_owned(), Value::String(pointer.to_local_ref()));
        Ok(Value::Object(object))
    }
}

/// Write `value` at `path`, creating intermediate objects. Occupied slots are a conflict.
fn write(tree: &mut Value, path: &JsonPath, value: Value) -> Result<(), BundleError> {
    let conflict = || BundleError::Conflict {
        pointer: path.to_pointer(),
    };
    let Some((last, parents)) = path.split_last() else {
        return Err(conflict());
    };

    let mut current = tree;
    for key in parents {
        let object = current.as_object_mut().ok_or_else(conflict)?;
        current = object
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    let object = current.as_object_mut().ok_or_else(conflict)?;
    if object.contains_key(last) {
        return Err(conflict());
    }
    object.insert(last.clone(), value);
    Ok(())
}
