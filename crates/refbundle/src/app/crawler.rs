//! Depth-first crawl of the document graph, collecting every `$ref` site.

use std::collections::HashSet;

use serde_json::Value;
use url::Url;

use crate::app::document::Document;
use crate::app::inventory::{Entry, Inventory};
use crate::app::resolver::{RefIdentity, Resolver};
use crate::domain::errors::Failure;
use crate::domain::model::{Node, PartId, RefNode, Site, node_at};
use crate::domain::pointer::{JsonPath, JsonPointer};

/// Result of a full crawl: resolved sites plus every failure, in discovery order.
#[derive(Debug, Default)]
pub struct CrawlOutcome {
    pub inventory: Inventory,
    pub failures: Vec<Failure>,
}

/// Crawl the root part and, transitively, every non-circular resolved target.
///
/// Failures never stop the crawl; the subtree behind a failed ref is simply not expanded.
pub fn crawl(document: &mut Document<'_>) -> CrawlOutcome {
    let root = document.root_id();
    let mut crawler = Crawler {
        document,
        outcome: CrawlOutcome::default(),
        visited: HashSet::new(),
        reported: HashSet::new(),
    };
    crawler.visit(root, JsonPath::root(), JsonPath::root(), None);

    let outcome = crawler.outcome;
    tracing::debug!(
        refs = outcome.inventory.len(),
        failures = outcome.failures.len(),
        "crawl finished"
    );
    outcome
}

struct Crawler<'a, 'w> {
    document: &'a mut Document<'w>,
    outcome: CrawlOutcome,
    /// Targets already expanded once during this crawl.
    visited: HashSet<RefIdentity>,
    /// Failing `$ref` fields already reported, by file and pointer.
    reported: HashSet<(Url, JsonPointer)>,
}

impl Crawler<'_, '_> {
    fn visit(&mut self, part: PartId, path: JsonPath, from_root: JsonPath, via: Option<&Site>) {
        let tree = self.document.part(part).tree_handle();
        if let Some(node) = node_at(&tree, &path) {
            self.walk(part, node, path, from_root, via);
        }
    }

    fn walk(
        &mut self,
        part: PartId,
        node: &Value,
        path: JsonPath,
        from_root: JsonPath,
        via: Option<&Site>,
    ) {
        match Node::classify(node) {
            Node::Ref(reference) => {
                self.reference(reference, Site::new(part, path), from_root, via);
            }
            Node::Object(object) => {
                for (key, value) in object {
                    self.walk(
                        part,
                        value,
                        path.with_key(key.as_str()),
                        from_root.with_key(key.as_str()),
                        via,
                    );
                }
            }
            Node::Array(items) => {
                for (index, value) in items.iter().enumerate() {
                    let key = index.to_string();
                    self.walk(
                        part,
                        value,
                        path.with_key(key.as_str()),
                        from_root.with_key(key),
                        via,
                    );
                }
            }
            Node::Scalar(_) => {}
        }
    }

    fn reference(
        &mut self,
        reference: RefNode<'_>,
        site: Site,
        from_root: JsonPath,
        via: Option<&Site>,
    ) {
        tracing::trace!(
            part = site.part.index(),
            pointer = %site.path.to_pointer(),
            target_ref = reference.target,
            "crawling reference"
        );
        let result = Resolver::new(&mut *self.document).resolve(&site, reference.target);
        let resolved = match result {
            Ok(resolved) => resolved,
            Err(failure) => {
                self.record_failure(failure);
                return;
            }
        };

        let identity = resolved.identity(self.document);
        self.outcome.inventory.add(Entry {
            site: site.clone(),
            via: via.cloned(),
            depth: from_root.len(),
            path_from_root: from_root.clone(),
            file: identity.file.clone(),
            part: resolved.part,
            pointer: resolved.pointer(),
            path: resolved.path.clone(),
            indirections: resolved.indirections,
            circular: resolved.circular,
            extended: reference.is_extended(),
            external: !self.document.is_root(resolved.part),
        });

        if !resolved.circular && self.visited.insert(identity) {
            self.visit(resolved.part, resolved.path, from_root, Some(&site));
        }
    }

    fn record_failure(&mut self, failure: Failure) {
        let key = (failure.source_file.clone(), failure.source_pointer.clone());
        if self.reported.insert(key) {
            tracing::debug!(failure = %failure, "unresolved reference");
            self.outcome.failures.push(failure);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;
    use serde_json::json;

    use super::*;
    use crate::domain::errors::FailureKind;
    use crate::infra::parser::Parser;
    use crate::infra::workspace::FsWorkspace;

    fn write_files(files: &[(&str, &str)]) -> Result<tempfile::TempDir> {
        let temp = tempfile::tempdir()?;
        for (name, contents) in files {
            let path = temp.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, contents)?;
        }
        Ok(temp)
    }

    fn find<'i>(outcome: &'i CrawlOutcome, pointer: &str) -> &'i Entry {
        outcome
            .inventory
            .iter()
            .find(|entry| entry.path_from_root.to_pointer().as_str() == pointer)
            .unwrap_or_else(|| panic!("no inventory entry at {pointer}"))
    }

    #[test]
    fn one_ref() -> Result<()> {
        let temp = write_files(&[("one-ref.yaml", "foo: foofoo\nbar:\n  $ref: '#/foo'\n")])?;
        let ws = FsWorkspace::new(temp.path())?;
        let mut document = Document::open(&ws, Parser::default(), &ws.resolve("one-ref.yaml")?)?;
        let outcome = crawl(&mut document);

        assert_eq!(outcome.inventory.len(), 1);
        assert!(outcome.failures.is_empty());
        let bar = find(&outcome, "/bar");
        assert!(!bar.circular);
        assert!(!bar.external);
        assert_eq!(bar.depth, 1);
        assert_eq!(bar.pointer.as_str(), "/foo");
        Ok(())
    }

    #[test]
    fn two_refs_to_the_same_value() -> Result<()> {
        let temp = write_files(&[(
            "two-refs.yaml",
            "foo: foofoo\nbar:\n  $ref: '#/foo'\nbaz:\n  baz:\n    $ref: '#/foo'\n",
        )])?;
        let ws = FsWorkspace::new(temp.path())?;
        let mut document = Document::open(&ws, Parser::default(), &ws.resolve("two-refs.yaml")?)?;
        let outcome = crawl(&mut document);

        assert_eq!(outcome.inventory.len(), 2);
        let bar = find(&outcome, "/bar");
        let baz = find(&outcome, "/baz/baz");
        assert_eq!(bar.depth, 1);
        assert_eq!(baz.depth, 2);
        assert_eq!(bar.pointer, baz.pointer);
        assert_eq!(bar.value(&document), Some(&json!("foofoo")));
        assert_eq!(baz.value(&document), Some(&json!("foofoo")));
        assert!(!bar.extended && !baz.extended);
        Ok(())
    }

    #[test]
    fn indirect_and_extended_refs() -> Result<()> {
        let temp = write_files(&[(
            "indirect.yaml",
            "foo: foofoo\nbar:\n  $ref: '#/baz'\nbaz:\n  $ref: '#/foo'\next:\n  $ref: '#/foo'\n  description: extended\n",
        )])?;
        let ws = FsWorkspace::new(temp.path())?;
        let mut document = Document::open(&ws, Parser::default(), &ws.resolve("indirect.yaml")?)?;
        let outcome = crawl(&mut document);

        let bar = find(&outcome, "/bar");
        let baz = find(&outcome, "/baz");
        let ext = find(&outcome, "/ext");
        assert_eq!((bar.depth, baz.depth), (1, 1));
        assert_eq!(bar.indirections, 1);
        assert_eq!(baz.indirections, 0);
        assert_eq!(bar.pointer.as_str(), "/foo");
        assert_eq!(baz.pointer.as_str(), "/foo");
        assert!(!bar.extended && !baz.extended);
        assert!(ext.extended);
        Ok(())
    }

    #[test]
    fn ref_through_an_indirection() -> Result<()> {
        let temp = write_files(&[(
            "ref-deep.yaml",
            "foo:\n  foo1: deep\nbar:\n  $ref: '#/foo'\nbaz:\n  $ref: '#/bar/foo1'\n",
        )])?;
        let ws = FsWorkspace::new(temp.path())?;
        let mut document = Document::open(&ws, Parser::default(), &ws.resolve("ref-deep.yaml")?)?;
        let outcome = crawl(&mut document);

        let bar = find(&outcome, "/bar");
        let baz = find(&outcome, "/baz");
        assert_eq!(bar.pointer.as_str(), "/foo");
        assert_eq!(baz.pointer.as_str(), "/foo/foo1");
        assert_eq!(bar.indirections, 0);
        assert_eq!(baz.indirections, 1);
        Ok(())
    }

    #[test]
    fn external_refs_are_flagged_and_expanded() -> Result<()> {
        let temp = write_files(&[
            (
                "external.yaml",
                "foo:\n  $ref: 'ext.yaml#/foo'\nbar:\n  $ref: 'ext.yaml#/bar'\nbaz:\n  $ref: 'ext.yaml#/baz'\n",
            ),
            (
                "ext.yaml",
                "foo: foofoo\nbar:\n  $ref: '#/foo'\nbaz:\n  $ref: 'ext.yaml#/foo'\n",
            ),
        ])?;
        let ws = FsWorkspace::new(temp.path())?;
        let mut document = Document::open(&ws, Parser::default(), &ws.resolve("external.yaml")?)?;
        let outcome = crawl(&mut document);

        assert_eq!(outcome.inventory.len(), 3);
        for pointer in ["/foo", "/bar", "/baz"] {
            let entry = find(&outcome, pointer);
            assert!(entry.external);
            assert!(document.is_root(entry.site.part));
            assert_eq!(entry.value(&document), Some(&json!("foofoo")));
        }
        assert_eq!(find(&outcome, "/foo").indirections, 0);
        assert_eq!(find(&outcome, "/bar").indirections, 1);
        assert_eq!(find(&outcome, "/baz").indirections, 1);
        Ok(())
    }

    #[test]
    fn refs_back_into_the_root_terminate() -> Result<()> {
        let temp = write_files(&[
            (
                "root.yaml",
                "definitions:\n  User:\n    $ref: 'user.yaml#/User'\n",
            ),
            (
                "user.yaml",
                "User:\n  type: object\n  properties:\n    parent:\n      $ref: 'root.yaml#/definitions/User'\n",
            ),
        ])?;
        let ws = FsWorkspace::new(temp.path())?;
        let mut document = Document::open(&ws, Parser::default(), &ws.resolve("root.yaml")?)?;
        let outcome = crawl(&mut document);

        assert!(outcome.failures.is_empty());
        let user = find(&outcome, "/definitions/User");
        assert!(!user.circular);
        assert!(user.external);

        // Resolves through the root ref back to the already expanded user.yaml value.
        let parent = find(&outcome, "/definitions/User/properties/parent");
        assert!(!parent.circular);
        assert!(parent.external);
        assert_eq!(parent.indirections, 1);
        assert_eq!(parent.target(), user.target());
        assert_eq!(parent.via.as_ref(), Some(&user.site));
        Ok(())
    }

    #[test]
    fn ref_cycles_are_marked_circular() -> Result<()> {
        let temp = write_files(&[(
            "root.yaml",
            "a:\n  $ref: '#/b'\nb:\n  $ref: '#/a'\nself:\n  $ref: '#/self'\n",
        )])?;
        let ws = FsWorkspace::new(temp.path())?;
        let mut document = Document::open(&ws, Parser::default(), &ws.resolve("root.yaml")?)?;
        let outcome = crawl(&mut document);

        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.inventory.len(), 3);
        assert!(outcome.inventory.iter().all(|entry| entry.circular));
        assert_eq!(find(&outcome, "/a").pointer.as_str(), "/b");
        assert_eq!(find(&outcome, "/self").pointer.as_str(), "/self");
        Ok(())
    }

    #[test]
    fn failures_are_collected_without_stopping() -> Result<()> {
        let temp = write_files(&[
            (
                "root.yaml",
                "a:\n  $ref: 'missing.yaml'\nb:\n  $ref: '#/nope'\nc:\n  $ref: 'other.yaml#/ok'\nd:\n  $ref: 'other.yaml#/ok'\n",
            ),
            ("other.yaml", "ok:\n  bad:\n    $ref: '#/gone'\n"),
        ])?;
        let ws = FsWorkspace::new(temp.path())?;
        let mut document = Document::open(&ws, Parser::default(), &ws.resolve("root.yaml")?)?;
        let outcome = crawl(&mut document);

        let kinds: Vec<_> = outcome.failures.iter().map(|failure| failure.kind).collect();
        assert_eq!(
            kinds,
            [
                FailureKind::LoadFailed,
                FailureKind::PointerNotFound,
                FailureKind::PointerNotFound
            ]
        );
        let inner = &outcome.failures[2];
        assert!(inner.source_file.path().ends_with("/other.yaml"));
        assert_eq!(inner.source_pointer.as_str(), "/ok/bad/$ref");
        // Both c and d still resolved.
        assert_eq!(outcome.inventory.len(), 2);
        Ok(())
    }
}
