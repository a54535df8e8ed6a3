//! Resolution of a single `$ref` to a concrete value, following indirections.

use serde_json::Value;
use url::Url;

use crate::app::document::Document;
use crate::domain::errors::{Failure, FailureKind};
use crate::domain::model::{Node, PartId, REF_KEY, Site, child, node_at};
use crate::domain::pointer::{JsonPath, JsonPointer};

/// Absolute identity of a reference target: file plus parsed pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefIdentity {
    pub file: Url,
    pub path: JsonPath,
}

/// Where a `$ref` ends up once every indirection has been followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    pub part: PartId,
    pub path: JsonPath,
    /// Additional `$ref` hops followed to reach the value.
    pub indirections: u32,
    /// The resolution chain revisited itself; `part`/`path` name the ref's own target.
    pub circular: bool,
}

impl ResolvedRef {
    pub fn site(&self) -> Site {
        Site::new(self.part, self.path.clone())
    }

    pub fn pointer(&self) -> JsonPointer {
        self.path.to_pointer()
    }

    pub fn identity(&self, document: &Document<'_>) -> RefIdentity {
        RefIdentity {
            file: document.part(self.part).location.clone(),
            path: self.path.clone(),
        }
    }

    pub fn value<'d>(&self, document: &'d Document<'_>) -> Option<&'d Value> {
        node_at(document.part(self.part).tree(), &self.path)
    }
}

/// Resolves `$ref` strings against a document graph, loading parts on demand.
pub struct Resolver<'a, 'w> {
    document: &'a mut Document<'w>,
}

impl<'a, 'w> Resolver<'a, 'w> {
    pub fn new(document: &'a mut Document<'w>) -> Self {
        Self { document }
    }

    /// Resolve the `$ref` located at `site` whose raw value is `target`.
    pub fn resolve(&mut self, site: &Site, target: &str) -> Result<ResolvedRef, Failure> {
        self.resolve_with_chain(site, target, &[])
    }

    /// `chain` holds the identities still being resolved by callers up the stack; meeting one
    /// of them again is a cycle.
    fn resolve_with_chain(
        &mut self,
        site: &Site,
        target: &str,
        chain: &[RefIdentity],
    ) -> Result<ResolvedRef, Failure> {
        let uri = self.document.resolve(site.part, target).map_err(|err| {
            self.failure(
                site,
                target,
                FailureKind::MalformedRef,
                format!("invalid reference '{target}': {err}"),
            )
        })?;
        let pointer = JsonPointer::from_fragment(uri.fragment().unwrap_or("")).map_err(|err| {
            self.failure(
                site,
                target,
                FailureKind::MalformedRef,
                format!("invalid reference '{target}': {err}"),
            )
        })?;
        let part = self.document.create_or_get_part(&uri).map_err(|err| {
            self.failure(site, target, FailureKind::LoadFailed, err.to_string())
        })?;

        let keys = pointer.to_path();
        let identity = RefIdentity {
            file: self.document.part(part).location.clone(),
            path: keys.clone(),
        };
        if chain.contains(&identity) {
            tracing::debug!(target_ref = target, file = %identity.file, "circular reference");
            return Ok(ResolvedRef {
                part,
                path: keys,
                indirections: 0,
                circular: true,
            });
        }
        let mut chain = chain.to_vec();
        chain.push(identity);

        let mut current = Site::new(part, JsonPath::root());
        let mut tree = self.document.part(part).tree_handle();
        let mut indirections = 0;
        let mut remaining = keys.iter();

        loop {
            let Some(node) = node_at(&tree, &current.path) else {
                // Only reachable if a part changed underneath us.
                return Err(self.not_found(site, target, &current));
            };

            if let Node::Ref(reference) = Node::classify(node) {
                let inner_target = reference.target.to_owned();
                let inner = self.resolve_with_chain(&current, &inner_target, &chain)?;
                indirections += 1 + inner.indirections;
                if inner.circular {
                    return Ok(ResolvedRef {
                        indirections,
                        ..inner
                    });
                }
                tree = self.document.part(inner.part).tree_handle();
                current = inner.site();
            }

            let Some(key) = remaining.next() else {
                break;
            };
            let parent = node_at(&tree, &current.path);
            current.path.push(key.clone());
            if parent.and_then(|node| child(node, key)).is_none() {
                return Err(self.not_found(site, target, &current));
            }
        }

        tracing::trace!(
            target_ref = target,
            part = current.part.index(),
            pointer = %current.path.to_pointer(),
            indirections,
            "resolved reference"
        );
        Ok(ResolvedRef {
            part: current.part,
            path: current.path,
            indirections,
            circular: false,
        })
    }

    fn not_found(&self, site: &Site, target: &str, reached: &Site) -> Failure {
        let file = &self.document.part(reached.part).location;
        self.failure(
            site,
            target,
            FailureKind::PointerNotFound,
            format!(
                "failed to resolve reference to '{target}': '{}' not found in {file}",
                reached.path.to_pointer()
            ),
        )
    }

    fn failure(&self, site: &Site, target: &str, kind: FailureKind, message: String) -> Failure {
        Failure {
            kind,
            message,
            source_file: self.document.part(site.part).location.clone(),
            source_pointer: site.path.with_key(REF_KEY).to_pointer(),
            target: target.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;
    use serde_json::json;

    use super::*;
    use crate::infra::parser::Parser;
    use crate::infra::workspace::FsWorkspace;

    fn workspace(files: &[(&str, &str)]) -> Result<(tempfile::TempDir, FsWorkspace)> {
        let temp = tempfile::tempdir()?;
        for (name, contents) in files {
            let path = temp.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, contents)?;
        }
        let workspace = FsWorkspace::new(temp.path())?;
        Ok((temp, workspace))
    }

    fn site(document: &Document<'_>, pointer: &str) -> Site {
        Site::new(
            document.root_id(),
            JsonPointer::parse(pointer).unwrap().to_path(),
        )
    }

    fn path(pointer: &str) -> JsonPath {
        JsonPointer::parse(pointer).unwrap().to_path()
    }

    #[test]
    fn resolves_local_pointer() -> Result<()> {
        let (_temp, ws) = workspace(&[("root.yaml", "foo: foofoo\nbar: {$ref: '#/foo'}\n")])?;
        let mut document = Document::open(&ws, Parser::default(), &ws.resolve("root.yaml")?)?;
        let at = site(&document, "/bar");

        let resolved = Resolver::new(&mut document).resolve(&at, "#/foo").unwrap();
        assert_eq!(resolved.part, document.root_id());
        assert_eq!(resolved.path, path("/foo"));
        assert_eq!(resolved.indirections, 0);
        assert!(!resolved.circular);
        assert_eq!(resolved.value(&document), Some(&json!("foofoo")));
        Ok(())
    }

    #[test]
    fn direct_self_cycle_is_circular() -> Result<()> {
        let (_temp, ws) = workspace(&[(
            "root.yaml",
            "definitions:\n  User: {$ref: '#/definitions/User'}\n",
        )])?;
        let mut document = Document::open(&ws, Parser::default(), &ws.resolve("root.yaml")?)?;
        let at = site(&document, "/definitions/User");

        let resolved = Resolver::new(&mut document)
            .resolve(&at, "#/definitions/User")
            .unwrap();
        assert!(resolved.circular);
        assert_eq!(resolved.path, path("/definitions/User"));
        assert_eq!(resolved.indirections, 1);
        Ok(())
    }

    #[test]
    fn two_hop_cycle_across_files_is_circular() -> Result<()> {
        let (_temp, ws) = workspace(&[
            ("a.yaml", "A: {$ref: 'b.yaml#/B'}\n"),
            ("b.yaml", "B: {$ref: 'a.yaml#/A'}\n"),
        ])?;
        let mut document = Document::open(&ws, Parser::default(), &ws.resolve("a.yaml")?)?;
        let at = site(&document, "/A");

        let resolved = Resolver::new(&mut document).resolve(&at, "b.yaml#/B").unwrap();
        assert!(resolved.circular);
        assert_eq!(document.filename(resolved.part), "b.yaml");
        assert_eq!(resolved.path, path("/B"));
        assert_eq!(resolved.indirections, 2);
        Ok(())
    }

    #[test]
    fn indirection_chain_counts_hops() -> Result<()> {
        let (_temp, ws) = workspace(&[
            ("root.yaml", "a: {$ref: 'b.yaml#/b'}\n"),
            ("b.yaml", "b: {$ref: 'c.yaml#/c'}\n"),
            ("c.yaml", "c: {$ref: '#/value'}\nvalue: {type: string}\n"),
        ])?;
        let mut document = Document::open(&ws, Parser::default(), &ws.resolve("root.yaml")?)?;
        let at = site(&document, "/a");

        let resolved = Resolver::new(&mut document).resolve(&at, "b.yaml#/b").unwrap();
        assert!(!resolved.circular);
        assert_eq!(resolved.indirections, 2);
        assert_eq!(document.filename(resolved.part), "c.yaml");
        assert_eq!(resolved.path, path("/value"));
        assert_eq!(resolved.value(&document), Some(&json!({"type": "string"})));
        Ok(())
    }

    #[test]
    fn composes_pointer_across_indirection() -> Result<()> {
        let (_temp, ws) = workspace(&[
            ("root.yaml", "foo: {$ref: 'ext.yaml#/shared'}\nbaz: {$ref: '#/foo/foo1'}\n"),
            ("ext.yaml", "shared:\n  foo1: deep\n"),
        ])?;
        let mut document = Document::open(&ws, Parser::default(), &ws.resolve("root.yaml")?)?;
        let at = site(&document, "/baz");

        let resolved = Resolver::new(&mut document).resolve(&at, "#/foo/foo1").unwrap();
        assert_eq!(resolved.indirections, 1);
        assert_eq!(document.filename(resolved.part), "ext.yaml");
        assert_eq!(resolved.path, path("/shared/foo1"));
        assert_eq!(resolved.value(&document), Some(&json!("deep")));
        Ok(())
    }

    #[test]
    fn reports_each_failure_kind() -> Result<()> {
        let (_temp, ws) = workspace(&[("root.yaml", "foo: {bar: 1}\n")])?;
        let mut document = Document::open(&ws, Parser::default(), &ws.resolve("root.yaml")?)?;
        let at = site(&document, "/x");
        let mut resolver = Resolver::new(&mut document);

        let missing_key = resolver.resolve(&at, "#/foo/baz").unwrap_err();
        assert_eq!(missing_key.kind, FailureKind::PointerNotFound);
        assert_eq!(missing_key.source_pointer.as_str(), "/x/$ref");
        assert_eq!(missing_key.target, "#/foo/baz");
        assert!(missing_key.message.contains("/foo/baz"));

        let missing_file = resolver.resolve(&at, "other.yaml#/foo").unwrap_err();
        assert_eq!(missing_file.kind, FailureKind::LoadFailed);
        assert!(missing_file.message.contains("other.yaml"));

        let malformed = resolver.resolve(&at, "http://[broken").unwrap_err();
        assert_eq!(malformed.kind, FailureKind::MalformedRef);

        let bad_escape = resolver.resolve(&at, "#/foo~2").unwrap_err();
        assert_eq!(bad_escape.kind, FailureKind::MalformedRef);
        Ok(())
    }

    #[test]
    fn failure_inside_indirection_is_attributed_to_inner_ref() -> Result<()> {
        let (_temp, ws) = workspace(&[
            ("root.yaml", "a: {$ref: 'ext.yaml#/hop'}\n"),
            ("ext.yaml", "hop: {$ref: '#/nowhere'}\n"),
        ])?;
        let mut document = Document::open(&ws, Parser::default(), &ws.resolve("root.yaml")?)?;
        let at = site(&document, "/a");

        let failure = Resolver::new(&mut document)
            .resolve(&at, "ext.yaml#/hop")
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::PointerNotFound);
        assert!(failure.source_file.path().ends_with("/ext.yaml"));
        assert_eq!(failure.source_pointer.as_str(), "/hop/$ref");
        Ok(())
    }
}
