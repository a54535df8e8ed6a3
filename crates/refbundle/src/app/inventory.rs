//! Inventory of every `$ref` site found by a crawl, with dedup and canonical ordering.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;
use url::Url;

use crate::app::document::Document;
use crate::domain::model::{PartId, Site, node_at};
use crate::domain::pointer::{JsonPath, JsonPointer};

/// One crawled `$ref` site and where it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Part and path of the `$ref` object itself.
    pub site: Site,
    /// The `$ref` the crawler followed into `site.part`; `None` for sites in the root part.
    pub via: Option<Site>,
    /// Position of the site in the output, measured from the root document.
    pub path_from_root: JsonPath,
    pub depth: usize,
    /// File the ref resolved into.
    pub file: Url,
    pub part: PartId,
    pub pointer: JsonPointer,
    pub path: JsonPath,
    pub indirections: u32,
    pub circular: bool,
    pub extended: bool,
    /// Resolved file is not the root document's file.
    pub external: bool,
}

impl Entry {
    /// Where the resolved value lives.
    pub fn target(&self) -> Site {
        Site::new(self.part, self.path.clone())
    }

    pub fn value<'d>(&self, document: &'d Document<'_>) -> Option<&'d Value> {
        node_at(document.part(self.part).tree(), &self.path)
    }

    /// Whether this entry should displace `other` recorded for the same site.
    fn supersedes(&self, other: &Entry) -> bool {
        (self.depth, self.indirections) < (other.depth, other.indirections)
    }
}

/// Canonical order: entries resolving to the same place end up adjacent, canonical
/// occurrence first.
pub fn compare(a: &Entry, b: &Entry) -> Ordering {
    a.file
        .cmp(&b.file)
        .then_with(|| a.pointer.as_str().cmp(b.pointer.as_str()))
        .then_with(|| a.indirections.cmp(&b.indirections))
        .then_with(|| b.circular.cmp(&a.circular))
        .then_with(|| a.depth.cmp(&b.depth))
        .then_with(|| a.extended.cmp(&b.extended))
}

#[derive(Debug, Clone, Default)]
pub struct Inventory {
    entries: Vec<Entry>,
    by_site: HashMap<Site, usize>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `entry`, keeping only the shallowest (then least indirect) record per site.
    ///
    /// Returns whether the entry was kept.
    pub fn add(&mut self, entry: Entry) -> bool {
        match self.by_site.get(&entry.site) {
            Some(&index) => {
                if entry.supersedes(&self.entries[index]) {
                    self.entries[index] = entry;
                    true
                } else {
                    false
                }
            }
            None => {
                self.by_site.insert(entry.site.clone(), self.entries.len());
                self.entries.push(entry);
                true
            }
        }
    }

    pub fn get(&self, site: &Site) -> Option<&Entry> {
        self.position(site).map(|index| &self.entries[index])
    }

    /// Index of the entry recorded for `site` within [`Inventory::entries`].
    pub fn position(&self, site: &Site) -> Option<usize> {
        self.by_site.get(site).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn sort(&mut self) {
        self.entries.sort_by(compare);
        self.by_site = self
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (entry.site.clone(), index))
            .collect();
    }
}

impl<'a> IntoIterator for &'a Inventory {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
