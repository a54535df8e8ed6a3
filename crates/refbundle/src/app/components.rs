//! Component-bag policy: where copied external values get synthesized names.

use crate::domain::pointer::JsonPath;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Any,
}

impl Segment {
    fn matches(&self, key: &str) -> bool {
        match self {
            Segment::Literal(literal) => literal == key,
            Segment::Any => true,
        }
    }
}

/// Path prefixes whose direct children are named, shareable components.
///
/// `components/*` covers OpenAPI 3 (`components/schemas/Pet`), `definitions` covers
/// Swagger 2 and JSON Schema (`definitions/Pet`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentBags {
    patterns: Vec<Vec<Segment>>,
}

/// A resolved path that falls inside a component bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BagMatch {
    /// The bag itself, e.g. `components/schemas`.
    pub bag: JsonPath,
    /// Bag plus the component's own name segment.
    pub component: JsonPath,
    /// Segments below the component.
    pub rest: JsonPath,
}

impl ComponentBags {
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Self {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                pattern
                    .as_ref()
                    .split('/')
                    .filter(|segment| !segment.is_empty())
                    .map(|segment| match segment {
                        "*" => Segment::Any,
                        literal => Segment::Literal(literal.to_owned()),
                    })
                    .collect::<Vec<_>>()
            })
            .filter(|segments| !segments.is_empty())
            .collect();
        Self { patterns }
    }

    /// First bag containing `path` with at least a component name below it.
    pub fn locate(&self, path: &JsonPath) -> Option<BagMatch> {
        self.patterns.iter().find_map(|pattern| {
            if path.len() <= pattern.len() {
                return None;
            }
            let matched = pattern
                .iter()
                .zip(path.iter())
                .all(|(segment, key)| segment.matches(key));
            matched.then(|| BagMatch {
                bag: path[..pattern.len()].iter().cloned().collect(),
                component: path[..=pattern.len()].iter().cloned().collect(),
                rest: path[pattern.len() + 1..].iter().cloned().collect(),
            })
        })
    }
}

impl Default for ComponentBags {
    fn default() -> Self {
        Self::from_patterns(&["components/*", "definitions"])
    }
}

/// Collision-free component name derived from the source file and the component's pointer.
pub fn component_name(filename: &str, component: &JsonPath) -> String {
    let raw = format!("{filename}{}", component.to_pointer());
    raw.replace(['/', '#'], "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(keys: &[&str]) -> JsonPath {
        keys.iter().copied().collect()
    }

    #[test]
    fn locates_nested_and_flat_bags() {
        let bags = ComponentBags::default();

        let nested = bags
            .locate(&path(&["components", "schemas", "Pet", "properties", "id"]))
            .unwrap();
        assert_eq!(nested.bag, path(&["components", "schemas"]));
        assert_eq!(nested.component, path(&["components", "schemas", "Pet"]));
        assert_eq!(nested.rest, path(&["properties", "id"]));

        let flat = bags.locate(&path(&["definitions", "User"])).unwrap();
        assert_eq!(flat.bag, path(&["definitions"]));
        assert!(flat.rest.is_empty());
    }

    #[test]
    fn ignores_paths_outside_bags() {
        let bags = ComponentBags::default();
        assert_eq!(bags.locate(&path(&["components", "schemas"])), None);
        assert_eq!(bags.locate(&path(&["paths", "/pets"])), None);
        assert_eq!(bags.locate(&JsonPath::root()), None);
    }

    #[test]
    fn custom_patterns_replace_defaults() {
        let bags = ComponentBags::from_patterns(&["x-shared/*/", "", "/"]);
        assert!(bags.locate(&path(&["definitions", "User"])).is_none());
        let found = bags.locate(&path(&["x-shared", "types", "Id"])).unwrap();
        assert_eq!(found.bag, path(&["x-shared", "types"]));
    }

    #[test]
    fn synthesized_names_are_path_safe() {
        let name = component_name(
            "schemas/pet.yaml",
            &path(&["components", "schemas", "Pet"]),
        );
        assert_eq!(name, "schemas-pet.yaml-components-schemas-Pet");
        assert!(!name.contains('/'));
    }
}
