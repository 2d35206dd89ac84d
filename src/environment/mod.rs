//! Type Environment
//!
//! Read-only facade over the loaded type set, its inheritance hierarchy and
//! the value sets. This is what the editor queries for property-chain
//! autocompletion, subtype checks and closed code choices.
//!
//! Lookups that miss return `None` or an empty list, never an error.

pub mod value_set;

pub use value_set::{ValueSetMap, ValueSetOption};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::fhir_types;
use crate::graph::{TypeHierarchy, TypeMap};
use crate::schema::{Cardinality, Field, FieldKind, FieldMap, Resource, StructureKind};

/// One autocompletion candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub name: String,
    /// Short type description, e.g. `CodeableConcept` or `Reference(Patient)`
    pub detail: String,
    pub min: u32,
    pub max: Cardinality,
}

/// Fuzzy search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub name: String,
    pub kind: StructureKind,
    pub score: i64,
}

/// Type Tree + schema map + value-set map
#[derive(Debug, Clone)]
pub struct TypeEnvironment {
    types: TypeMap,
    value_sets: ValueSetMap,
    hierarchy: TypeHierarchy,
}

impl TypeEnvironment {
    pub fn new(types: TypeMap, value_sets: ValueSetMap) -> Result<Self> {
        let hierarchy = TypeHierarchy::build(&types)?;
        debug!(types = types.len(), value_sets = value_sets.len(), "type environment built");
        Ok(Self {
            types,
            value_sets,
            hierarchy,
        })
    }

    // ========== Type lookup ==========

    /// Resolve a canonical url or a bare type name
    pub fn get_type(&self, identifier: &str) -> Option<&Resource> {
        let normalized = fhir_types::normalize_identifier(identifier);
        if let Some(resource) = self.types.get(normalized.as_ref()) {
            return Some(resource);
        }
        // Names outside the core sets (logical models, local types)
        let (tree, id) = self.hierarchy.locate(identifier)?;
        self.types.get(&tree.get(id)?.url)
    }

    /// Resolve a field-access chain starting at `root`.
    ///
    /// Element and backbone fields descend into their own fields, complex
    /// fields continue from the referenced type. Primitive and reference
    /// fields end the chain.
    pub fn resolve_path_type(&self, root: &str, segments: &[&str]) -> Option<&Field> {
        let (last, init) = segments.split_last()?;
        let mut fields = self.get_type(root)?.fields()?;
        for segment in init {
            let field = lookup_field(fields, segment)?;
            fields = self.nested_fields(field)?;
        }
        lookup_field(fields, last)
    }

    /// Dotted form of `resolve_path_type`
    pub fn resolve_path(&self, root: &str, path: &str) -> Option<&Field> {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        self.resolve_path_type(root, &segments)
    }

    /// Fields reachable one step below `field`
    pub fn nested_fields<'a>(&'a self, field: &'a Field) -> Option<&'a FieldMap> {
        match &field.kind {
            FieldKind::Element { fields } | FieldKind::BackboneElement { fields } => Some(fields),
            FieldKind::Complex { type_name } => self.get_type(type_name)?.fields(),
            FieldKind::Primitive { .. }
            | FieldKind::Reference { .. }
            | FieldKind::Alternatives { .. } => None,
        }
    }

    // ========== Hierarchy queries ==========

    /// Every concrete descendant of a (possibly abstract) type
    pub fn implementations(&self, type_name: &str) -> Vec<&Resource> {
        self.hierarchy
            .descendants(&fhir_types::normalize_identifier(type_name))
            .into_iter()
            .filter(|node| !node.is_abstract)
            .filter_map(|node| self.types.get(&node.url))
            .collect()
    }

    /// Ancestors of a type, root first
    pub fn ancestors(&self, identifier: &str) -> Vec<&Resource> {
        self.hierarchy
            .ancestors(&fhir_types::normalize_identifier(identifier))
            .into_iter()
            .filter_map(|node| self.types.get(&node.url))
            .collect()
    }

    /// Is `child` the same type as `ancestor` or derived from it?
    pub fn is_subtype_of(&self, child: &str, ancestor: &str) -> bool {
        let (Some(child), Some(ancestor)) = (self.get_type(child), self.get_type(ancestor)) else {
            return false;
        };
        child.url == ancestor.url
            || self
                .hierarchy
                .ancestors(&child.url)
                .iter()
                .any(|node| node.url == ancestor.url)
    }

    // ========== Value sets ==========

    /// Enumerated entries of a value set
    pub fn options(&self, value_set_url: &str) -> &[ValueSetOption] {
        self.value_sets.options(value_set_url)
    }

    /// Options offered for a bound CODE field
    pub fn options_for(&self, field: &Field) -> &[ValueSetOption] {
        match field.value_set() {
            Some(binding) => self.options(&binding.url),
            None => &[],
        }
    }

    // ========== Editor support ==========

    /// Property-chain autocompletion.
    ///
    /// `partial` is a dotted chain whose last segment is a (possibly empty)
    /// name prefix: `contact.na` offers the fields of `contact` starting
    /// with `na`. Choice fields are offered through their typed options.
    pub fn complete(&self, root: &str, partial: &str) -> Vec<Completion> {
        let segments: Vec<&str> = partial.split('.').collect();
        let Some((prefix, init)) = segments.split_last() else {
            return Vec::new();
        };

        let fields = if init.is_empty() {
            self.get_type(root).and_then(Resource::fields)
        } else {
            self.resolve_path_type(root, init)
                .and_then(|field| self.nested_fields(field))
        };
        let Some(fields) = fields else {
            return Vec::new();
        };

        let mut completions = Vec::new();
        for field in fields {
            match &field.kind {
                FieldKind::Alternatives { options } => {
                    completions.extend(
                        options
                            .iter()
                            .filter(|o| o.name.starts_with(prefix))
                            .map(completion),
                    );
                }
                _ if field.name.starts_with(prefix) => completions.push(completion(field)),
                _ => {}
            }
        }
        completions
    }

    /// Fuzzy search over type names
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        use fuzzy_matcher::skim::SkimMatcherV2;
        use fuzzy_matcher::FuzzyMatcher;

        let matcher = SkimMatcherV2::default();
        let mut results: Vec<(i64, &Resource)> = self
            .types
            .values()
            .filter_map(|r| matcher.fuzzy_match(&r.name, query).map(|score| (score, r)))
            .collect();

        // Sort by score descending, then name for stable output
        results.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name)));

        results
            .into_iter()
            .take(limit)
            .map(|(score, r)| SearchResult {
                url: r.url.clone(),
                name: r.name.clone(),
                kind: r.kind,
                score,
            })
            .collect()
    }
}

/// Find a field by name; `value` also finds `value[x]`, and a typed
/// choice name such as `valueQuantity` finds that option.
fn lookup_field<'a>(fields: &'a FieldMap, name: &str) -> Option<&'a Field> {
    if let Some(field) = fields.get(name) {
        return Some(field);
    }
    if let Some(field) = fields.get(&format!("{}[x]", name)) {
        return Some(field);
    }
    fields.iter().find_map(|field| match &field.kind {
        FieldKind::Alternatives { options } => options.iter().find(|o| o.name == name),
        _ => None,
    })
}

fn completion(field: &Field) -> Completion {
    Completion {
        name: field.name.clone(),
        detail: field.type_label(),
        min: field.min,
        max: field.max,
    }
}
