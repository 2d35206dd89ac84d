//! Property Tests
//!
//! Random inheritance trees and identifiers.

use proptest::prelude::*;

use fml_mapper::fml::names::sanitize_identifier;
use fml_mapper::graph::TypeTree;
use fml_mapper::schema::{FieldMap, Resource, ResourceContent, StructureKind};

fn resource(index: usize, father: Option<usize>) -> Resource {
    Resource {
        url: format!("http://example.org/StructureDefinition/T{}", index),
        name: format!("T{}", index),
        title: None,
        is_abstract: index % 3 == 0,
        description: None,
        derivation: None,
        base_definition: father.map(|f| format!("http://example.org/StructureDefinition/T{}", f)),
        kind: StructureKind::ComplexType,
        content: ResourceContent::Fields(FieldMap::new()),
    }
}

/// `fathers[i]` picks the father of type `i + 1` among the types before it
fn tree_types() -> impl Strategy<Value = Vec<Resource>> {
    prop::collection::vec(any::<prop::sample::Index>(), 0..24).prop_map(|fathers| {
        let mut types = vec![resource(0, None)];
        for (i, pick) in fathers.iter().enumerate() {
            let index = i + 1;
            types.push(resource(index, Some(pick.index(index))));
        }
        types
    })
}

proptest! {
    #[test]
    fn prop_every_type_descends_from_the_root(types in tree_types()) {
        let tree = TypeTree::build(&types).unwrap();
        let root = tree.root();

        prop_assert_eq!(tree.len(), types.len());
        prop_assert_eq!(tree.descendants(root).len(), types.len() - 1);

        for resource in &types {
            let id = tree.node(&resource.url).unwrap();
            if id == root {
                continue;
            }
            let ancestors = tree.ancestors(id);
            prop_assert_eq!(ancestors.first().copied(), Some(root));
            prop_assert_eq!(ancestors.last().copied(), tree.father(id));
        }
    }

    #[test]
    fn prop_descendants_irreflexive_and_transitive(types in tree_types()) {
        let tree = TypeTree::build(&types).unwrap();

        for resource in &types {
            let id = tree.node(&resource.name).unwrap();
            let below = tree.descendants(id);
            prop_assert!(!below.contains(&id));

            for &d in &below {
                prop_assert!(tree.ancestors(d).contains(&id));
                for dd in tree.descendants(d) {
                    prop_assert!(below.contains(&dd));
                }
            }
        }
    }

    #[test]
    fn prop_sanitized_identifiers_are_valid(raw in ".{0,24}") {
        let ident = sanitize_identifier(&raw);
        let mut chars = ident.chars();
        let first = chars.next().unwrap();

        prop_assert!(first == '_' || first.is_ascii_alphabetic());
        prop_assert!(chars.all(|c| c == '_' || c.is_ascii_alphanumeric()));
    }
}
