//! Type Tree
//!
//! Inheritance hierarchy over loaded types. Nodes live in a petgraph arena
//! with father -> child edges, so the father link is an index rather than an
//! owning pointer. Built once per type set and immutable afterwards.

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::TypeMap;
use crate::error::{FmlError, Result};
use crate::schema::{Resource, StructureKind};

/// Stable id of a node inside one tree
pub type TypeNodeId = NodeIndex;

/// What the tree records about each type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeNode {
    pub url: String,
    pub name: String,
    pub is_abstract: bool,
    pub kind: StructureKind,
}

impl TypeNode {
    fn from_resource(resource: &Resource) -> Self {
        Self {
            url: resource.url.clone(),
            name: resource.name.clone(),
            is_abstract: resource.is_abstract,
            kind: resource.kind,
        }
    }
}

// =============================================================================
// Type Tree
// =============================================================================

/// Single-rooted inheritance tree
#[derive(Debug, Clone)]
pub struct TypeTree {
    graph: DiGraph<TypeNode, ()>,
    by_url: HashMap<String, TypeNodeId>,
    root: TypeNodeId,
}

impl TypeTree {
    /// Link every type to the type named by its `base_definition`.
    ///
    /// Fails unless exactly one type is left without a father.
    pub fn build<'a>(resources: impl IntoIterator<Item = &'a Resource>) -> Result<Self> {
        let resources: Vec<&Resource> = resources.into_iter().collect();
        let mut graph = DiGraph::with_capacity(resources.len(), resources.len());
        let mut by_url = HashMap::with_capacity(resources.len());

        for resource in &resources {
            let idx = graph.add_node(TypeNode::from_resource(resource));
            by_url.insert(resource.url.clone(), idx);
        }

        let mut roots = Vec::new();
        for resource in &resources {
            let child = by_url[&resource.url];
            let father = resource
                .base_definition
                .as_ref()
                .and_then(|base| by_url.get(base));
            match father {
                Some(&father) => {
                    graph.add_edge(father, child, ());
                }
                None => roots.push(child),
            }
        }

        if roots.len() != 1 {
            let mut names: Vec<String> = roots.iter().map(|&r| graph[r].name.clone()).collect();
            names.sort();
            return Err(FmlError::InvalidHierarchy { roots: names });
        }
        if is_cyclic_directed(&graph) {
            return Err(FmlError::InvalidFormat(
                "baseDefinition chain contains a cycle".to_string(),
            ));
        }

        Ok(Self {
            graph,
            by_url,
            root: roots[0],
        })
    }

    pub fn root(&self) -> TypeNodeId {
        self.root
    }

    pub fn get(&self, id: TypeNodeId) -> Option<&TypeNode> {
        self.graph.node_weight(id)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Resolve a canonical url (exact) or a bare type name (scan)
    pub fn node(&self, identifier: &str) -> Option<TypeNodeId> {
        if let Some(&idx) = self.by_url.get(identifier) {
            return Some(idx);
        }
        self.graph
            .node_indices()
            .find(|&idx| self.graph[idx].name == identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.node(identifier).is_some()
    }

    pub fn father(&self, id: TypeNodeId) -> Option<TypeNodeId> {
        self.graph.neighbors_directed(id, Direction::Incoming).next()
    }

    /// Direct children ordered by type name
    pub fn children(&self, id: TypeNodeId) -> Vec<TypeNodeId> {
        let mut children: Vec<TypeNodeId> = self
            .graph
            .neighbors_directed(id, Direction::Outgoing)
            .collect();
        children.sort_by(|a, b| {
            let (a, b) = (&self.graph[*a], &self.graph[*b]);
            a.name.cmp(&b.name).then_with(|| a.url.cmp(&b.url))
        });
        children
    }

    /// Root first, immediate parent last
    pub fn ancestors(&self, id: TypeNodeId) -> Vec<TypeNodeId> {
        let mut chain = Vec::new();
        let mut current = self.father(id);
        while let Some(father) = current {
            chain.push(father);
            current = self.father(father);
        }
        chain.reverse();
        chain
    }

    /// Pre-order subtree, excluding `id` itself
    pub fn descendants(&self, id: TypeNodeId) -> Vec<TypeNodeId> {
        let mut result = Vec::new();
        let mut stack: Vec<TypeNodeId> = self.children(id).into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            result.push(node);
            stack.extend(self.children(node).into_iter().rev());
        }
        result
    }
}

// =============================================================================
// Type Hierarchy
// =============================================================================

/// The two trees: one over `resource` kinds, one over every other kind
#[derive(Debug, Clone, Default)]
pub struct TypeHierarchy {
    resources: Option<TypeTree>,
    elements: Option<TypeTree>,
}

impl TypeHierarchy {
    /// Build both trees. A tree is absent when no type of its kind is loaded.
    pub fn build(types: &TypeMap) -> Result<Self> {
        let (resources, elements): (Vec<&Resource>, Vec<&Resource>) = types
            .values()
            .partition(|r| r.kind == StructureKind::Resource);

        let resources = if resources.is_empty() {
            None
        } else {
            Some(TypeTree::build(resources)?)
        };
        let elements = if elements.is_empty() {
            None
        } else {
            Some(TypeTree::build(elements)?)
        };

        Ok(Self {
            resources,
            elements,
        })
    }

    /// Find the tree holding `identifier`, probing the resource tree first
    pub fn locate(&self, identifier: &str) -> Option<(&TypeTree, TypeNodeId)> {
        [self.resources.as_ref(), self.elements.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|tree| tree.node(identifier).map(|id| (tree, id)))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.locate(identifier).is_some()
    }

    /// Ancestors of `identifier`, root first
    pub fn ancestors(&self, identifier: &str) -> Vec<&TypeNode> {
        self.locate(identifier)
            .map(|(tree, id)| {
                tree.ancestors(id)
                    .into_iter()
                    .filter_map(|a| tree.get(a))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pre-order descendants of `identifier`
    pub fn descendants(&self, identifier: &str) -> Vec<&TypeNode> {
        self.locate(identifier)
            .map(|(tree, id)| {
                tree.descendants(id)
                    .into_iter()
                    .filter_map(|d| tree.get(d))
                    .collect()
            })
            .unwrap_or_default()
    }
}
