//! Mapping Graph Snapshot
//!
//! The editor's node/edge graph as it is handed to the compiler. One
//! snapshot is read per compile pass and never mutated.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::error::Result;

/// Which side of the mapping a node belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Source,
    Target,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Target => "target",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// FML transform vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransformAction {
    Create,
    Copy,
    Truncate,
    Escape,
    Cast,
    Append,
    Translate,
    Reference,
    DateOp,
    Uuid,
    Pointer,
    Evaluate,
    Cc,
    C,
    Qty,
    Id,
    Cp,
}

impl TransformAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Copy => "copy",
            Self::Truncate => "truncate",
            Self::Escape => "escape",
            Self::Cast => "cast",
            Self::Append => "append",
            Self::Translate => "translate",
            Self::Reference => "reference",
            Self::DateOp => "dateOp",
            Self::Uuid => "uuid",
            Self::Pointer => "pointer",
            Self::Evaluate => "evaluate",
            Self::Cc => "cc",
            Self::C => "c",
            Self::Qty => "qty",
            Self::Id => "id",
            Self::Cp => "cp",
        }
    }
}

impl fmt::Display for TransformAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Node payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeData {
    /// A source or target variable typed by a schema type
    Element {
        side: Side,
        /// Type name, e.g. `Patient` or `CodeableConcept`
        resource: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        /// Variable name; generated from the type name when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
    /// Transform call; inputs are the edges into it, output the edge out of it
    Transform { action: TransformAction },
    /// Literal value
    Constant { value: Value },
    /// Call of a named sub-mapping group
    Group { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub data: NodeData,
}

impl GraphNode {
    pub fn side(&self) -> Option<Side> {
        match &self.data {
            NodeData::Element { side, .. } => Some(*side),
            _ => None,
        }
    }
}

/// Connection between a handle on one node and a handle on another.
/// Handles name fields of the node's type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    /// FHIRPath guard emitted as a `where` clause
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// One graph: the main mapping or the body of a named group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingGraph {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

impl MappingGraph {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Node id -> position in `nodes`
    pub fn index(&self) -> HashMap<&str, usize> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.as_str(), i))
            .collect()
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

/// Body of a named sub-mapping group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedGraph {
    pub name: String,
    pub graph: MappingGraph,
}

/// Everything one `generate` action compiles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSnapshot {
    /// Canonical url of the map; derived from the name when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_url: Option<String>,
    pub map_name: String,
    pub main: MappingGraph,
    #[serde(default)]
    pub groups: Vec<NamedGraph>,
}

impl TemplateSnapshot {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_wire_format() {
        let graph = MappingGraph::from_json(
            r#"{
                "nodes": [
                    { "id": "n1", "data": { "type": "element", "side": "source", "resource": "Patient" } },
                    { "id": "n2", "data": { "type": "transform", "action": "dateOp" } },
                    { "id": "n3", "data": { "type": "constant", "value": "final" } }
                ],
                "edges": [
                    { "id": "e1", "source": "n1", "target": "n2", "sourceHandle": "birthDate" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(graph.nodes[0].side(), Some(Side::Source));
        assert_eq!(
            graph.nodes[1].data,
            NodeData::Transform { action: TransformAction::DateOp }
        );
        assert_eq!(graph.edges[0].source_handle.as_deref(), Some("birthDate"));
        assert_eq!(graph.edges[0].target_handle, None);
        assert_eq!(graph.index()["n3"], 2);
    }
}
