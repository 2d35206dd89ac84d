//! Error types for schema parsing and FML compilation

use thiserror::Error;

/// Result type for mapper operations
pub type Result<T> = std::result::Result<T, FmlError>;

/// Fatal mapper errors.
///
/// Type lookups that miss are not errors: the environment returns `None`
/// so that autocompletion can degrade to "no suggestions".
#[derive(Error, Debug)]
pub enum FmlError {
    #[error("StructureDefinition {url} has neither a snapshot nor a differential")]
    MissingSnapshot { url: String },

    #[error("Structural violation in {url}: element {path} nests under '{segment}', which is not an element or backbone element")]
    StructuralViolation {
        url: String,
        path: String,
        segment: String,
    },

    #[error("Element {path} appears more than once in {url}")]
    DuplicateElement { url: String, path: String },

    #[error("Element {path} in {url} declares a type without a code")]
    MissingTypeCode { url: String, path: String },

    #[error("Graph references unknown node '{node_id}' (edge '{edge_id}')")]
    UnresolvedNodeReference { edge_id: String, node_id: String },

    #[error("Edge '{edge_id}' is not a valid mapping edge: {reason}")]
    InvalidEdge { edge_id: String, reason: String },

    #[error("Node '{node_id}' is instantiated by more than one edge")]
    DuplicateInstantiation { node_id: String },

    #[error("Type hierarchy must have exactly one root, found {}: [{}]", roots.len(), roots.join(", "))]
    InvalidHierarchy { roots: Vec<String> },

    #[error("Rule nesting exceeds the maximum depth of {max_depth}")]
    NestingTooDeep { max_depth: usize },

    #[error("Invalid schema format: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
