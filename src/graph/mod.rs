//! Type Graph
//!
//! Everything derived from a loaded set of schema types: the inheritance
//! hierarchy (petgraph arena), load diagnostics and the directory loader.
//!
//! This module is shared between:
//! - the type environment (editor queries)
//! - the CLI (hierarchy inspection)

pub mod diagnostics;
pub mod loader;
pub mod type_tree;

pub use diagnostics::{DiagnosticCode, DiagnosticItem, Diagnostics, Severity};
pub use loader::{load_from_directory, load_from_values, LoadConfig, SchemaBundle};
pub use type_tree::{TypeHierarchy, TypeNode, TypeNodeId, TypeTree};

use std::collections::BTreeMap;

use crate::schema::Resource;

/// Canonical url -> parsed type. Ordered so every walk over it is deterministic.
pub type TypeMap = BTreeMap<String, Resource>;
