//! FML Generation
//!
//! Graph snapshot -> rule forest -> FML text.
//!
//! ```text
//! TemplateSnapshot ──compile──▶ CompiledGraph ──emit──▶ group body
//!        │                      (Forest + deps)            │
//!        └──────────────── generate_template ◀─────────────┘
//! ```
//!
//! Entities are rebuilt from the snapshot on every pass and dropped after
//! emission; nothing here is incremental.

pub mod compiler;
pub mod emitter;
pub mod entity;
pub mod graph;
pub mod names;
pub mod template;

pub use compiler::{compile, compile_with_environment, CompiledGraph, GroupParam};
pub use emitter::emit;
pub use entity::{
    Entity, EntityId, EntityKind, FmlGroupNode, FmlNode, FmlRule, Forest, Instantiation,
    NodeType, RuleParam,
};
pub use graph::{
    GraphEdge, GraphNode, MappingGraph, NamedGraph, NodeData, Side, TemplateSnapshot,
    TransformAction,
};
pub use template::{generate_template, generate_template_with_environment};
