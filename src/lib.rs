//! FML Mapper
//!
//! FHIR type environment and graph-to-FML compiler behind a visual
//! StructureMap editor.
//!
//! ## Features
//!
//! - **Type Model**: StructureDefinitions parsed into typed field trees
//! - **Type Environment**: hierarchy queries, property-chain completion, value-set options
//! - **FML Compiler**: editor graph snapshots compiled into FHIR Mapping Language text
//!
//! ## Architecture
//!
//! ```text
//! definitions/*.json
//!        │  graph::loader
//!        ▼
//! SchemaBundle ──▶ TypeEnvironment (schema map + TypeHierarchy + value sets)
//!                         │ handle checks
//!                         ▼
//! TemplateSnapshot ──▶ fml::compile ──▶ Forest ──▶ fml::emit ──▶ map "..." = "..."
//! ```

pub mod config;
pub mod environment;
pub mod error;
pub mod fhir_types;
pub mod fml;
pub mod graph;
pub mod schema;

pub use config::{MapperConfig, TemplateConfig};
pub use environment::{Completion, SearchResult, TypeEnvironment, ValueSetMap, ValueSetOption};
pub use error::{FmlError, Result};
pub use fml::{generate_template, generate_template_with_environment, MappingGraph, TemplateSnapshot};
pub use graph::{load_from_directory, load_from_values, LoadConfig, SchemaBundle};
pub use schema::{parse_structure_definition, Field, FieldKind, Resource};
