//! Raw StructureDefinition JSON shapes.
//!
//! Only the parts the parser reads are modelled; unknown members are ignored.

use serde::Deserialize;

/// A StructureDefinition as published by the schema provider
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStructureDefinition {
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    pub kind: String,
    #[serde(rename = "abstract", default)]
    pub is_abstract: bool,
    /// Type defined or constrained by this definition
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub derivation: Option<String>,
    #[serde(default)]
    pub base_definition: Option<String>,
    #[serde(default)]
    pub snapshot: Option<RawElementList>,
    #[serde(default)]
    pub differential: Option<RawElementList>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawElementList {
    #[serde(default)]
    pub element: Vec<RawElement>,
}

/// One ElementDefinition
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawElement {
    #[serde(default)]
    pub id: Option<String>,
    pub path: String,
    #[serde(default)]
    pub min: Option<u32>,
    #[serde(default)]
    pub max: Option<String>,
    #[serde(rename = "type", default)]
    pub types: Vec<RawElementType>,
    #[serde(default)]
    pub binding: Option<RawBinding>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawElementType {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub target_profile: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBinding {
    pub strength: String,
    #[serde(default)]
    pub value_set: Option<String>,
}
