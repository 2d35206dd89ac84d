//! Value set map
//!
//! Enumerated code lists keyed by value set url, used to offer closed
//! choice lists for bound CODE fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;

/// One selectable code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSetOption {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawValueSet {
    url: String,
    #[serde(default)]
    include: Vec<RawInclude>,
    #[serde(default)]
    compose: Option<RawCompose>,
}

#[derive(Debug, Deserialize)]
struct RawCompose {
    #[serde(default)]
    include: Vec<RawInclude>,
}

#[derive(Debug, Deserialize)]
struct RawInclude {
    #[serde(default)]
    system: Option<String>,
    #[serde(default)]
    concept: Vec<RawConcept>,
}

#[derive(Debug, Deserialize)]
struct RawConcept {
    code: String,
    #[serde(default)]
    display: Option<String>,
}

/// url -> enumerated options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueSetMap {
    sets: BTreeMap<String, Vec<ValueSetOption>>,
}

impl ValueSetMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Does this JSON look like a value set (simplified or FHIR shape)?
    pub fn is_value_set(json: &Value) -> bool {
        json.get("resourceType").and_then(Value::as_str) == Some("ValueSet")
            || (json.get("url").is_some() && json.get("include").is_some())
    }

    /// Add a value set in `{id, url, include: [{system, concept: [...]}]}` shape.
    /// FHIR's `compose.include` is read as well. Returns the url.
    pub fn insert_json(&mut self, json: &Value) -> Result<String> {
        let raw = RawValueSet::deserialize(json)?;
        let includes = raw
            .include
            .iter()
            .chain(raw.compose.iter().flat_map(|c| c.include.iter()));

        let options = includes
            .flat_map(|include| {
                include.concept.iter().map(move |concept| ValueSetOption {
                    code: concept.code.clone(),
                    display: concept.display.clone(),
                    system: include.system.clone(),
                })
            })
            .collect();

        self.insert(raw.url.clone(), options);
        Ok(raw.url)
    }

    pub fn insert(&mut self, url: impl Into<String>, options: Vec<ValueSetOption>) {
        self.sets.insert(strip_version(&url.into()).to_string(), options);
    }

    /// Options of a value set; empty when the url is unknown
    pub fn options(&self, url: &str) -> &[ValueSetOption] {
        self.sets
            .get(strip_version(url))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, url: &str) -> bool {
        self.sets.contains_key(strip_version(url))
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

fn strip_version(url: &str) -> &str {
    url.split('|').next().unwrap_or(url)
}
