//! Schema Loading
//!
//! Loads StructureDefinitions and value sets from a directory of JSON files,
//! parses them into the type set, and hashes the input for cache keys.
//!
//! A definition that fails to parse is reported and skipped; the rest of the
//! set still loads.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{DiagnosticCode, Diagnostics, TypeMap};
use crate::environment::{TypeEnvironment, ValueSetMap};
use crate::schema::parse_structure_definition;

/// Configuration for schema loading
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Skip files matching these path prefixes
    pub skip_prefixes: Vec<String>,
    /// Only load files matching these path prefixes
    pub include_prefixes: Vec<String>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            skip_prefixes: vec![
                "target/".to_string(),
                ".git/".to_string(),
                "node_modules/".to_string(),
            ],
            include_prefixes: Vec::new(),
        }
    }
}

impl LoadConfig {
    fn accepts(&self, relative: &str) -> bool {
        if !self.include_prefixes.is_empty()
            && !self.include_prefixes.iter().any(|p| relative.starts_with(p))
        {
            return false;
        }
        !self.skip_prefixes.iter().any(|p| relative.starts_with(p))
    }
}

/// Result of a load pass
#[derive(Debug, Clone, Default)]
pub struct SchemaBundle {
    pub types: TypeMap,
    pub value_sets: ValueSetMap,
    pub diagnostics: Diagnostics,
    /// SHA256 over every file read, in walk order
    pub bundle_hash: String,
}

impl SchemaBundle {
    /// Build the type environment over the loaded set
    pub fn into_environment(self) -> crate::error::Result<TypeEnvironment> {
        TypeEnvironment::new(self.types, self.value_sets)
    }
}

/// Load every `*.json` file under `schema_dir`
pub fn load_from_directory(schema_dir: &Path, config: &LoadConfig) -> anyhow::Result<SchemaBundle> {
    let mut hasher = Sha256::new();
    let mut documents = Vec::new();

    for entry in WalkDir::new(schema_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().map(|e| e != "json").unwrap_or(true) {
            continue;
        }

        let relative = path.strip_prefix(schema_dir)?.to_string_lossy().replace('\\', "/");
        if !config.accepts(&relative) {
            continue;
        }

        let content = fs::read_to_string(path)?;
        hasher.update(content.as_bytes());

        let json: Value = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse JSON in {}: {}", path.display(), e))?;
        documents.push((relative, json));
    }

    let mut bundle = load_from_values(documents);
    bundle.bundle_hash = format!("{:x}", hasher.finalize());
    debug!(
        types = bundle.types.len(),
        value_sets = bundle.value_sets.len(),
        diagnostics = bundle.diagnostics.len(),
        "schema directory loaded"
    );
    Ok(bundle)
}

/// Load already decoded documents, each labelled with a subject for diagnostics
pub fn load_from_values(documents: impl IntoIterator<Item = (String, Value)>) -> SchemaBundle {
    let mut builder = BundleBuilder::default();
    for (subject, json) in documents {
        builder.ingest(&subject, &json);
    }
    builder.finish()
}

// =============================================================================
// Bundle Builder
// =============================================================================

#[derive(Default)]
struct BundleBuilder {
    types: TypeMap,
    value_sets: ValueSetMap,
    diagnostics: Diagnostics,
}

impl BundleBuilder {
    fn ingest(&mut self, subject: &str, json: &Value) {
        match json.get("resourceType").and_then(Value::as_str) {
            Some("StructureDefinition") => self.add_definition(subject, json),
            Some("ValueSet") => self.add_value_set(subject, json),
            Some("Bundle") => {
                let resources = json
                    .get("entry")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(|entry| entry.get("resource"));
                for resource in resources {
                    self.ingest(subject, resource);
                }
            }
            Some(other) => self.diagnostics.report(
                subject,
                DiagnosticCode::UnsupportedResource,
                format!("resourceType '{}' is not loaded", other),
            ),
            None => self.ingest_untyped(subject, json),
        }
    }

    /// Documents without a resourceType: value-set arrays, value-set maps
    /// keyed by id, or a bare value set.
    fn ingest_untyped(&mut self, subject: &str, json: &Value) {
        if ValueSetMap::is_value_set(json) {
            self.add_value_set(subject, json);
            return;
        }
        match json {
            Value::Array(items) => {
                for item in items {
                    self.ingest(subject, item);
                }
            }
            Value::Object(map) if !map.is_empty() && map.values().all(ValueSetMap::is_value_set) => {
                for item in map.values() {
                    self.add_value_set(subject, item);
                }
            }
            _ => self.diagnostics.report(
                subject,
                DiagnosticCode::UnsupportedResource,
                "document is neither a StructureDefinition nor a value set",
            ),
        }
    }

    fn add_definition(&mut self, subject: &str, json: &Value) {
        match parse_structure_definition(json) {
            Ok(Some(resource)) => {
                if self.types.contains_key(&resource.url) {
                    self.diagnostics.report(
                        subject,
                        DiagnosticCode::DuplicateUrl,
                        format!("'{}' is already loaded; keeping the first definition", resource.url),
                    );
                    return;
                }
                self.types.insert(resource.url.clone(), resource);
            }
            Ok(None) => {
                let url = json.get("url").and_then(Value::as_str).unwrap_or(subject);
                self.diagnostics.report(
                    subject,
                    DiagnosticCode::ProfileSkipped,
                    format!("'{}' is a constrained profile", url),
                );
            }
            Err(err) => {
                warn!(subject, error = %err, "skipping StructureDefinition");
                self.diagnostics.parse_failure(subject, &err);
            }
        }
    }

    fn add_value_set(&mut self, subject: &str, json: &Value) {
        if let Err(err) = self.value_sets.insert_json(json) {
            warn!(subject, error = %err, "skipping value set");
            self.diagnostics.parse_failure(subject, &err);
        }
    }

    fn finish(mut self) -> SchemaBundle {
        for resource in self.types.values() {
            if let Some(base) = &resource.base_definition {
                if !self.types.contains_key(base) {
                    self.diagnostics.unresolved_base(&resource.url, base);
                }
            }
        }
        SchemaBundle {
            types: self.types,
            value_sets: self.value_sets,
            diagnostics: self.diagnostics,
            bundle_hash: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn definition(name: &str, base: Option<&str>) -> Value {
        let mut sd = json!({
            "resourceType": "StructureDefinition",
            "url": format!("http://hl7.org/fhir/StructureDefinition/{}", name),
            "name": name,
            "type": name,
            "kind": "resource",
            "abstract": false,
            "snapshot": { "element": [
                { "id": name, "path": name },
                { "id": format!("{}.id", name), "path": format!("{}.id", name),
                  "min": 0, "max": "1", "type": [{ "code": "id" }] }
            ]}
        });
        if let Some(base) = base {
            sd["baseDefinition"] = json!(format!("http://hl7.org/fhir/StructureDefinition/{}", base));
        }
        sd
    }

    #[test]
    fn test_bundle_entries_and_profiles() {
        let mut profile = definition("USCorePatient", Some("Patient"));
        profile["type"] = json!("Patient");
        profile["name"] = json!("us-core-patient");

        let bundle = load_from_values(vec![(
            "bundle.json".to_string(),
            json!({
                "resourceType": "Bundle",
                "entry": [
                    { "resource": definition("Resource", None) },
                    { "resource": definition("Patient", Some("Resource")) },
                    { "resource": profile },
                    { "resource": { "resourceType": "SearchParameter" } }
                ]
            }),
        )]);

        assert_eq!(bundle.types.len(), 2);
        assert_eq!(bundle.diagnostics.with_code(DiagnosticCode::ProfileSkipped).count(), 1);
        assert_eq!(bundle.diagnostics.with_code(DiagnosticCode::UnsupportedResource).count(), 1);
        assert!(!bundle.diagnostics.has_errors());
    }

    #[test]
    fn test_failed_definition_is_skipped() {
        let mut broken = definition("Patient", Some("Resource"));
        broken.as_object_mut().unwrap().remove("snapshot");

        let bundle = load_from_values(vec![
            ("resource.json".to_string(), definition("Resource", None)),
            ("patient.json".to_string(), broken),
            ("orphan.json".to_string(), definition("Observation", Some("DomainResource"))),
        ]);

        assert_eq!(bundle.types.len(), 2);
        assert_eq!(bundle.diagnostics.with_code(DiagnosticCode::MissingSnapshot).count(), 1);
        assert_eq!(bundle.diagnostics.with_code(DiagnosticCode::UnresolvedBase).count(), 1);
    }

    #[test]
    fn test_value_set_map_keyed_by_id() {
        let bundle = load_from_values(vec![(
            "valuesets.json".to_string(),
            json!({
                "administrative-gender": {
                    "id": "administrative-gender",
                    "url": "http://hl7.org/fhir/ValueSet/administrative-gender",
                    "include": [{ "concept": [{ "code": "male" }, { "code": "female" }] }]
                }
            }),
        )]);

        assert_eq!(bundle.value_sets.len(), 1);
        assert!(bundle.types.is_empty());
    }

    #[test]
    fn test_load_from_directory_filters_and_hashes() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("target")).unwrap();
        fs::write(
            dir.path().join("resource.json"),
            definition("Resource", None).to_string(),
        )
        .unwrap();
        fs::write(
            dir.path().join("patient.json"),
            definition("Patient", Some("Resource")).to_string(),
        )
        .unwrap();
        fs::write(dir.path().join("target/ignored.json"), "not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let first = load_from_directory(dir.path(), &LoadConfig::default()).unwrap();
        let second = load_from_directory(dir.path(), &LoadConfig::default()).unwrap();

        assert_eq!(first.types.len(), 2);
        assert_eq!(first.bundle_hash.len(), 64);
        assert_eq!(first.bundle_hash, second.bundle_hash);

        let env = first.into_environment().unwrap();
        assert!(env.is_subtype_of("Patient", "Resource"));
    }

    #[test]
    fn test_invalid_json_is_fatal() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();

        assert!(load_from_directory(dir.path(), &LoadConfig::default()).is_err());
    }
}
