//! Schema Parser
//!
//! Converts a raw StructureDefinition into a `Resource` field tree.
//! Pure function over the input JSON: no I/O, no global state.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::structure_definition::{RawElement, RawElementType, RawStructureDefinition};
use super::{
    BindingStrength, Cardinality, Datatype, Derivation, Field, FieldKind, FieldMap, Resource,
    ResourceContent, StructureKind, ValueSetBinding,
};
use crate::error::{FmlError, Result};

/// Parse a StructureDefinition.
///
/// Returns `Ok(None)` for definitions excluded as constrained profiles.
pub fn parse_structure_definition(json: &Value) -> Result<Option<Resource>> {
    let raw = RawStructureDefinition::deserialize(json)?;
    parse_raw(&raw)
}

/// Parse an already deserialized definition
pub fn parse_raw(raw: &RawStructureDefinition) -> Result<Option<Resource>> {
    if !is_base_type(&raw.name, &raw.type_name) {
        debug!(url = %raw.url, name = %raw.name, ty = %raw.type_name, "skipping constrained profile");
        return Ok(None);
    }

    let kind = parse_kind(&raw.kind)?;
    let derivation = raw.derivation.as_deref().and_then(|d| match d {
        "specialization" => Some(Derivation::Specialization),
        "constraint" => Some(Derivation::Constraint),
        _ => None,
    });

    let content = if kind == StructureKind::PrimitiveType {
        ResourceContent::Primitive(Datatype::from_code(&raw.type_name))
    } else {
        ResourceContent::Fields(build_field_tree(raw)?)
    };

    Ok(Some(Resource {
        url: raw.url.clone(),
        name: raw.name.clone(),
        title: raw.title.clone(),
        is_abstract: raw.is_abstract,
        description: raw.description.clone(),
        derivation,
        base_definition: raw.base_definition.clone(),
        kind,
        content,
    }))
}

/// Profile exclusion heuristic: base types have a name and type that
/// contain one another.
pub fn is_base_type(name: &str, type_name: &str) -> bool {
    name.contains(type_name) || type_name.contains(name)
}

fn parse_kind(kind: &str) -> Result<StructureKind> {
    match kind {
        "resource" => Ok(StructureKind::Resource),
        "complex-type" => Ok(StructureKind::ComplexType),
        "primitive-type" => Ok(StructureKind::PrimitiveType),
        "logical" => Ok(StructureKind::Logical),
        other => Err(FmlError::InvalidFormat(format!(
            "unknown StructureDefinition kind '{}'",
            other
        ))),
    }
}

// =============================================================================
// Field Tree
// =============================================================================

fn build_field_tree(raw: &RawStructureDefinition) -> Result<FieldMap> {
    let elements = raw
        .snapshot
        .as_ref()
        .filter(|s| !s.element.is_empty())
        .or_else(|| raw.differential.as_ref().filter(|d| !d.element.is_empty()))
        .map(|list| list.element.as_slice())
        .ok_or_else(|| FmlError::MissingSnapshot { url: raw.url.clone() })?;

    let mut root = FieldMap::new();

    for element in elements {
        // Slices share their base element's path; only base types are modelled.
        if element.id.as_deref().is_some_and(|id| id.contains(':')) {
            continue;
        }

        let segments: Vec<&str> = element.path.split('.').skip(1).collect();
        let Some((name, prefix)) = segments.split_last() else {
            continue; // the root element itself
        };

        let Some(field) = build_field(&raw.url, element, name)? else {
            continue;
        };

        let parent = resolve_prefix(&mut root, prefix).map_err(|segment| {
            FmlError::StructuralViolation {
                url: raw.url.clone(),
                path: element.path.clone(),
                segment,
            }
        })?;
        if parent.contains(&field.name) {
            return Err(FmlError::DuplicateElement {
                url: raw.url.clone(),
                path: element.path.clone(),
            });
        }
        parent.insert(field);
    }

    Ok(root)
}

/// Walk `prefix` down the tree, returning the field map that owns the next field.
/// On failure returns the segment that did not resolve to a nestable field.
fn resolve_prefix<'a>(
    root: &'a mut FieldMap,
    prefix: &[&str],
) -> std::result::Result<&'a mut FieldMap, String> {
    let mut current = root;
    for segment in prefix {
        current = current
            .get_mut(segment)
            .and_then(Field::fields_mut)
            .ok_or_else(|| segment.to_string())?;
    }
    Ok(current)
}

fn build_field(url: &str, element: &RawElement, name: &str) -> Result<Option<Field>> {
    let max = match &element.max {
        Some(max) => Cardinality::try_from(max.clone()).map_err(FmlError::InvalidFormat)?,
        None => Cardinality::Bounded(1),
    };
    let base = FieldBase {
        url: format!("{}#{}", url, element.id.as_deref().unwrap_or(&element.path)),
        path: element.path.clone(),
        min: element.min.unwrap_or(0),
        max,
    };

    match element.types.as_slice() {
        [] => Ok(None),
        [single] => {
            let mut field = base.typed(url, name, single)?;
            attach_binding(&mut field, element);
            Ok(Some(field))
        }
        many => {
            let stem = name.trim_end_matches("[x]");
            let options = many
                .iter()
                .map(|ty| {
                    let code = type_code(url, element, ty)?;
                    base.typed(url, &choice_option_name(stem, code), ty)
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Some(base.with_kind(name, FieldKind::Alternatives { options })))
        }
    }
}

/// Attributes shared by every field built from one element
struct FieldBase {
    url: String,
    path: String,
    min: u32,
    max: Cardinality,
}

impl FieldBase {
    fn with_kind(&self, name: &str, kind: FieldKind) -> Field {
        Field {
            url: self.url.clone(),
            name: name.to_string(),
            path: self.path.clone(),
            min: self.min,
            max: self.max,
            kind,
        }
    }

    fn typed(&self, sd_url: &str, name: &str, ty: &RawElementType) -> Result<Field> {
        let code = ty.code.as_deref().ok_or_else(|| FmlError::MissingTypeCode {
            url: sd_url.to_string(),
            path: self.path.clone(),
        })?;

        let kind = match code {
            "BackboneElement" => FieldKind::BackboneElement { fields: FieldMap::new() },
            "Element" => FieldKind::Element { fields: FieldMap::new() },
            "Reference" => FieldKind::Reference {
                targets: ty.target_profile.clone(),
            },
            c if c.starts_with(|ch: char| ch.is_ascii_lowercase()) => FieldKind::Primitive {
                datatype: Datatype::from_code(c),
                value_set: None,
            },
            c => FieldKind::Complex {
                type_name: c.to_string(),
            },
        };
        Ok(self.with_kind(name, kind))
    }
}

fn type_code<'a>(url: &str, element: &RawElement, ty: &'a RawElementType) -> Result<&'a str> {
    ty.code.as_deref().ok_or_else(|| FmlError::MissingTypeCode {
        url: url.to_string(),
        path: element.path.clone(),
    })
}

/// `value` + `Quantity` -> `valueQuantity`
fn choice_option_name(stem: &str, code: &str) -> String {
    let mut chars = code.chars();
    match chars.next() {
        Some(first) => format!("{}{}{}", stem, first.to_ascii_uppercase(), chars.as_str()),
        None => stem.to_string(),
    }
}

fn attach_binding(field: &mut Field, element: &RawElement) {
    let Some(binding) = &element.binding else {
        return;
    };
    let Some(value_set) = &binding.value_set else {
        return;
    };
    let strength = match binding.strength.as_str() {
        "required" => BindingStrength::Required,
        "extensible" => BindingStrength::Extensible,
        "preferred" => BindingStrength::Preferred,
        _ => return,
    };

    if let FieldKind::Primitive {
        datatype: Datatype::Code,
        value_set: slot,
    } = &mut field.kind
    {
        let url = value_set.split('|').next().unwrap_or(value_set);
        *slot = Some(ValueSetBinding {
            url: url.to_string(),
            strength,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patient() -> Value {
        json!({
            "resourceType": "StructureDefinition",
            "url": "http://hl7.org/fhir/StructureDefinition/Patient",
            "name": "Patient",
            "kind": "resource",
            "abstract": false,
            "type": "Patient",
            "derivation": "specialization",
            "baseDefinition": "http://hl7.org/fhir/StructureDefinition/DomainResource",
            "snapshot": {
                "element": [
                    { "id": "Patient", "path": "Patient", "min": 0, "max": "*" },
                    { "id": "Patient.id", "path": "Patient.id", "min": 0, "max": "1",
                      "type": [{ "code": "http://hl7.org/fhirpath/System.String" }] },
                    { "id": "Patient.gender", "path": "Patient.gender", "min": 0, "max": "1",
                      "type": [{ "code": "code" }],
                      "binding": { "strength": "required",
                                   "valueSet": "http://hl7.org/fhir/ValueSet/administrative-gender|4.0.1" } },
                    { "id": "Patient.deceased[x]", "path": "Patient.deceased[x]", "min": 0, "max": "1",
                      "type": [{ "code": "boolean" }, { "code": "dateTime" }] },
                    { "id": "Patient.contact", "path": "Patient.contact", "min": 0, "max": "*",
                      "type": [{ "code": "BackboneElement" }] },
                    { "id": "Patient.contact.name", "path": "Patient.contact.name", "min": 0, "max": "1",
                      "type": [{ "code": "HumanName" }] },
                    { "id": "Patient.managingOrganization", "path": "Patient.managingOrganization",
                      "min": 0, "max": "1",
                      "type": [{ "code": "Reference",
                                 "targetProfile": ["http://hl7.org/fhir/StructureDefinition/Organization"] }] },
                    { "id": "Patient.link", "path": "Patient.link", "min": 0, "max": "*" }
                ]
            }
        })
    }

    #[test]
    fn test_parse_patient_field_tree() {
        let resource = parse_structure_definition(&patient()).unwrap().unwrap();
        let fields = resource.fields().unwrap();

        assert_eq!(resource.kind, StructureKind::Resource);
        assert_eq!(
            fields.names().collect::<Vec<_>>(),
            vec!["id", "gender", "deceased[x]", "contact", "managingOrganization"]
        );

        let contact = fields.get("contact").unwrap();
        assert!(matches!(contact.kind, FieldKind::BackboneElement { .. }));
        assert_eq!(contact.max, Cardinality::Unbounded);
        match &contact.fields().unwrap().get("name").unwrap().kind {
            FieldKind::Complex { type_name } => assert_eq!(type_name, "HumanName"),
            other => panic!("Expected Complex, got {:?}", other),
        }

        match &fields.get("managingOrganization").unwrap().kind {
            FieldKind::Reference { targets } => assert_eq!(targets.len(), 1),
            other => panic!("Expected Reference, got {:?}", other),
        }
    }

    #[test]
    fn test_code_binding_strips_version() {
        let resource = parse_structure_definition(&patient()).unwrap().unwrap();
        let gender = resource.fields().unwrap().get("gender").unwrap();
        let binding = gender.value_set().unwrap();

        assert_eq!(binding.url, "http://hl7.org/fhir/ValueSet/administrative-gender");
        assert_eq!(binding.strength, BindingStrength::Required);
    }

    #[test]
    fn test_choice_field_becomes_alternatives() {
        let resource = parse_structure_definition(&patient()).unwrap().unwrap();
        match &resource.fields().unwrap().get("deceased[x]").unwrap().kind {
            FieldKind::Alternatives { options } => {
                let names: Vec<&str> = options.iter().map(|o| o.name.as_str()).collect();
                assert_eq!(names, vec!["deceasedBoolean", "deceasedDateTime"]);
            }
            other => panic!("Expected Alternatives, got {:?}", other),
        }
    }

    #[test]
    fn test_profile_is_excluded() {
        let mut profile = patient();
        profile["name"] = json!("USCorePatientProfile");
        profile["type"] = json!("Observation");
        assert!(parse_structure_definition(&profile).unwrap().is_none());
    }

    #[test]
    fn test_primitive_type_has_scalar_value() {
        let sd = json!({
            "url": "http://hl7.org/fhir/StructureDefinition/code",
            "name": "code",
            "kind": "primitive-type",
            "abstract": false,
            "type": "code",
            "baseDefinition": "http://hl7.org/fhir/StructureDefinition/string"
        });
        let resource = parse_structure_definition(&sd).unwrap().unwrap();
        assert_eq!(resource.datatype(), Some(&Datatype::Code));
        assert!(resource.fields().is_none());
    }

    #[test]
    fn test_missing_snapshot_fails() {
        let mut sd = patient();
        sd.as_object_mut().unwrap().remove("snapshot");
        let err = parse_structure_definition(&sd).unwrap_err();
        assert!(matches!(err, FmlError::MissingSnapshot { .. }));
    }

    #[test]
    fn test_differential_fallback() {
        let mut sd = patient();
        let snapshot = sd.as_object_mut().unwrap().remove("snapshot").unwrap();
        sd["differential"] = snapshot;
        let resource = parse_structure_definition(&sd).unwrap().unwrap();
        assert_eq!(resource.fields().unwrap().len(), 5);
    }

    #[test]
    fn test_nesting_under_primitive_is_structural_violation() {
        let mut sd = patient();
        sd["snapshot"]["element"]
            .as_array_mut()
            .unwrap()
            .push(json!({ "id": "Patient.gender.extra", "path": "Patient.gender.extra",
                          "type": [{ "code": "string" }] }));
        match parse_structure_definition(&sd).unwrap_err() {
            FmlError::StructuralViolation { segment, .. } => assert_eq!(segment, "gender"),
            other => panic!("Expected StructuralViolation, got {:?}", other),
        }
    }

    #[test]
    fn test_repeated_path_is_rejected() {
        let mut sd = patient();
        sd["snapshot"]["element"]
            .as_array_mut()
            .unwrap()
            .push(json!({ "id": "Patient.contact", "path": "Patient.contact", "min": 0, "max": "1",
                          "type": [{ "code": "string" }] }));
        match parse_structure_definition(&sd).unwrap_err() {
            FmlError::DuplicateElement { path, .. } => assert_eq!(path, "Patient.contact"),
            other => panic!("Expected DuplicateElement, got {:?}", other),
        }
    }

    #[test]
    fn test_slices_do_not_replace_their_base_element() {
        let mut sd = patient();
        sd["snapshot"]["element"]
            .as_array_mut()
            .unwrap()
            .push(json!({ "id": "Patient.contact:emergency", "path": "Patient.contact", "min": 0, "max": "1",
                          "type": [{ "code": "BackboneElement" }] }));
        let resource = parse_structure_definition(&sd).unwrap().unwrap();
        let contact = resource.fields().unwrap().get("contact").unwrap();
        assert!(contact.fields().unwrap().contains("name"));
    }

    #[test]
    fn test_type_without_code_fails() {
        let mut sd = patient();
        sd["snapshot"]["element"]
            .as_array_mut()
            .unwrap()
            .push(json!({ "id": "Patient.broken", "path": "Patient.broken", "type": [{}] }));
        assert!(matches!(
            parse_structure_definition(&sd).unwrap_err(),
            FmlError::MissingTypeCode { .. }
        ));
    }
}
