//! FHIR Type Model
//!
//! Typed field trees derived from StructureDefinitions. A `Resource` is one
//! schema type; its `Field`s form a tree keyed by the dot-separated schema
//! path. Complex-typed fields hold the *name* of the referenced type and are
//! resolved lazily through the `TypeEnvironment`, so any single type can be
//! parsed without a fully built global graph.
//!
//! Everything here is immutable once parsed.

pub mod parser;
pub mod structure_definition;

pub use parser::parse_structure_definition;

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Resource
// =============================================================================

/// StructureDefinition kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StructureKind {
    Resource,
    ComplexType,
    PrimitiveType,
    Logical,
}

impl StructureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::ComplexType => "complex-type",
            Self::PrimitiveType => "primitive-type",
            Self::Logical => "logical",
        }
    }
}

/// How a type relates to its base definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Derivation {
    Specialization,
    Constraint,
}

/// Body of a resource: a field tree, or a scalar for primitive types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceContent {
    Fields(FieldMap),
    Primitive(Datatype),
}

/// One schema type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Canonical url (globally unique)
    pub url: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub is_abstract: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derivation: Option<Derivation>,
    /// Url of the type this one derives from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_definition: Option<String>,
    pub kind: StructureKind,
    pub content: ResourceContent,
}

impl Resource {
    /// Root field map (None for primitive types)
    pub fn fields(&self) -> Option<&FieldMap> {
        match &self.content {
            ResourceContent::Fields(fields) => Some(fields),
            ResourceContent::Primitive(_) => None,
        }
    }

    /// Scalar datatype of a primitive type
    pub fn datatype(&self) -> Option<&Datatype> {
        match &self.content {
            ResourceContent::Primitive(datatype) => Some(datatype),
            ResourceContent::Fields(_) => None,
        }
    }

    /// Every schema path in the field tree, in declaration order.
    ///
    /// Alternatives contribute their own path once; their options share it.
    pub fn field_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        if let Some(fields) = self.fields() {
            collect_paths(fields, &mut paths);
        }
        paths
    }
}

fn collect_paths(fields: &FieldMap, out: &mut Vec<String>) {
    // Explicit stack keeps deep backbone nesting off the call stack.
    let mut stack: Vec<&Field> = fields.iter().rev().collect();
    while let Some(field) = stack.pop() {
        out.push(field.path.clone());
        if let Some(children) = field.fields() {
            stack.extend(children.iter().rev());
        }
    }
}

// =============================================================================
// Field Map
// =============================================================================

/// Ordered field map: unique names, declaration order preserved
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap {
    fields: Vec<Field>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    /// Insert a field, replacing (in place) any field with the same name
    pub fn insert(&mut self, field: Field) -> Option<Field> {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => Some(std::mem::replace(existing, field)),
            None => {
                self.fields.push(field);
                None
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<'a> IntoIterator for &'a FieldMap {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

// =============================================================================
// Field
// =============================================================================

/// Upper cardinality bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Cardinality {
    Bounded(u32),
    Unbounded,
}

impl Cardinality {
    pub fn is_repeating(&self) -> bool {
        match self {
            Self::Bounded(n) => *n > 1,
            Self::Unbounded => true,
        }
    }
}

impl TryFrom<String> for Cardinality {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        if value == "*" {
            return Ok(Self::Unbounded);
        }
        value
            .parse::<u32>()
            .map(Self::Bounded)
            .map_err(|_| format!("invalid cardinality '{}'", value))
    }
}

impl From<Cardinality> for String {
    fn from(value: Cardinality) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(n) => write!(f, "{}", n),
            Self::Unbounded => write!(f, "*"),
        }
    }
}

/// Binding strength of a value set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingStrength {
    Required,
    Extensible,
    Preferred,
}

/// Value set bound to a CODE field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSetBinding {
    /// Value set url without any `|version` suffix
    pub url: String,
    pub strength: BindingStrength,
}

/// Field variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FieldKind {
    Primitive {
        datatype: Datatype,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value_set: Option<ValueSetBinding>,
    },
    BackboneElement {
        fields: FieldMap,
    },
    Element {
        fields: FieldMap,
    },
    /// Reference by name to a complex type, resolved lazily
    Complex {
        type_name: String,
    },
    Reference {
        /// Allowed target profile urls
        targets: Vec<String>,
    },
    /// Choice field (`value[x]`)
    Alternatives {
        options: Vec<Field>,
    },
}

/// One element of a resource or nested element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub url: String,
    pub name: String,
    /// Dot-separated schema path, source of truth for nesting
    pub path: String,
    pub min: u32,
    pub max: Cardinality,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl Field {
    /// Nested fields, only for element and backbone-element fields
    pub fn fields(&self) -> Option<&FieldMap> {
        match &self.kind {
            FieldKind::Element { fields } | FieldKind::BackboneElement { fields } => Some(fields),
            _ => None,
        }
    }

    pub fn fields_mut(&mut self) -> Option<&mut FieldMap> {
        match &mut self.kind {
            FieldKind::Element { fields } | FieldKind::BackboneElement { fields } => Some(fields),
            _ => None,
        }
    }

    pub fn value_set(&self) -> Option<&ValueSetBinding> {
        match &self.kind {
            FieldKind::Primitive { value_set, .. } => value_set.as_ref(),
            _ => None,
        }
    }

    /// Short human-readable type description for completion details
    pub fn type_label(&self) -> String {
        match &self.kind {
            FieldKind::Primitive { datatype, .. } => datatype.as_str().to_string(),
            FieldKind::BackboneElement { .. } => "BackboneElement".to_string(),
            FieldKind::Element { .. } => "Element".to_string(),
            FieldKind::Complex { type_name } => type_name.clone(),
            FieldKind::Reference { targets } => {
                let names: Vec<&str> = targets
                    .iter()
                    .map(|t| t.rsplit('/').next().unwrap_or(t))
                    .collect();
                format!("Reference({})", names.join("|"))
            }
            FieldKind::Alternatives { options } => options
                .iter()
                .map(|o| o.type_label())
                .collect::<Vec<_>>()
                .join("|"),
        }
    }
}

// =============================================================================
// Datatype
// =============================================================================

/// FHIR primitive datatype
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Datatype {
    Boolean,
    Integer,
    Integer64,
    String,
    Decimal,
    Uri,
    Url,
    Canonical,
    Base64Binary,
    Instant,
    Date,
    DateTime,
    Time,
    Code,
    Oid,
    Id,
    Markdown,
    UnsignedInt,
    PositiveInt,
    Uuid,
    Xhtml,
    /// Anything not in the FHIR primitive set
    Other(std::string::String),
}

const FHIRPATH_SYSTEM_PREFIX: &str = "http://hl7.org/fhirpath/System.";

impl Datatype {
    /// Parse a type code. FHIRPath system types map onto their FHIR equivalent.
    pub fn from_code(code: &str) -> Self {
        if let Some(system) = code.strip_prefix(FHIRPATH_SYSTEM_PREFIX) {
            return match system {
                "Boolean" => Self::Boolean,
                "Integer" => Self::Integer,
                "Long" => Self::Integer64,
                "String" => Self::String,
                "Decimal" => Self::Decimal,
                "Date" => Self::Date,
                "DateTime" => Self::DateTime,
                "Time" => Self::Time,
                other => Self::Other(other.to_string()),
            };
        }
        match code {
            "boolean" => Self::Boolean,
            "integer" => Self::Integer,
            "integer64" => Self::Integer64,
            "string" => Self::String,
            "decimal" => Self::Decimal,
            "uri" => Self::Uri,
            "url" => Self::Url,
            "canonical" => Self::Canonical,
            "base64Binary" => Self::Base64Binary,
            "instant" => Self::Instant,
            "date" => Self::Date,
            "dateTime" => Self::DateTime,
            "time" => Self::Time,
            "code" => Self::Code,
            "oid" => Self::Oid,
            "id" => Self::Id,
            "markdown" => Self::Markdown,
            "unsignedInt" => Self::UnsignedInt,
            "positiveInt" => Self::PositiveInt,
            "uuid" => Self::Uuid,
            "xhtml" => Self::Xhtml,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Integer64 => "integer64",
            Self::String => "string",
            Self::Decimal => "decimal",
            Self::Uri => "uri",
            Self::Url => "url",
            Self::Canonical => "canonical",
            Self::Base64Binary => "base64Binary",
            Self::Instant => "instant",
            Self::Date => "date",
            Self::DateTime => "dateTime",
            Self::Time => "time",
            Self::Code => "code",
            Self::Oid => "oid",
            Self::Id => "id",
            Self::Markdown => "markdown",
            Self::UnsignedInt => "unsignedInt",
            Self::PositiveInt => "positiveInt",
            Self::Uuid => "uuid",
            Self::Xhtml => "xhtml",
            Self::Other(code) => code,
        }
    }
}

impl From<std::string::String> for Datatype {
    fn from(value: std::string::String) -> Self {
        Self::from_code(&value)
    }
}

impl From<Datatype> for std::string::String {
    fn from(value: Datatype) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primitive(name: &str, path: &str) -> Field {
        Field {
            url: format!("test#{}", path),
            name: name.to_string(),
            path: path.to_string(),
            min: 0,
            max: Cardinality::Bounded(1),
            kind: FieldKind::Primitive {
                datatype: Datatype::String,
                value_set: None,
            },
        }
    }

    #[test]
    fn test_field_map_keeps_order_and_replaces_in_place() {
        let mut map = FieldMap::new();
        map.insert(primitive("b", "X.b"));
        map.insert(primitive("a", "X.a"));
        let replaced = map.insert(primitive("b", "X.b2"));

        assert!(replaced.is_some());
        assert_eq!(map.names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(map.get("b").unwrap().path, "X.b2");
    }

    #[test]
    fn test_datatype_codes() {
        assert_eq!(Datatype::from_code("code"), Datatype::Code);
        assert_eq!(Datatype::from_code("http://hl7.org/fhirpath/System.String"), Datatype::String);
        assert_eq!(Datatype::from_code("dateTime").as_str(), "dateTime");
        assert_eq!(Datatype::from_code("weird"), Datatype::Other("weird".to_string()));
    }

    #[test]
    fn test_cardinality_parsing() {
        assert_eq!(Cardinality::try_from("*".to_string()), Ok(Cardinality::Unbounded));
        assert_eq!(Cardinality::try_from("1".to_string()), Ok(Cardinality::Bounded(1)));
        assert!(Cardinality::try_from("many".to_string()).is_err());
        assert!(Cardinality::Unbounded.is_repeating());
        assert!(!Cardinality::Bounded(1).is_repeating());
    }

    #[test]
    fn test_field_paths_preorder() {
        let mut inner = FieldMap::new();
        inner.insert(primitive("name", "Patient.contact.name"));
        let mut root = FieldMap::new();
        root.insert(primitive("id", "Patient.id"));
        root.insert(Field {
            url: "test#Patient.contact".to_string(),
            name: "contact".to_string(),
            path: "Patient.contact".to_string(),
            min: 0,
            max: Cardinality::Unbounded,
            kind: FieldKind::BackboneElement { fields: inner },
        });
        root.insert(primitive("gender", "Patient.gender"));

        let resource = Resource {
            url: "http://hl7.org/fhir/StructureDefinition/Patient".to_string(),
            name: "Patient".to_string(),
            title: None,
            is_abstract: false,
            description: None,
            derivation: Some(Derivation::Specialization),
            base_definition: None,
            kind: StructureKind::Resource,
            content: ResourceContent::Fields(root),
        };

        assert_eq!(
            resource.field_paths(),
            vec!["Patient.id", "Patient.contact", "Patient.contact.name", "Patient.gender"]
        );
    }
}
