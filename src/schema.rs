//! Canonical schema representation shared by the synthesizer, the document
//! assembler, the code generator and the validation runtime.
//!
//! Recursive types are representable because nodes never own their referents
//! directly: a named type is registered in the [`SchemaRegistry`] arena and
//! referenced by name, so the node tree itself is always acyclic.

use crate::analyzer::TypeKey;
use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

/// Prefix used for schema references in the emitted document.
pub const COMPONENTS_PREFIX: &str = "#/components/schemas/";

/// Primitive schema shapes with their OpenAPI formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    String,
    Integer(IntegerFormat),
    Number(NumberFormat),
    Boolean,
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerFormat {
    Int32,
    Int64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberFormat {
    Float,
    Double,
}

/// A canonical structural schema, independent of source syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaNode {
    Primitive(Primitive),
    /// Closed set of string constants (unit-variant enums)
    Enum(Vec<String>),
    Object(ObjectSchema),
    Array(Box<SchemaNode>),
    /// Ordered alternatives; never constructed with fewer than two cases
    Union(Vec<SchemaNode>),
    /// Name of a shared schema in the registry
    Reference(String),
    /// Unsupported shape, with the original type text kept for diagnostics
    Unknown(String),
}

/// Object schema with insertion-ordered properties.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectSchema {
    pub properties: Vec<PropertySchema>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySchema {
    pub name: String,
    pub schema: SchemaNode,
    pub required: bool,
}

impl ObjectSchema {
    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// One named entry in the registry.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub key: TypeKey,
    pub name: String,
    pub schema: SchemaNode,
}

/// Per-run store mapping resolved-type identities to synthesized, named
/// schemas.
///
/// Entries are reserved (name allocated, placeholder schema) before their
/// children are synthesized, so a self-referential type finds its own entry
/// mid-synthesis and emits a [`SchemaNode::Reference`] instead of recursing.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    entries: Vec<RegistryEntry>,
    by_key: HashMap<TypeKey, usize>,
    by_name: HashMap<String, usize>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered name for a type identity, if any.
    pub fn lookup(&self, key: &TypeKey) -> Option<&str> {
        self.by_key
            .get(key)
            .map(|&idx| self.entries[idx].name.as_str())
    }

    /// Reserves a collision-resistant name for `key` and returns it.
    ///
    /// The entry starts with a placeholder schema; callers complete it with
    /// [`SchemaRegistry::fill`] once children have been synthesized.
    pub fn reserve(&mut self, key: TypeKey, base: &str) -> String {
        debug_assert!(!self.by_key.contains_key(&key), "type registered twice");

        let base = sanitize_name(base);
        let mut name = base.clone();
        let mut counter = 2;
        while self.by_name.contains_key(&name) {
            name = format!("{}{}", base, counter);
            counter += 1;
        }

        let idx = self.entries.len();
        self.entries.push(RegistryEntry {
            key: key.clone(),
            name: name.clone(),
            schema: SchemaNode::Unknown(String::new()),
        });
        self.by_key.insert(key, idx);
        self.by_name.insert(name.clone(), idx);
        name
    }

    /// Completes a previously reserved entry.
    pub fn fill(&mut self, key: &TypeKey, schema: SchemaNode) {
        if let Some(&idx) = self.by_key.get(key) {
            self.entries[idx].schema = schema;
        }
    }

    pub fn get(&self, name: &str) -> Option<&SchemaNode> {
        self.by_name.get(name).map(|&idx| &self.entries[idx].schema)
    }

    /// Entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn sanitize_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "Schema".to_string()
    } else {
        cleaned
    }
}

/// Wire shape of a schema node: the OpenAPI schema object. All fields are
/// optional so one struct covers every node variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawSchema {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    schema_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    properties: Option<IndexMap<String, RawSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    required: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    items: Option<Box<RawSchema>>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    enum_values: Option<Vec<String>>,
    #[serde(rename = "anyOf", skip_serializing_if = "Option::is_none")]
    any_of: Option<Vec<RawSchema>>,
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nullable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl SchemaNode {
    fn to_raw(&self) -> RawSchema {
        match self {
            SchemaNode::Primitive(p) => {
                let (ty, format) = match p {
                    Primitive::String => ("string", None),
                    Primitive::Integer(IntegerFormat::Int32) => ("integer", Some("int32")),
                    Primitive::Integer(IntegerFormat::Int64) => ("integer", Some("int64")),
                    Primitive::Number(NumberFormat::Float) => ("number", Some("float")),
                    Primitive::Number(NumberFormat::Double) => ("number", Some("double")),
                    Primitive::Boolean => ("boolean", None),
                    Primitive::Null => {
                        return RawSchema {
                            nullable: Some(true),
                            ..RawSchema::default()
                        }
                    }
                };
                RawSchema {
                    schema_type: Some(ty.to_string()),
                    format: format.map(str::to_string),
                    ..RawSchema::default()
                }
            }
            SchemaNode::Enum(values) => RawSchema {
                schema_type: Some("string".to_string()),
                enum_values: Some(values.clone()),
                ..RawSchema::default()
            },
            SchemaNode::Object(obj) => {
                let mut properties = IndexMap::new();
                let mut required = Vec::new();
                for prop in &obj.properties {
                    properties.insert(prop.name.clone(), prop.schema.to_raw());
                    if prop.required {
                        required.push(prop.name.clone());
                    }
                }
                RawSchema {
                    schema_type: Some("object".to_string()),
                    properties: Some(properties),
                    required: if required.is_empty() {
                        None
                    } else {
                        Some(required)
                    },
                    ..RawSchema::default()
                }
            }
            SchemaNode::Array(items) => RawSchema {
                schema_type: Some("array".to_string()),
                items: Some(Box::new(items.to_raw())),
                ..RawSchema::default()
            },
            SchemaNode::Union(alternatives) => RawSchema {
                any_of: Some(alternatives.iter().map(SchemaNode::to_raw).collect()),
                ..RawSchema::default()
            },
            SchemaNode::Reference(name) => RawSchema {
                reference: Some(format!("{}{}", COMPONENTS_PREFIX, name)),
                ..RawSchema::default()
            },
            SchemaNode::Unknown(text) => RawSchema {
                description: if text.is_empty() {
                    None
                } else {
                    Some(format!("unsupported type `{}`", text))
                },
                ..RawSchema::default()
            },
        }
    }

    fn from_raw(raw: RawSchema) -> Result<Self, String> {
        if let Some(reference) = raw.reference {
            let name = reference
                .strip_prefix(COMPONENTS_PREFIX)
                .ok_or_else(|| format!("unsupported reference target `{}`", reference))?;
            return Ok(SchemaNode::Reference(name.to_string()));
        }
        if let Some(alternatives) = raw.any_of {
            let nodes = alternatives
                .into_iter()
                .map(SchemaNode::from_raw)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(SchemaNode::Union(nodes));
        }
        if let Some(values) = raw.enum_values {
            return Ok(SchemaNode::Enum(values));
        }
        match raw.schema_type.as_deref() {
            Some("object") => {
                let mut properties = Vec::new();
                let required: Vec<String> = raw.required.unwrap_or_default();
                for (name, prop) in raw.properties.unwrap_or_default() {
                    let required = required.iter().any(|r| r == &name);
                    properties.push(PropertySchema {
                        name,
                        schema: SchemaNode::from_raw(prop)?,
                        required,
                    });
                }
                Ok(SchemaNode::Object(ObjectSchema { properties }))
            }
            Some("array") => {
                let items = match raw.items {
                    Some(items) => SchemaNode::from_raw(*items)?,
                    None => SchemaNode::Unknown(String::new()),
                };
                Ok(SchemaNode::Array(Box::new(items)))
            }
            Some("string") => Ok(SchemaNode::Primitive(Primitive::String)),
            Some("boolean") => Ok(SchemaNode::Primitive(Primitive::Boolean)),
            Some("integer") => {
                let format = match raw.format.as_deref() {
                    Some("int64") => IntegerFormat::Int64,
                    _ => IntegerFormat::Int32,
                };
                Ok(SchemaNode::Primitive(Primitive::Integer(format)))
            }
            Some("number") => {
                let format = match raw.format.as_deref() {
                    Some("float") => NumberFormat::Float,
                    _ => NumberFormat::Double,
                };
                Ok(SchemaNode::Primitive(Primitive::Number(format)))
            }
            Some(other) => Err(format!("unsupported schema type `{}`", other)),
            None => {
                if raw.nullable == Some(true) {
                    Ok(SchemaNode::Primitive(Primitive::Null))
                } else {
                    Ok(SchemaNode::Unknown(raw.description.unwrap_or_default()))
                }
            }
        }
    }
}

impl Serialize for SchemaNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_raw().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SchemaNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawSchema::deserialize(deserializer)?;
        SchemaNode::from_raw(raw).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::TypeKey;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn key(n: usize) -> TypeKey {
        TypeKey::Decl {
            decl: n,
            args: Vec::new(),
        }
    }

    #[test]
    fn primitive_serialization() {
        let schema = SchemaNode::Primitive(Primitive::Integer(IntegerFormat::Int64));
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value, json!({"type": "integer", "format": "int64"}));
    }

    #[test]
    fn object_serialization_preserves_property_order() {
        let schema = SchemaNode::Object(ObjectSchema {
            properties: vec![
                PropertySchema {
                    name: "zeta".to_string(),
                    schema: SchemaNode::Primitive(Primitive::String),
                    required: true,
                },
                PropertySchema {
                    name: "alpha".to_string(),
                    schema: SchemaNode::Primitive(Primitive::Boolean),
                    required: false,
                },
            ],
        });
        let text = serde_json::to_string(&schema).unwrap();
        let zeta = text.find("zeta").unwrap();
        let alpha = text.find("alpha").unwrap();
        assert!(zeta < alpha, "declaration order must survive serialization");
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["required"], json!(["zeta"]));
    }

    #[test]
    fn reference_round_trip() {
        let schema = SchemaNode::Reference("User".to_string());
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value, json!({"$ref": "#/components/schemas/User"}));

        let back: SchemaNode = serde_json::from_value(value).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn union_round_trip() {
        let schema = SchemaNode::Union(vec![
            SchemaNode::Primitive(Primitive::String),
            SchemaNode::Primitive(Primitive::Boolean),
        ]);
        let value = serde_json::to_value(&schema).unwrap();
        assert!(value["anyOf"].is_array());

        let back: SchemaNode = serde_json::from_value(value).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn unknown_keeps_type_text_in_description() {
        let schema = SchemaNode::Unknown("fn(i32) -> i32".to_string());
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(
            value["description"],
            json!("unsupported type `fn(i32) -> i32`")
        );
    }

    #[test]
    fn registry_reserves_unique_names() {
        let mut registry = SchemaRegistry::new();
        let first = registry.reserve(key(0), "User");
        let second = registry.reserve(key(1), "User");

        assert_eq!(first, "User");
        assert_eq!(second, "User2");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn registry_lookup_after_reserve() {
        let mut registry = SchemaRegistry::new();
        let k = key(7);
        assert!(registry.lookup(&k).is_none());

        let name = registry.reserve(k.clone(), "Paginated_User");
        assert_eq!(registry.lookup(&k), Some(name.as_str()));
    }

    #[test]
    fn registry_fill_replaces_placeholder() {
        let mut registry = SchemaRegistry::new();
        let k = key(3);
        let name = registry.reserve(k.clone(), "Status");
        registry.fill(
            &k,
            SchemaNode::Enum(vec!["Active".to_string(), "Retired".to_string()]),
        );

        match registry.get(&name).unwrap() {
            SchemaNode::Enum(values) => assert_eq!(values.len(), 2),
            other => panic!("expected enum schema, got {:?}", other),
        }
    }

    #[test]
    fn sanitized_names_stay_identifier_safe() {
        let mut registry = SchemaRegistry::new();
        let name = registry.reserve(key(0), "Paginated<User>");
        assert_eq!(name, "Paginated_User_");
    }
}
