//! Request-time schema enforcement.
//!
//! The generated registration source embeds each route's request schema as
//! JSON; at startup the host builds a [`Validator`] per route, and the
//! validation glue runs [`Validator::validate`] against the assembled request
//! payload before the real handler executes. Validation is pure: a validator
//! holds no mutable state and may be shared freely across concurrent
//! requests.

use crate::schema::{Primitive, SchemaNode};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Recursion bound while walking a payload against a schema; generated
/// schemas never get near this, it only guards hand-edited embeddings.
const MAX_DEPTH: usize = 128;

/// Failure to construct a validator from embedded schema JSON.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid embedded schema: {0}")]
    Parse(String),
    #[error("schema references unknown component `{0}`")]
    UnresolvedReference(String),
}

/// A structured validation failure. The request is rejected with this error
/// instead of reaching the handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed at {path}: expected {expected}, got {actual}")]
pub struct ValidationError {
    /// JSON-pointer-like location of the offending value, e.g. `$.body.name`
    pub path: String,
    pub expected: String,
    pub actual: String,
}

/// Validates request payloads against one route's schema.
#[derive(Debug, Clone)]
pub struct Validator {
    schema: SchemaNode,
    components: HashMap<String, SchemaNode>,
}

impl Validator {
    /// Builds a validator from the JSON forms embedded in generated code.
    ///
    /// Every reference in the schema and the component set must resolve;
    /// broken references are rejected here rather than at request time.
    pub fn from_json(schema_json: &str, components_json: &str) -> Result<Self, SchemaError> {
        let schema: SchemaNode =
            serde_json::from_str(schema_json).map_err(|e| SchemaError::Parse(e.to_string()))?;
        let components: HashMap<String, SchemaNode> = serde_json::from_str(components_json)
            .map_err(|e| SchemaError::Parse(e.to_string()))?;
        Self::new(schema, components)
    }

    pub fn new(
        schema: SchemaNode,
        components: HashMap<String, SchemaNode>,
    ) -> Result<Self, SchemaError> {
        let validator = Self { schema, components };
        validator.check_references(&validator.schema)?;
        for component in validator.components.values() {
            validator.check_references(component)?;
        }
        Ok(validator)
    }

    /// Validates a payload. On success the payload is untouched; no coercion
    /// or defaulting happens here.
    pub fn validate(&self, payload: &Value) -> Result<(), ValidationError> {
        self.check(&self.schema, payload, "$", 0)
    }

    fn check_references(&self, schema: &SchemaNode) -> Result<(), SchemaError> {
        match schema {
            SchemaNode::Reference(name) => {
                if !self.components.contains_key(name) {
                    return Err(SchemaError::UnresolvedReference(name.clone()));
                }
                Ok(())
            }
            SchemaNode::Object(obj) => {
                for prop in &obj.properties {
                    self.check_references(&prop.schema)?;
                }
                Ok(())
            }
            SchemaNode::Array(items) => self.check_references(items),
            SchemaNode::Union(alternatives) => {
                for alt in alternatives {
                    self.check_references(alt)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn check(
        &self,
        schema: &SchemaNode,
        value: &Value,
        path: &str,
        depth: usize,
    ) -> Result<(), ValidationError> {
        if depth > MAX_DEPTH {
            return Err(ValidationError {
                path: path.to_string(),
                expected: "schema recursion within bounds".to_string(),
                actual: "runaway reference chain".to_string(),
            });
        }
        match schema {
            SchemaNode::Primitive(p) => self.check_primitive(*p, value, path),
            SchemaNode::Enum(values) => match value.as_str() {
                Some(s) if values.iter().any(|v| v == s) => Ok(()),
                _ => Err(ValidationError {
                    path: path.to_string(),
                    expected: format!("one of {:?}", values),
                    actual: describe(value),
                }),
            },
            SchemaNode::Object(obj) => {
                let map = value.as_object().ok_or_else(|| ValidationError {
                    path: path.to_string(),
                    expected: "object".to_string(),
                    actual: describe(value),
                })?;
                for prop in &obj.properties {
                    let child_path = format!("{}.{}", path, prop.name);
                    match map.get(&prop.name) {
                        Some(child) => {
                            self.check(&prop.schema, child, &child_path, depth + 1)?;
                        }
                        None if prop.required => {
                            return Err(ValidationError {
                                path: child_path,
                                expected: "required property".to_string(),
                                actual: "missing".to_string(),
                            });
                        }
                        None => {}
                    }
                }
                Ok(())
            }
            SchemaNode::Array(items) => {
                let elements = value.as_array().ok_or_else(|| ValidationError {
                    path: path.to_string(),
                    expected: "array".to_string(),
                    actual: describe(value),
                })?;
                for (idx, element) in elements.iter().enumerate() {
                    let child_path = format!("{}[{}]", path, idx);
                    self.check(items, element, &child_path, depth + 1)?;
                }
                Ok(())
            }
            SchemaNode::Union(alternatives) => {
                for alt in alternatives {
                    if self.check(alt, value, path, depth + 1).is_ok() {
                        return Ok(());
                    }
                }
                Err(ValidationError {
                    path: path.to_string(),
                    expected: format!("one of {} alternatives", alternatives.len()),
                    actual: describe(value),
                })
            }
            SchemaNode::Reference(name) => {
                // Construction checked every reference, so the lookup holds.
                let target = self.components.get(name).ok_or_else(|| ValidationError {
                    path: path.to_string(),
                    expected: format!("schema `{}`", name),
                    actual: "unresolved reference".to_string(),
                })?;
                self.check(target, value, path, depth + 1)
            }
            // Unsupported shapes never block a request.
            SchemaNode::Unknown(_) => Ok(()),
        }
    }

    fn check_primitive(
        &self,
        primitive: Primitive,
        value: &Value,
        path: &str,
    ) -> Result<(), ValidationError> {
        let ok = match primitive {
            Primitive::String => value.is_string(),
            Primitive::Integer(_) => value.as_i64().is_some() || value.as_u64().is_some(),
            Primitive::Number(_) => value.is_number(),
            Primitive::Boolean => value.is_boolean(),
            Primitive::Null => value.is_null(),
        };
        if ok {
            Ok(())
        } else {
            let expected = match primitive {
                Primitive::String => "string",
                Primitive::Integer(_) => "integer",
                Primitive::Number(_) => "number",
                Primitive::Boolean => "boolean",
                Primitive::Null => "null",
            };
            Err(ValidationError {
                path: path.to_string(),
                expected: expected.to_string(),
                actual: describe(value),
            })
        }
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

/// How a handler value attaches itself to a registrar. The host application
/// implements this for its own handler shapes, mirroring the way web
/// frameworks bound their handler generics.
pub trait BindRoute<R> {
    fn bind(self, registrar: &mut R, method: &str, path: &str, validator: Validator);
}

/// Capability interface supplied by the surrounding application. The
/// generated registration source drives this to install every discovered
/// route with validation attached.
pub trait RouteRegistrar: Sized {
    fn register<H: BindRoute<Self>>(
        &mut self,
        method: &str,
        path: &str,
        handler: H,
        validator: Validator,
    ) {
        handler.bind(self, method, path, validator);
    }
}
