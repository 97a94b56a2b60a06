//! Generation of the route-registration source file.
//!
//! The emitted file registers every discovered route on the application's
//! [`RouteRegistrar`](crate::validation::RouteRegistrar), in extraction order
//! so the routing layer keeps first-match-wins semantics. Request schemas are
//! embedded as JSON string constants the validation runtime consumes
//! directly, with no re-resolution of source types at request time.

use crate::error::Error;
use crate::extractor::Route;
use crate::schema::{SchemaNode, SchemaRegistry};
use indexmap::IndexMap;
use log::debug;

/// Neutral contents written over a stale generated file before regeneration,
/// so other tooling never picks up half-written registrations mid-run.
pub const PLACEHOLDER: &str =
    "// @generated by contractgen -- regeneration in progress; do not import.\n";

pub struct RouteCodeGenerator;

impl RouteCodeGenerator {
    /// Renders the registration source for `routes`.
    ///
    /// Fails with [`Error::Generation`] if any handler is not `pub`, since
    /// generated code could not re-import it.
    pub fn generate(&self, routes: &[Route], registry: &SchemaRegistry) -> Result<String, Error> {
        for route in routes {
            if !route.handler.exported {
                return Err(Error::Generation {
                    method: route.method.as_str().to_string(),
                    path: route.path.clone(),
                    handler: route.handler.name.clone(),
                });
            }
        }

        let mut sorted: Vec<_> = registry.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        let components: IndexMap<&str, &SchemaNode> = sorted
            .into_iter()
            .map(|entry| (entry.name.as_str(), &entry.schema))
            .collect();
        let components_json = serde_json::to_string(&components)?;

        let mut out = String::new();
        out.push_str("// @generated by contractgen -- do not edit.\n");
        out.push_str("//\n");
        out.push_str("// Registers every discovered route with request validation attached.\n");
        out.push_str("// Regenerated from source on every pipeline run.\n\n");
        out.push_str("use contractgen::validation::{RouteRegistrar, SchemaError, Validator};\n\n");
        out.push_str("/// JSON-encoded component schemas shared by every route validator.\n");
        out.push_str(&format!(
            "pub const COMPONENT_SCHEMAS: &str = {};\n\n",
            raw_literal(&components_json)
        ));
        out.push_str("/// Registers all discovered routes, in declaration order.\n");
        out.push_str(
            "pub fn register_routes<R: RouteRegistrar>(registrar: &mut R) -> Result<(), SchemaError> {\n",
        );

        for route in routes {
            let request_schema = route
                .request_schema
                .clone()
                .unwrap_or_else(|| SchemaNode::Unknown(String::new()));
            let schema_json = serde_json::to_string(&request_schema)?;
            out.push_str("    registrar.register(\n");
            out.push_str(&format!("        {:?},\n", route.method.as_str()));
            out.push_str(&format!("        {:?},\n", route.path));
            out.push_str(&format!(
                "        {}::{},\n",
                route.handler.module_path, route.handler.name
            ));
            out.push_str(&format!(
                "        Validator::from_json({}, COMPONENT_SCHEMAS)?,\n",
                raw_literal(&schema_json)
            ));
            out.push_str("    );\n");
        }

        out.push_str("    Ok(())\n");
        out.push_str("}\n");

        debug!("generated registration source for {} route(s)", routes.len());
        Ok(out)
    }
}

/// Renders a raw string literal with enough `#` marks to contain `text`.
fn raw_literal(text: &str) -> String {
    let mut hashes = 1;
    while text.contains(&format!("\"{}", "#".repeat(hashes))) {
        hashes += 1;
    }
    let guard = "#".repeat(hashes);
    format!("r{guard}\"{text}\"{guard}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{HandlerRef, HttpMethod};
    use crate::schema::{ObjectSchema, Primitive, PropertySchema};
    use crate::validation::Validator;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn route(method: HttpMethod, path: &str, handler: &str, exported: bool) -> Route {
        Route {
            method,
            path: path.to_string(),
            request_schema: Some(SchemaNode::Object(ObjectSchema {
                properties: vec![PropertySchema {
                    name: "id".to_string(),
                    schema: SchemaNode::Primitive(Primitive::String),
                    required: true,
                }],
            })),
            response_schema: None,
            handler: HandlerRef {
                name: handler.to_string(),
                file: PathBuf::from("src/api.rs"),
                module_path: "crate::api".to_string(),
                exported,
            },
            description: None,
        }
    }

    #[test]
    fn zero_routes_generate_an_empty_registration() {
        let generator = RouteCodeGenerator;
        let source = generator.generate(&[], &SchemaRegistry::new()).unwrap();

        assert!(source.contains("pub fn register_routes"));
        assert!(!source.contains("registrar.register("));
        assert!(source.contains("Ok(())"));
    }

    #[test]
    fn routes_are_emitted_in_extraction_order() {
        let generator = RouteCodeGenerator;
        let routes = vec![
            route(HttpMethod::Post, "/users", "create_user", true),
            route(HttpMethod::Get, "/users/{id}", "get_user", true),
        ];
        let source = generator.generate(&routes, &SchemaRegistry::new()).unwrap();

        let create = source.find("crate::api::create_user").unwrap();
        let get = source.find("crate::api::get_user").unwrap();
        assert!(
            create < get,
            "registration order must follow extraction order"
        );
    }

    #[test]
    fn private_handler_is_a_generation_error() {
        let generator = RouteCodeGenerator;
        let routes = vec![route(HttpMethod::Get, "/internal", "hidden", false)];
        let err = generator
            .generate(&routes, &SchemaRegistry::new())
            .unwrap_err();

        match err {
            Error::Generation { handler, path, .. } => {
                assert_eq!(handler, "hidden");
                assert_eq!(path, "/internal");
            }
            other => panic!("expected generation error, got {:?}", other),
        }
    }

    #[test]
    fn embedded_schemas_are_consumable_by_the_validator() {
        let generator = RouteCodeGenerator;
        let routes = vec![route(HttpMethod::Get, "/users/{id}", "get_user", true)];
        let source = generator.generate(&routes, &SchemaRegistry::new()).unwrap();

        // Pull the embedded schema literal back out and feed it to the
        // runtime, the way generated code does at startup.
        let start = source.find("Validator::from_json(r#\"").unwrap() + "Validator::from_json(r#\"".len();
        let end = source[start..].find("\"#").unwrap() + start;
        let schema_json = &source[start..end];

        let validator = Validator::from_json(schema_json, "{}").unwrap();
        assert!(validator
            .validate(&serde_json::json!({"id": "u-1"}))
            .is_ok());
        assert!(validator.validate(&serde_json::json!({})).is_err());
    }

    #[test]
    fn component_constant_holds_all_registry_entries() {
        use crate::analyzer::TypeKey;
        let mut registry = SchemaRegistry::new();
        let key = TypeKey::Decl {
            decl: 0,
            args: vec![],
        };
        registry.reserve(key.clone(), "User");
        registry.fill(&key, SchemaNode::Primitive(Primitive::String));

        let generator = RouteCodeGenerator;
        let source = generator.generate(&[], &registry).unwrap();

        assert!(source.contains("pub const COMPONENT_SCHEMAS"));
        assert!(source.contains(r#""User":{"type":"string"}"#));
    }

    #[test]
    fn raw_literal_escapes_embedded_quotes() {
        let literal = raw_literal(r#"{"a":"b"}"#);
        assert_eq!(literal, r##"r#"{"a":"b"}"#"##);

        let tricky = raw_literal(r##"contains "# inside"##);
        assert!(tricky.starts_with("r##\""));
    }
}
