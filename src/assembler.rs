//! OpenAPI document assembly.
//!
//! Assembly is deterministic: routes are stably sorted by method then path,
//! every map in the document keeps a defined order, and component schemas are
//! emitted alphabetically. Identical inputs therefore serialize to
//! byte-identical output.

use crate::config::DocumentMetadata;
use crate::error::Error;
use crate::extractor::{template_params, HttpMethod, Route, BODY_PROPERTY};
use crate::schema::{SchemaNode, SchemaRegistry};
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

const OPENAPI_VERSION: &str = "3.0.3";
const JSON_CONTENT_TYPE: &str = "application/json";

/// The assembled contract document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub openapi: String,
    pub info: Info,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub servers: Vec<Server>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub security: Vec<IndexMap<String, Vec<String>>>,
    pub paths: IndexMap<String, PathItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Info {
    pub title: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub url: String,
}

/// All operations registered under one path template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<Operation>,
}

impl PathItem {
    fn slot(&mut self, method: HttpMethod) -> &mut Option<Operation> {
        match method {
            HttpMethod::Get => &mut self.get,
            HttpMethod::Post => &mut self.post,
            HttpMethod::Put => &mut self.put,
            HttpMethod::Delete => &mut self.delete,
            HttpMethod::Patch => &mut self.patch,
            HttpMethod::Options => &mut self.options,
            HttpMethod::Head => &mut self.head,
        }
    }

    /// Operation for a method, if registered.
    pub fn operation(&self, method: HttpMethod) -> Option<&Operation> {
        match method {
            HttpMethod::Get => self.get.as_ref(),
            HttpMethod::Post => self.post.as_ref(),
            HttpMethod::Put => self.put.as_ref(),
            HttpMethod::Delete => self.delete.as_ref(),
            HttpMethod::Patch => self.patch.as_ref(),
            HttpMethod::Options => self.options.as_ref(),
            HttpMethod::Head => self.head.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "operationId", skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<Parameter>>,
    #[serde(rename = "requestBody", skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    pub responses: IndexMap<String, Response>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: String,
    pub required: bool,
    pub schema: SchemaNode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestBody {
    pub required: bool,
    pub content: IndexMap<String, MediaType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaType {
    pub schema: SchemaNode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<IndexMap<String, MediaType>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Components {
    pub schemas: IndexMap<String, SchemaNode>,
}

/// Merges routes, registry entries and caller metadata into one [`Document`].
pub struct OpenApiAssembler<'a> {
    metadata: &'a DocumentMetadata,
}

impl<'a> OpenApiAssembler<'a> {
    pub fn new(metadata: &'a DocumentMetadata) -> Self {
        Self { metadata }
    }

    pub fn assemble(
        &self,
        routes: &[Route],
        registry: &SchemaRegistry,
    ) -> Result<Document, Error> {
        let mut sorted: Vec<&Route> = routes.iter().collect();
        sorted.sort_by(|a, b| {
            a.method
                .as_str()
                .cmp(b.method.as_str())
                .then_with(|| a.path.cmp(&b.path))
        });

        let mut paths: IndexMap<String, PathItem> = IndexMap::new();
        for route in sorted {
            let operation = self.operation(route)?;
            let item = paths.entry(route.path.clone()).or_default();
            *item.slot(route.method) = Some(operation);
        }

        let components = if registry.is_empty() {
            None
        } else {
            let mut entries: Vec<_> = registry.iter().collect();
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            let schemas = entries
                .into_iter()
                .map(|entry| (entry.name.clone(), entry.schema.clone()))
                .collect();
            Some(Components { schemas })
        };

        debug!(
            "assembled document with {} path(s), {} component schema(s)",
            paths.len(),
            registry.len()
        );

        Ok(Document {
            openapi: OPENAPI_VERSION.to_string(),
            info: Info {
                title: self.metadata.title.clone(),
                version: self.metadata.version.clone(),
                description: self.metadata.description.clone(),
            },
            servers: self
                .metadata
                .servers
                .iter()
                .map(|url| Server { url: url.clone() })
                .collect(),
            security: self
                .metadata
                .security
                .iter()
                .map(|scheme| {
                    let mut requirement = IndexMap::new();
                    requirement.insert(scheme.clone(), Vec::new());
                    requirement
                })
                .collect(),
            paths,
            components,
        })
    }

    /// Builds one operation, splitting the logical request object back into
    /// path parameters, query parameters and the request body.
    fn operation(&self, route: &Route) -> Result<Operation, Error> {
        let template = template_params(&route.path);
        let mut parameters = Vec::new();
        let mut request_body = None;

        match &route.request_schema {
            Some(SchemaNode::Object(request)) => {
                for param in &template {
                    let prop = request.property(param).ok_or_else(|| Error::Assembly {
                        method: route.method.as_str().to_string(),
                        path: route.path.clone(),
                        param: param.clone(),
                    })?;
                    parameters.push(Parameter {
                        name: prop.name.clone(),
                        location: "path".to_string(),
                        required: true,
                        schema: prop.schema.clone(),
                    });
                }
                for prop in &request.properties {
                    if template.iter().any(|t| t == &prop.name) {
                        continue;
                    }
                    if prop.name == BODY_PROPERTY {
                        request_body = Some(RequestBody {
                            required: prop.required,
                            content: json_content(prop.schema.clone()),
                        });
                        continue;
                    }
                    parameters.push(Parameter {
                        name: prop.name.clone(),
                        location: "query".to_string(),
                        required: prop.required,
                        schema: prop.schema.clone(),
                    });
                }
            }
            Some(other) => {
                // A non-object request schema can only be a body.
                request_body = Some(RequestBody {
                    required: true,
                    content: json_content(other.clone()),
                });
            }
            None => {
                if let Some(param) = template.first() {
                    return Err(Error::Assembly {
                        method: route.method.as_str().to_string(),
                        path: route.path.clone(),
                        param: param.clone(),
                    });
                }
            }
        }

        let mut responses = IndexMap::new();
        responses.insert(
            "200".to_string(),
            Response {
                description: "Successful response".to_string(),
                content: route
                    .response_schema
                    .as_ref()
                    .map(|schema| json_content(schema.clone())),
            },
        );

        Ok(Operation {
            summary: Some(format!("{} {}", route.method.as_str(), route.path)),
            description: route.description.clone(),
            operation_id: Some(route.handler.name.clone()),
            parameters: if parameters.is_empty() {
                None
            } else {
                Some(parameters)
            },
            request_body,
            responses,
        })
    }
}

fn json_content(schema: SchemaNode) -> IndexMap<String, MediaType> {
    let mut content = IndexMap::new();
    content.insert(JSON_CONTENT_TYPE.to_string(), MediaType { schema });
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::HandlerRef;
    use crate::schema::{ObjectSchema, Primitive, PropertySchema};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn handler(name: &str) -> HandlerRef {
        HandlerRef {
            name: name.to_string(),
            file: PathBuf::from("src/main.rs"),
            module_path: "crate".to_string(),
            exported: true,
        }
    }

    fn route(method: HttpMethod, path: &str) -> Route {
        Route {
            method,
            path: path.to_string(),
            request_schema: None,
            response_schema: None,
            handler: handler("handler_fn"),
            description: None,
        }
    }

    fn request_object(props: Vec<(&str, SchemaNode, bool)>) -> SchemaNode {
        SchemaNode::Object(ObjectSchema {
            properties: props
                .into_iter()
                .map(|(name, schema, required)| PropertySchema {
                    name: name.to_string(),
                    schema,
                    required,
                })
                .collect(),
        })
    }

    #[test]
    fn empty_input_yields_empty_paths_and_no_components() {
        let metadata = DocumentMetadata::default();
        let assembler = OpenApiAssembler::new(&metadata);
        let document = assembler.assemble(&[], &SchemaRegistry::new()).unwrap();

        assert!(document.paths.is_empty());
        assert!(document.components.is_none());
        assert_eq!(document.openapi, OPENAPI_VERSION);
    }

    #[test]
    fn routes_are_sorted_by_method_then_path() {
        let metadata = DocumentMetadata::default();
        let assembler = OpenApiAssembler::new(&metadata);
        let routes = vec![
            route(HttpMethod::Post, "/b"),
            route(HttpMethod::Get, "/b"),
            route(HttpMethod::Get, "/a"),
        ];

        let document = assembler.assemble(&routes, &SchemaRegistry::new()).unwrap();

        let keys: Vec<_> = document.paths.keys().cloned().collect();
        assert_eq!(keys, vec!["/a".to_string(), "/b".to_string()]);
    }

    #[test]
    fn path_parameters_are_matched_by_name() {
        let metadata = DocumentMetadata::default();
        let assembler = OpenApiAssembler::new(&metadata);
        let mut r = route(HttpMethod::Get, "/users/{id}");
        r.request_schema = Some(request_object(vec![
            ("id", SchemaNode::Primitive(Primitive::String), true),
            ("verbose", SchemaNode::Primitive(Primitive::Boolean), false),
        ]));

        let document = assembler.assemble(&[r], &SchemaRegistry::new()).unwrap();

        let operation = document.paths["/users/{id}"].get.as_ref().unwrap();
        let parameters = operation.parameters.as_ref().unwrap();
        assert_eq!(parameters.len(), 2);
        assert_eq!(parameters[0].name, "id");
        assert_eq!(parameters[0].location, "path");
        assert!(parameters[0].required);
        assert_eq!(parameters[1].name, "verbose");
        assert_eq!(parameters[1].location, "query");
        assert!(!parameters[1].required);
    }

    #[test]
    fn missing_path_parameter_is_an_assembly_error() {
        let metadata = DocumentMetadata::default();
        let assembler = OpenApiAssembler::new(&metadata);
        let mut r = route(HttpMethod::Get, "/users/{id}");
        r.request_schema = Some(request_object(vec![(
            "other",
            SchemaNode::Primitive(Primitive::String),
            true,
        )]));

        let err = assembler.assemble(&[r], &SchemaRegistry::new()).unwrap_err();
        match err {
            Error::Assembly { param, path, .. } => {
                assert_eq!(param, "id");
                assert_eq!(path, "/users/{id}");
            }
            other => panic!("expected assembly error, got {:?}", other),
        }
    }

    #[test]
    fn body_property_becomes_request_body() {
        let metadata = DocumentMetadata::default();
        let assembler = OpenApiAssembler::new(&metadata);
        let mut r = route(HttpMethod::Post, "/users");
        r.request_schema = Some(request_object(vec![(
            BODY_PROPERTY,
            SchemaNode::Reference("CreateUser".to_string()),
            true,
        )]));

        let document = assembler.assemble(&[r], &SchemaRegistry::new()).unwrap();

        let operation = document.paths["/users"].post.as_ref().unwrap();
        assert!(operation.parameters.is_none());
        let body = operation.request_body.as_ref().unwrap();
        assert!(body.required);
        assert_eq!(
            body.content["application/json"].schema,
            SchemaNode::Reference("CreateUser".to_string())
        );
    }

    #[test]
    fn response_schema_lands_on_the_default_success_response() {
        let metadata = DocumentMetadata::default();
        let assembler = OpenApiAssembler::new(&metadata);
        let mut r = route(HttpMethod::Get, "/users");
        r.response_schema = Some(SchemaNode::Reference("User".to_string()));

        let document = assembler.assemble(&[r], &SchemaRegistry::new()).unwrap();

        let operation = document.paths["/users"].get.as_ref().unwrap();
        let response = &operation.responses["200"];
        let content = response.content.as_ref().unwrap();
        assert_eq!(
            content["application/json"].schema,
            SchemaNode::Reference("User".to_string())
        );
    }

    #[test]
    fn metadata_is_carried_into_the_document() {
        let metadata = DocumentMetadata {
            title: "Inventory API".to_string(),
            version: "2.1.0".to_string(),
            description: Some("Warehouse endpoints".to_string()),
            servers: vec!["https://api.example.com".to_string()],
            security: vec!["bearerAuth".to_string()],
        };
        let assembler = OpenApiAssembler::new(&metadata);
        let document = assembler.assemble(&[], &SchemaRegistry::new()).unwrap();

        assert_eq!(document.info.title, "Inventory API");
        assert_eq!(document.servers[0].url, "https://api.example.com");
        assert_eq!(document.security[0].keys().next().unwrap(), "bearerAuth");
    }

    #[test]
    fn assembly_is_deterministic() {
        let metadata = DocumentMetadata::default();
        let assembler = OpenApiAssembler::new(&metadata);
        let mut r1 = route(HttpMethod::Get, "/users/{id}");
        r1.request_schema = Some(request_object(vec![(
            "id",
            SchemaNode::Primitive(Primitive::String),
            true,
        )]));
        let r2 = route(HttpMethod::Post, "/users");
        let routes = vec![r1, r2];

        let first = assembler.assemble(&routes, &SchemaRegistry::new()).unwrap();
        let second = assembler.assemble(&routes, &SchemaRegistry::new()).unwrap();

        let a = serde_json::to_string(&first).unwrap();
        let b = serde_json::to_string(&second).unwrap();
        assert_eq!(a, b, "identical input must serialize identically");
    }

    #[test]
    fn component_schemas_are_sorted_by_name() {
        use crate::analyzer::TypeKey;
        let metadata = DocumentMetadata::default();
        let assembler = OpenApiAssembler::new(&metadata);

        let mut registry = SchemaRegistry::new();
        let zebra = TypeKey::Decl {
            decl: 0,
            args: vec![],
        };
        let apple = TypeKey::Decl {
            decl: 1,
            args: vec![],
        };
        registry.reserve(zebra.clone(), "Zebra");
        registry.fill(&zebra, SchemaNode::Primitive(Primitive::String));
        registry.reserve(apple.clone(), "Apple");
        registry.fill(&apple, SchemaNode::Primitive(Primitive::Boolean));

        let document = assembler.assemble(&[], &registry).unwrap();
        let names: Vec<_> = document
            .components
            .unwrap()
            .schemas
            .keys()
            .cloned()
            .collect();
        assert_eq!(names, vec!["Apple".to_string(), "Zebra".to_string()]);
    }
}
