//! Route discovery.
//!
//! Walks every parsed source file looking for functions carrying the
//! `#[route(METHOD, "/path")]` annotation, resolves the declared
//! request/response types and composes the logical request schema. One
//! unresolvable route is recorded and skipped; it never aborts discovery of
//! the rest.

use crate::analyzer::{ProgramAnalyzer, ResolvedType};
use crate::error::{Error, TypeResolutionError};
use crate::schema::{ObjectSchema, PropertySchema, Primitive, SchemaNode, SchemaRegistry};
use crate::synthesizer::SchemaSynthesizer;
use log::{debug, warn};
use std::collections::HashMap;
use std::path::Path;
use syn::parse::{Parse, ParseStream};

/// Property name under which the request body schema is composed into the
/// logical request object.
pub const BODY_PROPERTY: &str = "body";

/// HTTP verbs recognized by the route annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
        }
    }

    fn from_ident(ident: &str) -> Option<Self> {
        match ident.to_ascii_lowercase().as_str() {
            "get" => Some(HttpMethod::Get),
            "post" => Some(HttpMethod::Post),
            "put" => Some(HttpMethod::Put),
            "delete" => Some(HttpMethod::Delete),
            "patch" => Some(HttpMethod::Patch),
            "options" => Some(HttpMethod::Options),
            "head" => Some(HttpMethod::Head),
            _ => None,
        }
    }

    /// Whether the verb conventionally carries a request body.
    pub fn allows_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

/// Reference back to the handler declaration, used for code generation.
#[derive(Debug, Clone)]
pub struct HandlerRef {
    pub name: String,
    pub file: std::path::PathBuf,
    /// Import path relative to the analyzed crate root, e.g. `crate::api::users`
    pub module_path: String,
    pub exported: bool,
}

/// A discovered route with its synthesized schemas.
#[derive(Debug, Clone)]
pub struct Route {
    pub method: HttpMethod,
    pub path: String,
    pub request_schema: Option<SchemaNode>,
    pub response_schema: Option<SchemaNode>,
    pub handler: HandlerRef,
    pub description: Option<String>,
}

/// Outcome of route discovery: usable routes plus the per-route failures that
/// excluded the rest.
#[derive(Debug)]
pub struct ExtractionResult {
    pub routes: Vec<Route>,
    pub excluded: Vec<TypeResolutionError>,
}

/// Parsed `#[route(METHOD, "/path")]` arguments.
struct RouteArgs {
    method: syn::Ident,
    path: syn::LitStr,
}

impl Parse for RouteArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let method = input.parse()?;
        input.parse::<syn::Token![,]>()?;
        let path = input.parse()?;
        Ok(RouteArgs { method, path })
    }
}

pub struct RouteExtractor<'a> {
    analyzer: &'a ProgramAnalyzer,
    allow_duplicates: bool,
}

impl<'a> RouteExtractor<'a> {
    pub fn new(analyzer: &'a ProgramAnalyzer, allow_duplicates: bool) -> Self {
        Self {
            analyzer,
            allow_duplicates,
        }
    }

    /// Extracts every annotated route in declaration-encounter order.
    ///
    /// Duplicate method+path pairs are fatal unless the extractor was
    /// configured to keep the first declaration.
    pub fn extract(&self, registry: &mut SchemaRegistry) -> Result<ExtractionResult, Error> {
        let synthesizer = SchemaSynthesizer::new(self.analyzer);
        let mut routes = Vec::new();
        let mut excluded = Vec::new();
        let mut seen: HashMap<(HttpMethod, String), (String, String)> = HashMap::new();

        for (file_idx, source) in self.analyzer.sources().iter().enumerate() {
            let mut mods = Vec::new();
            self.walk_items(
                &source.ast.items,
                file_idx,
                &mut mods,
                &synthesizer,
                registry,
                &mut seen,
                &mut routes,
                &mut excluded,
            )?;
        }

        debug!(
            "extracted {} route(s), {} excluded",
            routes.len(),
            excluded.len()
        );
        Ok(ExtractionResult { routes, excluded })
    }

    #[allow(clippy::too_many_arguments)]
    fn walk_items(
        &self,
        items: &[syn::Item],
        file_idx: usize,
        mods: &mut Vec<String>,
        synthesizer: &SchemaSynthesizer<'_>,
        registry: &mut SchemaRegistry,
        seen: &mut HashMap<(HttpMethod, String), (String, String)>,
        routes: &mut Vec<Route>,
        excluded: &mut Vec<TypeResolutionError>,
    ) -> Result<(), Error> {
        for item in items {
            match item {
                syn::Item::Fn(item_fn) => {
                    self.examine_fn(
                        item_fn,
                        file_idx,
                        mods,
                        synthesizer,
                        registry,
                        seen,
                        routes,
                        excluded,
                    )?;
                }
                syn::Item::Mod(module) => {
                    if let Some((_, nested)) = &module.content {
                        mods.push(module.ident.to_string());
                        self.walk_items(
                            nested,
                            file_idx,
                            mods,
                            synthesizer,
                            registry,
                            seen,
                            routes,
                            excluded,
                        )?;
                        mods.pop();
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn examine_fn(
        &self,
        item_fn: &syn::ItemFn,
        file_idx: usize,
        mods: &[String],
        synthesizer: &SchemaSynthesizer<'_>,
        registry: &mut SchemaRegistry,
        seen: &mut HashMap<(HttpMethod, String), (String, String)>,
        routes: &mut Vec<Route>,
        excluded: &mut Vec<TypeResolutionError>,
    ) -> Result<(), Error> {
        let file_path = self.analyzer.source_path(file_idx);
        let (method, path) = match route_annotation(item_fn, file_path) {
            Some(found) => found,
            None => return Ok(()),
        };

        let handler_name = item_fn.sig.ident.to_string();
        let file_display = file_path.display().to_string();

        // Duplicate detection happens at discovery, before any type work, so
        // a conflict is reported even when one of the declarations would
        // later be excluded.
        if let Some((first, first_file)) = seen.get(&(method, path.clone())) {
            if self.allow_duplicates {
                warn!(
                    "duplicate route {} {}: keeping `{}`, ignoring `{}`",
                    method.as_str(),
                    path,
                    first,
                    handler_name
                );
                return Ok(());
            }
            return Err(Error::RouteConflict {
                method: method.as_str().to_string(),
                path,
                first: first.clone(),
                first_file: first_file.clone(),
                second: handler_name,
                second_file: file_display,
            });
        }
        seen.insert(
            (method, path.clone()),
            (handler_name.clone(), file_display.clone()),
        );

        let handler = HandlerRef {
            name: handler_name.clone(),
            file: file_path.to_path_buf(),
            module_path: module_path(self.analyzer.root(), file_path, mods),
            exported: matches!(item_fn.vis, syn::Visibility::Public(_)),
        };

        let request_schema =
            match self.compose_request(item_fn, method, &path, synthesizer, registry) {
                Ok(schema) => schema,
                Err(type_name) => {
                    excluded.push(TypeResolutionError {
                        method: method.as_str().to_string(),
                        path,
                        handler: handler_name,
                        file: file_display,
                        type_name,
                    });
                    return Ok(());
                }
            };

        let response_schema = match self.response_schema(&item_fn.sig, synthesizer, registry) {
            Ok(schema) => schema,
            Err(type_name) => {
                excluded.push(TypeResolutionError {
                    method: method.as_str().to_string(),
                    path,
                    handler: handler_name,
                    file: file_display,
                    type_name,
                });
                return Ok(());
            }
        };

        debug!("discovered route {} {}", method.as_str(), path);
        routes.push(Route {
            method,
            path,
            request_schema,
            response_schema,
            handler,
            description: doc_comment(&item_fn.attrs),
        });
        Ok(())
    }

    /// Composes path, query and body type sites into one logical request
    /// object. Returns the unresolvable type name on failure.
    fn compose_request(
        &self,
        item_fn: &syn::ItemFn,
        method: HttpMethod,
        path: &str,
        synthesizer: &SchemaSynthesizer<'_>,
        registry: &mut SchemaRegistry,
    ) -> Result<Option<SchemaNode>, String> {
        let template_params = template_params(path);
        let mut path_props: Vec<PropertySchema> = Vec::new();
        let mut query_props: Vec<PropertySchema> = Vec::new();
        let mut body_prop: Option<PropertySchema> = None;

        for input in &item_fn.sig.inputs {
            let pat_type = match input {
                syn::FnArg::Typed(pat_type) => pat_type,
                syn::FnArg::Receiver(_) => continue,
            };
            let (wrapper, inner_ty) = match wrapper_type(&pat_type.ty) {
                Some(found) => found,
                None => continue,
            };
            let resolved = self
                .analyzer
                .resolve(inner_ty)
                .map_err(|failure| failure.type_name)?;

            match wrapper {
                Wrapper::Path => {
                    if let Some(props) = synthesizer.object_properties(&resolved, registry) {
                        path_props = props;
                    } else if template_params.len() == 1 {
                        let schema = synthesizer.synthesize(&resolved, registry);
                        path_props = vec![PropertySchema {
                            name: template_params[0].clone(),
                            schema,
                            required: true,
                        }];
                    } else {
                        warn!(
                            "handler `{}`: Path<..> binds a non-object type to {} template parameter(s)",
                            item_fn.sig.ident,
                            template_params.len()
                        );
                    }
                }
                Wrapper::Query => {
                    match synthesizer.object_properties(&resolved, registry) {
                        Some(props) => query_props = props,
                        None => warn!(
                            "handler `{}`: Query<..> requires an object-like type",
                            item_fn.sig.ident
                        ),
                    }
                }
                Wrapper::Json => {
                    let (inner, optional) = resolved.unwrap_optional();
                    if !method.allows_body() {
                        warn!(
                            "handler `{}`: {} carries a request body",
                            item_fn.sig.ident,
                            method.as_str()
                        );
                    }
                    body_prop = Some(PropertySchema {
                        name: BODY_PROPERTY.to_string(),
                        schema: synthesizer.synthesize(inner, registry),
                        required: !optional,
                    });
                }
            }
        }

        let mut properties: Vec<PropertySchema> = Vec::new();
        // Template parameters first, in template order; declared Path fields
        // supply their schemas, anything undeclared defaults to string.
        for param in &template_params {
            let prop = path_props
                .iter()
                .find(|p| &p.name == param)
                .cloned()
                .unwrap_or_else(|| PropertySchema {
                    name: param.clone(),
                    schema: SchemaNode::Primitive(Primitive::String),
                    required: true,
                });
            properties.push(PropertySchema {
                required: true,
                ..prop
            });
        }
        for prop in query_props {
            if properties.iter().any(|p| p.name == prop.name) {
                warn!(
                    "handler `{}`: query parameter `{}` shadows a path parameter",
                    item_fn.sig.ident, prop.name
                );
                continue;
            }
            properties.push(prop);
        }
        if let Some(body) = body_prop {
            properties.push(body);
        }

        if properties.is_empty() {
            Ok(None)
        } else {
            Ok(Some(SchemaNode::Object(ObjectSchema { properties })))
        }
    }

    /// Response shape from the handler's return type. Opaque returns
    /// (`impl Trait`, no return type) yield an absent schema.
    fn response_schema(
        &self,
        sig: &syn::Signature,
        synthesizer: &SchemaSynthesizer<'_>,
        registry: &mut SchemaRegistry,
    ) -> Result<Option<SchemaNode>, String> {
        let ty = match &sig.output {
            syn::ReturnType::Default => return Ok(None),
            syn::ReturnType::Type(_, ty) => ty,
        };
        let payload = match response_payload(ty) {
            Some(payload) => payload,
            None => return Ok(None),
        };
        let resolved = self
            .analyzer
            .resolve(payload)
            .map_err(|failure| failure.type_name)?;
        let (inner, _) = resolved.unwrap_optional();
        if matches!(inner, ResolvedType::Primitive(Primitive::Null)) {
            return Ok(None);
        }
        Ok(Some(synthesizer.synthesize(inner, registry)))
    }
}

enum Wrapper {
    Path,
    Query,
    Json,
}

/// Recognizes the `Path<T>` / `Query<T>` / `Json<T>` extractor wrappers on a
/// handler parameter.
fn wrapper_type(ty: &syn::Type) -> Option<(Wrapper, &syn::Type)> {
    let type_path = match ty {
        syn::Type::Path(type_path) => type_path,
        _ => return None,
    };
    let segment = type_path.path.segments.last()?;
    let wrapper = match segment.ident.to_string().as_str() {
        "Path" => Wrapper::Path,
        "Query" => Wrapper::Query,
        "Json" => Wrapper::Json,
        _ => return None,
    };
    let args = match &segment.arguments {
        syn::PathArguments::AngleBracketed(args) => args,
        _ => return None,
    };
    match args.args.first()? {
        syn::GenericArgument::Type(inner) => Some((wrapper, inner)),
        _ => None,
    }
}

/// Unwraps the payload type out of a handler return type: peels `Json<T>`,
/// the Ok side of `Result<T, E>`, and searches tuple returns like
/// `(StatusCode, Json<T>)`. Opaque shapes yield `None`.
fn response_payload(ty: &syn::Type) -> Option<&syn::Type> {
    match ty {
        syn::Type::Path(type_path) => {
            let segment = type_path.path.segments.last()?;
            let name = segment.ident.to_string();
            match name.as_str() {
                "Json" => match &segment.arguments {
                    syn::PathArguments::AngleBracketed(args) => match args.args.first()? {
                        syn::GenericArgument::Type(inner) => Some(inner),
                        _ => None,
                    },
                    _ => None,
                },
                "Result" => match &segment.arguments {
                    syn::PathArguments::AngleBracketed(args) => match args.args.first()? {
                        syn::GenericArgument::Type(ok) => response_payload(ok),
                        _ => None,
                    },
                    _ => None,
                },
                _ => Some(ty),
            }
        }
        syn::Type::Tuple(tuple) => tuple.elems.iter().find_map(|elem| {
            let candidate = response_payload(elem)?;
            // Only a Json element of the tuple is the payload.
            if std::ptr::eq(candidate, elem) {
                None
            } else {
                Some(candidate)
            }
        }),
        syn::Type::Reference(reference) => response_payload(&reference.elem),
        _ => None,
    }
}

/// Finds the `#[route(...)]` annotation on a function, if any. Malformed
/// annotations are reported and skipped.
fn route_annotation(item_fn: &syn::ItemFn, file: &Path) -> Option<(HttpMethod, String)> {
    for attr in &item_fn.attrs {
        if !attr.path().is_ident("route") {
            continue;
        }
        let args: RouteArgs = match attr.parse_args() {
            Ok(args) => args,
            Err(e) => {
                warn!(
                    "{}: malformed route annotation on `{}`: {}",
                    file.display(),
                    item_fn.sig.ident,
                    e
                );
                return None;
            }
        };
        match HttpMethod::from_ident(&args.method.to_string()) {
            Some(method) => return Some((method, args.path.value())),
            None => {
                warn!(
                    "{}: unknown HTTP method `{}` on `{}`",
                    file.display(),
                    args.method,
                    item_fn.sig.ident
                );
                return None;
            }
        }
    }
    None
}

/// Joined `///` doc-comment lines of a handler, used as the operation
/// description.
fn doc_comment(attrs: &[syn::Attribute]) -> Option<String> {
    let mut lines = Vec::new();
    for attr in attrs {
        if !attr.path().is_ident("doc") {
            continue;
        }
        if let syn::Meta::NameValue(meta) = &attr.meta {
            if let syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Str(lit),
                ..
            }) = &meta.value
            {
                lines.push(lit.value().trim().to_string());
            }
        }
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Named parameters of a URL template, in order of appearance.
pub fn template_params(path: &str) -> Vec<String> {
    path.split('/')
        .filter_map(|segment| {
            segment
                .strip_prefix('{')
                .and_then(|rest| rest.strip_suffix('}'))
                .map(str::to_string)
        })
        .collect()
}

/// Import path of a source file relative to the analyzed crate root, plus
/// any inline modules wrapping the declaration.
fn module_path(root: &Path, file: &Path, inline_mods: &[String]) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    let mut segments: Vec<String> = Vec::new();
    let components: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();

    for (idx, component) in components.iter().enumerate() {
        let is_last = idx + 1 == components.len();
        if idx == 0 && component == "src" {
            continue;
        }
        if is_last {
            let stem = component.trim_end_matches(".rs");
            if stem != "main" && stem != "lib" && stem != "mod" {
                segments.push(stem.to_string());
            }
        } else {
            segments.push(component.clone());
        }
    }
    segments.extend(inline_mods.iter().cloned());

    if segments.is_empty() {
        "crate".to_string()
    } else {
        format!("crate::{}", segments.join("::"))
    }
}
