//! Conversion of resolved types into canonical schema trees.
//!
//! The synthesizer is stateless; all accumulation happens in the
//! [`SchemaRegistry`] passed to each call. A declared type is registered
//! under its name *before* its children are synthesized, which is what makes
//! self-referential types terminate: the recursive occurrence finds the
//! reserved entry and becomes a [`SchemaNode::Reference`].

use crate::analyzer::{bind_generics, type_text, DeclKind, ProgramAnalyzer, ResolvedType};
use crate::schema::{ObjectSchema, PropertySchema, Primitive, SchemaNode, SchemaRegistry};
use log::warn;
use std::collections::HashMap;

pub struct SchemaSynthesizer<'a> {
    analyzer: &'a ProgramAnalyzer,
}

impl<'a> SchemaSynthesizer<'a> {
    pub fn new(analyzer: &'a ProgramAnalyzer) -> Self {
        Self { analyzer }
    }

    /// Synthesizes the schema for a resolved type.
    ///
    /// Declaration-backed types always come back as a [`SchemaNode::Reference`]
    /// into the registry; each distinct type identity is expanded at most once
    /// per registry lifetime.
    pub fn synthesize(&self, ty: &ResolvedType, registry: &mut SchemaRegistry) -> SchemaNode {
        match ty {
            ResolvedType::Primitive(p) => SchemaNode::Primitive(*p),
            // Optionality is expressed on the surrounding property's
            // `required` flag, not in the schema itself.
            ResolvedType::Optional(inner) => self.synthesize(inner, registry),
            ResolvedType::List(inner) => {
                SchemaNode::Array(Box::new(self.synthesize(inner, registry)))
            }
            ResolvedType::Unsupported(text) => {
                warn!("type `{}` is outside the supported grammar", text);
                SchemaNode::Unknown(text.clone())
            }
            ResolvedType::Declared { .. } => self.synthesize_declared(ty, registry),
        }
    }

    fn synthesize_declared(
        &self,
        ty: &ResolvedType,
        registry: &mut SchemaRegistry,
    ) -> SchemaNode {
        let (decl, args) = match ty {
            ResolvedType::Declared { decl, args } => (*decl, args),
            _ => unreachable!("caller matched Declared"),
        };

        let key = ty.key();
        if let Some(name) = registry.lookup(&key) {
            return SchemaNode::Reference(name.to_string());
        }

        let base = self.analyzer.type_name(ty);
        let name = registry.reserve(key.clone(), &base);

        let decl = self.analyzer.decl(decl);
        let subst = bind_generics(&decl.generics, args);
        let node = match &decl.kind {
            DeclKind::Struct(item) => self.struct_schema(item, &subst, registry),
            DeclKind::Enum(item) => self.enum_schema(item, &subst, registry),
            // The analyzer resolves aliases through to their target, so an
            // alias never owns a registry entry of its own.
            DeclKind::Alias(item) => self.field_schema(&item.ty, &subst, registry).0,
        };
        registry.fill(&key, node);

        SchemaNode::Reference(name)
    }

    /// Expands an object-like type into its property list without registering
    /// the outer type itself. Used to compose path/query parameters from
    /// `Path<T>` / `Query<T>` wrapper types.
    pub fn object_properties(
        &self,
        ty: &ResolvedType,
        registry: &mut SchemaRegistry,
    ) -> Option<Vec<PropertySchema>> {
        let (inner, _) = ty.unwrap_optional();
        match inner {
            ResolvedType::Declared { decl, args } => {
                let decl = self.analyzer.decl(*decl);
                match &decl.kind {
                    DeclKind::Struct(item) => match &item.fields {
                        syn::Fields::Named(named) => {
                            let subst = bind_generics(&decl.generics, args);
                            Some(self.named_field_properties(named, &subst, registry))
                        }
                        _ => None,
                    },
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn struct_schema(
        &self,
        item: &syn::ItemStruct,
        subst: &HashMap<String, ResolvedType>,
        registry: &mut SchemaRegistry,
    ) -> SchemaNode {
        match &item.fields {
            syn::Fields::Named(named) => SchemaNode::Object(ObjectSchema {
                properties: self.named_field_properties(named, subst, registry),
            }),
            // Newtype structs are serialization-transparent.
            syn::Fields::Unnamed(fields) if fields.unnamed.len() == 1 => {
                self.field_schema(&fields.unnamed[0].ty, subst, registry).0
            }
            syn::Fields::Unnamed(_) => {
                warn!(
                    "tuple struct `{}` has no canonical object shape",
                    item.ident
                );
                SchemaNode::Unknown(item.ident.to_string())
            }
            syn::Fields::Unit => SchemaNode::Primitive(Primitive::Null),
        }
    }

    fn named_field_properties(
        &self,
        fields: &syn::FieldsNamed,
        subst: &HashMap<String, ResolvedType>,
        registry: &mut SchemaRegistry,
    ) -> Vec<PropertySchema> {
        let mut properties = Vec::new();
        for field in &fields.named {
            let ident = match &field.ident {
                Some(ident) => ident.to_string(),
                None => continue,
            };
            let attrs = serde_attrs(&field.attrs);
            if attrs.skip {
                continue;
            }
            let name = attrs.rename.unwrap_or(ident);
            let (schema, required) = self.field_schema(&field.ty, subst, registry);
            properties.push(PropertySchema {
                name,
                schema,
                required,
            });
        }
        properties
    }

    /// Schema and required flag for one field type under the active generic
    /// substitution. Resolution failures degrade to `Unknown` so a single
    /// missing field type does not discard the surrounding schema.
    fn field_schema(
        &self,
        ty: &syn::Type,
        subst: &HashMap<String, ResolvedType>,
        registry: &mut SchemaRegistry,
    ) -> (SchemaNode, bool) {
        match self.analyzer.resolve_with(ty, subst, 0) {
            Ok(resolved) => {
                let (inner, optional) = resolved.unwrap_optional();
                (self.synthesize(inner, registry), !optional)
            }
            Err(failure) => {
                warn!(
                    "cannot resolve field type `{}`; keeping it as unknown",
                    failure.type_name
                );
                (SchemaNode::Unknown(type_text(ty)), true)
            }
        }
    }

    fn enum_schema(
        &self,
        item: &syn::ItemEnum,
        subst: &HashMap<String, ResolvedType>,
        registry: &mut SchemaRegistry,
    ) -> SchemaNode {
        let all_unit = item
            .variants
            .iter()
            .all(|v| matches!(v.fields, syn::Fields::Unit));
        if all_unit {
            let values = item
                .variants
                .iter()
                .map(|v| {
                    let attrs = serde_attrs(&v.attrs);
                    attrs.rename.unwrap_or_else(|| v.ident.to_string())
                })
                .collect();
            return SchemaNode::Enum(values);
        }

        // Data-carrying enums follow serde's externally tagged layout: each
        // alternative is either a bare string constant or a single-property
        // object keyed by the variant name.
        let mut alternatives: Vec<SchemaNode> = Vec::new();
        for variant in &item.variants {
            let attrs = serde_attrs(&variant.attrs);
            let name = attrs.rename.unwrap_or_else(|| variant.ident.to_string());
            let node = match &variant.fields {
                syn::Fields::Unit => SchemaNode::Enum(vec![name]),
                syn::Fields::Unnamed(fields) if fields.unnamed.len() == 1 => {
                    let (schema, _) = self.field_schema(&fields.unnamed[0].ty, subst, registry);
                    variant_object(name, schema)
                }
                syn::Fields::Unnamed(_) => {
                    warn!(
                        "variant `{}::{}` carries a tuple payload with no canonical shape",
                        item.ident, variant.ident
                    );
                    variant_object(name, SchemaNode::Unknown(variant.ident.to_string()))
                }
                syn::Fields::Named(named) => {
                    let payload = SchemaNode::Object(ObjectSchema {
                        properties: self.named_field_properties(named, subst, registry),
                    });
                    variant_object(name, payload)
                }
            };
            if !alternatives.contains(&node) {
                alternatives.push(node);
            }
        }

        // A union with one effective case is that case.
        if alternatives.len() == 1 {
            alternatives.remove(0)
        } else {
            SchemaNode::Union(alternatives)
        }
    }
}

fn variant_object(name: String, payload: SchemaNode) -> SchemaNode {
    SchemaNode::Object(ObjectSchema {
        properties: vec![PropertySchema {
            name,
            schema: payload,
            required: true,
        }],
    })
}

#[derive(Default)]
struct SerdeAttrs {
    rename: Option<String>,
    skip: bool,
}

/// Field/variant level `#[serde(...)]` attributes the schema cares about.
fn serde_attrs(attrs: &[syn::Attribute]) -> SerdeAttrs {
    let mut out = SerdeAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("serde") {
            continue;
        }
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let value = meta.value()?;
                let lit: syn::LitStr = value.parse()?;
                out.rename = Some(lit.value());
            } else if meta.path.is_ident("skip")
                || meta.path.is_ident("skip_serializing")
                || meta.path.is_ident("skip_deserializing")
            {
                out.skip = true;
            } else if let Ok(value) = meta.value() {
                // Consume the value of attributes we do not interpret, e.g.
                // `default = "..."`, so parsing of the list continues.
                let _: syn::Expr = value.parse()?;
            }
            Ok(())
        });
    }
    out
}
