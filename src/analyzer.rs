//! Program loading and type resolution.
//!
//! [`ProgramAnalyzer`] parses every source file of the analyzed project with
//! `syn`, collects parse diagnostics, and indexes type declarations so that a
//! type written at a declaration site can be resolved into a [`ResolvedType`]
//! with a stable identity ([`TypeKey`]) for memoization. The rest of the
//! pipeline only sees these two types plus declaration lookups, never the
//! underlying `syn` API surface.

use crate::error::Error;
use crate::scanner::FileScanner;
use crate::schema::{IntegerFormat, NumberFormat, Primitive};
use log::{debug, warn};
use quote::ToTokens;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Upper bound on alias chasing, guards against `type A = B; type B = A;`.
const MAX_ALIAS_DEPTH: usize = 32;

/// A successfully parsed source file.
#[derive(Debug)]
pub struct ParsedSource {
    pub path: PathBuf,
    pub ast: syn::File,
}

/// Severity of a compile diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A diagnostic surfaced while loading the program.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub file: PathBuf,
    pub line: usize,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "{}: {}:{}: {}",
            severity,
            self.file.display(),
            self.line,
            self.message
        )
    }
}

/// Handle to one indexed type declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId(pub(crate) usize);

/// An indexed `struct`, `enum` or `type` alias declaration.
#[derive(Debug)]
pub struct TypeDecl {
    pub name: String,
    pub file: usize,
    pub generics: Vec<String>,
    pub kind: DeclKind,
}

#[derive(Debug)]
pub enum DeclKind {
    Struct(syn::ItemStruct),
    Enum(syn::ItemEnum),
    Alias(syn::ItemType),
}

/// A type as used at a specific declaration site, after alias resolution and
/// wrapper peeling.
#[derive(Debug, Clone)]
pub enum ResolvedType {
    Primitive(Primitive),
    Optional(Box<ResolvedType>),
    List(Box<ResolvedType>),
    Declared { decl: DeclId, args: Vec<ResolvedType> },
    /// Shape outside the supported grammar; carries the original type text
    Unsupported(String),
}

/// Identity of a resolved type, used as the memoization key.
///
/// Two sites writing the same declared type produce equal keys; two distinct
/// declarations with identical shape do not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKey {
    Primitive(String),
    Optional(Box<TypeKey>),
    List(Box<TypeKey>),
    Decl { decl: usize, args: Vec<TypeKey> },
    Opaque(String),
}

/// A named type that does not resolve to any declaration in the program.
#[derive(Debug, Clone)]
pub struct ResolveFailure {
    pub type_name: String,
}

impl ResolvedType {
    pub fn key(&self) -> TypeKey {
        match self {
            ResolvedType::Primitive(p) => TypeKey::Primitive(primitive_key(*p).to_string()),
            ResolvedType::Optional(inner) => TypeKey::Optional(Box::new(inner.key())),
            ResolvedType::List(inner) => TypeKey::List(Box::new(inner.key())),
            ResolvedType::Declared { decl, args } => TypeKey::Decl {
                decl: decl.0,
                args: args.iter().map(ResolvedType::key).collect(),
            },
            ResolvedType::Unsupported(text) => TypeKey::Opaque(text.clone()),
        }
    }

    /// Peels one `Option` wrapper, reporting whether it was present.
    pub fn unwrap_optional(&self) -> (&ResolvedType, bool) {
        match self {
            ResolvedType::Optional(inner) => (inner, true),
            other => (other, false),
        }
    }
}

fn primitive_key(p: Primitive) -> &'static str {
    match p {
        Primitive::String => "string",
        Primitive::Integer(IntegerFormat::Int32) => "int32",
        Primitive::Integer(IntegerFormat::Int64) => "int64",
        Primitive::Number(NumberFormat::Float) => "float",
        Primitive::Number(NumberFormat::Double) => "double",
        Primitive::Boolean => "boolean",
        Primitive::Null => "null",
    }
}

/// Static analysis front end over one project source tree.
#[derive(Debug)]
pub struct ProgramAnalyzer {
    root: PathBuf,
    sources: Vec<ParsedSource>,
    decls: Vec<TypeDecl>,
    by_name: HashMap<String, usize>,
    diagnostics: Vec<Diagnostic>,
}

impl ProgramAnalyzer {
    /// Loads and parses the program under `root`.
    ///
    /// Individual files that fail to read or parse become error diagnostics;
    /// only a root that yields no parseable source at all is a
    /// [`Error::ProgramLoad`].
    pub fn load(root: &Path) -> Result<Self, Error> {
        if !root.is_dir() {
            return Err(Error::ProgramLoad {
                path: root.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }

        let scan = FileScanner::new(root.to_path_buf())
            .scan()
            .map_err(|e| Error::ProgramLoad {
                path: root.to_path_buf(),
                reason: e.to_string(),
            })?;
        if scan.rust_files.is_empty() {
            return Err(Error::ProgramLoad {
                path: root.to_path_buf(),
                reason: "no Rust sources found".to_string(),
            });
        }

        let mut sources = Vec::new();
        let mut diagnostics = Vec::new();
        for path in &scan.rust_files {
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    diagnostics.push(Diagnostic {
                        severity: Severity::Error,
                        message: format!("failed to read file: {}", e),
                        file: path.clone(),
                        line: 0,
                    });
                    continue;
                }
            };
            match syn::parse_file(&content) {
                Ok(ast) => sources.push(ParsedSource {
                    path: path.clone(),
                    ast,
                }),
                Err(e) => {
                    let line = e.span().start().line;
                    diagnostics.push(Diagnostic {
                        severity: Severity::Error,
                        message: format!("syntax error: {}", e),
                        file: path.clone(),
                        line,
                    });
                }
            }
        }

        if sources.is_empty() {
            return Err(Error::ProgramLoad {
                path: root.to_path_buf(),
                reason: "no file could be parsed".to_string(),
            });
        }

        debug!(
            "loaded {} source file(s), {} diagnostic(s)",
            sources.len(),
            diagnostics.len()
        );

        let mut analyzer = Self {
            root: root.to_path_buf(),
            sources,
            decls: Vec::new(),
            by_name: HashMap::new(),
            diagnostics,
        };
        analyzer.index_declarations();
        Ok(analyzer)
    }

    /// Indexes every struct/enum/alias declaration, recursing into inline
    /// modules. The first declaration under a given name wins; shadowed
    /// declarations are reported so the collision is visible.
    fn index_declarations(&mut self) {
        let mut found: Vec<(String, usize, DeclKind, Vec<String>)> = Vec::new();
        for (file_idx, source) in self.sources.iter().enumerate() {
            collect_decls(&source.ast.items, file_idx, &mut found);
        }

        for (name, file, kind, generics) in found {
            if self.by_name.contains_key(&name) {
                warn!(
                    "type `{}` declared more than once; keeping the first declaration",
                    name
                );
                continue;
            }
            let idx = self.decls.len();
            self.decls.push(TypeDecl {
                name: name.clone(),
                file,
                generics,
                kind,
            });
            self.by_name.insert(name, idx);
        }
        debug!("indexed {} type declaration(s)", self.decls.len());
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sources(&self) -> &[ParsedSource] {
        &self.sources
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn has_error_diagnostics(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn render_diagnostics(&self) -> String {
        self.diagnostics
            .iter()
            .map(Diagnostic::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn decl(&self, id: DeclId) -> &TypeDecl {
        &self.decls[id.0]
    }

    pub fn source_path(&self, file: usize) -> &Path {
        &self.sources[file].path
    }

    /// Resolves a type written at a declaration site.
    pub fn resolve(&self, ty: &syn::Type) -> Result<ResolvedType, ResolveFailure> {
        self.resolve_with(ty, &HashMap::new(), 0)
    }

    /// Resolution with an active generic-parameter substitution, used when
    /// expanding the fields of a generic declaration.
    pub(crate) fn resolve_with(
        &self,
        ty: &syn::Type,
        subst: &HashMap<String, ResolvedType>,
        depth: usize,
    ) -> Result<ResolvedType, ResolveFailure> {
        if depth > MAX_ALIAS_DEPTH {
            return Ok(ResolvedType::Unsupported(type_text(ty)));
        }
        match ty {
            syn::Type::Path(type_path) => {
                if type_path.qself.is_some() {
                    return Ok(ResolvedType::Unsupported(type_text(ty)));
                }
                self.resolve_path(type_path, subst, depth)
            }
            syn::Type::Reference(reference) => self.resolve_with(&reference.elem, subst, depth),
            syn::Type::Slice(slice) => Ok(ResolvedType::List(Box::new(self.resolve_with(
                &slice.elem,
                subst,
                depth,
            )?))),
            syn::Type::Array(array) => Ok(ResolvedType::List(Box::new(self.resolve_with(
                &array.elem,
                subst,
                depth,
            )?))),
            syn::Type::Paren(paren) => self.resolve_with(&paren.elem, subst, depth),
            syn::Type::Group(group) => self.resolve_with(&group.elem, subst, depth),
            syn::Type::Tuple(tuple) if tuple.elems.is_empty() => {
                Ok(ResolvedType::Primitive(Primitive::Null))
            }
            other => Ok(ResolvedType::Unsupported(type_text(other))),
        }
    }

    fn resolve_path(
        &self,
        type_path: &syn::TypePath,
        subst: &HashMap<String, ResolvedType>,
        depth: usize,
    ) -> Result<ResolvedType, ResolveFailure> {
        let segment = match type_path.path.segments.last() {
            Some(segment) => segment,
            None => return Ok(ResolvedType::Unsupported(type_text(&type_path.path))),
        };
        let name = segment.ident.to_string();
        let args = generic_type_args(segment);

        // An in-scope generic parameter takes priority over declarations.
        if args.is_empty() {
            if let Some(bound) = subst.get(&name) {
                return Ok(bound.clone());
            }
        }

        match name.as_str() {
            "Option" => {
                let inner = single_arg(&args, &name)?;
                let inner = self.resolve_with(inner, subst, depth)?;
                Ok(ResolvedType::Optional(Box::new(inner)))
            }
            "Vec" | "VecDeque" | "BTreeSet" | "HashSet" => {
                let inner = single_arg(&args, &name)?;
                let inner = self.resolve_with(inner, subst, depth)?;
                Ok(ResolvedType::List(Box::new(inner)))
            }
            // Smart pointers are transparent for schema purposes.
            "Box" | "Rc" | "Arc" => {
                let inner = single_arg(&args, &name)?;
                self.resolve_with(inner, subst, depth)
            }
            _ => {
                if args.is_empty() {
                    if let Some(primitive) = primitive_for(&name) {
                        return Ok(ResolvedType::Primitive(primitive));
                    }
                }
                match self.by_name.get(&name) {
                    Some(&idx) => self.resolve_declared(idx, &args, subst, depth),
                    None => Err(ResolveFailure { type_name: name }),
                }
            }
        }
    }

    fn resolve_declared(
        &self,
        idx: usize,
        args: &[&syn::Type],
        subst: &HashMap<String, ResolvedType>,
        depth: usize,
    ) -> Result<ResolvedType, ResolveFailure> {
        let decl = &self.decls[idx];
        let resolved_args = args
            .iter()
            .map(|arg| self.resolve_with(arg, subst, depth))
            .collect::<Result<Vec<_>, _>>()?;

        match &decl.kind {
            DeclKind::Alias(item) => {
                // Aliases are identity-transparent: the alias target decides
                // the type key, so `type UserRecord = User;` collapses onto
                // `User`.
                let alias_subst = bind_generics(&decl.generics, &resolved_args);
                self.resolve_with(&item.ty, &alias_subst, depth + 1)
            }
            _ => Ok(ResolvedType::Declared {
                decl: DeclId(idx),
                args: resolved_args,
            }),
        }
    }

    /// Human-readable name for a resolved type; also the base for registry
    /// entry names of generic instantiations.
    pub fn type_name(&self, ty: &ResolvedType) -> String {
        match ty {
            ResolvedType::Primitive(p) => match p {
                Primitive::String => "String".to_string(),
                Primitive::Integer(IntegerFormat::Int32) => "Int32".to_string(),
                Primitive::Integer(IntegerFormat::Int64) => "Int64".to_string(),
                Primitive::Number(NumberFormat::Float) => "Float".to_string(),
                Primitive::Number(NumberFormat::Double) => "Double".to_string(),
                Primitive::Boolean => "Boolean".to_string(),
                Primitive::Null => "Null".to_string(),
            },
            ResolvedType::Optional(inner) => format!("Opt{}", self.type_name(inner)),
            ResolvedType::List(inner) => format!("{}List", self.type_name(inner)),
            ResolvedType::Declared { decl, args } => {
                let base = self.decl(*decl).name.clone();
                if args.is_empty() {
                    base
                } else {
                    let parts: Vec<String> = args.iter().map(|a| self.type_name(a)).collect();
                    format!("{}_{}", base, parts.join("_"))
                }
            }
            ResolvedType::Unsupported(_) => "Value".to_string(),
        }
    }
}

/// Builds the substitution map for a generic declaration's parameters.
pub(crate) fn bind_generics(
    params: &[String],
    args: &[ResolvedType],
) -> HashMap<String, ResolvedType> {
    params
        .iter()
        .cloned()
        .zip(args.iter().cloned())
        .collect()
}

fn collect_decls(
    items: &[syn::Item],
    file_idx: usize,
    out: &mut Vec<(String, usize, DeclKind, Vec<String>)>,
) {
    for item in items {
        match item {
            syn::Item::Struct(item) => out.push((
                item.ident.to_string(),
                file_idx,
                DeclKind::Struct(item.clone()),
                generic_param_names(&item.generics),
            )),
            syn::Item::Enum(item) => out.push((
                item.ident.to_string(),
                file_idx,
                DeclKind::Enum(item.clone()),
                generic_param_names(&item.generics),
            )),
            syn::Item::Type(item) => out.push((
                item.ident.to_string(),
                file_idx,
                DeclKind::Alias(item.clone()),
                generic_param_names(&item.generics),
            )),
            syn::Item::Mod(module) => {
                if let Some((_, items)) = &module.content {
                    collect_decls(items, file_idx, out);
                }
            }
            _ => {}
        }
    }
}

fn generic_param_names(generics: &syn::Generics) -> Vec<String> {
    generics
        .params
        .iter()
        .filter_map(|param| match param {
            syn::GenericParam::Type(ty) => Some(ty.ident.to_string()),
            _ => None,
        })
        .collect()
}

fn generic_type_args(segment: &syn::PathSegment) -> Vec<&syn::Type> {
    match &segment.arguments {
        syn::PathArguments::AngleBracketed(args) => args
            .args
            .iter()
            .filter_map(|arg| match arg {
                syn::GenericArgument::Type(ty) => Some(ty),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn single_arg<'a>(args: &[&'a syn::Type], wrapper: &str) -> Result<&'a syn::Type, ResolveFailure> {
    args.first().copied().ok_or_else(|| ResolveFailure {
        type_name: wrapper.to_string(),
    })
}

fn primitive_for(name: &str) -> Option<Primitive> {
    match name {
        "String" | "str" | "char" | "PathBuf" => Some(Primitive::String),
        "i8" | "i16" | "i32" | "u8" | "u16" | "u32" => {
            Some(Primitive::Integer(IntegerFormat::Int32))
        }
        "i64" | "i128" | "u64" | "u128" | "isize" | "usize" => {
            Some(Primitive::Integer(IntegerFormat::Int64))
        }
        "f32" => Some(Primitive::Number(NumberFormat::Float)),
        "f64" => Some(Primitive::Number(NumberFormat::Double)),
        "bool" => Some(Primitive::Boolean),
        _ => None,
    }
}

/// Textual rendering of a type, kept on `Unknown` nodes for diagnostics.
pub(crate) fn type_text<T: ToTokens>(ty: &T) -> String {
    ty.to_token_stream().to_string().replace(' ', "")
}
