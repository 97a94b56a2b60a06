use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for the generation pipeline
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal pipeline errors. Any of these aborts the run before either output
/// file is written.
#[derive(Debug, Error)]
pub enum Error {
    /// The project locator did not resolve to an analyzable source tree.
    #[error("failed to load program at {}: {reason}", path.display())]
    ProgramLoad { path: PathBuf, reason: String },

    /// The analyzed program has error-severity diagnostics and the run was
    /// configured to refuse partial type information.
    #[error("program has {count} compile diagnostic(s):\n{rendered}")]
    CompileDiagnostics { count: usize, rendered: String },

    /// Two handler declarations map to the same method and path.
    #[error(
        "duplicate route {method} {path}: declared by `{first}` ({first_file}) and `{second}` ({second_file})"
    )]
    RouteConflict {
        method: String,
        path: String,
        first: String,
        first_file: String,
        second: String,
        second_file: String,
    },

    /// A path-template parameter has no matching property in the route's
    /// request schema.
    #[error("route {method} {path}: path parameter `{{{param}}}` has no matching request property")]
    Assembly {
        method: String,
        path: String,
        param: String,
    },

    /// A handler cannot be re-imported from generated code.
    #[error("route {method} {path}: handler `{handler}` is not exported (`pub`) and cannot be referenced from generated code")]
    Generation {
        method: String,
        path: String,
        handler: String,
    },

    /// Routes were excluded by type-resolution failures and the run was
    /// configured to treat exclusions as fatal.
    #[error("{count} route(s) excluded by type resolution failures")]
    ExclusionsDenied { count: usize },

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A route whose declared request or response type could not be resolved.
///
/// Collected per route and reported together at the end of the run; the
/// affected route is excluded from the document and the generated source,
/// but extraction of the remaining routes continues.
#[derive(Debug, Clone, Error)]
#[error("route {method} {path}: cannot resolve type `{type_name}` declared by `{handler}` ({file})")]
pub struct TypeResolutionError {
    pub method: String,
    pub path: String,
    pub handler: String,
    pub file: String,
    pub type_name: String,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
