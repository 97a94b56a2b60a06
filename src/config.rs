//! Pipeline configuration.
//!
//! The core consumes this as a fully validated, already-defaulted structure;
//! building it from command-line arguments (and validating the project path)
//! is the CLI's job.

use std::path::PathBuf;

/// Output format for the contract document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Yaml,
    Json,
}

/// Caller-supplied document metadata.
#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    /// Server URLs advertised in the document
    pub servers: Vec<String>,
    /// Names of security schemes required for every operation
    pub security: Vec<String>,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            title: "Generated API".to_string(),
            version: "0.1.0".to_string(),
            description: None,
            servers: Vec::new(),
            security: Vec::new(),
        }
    }
}

/// Fully resolved configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Root of the analyzed project
    pub project_dir: PathBuf,
    /// Contract document destination; `None` writes to stdout
    pub document_out: Option<PathBuf>,
    /// Whether to emit the contract document at all
    pub emit_document: bool,
    /// Destination of the generated registration source
    pub code_out: PathBuf,
    pub format: OutputFormat,
    /// Abort before extraction when the program has error diagnostics
    pub check_diagnostics: bool,
    /// Treat excluded routes as a fatal error instead of a non-zero outcome
    pub deny_exclusions: bool,
    /// Keep the first declaration of a duplicated method+path instead of
    /// failing the run
    pub allow_duplicate_routes: bool,
    pub metadata: DocumentMetadata,
}

impl GeneratorConfig {
    /// Defaults for a run over `project_dir`, emitting YAML to stdout and the
    /// registration source next to the project.
    pub fn new(project_dir: PathBuf) -> Self {
        let code_out = project_dir.join("src").join("routes_generated.rs");
        Self {
            project_dir,
            document_out: None,
            emit_document: true,
            code_out,
            format: OutputFormat::Yaml,
            check_diagnostics: false,
            deny_exclusions: false,
            allow_duplicate_routes: false,
            metadata: DocumentMetadata::default(),
        }
    }
}
