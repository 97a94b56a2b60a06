use crate::config::{DocumentMetadata, GeneratorConfig, OutputFormat};
use crate::pipeline::{self, RunReport};
use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::{debug, info};
use std::path::PathBuf;

/// contractgen - Generate an OpenAPI contract and validated route
/// registrations from annotated Rust handlers
#[derive(Parser, Debug)]
#[command(name = "contractgen")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to the analyzed project directory
    #[arg(value_name = "PROJECT_PATH")]
    pub project_path: PathBuf,

    /// Output format for the contract document
    #[arg(short = 'f', long = "format", value_enum, default_value = "yaml")]
    pub format: FormatArg,

    /// Contract document output path (stdout when omitted)
    #[arg(short = 'o', long = "document-out", value_name = "FILE")]
    pub document_out: Option<PathBuf>,

    /// Do not emit the contract document
    #[arg(long = "no-document")]
    pub no_document: bool,

    /// Generated registration source path
    /// (defaults to src/routes_generated.rs under the project)
    #[arg(long = "code-out", value_name = "FILE")]
    pub code_out: Option<PathBuf>,

    /// Document title
    #[arg(long = "title", default_value = "Generated API")]
    pub title: String,

    /// Document version
    #[arg(long = "api-version", default_value = "0.1.0")]
    pub api_version: String,

    /// Document description
    #[arg(long = "description")]
    pub description: Option<String>,

    /// Server URL advertised in the document (repeatable)
    #[arg(long = "server", value_name = "URL")]
    pub servers: Vec<String>,

    /// Security scheme required on every operation (repeatable)
    #[arg(long = "security", value_name = "SCHEME")]
    pub security: Vec<String>,

    /// Abort before extraction when the program has compile diagnostics
    #[arg(long = "check-diagnostics")]
    pub check_diagnostics: bool,

    /// Fail the run instead of excluding unresolvable routes
    #[arg(long = "deny-exclusions")]
    pub deny_exclusions: bool,

    /// Keep the first declaration of a duplicated method+path instead of
    /// failing
    #[arg(long = "allow-duplicate-routes")]
    pub allow_duplicate_routes: bool,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Yaml,
    Json,
}

/// Validates the parsed arguments and resolves them into a pipeline
/// configuration.
pub fn build_config(args: &CliArgs) -> Result<GeneratorConfig> {
    debug!("parsed arguments: {:?}", args);

    if !args.project_path.exists() {
        anyhow::bail!(
            "project path does not exist: {}",
            args.project_path.display()
        );
    }
    if !args.project_path.is_dir() {
        anyhow::bail!(
            "project path is not a directory: {}",
            args.project_path.display()
        );
    }

    let mut config = GeneratorConfig::new(args.project_path.clone());
    config.document_out = args.document_out.clone();
    config.emit_document = !args.no_document;
    if let Some(code_out) = &args.code_out {
        config.code_out = code_out.clone();
    }
    config.format = match args.format {
        FormatArg::Yaml => OutputFormat::Yaml,
        FormatArg::Json => OutputFormat::Json,
    };
    config.check_diagnostics = args.check_diagnostics;
    config.deny_exclusions = args.deny_exclusions;
    config.allow_duplicate_routes = args.allow_duplicate_routes;
    config.metadata = DocumentMetadata {
        title: args.title.clone(),
        version: args.api_version.clone(),
        description: args.description.clone(),
        servers: args.servers.clone(),
        security: args.security.clone(),
    };

    info!("project path: {}", config.project_dir.display());
    info!("output format: {:?}", args.format);
    match &config.document_out {
        Some(path) => info!("document output: {}", path.display()),
        None => info!("document output: stdout"),
    }
    info!("code output: {}", config.code_out.display());

    Ok(config)
}

/// Runs the full pipeline for the given arguments.
pub fn run(args: CliArgs) -> Result<RunReport> {
    let config = build_config(&args)?;
    let report = pipeline::run(&config)?;

    if let Some(document) = &report.rendered_document {
        println!("{}", document);
    }

    info!("generation complete");
    info!("  - routes registered: {}", report.routes_registered);
    info!("  - routes excluded: {}", report.excluded.len());

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn args_for(dir: &TempDir) -> CliArgs {
        CliArgs::parse_from(["contractgen", dir.path().to_str().unwrap()])
    }

    #[test]
    fn rejects_missing_project_path() {
        let args = CliArgs::parse_from(["contractgen", "/definitely/not/here"]);
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn defaults_are_applied() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("lib.rs"), "").unwrap();

        let config = build_config(&args_for(&dir)).unwrap();
        assert!(config.emit_document);
        assert!(config.document_out.is_none());
        assert_eq!(config.format, OutputFormat::Yaml);
        assert_eq!(config.metadata.title, "Generated API");
        assert!(config.code_out.ends_with("src/routes_generated.rs"));
    }

    #[test]
    fn flags_reach_the_config() {
        let dir = TempDir::new().unwrap();
        let args = CliArgs::parse_from([
            "contractgen",
            dir.path().to_str().unwrap(),
            "--format",
            "json",
            "--title",
            "Inventory API",
            "--server",
            "https://api.example.com",
            "--deny-exclusions",
            "--allow-duplicate-routes",
        ]);

        let config = build_config(&args).unwrap();
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.metadata.title, "Inventory API");
        assert_eq!(config.metadata.servers.len(), 1);
        assert!(config.deny_exclusions);
        assert!(config.allow_duplicate_routes);
    }
}
