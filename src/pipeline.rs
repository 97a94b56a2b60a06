//! End-to-end generation pipeline.
//!
//! One run analyzes the program, extracts routes, assembles the contract
//! document and renders the registration source entirely in memory; only
//! then are the output files written. A failure anywhere during computation
//! therefore never leaves a half-written artifact behind.

use crate::analyzer::ProgramAnalyzer;
use crate::assembler::OpenApiAssembler;
use crate::codegen::{RouteCodeGenerator, PLACEHOLDER};
use crate::config::GeneratorConfig;
use crate::error::{Error, Result, TypeResolutionError};
use crate::extractor::RouteExtractor;
use crate::schema::SchemaRegistry;
use crate::serializer;
use log::{info, warn};

/// Outcome of one pipeline run.
#[derive(Debug)]
pub struct RunReport {
    /// Routes present in the document and the generated source
    pub routes_registered: usize,
    /// Routes excluded by type-resolution failures; non-empty means the run
    /// outcome is non-zero even though both artifacts were written
    pub excluded: Vec<TypeResolutionError>,
    /// Rendered contract document, present when it goes to stdout instead of
    /// a file
    pub rendered_document: Option<String>,
}

impl RunReport {
    /// Whether the run completed without excluding any route.
    pub fn success(&self) -> bool {
        self.excluded.is_empty()
    }
}

/// Runs the whole pipeline once for `config`.
pub fn run(config: &GeneratorConfig) -> Result<RunReport> {
    info!("analyzing program at {}", config.project_dir.display());
    let analyzer = ProgramAnalyzer::load(&config.project_dir)?;

    for diagnostic in analyzer.diagnostics() {
        warn!("{}", diagnostic);
    }
    if config.check_diagnostics && analyzer.has_error_diagnostics() {
        return Err(Error::CompileDiagnostics {
            count: analyzer.diagnostics().len(),
            rendered: analyzer.render_diagnostics(),
        });
    }

    info!("extracting routes");
    let mut registry = SchemaRegistry::new();
    let extractor = RouteExtractor::new(&analyzer, config.allow_duplicate_routes);
    let extraction = extractor.extract(&mut registry)?;

    if config.deny_exclusions && !extraction.excluded.is_empty() {
        return Err(Error::ExclusionsDenied {
            count: extraction.excluded.len(),
        });
    }

    info!(
        "assembling document for {} route(s) ({} component schema(s))",
        extraction.routes.len(),
        registry.len()
    );
    let assembler = OpenApiAssembler::new(&config.metadata);
    let document = assembler.assemble(&extraction.routes, &registry)?;

    info!("generating registration source");
    let generator = RouteCodeGenerator;
    let generated = generator.generate(&extraction.routes, &registry)?;

    // Everything fatal has passed; computation is complete. Only now touch
    // the filesystem.
    let rendered = if config.emit_document {
        Some(serializer::render(&document, config.format)?)
    } else {
        None
    };

    if config.code_out.exists() {
        serializer::write_file(PLACEHOLDER, &config.code_out)?;
    }
    serializer::write_file(&generated, &config.code_out)?;
    info!("wrote {}", config.code_out.display());

    let mut rendered_document = None;
    if let Some(rendered) = rendered {
        match &config.document_out {
            Some(path) => {
                serializer::write_file(&rendered, path)?;
                info!("wrote {}", path.display());
            }
            None => rendered_document = Some(rendered),
        }
    }

    for exclusion in &extraction.excluded {
        warn!("{}", exclusion);
    }

    Ok(RunReport {
        routes_registered: extraction.routes.len(),
        excluded: extraction.excluded,
        rendered_document,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use std::fs;
    use tempfile::TempDir;

    fn project_with(code: &str) -> (TempDir, GeneratorConfig) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.rs"), code).unwrap();

        let mut config = GeneratorConfig::new(dir.path().to_path_buf());
        config.document_out = Some(dir.path().join("openapi.yaml"));
        config.code_out = dir.path().join("routes_generated.rs");
        (dir, config)
    }

    #[test]
    fn program_with_no_routes_produces_empty_artifacts() {
        let (_dir, config) = project_with("pub fn not_a_route() {}");
        let report = run(&config).unwrap();

        assert_eq!(report.routes_registered, 0);
        assert!(report.success());

        let yaml = fs::read_to_string(config.document_out.as_ref().unwrap()).unwrap();
        assert!(yaml.contains("paths: {}"));
        assert!(!yaml.contains("components"));

        let code = fs::read_to_string(&config.code_out).unwrap();
        assert!(!code.contains("registrar.register("));
    }

    #[test]
    fn failed_run_writes_nothing() {
        let (_dir, mut config) = project_with(
            r#"
            #[route(GET, "/a")]
            pub fn one() {}
            #[route(GET, "/a")]
            pub fn two() {}
            "#,
        );
        config.document_out = Some(config.project_dir.join("openapi.yaml"));

        let err = run(&config).unwrap_err();
        assert!(matches!(err, Error::RouteConflict { .. }));
        assert!(!config.document_out.as_ref().unwrap().exists());
        assert!(!config.code_out.exists());
    }

    #[test]
    fn existing_generated_file_is_replaced() {
        let (_dir, config) = project_with(
            r#"
            #[route(GET, "/health")]
            pub fn health() {}
            "#,
        );
        fs::write(&config.code_out, "// stale contents").unwrap();

        run(&config).unwrap();

        let code = fs::read_to_string(&config.code_out).unwrap();
        assert!(code.contains("@generated by contractgen"));
        assert!(!code.contains("stale"));
    }

    #[test]
    fn stdout_document_is_returned_in_the_report() {
        let (_dir, mut config) = project_with(
            r#"
            #[route(GET, "/health")]
            pub fn health() {}
            "#,
        );
        config.document_out = None;
        config.format = OutputFormat::Json;

        let report = run(&config).unwrap();
        let rendered = report.rendered_document.unwrap();
        assert!(rendered.contains("\"/health\""));
    }

    #[test]
    fn emit_document_toggle_suppresses_the_contract() {
        let (_dir, mut config) = project_with(
            r#"
            #[route(GET, "/health")]
            pub fn health() {}
            "#,
        );
        config.emit_document = false;

        let report = run(&config).unwrap();
        assert!(report.rendered_document.is_none());
        assert!(!config.document_out.as_ref().unwrap().exists());
        assert!(config.code_out.exists());
    }

    #[test]
    fn exclusions_make_the_run_unsuccessful_but_still_write() {
        let (_dir, config) = project_with(
            r#"
            pub struct User { pub id: u32 }

            #[route(GET, "/users")]
            pub fn list_users() -> Json<Vec<User>> { todo!() }

            #[route(POST, "/ghosts")]
            pub fn make_ghost(Json(body): Json<Ghost>) {}
            "#,
        );

        let report = run(&config).unwrap();
        assert!(!report.success());
        assert_eq!(report.routes_registered, 1);
        assert_eq!(report.excluded.len(), 1);
        assert!(config.code_out.exists());
        assert!(config.document_out.as_ref().unwrap().exists());
    }

    #[test]
    fn deny_exclusions_turns_them_fatal() {
        let (_dir, mut config) = project_with(
            r#"
            #[route(POST, "/ghosts")]
            pub fn make_ghost(Json(body): Json<Ghost>) {}
            "#,
        );
        config.deny_exclusions = true;

        let err = run(&config).unwrap_err();
        assert!(matches!(err, Error::ExclusionsDenied { count: 1 }));
        assert!(!config.code_out.exists());
    }

    #[test]
    fn check_diagnostics_aborts_on_parse_errors() {
        let (dir, mut config) = project_with("pub fn fine() {}");
        fs::write(dir.path().join("src/broken.rs"), "pub fn broken( {").unwrap();
        config.check_diagnostics = true;

        let err = run(&config).unwrap_err();
        assert!(matches!(err, Error::CompileDiagnostics { count: 1, .. }));
    }
}
