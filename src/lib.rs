//! contractgen - static route discovery, schema synthesis and contract
//! generation for annotated Rust handlers.
//!
//! The pipeline analyzes a project's source tree, finds every function
//! carrying a `#[route(METHOD, "/path")]` annotation, resolves the declared
//! request/response types into canonical schema trees, and emits two
//! artifacts: an OpenAPI 3.0 contract document and a registration source
//! file wiring each handler to a request validator derived from its schema.
//!
//! # Architecture
//!
//! 1. [`scanner`] - discovers `.rs` files under the project root in a
//!    reproducible order
//! 2. [`analyzer`] - parses every file, collects diagnostics and resolves
//!    declared types with a stable identity for memoization
//! 3. [`extractor`] - collects annotated routes and composes each route's
//!    logical request schema
//! 4. [`synthesizer`] - converts resolved types into schema trees, sharing
//!    and terminating recursion through the [`schema::SchemaRegistry`]
//! 5. [`assembler`] - merges routes, schemas and document metadata into a
//!    deterministic OpenAPI document
//! 6. [`codegen`] - renders the registration source consumed by the host
//!    application
//! 7. [`validation`] - request-time enforcement of the embedded schemas
//! 8. [`pipeline`] - computes everything in memory, then writes the two
//!    artifacts
//!
//! # Example
//!
//! ```no_run
//! use contractgen::config::GeneratorConfig;
//! use contractgen::pipeline;
//! use std::path::PathBuf;
//!
//! let mut config = GeneratorConfig::new(PathBuf::from("./my-service"));
//! config.document_out = Some(PathBuf::from("openapi.yaml"));
//! let report = pipeline::run(&config).unwrap();
//! println!("registered {} route(s)", report.routes_registered);
//! ```

pub mod analyzer;
pub mod assembler;
pub mod cli;
pub mod codegen;
pub mod config;
pub mod error;
pub mod extractor;
pub mod pipeline;
pub mod scanner;
pub mod schema;
pub mod serializer;
pub mod synthesizer;
pub mod validation;
