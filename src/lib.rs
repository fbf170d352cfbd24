// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # semnext-reconcile
//!
//! Gene identifier resolution and N-Quads reconciliation for the SemNExT
//! knowledge graph.
//!
//! ## Architecture
//!
//! - **Resolution** (`resolve`): gene symbol → canonical URI through an
//!   ordered cascade of BioMart, Bio2RDF and optional linked-data endpoints
//! - **Quads** (`quads`): streaming preserve/wipe filter and the two merge
//!   stages that splice derived facts into the corpus without duplicates
//! - **Tabular** (`tabular`): association cleaning and the gene–disease
//!   intersection file
//! - **Staging** (`staging`): one artifact per stage, atomic publication,
//!   resumption by artifact existence
//! - **Pipeline** (`pipeline`): runs the stages in order from a TOML
//!   configuration (`config`)
//!
//! ## Library usage
//!
//! ```no_run
//! use semnext_reconcile::config::PipelineConfig;
//! use semnext_reconcile::pipeline::Pipeline;
//! use semnext_reconcile::resolve::cascade::Cascade;
//! use semnext_reconcile::resolve::Symbol;
//!
//! let config = PipelineConfig::default();
//! let cascade = Cascade::from_config(&config).unwrap();
//! let brca1 = cascade.resolve(&Symbol::new("BRCA1"));
//! println!("{}", brca1.uri_or_symbol(&Symbol::new("BRCA1")));
//!
//! Pipeline::new(config).reconcile().unwrap();
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod quads;
pub mod resolve;
pub mod staging;
pub mod tabular;
