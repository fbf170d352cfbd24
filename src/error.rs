//! Rich diagnostic error types for the reconciliation pipeline.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so the operator knows which stage failed
//! and what to do about it.

use std::path::Path;

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ConfigError;

/// Top-level error type for the pipeline.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the binary.
#[derive(Debug, Error, Diagnostic)]
pub enum ReconcileError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Quad(#[from] QuadError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Tabular(#[from] TabularError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Stage(#[from] StageError),
}

// ---------------------------------------------------------------------------
// Lookup source errors
// ---------------------------------------------------------------------------

/// A single call against an external knowledge base failed.
///
/// These are always recoverable: the cascade treats them as a miss for the
/// failing source and moves on to the next one.
#[derive(Debug, Error, Diagnostic)]
pub enum SourceError {
    #[error("{source_name}: transport error: {message}")]
    #[diagnostic(
        code(semnext::source::transport),
        help(
            "The endpoint could not be reached. Check network access and the \
             endpoint URL in the configuration file."
        )
    )]
    Transport { source_name: String, message: String },

    #[error("{source_name}: HTTP status {status}: {body}")]
    #[diagnostic(
        code(semnext::source::status),
        help(
            "The endpoint answered with an error status. Public SPARQL endpoints \
             return 500 for timeouts on expensive queries; lowering the search \
             limit may help."
        )
    )]
    Status {
        source_name: String,
        status: u16,
        body: String,
    },

    #[error("{source_name}: unexpected response: {message}")]
    #[diagnostic(
        code(semnext::source::response),
        help("The endpoint returned a body that could not be interpreted.")
    )]
    Response { source_name: String, message: String },
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

// ---------------------------------------------------------------------------
// Quad errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum QuadError {
    #[error("I/O error on {path}: {source}")]
    #[diagnostic(
        code(semnext::quads::io),
        help("Check that the file exists and that the output directory is writable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse RDF dataset {path}: {message}")]
    #[diagnostic(
        code(semnext::quads::parse),
        help(
            "The derived dataset must be valid RDF. Regenerate it from the ETL \
             step before running the final merge."
        )
    )]
    Parse { path: String, message: String },

    #[error("cannot infer RDF format of {path}")]
    #[diagnostic(
        code(semnext::quads::format),
        help("Use one of the extensions .trig, .nq, .ttl or .nt.")
    )]
    UnknownFormat { path: String },
}

impl QuadError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

pub type QuadResult<T> = std::result::Result<T, QuadError>;

// ---------------------------------------------------------------------------
// Tabular errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TabularError {
    #[error("I/O error on {path}: {source}")]
    #[diagnostic(
        code(semnext::tabular::io),
        help("Check that the tabular input exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: missing required column \"{column}\"")]
    #[diagnostic(
        code(semnext::tabular::missing_column),
        help("The header row does not name this column. Verify the export settings of the source table.")
    )]
    MissingColumn { path: String, column: String },

    #[error("{path}: empty table, no header row")]
    #[diagnostic(code(semnext::tabular::empty))]
    Empty { path: String },

    #[error("{path}: unterminated quoted field starting on line {line}")]
    #[diagnostic(
        code(semnext::tabular::quote),
        help("A quoted field never closes. The file is probably truncated.")
    )]
    UnterminatedQuote { path: String, line: usize },
}

impl TabularError {
    pub(crate) fn io(path: &str, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            source,
        }
    }
}

pub type TabularResult<T> = std::result::Result<T, TabularError>;

// ---------------------------------------------------------------------------
// Stage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StageError {
    #[error("stage \"{stage}\" requires {path}, which does not exist")]
    #[diagnostic(
        code(semnext::stage::missing_artifact),
        help(
            "Stages run strictly in order. Run the earlier stages first \
             (`semnext-reconcile run`) or restore the missing input file."
        )
    )]
    MissingArtifact { stage: String, path: String },

    #[error("I/O error on staged artifact {path}: {source}")]
    #[diagnostic(
        code(semnext::stage::io),
        help("Check that the output directory exists and is writable, and that the disk is not full.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to publish artifact {path}: {source}")]
    #[diagnostic(
        code(semnext::stage::publish),
        help("The staged output could not be moved into place. Check permissions on the output directory.")
    )]
    Publish {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for functions returning pipeline results.
pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_error_converts_to_reconcile_error() {
        let err = SourceError::Transport {
            source_name: "biomart".into(),
            message: "timed out".into(),
        };
        let top: ReconcileError = err.into();
        assert!(matches!(
            top,
            ReconcileError::Source(SourceError::Transport { .. })
        ));
    }

    #[test]
    fn missing_artifact_names_stage_and_path() {
        let err = StageError::MissingArtifact {
            stage: "merge-derived".into(),
            path: "data/output/disease.trig".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("merge-derived"));
        assert!(msg.contains("disease.trig"));
    }

    #[test]
    fn status_error_display_includes_code() {
        let err = SourceError::Status {
            source_name: "bio2rdf".into(),
            status: 500,
            body: "Virtuoso 42000 Error".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("500"));
        assert!(msg.contains("bio2rdf"));
    }
}
