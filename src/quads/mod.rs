//! N-Quads reconciliation: filtering the corpus and merging datasets.
//!
//! - **Filter** ([`filter`]): one streaming pass over the corpus that splits
//!   it into quads to preserve, quads to keep, and the stale subgraph to drop.
//! - **Merge** ([`merge`]): concatenates the two kept streams, then splices
//!   in the derived dataset without duplicating any quad.
//!
//! Corpus files are processed a line at a time; only the derived dataset is
//! held in memory.

pub mod filter;
pub mod merge;

use std::borrow::Cow;
use std::path::Path;

use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model::{GraphName, Quad, Term};

use crate::error::{QuadError, QuadResult};

/// What one corpus line turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Blank line or `#` comment.
    Skip,
    Quad(Quad),
    /// Unparseable quad syntax, with the parser's message.
    Malformed(String),
}

/// Parse a single N-Quads line.
pub fn parse_line(line: &str) -> LineOutcome {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return LineOutcome::Skip;
    }
    let mut parsed = RdfParser::from_format(RdfFormat::NQuads).for_slice(trimmed.as_bytes());
    match parsed.next() {
        Some(Ok(quad)) => LineOutcome::Quad(quad),
        Some(Err(e)) => LineOutcome::Malformed(e.to_string()),
        None => LineOutcome::Malformed("no statement on line".into()),
    }
}

/// RDF syntax of a file, from its extension.
pub fn rdf_format_of(path: &Path) -> QuadResult<RdfFormat> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(RdfFormat::from_extension)
        .ok_or_else(|| QuadError::UnknownFormat {
            path: path.display().to_string(),
        })
}

/// IRI of the quad's named graph; `None` for the default graph and blank
/// graph names.
pub fn graph_iri(quad: &Quad) -> Option<&str> {
    match &quad.graph_name {
        GraphName::NamedNode(n) => Some(n.as_str()),
        _ => None,
    }
}

/// Subject as plain text: the bare IRI, or `_:id` for a blank node.
pub fn subject_text(quad: &Quad) -> String {
    let text = quad.subject.to_string();
    match text.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
        Some(iri) => iri.to_string(),
        None => text,
    }
}

/// Lexical text of a term: IRI, blank node id, or literal value.
pub fn term_text(term: &Term) -> Cow<'_, str> {
    match term {
        Term::NamedNode(n) => Cow::Borrowed(n.as_str()),
        Term::BlankNode(b) => Cow::Borrowed(b.as_str()),
        Term::Literal(l) => Cow::Borrowed(l.value()),
        #[allow(unreachable_patterns)]
        other => Cow::Owned(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_graph_quad() {
        let line = r#"<http://ex.org/s> <http://ex.org/p> "v" <http://ex.org/g> ."#;
        let LineOutcome::Quad(q) = parse_line(line) else {
            panic!("expected a quad");
        };
        assert_eq!(subject_text(&q), "http://ex.org/s");
        assert_eq!(graph_iri(&q), Some("http://ex.org/g"));
        assert_eq!(term_text(&q.object), "v");
    }

    #[test]
    fn default_graph_has_no_iri() {
        let LineOutcome::Quad(q) = parse_line("<http://ex.org/s> <http://ex.org/p> _:b1 .") else {
            panic!("expected a quad");
        };
        assert_eq!(graph_iri(&q), None);
        assert_eq!(term_text(&q.object), "b1");
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert_eq!(parse_line(""), LineOutcome::Skip);
        assert_eq!(parse_line("   \n"), LineOutcome::Skip);
        assert_eq!(parse_line("# dump header"), LineOutcome::Skip);
    }

    #[test]
    fn truncated_line_is_malformed() {
        assert!(matches!(
            parse_line("<http://ex.org/s> <http://ex.org/p> \"unterminated"),
            LineOutcome::Malformed(_)
        ));
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(rdf_format_of(Path::new("out/disease.trig")).unwrap(), RdfFormat::TriG);
        assert_eq!(rdf_format_of(Path::new("dump.nq")).unwrap(), RdfFormat::NQuads);
        assert!(matches!(
            rdf_format_of(Path::new("table.csv")),
            Err(QuadError::UnknownFormat { .. })
        ));
    }
}
