//! SPARQL transport for the triple-store lookup sources.
//!
//! [`HttpSparqlClient`] speaks the SPARQL 1.1 protocol over `ureq` and reads
//! JSON result sets. [`StoreSparqlClient`] answers the same queries from an
//! in-process oxigraph store, for offline mirrors of an endpoint.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model::{GraphName, Quad, Term};
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;
use serde::Deserialize;

use crate::error::{SourceError, SourceResult};

/// One result row: variable name → lexical value of the bound term.
pub type Solution = BTreeMap<String, String>;

/// Anything that can answer a SPARQL SELECT.
pub trait SparqlClient: Send + Sync {
    fn select(&self, query: &str) -> SourceResult<Vec<Solution>>;
}

/// Remote SPARQL endpoint over HTTP.
pub struct HttpSparqlClient {
    name: String,
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpSparqlClient {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            agent,
        }
    }

}

impl SparqlClient for HttpSparqlClient {
    fn select(&self, query: &str) -> SourceResult<Vec<Solution>> {
        tracing::trace!(source = %self.name, endpoint = %self.endpoint, "SPARQL select");
        let response = self
            .agent
            .post(&self.endpoint)
            .set("Accept", "application/sparql-results+json")
            .send_form(&[("query", query)]);

        match response {
            Ok(resp) => {
                let body = resp.into_string().map_err(|e| SourceError::Response {
                    source_name: self.name.clone(),
                    message: format!("failed to read body: {e}"),
                })?;
                parse_json_results(&body).map_err(|message| SourceError::Response {
                    source_name: self.name.clone(),
                    message,
                })
            }
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                let preview = if body.len() > 300 {
                    format!("{}...", truncate_on_char_boundary(&body, 300))
                } else {
                    body
                };
                Err(SourceError::Status {
                    source_name: self.name.clone(),
                    status: code,
                    body: preview,
                })
            }
            Err(ureq::Error::Transport(transport)) => Err(SourceError::Transport {
                source_name: self.name.clone(),
                message: transport.to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for HttpSparqlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSparqlClient")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[derive(Deserialize)]
struct JsonResults {
    results: JsonBindings,
}

#[derive(Deserialize)]
struct JsonBindings {
    bindings: Vec<BTreeMap<String, JsonTerm>>,
}

#[derive(Deserialize)]
struct JsonTerm {
    value: String,
}

/// Parse an `application/sparql-results+json` document.
pub(crate) fn parse_json_results(body: &str) -> Result<Vec<Solution>, String> {
    let parsed: JsonResults =
        serde_json::from_str(body).map_err(|e| format!("invalid SPARQL JSON results: {e}"))?;
    Ok(parsed
        .results
        .bindings
        .into_iter()
        .map(|row| row.into_iter().map(|(var, term)| (var, term.value)).collect())
        .collect())
}

/// In-process SPARQL over an oxigraph store.
pub struct StoreSparqlClient {
    store: Store,
}

impl StoreSparqlClient {
    pub fn in_memory() -> SourceResult<Self> {
        let store = Store::new().map_err(|e| SourceError::Response {
            source_name: "local-store".into(),
            message: format!("failed to create oxigraph store: {e}"),
        })?;
        Ok(Self { store })
    }

    /// Load a local RDF dump (format from the file extension) into a fresh
    /// in-memory store. Graph names are dropped, so the whole dump answers as
    /// the default graph, the way a public endpoint does.
    pub fn from_file(path: &Path) -> SourceResult<Self> {
        let client = Self::in_memory()?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(RdfFormat::from_extension)
            .ok_or_else(|| SourceError::Response {
                source_name: "local-store".into(),
                message: format!("cannot infer RDF format of {}", path.display()),
            })?;
        let file = std::fs::File::open(path).map_err(|e| SourceError::Transport {
            source_name: "local-store".into(),
            message: format!("{}: {e}", path.display()),
        })?;
        for quad in RdfParser::from_format(format).for_reader(std::io::BufReader::new(file)) {
            let quad = quad.map_err(|e| SourceError::Response {
                source_name: "local-store".into(),
                message: format!("{}: {e}", path.display()),
            })?;
            client.insert(&Quad::new(
                quad.subject,
                quad.predicate,
                quad.object,
                GraphName::DefaultGraph,
            ))?;
        }
        tracing::info!(path = %path.display(), "local SPARQL mirror loaded");
        Ok(client)
    }

    pub fn insert(&self, quad: &Quad) -> SourceResult<()> {
        self.store.insert(quad).map_err(|e| SourceError::Response {
            source_name: "local-store".into(),
            message: format!("insert failed: {e}"),
        })?;
        Ok(())
    }
}

impl SparqlClient for StoreSparqlClient {
    fn select(&self, query: &str) -> SourceResult<Vec<Solution>> {
        let results = self.store.query(query).map_err(|e| SourceError::Response {
            source_name: "local-store".into(),
            message: format!("SPARQL query failed: {e}"),
        })?;

        match results {
            QueryResults::Solutions(solutions) => {
                let mut rows = Vec::new();
                for solution in solutions {
                    let solution = solution.map_err(|e| SourceError::Response {
                        source_name: "local-store".into(),
                        message: format!("solution error: {e}"),
                    })?;
                    let row: Solution = solution
                        .iter()
                        .map(|(var, term)| (var.as_str().to_string(), term_value(term)))
                        .collect();
                    rows.push(row);
                }
                Ok(rows)
            }
            _ => Err(SourceError::Response {
                source_name: "local-store".into(),
                message: "expected SELECT solutions".into(),
            }),
        }
    }
}

impl std::fmt::Debug for StoreSparqlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSparqlClient").finish()
    }
}

/// Lexical value of a term, without N-Triples decoration.
fn term_value(term: &Term) -> String {
    match term {
        Term::NamedNode(n) => n.as_str().to_string(),
        Term::BlankNode(b) => b.as_str().to_string(),
        Term::Literal(l) => l.value().to_string(),
        #[allow(unreachable_patterns)]
        other => other.to_string(),
    }
}

/// Escape text for use inside a double-quoted SPARQL string literal.
pub fn escape_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
