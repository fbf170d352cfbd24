//! Bio2RDF federated triple-store lookups.
//!
//! Two cascade steps share the endpoint: a direct lookup by approved symbol,
//! and a free-text search whose hits are matched back against the symbol and
//! rewritten into SemNExT namespaces.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Bio2RdfConfig;
use crate::error::SourceResult;

use super::sparql::{escape_literal, HttpSparqlClient, SparqlClient};
use super::{CandidateUri, LookupSource, SourceClass, Symbol};

/// Bio2RDF namespace → path under the SemNExT source namespace.
const NAMESPACE_MAP: &[(&str, &str)] = &[
    ("http://bio2rdf.org/ncbigene", "cortecon-neuralsci-org/cortecon/gene/"),
    ("http://bio2rdf.org/hgnc", "bio2rdf-org/bio2rdf/hgnc/id/"),
    ("http://bio2rdf.org/hgnc.symbol", "bio2rdf-org/bio2rdf/hgnc/symbol/"),
];

/// Which matching search rows make it into the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Stop at the first matching row (rows come back by relevance).
    #[default]
    First,
    /// Scan the whole page; the last matching row wins.
    Last,
    /// Keep every matching row, in result order.
    All,
}

/// Build a shared HTTP client for the configured endpoint.
pub fn http_client(config: &Bio2RdfConfig) -> Arc<dyn SparqlClient> {
    Arc::new(HttpSparqlClient::new(
        "bio2rdf",
        config.endpoint.clone(),
        Duration::from_secs(config.timeout_secs),
    ))
}

// ---------------------------------------------------------------------------
// Direct lookup
// ---------------------------------------------------------------------------

/// Cascade step 2: resources whose approved symbol is exactly the symbol.
pub struct Bio2RdfLookup {
    client: Arc<dyn SparqlClient>,
}

impl Bio2RdfLookup {
    pub fn new(client: Arc<dyn SparqlClient>) -> Self {
        Self { client }
    }

    pub fn query(symbol: &Symbol) -> String {
        let lit = escape_literal(symbol.as_str());
        format!(
            "SELECT DISTINCT ?gene WHERE {{ \
               {{ ?gene <http://bio2rdf.org/hgnc_vocabulary:approved-symbol> \"{lit}\" }} \
               UNION {{ ?gene <http://bio2rdf.org/ncbigene_vocabulary:symbol> \"{lit}\" }} \
             }}"
        )
    }
}

impl LookupSource for Bio2RdfLookup {
    fn name(&self) -> &str {
        "bio2rdf-lookup"
    }

    fn resolve(&self, symbol: &Symbol) -> SourceResult<Vec<CandidateUri>> {
        let rows = self.client.select(&Self::query(symbol))?;
        let hits: Vec<CandidateUri> = rows
            .into_iter()
            .filter_map(|mut row| row.remove("gene"))
            .map(|uri| CandidateUri::new(uri, SourceClass::FederatedLookup))
            .collect();
        if !hits.is_empty() {
            tracing::debug!(symbol = %symbol, count = hits.len(), "bio2rdf lookup hit");
        }
        Ok(hits)
    }
}

// ---------------------------------------------------------------------------
// Free-text search
// ---------------------------------------------------------------------------

/// Cascade step 3: free-text search, matched case-insensitively.
pub struct Bio2RdfSearch {
    client: Arc<dyn SparqlClient>,
    limit: usize,
    policy: MatchPolicy,
    uri_base: String,
}

impl Bio2RdfSearch {
    pub fn new(client: Arc<dyn SparqlClient>, config: &Bio2RdfConfig, uri_base: &str) -> Self {
        Self {
            client,
            limit: config.search_limit,
            policy: config.match_policy,
            uri_base: uri_base.to_string(),
        }
    }

    /// Virtuoso free-text query over literal values.
    pub fn query(&self, symbol: &Symbol) -> String {
        let phrase = escape_literal(&symbol.as_str().replace(['"', '\''], ""));
        format!(
            "SELECT DISTINCT ?id ?value WHERE {{ \
               ?id ?p ?value . \
               ?value bif:contains '\"{phrase}\"' . \
               FILTER(isIRI(?id)) \
             }} LIMIT {}",
            self.limit
        )
    }

    /// Rewrite a Bio2RDF IRI (`http://bio2rdf.org/<ns>:<id>`) into the
    /// SemNExT namespace. `None` for namespaces outside the table.
    pub fn map_uri(&self, id: &str) -> Option<String> {
        let scheme_end = id.find("://")? + 3;
        let (ns_tail, local) = id[scheme_end..].split_once(':')?;
        if local.is_empty() {
            return None;
        }
        let namespace = &id[..scheme_end + ns_tail.len()];
        NAMESPACE_MAP
            .iter()
            .find(|(ns, _)| *ns == namespace)
            .map(|(_, path)| format!("{}{path}{local}", self.uri_base))
    }
}

impl LookupSource for Bio2RdfSearch {
    fn name(&self) -> &str {
        "bio2rdf-search"
    }

    fn resolve(&self, symbol: &Symbol) -> SourceResult<Vec<CandidateUri>> {
        let rows = self.client.select(&self.query(symbol))?;
        let variants = symbol.match_variants();
        let mut hits: Vec<CandidateUri> = Vec::new();

        for row in &rows {
            let (Some(id), Some(value)) = (row.get("id"), row.get("value")) else {
                continue;
            };
            let Some(uri) = self.map_uri(id) else {
                tracing::trace!(id = %id, "search hit outside mapped namespaces");
                continue;
            };
            if !variants.contains(&value.to_lowercase()) {
                continue;
            }
            tracing::debug!(symbol = %symbol, uri = %uri, policy = ?self.policy, "bio2rdf search hit");
            let hit = CandidateUri::new(uri, SourceClass::FederatedSearch);
            match self.policy {
                MatchPolicy::First => return Ok(vec![hit]),
                MatchPolicy::Last => {
                    hits.clear();
                    hits.push(hit);
                }
                MatchPolicy::All => hits.push(hit),
            }
        }
        Ok(hits)
    }
}
