//! Gene identifier resolution.
//!
//! A free-text gene [`Symbol`] is resolved to canonical URIs by probing
//! external knowledge bases in a fixed priority order:
//!
//! - **Lookup sources** ([`LookupSource`]): one adapter per knowledge base
//!   ([`biomart`], [`bio2rdf`], [`linked`]), all speaking the same
//!   "symbol → candidate URIs" contract.
//! - **Cascade** ([`cascade::Cascade`]): folds over the ordered sources and
//!   stops at the first [`Lookup::Hit`], memoizing the result per symbol.
//! - **Placeholders** ([`placeholder`]): finds the symbols to resolve in the
//!   derived document and writes the mapping table.

pub mod bio2rdf;
pub mod biomart;
pub mod cascade;
pub mod linked;
pub mod placeholder;
pub mod sparql;

use serde::{Deserialize, Serialize};

use crate::error::SourceResult;

/// A free-text gene identifier (HGNC symbol, locus tag, ...).
///
/// Equality is byte equality. Case and hyphen variants are distinct symbols;
/// sources may still try them as lookup variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased text and lowercased hyphen-stripped text, for
    /// case-insensitive matching against search results.
    pub fn match_variants(&self) -> [String; 2] {
        let lower = self.0.to_lowercase();
        let stripped = lower.replace('-', "");
        [lower, stripped]
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Where a candidate URI came from. Declaration order is priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceClass {
    /// Local neural-science gene registry.
    NeuralGeneRegistry,
    /// Gene-annotation mapping by Entrez-equivalent ID.
    MappingEntrez,
    /// Gene-annotation mapping by HGNC ID.
    MappingHgncId,
    /// Gene-annotation mapping by HGNC symbol.
    MappingHgncSymbol,
    /// Gene-annotation mapping by Ensembl gene ID.
    MappingEnsembl,
    /// Federated triple-store direct hit.
    FederatedLookup,
    /// Federated triple-store free-text search hit.
    FederatedSearch,
}

impl SourceClass {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceClass::NeuralGeneRegistry => "neural-gene-registry",
            SourceClass::MappingEntrez => "mapping-entrez",
            SourceClass::MappingHgncId => "mapping-hgnc-id",
            SourceClass::MappingHgncSymbol => "mapping-hgnc-symbol",
            SourceClass::MappingEnsembl => "mapping-ensembl",
            SourceClass::FederatedLookup => "federated-lookup",
            SourceClass::FederatedSearch => "federated-search",
        }
    }
}

impl std::fmt::Display for SourceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved canonical identifier tagged with its source class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateUri {
    pub uri: String,
    pub class: SourceClass,
}

impl CandidateUri {
    pub fn new(uri: impl Into<String>, class: SourceClass) -> Self {
        Self {
            uri: uri.into(),
            class,
        }
    }
}

/// The candidate set for one symbol, first-occurrence order, no duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    candidates: Vec<CandidateUri>,
}

impl Resolution {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from candidates, dropping repeated URIs.
    pub fn from_candidates(candidates: impl IntoIterator<Item = CandidateUri>) -> Self {
        let mut out: Vec<CandidateUri> = Vec::new();
        for c in candidates {
            if !out.iter().any(|existing| existing.uri == c.uri) {
                out.push(c);
            }
        }
        Self { candidates: out }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn candidates(&self) -> &[CandidateUri] {
        &self.candidates
    }

    /// The preferred URI, if any.
    pub fn primary(&self) -> Option<&CandidateUri> {
        self.candidates.first()
    }

    /// The preferred URI, or the literal symbol text when unresolved.
    pub fn uri_or_symbol<'a>(&'a self, symbol: &'a Symbol) -> &'a str {
        self.primary().map(|c| c.uri.as_str()).unwrap_or(symbol.as_str())
    }
}

/// Outcome of probing one source for one symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Hit(Vec<CandidateUri>),
    Miss,
}

impl Lookup {
    /// Normalize an adapter answer: an empty candidate list is a miss.
    pub fn from_candidates(candidates: Vec<CandidateUri>) -> Self {
        if candidates.is_empty() {
            Lookup::Miss
        } else {
            Lookup::Hit(candidates)
        }
    }
}

/// One external knowledge base behind the uniform resolution contract.
///
/// Implementations must not mutate shared state; the cascade may call them
/// from several worker threads at once.
pub trait LookupSource: Send + Sync {
    /// Short name for logs and reports.
    fn name(&self) -> &str;

    /// Candidate URIs for `symbol`, best first. Empty when nothing matched.
    fn resolve(&self, symbol: &Symbol) -> SourceResult<Vec<CandidateUri>>;

    /// Like [`resolve`](Self::resolve), but a backend failure becomes a miss.
    fn probe(&self, symbol: &Symbol) -> Lookup {
        match self.resolve(symbol) {
            Ok(candidates) => Lookup::from_candidates(candidates),
            Err(e) => {
                tracing::warn!(
                    source = self.name(),
                    symbol = %symbol,
                    error = %e,
                    "lookup source failed, treating as no result"
                );
                Lookup::Miss
            }
        }
    }
}

/// Value of an identifier with any `PREFIX:` namespace stripped
/// (`HGNC:1100` → `1100`).
pub(crate) fn strip_curie_prefix(value: &str) -> &str {
    value.split_once(':').map(|(_, local)| local).unwrap_or(value)
}
