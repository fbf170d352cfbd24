//! The identifier resolution cascade.
//!
//! Sources are probed strictly in order and the first non-empty answer wins.
//! A non-empty resolution is memoized for the rest of the run; empty results
//! are not, so a transient miss can still be retried by a later call.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::PipelineConfig;
use crate::error::SourceResult;

use super::bio2rdf::{self, Bio2RdfLookup, Bio2RdfSearch};
use super::biomart::BiomartSource;
use super::linked::LinkedDataSource;
use super::sparql::{SparqlClient, StoreSparqlClient};
use super::{Lookup, LookupSource, Resolution, SourceClass, Symbol};

/// Ordered lookup sources plus the per-run memo table.
pub struct Cascade {
    sources: Vec<Box<dyn LookupSource>>,
    memo: DashMap<Symbol, Resolution>,
    workers: usize,
}

/// Outcome of resolving a batch of symbols.
#[derive(Debug, Clone, Default)]
pub struct ResolveReport {
    pub resolutions: BTreeMap<Symbol, Resolution>,
    pub resolved: usize,
    pub unresolved: Vec<Symbol>,
}

impl ResolveReport {
    pub fn total(&self) -> usize {
        self.resolutions.len()
    }
}

impl Cascade {
    pub fn new(sources: Vec<Box<dyn LookupSource>>, workers: usize) -> Self {
        Self {
            sources,
            memo: DashMap::new(),
            workers: workers.max(1),
        }
    }

    /// Build the production cascade.
    ///
    /// Order: registry (if enabled), BioMart, Bio2RDF direct lookup, Bio2RDF
    /// search, drug-repurposing endpoint (if enabled). With
    /// `bio2rdf.offline_dump` set, the direct lookup reads the dump and the
    /// search step is dropped. Fails only when that dump cannot be loaded.
    pub fn from_config(config: &PipelineConfig) -> SourceResult<Self> {
        let uri_base = config.resolution.uri_base.as_str();
        let mut sources: Vec<Box<dyn LookupSource>> = Vec::new();

        if let Some(registry) = LinkedDataSource::from_config(
            "registry",
            &config.registry,
            SourceClass::NeuralGeneRegistry,
        ) {
            sources.push(Box::new(registry));
        }
        if config.biomart.enabled {
            sources.push(Box::new(BiomartSource::from_config(&config.biomart, uri_base)));
        }
        if config.bio2rdf.enabled {
            match &config.bio2rdf.offline_dump {
                Some(dump) => {
                    let client: Arc<dyn SparqlClient> =
                        Arc::new(StoreSparqlClient::from_file(&config.paths.resolve(dump))?);
                    sources.push(Box::new(Bio2RdfLookup::new(client)));
                }
                None => {
                    let client = bio2rdf::http_client(&config.bio2rdf);
                    sources.push(Box::new(Bio2RdfLookup::new(client.clone())));
                    sources.push(Box::new(Bio2RdfSearch::new(client, &config.bio2rdf, uri_base)));
                }
            }
        }
        if let Some(redrugs) =
            LinkedDataSource::from_config("redrugs", &config.redrugs, SourceClass::FederatedLookup)
        {
            sources.push(Box::new(redrugs));
        }

        let cascade = Self::new(sources, config.resolution.workers);
        tracing::info!(
            sources = ?cascade.source_names(),
            workers = cascade.workers,
            "resolution cascade ready"
        );
        Ok(cascade)
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Memoized resolution, if one exists.
    pub fn cached(&self, symbol: &Symbol) -> Option<Resolution> {
        self.memo.get(symbol).map(|r| r.value().clone())
    }

    /// Resolve one symbol. Never fails: an exhausted cascade is an empty
    /// resolution.
    pub fn resolve(&self, symbol: &Symbol) -> Resolution {
        if let Some(hit) = self.memo.get(symbol) {
            return hit.value().clone();
        }

        let found = self.sources.iter().find_map(|source| match source.probe(symbol) {
            Lookup::Hit(candidates) => Some((source.name(), candidates)),
            Lookup::Miss => None,
        });

        match found {
            Some((name, candidates)) => {
                let resolution = Resolution::from_candidates(candidates);
                tracing::debug!(
                    symbol = %symbol,
                    source = name,
                    candidates = resolution.len(),
                    "symbol resolved"
                );
                // A concurrent resolver may have won the race; keep its answer.
                self.memo
                    .entry(symbol.clone())
                    .or_insert(resolution)
                    .value()
                    .clone()
            }
            None => {
                tracing::debug!(symbol = %symbol, "symbol unresolved");
                Resolution::empty()
            }
        }
    }

    /// Resolve a batch of symbols on the worker pool. Duplicates collapse.
    pub fn resolve_all(&self, symbols: impl IntoIterator<Item = Symbol>) -> ResolveReport {
        use rayon::prelude::*;

        let unique: Vec<Symbol> = symbols.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let work = || -> Vec<(Symbol, Resolution)> {
            unique
                .par_iter()
                .map(|symbol| (symbol.clone(), self.resolve(symbol)))
                .collect()
        };

        let pairs = match rayon::ThreadPoolBuilder::new().num_threads(self.workers).build() {
            Ok(pool) => pool.install(work),
            Err(e) => {
                tracing::warn!(error = %e, "could not build resolver pool; using the global pool");
                work()
            }
        };

        let mut report = ResolveReport::default();
        for (symbol, resolution) in pairs {
            if resolution.is_empty() {
                report.unresolved.push(symbol.clone());
            } else {
                report.resolved += 1;
            }
            report.resolutions.insert(symbol, resolution);
        }
        tracing::info!(
            total = report.total(),
            resolved = report.resolved,
            unresolved = report.unresolved.len(),
            "symbol resolution finished"
        );
        report
    }
}

impl std::fmt::Debug for Cascade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cascade")
            .field("sources", &self.source_names())
            .field("memoized", &self.memo.len())
            .field("workers", &self.workers)
            .finish()
    }
}
