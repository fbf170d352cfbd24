//! Generic SPARQL label lookup for auxiliary linked-data endpoints.
//!
//! Used for the local neural-science gene registry and the drug-repurposing
//! endpoint. Both are off unless enabled in the configuration. When on, the
//! registry runs ahead of BioMart (its class outranks every other) and the
//! drug-repurposing endpoint runs after the Bio2RDF search.

use std::sync::Arc;
use std::time::Duration;

use crate::config::LinkedDataConfig;
use crate::error::SourceResult;

use super::sparql::{escape_literal, HttpSparqlClient, SparqlClient};
use super::{CandidateUri, LookupSource, SourceClass, Symbol};

pub struct LinkedDataSource {
    name: String,
    client: Arc<dyn SparqlClient>,
    label_predicate: String,
    class: SourceClass,
}

impl LinkedDataSource {
    pub fn new(
        name: impl Into<String>,
        client: Arc<dyn SparqlClient>,
        label_predicate: impl Into<String>,
        class: SourceClass,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            label_predicate: label_predicate.into(),
            class,
        }
    }

    /// Build from config, or `None` when the endpoint is disabled.
    pub fn from_config(name: &str, config: &LinkedDataConfig, class: SourceClass) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let client = HttpSparqlClient::new(
            name,
            config.endpoint.clone(),
            Duration::from_secs(config.timeout_secs),
        );
        Some(Self::new(name, Arc::new(client), config.label_predicate.clone(), class))
    }

    /// Case-insensitive exact label match.
    pub fn query(&self, symbol: &Symbol) -> String {
        let lit = escape_literal(&symbol.as_str().to_lowercase());
        format!(
            "SELECT DISTINCT ?s WHERE {{ ?s <{}> ?label . FILTER(isIRI(?s) && lcase(str(?label)) = \"{lit}\") }}",
            self.label_predicate
        )
    }
}

impl LookupSource for LinkedDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, symbol: &Symbol) -> SourceResult<Vec<CandidateUri>> {
        let rows = self.client.select(&self.query(symbol))?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| row.remove("s"))
            .map(|uri| CandidateUri::new(uri, self.class))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::sparql::StoreSparqlClient;
    use oxigraph::model::{GraphName, Literal, NamedNode, Quad};

    const LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";

    fn registry() -> LinkedDataSource {
        let store = StoreSparqlClient::in_memory().unwrap();
        store
            .insert(&Quad::new(
                NamedNode::new("https://semnext.tw.rpi.edu/id/source/cortecon-neuralsci-org/cortecon/gene/3845").unwrap(),
                NamedNode::new(LABEL).unwrap(),
                Literal::new_simple_literal("KRAS"),
                GraphName::DefaultGraph,
            ))
            .unwrap();
        LinkedDataSource::new("registry", Arc::new(store), LABEL, SourceClass::NeuralGeneRegistry)
    }

    #[test]
    fn label_lookup_is_case_insensitive() {
        let hits = registry().resolve(&Symbol::new("kras")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].class, SourceClass::NeuralGeneRegistry);
        assert!(hits[0].uri.ends_with("/gene/3845"));
    }

    #[test]
    fn unknown_label_is_empty() {
        assert!(registry().resolve(&Symbol::new("NRAS")).unwrap().is_empty());
    }

    #[test]
    fn disabled_config_builds_nothing() {
        assert!(LinkedDataSource::from_config(
            "redrugs",
            &LinkedDataConfig::redrugs(),
            SourceClass::FederatedLookup
        )
        .is_none());
    }
}
