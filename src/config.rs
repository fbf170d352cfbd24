//! Pipeline configuration, persisted as TOML.
//!
//! A single `PipelineConfig` is loaded at process start and passed by
//! reference into the resolution cascade and the quad stages. Every field has
//! a default matching the SemNExT deployment, so an absent config file means
//! "run against the standard layout and public endpoints".

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resolve::bio2rdf::MatchPolicy;

/// Errors from configuration loading.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(semnext::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(semnext::config::parse),
        help("Check the TOML syntax and the section names ([paths], [biomart], [bio2rdf], [registry], [redrugs], [resolution], [reconcile]).")
    )]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(semnext::config::invalid), help("{message}"))]
    Invalid { message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Root of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub biomart: BiomartConfig,
    pub bio2rdf: Bio2RdfConfig,
    /// Local neural-science gene registry (SPARQL label lookup).
    pub registry: LinkedDataConfig,
    /// Drug-repurposing linked-data endpoint.
    pub redrugs: LinkedDataConfig,
    pub resolution: ResolutionConfig,
    pub reconcile: ReconcileConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            biomart: BiomartConfig::default(),
            bio2rdf: Bio2RdfConfig::default(),
            registry: LinkedDataConfig::default(),
            redrugs: LinkedDataConfig::redrugs(),
            resolution: ResolutionConfig::default(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config = Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })?;
        tracing::debug!(path = %path.display(), "loaded pipeline config");
        Ok(config)
    }

    /// Load from `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Parse configuration from a TOML string and validate it.
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".into(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML (used by `semnext-reconcile config`).
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            message: format!("config is not serializable: {e}"),
        })
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.resolution.workers == 0 {
            return Err(ConfigError::Invalid {
                message: "resolution.workers must be at least 1".into(),
            });
        }
        if self.reconcile.wipe_prefix.is_empty() {
            return Err(ConfigError::Invalid {
                message: "reconcile.wipe_prefix must not be empty; an empty prefix would wipe every named graph".into(),
            });
        }
        if self.biomart.enabled && self.biomart.filters.is_empty() {
            return Err(ConfigError::Invalid {
                message: "biomart.filters must list at least one filter key when biomart is enabled".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// [paths]
// ---------------------------------------------------------------------------

/// Input and output locations. Relative entries resolve against `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub corpus: PathBuf,
    pub gene_clock: PathBuf,
    pub associations: PathBuf,
    pub disease_reference: PathBuf,
    /// Newly derived facts, merged in the final stage.
    pub derived: PathBuf,
    /// Turtle document carrying placeholder gene URIs.
    pub placeholder_document: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            corpus: PathBuf::from("quads/semnext-dump.nq"),
            gene_clock: PathBuf::from("tabular/GeneClockData.csv"),
            associations: PathBuf::from("tabular/Restricted.disease.table.csv"),
            disease_reference: PathBuf::from("tabular/disease_filtered.csv"),
            derived: PathBuf::from("output/disease.trig"),
            placeholder_document: PathBuf::from("disease.ttl"),
        }
    }
}

impl PathsConfig {
    /// Resolve a configured path against the data directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    /// Absolute-or-data-relative output directory.
    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.output_dir)
    }
}

// ---------------------------------------------------------------------------
// [biomart]
// ---------------------------------------------------------------------------

/// BioMart gene-annotation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BiomartConfig {
    pub enabled: bool,
    pub url: String,
    pub dataset: String,
    /// Filter keys tried in order for every symbol.
    pub filters: Vec<String>,
    pub entrez_attribute: String,
    pub hgnc_id_attribute: String,
    pub hgnc_symbol_attribute: String,
    pub ensembl_attribute: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BiomartConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://www.ensembl.org/biomart/martservice".into(),
            dataset: "hsapiens_gene_ensembl".into(),
            filters: [
                "hgnc_symbol",
                "ens_hs_gene",
                "ens_hs_transcript",
                "entrezgene_id",
                "ensembl_gene_id",
                "clone_based_ensembl_gene_name",
                "clone_based_ensembl_transcript_name",
                "clone_based_vega_gene_name",
                "clone_based_vega_transcript_name",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            entrez_attribute: "entrezgene_id".into(),
            hgnc_id_attribute: "hgnc_id".into(),
            hgnc_symbol_attribute: "hgnc_symbol".into(),
            ensembl_attribute: "ensembl_gene_id".into(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// [bio2rdf]
// ---------------------------------------------------------------------------

/// Bio2RDF federated SPARQL endpoint (direct lookup + free-text search).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Bio2RdfConfig {
    pub enabled: bool,
    pub endpoint: String,
    /// Maximum rows requested from the free-text search.
    pub search_limit: usize,
    pub match_policy: MatchPolicy,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Local RDF dump answering the direct lookup instead of `endpoint`
    /// (data-dir relative). The free-text search needs the endpoint's
    /// full-text index and is left out when this is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offline_dump: Option<PathBuf>,
}

impl Default for Bio2RdfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "http://pubmed.bio2rdf.org/sparql".into(),
            search_limit: 100,
            match_policy: MatchPolicy::First,
            timeout_secs: default_timeout_secs(),
            offline_dump: None,
        }
    }
}

// ---------------------------------------------------------------------------
// [registry] / [redrugs]
// ---------------------------------------------------------------------------

/// A SPARQL endpoint queried by gene label. Disabled unless switched on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkedDataConfig {
    pub enabled: bool,
    pub endpoint: String,
    /// Predicate linking a gene resource to its symbol literal.
    pub label_predicate: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LinkedDataConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://localhost:8890/sparql".into(),
            label_predicate: "http://www.w3.org/2000/01/rdf-schema#label".into(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LinkedDataConfig {
    /// Defaults for the ReDrugS endpoint.
    pub fn redrugs() -> Self {
        Self {
            endpoint: "http://redrugs.tw.rpi.edu/bigdata/sparql".into(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// [resolution]
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Worker threads for resolving independent symbols.
    pub workers: usize,
    /// Namespace of placeholder gene URIs in the derived document.
    pub tmp_prefix: String,
    /// Base of every canonical SemNExT source URI.
    pub uri_base: String,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            tmp_prefix: "https://semnext.tw.rpi.edu/temporary/prefix/".into(),
            uri_base: "https://semnext.tw.rpi.edu/id/source/".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// [reconcile]
// ---------------------------------------------------------------------------

const SEMNEXT_ONTOLOGY: &str = "http://semnext.tw.rpi.edu/ontology/semnext#";

/// Preservation rules and the stale subgraph boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub wipe_prefix: String,
    pub preserved_types: Vec<String>,
    pub preserved_predicates: Vec<String>,
    /// Substring that preserves any quad whose subject or object contains it.
    pub marker: Option<String>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        let semnext = |local: &str| format!("{SEMNEXT_ONTOLOGY}{local}");
        Self {
            wipe_prefix: "https://semnext.tw.rpi.edu/id/source/cortecon-neuralsci-org/cortecon/"
                .into(),
            preserved_types: [
                "FuzzyClusterMembership",
                "PrincipalComponentAnalysis",
                "PCAOutput",
                "PCAVector",
                "PCAScore",
                "Cluster",
                "RelativeActivation",
                "Experiment",
            ]
            .into_iter()
            .map(semnext)
            .collect(),
            preserved_predicates: [
                "fuzzyMemberOf",
                "coordinate",
                "hasAnalysis",
                "inCluster",
                "score",
                "frequency",
                "durationSinceStart",
                "z-score",
                "dimension",
                "memberOf",
            ]
            .into_iter()
            .map(semnext)
            .chain(
                [
                    "http://open.vocab.org/terms/subjectDiscriminator",
                    "http://purl.org/dc/terms/isReferencedBy",
                    "http://rdfs.org/ns/void#inDataset",
                    "http://purl.org/dc/terms/identifier",
                ]
                .into_iter()
                .map(String::from),
            )
            .collect(),
            marker: Some("TCONS".into()),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert!(config.biomart.enabled);
        assert!(!config.registry.enabled);
        assert_eq!(config.bio2rdf.match_policy, MatchPolicy::First);
        assert_eq!(config.reconcile.marker.as_deref(), Some("TCONS"));
        assert!(config
            .reconcile
            .preserved_predicates
            .iter()
            .any(|p| p.ends_with("#z-score")));
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            [bio2rdf]
            match_policy = "last"
            search_limit = 20

            [paths]
            data_dir = "/srv/semnext"
            "#,
        )
        .unwrap();
        assert_eq!(config.bio2rdf.match_policy, MatchPolicy::Last);
        assert_eq!(config.bio2rdf.search_limit, 20);
        assert_eq!(config.bio2rdf.timeout_secs, 30);
        assert_eq!(
            config.paths.resolve(&config.paths.corpus),
            PathBuf::from("/srv/semnext/quads/semnext-dump.nq")
        );
    }

    #[test]
    fn zero_workers_rejected() {
        let err = PipelineConfig::from_toml("[resolution]\nworkers = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = PipelineConfig::from_toml("[paths\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn defaults_roundtrip_through_toml() {
        let text = PipelineConfig::default().to_toml().unwrap();
        let back = PipelineConfig::from_toml(&text).unwrap();
        assert_eq!(back.reconcile.preserved_types.len(), 8);
        assert_eq!(back.redrugs.endpoint, PipelineConfig::default().redrugs.endpoint);
    }

    #[test]
    fn offline_dump_is_optional() {
        assert!(PipelineConfig::default().bio2rdf.offline_dump.is_none());
        assert!(!PipelineConfig::default().to_toml().unwrap().contains("offline_dump"));

        let config =
            PipelineConfig::from_toml("[bio2rdf]\noffline_dump = \"mirror/bio2rdf.nq\"\n").unwrap();
        assert_eq!(
            config.bio2rdf.offline_dump.as_deref(),
            Some(Path::new("mirror/bio2rdf.nq"))
        );
        assert!(config.bio2rdf.enabled);
    }
}
