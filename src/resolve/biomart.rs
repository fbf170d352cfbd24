//! BioMart gene-annotation lookup.
//!
//! The mart is asked, one filter key at a time, which gene the symbol names.
//! The first response row of the first filter key that yields a usable field
//! wins; results are never aggregated across filter keys. Within a row the
//! fields are ranked Entrez > HGNC ID > HGNC symbol > Ensembl gene ID.

use std::time::Duration;

use crate::config::BiomartConfig;
use crate::error::{SourceError, SourceResult};

use super::{strip_curie_prefix, CandidateUri, LookupSource, SourceClass, Symbol};

/// Sentinel BioMart (and R) use for an absent value.
const NOT_AVAILABLE: &str = "NA";

/// Gene identifier kinds a mart row can carry, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneField {
    Entrez,
    HgncId,
    HgncSymbol,
    Ensembl,
}

impl GeneField {
    pub const PRIORITY: [GeneField; 4] = [
        GeneField::Entrez,
        GeneField::HgncId,
        GeneField::HgncSymbol,
        GeneField::Ensembl,
    ];

    pub fn class(self) -> SourceClass {
        match self {
            GeneField::Entrez => SourceClass::MappingEntrez,
            GeneField::HgncId => SourceClass::MappingHgncId,
            GeneField::HgncSymbol => SourceClass::MappingHgncSymbol,
            GeneField::Ensembl => SourceClass::MappingEnsembl,
        }
    }

    /// Path under the SemNExT source namespace for this field kind.
    fn path(self) -> &'static str {
        match self {
            GeneField::Entrez => "cortecon-neuralsci-org/cortecon/gene/",
            GeneField::HgncId => "biomart-ensembl-org/biomart/hgnc/id/",
            GeneField::HgncSymbol => "biomart-ensembl-org/biomart/hgnc/symbol/",
            GeneField::Ensembl => "biomart-ensembl-org/biomart/ensembl/id/",
        }
    }

    /// Normalized identifier, or `None` if the raw cell is absent or not a
    /// valid value of this kind.
    fn normalize(self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() || raw == NOT_AVAILABLE {
            return None;
        }
        let value = match self {
            GeneField::Entrez => {
                if !raw.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                raw
            }
            GeneField::HgncId | GeneField::HgncSymbol => strip_curie_prefix(raw),
            GeneField::Ensembl => raw,
        };
        if value.is_empty() || value.contains(char::is_whitespace) {
            return None;
        }
        Some(value.to_string())
    }

    /// Wrap a value into its canonical URI.
    pub fn uri(self, uri_base: &str, value: &str) -> String {
        format!("{uri_base}{}{value}", self.path())
    }
}

/// Pick the highest-priority present field of a mart row. `row[i]` holds the
/// attribute for `GeneField::PRIORITY[i]`.
pub fn pick_field(row: &[String], uri_base: &str) -> Option<CandidateUri> {
    GeneField::PRIORITY
        .iter()
        .zip(row.iter())
        .find_map(|(&field, cell)| {
            field
                .normalize(cell)
                .map(|value| CandidateUri::new(field.uri(uri_base, &value), field.class()))
        })
}

/// Tabular query interface of a mart.
pub trait MartService: Send + Sync {
    /// Rows of `attributes` for genes where `filter` equals `value`.
    fn query(&self, filter: &str, value: &str, attributes: &[&str]) -> SourceResult<Vec<Vec<String>>>;
}

/// BioMart REST `martservice` endpoint.
pub struct HttpMartService {
    url: String,
    dataset: String,
    agent: ureq::Agent,
}

impl HttpMartService {
    pub fn new(url: impl Into<String>, dataset: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            dataset: dataset.into(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    /// The XML query document for one filter/value pair.
    pub fn query_xml(&self, filter: &str, value: &str, attributes: &[&str]) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><!DOCTYPE Query><Query virtualSchemaName="default" formatter="TSV" header="0" uniqueRows="1" datasetConfigVersion="0.6">"#,
        );
        xml.push_str(&format!(
            r#"<Dataset name="{}" interface="default">"#,
            xml_escape(&self.dataset)
        ));
        xml.push_str(&format!(
            r#"<Filter name="{}" value="{}"/>"#,
            xml_escape(filter),
            xml_escape(value)
        ));
        for attr in attributes {
            xml.push_str(&format!(r#"<Attribute name="{}"/>"#, xml_escape(attr)));
        }
        xml.push_str("</Dataset></Query>");
        xml
    }
}

impl MartService for HttpMartService {
    fn query(&self, filter: &str, value: &str, attributes: &[&str]) -> SourceResult<Vec<Vec<String>>> {
        let xml = self.query_xml(filter, value, attributes);
        let body = match self.agent.get(&self.url).query("query", &xml).call() {
            Ok(resp) => resp.into_string().map_err(|e| SourceError::Response {
                source_name: "biomart".into(),
                message: format!("failed to read body: {e}"),
            })?,
            Err(ureq::Error::Status(code, resp)) => {
                return Err(SourceError::Status {
                    source_name: "biomart".into(),
                    status: code,
                    body: resp.into_string().unwrap_or_default(),
                });
            }
            Err(ureq::Error::Transport(t)) => {
                return Err(SourceError::Transport {
                    source_name: "biomart".into(),
                    message: t.to_string(),
                });
            }
        };
        parse_tsv(&body)
    }
}

impl std::fmt::Debug for HttpMartService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMartService")
            .field("url", &self.url)
            .field("dataset", &self.dataset)
            .finish()
    }
}

/// Parse a headerless TSV mart response. BioMart reports query errors with
/// status 200 and a body starting with "Query ERROR".
fn parse_tsv(body: &str) -> SourceResult<Vec<Vec<String>>> {
    if body.trim_start().starts_with("Query ERROR") || body.contains("ERROR caught") {
        return Err(SourceError::Response {
            source_name: "biomart".into(),
            message: body.lines().next().unwrap_or("query error").to_string(),
        });
    }
    Ok(body
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.split('\t').map(str::to_string).collect())
        .collect())
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Cascade step 1: BioMart over an ordered filter-key list.
pub struct BiomartSource {
    service: Box<dyn MartService>,
    filters: Vec<String>,
    attributes: [String; 4],
    uri_base: String,
}

impl BiomartSource {
    pub fn new(service: Box<dyn MartService>, config: &BiomartConfig, uri_base: &str) -> Self {
        let mut filters: Vec<String> = Vec::with_capacity(config.filters.len());
        for f in &config.filters {
            if !filters.contains(f) {
                filters.push(f.clone());
            }
        }
        Self {
            service,
            filters,
            attributes: [
                config.entrez_attribute.clone(),
                config.hgnc_id_attribute.clone(),
                config.hgnc_symbol_attribute.clone(),
                config.ensembl_attribute.clone(),
            ],
            uri_base: uri_base.to_string(),
        }
    }

    pub fn from_config(config: &BiomartConfig, uri_base: &str) -> Self {
        let service = HttpMartService::new(
            config.url.clone(),
            config.dataset.clone(),
            Duration::from_secs(config.timeout_secs),
        );
        Self::new(Box::new(service), config, uri_base)
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }
}

impl LookupSource for BiomartSource {
    fn name(&self) -> &str {
        "biomart"
    }

    fn resolve(&self, symbol: &Symbol) -> SourceResult<Vec<CandidateUri>> {
        let attributes: Vec<&str> = self.attributes.iter().map(String::as_str).collect();
        let mut last_error = None;
        let mut answered = false;

        for filter in &self.filters {
            match self.service.query(filter, symbol.as_str(), &attributes) {
                Ok(rows) => {
                    answered = true;
                    if let Some(candidate) = rows.first().and_then(|row| pick_field(row, &self.uri_base)) {
                        tracing::debug!(
                            symbol = %symbol,
                            filter = %filter,
                            uri = %candidate.uri,
                            class = %candidate.class,
                            "biomart hit"
                        );
                        return Ok(vec![candidate]);
                    }
                }
                Err(e) => {
                    tracing::debug!(symbol = %symbol, filter = %filter, error = %e, "biomart filter failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !answered => Err(e),
            _ => Ok(Vec::new()),
        }
    }
}
