//! The quad filter: preserve, wipe, or pass through.
//!
//! A single pass over the corpus decides each quad's fate:
//!
//! - **Preserve**: cluster-analysis facts this pipeline does not regenerate.
//!   Matched by instance type, by predicate, or by a marker substring.
//! - **Wipe**: everything else inside the stale subgraph (graph IRI under the
//!   wipe prefix). Dropped.
//! - **PassThrough**: everything outside the subgraph. Kept as-is.
//!
//! Type-based preservation is stateful: once `s rdf:type T` with a preserved
//! `T` has been seen in graph `g`, every later quad about `s` in `g` is
//! preserved too. That dependency on earlier lines is why the pass is
//! single-threaded.

use std::collections::HashSet;
use std::io::{BufRead, Write};

use oxigraph::model::{vocab::rdf, Quad, Term};

use crate::config::ReconcileConfig;

use super::{graph_iri, parse_line, subject_text, term_text, LineOutcome};

/// What to keep out of the wipe.
#[derive(Debug, Clone, Default)]
pub struct PreservationRules {
    pub types: HashSet<String>,
    pub predicates: HashSet<String>,
    pub marker: Option<String>,
    pub wipe_prefix: String,
}

impl PreservationRules {
    pub fn from_config(config: &ReconcileConfig) -> Self {
        Self {
            types: config.preserved_types.iter().cloned().collect(),
            predicates: config.preserved_predicates.iter().cloned().collect(),
            marker: config.marker.clone().filter(|m| !m.is_empty()),
            wipe_prefix: config.wipe_prefix.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Preserve,
    Wipe,
    PassThrough,
}

/// Applies [`PreservationRules`] quad by quad, remembering preserved
/// instances per graph.
#[derive(Debug)]
pub struct QuadClassifier {
    rules: PreservationRules,
    /// (subject, graph) pairs typed with a preserved type.
    instances: HashSet<(String, String)>,
}

impl QuadClassifier {
    pub fn new(rules: PreservationRules) -> Self {
        Self {
            rules,
            instances: HashSet::new(),
        }
    }

    pub fn classify(&mut self, quad: &Quad) -> Classification {
        if self.should_preserve(quad) {
            Classification::Preserve
        } else if graph_iri(quad).is_some_and(|g| g.starts_with(&self.rules.wipe_prefix)) {
            Classification::Wipe
        } else {
            Classification::PassThrough
        }
    }

    /// Number of preserved instances seen so far.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    fn should_preserve(&mut self, quad: &Quad) -> bool {
        let subject = subject_text(quad);
        let graph = quad.graph_name.to_string();

        if quad.predicate == rdf::TYPE {
            if let Term::NamedNode(ty) = &quad.object {
                if self.rules.types.contains(ty.as_str()) {
                    self.instances.insert((subject, graph));
                    return true;
                }
            }
        }
        if self.instances.contains(&(subject.clone(), graph)) {
            return true;
        }
        if self.rules.predicates.contains(quad.predicate.as_str()) {
            return true;
        }
        match &self.rules.marker {
            Some(marker) => subject.contains(marker.as_str()) || term_text(&quad.object).contains(marker.as_str()),
            None => false,
        }
    }
}

/// Counters for one filter pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub lines: usize,
    pub preserved: usize,
    pub wiped: usize,
    pub passed: usize,
    pub skipped: usize,
    pub malformed: usize,
}

/// Streams a corpus through a [`QuadClassifier`].
pub struct QuadFilter {
    classifier: QuadClassifier,
}

impl QuadFilter {
    pub fn new(rules: PreservationRules) -> Self {
        Self {
            classifier: QuadClassifier::new(rules),
        }
    }

    /// Run the pass. Preserved lines go to `preserved`, pass-through lines to
    /// `cleaned`; either may be `None` when that artifact already exists.
    /// Lines are written verbatim.
    pub fn run<'a>(
        &mut self,
        mut corpus: impl BufRead,
        mut preserved: Option<&'a mut dyn Write>,
        mut cleaned: Option<&'a mut dyn Write>,
    ) -> std::io::Result<FilterReport> {
        let mut report = FilterReport::default();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if corpus.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            report.lines += 1;

            let Ok(line) = std::str::from_utf8(&buf) else {
                report.malformed += 1;
                tracing::debug!(line = report.lines, "skipping non-UTF-8 corpus line");
                continue;
            };
            let quad = match parse_line(line) {
                LineOutcome::Quad(q) => q,
                LineOutcome::Skip => {
                    report.skipped += 1;
                    continue;
                }
                LineOutcome::Malformed(message) => {
                    report.malformed += 1;
                    tracing::debug!(line = report.lines, error = %message, "skipping malformed quad");
                    continue;
                }
            };

            let sink = match self.classifier.classify(&quad) {
                Classification::Preserve => {
                    report.preserved += 1;
                    preserved.as_deref_mut()
                }
                Classification::PassThrough => {
                    report.passed += 1;
                    cleaned.as_deref_mut()
                }
                Classification::Wipe => {
                    report.wiped += 1;
                    None
                }
            };
            if let Some(out) = sink {
                out.write_all(&buf)?;
                if !buf.ends_with(b"\n") {
                    out.write_all(b"\n")?;
                }
            }
        }

        if let Some(out) = preserved {
            out.flush()?;
        }
        if let Some(out) = cleaned {
            out.flush()?;
        }
        if report.malformed > 0 {
            tracing::warn!(malformed = report.malformed, "corpus contained malformed lines");
        }
        tracing::debug!(instances = self.classifier.instance_count(), "preserved instances tracked");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quads::LineOutcome;

    const SN: &str = "http://semnext.tw.rpi.edu/ontology/semnext#";
    const CORTECON: &str = "https://semnext.tw.rpi.edu/id/source/cortecon-neuralsci-org/cortecon/";

    fn classifier() -> QuadClassifier {
        QuadClassifier::new(PreservationRules::from_config(&ReconcileConfig::default()))
    }

    fn quad(line: &str) -> Quad {
        match parse_line(line) {
            LineOutcome::Quad(q) => q,
            other => panic!("bad test quad {line}: {other:?}"),
        }
    }

    #[test]
    fn z_score_predicate_is_preserved_inside_wipe_graph() {
        let q = quad(&format!(
            "<http://ex.org/x> <{SN}z-score> \"1.5\" <{CORTECON}gene> ."
        ));
        assert_eq!(classifier().classify(&q), Classification::Preserve);
    }

    #[test]
    fn predicate_rule_ignores_graph() {
        let q = quad(&format!("<http://ex.org/x> <{SN}z-score> \"1.5\" <http://other.org/g> ."));
        assert_eq!(classifier().classify(&q), Classification::Preserve);
        let q = quad(&format!("<http://ex.org/x> <{SN}z-score> \"1.5\" ."));
        assert_eq!(classifier().classify(&q), Classification::Preserve);
    }

    #[test]
    fn unmatched_quad_in_wipe_graph_is_wiped() {
        let q = quad(&format!(
            "<http://ex.org/x> <http://www.w3.org/2000/01/rdf-schema#label> \"BRCA1\" <{CORTECON}disease> ."
        ));
        assert_eq!(classifier().classify(&q), Classification::Wipe);
    }

    #[test]
    fn outside_wipe_prefix_passes_through() {
        let q = quad("<http://ex.org/x> <http://ex.org/p> \"v\" <https://semnext.tw.rpi.edu/id/source/other/> .");
        assert_eq!(classifier().classify(&q), Classification::PassThrough);
        let q = quad("<http://ex.org/x> <http://ex.org/p> \"v\" .");
        assert_eq!(classifier().classify(&q), Classification::PassThrough);
    }

    #[test]
    fn typed_instance_preserves_later_quads_in_same_graph() {
        let mut c = classifier();
        let g = format!("<{CORTECON}>");
        let typed = quad(&format!(
            "<http://ex.org/pca1> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <{SN}PCAScore> {g} ."
        ));
        let about = quad(&format!("<http://ex.org/pca1> <http://ex.org/p> \"v\" {g} ."));
        let elsewhere = quad(&format!(
            "<http://ex.org/pca1> <http://ex.org/p> \"v\" <{CORTECON}gene> ."
        ));

        // Before the type declaration nothing marks the subject.
        assert_eq!(c.classify(&about), Classification::Wipe);
        assert_eq!(c.classify(&typed), Classification::Preserve);
        assert_eq!(c.classify(&about), Classification::Preserve);
        assert_eq!(c.classify(&elsewhere), Classification::Wipe);
        assert_eq!(c.instance_count(), 1);
    }

    #[test]
    fn marker_in_subject_or_object_preserves() {
        let mut c = classifier();
        let s = quad(&format!("<http://ex.org/TCONS_0001> <http://ex.org/p> \"v\" <{CORTECON}gene> ."));
        let o = quad(&format!("<http://ex.org/x> <http://ex.org/p> \"TCONS_0002\" <{CORTECON}gene> ."));
        assert_eq!(c.classify(&s), Classification::Preserve);
        assert_eq!(c.classify(&o), Classification::Preserve);
    }

    #[test]
    fn run_routes_lines_and_counts_malformed() {
        let corpus = format!(
            "# header\n\
             <http://ex.org/x> <{SN}z-score> \"1.5\" <{CORTECON}gene> .\n\
             <http://ex.org/y> <http://ex.org/p> \"v\" <{CORTECON}gene> .\n\
             <http://ex.org/z> <http://ex.org/p> \"v\" <http://other.org/g> .\n\
             \n\
             <http://ex.org/broken> <http://ex.org/p> \n\
             <http://ex.org/w> <http://ex.org/p> \"last\" ."
        );
        let mut preserved = Vec::new();
        let mut cleaned = Vec::new();
        let report = QuadFilter::new(PreservationRules::from_config(&ReconcileConfig::default()))
            .run(corpus.as_bytes(), Some(&mut preserved), Some(&mut cleaned))
            .unwrap();

        assert_eq!(
            report,
            FilterReport {
                lines: 7,
                preserved: 1,
                wiped: 1,
                passed: 2,
                skipped: 2,
                malformed: 1,
            }
        );
        let preserved = String::from_utf8(preserved).unwrap();
        let cleaned = String::from_utf8(cleaned).unwrap();
        assert_eq!(preserved.lines().count(), 1);
        assert!(preserved.contains("z-score"));
        assert_eq!(
            cleaned,
            "<http://ex.org/z> <http://ex.org/p> \"v\" <http://other.org/g> .\n\
             <http://ex.org/w> <http://ex.org/p> \"last\" .\n"
        );
    }

    #[test]
    fn run_with_one_output_only() {
        let corpus = format!("<http://ex.org/x> <{SN}score> \"2\" <{CORTECON}> .\n");
        let mut cleaned = Vec::new();
        let report = QuadFilter::new(PreservationRules::from_config(&ReconcileConfig::default()))
            .run(corpus.as_bytes(), None, Some(&mut cleaned))
            .unwrap();
        assert_eq!(report.preserved, 1);
        assert!(cleaned.is_empty());
    }

    #[test]
    fn run_accepts_outputs_of_different_writer_types() {
        let corpus = format!(
            "<http://ex.org/x> <{SN}z-score> \"1.5\" <{CORTECON}gene> .\n\
             <http://ex.org/z> <http://ex.org/p> \"v\" .\n"
        );
        let mut preserved = Some(Vec::new());
        let mut cleaned = Some(std::io::Cursor::new(Vec::new()));
        let report = QuadFilter::new(PreservationRules::from_config(&ReconcileConfig::default()))
            .run(
                corpus.as_bytes(),
                preserved.as_mut().map(|w| w as &mut dyn Write),
                cleaned.as_mut().map(|w| w as &mut dyn Write),
            )
            .unwrap();

        assert_eq!((report.preserved, report.passed), (1, 1));
        let preserved = String::from_utf8(preserved.unwrap()).unwrap();
        let cleaned = String::from_utf8(cleaned.unwrap().into_inner()).unwrap();
        assert!(preserved.contains("z-score"));
        assert_eq!(cleaned, "<http://ex.org/z> <http://ex.org/p> \"v\" .\n");
    }
}
