//! The staged reconciliation pipeline.
//!
//! Stages run strictly in order, each producing one artifact under the
//! output directory (see [`StageKind`]). A stage whose artifact already
//! exists is skipped, so an interrupted run resumes from the first missing
//! artifact. Inputs a stage needs from an earlier one must exist; a missing
//! input is fatal.
//!
//! - **prepare**: clean the association table, then intersect it with the
//!   cluster-analysis gene set.
//! - **resolve**: collect placeholder gene symbols and write their URIs.
//! - **reconcile**: filter the corpus (preserve + wipe in one pass), merge
//!   the two kept streams, then merge in the derived dataset.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::error::{QuadError, ReconcileResult, TabularError};
use crate::quads::filter::{PreservationRules, QuadFilter};
use crate::quads::merge::{merge_preserved_and_cleaned, merge_with_derived, DerivedIndex};
use crate::resolve::cascade::Cascade;
use crate::resolve::placeholder::{placeholder_symbols, write_mapping};
use crate::staging::{require_input, ArtifactPaths, StagedFile};
use crate::tabular::{
    clean_associations, gene_superset, write_intersection, CsvReader, CsvWriter, DiseaseReference,
};

pub use crate::staging::StageKind;

/// Record counts a stage reports when it finishes. All zero for a skipped
/// stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCounts {
    /// Input records, lines or symbols read.
    pub read: usize,
    /// Records or lines written to the artifact.
    pub written: usize,
    /// Input left out on purpose (filtered rows, wiped or duplicate quads).
    pub dropped: usize,
    /// Input lines that could not be parsed.
    pub malformed: usize,
    /// Symbols no lookup source could resolve.
    pub unresolved: usize,
}

impl std::fmt::Display for StageCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "read={} written={} dropped={} malformed={} unresolved={}",
            self.read, self.written, self.dropped, self.malformed, self.unresolved
        )
    }
}

/// What happened to one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRun {
    pub stage: StageKind,
    pub artifact: PathBuf,
    /// The artifact already existed and the stage did not run.
    pub skipped: bool,
    pub counts: StageCounts,
}

/// Runs stages against one configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    artifacts: ArtifactPaths,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let artifacts = ArtifactPaths::from_config(&config.paths);
        Self { config, artifacts }
    }

    pub fn artifacts(&self) -> &ArtifactPaths {
        &self.artifacts
    }

    /// A configured input path, resolved against the data directory.
    fn input(&self, path: &Path) -> PathBuf {
        self.config.paths.resolve(path)
    }

    /// Run `body` into a staged artifact unless the artifact exists.
    fn run_stage<F>(&self, stage: StageKind, body: F) -> ReconcileResult<StageRun>
    where
        F: FnOnce(&mut StagedFile) -> ReconcileResult<StageCounts>,
    {
        let artifact = self.artifacts.artifact(stage);
        if self.artifacts.is_produced(stage) {
            tracing::info!(stage = %stage, artifact = %artifact.display(), "artifact present, skipping stage");
            return Ok(StageRun {
                stage,
                artifact,
                skipped: true,
                counts: StageCounts::default(),
            });
        }

        self.artifacts.ensure_dirs()?;
        tracing::info!(stage = %stage, "stage started");
        let mut staged = StagedFile::create(&artifact)?;
        let counts = body(&mut staged)?;
        staged.commit()?;
        tracing::info!(stage = %stage, artifact = %artifact.display(), %counts, "stage finished");
        Ok(StageRun {
            stage,
            artifact,
            skipped: false,
            counts,
        })
    }

    // -----------------------------------------------------------------------
    // prepare
    // -----------------------------------------------------------------------

    /// Clean the association table and write the intersection file.
    pub fn prepare(&self) -> ReconcileResult<Vec<StageRun>> {
        let clean = self.run_stage(StageKind::CleanAssociations, |out| {
            let input = require_input(
                &self.input(&self.config.paths.associations),
                StageKind::CleanAssociations,
            )?;
            let mut writer = CsvWriter::new(out, StageKind::CleanAssociations.artifact_file());
            let report = clean_associations(CsvReader::open(&input)?, &mut writer)?;
            tracing::info!(
                rows = report.rows,
                written = report.written,
                symbol_fallbacks = report.symbol_fallbacks,
                skipped = report.skipped,
                "associations cleaned"
            );
            Ok(StageCounts {
                read: report.rows,
                written: report.written,
                dropped: report.skipped,
                ..StageCounts::default()
            })
        })?;

        let intersection = self.run_stage(StageKind::Intersection, |out| {
            let cleaned = self
                .artifacts
                .require(StageKind::CleanAssociations, StageKind::Intersection)?;
            let gene_clock = require_input(
                &self.input(&self.config.paths.gene_clock),
                StageKind::Intersection,
            )?;
            let reference = require_input(
                &self.input(&self.config.paths.disease_reference),
                StageKind::Intersection,
            )?;

            let genes = gene_superset(CsvReader::open(&gene_clock)?)?;
            let reference = DiseaseReference::load(CsvReader::open(&reference)?)?;
            tracing::debug!(genes = genes.len(), diseases = reference.len(), "reference tables loaded");

            let mut writer = CsvWriter::new(out, StageKind::Intersection.artifact_file());
            let report = write_intersection(CsvReader::open(&cleaned)?, &genes, &reference, &mut writer)?;
            tracing::info!(
                rows = report.rows,
                written = report.written,
                unknown_disease = report.unknown_disease,
                "intersection written"
            );
            Ok(StageCounts {
                read: report.rows,
                written: report.written,
                dropped: report.rows - report.written,
                ..StageCounts::default()
            })
        })?;

        Ok(vec![clean, intersection])
    }

    // -----------------------------------------------------------------------
    // resolve
    // -----------------------------------------------------------------------

    /// Resolve every placeholder gene symbol and write the mapping table.
    pub fn resolve_genes(&self, cascade: &Cascade) -> ReconcileResult<StageRun> {
        self.run_stage(StageKind::ResolveGenes, |out| {
            let document = require_input(
                &self.input(&self.config.paths.placeholder_document),
                StageKind::ResolveGenes,
            )?;
            let symbols = placeholder_symbols(&document, &self.config.resolution.tmp_prefix)?;
            let report = cascade.resolve_all(symbols);
            if !report.unresolved.is_empty() {
                tracing::warn!(
                    count = report.unresolved.len(),
                    "symbols left unresolved; mapping falls back to the literal symbol"
                );
            }
            let rows = write_mapping(&report.resolutions, out)
                .map_err(|e| TabularError::io(StageKind::ResolveGenes.artifact_file(), e))?;
            tracing::info!(rows, resolved = report.resolved, "mapping table written");
            Ok(StageCounts {
                read: report.total(),
                written: rows,
                unresolved: report.unresolved.len(),
                ..StageCounts::default()
            })
        })
    }

    // -----------------------------------------------------------------------
    // reconcile
    // -----------------------------------------------------------------------

    /// Filter the corpus and run both merge stages.
    pub fn reconcile(&self) -> ReconcileResult<Vec<StageRun>> {
        let mut runs = self.filter_corpus()?;

        let merged_base = self.run_stage(StageKind::MergeBase, |out| {
            let preserved = self.artifacts.require(StageKind::Preserve, StageKind::MergeBase)?;
            let cleaned = self.artifacts.require(StageKind::Wipe, StageKind::MergeBase)?;
            let report = merge_preserved_and_cleaned(
                File::open(&preserved).map_err(|e| QuadError::io(&preserved, e))?,
                File::open(&cleaned).map_err(|e| QuadError::io(&cleaned, e))?,
                out,
            )
            .map_err(|e| QuadError::io(&self.artifacts.artifact(StageKind::MergeBase), e))?;
            tracing::info!(lines = report.lines_copied, "preserved and cleaned quads merged");
            Ok(StageCounts {
                read: report.lines_copied,
                written: report.lines_copied,
                ..StageCounts::default()
            })
        })?;
        runs.push(merged_base);

        let merged = self.run_stage(StageKind::MergeDerived, |out| {
            let base = self.artifacts.require(StageKind::MergeBase, StageKind::MergeDerived)?;
            let derived_path =
                require_input(&self.input(&self.config.paths.derived), StageKind::MergeDerived)?;
            let derived = DerivedIndex::load(&derived_path)?;
            let file = File::open(&base).map_err(|e| QuadError::io(&base, e))?;
            let report = merge_with_derived(BufReader::new(file), derived, out)
                .map_err(|e| QuadError::io(&self.artifacts.artifact(StageKind::MergeDerived), e))?;
            tracing::info!(
                base_lines = report.lines_copied,
                derived = report.derived_total,
                overlap = report.derived_overlap,
                appended = report.derived_appended,
                duplicates = report.duplicates,
                malformed = report.malformed,
                "derived dataset merged"
            );
            Ok(StageCounts {
                read: report.lines_copied + report.duplicates + report.derived_total,
                written: report.lines_copied + report.derived_appended,
                dropped: report.duplicates,
                malformed: report.malformed,
                ..StageCounts::default()
            })
        })?;
        runs.push(merged);

        Ok(runs)
    }

    /// The preserve and wipe stages share one pass over the corpus; only the
    /// missing artifact(s) are written.
    fn filter_corpus(&self) -> ReconcileResult<Vec<StageRun>> {
        let preserve_done = self.artifacts.is_produced(StageKind::Preserve);
        let wipe_done = self.artifacts.is_produced(StageKind::Wipe);
        let run = |stage: StageKind, skipped: bool, counts: StageCounts| StageRun {
            stage,
            artifact: self.artifacts.artifact(stage),
            skipped,
            counts: if skipped { StageCounts::default() } else { counts },
        };
        if preserve_done && wipe_done {
            tracing::info!("preserve and wipe artifacts present, skipping corpus filter");
            return Ok(vec![
                run(StageKind::Preserve, true, StageCounts::default()),
                run(StageKind::Wipe, true, StageCounts::default()),
            ]);
        }

        let corpus = require_input(&self.input(&self.config.paths.corpus), StageKind::Preserve)?;
        self.artifacts.ensure_dirs()?;
        let mut preserved = if preserve_done {
            None
        } else {
            Some(StagedFile::create(&self.artifacts.artifact(StageKind::Preserve))?)
        };
        let mut cleaned = if wipe_done {
            None
        } else {
            Some(StagedFile::create(&self.artifacts.artifact(StageKind::Wipe))?)
        };

        tracing::info!(corpus = %corpus.display(), "filtering corpus");
        let file = File::open(&corpus).map_err(|e| QuadError::io(&corpus, e))?;
        let mut filter = QuadFilter::new(PreservationRules::from_config(&self.config.reconcile));
        let report = filter
            .run(
                BufReader::new(file),
                preserved.as_mut().map(|f| f as &mut dyn std::io::Write),
                cleaned.as_mut().map(|f| f as &mut dyn std::io::Write),
            )
            .map_err(|e| QuadError::io(&corpus, e))?;
        tracing::info!(
            lines = report.lines,
            preserved = report.preserved,
            wiped = report.wiped,
            passed = report.passed,
            malformed = report.malformed,
            "corpus filtered"
        );

        if let Some(staged) = preserved {
            staged.commit()?;
        }
        if let Some(staged) = cleaned {
            staged.commit()?;
        }
        let preserve_counts = StageCounts {
            read: report.lines,
            written: report.preserved,
            malformed: report.malformed,
            ..StageCounts::default()
        };
        let wipe_counts = StageCounts {
            read: report.lines,
            written: report.passed,
            dropped: report.wiped,
            malformed: report.malformed,
            ..StageCounts::default()
        };
        Ok(vec![
            run(StageKind::Preserve, preserve_done, preserve_counts),
            run(StageKind::Wipe, wipe_done, wipe_counts),
        ])
    }

    // -----------------------------------------------------------------------
    // everything
    // -----------------------------------------------------------------------

    /// Every stage, in order.
    pub fn run_all(&self, cascade: &Cascade) -> ReconcileResult<Vec<StageRun>> {
        let mut runs = self.prepare()?;
        runs.push(self.resolve_genes(cascade)?);
        runs.extend(self.reconcile()?);
        let produced = runs.iter().filter(|r| !r.skipped).count();
        tracing::info!(produced, skipped = runs.len() - produced, "pipeline finished");
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(dir: &Path) -> Pipeline {
        let mut config = PipelineConfig::default();
        config.paths.data_dir = dir.to_path_buf();
        Pipeline::new(config)
    }

    #[test]
    fn existing_artifact_skips_stage() {
        let dir = tempfile::TempDir::new().unwrap();
        let p = pipeline(dir.path());
        p.artifacts().ensure_dirs().unwrap();
        std::fs::write(p.artifacts().artifact(StageKind::CleanAssociations), "done\n").unwrap();

        let run = p
            .run_stage(StageKind::CleanAssociations, |_| panic!("stage body must not run"))
            .unwrap();
        assert!(run.skipped);
    }

    #[test]
    fn failed_stage_publishes_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let p = pipeline(dir.path());
        // No association table under the data dir.
        let err = p.prepare().unwrap_err();
        assert!(matches!(err, crate::error::ReconcileError::Stage(_)));
        assert!(!p.artifacts().is_produced(StageKind::CleanAssociations));
    }

    #[test]
    fn filter_writes_only_missing_artifact() {
        let dir = tempfile::TempDir::new().unwrap();
        let p = pipeline(dir.path());
        let corpus = dir.path().join("quads/semnext-dump.nq");
        std::fs::create_dir_all(corpus.parent().unwrap()).unwrap();
        std::fs::write(&corpus, "<http://ex.org/s> <http://ex.org/p> \"v\" .\n").unwrap();

        p.artifacts().ensure_dirs().unwrap();
        std::fs::write(p.artifacts().artifact(StageKind::Preserve), "kept\n").unwrap();

        let runs = p.filter_corpus().unwrap();
        assert!(runs[0].skipped);
        assert_eq!(runs[0].counts, StageCounts::default());
        assert!(!runs[1].skipped);
        assert_eq!((runs[1].counts.read, runs[1].counts.written), (1, 1));
        assert_eq!(
            std::fs::read_to_string(p.artifacts().artifact(StageKind::Preserve)).unwrap(),
            "kept\n"
        );
        assert_eq!(
            std::fs::read_to_string(p.artifacts().artifact(StageKind::Wipe)).unwrap(),
            "<http://ex.org/s> <http://ex.org/p> \"v\" .\n"
        );
    }
}
