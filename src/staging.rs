//! Artifact staging: per-stage output files and resumption.
//!
//! Every pipeline stage produces exactly one named artifact under the output
//! directory. A stage whose artifact already exists is skipped; its content is
//! trusted, not re-validated. Artifacts are written to `<name>.partial` first
//! and renamed into place on commit, so a crashed run never leaves a
//! half-written artifact that a later run would mistake for a finished one.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::PathsConfig;
use crate::error::StageError;

pub type StageResult<T> = std::result::Result<T, StageError>;

/// Named pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Clean the gene–disease association table.
    CleanAssociations,
    /// Intersect cleaned associations with the cluster-analysis gene set.
    Intersection,
    /// Resolve placeholder gene symbols into the mapping table.
    ResolveGenes,
    /// Extract quads that must survive the wipe.
    Preserve,
    /// Copy the corpus minus the stale subgraph.
    Wipe,
    /// Concatenate cleaned and preserved quads.
    MergeBase,
    /// Merge the base with the derived dataset.
    MergeDerived,
}

impl StageKind {
    pub const ALL: [StageKind; 7] = [
        StageKind::CleanAssociations,
        StageKind::Intersection,
        StageKind::ResolveGenes,
        StageKind::Preserve,
        StageKind::Wipe,
        StageKind::MergeBase,
        StageKind::MergeDerived,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StageKind::CleanAssociations => "clean-associations",
            StageKind::Intersection => "intersection",
            StageKind::ResolveGenes => "resolve-genes",
            StageKind::Preserve => "preserve",
            StageKind::Wipe => "wipe",
            StageKind::MergeBase => "merge-base",
            StageKind::MergeDerived => "merge-derived",
        }
    }

    /// File name of the artifact this stage produces.
    pub fn artifact_file(self) -> &'static str {
        match self {
            StageKind::CleanAssociations => "Disease.database.table.cleaned.csv",
            StageKind::Intersection => "cortecon-jensen-intersection.csv",
            StageKind::ResolveGenes => "gene-uri-mapping.tsv",
            StageKind::Preserve => "preserved-quads.nq",
            StageKind::Wipe => "cleaned-quads.nq",
            StageKind::MergeBase => "merged-preserved-cleaned-quads.nq",
            StageKind::MergeDerived => "semnext-graph.nq",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Output directory layout.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub output_dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new(paths.output_dir())
    }

    /// Path of the artifact `stage` produces.
    pub fn artifact(&self, stage: StageKind) -> PathBuf {
        self.output_dir.join(stage.artifact_file())
    }

    /// The resumption predicate: has `stage` already produced its artifact?
    pub fn is_produced(&self, stage: StageKind) -> bool {
        self.artifact(stage).is_file()
    }

    /// Artifact of an earlier stage that `consumer` needs. Missing is fatal.
    pub fn require(&self, producer: StageKind, consumer: StageKind) -> StageResult<PathBuf> {
        require_input(&self.artifact(producer), consumer)
    }

    /// Existence status of every stage's artifact, in execution order.
    pub fn status(&self) -> Vec<(StageKind, PathBuf, bool)> {
        StageKind::ALL
            .iter()
            .map(|&stage| {
                let path = self.artifact(stage);
                let produced = path.is_file();
                (stage, path, produced)
            })
            .collect()
    }

    /// Create the output directory. Idempotent.
    pub fn ensure_dirs(&self) -> StageResult<()> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| StageError::Io {
            path: self.output_dir.display().to_string(),
            source: e,
        })
    }
}

/// Check that an input file exists before `stage` reads it.
pub fn require_input(path: &Path, stage: StageKind) -> StageResult<PathBuf> {
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(StageError::MissingArtifact {
            stage: stage.name().to_string(),
            path: path.display().to_string(),
        })
    }
}

/// An artifact being written. Dropped without `commit`, the partial file is
/// removed.
pub struct StagedFile {
    target: PathBuf,
    partial: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl StagedFile {
    pub fn create(target: &Path) -> StageResult<Self> {
        let mut partial = target.as_os_str().to_owned();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        let file = File::create(&partial).map_err(|e| StageError::Io {
            path: partial.display().to_string(),
            source: e,
        })?;
        Ok(Self {
            target: target.to_path_buf(),
            partial,
            writer: Some(BufWriter::new(file)),
        })
    }

    fn writer(&mut self) -> std::io::Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| std::io::Error::other("staged artifact already committed"))
    }

    /// Flush and atomically move the artifact into place.
    pub fn commit(mut self) -> StageResult<PathBuf> {
        let io_err = |path: &Path, source| StageError::Io {
            path: path.display().to_string(),
            source,
        };
        let Some(writer) = self.writer.take() else {
            return Err(io_err(
                &self.partial,
                std::io::Error::other("staged artifact already committed"),
            ));
        };
        let file = writer
            .into_inner()
            .map_err(|e| io_err(&self.partial, e.into_error()))?;
        file.sync_all().map_err(|e| io_err(&self.partial, e))?;
        drop(file);

        if let Err(e) = std::fs::rename(&self.partial, &self.target) {
            let _ = std::fs::remove_file(&self.partial);
            return Err(StageError::Publish {
                path: self.target.display().to_string(),
                source: e,
            });
        }
        tracing::debug!(artifact = %self.target.display(), "artifact published");
        Ok(self.target.clone())
    }
}

impl Write for StagedFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer()?.flush()
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            let _ = std::fs::remove_file(&self.partial);
        }
    }
}

impl std::fmt::Debug for StagedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedFile")
            .field("target", &self.target)
            .field("committed", &self.writer.is_none())
            .finish()
    }
}
