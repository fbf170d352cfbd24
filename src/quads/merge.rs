//! Merging the kept corpus with the derived dataset.

use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use oxigraph::io::{RdfFormat, RdfParser, RdfSerializer};
use oxigraph::model::Quad;

use crate::error::{QuadError, QuadResult};

use super::{parse_line, rdf_format_of, LineOutcome};

/// Counters for a merge stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Lines copied from the base stream(s).
    pub lines_copied: usize,
    /// Distinct quads in the derived dataset.
    pub derived_total: usize,
    /// Derived quads already present in the base.
    pub derived_overlap: usize,
    /// Derived quads appended to the output.
    pub derived_appended: usize,
    /// Base lines that could not be parsed (copied anyway).
    pub malformed: usize,
    /// Base lines dropped because their quad was already written.
    pub duplicates: usize,
}

/// Stage 1: the cleaned stream, then the preserved stream.
///
/// The filter routes every quad to at most one of the two. Quads repeated
/// inside the corpus itself are left for [`merge_with_derived`] to collapse.
pub fn merge_preserved_and_cleaned(
    preserved: impl Read,
    cleaned: impl Read,
    out: &mut dyn Write,
) -> std::io::Result<MergeReport> {
    let mut report = MergeReport::default();
    report.lines_copied += copy_lines(BufReader::new(cleaned), &mut *out)?;
    report.lines_copied += copy_lines(BufReader::new(preserved), &mut *out)?;
    out.flush()?;
    Ok(report)
}

/// Copy every line, making sure each one ends in a newline.
fn copy_lines(mut input: impl BufRead, out: &mut dyn Write) -> std::io::Result<usize> {
    let mut buf = Vec::new();
    let mut count = 0;
    loop {
        buf.clear();
        if input.read_until(b'\n', &mut buf)? == 0 {
            return Ok(count);
        }
        out.write_all(&buf)?;
        if !buf.ends_with(b"\n") {
            out.write_all(b"\n")?;
        }
        count += 1;
    }
}

// ---------------------------------------------------------------------------
// Derived dataset
// ---------------------------------------------------------------------------

/// The derived dataset held in memory: insertion-ordered, deduplicated, with
/// constant-time removal.
#[derive(Debug, Default)]
pub struct DerivedIndex {
    quads: Vec<Option<Quad>>,
    positions: HashMap<Quad, usize>,
}

impl DerivedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an RDF file; the syntax comes from the extension. Any parse
    /// error is fatal.
    pub fn load(path: &Path) -> QuadResult<Self> {
        let format = rdf_format_of(path)?;
        let file = std::fs::File::open(path).map_err(|e| QuadError::io(path, e))?;
        let index = Self::from_reader(format, BufReader::new(file)).map_err(|message| QuadError::Parse {
            path: path.display().to_string(),
            message,
        })?;
        tracing::info!(path = %path.display(), quads = index.len(), "derived dataset loaded");
        Ok(index)
    }

    pub fn from_reader(format: RdfFormat, reader: impl Read) -> Result<Self, String> {
        let mut index = Self::new();
        for quad in RdfParser::from_format(format).for_reader(reader) {
            index.insert(quad.map_err(|e| e.to_string())?);
        }
        Ok(index)
    }

    /// Insert unless already present. Returns whether it was new.
    pub fn insert(&mut self, quad: Quad) -> bool {
        if self.positions.contains_key(&quad) {
            return false;
        }
        self.positions.insert(quad.clone(), self.quads.len());
        self.quads.push(Some(quad));
        true
    }

    /// Remove a quad. Returns whether it was present.
    pub fn remove(&mut self, quad: &Quad) -> bool {
        match self.positions.remove(quad) {
            Some(pos) => {
                self.quads[pos] = None;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, quad: &Quad) -> bool {
        self.positions.contains_key(quad)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Remaining quads in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Quad> {
        self.quads.iter().flatten()
    }
}

/// Stage 2: copy `base` through, drop its quads from `derived`, then append
/// what is left of `derived` as N-Quads.
///
/// Every quad is written once: a base line whose quad was already written
/// (even in a different lexical form) is dropped, a quad in both inputs keeps
/// its base copy, and a quad only in `derived` is appended at the end.
/// Malformed base lines are copied through and counted.
pub fn merge_with_derived(
    mut base: impl BufRead,
    mut derived: DerivedIndex,
    out: &mut dyn Write,
) -> std::io::Result<MergeReport> {
    let mut report = MergeReport {
        derived_total: derived.len(),
        ..MergeReport::default()
    };
    let mut written: HashSet<Quad> = HashSet::new();
    let mut buf = Vec::new();
    let mut line_no = 0usize;

    loop {
        buf.clear();
        if base.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_no += 1;

        match std::str::from_utf8(&buf).map(parse_line) {
            Ok(LineOutcome::Quad(quad)) => {
                if derived.remove(&quad) {
                    report.derived_overlap += 1;
                }
                if !written.insert(quad) {
                    report.duplicates += 1;
                    continue;
                }
            }
            Ok(LineOutcome::Skip) => {}
            Ok(LineOutcome::Malformed(message)) => {
                report.malformed += 1;
                tracing::debug!(line = line_no, error = %message, "malformed base line copied as-is");
            }
            Err(_) => {
                report.malformed += 1;
                tracing::debug!(line = line_no, "non-UTF-8 base line copied as-is");
            }
        }

        out.write_all(&buf)?;
        if !buf.ends_with(b"\n") {
            out.write_all(b"\n")?;
        }
        report.lines_copied += 1;
    }

    let mut serializer = RdfSerializer::from_format(RdfFormat::NQuads).for_writer(&mut *out);
    for quad in derived.iter() {
        serializer.serialize_quad(quad)?;
        report.derived_appended += 1;
    }
    serializer.finish()?;
    out.flush()?;

    if report.duplicates > 0 {
        tracing::info!(duplicates = report.duplicates, "duplicate base quads dropped");
    }
    if report.malformed > 0 {
        tracing::warn!(malformed = report.malformed, "merged base contained malformed lines");
    }
    Ok(report)
}
