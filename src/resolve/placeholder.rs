//! Placeholder gene symbols and the symbol → URI mapping table.
//!
//! The ETL step that builds the derived disease document cannot resolve gene
//! symbols itself, so it mints `<tmp_prefix><SYMBOL>` resources typed
//! `<tmp_prefix>TemporaryGene`. Those are the symbols the cascade resolves.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufReader, Write};
use std::path::Path;

use oxigraph::io::RdfParser;
use oxigraph::model::{vocab::rdf, Term};

use crate::error::{QuadError, QuadResult};
use crate::quads::rdf_format_of;

use super::{Resolution, Symbol};

/// Local name of the placeholder type under the temporary prefix.
pub const PLACEHOLDER_TYPE: &str = "TemporaryGene";

/// Collect the symbols of every placeholder gene in `document`.
pub fn placeholder_symbols(document: &Path, tmp_prefix: &str) -> QuadResult<BTreeSet<Symbol>> {
    let format = rdf_format_of(document)?;
    let file = std::fs::File::open(document).map_err(|e| QuadError::io(document, e))?;
    let type_iri = format!("{tmp_prefix}{PLACEHOLDER_TYPE}");

    let mut symbols = BTreeSet::new();
    for quad in RdfParser::from_format(format).for_reader(BufReader::new(file)) {
        let quad = quad.map_err(|e| QuadError::Parse {
            path: document.display().to_string(),
            message: e.to_string(),
        })?;
        if quad.predicate != rdf::TYPE {
            continue;
        }
        let Term::NamedNode(ty) = &quad.object else {
            continue;
        };
        if ty.as_str() != type_iri {
            continue;
        }
        let subject = quad.subject.to_string();
        let symbol = subject
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .and_then(|iri| iri.strip_prefix(tmp_prefix))
            .filter(|s| !s.is_empty());
        match symbol {
            Some(s) => {
                symbols.insert(Symbol::new(s));
            }
            None => tracing::warn!(subject = %subject, "placeholder outside the temporary namespace"),
        }
    }
    tracing::info!(
        document = %document.display(),
        count = symbols.len(),
        "placeholder symbols collected"
    );
    Ok(symbols)
}

/// Write the mapping table: `symbol\turi\tsource`, one row per candidate,
/// primary candidate first. Unresolved symbols keep their literal text with
/// source `unresolved`. Returns the number of data rows.
pub fn write_mapping(
    resolutions: &BTreeMap<Symbol, Resolution>,
    mut out: impl Write,
) -> std::io::Result<usize> {
    writeln!(out, "symbol\turi\tsource")?;
    let mut rows = 0;
    for (symbol, resolution) in resolutions {
        if resolution.is_empty() {
            writeln!(out, "{symbol}\t{}\tunresolved", resolution.uri_or_symbol(symbol))?;
            rows += 1;
            continue;
        }
        for candidate in resolution.candidates() {
            writeln!(out, "{symbol}\t{}\t{}", candidate.uri, candidate.class)?;
            rows += 1;
        }
    }
    out.flush()?;
    Ok(rows)
}
