//! Tabular preparation: the gene–disease association table and its
//! intersection with the cluster-analysis gene set.
//!
//! CSV handling is deliberately small: comma-separated, double-quote quoting
//! with `""` escapes, quoted fields may span lines. Columns are addressed by
//! header name, and a missing required column fails the stage up front.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::error::{TabularError, TabularResult};

/// Columns of the cleaned association table, in output order.
pub const CLEANED_COLUMNS: [&str; 7] = [
    "Entrez_ID",
    "Gene_Symbol",
    "Disease_Ontology_ID",
    "Confidence_Score",
    "Source",
    "Evidence",
    "Type",
];

/// Columns of the intersection file, in output order.
pub const INTERSECTION_COLUMNS: [&str; 8] = [
    "Entrez_ID",
    "Gene_Symbol",
    "Disease_Ontology_ID",
    "Disease_Name",
    "see_also",
    "Confidence_Score",
    "Source",
    "Evidence",
];

/// Placeholder the association export uses for a missing Entrez ID.
const NULL_ENTREZ: &str = "NULL";

// ---------------------------------------------------------------------------
// CSV reading and writing
// ---------------------------------------------------------------------------

/// Reads header-addressed CSV records.
pub struct CsvReader<R> {
    input: R,
    path: String,
    line: usize,
    header: Vec<String>,
}

impl CsvReader<BufReader<File>> {
    pub fn open(path: &Path) -> TabularResult<Self> {
        let label = path.display().to_string();
        let file = File::open(path).map_err(|e| TabularError::io(&label, e))?;
        Self::new(BufReader::new(file), label)
    }
}

impl<R: BufRead> CsvReader<R> {
    /// Wrap `input` and consume its header row.
    pub fn new(input: R, path: impl Into<String>) -> TabularResult<Self> {
        let mut reader = Self {
            input,
            path: path.into(),
            line: 0,
            header: Vec::new(),
        };
        let mut header = reader
            .read_record()?
            .ok_or_else(|| TabularError::Empty { path: reader.path.clone() })?;
        if let Some(first) = header.first_mut() {
            if let Some(stripped) = first.strip_prefix('\u{feff}') {
                *first = stripped.to_string();
            }
        }
        reader.header = header;
        Ok(reader)
    }

    /// Index of a required column.
    pub fn column(&self, name: &str) -> TabularResult<usize> {
        self.header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| TabularError::MissingColumn {
                path: self.path.clone(),
                column: name.to_string(),
            })
    }

    /// Indices of several required columns, in the order given.
    pub fn columns<const N: usize>(&self, names: [&str; N]) -> TabularResult<[usize; N]> {
        let mut out = [0; N];
        for (slot, name) in out.iter_mut().zip(names) {
            *slot = self.column(name)?;
        }
        Ok(out)
    }

    /// Next data record. Blank lines are skipped.
    pub fn next_record(&mut self) -> TabularResult<Option<Vec<String>>> {
        self.read_record()
    }

    fn read_line(&mut self, buf: &mut String) -> TabularResult<usize> {
        let n = self
            .input
            .read_line(buf)
            .map_err(|e| TabularError::io(&self.path, e))?;
        if n > 0 {
            self.line += 1;
        }
        Ok(n)
    }

    fn read_record(&mut self) -> TabularResult<Option<Vec<String>>> {
        let mut text = String::new();
        loop {
            text.clear();
            if self.read_line(&mut text)? == 0 {
                return Ok(None);
            }
            if !text.trim_end_matches(['\r', '\n']).is_empty() {
                break;
            }
        }

        let start_line = self.line;
        let mut fields = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;
        loop {
            let mut chars = text.chars().peekable();
            while let Some(c) = chars.next() {
                match (in_quotes, c) {
                    (true, '"') if chars.peek() == Some(&'"') => {
                        chars.next();
                        field.push('"');
                    }
                    (true, '"') => in_quotes = false,
                    (true, c) => field.push(c),
                    (false, '"') if field.is_empty() => in_quotes = true,
                    (false, ',') => fields.push(std::mem::take(&mut field)),
                    (false, '\r' | '\n') => {}
                    (false, c) => field.push(c),
                }
            }
            if !in_quotes {
                break;
            }
            // Quoted field continues on the next line.
            text.clear();
            if self.read_line(&mut text)? == 0 {
                return Err(TabularError::UnterminatedQuote {
                    path: self.path.clone(),
                    line: start_line,
                });
            }
        }
        fields.push(field);
        Ok(Some(fields))
    }
}

/// Field `idx` of a record, empty when the row is short.
pub fn field(record: &[String], idx: usize) -> &str {
    record.get(idx).map(String::as_str).unwrap_or("")
}

/// Writes CSV records, quoting only where needed.
pub struct CsvWriter<W: Write> {
    out: W,
    path: String,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(out: W, path: impl Into<String>) -> Self {
        Self {
            out,
            path: path.into(),
        }
    }

    pub fn write_record<S: AsRef<str>>(&mut self, fields: impl IntoIterator<Item = S>) -> TabularResult<()> {
        let mut line = String::new();
        for (i, f) in fields.into_iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            let f = f.as_ref();
            if f.contains([',', '"', '\n', '\r']) {
                line.push('"');
                line.push_str(&f.replace('"', "\"\""));
                line.push('"');
            } else {
                line.push_str(f);
            }
        }
        line.push('\n');
        self.out
            .write_all(line.as_bytes())
            .map_err(|e| TabularError::io(&self.path, e))
    }

    pub fn flush(&mut self) -> TabularResult<()> {
        self.out.flush().map_err(|e| TabularError::io(&self.path, e))
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

// ---------------------------------------------------------------------------
// Association cleaning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub rows: usize,
    pub written: usize,
    /// Rows whose missing Entrez ID was replaced by the gene symbol.
    pub symbol_fallbacks: usize,
    /// Rows dropped for lacking a Disease Ontology ID.
    pub skipped: usize,
}

/// Clean the association table.
///
/// A `NULL` or empty Entrez ID is replaced by the gene symbol. Rows whose
/// disease ID is not a Disease Ontology ID are dropped.
pub fn clean_associations<R: BufRead, W: Write>(
    mut input: CsvReader<R>,
    out: &mut CsvWriter<W>,
) -> TabularResult<CleanReport> {
    let cols = input.columns(CLEANED_COLUMNS)?;
    let [entrez, symbol, doid, ..] = cols;
    out.write_record(CLEANED_COLUMNS)?;

    let mut report = CleanReport::default();
    while let Some(record) = input.next_record()? {
        report.rows += 1;
        if !field(&record, doid).contains("DOID") {
            report.skipped += 1;
            continue;
        }
        let mut row: Vec<&str> = cols.iter().map(|&i| field(&record, i)).collect();
        let id = field(&record, entrez);
        if id == NULL_ENTREZ || id.is_empty() {
            row[0] = field(&record, symbol);
            report.symbol_fallbacks += 1;
        }
        out.write_record(row)?;
        report.written += 1;
    }
    out.flush()?;
    Ok(report)
}

// ---------------------------------------------------------------------------
// Gene set and disease reference
// ---------------------------------------------------------------------------

/// (Entrez ID, gene symbol) pairs of the cluster-analysis gene set.
pub type GeneSet = HashSet<(String, String)>;

pub fn gene_superset<R: BufRead>(mut input: CsvReader<R>) -> TabularResult<GeneSet> {
    let [entrez, symbol] = input.columns(["Entrez_IDs", "Gene_Symbol"])?;
    let mut genes = GeneSet::new();
    while let Some(record) = input.next_record()? {
        genes.insert((field(&record, entrez).to_string(), field(&record, symbol).to_string()));
    }
    Ok(genes)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiseaseInfo {
    pub name: String,
    pub see_also: String,
}

/// Disease ID → name and reference address.
#[derive(Debug, Clone, Default)]
pub struct DiseaseReference {
    entries: HashMap<String, DiseaseInfo>,
}

impl DiseaseReference {
    /// Later rows for the same disease ID replace earlier ones.
    pub fn load<R: BufRead>(mut input: CsvReader<R>) -> TabularResult<Self> {
        let [id, name, address] = input.columns(["DISEASE_ID", "NAME", "ADDRESS"])?;
        let mut entries = HashMap::new();
        while let Some(record) = input.next_record()? {
            entries.insert(
                field(&record, id).to_string(),
                DiseaseInfo {
                    name: field(&record, name).to_string(),
                    see_also: field(&record, address).to_string(),
                },
            );
        }
        Ok(Self { entries })
    }

    pub fn get(&self, disease_id: &str) -> Option<&DiseaseInfo> {
        self.entries.get(disease_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Intersection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntersectionReport {
    pub rows: usize,
    pub written: usize,
    /// Written rows whose disease ID had no reference entry.
    pub unknown_disease: usize,
}

/// Keep cleaned associations whose gene is in `genes`, adding the disease
/// name and reference address (empty when the disease is unknown).
pub fn write_intersection<R: BufRead, W: Write>(
    mut cleaned: CsvReader<R>,
    genes: &GeneSet,
    reference: &DiseaseReference,
    out: &mut CsvWriter<W>,
) -> TabularResult<IntersectionReport> {
    let [entrez, symbol, doid, confidence, source, evidence] = cleaned.columns([
        "Entrez_ID",
        "Gene_Symbol",
        "Disease_Ontology_ID",
        "Confidence_Score",
        "Source",
        "Evidence",
    ])?;
    out.write_record(INTERSECTION_COLUMNS)?;

    let mut report = IntersectionReport::default();
    let mut key = (String::new(), String::new());
    while let Some(record) = cleaned.next_record()? {
        report.rows += 1;
        key.0.clear();
        key.0.push_str(field(&record, entrez));
        key.1.clear();
        key.1.push_str(field(&record, symbol));
        if !genes.contains(&key) {
            continue;
        }

        let disease = field(&record, doid);
        let info = reference.get(disease);
        if info.is_none() {
            report.unknown_disease += 1;
        }
        out.write_record([
            key.0.as_str(),
            key.1.as_str(),
            disease,
            info.map(|i| i.name.as_str()).unwrap_or(""),
            info.map(|i| i.see_also.as_str()).unwrap_or(""),
            field(&record, confidence),
            field(&record, source),
            field(&record, evidence),
        ])?;
        report.written += 1;
    }
    out.flush()?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(text: &str) -> CsvReader<&[u8]> {
        CsvReader::new(text.as_bytes(), "test.csv").unwrap()
    }

    fn records(text: &str) -> Vec<Vec<String>> {
        let mut r = reader(text);
        let mut out = Vec::new();
        while let Some(rec) = r.next_record().unwrap() {
            out.push(rec);
        }
        out
    }

    #[test]
    fn quoted_fields_with_commas_quotes_and_newlines() {
        let rows = records("a,b,c\n1,\"x, y\",\"say \"\"hi\"\"\"\n2,\"multi\nline\",z\r\n\n3,,\n");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["1", "x, y", "say \"hi\""]);
        assert_eq!(rows[1], vec!["2", "multi\nline", "z"]);
        assert_eq!(rows[2], vec!["3", "", ""]);
    }

    #[test]
    fn unterminated_quote_reports_start_line() {
        let mut r = reader("a,b\n1,\"open\nstill open\n");
        assert!(matches!(
            r.next_record(),
            Err(TabularError::UnterminatedQuote { line: 2, .. })
        ));
    }

    #[test]
    fn empty_input_has_no_header() {
        assert!(matches!(
            CsvReader::new("".as_bytes(), "empty.csv"),
            Err(TabularError::Empty { .. })
        ));
    }

    #[test]
    fn missing_column_is_named() {
        let r = reader("Entrez_IDs,Symbol\n1,A\n");
        assert!(matches!(
            gene_superset(r),
            Err(TabularError::MissingColumn { ref column, .. }) if column == "Gene_Symbol"
        ));
    }

    #[test]
    fn writer_quotes_only_when_needed() {
        let mut w = CsvWriter::new(Vec::new(), "out.csv");
        w.write_record(["plain", "a,b", "q\"q", ""]).unwrap();
        assert_eq!(
            String::from_utf8(w.into_inner()).unwrap(),
            "plain,\"a,b\",\"q\"\"q\",\n"
        );
    }

    const ASSOCIATIONS: &str = "\
,Entrez_ID,Gene_Symbol,Disease_Ontology_ID,Confidence_Score,Source,Evidence,Type
0,672,BRCA1,DOID:1612,4.5,TEXTMINING,\"z-score 6.1\",textmining
1,NULL,C9orf72,DOID:332,3.0,KNOWLEDGE,,knowledge
2,7157,TP53,ICD10:C50,2.0,EXPERIMENTS,,experiments
";

    #[test]
    fn cleaning_falls_back_to_symbol_and_drops_non_doid() {
        let mut out = CsvWriter::new(Vec::new(), "cleaned.csv");
        let report = clean_associations(reader(ASSOCIATIONS), &mut out).unwrap();
        assert_eq!(
            report,
            CleanReport {
                rows: 3,
                written: 2,
                symbol_fallbacks: 1,
                skipped: 1,
            }
        );
        let text = String::from_utf8(out.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "Entrez_ID,Gene_Symbol,Disease_Ontology_ID,Confidence_Score,Source,Evidence,Type"
        );
        assert_eq!(lines[1], "672,BRCA1,DOID:1612,4.5,TEXTMINING,z-score 6.1,textmining");
        assert_eq!(lines[2], "C9orf72,C9orf72,DOID:332,3.0,KNOWLEDGE,,knowledge");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn intersection_enriches_known_diseases() {
        let cleaned = "\
Entrez_ID,Gene_Symbol,Disease_Ontology_ID,Confidence_Score,Source,Evidence,Type
672,BRCA1,DOID:1612,4.5,TEXTMINING,,textmining
C9orf72,C9orf72,DOID:332,3.0,KNOWLEDGE,,knowledge
999,NOTINSET,DOID:1612,1.0,KNOWLEDGE,,knowledge
";
        let genes = gene_superset(reader(
            "Entrez_IDs,Gene_Symbol,d0,d7\n672,BRCA1,0.1,0.2\nC9orf72,C9orf72,0.3,0.4\n",
        ))
        .unwrap();
        let reference = DiseaseReference::load(reader(
            "DISEASE_ID,NAME,ADDRESS\nDOID:1612,breast cancer,http://diseases.jensenlab.org/Entity?id=DOID:1612\n",
        ))
        .unwrap();
        assert_eq!(reference.len(), 1);

        let mut out = CsvWriter::new(Vec::new(), "intersection.csv");
        let report = write_intersection(reader(cleaned), &genes, &reference, &mut out).unwrap();
        assert_eq!(report.rows, 3);
        assert_eq!(report.written, 2);
        assert_eq!(report.unknown_disease, 1);

        let text = String::from_utf8(out.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], INTERSECTION_COLUMNS.join(","));
        assert_eq!(
            lines[1],
            "672,BRCA1,DOID:1612,breast cancer,http://diseases.jensenlab.org/Entity?id=DOID:1612,4.5,TEXTMINING,"
        );
        assert_eq!(lines[2], "C9orf72,C9orf72,DOID:332,,,3.0,KNOWLEDGE,");
    }
}
