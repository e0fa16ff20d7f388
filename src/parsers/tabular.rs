// ==============================================================================
// parsers/tabular.rs - Header-Aware Delimited Reader
// ==============================================================================
// Description: Shared reader for catalog files (HGNC, Ensembl, ExAC, HPO, OMIM)
// Author: Matt Barham
// Created: 2025-11-14
// Modified: 2025-11-22
// Version: 1.2.0
// ==============================================================================
// Header rules:
//   - The header line picks the delimiter: tab if it has one, else comma
//     (comma files may quote fields)
//   - Leading '#' lines are comments unless they carry the required columns
//     (OMIM files put their header behind '#')
//   - The first non-comment line must be the header
//   - No header -> MalformedSource (column order unknown)
// Data rows:
//   - Wrong column count -> SkippedLine, reading continues
//   - '#' lines after the header are ignored
// ==============================================================================

use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};
use std::collections::HashMap;
use std::hash::Hash;
use std::io::BufRead;
use tracing::{debug, warn};

use crate::error::{LoadError, SkippedLine};

/// One decoded data row
#[derive(Debug, Clone)]
pub struct Row {
    /// 1-based line number in the source
    pub line: usize,
    record: StringRecord,
}

impl Row {
    /// Trimmed field value, None when empty or a missing-value marker
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.record
            .get(idx)
            .map(|v| v.trim().trim_matches('"'))
            .filter(|v| !v.is_empty() && *v != "." && *v != "-")
    }

    /// Parse a field, Err(reason) when present but not parseable
    pub fn parse<T: std::str::FromStr>(&self, idx: usize, name: &str) -> Result<Option<T>, String> {
        match self.get(idx) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|_| format!("non-numeric {} '{}'", name, raw)),
        }
    }
}

/// Streaming reader over a tab- or comma-delimited source with a header row
pub struct TabularReader<R: BufRead> {
    source_name: &'static str,
    columns: Vec<String>,
    records: StringRecordsIntoIter<R>,
    /// Lines consumed before the first data row
    offset: usize,
    skipped: Vec<SkippedLine>,
}

impl<R: BufRead> TabularReader<R> {
    /// Locate the header row and position the reader on the first data row
    pub fn open(
        mut reader: R,
        source_name: &'static str,
        required: &[&str],
    ) -> Result<Self, LoadError> {
        let mut buf = String::new();
        let mut consumed = 0;

        let (columns, delimiter) = loop {
            buf.clear();
            if reader.read_line(&mut buf)? == 0 {
                return Err(LoadError::malformed(
                    source_name,
                    format!("header row with column(s) {:?} not found", required),
                ));
            }
            consumed += 1;

            let line = buf.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                continue;
            }

            let header = line.trim_start_matches('#');
            let delimiter = detect_delimiter(header);
            let candidate: Vec<String> = header
                .split(char::from(delimiter))
                .map(normalize_column)
                .collect();

            if required.iter().all(|name| find_column(&candidate, name).is_some()) {
                break (candidate, delimiter);
            }

            if !line.starts_with('#') {
                return Err(LoadError::malformed(
                    source_name,
                    format!("line {} is not a header with column(s) {:?}", consumed, required),
                ));
            }
        };

        debug!(
            "{} header found on line {} ({} columns, delimiter {:?})",
            source_name,
            consumed,
            columns.len(),
            char::from(delimiter)
        );

        let records = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .quoting(delimiter == b',')
            .comment(Some(b'#'))
            .from_reader(reader)
            .into_records();

        Ok(Self {
            source_name,
            columns,
            records,
            offset: consumed,
            skipped: Vec::new(),
        })
    }

    /// Index of a column by (normalized) name
    pub fn column(&self, name: &str) -> Option<usize> {
        find_column(&self.columns, name)
    }

    /// Index of the first column found among alternative names
    pub fn column_any(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|name| self.column(name))
    }

    pub fn require(&self, names: &[&str]) -> Result<usize, LoadError> {
        self.column_any(names).ok_or_else(|| {
            LoadError::malformed(self.source_name, format!("missing column {:?}", names))
        })
    }

    /// Next well-formed row; malformed rows are recorded and skipped
    pub fn next_row(&mut self) -> Result<Option<Row>, LoadError> {
        loop {
            let record = match self.records.next() {
                None => return Ok(None),
                Some(Ok(record)) => record,
                Some(Err(e)) => {
                    let line = e
                        .position()
                        .map(|p| p.line() as usize + self.offset)
                        .unwrap_or(self.offset);
                    match e.into_kind() {
                        csv::ErrorKind::Io(io) => return Err(LoadError::IoError(io)),
                        other => {
                            self.skip(line, format!("unreadable row: {:?}", other));
                            continue;
                        }
                    }
                }
            };

            let line = record
                .position()
                .map(|p| p.line() as usize + self.offset)
                .unwrap_or(self.offset);

            if record.len() != self.columns.len() {
                self.skip(
                    line,
                    format!("expected {} columns, found {}", self.columns.len(), record.len()),
                );
                continue;
            }

            return Ok(Some(Row { line, record }));
        }
    }

    /// Record a dropped line
    pub fn skip(&mut self, line: usize, reason: impl Into<String>) {
        let skipped = SkippedLine::new(line, reason);
        warn!("Skipping {} {}", self.source_name, skipped);
        self.skipped.push(skipped);
    }

    /// Lines dropped so far
    pub fn finish(self) -> Vec<SkippedLine> {
        self.skipped
    }
}

fn detect_delimiter(header: &str) -> u8 {
    if !header.contains('\t') && header.contains(',') {
        b','
    } else {
        b'\t'
    }
}

fn normalize_column(raw: &str) -> String {
    raw.trim().trim_matches('"').trim().to_ascii_lowercase()
}

/// Exact match first, then prefix match ("mim entry type (see faq 1.3 ...)")
fn find_column(columns: &[String], name: &str) -> Option<usize> {
    columns
        .iter()
        .position(|c| c == name)
        .or_else(|| columns.iter().position(|c| c.starts_with(name)))
}

/// Split a multi-valued field ("A|B|C"), dropping quotes and empties
pub fn split_list(value: Option<&str>, sep: char) -> Vec<String> {
    value
        .map(|v| {
            v.split(sep)
                .map(|item| item.trim().trim_matches('"').trim())
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Strip a "PREFIX:" namespace ("HGNC:5" -> 5)
pub fn parse_prefixed_id(value: &str) -> Option<u32> {
    value.rsplit(':').next()?.trim().parse().ok()
}

/// Insertion-ordered mapping keyed by a source's own identifier
#[derive(Debug, Clone)]
pub struct SourceTable<K, T> {
    entries: Vec<(K, T)>,
    index: HashMap<K, usize>,
    duplicates: Vec<K>,
    skipped: Vec<SkippedLine>,
}

impl<K: Eq + Hash + Clone, T> Default for SourceTable<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone, T> SourceTable<K, T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            duplicates: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Insert a record; an already present key keeps the first record
    pub fn insert(&mut self, key: K, value: T) -> bool {
        if self.index.contains_key(&key) {
            self.duplicates.push(key);
            return false;
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        true
    }

    /// Record for aggregation over repeated keys
    pub fn entry_or_insert_with(&mut self, key: K, default: impl FnOnce() -> T) -> &mut T {
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                let idx = self.entries.len();
                self.index.insert(key.clone(), idx);
                self.entries.push((key, default()));
                idx
            }
        };
        &mut self.entries[idx].1
    }

    pub fn get(&self, key: &K) -> Option<&T> {
        self.index.get(key).map(|&idx| &self.entries[idx].1)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &T)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn into_values(self) -> impl Iterator<Item = T> {
        self.entries.into_iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys seen more than once, in order of the repeated occurrence
    pub fn duplicates(&self) -> &[K] {
        &self.duplicates
    }

    pub fn skipped(&self) -> &[SkippedLine] {
        &self.skipped
    }

    pub fn with_skipped(mut self, skipped: Vec<SkippedLine>) -> Self {
        self.skipped = skipped;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_and_rows() {
        let data = "a\tb\tc\n1\t2\t3\n4\t5\n6\t7\t8\n";
        let mut reader = TabularReader::open(data.as_bytes(), "test", &["a", "c"]).unwrap();
        assert_eq!(reader.column("b"), Some(1));

        let first = reader.next_row().unwrap().unwrap();
        assert_eq!(first.get(2), Some("3"));
        assert_eq!(first.line, 2);

        // "4\t5" has the wrong column count
        let second = reader.next_row().unwrap().unwrap();
        assert_eq!(second.get(0), Some("6"));
        assert_eq!(second.line, 4);

        assert!(reader.next_row().unwrap().is_none());
        let skipped = reader.finish();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].line, 3);
    }

    #[test]
    fn test_comma_delimited_source() {
        let data = "gene,pLI,description\n\
                    B3GALT6,0.0173,\"beta-1,3-galactosyltransferase 6\"\n\
                    SHORT,1\n";
        let mut reader = TabularReader::open(data.as_bytes(), "exac", &["gene", "pli"]).unwrap();
        assert_eq!(reader.column("pli"), Some(1));

        let row = reader.next_row().unwrap().unwrap();
        assert_eq!(row.get(0), Some("B3GALT6"));
        assert_eq!(row.get(2), Some("beta-1,3-galactosyltransferase 6"));

        assert!(reader.next_row().unwrap().is_none());
        let skipped = reader.finish();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].line, 3);
    }

    #[test]
    fn test_commented_header() {
        let data = "# Copyright\n# Generated: 2019\n# MIM Number\tMIM Entry Type (see FAQ 1.3)\n100050\tgene\n# trailing comment\n";
        let mut reader = TabularReader::open(data.as_bytes(), "mim2gene", &["mim number", "mim entry type"]).unwrap();
        assert_eq!(reader.column("mim entry type"), Some(1));
        let row = reader.next_row().unwrap().unwrap();
        assert_eq!(row.get(0), Some("100050"));
        assert!(reader.next_row().unwrap().is_none());
    }

    #[test]
    fn test_missing_header_is_malformed() {
        let data = "1\t2\t3\n";
        match TabularReader::open(data.as_bytes(), "hgnc", &["hgnc_id"]) {
            Err(LoadError::MalformedSource { source_name, .. }) => assert_eq!(source_name, "hgnc"),
            _ => panic!("Expected MalformedSource error"),
        }

        match TabularReader::open("".as_bytes(), "hgnc", &["hgnc_id"]) {
            Err(LoadError::MalformedSource { .. }) => {}
            _ => panic!("Expected MalformedSource error"),
        }
    }

    #[test]
    fn test_row_parse() {
        let data = "x\ty\n12\tabc\n";
        let mut reader = TabularReader::open(data.as_bytes(), "test", &["x"]).unwrap();
        let row = reader.next_row().unwrap().unwrap();
        assert_eq!(row.parse::<u32>(0, "x").unwrap(), Some(12));
        assert!(row.parse::<u32>(1, "y").is_err());
    }

    #[test]
    fn test_split_list_and_prefixed_id() {
        assert_eq!(split_list(Some("\"A1B|ABG\""), '|'), vec!["A1B", "ABG"]);
        assert!(split_list(None, '|').is_empty());
        assert_eq!(parse_prefixed_id("HGNC:5"), Some(5));
        assert_eq!(parse_prefixed_id("37133"), Some(37133));
        assert_eq!(parse_prefixed_id("HGNC:x"), None);
    }

    #[test]
    fn test_source_table_keeps_first() {
        let mut table: SourceTable<u32, &str> = SourceTable::new();
        assert!(table.insert(1, "first"));
        assert!(!table.insert(1, "second"));
        assert_eq!(table.get(&1), Some(&"first"));
        assert_eq!(table.duplicates(), &[1]);

        *table.entry_or_insert_with(2, || "new") = "updated";
        assert_eq!(table.get(&2), Some(&"updated"));
        assert_eq!(table.len(), 2);
    }
}
