//! Input table normalization.
//!
//! Raw structure tables arrive with any of three delimiters, decimal commas,
//! surplus columns, ragged rows, and identifiers containing characters that
//! are unsafe in file names. [`normalize`] rewrites such a table into a
//! comma-delimited file of at most three columns, reporting everything it
//! removed, and [`load_records`] reads the result back as [`StructureRecord`]s.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::model::record::StructureRecord;

/// Bytes inspected when guessing the delimiter.
pub const SNIFF_BYTES: usize = 2048;
/// Columns retained from the input table.
pub const MAX_COLUMNS: usize = 3;
pub const ID_COLUMN: &str = "MOLECULE_NAME";
pub const STRUCTURE_COLUMN: &str = "SMILES";

const DELIMITERS: [u8; 3] = [b',', b';', b'\t'];
const UNSAFE_ID_CHARS: [char; 18] = [
    '*', '&', '^', '%', '$', '@', '!', '~', '#', '(', ')', '[', ']', '{', '}', '?', '/', '\\',
];
const MISSING_TOKENS: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("'{path}' is empty")]
    Empty { path: PathBuf },

    #[error("failed to parse '{path}': {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("'{path}' has {found} column(s); an identifier and a structure column are required")]
    TooFewColumns { path: PathBuf, found: usize },

    #[error("no usable rows remain in '{path}' after normalization")]
    NoRows { path: PathBuf },

    #[error("failed to write '{path}': {source}")]
    Write { path: PathBuf, source: csv::Error },
}

/// A row excluded because its field count differs from the header's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRow {
    /// 1-based line number in the input file.
    pub line: u64,
    pub content: String,
    pub found: usize,
    pub expected: usize,
}

#[derive(Debug, Clone)]
pub struct NormalizeReport {
    pub output: PathBuf,
    pub delimiter: u8,
    pub header: Vec<String>,
    pub malformed: Vec<MalformedRow>,
    pub decimal_commas: usize,
    pub dropped_columns: usize,
    pub missing_value_rows: usize,
    pub rows_written: usize,
}

impl NormalizeReport {
    pub fn delimiter_name(&self) -> &'static str {
        match self.delimiter {
            b';' => "semicolon",
            b'\t' => "tab",
            _ => "comma",
        }
    }
}

/// Normalizes `path` into `<work_dir>/<stem>_verified.csv`.
pub fn normalize(path: &Path, work_dir: &Path) -> Result<NormalizeReport, Error> {
    let delimiter = sniff_file(path)?;
    info!(
        path = %path.display(),
        delimiter = %char::from(delimiter).escape_default(),
        "normalizing input table"
    );

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|source| Error::Csv {
            path: path.to_path_buf(),
            source,
        })?;

    let mut rows = reader.records();
    let header: Vec<String> = match rows.next() {
        Some(record) => record
            .map_err(|source| Error::Csv {
                path: path.to_path_buf(),
                source,
            })?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
                h.trim().to_string()
            })
            .collect(),
        None => {
            return Err(Error::Empty {
                path: path.to_path_buf(),
            });
        }
    };
    let expected = header.len();
    if expected < 2 {
        return Err(Error::TooFewColumns {
            path: path.to_path_buf(),
            found: expected,
        });
    }

    let mut malformed = Vec::new();
    let mut table: Vec<Vec<String>> = Vec::new();
    for record in rows {
        let record = record.map_err(|source| Error::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        if record.len() != expected {
            let row = MalformedRow {
                line: record.position().map(|p| p.line()).unwrap_or(0),
                content: record
                    .iter()
                    .collect::<Vec<_>>()
                    .join(&char::from(delimiter).to_string()),
                found: record.len(),
                expected,
            };
            warn!(
                line = row.line,
                found = row.found,
                expected = row.expected,
                "skipping malformed row: {}",
                row.content
            );
            malformed.push(row);
            continue;
        }
        table.push(record.iter().map(str::to_string).collect());
    }

    let mut decimal_commas = 0;
    if delimiter == b';' {
        for cell in table.iter_mut().flatten() {
            if is_decimal_comma(cell) {
                *cell = cell.replace(',', ".");
                decimal_commas += 1;
            }
        }
    }

    let kept = expected.min(MAX_COLUMNS);
    let header: Vec<String> = header.into_iter().take(kept).collect();
    for row in &mut table {
        row.truncate(kept);
        row[0] = sanitize_identifier(&row[0]);
    }

    let before = table.len();
    table.retain(|row| !row.iter().any(|cell| is_missing(cell)));
    let missing_value_rows = before - table.len();
    if missing_value_rows > 0 {
        warn!(
            rows = missing_value_rows,
            "removed rows with missing values"
        );
    }
    if table.is_empty() {
        return Err(Error::NoRows {
            path: path.to_path_buf(),
        });
    }

    let output = work_dir.join(format!("{}_verified.csv", file_stem(path)));
    write_table(&output, &header, &table)?;
    info!(
        output = %output.display(),
        rows = table.len(),
        malformed = malformed.len(),
        "normalized input written"
    );

    Ok(NormalizeReport {
        output,
        delimiter,
        header,
        malformed,
        decimal_commas,
        dropped_columns: expected - kept,
        missing_value_rows,
        rows_written: table.len(),
    })
}

/// Picks the most frequent candidate delimiter; ties go to the earlier of `, ; \t`.
pub fn detect_delimiter(sample: &[u8]) -> u8 {
    let mut best = DELIMITERS[0];
    let mut best_count = 0;
    for &candidate in &DELIMITERS {
        let count = sample.iter().filter(|&&b| b == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

/// Strips whitespace and replaces file-name-unsafe punctuation with `_`.
pub fn sanitize_identifier(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| *c != ' ' && *c != '\t')
        .map(|c| if UNSAFE_ID_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// True for cells such as `1,25`: a comma, no dot, numeric once the comma becomes a dot.
pub fn is_decimal_comma(cell: &str) -> bool {
    cell.contains(',')
        && !cell.contains('.')
        && cell.trim().replace(',', ".").parse::<f64>().is_ok()
}

pub fn is_missing(cell: &str) -> bool {
    MISSING_TOKENS.contains(&cell.trim())
}

/// Structures read back from a normalized table.
#[derive(Debug, Clone, Default)]
pub struct LoadedRecords {
    pub records: Vec<StructureRecord>,
    /// Ids seen more than once; only the first row for each was kept.
    pub duplicates: Vec<String>,
}

/// Reads `(id, identifier)` pairs, locating the columns by name or else by position.
pub fn load_records(path: &Path) -> Result<LoadedRecords, Error> {
    let csv_err = |source| Error::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let headers = reader.headers().map_err(csv_err)?.clone();
    let find = |name: &str, fallback: usize| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .unwrap_or(fallback)
    };
    let id_col = find(ID_COLUMN, 0);
    let structure_col = find(STRUCTURE_COLUMN, 1);

    let mut seen = HashSet::new();
    let mut loaded = LoadedRecords::default();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let (Some(id), Some(structure)) = (record.get(id_col), record.get(structure_col)) else {
            continue;
        };
        if !seen.insert(id.to_string()) {
            warn!(id, "duplicate structure id; keeping the first occurrence");
            loaded.duplicates.push(id.to_string());
            continue;
        }
        loaded
            .records
            .push(StructureRecord::new(id, structure.trim()));
    }
    Ok(loaded)
}

fn sniff_file(path: &Path) -> Result<u8, Error> {
    let read_err = |source| Error::Read {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(read_err)?;
    let mut sample = Vec::with_capacity(SNIFF_BYTES);
    file.take(SNIFF_BYTES as u64)
        .read_to_end(&mut sample)
        .map_err(read_err)?;
    if sample.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(Error::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(detect_delimiter(&sample))
}

fn write_table(path: &Path, header: &[String], rows: &[Vec<String>]) -> Result<(), Error> {
    let write_err = |source| Error::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(write_err)?;
    writer.write_record(header).map_err(write_err)?;
    for row in rows {
        writer.write_record(row).map_err(write_err)?;
    }
    writer
        .flush()
        .map_err(|e| write_err(csv::Error::from(e)))?;
    Ok(())
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string())
}
