//src/featurecount.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ahash::AHashSet;
use rayon::prelude::*;

use crate::error::{CountError, Result};
use crate::tsv::{field, parse_count, read_table, write_table};
use crate::types::format_count;

/// Column positions in a featureCounts table:
/// `Geneid  Chr  Start  End  Strand  Length  <count>`
const FEATURE_ID_COL: usize = 0;
const REFERENCE_COL: usize = 1;
const LENGTH_COL: usize = 5;
const COUNT_COL: usize = 6;

/// Header of the reconciled length column in merged output.
pub const LENGTH_HEADER: &str = "Length";

/// Options for merging raw count files.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Carry the per-feature length column into the merged table.
    pub with_length: bool,
    /// Fail instead of overwriting when a row key repeats inside one file.
    pub strict_keys: bool,
    /// Stripped from each file name to obtain the sample name.
    pub suffix: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            with_length: true,
            strict_keys: false,
            suffix: ".fc.tsv".to_string(),
        }
    }
}

/// One feature from a raw count file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawCount {
    pub length: Option<u64>,
    pub count: f64,
}

/// A single sample's raw counts keyed by composite row key.
#[derive(Debug, Clone)]
pub struct RawCountTable {
    pub sample: String,
    pub has_length: bool,
    pub rows: BTreeMap<String, RawCount>,
}

/// Row of the merged table: one length and one (possibly missing) count per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub length: Option<u64>,
    pub counts: Vec<Option<f64>>,
}

/// Outer join of any number of raw count tables.
#[derive(Debug, Clone, Default)]
pub struct MergedCounts {
    pub samples: Vec<String>,
    pub has_length: bool,
    pub rows: BTreeMap<String, MergedRow>,
}

/// Builds the composite key `{reference}_{last '_' token of feature id}`.
pub fn row_key(feature_id: &str, reference: &str) -> String {
    let suffix = feature_id.rsplit('_').next().unwrap_or(feature_id);
    format!("{}_{}", reference, suffix)
}

/// Derives the sample name from a raw count file path.
pub fn sample_name(path: &Path, suffix: &str) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    name.strip_suffix(suffix).unwrap_or(name).to_string()
}

/// The first length reported for a feature is kept; later ones are discarded.
pub fn reconcile_length(existing: Option<u64>, incoming: Option<u64>) -> Option<u64> {
    existing.or(incoming)
}

/// Reads one featureCounts output file.
pub fn read_raw_counts(path: &Path, config: &MergeConfig) -> Result<RawCountTable> {
    let sample = sample_name(path, &config.suffix);
    let table = read_table(path, true, true)?;

    if table.header.len() <= COUNT_COL {
        return Err(CountError::TooFewColumns {
            path: path.to_path_buf(),
            line: table.header_line,
            expected: COUNT_COL + 1,
            found: table.header.len(),
        });
    }
    let count_header = table.header[COUNT_COL].clone();
    let length_header = table.header[LENGTH_COL].clone();

    let mut rows = BTreeMap::new();
    let mut collisions = 0usize;
    for (line, record) in &table.rows {
        let line = *line;
        let feature_id = field(path, line, record, FEATURE_ID_COL)?;
        let reference = field(path, line, record, REFERENCE_COL)?;
        let raw_count = field(path, line, record, COUNT_COL)?;

        let count = parse_count(path, line, &count_header, raw_count)?.ok_or_else(|| {
            CountError::InvalidNumber {
                path: path.to_path_buf(),
                line,
                column: count_header.clone(),
                value: raw_count.to_string(),
            }
        })?;

        let length = if config.with_length {
            let raw_length = field(path, line, record, LENGTH_COL)?;
            let parsed = raw_length.trim().parse::<u64>().map_err(|_| CountError::InvalidNumber {
                path: path.to_path_buf(),
                line,
                column: length_header.clone(),
                value: raw_length.to_string(),
            })?;
            Some(parsed)
        } else {
            None
        };

        let key = row_key(feature_id, reference);
        if rows.insert(key.clone(), RawCount { length, count }).is_some() {
            if config.strict_keys {
                return Err(CountError::DuplicateKey {
                    path: path.to_path_buf(),
                    key,
                });
            }
            collisions += 1;
        }
    }

    if collisions > 0 {
        log::warn!(
            "{}: {} duplicate row keys, later rows overwrote earlier ones",
            path.display(),
            collisions
        );
    }
    if rows.is_empty() {
        log::warn!("{}: no count rows for sample {}", path.display(), sample);
    } else {
        log::info!("Read {} features for sample {}", rows.len(), sample);
    }

    Ok(RawCountTable {
        sample,
        has_length: config.with_length,
        rows,
    })
}

impl MergedCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outer-joins one more sample into the accumulator.
    pub fn merge(&mut self, table: RawCountTable) -> Result<()> {
        if self.samples.iter().any(|s| *s == table.sample) {
            return Err(CountError::DuplicateColumn(table.sample));
        }
        let width = self.samples.len();
        self.samples.push(table.sample);
        self.has_length |= table.has_length;

        for row in self.rows.values_mut() {
            row.counts.push(None);
        }

        for (key, raw) in table.rows {
            let row = self.rows.entry(key).or_insert_with(|| MergedRow {
                length: None,
                counts: vec![None; width + 1],
            });
            row.length = reconcile_length(row.length, raw.length);
            row.counts[width] = Some(raw.count);
        }
        Ok(())
    }

    pub fn header(&self) -> Vec<String> {
        let mut header = vec![String::new()];
        if self.has_length {
            header.push(LENGTH_HEADER.to_string());
        }
        header.extend(self.samples.iter().cloned());
        header
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let has_length = self.has_length;
        let rows = self.rows.iter().map(|(key, row)| {
            let mut out = Vec::with_capacity(row.counts.len() + 2);
            out.push(key.clone());
            if has_length {
                out.push(row.length.map(|l| l.to_string()).unwrap_or_default());
            }
            out.extend(row.counts.iter().map(|c| format_count(*c)));
            out
        });
        write_table(path, &self.header(), rows)
    }
}

/// Reads every raw count file and folds them, in the given order, into one table.
///
/// Files are parsed in parallel; any failure aborts before anything is merged.
pub fn merge_raw_counts(paths: &[PathBuf], config: &MergeConfig) -> Result<MergedCounts> {
    let mut seen = AHashSet::new();
    for path in paths {
        let name = sample_name(path, &config.suffix);
        if !seen.insert(name.clone()) {
            return Err(CountError::DuplicateColumn(name));
        }
    }

    let tables = paths
        .par_iter()
        .map(|p| read_raw_counts(p, config))
        .collect::<Result<Vec<_>>>()?;

    let mut merged = MergedCounts::new();
    for table in tables {
        merged.merge(table)?;
    }
    log::info!(
        "Merged {} samples into {} features",
        merged.samples.len(),
        merged.rows.len()
    );
    Ok(merged)
}

/// Merges raw count files and writes the wide table to `output`.
pub fn clean_featurecount(
    paths: &[PathBuf],
    output: &Path,
    config: &MergeConfig,
) -> Result<MergedCounts> {
    let merged = merge_raw_counts(paths, config)?;
    merged.write(output)?;
    Ok(merged)
}
