//src/aggregate.rs

use std::collections::BTreeMap;
use std::path::Path;

use ahash::{AHashMap, AHashSet};

use crate::error::{CountError, Result};
use crate::tsv::{field, parse_count, read_table, write_table};
use crate::types::{format_count, Annotation, UNCLASSIFIED_LABEL};

/// Per-unit abundance: one row per ORF (or other unit), one column per sample.
#[derive(Debug, Clone, Default)]
pub struct AbundanceTable {
    pub samples: Vec<String>,
    pub rows: Vec<(String, Vec<Option<f64>>)>,
}

/// Categorical assignments per unit. Column order is the grouping order.
#[derive(Debug, Clone, Default)]
pub struct AnnotationTable {
    pub columns: Vec<String>,
    pub rows: AHashMap<String, Vec<Annotation>>,
}

/// Summed abundance per distinct combination of annotation values.
#[derive(Debug, Clone)]
pub struct AggregatedTable {
    pub annotation_columns: Vec<String>,
    pub samples: Vec<String>,
    pub rows: BTreeMap<Vec<Annotation>, Vec<f64>>,
}

fn check_unique(columns: &[String]) -> Result<()> {
    let mut seen = AHashSet::new();
    for column in columns {
        if !seen.insert(column.as_str()) {
            return Err(CountError::DuplicateColumn(column.clone()));
        }
    }
    Ok(())
}

impl AbundanceTable {
    /// Loads an abundance table. The first column is the row index and every
    /// other column is a sample; with `drop_length` a `length` column (any case)
    /// is left out.
    pub fn from_path(path: &Path, drop_length: bool) -> Result<Self> {
        let table = read_table(path, true, false)?;

        let kept: Vec<usize> = (1..table.header.len())
            .filter(|&i| !(drop_length && table.header[i].eq_ignore_ascii_case("length")))
            .collect();
        if kept.len() + 1 < table.header.len() {
            log::debug!("{}: dropped length column", path.display());
        }
        let samples: Vec<String> = kept.iter().map(|&i| table.header[i].clone()).collect();
        check_unique(&samples)?;

        let mut rows = Vec::with_capacity(table.rows.len());
        for (line, record) in &table.rows {
            let id = field(path, *line, record, 0)?.to_string();
            let mut values = Vec::with_capacity(kept.len());
            for &i in &kept {
                let cell = field(path, *line, record, i)?;
                values.push(parse_count(path, *line, &table.header[i], cell)?);
            }
            rows.push((id, values));
        }

        log::info!(
            "Loaded abundance for {} units across {} samples from {}",
            rows.len(),
            samples.len(),
            path.display()
        );
        Ok(Self { samples, rows })
    }

    /// Sum of every present value.
    pub fn total(&self) -> f64 {
        self.rows
            .iter()
            .flat_map(|(_, values)| values.iter())
            .map(|v| v.unwrap_or(0.0))
            .sum()
    }
}

impl AnnotationTable {
    /// Loads an annotation table. The first column is the unit id; at least one
    /// categorical column must follow. Empty cells are unclassified.
    pub fn from_path(path: &Path) -> Result<Self> {
        let table = read_table(path, true, false)?;
        if table.header.len() < 2 {
            return Err(CountError::TooFewColumns {
                path: path.to_path_buf(),
                line: table.header_line,
                expected: 2,
                found: table.header.len(),
            });
        }

        let columns: Vec<String> = table.header[1..].to_vec();
        check_unique(&columns)?;

        let mut rows = AHashMap::with_capacity(table.rows.len());
        let mut duplicates = 0usize;
        for (line, record) in &table.rows {
            let id = field(path, *line, record, 0)?.to_string();
            let mut values = Vec::with_capacity(columns.len());
            for (offset, column) in columns.iter().enumerate() {
                let cell = record.get(offset + 1).unwrap_or("").trim();
                if cell == UNCLASSIFIED_LABEL {
                    return Err(CountError::ReservedLabel {
                        path: path.to_path_buf(),
                        line: *line,
                        column: column.clone(),
                    });
                }
                values.push(if cell.is_empty() {
                    Annotation::Unclassified
                } else {
                    Annotation::Assigned(cell.to_string())
                });
            }
            if rows.contains_key(&id) {
                duplicates += 1;
                continue;
            }
            rows.insert(id, values);
        }

        if duplicates > 0 {
            log::warn!(
                "{}: {} repeated unit ids, keeping the first annotation of each",
                path.display(),
                duplicates
            );
        }
        log::info!(
            "Loaded {} annotated units ({}) from {}",
            rows.len(),
            columns.join(", "),
            path.display()
        );
        Ok(Self { columns, rows })
    }
}

impl AggregatedTable {
    pub fn header(&self) -> Vec<String> {
        self.annotation_columns
            .iter()
            .chain(self.samples.iter())
            .cloned()
            .collect()
    }

    /// Sums for rows whose first annotation column equals `label`, added over
    /// any further annotation columns.
    pub fn sums_for(&self, label: &Annotation) -> Option<Vec<f64>> {
        let mut found: Option<Vec<f64>> = None;
        for (key, sums) in &self.rows {
            if key.first() == Some(label) {
                let acc = found.get_or_insert_with(|| vec![0.0; sums.len()]);
                for (a, s) in acc.iter_mut().zip(sums) {
                    *a += s;
                }
            }
        }
        found
    }

    pub fn total(&self) -> f64 {
        self.rows.values().flat_map(|v| v.iter()).sum()
    }

    /// Writes the table indexed by the first annotation column.
    pub fn write(&self, path: &Path) -> Result<()> {
        let rows = self.rows.iter().map(|(key, sums)| {
            key.iter()
                .map(|a| a.to_string())
                .chain(sums.iter().map(|s| format_count(Some(*s))))
                .collect::<Vec<_>>()
        });
        write_table(path, &self.header(), rows)
    }
}

/// Joins annotation onto abundance and sums samples per annotation group.
///
/// Every abundance row is kept: units without an annotation row fall into the
/// all-`Unclassified` group. Absent values add nothing.
pub fn combine(abundance: &AbundanceTable, annotation: &AnnotationTable) -> AggregatedTable {
    let width = annotation.columns.len();
    let unclassified = vec![Annotation::Unclassified; width];

    let mut rows: BTreeMap<Vec<Annotation>, Vec<f64>> = BTreeMap::new();
    let mut unmatched = 0usize;
    for (id, values) in &abundance.rows {
        let key = match annotation.rows.get(id) {
            Some(k) => k,
            None => {
                unmatched += 1;
                &unclassified
            }
        };
        let sums = rows
            .entry(key.clone())
            .or_insert_with(|| vec![0.0; abundance.samples.len()]);
        for (s, v) in sums.iter_mut().zip(values) {
            *s += v.unwrap_or(0.0);
        }
    }

    log::info!(
        "Aggregated {} units into {} groups by {} ({} unannotated)",
        abundance.rows.len(),
        rows.len(),
        annotation.columns.first().map(String::as_str).unwrap_or(""),
        unmatched
    );
    AggregatedTable {
        annotation_columns: annotation.columns.clone(),
        samples: abundance.samples.clone(),
        rows,
    }
}

/// Loads abundance and annotation from disk and aggregates them.
pub fn reduce_from_files(abundance_path: &Path, annotation_path: &Path) -> Result<AggregatedTable> {
    let abundance = AbundanceTable::from_path(abundance_path, true)?;
    let annotation = AnnotationTable::from_path(annotation_path)?;
    Ok(combine(&abundance, &annotation))
}

/// Aggregates and writes the result to `output`.
pub fn count_features(
    abundance_path: &Path,
    annotation_path: &Path,
    output: &Path,
) -> Result<AggregatedTable> {
    let table = reduce_from_files(abundance_path, annotation_path)?;
    table.write(output)?;
    Ok(table)
}
