//src/extract.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use ahash::AHashSet;
use rayon::prelude::*;

use crate::error::{CountError, Result};
use crate::tsv::{field, parse_count, read_table, write_table, RawTable};
use crate::types::{format_count, Annotation, Database, Sample, SampleId};

/// Annotation values per feature id, keyed by column name.
pub type AnnotationMap = BTreeMap<String, BTreeMap<String, Annotation>>;

/// One sample's slice of its assembly's aggregated table.
#[derive(Debug, Clone, Default)]
pub struct SampleCounts {
    pub sample: String,
    pub counts: BTreeMap<String, f64>,
    pub annotation_columns: Vec<String>,
    pub annotations: AnnotationMap,
}

/// Feature-by-sample matrix for one annotation database.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub database: Database,
    pub samples: Vec<String>,
    pub counts: BTreeMap<String, Vec<f64>>,
    pub annotation_columns: Vec<String>,
    pub annotations: AnnotationMap,
}

/// Pairs each sample with the aggregated table of its assembly.
///
/// `template` may contain `{assembly}`, `{db}` and `{sample}` placeholders.
pub fn locate_tables(
    samples: &BTreeMap<SampleId, Sample>,
    template: &str,
    database: &Database,
) -> Vec<(String, PathBuf)> {
    samples
        .values()
        .map(|s| {
            let path = template
                .replace("{assembly}", &s.assembly)
                .replace("{db}", database.name())
                .replace("{sample}", &s.id.to_string());
            (s.id.to_string(), PathBuf::from(path))
        })
        .collect()
}

/// True when every cell of column `idx` is a count and at least one is present.
fn holds_counts(path: &Path, table: &RawTable, idx: usize) -> bool {
    let mut present = false;
    for (line, record) in &table.rows {
        match parse_count(path, *line, &table.header[idx], record.get(idx).unwrap_or("")) {
            Ok(Some(_)) => present = true,
            Ok(None) => {}
            Err(_) => return false,
        }
    }
    present
}

/// Reads `sample`'s count column and the annotation columns from a per-assembly
/// table.
///
/// Columns named in `measurements` belong to samples. A co-assembly table may
/// also carry counts for samples outside this extraction; any other column
/// whose cells are all counts is treated as such and left out. What remains
/// besides the index is annotation.
///
/// Rows sharing a feature id (one feature grouped under several categories)
/// have their counts summed; the first row's annotation is kept.
pub fn read_sample_counts(
    path: &Path,
    sample: &str,
    database: &Database,
    measurements: &AHashSet<String>,
) -> Result<SampleCounts> {
    let table = read_table(path, true, false)?;
    let index = database.index_column();
    if table.header.len() <= index {
        return Err(CountError::TooFewColumns {
            path: path.to_path_buf(),
            line: table.header_line,
            expected: index + 1,
            found: table.header.len(),
        });
    }
    let count_col = table
        .column(sample)
        .ok_or_else(|| CountError::MissingColumn {
            path: path.to_path_buf(),
            column: sample.to_string(),
        })?;

    let mut annotation_idx = Vec::new();
    for i in (0..table.header.len()).filter(|&i| i != index) {
        let name = &table.header[i];
        if measurements.contains(name) {
            continue;
        }
        if holds_counts(path, &table, i) {
            log::debug!("{}: column '{}' holds counts, skipping it", path.display(), name);
            continue;
        }
        annotation_idx.push(i);
    }

    let mut out = SampleCounts {
        sample: sample.to_string(),
        annotation_columns: annotation_idx.iter().map(|&i| table.header[i].clone()).collect(),
        ..Default::default()
    };

    let mut repeated = 0usize;
    for (line, record) in &table.rows {
        let feature = field(path, *line, record, index)?.to_string();
        let cell = field(path, *line, record, count_col)?;
        let count = parse_count(path, *line, sample, cell)?.unwrap_or(0.0);

        let values = annotation_idx
            .iter()
            .map(|&i| {
                let label = record.get(i).unwrap_or("").trim();
                (table.header[i].clone(), Annotation::from_label(label))
            })
            .collect();
        if out.counts.contains_key(&feature) {
            repeated += 1;
        }
        merge_annotations(&mut out.annotations, BTreeMap::from([(feature.clone(), values)]));
        *out.counts.entry(feature).or_insert(0.0) += count;
    }

    if repeated > 0 {
        log::info!(
            "{}: {} rows repeat a {} id, their counts were summed",
            path.display(),
            repeated,
            database
        );
    }
    log::debug!(
        "Extracted {} {} features for {} from {}",
        out.counts.len(),
        database,
        sample,
        path.display()
    );
    Ok(out)
}

/// Adds annotation values from `incoming` without replacing any that are
/// already recorded for the same feature and column.
pub fn merge_annotations(acc: &mut AnnotationMap, incoming: AnnotationMap) {
    for (feature, values) in incoming {
        let slot = acc.entry(feature).or_default();
        for (column, value) in values {
            slot.entry(column).or_insert(value);
        }
    }
}

impl FeatureMatrix {
    pub fn new(database: Database) -> Self {
        Self {
            database,
            samples: Vec::new(),
            counts: BTreeMap::new(),
            annotation_columns: Vec::new(),
            annotations: BTreeMap::new(),
        }
    }

    /// Appends one sample column. Features the sample lacks get 0, as do
    /// earlier samples for features first seen here.
    pub fn add_sample(&mut self, counts: SampleCounts) -> Result<()> {
        if self.samples.contains(&counts.sample) {
            return Err(CountError::DuplicateColumn(counts.sample));
        }
        let width = self.samples.len();
        self.samples.push(counts.sample);

        for row in self.counts.values_mut() {
            row.push(0.0);
        }
        for (feature, value) in counts.counts {
            let row = self
                .counts
                .entry(feature)
                .or_insert_with(|| vec![0.0; width + 1]);
            row[width] = value;
        }

        for column in counts.annotation_columns {
            if !self.annotation_columns.contains(&column) {
                self.annotation_columns.push(column);
            }
        }
        merge_annotations(&mut self.annotations, counts.annotations);
        Ok(())
    }

    pub fn value(&self, feature: &str, sample: &str) -> Option<f64> {
        let col = self.samples.iter().position(|s| s == sample)?;
        self.counts.get(feature).map(|row| row[col])
    }

    pub fn header(&self) -> Vec<String> {
        std::iter::once(self.database.name().to_string())
            .chain(self.samples.iter().cloned())
            .chain(self.annotation_columns.iter().cloned())
            .collect()
    }

    /// Writes counts first, then annotation columns left-joined by feature id.
    pub fn write(&self, path: &Path) -> Result<()> {
        let rows = self.counts.iter().map(|(feature, values)| {
            let annotations = self.annotations.get(feature);
            let mut row = Vec::with_capacity(1 + values.len() + self.annotation_columns.len());
            row.push(feature.clone());
            row.extend(values.iter().map(|v| format_count(Some(*v))));
            for column in &self.annotation_columns {
                let cell = annotations
                    .and_then(|a| a.get(column))
                    .map(|a| a.to_string())
                    .unwrap_or_default();
                row.push(cell);
            }
            row
        });
        write_table(path, &self.header(), rows)
    }
}

/// Builds the cross-sample matrix for `database` from `(sample, table)` pairs.
///
/// Tables are read in parallel and folded in the order given.
pub fn extract_counts(inputs: &[(String, PathBuf)], database: &Database) -> Result<FeatureMatrix> {
    let measurements: AHashSet<String> = inputs.iter().map(|(s, _)| s.clone()).collect();
    if measurements.len() != inputs.len() {
        let mut seen = BTreeSet::new();
        for (sample, _) in inputs {
            if !seen.insert(sample) {
                return Err(CountError::DuplicateColumn(sample.clone()));
            }
        }
    }

    let per_sample = inputs
        .par_iter()
        .map(|(sample, path)| read_sample_counts(path, sample, database, &measurements))
        .collect::<Result<Vec<_>>>()?;

    let mut matrix = FeatureMatrix::new(database.clone());
    for counts in per_sample {
        matrix.add_sample(counts)?;
    }
    log::info!(
        "Extracted {} {} features across {} samples",
        matrix.counts.len(),
        database,
        matrix.samples.len()
    );
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn measurements(names: &[&str]) -> AHashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[rstest]
    #[case("kos", "ko\tS1_1\tS2_1\nK00001\t4\t1\n", "K00001")]
    #[case("pfams", "pfam\tclan\tS1_1\nPF00001\tCL0192\t4\n", "PF00001")]
    #[case(
        "modules",
        "category\tsubcategory\tpathway\tname\tmodule\tS1_1\nA\tB\tmap1\tGlycolysis\tM00001\t4\n",
        "M00001"
    )]
    fn index_column_depends_on_database(
        #[case] db: &str,
        #[case] contents: &str,
        #[case] feature: &str,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("{db}.tsv"));
        std::fs::write(&path, contents).unwrap();

        let counts = read_sample_counts(
            &path,
            "S1_1",
            &Database::new(db),
            &measurements(&["S1_1", "S2_1"]),
        )
        .unwrap();
        assert_eq!(counts.counts.get(feature), Some(&4.0));
        assert!(!counts.annotation_columns.contains(&"S2_1".to_string()));
    }

    #[test]
    fn module_annotations_exclude_index_and_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modules.tsv");
        std::fs::write(
            &path,
            "category\tsubcategory\tpathway\tname\tmodule\tS1_1\tS2_1\nA\tB\tmap1\tGlycolysis\tM00001\t4\t9\n",
        )
        .unwrap();

        let counts = read_sample_counts(
            &path,
            "S2_1",
            &Database::new("modules"),
            &measurements(&["S1_1", "S2_1"]),
        )
        .unwrap();
        assert_eq!(counts.annotation_columns, vec!["category", "subcategory", "pathway", "name"]);
        assert_eq!(counts.counts["M00001"], 9.0);
        assert_eq!(
            counts.annotations["M00001"]["name"],
            Annotation::Assigned("Glycolysis".into())
        );
    }

    #[test]
    fn repeated_feature_ids_are_summed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pfams.tsv");
        std::fs::write(&path, "pfam\tclan\tA_1\nPF1\tCL1\t5\nPF1\tCL2\t7\nPF2\tCL1\t1\n").unwrap();

        let counts =
            read_sample_counts(&path, "A_1", &Database::new("pfams"), &measurements(&["A_1"]))
                .unwrap();
        assert_eq!(counts.counts["PF1"], 12.0);
        assert_eq!(counts.counts["PF2"], 1.0);
        assert_eq!(counts.annotations["PF1"]["clan"], Annotation::Assigned("CL1".into()));
    }

    #[test]
    fn undeclared_sample_columns_are_not_annotation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kos.tsv");
        std::fs::write(&path, "ko\tname\tA_1\tX_1\nK1\tone\t5\t9\nK2\ttwo\t1\t\n").unwrap();

        let matrix =
            extract_counts(&[("A_1".to_string(), path.clone())], &Database::new("kos")).unwrap();
        assert_eq!(matrix.annotation_columns, vec!["name"]);
        assert_eq!(matrix.samples, vec!["A_1"]);
        assert_eq!(matrix.value("K1", "A_1"), Some(5.0));

        let out = dir.path().join("out.tsv");
        matrix.write(&out).unwrap();
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "kos\tA_1\tname\nK1\t5\tone\nK2\t1\ttwo\n"
        );
    }

    #[test]
    fn missing_sample_column_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kos.tsv");
        std::fs::write(&path, "ko\tS1_1\nK00001\t4\n").unwrap();

        assert!(matches!(
            read_sample_counts(&path, "S9_1", &Database::new("kos"), &measurements(&["S9_1"])),
            Err(CountError::MissingColumn { column, .. }) if column == "S9_1"
        ));
    }

    #[test]
    fn first_annotation_is_kept() {
        let mut acc = AnnotationMap::new();
        let mut first = BTreeMap::new();
        first.insert("name".to_string(), Annotation::Assigned("alpha".into()));
        acc.insert("K1".to_string(), first);

        let mut later = BTreeMap::new();
        later.insert("name".to_string(), Annotation::Assigned("beta".into()));
        later.insert("class".to_string(), Annotation::Unclassified);
        let mut incoming = AnnotationMap::new();
        incoming.insert("K1".to_string(), later);

        merge_annotations(&mut acc, incoming);
        assert_eq!(acc["K1"]["name"], Annotation::Assigned("alpha".into()));
        assert_eq!(acc["K1"]["class"], Annotation::Unclassified);
    }

    #[test]
    fn absent_features_fill_with_zero() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("asmA.tsv");
        let b = dir.path().join("asmB.tsv");
        std::fs::write(&a, "ko\tname\tA_1\nK1\tone\t5\nK2\ttwo\t2\n").unwrap();
        std::fs::write(&b, "ko\tname\tB_1\nK2\tTWO\t3\nK3\tthree\t8\n").unwrap();

        let matrix = extract_counts(
            &[("A_1".to_string(), a), ("B_1".to_string(), b)],
            &Database::new("kos"),
        )
        .unwrap();

        assert_eq!(matrix.value("K1", "A_1"), Some(5.0));
        assert_eq!(matrix.value("K1", "B_1"), Some(0.0));
        assert_eq!(matrix.value("K3", "A_1"), Some(0.0));
        assert_eq!(matrix.value("K2", "B_1"), Some(3.0));

        let out = dir.path().join("out/kos.tsv");
        matrix.write(&out).unwrap();
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "kos\tA_1\tB_1\tname\nK1\t5\t0\tone\nK2\t2\t3\ttwo\nK3\t0\t8\tthree\n"
        );
    }

    #[test]
    fn locates_tables_through_assembly() {
        let mut samples = BTreeMap::new();
        for (name, assembly) in [("S1", "co1"), ("S2", "S2")] {
            let id = SampleId::new(name, "1");
            samples.insert(
                id.clone(),
                Sample {
                    id,
                    fq1: PathBuf::from("r1.fq"),
                    fq2: PathBuf::from("r2.fq"),
                    assembly: assembly.to_string(),
                },
            );
        }

        let located = locate_tables(&samples, "results/{assembly}/{db}.tsv", &Database::new("kos"));
        assert_eq!(
            located,
            vec![
                ("S1_1".to_string(), PathBuf::from("results/co1/kos.tsv")),
                ("S2_1".to_string(), PathBuf::from("results/S2/kos.tsv")),
            ]
        );
    }

    #[test]
    fn duplicate_sample_inputs_rejected() {
        let inputs = vec![
            ("A_1".to_string(), PathBuf::from("x.tsv")),
            ("A_1".to_string(), PathBuf::from("y.tsv")),
        ];
        assert!(matches!(
            extract_counts(&inputs, &Database::new("kos")),
            Err(CountError::DuplicateColumn(s)) if s == "A_1"
        ));
    }
}
