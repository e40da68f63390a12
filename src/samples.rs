//src/samples.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::error::{CountError, Result};
use crate::tsv::{field, read_table};
use crate::types::{Sample, SampleId};

/// Marker file written by a finished assembly.
pub const FINAL_CONTIGS: &str = "final_contigs.fa";

/// Parses a sample sheet:
/// ```text
/// sample  unit  fq1  fq2  [assembly]
/// ```
/// Returns one `Sample` per `{sample}_{unit}`. A missing or empty assembly
/// falls back to the sample name.
pub fn parse_samples<P: AsRef<Path>>(path: P) -> Result<BTreeMap<SampleId, Sample>> {
    let path = path.as_ref();
    let table = read_table(path, true, false)?;

    let require = |name: &str| {
        table.column(name).ok_or_else(|| CountError::MissingColumn {
            path: path.to_path_buf(),
            column: name.to_string(),
        })
    };
    let unit_col = require("unit")?;
    let fq1_col = require("fq1")?;
    let fq2_col = require("fq2")?;
    let assembly_col = table.column("assembly");

    let mut samples = BTreeMap::new();
    for (line, record) in &table.rows {
        let name = field(path, *line, record, 0)?.trim().to_string();
        let unit = field(path, *line, record, unit_col)?.trim().to_string();
        let fq1 = PathBuf::from(field(path, *line, record, fq1_col)?.trim());
        let fq2 = PathBuf::from(field(path, *line, record, fq2_col)?.trim());

        let assembly = assembly_col
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(&name)
            .to_string();

        let id = SampleId::new(name, unit);
        if samples.contains_key(&id) {
            return Err(CountError::DuplicateKey {
                path: path.to_path_buf(),
                key: id.to_string(),
            });
        }
        samples.insert(
            id.clone(),
            Sample {
                id,
                fq1,
                fq2,
                assembly,
            },
        );
    }

    log::info!("Parsed {} samples from {}", samples.len(), path.display());
    Ok(samples)
}

/// Reads assembly names (first column, no header) and keeps those with a
/// finished `{assembly_dir}/{name}/final_contigs.fa`.
pub fn parse_assemblies<P: AsRef<Path>, Q: AsRef<Path>>(
    path: P,
    assembly_dir: Q,
) -> Result<BTreeSet<String>> {
    let path = path.as_ref();
    let table = read_table(path, false, false)?;

    let mut valid = BTreeSet::new();
    for (line, record) in &table.rows {
        let name = field(path, *line, record, 0)?.trim();
        if name.is_empty() {
            continue;
        }
        let contigs = assembly_dir.as_ref().join(name).join(FINAL_CONTIGS);
        if contigs.exists() {
            valid.insert(name.to_string());
        } else {
            log::warn!("Skipping assembly {}: {} not found", name, contigs.display());
        }
    }
    Ok(valid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembly_defaults_to_sample_name() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = dir.path().join("samples.tsv");
        std::fs::write(
            &sheet,
            "sample\tunit\tfq1\tfq2\tassembly\nS1\t1\ta_R1.fq\ta_R2.fq\tco\nS2\t1\tb_R1.fq\tb_R2.fq\t\n",
        )
        .unwrap();

        let samples = parse_samples(&sheet).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[&SampleId::new("S1", "1")].assembly, "co");
        let s2 = &samples[&SampleId::new("S2", "1")];
        assert_eq!(s2.assembly, "S2");
        assert_eq!(s2.fq1, PathBuf::from("b_R1.fq"));
    }

    #[test]
    fn assembly_column_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = dir.path().join("samples.tsv");
        std::fs::write(&sheet, "sample\tunit\tfq1\tfq2\nS1\t2\ta_R1.fq\ta_R2.fq\n").unwrap();

        let samples = parse_samples(&sheet).unwrap();
        let s1 = samples.values().next().unwrap();
        assert_eq!(s1.id.to_string(), "S1_2");
        assert_eq!(s1.assembly, "S1");
    }

    #[test]
    fn missing_unit_column_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = dir.path().join("samples.tsv");
        std::fs::write(&sheet, "sample\tfq1\tfq2\nS1\ta\tb\n").unwrap();

        assert!(matches!(
            parse_samples(&sheet),
            Err(CountError::MissingColumn { column, .. }) if column == "unit"
        ));
    }

    #[test]
    fn only_finished_assemblies_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let asm_dir = dir.path().join("assembly");
        std::fs::create_dir_all(asm_dir.join("done")).unwrap();
        std::fs::write(asm_dir.join("done").join(FINAL_CONTIGS), ">c1\nACGT\n").unwrap();
        std::fs::create_dir_all(asm_dir.join("partial")).unwrap();

        let list = dir.path().join("assemblies.tsv");
        std::fs::write(&list, "done\tS1\npartial\tS2\nmissing\tS3\n").unwrap();

        let valid = parse_assemblies(&list, &asm_dir).unwrap();
        assert_eq!(valid.into_iter().collect::<Vec<_>>(), vec!["done".to_string()]);
    }
}
