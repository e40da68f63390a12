//src/toolbox.rs

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::aggregate::count_features;
use crate::error::{CountError, Result};
use crate::extract::{extract_counts, locate_tables};
use crate::featurecount::{clean_featurecount, MergeConfig};
use crate::samples::parse_samples;
use crate::types::Database;

/// The operations a pipeline rule can ask for by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CleanFeaturecount,
    CountFeatures,
    ExtractCounts,
}

impl Operation {
    pub const ALL: [Operation; 3] = [
        Operation::CleanFeaturecount,
        Operation::CountFeatures,
        Operation::ExtractCounts,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::CleanFeaturecount => "clean_featurecount",
            Operation::CountFeatures => "count_features",
            Operation::ExtractCounts => "extract_counts",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = CountError;

    fn from_str(s: &str) -> Result<Self> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.name() == s)
            .ok_or_else(|| CountError::UnknownOperation(s.to_string()))
    }
}

/// Named inputs, outputs, parameters and wildcard values for one invocation.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub inputs: BTreeMap<String, Vec<PathBuf>>,
    pub outputs: BTreeMap<String, PathBuf>,
    pub params: BTreeMap<String, String>,
    pub wildcards: BTreeMap<String, String>,
}

impl Invocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, key: &str, path: impl Into<PathBuf>) -> Self {
        self.inputs.entry(key.to_string()).or_default().push(path.into());
        self
    }

    pub fn output(mut self, key: &str, path: impl Into<PathBuf>) -> Self {
        self.outputs.insert(key.to_string(), path.into());
        self
    }

    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn wildcard(mut self, key: &str, value: impl Into<String>) -> Self {
        self.wildcards.insert(key.to_string(), value.into());
        self
    }

    fn inputs_for(&self, key: &str) -> Result<&[PathBuf]> {
        self.inputs
            .get(key)
            .filter(|v| !v.is_empty())
            .map(Vec::as_slice)
            .ok_or_else(|| CountError::MissingInvocationField {
                kind: "input",
                key: key.to_string(),
            })
    }

    fn single_input(&self, key: &str) -> Result<&PathBuf> {
        self.inputs_for(key).map(|v| &v[0])
    }

    fn output_for(&self, key: &str) -> Result<&PathBuf> {
        self.outputs
            .get(key)
            .ok_or_else(|| CountError::MissingInvocationField {
                kind: "output",
                key: key.to_string(),
            })
    }

    fn param_for(&self, key: &str) -> Result<&str> {
        self.params
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| CountError::MissingInvocationField {
                kind: "param",
                key: key.to_string(),
            })
    }

    fn wildcard_for(&self, key: &str) -> Result<&str> {
        self.wildcards
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| CountError::MissingInvocationField {
                kind: "wildcard",
                key: key.to_string(),
            })
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool> {
        match self.params.get(key).map(String::as_str) {
            None => Ok(default),
            Some("true") | Some("True") | Some("1") | Some("yes") => Ok(true),
            Some("false") | Some("False") | Some("0") | Some("no") => Ok(false),
            Some(other) => Err(CountError::InvalidParameter {
                key: key.to_string(),
                value: other.to_string(),
            }),
        }
    }

    /// Merge options from `with_length`, `strict_keys` and `suffix`.
    pub fn merge_config(&self) -> Result<MergeConfig> {
        let defaults = MergeConfig::default();
        Ok(MergeConfig {
            with_length: self.flag("with_length", defaults.with_length)?,
            strict_keys: self.flag("strict_keys", defaults.strict_keys)?,
            suffix: self
                .params
                .get("suffix")
                .cloned()
                .unwrap_or(defaults.suffix),
        })
    }
}

fn run_clean_featurecount(inv: &Invocation) -> Result<()> {
    let inputs = inv.inputs_for("tsv")?;
    let output = inv.output_for("tsv")?;
    clean_featurecount(inputs, output, &inv.merge_config()?)?;
    Ok(())
}

fn run_count_features(inv: &Invocation) -> Result<()> {
    count_features(
        inv.single_input("abund")?,
        inv.single_input("annot")?,
        inv.output_for("tsv")?,
    )?;
    Ok(())
}

fn run_extract_counts(inv: &Invocation) -> Result<()> {
    let samples = parse_samples(inv.single_input("sample_info")?)?;
    let database = Database::new(inv.wildcard_for("db")?);
    let tables = locate_tables(&samples, inv.param_for("table_template")?, &database);
    let matrix = extract_counts(&tables, &database)?;
    matrix.write(inv.output_for("tsv")?)
}

/// Runs `op` with the files and settings named in `inv`.
pub fn dispatch(op: Operation, inv: &Invocation) -> Result<()> {
    log::info!("Running {}", op);
    let toolbox: fn(&Invocation) -> Result<()> = match op {
        Operation::CleanFeaturecount => run_clean_featurecount,
        Operation::CountFeatures => run_count_features,
        Operation::ExtractCounts => run_extract_counts,
    };
    toolbox(inv)
}

/// Resolves `name` against the operation table and runs it.
pub fn dispatch_by_name(name: &str, inv: &Invocation) -> Result<()> {
    dispatch(name.parse()?, inv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(op.name().parse::<Operation>().unwrap(), op);
        }
        assert!(matches!(
            "normalize".parse::<Operation>(),
            Err(CountError::UnknownOperation(name)) if name == "normalize"
        ));
    }

    #[test]
    fn merge_config_from_params() {
        let inv = Invocation::new().param("with_length", "false").param("suffix", ".counts");
        let config = inv.merge_config().unwrap();
        assert!(!config.with_length);
        assert!(!config.strict_keys);
        assert_eq!(config.suffix, ".counts");

        let bad = Invocation::new().param("strict_keys", "maybe");
        assert!(matches!(
            bad.merge_config(),
            Err(CountError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn missing_input_is_reported() {
        let inv = Invocation::new().output("tsv", "out.tsv");
        assert!(matches!(
            dispatch(Operation::CountFeatures, &inv),
            Err(CountError::MissingInvocationField { kind: "input", key }) if key == "abund"
        ));
    }

    #[test]
    fn count_features_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let abund = dir.path().join("abund.tsv");
        let annot = dir.path().join("annot.tsv");
        let out = dir.path().join("kos.tsv");
        std::fs::write(&abund, "\tS1\nu1\t2\nu2\t3\n").unwrap();
        std::fs::write(&annot, "orf\tko\nu1\tK1\nu2\tK1\n").unwrap();

        let inv = Invocation::new()
            .input("abund", &abund)
            .input("annot", &annot)
            .output("tsv", &out);
        dispatch_by_name("count_features", &inv).unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "ko\tS1\nK1\t5\n");
    }
}
