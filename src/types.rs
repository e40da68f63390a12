//src/types.rs

use std::fmt;
use std::path::PathBuf;

/// Label written for rows that carry no annotation.
pub const UNCLASSIFIED_LABEL: &str = "Unclassified";

/// Identifier of one sequenced sample unit, rendered as `{sample}_{unit}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SampleId {
    pub sample: String,
    pub unit: String,
}

impl SampleId {
    pub fn new(sample: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            sample: sample.into(),
            unit: unit.into(),
        }
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.sample, self.unit)
    }
}

/// One row of the sample manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub id: SampleId,
    pub fq1: PathBuf,
    pub fq2: PathBuf,
    /// Assembly the sample's reads were assembled into. Defaults to the sample name.
    pub assembly: String,
}

/// A categorical annotation value.
///
/// `Unclassified` is its own variant so that a feature without annotation can
/// never be confused with a real category that happens to share its label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Annotation {
    Assigned(String),
    Unclassified,
}

impl Annotation {
    /// Reads a cell of an aggregated table, where the sentinel label is expected.
    pub fn from_label(value: &str) -> Self {
        if value.is_empty() || value == UNCLASSIFIED_LABEL {
            Annotation::Unclassified
        } else {
            Annotation::Assigned(value.to_string())
        }
    }

    pub fn is_unclassified(&self) -> bool {
        matches!(self, Annotation::Unclassified)
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Annotation::Assigned(value) => f.write_str(value),
            Annotation::Unclassified => f.write_str(UNCLASSIFIED_LABEL),
        }
    }
}

/// Annotation database an aggregated table belongs to (`kos`, `pfams`, `modules`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Database(pub String);

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Database(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Column holding the feature id in this database's per-assembly tables.
    /// Module tables carry four leading category columns.
    pub fn index_column(&self) -> usize {
        if self.0 == "modules" {
            4
        } else {
            0
        }
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Formats a count the way every output table writes it: integers without a
/// trailing `.0`, missing values as an empty cell.
pub fn format_count(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{}", v),
        None => String::new(),
    }
}
