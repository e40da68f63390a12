// src/lib.rs
pub mod types;
pub mod error;
pub mod tsv;
pub mod featurecount;
pub mod aggregate;
pub mod extract;
pub mod samples;
pub mod toolbox;

pub use crate::aggregate::{combine, count_features, reduce_from_files, AggregatedTable};
pub use crate::error::{CountError, Result};
pub use crate::extract::{extract_counts, locate_tables, FeatureMatrix};
pub use crate::featurecount::{clean_featurecount, merge_raw_counts, MergeConfig, MergedCounts};
pub use crate::samples::{parse_assemblies, parse_samples};
pub use crate::toolbox::{dispatch, dispatch_by_name, Invocation, Operation};
pub use crate::types::{Annotation, Database, Sample, SampleId};
