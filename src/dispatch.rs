use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{PipelineError, Result};

pub const FIRST_MATE_SUFFIX: &str = "_1.fastq.gz";
pub const SECOND_MATE_SUFFIX: &str = "_2.fastq.gz";
pub const ASSEMBLY_SUFFIXES: &[&str] = &[".fasta", ".fa"];

/// One thing the classifier runs on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputUnit {
    Paired {
        sample: String,
        first: PathBuf,
        second: PathBuf,
    },
    Assembly {
        sample: String,
        path: PathBuf,
    },
}

impl InputUnit {
    pub fn sample(&self) -> &str {
        match self {
            InputUnit::Paired { sample, .. } | InputUnit::Assembly { sample, .. } => sample,
        }
    }

    pub fn is_paired(&self) -> bool {
        matches!(self, InputUnit::Paired { .. })
    }

    pub fn files(&self) -> Vec<&Path> {
        match self {
            InputUnit::Paired { first, second, .. } => vec![first.as_path(), second.as_path()],
            InputUnit::Assembly { path, .. } => vec![path.as_path()],
        }
    }
}

/// Output files of one sample, all keyed by its name.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleOutputs {
    pub report: PathBuf,
    pub classification: PathBuf,
    pub lineage: PathBuf,
    pub krona: PathBuf,
}

pub const REPORT_EXT: &str = "kreport";
pub const CLASSIFICATION_EXT: &str = "krak2";
pub const LINEAGE_EXT: &str = "kraken2";
pub const KRONA_EXT: &str = "krona";
pub const KRONAGRAM_FILE: &str = "kronagram.html";

impl SampleOutputs {
    pub fn new(out_dir: &Path, sample: &str) -> Self {
        let named = |ext: &str| out_dir.join(format!("{}.{}", sample, ext));
        Self {
            report: named(REPORT_EXT),
            classification: named(CLASSIFICATION_EXT),
            lineage: named(LINEAGE_EXT),
            krona: named(KRONA_EXT),
        }
    }
}

/// Sorts the positional arguments into input units.
///
/// Unrecognised names are skipped. A `_1.fastq.gz` file whose `_2.fastq.gz` mate
/// is missing fails the whole dispatch.
pub fn dispatch<P: AsRef<Path>>(args: &[P]) -> Result<Vec<InputUnit>> {
    let mut units = Vec::new();
    let mut seen = HashSet::new();

    for arg in args {
        let path = arg.as_ref();
        let Some(unit) = classify_input(path)? else {
            log::debug!("Ignoring {}", path.display());
            continue;
        };
        if !seen.insert(unit.sample().to_string()) {
            log::warn!(
                "Sample name '{}' appears more than once; its outputs will be overwritten",
                unit.sample()
            );
        }
        units.push(unit);
    }

    Ok(units)
}

fn classify_input(path: &Path) -> Result<Option<InputUnit>> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(None);
    };

    if let Some(sample) = name.strip_suffix(FIRST_MATE_SUFFIX) {
        let second = mate_path(path, sample);
        if !second.exists() {
            return Err(PipelineError::MissingMate {
                first: path.to_path_buf(),
                mate: second,
            });
        }
        return Ok(Some(InputUnit::Paired {
            sample: sample.to_string(),
            first: path.to_path_buf(),
            second,
        }));
    }

    for suffix in ASSEMBLY_SUFFIXES {
        if let Some(sample) = name.strip_suffix(suffix) {
            return Ok(Some(InputUnit::Assembly {
                sample: sample.to_string(),
                path: path.to_path_buf(),
            }));
        }
    }

    Ok(None)
}

fn mate_path(first: &Path, sample: &str) -> PathBuf {
    first.with_file_name(format!("{}{}", sample, SECOND_MATE_SUFFIX))
}

/// Files in `out_dir` with extension `ext`, sorted by name.
pub fn collect_outputs(out_dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(out_dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map(|e| e == ext).unwrap_or(false) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Sample name of an output file: its name without the extension.
pub fn sample_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
