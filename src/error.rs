use std::path::PathBuf;
use thiserror::Error;

/// Every failure the pipeline can hit. All of them end the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration file '{0}' not found (looked in: {1})")]
    ConfigNotFound(String, String),

    #[error("{path}:{line}: malformed configuration line '{content}'")]
    ConfigSyntax {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("{path}: required setting {key} is not set")]
    ConfigMissingKey { path: PathBuf, key: &'static str },

    #[error("Kraken2 database directory '{0}' does not exist")]
    MissingDatabase(PathBuf),

    #[error("scripts directory '{0}' does not exist")]
    MissingScriptsDir(PathBuf),

    #[error("mate file '{mate}' for '{first}' does not exist")]
    MissingMate { first: PathBuf, mate: PathBuf },

    #[error("{path}: {reason}")]
    MalformedFastq { path: PathBuf, reason: String },

    #[error("mate files are out of sync at record {record}: '{first}' vs '{second}'")]
    MatesOutOfSync {
        record: usize,
        first: String,
        second: String,
    },

    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}{}", stderr_suffix(.stderr))]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("{tool} did not produce '{path}' (missing or empty)")]
    EmptyOutput { tool: String, path: PathBuf },

    #[error("'{0}' contains a comma, which ktImportText reads as a dataset separator")]
    CommaInDatasetPath(PathBuf),

    #[error(
        "no classification output found in '{0}': no input files were detected \
         (expected *_1.fastq.gz with *_2.fastq.gz mates, or *.fa / *.fasta assemblies)"
    )]
    NoClassificationOutput(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(":\n{}", stderr)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
