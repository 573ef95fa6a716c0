use std::path::{Path, PathBuf};

use crate::dispatch::{sample_of, KRONAGRAM_FILE, KRONA_EXT};
use crate::error::{PipelineError, Result};
use crate::runner::{non_empty, Invocation, ProcessRunner};

/// Builds per-sample Krona text files and merges them into one kronagram.
#[derive(Debug, Clone)]
pub struct KronaBuilder {
    /// Helper printing ktImportText input for one lineage file.
    pub script: PathBuf,
    /// ktImportText or a compatible tool.
    pub aggregator: String,
}

impl KronaBuilder {
    pub fn new(script: impl Into<PathBuf>, aggregator: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            aggregator: aggregator.into(),
        }
    }

    /// Writes the helper's stdout for `lineage` to the `.krona` sibling.
    pub fn summarize<P: ProcessRunner + ?Sized>(&self, lineage: &Path, runner: &P) -> Result<PathBuf> {
        let krona = lineage.with_extension(KRONA_EXT);
        let inv = Invocation::new(&self.script).arg(lineage).stdout_to(&krona);
        log::info!("Running {}", inv);
        runner.run_checked(&inv)?;

        if !non_empty(&krona) {
            return Err(PipelineError::EmptyOutput {
                tool: inv.tool_name(),
                path: krona,
            });
        }
        Ok(krona)
    }

    pub fn summarize_all<P: ProcessRunner + ?Sized>(
        &self,
        lineage_files: &[PathBuf],
        runner: &P,
    ) -> Result<Vec<PathBuf>> {
        lineage_files
            .iter()
            .map(|lineage| self.summarize(lineage, runner))
            .collect()
    }

    /// Each dataset is passed as `file,sample` so the chart labels it by sample.
    pub fn aggregate_invocation(&self, krona_files: &[PathBuf], report: &Path) -> Result<Invocation> {
        let datasets = krona_files
            .iter()
            .map(|f| dataset_arg(f))
            .collect::<Result<Vec<_>>>()?;
        Ok(Invocation::new(&self.aggregator)
            .args(datasets)
            .arg("-o")
            .arg(report))
    }

    /// Merges every summary into `<out_dir>/kronagram.html`.
    pub fn aggregate<P: ProcessRunner + ?Sized>(
        &self,
        krona_files: &[PathBuf],
        out_dir: &Path,
        runner: &P,
    ) -> Result<PathBuf> {
        let report = out_dir.join(KRONAGRAM_FILE);
        let inv = self.aggregate_invocation(krona_files, &report)?;
        log::info!("Running {}", inv);
        runner.run_checked(&inv)?;

        if !non_empty(&report) {
            return Err(PipelineError::EmptyOutput {
                tool: inv.tool_name(),
                path: report,
            });
        }
        Ok(report)
    }
}

/// `file,sample` argument for ktImportText. Commas in the path cannot be escaped.
pub fn dataset_arg(krona: &Path) -> Result<String> {
    let file = krona.display().to_string();
    if file.contains(',') {
        return Err(PipelineError::CommaInDatasetPath(krona.to_path_buf()));
    }
    Ok(format!("{},{}", file, sample_of(krona)))
}
