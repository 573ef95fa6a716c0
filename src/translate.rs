use std::path::{Path, PathBuf};

use crate::dispatch::LINEAGE_EXT;
use crate::error::{PipelineError, Result};
use crate::runner::{non_empty, Invocation, ProcessRunner};

/// Turns raw classifier output into taxonomic lineage lines via the helper script.
#[derive(Debug, Clone)]
pub struct Translator {
    pub script: PathBuf,
    pub database: PathBuf,
}

impl Translator {
    pub fn new(script: impl Into<PathBuf>, database: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            database: database.into(),
        }
    }

    pub fn invocation(&self, raw: &Path, lineage: &Path) -> Invocation {
        Invocation::new(&self.script)
            .arg(&self.database)
            .arg(raw)
            .arg(lineage)
    }

    /// Translates one `.krak2` file into its `.kraken2` sibling.
    pub fn translate<P: ProcessRunner + ?Sized>(&self, raw: &Path, runner: &P) -> Result<PathBuf> {
        let lineage = raw.with_extension(LINEAGE_EXT);
        let inv = self.invocation(raw, &lineage);
        log::info!("Running {}", inv);
        runner.run_checked(&inv)?;

        if !non_empty(&lineage) {
            return Err(PipelineError::EmptyOutput {
                tool: inv.tool_name(),
                path: lineage,
            });
        }
        Ok(lineage)
    }

    pub fn translate_all<P: ProcessRunner + ?Sized>(
        &self,
        raw_files: &[PathBuf],
        runner: &P,
    ) -> Result<Vec<PathBuf>> {
        raw_files.iter().map(|raw| self.translate(raw, runner)).collect()
    }
}
