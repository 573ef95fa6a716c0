use std::path::{Path, PathBuf};

use rand::Rng;
use serde::Serialize;

use crate::dispatch::{InputUnit, SampleOutputs};
use crate::error::{PipelineError, Result};
use crate::runner::{non_empty, Invocation, ProcessRunner};
use crate::subsample::{subsample_pair, SubsampleDepth};

/// Whether the classifier loads the whole database up front or maps it on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryMode {
    Preload,
    MemoryMapped,
}

/// Classifier parameters shared by every input unit of a run.
#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub program: String,
    pub database: PathBuf,
    pub threads: usize,
    pub memory: MemoryMode,
    pub depth: SubsampleDepth,
    pub force: bool,
}

/// What happened to one input unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifyOutcome {
    /// A non-empty classification already existed.
    Skipped,
    Ran,
    /// Ran on a random draw of this many read pairs.
    Subsampled(usize),
}

impl ClassifierSettings {
    /// Builds the classifier command line for `inputs`, writing into `outputs`.
    pub fn invocation(&self, paired: bool, inputs: &[&Path], outputs: &SampleOutputs) -> Invocation {
        let mut inv = Invocation::new(&self.program)
            .arg("--db")
            .arg(&self.database)
            .arg("--threads")
            .arg(self.threads.to_string());
        if paired {
            inv = inv.arg("--paired");
        }
        if self.memory == MemoryMode::MemoryMapped {
            inv = inv.arg("--memory-mapping");
        }
        inv.arg("--report")
            .arg(&outputs.report)
            .arg("--output")
            .arg(&outputs.classification)
            .args(inputs.iter().copied())
    }

    /// Classifies one input unit unless its output is already there.
    ///
    /// The run fails if the classifier exits non-zero or leaves an empty output.
    /// Subsampled mate files are removed only after a successful run.
    pub fn classify<P, R>(
        &self,
        unit: &InputUnit,
        out_dir: &Path,
        runner: &P,
        rng: &mut R,
    ) -> Result<ClassifyOutcome>
    where
        P: ProcessRunner + ?Sized,
        R: Rng + ?Sized,
    {
        let outputs = SampleOutputs::new(out_dir, unit.sample());

        if !self.force && non_empty(&outputs.classification) {
            log::info!(
                "{}: {} already exists, skipping classification",
                unit.sample(),
                outputs.classification.display()
            );
            return Ok(ClassifyOutcome::Skipped);
        }

        match (unit, self.depth) {
            (InputUnit::Paired { sample, first, second }, SubsampleDepth::Pairs(depth)) => {
                let sub = subsample_pair(first, second, out_dir, sample, depth, rng)?;
                let inv = self.invocation(true, &[sub.first.as_path(), sub.second.as_path()], &outputs);
                self.run(&inv, runner, &outputs)?;
                sub.remove()?;
                Ok(ClassifyOutcome::Subsampled(sub.kept))
            }
            _ => {
                let inv = self.invocation(unit.is_paired(), &unit.files(), &outputs);
                self.run(&inv, runner, &outputs)?;
                Ok(ClassifyOutcome::Ran)
            }
        }
    }

    fn run<P: ProcessRunner + ?Sized>(
        &self,
        inv: &Invocation,
        runner: &P,
        outputs: &SampleOutputs,
    ) -> Result<()> {
        log::info!("Running {}", inv);
        runner.run_checked(inv)?;
        if !non_empty(&outputs.classification) {
            return Err(PipelineError::EmptyOutput {
                tool: inv.tool_name(),
                path: outputs.classification.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ExitReport;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::fs;

    /// Writes the `--output` file with `content` and records every call.
    struct FakeClassifier {
        content: &'static str,
        exit_code: i32,
        calls: RefCell<Vec<Invocation>>,
    }

    impl FakeClassifier {
        fn new(content: &'static str, exit_code: i32) -> Self {
            Self {
                content,
                exit_code,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl ProcessRunner for FakeClassifier {
        fn run(&self, invocation: &Invocation) -> Result<ExitReport> {
            self.calls.borrow_mut().push(invocation.clone());
            if let Some(out) = invocation.flag_value("--output") {
                fs::write(out, self.content)?;
            }
            if self.exit_code == 0 {
                Ok(ExitReport::ok())
            } else {
                Ok(ExitReport::failed(self.exit_code, "classifier failed"))
            }
        }
    }

    fn settings(memory: MemoryMode, depth: SubsampleDepth) -> ClassifierSettings {
        ClassifierSettings {
            program: "kraken2".to_string(),
            database: PathBuf::from("/db/standard"),
            threads: 8,
            memory,
            depth,
            force: false,
        }
    }

    fn assembly(dir: &Path) -> InputUnit {
        let path = dir.join("contigs.fa");
        fs::write(&path, ">c1\nACGT\n").unwrap();
        InputUnit::Assembly {
            sample: "contigs".to_string(),
            path,
        }
    }

    #[test]
    fn test_invocation_flags() {
        let outputs = SampleOutputs::new(Path::new("/out"), "gut");
        let paired = settings(MemoryMode::MemoryMapped, SubsampleDepth::All).invocation(
            true,
            &[Path::new("gut_1.fastq.gz"), Path::new("gut_2.fastq.gz")],
            &outputs,
        );
        assert_eq!(
            paired.to_string(),
            "kraken2 --db /db/standard --threads 8 --paired --memory-mapping \
             --report /out/gut.kreport --output /out/gut.krak2 gut_1.fastq.gz gut_2.fastq.gz"
        );

        let single = settings(MemoryMode::Preload, SubsampleDepth::All).invocation(
            false,
            &[Path::new("contigs.fa")],
            &outputs,
        );
        assert!(!single.has_arg("--paired"));
        assert!(!single.has_arg("--memory-mapping"));
    }

    #[test]
    fn test_classify_then_skip_on_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let unit = assembly(dir.path());
        let runner = FakeClassifier::new("C\tc1\t562\t4\t562:1\n", 0);
        let s = settings(MemoryMode::Preload, SubsampleDepth::All);
        let mut rng = StdRng::seed_from_u64(0);

        assert_eq!(s.classify(&unit, dir.path(), &runner, &mut rng).unwrap(), ClassifyOutcome::Ran);
        assert_eq!(s.classify(&unit, dir.path(), &runner, &mut rng).unwrap(), ClassifyOutcome::Skipped);
        assert_eq!(runner.calls.borrow().len(), 1);

        let forced = ClassifierSettings { force: true, ..s };
        assert_eq!(forced.classify(&unit, dir.path(), &runner, &mut rng).unwrap(), ClassifyOutcome::Ran);
        assert_eq!(runner.calls.borrow().len(), 2);
    }

    #[test]
    fn test_empty_output_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let unit = assembly(dir.path());
        let runner = FakeClassifier::new("", 0);
        let s = settings(MemoryMode::Preload, SubsampleDepth::All);

        let err = s
            .classify(&unit, dir.path(), &runner, &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyOutput { .. }));
    }

    #[test]
    fn test_nonzero_exit_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let unit = assembly(dir.path());
        let runner = FakeClassifier::new("C\tc1\t562\t4\t562:1\n", 1);
        let s = settings(MemoryMode::Preload, SubsampleDepth::All);

        let err = s
            .classify(&unit, dir.path(), &runner, &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, PipelineError::ToolFailed { .. }));
    }

    #[test]
    fn test_assemblies_ignore_subsampling() {
        let dir = tempfile::tempdir().unwrap();
        let unit = assembly(dir.path());
        let runner = FakeClassifier::new("C\tc1\t562\t4\t562:1\n", 0);
        let s = settings(MemoryMode::Preload, SubsampleDepth::Pairs(10));

        let outcome = s
            .classify(&unit, dir.path(), &runner, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(outcome, ClassifyOutcome::Ran);
        let calls = runner.calls.borrow();
        assert_eq!(calls[0].args.last().unwrap().as_os_str(), dir.path().join("contigs.fa").as_os_str());
    }
}
