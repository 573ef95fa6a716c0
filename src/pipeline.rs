use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use colored::*;
use memory_stats::memory_stats;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::classify::{ClassifierSettings, ClassifyOutcome, MemoryMode};
use crate::config::Config;
use crate::dispatch::{collect_outputs, dispatch, sample_of, SampleOutputs, CLASSIFICATION_EXT, LINEAGE_EXT};
use crate::error::{PipelineError, Result};
use crate::runner::ProcessRunner;
use crate::subsample::SubsampleDepth;
use crate::translate::Translator;
use crate::visualize::{dataset_arg, KronaBuilder};

pub const SUMMARY_FILE: &str = "run_summary.json";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Where a run currently is. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Dispatch,
    Classify,
    Translate,
    Visualize,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = match self {
            Stage::Init => "Initialising",
            Stage::Dispatch => "Detecting input files",
            Stage::Classify => "Classifying with Kraken2",
            Stage::Translate => "Translating classifications to lineages",
            Stage::Visualize => "Building Krona visualisation",
            Stage::Done => "Done",
            Stage::Failed => "Failed",
        };
        write!(f, "{}", title)
    }
}

/// Everything a run needs besides the configuration file.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub out_dir: PathBuf,
    pub inputs: Vec<PathBuf>,
    pub threads: usize,
    pub depth: SubsampleDepth,
    pub memory: MemoryMode,
    pub force: bool,
    pub seed: Option<u64>,
}

impl PipelineOptions {
    pub fn new(out_dir: impl Into<PathBuf>, inputs: Vec<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            inputs,
            threads: 1,
            depth: SubsampleDepth::All,
            memory: MemoryMode::Preload,
            force: false,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleSummary {
    pub sample: String,
    /// `None` when the classification came from an earlier run with other inputs.
    pub classification: Option<ClassifyOutcome>,
    pub report: PathBuf,
    pub raw: PathBuf,
    pub lineage: PathBuf,
    pub krona: PathBuf,
}

/// Written to `run_summary.json` at the end of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started: String,
    pub finished: String,
    pub config: PathBuf,
    pub database: PathBuf,
    pub out_dir: PathBuf,
    pub threads: usize,
    pub subsample: SubsampleDepth,
    pub memory_mode: MemoryMode,
    pub seed: Option<u64>,
    pub samples: Vec<SampleSummary>,
    pub kronagram: PathBuf,
    pub physical_mem_bytes: Option<usize>,
}

impl RunSummary {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn classifier_runs(&self) -> usize {
        self.samples
            .iter()
            .filter(|s| matches!(s.classification, Some(ClassifyOutcome::Ran) | Some(ClassifyOutcome::Subsampled(_))))
            .count()
    }
}

/// One run over a set of inputs: dispatch, classify, translate, visualise.
pub struct Pipeline<'a, P: ProcessRunner + ?Sized> {
    config: &'a Config,
    options: &'a PipelineOptions,
    runner: &'a P,
    stage: Stage,
}

impl<'a, P: ProcessRunner + ?Sized> Pipeline<'a, P> {
    pub fn new(config: &'a Config, options: &'a PipelineOptions, runner: &'a P) -> Self {
        Self {
            config,
            options,
            runner,
            stage: Stage::Init,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Runs every phase in order. The first error moves the run to `Failed` and is returned.
    pub fn run(&mut self) -> Result<RunSummary> {
        match self.execute() {
            Ok(summary) => {
                self.enter(Stage::Done);
                Ok(summary)
            }
            Err(e) => {
                log::debug!("Run failed during stage '{}'", self.stage);
                self.enter(Stage::Failed);
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> Result<RunSummary> {
        let started = Local::now();
        let options = self.options;
        let out_dir = &options.out_dir;
        fs::create_dir_all(out_dir)?;

        self.enter(Stage::Dispatch);
        let units = dispatch(&options.inputs)?;
        log::info!(
            "{} input unit(s): {} read pair(s), {} assembl(y/ies)",
            units.len(),
            units.iter().filter(|u| u.is_paired()).count(),
            units.iter().filter(|u| !u.is_paired()).count()
        );

        for unit in &units {
            dataset_arg(&SampleOutputs::new(out_dir, unit.sample()).krona)?;
        }

        self.enter(Stage::Classify);
        let settings = ClassifierSettings {
            program: self.config.classifier.clone(),
            database: self.config.database.clone(),
            threads: self.options.threads,
            memory: self.options.memory,
            depth: self.options.depth,
            force: self.options.force,
        };
        let mut rng = match self.options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut outcomes = Vec::with_capacity(units.len());
        for unit in &units {
            let outcome = settings.classify(unit, out_dir, self.runner, &mut rng)?;
            outcomes.push((unit.sample().to_string(), outcome));
        }

        let raw_files = collect_outputs(out_dir, CLASSIFICATION_EXT)?;
        if raw_files.is_empty() {
            return Err(PipelineError::NoClassificationOutput(out_dir.clone()));
        }

        self.enter(Stage::Translate);
        let translator = Translator::new(self.config.translate_script(), &self.config.database);
        translator.translate_all(&raw_files, self.runner)?;

        self.enter(Stage::Visualize);
        let lineage_files = collect_outputs(out_dir, LINEAGE_EXT)?;
        let builder = KronaBuilder::new(self.config.krona_script(), &self.config.aggregator);
        let krona_files = builder.summarize_all(&lineage_files, self.runner)?;
        let kronagram = builder.aggregate(&krona_files, out_dir, self.runner)?;

        let samples = raw_files
            .iter()
            .map(|raw| {
                let sample = sample_of(raw);
                let outputs = SampleOutputs::new(out_dir, &sample);
                let classification = outcomes
                    .iter()
                    .rev()
                    .find(|(name, _)| *name == sample)
                    .map(|(_, outcome)| *outcome);
                SampleSummary {
                    sample,
                    classification,
                    report: outputs.report,
                    raw: outputs.classification,
                    lineage: outputs.lineage,
                    krona: outputs.krona,
                }
            })
            .collect();

        let summary = RunSummary {
            started: started.to_rfc3339(),
            finished: Local::now().to_rfc3339(),
            config: self.config.path.clone(),
            database: self.config.database.clone(),
            out_dir: out_dir.clone(),
            threads: self.options.threads,
            subsample: self.options.depth,
            memory_mode: self.options.memory,
            seed: self.options.seed,
            samples,
            kronagram,
            physical_mem_bytes: memory_stats().map(|usage| usage.physical_mem),
        };
        summary.write_json(&out_dir.join(SUMMARY_FILE))?;

        Ok(summary)
    }

    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        announce(stage);
    }
}

/// Prints a timestamped phase banner.
pub fn announce(stage: Stage) {
    let stamp = format!("[{}]", Local::now().format(TIMESTAMP_FORMAT));
    let banner = format!("==== {} ====", stage);
    let banner = match stage {
        Stage::Done => banner.bold().green(),
        Stage::Failed => banner.bold().red(),
        _ => banner.bold().cyan(),
    };
    println!("{} {}", stamp.dimmed(), banner);
}
