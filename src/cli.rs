use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use colored::*;

use crate::classify::MemoryMode;
use crate::config::Config;
use crate::error::Result;
use crate::logging::init_logger;
use crate::pipeline::{Pipeline, PipelineOptions, RunSummary};
use crate::runner::SystemRunner;
use crate::subsample::SubsampleDepth;

#[derive(Parser, Debug)]
#[command(
    name = "krakenpipe",
    version,
    arg_required_else_help = true,
    about = "Classify paired reads or assemblies with Kraken2 and build a Krona kronagram",
    after_help = "Inputs are recognised by name: <sample>_1.fastq.gz (with <sample>_2.fastq.gz \
                  next to it) for read pairs, <sample>.fa or <sample>.fasta for assemblies. \
                  Anything else is ignored."
)]
pub struct Cli {
    #[arg(short = 'o', long = "out", help_heading = "OUTPUT", help = "Output directory (created if missing).")]
    pub output_dir: PathBuf,

    #[arg(
        short = 't',
        long = "threads",
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..),
        help_heading = "KRAKEN2 OPTIONS",
        help = "Number of classifier threads."
    )]
    pub threads: u32,

    #[arg(
        short = 's',
        long = "subsample",
        default_value = "all",
        help_heading = "KRAKEN2 OPTIONS",
        help = "Classify a random draw of this many read pairs per sample, or 'all'."
    )]
    pub subsample: SubsampleDepth,

    #[arg(long = "no-preload", help_heading = "KRAKEN2 OPTIONS", help = "Memory-map the database instead of loading it into RAM.")]
    pub no_preload: bool,

    #[arg(long = "seed", help_heading = "KRAKEN2 OPTIONS", help = "Seed for reproducible subsampling.")]
    pub seed: Option<u64>,

    #[arg(long = "force", help_heading = "GENERAL OPTIONS", help = "Rerun the classifier even if its output already exists.")]
    pub force: bool,

    #[arg(short = 'c', long = "config", help_heading = "GENERAL OPTIONS", help = "Configuration file (default: krakenpipe.conf lookup).")]
    pub config: Option<PathBuf>,

    #[arg(long = "debug", help_heading = "GENERAL OPTIONS", help = "Debug output.")]
    pub debug: bool,

    #[arg(required = true, value_name = "INPUT", help = "Read files (*_1.fastq.gz) or assemblies (*.fa, *.fasta).")]
    pub inputs: Vec<PathBuf>,
}

impl Cli {
    pub fn options(&self) -> PipelineOptions {
        PipelineOptions {
            out_dir: self.output_dir.clone(),
            inputs: self.inputs.clone(),
            threads: self.threads as usize,
            depth: self.subsample,
            memory: if self.no_preload {
                MemoryMode::MemoryMapped
            } else {
                MemoryMode::Preload
            },
            force: self.force,
            seed: self.seed,
        }
    }
}

/// Parses the command line, runs the pipeline and maps the result to an exit code.
///
/// Help requests and malformed invocations both exit with status 1.
pub fn run_cli() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => return usage_exit(e),
    };

    init_logger(cli.debug);
    println!("krakenpipe - Kraken2 classification and Krona visualisation pipeline");

    match run(&cli) {
        Ok(summary) => {
            let skipped = summary.samples.len() - summary.classifier_runs();
            println!(
                "{} {} sample(s), {} classified in this run, {} reused",
                "Finished:".bold().green(),
                summary.samples.len(),
                summary.classifier_runs(),
                skipped
            );
            println!("Kronagram written to {}", summary.kronagram.display().to_string().cyan());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} {}", "ERROR:".bold().red(), e);
            ExitCode::FAILURE
        }
    }
}

pub fn run(cli: &Cli) -> Result<RunSummary> {
    let config = Config::resolve(cli.config.as_deref())?;
    log::info!("Configuration: {}", config.path.display());
    log::info!("Kraken2 database: {}", config.database.display());

    let options = cli.options();
    Pipeline::new(&config, &options, &SystemRunner).run()
}

fn usage_exit(e: clap::Error) -> ExitCode {
    match e.kind() {
        ErrorKind::DisplayVersion => {
            let _ = e.print();
            ExitCode::SUCCESS
        }
        ErrorKind::DisplayHelp | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
            let _ = e.print();
            ExitCode::FAILURE
        }
        _ => {
            let _ = e.print();
            eprintln!();
            let _ = Cli::command().print_help();
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_command_line() {
        let cli = Cli::try_parse_from([
            "krakenpipe", "-o", "out", "-t", "16", "-s", "250000", "--no-preload", "--seed", "9",
            "a_1.fastq.gz", "a_2.fastq.gz", "b.fasta",
        ])
        .unwrap();

        let options = cli.options();
        assert_eq!(options.out_dir, PathBuf::from("out"));
        assert_eq!(options.threads, 16);
        assert_eq!(options.depth, SubsampleDepth::Pairs(250000));
        assert_eq!(options.memory, MemoryMode::MemoryMapped);
        assert_eq!(options.seed, Some(9));
        assert_eq!(options.inputs.len(), 3);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["krakenpipe", "-o", "out", "x.fa"]).unwrap();
        assert_eq!(cli.threads, 1);
        assert_eq!(cli.subsample, SubsampleDepth::All);
        assert!(!cli.no_preload);
        assert!(!cli.force);
        assert_eq!(cli.options().memory, MemoryMode::Preload);
    }

    #[test]
    fn test_invalid_invocations() {
        let missing_out = Cli::try_parse_from(["krakenpipe", "x.fa"]).unwrap_err();
        assert_eq!(missing_out.kind(), ErrorKind::MissingRequiredArgument);

        let missing_inputs = Cli::try_parse_from(["krakenpipe", "-o", "out"]).unwrap_err();
        assert_eq!(missing_inputs.kind(), ErrorKind::MissingRequiredArgument);

        assert!(Cli::try_parse_from(["krakenpipe", "-o", "out", "-s", "some", "x.fa"]).is_err());
        assert!(Cli::try_parse_from(["krakenpipe", "-o", "out", "-t", "0", "x.fa"]).is_err());

        let help = Cli::try_parse_from(["krakenpipe", "--help"]).unwrap_err();
        assert_eq!(help.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_command_is_well_formed() {
        Cli::command().debug_assert();
    }
}
