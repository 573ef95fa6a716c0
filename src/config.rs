use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use nom::branch::alt;
use nom::bytes::complete::{tag, take_till};
use nom::character::complete::{alpha1, alphanumeric1, char, space0, space1};
use nom::combinator::{all_consuming, opt, recognize, rest, value};
use nom::multi::many0_count;
use nom::sequence::{delimited, pair, terminated, tuple};
use nom::IResult;

use crate::error::{PipelineError, Result};

/// Name looked up in the working directory, the user config dir and next to the executable.
pub const CONFIG_FILE_NAME: &str = "krakenpipe.conf";

pub const DATABASE_KEY: &str = "KRAKEN2_DB";
pub const SCRIPTS_DIR_KEY: &str = "SCRIPTS_DIR";
pub const CLASSIFIER_KEY: &str = "KRAKEN2";
pub const AGGREGATOR_KEY: &str = "KTIMPORTTEXT";

pub const DEFAULT_CLASSIFIER: &str = "kraken2";
pub const DEFAULT_AGGREGATOR: &str = "ktImportText";

/// Helper that turns raw classifier output into lineage lines.
pub const TRANSLATE_SCRIPT: &str = "translate_kraken2";
/// Helper that turns lineage lines into ktImportText input (on stdout).
pub const KRONA_SCRIPT: &str = "kraken2_to_krona";

/// Settings read from the configuration file.
#[derive(Debug, Clone)]
pub struct Config {
    pub path: PathBuf,
    pub database: PathBuf,
    pub scripts_dir: PathBuf,
    pub classifier: String,
    pub aggregator: String,
}

impl Config {
    /// Finds and parses the configuration file, then checks the directories it names.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let path = locate(explicit)?;
        let config = Self::load(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(path, &text)
    }

    /// Parses shell-style `KEY=VALUE` text. Relative paths are taken relative to the file.
    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let settings = parse_assignments(path, text)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));

        let required = |key: &'static str| -> Result<PathBuf> {
            match settings.get(key) {
                Some(v) if !v.is_empty() => Ok(base.join(v)),
                _ => Err(PipelineError::ConfigMissingKey {
                    path: path.to_path_buf(),
                    key,
                }),
            }
        };
        let optional = |key: &str, default: &str| -> String {
            settings
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            path: path.to_path_buf(),
            database: required(DATABASE_KEY)?,
            scripts_dir: required(SCRIPTS_DIR_KEY)?,
            classifier: optional(CLASSIFIER_KEY, DEFAULT_CLASSIFIER),
            aggregator: optional(AGGREGATOR_KEY, DEFAULT_AGGREGATOR),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.scripts_dir.is_dir() {
            return Err(PipelineError::MissingScriptsDir(self.scripts_dir.clone()));
        }
        if !self.database.is_dir() {
            return Err(PipelineError::MissingDatabase(self.database.clone()));
        }
        Ok(())
    }

    pub fn translate_script(&self) -> PathBuf {
        self.scripts_dir.join(TRANSLATE_SCRIPT)
    }

    pub fn krona_script(&self) -> PathBuf {
        self.scripts_dir.join(KRONA_SCRIPT)
    }
}

/// Lookup order: explicit path, working directory, `$HOME/.config/krakenpipe`, executable dir.
pub fn locate(explicit: Option<&Path>) -> Result<PathBuf> {
    let candidates: Vec<PathBuf> = match explicit {
        Some(path) => vec![path.to_path_buf()],
        None => default_candidates(),
    };

    if let Some(found) = candidates.iter().find(|p| p.is_file()) {
        log::debug!("Using configuration {}", found.display());
        return Ok(found.clone());
    }

    let searched = candidates
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Err(PipelineError::ConfigNotFound(CONFIG_FILE_NAME.to_string(), searched))
}

fn default_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(home) = std::env::var_os("HOME") {
        candidates.push(
            PathBuf::from(home)
                .join(".config")
                .join("krakenpipe")
                .join(CONFIG_FILE_NAME),
        );
    }
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(dir.join(CONFIG_FILE_NAME));
    }
    candidates
}

fn parse_assignments(path: &Path, text: &str) -> Result<HashMap<String, String>> {
    let mut settings = HashMap::new();

    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match all_consuming(terminated(assignment, line_end))(line) {
            Ok((_, (key, val))) => {
                settings.insert(key.to_string(), val.trim().to_string());
            }
            Err(_) => {
                return Err(PipelineError::ConfigSyntax {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    content: trimmed.to_string(),
                })
            }
        }
    }

    Ok(settings)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn quoted(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('"'), take_till(|c: char| c == '"'), char('"')),
        delimited(char('\''), take_till(|c: char| c == '\''), char('\'')),
    ))(input)
}

fn bare(input: &str) -> IResult<&str, &str> {
    take_till(|c: char| c == '#' || c.is_whitespace())(input)
}

// [export ]KEY=VALUE
fn assignment(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, _) = tuple((space0, opt(pair(tag("export"), space1))))(input)?;
    let (input, key) = identifier(input)?;
    let (input, _) = char('=')(input)?;
    let (input, val) = alt((quoted, bare))(input)?;
    Ok((input, (key, val)))
}

fn line_end(input: &str) -> IResult<&str, ()> {
    value((), pair(space0, opt(pair(char('#'), rest))))(input)
}
