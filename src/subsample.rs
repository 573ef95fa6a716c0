use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use bio::io::fastq;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rand::seq::{IteratorRandom, SliceRandom};
use rand::Rng;
use serde::Serialize;

use crate::error::{PipelineError, Result};

/// How many read pairs to classify: everything, or a random draw of a fixed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubsampleDepth {
    #[default]
    All,
    Pairs(usize),
}

impl FromStr for SubsampleDepth {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(SubsampleDepth::All);
        }
        match s.parse::<usize>() {
            Ok(0) | Err(_) => Err(format!("'{}' is not a positive read count or 'all'", s)),
            Ok(n) => Ok(SubsampleDepth::Pairs(n)),
        }
    }
}

impl fmt::Display for SubsampleDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubsampleDepth::All => write!(f, "all"),
            SubsampleDepth::Pairs(n) => write!(f, "{}", n),
        }
    }
}

type FastqRecords = fastq::Records<BufReader<Box<dyn Read>>>;

/// Read id without a trailing `/1` or `/2` mate tag.
pub fn base_id(record: &fastq::Record) -> &str {
    let id = record.id();
    id.strip_suffix("/1")
        .or_else(|| id.strip_suffix("/2"))
        .unwrap_or(id)
}

#[derive(Debug, Clone)]
pub struct ReadPair {
    pub first: fastq::Record,
    pub second: fastq::Record,
}

/// Streams both mate files side by side.
///
/// Yields an error and stops when a record is malformed, when the read ids
/// disagree, or when one file ends before the other.
pub struct MatePairs {
    first_path: PathBuf,
    second_path: PathBuf,
    first: FastqRecords,
    second: FastqRecords,
    read: usize,
    done: bool,
}

impl MatePairs {
    pub fn open(first: &Path, second: &Path) -> Result<Self> {
        Ok(Self {
            first_path: first.to_path_buf(),
            second_path: second.to_path_buf(),
            first: fastq_records(first)?,
            second: fastq_records(second)?,
            read: 0,
            done: false,
        })
    }

    fn pair(
        &self,
        first: std::result::Result<fastq::Record, fastq::Error>,
        second: std::result::Result<fastq::Record, fastq::Error>,
    ) -> Result<ReadPair> {
        let record = self.read + 1;
        let first = checked(&self.first_path, record, first)?;
        let second = checked(&self.second_path, record, second)?;
        if base_id(&first) != base_id(&second) {
            return Err(PipelineError::MatesOutOfSync {
                record,
                first: base_id(&first).to_string(),
                second: base_id(&second).to_string(),
            });
        }
        Ok(ReadPair { first, second })
    }
}

impl Iterator for MatePairs {
    type Item = Result<ReadPair>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = match (self.first.next(), self.second.next()) {
            (None, None) => {
                self.done = true;
                return None;
            }
            (Some(a), Some(b)) => self.pair(a, b),
            (a, _) => Err(PipelineError::MatesOutOfSync {
                record: self.read + 1,
                first: end_marker(a.is_none()),
                second: end_marker(a.is_some()),
            }),
        };
        self.read += 1;
        self.done = item.is_err();
        Some(item)
    }
}

fn end_marker(ended: bool) -> String {
    if ended { "end of file" } else { "more records" }.to_string()
}

/// The two temporary mate files written for one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Subsampled {
    pub first: PathBuf,
    pub second: PathBuf,
    pub kept: usize,
    pub available: usize,
}

impl Subsampled {
    pub fn remove(&self) -> Result<()> {
        for path in [&self.first, &self.second] {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

/// Names end in `.fq.gz` so they never pass for `_1.fastq.gz` inputs.
pub fn temp_paths(out_dir: &Path, sample: &str) -> (PathBuf, PathBuf) {
    (
        out_dir.join(format!("{}.sub.1.fq.gz", sample)),
        out_dir.join(format!("{}.sub.2.fq.gz", sample)),
    )
}

/// Draws `depth` random pairs from the mate files and writes them next to the sample outputs.
pub fn subsample_pair<R: Rng + ?Sized>(
    first: &Path,
    second: &Path,
    out_dir: &Path,
    sample: &str,
    depth: usize,
    rng: &mut R,
) -> Result<Subsampled> {
    let (drawn, available) = draw_pairs(MatePairs::open(first, second)?, depth, rng)?;

    if available < depth {
        log::warn!(
            "{}: only {} read pairs available, fewer than the requested {}",
            sample,
            available,
            depth
        );
    }

    let (first_out, second_out) = temp_paths(out_dir, sample);
    write_records(&first_out, drawn.iter().map(|p| &p.first))?;
    write_records(&second_out, drawn.iter().map(|p| &p.second))?;
    log::info!("{}: subsampled {} of {} read pairs", sample, drawn.len(), available);

    Ok(Subsampled {
        first: first_out,
        second: second_out,
        kept: drawn.len(),
        available,
    })
}

/// Uniform draw of up to `depth` pairs in a single pass, holding at most `depth` pairs.
///
/// Returns the kept pairs in random order and the number of pairs seen.
/// The first error from `pairs` ends the draw.
pub fn draw_pairs<I, R>(pairs: I, depth: usize, rng: &mut R) -> Result<(Vec<ReadPair>, usize)>
where
    I: IntoIterator<Item = Result<ReadPair>>,
    R: Rng + ?Sized,
{
    let mut available = 0;
    let mut failure = None;
    let mut drawn = pairs
        .into_iter()
        .map_while(|item| match item {
            Ok(pair) => {
                available += 1;
                Some(pair)
            }
            Err(e) => {
                failure = Some(e);
                None
            }
        })
        .choose_multiple(&mut *rng, depth);

    if let Some(e) = failure {
        return Err(e);
    }
    drawn.shuffle(&mut *rng);
    Ok((drawn, available))
}

fn fastq_records(path: &Path) -> Result<FastqRecords> {
    let file = File::open(path)?;
    let is_gz = path.extension().map(|ext| ext == "gz").unwrap_or(false);
    let reader: Box<dyn Read> = if is_gz {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(fastq::Reader::new(reader).records())
}

fn checked(
    path: &Path,
    record: usize,
    parsed: std::result::Result<fastq::Record, fastq::Error>,
) -> Result<fastq::Record> {
    let malformed = |reason: String| PipelineError::MalformedFastq {
        path: path.to_path_buf(),
        reason: format!("record {}: {}", record, reason),
    };
    let parsed = parsed.map_err(|e| malformed(e.to_string()))?;
    parsed.check().map_err(|reason| malformed(reason.to_string()))?;
    Ok(parsed)
}

/// Reads every record of a FASTQ file, gzip or plain. Any malformed record fails the read.
pub fn read_records(path: &Path) -> Result<Vec<fastq::Record>> {
    fastq_records(path)?
        .enumerate()
        .map(|(i, parsed)| checked(path, i + 1, parsed))
        .collect()
}

/// Writes records as a gzip FASTQ file.
pub fn write_records<'a, I>(path: &Path, records: I) -> Result<()>
where
    I: IntoIterator<Item = &'a fastq::Record>,
{
    let file = File::create(path)?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    {
        let mut writer = fastq::Writer::new(&mut encoder);
        for record in records {
            writer.write_record(record)?;
        }
        writer.flush()?;
    }
    encoder.finish()?.flush()?;
    Ok(())
}
