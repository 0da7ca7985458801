//! Multi-part runner.
//!
//! A snapshot may be split across `num_files` files named with a trailing
//! counter (`snap_005.0`, `snap_005.1`, …).  [`run`] reads `num_files` from
//! the first part's header, plans every part's paths by incrementing that
//! counter, and then processes the parts in order.  Every part gets a fresh
//! pass: byte order and header are never carried over.
//!
//! Streams are opened through a [`StreamOpener`] and dropped at the end of
//! each part, on success or error alike.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::error::{Result, SnapshotError};
use crate::pipeline::SnapshotPipeline;
use crate::report::RunReport;

/// Source of input and output streams.
pub trait StreamOpener {
    type Input:  Read + Seek;
    type Output: Write;

    fn open_input(&mut self, path: &Path) -> io::Result<Self::Input>;
    fn create_output(&mut self, path: &Path) -> io::Result<Self::Output>;

    /// True when `a` and `b` name the same stream.
    fn same_stream(&self, a: &Path, b: &Path) -> bool {
        a == b
    }
}

/// Opens real files, buffered.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsOpener;

impl StreamOpener for FsOpener {
    type Input  = BufReader<File>;
    type Output = BufWriter<File>;

    fn open_input(&mut self, path: &Path) -> io::Result<Self::Input> {
        Ok(BufReader::new(File::open(path)?))
    }

    fn create_output(&mut self, path: &Path) -> io::Result<Self::Output> {
        Ok(BufWriter::new(File::create(path)?))
    }

    /// Compares canonical paths when both exist, so links and `./` prefixes
    /// are seen through.
    fn same_stream(&self, a: &Path, b: &Path) -> bool {
        match (a.canonicalize(), b.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _              => a == b,
        }
    }
}

/// Input and output path of one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartPaths {
    pub input:  PathBuf,
    pub output: Option<PathBuf>,
}

/// Path of the next part: the trailing decimal counter of the file name
/// incremented by one, zero-padding width preserved.  `None` when the name
/// does not end in a digit.
///
/// `snap_005.0` → `snap_005.1`, `snap.09` → `snap.10`, `snap.9` → `snap.10`.
pub fn next_part_path(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let stem_len = name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let digits = &name[stem_len..];
    if digits.is_empty() {
        return None;
    }
    let next = digits.parse::<u64>().ok()?.checked_add(1)?;
    let renamed = format!("{}{:0width$}", &name[..stem_len], next, width = digits.len());
    Some(path.with_file_name(renamed))
}

/// Output path for part `index` (1-based beyond the first) given the
/// previous part's output path.
fn next_output_path(prev: &Path, index: usize) -> PathBuf {
    next_part_path(prev).unwrap_or_else(|| {
        let mut name = prev.as_os_str().to_owned();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    })
}

/// Paths of up to `count` parts starting at `input`.  Stops early, with a
/// warning, when the input name has no trailing counter to advance.
pub fn part_paths(input: &Path, output: Option<&Path>, count: usize) -> Vec<PartPaths> {
    let mut parts = vec![PartPaths {
        input:  input.to_path_buf(),
        output: output.map(Path::to_path_buf),
    }];
    while parts.len() < count {
        let index = parts.len();
        let prev  = &parts[index - 1];
        let Some(next_input) = next_part_path(&prev.input) else {
            tracing::warn!(
                path = %input.display(),
                num_files = count,
                "snapshot is split across several files but the name has no trailing counter; stopping after the first"
            );
            break;
        };
        let next_output = prev.output.as_deref().map(|p| next_output_path(p, index));
        parts.push(PartPaths { input: next_input, output: next_output });
    }
    parts
}

/// Number of parts to process for a snapshot whose first part is `first`.
/// The stream position is left unchanged.
pub fn part_count<R: Read + Seek>(config: &PipelineConfig, first: &mut R) -> Result<usize> {
    if !config.follow_parts {
        return Ok(1);
    }
    let header = SnapshotPipeline::new(config).first_header(first)?;
    Ok(header.map_or(1, |h| h.file_count()))
}

/// Fail when any output path names one of the input parts.
pub fn check_outputs<O: StreamOpener + ?Sized>(opener: &O, parts: &[PartPaths]) -> Result<()> {
    for output in parts.iter().filter_map(|p| p.output.as_deref()) {
        if let Some(clash) = parts.iter().find(|p| opener.same_stream(output, &p.input)) {
            return Err(SnapshotError::OutputOverlapsInput {
                output: output.to_path_buf(),
                input:  clash.input.clone(),
            });
        }
    }
    Ok(())
}

/// Process `input` (and its sibling parts) with `config`, writing filtered
/// copies next to `output` when given.
///
/// All part paths are planned before any output is created; an output that
/// would overwrite an input part fails the run up front.
pub fn run<O: StreamOpener>(
    opener: &mut O,
    config: &PipelineConfig,
    input:  &Path,
    output: Option<&Path>,
) -> Result<RunReport> {
    let pipeline = SnapshotPipeline::new(config);
    let mut report = RunReport::default();

    let mut first = opener.open_input(input)?;
    let parts = part_paths(input, output, part_count(config, &mut first)?);
    check_outputs(&*opener, &parts)?;

    let mut first = Some(first);
    for (index, part) in parts.iter().enumerate() {
        tracing::info!(part = index, path = %part.input.display(), "processing snapshot part");

        let mut reader = match first.take() {
            Some(reader) => reader,
            None         => opener.open_input(&part.input)?,
        };
        let mut writer = match &part.output {
            Some(p) => Some(opener.create_output(p)?),
            None    => None,
        };

        let mut file = pipeline.process(&mut reader, writer.as_mut())?;
        if let Some(w) = writer.as_mut() {
            w.flush()?;
        }
        file.path = Some(part.input.clone());
        report.parts.push(file);
    }

    Ok(report)
}
