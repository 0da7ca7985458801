//! Per-file and per-record reports produced by a pipeline pass.
//!
//! Reports are plain values.  `Display` renders the console form; `Serialize`
//! backs `--json`.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::endian::{ByteOrder, Endianness};
use crate::framing::FramingKind;
use crate::header::Header;
use crate::stats::{SizeMismatch, TypeRange};
use crate::tags::{Tag, TagKind};

const SEPARATOR: &str = "--------------------------------------------";

/// Role the pipeline assigned to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Header,
    PerTypeMass,
    GasOnly,
    PassThrough,
    /// Untagged legacy block that is neither a tag nor a header.
    Opaque,
}

impl From<TagKind> for RecordKind {
    fn from(kind: TagKind) -> Self {
        match kind {
            TagKind::Header      => RecordKind::Header,
            TagKind::PerTypeMass => RecordKind::PerTypeMass,
            TagKind::GasOnly     => RecordKind::GasOnly,
            TagKind::PassThrough => RecordKind::PassThrough,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordReport {
    /// Stream offset of the record's first block.
    pub offset:        u64,
    /// Label of the tag block; `None` for untagged legacy blocks.
    pub tag:           Option<Tag>,
    /// Declared payload size of the data block.
    pub size:          u32,
    pub kind:          RecordKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header:        Option<Header>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ranges:        Vec<TypeRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_mismatch: Option<SizeMismatch>,
    /// Written to the output stream.
    pub forwarded:     bool,
}

impl RecordReport {
    pub(crate) fn new(offset: u64, tag: Option<Tag>, size: u32, kind: RecordKind) -> Self {
        Self {
            offset,
            tag,
            size,
            kind,
            header:        None,
            ranges:        Vec::new(),
            size_mismatch: None,
            forwarded:     false,
        }
    }
}

impl fmt::Display for RecordReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tag) = self.tag {
            writeln!(f, "{SEPARATOR}")?;
            writeln!(f, "{tag}")?;
        }
        write!(f, "SIZE: {}", self.size)?;
        if let Some(header) = &self.header {
            write!(f, "\n{header}")?;
        }
        for range in &self.ranges {
            write!(f, "\n{range}")?;
        }
        if let Some(mismatch) = &self.size_mismatch {
            write!(f, "\n{mismatch}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path:            Option<PathBuf>,
    pub framing:         FramingKind,
    pub order:           ByteOrder,
    pub file_endianness: Endianness,
    /// First header decoded in this file.
    pub header:          Option<Header>,
    pub records:         Vec<RecordReport>,
    /// Bytes written to the output stream; `None` when there was none.
    pub bytes_written:   Option<u64>,
}

impl FileReport {
    pub fn forwarded_count(&self) -> usize {
        self.records.iter().filter(|r| r.forwarded).count()
    }

    pub fn size_mismatches(&self) -> impl Iterator<Item = &RecordReport> {
        self.records.iter().filter(|r| r.size_mismatch.is_some())
    }
}

impl fmt::Display for FileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = &self.path {
            writeln!(f, "Snapshot: {}", path.display())?;
        }
        writeln!(f, "Your machine is {}", Endianness::host())?;
        writeln!(f, "The file is {}", self.file_endianness)?;
        if self.order.is_swapped() {
            writeln!(f, "Byte swapping required")?;
        }
        writeln!(f, "Framing: {}", self.framing)?;
        for record in &self.records {
            writeln!(f, "{record}")?;
            if self.bytes_written.is_some() && !record.forwarded {
                writeln!(f, "(dropped)")?;
            }
        }
        if let Some(written) = self.bytes_written {
            writeln!(f, "{SEPARATOR}")?;
            write!(f, "Wrote {} of {} records, {} bytes", self.forwarded_count(), self.records.len(), written)?;
        }
        Ok(())
    }
}

/// Reports for every part of a (possibly multi-file) snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub parts: Vec<FileReport>,
}

impl RunReport {
    pub fn total_bytes_written(&self) -> u64 {
        self.parts.iter().filter_map(|p| p.bytes_written).sum()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
                writeln!(f)?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}
