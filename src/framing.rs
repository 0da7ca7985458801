//! Framing strategies: how blocks group into records.
//!
//! Two conventions share the same block codec:
//!
//! - **Tagged** (format 2): every data block is preceded by an 8-byte tag
//!   block.  Records are always tag + data pairs.
//! - **Legacy**: a single stream of blocks.  An 8-byte block is taken as a
//!   tag and pulls the next block in as its data; any other block stands
//!   alone and is identified by size (256 bytes = header) or not at all.
//!
//! [`framing_for`] hands out the strategy for a [`FramingKind`], probing the
//! stream when the kind is [`FramingKind::Auto`].

use std::fmt;
use std::io::{self, Read, Seek};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::block::{read_block, Block, DataRecord};
use crate::endian::{peek_first_size, ByteOrder, TAG_BLOCK_SIZE};
use crate::error::Result;
use crate::header::HEADER_SIZE;

/// Object-safe view of a seekable input stream.
pub trait SnapshotRead: Read + Seek {}
impl<T: Read + Seek + ?Sized> SnapshotRead for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FramingKind {
    /// Decide from the first block size.
    #[default]
    Auto,
    Tagged,
    Legacy,
}

impl FramingKind {
    pub fn name(self) -> &'static str {
        match self {
            FramingKind::Auto   => "auto",
            FramingKind::Tagged => "tagged",
            FramingKind::Legacy => "legacy",
        }
    }

    /// Resolve [`FramingKind::Auto`] from the first raw size field: 8 in
    /// either byte order is tagged, 256 in either byte order is legacy,
    /// anything else defaults to tagged.  Other kinds are returned as is.
    pub fn resolve<R: Read + Seek + ?Sized>(self, stream: &mut R) -> io::Result<FramingKind> {
        if self != FramingKind::Auto {
            return Ok(self);
        }
        let header = HEADER_SIZE as u32;
        Ok(match peek_first_size(stream)? {
            Some(raw) if raw == header || raw.swap_bytes() == header => FramingKind::Legacy,
            _ => FramingKind::Tagged,
        })
    }
}

impl fmt::Display for FramingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One unit handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A tag block and the data block it labels.
    Record(DataRecord),
    /// A block with no preceding tag (legacy framing only).
    Bare(Block),
}

pub trait FramingStrategy {
    fn kind(&self) -> FramingKind;

    /// First-block sizes that identify a file in host byte order.
    fn probe_sizes(&self) -> &'static [u32];

    /// Next frame, or `None` at end of stream.
    fn next_frame(&self, reader: &mut dyn SnapshotRead, order: ByteOrder) -> Result<Option<Frame>>;
}

pub struct TaggedFraming;

impl FramingStrategy for TaggedFraming {
    fn kind(&self) -> FramingKind { FramingKind::Tagged }

    fn probe_sizes(&self) -> &'static [u32] { &[TAG_BLOCK_SIZE] }

    fn next_frame(&self, reader: &mut dyn SnapshotRead, order: ByteOrder) -> Result<Option<Frame>> {
        let Some(tag) = read_block(reader, order)? else {
            return Ok(None);
        };
        let Some(data) = read_block(reader, order)? else {
            tracing::warn!(tag = ?tag.as_tag().map(|t| t.to_string()), "tag block at end of stream has no data block");
            return Ok(None);
        };
        Ok(Some(Frame::Record(DataRecord { tag, data })))
    }
}

pub struct LegacyFraming;

impl FramingStrategy for LegacyFraming {
    fn kind(&self) -> FramingKind { FramingKind::Legacy }

    fn probe_sizes(&self) -> &'static [u32] { &[TAG_BLOCK_SIZE, HEADER_SIZE as u32] }

    fn next_frame(&self, reader: &mut dyn SnapshotRead, order: ByteOrder) -> Result<Option<Frame>> {
        let Some(block) = read_block(reader, order)? else {
            return Ok(None);
        };
        if block.declared_size != TAG_BLOCK_SIZE {
            return Ok(Some(Frame::Bare(block)));
        }
        let Some(data) = read_block(reader, order)? else {
            tracing::warn!(tag = ?block.as_tag().map(|t| t.to_string()), "tag block at end of stream has no data block");
            return Ok(None);
        };
        Ok(Some(Frame::Record(DataRecord { tag: block, data })))
    }
}

/// Strategy for `kind`, resolving [`FramingKind::Auto`] against `stream`.
pub fn framing_for<R: Read + Seek + ?Sized>(
    kind:   FramingKind,
    stream: &mut R,
) -> io::Result<Box<dyn FramingStrategy>> {
    Ok(match kind.resolve(stream)? {
        FramingKind::Legacy => Box::new(LegacyFraming),
        FramingKind::Tagged | FramingKind::Auto => Box::new(TaggedFraming),
    })
}
