//! Size-delimited block I/O.
//!
//! Every record in a snapshot is framed as
//!
//! ```text
//! u32 size | size bytes of payload | u32 size
//! ```
//!
//! with both size fields in the file's byte order.  Payload bytes are never
//! transformed here; only the delimiters pass through [`Swap::fix`].

use std::io::{self, Read, Seek, Write};

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};

use crate::endian::{ByteOrder, Swap, TAG_BLOCK_SIZE};
use crate::error::{Result, SnapshotError};
use crate::tags::Tag;

/// Bytes occupied by the two size delimiters around a payload.
pub const DELIMITER_OVERHEAD: u64 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub declared_size: u32,
    pub payload:       Vec<u8>,
    pub trailing_size: u32,
}

/// A payload length as a size delimiter.
fn size_field(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| SnapshotError::BlockTooLarge { len: len as u64 })
}

impl Block {
    /// Wrap `payload` with matching delimiters.  Fails with
    /// [`SnapshotError::BlockTooLarge`] past `u32::MAX` bytes.
    pub fn try_new(payload: Vec<u8>) -> Result<Self> {
        let size = size_field(payload.len())?;
        Ok(Self { declared_size: size, payload, trailing_size: size })
    }

    /// Like [`Block::try_new`] for payloads known to fit.
    ///
    /// # Panics
    /// If `payload` is larger than `u32::MAX` bytes.
    pub fn new(payload: Vec<u8>) -> Self {
        Self::try_new(payload).expect("block payload exceeds u32::MAX bytes")
    }

    /// Size of the block on disk, delimiters included.
    pub fn encoded_len(&self) -> u64 {
        self.payload.len() as u64 + DELIMITER_OVERHEAD
    }

    /// Tag label carried by an 8-byte tag block.  `None` for any other size.
    pub fn as_tag(&self) -> Option<Tag> {
        if self.declared_size != TAG_BLOCK_SIZE || self.payload.len() < 4 {
            return None;
        }
        let mut label = [0u8; 4];
        label.copy_from_slice(&self.payload[..4]);
        Some(Tag::from_bytes(label))
    }
}

/// Read one block.
///
/// Returns `Ok(None)` when the stream is exhausted exactly at a block
/// boundary.  Fails with [`SnapshotError::DelimiterMismatch`] when the two
/// size fields disagree and with [`SnapshotError::Truncated`] when the stream
/// ends mid-block.
pub fn read_block<R: Read + Seek + ?Sized>(reader: &mut R, order: ByteOrder) -> Result<Option<Block>> {
    let offset = reader.stream_position()?;

    let declared_size = match read_delimiter(reader, offset)? {
        Some(raw) => raw.fix(order),
        None      => return Ok(None),
    };

    // Pull through `take` so a garbage size cannot force a huge allocation
    // before the stream proves it has the bytes.
    let mut payload = Vec::new();
    Read::take(&mut *reader, u64::from(declared_size)).read_to_end(&mut payload)?;
    if payload.len() as u64 != u64::from(declared_size) {
        return Err(SnapshotError::Truncated {
            offset,
            expected:  u64::from(declared_size),
            available: payload.len() as u64,
        });
    }

    let trailing_size = match read_delimiter(reader, offset)? {
        Some(raw) => raw.fix(order),
        None => {
            return Err(SnapshotError::Truncated {
                offset,
                expected:  u64::from(declared_size) + DELIMITER_OVERHEAD,
                available: u64::from(declared_size) + 4,
            })
        }
    };

    if declared_size != trailing_size {
        return Err(SnapshotError::DelimiterMismatch {
            offset,
            leading:  declared_size,
            trailing: trailing_size,
        });
    }

    Ok(Some(Block { declared_size, payload, trailing_size }))
}

/// Write one block: delimiters in `order`, payload verbatim.
pub fn write_block<W: Write>(writer: &mut W, block: &Block, order: ByteOrder) -> io::Result<()> {
    writer.write_u32::<NativeEndian>(block.declared_size.fix(order))?;
    writer.write_all(&block.payload)?;
    writer.write_u32::<NativeEndian>(block.trailing_size.fix(order))?;
    Ok(())
}

/// Read a raw size field.  `None` on a clean end of stream; a partial field
/// is a truncation.
fn read_delimiter<R: Read + ?Sized>(reader: &mut R, block_offset: u64) -> Result<Option<u32>> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    match filled {
        0 => Ok(None),
        4 => Ok(Some(u32::from_ne_bytes(buf))),
        n => Err(SnapshotError::Truncated {
            offset:    block_offset,
            expected:  4,
            available: n as u64,
        }),
    }
}

// ── DataRecord ───────────────────────────────────────────────────────────────

/// A tag block paired with the data block it labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRecord {
    pub tag:  Block,
    pub data: Block,
}

impl DataRecord {
    /// Build a record the way format-2 writers lay it out: the tag block holds
    /// the 4-byte label followed by the size of the data block including its
    /// delimiters, in `order`.
    pub fn try_new(tag: Tag, payload: Vec<u8>, order: ByteOrder) -> Result<Self> {
        let data = Block::try_new(payload)?;
        let next = u32::try_from(data.encoded_len()).unwrap_or(u32::MAX).fix(order);
        let mut label = Vec::with_capacity(TAG_BLOCK_SIZE as usize);
        label.extend_from_slice(tag.as_bytes());
        label.extend_from_slice(&next.to_ne_bytes());
        Ok(Self { tag: Block::try_new(label)?, data })
    }

    /// Like [`DataRecord::try_new`] for payloads known to fit.
    ///
    /// # Panics
    /// If `payload` is larger than `u32::MAX` bytes.
    pub fn new(tag: Tag, payload: Vec<u8>, order: ByteOrder) -> Self {
        Self::try_new(tag, payload, order).expect("block payload exceeds u32::MAX bytes")
    }

    /// Label of the tag block.
    pub fn label(&self) -> Option<Tag> {
        self.tag.as_tag()
    }

    pub fn write<W: Write>(&self, writer: &mut W, order: ByteOrder) -> io::Result<()> {
        write_block(writer, &self.tag, order)?;
        write_block(writer, &self.data, order)
    }

    pub fn encoded_len(&self) -> u64 {
        self.tag.encoded_len() + self.data.encoded_len()
    }
}
