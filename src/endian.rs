//! Byte-order state and value transforms.
//!
//! A snapshot file is uniform in byte order.  The order is probed once from
//! the first size delimiter and then threaded explicitly through every read
//! and write as a [`ByteOrder`] value.  There is no process-wide flag: each
//! file (or part of a multi-file snapshot) carries its own.
//!
//! Values are always read from disk in host order first and then passed
//! through [`Swap::fix`], which reverses the bytes when the file was written
//! on a machine of the opposite endianness.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{NativeEndian, ReadBytesExt};
use serde::Serialize;

/// Byte length of a tag block payload.  A tag-delimited file always opens
/// with one, which is what the probe keys on.
pub const TAG_BLOCK_SIZE: u32 = 8;

// ── ByteOrder ────────────────────────────────────────────────────────────────

/// Relationship between a file's byte order and the host's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// File matches the host; values are used as read.
    Native,
    /// File was written on an opposite-endian machine; every multi-byte
    /// value is byte-reversed after reading and before writing.
    Swapped,
}

impl ByteOrder {
    #[inline]
    pub fn is_swapped(self) -> bool {
        self == ByteOrder::Swapped
    }

    /// The absolute endianness of a file read with this order on this host.
    pub fn file_endianness(self) -> Endianness {
        match self {
            ByteOrder::Native  => Endianness::host(),
            ByteOrder::Swapped => Endianness::host().opposite(),
        }
    }
}

/// Absolute endianness, used for reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub fn host() -> Self {
        if cfg!(target_endian = "little") { Endianness::Little } else { Endianness::Big }
    }

    pub fn opposite(self) -> Self {
        match self {
            Endianness::Little => Endianness::Big,
            Endianness::Big    => Endianness::Little,
        }
    }
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endianness::Little => f.write_str("Little-Endian"),
            Endianness::Big    => f.write_str("Big-Endian"),
        }
    }
}

// ── Swap ─────────────────────────────────────────────────────────────────────

/// Byte reversal for fixed-width scalars.
///
/// Floats are reversed through their bit pattern, never numerically, so
/// NaN payloads and signed zeros survive a double swap unchanged.
pub trait Swap: Copy {
    fn swapped(self) -> Self;

    /// Returns `self` unchanged for [`ByteOrder::Native`], byte-reversed for
    /// [`ByteOrder::Swapped`].
    #[inline]
    fn fix(self, order: ByteOrder) -> Self {
        match order {
            ByteOrder::Native  => self,
            ByteOrder::Swapped => self.swapped(),
        }
    }
}

macro_rules! impl_swap_int {
    ($($t:ty),*) => {
        $(impl Swap for $t {
            #[inline]
            fn swapped(self) -> Self { self.swap_bytes() }
        })*
    };
}

impl_swap_int!(u16, i16, u32, i32, u64, i64);

impl Swap for f32 {
    #[inline]
    fn swapped(self) -> Self { f32::from_bits(self.to_bits().swap_bytes()) }
}

impl Swap for f64 {
    #[inline]
    fn swapped(self) -> Self { f64::from_bits(self.to_bits().swap_bytes()) }
}

// ── Probe ────────────────────────────────────────────────────────────────────

/// Determine the file's byte order from its first size delimiter.
///
/// Native iff the first raw `u32` equals [`TAG_BLOCK_SIZE`]; otherwise the
/// opposite order is assumed.  The stream position is restored afterward.
pub fn detect_order<R: Read + Seek + ?Sized>(stream: &mut R) -> io::Result<ByteOrder> {
    detect_order_for(stream, &[TAG_BLOCK_SIZE])
}

/// Like [`detect_order`] but accepts any of `expected` as a valid first block
/// size.  A size that only matches after byte reversal selects
/// [`ByteOrder::Swapped`]; a size matching neither way also falls back to
/// `Swapped`.
pub fn detect_order_for<R: Read + Seek + ?Sized>(stream: &mut R, expected: &[u32]) -> io::Result<ByteOrder> {
    let first = peek_first_size(stream)?;
    let order = match first {
        Some(raw) if expected.contains(&raw) => ByteOrder::Native,
        _                                    => ByteOrder::Swapped,
    };
    tracing::debug!(?first, ?order, "probed byte order");
    Ok(order)
}

/// Read the first raw size field without byte-order correction, leaving the
/// stream where it was.  `None` for a stream shorter than four bytes.
pub fn peek_first_size<R: Read + Seek + ?Sized>(stream: &mut R) -> io::Result<Option<u32>> {
    let pos = stream.stream_position()?;
    stream.seek(SeekFrom::Start(0))?;
    let first = match stream.read_u32::<NativeEndian>() {
        Ok(v) => Some(v),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => None,
        Err(e) => {
            stream.seek(SeekFrom::Start(pos))?;
            return Err(e);
        }
    };
    stream.seek(SeekFrom::Start(pos))?;
    Ok(first)
}
