//! The 256-byte snapshot header.
//!
//! Layout (offsets in bytes, every field in the file's byte order):
//!
//! | offset | field           | type     |
//! |--------|-----------------|----------|
//! | 0      | `npart`         | 6 × i32  |
//! | 24     | `mass`          | 6 × f64  |
//! | 72     | `time`          | f64      |
//! | 80     | `redshift`      | f64      |
//! | 88     | `flag_sfr`      | i32      |
//! | 92     | `flag_feedback` | i32      |
//! | 96     | `npart_total`   | 6 × i32  |
//! | 120    | `flag_cooling`  | i32      |
//! | 124    | `num_files`     | i32      |
//! | 128    | `box_size`      | f64      |
//! | 136    | `omega0`        | f64      |
//! | 144    | `omega_lambda`  | f64      |
//! | 152    | `hubble_param`  | f64      |
//! | 160    | fill            | 96 bytes |
//!
//! Decoding is field-by-field from explicit offsets; host struct layout never
//! enters into it.

use std::fmt;
use std::io::{self, Cursor, Read, Write};

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;

use crate::endian::{ByteOrder, Swap};

/// Payload size of a header block.
pub const HEADER_SIZE: usize = 256;
/// Number of particle types.
pub const NTYPES: usize = 6;

/// Display names for the six particle types, in index order.
pub const TYPE_NAMES: [&str; NTYPES] = ["Gas", "Halo", "Disk", "Bulge", "Stars", "Bndry"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Header {
    pub npart:         [i32; NTYPES],
    /// Fixed per-type particle mass; zero means masses are stored
    /// individually in the MASS block.
    pub mass:          [f64; NTYPES],
    pub time:          f64,
    pub redshift:      f64,
    pub flag_sfr:      i32,
    pub flag_feedback: i32,
    pub npart_total:   [i32; NTYPES],
    pub flag_cooling:  i32,
    /// Number of files the snapshot is split across.
    pub num_files:     i32,
    pub box_size:      f64,
    pub omega0:        f64,
    pub omega_lambda:  f64,
    pub hubble_param:  f64,
}

impl Header {
    /// Decode a header payload.  Any 256-byte buffer decodes; values are not
    /// validated.
    pub fn decode(payload: &[u8; HEADER_SIZE], order: ByteOrder) -> Self {
        // Reads from a fixed-size in-memory buffer covering every field
        // cannot fail.
        Self::read_fields(&mut Cursor::new(&payload[..]), order)
            .unwrap_or_else(|_| unreachable!("header fields fit in {HEADER_SIZE} bytes"))
    }

    /// Decode from a block payload of unchecked length.  `None` unless the
    /// payload is exactly [`HEADER_SIZE`] bytes.
    pub fn from_payload(payload: &[u8], order: ByteOrder) -> Option<Self> {
        let fixed: &[u8; HEADER_SIZE] = payload.try_into().ok()?;
        Some(Self::decode(fixed, order))
    }

    fn read_fields<R: Read>(r: &mut R, order: ByteOrder) -> io::Result<Self> {
        let mut h = Header::default();
        for n in &mut h.npart {
            *n = r.read_i32::<NativeEndian>()?.fix(order);
        }
        for m in &mut h.mass {
            *m = r.read_f64::<NativeEndian>()?.fix(order);
        }
        h.time          = r.read_f64::<NativeEndian>()?.fix(order);
        h.redshift      = r.read_f64::<NativeEndian>()?.fix(order);
        h.flag_sfr      = r.read_i32::<NativeEndian>()?.fix(order);
        h.flag_feedback = r.read_i32::<NativeEndian>()?.fix(order);
        for n in &mut h.npart_total {
            *n = r.read_i32::<NativeEndian>()?.fix(order);
        }
        h.flag_cooling  = r.read_i32::<NativeEndian>()?.fix(order);
        h.num_files     = r.read_i32::<NativeEndian>()?.fix(order);
        h.box_size      = r.read_f64::<NativeEndian>()?.fix(order);
        h.omega0        = r.read_f64::<NativeEndian>()?.fix(order);
        h.omega_lambda  = r.read_f64::<NativeEndian>()?.fix(order);
        h.hubble_param  = r.read_f64::<NativeEndian>()?.fix(order);
        Ok(h)
    }

    /// Encode to a 256-byte payload in `order`; the fill is zeroed.
    pub fn encode(&self, order: ByteOrder) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let mut w = &mut out[..];
        self.write_fields(&mut w, order)
            .unwrap_or_else(|_| unreachable!("header fields fit in {HEADER_SIZE} bytes"));
        out
    }

    fn write_fields<W: Write>(&self, w: &mut W, order: ByteOrder) -> io::Result<()> {
        for n in self.npart {
            w.write_i32::<NativeEndian>(n.fix(order))?;
        }
        for m in self.mass {
            w.write_f64::<NativeEndian>(m.fix(order))?;
        }
        w.write_f64::<NativeEndian>(self.time.fix(order))?;
        w.write_f64::<NativeEndian>(self.redshift.fix(order))?;
        w.write_i32::<NativeEndian>(self.flag_sfr.fix(order))?;
        w.write_i32::<NativeEndian>(self.flag_feedback.fix(order))?;
        for n in self.npart_total {
            w.write_i32::<NativeEndian>(n.fix(order))?;
        }
        w.write_i32::<NativeEndian>(self.flag_cooling.fix(order))?;
        w.write_i32::<NativeEndian>(self.num_files.fix(order))?;
        w.write_f64::<NativeEndian>(self.box_size.fix(order))?;
        w.write_f64::<NativeEndian>(self.omega0.fix(order))?;
        w.write_f64::<NativeEndian>(self.omega_lambda.fix(order))?;
        w.write_f64::<NativeEndian>(self.hubble_param.fix(order))?;
        Ok(())
    }

    /// Particle count of type `ptype` in this file, negative counts read as 0.
    pub fn count(&self, ptype: usize) -> usize {
        usize::try_from(self.npart[ptype]).unwrap_or(0)
    }

    /// True when type `ptype` has particles whose masses live in the MASS
    /// block rather than in the header.
    pub fn has_mass_block_entries(&self, ptype: usize) -> bool {
        self.npart[ptype] != 0 && self.mass[ptype] == 0.0
    }

    /// Number of files the snapshot is split across, at least 1.
    pub fn file_count(&self) -> usize {
        usize::try_from(self.num_files).unwrap_or(0).max(1)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "********************************************")?;
        for (i, name) in TYPE_NAMES.iter().enumerate() {
            writeln!(f, "{:<5} | #: {:>10}\t| Mass: {:.6}", name, self.npart[i], self.mass[i])?;
        }
        writeln!(f, "Time: {:.6}", self.time)?;
        writeln!(f, "Redshift: {:.6}", self.redshift)?;
        writeln!(f, "FlagSfr: {}", self.flag_sfr)?;
        writeln!(f, "FlagFeedback: {}", self.flag_feedback)?;
        writeln!(f, "FlagCooling: {}", self.flag_cooling)?;
        writeln!(f, "NumFiles: {}", self.num_files)?;
        writeln!(f, "BoxSize: {:.6}", self.box_size)?;
        writeln!(f, "Omega0: {:.6}", self.omega0)?;
        writeln!(f, "OmegaLambda: {:.6}", self.omega_lambda)?;
        writeln!(f, "HubbleParam: {:.6}", self.hubble_param)?;
        write!(f, "********************************************")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS_SIZE: usize = 160;

    fn sample() -> Header {
        Header {
            npart:         [100, 200, 0, 0, 5, 0],
            mass:          [0.0, 3.5e-3, 0.0, 0.0, 0.0, 0.0],
            time:          0.25,
            redshift:      3.0,
            flag_sfr:      1,
            flag_feedback: 1,
            npart_total:   [100, 200, 0, 0, 5, 0],
            flag_cooling:  1,
            num_files:     1,
            box_size:      50_000.0,
            omega0:        0.3,
            omega_lambda:  0.7,
            hubble_param:  0.7,
        }
    }

    #[test]
    fn field_offsets() {
        let h = sample();
        let bytes = h.encode(ByteOrder::Native);
        assert_eq!(i32::from_ne_bytes(bytes[0..4].try_into().unwrap()), 100);
        assert_eq!(f64::from_ne_bytes(bytes[32..40].try_into().unwrap()), 3.5e-3);
        assert_eq!(f64::from_ne_bytes(bytes[72..80].try_into().unwrap()), 0.25);
        assert_eq!(i32::from_ne_bytes(bytes[88..92].try_into().unwrap()), 1);
        assert_eq!(i32::from_ne_bytes(bytes[112..116].try_into().unwrap()), 5);
        assert_eq!(i32::from_ne_bytes(bytes[124..128].try_into().unwrap()), 1);
        assert_eq!(f64::from_ne_bytes(bytes[128..136].try_into().unwrap()), 50_000.0);
        assert_eq!(f64::from_ne_bytes(bytes[152..160].try_into().unwrap()), 0.7);
        assert!(bytes[FIELDS_SIZE..].iter().all(|&b| b == 0));
    }

    #[test]
    fn decode_matches_encode_in_both_orders() {
        let h = sample();
        for order in [ByteOrder::Native, ByteOrder::Swapped] {
            assert_eq!(Header::decode(&h.encode(order), order), h);
        }
    }

    #[test]
    fn swapped_bytes_differ_per_field() {
        let h = sample();
        let native = h.encode(ByteOrder::Native);
        let swapped = h.encode(ByteOrder::Swapped);
        let mut first = native[0..4].to_vec();
        first.reverse();
        assert_eq!(&swapped[0..4], &first[..]);
        let mut time = native[72..80].to_vec();
        time.reverse();
        assert_eq!(&swapped[72..80], &time[..]);
    }

    #[test]
    fn from_payload_requires_exact_size() {
        assert!(Header::from_payload(&[0u8; 255], ByteOrder::Native).is_none());
        assert!(Header::from_payload(&[0u8; 257], ByteOrder::Native).is_none());
        assert_eq!(Header::from_payload(&[0u8; 256], ByteOrder::Native), Some(Header::default()));
    }

    #[test]
    fn mass_block_membership() {
        let h = sample();
        assert!(h.has_mass_block_entries(0));
        assert!(!h.has_mass_block_entries(1), "fixed header mass");
        assert!(!h.has_mass_block_entries(2), "no particles");
        assert!(h.has_mass_block_entries(4));
    }

    #[test]
    fn display_lists_types() {
        let text = sample().to_string();
        assert!(text.contains("Gas   | #:        100\t| Mass: 0.000000"));
        assert!(text.contains("NumFiles: 1"));
        assert!(text.contains("BoxSize: 50000.000000"));
    }

    #[test]
    fn file_count_is_at_least_one() {
        let mut h = sample();
        h.num_files = 0;
        assert_eq!(h.file_count(), 1);
        h.num_files = -3;
        assert_eq!(h.file_count(), 1);
        h.num_files = 4;
        assert_eq!(h.file_count(), 4);
    }
}
