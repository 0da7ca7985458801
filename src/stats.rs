//! Min/max reduction over per-particle `f32` arrays.
//!
//! Which part of a block's payload belongs to which particle type is driven
//! entirely by the header:
//!
//! - gas-only blocks (`RHO `, `U   `, `HSML`) hold `npart[0]` values;
//! - the `MASS` block holds `npart[i]` values for every type `i` that has
//!   particles but no fixed header mass, packed in type order.
//!
//! Reducers never mutate the header or the payload.  When the element count
//! implied by the header disagrees with the block size, the block size wins
//! (reading stops at the end of the payload) and a [`SizeMismatch`] is
//! returned alongside the ranges.

use std::fmt;

use serde::Serialize;

use crate::endian::{ByteOrder, Swap};
use crate::header::{Header, NTYPES};

const F32_SIZE: usize = std::mem::size_of::<f32>();

/// Min and max of a non-empty run of values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValueRange {
    pub min:   f32,
    pub max:   f32,
    /// Values that took part in the comparison.
    pub count: usize,
    /// NaN values skipped.
    #[serde(skip_serializing_if = "is_zero")]
    pub nan:   usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl ValueRange {
    /// Reduce `values`, skipping NaN.  `None` when nothing comparable is
    /// left; an empty range is never reported as a single value.
    pub fn of<I: IntoIterator<Item = f32>>(values: I) -> Option<Self> {
        let mut range: Option<ValueRange> = None;
        let mut nan = 0;
        for v in values {
            if v.is_nan() {
                nan += 1;
                continue;
            }
            match range.as_mut() {
                Some(r) => {
                    r.min = r.min.min(v);
                    r.max = r.max.max(v);
                    r.count += 1;
                }
                None => range = Some(ValueRange { min: v, max: v, count: 1, nan: 0 }),
            }
        }
        if range.is_none() && nan > 0 {
            tracing::warn!(nan, "every value is NaN, no range reported");
        }
        range.map(|r| ValueRange { nan, ..r })
    }

    pub fn is_single_value(&self) -> bool {
        self.min == self.max
    }
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_value() {
            write!(f, "[{:.6}]", self.min)
        } else {
            write!(f, "[{:.6} - {:.6}]", self.min, self.max)
        }
    }
}

/// Reduced range for one particle type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TypeRange {
    pub ptype: usize,
    pub range: ValueRange,
}

impl fmt::Display for TypeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type {}: {}", self.ptype, self.range)
    }
}

/// Header-derived byte count disagrees with the block's declared size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeMismatch {
    /// Bytes the header's particle counts call for.
    pub expected: u64,
    /// Bytes the block delimiter declares.
    pub declared: u64,
}

impl fmt::Display for SizeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "The measured size is different from the reported by the block delimiter! ({} != {})",
            self.expected, self.declared
        )
    }
}

/// Output of a reducer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reduction {
    /// One entry per type that consumed at least one value, in type order.
    pub ranges:        Vec<TypeRange>,
    /// Payload bytes actually read.
    pub consumed:      usize,
    pub size_mismatch: Option<SizeMismatch>,
}

/// Decode the `index`-th `f32` of `payload` in the file's byte order.
#[inline]
fn value_at(payload: &[u8], index: usize, order: ByteOrder) -> f32 {
    let start = index * F32_SIZE;
    let mut raw = [0u8; F32_SIZE];
    raw.copy_from_slice(&payload[start..start + F32_SIZE]);
    f32::from_ne_bytes(raw).fix(order)
}

/// Reduce the `count` floats starting at float index `start`, clamped to
/// what the payload holds.  Returns the range and the number of floats read.
fn reduce_span(payload: &[u8], start: usize, count: usize, order: ByteOrder) -> (Option<ValueRange>, usize) {
    let available = (payload.len() / F32_SIZE).saturating_sub(start);
    let take = count.min(available);
    let range = ValueRange::of((start..start + take).map(|i| value_at(payload, i, order)));
    (range, take)
}

fn check_size(expected: usize, payload: &[u8]) -> Option<SizeMismatch> {
    let declared = payload.len();
    if expected == declared {
        return None;
    }
    let mismatch = SizeMismatch { expected: expected as u64, declared: declared as u64 };
    tracing::warn!(expected = mismatch.expected, declared = mismatch.declared, "{}", mismatch);
    Some(mismatch)
}

/// Reduce a block holding one `f32` per gas particle.
///
/// With `npart[0] == 0` nothing is read and no range is reported.
pub fn reduce_gas_only(header: &Header, payload: &[u8], order: ByteOrder) -> Reduction {
    let ngas = header.count(0);
    let (range, read) = reduce_span(payload, 0, ngas, order);
    Reduction {
        ranges:        range.map(|range| TypeRange { ptype: 0, range }).into_iter().collect(),
        consumed:      read * F32_SIZE,
        size_mismatch: check_size(ngas * F32_SIZE, payload),
    }
}

/// Reduce the MASS block, one range per type whose masses are stored there.
///
/// The read cursor advances monotonically across types.  Types with a fixed
/// header mass, or with no particles, consume nothing.
pub fn reduce_per_type_mass(header: &Header, payload: &[u8], order: ByteOrder) -> Reduction {
    let mut ranges = Vec::new();
    let mut cursor = 0usize;
    let mut expected = 0usize;

    for ptype in 0..NTYPES {
        if !header.has_mass_block_entries(ptype) {
            continue;
        }
        let n = header.count(ptype);
        expected += n * F32_SIZE;

        let (range, read) = reduce_span(payload, cursor, n, order);
        cursor += read;
        if let Some(range) = range {
            ranges.push(TypeRange { ptype, range });
        }
    }

    Reduction {
        ranges,
        consumed:      cursor * F32_SIZE,
        size_mismatch: check_size(expected, payload),
    }
}
