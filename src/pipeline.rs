//! Single-file snapshot pass: probe, read, interpret, filter, forward.
//!
//! # Flow
//! 1. Resolve the framing (probing the first size field for `auto`).
//! 2. Probe the byte order once.  It stays fixed for the whole pass.
//! 3. Read frames until end of stream.  Each frame is interpreted by its tag:
//!    `HEAD` is decoded into the pass's header, `MASS` goes to the per-type
//!    reducer, `RHO `/`U   `/`HSML` to the gas-only reducer, everything
//!    else passes through.  Untagged legacy blocks of 256 bytes are headers;
//!    other untagged blocks are opaque.
//! 4. If an output stream is attached, forward the frame verbatim when the
//!    allow-list (or the opaque policy, for untagged blocks) lets it through.
//!
//! A delimiter mismatch aborts the pass; nothing after the last complete
//! frame is written.  Size-accounting mismatches are recorded and logged
//! but never abort.
//!
//! # Output byte order
//! Blocks are written back in the input's byte order.  Payloads are
//! forwarded untouched, so writing the delimiters in any other order would
//! produce a file whose sizes and contents disagree.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::block::{write_block, Block, DataRecord};
use crate::config::{DropScope, OpaquePolicy, PipelineConfig};
use crate::endian::{detect_order_for, ByteOrder, TAG_BLOCK_SIZE};
use crate::error::{Result, SnapshotError};
use crate::framing::{framing_for, Frame, FramingKind, FramingStrategy};
use crate::header::Header;
use crate::report::{FileReport, RecordKind, RecordReport};
use crate::stats::{reduce_gas_only, reduce_per_type_mass, Reduction};
use crate::tags::{Tag, TagRegistry};

pub struct SnapshotPipeline<'c> {
    config: &'c PipelineConfig,
}

/// State scoped to one file's pass.
struct PassState {
    framing:       FramingKind,
    order:         ByteOrder,
    header:        Option<Header>,
    /// Set after a rejected pair under [`DropScope::PairAndNext`].
    suppress_next: bool,
}

impl<'c> SnapshotPipeline<'c> {
    pub fn new(config: &'c PipelineConfig) -> Self {
        Self { config }
    }

    /// Inspect `input` without writing anything.
    pub fn inspect<R: Read + Seek>(&self, input: &mut R) -> Result<FileReport> {
        self.process::<R, Vec<u8>>(input, None)
    }

    /// Decode the header from the first frame without consuming the stream.
    /// `None` when the first frame is not a header.
    pub fn first_header<R: Read + Seek>(&self, input: &mut R) -> Result<Option<Header>> {
        let start   = input.stream_position()?;
        let framing = framing_for(self.config.framing, input)?;
        let order   = detect_order_for(input, framing.probe_sizes())?;
        let header  = match framing.next_frame(input, order)? {
            Some(Frame::Record(rec)) if rec.label() == Some(Tag::HEAD) => Header::from_payload(&rec.data.payload, order),
            Some(Frame::Bare(block)) => Header::from_payload(&block.payload, order),
            _ => None,
        };
        input.seek(SeekFrom::Start(start))?;
        Ok(header)
    }

    /// Run one pass over `input`, forwarding allowed frames to `output`.
    pub fn process<R: Read + Seek, W: Write>(
        &self,
        input:      &mut R,
        mut output: Option<&mut W>,
    ) -> Result<FileReport> {
        let framing = framing_for(self.config.framing, input)?;
        let order   = detect_order_for(input, framing.probe_sizes())?;
        tracing::info!(framing = %framing.kind(), ?order, "starting snapshot pass");

        let mut state = PassState {
            framing:       framing.kind(),
            order,
            header:        None,
            suppress_next: false,
        };
        let mut records = Vec::new();
        let mut bytes_written = 0u64;

        loop {
            let offset = input.stream_position()?;
            let Some(frame) = framing.next_frame(input, order)? else {
                break;
            };

            let (mut record, allowed) = match &frame {
                Frame::Record(rec) => self.dispatch_record(&mut state, offset, rec)?,
                Frame::Bare(block) => self.dispatch_bare(&mut state, offset, block),
            };

            let suppressed = std::mem::take(&mut state.suppress_next);
            if !allowed && matches!(frame, Frame::Record(_)) && self.config.drop_scope == DropScope::PairAndNext {
                state.suppress_next = true;
            }
            record.forwarded = allowed && !suppressed && output.is_some();

            if let Some(out) = output.as_deref_mut() {
                if record.forwarded {
                    bytes_written += write_frame(out, &frame, order)?;
                } else {
                    tracing::debug!(offset, tag = ?record.tag.map(|t| t.to_string()), suppressed, "record dropped");
                }
            }
            records.push(record);
        }

        Ok(FileReport {
            path:            None,
            framing:         state.framing,
            order:           state.order,
            file_endianness: state.order.file_endianness(),
            header:          state.header,
            records,
            bytes_written:   output.is_some().then_some(bytes_written),
        })
    }

    /// Interpret a tag + data pair.  Returns the report and whether the
    /// allow-list lets the pair through.
    fn dispatch_record(
        &self,
        state:  &mut PassState,
        offset: u64,
        rec:    &DataRecord,
    ) -> Result<(RecordReport, bool)> {
        let data = &rec.data;
        let tag  = rec.label();
        let kind = tag.map_or(RecordKind::PassThrough, |t| t.kind().into());
        let mut report = RecordReport::new(offset, tag, data.declared_size, kind);

        match kind {
            RecordKind::Header => match Header::from_payload(&data.payload, state.order) {
                Some(header) => {
                    report.header = Some(header.clone());
                    state.header.get_or_insert(header);
                }
                None if state.framing == FramingKind::Tagged => {
                    return Err(SnapshotError::HeaderSize {
                        offset: offset + rec.tag.encoded_len(),
                        found:  data.declared_size,
                    });
                }
                None => {
                    tracing::warn!(offset, size = data.declared_size, "HEAD block of unexpected size, passing through");
                    report.kind = RecordKind::PassThrough;
                }
            },
            RecordKind::PerTypeMass | RecordKind::GasOnly => {
                if let Some(reduction) = reduce(state, kind, tag, &data.payload) {
                    report.ranges        = reduction.ranges;
                    report.size_mismatch = reduction.size_mismatch;
                }
            }
            RecordKind::PassThrough | RecordKind::Opaque => {}
        }

        if let Some(t) = tag.filter(|t| !t.is_printable()) {
            tracing::warn!(offset, tag = %t, "unreadable tag");
        }
        let registry = &self.config.allowed_tags;
        let allowed = match tag {
            Some(t) => registry.is_allowed(t),
            // Only a universal allow-list can vouch for a record with no label.
            None => {
                let keep = *registry == TagRegistry::Any;
                tracing::warn!(
                    offset,
                    size = rec.tag.declared_size,
                    forwarded = keep,
                    "tag block is not {TAG_BLOCK_SIZE} bytes"
                );
                keep
            }
        };
        Ok((report, allowed))
    }

    /// Interpret an untagged legacy block.
    fn dispatch_bare(&self, state: &mut PassState, offset: u64, block: &Block) -> (RecordReport, bool) {
        if let Some(header) = Header::from_payload(&block.payload, state.order) {
            let mut report = RecordReport::new(offset, None, block.declared_size, RecordKind::Header);
            report.header = Some(header.clone());
            state.header.get_or_insert(header);
            return (report, true);
        }
        let report = RecordReport::new(offset, None, block.declared_size, RecordKind::Opaque);
        (report, self.config.opaque == OpaquePolicy::Forward)
    }
}

fn reduce(state: &PassState, kind: RecordKind, tag: Option<Tag>, payload: &[u8]) -> Option<Reduction> {
    let Some(header) = &state.header else {
        tracing::warn!(tag = ?tag.map(|t| t.to_string()), "no header decoded yet, skipping statistics");
        return None;
    };
    Some(match kind {
        RecordKind::PerTypeMass => reduce_per_type_mass(header, payload, state.order),
        _                       => reduce_gas_only(header, payload, state.order),
    })
}

fn write_frame<W: Write>(out: &mut W, frame: &Frame, order: ByteOrder) -> Result<u64> {
    Ok(match frame {
        Frame::Record(rec) => {
            rec.write(out, order)?;
            rec.encoded_len()
        }
        Frame::Bare(block) => {
            write_block(out, block, order)?;
            block.encoded_len()
        }
    })
}
