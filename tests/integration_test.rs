use gadget_snap::block::{write_block, Block, DataRecord};
use gadget_snap::config::{DropScope, PipelineConfig};
use gadget_snap::endian::{ByteOrder, Swap};
use gadget_snap::error::SnapshotError;
use gadget_snap::framing::FramingKind;
use gadget_snap::header::Header;
use gadget_snap::report::RecordKind;
use gadget_snap::runner::{run, FsOpener, StreamOpener};
use gadget_snap::{SnapshotPipeline, Tag, TagRegistry};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ── fixtures ─────────────────────────────────────────────────────────────────

fn header(npart: [i32; 6], mass: [f64; 6], num_files: i32) -> Header {
    Header {
        npart,
        mass,
        time:         0.5,
        redshift:     1.0,
        npart_total:  npart,
        num_files,
        box_size:     100.0,
        omega0:       0.3,
        omega_lambda: 0.7,
        hubble_param: 0.7,
        ..Header::default()
    }
}

fn floats(values: &[f32], order: ByteOrder) -> Vec<u8> {
    values.iter().flat_map(|v| v.fix(order).to_ne_bytes()).collect()
}

fn tagged_snapshot(records: &[(&str, Vec<u8>)], order: ByteOrder) -> Vec<u8> {
    let mut out = Vec::new();
    for (label, payload) in records {
        DataRecord::new(Tag::new(label).unwrap(), payload.clone(), order)
            .write(&mut out, order)
            .unwrap();
    }
    out
}

/// HEAD, POS, VEL, ID, MASS, RHO, U, HSML for 4 gas + 2 halo particles with
/// a fixed halo mass.
fn full_snapshot(order: ByteOrder, num_files: i32) -> Vec<u8> {
    let h = header([4, 2, 0, 0, 0, 0], [0.0, 2.5, 0.0, 0.0, 0.0, 0.0], num_files);
    tagged_snapshot(
        &[
            ("HEAD", h.encode(order).to_vec()),
            ("POS",  floats(&[0.0; 18], order)),
            ("VEL",  floats(&[1.0; 18], order)),
            ("ID",   (0u32..6).flat_map(|i| i.fix(order).to_ne_bytes()).collect()),
            ("MASS", floats(&[0.1, 0.4, 0.2, 0.3], order)),
            ("RHO",  floats(&[5.0, 6.0, 7.0, 8.0], order)),
            ("U",    floats(&[3.0, 3.0, 3.0, 3.0], order)),
            ("HSML", floats(&[0.5, 0.25, 1.5, 1.0], order)),
        ],
        order,
    )
}

fn process(bytes: &[u8], config: &PipelineConfig) -> (gadget_snap::report::FileReport, Vec<u8>) {
    let mut out = Vec::new();
    let report = SnapshotPipeline::new(config)
        .process(&mut Cursor::new(bytes.to_vec()), Some(&mut out))
        .unwrap();
    (report, out)
}

fn universal() -> PipelineConfig {
    PipelineConfig { allowed_tags: TagRegistry::universal(), ..PipelineConfig::default() }
}

// ── round trip ───────────────────────────────────────────────────────────────

#[test]
fn test_unfiltered_roundtrip_native() {
    let bytes = full_snapshot(ByteOrder::Native, 1);
    let (report, out) = process(&bytes, &universal());
    assert_eq!(out, bytes);
    assert_eq!(report.forwarded_count(), 8);
}

#[test]
fn test_unfiltered_roundtrip_swapped() {
    let bytes = full_snapshot(ByteOrder::Swapped, 1);
    let (report, out) = process(&bytes, &universal());
    assert_eq!(report.order, ByteOrder::Swapped);
    assert_eq!(out, bytes);
}

#[test]
fn test_roundtrip_keeps_original_tag_reserved_bytes() {
    // The 4 bytes after the label are forwarded as found, not re-derived.
    let order = ByteOrder::Native;
    let mut bytes = Vec::new();
    write_block(&mut bytes, &Block::new(b"POS \xde\xad\xbe\xef".to_vec()), order).unwrap();
    write_block(&mut bytes, &Block::new(vec![7u8; 12]), order).unwrap();
    let (_, out) = process(&bytes, &universal());
    assert_eq!(out, bytes);
}

// ── semantics ────────────────────────────────────────────────────────────────

#[test]
fn test_header_and_reductions_both_orders() {
    for order in [ByteOrder::Native, ByteOrder::Swapped] {
        let bytes = full_snapshot(order, 1);
        let report = SnapshotPipeline::new(&PipelineConfig::default())
            .inspect(&mut Cursor::new(bytes))
            .unwrap();

        let h = report.header.as_ref().unwrap();
        assert_eq!(h.npart, [4, 2, 0, 0, 0, 0]);
        assert_eq!(h.mass[1], 2.5);
        assert_eq!(h.box_size, 100.0);

        let by_tag: HashMap<Tag, _> = report
            .records
            .iter()
            .filter_map(|r| r.tag.map(|t| (t, r)))
            .collect();

        let mass = by_tag[&Tag::MASS];
        assert_eq!(mass.kind, RecordKind::PerTypeMass);
        assert_eq!(mass.ranges.len(), 1, "halo mass is fixed in the header");
        assert_eq!(mass.ranges[0].ptype, 0);
        assert_eq!((mass.ranges[0].range.min, mass.ranges[0].range.max), (0.1, 0.4));
        assert_eq!(mass.size_mismatch, None);

        let rho = by_tag[&Tag::RHO];
        assert_eq!((rho.ranges[0].range.min, rho.ranges[0].range.max), (5.0, 8.0));

        let u = by_tag[&Tag::U];
        assert!(u.ranges[0].range.is_single_value());

        assert_eq!(by_tag[&Tag::POS].kind, RecordKind::PassThrough);
        assert!(by_tag[&Tag::POS].ranges.is_empty());
    }
}

#[test]
fn test_mass_block_100_floats() {
    let order = ByteOrder::Native;
    let h = header([100, 0, 0, 0, 0, 0], [0.0; 6], 1);
    let values: Vec<f32> = (0..100).map(|v| v as f32).collect();
    let bytes = tagged_snapshot(&[("HEAD", h.encode(order).to_vec()), ("MASS", floats(&values, order))], order);
    let report = SnapshotPipeline::new(&PipelineConfig::default())
        .inspect(&mut Cursor::new(bytes))
        .unwrap();
    let mass = &report.records[1];
    assert_eq!(mass.size, 400);
    assert_eq!(mass.ranges.len(), 1);
    assert_eq!(mass.ranges[0].ptype, 0);
    assert_eq!((mass.ranges[0].range.min, mass.ranges[0].range.max), (0.0, 99.0));
    assert_eq!(mass.ranges[0].range.count, 100);
}

#[test]
fn test_gas_only_without_gas_reports_nothing() {
    let order = ByteOrder::Native;
    let h = header([0, 10, 0, 0, 0, 0], [0.0, 1.0, 0.0, 0.0, 0.0, 0.0], 1);
    let bytes = tagged_snapshot(&[("HEAD", h.encode(order).to_vec()), ("RHO", Vec::new())], order);
    let report = SnapshotPipeline::new(&PipelineConfig::default())
        .inspect(&mut Cursor::new(bytes))
        .unwrap();
    assert!(report.records[1].ranges.is_empty());
    assert_eq!(report.records[1].size_mismatch, None);
}

#[test]
fn test_size_mismatch_is_not_fatal() {
    let order = ByteOrder::Native;
    let h = header([3, 0, 0, 0, 0, 0], [0.0; 6], 1);
    let bytes = tagged_snapshot(
        &[
            ("HEAD", h.encode(order).to_vec()),
            ("RHO",  floats(&[1.0, 2.0], order)),
            ("POS",  floats(&[0.0; 9], order)),
        ],
        order,
    );
    let report = SnapshotPipeline::new(&PipelineConfig::default())
        .inspect(&mut Cursor::new(bytes))
        .unwrap();
    assert_eq!(report.records.len(), 3);
    let mismatch = report.records[1].size_mismatch.unwrap();
    assert_eq!((mismatch.expected, mismatch.declared), (12, 8));
    assert_eq!(report.size_mismatches().count(), 1);
}

// ── filtering ────────────────────────────────────────────────────────────────

#[test]
fn test_allow_list_keeps_order() {
    let order = ByteOrder::Native;
    let h = header([0; 6], [0.0; 6], 1);
    let bytes = tagged_snapshot(
        &[
            ("HEAD", h.encode(order).to_vec()),
            ("POS",  vec![1u8; 12]),
            ("FOO",  vec![2u8; 4]),
            ("VEL",  vec![3u8; 12]),
        ],
        order,
    );
    let config = PipelineConfig {
        allowed_tags: TagRegistry::only([Tag::HEAD, Tag::POS]),
        ..PipelineConfig::default()
    };
    let (report, out) = process(&bytes, &config);

    let expected = tagged_snapshot(&[("HEAD", h.encode(order).to_vec()), ("POS", vec![1u8; 12])], order);
    assert_eq!(out, expected);
    assert_eq!(report.bytes_written, Some(expected.len() as u64));
    let forwarded: Vec<Tag> = report.records.iter().filter(|r| r.forwarded).filter_map(|r| r.tag).collect();
    assert_eq!(forwarded, [Tag::HEAD, Tag::POS]);
}

#[test]
fn test_legacy_unknown_tag_drops_pair() {
    // Legacy stream: header, a tagged FOO pair, an untagged block.
    let order = ByteOrder::Native;
    let h = header([0; 6], [0.0; 6], 1);
    let mut bytes = Vec::new();
    write_block(&mut bytes, &Block::new(h.encode(order).to_vec()), order).unwrap();
    DataRecord::new(Tag::new("FOO").unwrap(), vec![1u8; 16], order).write(&mut bytes, order).unwrap();
    write_block(&mut bytes, &Block::new(vec![2u8; 20]), order).unwrap();

    for (scope, expected_written) in [(DropScope::Pair, 264 + 28), (DropScope::PairAndNext, 264)] {
        let config = PipelineConfig { drop_scope: scope, ..PipelineConfig::default() };
        let (report, out) = process(&bytes, &config);
        assert_eq!(report.framing, FramingKind::Legacy);
        assert_eq!(report.records.len(), 3);
        assert_eq!(out.len(), expected_written, "{scope:?}");
    }
}

// ── errors ───────────────────────────────────────────────────────────────────

#[test]
fn test_delimiter_mismatch_aborts() {
    let order = ByteOrder::Native;
    let mut bytes = tagged_snapshot(&[("POS", vec![0u8; 12])], order);
    // Corrupt the data block's trailing size.
    let n = bytes.len();
    bytes[n - 4..].copy_from_slice(&13u32.to_ne_bytes());
    let err = SnapshotPipeline::new(&universal())
        .inspect(&mut Cursor::new(bytes))
        .unwrap_err();
    match err {
        SnapshotError::DelimiterMismatch { offset, leading, trailing } => {
            assert_eq!(offset, 16);
            assert_eq!((leading, trailing), (12, 13));
        }
        other => panic!("expected DelimiterMismatch, got {other:?}"),
    }
}

#[test]
fn test_mismatch_after_valid_records_keeps_earlier_output() {
    let order = ByteOrder::Native;
    let mut bytes = tagged_snapshot(&[("POS", vec![0u8; 12]), ("VEL", vec![0u8; 12])], order);
    let good_len = 16 + 20;
    let n = bytes.len();
    bytes[n - 4..].copy_from_slice(&99u32.to_ne_bytes());
    let mut out = Vec::new();
    let result = SnapshotPipeline::new(&universal()).process(&mut Cursor::new(bytes), Some(&mut out));
    assert!(result.is_err());
    assert_eq!(out.len(), good_len);
}

// ── multi-file runner ────────────────────────────────────────────────────────

/// In-memory opener that records every path it was asked for.
struct MemOpener {
    files:   HashMap<PathBuf, Vec<u8>>,
    opened:  Vec<PathBuf>,
    created: Vec<PathBuf>,
}

impl StreamOpener for MemOpener {
    type Input  = Cursor<Vec<u8>>;
    type Output = io::Sink;

    fn open_input(&mut self, path: &Path) -> io::Result<Self::Input> {
        self.opened.push(path.to_path_buf());
        self.files
            .get(path)
            .cloned()
            .map(Cursor::new)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn create_output(&mut self, path: &Path) -> io::Result<Self::Output> {
        self.created.push(path.to_path_buf());
        Ok(io::sink())
    }
}

#[test]
fn test_multifile_opens_each_part_once() {
    let order = ByteOrder::Native;
    let mut files = HashMap::new();
    for i in 0..4 {
        files.insert(PathBuf::from(format!("snap_010.{i}")), full_snapshot(order, 3));
    }
    let mut opener = MemOpener { files, opened: Vec::new(), created: Vec::new() };

    let report = run(&mut opener, &PipelineConfig::default(), Path::new("snap_010.0"), Some(Path::new("out")))
        .unwrap();

    assert_eq!(report.parts.len(), 3);
    assert_eq!(
        opener.opened,
        [PathBuf::from("snap_010.0"), PathBuf::from("snap_010.1"), PathBuf::from("snap_010.2")]
    );
    assert_eq!(opener.created, [PathBuf::from("out"), PathBuf::from("out.1"), PathBuf::from("out.2")]);
}

#[test]
fn test_multifile_without_counter_stops() {
    let mut files = HashMap::new();
    files.insert(PathBuf::from("snapshot"), full_snapshot(ByteOrder::Native, 3));
    let mut opener = MemOpener { files, opened: Vec::new(), created: Vec::new() };
    let report = run(&mut opener, &PipelineConfig::default(), Path::new("snapshot"), None).unwrap();
    assert_eq!(report.parts.len(), 1);
    assert_eq!(opener.opened.len(), 1);
}

#[test]
fn test_follow_parts_disabled() {
    let mut files = HashMap::new();
    files.insert(PathBuf::from("snap.0"), full_snapshot(ByteOrder::Native, 2));
    let mut opener = MemOpener { files, opened: Vec::new(), created: Vec::new() };
    let config = PipelineConfig { follow_parts: false, ..PipelineConfig::default() };
    let report = run(&mut opener, &config, Path::new("snap.0"), None).unwrap();
    assert_eq!(report.parts.len(), 1);
}

#[test]
fn test_filter_real_files() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("snap.0");
    let dst = dir.path().join("filtered.0");
    std::fs::write(&src, full_snapshot(ByteOrder::Native, 1)).unwrap();

    let config = PipelineConfig {
        allowed_tags: TagRegistry::only([Tag::HEAD, Tag::MASS]),
        ..PipelineConfig::default()
    };
    let report = run(&mut FsOpener, &config, &src, Some(&dst)).unwrap();
    assert_eq!(report.parts.len(), 1);

    let mut written = Vec::new();
    File::open(&dst).unwrap().read_to_end(&mut written).unwrap();
    assert_eq!(written.len() as u64, report.total_bytes_written());

    // The filtered file is itself a valid snapshot with two records.
    let reread = run(&mut FsOpener, &PipelineConfig::default(), &dst, None).unwrap();
    let tags: Vec<Tag> = reread.parts[0].records.iter().filter_map(|r| r.tag).collect();
    assert_eq!(tags, [Tag::HEAD, Tag::MASS]);
    assert_eq!(reread.parts[0].records[1].ranges[0].range.max, 0.4);
}

#[test]
fn test_output_onto_later_part_is_refused() {
    let dir = TempDir::new().unwrap();
    let order = ByteOrder::Native;
    for i in 0..3 {
        let h = header([i + 1, 0, 0, 0, 0, 0], [0.0; 6], 3);
        let bytes = tagged_snapshot(&[("HEAD", h.encode(order).to_vec())], order);
        std::fs::write(dir.path().join(format!("snap.{i}")), bytes).unwrap();
    }
    let input = dir.path().join("snap.0");
    let clobbered = dir.path().join("snap.1");

    let err = run(&mut FsOpener, &universal(), &input, Some(&clobbered)).unwrap_err();
    assert!(matches!(err, SnapshotError::OutputOverlapsInput { .. }), "{err:?}");

    // Every part is still intact and readable.
    let report = run(&mut FsOpener, &PipelineConfig::default(), &input, None).unwrap();
    let counts: Vec<i32> = report.parts.iter().map(|p| p.header.as_ref().unwrap().npart[0]).collect();
    assert_eq!(counts, [1, 2, 3]);
}

#[test]
fn test_output_overlap_checked_before_any_create() {
    let mut files = HashMap::new();
    for i in 0..3 {
        files.insert(PathBuf::from(format!("snap.{i}")), full_snapshot(ByteOrder::Native, 3));
    }
    let mut opener = MemOpener { files, opened: Vec::new(), created: Vec::new() };
    let result = run(&mut opener, &PipelineConfig::default(), Path::new("snap.0"), Some(Path::new("snap.2")));
    assert!(matches!(result, Err(SnapshotError::OutputOverlapsInput { .. })));
    assert!(opener.created.is_empty());
}

#[test]
fn test_swapped_legacy_roundtrip() {
    let order = ByteOrder::Swapped;
    let h = header([3, 0, 0, 0, 0, 0], [0.0; 6], 1);
    let mut bytes = Vec::new();
    write_block(&mut bytes, &Block::new(h.encode(order).to_vec()), order).unwrap();
    DataRecord::new(Tag::RHO, floats(&[2.0, 1.0, 3.0], order), order)
        .write(&mut bytes, order)
        .unwrap();

    let (report, out) = process(&bytes, &universal());
    assert_eq!(report.framing, FramingKind::Legacy);
    assert_eq!(report.order, ByteOrder::Swapped);

    let decoded = report.header.as_ref().unwrap();
    assert_eq!(decoded.npart, [3, 0, 0, 0, 0, 0]);
    assert_eq!(decoded.box_size, 100.0);
    assert_eq!(decoded.hubble_param, 0.7);

    assert_eq!(report.records[0].kind, RecordKind::Header);
    let rho = &report.records[1];
    assert_eq!(rho.tag, Some(Tag::RHO));
    assert_eq!((rho.ranges[0].range.min, rho.ranges[0].range.max), (1.0, 3.0));
    assert_eq!(rho.size_mismatch, None);
    assert_eq!(out, bytes);
}

#[test]
fn test_report_text() {
    let bytes = full_snapshot(ByteOrder::Native, 1);
    let report = SnapshotPipeline::new(&PipelineConfig::default())
        .inspect(&mut Cursor::new(bytes))
        .unwrap();
    let text = report.to_string();
    assert!(text.contains("Framing: tagged"));
    assert!(text.contains("HEAD\nSIZE: 256\n****"));
    assert!(text.contains("Type 0: [0.100000 - 0.400000]"));
    assert!(text.contains("Type 0: [3.000000]"));
    assert!(!text.contains("Byte swapping required"));
}
