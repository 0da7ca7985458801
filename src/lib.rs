pub mod endian;
pub mod error;
pub mod block;
pub mod header;
pub mod tags;
pub mod stats;
pub mod framing;
pub mod config;
pub mod report;
pub mod pipeline;
pub mod runner;

pub use endian::{ByteOrder, Swap, detect_order};
pub use error::{Result, SnapshotError};
pub use block::{Block, DataRecord, read_block, write_block};
pub use header::{Header, HEADER_SIZE};
pub use tags::{Tag, TagRegistry};
pub use config::PipelineConfig;
pub use pipeline::SnapshotPipeline;
pub use runner::{run, FsOpener, StreamOpener};
