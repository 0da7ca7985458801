//! Error types for snapshot decoding and re-serialisation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SnapshotError>;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The leading and trailing size fields of one block disagree.  The
    /// stream is desynchronised from this point on and cannot be resumed.
    #[error("The delimiters don't agree on the size of the block at offset {offset}: {leading} != {trailing}")]
    DelimiterMismatch { offset: u64, leading: u32, trailing: u32 },

    /// The stream ended inside a block.
    #[error("Truncated block at offset {offset}: expected {expected} bytes, got {available}")]
    Truncated { offset: u64, expected: u64, available: u64 },

    /// A HEAD record in a tag-delimited file whose payload is not 256 bytes.
    #[error("HEAD block at offset {offset} is {found} bytes, expected 256")]
    HeaderSize { offset: u64, found: u32 },

    /// A payload too large for a `u32` size delimiter.
    #[error("Block of {len} bytes does not fit a 32-bit size field")]
    BlockTooLarge { len: u64 },

    /// A multi-part output path that names one of the input parts.
    #[error("Output {} would overwrite input part {}", .output.display(), .input.display())]
    OutputOverlapsInput { output: PathBuf, input: PathBuf },

    #[error("Invalid tag {0:?}: tags are at most 4 ASCII bytes")]
    InvalidTag(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SnapshotError {
    /// True for errors caused by the file's contents rather than the
    /// environment (I/O, configuration).
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            SnapshotError::DelimiterMismatch { .. }
                | SnapshotError::Truncated { .. }
                | SnapshotError::HeaderSize { .. }
        )
    }
}
