//! Pipeline configuration.
//!
//! Built from defaults, optionally overlaid by a JSON file, then by CLI flags.
//!
//! ```json
//! {
//!   "allowed_tags": ["HEAD", "POS", "MASS"],
//!   "framing": "auto",
//!   "drop_scope": "pair",
//!   "opaque": "forward",
//!   "follow_parts": true
//! }
//! ```
//!
//! `"allowed_tags": "*"` keeps every tag.

use std::fs;
use std::io;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::framing::FramingKind;
use crate::tags::TagRegistry;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// What to drop when a tagged record fails the allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DropScope {
    /// Only the tag block and the data block it labels.
    #[default]
    Pair,
    /// The rejected pair and whatever record follows it.
    PairAndNext,
}

/// What to do with an untagged block that is neither a tag nor a header
/// (legacy framing only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OpaquePolicy {
    #[default]
    Forward,
    Drop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub allowed_tags: TagRegistry,
    pub framing:      FramingKind,
    pub drop_scope:   DropScope,
    pub opaque:       OpaquePolicy,
    /// Continue into `.1`, `.2`, … when the header reports `num_files > 1`.
    pub follow_parts: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            allowed_tags: TagRegistry::default(),
            framing:      FramingKind::Auto,
            drop_scope:   DropScope::Pair,
            opaque:       OpaquePolicy::Forward,
            follow_parts: true,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}
