//! Block tags and the re-serialisation allow-list.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SnapshotError;

/// A 4-byte block label, right-padded with ASCII spaces (`"U   "`, `"POS "`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag([u8; 4]);

impl Tag {
    pub const HEAD: Tag = Tag(*b"HEAD");
    pub const POS:  Tag = Tag(*b"POS ");
    pub const VEL:  Tag = Tag(*b"VEL ");
    pub const ID:   Tag = Tag(*b"ID  ");
    pub const MASS: Tag = Tag(*b"MASS");
    pub const U:    Tag = Tag(*b"U   ");
    pub const RHO:  Tag = Tag(*b"RHO ");
    pub const HSML: Tag = Tag(*b"HSML");
    pub const AGSH: Tag = Tag(*b"AGSH");

    /// Build a tag from a label of at most four ASCII bytes, padding with
    /// spaces.  Existing padding is kept as given, so `"U"` and `"U   "` are
    /// the same tag.
    pub fn new(label: &str) -> Result<Self, SnapshotError> {
        let bytes = label.as_bytes();
        if bytes.len() > 4 || !label.is_ascii() {
            return Err(SnapshotError::InvalidTag(label.to_owned()));
        }
        let mut out = [b' '; 4];
        out[..bytes.len()].copy_from_slice(bytes);
        Ok(Tag(out))
    }

    /// Raw bytes as found on disk; no padding or validation is applied.
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Tag(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// True when every byte is printable ASCII.  Tag blocks that fail this
    /// are garbage rather than labels.
    pub fn is_printable(&self) -> bool {
        self.0.iter().all(|b| b.is_ascii_graphic() || *b == b' ')
    }

    /// The semantic role of the data block this tag labels.
    pub fn kind(&self) -> TagKind {
        match *self {
            Tag::HEAD                     => TagKind::Header,
            Tag::MASS                     => TagKind::PerTypeMass,
            Tag::RHO | Tag::U | Tag::HSML => TagKind::GasOnly,
            _                             => TagKind::PassThrough,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_printable() {
            // Printable ASCII is valid UTF-8.
            f.write_str(std::str::from_utf8(&self.0).unwrap_or_default())
        } else {
            write!(f, "0x{}", hex::encode(self.0))
        }
    }
}

impl FromStr for Tag {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tag::new(s)
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How a data block is interpreted once its tag is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    /// The 256-byte snapshot header.
    Header,
    /// Per-particle masses for every type without a fixed header mass.
    PerTypeMass,
    /// One value per gas particle (density, internal energy, smoothing length).
    GasOnly,
    /// Forwarded without semantic processing.
    PassThrough,
}

// ── TagRegistry ──────────────────────────────────────────────────────────────

/// Tags allowed to survive re-serialisation.
///
/// Membership is exact: case- and padding-sensitive, no prefix matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagRegistry {
    /// Every tag is allowed.
    Any,
    /// Only the listed tags, in configuration order.
    Only(Vec<Tag>),
}

/// Tags kept by default when writing a filtered snapshot.
pub const DEFAULT_ALLOWED_TAGS: [Tag; 9] = [
    Tag::HEAD, Tag::POS, Tag::VEL, Tag::ID, Tag::MASS,
    Tag::U, Tag::RHO, Tag::HSML, Tag::AGSH,
];

impl TagRegistry {
    pub fn universal() -> Self {
        TagRegistry::Any
    }

    /// Allow-list from `tags`, dropping duplicates but keeping first-seen order.
    pub fn only<I: IntoIterator<Item = Tag>>(tags: I) -> Self {
        let mut list: Vec<Tag> = Vec::new();
        for tag in tags {
            if !list.contains(&tag) {
                list.push(tag);
            }
        }
        TagRegistry::Only(list)
    }

    /// Parse a comma-separated list such as `"HEAD,POS,MASS"`.  Labels are
    /// padded to four bytes; surrounding whitespace is not trimmed.
    pub fn parse_list(list: &str) -> Result<Self, SnapshotError> {
        let tags = list
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::parse::<Tag>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::only(tags))
    }

    pub fn is_allowed(&self, tag: Tag) -> bool {
        match self {
            TagRegistry::Any        => true,
            TagRegistry::Only(list) => list.contains(&tag),
        }
    }

    pub fn tags(&self) -> Option<&[Tag]> {
        match self {
            TagRegistry::Any        => None,
            TagRegistry::Only(list) => Some(list),
        }
    }
}

impl Default for TagRegistry {
    fn default() -> Self {
        TagRegistry::Only(DEFAULT_ALLOWED_TAGS.to_vec())
    }
}

/// `"*"` means every tag; otherwise a list of labels.
impl<'de> Deserialize<'de> for TagRegistry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Wildcard(String),
            List(Vec<Tag>),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Wildcard(s) if s == "*" => Ok(TagRegistry::Any),
            Raw::Wildcard(s) => Err(serde::de::Error::custom(format!(
                "expected \"*\" or a list of tags, got {s:?}"
            ))),
            Raw::List(tags) => Ok(TagRegistry::only(tags)),
        }
    }
}

impl Serialize for TagRegistry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TagRegistry::Any        => serializer.serialize_str("*"),
            TagRegistry::Only(list) => list.serialize(serializer),
        }
    }
}
