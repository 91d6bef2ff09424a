//! Parsing of the `Key: Value` header block at the top of count files.

use anyhow::{Result, bail};
use std::collections::HashMap;
use std::path::Path;

/// Number of `Key: Value` lines following the title line.
pub const METADATA_LINES: usize = 13;

/// Header keys that name a travel direction rather than a plain attribute.
pub const DIRECTION_KEYS: [&str; 4] = ["NB", "SB", "EB", "WB"];

/// Lane (or channel) key → direction code, e.g. `"1" → "NB"`.
pub type LaneMap = HashMap<String, String>;

/// Layout variant of a count file, chosen from its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Whitespace-separated table keyed by a `Lane` column.
    Lane,
    /// Comma-separated table keyed by a `Channel` column (`Ch1`, `Ch2`, ...).
    Channel,
}

impl Dialect {
    pub fn detect(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        if name.contains("Channel") {
            Dialect::Channel
        } else {
            Dialect::Lane
        }
    }

    /// Lines to skip before the table header.
    pub fn skip_rows(self) -> usize {
        match self {
            Dialect::Lane => 15,
            Dialect::Channel => 14,
        }
    }

    pub fn lane_column(self) -> &'static str {
        match self {
            Dialect::Lane => "Lane",
            Dialect::Channel => "Channel",
        }
    }

    pub fn delimiter(self) -> Option<u8> {
        match self {
            Dialect::Lane => None,
            Dialect::Channel => Some(b','),
        }
    }

    /// Formats a lane number from the header the way it appears in the table.
    pub fn lane_key(self, lane: &str) -> String {
        match self {
            Dialect::Lane => lane.to_string(),
            Dialect::Channel => format!("Ch{lane}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudyMetadata {
    /// Non-direction header pairs, in file order.
    pub fields: Vec<(String, String)>,
    pub lanes: LaneMap,
}

/// Parses the header block of a count file.
///
/// The first line is a title and is discarded. Each of the next
/// [`METADATA_LINES`] lines must read `<Key>: <Value>`. Direction keys feed the
/// lane map; everything else is kept as a plain field.
///
/// # Errors
///
/// Fails when the block is short or a line does not split into exactly one key
/// and one value on `": "`.
pub fn parse_metadata(text: &str, dialect: Dialect) -> Result<StudyMetadata> {
    let mut lines = text.lines();
    if lines.next().is_none() {
        bail!("file is empty, expected a title line");
    }

    let mut metadata = StudyMetadata::default();

    for line_no in 0..METADATA_LINES {
        let Some(line) = lines.next() else {
            bail!(
                "metadata block ended after {} lines, expected {}",
                line_no,
                METADATA_LINES
            );
        };
        let line = line.trim_end();

        let parts: Vec<&str> = line.split(": ").collect();
        let [key, value] = parts.as_slice() else {
            bail!(
                "metadata line {} not in the format <Key>: <Value>: {:?}",
                line_no + 2,
                line
            );
        };

        if DIRECTION_KEYS.contains(key) {
            for lane in value.split(',').map(str::trim).filter(|l| !l.is_empty()) {
                metadata
                    .lanes
                    .insert(dialect.lane_key(lane), key.to_string());
            }
        } else {
            metadata.fields.push((key.to_string(), value.to_string()));
        }
    }

    Ok(metadata)
}
