//! Segment file names and their ordering
//!
//! Plain segments are named `000001.log`, `000002.log`, ... in creation
//! order. A merge of two segments produces `compacted_<low>_<high>.log`,
//! which takes the ordering position of its newer input (`high`).

use crate::{KeylogError, Result};
use std::cmp::Ordering;
use std::fmt;

/// File extension of segment files
pub const SEGMENT_SUFFIX: &str = ".log";

/// Prefix of merge output segments
pub const COMPACTED_PREFIX: &str = "compacted_";

/// Suffix of merge outputs that have not been published yet
pub const TEMP_SUFFIX: &str = ".tmp";

/// Parsed segment file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentName {
    /// `NNNNNN.log`
    Plain(u64),
    /// `compacted_<low>_<high>.log`
    Compacted { low: u64, high: u64 },
}

impl SegmentName {
    /// Plain segment with the given number
    pub fn plain(number: u64) -> Self {
        SegmentName::Plain(number)
    }

    /// Merge output of two segments given oldest-first
    pub fn compacted(older: &SegmentName, newer: &SegmentName) -> Self {
        SegmentName::Compacted {
            low: older.ordering_key(),
            high: newer.ordering_key(),
        }
    }

    /// Parse a file name such as `000007.log` or `compacted_3_7.log`
    pub fn parse(file_name: &str) -> Result<Self> {
        let invalid = || KeylogError::NameFormat(file_name.to_string());
        let stem = file_name.strip_suffix(SEGMENT_SUFFIX).ok_or_else(invalid)?;

        if let Some(rest) = stem.strip_prefix(COMPACTED_PREFIX) {
            let (low, high) = rest.rsplit_once('_').ok_or_else(invalid)?;
            let low = parse_number(low).ok_or_else(invalid)?;
            let high = parse_number(high).ok_or_else(invalid)?;
            return Ok(SegmentName::Compacted { low, high });
        }

        parse_number(stem).map(SegmentName::Plain).ok_or_else(invalid)
    }

    /// Position of the segment in replay order
    pub fn ordering_key(&self) -> u64 {
        match self {
            SegmentName::Plain(n) => *n,
            SegmentName::Compacted { high, .. } => *high,
        }
    }

    /// Name of the plain segment following this one
    pub fn next_plain(&self) -> Self {
        SegmentName::Plain(self.ordering_key() + 1)
    }

    pub fn is_compacted(&self) -> bool {
        matches!(self, SegmentName::Compacted { .. })
    }

    /// File name on disk
    pub fn file_name(&self) -> String {
        match self {
            SegmentName::Plain(n) => format!("{:06}{}", n, SEGMENT_SUFFIX),
            SegmentName::Compacted { low, high } => {
                format!("{}{}_{}{}", COMPACTED_PREFIX, low, high, SEGMENT_SUFFIX)
            }
        }
    }

    /// File name used while a merge output is being written
    pub fn temp_file_name(&self) -> String {
        format!("{}{}", self.file_name(), TEMP_SUFFIX)
    }
}

fn parse_number(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl Ord for SegmentName {
    fn cmp(&self, other: &Self) -> Ordering {
        // On equal keys a compacted segment holds the older data.
        self.ordering_key()
            .cmp(&other.ordering_key())
            .then_with(|| other.is_compacted().cmp(&self.is_compacted()))
            .then_with(|| self.file_name().cmp(&other.file_name()))
    }
}

impl PartialOrd for SegmentName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

impl std::str::FromStr for SegmentName {
    type Err = KeylogError;

    fn from_str(s: &str) -> Result<Self> {
        SegmentName::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_format() {
        assert_eq!(SegmentName::plain(1).file_name(), "000001.log");
        assert_eq!(SegmentName::plain(1234567).file_name(), "1234567.log");
        let merged = SegmentName::compacted(&SegmentName::plain(1), &SegmentName::plain(2));
        assert_eq!(merged.file_name(), "compacted_1_2.log");
        assert_eq!(merged.temp_file_name(), "compacted_1_2.log.tmp");
    }

    #[test]
    fn test_parse_valid() {
        assert_eq!(SegmentName::parse("000042.log").unwrap(), SegmentName::Plain(42));
        assert_eq!(
            SegmentName::parse("compacted_3_17.log").unwrap(),
            SegmentName::Compacted { low: 3, high: 17 }
        );
        assert_eq!(SegmentName::parse("compacted_3_17.log").unwrap().ordering_key(), 17);
    }

    #[test]
    fn test_parse_invalid() {
        for name in [
            "",
            "notes.txt",
            "abc.log",
            ".log",
            "compacted_.log",
            "compacted_1.log",
            "compacted_a_2.log",
            "-1.log",
            "000001.log.tmp",
        ] {
            assert!(
                matches!(SegmentName::parse(name), Err(KeylogError::NameFormat(_))),
                "{} should not parse",
                name
            );
        }
    }

    #[test]
    fn test_ordering_uses_trailing_number() {
        let mut names: Vec<SegmentName> = ["000010.log", "compacted_1_4.log", "000002.log", "000005.log"]
            .iter()
            .map(|n| SegmentName::parse(n).unwrap())
            .collect();
        names.sort();
        let files: Vec<String> = names.iter().map(|n| n.file_name()).collect();
        assert_eq!(files, ["000002.log", "compacted_1_4.log", "000005.log", "000010.log"]);
    }

    #[test]
    fn test_compacted_sorts_before_plain_on_tie() {
        let merged = SegmentName::Compacted { low: 1, high: 2 };
        let plain = SegmentName::Plain(2);
        assert!(merged < plain);
    }

    #[test]
    fn test_chain_naming() {
        let first = SegmentName::compacted(&SegmentName::plain(1), &SegmentName::plain(2));
        let second = SegmentName::compacted(&first, &SegmentName::plain(3));
        assert_eq!(second.file_name(), "compacted_2_3.log");
        assert_eq!(second.next_plain(), SegmentName::Plain(4));
    }
}
