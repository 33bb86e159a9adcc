//! Segment entry type and line serialization

use crate::{KeylogError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Field delimiter of the record format
pub const FIELD_DELIMITER: char = ',';

/// One logical mutation of a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentEntry {
    /// Key being mutated
    pub key: String,
    /// New value, absent for tombstones
    pub value: Option<String>,
    /// Tombstone marker
    pub is_deleted: bool,
}

impl SegmentEntry {
    /// Create a live entry setting `key` to `value`
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            is_deleted: false,
        }
    }

    /// Create a tombstone for `key`
    pub fn tombstone(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            is_deleted: true,
        }
    }

    /// Check that the entry can be written without corrupting the line format.
    ///
    /// The format has no escaping, so the delimiter and line breaks are
    /// rejected rather than written.
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(KeylogError::InvalidEntry("key must not be empty".into()));
        }
        check_field("key", &self.key)?;
        if !self.is_deleted {
            match &self.value {
                Some(value) => check_field("value", value)?,
                None => {
                    return Err(KeylogError::InvalidEntry(format!(
                        "live entry for {:?} has no value",
                        self.key
                    )))
                }
            }
        }
        Ok(())
    }

    /// Serialize as `key,value,is_deleted\n`
    pub fn to_line(&self) -> String {
        let value = if self.is_deleted {
            ""
        } else {
            self.value.as_deref().unwrap_or("")
        };
        format!(
            "{}{d}{}{d}{}\n",
            self.key,
            value,
            self.is_deleted,
            d = FIELD_DELIMITER
        )
    }

    /// Parse one record line (without its trailing newline)
    pub fn parse_line(line: &str) -> Result<Self> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let mut fields = line.splitn(3, FIELD_DELIMITER);
        let (key, value, flag) = match (fields.next(), fields.next(), fields.next()) {
            (Some(k), Some(v), Some(f)) => (k, v, f),
            _ => return Err(KeylogError::parse(line, "expected 3 comma-separated fields")),
        };

        let is_deleted = match flag {
            "true" => true,
            "false" => false,
            other => {
                return Err(KeylogError::parse(
                    line,
                    format!("is_deleted must be true or false, got {:?}", other),
                ))
            }
        };

        if key.is_empty() {
            return Err(KeylogError::parse(line, "empty key"));
        }

        Ok(Self {
            key: key.to_string(),
            value: if is_deleted {
                None
            } else {
                Some(value.to_string())
            },
            is_deleted,
        })
    }
}

impl fmt::Display for SegmentEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_deleted {
            write!(f, "{} <deleted>", self.key)
        } else {
            write!(f, "{}={}", self.key, self.value.as_deref().unwrap_or(""))
        }
    }
}

fn check_field(name: &str, field: &str) -> Result<()> {
    if let Some(bad) = field
        .chars()
        .find(|c| *c == FIELD_DELIMITER || *c == '\n' || *c == '\r')
    {
        return Err(KeylogError::InvalidEntry(format!(
            "{} {:?} contains reserved character {:?}",
            name, field, bad
        )));
    }
    Ok(())
}
