//! Flow table identifier.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a flow table within a switch pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct TableId(u8);

impl TableId {
    /// Wildcard meaning every table.
    pub const ALL: TableId = TableId(0xff);

    pub const fn new(raw: u8) -> Self {
        TableId(raw)
    }

    pub const fn as_u8(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TableId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .map(TableId)
            .map_err(|_| ParseError::InvalidTableId(s.to_string()))
    }
}

impl From<u8> for TableId {
    fn from(raw: u8) -> Self {
        TableId(raw)
    }
}

impl From<TableId> for u8 {
    fn from(table: TableId) -> u8 {
        table.0
    }
}
