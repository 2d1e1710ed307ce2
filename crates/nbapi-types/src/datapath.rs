//! Datapath (switch) identifier.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 64-bit identifier of a controlled switch.
///
/// Displayed in hexadecimal (`0x1a`), which is how operators refer to
/// switches. Parsing accepts both `0x`-prefixed hex and plain decimal.
///
/// # Examples
///
/// ```
/// use nbapi_types::DatapathId;
///
/// let dpid: DatapathId = "0x1a".parse().unwrap();
/// assert_eq!(dpid.as_u64(), 26);
/// assert_eq!(dpid.to_string(), "0x1a");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub struct DatapathId(u64);

impl DatapathId {
    /// Creates a datapath id from its raw value.
    pub const fn new(raw: u64) -> Self {
        DatapathId(raw)
    }

    /// Returns the raw 64-bit value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DatapathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl FromStr for DatapathId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let parsed = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => trimmed.parse::<u64>(),
        };

        parsed
            .map(DatapathId)
            .map_err(|_| ParseError::InvalidDatapathId(s.to_string()))
    }
}

impl From<u64> for DatapathId {
    fn from(raw: u64) -> Self {
        DatapathId(raw)
    }
}

impl From<DatapathId> for u64 {
    fn from(dpid: DatapathId) -> u64 {
        dpid.0
    }
}
