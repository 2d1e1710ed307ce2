//! Direction of a packet-rate limit.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Traffic direction a packet-rate limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateDirection {
    /// Ingress traffic (packets received by the switch).
    Receive,
    /// Egress traffic (packets transmitted by the switch).
    Transmit,
}

impl RateDirection {
    /// Returns true for the receive direction.
    pub const fn is_rx(&self) -> bool {
        matches!(self, RateDirection::Receive)
    }

    /// Short name used in logs and on the command line.
    pub const fn as_str(&self) -> &'static str {
        match self {
            RateDirection::Receive => "rx",
            RateDirection::Transmit => "tx",
        }
    }
}

impl fmt::Display for RateDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateDirection {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rx" | "receive" => Ok(RateDirection::Receive),
            "tx" | "transmit" => Ok(RateDirection::Transmit),
            _ => Err(ParseError::InvalidDirection(s.to_string())),
        }
    }
}
