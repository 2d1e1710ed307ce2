//! Switch port numbers as carried in flow records.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Port number of a switch port.
///
/// Flow records carry both an input and an output port; the reserved
/// values above [`PortNo::MAX`] are logical ports (controller, flood, ...)
/// and never identify a physical interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct PortNo(u32);

impl PortNo {
    /// Highest number usable by a physical port.
    pub const MAX: PortNo = PortNo(0xffff_ff00);
    /// Send the packet back out of its input port.
    pub const IN_PORT: PortNo = PortNo(0xffff_fff8);
    /// Flood to all ports except the input port.
    pub const FLOOD: PortNo = PortNo(0xffff_fffb);
    /// Send to all ports except the input port.
    pub const ALL: PortNo = PortNo(0xffff_fffc);
    /// Send to the controller.
    pub const CONTROLLER: PortNo = PortNo(0xffff_fffd);
    /// Local openflow port.
    pub const LOCAL: PortNo = PortNo(0xffff_fffe);
    /// Wildcard / unset port.
    pub const ANY: PortNo = PortNo(0xffff_ffff);

    /// Creates a port number from its raw value.
    pub const fn new(raw: u32) -> Self {
        PortNo(raw)
    }

    /// Returns the raw value.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Returns true if this is a reserved logical port.
    pub const fn is_reserved(&self) -> bool {
        self.0 > Self::MAX.0
    }
}

impl fmt::Display for PortNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PortNo::IN_PORT => write!(f, "in_port"),
            PortNo::FLOOD => write!(f, "flood"),
            PortNo::ALL => write!(f, "all"),
            PortNo::CONTROLLER => write!(f, "controller"),
            PortNo::LOCAL => write!(f, "local"),
            PortNo::ANY => write!(f, "any"),
            PortNo(raw) => write!(f, "{}", raw),
        }
    }
}

impl FromStr for PortNo {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(PortNo)
            .map_err(|_| ParseError::InvalidPortNo(s.to_string()))
    }
}

impl From<u32> for PortNo {
    fn from(raw: u32) -> Self {
        PortNo(raw)
    }
}

impl From<u16> for PortNo {
    fn from(raw: u16) -> Self {
        PortNo(u32::from(raw))
    }
}

impl From<PortNo> for u32 {
    fn from(port: PortNo) -> u32 {
        port.0
    }
}
