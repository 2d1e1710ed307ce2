//! Per-port reduction of flow records.

use crate::flow::FlowRecord;
use nbapi_types::PortNo;
use serde::Serialize;

/// Aggregate traffic touching one port.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PortStatistics {
    /// Sum of byte rates.
    pub bps: f64,
    /// Sum of packet rates.
    pub pps: f64,
}

/// Sums the byte and packet rates of every record whose input port or
/// output port is `port`.
///
/// A port query wants all traffic through the port regardless of
/// direction, so a flow from port 1 to port 2 counts for both. Rate text
/// that is not a number contributes zero.
pub fn aggregate_port<'a, I>(records: I, port: PortNo) -> PortStatistics
where
    I: IntoIterator<Item = &'a FlowRecord>,
{
    records
        .into_iter()
        .filter(|record| record.touches_port(port))
        .fold(PortStatistics::default(), |mut stats, record| {
            stats.bps += record.bps.value();
            stats.pps += record.pps.value();
            stats
        })
}
