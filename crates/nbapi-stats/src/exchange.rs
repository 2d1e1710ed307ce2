//! Correlated request/response exchange for table statistics.
//!
//! One exchange moves through `Idle -> Sent -> (Validated | Rejected)`.
//! There are no retries; a rejected response is dropped and the caller gets
//! the error.

use crate::error::{NbResult, NbStatsError};
use crate::service::StatsService;
use crate::wire::{AuxCommand, Frame};
use byteorder::{BigEndian, ByteOrder};
use nbapi_types::{DatapathId, TableId};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const OPERATION: &str = "table_stats";

/// Size of the table statistics payload.
pub const TABLE_STATS_LEN: usize = 32;

/// Counters of one flow table of one switch.
///
/// Payload layout: `{ datapath_id u64, table_id u8, pad[3], active_count
/// u32, lookup_count u64, matched_count u64 }`, network byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableStatistics {
    pub datapath_id: DatapathId,
    pub table_id: TableId,
    pub active_count: u32,
    pub lookup_count: u64,
    pub matched_count: u64,
}

impl TableStatistics {
    /// A request payload: ids filled in, counters zero.
    pub fn request(datapath_id: DatapathId, table_id: TableId) -> Self {
        Self {
            datapath_id,
            table_id,
            active_count: 0,
            lookup_count: 0,
            matched_count: 0,
        }
    }

    pub fn encode_into(&self, out: &mut [u8]) {
        BigEndian::write_u64(&mut out[0..8], self.datapath_id.as_u64());
        out[8] = self.table_id.as_u8();
        out[9..12].fill(0);
        BigEndian::write_u32(&mut out[12..16], self.active_count);
        BigEndian::write_u64(&mut out[16..24], self.lookup_count);
        BigEndian::write_u64(&mut out[24..32], self.matched_count);
    }

    /// Decodes a validated payload of at least [`TABLE_STATS_LEN`] bytes.
    pub fn decode(raw: &[u8]) -> NbResult<Self> {
        if raw.len() < TABLE_STATS_LEN {
            return Err(NbStatsError::protocol(
                OPERATION,
                format!("payload of {} bytes", raw.len()),
            ));
        }
        Ok(Self {
            datapath_id: DatapathId::new(BigEndian::read_u64(&raw[0..8])),
            table_id: TableId::new(raw[8]),
            active_count: BigEndian::read_u32(&raw[12..16]),
            lookup_count: BigEndian::read_u64(&raw[16..24]),
            matched_count: BigEndian::read_u64(&raw[24..32]),
        })
    }

    /// Builds a framed table statistics message carrying these values.
    pub fn to_frame(&self) -> NbResult<Frame> {
        let mut frame = Frame::aux_command(AuxCommand::GetTableStats, TABLE_STATS_LEN)?;
        self.encode_into(frame.aux_payload_mut());
        Ok(frame)
    }
}

/// Requests the counters of `table` on `dpid` and waits for the answer.
///
/// The response must be an auxiliary command frame long enough for the
/// table statistics payload, must carry the same command code as the
/// request and must echo the requested switch and table; anything else is
/// a [`NbStatsError::ProtocolError`]. The
/// response buffer is dropped before returning on every path, and the
/// counters are returned by value.
///
/// `timeout` of `None` blocks until the service answers.
#[instrument(skip_all, fields(dpid = %dpid, table = %table))]
pub fn request_table_stats(
    service: &dyn StatsService,
    dpid: DatapathId,
    table: TableId,
    timeout: Option<Duration>,
) -> NbResult<TableStatistics> {
    let request = TableStatistics::request(dpid, table).to_frame()?;
    service.send(request)?;
    debug!("Table statistics request sent");

    let response = match service.wait_response(timeout) {
        Ok(Some(response)) => response,
        Ok(None) => {
            warn!(dpid = %dpid, "Service returned no table statistics response");
            return Err(NbStatsError::NoResponse {
                operation: OPERATION,
            });
        }
        Err(NbStatsError::ResponseTimeout { timeout, .. }) => {
            warn!(dpid = %dpid, ?timeout, "Timed out waiting for table statistics");
            return Err(NbStatsError::ResponseTimeout {
                operation: OPERATION,
                timeout,
            });
        }
        Err(e) => return Err(e),
    };

    let payload = response.expect_aux(AuxCommand::GetTableStats, TABLE_STATS_LEN, OPERATION)?;
    let stats = TableStatistics::decode(payload)?;
    if stats.datapath_id != dpid || stats.table_id != table {
        warn!(
            dpid = %dpid,
            reply_dpid = %stats.datapath_id,
            reply_table = %stats.table_id,
            "Table statistics for another switch or table"
        );
        return Err(NbStatsError::protocol(
            OPERATION,
            format!("reply for {} table {}", stats.datapath_id, stats.table_id),
        ));
    }
    Ok(stats)
}
