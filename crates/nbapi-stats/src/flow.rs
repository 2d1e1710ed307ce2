//! Flow records as reported by a switch, and the per-query collection
//! that holds them.
//!
//! A flow-info record is a fixed 144-byte structure with every multi-byte
//! field in network byte order:
//!
//! ```text
//! offset  field            offset  field
//!   0     datapath_id u64    44    tp_src u16
//!   8     sw_alias u32       46    tp_dst u16
//!  12     flags u32          48    nw_src u32
//!  16     priority u16       52    nw_dst u32
//!  18     table_id u8        56    byte_count u64
//!  19     nw_proto u8        64    packet_count u64
//!  20     in_port u32        72    duration_sec u32
//!  24     out_port u32       76    duration_nsec u32
//!  28     dl_vlan u16        80    bps [32]
//!  30     dl_type u16       112    pps [32]
//!  32     dl_dst [6]
//!  38     dl_src [6]
//! ```

use crate::error::{NbResult, NbStatsError};
use crate::rate::{RateText, RATE_TEXT_LEN};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use nbapi_types::{DatapathId, PortNo, TableId};
use serde::Serialize;
use std::io::{self, Cursor, Read, Write};
use std::net::Ipv4Addr;

/// Size of one flow-info record on the wire.
pub const FLOW_INFO_LEN: usize = 144;

/// Match fields of a flow. Carried through unexamined except `in_port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlowMatch {
    pub in_port: PortNo,
    pub dl_dst: [u8; 6],
    pub dl_src: [u8; 6],
    pub dl_vlan: u16,
    pub dl_type: u16,
    pub nw_proto: u8,
    pub nw_src: Ipv4Addr,
    pub nw_dst: Ipv4Addr,
    pub tp_src: u16,
    pub tp_dst: u16,
}

impl Default for FlowMatch {
    fn default() -> Self {
        Self {
            in_port: PortNo::new(0),
            dl_dst: [0; 6],
            dl_src: [0; 6],
            dl_vlan: 0,
            dl_type: 0,
            nw_proto: 0,
            nw_src: Ipv4Addr::UNSPECIFIED,
            nw_dst: Ipv4Addr::UNSPECIFIED,
            tp_src: 0,
            tp_dst: 0,
        }
    }
}

/// One flow entry, in host byte order.
///
/// Records are decoded exactly once, when they are captured from the
/// service, and are immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowRecord {
    pub datapath_id: DatapathId,
    pub sw_alias: u32,
    pub flags: u32,
    pub priority: u16,
    pub table_id: TableId,
    pub flow: FlowMatch,
    pub out_port: PortNo,
    pub byte_count: u64,
    pub packet_count: u64,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub bps: RateText,
    pub pps: RateText,
}

impl FlowRecord {
    /// Creates an empty record for `datapath_id`.
    pub fn new(datapath_id: DatapathId) -> Self {
        Self {
            datapath_id,
            sw_alias: 0,
            flags: 0,
            priority: 0,
            table_id: TableId::default(),
            flow: FlowMatch::default(),
            out_port: PortNo::new(0),
            byte_count: 0,
            packet_count: 0,
            duration_sec: 0,
            duration_nsec: 0,
            bps: RateText::EMPTY,
            pps: RateText::EMPTY,
        }
    }

    /// Sets the input and output ports.
    pub fn with_ports(mut self, in_port: PortNo, out_port: PortNo) -> Self {
        self.flow.in_port = in_port;
        self.out_port = out_port;
        self
    }

    /// Sets the byte-rate and packet-rate text.
    pub fn with_rates(mut self, bps: &str, pps: &str) -> Self {
        self.bps = RateText::from_text(bps);
        self.pps = RateText::from_text(pps);
        self
    }

    pub fn in_port(&self) -> PortNo {
        self.flow.in_port
    }

    /// Returns true if traffic of this flow enters or leaves through `port`.
    pub fn touches_port(&self, port: PortNo) -> bool {
        self.flow.in_port == port || self.out_port == port
    }

    /// Decodes a raw record received from the service.
    pub fn decode(raw: &[u8]) -> NbResult<Self> {
        if raw.len() < FLOW_INFO_LEN {
            return Err(NbStatsError::protocol(
                "flow_dump",
                format!(
                    "flow record of {} bytes, expected {}",
                    raw.len(),
                    FLOW_INFO_LEN
                ),
            ));
        }
        Self::read_from(&mut Cursor::new(raw))
            .map_err(|e| NbStatsError::protocol("flow_dump", e.to_string()))
    }

    fn read_from<R: Read>(rdr: &mut R) -> io::Result<Self> {
        let datapath_id = DatapathId::new(rdr.read_u64::<BigEndian>()?);
        let sw_alias = rdr.read_u32::<BigEndian>()?;
        let flags = rdr.read_u32::<BigEndian>()?;
        let priority = rdr.read_u16::<BigEndian>()?;
        let table_id = TableId::new(rdr.read_u8()?);
        let nw_proto = rdr.read_u8()?;
        let in_port = PortNo::new(rdr.read_u32::<BigEndian>()?);
        let out_port = PortNo::new(rdr.read_u32::<BigEndian>()?);
        let dl_vlan = rdr.read_u16::<BigEndian>()?;
        let dl_type = rdr.read_u16::<BigEndian>()?;
        let mut dl_dst = [0u8; 6];
        rdr.read_exact(&mut dl_dst)?;
        let mut dl_src = [0u8; 6];
        rdr.read_exact(&mut dl_src)?;
        let tp_src = rdr.read_u16::<BigEndian>()?;
        let tp_dst = rdr.read_u16::<BigEndian>()?;
        let nw_src = Ipv4Addr::from(rdr.read_u32::<BigEndian>()?);
        let nw_dst = Ipv4Addr::from(rdr.read_u32::<BigEndian>()?);
        let byte_count = rdr.read_u64::<BigEndian>()?;
        let packet_count = rdr.read_u64::<BigEndian>()?;
        let duration_sec = rdr.read_u32::<BigEndian>()?;
        let duration_nsec = rdr.read_u32::<BigEndian>()?;
        let mut bps = [0u8; RATE_TEXT_LEN];
        rdr.read_exact(&mut bps)?;
        let mut pps = [0u8; RATE_TEXT_LEN];
        rdr.read_exact(&mut pps)?;

        Ok(Self {
            datapath_id,
            sw_alias,
            flags,
            priority,
            table_id,
            flow: FlowMatch {
                in_port,
                dl_dst,
                dl_src,
                dl_vlan,
                dl_type,
                nw_proto,
                nw_src,
                nw_dst,
                tp_src,
                tp_dst,
            },
            out_port,
            byte_count,
            packet_count,
            duration_sec,
            duration_nsec,
            bps: RateText::from_wire(&bps),
            pps: RateText::from_wire(&pps),
        })
    }

    /// Encodes the record back into network byte order.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u64::<BigEndian>(self.datapath_id.as_u64())?;
        w.write_u32::<BigEndian>(self.sw_alias)?;
        w.write_u32::<BigEndian>(self.flags)?;
        w.write_u16::<BigEndian>(self.priority)?;
        w.write_u8(self.table_id.as_u8())?;
        w.write_u8(self.flow.nw_proto)?;
        w.write_u32::<BigEndian>(self.flow.in_port.as_u32())?;
        w.write_u32::<BigEndian>(self.out_port.as_u32())?;
        w.write_u16::<BigEndian>(self.flow.dl_vlan)?;
        w.write_u16::<BigEndian>(self.flow.dl_type)?;
        w.write_all(&self.flow.dl_dst)?;
        w.write_all(&self.flow.dl_src)?;
        w.write_u16::<BigEndian>(self.flow.tp_src)?;
        w.write_u16::<BigEndian>(self.flow.tp_dst)?;
        w.write_u32::<BigEndian>(u32::from(self.flow.nw_src))?;
        w.write_u32::<BigEndian>(u32::from(self.flow.nw_dst))?;
        w.write_u64::<BigEndian>(self.byte_count)?;
        w.write_u64::<BigEndian>(self.packet_count)?;
        w.write_u32::<BigEndian>(self.duration_sec)?;
        w.write_u32::<BigEndian>(self.duration_nsec)?;
        w.write_all(self.bps.as_bytes())?;
        w.write_all(self.pps.as_bytes())
    }
}

/// Ordered flow records collected for one query.
///
/// The count is always the number of records held. The count the service
/// itself reported is kept separately for diagnostics only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlowRecordCollection {
    records: Vec<FlowRecord>,
    #[serde(skip)]
    reported_count: Option<usize>,
}

impl FlowRecordCollection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty collection with room for `capacity` records.
    pub fn with_capacity(capacity: usize) -> NbResult<Self> {
        let mut records = Vec::new();
        records
            .try_reserve(capacity)
            .map_err(|_| NbStatsError::AllocationFailure { what: "flow records" })?;
        Ok(Self {
            records,
            reported_count: None,
        })
    }

    /// Appends a record, preserving arrival order.
    pub fn push(&mut self, record: FlowRecord) -> NbResult<()> {
        self.records
            .try_reserve(1)
            .map_err(|_| NbStatsError::AllocationFailure { what: "flow record" })?;
        self.records.push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FlowRecord> {
        self.records.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FlowRecord> {
        self.records.iter()
    }

    /// The number of flows the service said it sent, if known.
    pub fn reported_count(&self) -> Option<usize> {
        self.reported_count
    }

    pub(crate) fn set_reported_count(&mut self, count: usize) {
        self.reported_count = Some(count);
    }

    pub fn into_records(self) -> Vec<FlowRecord> {
        self.records
    }
}

impl IntoIterator for FlowRecordCollection {
    type Item = FlowRecord;
    type IntoIter = std::vec::IntoIter<FlowRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a FlowRecordCollection {
    type Item = &'a FlowRecord;
    type IntoIter = std::slice::Iter<'a, FlowRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl FromIterator<FlowRecord> for FlowRecordCollection {
    fn from_iter<I: IntoIterator<Item = FlowRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
            reported_count: None,
        }
    }
}
