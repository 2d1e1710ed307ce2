//! Frame codec for the controller ↔ switch-state service channel.
//!
//! Every message starts with an 8-byte header:
//!
//! ```text
//! +---------+---------+-------------------+---------------------------+
//! | version | type    | length (u16, BE)  | xid (u32, BE)             |
//! +---------+---------+-------------------+---------------------------+
//! ```
//!
//! Auxiliary commands follow the header with a 32-bit command code and four
//! bytes of padding, then the command payload. All multi-byte fields are
//! big-endian on the wire.

use crate::error::{NbResult, NbStatsError};
use byteorder::{BigEndian, ByteOrder};
use nbapi_types::{DatapathId, RateDirection};
use std::fmt;
use tracing::error;

/// Protocol version written into every header.
pub const WIRE_VERSION: u8 = 0x04;

/// Size of the common header.
pub const HEADER_LEN: usize = 8;

/// Size of the header plus the auxiliary command code and padding.
pub const AUX_HEADER_LEN: usize = HEADER_LEN + 8;

/// Largest frame the 16-bit length field can describe.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Message type: one flow-info record.
pub const MSG_FLOW_INFO: u8 = 0xc4;

/// Message type: auxiliary command.
pub const MSG_AUX_CMD: u8 = 0xc8;

/// Auxiliary command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AuxCommand {
    Success = 0x00,
    Failure = 0x01,
    GetFlows = 0x20,
    SetRateLimit = 0x30,
    GetRateLimit = 0x31,
    GetTableStats = 0x42,
}

impl AuxCommand {
    /// Creates a command from its raw code.
    pub fn from_raw(code: u32) -> Option<Self> {
        match code {
            0x00 => Some(AuxCommand::Success),
            0x01 => Some(AuxCommand::Failure),
            0x20 => Some(AuxCommand::GetFlows),
            0x30 => Some(AuxCommand::SetRateLimit),
            0x31 => Some(AuxCommand::GetRateLimit),
            0x42 => Some(AuxCommand::GetTableStats),
            _ => None,
        }
    }

    pub const fn code(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for AuxCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:#x})", self, self.code())
    }
}

/// Decoded common header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub msg_type: u8,
    pub length: u16,
    pub xid: u32,
}

impl FrameHeader {
    /// Decodes a header from the first [`HEADER_LEN`] bytes.
    pub fn decode(raw: &[u8]) -> Option<Self> {
        if raw.len() < HEADER_LEN {
            return None;
        }
        Some(Self {
            version: raw[0],
            msg_type: raw[1],
            length: BigEndian::read_u16(&raw[2..4]),
            xid: BigEndian::read_u32(&raw[4..8]),
        })
    }

    fn encode_into(&self, out: &mut [u8]) {
        out[0] = self.version;
        out[1] = self.msg_type;
        BigEndian::write_u16(&mut out[2..4], self.length);
        BigEndian::write_u32(&mut out[4..8], self.xid);
    }
}

/// One owned message buffer.
///
/// Buffers are released when the `Frame` is dropped, on every path.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    buf: Vec<u8>,
}

impl Frame {
    /// Allocates a zeroed frame of type `msg_type` with room for `body_len`
    /// bytes after the header, and writes the header.
    pub fn new(msg_type: u8, body_len: usize) -> NbResult<Self> {
        let total = HEADER_LEN + body_len;
        let length = u16::try_from(total).map_err(|_| {
            NbStatsError::protocol("frame_alloc", format!("frame of {} bytes too large", total))
        })?;

        let mut buf = Vec::new();
        buf.try_reserve_exact(total)
            .map_err(|_| NbStatsError::AllocationFailure { what: "frame" })?;
        buf.resize(total, 0);

        FrameHeader {
            version: WIRE_VERSION,
            msg_type,
            length,
            xid: 0,
        }
        .encode_into(&mut buf[..HEADER_LEN]);

        Ok(Self { buf })
    }

    /// Allocates an auxiliary command frame with a zeroed payload.
    pub fn aux_command(command: AuxCommand, payload_len: usize) -> NbResult<Self> {
        let mut frame = Self::new(MSG_AUX_CMD, AUX_HEADER_LEN - HEADER_LEN + payload_len)?;
        BigEndian::write_u32(&mut frame.buf[HEADER_LEN..HEADER_LEN + 4], command.code());
        Ok(frame)
    }

    /// Wraps bytes received from the transport. No validation is done here.
    pub fn from_bytes(buf: Vec<u8>) -> Self {
        Self { buf }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn header(&self) -> Option<FrameHeader> {
        FrameHeader::decode(&self.buf)
    }

    pub fn msg_type(&self) -> Option<u8> {
        self.buf.get(1).copied()
    }

    /// Sets the transaction id in the header.
    pub fn set_xid(&mut self, xid: u32) {
        if self.buf.len() >= HEADER_LEN {
            BigEndian::write_u32(&mut self.buf[4..8], xid);
        }
    }

    /// Everything after the common header.
    pub fn body(&self) -> &[u8] {
        self.buf.get(HEADER_LEN..).unwrap_or(&[])
    }

    pub fn body_mut(&mut self) -> &mut [u8] {
        self.buf.get_mut(HEADER_LEN..).unwrap_or(&mut [])
    }

    /// The raw auxiliary command code, if the frame is long enough to hold one.
    pub fn command_code(&self) -> Option<u32> {
        self.buf
            .get(HEADER_LEN..HEADER_LEN + 4)
            .map(BigEndian::read_u32)
    }

    /// Everything after the auxiliary command header.
    pub fn aux_payload(&self) -> &[u8] {
        self.buf.get(AUX_HEADER_LEN..).unwrap_or(&[])
    }

    pub fn aux_payload_mut(&mut self) -> &mut [u8] {
        self.buf.get_mut(AUX_HEADER_LEN..).unwrap_or(&mut [])
    }

    /// Returns true if this is an auxiliary command frame carrying `command`.
    pub fn is_aux(&self, command: AuxCommand) -> bool {
        self.msg_type() == Some(MSG_AUX_CMD) && self.command_code() == Some(command.code())
    }

    /// Validates an auxiliary command response and returns its payload.
    ///
    /// The frame must be of type [`MSG_AUX_CMD`], its declared length must
    /// cover the auxiliary header plus `payload_len`, the received bytes must
    /// cover the same, and the command code must equal `expected`.
    pub fn expect_aux(
        &self,
        expected: AuxCommand,
        payload_len: usize,
        operation: &'static str,
    ) -> NbResult<&[u8]> {
        let required = AUX_HEADER_LEN + payload_len;
        let reject = |reason: String| {
            error!(operation, %reason, "Response validation failed");
            NbStatsError::protocol(operation, reason)
        };

        let header = self
            .header()
            .ok_or_else(|| reject(format!("short frame of {} bytes", self.len())))?;

        if header.msg_type != MSG_AUX_CMD {
            return Err(reject(format!(
                "unexpected message type {:#x}",
                header.msg_type
            )));
        }
        if usize::from(header.length) < required {
            return Err(reject(format!(
                "declared length {} below required {}",
                header.length, required
            )));
        }
        if self.len() < required {
            return Err(reject(format!(
                "received {} bytes, required {}",
                self.len(),
                required
            )));
        }

        let code = self.command_code().unwrap_or_default();
        if code != expected.code() {
            return Err(reject(format!(
                "command code {:#x} does not match {}",
                code, expected
            )));
        }

        Ok(&self.aux_payload()[..payload_len])
    }

    /// The error code carried by a failure response, if any.
    pub fn failure_code(&self) -> Option<u32> {
        self.aux_payload().get(..4).map(BigEndian::read_u32)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("header", &self.header())
            .field("command_code", &self.command_code())
            .field("len", &self.buf.len())
            .finish()
    }
}

/// Size of the flow dump request payload.
pub const DPID_REQUEST_LEN: usize = 8;

/// Builds a "dump all flows" request for one switch.
pub fn flow_dump_request(dpid: DatapathId) -> NbResult<Frame> {
    let mut frame = Frame::aux_command(AuxCommand::GetFlows, DPID_REQUEST_LEN)?;
    BigEndian::write_u64(&mut frame.aux_payload_mut()[..8], dpid.as_u64());
    Ok(frame)
}

/// Size of the rate-limit payload.
pub const RATE_LIMIT_LEN: usize = 16;

/// Rate-limit get/set payload: `{ datapath_id u64, is_rx u32, pps u32 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPayload {
    pub dpid: DatapathId,
    pub direction: RateDirection,
    pub pps: u32,
}

impl RateLimitPayload {
    pub fn encode_into(&self, out: &mut [u8]) {
        BigEndian::write_u64(&mut out[0..8], self.dpid.as_u64());
        BigEndian::write_u32(&mut out[8..12], u32::from(self.direction.is_rx()));
        BigEndian::write_u32(&mut out[12..16], self.pps);
    }

    pub fn decode(raw: &[u8]) -> Option<Self> {
        if raw.len() < RATE_LIMIT_LEN {
            return None;
        }
        let direction = if BigEndian::read_u32(&raw[8..12]) != 0 {
            RateDirection::Receive
        } else {
            RateDirection::Transmit
        };
        Some(Self {
            dpid: DatapathId::new(BigEndian::read_u64(&raw[0..8])),
            direction,
            pps: BigEndian::read_u32(&raw[12..16]),
        })
    }

    /// Builds a framed rate-limit command.
    pub fn to_frame(&self, command: AuxCommand) -> NbResult<Frame> {
        let mut frame = Frame::aux_command(command, RATE_LIMIT_LEN)?;
        self.encode_into(frame.aux_payload_mut());
        Ok(frame)
    }
}
