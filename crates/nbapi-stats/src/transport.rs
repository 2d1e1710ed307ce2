//! Framed stream implementation of [`StatsService`].
//!
//! Speaks the frame format of [`crate::wire`] over a Unix or TCP socket.
//!
//! | exchange | request | reply |
//! |----------|---------|-------|
//! | flow dump | `GetFlows { dpid }` | N × flow-info frames, then `Success` |
//! | rate-limit get | `GetRateLimit { dpid, is_rx, 0 }` | `GetRateLimit { dpid, is_rx, pps }` |
//! | rate-limit set | `SetRateLimit { dpid, is_rx, pps }` | `Success` |
//! | any | | `Failure { error_code }` |
//!
//! Every reply must carry the xid of the request it answers. Frames with any
//! other xid are left over from an abandoned request and are discarded.
//!
//! Reads are bounded by the socket read timeout. A timeout or a failed read
//! can leave part of a frame on the stream, after which frame boundaries are
//! lost. The service then marks itself out of sync: [`StatsService::is_usable`]
//! turns false and every later call fails with [`NbStatsError::Transport`]
//! until a new connection replaces it.

use crate::config::NbStatsConfig;
use crate::error::{NbResult, NbStatsError};
use crate::service::StatsService;
use crate::wire::{
    flow_dump_request, AuxCommand, Frame, RateLimitPayload, HEADER_LEN, MSG_AUX_CMD,
    MSG_FLOW_INFO, RATE_LIMIT_LEN,
};
use byteorder::{BigEndian, ByteOrder};
use nbapi_types::{DatapathId, RateDirection};
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
#[cfg(unix)]
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// A byte stream whose reads can be bounded in time.
pub trait Transport: Read + Write + Send + 'static {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
}

#[cfg(unix)]
impl Transport for UnixStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        UnixStream::set_read_timeout(self, timeout)
    }
}

impl Transport for TcpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }
}

struct Channel<T> {
    stream: T,
    /// Xid of the last `send`, answered by the next `wait_response`.
    awaiting: Option<u32>,
}

/// Switch-state service reached over a framed byte stream.
pub struct FramedService<T: Transport> {
    channel: Mutex<Channel<T>>,
    max_frame_len: usize,
    /// Bound for the service's own multi-frame conversations.
    response_timeout: Option<Duration>,
    next_xid: AtomicU32,
    out_of_sync: AtomicBool,
}

impl<T: Transport> std::fmt::Debug for FramedService<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedService")
            .field("max_frame_len", &self.max_frame_len)
            .field("response_timeout", &self.response_timeout)
            .field("out_of_sync", &self.out_of_sync.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<T: Transport> FramedService<T> {
    pub fn new(stream: T, max_frame_len: usize, response_timeout: Option<Duration>) -> Self {
        Self {
            channel: Mutex::new(Channel {
                stream,
                awaiting: None,
            }),
            max_frame_len,
            response_timeout,
            next_xid: AtomicU32::new(1),
            out_of_sync: AtomicBool::new(false),
        }
    }

    pub fn from_config(stream: T, config: &NbStatsConfig) -> Self {
        Self::new(
            stream,
            config.service.max_frame_len,
            config.exchange.response_timeout(),
        )
    }

    /// Refuses the call once the channel has lost frame boundaries.
    fn check_in_sync(&self, operation: &'static str) -> NbResult<()> {
        if self.out_of_sync.load(Ordering::Acquire) {
            debug!(operation, "Service channel out of sync");
            return Err(NbStatsError::Transport(io::Error::new(
                io::ErrorKind::NotConnected,
                "service channel out of sync, reconnect required",
            )));
        }
        Ok(())
    }

    /// Marks the channel unusable and hands `err` back.
    fn desync(&self, operation: &'static str, err: NbStatsError) -> NbStatsError {
        if !self.out_of_sync.swap(true, Ordering::AcqRel) {
            error!(operation, error = %err, "Service channel out of sync");
        }
        err
    }

    fn allocate_xid(&self) -> u32 {
        loop {
            let xid = self.next_xid.fetch_add(1, Ordering::Relaxed);
            if xid != 0 {
                return xid;
            }
        }
    }

    /// Writes `frame` under a fresh xid and returns the xid.
    fn write_request(
        &self,
        stream: &mut T,
        mut frame: Frame,
        operation: &'static str,
    ) -> NbResult<u32> {
        let xid = self.allocate_xid();
        frame.set_xid(xid);
        stream
            .write_all(frame.as_bytes())
            .and_then(|()| stream.flush())
            .map_err(|e| self.desync(operation, NbStatsError::Transport(e)))?;
        Ok(xid)
    }

    /// Reads one frame. `Ok(None)` means the service closed the channel.
    fn read_frame(
        &self,
        stream: &mut T,
        timeout: Option<Duration>,
        operation: &'static str,
    ) -> NbResult<Option<Frame>> {
        stream.set_read_timeout(timeout)?;

        let mut header = [0u8; HEADER_LEN];
        match stream.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                warn!(operation, "Service closed the channel");
                return Ok(None);
            }
            Err(e) => return Err(read_error(e)),
        }

        let length = usize::from(BigEndian::read_u16(&header[2..4]));
        if length < HEADER_LEN || length > self.max_frame_len {
            error!(operation, length, "Frame length out of range");
            return Err(NbStatsError::protocol(
                operation,
                format!("frame length {} out of range", length),
            ));
        }

        let mut buf = Vec::new();
        buf.try_reserve_exact(length)
            .map_err(|_| NbStatsError::AllocationFailure {
                what: "response frame",
            })?;
        buf.extend_from_slice(&header);
        buf.resize(length, 0);
        stream.read_exact(&mut buf[HEADER_LEN..]).map_err(read_error)?;

        Ok(Some(Frame::from_bytes(buf)))
    }

    /// Reads until a frame carrying `xid` arrives, discarding frames left
    /// over from earlier requests. `timeout` bounds the whole wait.
    ///
    /// Any failure other than a clean close leaves the channel out of sync.
    fn read_matching(
        &self,
        stream: &mut T,
        xid: u32,
        timeout: Option<Duration>,
        operation: &'static str,
    ) -> NbResult<Option<Frame>> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);

        loop {
            let remaining = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Err(self.desync(operation, timed_out(operation, timeout)));
                    }
                    Some(left)
                }
                None => None,
            };

            let frame = match self.read_frame(stream, remaining, operation) {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    self.out_of_sync.store(true, Ordering::Release);
                    return Ok(None);
                }
                Err(NbStatsError::ResponseTimeout { .. }) => {
                    return Err(self.desync(operation, timed_out(operation, timeout)));
                }
                Err(e) => return Err(self.desync(operation, e)),
            };

            let reply_xid = frame.header().map(|header| header.xid);
            if reply_xid == Some(xid) {
                return Ok(Some(frame));
            }
            warn!(operation, xid, ?reply_xid, "Discarding reply to another request");
        }
    }

    /// Reads the reply to `xid` under the configured response timeout.
    fn read_reply(&self, stream: &mut T, xid: u32, operation: &'static str) -> NbResult<Frame> {
        let reply = self
            .read_matching(stream, xid, self.response_timeout, operation)?
            .ok_or(NbStatsError::NoResponse { operation })?;

        if reply.is_aux(AuxCommand::Failure) {
            let code = reply.failure_code();
            warn!(operation, ?code, "Service reported failure");
            return Err(NbStatsError::ServiceRejected { operation, code });
        }
        Ok(reply)
    }

    /// Sends `request` and reads its single reply.
    fn exchange(&self, request: Frame, operation: &'static str) -> NbResult<Frame> {
        let mut channel = self.channel.lock();
        self.check_in_sync(operation)?;
        let xid = self.write_request(&mut channel.stream, request, operation)?;
        self.read_reply(&mut channel.stream, xid, operation)
    }
}

fn read_error(e: io::Error) -> NbStatsError {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => NbStatsError::ResponseTimeout {
            operation: "read_frame",
            timeout: Duration::ZERO,
        },
        _ => NbStatsError::Transport(e),
    }
}

fn timed_out(operation: &'static str, timeout: Option<Duration>) -> NbStatsError {
    warn!(operation, ?timeout, "Timed out waiting for service");
    NbStatsError::ResponseTimeout {
        operation,
        timeout: timeout.unwrap_or_default(),
    }
}

impl<T: Transport> StatsService for FramedService<T> {
    fn send(&self, frame: Frame) -> NbResult<()> {
        const OPERATION: &str = "send";

        let mut channel = self.channel.lock();
        self.check_in_sync(OPERATION)?;
        let xid = self.write_request(&mut channel.stream, frame, OPERATION)?;
        channel.awaiting = Some(xid);
        Ok(())
    }

    fn wait_response(&self, timeout: Option<Duration>) -> NbResult<Option<Frame>> {
        const OPERATION: &str = "wait_response";

        let mut channel = self.channel.lock();
        self.check_in_sync(OPERATION)?;
        let xid = channel
            .awaiting
            .take()
            .ok_or_else(|| NbStatsError::protocol(OPERATION, "no request outstanding"))?;
        self.read_matching(&mut channel.stream, xid, timeout, OPERATION)
    }

    fn is_usable(&self) -> bool {
        !self.out_of_sync.load(Ordering::Acquire)
    }

    #[instrument(skip_all, fields(dpid = %dpid))]
    fn dump_flows(&self, dpid: DatapathId, sink: &mut dyn FnMut(&[u8])) -> NbResult<usize> {
        const OPERATION: &str = "flow_dump";

        let mut channel = self.channel.lock();
        self.check_in_sync(OPERATION)?;
        let xid = self.write_request(&mut channel.stream, flow_dump_request(dpid)?, OPERATION)?;

        let mut count = 0;
        loop {
            let frame = self.read_reply(&mut channel.stream, xid, OPERATION)?;
            match frame.msg_type() {
                Some(MSG_FLOW_INFO) => {
                    sink(frame.body());
                    count += 1;
                }
                Some(MSG_AUX_CMD) if frame.is_aux(AuxCommand::Success) => break,
                _ => {
                    error!(dpid = %dpid, ?frame, "Unexpected frame in flow dump");
                    return Err(NbStatsError::protocol(
                        OPERATION,
                        format!("unexpected frame {:?}", frame),
                    ));
                }
            }
        }

        debug!(count, "Flow dump complete");
        Ok(count)
    }

    fn get_pkt_rate_limit(&self, dpid: DatapathId, direction: RateDirection) -> NbResult<u32> {
        const OPERATION: &str = "get_rate_limit";

        let request = RateLimitPayload {
            dpid,
            direction,
            pps: 0,
        }
        .to_frame(AuxCommand::GetRateLimit)?;
        let reply = self.exchange(request, OPERATION)?;

        let payload = reply.expect_aux(AuxCommand::GetRateLimit, RATE_LIMIT_LEN, OPERATION)?;
        let limit = RateLimitPayload::decode(payload)
            .filter(|limit| limit.dpid == dpid && limit.direction == direction)
            .ok_or_else(|| {
                warn!(dpid = %dpid, %direction, "Rate-limit reply for another switch or direction");
                NbStatsError::protocol(
                    OPERATION,
                    format!("reply does not match {} {}", dpid, direction),
                )
            })?;
        Ok(limit.pps)
    }

    fn set_pkt_rate_limit(
        &self,
        dpid: DatapathId,
        pps: u32,
        direction: RateDirection,
    ) -> NbResult<()> {
        const OPERATION: &str = "set_rate_limit";

        let request = RateLimitPayload {
            dpid,
            direction,
            pps,
        }
        .to_frame(AuxCommand::SetRateLimit)?;
        let reply = self.exchange(request, OPERATION)?;

        reply.expect_aux(AuxCommand::Success, 0, OPERATION)?;
        Ok(())
    }
}

#[cfg(unix)]
impl FramedService<UnixStream> {
    /// Connects to a service listening on a Unix socket.
    pub fn connect_unix(path: impl AsRef<Path>, config: &NbStatsConfig) -> NbResult<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to connect to service");
            e
        })?;
        info!(path = %path.display(), "Connected to switch-state service");
        Ok(Self::from_config(stream, config))
    }
}

impl FramedService<TcpStream> {
    /// Connects to a service listening on TCP, trying every resolved address.
    pub fn connect_tcp(addr: &str, config: &NbStatsConfig) -> NbResult<Self> {
        let timeout = config.service.connect_timeout();
        let mut last_err = None;

        for sock_addr in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&sock_addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    info!(addr = %sock_addr, "Connected to switch-state service");
                    return Ok(Self::from_config(stream, config));
                }
                Err(e) => {
                    warn!(addr = %sock_addr, error = %e, "Connection attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(e) => NbStatsError::Transport(e),
            None => NbStatsError::config(format!("{} resolved to no addresses", addr)),
        })
    }
}

/// Connects to the service endpoint named in `config`.
pub fn connect(config: &NbStatsConfig) -> NbResult<Arc<dyn StatsService>> {
    if let Some(path) = &config.service.unix_path {
        #[cfg(unix)]
        return Ok(Arc::new(FramedService::connect_unix(path, config)?));
        #[cfg(not(unix))]
        return Err(NbStatsError::config(format!(
            "unix sockets unsupported: {}",
            path.display()
        )));
    }

    if let Some(addr) = &config.service.tcp_addr {
        return Ok(Arc::new(FramedService::connect_tcp(addr, config)?));
    }

    Err(NbStatsError::config("no service endpoint configured"))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::thread;

    fn pair(timeout: Option<Duration>) -> (FramedService<UnixStream>, UnixStream) {
        let (client, server) = UnixStream::pair().unwrap();
        (FramedService::new(client, 4096, timeout), server)
    }

    fn read_request(server: &mut UnixStream) -> Frame {
        let mut header = [0u8; HEADER_LEN];
        server.read_exact(&mut header).unwrap();
        let len = usize::from(BigEndian::read_u16(&header[2..4]));
        let mut buf = header.to_vec();
        buf.resize(len, 0);
        server.read_exact(&mut buf[HEADER_LEN..]).unwrap();
        Frame::from_bytes(buf)
    }

    fn answer(server: &mut UnixStream, request: &Frame, mut reply: Frame) {
        reply.set_xid(request.header().unwrap().xid);
        server.write_all(reply.as_bytes()).unwrap();
    }

    fn table_request() -> Frame {
        Frame::aux_command(AuxCommand::GetTableStats, 32).unwrap()
    }

    #[test]
    fn test_send_assigns_increasing_xids() {
        let (service, mut server) = pair(None);

        service.send(Frame::aux_command(AuxCommand::Success, 0).unwrap()).unwrap();
        service.send(Frame::aux_command(AuxCommand::Success, 0).unwrap()).unwrap();

        let first = read_request(&mut server).header().unwrap().xid;
        let second = read_request(&mut server).header().unwrap().xid;
        assert_eq!(second, first + 1);
    }

    #[test]
    fn test_wait_response_reads_whole_frame() {
        let (service, mut server) = pair(None);
        service.send(table_request()).unwrap();
        let request = read_request(&mut server);
        let mut reply = Frame::aux_command(AuxCommand::GetTableStats, 32).unwrap();
        reply.aux_payload_mut()[0] = 0xab;
        answer(&mut server, &request, reply.clone());

        let received = service.wait_response(None).unwrap().unwrap();
        reply.set_xid(request.header().unwrap().xid);
        assert_eq!(received.as_bytes(), reply.as_bytes());
    }

    #[test]
    fn test_wait_response_skips_frames_for_other_requests() {
        let (service, mut server) = pair(None);
        service.send(table_request()).unwrap();
        let request = read_request(&mut server);
        let xid = request.header().unwrap().xid;

        let mut stale = Frame::aux_command(AuxCommand::GetTableStats, 32).unwrap();
        stale.set_xid(xid.wrapping_sub(1));
        stale.aux_payload_mut()[8] = 1;
        server.write_all(stale.as_bytes()).unwrap();
        let mut current = Frame::aux_command(AuxCommand::GetTableStats, 32).unwrap();
        current.aux_payload_mut()[8] = 2;
        answer(&mut server, &request, current);

        let received = service.wait_response(None).unwrap().unwrap();
        assert_eq!(received.header().unwrap().xid, xid);
        assert_eq!(received.aux_payload()[8], 2);
        assert!(service.is_usable());
    }

    #[test]
    fn test_wait_response_without_request() {
        let (service, _server) = pair(None);
        let err = service.wait_response(None).unwrap_err();
        assert!(matches!(err, NbStatsError::ProtocolError { .. }));
    }

    #[test]
    fn test_wait_response_on_closed_channel() {
        let (service, server) = pair(None);
        service.send(table_request()).unwrap();
        drop(server);
        assert!(service.wait_response(None).unwrap().is_none());
        assert!(!service.is_usable());
    }

    #[test]
    fn test_timeout_leaves_channel_unusable() {
        let (service, mut server) = pair(None);
        service.send(table_request()).unwrap();
        let err = service
            .wait_response(Some(Duration::from_millis(20)))
            .unwrap_err();
        assert!(matches!(
            err,
            NbStatsError::ResponseTimeout {
                operation: "wait_response",
                ..
            }
        ));
        assert!(!service.is_usable());

        // The late reply is never read as the answer to a later request.
        let request = read_request(&mut server);
        answer(&mut server, &request, table_request());
        let err = service.send(table_request()).unwrap_err();
        assert!(matches!(err, NbStatsError::Transport(_)));
        let err = service
            .get_pkt_rate_limit(DatapathId::new(1), RateDirection::Receive)
            .unwrap_err();
        assert!(matches!(err, NbStatsError::Transport(_)));
    }

    #[test]
    fn test_oversized_frame_is_rejected() {
        let (service, mut server) = pair(None);
        service.send(table_request()).unwrap();
        let mut header = [0u8; HEADER_LEN];
        header[1] = MSG_AUX_CMD;
        BigEndian::write_u16(&mut header[2..4], 8000);
        server.write_all(&header).unwrap();

        let err = service.wait_response(None).unwrap_err();
        assert!(matches!(err, NbStatsError::ProtocolError { .. }));
        assert!(!service.is_usable());
    }

    #[test]
    fn test_rate_limit_reply_for_other_direction() {
        let (service, mut server) = pair(Some(Duration::from_secs(5)));
        let peer = thread::spawn(move || {
            let request = read_request(&mut server);
            let mut limit = RateLimitPayload::decode(request.aux_payload()).unwrap();
            limit.direction = RateDirection::Receive;
            limit.pps = 4000;
            answer(&mut server, &request, limit.to_frame(AuxCommand::GetRateLimit).unwrap());
        });

        let err = service
            .get_pkt_rate_limit(DatapathId::new(1), RateDirection::Transmit)
            .unwrap_err();
        peer.join().unwrap();

        assert!(matches!(err, NbStatsError::ProtocolError { .. }));
    }

    #[test]
    fn test_set_rate_limit_ignores_success_for_other_request() {
        let (service, mut server) = pair(Some(Duration::from_millis(100)));
        let peer = thread::spawn(move || {
            let request = read_request(&mut server);
            let mut success = Frame::aux_command(AuxCommand::Success, 0).unwrap();
            success.set_xid(request.header().unwrap().xid.wrapping_add(7));
            server.write_all(success.as_bytes()).unwrap();
            server
        });

        let err = service
            .set_pkt_rate_limit(DatapathId::new(1), 10, RateDirection::Receive)
            .unwrap_err();
        drop(peer.join().unwrap());

        assert!(matches!(
            err,
            NbStatsError::ResponseTimeout {
                operation: "set_rate_limit",
                ..
            }
        ));
    }

    #[test]
    fn test_set_rate_limit_failure_reply() {
        let (service, mut server) = pair(Some(Duration::from_secs(5)));
        let peer = thread::spawn(move || {
            let request = read_request(&mut server);
            assert!(request.is_aux(AuxCommand::SetRateLimit));
            let mut reply = Frame::aux_command(AuxCommand::Failure, 4).unwrap();
            BigEndian::write_u32(reply.aux_payload_mut(), 7);
            answer(&mut server, &request, reply);
        });

        let err = service
            .set_pkt_rate_limit(DatapathId::new(1), 10, RateDirection::Receive)
            .unwrap_err();
        peer.join().unwrap();

        assert!(matches!(
            err,
            NbStatsError::ServiceRejected {
                code: Some(7),
                ..
            }
        ));
        assert!(service.is_usable());
    }

    #[test]
    fn test_connect_without_endpoint() {
        let err = connect(&NbStatsConfig::default()).err().expect("expected error");
        assert!(matches!(err, NbStatsError::Config(_)));
    }
}
