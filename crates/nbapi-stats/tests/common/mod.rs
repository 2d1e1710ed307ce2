//! Shared fixtures for the nbapi-stats integration tests.

#![allow(dead_code)]

use nbapi_stats::{
    FlowRecord, KnownSwitches, NbResult, NbStatsApi, NbStatsConfig, NbStatsError, ServiceHandle,
    StatsService,
};
use nbapi_stats::wire::Frame;
use nbapi_types::{DatapathId, PortNo, RateDirection};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The switch every fixture registers.
pub const KNOWN_SWITCH: DatapathId = DatapathId::new(0x1);

/// In-memory switch-state service.
///
/// Serves flows per switch, answers `wait_response` from a scripted queue,
/// keeps every frame it is sent and stores rate limits.
#[derive(Default)]
pub struct MockService {
    flows: Mutex<HashMap<DatapathId, Vec<FlowRecord>>>,
    responses: Mutex<VecDeque<Option<Frame>>>,
    sent: Mutex<Vec<Frame>>,
    limits: Mutex<HashMap<(DatapathId, RateDirection), u32>>,
    reject_rate_limits: AtomicBool,
    calls: AtomicUsize,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_flow(&self, record: FlowRecord) {
        self.flows
            .lock()
            .entry(record.datapath_id)
            .or_default()
            .push(record);
    }

    /// Queues the next answer to `wait_response`; `None` means "no response".
    pub fn queue_response(&self, frame: Option<Frame>) {
        self.responses.lock().push_back(frame);
    }

    pub fn sent_frames(&self) -> Vec<Frame> {
        self.sent.lock().clone()
    }

    pub fn stored_limit(&self, dpid: DatapathId, direction: RateDirection) -> Option<u32> {
        self.limits.lock().get(&(dpid, direction)).copied()
    }

    pub fn reject_rate_limits(&self, reject: bool) {
        self.reject_rate_limits.store(reject, Ordering::SeqCst);
    }

    /// Total number of calls made into the service.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn called(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl StatsService for MockService {
    fn send(&self, frame: Frame) -> NbResult<()> {
        self.called();
        self.sent.lock().push(frame);
        Ok(())
    }

    fn wait_response(&self, _timeout: Option<Duration>) -> NbResult<Option<Frame>> {
        self.called();
        Ok(self.responses.lock().pop_front().flatten())
    }

    fn dump_flows(&self, dpid: DatapathId, sink: &mut dyn FnMut(&[u8])) -> NbResult<usize> {
        self.called();
        let flows = self.flows.lock().get(&dpid).cloned().unwrap_or_default();
        for record in &flows {
            let mut raw = Vec::new();
            record.write_to(&mut raw)?;
            sink(&raw);
        }
        Ok(flows.len())
    }

    fn get_pkt_rate_limit(&self, dpid: DatapathId, direction: RateDirection) -> NbResult<u32> {
        self.called();
        if self.reject_rate_limits.load(Ordering::SeqCst) {
            return Err(NbStatsError::ServiceRejected {
                operation: "get_rate_limit",
                code: Some(1),
            });
        }
        Ok(self.stored_limit(dpid, direction).unwrap_or(0))
    }

    fn set_pkt_rate_limit(
        &self,
        dpid: DatapathId,
        pps: u32,
        direction: RateDirection,
    ) -> NbResult<()> {
        self.called();
        if self.reject_rate_limits.load(Ordering::SeqCst) {
            return Err(NbStatsError::ServiceRejected {
                operation: "set_rate_limit",
                code: Some(1),
            });
        }
        self.limits.lock().insert((dpid, direction), pps);
        Ok(())
    }
}

/// An API wired to a mock service, with [`KNOWN_SWITCH`] registered.
pub struct TestSetup {
    pub api: NbStatsApi,
    pub service: Arc<MockService>,
    pub registry: Arc<KnownSwitches>,
}

impl TestSetup {
    pub fn new() -> Self {
        let service = Arc::new(MockService::new());
        let registry = Arc::new(KnownSwitches::new());
        registry.switch_added(KNOWN_SWITCH);

        let handle = Arc::new(ServiceHandle::new());
        handle.attach(service.clone());

        let api = NbStatsApi::new(handle, registry.clone(), NbStatsConfig::default());
        Self {
            api,
            service,
            registry,
        }
    }

    /// Same wiring, but with no service attached.
    pub fn detached() -> Self {
        let setup = Self::new();
        setup.api.handle().detach();
        setup
    }
}

/// A flow on `dpid` from `in_port` to `out_port` at the given rates.
pub fn flow(dpid: DatapathId, in_port: u32, out_port: u32, bps: &str, pps: &str) -> FlowRecord {
    FlowRecord::new(dpid)
        .with_ports(PortNo::new(in_port), PortNo::new(out_port))
        .with_rates(bps, pps)
}
