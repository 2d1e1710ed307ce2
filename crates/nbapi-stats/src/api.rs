//! Northbound entry points.
//!
//! [`NbStatsApi`] bundles the service handle, the switch registry and the
//! configuration, and picks the lock mode of every operation:
//!
//! | operation | lock | no service attached |
//! |-----------|------|---------------------|
//! | [`switch_statistics_all`](NbStatsApi::switch_statistics_all) | write | empty collection |
//! | [`switch_statistics_port`](NbStatsApi::switch_statistics_port) | read | `ServiceUnavailable` |
//! | [`table_stats`](NbStatsApi::table_stats) | read | `ServiceUnavailable` |
//! | rate-limit reads | read | `ServiceUnavailable` |
//! | rate-limit writes | write | `ServiceUnavailable` |
//!
//! When a call fails and leaves the service unusable, the service is
//! detached. Later calls see no service until [`NbStatsApi::connect`] or an
//! explicit attach supplies a new one.

use crate::aggregator::{aggregate_port, PortStatistics};
use crate::collector::collect_flows;
use crate::config::NbStatsConfig;
use crate::error::{NbResult, NbStatsError};
use crate::exchange::{request_table_stats, TableStatistics};
use crate::flow::FlowRecordCollection;
use crate::rate::rate_to_string;
use crate::rate_limit::RateLimitController;
use crate::registry::SwitchRegistry;
use crate::service::{global_handle, ServiceHandle};
use crate::transport;
use nbapi_types::{DatapathId, PortNo, RateDirection, TableId};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Statistics and rate-limit queries for external callers.
pub struct NbStatsApi {
    handle: Arc<ServiceHandle>,
    rate_limits: RateLimitController,
    config: NbStatsConfig,
}

impl std::fmt::Debug for NbStatsApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NbStatsApi")
            .field("handle", &self.handle)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl NbStatsApi {
    pub fn new(
        handle: Arc<ServiceHandle>,
        registry: Arc<dyn SwitchRegistry>,
        config: NbStatsConfig,
    ) -> Self {
        let rate_limits = RateLimitController::new(Arc::clone(&handle), registry);
        Self {
            handle,
            rate_limits,
            config,
        }
    }

    /// Builds the API over the process-wide service handle.
    pub fn with_global_handle(registry: Arc<dyn SwitchRegistry>, config: NbStatsConfig) -> Self {
        Self::new(global_handle(), registry, config)
    }

    pub fn handle(&self) -> &Arc<ServiceHandle> {
        &self.handle
    }

    pub fn config(&self) -> &NbStatsConfig {
        &self.config
    }

    pub fn rate_limits(&self) -> &RateLimitController {
        &self.rate_limits
    }

    /// Connects to the configured service endpoint and attaches it,
    /// replacing any service already attached.
    pub fn connect(&self) -> NbResult<()> {
        let service = transport::connect(&self.config)?;
        self.handle.attach(service);
        Ok(())
    }

    /// Every flow of `dpid`, in arrival order.
    ///
    /// Runs under the write lock. With no service attached this returns an
    /// empty collection rather than an error.
    #[instrument(skip_all, fields(dpid = %dpid))]
    pub fn switch_statistics_all(&self, dpid: DatapathId) -> NbResult<FlowRecordCollection> {
        let initial_capacity = self.config.flows.initial_capacity;
        match self.settle(
            self.handle
                .with_write_access(|service| collect_flows(service, dpid, initial_capacity)),
        ) {
            Err(NbStatsError::ServiceUnavailable) => {
                debug!("No service attached, returning no flows");
                Ok(FlowRecordCollection::new())
            }
            result => result,
        }
    }

    /// Summed byte and packet rates of the flows of `dpid` entering or
    /// leaving `port`.
    ///
    /// The flows are collected under the read lock and summed after it is
    /// released.
    #[instrument(skip_all, fields(dpid = %dpid, port = %port))]
    pub fn switch_statistics_port(
        &self,
        dpid: DatapathId,
        port: PortNo,
    ) -> NbResult<PortStatistics> {
        let initial_capacity = self.config.flows.initial_capacity;
        let flows = self.settle(
            self.handle
                .with_read_access(|service| collect_flows(service, dpid, initial_capacity)),
        )?;
        Ok(aggregate_port(&flows, port))
    }

    /// Counters of `table` on `dpid`, bounded by the configured response
    /// timeout.
    pub fn table_stats(&self, dpid: DatapathId, table: TableId) -> NbResult<TableStatistics> {
        let timeout = self.config.exchange.response_timeout();
        self.settle(
            self.handle
                .with_read_access(|service| request_table_stats(service, dpid, table, timeout)),
        )
    }

    pub fn get_rate_limit(&self, dpid: DatapathId, direction: RateDirection) -> NbResult<u32> {
        self.settle(self.rate_limits.get_rate_limit(dpid, direction))
    }

    pub fn set_rate_limit(
        &self,
        dpid: DatapathId,
        pps: u32,
        direction: RateDirection,
    ) -> NbResult<()> {
        self.settle(self.rate_limits.set_rate_limit(dpid, pps, direction))
    }

    pub fn disable_rate_limit(&self, dpid: DatapathId, direction: RateDirection) -> NbResult<()> {
        self.settle(self.rate_limits.disable_rate_limit(dpid, direction))
    }

    pub fn get_rx_rate_limit(&self, dpid: DatapathId) -> NbResult<u32> {
        self.get_rate_limit(dpid, RateDirection::Receive)
    }

    pub fn get_tx_rate_limit(&self, dpid: DatapathId) -> NbResult<u32> {
        self.get_rate_limit(dpid, RateDirection::Transmit)
    }

    pub fn set_rx_rate_limit(&self, dpid: DatapathId, pps: u32) -> NbResult<()> {
        self.set_rate_limit(dpid, pps, RateDirection::Receive)
    }

    pub fn set_tx_rate_limit(&self, dpid: DatapathId, pps: u32) -> NbResult<()> {
        self.set_rate_limit(dpid, pps, RateDirection::Transmit)
    }

    pub fn disable_rx_rate_limit(&self, dpid: DatapathId) -> NbResult<()> {
        self.disable_rate_limit(dpid, RateDirection::Receive)
    }

    pub fn disable_tx_rate_limit(&self, dpid: DatapathId) -> NbResult<()> {
        self.disable_rate_limit(dpid, RateDirection::Transmit)
    }

    /// Drops a service that the failed call left unusable.
    fn settle<T>(&self, result: NbResult<T>) -> NbResult<T> {
        if result.is_err() && self.handle.detach_if_unusable() {
            warn!("Service channel lost, reconnect required");
        }
        result
    }
}

/// Byte-rate text of a raw 32-byte wire buffer.
pub fn bps_to_string(raw: &[u8]) -> String {
    rate_to_string(raw)
}

/// Packet-rate text of a raw 32-byte wire buffer.
pub fn pps_to_string(raw: &[u8]) -> String {
    rate_to_string(raw)
}
