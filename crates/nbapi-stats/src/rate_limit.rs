//! Packet-rate limits per switch and direction.
//!
//! Every operation first checks that the switch is known to the
//! controller and fails with [`NbStatsError::SwitchNotFound`] without
//! contacting the service otherwise. Reads run under the read lock, writes
//! under the write lock.

use crate::error::{NbResult, NbStatsError};
use crate::registry::SwitchRegistry;
use crate::service::ServiceHandle;
use nbapi_types::{DatapathId, RateDirection};
use std::sync::Arc;
use tracing::{error, info};

/// Gets, sets and disables packet-rate limits.
pub struct RateLimitController {
    handle: Arc<ServiceHandle>,
    registry: Arc<dyn SwitchRegistry>,
}

impl std::fmt::Debug for RateLimitController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitController")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl RateLimitController {
    pub fn new(handle: Arc<ServiceHandle>, registry: Arc<dyn SwitchRegistry>) -> Self {
        Self { handle, registry }
    }

    fn ensure_known(&self, dpid: DatapathId) -> NbResult<()> {
        if self.registry.switch_known(dpid) {
            Ok(())
        } else {
            error!(dpid = %dpid, "No such switch");
            Err(NbStatsError::SwitchNotFound { dpid })
        }
    }

    /// Returns the packet-per-second cap of `dpid` in `direction`
    /// (0 means no limit).
    pub fn get_rate_limit(&self, dpid: DatapathId, direction: RateDirection) -> NbResult<u32> {
        self.ensure_known(dpid)?;
        self.handle.with_read_access(|service| {
            service.get_pkt_rate_limit(dpid, direction).map_err(|e| {
                error!(dpid = %dpid, %direction, error = %e, "Failed to get rate-limit");
                NbStatsError::rate_limit_failed(dpid, direction, e.to_string())
            })
        })
    }

    /// Caps `dpid` at `pps` packets per second in `direction`.
    pub fn set_rate_limit(
        &self,
        dpid: DatapathId,
        pps: u32,
        direction: RateDirection,
    ) -> NbResult<()> {
        self.ensure_known(dpid)?;
        self.handle.with_write_access(|service| {
            service.set_pkt_rate_limit(dpid, pps, direction).map_err(|e| {
                error!(dpid = %dpid, %direction, pps, error = %e, "Failed to set rate-limit");
                NbStatsError::rate_limit_failed(dpid, direction, e.to_string())
            })
        })?;
        info!(dpid = %dpid, %direction, pps, "Rate-limit set");
        Ok(())
    }

    /// Removes the cap of `dpid` in `direction`.
    pub fn disable_rate_limit(&self, dpid: DatapathId, direction: RateDirection) -> NbResult<()> {
        self.set_rate_limit(dpid, 0, direction)
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::KnownSwitches;
    use crate::service::StatsService;
    use crate::wire::Frame;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Default)]
    struct LimitService {
        limits: Mutex<HashMap<(DatapathId, RateDirection), u32>>,
        calls: Mutex<usize>,
        reject: bool,
    }

    impl StatsService for LimitService {
        fn send(&self, _frame: Frame) -> NbResult<()> {
            Ok(())
        }

        fn wait_response(&self, _timeout: Option<Duration>) -> NbResult<Option<Frame>> {
            Ok(None)
        }

        fn dump_flows(&self, _dpid: DatapathId, _sink: &mut dyn FnMut(&[u8])) -> NbResult<usize> {
            Ok(0)
        }

        fn get_pkt_rate_limit(&self, dpid: DatapathId, dir: RateDirection) -> NbResult<u32> {
            *self.calls.lock() += 1;
            if self.reject {
                return Err(NbStatsError::NoResponse { operation: "rlim" });
            }
            Ok(self.limits.lock().get(&(dpid, dir)).copied().unwrap_or(0))
        }

        fn set_pkt_rate_limit(&self, dpid: DatapathId, pps: u32, dir: RateDirection) -> NbResult<()> {
            *self.calls.lock() += 1;
            if self.reject {
                return Err(NbStatsError::NoResponse { operation: "rlim" });
            }
            self.limits.lock().insert((dpid, dir), pps);
            Ok(())
        }
    }

    fn setup(reject: bool) -> (RateLimitController, Arc<LimitService>) {
        let service = Arc::new(LimitService {
            reject,
            ..Default::default()
        });
        let handle = Arc::new(ServiceHandle::new());
        handle.attach(service.clone());
        let registry: KnownSwitches = [DatapathId::new(1)].into_iter().collect();
        (
            RateLimitController::new(handle, Arc::new(registry)),
            service,
        )
    }

    #[test]
    fn test_set_then_get_per_direction() {
        let (controller, _service) = setup(false);
        let dpid = DatapathId::new(1);

        controller.set_rx_rate_limit(dpid, 1000).unwrap();
        controller.set_tx_rate_limit(dpid, 200).unwrap();

        assert_eq!(controller.get_rx_rate_limit(dpid).unwrap(), 1000);
        assert_eq!(controller.get_tx_rate_limit(dpid).unwrap(), 200);
    }

    #[test]
    fn test_disable_sets_zero() {
        let (controller, _service) = setup(false);
        let dpid = DatapathId::new(1);

        controller.set_tx_rate_limit(dpid, 500).unwrap();
        controller.disable_tx_rate_limit(dpid).unwrap();

        assert_eq!(controller.get_tx_rate_limit(dpid).unwrap(), 0);
    }

    #[test]
    fn test_unknown_switch_never_reaches_service() {
        let (controller, service) = setup(false);
        let unknown = DatapathId::new(99);

        for result in [
            controller.get_rx_rate_limit(unknown).map(|_| ()),
            controller.set_tx_rate_limit(unknown, 5),
            controller.disable_rx_rate_limit(unknown),
        ] {
            assert!(matches!(result, Err(NbStatsError::SwitchNotFound { .. })));
        }
        assert_eq!(*service.calls.lock(), 0);
    }

    #[test]
    fn test_service_failure_is_surfaced() {
        let (controller, _service) = setup(true);
        let err = controller
            .set_rate_limit(DatapathId::new(1), 10, RateDirection::Receive)
            .unwrap_err();
        assert!(matches!(
            err,
            NbStatsError::RateLimitOperationFailed {
                direction: RateDirection::Receive,
                ..
            }
        ));
    }

    #[test]
    fn test_detached_service() {
        let (controller, _service) = setup(false);
        controller.handle.detach();
        let err = controller.get_rx_rate_limit(DatapathId::new(1)).unwrap_err();
        assert!(matches!(err, NbStatsError::ServiceUnavailable));
    }
}
