//! The switch-state service channel and the guarded handle to it.
//!
//! The service is attached and detached at runtime. Every operation in this
//! crate reaches it through [`ServiceHandle`], which holds a reader/writer
//! lock for the duration of the access and refuses cleanly with
//! [`NbStatsError::ServiceUnavailable`] when nothing is attached.
//!
//! # Lock discipline
//!
//! | access | lock |
//! |--------|------|
//! | all-flows statistics | write |
//! | port statistics, table statistics, rate-limit reads | read |
//! | rate-limit writes | write |
//! | attach / detach | write |
//!
//! The lock is held across the whole conversation with the service,
//! including blocking waits. Under contention a slow service therefore
//! stalls writers (attach/detach, rate-limit writes) behind readers.
//!
//! Read mode only keeps readers from excluding one another at the handle.
//! The service is a single channel, and a per-service conversation gate
//! runs one conversation on it at a time, so read-mode accesses to the same
//! service are serialized.
//!
//! A service that reports itself unusable stays attached until
//! [`ServiceHandle::detach_if_unusable`] or a new `attach` replaces it.

use crate::error::{NbResult, NbStatsError};
use crate::wire::Frame;
use nbapi_types::{DatapathId, RateDirection};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Blocking request/response channel to the switch-state service.
///
/// Implementations own socket I/O and framing. A `send` is answered by at
/// most one response frame, read with `wait_response`.
pub trait StatsService: Send + Sync {
    /// Sends one request frame.
    fn send(&self, frame: Frame) -> NbResult<()>;

    /// Blocks until a response frame arrives.
    ///
    /// Returns `Ok(None)` when the service reports that no response will
    /// come. `timeout` of `None` waits indefinitely.
    fn wait_response(&self, timeout: Option<Duration>) -> NbResult<Option<Frame>>;

    /// Requests every flow of `dpid` and calls `sink` once per raw
    /// flow-info record, in arrival order. Returns the number of flows the
    /// service reports having sent.
    fn dump_flows(&self, dpid: DatapathId, sink: &mut dyn FnMut(&[u8])) -> NbResult<usize>;

    /// Reads the packet-rate limit of `dpid` in `direction`.
    fn get_pkt_rate_limit(&self, dpid: DatapathId, direction: RateDirection) -> NbResult<u32>;

    /// Sets the packet-rate limit of `dpid` in `direction`; 0 disables it.
    fn set_pkt_rate_limit(
        &self,
        dpid: DatapathId,
        pps: u32,
        direction: RateDirection,
    ) -> NbResult<()>;

    /// Returns false once the channel can no longer be used and must be
    /// replaced by a new connection.
    fn is_usable(&self) -> bool {
        true
    }
}

/// Lock mode used to reach the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Read,
    Write,
}

/// Snapshot of guard activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuardStats {
    /// Accesses that ran under the read lock.
    pub read_accesses: u64,
    /// Accesses that ran under the write lock.
    pub write_accesses: u64,
    /// Accesses refused because no service was attached.
    pub unavailable: u64,
}

#[derive(Debug, Default)]
struct GuardCounters {
    read_accesses: AtomicU64,
    write_accesses: AtomicU64,
    unavailable: AtomicU64,
}

struct Attached {
    service: Arc<dyn StatsService>,
    /// Serializes conversations so a request and its response are never
    /// interleaved with another caller's on the same channel. Held under
    /// both lock modes.
    conversation: Mutex<()>,
}

impl Attached {
    fn run<T>(&self, f: impl FnOnce(&dyn StatsService) -> NbResult<T>) -> NbResult<T> {
        let _turn = self.conversation.lock();
        f(self.service.as_ref())
    }
}

/// Shared, optional reference to the switch-state service.
#[derive(Default)]
pub struct ServiceHandle {
    inner: RwLock<Option<Attached>>,
    counters: GuardCounters,
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("attached", &self.is_attached())
            .field("stats", &self.stats())
            .finish()
    }
}

impl ServiceHandle {
    /// Creates a handle with no service attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a service, returning the one it replaces.
    pub fn attach(&self, service: Arc<dyn StatsService>) -> Option<Arc<dyn StatsService>> {
        let mut guard = self.inner.write();
        let previous = guard.replace(Attached {
            service,
            conversation: Mutex::new(()),
        });
        info!(replaced = previous.is_some(), "Switch-state service attached");
        previous.map(|attached| attached.service)
    }

    /// Detaches the current service.
    pub fn detach(&self) -> Option<Arc<dyn StatsService>> {
        let previous = self.inner.write().take();
        if previous.is_some() {
            info!("Switch-state service detached");
        }
        previous.map(|attached| attached.service)
    }

    /// Detaches the current service if it reports itself unusable.
    ///
    /// Returns true if a service was detached. Must not be called from
    /// inside an access.
    pub fn detach_if_unusable(&self) -> bool {
        let mut guard = self.inner.write();
        if !matches!(guard.as_ref(), Some(attached) if !attached.service.is_usable()) {
            return false;
        }
        guard.take();
        warn!("Detached unusable switch-state service");
        true
    }

    /// Returns true if a service is attached.
    pub fn is_attached(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Runs `f` with the service under the read lock.
    pub fn with_read_access<T>(
        &self,
        f: impl FnOnce(&dyn StatsService) -> NbResult<T>,
    ) -> NbResult<T> {
        let guard = self.inner.read();
        match guard.as_ref() {
            Some(attached) => {
                self.counters.read_accesses.fetch_add(1, Ordering::Relaxed);
                attached.run(f)
            }
            None => {
                drop(guard);
                Err(self.unavailable(LockMode::Read))
            }
        }
    }

    /// Runs `f` with the service under the write lock.
    pub fn with_write_access<T>(
        &self,
        f: impl FnOnce(&dyn StatsService) -> NbResult<T>,
    ) -> NbResult<T> {
        let guard = self.inner.write();
        match guard.as_ref() {
            Some(attached) => {
                self.counters.write_accesses.fetch_add(1, Ordering::Relaxed);
                attached.run(f)
            }
            None => {
                drop(guard);
                Err(self.unavailable(LockMode::Write))
            }
        }
    }

    /// Runs `f` under the lock selected by `mode`.
    pub fn with_access<T>(
        &self,
        mode: LockMode,
        f: impl FnOnce(&dyn StatsService) -> NbResult<T>,
    ) -> NbResult<T> {
        match mode {
            LockMode::Read => self.with_read_access(f),
            LockMode::Write => self.with_write_access(f),
        }
    }

    /// Returns a snapshot of the access counters.
    pub fn stats(&self) -> GuardStats {
        GuardStats {
            read_accesses: self.counters.read_accesses.load(Ordering::Relaxed),
            write_accesses: self.counters.write_accesses.load(Ordering::Relaxed),
            unavailable: self.counters.unavailable.load(Ordering::Relaxed),
        }
    }

    fn unavailable(&self, mode: LockMode) -> NbStatsError {
        self.counters.unavailable.fetch_add(1, Ordering::Relaxed);
        debug!(?mode, "No switch-state service attached");
        NbStatsError::ServiceUnavailable
    }
}

static GLOBAL_HANDLE: Lazy<Arc<ServiceHandle>> = Lazy::new(|| Arc::new(ServiceHandle::new()));

/// The process-wide service handle.
pub fn global_handle() -> Arc<ServiceHandle> {
    Arc::clone(&GLOBAL_HANDLE)
}
