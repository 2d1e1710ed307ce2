//! Northbound statistics and rate-limit queries for an SDN controller.
//!
//! External callers ask, by switch id (and sometimes port or table), for
//! flow and port statistics, per-table counters, or packet-rate limits. Each
//! query becomes a request to the switch-state service; the response is
//! validated, decoded and handed back as plain values.
//!
//! # Architecture
//!
//! - [`service`]: the [`StatsService`] channel and the guarded [`ServiceHandle`]
//! - [`collector`] and [`aggregator`]: flow dumps and per-port sums
//! - [`exchange`]: the correlated table statistics request
//! - [`rate_limit`]: packet-rate limits per direction
//! - [`transport`]: [`FramedService`] over Unix and TCP sockets
//! - [`api`]: [`NbStatsApi`], the entry point for callers
//!
//! # Example
//!
//! ```ignore
//! use nbapi_stats::{KnownSwitches, NbStatsApi, NbStatsConfig};
//! use nbapi_types::{DatapathId, PortNo};
//! use std::sync::Arc;
//!
//! let config = NbStatsConfig::load_or_default(nbapi_stats::config::DEFAULT_CONFIG_PATH)?;
//! let api = NbStatsApi::with_global_handle(Arc::new(KnownSwitches::new()), config);
//! api.connect()?;
//!
//! let stats = api.switch_statistics_port(DatapathId::new(0x1), PortNo::new(2))?;
//! println!("{} bps, {} pps", stats.bps, stats.pps);
//! ```

pub mod aggregator;
pub mod api;
pub mod collector;
pub mod config;
pub mod error;
pub mod exchange;
pub mod flow;
pub mod rate;
pub mod rate_limit;
pub mod registry;
pub mod service;
pub mod transport;
pub mod wire;

pub use aggregator::{aggregate_port, PortStatistics};
pub use api::{bps_to_string, pps_to_string, NbStatsApi};
pub use collector::collect_flows;
pub use config::NbStatsConfig;
pub use error::{NbResult, NbStatsError};
pub use exchange::{request_table_stats, TableStatistics};
pub use flow::{FlowMatch, FlowRecord, FlowRecordCollection};
pub use rate::{parse_rate, rate_to_string, RateText};
pub use rate_limit::RateLimitController;
pub use registry::{KnownSwitches, SwitchRegistry};
pub use service::{global_handle, GuardStats, LockMode, ServiceHandle, StatsService};
pub use transport::{FramedService, Transport};
pub use wire::{AuxCommand, Frame, FrameHeader};
