//! Common types for the controller's northbound statistics API.
//!
//! This crate provides type-safe representations of the identifiers that
//! every northbound query carries:
//!
//! - [`DatapathId`]: 64-bit switch (datapath) identifier
//! - [`PortNo`]: switch port number as carried in flow records
//! - [`TableId`]: flow table identifier
//! - [`RateDirection`]: receive/transmit direction of a packet-rate limit

mod datapath;
mod direction;
mod port;
mod table;

pub use datapath::DatapathId;
pub use direction::RateDirection;
pub use port::PortNo;
pub use table::TableId;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid datapath id: {0}")]
    InvalidDatapathId(String),

    #[error("invalid port number: {0}")]
    InvalidPortNo(String),

    #[error("invalid table id: {0}")]
    InvalidTableId(String),

    #[error("invalid rate direction: {0} (expected rx or tx)")]
    InvalidDirection(String),
}
