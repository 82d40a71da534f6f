#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]

//! Wire-level core of a UDS (ISO 14229-1) diagnostic tester: ISO-TP (ISO
//! 15765-2) segmentation and reassembly, a UDS request/response session
//! engine layered on top, a command-sequencing executor that drives
//! scheduled and periodic transmissions, and a bus monitor/filter pipeline.
//!
//! This crate is the tester side only — it does not validate or simulate
//! ECU behavior, load configuration files, or provide a user interface.
//! Those are a host application's job; this crate exposes the plumbing.
//!
//! ## Layering
//!
//! ```text
//! command executor -> UDS session engine -> ISO-TP engine -> CAN channel -> wire
//! ```
//!
//! Incoming frames traverse the same path in reverse. The monitor pipeline
//! observes a [`channel::CanChannel`] independently of whichever upper layer
//! produced or consumed a given frame.
//!
//! - [`frame`] — CAN/CAN-FD frame value types and DLC<->length tables.
//! - [`channel`] — the CAN channel abstraction; [`hardware`] provides backends.
//! - [`isotp`] — the segmentation/reassembly engine (ISO-TP).
//! - [`uds`] — the request/response session engine and per-service wrappers.
//! - [`dtc`] — diagnostic trouble code and status-mask decoding.
//! - [`project`] — the command/group/project data model and JSON persistence.
//! - [`executor`] — drives a [`project::CommandProject`] over a channel pair.
//! - [`monitor`] — the filtered bus-observation pipeline.

pub mod channel;
pub mod dtc;
pub mod executor;
pub mod frame;
pub mod hardware;
pub mod helpers;
pub mod isotp;
pub mod monitor;
pub mod project;
pub mod uds;

use channel::ChannelError;
use isotp::IsoTpError;
use uds::UdsError;

/// Crate-wide result alias for operations that bottom out in [`DiagError`].
pub type DiagResult<T> = Result<T, DiagError>;

/// Top-level error composing every layer's leaf error kind (spec §7).
///
/// Negative UDS responses are never represented here: per spec §7 kind 5,
/// they are delivered as a typed [`uds::UdsResponse`] value, not as an error.
#[derive(Debug)]
pub enum DiagError {
    /// The requested operation or configuration is not supported.
    NotSupported,
    /// Error at the CAN transport boundary.
    Channel(ChannelError),
    /// Error from the ISO-TP segmentation/reassembly engine.
    IsoTp(IsoTpError),
    /// Error from the UDS session engine (timeout, busy, transport failure).
    Uds(UdsError),
    /// Error from the command executor.
    Executor(executor::ExecutorError),
    /// Error from the monitor pipeline.
    Monitor(monitor::MonitorError),
}

impl std::fmt::Display for DiagError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagError::NotSupported => write!(f, "operation not supported"),
            DiagError::Channel(e) => write!(f, "channel error: {e}"),
            DiagError::IsoTp(e) => write!(f, "ISO-TP error: {e}"),
            DiagError::Uds(e) => write!(f, "UDS error: {e}"),
            DiagError::Executor(e) => write!(f, "executor error: {e}"),
            DiagError::Monitor(e) => write!(f, "monitor error: {e}"),
        }
    }
}

impl std::error::Error for DiagError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiagError::Channel(e) => Some(e),
            DiagError::IsoTp(e) => Some(e),
            DiagError::Uds(e) => Some(e),
            DiagError::Executor(e) => Some(e),
            DiagError::Monitor(e) => Some(e),
            DiagError::NotSupported => None,
        }
    }
}

impl From<ChannelError> for DiagError {
    fn from(e: ChannelError) -> Self {
        Self::Channel(e)
    }
}

impl From<IsoTpError> for DiagError {
    fn from(e: IsoTpError) -> Self {
        Self::IsoTp(e)
    }
}

impl From<UdsError> for DiagError {
    fn from(e: UdsError) -> Self {
        Self::Uds(e)
    }
}

impl From<executor::ExecutorError> for DiagError {
    fn from(e: executor::ExecutorError) -> Self {
        Self::Executor(e)
    }
}

impl From<monitor::MonitorError> for DiagError {
    fn from(e: monitor::MonitorError) -> Self {
        Self::Monitor(e)
    }
}
