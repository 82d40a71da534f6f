//! CAN channel backends: a deterministic in-process [`loopback`] pair used
//! by tests and simulated ECUs, plus an optional real Linux SocketCAN
//! backend behind the `socketcan` feature.

pub mod loopback;

#[cfg(feature = "socketcan")]
pub mod socketcan;
