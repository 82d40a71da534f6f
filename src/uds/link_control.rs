//! `LinkControl` (0x87): negotiates a transport-layer baud rate change.

use std::time::Duration;

use super::{UdsError, UdsRequest, UdsResponse, UdsService, UdsSessionEngine};

/// A baud rate, as carried by the `transitionBaudrate` sub-function.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BaudRate {
    /// One of the fixed rates named in ISO 14229-1 Table 292.
    Fixed(FixedBaudRate),
    /// An arbitrary rate in bit/s, sent as a 3 byte big-endian value.
    Specific(u32),
}

/// Fixed baud rate identifiers (ISO 14229-1 Table 292).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FixedBaudRate {
    /// 9600 bit/s
    Pc9600,
    /// 19200 bit/s
    Pc19200,
    /// 38400 bit/s
    Pc38400,
    /// 57600 bit/s
    Pc57600,
    /// 115200 bit/s
    Pc115200,
    /// CAN 125 kbit/s
    Can125000,
    /// CAN 250 kbit/s
    Can250000,
    /// CAN 500 kbit/s
    Can500000,
    /// CAN 1 Mbit/s
    Can1000000,
}

impl From<FixedBaudRate> for u8 {
    fn from(value: FixedBaudRate) -> u8 {
        match value {
            FixedBaudRate::Pc9600 => 0x01,
            FixedBaudRate::Pc19200 => 0x02,
            FixedBaudRate::Pc38400 => 0x03,
            FixedBaudRate::Pc57600 => 0x04,
            FixedBaudRate::Pc115200 => 0x05,
            FixedBaudRate::Can125000 => 0x10,
            FixedBaudRate::Can250000 => 0x11,
            FixedBaudRate::Can500000 => 0x12,
            FixedBaudRate::Can1000000 => 0x13,
        }
    }
}

impl UdsSessionEngine {
    /// Verifies a transition to a fixed baud rate without yet switching to it.
    pub fn link_control_verify_fixed(
        &self,
        rate: FixedBaudRate,
        timeout: Duration,
    ) -> Result<UdsResponse, UdsError> {
        let request =
            UdsRequest::with_sub_function(UdsService::LinkControl, 0x01, vec![rate.into()], timeout);
        self.send_request(request)
    }

    /// Verifies a transition to an arbitrary baud rate, sent as a 3 byte
    /// big-endian bit/s value.
    pub fn link_control_verify_specific(
        &self,
        bits_per_second: u32,
        timeout: Duration,
    ) -> Result<UdsResponse, UdsError> {
        let bytes = bits_per_second.to_be_bytes();
        let request = UdsRequest::with_sub_function(
            UdsService::LinkControl,
            0x02,
            vec![bytes[1], bytes[2], bytes[3]],
            timeout,
        );
        self.send_request(request)
    }

    /// Commits to the most recently verified baud rate transition.
    pub fn link_control_transition(&self, timeout: Duration) -> Result<UdsResponse, UdsError> {
        let request =
            UdsRequest::with_sub_function(UdsService::LinkControl, 0x03, Vec::new(), timeout);
        self.send_request(request)
    }
}
