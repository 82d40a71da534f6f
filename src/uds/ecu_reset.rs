//! `ECUReset` (0x11): power-cycles or reboots the ECU.

use std::time::Duration;

use super::{UdsError, UdsRequest, UdsResponse, UdsService, UdsSessionEngine};

/// Reset mode, carried as the `ECUReset` sub-function.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResetType {
    /// Simulates a forceful power off/on cycle; non-volatile and volatile
    /// memory may both be re-initialized.
    HardReset,
    /// Simulates a key-off/on cycle; non-volatile memory is preserved but
    /// volatile memory is re-initialized.
    KeyOffReset,
    /// Reboots the current application; both memory kinds are preserved.
    SoftReset,
    /// Enables rapid power shutdown on the next key-off. Once sent, nothing
    /// but further `ECUReset` requests should be issued until the ECU
    /// powers down, or the rapid shutdown sequence may be disturbed.
    EnableRapidPowerShutDown,
    /// Disables a previously enabled rapid power shutdown.
    DisableRapidPowerShutDown,
    /// OEM-defined reset mode.
    Other(u8),
}

impl From<ResetType> for u8 {
    fn from(value: ResetType) -> u8 {
        match value {
            ResetType::HardReset => 0x01,
            ResetType::KeyOffReset => 0x02,
            ResetType::SoftReset => 0x03,
            ResetType::EnableRapidPowerShutDown => 0x04,
            ResetType::DisableRapidPowerShutDown => 0x05,
            ResetType::Other(b) => b,
        }
    }
}

impl UdsSessionEngine {
    /// Sends `ECUReset` with the given mode and waits for acknowledgement.
    pub fn ecu_reset(
        &self,
        reset_type: ResetType,
        timeout: Duration,
    ) -> Result<UdsResponse, UdsError> {
        let request =
            UdsRequest::with_sub_function(UdsService::EcuReset, reset_type.into(), Vec::new(), timeout);
        self.send_request(request)
    }

    /// Convenience wrapper for [`ResetType::EnableRapidPowerShutDown`],
    /// returning the minimum power-down time in seconds the positive
    /// response carries in its second payload byte, when present.
    pub fn enable_rapid_power_shutdown(&self, timeout: Duration) -> Result<Option<u8>, UdsError> {
        let response = self.ecu_reset(ResetType::EnableRapidPowerShutDown, timeout)?;
        Ok(response.payload.first().copied())
    }
}
