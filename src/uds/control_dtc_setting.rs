//! `ControlDTCSetting` (0x85): suspends or resumes the ECU's own DTC
//! status-bit updates, typically around a test sequence that would
//! otherwise set spurious DTCs.

use std::time::Duration;

use super::{UdsError, UdsRequest, UdsResponse, UdsService, UdsSessionEngine};

/// `DTCSettingType` sub-function.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DtcSettingType {
    /// Resumes normal DTC status updating.
    On,
    /// Suspends DTC status updating.
    Off,
    /// OEM-defined setting type.
    Other(u8),
}

impl From<DtcSettingType> for u8 {
    fn from(value: DtcSettingType) -> u8 {
        match value {
            DtcSettingType::On => 0x01,
            DtcSettingType::Off => 0x02,
            DtcSettingType::Other(b) => b,
        }
    }
}

impl UdsSessionEngine {
    /// Sets the DTC setting type, with an optional OEM-defined control
    /// option record.
    pub fn control_dtc_setting(
        &self,
        setting_type: DtcSettingType,
        control_option_record: &[u8],
        timeout: Duration,
    ) -> Result<UdsResponse, UdsError> {
        let request = UdsRequest::with_sub_function(
            UdsService::ControlDtcSetting,
            setting_type.into(),
            control_option_record.to_vec(),
            timeout,
        );
        self.send_request(request)
    }
}
