//! ISO 14229-1 service id (SID) catalog.

use serde::{Deserialize, Serialize};

/// A UDS service identifier, as carried in the first byte of a request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UdsService {
    /// 0x10 DiagnosticSessionControl
    DiagnosticSessionControl,
    /// 0x11 ECUReset
    EcuReset,
    /// 0x14 ClearDiagnosticInformation
    ClearDiagnosticInformation,
    /// 0x19 ReadDTCInformation
    ReadDtcInformation,
    /// 0x22 ReadDataByIdentifier
    ReadDataByIdentifier,
    /// 0x23 ReadMemoryByAddress
    ReadMemoryByAddress,
    /// 0x24 ReadScalingDataByIdentifier
    ReadScalingDataByIdentifier,
    /// 0x27 SecurityAccess
    SecurityAccess,
    /// 0x28 CommunicationControl
    CommunicationControl,
    /// 0x2E WriteDataByIdentifier
    WriteDataByIdentifier,
    /// 0x31 RoutineControl
    RoutineControl,
    /// 0x34 RequestDownload
    RequestDownload,
    /// 0x35 RequestUpload
    RequestUpload,
    /// 0x36 TransferData
    TransferData,
    /// 0x37 RequestTransferExit
    RequestTransferExit,
    /// 0x3E TesterPresent
    TesterPresent,
    /// 0x85 ControlDTCSetting
    ControlDtcSetting,
    /// 0x86 ResponseOnEvent
    ResponseOnEvent,
    /// 0x87 LinkControl
    LinkControl,
    /// Any SID not in the catalog above.
    Other(u8),
}

impl UdsService {
    /// The wire byte for this service.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::DiagnosticSessionControl => 0x10,
            Self::EcuReset => 0x11,
            Self::ClearDiagnosticInformation => 0x14,
            Self::ReadDtcInformation => 0x19,
            Self::ReadDataByIdentifier => 0x22,
            Self::ReadMemoryByAddress => 0x23,
            Self::ReadScalingDataByIdentifier => 0x24,
            Self::SecurityAccess => 0x27,
            Self::CommunicationControl => 0x28,
            Self::WriteDataByIdentifier => 0x2E,
            Self::RoutineControl => 0x31,
            Self::RequestDownload => 0x34,
            Self::RequestUpload => 0x35,
            Self::TransferData => 0x36,
            Self::RequestTransferExit => 0x37,
            Self::TesterPresent => 0x3E,
            Self::ControlDtcSetting => 0x85,
            Self::ResponseOnEvent => 0x86,
            Self::LinkControl => 0x87,
            Self::Other(b) => b,
        }
    }
}

impl From<u8> for UdsService {
    fn from(value: u8) -> Self {
        match value {
            0x10 => Self::DiagnosticSessionControl,
            0x11 => Self::EcuReset,
            0x14 => Self::ClearDiagnosticInformation,
            0x19 => Self::ReadDtcInformation,
            0x22 => Self::ReadDataByIdentifier,
            0x23 => Self::ReadMemoryByAddress,
            0x24 => Self::ReadScalingDataByIdentifier,
            0x27 => Self::SecurityAccess,
            0x28 => Self::CommunicationControl,
            0x2E => Self::WriteDataByIdentifier,
            0x31 => Self::RoutineControl,
            0x34 => Self::RequestDownload,
            0x35 => Self::RequestUpload,
            0x36 => Self::TransferData,
            0x37 => Self::RequestTransferExit,
            0x3E => Self::TesterPresent,
            0x85 => Self::ControlDtcSetting,
            0x86 => Self::ResponseOnEvent,
            0x87 => Self::LinkControl,
            other => Self::Other(other),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_known_services() {
        for &byte in &[0x10u8, 0x11, 0x14, 0x19, 0x22, 0x27, 0x3E, 0x87] {
            assert_eq!(UdsService::from(byte).as_byte(), byte);
        }
    }

    #[test]
    fn unknown_service_preserved() {
        assert_eq!(UdsService::from(0x99), UdsService::Other(0x99));
    }
}
