//! ISO 14229-1 negative response code (NRC) catalog.

use serde::{Deserialize, Serialize};

/// A negative response code. Unrecognized bytes are preserved opaquely
/// rather than rejected, since ECUs routinely use manufacturer-specific
/// codes outside the standard catalog.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Nrc {
    /// 0x10 generalReject
    GeneralReject,
    /// 0x11 serviceNotSupported
    ServiceNotSupported,
    /// 0x12 subFunctionNotSupported
    SubFunctionNotSupported,
    /// 0x13 incorrectMessageLengthOrInvalidFormat
    IncorrectMessageLengthOrInvalidFormat,
    /// 0x14 responseTooLong
    ResponseTooLong,
    /// 0x21 busyRepeatRequest
    BusyRepeatRequest,
    /// 0x22 conditionsNotCorrect
    ConditionsNotCorrect,
    /// 0x24 requestSequenceError
    RequestSequenceError,
    /// 0x25 noResponseFromSubnetComponent
    NoResponseFromSubnetComponent,
    /// 0x26 failurePreventsExecutionOfRequestedAction
    FailurePreventsExecutionOfRequestedAction,
    /// 0x31 requestOutOfRange
    RequestOutOfRange,
    /// 0x33 securityAccessDenied
    SecurityAccessDenied,
    /// 0x35 invalidKey
    InvalidKey,
    /// 0x36 exceededNumberOfAttempts
    ExceededNumberOfAttempts,
    /// 0x37 requiredTimeDelayNotExpired
    RequiredTimeDelayNotExpired,
    /// 0x70 uploadDownloadNotAccepted
    UploadDownloadNotAccepted,
    /// 0x71 transferDataSuspended
    TransferDataSuspended,
    /// 0x72 generalProgrammingFailure
    GeneralProgrammingFailure,
    /// 0x73 wrongBlockSequenceCounter
    WrongBlockSequenceCounter,
    /// 0x78 requestCorrectlyReceivedResponsePending
    RequestCorrectlyReceivedResponsePending,
    /// 0x7E subFunctionNotSupportedInActiveSession
    SubFunctionNotSupportedInActiveSession,
    /// 0x7F serviceNotSupportedInActiveSession
    ServiceNotSupportedInActiveSession,
    /// 0x81 rpmTooHigh
    RpmTooHigh,
    /// 0x82 rpmTooLow
    RpmTooLow,
    /// 0x83 engineIsRunning
    EngineIsRunning,
    /// 0x84 engineIsNotRunning
    EngineIsNotRunning,
    /// 0x92 voltageTooHigh
    VoltageTooHigh,
    /// 0x93 voltageTooLow
    VoltageTooLow,
    /// Manufacturer-specific or otherwise uncatalogued NRC.
    Other(u8),
}

impl Nrc {
    /// The wire byte for this NRC.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::GeneralReject => 0x10,
            Self::ServiceNotSupported => 0x11,
            Self::SubFunctionNotSupported => 0x12,
            Self::IncorrectMessageLengthOrInvalidFormat => 0x13,
            Self::ResponseTooLong => 0x14,
            Self::BusyRepeatRequest => 0x21,
            Self::ConditionsNotCorrect => 0x22,
            Self::RequestSequenceError => 0x24,
            Self::NoResponseFromSubnetComponent => 0x25,
            Self::FailurePreventsExecutionOfRequestedAction => 0x26,
            Self::RequestOutOfRange => 0x31,
            Self::SecurityAccessDenied => 0x33,
            Self::InvalidKey => 0x35,
            Self::ExceededNumberOfAttempts => 0x36,
            Self::RequiredTimeDelayNotExpired => 0x37,
            Self::UploadDownloadNotAccepted => 0x70,
            Self::TransferDataSuspended => 0x71,
            Self::GeneralProgrammingFailure => 0x72,
            Self::WrongBlockSequenceCounter => 0x73,
            Self::RequestCorrectlyReceivedResponsePending => 0x78,
            Self::SubFunctionNotSupportedInActiveSession => 0x7E,
            Self::ServiceNotSupportedInActiveSession => 0x7F,
            Self::RpmTooHigh => 0x81,
            Self::RpmTooLow => 0x82,
            Self::EngineIsRunning => 0x83,
            Self::EngineIsNotRunning => 0x84,
            Self::VoltageTooHigh => 0x92,
            Self::VoltageTooLow => 0x93,
            Self::Other(b) => b,
        }
    }

    /// Human-readable ISO 14229-1 mnemonic for this NRC.
    pub fn description(&self) -> &'static str {
        match self {
            Self::GeneralReject => "generalReject",
            Self::ServiceNotSupported => "serviceNotSupported",
            Self::SubFunctionNotSupported => "subFunctionNotSupported",
            Self::IncorrectMessageLengthOrInvalidFormat => "incorrectMessageLengthOrInvalidFormat",
            Self::ResponseTooLong => "responseTooLong",
            Self::BusyRepeatRequest => "busyRepeatRequest",
            Self::ConditionsNotCorrect => "conditionsNotCorrect",
            Self::RequestSequenceError => "requestSequenceError",
            Self::NoResponseFromSubnetComponent => "noResponseFromSubnetComponent",
            Self::FailurePreventsExecutionOfRequestedAction => "failurePreventsExecutionOfRequestedAction",
            Self::RequestOutOfRange => "requestOutOfRange",
            Self::SecurityAccessDenied => "securityAccessDenied",
            Self::InvalidKey => "invalidKey",
            Self::ExceededNumberOfAttempts => "exceededNumberOfAttempts",
            Self::RequiredTimeDelayNotExpired => "requiredTimeDelayNotExpired",
            Self::UploadDownloadNotAccepted => "uploadDownloadNotAccepted",
            Self::TransferDataSuspended => "transferDataSuspended",
            Self::GeneralProgrammingFailure => "generalProgrammingFailure",
            Self::WrongBlockSequenceCounter => "wrongBlockSequenceCounter",
            Self::RequestCorrectlyReceivedResponsePending => "requestCorrectlyReceivedResponsePending",
            Self::SubFunctionNotSupportedInActiveSession => "subFunctionNotSupportedInActiveSession",
            Self::ServiceNotSupportedInActiveSession => "serviceNotSupportedInActiveSession",
            Self::RpmTooHigh => "rpmTooHigh",
            Self::RpmTooLow => "rpmTooLow",
            Self::EngineIsRunning => "engineIsRunning",
            Self::EngineIsNotRunning => "engineIsNotRunning",
            Self::VoltageTooHigh => "voltageTooHigh",
            Self::VoltageTooLow => "voltageTooLow",
            Self::Other(_) => "manufacturerSpecificOrReserved",
        }
    }
}

impl From<u8> for Nrc {
    fn from(value: u8) -> Self {
        match value {
            0x10 => Self::GeneralReject,
            0x11 => Self::ServiceNotSupported,
            0x12 => Self::SubFunctionNotSupported,
            0x13 => Self::IncorrectMessageLengthOrInvalidFormat,
            0x14 => Self::ResponseTooLong,
            0x21 => Self::BusyRepeatRequest,
            0x22 => Self::ConditionsNotCorrect,
            0x24 => Self::RequestSequenceError,
            0x25 => Self::NoResponseFromSubnetComponent,
            0x26 => Self::FailurePreventsExecutionOfRequestedAction,
            0x31 => Self::RequestOutOfRange,
            0x33 => Self::SecurityAccessDenied,
            0x35 => Self::InvalidKey,
            0x36 => Self::ExceededNumberOfAttempts,
            0x37 => Self::RequiredTimeDelayNotExpired,
            0x70 => Self::UploadDownloadNotAccepted,
            0x71 => Self::TransferDataSuspended,
            0x72 => Self::GeneralProgrammingFailure,
            0x73 => Self::WrongBlockSequenceCounter,
            0x78 => Self::RequestCorrectlyReceivedResponsePending,
            0x7E => Self::SubFunctionNotSupportedInActiveSession,
            0x7F => Self::ServiceNotSupportedInActiveSession,
            0x81 => Self::RpmTooHigh,
            0x82 => Self::RpmTooLow,
            0x83 => Self::EngineIsRunning,
            0x84 => Self::EngineIsNotRunning,
            0x92 => Self::VoltageTooHigh,
            0x93 => Self::VoltageTooLow,
            other => Self::Other(other),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn response_pending_round_trips() {
        assert_eq!(Nrc::from(0x78), Nrc::RequestCorrectlyReceivedResponsePending);
        assert_eq!(
            Nrc::RequestCorrectlyReceivedResponsePending.description(),
            "requestCorrectlyReceivedResponsePending"
        );
    }

    #[test]
    fn unknown_nrc_is_preserved_opaquely() {
        let nrc = Nrc::from(0xF0);
        assert_eq!(nrc, Nrc::Other(0xF0));
        assert_eq!(nrc.as_byte(), 0xF0);
    }
}
