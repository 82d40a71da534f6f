//! Diagnostic trouble code (DTC) representation and ISO 14229-1 status mask
//! decoding, backing the `ReadDTCInformation` (0x19) service family.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// DTC name interpretation format, as returned in the first byte of most
/// `ReadDTCInformation` positive responses.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DtcFormatType {
    /// ISO15031-6 DTC format
    Iso15031_6,
    /// ISO14229-1 DTC format
    Iso14229_1,
    /// SAEJ1939-73 DTC format
    SaeJ1939_73,
    /// ISO11992-4 DTC format
    Iso11992_4,
    /// Unrecognized format byte
    Unknown(u8),
}

impl From<u8> for DtcFormatType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Iso15031_6,
            0x01 => Self::Iso14229_1,
            0x02 => Self::SaeJ1939_73,
            0x03 => Self::Iso11992_4,
            other => Self::Unknown(other),
        }
    }
}

bitflags! {
    /// ISO 14229-1 DTC status mask: one bit per status bit defined for the
    /// `ReadDTCInformation`/`ClearDiagnosticInformation` service family.
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct DtcStatusMask: u8 {
        /// testFailed: DTC failed at the time of the request.
        const TEST_FAILED = 0b0000_0001;
        /// testFailedThisOperationCycle
        const TEST_FAILED_THIS_OPERATION_CYCLE = 0b0000_0010;
        /// pendingDTC
        const PENDING_DTC = 0b0000_0100;
        /// confirmedDTC
        const CONFIRMED_DTC = 0b0000_1000;
        /// testNotCompletedSinceLastClear
        const TEST_NOT_COMPLETED_SINCE_LAST_CLEAR = 0b0001_0000;
        /// testFailedSinceLastClear
        const TEST_FAILED_SINCE_LAST_CLEAR = 0b0010_0000;
        /// testNotCompletedThisOperationCycle
        const TEST_NOT_COMPLETED_THIS_OPERATION_CYCLE = 0b0100_0000;
        /// warningIndicatorRequested: the DTC should illuminate the MIL.
        const WARNING_INDICATOR_REQUESTED = 0b1000_0000;
    }
}

impl DtcStatusMask {
    /// True if [`DtcStatusMask::WARNING_INDICATOR_REQUESTED`] is set.
    pub fn mil_requested(&self) -> bool {
        self.contains(Self::WARNING_INDICATOR_REQUESTED)
    }
}

/// A single diagnostic trouble code as reported by an ECU.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dtc {
    /// Raw 3-byte DTC value (the high byte of `raw` is unused).
    pub raw: u32,
    /// Format this DTC's `raw` value should be interpreted under.
    pub format: DtcFormatType,
    /// Status mask as reported alongside this DTC.
    pub status: DtcStatusMask,
}

impl Dtc {
    /// Decodes one `(DTC-hi, DTC-mid, DTC-lo, status)` record as emitted by
    /// `reportDTCByStatusMask` and similar sub-functions.
    pub fn from_record(bytes: [u8; 4], format: DtcFormatType) -> Self {
        let raw = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]);
        Self {
            raw,
            format,
            status: DtcStatusMask::from_bits_truncate(bytes[3]),
        }
    }

    /// True if this DTC should currently illuminate the malfunction
    /// indicator lamp.
    pub fn mil_on(&self) -> bool {
        self.status.mil_requested()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_record_into_status_mask() {
        let dtc = Dtc::from_record([0x01, 0x23, 0x45, 0b1000_1001], DtcFormatType::Iso14229_1);
        assert_eq!(dtc.raw, 0x012345);
        assert!(dtc.status.contains(DtcStatusMask::TEST_FAILED));
        assert!(dtc.status.contains(DtcStatusMask::CONFIRMED_DTC));
        assert!(dtc.mil_on());
    }

    #[test]
    fn format_type_decodes_known_and_unknown_bytes() {
        assert_eq!(DtcFormatType::from(0x01), DtcFormatType::Iso14229_1);
        assert_eq!(DtcFormatType::from(0x7F), DtcFormatType::Unknown(0x7F));
    }
}
