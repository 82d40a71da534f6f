//! `ReadDTCInformation` (0x19): enumerates and queries DTCs stored on the
//! ECU, including mirror-memory and OBD-emissions-related variants.

use std::time::Duration;

use crate::dtc::{Dtc, DtcFormatType};

use super::{UdsError, UdsRequest, UdsResponse, UdsService, UdsSessionEngine};

/// `ReadDTCInformation` sub-function catalog (ISO 14229-1 Table 239).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum DtcSubFunction {
    /// Takes a 1 byte DTCStatusMask.
    ReportNumberOfDtcByStatusMask = 0x01,
    /// Takes a 1 byte DTCStatusMask.
    ReportDtcByStatusMask = 0x02,
    /// Takes a 3 byte DTCMaskRecord and a 1 byte DTCSnapshotRecordNumber.
    ReportDtcSnapshotIdentifier = 0x03,
    /// Takes a 3 byte DTCMaskRecord and a 1 byte DTCSnapshotRecordNumber.
    ReportDtcSnapshotRecordByDtcNumber = 0x04,
    /// Takes a 1 byte DTCSnapshotRecordNumber.
    ReportDtcSnapshotRecordByRecordNumber = 0x05,
    /// Takes a 3 byte DTCMaskRecord and a 1 byte DTCExtendedDataRecordNumber.
    ReportDtcExtendedDataRecordByDtcNumber = 0x06,
    /// Takes a 1 byte DTCSeverityMask and a 1 byte DTCStatusMask.
    ReportNumberOfDtcBySeverityMaskRecord = 0x07,
    /// Takes a 1 byte DTCSeverityMask and a 1 byte DTCStatusMask.
    ReportDtcBySeverityMaskRecord = 0x08,
    /// Takes a 3 byte DTCMaskRecord.
    ReportSeverityInformationOfDtc = 0x09,
    /// No additional arguments.
    ReportSupportedDtc = 0x0A,
    /// No additional arguments.
    ReportFirstTestFailedDtc = 0x0B,
    /// No additional arguments.
    ReportFirstConfirmedDtc = 0x0C,
    /// No additional arguments.
    ReportMostRecentTestFailedDtc = 0x0D,
    /// No additional arguments.
    ReportMostRecentConfirmedDtc = 0x0E,
    /// Takes a 1 byte DTCStatusMask.
    ReportMirrorMemoryDtcByStatusMask = 0x0F,
    /// Takes a 3 byte DTCMaskRecord and a 1 byte DTCExtendedDataRecordNumber.
    ReportMirrorMemoryDtcExtendedDataRecordByDtcNumber = 0x10,
    /// Takes a 1 byte DTCStatusMask.
    ReportNumberOfMirrorMemoryDtcByStatusMask = 0x11,
    /// Takes a 1 byte DTCStatusMask.
    ReportNumberOfEmissionsRelatedObdDtcByStatusMask = 0x12,
    /// Takes a 1 byte DTCStatusMask.
    ReportEmissionsRelatedObdDtcByStatusMask = 0x13,
    /// No additional arguments.
    ReportDtcFaultDetectionCounter = 0x14,
    /// No additional arguments.
    ReportDtcWithPermanentStatus = 0x15,
}

fn parse_dtc_count(payload: &[u8]) -> Result<(u8, DtcFormatType, u16), UdsError> {
    if payload.len() != 4 {
        return Err(UdsError::MalformedResponse(format!(
            "expected a 4 byte DTC count payload, got {} bytes",
            payload.len()
        )));
    }
    Ok((
        payload[0],
        DtcFormatType::from(payload[1]),
        u16::from_be_bytes([payload[2], payload[3]]),
    ))
}

fn parse_dtc_records(payload: &[u8], format: DtcFormatType) -> Vec<Dtc> {
    if payload.is_empty() {
        return Vec::new();
    }
    // payload[0] is the DTCStatusAvailabilityMask; records follow.
    let records = &payload[1.min(payload.len())..];
    records
        .chunks_exact(4)
        .map(|c| Dtc::from_record([c[0], c[1], c[2], c[3]], format))
        .collect()
}

impl UdsSessionEngine {
    fn read_dtc_information(
        &self,
        sub_function: DtcSubFunction,
        extra: Vec<u8>,
        timeout: Duration,
    ) -> Result<UdsResponse, UdsError> {
        let request = UdsRequest::with_sub_function(
            UdsService::ReadDtcInformation,
            sub_function as u8,
            extra,
            timeout,
        );
        self.send_request(request)
    }

    /// Number of DTCs whose status matches `status_mask`.
    ///
    /// Returns `(statusAvailabilityMask, format, count)`.
    pub fn get_number_of_dtcs_by_status_mask(
        &self,
        status_mask: u8,
        timeout: Duration,
    ) -> Result<(u8, DtcFormatType, u16), UdsError> {
        let response = self.read_dtc_information(
            DtcSubFunction::ReportNumberOfDtcByStatusMask,
            vec![status_mask],
            timeout,
        )?;
        parse_dtc_count(&response.payload)
    }

    /// DTCs whose status matches `status_mask`.
    pub fn get_dtcs_by_status_mask(
        &self,
        status_mask: u8,
        timeout: Duration,
    ) -> Result<Vec<Dtc>, UdsError> {
        let response = self.read_dtc_information(
            DtcSubFunction::ReportDtcByStatusMask,
            vec![status_mask],
            timeout,
        )?;
        let fmt = self
            .get_number_of_dtcs_by_status_mask(status_mask, timeout)
            .map(|(_, fmt, _)| fmt)
            .unwrap_or(DtcFormatType::Unknown(0));
        Ok(parse_dtc_records(&response.payload, fmt))
    }

    /// DTCs in mirror memory whose status matches `status_mask`.
    pub fn get_mirror_memory_dtcs_by_status_mask(
        &self,
        status_mask: u8,
        timeout: Duration,
    ) -> Result<Vec<Dtc>, UdsError> {
        let response = self.read_dtc_information(
            DtcSubFunction::ReportMirrorMemoryDtcByStatusMask,
            vec![status_mask],
            timeout,
        )?;
        let fmt = self
            .get_number_of_dtcs_by_status_mask(status_mask, timeout)
            .map(|(_, fmt, _)| fmt)
            .unwrap_or(DtcFormatType::Unknown(0));
        Ok(parse_dtc_records(&response.payload, fmt))
    }

    /// Number of mirror-memory DTCs whose status matches `status_mask`.
    pub fn get_number_of_mirror_memory_dtcs_by_status_mask(
        &self,
        status_mask: u8,
        timeout: Duration,
    ) -> Result<(u8, DtcFormatType, u16), UdsError> {
        let response = self.read_dtc_information(
            DtcSubFunction::ReportNumberOfMirrorMemoryDtcByStatusMask,
            vec![status_mask],
            timeout,
        )?;
        parse_dtc_count(&response.payload)
    }

    /// Number of OBD-emissions-related DTCs whose status matches `status_mask`.
    pub fn get_number_of_emissions_related_obd_dtcs_by_status_mask(
        &self,
        status_mask: u8,
        timeout: Duration,
    ) -> Result<(u8, DtcFormatType, u16), UdsError> {
        let response = self.read_dtc_information(
            DtcSubFunction::ReportNumberOfEmissionsRelatedObdDtcByStatusMask,
            vec![status_mask],
            timeout,
        )?;
        parse_dtc_count(&response.payload)
    }

    /// OBD-emissions-related DTCs whose status matches `status_mask`.
    pub fn get_emissions_related_obd_dtcs_by_status_mask(
        &self,
        status_mask: u8,
        timeout: Duration,
    ) -> Result<Vec<Dtc>, UdsError> {
        let response = self.read_dtc_information(
            DtcSubFunction::ReportEmissionsRelatedObdDtcByStatusMask,
            vec![status_mask],
            timeout,
        )?;
        let fmt = self
            .get_number_of_dtcs_by_status_mask(status_mask, timeout)
            .map(|(_, fmt, _)| fmt)
            .unwrap_or(DtcFormatType::Unknown(0));
        Ok(parse_dtc_records(&response.payload, fmt))
    }

    /// Raw extended-data record(s) for `dtc`. `0xFF` for
    /// `extended_data_record_number` requests every record.
    pub fn get_dtc_extended_data_record_by_dtc_number(
        &self,
        dtc: u32,
        extended_data_record_number: u8,
        timeout: Duration,
    ) -> Result<Vec<u8>, UdsError> {
        let response = self.read_dtc_information(
            DtcSubFunction::ReportDtcExtendedDataRecordByDtcNumber,
            vec![
                (dtc >> 16) as u8,
                (dtc >> 8) as u8,
                dtc as u8,
                extended_data_record_number,
            ],
            timeout,
        )?;
        Ok(response.payload)
    }

    /// Raw mirror-memory extended-data record(s) for `dtc`.
    pub fn get_mirror_memory_dtc_extended_data_record_by_dtc_number(
        &self,
        dtc: u32,
        extended_data_record_number: u8,
        timeout: Duration,
    ) -> Result<Vec<u8>, UdsError> {
        let response = self.read_dtc_information(
            DtcSubFunction::ReportMirrorMemoryDtcExtendedDataRecordByDtcNumber,
            vec![
                (dtc >> 16) as u8,
                (dtc >> 8) as u8,
                dtc as u8,
                extended_data_record_number,
            ],
            timeout,
        )?;
        Ok(response.payload)
    }

    /// Every DTC the ECU is capable of reporting, regardless of status.
    pub fn get_supported_dtc(&self, timeout: Duration) -> Result<Vec<Dtc>, UdsError> {
        let response =
            self.read_dtc_information(DtcSubFunction::ReportSupportedDtc, Vec::new(), timeout)?;
        let fmt = self
            .get_number_of_dtcs_by_status_mask(0xFF, timeout)
            .map(|(_, fmt, _)| fmt)
            .unwrap_or(DtcFormatType::Unknown(0));
        Ok(parse_dtc_records(&response.payload, fmt))
    }

    /// `(DTC code, fault detection counter)` for every DTC not yet confirmed
    /// pending or confirmed.
    pub fn get_dtc_fault_detection_counter(
        &self,
        timeout: Duration,
    ) -> Result<Vec<(u32, u8)>, UdsError> {
        let response = self.read_dtc_information(
            DtcSubFunction::ReportDtcFaultDetectionCounter,
            Vec::new(),
            timeout,
        )?;
        Ok(response
            .payload
            .chunks_exact(4)
            .map(|c| {
                let code = u32::from_be_bytes([0, c[0], c[1], c[2]]);
                (code, c[3])
            })
            .collect())
    }

    /// DTCs with a permanent status, as maintained separately from the
    /// regular DTC status byte.
    pub fn get_dtc_with_permanent_status(&self, timeout: Duration) -> Result<Vec<Dtc>, UdsError> {
        let response = self.read_dtc_information(
            DtcSubFunction::ReportDtcWithPermanentStatus,
            Vec::new(),
            timeout,
        )?;
        Ok(parse_dtc_records(&response.payload, DtcFormatType::Iso14229_1))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_dtc_records_skips_status_availability_byte() {
        let payload = vec![0x7B, 0x01, 0x00, 0x0C, 0x89];
        let dtcs = parse_dtc_records(&payload, DtcFormatType::Iso14229_1);
        assert_eq!(dtcs.len(), 1);
        assert_eq!(dtcs[0].raw, 0x01000C);
        assert!(dtcs[0].mil_on());
    }

    #[test]
    fn parse_dtc_count_reads_status_format_and_count() {
        let payload = vec![0x7B, 0x01, 0x00, 0x0C];
        let (avail, fmt, count) = parse_dtc_count(&payload).unwrap();
        assert_eq!(avail, 0x7B);
        assert_eq!(fmt, DtcFormatType::Iso14229_1);
        assert_eq!(count, 0x000C);
    }
}
