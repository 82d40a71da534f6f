//! Memory transfer services: `RequestDownload` (0x34), `RequestUpload`
//! (0x35), `TransferData` (0x36) and `RequestTransferExit` (0x37).

use std::time::Duration;

use super::{UdsError, UdsRequest, UdsResponse, UdsService, UdsSessionEngine};

/// `addressAndLengthFormatIdentifier` is always encoded with 4 byte memory
/// addresses and 4 byte memory sizes: nibble pair `0x44`.
const ADDRESS_AND_LENGTH_FORMAT: u8 = 0x44;

fn memory_parameter_record(memory_address: u32, memory_size: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    out.push(ADDRESS_AND_LENGTH_FORMAT);
    out.extend_from_slice(&memory_address.to_be_bytes());
    out.extend_from_slice(&memory_size.to_be_bytes());
    out
}

impl UdsSessionEngine {
    /// Requests a download (tester-to-ECU transfer) of `memory_size` bytes
    /// starting at `memory_address`, formatted with `data_format_identifier`.
    ///
    /// Returns the `maxNumberOfBlockLength` the ECU reported, to size
    /// subsequent `TransferData` chunks against.
    pub fn request_download(
        &self,
        data_format_identifier: u8,
        memory_address: u32,
        memory_size: u32,
        timeout: Duration,
    ) -> Result<Vec<u8>, UdsError> {
        let mut payload = vec![data_format_identifier];
        payload.extend(memory_parameter_record(memory_address, memory_size));
        let request = UdsRequest::new(UdsService::RequestDownload, payload, timeout);
        let response = self.send_request(request)?;
        Ok(response.payload)
    }

    /// Requests an upload (ECU-to-tester transfer) of `memory_size` bytes
    /// starting at `memory_address`.
    pub fn request_upload(
        &self,
        data_format_identifier: u8,
        memory_address: u32,
        memory_size: u32,
        timeout: Duration,
    ) -> Result<Vec<u8>, UdsError> {
        let mut payload = vec![data_format_identifier];
        payload.extend(memory_parameter_record(memory_address, memory_size));
        let request = UdsRequest::new(UdsService::RequestUpload, payload, timeout);
        let response = self.send_request(request)?;
        Ok(response.payload)
    }

    /// Transfers one block of `data`, tagged with `block_sequence_counter`
    /// (wraps 0x00..=0xFF per ISO 14229-1).
    pub fn transfer_data(
        &self,
        block_sequence_counter: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<UdsResponse, UdsError> {
        let request = UdsRequest::with_sub_function(
            UdsService::TransferData,
            block_sequence_counter,
            data.to_vec(),
            timeout,
        );
        self.send_request(request)
    }

    /// Signals the end of a download/upload transfer.
    pub fn request_transfer_exit(&self, timeout: Duration) -> Result<UdsResponse, UdsError> {
        let request = UdsRequest::new(UdsService::RequestTransferExit, Vec::new(), timeout);
        self.send_request(request)
    }
}
