//! `ReadMemoryByAddress` (0x23): reads a block of ECU memory directly.

use std::time::Duration;

use super::{UdsError, UdsRequest, UdsService, UdsSessionEngine};

/// `addressAndLengthFormatIdentifier` is always encoded with 4 byte memory
/// addresses and 4 byte memory sizes: nibble pair `0x44`.
const ADDRESS_AND_LENGTH_FORMAT: u8 = 0x44;

impl UdsSessionEngine {
    /// Reads `memory_size` bytes starting at `memory_address`.
    pub fn read_memory_by_address(
        &self,
        memory_address: u32,
        memory_size: u32,
        timeout: Duration,
    ) -> Result<Vec<u8>, UdsError> {
        let mut payload = vec![ADDRESS_AND_LENGTH_FORMAT];
        payload.extend_from_slice(&memory_address.to_be_bytes());
        payload.extend_from_slice(&memory_size.to_be_bytes());
        let request = UdsRequest::new(UdsService::ReadMemoryByAddress, payload, timeout);
        let response = self.send_request(request)?;
        Ok(response.payload)
    }
}
