//! `ReadDataByIdentifier` (0x22): reads one or more data-identifier-keyed
//! values from the ECU in a single request.

use std::time::Duration;

use super::{UdsError, UdsRequest, UdsService, UdsSessionEngine};

impl UdsSessionEngine {
    /// Reads a single data identifier and returns its raw value bytes.
    pub fn read_data_by_identifier(&self, did: u16, timeout: Duration) -> Result<Vec<u8>, UdsError> {
        let request =
            UdsRequest::new(UdsService::ReadDataByIdentifier, did.to_be_bytes().to_vec(), timeout);
        let response = self.send_request(request)?;
        let payload = &response.payload;
        if payload.len() < 2 {
            return Err(UdsError::MalformedResponse(
                "response shorter than the echoed data identifier".into(),
            ));
        }
        Ok(payload[2..].to_vec())
    }

    /// Reads several data identifiers in one request. Record boundaries in
    /// the combined response depend on each data identifier's (ECU-defined)
    /// record length, which this crate does not know; the raw concatenated
    /// `dataIdentifier, dataRecord` pairs are returned as the ECU sent them
    /// for the caller to split using its own DID length table.
    pub fn read_data_by_identifiers_raw(
        &self,
        dids: &[u16],
        timeout: Duration,
    ) -> Result<Vec<u8>, UdsError> {
        let mut payload = Vec::with_capacity(dids.len() * 2);
        for did in dids {
            payload.extend_from_slice(&did.to_be_bytes());
        }
        let request = UdsRequest::new(UdsService::ReadDataByIdentifier, payload, timeout);
        let response = self.send_request(request)?;
        Ok(response.payload)
    }
}
