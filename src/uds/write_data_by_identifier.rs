//! `WriteDataByIdentifier` (0x2E): writes a data-identifier-keyed value
//! to the ECU.

use std::time::Duration;

use super::{UdsError, UdsRequest, UdsResponse, UdsService, UdsSessionEngine};

impl UdsSessionEngine {
    /// Writes `data` to data identifier `did`.
    pub fn write_data_by_identifier(
        &self,
        did: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<UdsResponse, UdsError> {
        let mut payload = did.to_be_bytes().to_vec();
        payload.extend_from_slice(data);
        let request = UdsRequest::new(UdsService::WriteDataByIdentifier, payload, timeout);
        self.send_request(request)
    }
}
