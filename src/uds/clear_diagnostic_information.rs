//! `ClearDiagnosticInformation` (0x14): clears DTCs from the ECU.

use std::time::Duration;

use super::{UdsError, UdsRequest, UdsResponse, UdsService, UdsSessionEngine};

impl UdsSessionEngine {
    /// Clears diagnostic information matching `dtc_mask`. Only the lower
    /// three bytes of `dtc_mask` are used (0x000000..=0xFFFFFF).
    pub fn clear_diagnostic_information(
        &self,
        dtc_mask: u32,
        timeout: Duration,
    ) -> Result<UdsResponse, UdsError> {
        let request = UdsRequest::new(
            UdsService::ClearDiagnosticInformation,
            vec![(dtc_mask >> 16) as u8, (dtc_mask >> 8) as u8, dtc_mask as u8],
            timeout,
        );
        self.send_request(request)
    }
}
