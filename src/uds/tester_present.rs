//! `TesterPresent` (0x3E): explicit single-shot keep-alive, distinct from
//! [`UdsSessionEngine::start_keep_alive`]'s periodic background task.

use std::time::Duration;

use super::{UdsError, UdsRequest, UdsResponse, UdsService, UdsSessionEngine};

impl UdsSessionEngine {
    /// Sends a single `TesterPresent` and waits for the positive response.
    pub fn tester_present(&self, timeout: Duration) -> Result<UdsResponse, UdsError> {
        let request =
            UdsRequest::with_sub_function(UdsService::TesterPresent, 0x00, Vec::new(), timeout);
        self.send_request(request)
    }
}
