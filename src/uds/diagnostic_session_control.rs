//! `DiagnosticSessionControl` (0x10): moves the ECU between diagnostic
//! session types.

use std::time::Duration;

use super::{SessionType, UdsError, UdsRequest, UdsResponse, UdsService, UdsSessionEngine};

impl UdsSessionEngine {
    /// Requests `session` and waits for the ECU's acknowledgement, which
    /// updates [`SessionState`](super::SessionState) via the engine's normal
    /// side-effect handling.
    pub fn diagnostic_session_control(
        &self,
        session: SessionType,
        timeout: Duration,
    ) -> Result<UdsResponse, UdsError> {
        let request = UdsRequest::with_sub_function(
            UdsService::DiagnosticSessionControl,
            session.into(),
            Vec::new(),
            timeout,
        );
        self.send_request(request)
    }
}
