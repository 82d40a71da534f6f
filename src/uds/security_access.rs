//! `SecurityAccess` (0x27): seed/key unlocking of security-protected
//! functions and memory regions.

use std::time::Duration;

use super::{UdsError, UdsRequest, UdsService, UdsSessionEngine};

impl UdsSessionEngine {
    /// Requests a seed at the given (odd) security level and returns the
    /// seed bytes. The session engine also stashes the seed in
    /// [`super::SessionState::last_security_seed`].
    ///
    /// `level` must be odd; levels run in requestSeed/sendKey pairs where the
    /// sendKey level is always `level + 1`.
    pub fn security_access_request_seed(
        &self,
        level: u8,
        timeout: Duration,
    ) -> Result<Vec<u8>, UdsError> {
        let request =
            UdsRequest::with_sub_function(UdsService::SecurityAccess, level, Vec::new(), timeout);
        let response = self.send_request(request)?;
        Ok(response.payload)
    }

    /// Sends the computed key back to the ECU at the given (even) send-key
    /// sub-function, unlocking the functions gated behind that security
    /// level on success.
    pub fn security_access_send_key(
        &self,
        send_key_level: u8,
        key: &[u8],
        timeout: Duration,
    ) -> Result<(), UdsError> {
        let request = UdsRequest::with_sub_function(
            UdsService::SecurityAccess,
            send_key_level,
            key.to_vec(),
            timeout,
        );
        self.send_request(request)?;
        Ok(())
    }
}
