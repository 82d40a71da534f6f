//! `RoutineControl` (0x31): starts, stops and polls OEM-defined routines
//! identified by a 16-bit routine identifier.

use std::time::Duration;

use super::{UdsError, UdsRequest, UdsResponse, UdsService, UdsSessionEngine};

/// `routineControlType` sub-function.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RoutineControlType {
    /// Starts the routine.
    StartRoutine,
    /// Stops a running routine.
    StopRoutine,
    /// Requests the results of a completed or running routine.
    RequestRoutineResults,
}

impl From<RoutineControlType> for u8 {
    fn from(value: RoutineControlType) -> u8 {
        match value {
            RoutineControlType::StartRoutine => 0x01,
            RoutineControlType::StopRoutine => 0x02,
            RoutineControlType::RequestRoutineResults => 0x03,
        }
    }
}

impl UdsSessionEngine {
    /// Issues `routine_control_type` against `routine_id`, with an optional
    /// routine-specific option record appended.
    pub fn routine_control(
        &self,
        routine_control_type: RoutineControlType,
        routine_id: u16,
        option_record: &[u8],
        timeout: Duration,
    ) -> Result<UdsResponse, UdsError> {
        let mut payload = routine_id.to_be_bytes().to_vec();
        payload.extend_from_slice(option_record);
        let request = UdsRequest::with_sub_function(
            UdsService::RoutineControl,
            routine_control_type.into(),
            payload,
            timeout,
        );
        self.send_request(request)
    }
}
