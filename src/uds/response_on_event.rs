//! `ResponseOnEvent` (0x86): arms the ECU to autonomously re-send a stored
//! request whenever a configured event occurs.

use std::time::Duration;

use super::{UdsError, UdsRequest, UdsResponse, UdsService, UdsSessionEngine};

/// `eventType` sub-function.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EventType {
    /// Disarms every currently armed event.
    StopResponseOnEvent,
    /// Arms on a DTC status change.
    OnDtcStatusChange,
    /// Arms on a periodic timer interrupt.
    OnTimerInterrupt,
    /// Arms on a data identifier's value changing.
    OnChangeOfDataIdentifier,
    /// Reports which events are currently armed, without changing them.
    ReportActivatedEvents,
    /// Arms the event(s) configured by a prior `OnDtcStatusChange` /
    /// `OnTimerInterrupt` / `OnChangeOfDataIdentifier` call.
    StartResponseOnEvent,
    /// Clears a previously configured event without disarming others.
    ClearResponseOnEvent,
    /// Arms on a data identifier crossing a comparison threshold.
    OnComparisonOfValues,
}

impl From<EventType> for u8 {
    fn from(value: EventType) -> u8 {
        match value {
            EventType::StopResponseOnEvent => 0x00,
            EventType::OnDtcStatusChange => 0x01,
            EventType::OnTimerInterrupt => 0x02,
            EventType::OnChangeOfDataIdentifier => 0x03,
            EventType::ReportActivatedEvents => 0x04,
            EventType::StartResponseOnEvent => 0x05,
            EventType::ClearResponseOnEvent => 0x06,
            EventType::OnComparisonOfValues => 0x07,
        }
    }
}

impl UdsSessionEngine {
    /// Issues a `ResponseOnEvent` request. `store_event` controls the
    /// `storageState` bit (bit 6 of the sub-function byte): when set, the
    /// ECU retains the event configuration across a power cycle.
    pub fn response_on_event(
        &self,
        event_type: EventType,
        store_event: bool,
        event_window_time: u8,
        event_type_record: &[u8],
        timeout: Duration,
    ) -> Result<UdsResponse, UdsError> {
        let mut sub_function: u8 = event_type.into();
        if store_event {
            sub_function |= 0x40;
        }
        let mut payload = vec![event_window_time];
        payload.extend_from_slice(event_type_record);
        let request =
            UdsRequest::with_sub_function(UdsService::ResponseOnEvent, sub_function, payload, timeout);
        self.send_request(request)
    }
}
