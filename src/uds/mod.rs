//! The UDS (ISO 14229-1) session engine: request/response framing atop an
//! ISO-TP channel, session state tracking, and the one-to-one service
//! wrappers in the sibling modules.

pub mod clear_diagnostic_information;
pub mod communication_control;
pub mod control_dtc_setting;
pub mod data_transfer;
pub mod diagnostic_session_control;
pub mod ecu_reset;
pub mod link_control;
pub mod nrc;
pub mod read_data_by_identifier;
pub mod read_dtc_information;
pub mod read_memory_by_address;
pub mod response_on_event;
pub mod routine_control;
pub mod scaling_data;
pub mod security_access;
pub mod service;
pub mod tester_present;
pub mod write_data_by_identifier;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

pub use nrc::Nrc;
pub use service::UdsService;

use crate::isotp::{DoneStatus, IsoTpChannel, RecvError, SendError};

/// A UDS request, ready to be encoded and handed to ISO-TP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdsRequest {
    /// Service id.
    pub service: UdsService,
    /// Sub-function byte, when this service defines one. Bit 7 is the
    /// suppress-positive-response flag and is never set here directly —
    /// [`UdsSessionEngine::send_and_forget`] sets it itself.
    pub sub_function: Option<u8>,
    /// Request-specific payload, after SID and sub-function.
    pub payload: Vec<u8>,
    /// How long [`UdsSessionEngine::send_request`] waits for a response.
    pub timeout: Duration,
    /// Whether a response is expected at all.
    pub expect_response: bool,
}

impl UdsRequest {
    /// Builds a request with no sub-function.
    pub fn new(service: UdsService, payload: Vec<u8>, timeout: Duration) -> Self {
        Self {
            service,
            sub_function: None,
            payload,
            timeout,
            expect_response: true,
        }
    }

    /// Builds a request carrying a sub-function byte.
    pub fn with_sub_function(
        service: UdsService,
        sub_function: u8,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Self {
        Self {
            service,
            sub_function: Some(sub_function),
            payload,
            timeout,
            expect_response: true,
        }
    }

    fn encode(&self, suppress_positive_response: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.payload.len());
        out.push(self.service.as_byte());
        if let Some(sf) = self.sub_function {
            let sf = if suppress_positive_response { sf | 0x80 } else { sf };
            out.push(sf);
        }
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Polarity of a decoded [`UdsResponse`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    /// `B & 0x40 == 0x40`, effective SID = `B - 0x40`.
    Positive,
    /// `0x7F SID NRC`.
    Negative,
}

/// A UDS response, correlated to the request that produced it by SID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdsResponse {
    /// Effective (unmasked) service id.
    pub service: UdsService,
    /// Echoed sub-function, present when the originating request had one.
    pub sub_function: Option<u8>,
    /// Response payload, after SID/sub-function (positive) or NRC (negative).
    pub payload: Vec<u8>,
    /// Response polarity.
    pub polarity: Polarity,
    /// Negative response code, present only when `polarity` is `Negative`.
    pub nrc: Option<Nrc>,
    /// Wall-clock arrival time.
    pub timestamp: SystemTime,
}

impl UdsResponse {
    /// True if this is a positive response.
    pub fn is_positive(&self) -> bool {
        self.polarity == Polarity::Positive
    }
}

/// Diagnostic session type, ISO 14229-1 `DiagnosticSessionControl` (0x10).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionType {
    /// Default session; active on ECU power-up.
    Default,
    /// Programming session: flashing/reprogramming services enabled.
    Programming,
    /// Extended session: adjustment/calibration services enabled.
    Extended,
    /// Safety-system session.
    SafetySystem,
    /// vehicleManufacturerSpecific (0x40-0x5F) or systemSupplierSpecific
    /// (0x60-0x7E) session.
    Other(u8),
}

impl From<u8> for SessionType {
    fn from(value: u8) -> Self {
        match value {
            0x01 => Self::Default,
            0x02 => Self::Programming,
            0x03 => Self::Extended,
            0x04 => Self::SafetySystem,
            other => Self::Other(other),
        }
    }
}

impl From<SessionType> for u8 {
    fn from(value: SessionType) -> u8 {
        match value {
            SessionType::Default => 0x01,
            SessionType::Programming => 0x02,
            SessionType::Extended => 0x03,
            SessionType::SafetySystem => 0x04,
            SessionType::Other(b) => b,
        }
    }
}

impl Default for SessionType {
    fn default() -> Self {
        Self::Default
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Current UDS session state, owned by one [`UdsSessionEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Current diagnostic session type.
    pub session_type: SessionType,
    /// Current security level; 0 = locked.
    pub security_level: u8,
    /// Negotiated P2 (ms), updated by `DiagnosticSessionControl` responses.
    #[serde(with = "duration_millis")]
    pub p2: Duration,
    /// Negotiated P2* (ms), updated by `DiagnosticSessionControl` responses.
    #[serde(with = "duration_millis")]
    pub p2_star: Duration,
    /// Wall-clock time this session was entered (process start, or the last
    /// successful `DiagnosticSessionControl`).
    pub entered_at: SystemTime,
    /// Seed most recently returned by an odd-valued `SecurityAccess`
    /// sub-function, held until the matching send-key call consumes it.
    pub last_security_seed: Option<Vec<u8>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            session_type: SessionType::Default,
            security_level: 0,
            p2: Duration::from_millis(50),
            p2_star: Duration::from_millis(5000),
            entered_at: SystemTime::now(),
            last_security_seed: None,
        }
    }
}

/// Error surfaced by [`UdsSessionEngine::send_request`]/`send_and_forget`.
#[derive(Debug, thiserror::Error)]
pub enum UdsError {
    /// A request for this SID is already outstanding.
    #[error("a request for this service is already outstanding")]
    Busy,
    /// No response arrived within the request's (possibly P2*-extended) budget.
    #[error("timed out waiting for a response")]
    Timeout,
    /// The ISO-TP transport aborted, timed out or overflowed mid-transfer.
    #[error("transport failure: {0:?}")]
    Transport(DoneStatus),
    /// The reader thread has shut down; the engine is no longer usable.
    #[error("UDS session engine reader is no longer running")]
    Aborted,
    /// A positive response arrived but its payload could not be decoded.
    #[error("malformed response payload: {0}")]
    MalformedResponse(String),
}

impl From<SendError> for UdsError {
    fn from(_: SendError) -> Self {
        UdsError::Busy
    }
}

struct Waiter {
    sender: mpsc::Sender<UdsResponse>,
    has_sub_function: bool,
}

/// One UDS session atop one ISO-TP channel.
pub struct UdsSessionEngine {
    isotp: Arc<IsoTpChannel>,
    state: Arc<Mutex<SessionState>>,
    waiters: Arc<Mutex<HashMap<u8, Waiter>>>,
    reader_running: Arc<AtomicBool>,
    keep_alive_running: Arc<AtomicBool>,
}

impl std::fmt::Debug for UdsSessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdsSessionEngine").finish_non_exhaustive()
    }
}

impl UdsSessionEngine {
    /// Builds a session atop `isotp`, starting its response-reader thread.
    pub fn new(isotp: Arc<IsoTpChannel>) -> Self {
        let state = Arc::new(Mutex::new(SessionState::default()));
        let waiters: Arc<Mutex<HashMap<u8, Waiter>>> = Arc::new(Mutex::new(HashMap::new()));
        let reader_running = Arc::new(AtomicBool::new(true));

        let reader_isotp = isotp.clone();
        let reader_waiters = waiters.clone();
        let reader_flag = reader_running.clone();
        std::thread::spawn(move || {
            while reader_flag.load(Ordering::SeqCst) {
                match reader_isotp.recv_message(Duration::from_millis(200)) {
                    Ok(bytes) => dispatch_response(&reader_waiters, &bytes),
                    Err(RecvError::Timeout) => {}
                }
            }
        });

        Self {
            isotp,
            state,
            waiters,
            reader_running,
            keep_alive_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Snapshot of the current session state.
    pub fn session_info(&self) -> SessionState {
        self.state.lock().unwrap().clone()
    }

    /// Sends `request` and blocks for a correlated response, transparently
    /// extending the wait with P2* while the ECU keeps returning NRC 0x78
    /// (response pending).
    pub fn send_request(&self, request: UdsRequest) -> Result<UdsResponse, UdsError> {
        let sid_byte = request.service.as_byte();
        let (tx, rx) = mpsc::channel();
        {
            let mut waiters = self.waiters.lock().unwrap();
            if waiters.contains_key(&sid_byte) {
                return Err(UdsError::Busy);
            }
            waiters.insert(
                sid_byte,
                Waiter {
                    sender: tx,
                    has_sub_function: request.sub_function.is_some(),
                },
            );
        }
        let _guard = WaiterGuard {
            waiters: &self.waiters,
            sid: sid_byte,
        };

        let bytes = request.encode(false);
        let (done_tx, done_rx) = mpsc::channel();
        self.isotp.send_message(bytes, move |status| {
            let _ = done_tx.send(status);
        })?;

        let mut budget = request.timeout;
        loop {
            let mut remaining = budget;
            loop {
                let chunk = remaining.min(Duration::from_millis(50));
                match rx.recv_timeout(chunk) {
                    Ok(response) => {
                        if response.nrc == Some(Nrc::RequestCorrectlyReceivedResponsePending) {
                            debug!("0x{sid_byte:02X} response pending, extending wait with P2*");
                            budget = self.state.lock().unwrap().p2_star;
                            break;
                        }
                        self.apply_state_side_effects(&request, &response);
                        return Ok(response);
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        if let Ok(status) = done_rx.try_recv() {
                            if status != DoneStatus::Success {
                                return Err(UdsError::Transport(status));
                            }
                        }
                        if chunk >= remaining {
                            return Err(UdsError::Timeout);
                        }
                        remaining -= chunk;
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => return Err(UdsError::Aborted),
                }
            }
        }
    }

    /// Sends `request` with the suppress-positive-response bit set (when a
    /// sub-function is present) and returns as soon as ISO-TP accepts it.
    pub fn send_and_forget(&self, request: UdsRequest) -> Result<(), UdsError> {
        let bytes = request.encode(true);
        self.isotp.send_message(bytes, |_status| {})?;
        Ok(())
    }

    fn apply_state_side_effects(&self, request: &UdsRequest, response: &UdsResponse) {
        if !response.is_positive() {
            return;
        }
        match request.service {
            UdsService::DiagnosticSessionControl => {
                if response.payload.len() >= 4 {
                    let p2 = u16::from_be_bytes([response.payload[0], response.payload[1]]);
                    let p2_star = u16::from_be_bytes([response.payload[2], response.payload[3]]);
                    let mut state = self.state.lock().unwrap();
                    if let Some(sf) = response.sub_function {
                        state.session_type = SessionType::from(sf & 0x7F);
                    }
                    state.p2 = Duration::from_millis(p2 as u64);
                    state.p2_star = Duration::from_millis(p2_star as u64);
                    state.entered_at = response.timestamp;
                } else {
                    warn!("DiagnosticSessionControl positive response too short to carry P2/P2*");
                }
            }
            UdsService::SecurityAccess => {
                if let Some(sf) = response.sub_function {
                    let sf = sf & 0x7F;
                    let mut state = self.state.lock().unwrap();
                    if sf % 2 == 1 {
                        state.last_security_seed = Some(response.payload.clone());
                    } else {
                        state.security_level = sf / 2;
                    }
                }
            }
            _ => {}
        }
    }

    /// Starts a background task issuing a suppressed `TesterPresent` every
    /// `period` until [`UdsSessionEngine::stop_keep_alive`] is called.
    pub fn start_keep_alive(self: &Arc<Self>, period: Duration) {
        self.keep_alive_running.store(true, Ordering::SeqCst);
        let engine = self.clone();
        std::thread::spawn(move || {
            while engine.keep_alive_running.load(Ordering::SeqCst) {
                std::thread::sleep(period);
                if !engine.keep_alive_running.load(Ordering::SeqCst) {
                    break;
                }
                let request = UdsRequest::with_sub_function(
                    UdsService::TesterPresent,
                    0x00,
                    Vec::new(),
                    engine.state.lock().unwrap().p2,
                );
                if let Err(e) = engine.send_and_forget(request) {
                    warn!("keep-alive tester present failed: {e}");
                }
            }
        });
    }

    /// Stops the keep-alive task started by `start_keep_alive`.
    pub fn stop_keep_alive(&self) {
        self.keep_alive_running.store(false, Ordering::SeqCst);
    }
}

impl Drop for UdsSessionEngine {
    fn drop(&mut self) {
        self.reader_running.store(false, Ordering::SeqCst);
        self.keep_alive_running.store(false, Ordering::SeqCst);
    }
}

struct WaiterGuard<'a> {
    waiters: &'a Mutex<HashMap<u8, Waiter>>,
    sid: u8,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.waiters.lock().unwrap().remove(&self.sid);
    }
}

fn dispatch_response(waiters: &Mutex<HashMap<u8, Waiter>>, bytes: &[u8]) {
    let Some(&first) = bytes.first() else {
        trace!("discarding empty UDS response frame");
        return;
    };
    let now = SystemTime::now();
    let (sid, response) = if first == 0x7F {
        if bytes.len() < 3 {
            warn!("discarding truncated negative response");
            return;
        }
        let sid = bytes[1];
        let nrc = Nrc::from(bytes[2]);
        (
            sid,
            UdsResponse {
                service: UdsService::from(sid),
                sub_function: None,
                payload: bytes[3..].to_vec(),
                polarity: Polarity::Negative,
                nrc: Some(nrc),
                timestamp: now,
            },
        )
    } else if first & 0x40 == 0x40 {
        let sid = first - 0x40;
        let has_sub_function = waiters
            .lock()
            .unwrap()
            .get(&sid)
            .map(|w| w.has_sub_function)
            .unwrap_or(false);
        let rest = &bytes[1..];
        let (sub_function, payload) = if has_sub_function && !rest.is_empty() {
            (Some(rest[0]), rest[1..].to_vec())
        } else {
            (None, rest.to_vec())
        };
        (
            sid,
            UdsResponse {
                service: UdsService::from(sid),
                sub_function,
                payload,
                polarity: Polarity::Positive,
                nrc: None,
                timestamp: now,
            },
        )
    } else {
        debug!("discarding malformed UDS response, first byte 0x{first:02X}");
        return;
    };

    let waiters_guard = waiters.lock().unwrap();
    if let Some(waiter) = waiters_guard.get(&sid) {
        let _ = waiter.sender.send(response);
    } else {
        trace!("no outstanding waiter for SID 0x{sid:02X}, discarding response");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::channel::CanChannelConfig;
    use crate::hardware::loopback::LoopbackBus;
    use crate::isotp::LinkConfig;

    fn build_pair() -> (Arc<IsoTpChannel>, Arc<IsoTpChannel>) {
        let bus = LoopbackBus::new();
        let mut tester_end = bus.open_channel();
        let mut ecu_end = bus.open_channel();
        tester_end.open(CanChannelConfig::default()).unwrap();
        ecu_end.open(CanChannelConfig::default()).unwrap();
        let tester: Arc<dyn crate::channel::CanChannel> = Arc::new(tester_end);
        let ecu: Arc<dyn crate::channel::CanChannel> = Arc::new(ecu_end);
        let tester_cfg = LinkConfig {
            rx_id: 0x7E8,
            tx_id: 0x7E0,
            ..Default::default()
        };
        let ecu_cfg = LinkConfig {
            rx_id: 0x7E0,
            tx_id: 0x7E8,
            ..Default::default()
        };
        (
            Arc::new(IsoTpChannel::new(tester, tester_cfg).unwrap()),
            Arc::new(IsoTpChannel::new(ecu, ecu_cfg).unwrap()),
        )
    }

    #[test]
    fn tester_present_round_trip_and_busy_gate() {
        let (tester_isotp, ecu_isotp) = build_pair();
        let tester = UdsSessionEngine::new(tester_isotp);

        let ecu_isotp_for_reply = ecu_isotp.clone();
        std::thread::spawn(move || {
            let received = ecu_isotp_for_reply.recv_message(Duration::from_millis(1000)).unwrap();
            assert_eq!(received, vec![0x3E, 0x00]);
            ecu_isotp_for_reply.send_message(vec![0x7E, 0x00], |_| {}).unwrap();
        });

        let request = UdsRequest::with_sub_function(
            UdsService::TesterPresent,
            0x00,
            Vec::new(),
            Duration::from_millis(500),
        );
        let response = tester.send_request(request).unwrap();
        assert!(response.is_positive());
        assert_eq!(response.service, UdsService::TesterPresent);
    }
}
