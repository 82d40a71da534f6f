//! C ABI bindings for `uds_diag_core`.
//!
//! IMPORTANT: every function in this crate operates on one global session.
//! Access from a single thread only; there is no support for concurrent
//! sessions or for calling from more than one thread at a time.

#[cfg(feature = "socketcan")]
use std::ffi::CStr;
#[cfg(feature = "socketcan")]
use std::os::raw::c_char;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use uds_diag_core::channel::{CanChannel, CanChannelConfig};
use uds_diag_core::hardware::loopback::LoopbackBus;
use uds_diag_core::isotp::{IsoTpChannel, LinkConfig};
use uds_diag_core::uds::{UdsRequest, UdsService, UdsSessionEngine};
use uds_diag_core::DiagError;

#[cfg(feature = "socketcan")]
use uds_diag_core::hardware::socketcan::SocketCanChannel;

/// Last negative response code received, valid only after a call to
/// [`send_uds_request`] returns [`DiagServerResult::EcuError`].
static LAST_NRC: OnceLock<Mutex<u8>> = OnceLock::new();

struct Session {
    /// Kept alive for as long as the session runs; the [`IsoTpChannel`]
    /// only holds an `Arc<dyn CanChannel>`, but this keeps backend-specific
    /// handles (e.g. the socketcan socket) from dropping early.
    #[allow(dead_code)]
    can: Arc<dyn CanChannel>,
    uds: UdsSessionEngine,
}

static SESSION: OnceLock<Mutex<Option<Session>>> = OnceLock::new();

fn session_slot() -> &'static Mutex<Option<Session>> {
    SESSION.get_or_init(|| Mutex::new(None))
}

fn last_nrc_slot() -> &'static Mutex<u8> {
    LAST_NRC.get_or_init(|| Mutex::new(0))
}

/// FFI result code for every exported function in this crate.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagServerResult {
    /// Operation completed successfully.
    Ok = 0,
    /// A session is already open; call [`close_session`] first.
    AlreadyOpen = 1,
    /// No session is open.
    NoSession = 2,
    /// The ECU responded with a negative response; call [`get_last_nrc`]
    /// for the code.
    EcuError = 3,
    /// The request timed out waiting for a response.
    Timeout = 4,
    /// A request for this service was already outstanding.
    Busy = 5,
    /// The CAN or ISO-TP transport failed.
    TransportError = 6,
    /// A positive response arrived but could not be decoded.
    MalformedResponse = 7,
    /// An argument passed across the FFI boundary was invalid.
    InvalidArgument = 8,
}

impl From<DiagError> for DiagServerResult {
    fn from(value: DiagError) -> Self {
        match value {
            DiagError::Uds(e) => e.into(),
            _ => DiagServerResult::TransportError,
        }
    }
}

impl From<uds_diag_core::uds::UdsError> for DiagServerResult {
    fn from(value: uds_diag_core::uds::UdsError) -> Self {
        use uds_diag_core::uds::UdsError;
        match value {
            UdsError::Busy => DiagServerResult::Busy,
            UdsError::Timeout => DiagServerResult::Timeout,
            UdsError::MalformedResponse(_) => DiagServerResult::MalformedResponse,
            UdsError::Transport(_) | UdsError::Aborted => DiagServerResult::TransportError,
        }
    }
}

/// A UDS request/response payload passed across the FFI boundary.
///
/// For [`send_uds_request`], `sub_function` is ignored when negative, and
/// `data`/`data_len` describe the request payload on input. On a positive
/// response, `data`/`data_len` are overwritten to describe the response
/// payload; the caller is responsible for treating that memory as
/// borrowed only until the next call into this crate.
#[repr(C)]
#[derive(Debug)]
pub struct UdsPayload {
    /// Service id.
    pub sid: u8,
    /// Sub-function byte, or -1 when this service carries none.
    pub sub_function: i32,
    /// Pointer to the payload bytes.
    pub data: *mut u8,
    /// Payload length in bytes.
    pub data_len: u32,
}

/// Scratch buffer backing the most recent response's `data` pointer.
static RESPONSE_SCRATCH: OnceLock<Mutex<Vec<u8>>> = OnceLock::new();

fn response_scratch() -> &'static Mutex<Vec<u8>> {
    RESPONSE_SCRATCH.get_or_init(|| Mutex::new(Vec::new()))
}

/// Opens a session over an in-process loopback bus, for testing without
/// real hardware. `rx_id`/`tx_id` are the ISO-TP arbitration ids this
/// session uses; nothing is listening on the other end unless a second
/// loopback endpoint is opened separately.
#[no_mangle]
pub extern "C" fn open_session_loopback(rx_id: u32, tx_id: u32) -> DiagServerResult {
    let mut slot = match session_slot().lock() {
        Ok(g) => g,
        Err(_) => return DiagServerResult::TransportError,
    };
    if slot.is_some() {
        return DiagServerResult::AlreadyOpen;
    }

    let bus = LoopbackBus::new();
    let mut channel = bus.open_channel();
    if channel.open(CanChannelConfig::default()).is_err() {
        return DiagServerResult::TransportError;
    }
    let can: Arc<dyn CanChannel> = Arc::new(channel);

    let config = LinkConfig {
        rx_id,
        tx_id,
        ..LinkConfig::default()
    };
    let isotp = match IsoTpChannel::new(can.clone(), config) {
        Ok(c) => Arc::new(c),
        Err(_) => return DiagServerResult::TransportError,
    };

    *slot = Some(Session {
        can,
        uds: UdsSessionEngine::new(isotp),
    });
    DiagServerResult::Ok
}

/// Opens a session over a real socketcan interface, e.g. `"can0"`.
#[cfg(feature = "socketcan")]
#[no_mangle]
pub extern "C" fn open_session_socketcan(
    iface: *const c_char,
    rx_id: u32,
    tx_id: u32,
    bitrate: u32,
) -> DiagServerResult {
    if iface.is_null() {
        return DiagServerResult::InvalidArgument;
    }
    let iface = match unsafe { CStr::from_ptr(iface) }.to_str() {
        Ok(s) => s,
        Err(_) => return DiagServerResult::InvalidArgument,
    };

    let mut slot = match session_slot().lock() {
        Ok(g) => g,
        Err(_) => return DiagServerResult::TransportError,
    };
    if slot.is_some() {
        return DiagServerResult::AlreadyOpen;
    }

    let mut channel = SocketCanChannel::new(iface);
    let config = CanChannelConfig {
        bitrate,
        ..CanChannelConfig::default()
    };
    if channel.open(config).is_err() {
        return DiagServerResult::TransportError;
    }
    let can: Arc<dyn CanChannel> = Arc::new(channel);

    let link_config = LinkConfig {
        rx_id,
        tx_id,
        ..LinkConfig::default()
    };
    let isotp = match IsoTpChannel::new(can.clone(), link_config) {
        Ok(c) => Arc::new(c),
        Err(_) => return DiagServerResult::TransportError,
    };

    *slot = Some(Session {
        can,
        uds: UdsSessionEngine::new(isotp),
    });
    DiagServerResult::Ok
}

/// Closes the current session, if one is open. Idempotent.
#[no_mangle]
pub extern "C" fn close_session() {
    if let Ok(mut slot) = session_slot().lock() {
        *slot = None;
    }
}

/// Sends a UDS request and, if it carries a positive response, overwrites
/// `payload`'s `data`/`data_len` with the response payload.
///
/// The returned pointer is valid only until the next call into this crate
/// from the same thread.
#[no_mangle]
pub extern "C" fn send_uds_request(payload: &mut UdsPayload, timeout_ms: u32) -> DiagServerResult {
    let slot = match session_slot().lock() {
        Ok(g) => g,
        Err(_) => return DiagServerResult::TransportError,
    };
    let session = match slot.as_ref() {
        Some(s) => s,
        None => return DiagServerResult::NoSession,
    };

    if payload.data_len > 0 && payload.data.is_null() {
        return DiagServerResult::InvalidArgument;
    }
    let request_payload = if payload.data_len == 0 {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(payload.data, payload.data_len as usize) }.to_vec()
    };

    let service = UdsService::from(payload.sid);
    let timeout = Duration::from_millis(timeout_ms as u64);
    let request = match payload.sub_function {
        sf if sf < 0 => UdsRequest::new(service, request_payload, timeout),
        sf => UdsRequest::with_sub_function(service, sf as u8, request_payload, timeout),
    };

    match session.uds.send_request(request) {
        Ok(response) => {
            if !response.is_positive() {
                if let Some(nrc) = response.nrc {
                    if let Ok(mut last) = last_nrc_slot().lock() {
                        *last = nrc.as_byte();
                    }
                }
                return DiagServerResult::EcuError;
            }
            let mut scratch = response_scratch().lock().unwrap();
            *scratch = response.payload;
            payload.data = scratch.as_mut_ptr();
            payload.data_len = scratch.len() as u32;
            payload.sub_function = response.sub_function.map(|b| b as i32).unwrap_or(-1);
            DiagServerResult::Ok
        }
        Err(e) => e.into(),
    }
}

/// The negative response code from the most recent [`DiagServerResult::EcuError`].
#[no_mangle]
pub extern "C" fn get_last_nrc() -> u8 {
    last_nrc_slot().lock().map(|g| *g).unwrap_or(0)
}
