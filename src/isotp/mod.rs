//! ISO-TP (ISO 15765-2) segmentation/reassembly engine: one instance owns a
//! single (rx id, tx id) pair over a shared [`CanChannel`], runs the tx and
//! rx state machines on a dedicated background thread, and exposes a small
//! blocking/callback contract to the layer above (spec §4.2).
//!
//! Mirrors the teacher's `SoftwareIsoTpChannel`: a background thread owns all
//! mutable state and is driven exclusively by an internal command queue, so
//! every external entry point is a message send plus a reply channel.

pub mod pdu;

use std::collections::VecDeque;
use std::fmt;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::channel::{CanChannel, ChannelError, SubscriptionId};
use crate::frame::{CanFlags, CanFrame};
use pdu::{decode_pdu, encode_pdu, FlowStatus, Pdu, SeparationTime};

/// ISO-TP addressing mode. Only [`AddressingMode::Normal`] is implemented;
/// the others are accepted as configuration values but rejected at channel
/// construction time (spec §9 Open Questions).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AddressingMode {
    /// No address-extension byte; the PCI is the first payload byte.
    Normal,
    /// One address-extension byte prepended to the PCI in every frame.
    Extended,
    /// Mixed addressing (extension byte on some frame types only).
    Mixed,
}

/// Link configuration for one ISO-TP channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkConfig {
    /// Arbitration id this channel receives on.
    pub rx_id: u32,
    /// Arbitration id this channel transmits on.
    pub tx_id: u32,
    /// Addressing mode. See [`AddressingMode`].
    pub addressing_mode: AddressingMode,
    /// Use CAN-FD framing (raises SF capacity to 62 and FF length to 32 bits).
    pub fd_enabled: bool,
    /// Right-pad frames below frame capacity.
    pub padding_enabled: bool,
    /// Padding byte used when `padding_enabled`.
    pub padding_byte: u8,
    /// Block size this channel grants as a receiver (CFs between our FCs).
    pub block_size: u8,
    /// Separation time this channel demands as a receiver.
    pub st_min: SeparationTime,
    /// Tester-visible response budget; bounds the wait for the first FC.
    pub p2: Duration,
    /// Extended budget after a Wait/response-pending indication.
    pub p2_star: Duration,
    /// Additional post-response budget; stored for collaborators that layer
    /// session-level pacing atop this channel. Not consumed internally.
    pub p4: Duration,
    /// Maximum time for one transmitted frame to clear the send path.
    pub n_as: Duration,
    /// Maximum time to emit our own FC after a CF/FF triggers one.
    pub n_ar: Duration,
    /// Maximum time awaiting FC while transmitting.
    pub n_bs: Duration,
    /// Maximum time awaiting the next CF while receiving.
    pub n_cr: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            rx_id: 0x7E8,
            tx_id: 0x7E0,
            addressing_mode: AddressingMode::Normal,
            fd_enabled: false,
            padding_enabled: true,
            padding_byte: 0xCC,
            block_size: 8,
            st_min: SeparationTime::Millis(0),
            p2: Duration::from_millis(50),
            p2_star: Duration::from_millis(5000),
            p4: Duration::from_millis(5000),
            n_as: Duration::from_millis(1000),
            n_ar: Duration::from_millis(1000),
            n_bs: Duration::from_millis(1000),
            n_cr: Duration::from_millis(1000),
        }
    }
}

impl LinkConfig {
    /// Largest message `send_message` will accept: 4095 bytes classically,
    /// or 2^32 - 1 once the FD 32-bit First Frame length form is available.
    pub fn max_message_length(&self) -> u64 {
        if self.fd_enabled {
            u32::MAX as u64
        } else {
            0xFFF
        }
    }

    fn sf_capacity(&self) -> usize {
        if self.fd_enabled {
            pdu::SF_CAPACITY_FD
        } else {
            pdu::SF_CAPACITY_CLASSICAL
        }
    }

    fn cf_slice_capacity(&self) -> usize {
        if self.fd_enabled {
            64 - 1
        } else {
            7
        }
    }

    /// First Frame payload slice capacity: frame capacity minus the FF
    /// header (2 bytes for the 12-bit length form, 6 bytes for the FD
    /// 32-bit extended-length form). The FF PCI is wider than a CF's, so
    /// this is distinct from `cf_slice_capacity`.
    fn ff_slice_capacity(&self, total_length: usize) -> usize {
        let frame_cap = if self.fd_enabled { 64 } else { 8 };
        let header_len = if self.fd_enabled && total_length as u32 > pdu::FF_LENGTH_12BIT_MAX {
            6
        } else {
            2
        };
        frame_cap - header_len
    }
}

/// Final outcome delivered to a `send_message` completion callback.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DoneStatus {
    /// The message was fully transmitted.
    Success,
    /// A timer (N_Bs or N_As) expired before completion.
    Timeout,
    /// `reset()` was called, or the channel observed a transport failure.
    Abort,
    /// The receiver signalled FC(Overflow).
    Overflow,
}

/// Error returned synchronously by [`IsoTpChannel::send_message`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The tx state machine is not Idle.
    #[error("ISO-TP channel is busy transmitting")]
    Busy,
    /// Message exceeds `LinkConfig::max_message_length`.
    #[error("message of {0} bytes exceeds the maximum representable length")]
    TooLarge(usize),
}

/// Error returned by [`IsoTpChannel::recv_message`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecvError {
    /// No complete message arrived within the requested timeout.
    #[error("timed out waiting for an inbound message")]
    Timeout,
}

/// Error constructing an [`IsoTpChannel`].
#[derive(Debug, thiserror::Error)]
pub enum IsoTpError {
    /// The requested addressing mode is not implemented.
    #[error("addressing mode {0:?} is not supported")]
    AddressingModeUnsupported(AddressingMode),
    /// The underlying CAN channel failed during setup.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum TxState {
    Idle,
    WaitFc,
    Transmitting,
    Error,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum RxState {
    Idle,
    Receiving,
}

struct TxJob {
    payload: Vec<u8>,
    position: usize,
    sequence: u8,
    block_remaining: u8,
    block_size: u8,
    st_min: SeparationTime,
    last_cf_sent: Option<Instant>,
    deadline: Instant,
    on_done: Box<dyn FnOnce(DoneStatus) + Send>,
}

struct RxJob {
    buffer: Vec<u8>,
    total_length: usize,
    expected_sequence: u8,
    cfs_since_fc: u8,
    deadline: Instant,
}

enum Cmd {
    Send {
        payload: Vec<u8>,
        on_done: Box<dyn FnOnce(DoneStatus) + Send>,
        reply: mpsc::Sender<Result<(), SendError>>,
    },
    Reset {
        reply: mpsc::Sender<()>,
    },
    Shutdown,
}

/// One ISO-TP channel. Owns a background control thread that serializes all
/// state transitions, matching the "single-writer, per-channel mutex"
/// concurrency model (spec §4.2 Concurrency, §5).
pub struct IsoTpChannel {
    config: LinkConfig,
    cmd_tx: mpsc::Sender<Cmd>,
    inbound_rx: std::sync::Mutex<mpsc::Receiver<Vec<u8>>>,
    can: Arc<dyn CanChannel>,
    subscription: SubscriptionId,
}

impl fmt::Debug for IsoTpChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsoTpChannel")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl IsoTpChannel {
    /// Builds a new channel bound to `can`, bringing up its control thread.
    pub fn new(can: Arc<dyn CanChannel>, config: LinkConfig) -> Result<Self, IsoTpError> {
        if config.addressing_mode != AddressingMode::Normal {
            return Err(IsoTpError::AddressingModeUnsupported(config.addressing_mode));
        }

        let (cmd_tx, cmd_rx) = mpsc::channel::<Cmd>();
        let (frame_tx, frame_rx) = mpsc::channel::<CanFrame>();
        let (inbound_tx, inbound_rx) = mpsc::channel::<Vec<u8>>();

        let rx_id = config.rx_id;
        let can_for_sub = can.clone();
        let subscription = can_for_sub.subscribe(Box::new(move |frame: CanFrame| {
            if frame.id == rx_id && !frame.flags.contains(CanFlags::ERROR) {
                let _ = frame_tx.send(frame);
            }
        }));

        let cfg = config;
        let can_for_thread = can.clone();
        std::thread::spawn(move || run_control_loop(cfg, can_for_thread, cmd_rx, frame_rx, inbound_tx));

        Ok(Self {
            config,
            cmd_tx,
            inbound_rx: std::sync::Mutex::new(inbound_rx),
            can,
            subscription,
        })
    }

    /// This channel's link configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Accepts a message for transmission. `on_done` fires exactly once, from
    /// the control thread, once the transfer reaches a terminal state.
    pub fn send_message(
        &self,
        payload: Vec<u8>,
        on_done: impl FnOnce(DoneStatus) + Send + 'static,
    ) -> Result<(), SendError> {
        if payload.len() as u64 > self.config.max_message_length() {
            return Err(SendError::TooLarge(payload.len()));
        }
        let (reply_tx, reply_rx) = mpsc::channel();
        self.cmd_tx
            .send(Cmd::Send {
                payload,
                on_done: Box::new(on_done),
                reply: reply_tx,
            })
            .expect("ISO-TP control thread terminated");
        reply_rx.recv().expect("ISO-TP control thread terminated")
    }

    /// Blocks for up to `timeout` for the next fully reassembled message.
    pub fn recv_message(&self, timeout: Duration) -> Result<Vec<u8>, RecvError> {
        self.inbound_rx
            .lock()
            .unwrap()
            .recv_timeout(timeout)
            .map_err(|_| RecvError::Timeout)
    }

    /// Aborts both directions, clears buffers and timers, and cancels any
    /// pending `send_message` completion with [`DoneStatus::Abort`].
    pub fn reset(&self) {
        let (reply_tx, reply_rx) = mpsc::channel();
        if self.cmd_tx.send(Cmd::Reset { reply: reply_tx }).is_ok() {
            let _ = reply_rx.recv();
        }
    }
}

impl Drop for IsoTpChannel {
    fn drop(&mut self) {
        self.can.unsubscribe(self.subscription);
        let _ = self.cmd_tx.send(Cmd::Shutdown);
    }
}

fn run_control_loop(
    cfg: LinkConfig,
    can: Arc<dyn CanChannel>,
    cmd_rx: mpsc::Receiver<Cmd>,
    frame_rx: mpsc::Receiver<CanFrame>,
    inbound_tx: mpsc::Sender<Vec<u8>>,
) {
    let mut tx_state = TxState::Idle;
    let mut tx_job: Option<TxJob> = None;
    let mut rx_state = RxState::Idle;
    let mut rx_job: Option<RxJob> = None;

    loop {
        match cmd_rx.try_recv() {
            Ok(Cmd::Shutdown) => return,
            Ok(Cmd::Reset { reply }) => {
                if let Some(job) = tx_job.take() {
                    (job.on_done)(DoneStatus::Abort);
                }
                tx_state = TxState::Idle;
                rx_job = None;
                rx_state = RxState::Idle;
                let _ = reply.send(());
            }
            Ok(Cmd::Send {
                payload,
                on_done,
                reply,
            }) => {
                let outcome = start_send(&cfg, &can, &mut tx_state, &mut tx_job, payload, on_done);
                let _ = reply.send(outcome);
            }
            Err(mpsc::TryRecvError::Disconnected) => return,
            Err(mpsc::TryRecvError::Empty) => {}
        }

        if let Ok(frame) = frame_rx.try_recv() {
            handle_frame(
                &cfg,
                &can,
                &frame,
                &mut tx_state,
                &mut tx_job,
                &mut rx_state,
                &mut rx_job,
                &inbound_tx,
            );
        }

        drive_tx(&cfg, &can, &mut tx_state, &mut tx_job);
        drive_rx_timeout(&mut rx_state, &mut rx_job);

        std::thread::sleep(Duration::from_micros(500));
    }
}

fn start_send(
    cfg: &LinkConfig,
    can: &Arc<dyn CanChannel>,
    tx_state: &mut TxState,
    tx_job: &mut Option<TxJob>,
    payload: Vec<u8>,
    on_done: Box<dyn FnOnce(DoneStatus) + Send>,
) -> Result<(), SendError> {
    if *tx_state != TxState::Idle {
        return Err(SendError::Busy);
    }
    if payload.len() as u64 > cfg.max_message_length() {
        return Err(SendError::TooLarge(payload.len()));
    }

    if payload.len() <= cfg.sf_capacity() {
        let pdu = Pdu::SingleFrame { payload };
        emit(cfg, can, &pdu);
        on_done(DoneStatus::Success);
        *tx_state = TxState::Idle;
        return Ok(());
    }

    let slice_len = cfg.ff_slice_capacity(payload.len()).min(payload.len());
    let first_slice = payload[..slice_len].to_vec();
    let pdu = Pdu::FirstFrame {
        total_length: payload.len() as u32,
        payload: first_slice,
    };
    emit(cfg, can, &pdu);
    *tx_job = Some(TxJob {
        payload,
        position: slice_len,
        sequence: 1,
        block_remaining: 0,
        block_size: 0,
        st_min: SeparationTime::Millis(0),
        last_cf_sent: None,
        deadline: Instant::now() + cfg.n_bs,
        on_done,
    });
    *tx_state = TxState::WaitFc;
    Ok(())
}

fn emit(cfg: &LinkConfig, can: &Arc<dyn CanChannel>, pdu: &Pdu) {
    let mut bytes = match encode_pdu(pdu, cfg.fd_enabled) {
        Ok(b) => b,
        Err(e) => {
            error!("failed to encode outbound PDU: {e}");
            return;
        }
    };
    let frame_cap = if cfg.fd_enabled { 64 } else { 8 };
    if cfg.padding_enabled && bytes.len() < frame_cap {
        // Classical frames always pad to the full 8-byte frame (spec §4.2,
        // §8.1 scenario). Under FD, pad only up to the next legal DLC
        // length rather than always to 64.
        let target = if cfg.fd_enabled {
            crate::frame::dlc_for_length(bytes.len(), true)
                .and_then(crate::frame::fd_length_of)
                .unwrap_or(bytes.len())
        } else {
            frame_cap
        };
        bytes.resize(target.max(bytes.len()), cfg.padding_byte);
    }
    let mut flags = CanFlags::empty();
    if cfg.fd_enabled {
        flags |= CanFlags::FD;
    }
    if cfg.tx_id > 0x7FF {
        flags |= CanFlags::EXTENDED_ID;
    }
    let frame = match CanFrame::new(cfg.tx_id, &bytes, flags, 0, std::time::SystemTime::now()) {
        Ok(f) => f,
        Err(e) => {
            error!("failed to build outbound CAN frame: {e}");
            return;
        }
    };
    send_with_n_as_budget(can, &frame, cfg.n_as);
}

/// Submits `frame`, retrying on transient backpressure within `budget`
/// before giving up. Per spec §7, the CAN send path swallows transient
/// backpressure and retries with a bounded deadline before reporting failure.
fn send_with_n_as_budget(can: &Arc<dyn CanChannel>, frame: &CanFrame, budget: Duration) -> bool {
    let deadline = Instant::now() + budget;
    loop {
        match can.send(frame) {
            Ok(crate::channel::SendStatus::Accepted) => return true,
            Ok(crate::channel::SendStatus::Backpressure) => {
                if Instant::now() >= deadline {
                    warn!("N_As budget exceeded waiting for backpressure to clear");
                    return false;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            Ok(crate::channel::SendStatus::LinkDown) | Err(_) => {
                error!("CAN send failed or link down");
                return false;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_frame(
    cfg: &LinkConfig,
    can: &Arc<dyn CanChannel>,
    frame: &CanFrame,
    tx_state: &mut TxState,
    tx_job: &mut Option<TxJob>,
    rx_state: &mut RxState,
    rx_job: &mut Option<RxJob>,
    inbound_tx: &mpsc::Sender<Vec<u8>>,
) {
    let pdu = match decode_pdu(&frame.data) {
        Ok(p) => p,
        Err(e) => {
            debug!("discarding malformed ISO-TP frame: {e}");
            return;
        }
    };

    match pdu {
        Pdu::FlowControl {
            status,
            block_size,
            separation_time,
        } => handle_flow_control(cfg, tx_state, tx_job, status, block_size, separation_time),
        Pdu::SingleFrame { payload } => {
            if *rx_state == RxState::Receiving {
                debug!("single frame interrupted an in-progress reassembly; restarting");
            }
            *rx_job = None;
            *rx_state = RxState::Idle;
            let _ = inbound_tx.send(payload);
        }
        Pdu::FirstFrame {
            total_length,
            payload,
        } => {
            let mut buffer = Vec::with_capacity(total_length as usize);
            buffer.extend_from_slice(&payload);
            *rx_job = Some(RxJob {
                buffer,
                total_length: total_length as usize,
                expected_sequence: 1,
                cfs_since_fc: 0,
                deadline: Instant::now() + cfg.n_cr,
            });
            *rx_state = RxState::Receiving;
            emit(
                cfg,
                can,
                &Pdu::FlowControl {
                    status: FlowStatus::Continue,
                    block_size: cfg.block_size,
                    separation_time: cfg.st_min,
                },
            );
        }
        Pdu::ConsecutiveFrame { sequence, payload } => {
            if *rx_state != RxState::Receiving {
                debug!("ignoring consecutive frame with no active reassembly");
                return;
            }
            let job = rx_job.as_mut().expect("rx_state Receiving implies rx_job");
            if sequence != job.expected_sequence {
                error!(
                    "ISO-TP sequence mismatch: expected {}, got {}",
                    job.expected_sequence, sequence
                );
                *rx_job = None;
                *rx_state = RxState::Idle;
                return;
            }
            job.buffer.extend_from_slice(&payload);
            job.expected_sequence = (job.expected_sequence + 1) % 16;
            job.cfs_since_fc += 1;
            job.deadline = Instant::now() + cfg.n_cr;

            if job.buffer.len() >= job.total_length {
                job.buffer.truncate(job.total_length);
                let delivered = job.buffer.clone();
                *rx_job = None;
                *rx_state = RxState::Idle;
                let _ = inbound_tx.send(delivered);
                return;
            }

            if cfg.block_size > 0 && job.cfs_since_fc >= cfg.block_size {
                job.cfs_since_fc = 0;
                emit(
                    cfg,
                    can,
                    &Pdu::FlowControl {
                        status: FlowStatus::Continue,
                        block_size: cfg.block_size,
                        separation_time: cfg.st_min,
                    },
                );
            }
        }
    }
}

fn handle_flow_control(
    cfg: &LinkConfig,
    tx_state: &mut TxState,
    tx_job: &mut Option<TxJob>,
    status: FlowStatus,
    block_size: u8,
    separation_time: SeparationTime,
) {
    if *tx_state != TxState::WaitFc {
        debug!("ignoring flow control frame outside WaitFC");
        return;
    }
    let job = tx_job.as_mut().expect("WaitFC implies tx_job present");
    match status {
        FlowStatus::Continue => {
            job.block_size = block_size;
            job.block_remaining = block_size;
            job.st_min = separation_time;
            job.last_cf_sent = None;
            *tx_state = TxState::Transmitting;
        }
        FlowStatus::Wait => {
            job.deadline = Instant::now() + cfg.p2_star;
        }
        FlowStatus::Overflow => {
            let job = tx_job.take().unwrap();
            (job.on_done)(DoneStatus::Overflow);
            *tx_state = TxState::Idle;
        }
    }
}

fn drive_tx(cfg: &LinkConfig, can: &Arc<dyn CanChannel>, tx_state: &mut TxState, tx_job: &mut Option<TxJob>) {
    match *tx_state {
        TxState::WaitFc => {
            if let Some(job) = tx_job.as_ref() {
                if Instant::now() >= job.deadline {
                    warn!("N_Bs expired waiting for flow control");
                    let job = tx_job.take().unwrap();
                    (job.on_done)(DoneStatus::Timeout);
                    *tx_state = TxState::Idle;
                }
            }
        }
        TxState::Transmitting => {
            let job = tx_job.as_mut().expect("Transmitting implies tx_job present");
            let gate_clear = job
                .last_cf_sent
                .map(|t| t.elapsed() >= job.st_min.as_duration())
                .unwrap_or(true);
            if !gate_clear {
                return;
            }
            if job.block_size > 0 && job.block_remaining == 0 {
                job.deadline = Instant::now() + cfg.n_bs;
                *tx_state = TxState::WaitFc;
                return;
            }
            let slice_len = cfg.cf_slice_capacity().min(job.payload.len() - job.position);
            let slice = job.payload[job.position..job.position + slice_len].to_vec();
            let pdu = Pdu::ConsecutiveFrame {
                sequence: job.sequence,
                payload: slice,
            };
            emit(cfg, can, &pdu);
            job.position += slice_len;
            job.sequence = (job.sequence + 1) % 16;
            job.last_cf_sent = Some(Instant::now());
            if job.block_size > 0 {
                job.block_remaining -= 1;
            }
            if job.position >= job.payload.len() {
                let job = tx_job.take().unwrap();
                (job.on_done)(DoneStatus::Success);
                *tx_state = TxState::Idle;
            }
        }
        TxState::Idle | TxState::Error => {}
    }
}

fn drive_rx_timeout(rx_state: &mut RxState, rx_job: &mut Option<RxJob>) {
    if *rx_state == RxState::Receiving {
        if let Some(job) = rx_job.as_ref() {
            if Instant::now() >= job.deadline {
                warn!("N_Cr expired awaiting next consecutive frame");
                *rx_job = None;
                *rx_state = RxState::Idle;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::channel::CanChannelConfig;
    use crate::hardware::loopback::LoopbackBus;

    #[test]
    fn single_frame_message_round_trips_over_loopback() {
        let bus = LoopbackBus::new();
        let mut tester_end = bus.open_channel();
        let mut ecu_end = bus.open_channel();
        tester_end.open(CanChannelConfig::default()).unwrap();
        ecu_end.open(CanChannelConfig::default()).unwrap();
        let tester: Arc<dyn CanChannel> = Arc::new(tester_end);
        let ecu: Arc<dyn CanChannel> = Arc::new(ecu_end);

        let cfg = LinkConfig {
            rx_id: 0x7E8,
            tx_id: 0x7E0,
            ..Default::default()
        };
        let ecu_cfg = LinkConfig {
            rx_id: 0x7E0,
            tx_id: 0x7E8,
            ..Default::default()
        };
        let tester_channel = IsoTpChannel::new(tester, cfg).unwrap();
        let ecu_channel = IsoTpChannel::new(ecu, ecu_cfg).unwrap();

        tester_channel
            .send_message(vec![0x22, 0xF1, 0x81], |_| {})
            .unwrap();
        let received = ecu_channel.recv_message(Duration::from_millis(500)).unwrap();
        assert_eq!(received, vec![0x22, 0xF1, 0x81]);
    }

    #[test]
    fn multi_frame_message_round_trips_with_flow_control() {
        let bus = LoopbackBus::new();
        let mut tester_end = bus.open_channel();
        let mut ecu_end = bus.open_channel();
        tester_end.open(CanChannelConfig::default()).unwrap();
        ecu_end.open(CanChannelConfig::default()).unwrap();
        let tester: Arc<dyn CanChannel> = Arc::new(tester_end);
        let ecu: Arc<dyn CanChannel> = Arc::new(ecu_end);

        let cfg = LinkConfig {
            rx_id: 0x7E8,
            tx_id: 0x7E0,
            block_size: 3,
            ..Default::default()
        };
        let ecu_cfg = LinkConfig {
            rx_id: 0x7E0,
            tx_id: 0x7E8,
            block_size: 3,
            ..Default::default()
        };
        let tester_channel = IsoTpChannel::new(tester, cfg).unwrap();
        let ecu_channel = IsoTpChannel::new(ecu, ecu_cfg).unwrap();

        let payload: Vec<u8> = (0..40u16).map(|v| v as u8).collect();
        let (done_tx, done_rx) = mpsc::channel();
        tester_channel
            .send_message(payload.clone(), move |status| {
                let _ = done_tx.send(status);
            })
            .unwrap();

        let received = ecu_channel.recv_message(Duration::from_millis(2000)).unwrap();
        assert_eq!(received, payload);
        assert_eq!(done_rx.recv_timeout(Duration::from_millis(2000)).unwrap(), DoneStatus::Success);
    }

    #[test]
    fn send_while_busy_is_rejected() {
        let bus = LoopbackBus::new();
        let mut tester_end = bus.open_channel();
        let ecu_end = bus.open_channel();
        tester_end.open(CanChannelConfig::default()).unwrap();
        let tester: Arc<dyn CanChannel> = Arc::new(tester_end);
        let _ecu: Arc<dyn CanChannel> = Arc::new(ecu_end);

        let cfg = LinkConfig {
            rx_id: 0x7E8,
            tx_id: 0x7E0,
            ..Default::default()
        };
        let tester_channel = IsoTpChannel::new(tester, cfg).unwrap();
        let payload = vec![0xAAu8; 40];
        tester_channel.send_message(payload.clone(), |_| {}).unwrap();
        let err = tester_channel.send_message(payload, |_| {}).unwrap_err();
        assert_eq!(err, SendError::Busy);
    }
}
