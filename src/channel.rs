//! The CAN channel abstraction (spec §4.1): the physical controller is
//! reduced to a bidirectional frame channel with open/close, a synchronous
//! send, a subscribable receive callback and per-channel stats.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::frame::CanFrame;

/// Communication channel result
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Error produced by a CAN channel at the transport boundary.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Underlying IO error with the channel
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    /// Timeout when writing data to the channel
    #[error("timeout writing to channel")]
    WriteTimeout,
    /// Timeout when reading from the channel
    #[error("timeout reading from channel")]
    ReadTimeout,
    /// The channel's Rx buffer is empty. Only applies when read timeout is 0
    #[error("channel's receive buffer is empty")]
    BufferEmpty,
    /// The channel's Tx buffer is full
    #[error("channel's transmit buffer is full")]
    BufferFull,
    /// Unsupported channel request
    #[error("unsupported channel request")]
    UnsupportedRequest,
    /// The interface is not open
    #[error("channel's interface is not open")]
    InterfaceNotOpen,
    /// The physical link reported down; upper-layer state machines must reset
    #[error("channel link is down")]
    LinkDown,
    /// Underlying driver/API error
    #[error("underlying {api_name} API error ({code}): {desc}")]
    ApiError {
        /// Name of the API, e.g. 'socketcan', 'loopback'
        api_name: &'static str,
        /// Internal API error code
        code: u32,
        /// API error description
        desc: String,
    },
}

/// Outcome of a single [`CanChannel::send`] call. Per spec §4.1(b), a
/// successful send means the frame was handed to the driver or queued, not
/// that it reached the bus.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SendStatus {
    /// Frame accepted by the driver or internal queue.
    Accepted,
    /// Driver could not accept the frame right now; caller may retry.
    Backpressure,
    /// The physical link is down.
    LinkDown,
}

/// Static, queryable capability/throughput counters for one channel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanChannelStats {
    /// Frames successfully handed to the driver.
    pub frames_sent: u64,
    /// Frames delivered via the receive callback.
    pub frames_received: u64,
    /// Sends that returned [`SendStatus::Backpressure`].
    pub backpressure_events: u64,
    /// Times the channel observed [`ChannelError::LinkDown`].
    pub link_down_events: u64,
}

/// Configuration a CAN channel is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanChannelConfig {
    /// Classical CAN bitrate in bit/s.
    pub bitrate: u32,
    /// Data-phase bitrate in bit/s when CAN-FD bitrate switching is enabled.
    pub fd_data_bitrate: Option<u32>,
    /// Enable CAN-FD framing (up to 64 byte payloads).
    pub fd_enabled: bool,
}

impl Default for CanChannelConfig {
    fn default() -> Self {
        Self {
            bitrate: 500_000,
            fd_data_bitrate: None,
            fd_enabled: false,
        }
    }
}

/// A receive subscription handle. Dropping or passing it to
/// [`CanChannel::unsubscribe`] stops further callback delivery.
pub type SubscriptionId = u64;

/// The CAN channel abstraction. Implementations own exactly one physical or
/// simulated interface.
///
/// Guarantees implementations must uphold (spec §4.1):
/// - the receive callback fires at most once per received frame, from an
///   internal I/O task, and must not block;
/// - `send` returns synchronously once the frame is handed to the driver or
///   queued — it never waits for bus-level acknowledgment;
/// - timestamps on delivered frames are monotonically non-decreasing within
///   one channel.
pub trait CanChannel: Send + Sync {
    /// Opens the interface with the given configuration.
    fn open(&mut self, config: CanChannelConfig) -> ChannelResult<()>;

    /// Closes the interface. Idempotent.
    fn close(&mut self) -> ChannelResult<()>;

    /// Submits a frame. Returns synchronously; see trait docs.
    fn send(&self, frame: &CanFrame) -> ChannelResult<SendStatus>;

    /// Registers a receive callback, returning a handle for
    /// [`CanChannel::unsubscribe`]. The callback must not block.
    fn subscribe(&self, callback: Box<dyn Fn(CanFrame) + Send + Sync>) -> SubscriptionId;

    /// Removes a previously registered callback.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Snapshot of this channel's counters.
    fn stats(&self) -> CanChannelStats;
}

/// Thread-safe fan-out broadcaster shared by [`CanChannel`] implementations:
/// holds the registered receive callbacks and the running stats, so each
/// backend only has to drive frames in and call [`ChannelSubscribers::dispatch`].
#[derive(Clone)]
pub struct ChannelSubscribers {
    inner: Arc<Mutex<SubscribersInner>>,
}

struct SubscribersInner {
    next_id: SubscriptionId,
    callbacks: Vec<(SubscriptionId, Box<dyn Fn(CanFrame) + Send + Sync>)>,
    stats: CanChannelStats,
    last_timestamp: Option<SystemTime>,
}

impl fmt::Debug for ChannelSubscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSubscribers").finish_non_exhaustive()
    }
}

impl Default for ChannelSubscribers {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelSubscribers {
    /// Creates an empty subscriber set with zeroed stats.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SubscribersInner {
                next_id: 1,
                callbacks: Vec::new(),
                stats: CanChannelStats::default(),
                last_timestamp: None,
            })),
        }
    }

    /// Registers a callback.
    pub fn subscribe(&self, callback: Box<dyn Fn(CanFrame) + Send + Sync>) -> SubscriptionId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.callbacks.push((id, callback));
        id
    }

    /// Removes a callback by id.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut inner = self.inner.lock().unwrap();
        inner.callbacks.retain(|(cb_id, _)| *cb_id != id);
    }

    /// Delivers a received frame to every subscriber and bumps stats.
    /// Enforces the monotonic-timestamp guarantee by clamping to the last
    /// observed timestamp on this channel.
    pub fn dispatch(&self, mut frame: CanFrame) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(last) = inner.last_timestamp {
            if frame.timestamp < last {
                frame.timestamp = last;
            }
        }
        inner.last_timestamp = Some(frame.timestamp);
        inner.stats.frames_received += 1;
        for (_, cb) in &inner.callbacks {
            cb(frame.clone());
        }
    }

    /// Records that a frame was accepted for send.
    pub fn record_sent(&self) {
        self.inner.lock().unwrap().stats.frames_sent += 1;
    }

    /// Records a backpressure event.
    pub fn record_backpressure(&self) {
        self.inner.lock().unwrap().stats.backpressure_events += 1;
    }

    /// Records a link-down observation.
    pub fn record_link_down(&self) {
        self.inner.lock().unwrap().stats.link_down_events += 1;
    }

    /// Snapshot of the current counters.
    pub fn stats(&self) -> CanChannelStats {
        self.inner.lock().unwrap().stats
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dispatch_clamps_non_monotonic_timestamps() {
        let subs = ChannelSubscribers::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_c = count.clone();
        subs.subscribe(Box::new(move |_f| {
            count_c.fetch_add(1, Ordering::SeqCst);
        }));
        let base = SystemTime::now();
        let f1 = CanFrame::new(0x123, &[1], Default::default(), 0, base).unwrap();
        let f2 = CanFrame::new(0x123, &[2], Default::default(), 0, base - std::time::Duration::from_secs(1))
            .unwrap();
        subs.dispatch(f1);
        subs.dispatch(f2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(subs.stats().frames_received, 2);
    }
}
