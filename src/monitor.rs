//! The filtered bus-observation pipeline: frames handed in from any
//! [`crate::channel::CanChannel`] subscription are queued, matched against a
//! set of AND-combined filters, counted, and kept in a fixed-capacity ring
//! buffer for later inspection.
//!
//! Frames are pushed in from whichever thread owns the channel subscription
//! ([`MonitorPipeline::ingest`]); a single background thread drains the
//! ingress queue, applies filters, updates statistics, appends to the ring
//! buffer and fans the frame out to registered observers. This differs from
//! the two independent consumer threads racing over one queue in the system
//! this pipeline is modeled on — here every ingested frame is guaranteed to
//! reach every observer exactly once.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{debug, error};

use crate::frame::{CanFlags, CanFrame};

/// Error surfaced by [`MonitorPipeline`].
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// [`MonitorPipeline::start`] was called while already running.
    #[error("monitor pipeline is already running")]
    AlreadyRunning,
    /// A data-pattern filter's pattern string was not valid hex/wildcard.
    #[error("invalid data pattern {0:?}: {1}")]
    InvalidPattern(String, String),
    /// Opening, writing, or closing a tail/export file failed.
    #[error("monitor file sink error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a captured frame is rendered as text by [`MonitoredFrame::format`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum MonitorDisplayFormat {
    /// Space-separated uppercase hex pairs.
    #[default]
    Hex,
    /// Space-separated decimal byte values.
    Dec,
    /// Space-separated 8-bit binary byte values.
    Bin,
    /// Printable bytes as characters, others as `.`.
    Ascii,
    /// Hex, but printable bytes are rendered as a padded character.
    Mixed,
}

/// How [`MonitoredFrame::format`] renders a frame's timestamp.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum TimestampFormat {
    /// Milliseconds since the Unix epoch.
    #[default]
    Absolute,
    /// Milliseconds since the pipeline was started.
    Relative,
    /// Milliseconds since the previously formatted frame.
    Delta,
}

/// Rendering options for [`MonitoredFrame::format`].
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayConfig {
    /// Data byte rendering.
    pub display_format: MonitorDisplayFormat,
    /// Include the timestamp field.
    pub show_timestamp: bool,
    /// Include the arbitration id field.
    pub show_id: bool,
    /// Include the DLC field.
    pub show_dlc: bool,
    /// Include the data field.
    pub show_data: bool,
    /// Include an ASCII-rendered data field alongside `display_format`.
    pub show_ascii: bool,
    /// Include the RX/TX direction field.
    pub show_direction: bool,
    /// Include the source channel index.
    pub show_channel: bool,
    /// Include `[BRS,ESI]` flags on CAN-FD frames.
    pub show_fd_flags: bool,
    /// How the timestamp field is computed.
    pub timestamp_format: TimestampFormat,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            display_format: MonitorDisplayFormat::default(),
            show_timestamp: true,
            show_id: true,
            show_dlc: true,
            show_data: true,
            show_ascii: false,
            show_direction: true,
            show_channel: true,
            show_fd_flags: true,
            timestamp_format: TimestampFormat::default(),
        }
    }
}

/// Which direction a [`MonitoredFrame`] travelled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    /// Received from the bus.
    Rx,
    /// Submitted to the bus.
    Tx,
}

/// A captured frame plus the bookkeeping needed to display it.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredFrame {
    /// The underlying CAN frame.
    pub frame: CanFrame,
    /// Whether this frame was received or sent.
    pub direction: Direction,
    /// Free-text origin, e.g. `"CAN-0"` or `"UDS-0"`.
    pub source: String,
}

impl MonitoredFrame {
    /// Renders this frame as one text line per `config`.
    pub fn format(&self, config: &DisplayConfig, reference: SystemTime, last: Option<SystemTime>) -> String {
        let mut parts = Vec::new();

        if config.show_timestamp {
            let millis = match config.timestamp_format {
                TimestampFormat::Absolute => self
                    .frame
                    .timestamp
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis())
                    .unwrap_or(0),
                TimestampFormat::Relative => self
                    .frame
                    .timestamp
                    .duration_since(reference)
                    .map(|d| d.as_millis())
                    .unwrap_or(0),
                TimestampFormat::Delta => last
                    .and_then(|l| self.frame.timestamp.duration_since(l).ok())
                    .map(|d| d.as_millis())
                    .unwrap_or(0),
            };
            parts.push(format!("{millis}"));
        }
        if config.show_direction {
            parts.push(
                match self.direction {
                    Direction::Rx => "RX",
                    Direction::Tx => "TX",
                }
                .to_string(),
            );
        }
        if config.show_channel {
            parts.push(format!("CH{}", self.frame.channel));
        }
        if config.show_id {
            parts.push(if self.frame.is_extended() {
                format!("{:08X}", self.frame.id)
            } else {
                format!("{:03X}", self.frame.id)
            });
        }
        if config.show_dlc {
            let suffix = if self.frame.is_fd() { "F" } else { "" };
            parts.push(format!("DL{}{}", self.frame.dlc, suffix));
        }
        if config.show_data {
            parts.push(format_data(&self.frame.data, config.display_format));
        }
        if config.show_ascii {
            parts.push(format!("'{}'", format_data(&self.frame.data, MonitorDisplayFormat::Ascii)));
        }
        if config.show_fd_flags && self.frame.is_fd() {
            let mut flags = Vec::new();
            if self.frame.flags.contains(CanFlags::BITRATE_SWITCH) {
                flags.push("BRS");
            }
            if self.frame.flags.contains(CanFlags::ERROR_STATE_INDICATOR) {
                flags.push("ESI");
            }
            if !flags.is_empty() {
                parts.push(format!("[{}]", flags.join(",")));
            }
        }
        if self.source != "CAN" {
            parts.push(format!("({})", self.source));
        }

        parts.join(" ")
    }
}

fn format_data(data: &[u8], format: MonitorDisplayFormat) -> String {
    if data.is_empty() {
        return String::new();
    }
    match format {
        MonitorDisplayFormat::Hex => data.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" "),
        MonitorDisplayFormat::Dec => data.iter().map(|b| b.to_string()).collect::<Vec<_>>().join(" "),
        MonitorDisplayFormat::Bin => data.iter().map(|b| format!("{b:08b}")).collect::<Vec<_>>().join(" "),
        MonitorDisplayFormat::Ascii => data
            .iter()
            .map(|&b| if (32..=126).contains(&b) { b as char } else { '.' })
            .collect(),
        MonitorDisplayFormat::Mixed => {
            let mut out = String::new();
            for &b in data {
                if (32..=126).contains(&b) {
                    out.push_str(&format!("{:>3}", b as char));
                } else {
                    out.push_str(&format!("{b:02X} "));
                }
            }
            out.trim().to_string()
        }
    }
}

/// One observation filter. Filters are combined with logical AND: a frame
/// must match every *enabled* filter to reach the ring buffer and observers.
///
/// Equality and the derived [`Clone`] treat [`FilterKind::Custom`]
/// specially: a boxed predicate has no meaningful notion of equality, so two
/// `Custom` filters never compare equal to each other, even built from the
/// same closure.
#[derive(Debug, Clone)]
pub struct Filter {
    /// Display name.
    pub name: String,
    /// Whether this filter currently participates in matching.
    pub enabled: bool,
    /// The match rule.
    pub kind: FilterKind,
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.enabled == other.enabled && self.kind == other.kind
    }
}

/// A single filter rule.
#[derive(Clone)]
pub enum FilterKind {
    /// Matches arbitration ids in `start..=end`.
    IdRange {
        /// Inclusive lower bound.
        start: u32,
        /// Inclusive upper bound.
        end: u32,
    },
    /// Matches arbitration ids in an explicit set.
    IdSet(Vec<u32>),
    /// Matches the frame's hex-encoded data against a pattern where `*`
    /// matches any run of hex digits and any other character must match
    /// literally. An empty pattern matches every frame.
    DataPattern(String),
    /// Matches via an arbitrary predicate.
    Custom(Arc<dyn Fn(&CanFrame) -> bool + Send + Sync>),
}

impl std::fmt::Debug for FilterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IdRange { start, end } => f.debug_struct("IdRange").field("start", start).field("end", end).finish(),
            Self::IdSet(ids) => f.debug_tuple("IdSet").field(ids).finish(),
            Self::DataPattern(p) => f.debug_tuple("DataPattern").field(p).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl PartialEq for FilterKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::IdRange { start: s1, end: e1 }, Self::IdRange { start: s2, end: e2 }) => s1 == s2 && e1 == e2,
            (Self::IdSet(a), Self::IdSet(b)) => a == b,
            (Self::DataPattern(a), Self::DataPattern(b)) => a == b,
            // Predicates are never comparable, even against themselves.
            (Self::Custom(_), Self::Custom(_)) => false,
            _ => false,
        }
    }
}

impl Filter {
    /// Builds an enabled [`FilterKind::IdRange`] filter.
    pub fn id_range(name: impl Into<String>, start: u32, end: u32) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            kind: FilterKind::IdRange { start, end },
        }
    }

    /// Builds an enabled [`FilterKind::IdSet`] filter.
    pub fn id_set(name: impl Into<String>, ids: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            kind: FilterKind::IdSet(ids),
        }
    }

    /// Builds an enabled [`FilterKind::DataPattern`] filter.
    pub fn data_pattern(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            kind: FilterKind::DataPattern(pattern.into()),
        }
    }

    /// Builds an enabled [`FilterKind::Custom`] filter.
    pub fn custom(name: impl Into<String>, predicate: impl Fn(&CanFrame) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            kind: FilterKind::Custom(Arc::new(predicate)),
        }
    }

    /// True if `frame` matches this filter, or if the filter is disabled.
    pub fn matches(&self, frame: &CanFrame) -> bool {
        if !self.enabled {
            return true;
        }
        match &self.kind {
            FilterKind::IdRange { start, end } => (*start..=*end).contains(&frame.id),
            FilterKind::IdSet(ids) => ids.contains(&frame.id),
            FilterKind::DataPattern(pattern) => data_pattern_matches(pattern, &frame.data),
            FilterKind::Custom(predicate) => predicate(frame),
        }
    }
}

fn data_pattern_matches(pattern: &str, data: &[u8]) -> bool {
    let pattern: String = pattern.chars().filter(|c| !c.is_whitespace()).collect();
    if pattern.is_empty() {
        return true;
    }
    let hex = format_data(data, MonitorDisplayFormat::Hex).replace(' ', "");
    wildcard_match(pattern.to_ascii_uppercase().as_bytes(), hex.to_ascii_uppercase().as_bytes())
}

fn wildcard_match(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some(b'*') => {
            wildcard_match(&pattern[1..], text)
                || (!text.is_empty() && wildcard_match(pattern, &text[1..]))
        }
        Some(&p) => text.first().is_some_and(|&t| t == p) && wildcard_match(&pattern[1..], &text[1..]),
    }
}

/// Running totals maintained by [`MonitorPipeline`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Statistics {
    /// Frames that passed every enabled filter.
    pub total_frames: u64,
    /// Of those, frames received from the bus.
    pub rx_frames: u64,
    /// Of those, frames submitted to the bus.
    pub tx_frames: u64,
    /// Of those, frames carrying [`CanFlags::ERROR`].
    pub error_frames: u64,
    /// Frames dropped by a filter before reaching the buffer.
    pub filtered_frames: u64,
    /// Frames evicted from the ingress queue before the processor could
    /// drain them (spec §8.6 "dropped-count").
    pub dropped_frames: u64,
}

struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    not_empty: Condvar,
    dropped: std::sync::atomic::AtomicU64,
}

impl<T> BoundedQueue<T> {
    fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            not_empty: Condvar::new(),
            dropped: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Pushes an item, dropping the oldest queued item if at capacity.
    fn push_evicting(&self, item: T) {
        let mut items = self.items.lock().unwrap();
        if items.len() >= self.capacity {
            items.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        items.push_back(item);
        self.not_empty.notify_one();
    }

    fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let mut items = self.items.lock().unwrap();
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (guard, result) = self.not_empty.wait_timeout(items, remaining).unwrap();
            items = guard;
            if result.timed_out() && items.is_empty() {
                return None;
            }
        }
    }

    fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }
}

type Observer = Box<dyn Fn(&MonitoredFrame) + Send + Sync>;

/// The filtered bus-observation pipeline itself.
pub struct MonitorPipeline {
    ingress: Arc<BoundedQueue<MonitoredFrame>>,
    buffer: Arc<Mutex<VecDeque<MonitoredFrame>>>,
    buffer_capacity: usize,
    filters: Arc<Mutex<Vec<Filter>>>,
    config: Arc<Mutex<DisplayConfig>>,
    statistics: Arc<Mutex<Statistics>>,
    observers: Arc<Mutex<Vec<Observer>>>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
    started_at: Arc<Mutex<SystemTime>>,
    tail_file: Arc<Mutex<Option<File>>>,
}

fn write_line(file: &mut File, line: &str) -> Result<(), MonitorError> {
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}

impl std::fmt::Debug for MonitorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorPipeline")
            .field("running", &self.running.load(Ordering::SeqCst))
            .field("buffer_capacity", &self.buffer_capacity)
            .finish_non_exhaustive()
    }
}

/// Default capacity of both the ingress queue and the display ring buffer.
pub const DEFAULT_CAPACITY: usize = 10_000;

impl Default for MonitorPipeline {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MonitorPipeline {
    /// Builds a pipeline whose ingress queue and ring buffer both hold up to
    /// `capacity` frames, oldest-eviction on overflow.
    pub fn new(capacity: usize) -> Self {
        Self {
            ingress: Arc::new(BoundedQueue::new(capacity)),
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            buffer_capacity: capacity,
            filters: Arc::new(Mutex::new(Vec::new())),
            config: Arc::new(Mutex::new(DisplayConfig::default())),
            statistics: Arc::new(Mutex::new(Statistics::default())),
            observers: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            started_at: Arc::new(Mutex::new(SystemTime::now())),
            tail_file: Arc::new(Mutex::new(None)),
        }
    }

    /// Starts the background processing thread. Resets statistics.
    pub fn start(&self) -> Result<(), MonitorError> {
        if self.running.swap(true, Ordering::SeqCst) {
            self.running.store(true, Ordering::SeqCst);
            return Err(MonitorError::AlreadyRunning);
        }
        *self.statistics.lock().unwrap() = Statistics::default();
        self.ingress.dropped.store(0, Ordering::Relaxed);
        *self.started_at.lock().unwrap() = SystemTime::now();

        let ingress = self.ingress.clone();
        let buffer = self.buffer.clone();
        let buffer_capacity = self.buffer_capacity;
        let filters = self.filters.clone();
        let statistics = self.statistics.clone();
        let observers = self.observers.clone();
        let running = self.running.clone();
        let tail_file = self.tail_file.clone();
        let config = self.config.clone();
        let started_at = self.started_at.clone();

        let handle = std::thread::spawn(move || {
            let mut last_timestamp: Option<SystemTime> = None;
            while running.load(Ordering::SeqCst) {
                let Some(frame) = ingress.pop_timeout(Duration::from_millis(100)) else {
                    continue;
                };
                let passes = {
                    let filters = filters.lock().unwrap();
                    filters.iter().all(|f| f.matches(&frame.frame))
                };
                if !passes {
                    statistics.lock().unwrap().filtered_frames += 1;
                    continue;
                }

                {
                    let mut stats = statistics.lock().unwrap();
                    stats.total_frames += 1;
                    match frame.direction {
                        Direction::Rx => stats.rx_frames += 1,
                        Direction::Tx => stats.tx_frames += 1,
                    }
                    if frame.frame.flags.contains(CanFlags::ERROR) {
                        stats.error_frames += 1;
                    }
                }

                {
                    let mut buf = buffer.lock().unwrap();
                    buf.push_back(frame.clone());
                    while buf.len() > buffer_capacity {
                        buf.pop_front();
                    }
                }

                if let Some(file) = tail_file.lock().unwrap().as_mut() {
                    let reference = *started_at.lock().unwrap();
                    let line = frame.format(&config.lock().unwrap(), reference, last_timestamp);
                    if let Err(e) = write_line(file, &line) {
                        error!("monitor tail file write failed: {e}");
                    }
                }
                last_timestamp = Some(frame.frame.timestamp);

                for observer in observers.lock().unwrap().iter() {
                    observer(&frame);
                }
            }
            debug!("monitor pipeline processing thread exiting");
        });
        *self.worker.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Stops the processing thread and clears the display buffer.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.worker.lock().unwrap().take() {
            if handle.join().is_err() {
                error!("monitor pipeline processing thread panicked");
            }
        }
        self.buffer.lock().unwrap().clear();
    }

    /// True while the processing thread is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Queues a frame for filtering and display. Silently dropped if the
    /// pipeline is not running, matching a channel subscription callback
    /// that must never block.
    pub fn ingest(&self, frame: CanFrame, direction: Direction, source: impl Into<String>) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        self.ingress.push_evicting(MonitoredFrame {
            frame,
            direction,
            source: source.into(),
        });
    }

    /// Current ingress queue depth, for dashboards.
    pub fn queue_depth(&self) -> usize {
        self.ingress.len()
    }

    /// Registers an observer invoked (from the processing thread) for every
    /// frame that passes the active filters.
    pub fn subscribe(&self, observer: Observer) {
        self.observers.lock().unwrap().push(observer);
    }

    /// Replaces the filter list wholesale.
    pub fn set_filters(&self, filters: Vec<Filter>) {
        *self.filters.lock().unwrap() = filters;
    }

    /// Appends one filter.
    pub fn add_filter(&self, filter: Filter) {
        self.filters.lock().unwrap().push(filter);
    }

    /// Removes the filter at `index`, returning whether one was present.
    pub fn remove_filter(&self, index: usize) -> bool {
        let mut filters = self.filters.lock().unwrap();
        if index < filters.len() {
            filters.remove(index);
            true
        } else {
            false
        }
    }

    /// Snapshot of the current filter list.
    pub fn filters(&self) -> Vec<Filter> {
        self.filters.lock().unwrap().clone()
    }

    /// Replaces the display configuration.
    pub fn set_display_config(&self, config: DisplayConfig) {
        *self.config.lock().unwrap() = config;
    }

    /// Snapshot of the current display configuration.
    pub fn display_config(&self) -> DisplayConfig {
        self.config.lock().unwrap().clone()
    }

    /// Snapshot of the running counters, plus derived rates.
    pub fn statistics(&self) -> Statistics {
        let mut stats = *self.statistics.lock().unwrap();
        stats.dropped_frames = self.ingress.dropped_count();
        stats
    }

    /// Frames per second since [`MonitorPipeline::start`], based on
    /// `total_frames` and elapsed wall-clock time.
    pub fn frame_rate(&self) -> f64 {
        let elapsed = SystemTime::now()
            .duration_since(*self.started_at.lock().unwrap())
            .unwrap_or_default()
            .as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.statistics.lock().unwrap().total_frames as f64 / elapsed
    }

    /// Current ring buffer occupancy.
    pub fn buffer_len(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    /// Copies out up to `count` of the most recently buffered frames, oldest
    /// first.
    pub fn recent_frames(&self, count: usize) -> Vec<MonitoredFrame> {
        let buf = self.buffer.lock().unwrap();
        let skip = buf.len().saturating_sub(count);
        buf.iter().skip(skip).cloned().collect()
    }

    /// Drops every buffered frame without affecting statistics.
    pub fn clear_buffer(&self) {
        self.buffer.lock().unwrap().clear();
    }

    /// Snapshot of up to `count` buffered frames starting at `start_index`.
    /// A non-negative `start_index` counts from the head of the ring; a
    /// negative one counts from the tail (`-1` is the most recently
    /// buffered frame).
    pub fn get_frames(&self, count: usize, start_index: i64) -> Vec<MonitoredFrame> {
        let buf = self.buffer.lock().unwrap();
        let len = buf.len() as i64;
        let start = if start_index < 0 {
            (len + start_index).max(0)
        } else {
            start_index.min(len)
        } as usize;
        buf.iter().skip(start).take(count).cloned().collect()
    }

    /// Writes every currently buffered frame to `path`, formatted per the
    /// pipeline's current [`DisplayConfig`]. Truncates any existing file.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<(), MonitorError> {
        let mut file = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
        let config = self.config.lock().unwrap();
        let reference = *self.started_at.lock().unwrap();
        let mut last = None;
        for frame in self.buffer.lock().unwrap().iter() {
            write_line(&mut file, &frame.format(&config, reference, last))?;
            last = Some(frame.frame.timestamp);
        }
        Ok(())
    }

    /// Opens `path` in append mode and begins writing every frame that
    /// passes the active filters to it, one formatted line at a time, as
    /// the processing thread handles it. Replaces any file already being
    /// tailed to.
    pub fn start_tailing(&self, path: impl AsRef<Path>) -> Result<(), MonitorError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        *self.tail_file.lock().unwrap() = Some(file);
        Ok(())
    }

    /// Stops writing to the file opened by [`MonitorPipeline::start_tailing`],
    /// if any. Idempotent.
    pub fn stop_tailing(&self) {
        *self.tail_file.lock().unwrap() = None;
    }
}

impl Drop for MonitorPipeline {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::SystemTime;

    fn frame(id: u32, data: &[u8]) -> CanFrame {
        CanFrame::new(id, data, CanFlags::empty(), 0, SystemTime::now()).unwrap()
    }

    #[test]
    fn id_range_filter_excludes_outside_frames() {
        let filter = Filter {
            name: "range".into(),
            enabled: true,
            kind: FilterKind::IdRange { start: 0x100, end: 0x1FF },
        };
        assert!(filter.matches(&frame(0x150, &[])));
        assert!(!filter.matches(&frame(0x200, &[])));
    }

    #[test]
    fn data_pattern_supports_wildcards() {
        let filter = Filter {
            name: "pattern".into(),
            enabled: true,
            kind: FilterKind::DataPattern("10*EF".into()),
        };
        assert!(filter.matches(&frame(0x1, &[0x10, 0x20, 0x30, 0xEF])));
        assert!(!filter.matches(&frame(0x1, &[0x11, 0x20, 0x30, 0xEF])));
    }

    #[test]
    fn pipeline_filters_buffers_and_reports_stats() {
        let pipeline = MonitorPipeline::new(16);
        pipeline.add_filter(Filter {
            name: "only 0x123".into(),
            enabled: true,
            kind: FilterKind::IdSet(vec![0x123]),
        });
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_c = seen.clone();
        pipeline.subscribe(Box::new(move |_f| {
            seen_c.fetch_add(1, Ordering::SeqCst);
        }));
        pipeline.start().unwrap();

        pipeline.ingest(frame(0x123, &[1, 2]), Direction::Rx, "CAN-0");
        pipeline.ingest(frame(0x456, &[3, 4]), Direction::Rx, "CAN-0");

        let deadline = Instant::now() + Duration::from_secs(1);
        while pipeline.statistics().total_frames == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        let stats = pipeline.statistics();
        assert_eq!(stats.total_frames, 1);
        assert_eq!(stats.filtered_frames, 1);
        assert_eq!(pipeline.buffer_len(), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        pipeline.stop();
        assert!(!pipeline.is_running());
    }

    #[test]
    fn ring_buffer_evicts_oldest_on_overflow() {
        let pipeline = MonitorPipeline::new(2);
        pipeline.start().unwrap();
        for id in [0x1, 0x2, 0x3] {
            pipeline.ingest(frame(id, &[]), Direction::Rx, "CAN-0");
        }
        let deadline = Instant::now() + Duration::from_secs(1);
        while pipeline.buffer_len() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        let recent = pipeline.recent_frames(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].frame.id, 0x2);
        assert_eq!(recent[1].frame.id, 0x3);
        pipeline.stop();
    }

    #[test]
    fn ingress_overflow_increments_dropped_counter() {
        let pipeline = MonitorPipeline::new(2);
        pipeline.subscribe(Box::new(|_f| {
            std::thread::sleep(Duration::from_millis(50));
        }));
        pipeline.start().unwrap();

        for id in 0..10u32 {
            pipeline.ingest(frame(id, &[]), Direction::Rx, "CAN-0");
        }
        std::thread::sleep(Duration::from_millis(20));

        let stats = pipeline.statistics();
        assert!(stats.dropped_frames > 0, "expected some ingress drops, got {stats:?}");
        pipeline.stop();
    }

    #[test]
    fn get_frames_supports_negative_start_index_from_tail() {
        let pipeline = MonitorPipeline::new(16);
        pipeline.start().unwrap();
        for id in [0x1, 0x2, 0x3] {
            pipeline.ingest(frame(id, &[]), Direction::Rx, "CAN-0");
        }
        let deadline = Instant::now() + Duration::from_secs(1);
        while pipeline.buffer_len() < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        pipeline.stop();

        assert_eq!(pipeline.get_frames(10, 0).len(), 3);
        let last_two = pipeline.get_frames(10, -2);
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].frame.id, 0x2);
        assert_eq!(last_two[1].frame.id, 0x3);
        let last_one = pipeline.get_frames(1, -1);
        assert_eq!(last_one.len(), 1);
        assert_eq!(last_one[0].frame.id, 0x3);
    }

    #[test]
    fn export_writes_buffered_frames_to_file() {
        let pipeline = MonitorPipeline::new(16);
        pipeline.start().unwrap();
        pipeline.ingest(frame(0x123, &[0xAB, 0xCD]), Direction::Rx, "CAN-0");
        let deadline = Instant::now() + Duration::from_secs(1);
        while pipeline.buffer_len() < 1 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        pipeline.stop();

        let dir = std::env::temp_dir();
        let path = dir.join(format!("monitor_export_test_{:?}.log", std::thread::current().id()));
        pipeline.export(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("123"));
        assert!(contents.contains("AB CD"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn start_tailing_writes_passing_frames_as_they_arrive() {
        let pipeline = MonitorPipeline::new(16);
        let dir = std::env::temp_dir();
        let path = dir.join(format!("monitor_tail_test_{:?}.log", std::thread::current().id()));
        let _ = std::fs::remove_file(&path);

        pipeline.start().unwrap();
        pipeline.start_tailing(&path).unwrap();
        pipeline.ingest(frame(0x456, &[0x01]), Direction::Tx, "CAN-0");

        let deadline = Instant::now() + Duration::from_secs(1);
        while std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        pipeline.stop_tailing();
        pipeline.stop();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("456"));
        let _ = std::fs::remove_file(&path);
    }
}
