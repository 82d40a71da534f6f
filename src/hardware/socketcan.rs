//! Real Linux SocketCAN backend. Only wraps raw CAN frame send/receive;
//! unlike the teacher's `SocketCanIsoTPChannel`, segmentation is never
//! delegated to the kernel's ISO-TP socket — the crate's own
//! [`crate::isotp`] engine sits on top of this channel instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use socketcan::{CanFrame as SocketCanFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Id, Socket, StandardId};

use crate::channel::{CanChannel, CanChannelConfig, ChannelError, ChannelResult, ChannelSubscribers, SendStatus, SubscriptionId};
use crate::frame::{CanFlags, CanFrame};

impl From<socketcan::Error> for ChannelError {
    fn from(e: socketcan::Error) -> Self {
        ChannelError::ApiError {
            api_name: "socketcan",
            code: 0,
            desc: e.to_string(),
        }
    }
}

/// A CAN channel bound to a real Linux `can0`-style network interface.
pub struct SocketCanChannel {
    iface: String,
    socket: std::sync::Mutex<Option<CanSocket>>,
    subscribers: ChannelSubscribers,
    running: Arc<AtomicBool>,
}

impl std::fmt::Debug for SocketCanChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketCanChannel")
            .field("iface", &self.iface)
            .finish_non_exhaustive()
    }
}

impl SocketCanChannel {
    /// Names a new channel against the given interface (e.g. `"can0"`).
    /// The interface is not opened until [`CanChannel::open`] is called.
    pub fn new(iface: impl Into<String>) -> Self {
        Self {
            iface: iface.into(),
            socket: std::sync::Mutex::new(None),
            subscribers: ChannelSubscribers::new(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl CanChannel for SocketCanChannel {
    fn open(&mut self, _config: CanChannelConfig) -> ChannelResult<()> {
        let mut guard = self.socket.lock().unwrap();
        if guard.is_some() {
            return Ok(());
        }
        let socket = CanSocket::open(&self.iface)?;
        socket.set_nonblocking(false)?;
        let reader = socket.try_clone()?;
        *guard = Some(socket);
        drop(guard);

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let subscribers = self.subscribers.clone();
        std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                match reader.read_frame() {
                    Ok(frame) => {
                        if let Some(mapped) = map_inbound_frame(&frame) {
                            subscribers.dispatch(mapped);
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(std::time::Duration::from_millis(1));
                    }
                    Err(_) => {
                        subscribers.record_link_down();
                        std::thread::sleep(std::time::Duration::from_millis(50));
                    }
                }
            }
        });
        Ok(())
    }

    fn close(&mut self) -> ChannelResult<()> {
        self.running.store(false, Ordering::SeqCst);
        *self.socket.lock().unwrap() = None;
        Ok(())
    }

    fn send(&self, frame: &CanFrame) -> ChannelResult<SendStatus> {
        let guard = self.socket.lock().unwrap();
        let socket = guard.as_ref().ok_or(ChannelError::InterfaceNotOpen)?;
        let id: Id = if frame.is_extended() {
            ExtendedId::new(frame.id).map(Id::Extended).ok_or(ChannelError::UnsupportedRequest)?
        } else {
            StandardId::new(frame.id as u16).map(Id::Standard).ok_or(ChannelError::UnsupportedRequest)?
        };
        let wire = SocketCanFrame::new(id, &frame.data).ok_or(ChannelError::UnsupportedRequest)?;
        match socket.write_frame(&wire) {
            Ok(()) => {
                self.subscribers.record_sent();
                Ok(SendStatus::Accepted)
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                self.subscribers.record_backpressure();
                Ok(SendStatus::Backpressure)
            }
            Err(e) => {
                self.subscribers.record_link_down();
                Err(ChannelError::IoError(e))
            }
        }
    }

    fn subscribe(&self, callback: Box<dyn Fn(CanFrame) + Send + Sync>) -> SubscriptionId {
        self.subscribers.subscribe(callback)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.unsubscribe(id)
    }

    fn stats(&self) -> crate::channel::CanChannelStats {
        self.subscribers.stats()
    }
}

impl Drop for SocketCanChannel {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn map_inbound_frame(frame: &SocketCanFrame) -> Option<CanFrame> {
    let mut flags = CanFlags::empty();
    if frame.is_extended() {
        flags |= CanFlags::EXTENDED_ID;
    }
    if frame.is_remote_frame() {
        flags |= CanFlags::REMOTE;
    }
    if frame.is_error_frame() {
        flags |= CanFlags::ERROR;
    }
    CanFrame::new(frame.raw_id(), frame.data(), flags, 0, SystemTime::now()).ok()
}

/// Lists candidate SocketCAN interfaces by scanning `/sys/class/net` for
/// names containing `"can"` (e.g. `can0`, `vcan0`).
pub fn list_interfaces() -> Vec<String> {
    let Ok(entries) = std::fs::read_dir("/sys/class/net") else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.contains("can"))
        .collect()
}
