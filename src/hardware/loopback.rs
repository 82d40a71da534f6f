//! An in-process CAN bus for tests and simulated ECUs: every endpoint
//! opened on a [`LoopbackBus`] receives every frame sent by every other
//! endpoint, with no real arbitration or bit timing.
//!
//! Generalizes the teacher's `SimulationIsoTpChannel`, which kept a shared
//! `Arc<RwLock<...>>` request/response map per channel pair; here the shared
//! state is a bus of [`ChannelSubscribers`] fan-out sets, one per endpoint,
//! so any number of channels can be wired onto the same simulated bus.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::channel::{
    CanChannel, CanChannelConfig, ChannelError, ChannelResult, ChannelSubscribers, SendStatus,
    SubscriptionId,
};
use crate::frame::CanFrame;

/// Shared bus state. Cheap to clone; every [`LoopbackChannel`] holds an `Arc`.
pub struct LoopbackBus {
    endpoints: Mutex<Vec<(u64, ChannelSubscribers)>>,
    next_endpoint_id: AtomicU64,
}

impl fmt::Debug for LoopbackBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackBus").finish_non_exhaustive()
    }
}

impl Default for LoopbackBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackBus {
    /// Creates an empty bus with no endpoints.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            endpoints: Mutex::new(Vec::new()),
            next_endpoint_id: AtomicU64::new(1),
        })
    }

    /// Opens a new endpoint on this bus. The endpoint receives every frame
    /// sent by any other endpoint, but never its own.
    pub fn open_channel(self: &Arc<Self>) -> LoopbackChannel {
        let id = self.next_endpoint_id.fetch_add(1, Ordering::SeqCst);
        let subscribers = ChannelSubscribers::new();
        self.endpoints.lock().unwrap().push((id, subscribers.clone()));
        LoopbackChannel {
            bus: self.clone(),
            id,
            subscribers,
            open: AtomicBool::new(false),
        }
    }

    fn dispatch(&self, sender_id: u64, frame: &CanFrame) {
        for (id, subs) in self.endpoints.lock().unwrap().iter() {
            if *id != sender_id {
                subs.dispatch(frame.clone());
            }
        }
    }
}

/// One endpoint on a [`LoopbackBus`].
pub struct LoopbackChannel {
    bus: Arc<LoopbackBus>,
    id: u64,
    subscribers: ChannelSubscribers,
    open: AtomicBool,
}

impl fmt::Debug for LoopbackChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackChannel")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl CanChannel for LoopbackChannel {
    fn open(&mut self, _config: CanChannelConfig) -> ChannelResult<()> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) -> ChannelResult<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn send(&self, frame: &CanFrame) -> ChannelResult<SendStatus> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(ChannelError::InterfaceNotOpen);
        }
        self.bus.dispatch(self.id, frame);
        self.subscribers.record_sent();
        Ok(SendStatus::Accepted)
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

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::SystemTime;

    #[test]
    fn frames_fan_out_to_every_other_endpoint_but_not_the_sender() {
        let bus = LoopbackBus::new();
        let mut a = bus.open_channel();
        let mut b = bus.open_channel();
        let mut c = bus.open_channel();
        a.open(CanChannelConfig::default()).unwrap();
        b.open(CanChannelConfig::default()).unwrap();
        c.open(CanChannelConfig::default()).unwrap();

        let a_count = Arc::new(AtomicUsize::new(0));
        let b_count = Arc::new(AtomicUsize::new(0));
        let (ac, bc) = (a_count.clone(), b_count.clone());
        a.subscribe(Box::new(move |_| {
            ac.fetch_add(1, Ordering::SeqCst);
        }));
        b.subscribe(Box::new(move |_| {
            bc.fetch_add(1, Ordering::SeqCst);
        }));

        let frame = CanFrame::new(0x123, &[1, 2, 3], Default::default(), 0, SystemTime::now()).unwrap();
        c.send(&frame).unwrap();

        assert_eq!(a_count.load(Ordering::SeqCst), 1);
        assert_eq!(b_count.load(Ordering::SeqCst), 1);
        assert_eq!(c.stats().frames_sent, 1);
    }

    #[test]
    fn send_before_open_reports_interface_not_open() {
        let bus = LoopbackBus::new();
        let a = bus.open_channel();
        let frame = CanFrame::new(0x1, &[], Default::default(), 0, SystemTime::now()).unwrap();
        assert!(matches!(a.send(&frame), Err(ChannelError::InterfaceNotOpen)));
    }
}
