use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::Duration;

use canopen_simple::{CanBus, Frame};

type QueueT = Arc<Mutex<VecDeque<Frame>>>;

/// CAN bus shared between threads. Every frame sent by an interface is
/// delivered to all other interfaces.
#[derive(Default)]
pub struct SharedBus {
    links: Mutex<Vec<Weak<BusInterfaceLink>>>,
    eof: AtomicBool,
}

impl SharedBus {
    pub fn new() -> Arc<SharedBus> {
        Default::default()
    }

    pub fn disconnect(&self) {
        self.eof.store(true, SeqCst);
        for weak in self.links.lock().unwrap().iter() {
            if let Some(link) = weak.upgrade() {
                link.data_available.notify_all();
            }
        }
    }

    /// Interface whose receive never blocks, as the master expects.
    pub fn new_master_interface(self: &Arc<Self>) -> BusInterface {
        self.new_interface(false)
    }

    /// Interface whose receive blocks until a frame arrives or the bus disconnects.
    pub fn new_node_interface(self: &Arc<Self>) -> BusInterface {
        self.new_interface(true)
    }

    fn new_interface(self: &Arc<Self>, blocking_read: bool) -> BusInterface {
        let link = Arc::new(BusInterfaceLink {
            rx: Default::default(),
            data_available: Default::default(),
        });
        self.links.lock().unwrap().push(Arc::downgrade(&link));
        BusInterface {
            bus: Arc::clone(self),
            link,
            blocking_read,
            timeout: Duration::from_millis(100),
        }
    }

    fn broadcast(&self, sender: &Arc<BusInterfaceLink>, frame: &Frame) {
        let links = self.links.lock().unwrap();
        for weak in links.iter() {
            if let Some(link) = weak.upgrade() {
                if !Arc::ptr_eq(&link, sender) {
                    link.rx.lock().unwrap().push_back(frame.clone());
                    link.data_available.notify_all();
                }
            }
        }
    }
}

struct BusInterfaceLink {
    rx: QueueT,
    data_available: Condvar,
}

pub struct BusInterface {
    bus: Arc<SharedBus>,
    link: Arc<BusInterfaceLink>,
    pub blocking_read: bool,
    pub timeout: Duration,
}

#[derive(Debug, PartialEq)]
pub struct Disconnected;

impl CanBus for BusInterface {
    type Error = Disconnected;

    fn receive(&mut self) -> Result<Option<Frame>, Disconnected> {
        let mut rx = self.link.rx.lock().expect("Read mutex is poisoned");
        loop {
            if let Some(frame) = rx.pop_front() {
                return Ok(Some(frame));
            }
            if self.bus.eof.load(SeqCst) {
                return Err(Disconnected);
            }
            if !self.blocking_read {
                return Ok(None);
            }
            rx = self
                .link
                .data_available
                .wait_timeout(rx, self.timeout)
                .expect("Mutex lock failed")
                .0;
        }
    }

    fn send(&mut self, frame: &Frame) -> Result<(), Disconnected> {
        if self.bus.eof.load(SeqCst) {
            return Err(Disconnected);
        }
        self.bus.broadcast(&self.link, frame);
        Ok(())
    }
}
