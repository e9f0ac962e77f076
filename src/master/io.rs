//! Blocking master driven by application supplied bus, clock and emergency sink.
//!
//! The request/response calls (`wait_boot`, `sdo_read`, `sdo_write`) poll the
//! bus until the response arrives or the configured timeout expires. Frames
//! that don't belong to the pending request are dropped. The cyclic calls
//! (`sync`, `send_process_data`, `receive_process_data`) never wait.
//!
//! Don't run a blocking request while the cyclic calls are used from another
//! context: both read from the same bus and the request would eat the frames.

use core::fmt::Debug;

use log::{debug, trace};
use snafu::{ensure, Snafu};

use super::{
    CyclicReceive, Dispatch, Emergency, ProcessData, ReadResponse, Receiver, ReceiverResult,
    SdoDownload, SdoUpload, WaitBoot, WriteResponse,
};
use crate::codec::{self, TimeOfDay};
use crate::frame::Frame;
use crate::timeout::{expired, Timeouts, MAX_BOUND};
use crate::types::{
    Error as TypeError, ExpeditedSize, IntoNodeId, InvalidTimeoutSnafu, NmtCommand, NmtTarget,
    SdoValue,
};

/// Raw CAN frame access, implemented by the application.
pub trait CanBus {
    /// Error reported by the bus driver.
    type Error: Debug;

    /// Receive one frame without blocking. `Ok(None)` means no frame is available.
    fn receive(&mut self) -> Result<Option<Frame>, Self::Error>;

    /// Transmit one frame. A full transmit buffer is an error, the master doesn't retry.
    fn send(&mut self, frame: &Frame) -> Result<(), Self::Error>;
}

impl<B: CanBus + ?Sized> CanBus for &mut B {
    type Error = B::Error;

    fn receive(&mut self) -> Result<Option<Frame>, Self::Error> {
        (**self).receive()
    }

    fn send(&mut self, frame: &Frame) -> Result<(), Self::Error> {
        (**self).send(frame)
    }
}

/// Millisecond clock. The origin is arbitrary, the value must not decrease
/// other than by wrapping around.
pub trait Clock {
    /// Current time in ms.
    fn now_ms(&mut self) -> u32;
}

impl<F: FnMut() -> u32> Clock for F {
    fn now_ms(&mut self) -> u32 {
        self()
    }
}

/// Receives the emergency messages seen during cyclic operation. Must not block.
pub trait EmergencySink {
    /// Handle one emergency.
    fn emergency(&mut self, emcy: &Emergency);
}

impl<F: FnMut(&Emergency)> EmergencySink for F {
    fn emergency(&mut self, emcy: &Emergency) {
        self(emcy)
    }
}

/// Error type for the blocking master.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error<E: Debug> {
    /// The bus driver failed to send or receive.
    #[snafu(display("CAN bus error: {:?}", error))]
    Transport { error: E },
    /// No matching response arrived in time.
    #[snafu(display("Timeout waiting for response"))]
    Timeout,
    /// The node aborted the SDO transfer.
    #[snafu(display("SDO abort from node {} for {:04x}:{:02x}", node, index, subindex))]
    Abort { node: u8, index: u16, subindex: u8 },
    /// An argument was out of range.
    #[snafu(display("Invalid argument: {}", error))]
    InvalidArgument { error: TypeError },
}

impl<E: Debug> From<TypeError> for Error<E> {
    fn from(error: TypeError) -> Self {
        Error::InvalidArgument { error }
    }
}

/// Master configuration.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Send a one byte counter with every SYNC.
    pub sync_counter: bool,
    /// Bounds for the blocking calls.
    pub timeouts: Timeouts,
    /// The bus echoes our own frames back, so 0x080 is a SYNC and not an EMCY.
    pub loopback: bool,
}

impl Config {
    /// The default configuration: no SYNC counter, default timeouts, no loopback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the SYNC counter.
    pub fn sync_counter(mut self, enabled: bool) -> Self {
        self.sync_counter = enabled;
        self
    }

    /// Set the boot-up and SDO timeouts, in ms.
    /// # Errors
    /// Returns [`TypeError::InvalidTimeout`] unless both are below 2^31.
    pub fn timeouts(mut self, boot_ms: u32, sdo_ms: u32) -> Result<Self, TypeError> {
        ensure!(
            boot_ms < MAX_BOUND && sdo_ms < MAX_BOUND,
            InvalidTimeoutSnafu
        );
        self.timeouts = Timeouts { boot_ms, sdo_ms };
        Ok(self)
    }

    /// Declare that the bus echoes our own SYNC back to us.
    pub fn loopback(mut self, enabled: bool) -> Self {
        self.loopback = enabled;
        self
    }
}

/// Result of one non-blocking cyclic receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Process data from the awaited node.
    ProcessData(ProcessData),
    /// An emergency was received and passed to the emergency sink.
    Emergency,
    /// A frame was received but isn't for us.
    Unmatched,
    /// No frame was available.
    NoData,
}

/// CANopen master.
///
/// Owns the bus, the clock and the emergency sink for the lifetime of the
/// connection.
///
/// # Example
/// ```
/// use canopen_simple::master::io::{CanBus, Master};
/// use canopen_simple::{Emergency, Frame, NmtCommand, NmtTarget};
/// # struct Bus;
/// # impl CanBus for Bus {
/// #     type Error = ();
/// #     fn receive(&mut self) -> Result<Option<Frame>, ()> { Ok(None) }
/// #     fn send(&mut self, _frame: &Frame) -> Result<(), ()> { Ok(()) }
/// # }
/// # fn main() -> Result<(), canopen_simple::master::io::Error<()>> {
/// let mut ms: u32 = 0;
/// let clock = move || {
///     ms += 1;
///     ms
/// };
/// let on_emergency = |emcy: &Emergency| println!("EMCY {:?}", emcy);
/// let mut master = Master::new(Bus, clock, on_emergency);
///
/// master.nmt_request(NmtTarget::All, NmtCommand::ResetNode)?;
/// master.sync()?;
/// # Ok(()) }
/// ```
pub struct Master<B, C, S> {
    bus: B,
    clock: C,
    emergency: S,
    config: Config,
    sync_counter: u8,
}

impl<B, C, S> Master<B, C, S>
where
    B: CanBus,
    C: Clock,
    S: EmergencySink,
{
    /// Create a master with the default [`Config`].
    pub fn new(bus: B, clock: C, emergency: S) -> Self {
        Self::with_config(bus, clock, emergency, Config::default())
    }

    /// Create a master with the given configuration.
    pub fn with_config(bus: B, clock: C, emergency: S, config: Config) -> Self {
        Self {
            bus,
            clock,
            emergency,
            config,
            sync_counter: 1,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Access the underlying bus.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Consume the master, returning the bus.
    pub fn into_inner(self) -> B {
        self.bus
    }

    /// Send an NMT state change request to one node or all nodes.
    pub fn nmt_request(
        &mut self,
        target: impl Into<NmtTarget>,
        command: NmtCommand,
    ) -> Result<(), Error<B::Error>> {
        self.send(&codec::nmt_request(target.into(), command))
    }

    /// Wait until `node` sends its boot-up message.
    pub fn wait_boot(&mut self, node: impl IntoNodeId) -> Result<(), Error<B::Error>> {
        let wait = WaitBoot::new(node.into_node_id()?);
        let bound = self.config.timeouts.boot_ms;
        self.receive_response(&wait, bound)
    }

    /// Send a SYNC, with the counter if it is enabled in the configuration.
    pub fn sync(&mut self) -> Result<(), Error<B::Error>> {
        let counter = if self.config.sync_counter {
            let counter = self.sync_counter;
            self.sync_counter = counter.wrapping_add(1);
            Some(counter)
        } else {
            None
        };
        self.send(&codec::sync(counter))
    }

    /// Reset the SYNC counter to 1.
    ///
    /// Call this before cyclic operation is started again after it was stopped.
    pub fn reset_sync_counter(&mut self) {
        self.sync_counter = 1;
    }

    /// Send a TIME broadcast.
    ///
    /// Pass [`TimeOfDay::Clock`] (or [`codec::TIME_USE_CLOCK`]) to send the
    /// current value of the clock. The day field is always zero.
    pub fn time_stamp(&mut self, time: impl Into<TimeOfDay>) -> Result<(), Error<B::Error>> {
        let ms = match time.into() {
            TimeOfDay::Clock => self.clock.now_ms(),
            TimeOfDay::Millis(ms) => ms,
        };
        self.send(&codec::time_stamp(ms))
    }

    /// Send 1 to 8 bytes of process data to the receive PDO of `node`.
    pub fn send_process_data(
        &mut self,
        node: impl IntoNodeId,
        data: &[u8],
    ) -> Result<(), Error<B::Error>> {
        let frame = codec::process_data(node.into_node_id()?, data)?;
        self.send(&frame)
    }

    /// Try to receive the transmit PDO of `node`, without blocking.
    ///
    /// Emergencies received on the way are passed to the emergency sink.
    pub fn receive_process_data(
        &mut self,
        node: impl IntoNodeId,
    ) -> Result<Received, Error<B::Error>> {
        let cyclic = CyclicReceive::new(node.into_node_id()?, self.config.loopback);
        let frame = match self.receive()? {
            Some(frame) => frame,
            None => return Ok(Received::NoData),
        };
        Ok(match cyclic.dispatch(&frame) {
            Dispatch::ProcessData(data) => Received::ProcessData(data),
            Dispatch::Emergency(emcy) => {
                debug!("EMCY from node {}: {:04x}", emcy.node, emcy.error_code);
                self.emergency.emergency(&emcy);
                Received::Emergency
            }
            Dispatch::Unmatched => Received::Unmatched,
        })
    }

    /// Write `value` to `index`:`subindex` of `node`, the size is given by the value type.
    pub fn sdo_write<V: SdoValue>(
        &mut self,
        node: impl IntoNodeId,
        index: u16,
        subindex: u8,
        value: V,
    ) -> Result<(), Error<B::Error>> {
        self.sdo_write_raw(node, index, subindex, value.to_raw(), V::SIZE)
    }

    /// Read a value of type `V` from `index`:`subindex` of `node`.
    pub fn sdo_read<V: SdoValue>(
        &mut self,
        node: impl IntoNodeId,
        index: u16,
        subindex: u8,
    ) -> Result<V, Error<B::Error>> {
        self.sdo_read_raw(node, index, subindex, V::SIZE)
            .map(V::from_raw)
    }

    /// Write the low `size` bytes of `value` with an expedited SDO download.
    pub fn sdo_write_raw(
        &mut self,
        node: impl IntoNodeId,
        index: u16,
        subindex: u8,
        value: u32,
        size: ExpeditedSize,
    ) -> Result<(), Error<B::Error>> {
        let node = node.into_node_id()?;
        let download = SdoDownload::new(node, index, subindex, value, size);
        self.send(&download.request())?;
        let bound = self.config.timeouts.sdo_ms;
        match self.receive_response(&download, bound)? {
            WriteResponse::Ok => Ok(()),
            WriteResponse::Abort => {
                debug!("SDO write {:04x}:{:02x} aborted by node {}", index, subindex, *node);
                Err(Error::Abort {
                    node: *node,
                    index,
                    subindex,
                })
            }
        }
    }

    /// Read `size` bytes with an expedited SDO upload.
    pub fn sdo_read_raw(
        &mut self,
        node: impl IntoNodeId,
        index: u16,
        subindex: u8,
        size: ExpeditedSize,
    ) -> Result<u32, Error<B::Error>> {
        let node = node.into_node_id()?;
        let upload = SdoUpload::new(node, index, subindex, size);
        self.send(&upload.request())?;
        let bound = self.config.timeouts.sdo_ms;
        match self.receive_response(&upload, bound)? {
            ReadResponse::Ok(value) => Ok(value),
            ReadResponse::Abort => {
                debug!("SDO read {:04x}:{:02x} aborted by node {}", index, subindex, *node);
                Err(Error::Abort {
                    node: *node,
                    index,
                    subindex,
                })
            }
        }
    }

    fn send(&mut self, frame: &Frame) -> Result<(), Error<B::Error>> {
        trace!("send {:03x} {:02x?}", frame.cob_id(), frame.data());
        self.bus
            .send(frame)
            .map_err(|error| Error::Transport { error })
    }

    fn receive(&mut self) -> Result<Option<Frame>, Error<B::Error>> {
        let frame = self
            .bus
            .receive()
            .map_err(|error| Error::Transport { error })?;
        if let Some(frame) = &frame {
            trace!("recv {:03x} {:02x?}", frame.cob_id(), frame.data());
        }
        Ok(frame)
    }

    /// Poll the bus until `receiver` is done or `bound` ms have passed.
    fn receive_response<R: Receiver>(
        &mut self,
        receiver: &R,
        bound: u32,
    ) -> Result<R::Response, Error<B::Error>> {
        let start = self.clock.now_ms();
        loop {
            if let Some(frame) = self.receive()? {
                match receiver.receive_frame(&frame) {
                    ReceiverResult::Done(response) => return Ok(response),
                    ReceiverResult::NeedData => {
                        debug!("Dropping unexpected frame {:03x}", frame.cob_id())
                    }
                }
            }
            if expired(start, self.clock.now_ms(), bound) {
                debug!("No response within {} ms", bound);
                return Err(Error::Timeout);
            }
        }
    }
}
