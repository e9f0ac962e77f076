//! Bus master (client) part of the protocol.
//!
//! This module is sans-io: each pending request knows which frame to put on
//! the bus and recognises its own response among all received frames.
//! [`io::Master`] drives these against an actual bus with a timeout.

use crate::codec;
use crate::frame::{Frame, FunctionCode, Payload};
use crate::nom_parser::master::{parse_boot_up, parse_emergency, parse_sdo_response};
use crate::types::{ExpeditedSize, NodeId};

pub mod io;

/// Process data received from a node, 0 to 8 bytes.
pub type ProcessData = Payload;

/// Outcome of offering one received frame to a pending request.
#[derive(Debug, PartialEq, Eq)]
pub enum ReceiverResult<T> {
    /// The frame doesn't belong to the request, keep waiting.
    NeedData,
    /// The request is complete.
    Done(T),
}

/// A request waiting for its response.
pub trait Receiver {
    /// What the request completes with.
    type Response;
    /// Offer a received frame to the request. Unrelated frames yield `NeedData`.
    fn receive_frame(&self, frame: &Frame) -> ReceiverResult<Self::Response>;
}

/// Response to an SDO write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WriteResponse {
    /// The node accepted the value.
    Ok,
    /// The node aborted the transfer.
    Abort,
}

/// Response to an SDO read.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReadResponse {
    /// The value, truncated to the requested size.
    Ok(u32),
    /// The node aborted the transfer.
    Abort,
}

const SCS_MASK: u8 = 0xf0;
const SCS_ABORT: u8 = 0x80;
/// e = 1 (expedited), s = 1 (size indicated)
const EXPEDITED_SIZE_INDICATED: u8 = 0x03;
const UNUSED_BYTES_MASK: u8 = 0x0c;

/// Waits for the boot-up message of a node.
#[derive(Debug, Copy, Clone)]
pub struct WaitBoot {
    node: NodeId,
}

impl WaitBoot {
    /// Wait for `node` to announce itself.
    pub const fn new(node: NodeId) -> Self {
        Self { node }
    }
}

impl Receiver for WaitBoot {
    type Response = ();

    fn receive_frame(&self, frame: &Frame) -> ReceiverResult<()> {
        if frame.function_code() == FunctionCode::Heartbeat
            && self.node == frame.node_of()
            && parse_boot_up(frame.data())
        {
            ReceiverResult::Done(())
        } else {
            ReceiverResult::NeedData
        }
    }
}

/// The object dictionary entry a transfer is addressed to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Entry {
    node: NodeId,
    index: u16,
    subindex: u8,
}

impl Entry {
    /// Returns the command byte and data of a response to this entry.
    fn response(&self, frame: &Frame) -> Option<(u8, u32)> {
        if frame.function_code() != FunctionCode::SdoTx || self.node != frame.node_of() {
            return None;
        }
        let response = parse_sdo_response(frame.data())?;
        if response.index == self.index && response.subindex == self.subindex {
            Some((response.command, response.data))
        } else {
            None
        }
    }
}

/// Expedited SDO download, writing up to four bytes to a node.
#[derive(Debug, Copy, Clone)]
pub struct SdoDownload {
    entry: Entry,
    value: u32,
    size: ExpeditedSize,
}

impl SdoDownload {
    /// Write the low `size` bytes of `value` to `index`:`subindex` of `node`.
    pub const fn new(
        node: NodeId,
        index: u16,
        subindex: u8,
        value: u32,
        size: ExpeditedSize,
    ) -> Self {
        Self {
            entry: Entry {
                node,
                index,
                subindex,
            },
            value,
            size,
        }
    }

    /// The request frame.
    pub fn request(&self) -> Frame {
        let Entry {
            node,
            index,
            subindex,
        } = self.entry;
        codec::sdo_download(node, index, subindex, self.value, self.size)
    }
}

impl Receiver for SdoDownload {
    type Response = WriteResponse;

    fn receive_frame(&self, frame: &Frame) -> ReceiverResult<WriteResponse> {
        match self.entry.response(frame) {
            None => ReceiverResult::NeedData,
            Some((command, _)) => ReceiverResult::Done(match command & SCS_MASK {
                0x20 | 0x60 => WriteResponse::Ok,
                _ => WriteResponse::Abort,
            }),
        }
    }
}

/// Expedited SDO upload, reading up to four bytes from a node.
#[derive(Debug, Copy, Clone)]
pub struct SdoUpload {
    entry: Entry,
    size: ExpeditedSize,
}

impl SdoUpload {
    /// Read `size` bytes from `index`:`subindex` of `node`.
    pub const fn new(node: NodeId, index: u16, subindex: u8, size: ExpeditedSize) -> Self {
        Self {
            entry: Entry {
                node,
                index,
                subindex,
            },
            size,
        }
    }

    /// The request frame.
    pub fn request(&self) -> Frame {
        codec::sdo_upload(self.entry.node, self.entry.index, self.entry.subindex)
    }
}

impl Receiver for SdoUpload {
    type Response = ReadResponse;

    fn receive_frame(&self, frame: &Frame) -> ReceiverResult<ReadResponse> {
        let (command, data) = match self.entry.response(frame) {
            Some(response) => response,
            None => return ReceiverResult::NeedData,
        };
        if command & SCS_MASK == SCS_ABORT {
            return ReceiverResult::Done(ReadResponse::Abort);
        }
        // Only an expedited response of the requested size is an answer to us.
        if command & EXPEDITED_SIZE_INDICATED != EXPEDITED_SIZE_INDICATED
            || command & UNUSED_BYTES_MASK != self.size.unused_bits()
        {
            return ReceiverResult::NeedData;
        }
        ReceiverResult::Done(match command & SCS_MASK {
            0x40 | 0x60 => ReadResponse::Ok(self.size.truncate(data)),
            _ => ReadResponse::Abort,
        })
    }
}

/// An emergency message received from a node.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Emergency {
    /// The node that issued the EMCY.
    pub node: u8,
    /// Emergency error code.
    pub error_code: u16,
    /// Error register.
    pub error_register: u8,
    /// Manufacturer specific error field.
    pub manufacturer: [u8; 5],
}

/// What a frame received during cyclic operation turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The awaited process data.
    ProcessData(ProcessData),
    /// An emergency from any node.
    Emergency(Emergency),
    /// Nothing we handle.
    Unmatched,
}

/// Classifies frames received during cyclic operation for one node.
#[derive(Debug, Copy, Clone)]
pub struct CyclicReceive {
    node: NodeId,
    loopback: bool,
}

impl CyclicReceive {
    /// Await the transmit PDO of `node`.
    ///
    /// With `loopback` set, a frame on exactly 0x080 is our own SYNC
    /// coming back rather than an emergency.
    pub const fn new(node: NodeId, loopback: bool) -> Self {
        Self { node, loopback }
    }

    /// Classify one frame.
    pub fn dispatch(&self, frame: &Frame) -> Dispatch {
        match frame.function_code() {
            FunctionCode::SyncEmcy if self.loopback && frame.node_of() == 0 => Dispatch::Unmatched,
            FunctionCode::SyncEmcy => {
                Dispatch::Emergency(parse_emergency(frame.node_of(), frame.data()))
            }
            FunctionCode::Tpdo1 if self.node == frame.node_of() => {
                Dispatch::ProcessData(frame.payload().clone())
            }
            _ => Dispatch::Unmatched,
        }
    }
}
