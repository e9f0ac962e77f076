//! Construction of the outbound frames, one function per service.
//!
//! Every encoder is a pure mapping from its arguments to a [`Frame`].

use core::convert::TryFrom;

use crate::frame::{Frame, FunctionCode, Payload};
use crate::types::{Error, ExpeditedSize, NmtCommand, NmtTarget, NodeId};

/// Client command specifier: expedited download initiate, size indicated.
const CCS_DOWNLOAD_EXPEDITED: u8 = 0x23;
/// Client command specifier: upload initiate.
const CCS_UPLOAD: u8 = 0x40;

/// Sentinel for [`time_stamp`] style arguments meaning "read the clock".
pub const TIME_USE_CLOCK: u32 = u32::MAX;

/// Milliseconds argument of a TIME broadcast.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TimeOfDay {
    /// Use the current value of the millisecond clock.
    Clock,
    /// Use the given millisecond count.
    Millis(u32),
}

impl From<u32> for TimeOfDay {
    fn from(ms: u32) -> Self {
        if ms == TIME_USE_CLOCK {
            Self::Clock
        } else {
            Self::Millis(ms)
        }
    }
}

fn payload<const N: usize>(bytes: [u8; N]) -> Payload {
    let mut data = Payload::new();
    data.extend(bytes);
    data
}

fn sdo_request(node: NodeId, command: u8, index: u16, subindex: u8, value: [u8; 4]) -> Frame {
    let [index_lo, index_hi] = index.to_le_bytes();
    let [v0, v1, v2, v3] = value;
    Frame::from_parts(
        FunctionCode::SdoRx.base() + u16::from(*node),
        payload([command, index_lo, index_hi, subindex, v0, v1, v2, v3]),
    )
}

/// NMT node control: `[command, node]` on identifier 0x000.
pub fn nmt_request(target: NmtTarget, command: NmtCommand) -> Frame {
    Frame::from_parts(
        FunctionCode::Nmt.base(),
        payload([command as u8, target.to_byte()]),
    )
}

/// SYNC broadcast, empty or carrying a one byte counter.
pub fn sync(counter: Option<u8>) -> Frame {
    let mut data = Payload::new();
    if let Some(counter) = counter {
        data.push(counter);
    }
    Frame::from_parts(FunctionCode::SyncEmcy.base(), data)
}

/// TIME broadcast.
///
/// Only the 24 bit millisecond part is filled in, the day field is sent as zero.
pub fn time_stamp(ms: u32) -> Frame {
    let [b0, b1, b2, _] = ms.to_le_bytes();
    Frame::from_parts(FunctionCode::Time.base(), payload([b0, b1, b2, 0, 0, 0]))
}

/// Process data for a node, sent to the node's receive PDO (0x200 + node).
/// # Errors
/// [`Error::InvalidLength`] unless `data` is 1 to 8 bytes.
pub fn process_data(node: NodeId, data: &[u8]) -> Result<Frame, Error> {
    if data.is_empty() {
        return Err(Error::InvalidLength);
    }
    let data = Payload::try_from(data).map_err(|_| Error::InvalidLength)?;
    Ok(Frame::from_parts(
        FunctionCode::Rpdo1.base() + u16::from(*node),
        data,
    ))
}

/// Expedited SDO download (write) request.
///
/// Value bytes beyond `size` are sent as zero.
pub fn sdo_download(
    node: NodeId,
    index: u16,
    subindex: u8,
    value: u32,
    size: ExpeditedSize,
) -> Frame {
    let command = CCS_DOWNLOAD_EXPEDITED | size.unused_bits();
    sdo_request(
        node,
        command,
        index,
        subindex,
        size.truncate(value).to_le_bytes(),
    )
}

/// SDO upload (read) request, padded to eight bytes.
pub fn sdo_upload(node: NodeId, index: u16, subindex: u8) -> Frame {
    sdo_request(node, CCS_UPLOAD, index, subindex, [0; 4])
}
