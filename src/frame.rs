//! The CAN frame as seen by the protocol, and classification of its identifier.

use arrayvec::ArrayVec;
use core::convert::TryFrom;
use snafu::ensure;

use crate::types::{Error, InvalidCobIdSnafu};

/// Largest 11 bit identifier.
pub const MAX_COB_ID: u16 = 0x7ff;

const FUNCTION_CODE_MASK: u16 = 0b111_1000_0000;
const NODE_ID_MASK: u16 = 0b000_0111_1111;

/// Payload of a frame, at most eight bytes stored inline.
pub type Payload = ArrayVec<u8, 8>;

/// Minimal representation of a CAN frame.
///
/// Standard 11 bit identifiers only, and always a data frame (no RTR).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    cob_id: u16,
    data: Payload,
}

impl Frame {
    /// Create a frame, checking that the identifier fits in 11 bits
    /// and that `data` is at most eight bytes.
    /// # Errors
    /// [`Error::InvalidCobId`] or [`Error::InvalidLength`].
    pub fn new(cob_id: u16, data: &[u8]) -> Result<Self, Error> {
        ensure!(cob_id <= MAX_COB_ID, InvalidCobIdSnafu);
        let data = Payload::try_from(data).map_err(|_| Error::InvalidLength)?;
        Ok(Self { cob_id, data })
    }

    /// Build a frame from parts already known to be in range.
    pub(crate) fn from_parts(cob_id: u16, data: Payload) -> Self {
        debug_assert!(cob_id <= MAX_COB_ID);
        Self { cob_id, data }
    }

    /// The CAN object identifier: four bit function code and seven bit node id.
    pub const fn cob_id(&self) -> u16 {
        self.cob_id
    }

    /// The frame payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn payload(&self) -> &Payload {
        &self.data
    }

    /// Payload length, 0 to 8.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the frame carries no payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Which protocol service the identifier belongs to.
    pub const fn function_code(&self) -> FunctionCode {
        FunctionCode::of(self.cob_id)
    }

    /// The node id in the low seven bits of the identifier.
    ///
    /// Always computable, but only meaningful for per-node services.
    pub const fn node_of(&self) -> u8 {
        node_of(self.cob_id)
    }
}

/// The node id part of an identifier.
pub const fn node_of(cob_id: u16) -> u8 {
    (cob_id & NODE_ID_MASK) as u8
}

/// The function code, i.e. the top four bits of the 11 bit identifier.
///
/// SYNC and EMCY share the same function code. A SYNC is a broadcast from
/// the master, so a frame in that range received by the master is an EMCY.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FunctionCode {
    /// 0x000, NMT node control.
    Nmt,
    /// 0x080, SYNC (broadcast) or EMCY (+ node id).
    SyncEmcy,
    /// 0x100, timestamp.
    Time,
    /// 0x180 + node, the first transmit PDO of a node.
    Tpdo1,
    /// 0x200 + node, the first receive PDO of a node.
    Rpdo1,
    /// 0x580 + node, SDO server response.
    SdoTx,
    /// 0x600 + node, SDO client request.
    SdoRx,
    /// 0x700 + node, heartbeat and boot-up.
    Heartbeat,
    /// Any function code not handled here, e.g. the other PDO channels.
    Other(u16),
}

impl FunctionCode {
    /// Classify an identifier. Total over all inputs, bits above the
    /// 11 bit range are ignored.
    pub const fn of(cob_id: u16) -> Self {
        match cob_id & FUNCTION_CODE_MASK {
            0x000 => Self::Nmt,
            0x080 => Self::SyncEmcy,
            0x100 => Self::Time,
            0x180 => Self::Tpdo1,
            0x200 => Self::Rpdo1,
            0x580 => Self::SdoTx,
            0x600 => Self::SdoRx,
            0x700 => Self::Heartbeat,
            other => Self::Other(other),
        }
    }

    /// The base identifier of the function code.
    pub const fn base(self) -> u16 {
        match self {
            Self::Nmt => 0x000,
            Self::SyncEmcy => 0x080,
            Self::Time => 0x100,
            Self::Tpdo1 => 0x180,
            Self::Rpdo1 => 0x200,
            Self::SdoTx => 0x580,
            Self::SdoRx => 0x600,
            Self::Heartbeat => 0x700,
            Self::Other(base) => base,
        }
    }
}
