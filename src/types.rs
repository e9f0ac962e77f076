//! This module defines range-checked types for CANopen node ids, NMT targets
//! and expedited transfer sizes, meant to simplify correct usage of the API.

use snafu::{ensure, OptionExt, Snafu};

use core::convert::{TryFrom, TryInto};
use core::ops::Deref;

/// Error type for this module
#[derive(Debug, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// The value isn't a valid CANopen node id.
    #[snafu(display("Invalid node id"))]
    InvalidNodeId,
    /// The value isn't a valid expedited transfer size.
    #[snafu(display("Invalid expedited transfer size"))]
    InvalidSize,
    /// The identifier doesn't fit in 11 bits.
    #[snafu(display("Invalid COB-ID"))]
    InvalidCobId,
    /// The payload length is outside of the allowed range.
    #[snafu(display("Invalid payload length"))]
    InvalidLength,
    /// A timeout bound of 2^31 ms or more.
    #[snafu(display("Invalid timeout"))]
    InvalidTimeout,
}

const fn invalid_node_id() -> InvalidNodeIdSnafu {
    InvalidNodeIdSnafu
}

const fn invalid_size() -> InvalidSizeSnafu {
    InvalidSizeSnafu
}

/// NodeId is a range-checked [1, 127] integer, representing a node on the bus.
///
/// ## Example
/// ```
/// use canopen_simple::NodeId;
/// use std::convert::TryInto;
/// let node = NodeId::new(10).unwrap();
/// let node: NodeId = 10.try_into().unwrap();
/// ```
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash)]
#[repr(transparent)]
pub struct NodeId(u8);

/// Create a new [`NodeId`], panics if it is out of range.
pub const fn node(n: u8) -> NodeId {
    if n >= 1 && n <= 127 {
        return NodeId(n);
    }
    panic!("Invalid node id.")
}

impl NodeId {
    /// Create a new node id, checking that it is in \[1, 127\].
    /// # Errors
    /// Returns [`Error::InvalidNodeId`] if `node` is out of range.
    pub fn new(node: impl TryInto<u8>) -> Result<Self, Error> {
        let node = node.try_into().ok().with_context(invalid_node_id)?;
        ensure!((1..=127).contains(&node), invalid_node_id());
        Ok(Self(node))
    }

    /// The raw node id.
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl Deref for NodeId {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq<u8> for NodeId {
    fn eq(&self, other: &u8) -> bool {
        self.0 == *other
    }
}

/// Trait to convert `T: TryInto<u8>` into a [`NodeId`].
pub trait IntoNodeId {
    /// Convert self to a NodeId.
    /// # Errors
    /// Returns `Error::InvalidNodeId` if self isn't a valid node id.
    fn into_node_id(self) -> Result<NodeId, Error>;
}

impl IntoNodeId for NodeId {
    fn into_node_id(self) -> Result<NodeId, Error> {
        Ok(self)
    }
}

impl<T> IntoNodeId for T
where
    T: TryInto<u8>,
{
    fn into_node_id(self) -> Result<NodeId, Error> {
        NodeId::new(self)
    }
}

impl TryFrom<usize> for NodeId {
    type Error = Error;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// The addressee of an NMT request: one node, or every node on the bus.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum NmtTarget {
    /// Broadcast, encoded as node id 0 on the wire.
    All,
    /// A single node.
    Node(NodeId),
}

impl NmtTarget {
    pub(crate) const fn to_byte(self) -> u8 {
        match self {
            Self::All => 0,
            Self::Node(node) => node.0,
        }
    }
}

impl From<NodeId> for NmtTarget {
    fn from(node: NodeId) -> Self {
        Self::Node(node)
    }
}

/// NMT node control commands.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
#[repr(u8)]
pub enum NmtCommand {
    /// Go operational.
    Operational = 0x01,
    /// Stop.
    Stop = 0x02,
    /// Go pre-operational.
    PreOperational = 0x80,
    /// Reset the node.
    ResetNode = 0x81,
    /// Reset communication.
    ResetCommunication = 0x82,
}

/// Number of value bytes in an expedited SDO transfer, range-checked to [1, 4].
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash)]
#[repr(transparent)]
pub struct ExpeditedSize(u8);

impl ExpeditedSize {
    /// One byte, (u)int8.
    pub const U8: Self = Self(1);
    /// Two bytes, (u)int16.
    pub const U16: Self = Self(2);
    /// Four bytes, (u)int32.
    pub const U32: Self = Self(4);

    /// Create a new size, checking that it is in \[1, 4\].
    /// # Errors
    /// Returns [`Error::InvalidSize`] if `size` is out of range.
    pub fn new(size: impl TryInto<u8>) -> Result<Self, Error> {
        let size = size.try_into().ok().with_context(invalid_size)?;
        ensure!((1..=4).contains(&size), invalid_size());
        Ok(Self(size))
    }

    /// Number of value bytes.
    pub const fn get(self) -> usize {
        self.0 as usize
    }

    /// The `n` field of the command specifier: unused bytes, shifted into bits 2..3.
    pub(crate) const fn unused_bits(self) -> u8 {
        (4 - self.0) << 2
    }

    /// Keep only the low `size` bytes of `value`.
    pub(crate) const fn truncate(self, value: u32) -> u32 {
        match self.0 {
            4 => value,
            n => value & ((1u32 << (8 * n as u32)) - 1),
        }
    }
}

/// A value that fits in an expedited SDO transfer.
///
/// Implemented for the (u)int8, (u)int16 and (u)int32 types.
pub trait SdoValue: Copy {
    /// On-wire size of the value.
    const SIZE: ExpeditedSize;
    /// The value as little-endian raw bits.
    fn to_raw(self) -> u32;
    /// Recover the value from raw bits, truncated to `SIZE`.
    fn from_raw(raw: u32) -> Self;
}

macro_rules! impl_sdo_value {
    ($t:ty, $size:expr, $unsigned:ty) => {
        impl SdoValue for $t {
            const SIZE: ExpeditedSize = $size;

            fn to_raw(self) -> u32 {
                self as $unsigned as u32
            }

            fn from_raw(raw: u32) -> Self {
                raw as $unsigned as $t
            }
        }
    };
}

impl_sdo_value!(u8, ExpeditedSize::U8, u8);
impl_sdo_value!(i8, ExpeditedSize::U8, u8);
impl_sdo_value!(u16, ExpeditedSize::U16, u16);
impl_sdo_value!(i16, ExpeditedSize::U16, u16);
impl_sdo_value!(u32, ExpeditedSize::U32, u32);
impl_sdo_value!(i32, ExpeditedSize::U32, u32);
