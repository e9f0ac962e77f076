//! Minimal CANopen master for very constrained targets.
//!
//! There is no object dictionary and no automatic configuration, and this is
//! by no means CiA 301 compliant. What it does provide is enough to bring up
//! and run a node from bare metal code:
//!
//! - NMT master
//! - SYNC producer, optionally with counter
//! - TIME producer
//! - EMCY consumer
//! - one receive and one transmit PDO per node
//! - expedited SDO client on the default channels, values of at most four bytes
//!
//! The protocol core is sans-io ([`master`]), and [`master::io::Master`] drives
//! it against the application's [`CanBus`], [`Clock`] and [`EmergencySink`].
//!
//! Typical use:
//! - reset the node with an NMT request and wait for its boot-up message
//! - configure it with SDO reads and writes
//! - switch it to operational with an NMT request
//! - then cyclically send the PDO, issue a SYNC and receive the node's PDO.
//!   Emergencies received in that phase go to the emergency sink.
//!   SDO transfers are not supported during cyclic operation.
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
mod buffer;
pub mod codec;
pub mod frame;
pub mod master;
mod nom_parser;
#[cfg(feature = "std")]
pub mod slcan;
pub mod timeout;
pub mod types;

pub use codec::{TimeOfDay, TIME_USE_CLOCK};
pub use frame::{Frame, FunctionCode};
pub use master::io::{CanBus, Clock, Config, EmergencySink, Master, Received};
pub use master::{Emergency, ProcessData};
pub use types::{node, ExpeditedSize, IntoNodeId, NmtCommand, NmtTarget, NodeId, SdoValue};
