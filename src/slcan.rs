//! [`CanBus`] over a serial line CAN adapter (SLCAN / LAWICEL protocol).
//!
//! Works with any `Read + Write` stream, e.g. a port opened with the
//! `serialport` crate. Configure a short read timeout on the port: a read
//! that times out is treated as "no frame available".
//!
//! Only standard data frames are handled. Extended and RTR frames received
//! from the adapter are skipped.

use std::io::{ErrorKind, Read, Write};

use arrayvec::ArrayVec;
use log::{debug, trace};
use snafu::{ResultExt, Snafu};

use crate::buffer::Buffer;
use crate::frame::Frame;
use crate::master::io::CanBus;
use crate::nom_parser::slcan::{parse_token, SlcanToken, CR};

/// Error type for the SLCAN bus.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// Reading from or writing to the serial line failed.
    #[snafu(display("Serial I/O error: {}", source))]
    Io { source: std::io::Error },
    /// The adapter rejected a command.
    #[snafu(display("Adapter rejected command"))]
    AdapterNack,
}

/// CAN bitrate setting of the adapter.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Bitrate {
    /// 10 kbit/s, `S0`.
    Kbit10,
    /// 20 kbit/s, `S1`.
    Kbit20,
    /// 50 kbit/s, `S2`.
    Kbit50,
    /// 100 kbit/s, `S3`.
    Kbit100,
    /// 125 kbit/s, `S4`.
    Kbit125,
    /// 250 kbit/s, `S5`.
    Kbit250,
    /// 500 kbit/s, `S6`.
    Kbit500,
    /// 800 kbit/s, `S7`.
    Kbit800,
    /// 1 Mbit/s, `S8`.
    Mbit1,
}

impl Bitrate {
    const fn code(self) -> u8 {
        match self {
            Self::Kbit10 => b'0',
            Self::Kbit20 => b'1',
            Self::Kbit50 => b'2',
            Self::Kbit100 => b'3',
            Self::Kbit125 => b'4',
            Self::Kbit250 => b'5',
            Self::Kbit500 => b'6',
            Self::Kbit800 => b'7',
            Self::Mbit1 => b'8',
        }
    }
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";

// length: t<id (3)><dlc><data (16)>CR == 22
pub type LineStore = ArrayVec<u8, 22>;

/// Encode a frame as an SLCAN transmit command.
pub fn encode(frame: &Frame) -> LineStore {
    let mut line = LineStore::new();
    let id = frame.cob_id();
    line.push(b't');
    for shift in [8, 4, 0] {
        line.push(HEX[usize::from((id >> shift) & 0xf)]);
    }
    line.push(b'0' + frame.len() as u8);
    for byte in frame.data() {
        line.push(HEX[usize::from(byte >> 4)]);
        line.push(HEX[usize::from(byte & 0xf)]);
    }
    line.push(CR);
    line
}

/// CAN bus on a serial line adapter.
pub struct SlcanBus<IO> {
    io: IO,
    buffer: Buffer,
}

impl<IO: Read + Write> SlcanBus<IO> {
    /// Wrap an already configured serial stream.
    pub fn new(io: IO) -> Self {
        Self {
            io,
            buffer: Buffer::new(),
        }
    }

    /// Close any open channel, set the bitrate and open the channel.
    pub fn open(&mut self, bitrate: Bitrate) -> Result<(), Error> {
        self.command(b"C\r")?;
        self.command(&[b'S', bitrate.code(), CR])?;
        self.command(b"O\r")
    }

    /// Close the CAN channel.
    pub fn close(&mut self) -> Result<(), Error> {
        self.command(b"C\r")
    }

    /// Return the wrapped serial stream.
    pub fn into_inner(self) -> IO {
        self.io
    }

    fn command(&mut self, cmd: &[u8]) -> Result<(), Error> {
        debug!("slcan command {:?}", String::from_utf8_lossy(cmd));
        self.io.write_all(cmd).context(IoSnafu)?;
        self.io.flush().context(IoSnafu)
    }

    /// Read whatever the port has available, without waiting for more.
    fn fill_buffer(&mut self) -> Result<(), Error> {
        let mut data = [0; 64];
        match self.io.read(&mut data) {
            Ok(len) => {
                self.buffer.write(&data[..len]);
                Ok(())
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(()),
            Err(e) => Err(e).context(IoSnafu),
        }
    }

    /// Next frame already in the buffer, skipping acknowledgements.
    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        loop {
            let (consumed, token) = parse_token(self.buffer.as_ref());
            self.buffer.consume(consumed);
            match token {
                SlcanToken::Frame(frame) => return Ok(Some(frame)),
                SlcanToken::NeedData => return Ok(None),
                SlcanToken::Bell => return AdapterNackSnafu.fail(),
                SlcanToken::Ack => {}
                SlcanToken::Skip => trace!("slcan skipped line"),
            }
        }
    }
}

impl<IO: Read + Write> CanBus for SlcanBus<IO> {
    type Error = Error;

    fn receive(&mut self) -> Result<Option<Frame>, Error> {
        if let Some(frame) = self.next_frame()? {
            return Ok(Some(frame));
        }
        self.fill_buffer()?;
        self.next_frame()
    }

    fn send(&mut self, frame: &Frame) -> Result<(), Error> {
        self.io.write_all(&encode(frame)).context(IoSnafu)
    }
}
