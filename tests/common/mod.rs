#![allow(dead_code)]

pub mod sync;

use std::cell::RefCell;
use std::cmp::min;
use std::collections::{HashMap, VecDeque};
use std::io::{Error, ErrorKind};
use std::rc::Rc;

use canopen_simple::{CanBus, Emergency, Frame};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn frame(cob_id: u16, data: &[u8]) -> Frame {
    Frame::new(cob_id, data).unwrap()
}

/// A clock advancing `step` ms every time it is read.
pub fn stepping_clock(start: u32, step: u32) -> impl FnMut() -> u32 {
    let mut now = start;
    move || {
        let t = now;
        now = now.wrapping_add(step);
        t
    }
}

/// An emergency sink recording everything it gets.
pub fn emergency_log() -> (Rc<RefCell<Vec<Emergency>>>, impl FnMut(&Emergency)) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink_log = Rc::clone(&log);
    (log, move |emcy: &Emergency| sink_log.borrow_mut().push(*emcy))
}

#[derive(Debug, PartialEq)]
pub enum BusError {
    Receive,
    Send,
}

/// Single threaded CAN bus. Inbound frames are queued up front, or produced
/// by a simulated node reacting to the frames the master sends.
#[derive(Default)]
pub struct SimBus {
    /// `None` entries are polls that find no frame.
    pub rx: VecDeque<Option<Frame>>,
    pub tx: Vec<Frame>,
    pub node: Option<SimNode>,
    pub receive_calls: usize,
    do_read_error: bool,
    do_write_error: bool,
}

impl SimBus {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_node(node: SimNode) -> Self {
        Self {
            node: Some(node),
            ..Default::default()
        }
    }

    pub fn push(&mut self, cob_id: u16, data: &[u8]) {
        self.rx.push_back(Some(frame(cob_id, data)));
    }

    pub fn push_idle(&mut self, polls: usize) {
        for _ in 0..polls {
            self.rx.push_back(None);
        }
    }

    pub fn trigger_read_error(&mut self) {
        self.do_read_error = true;
    }

    pub fn trigger_write_error(&mut self) {
        self.do_write_error = true;
    }
}

impl CanBus for SimBus {
    type Error = BusError;

    fn receive(&mut self) -> Result<Option<Frame>, BusError> {
        self.receive_calls += 1;
        if self.do_read_error {
            self.do_read_error = false;
            return Err(BusError::Receive);
        }
        Ok(self.rx.pop_front().flatten())
    }

    fn send(&mut self, frame: &Frame) -> Result<(), BusError> {
        if self.do_write_error {
            self.do_write_error = false;
            return Err(BusError::Send);
        }
        self.tx.push(frame.clone());
        if let Some(node) = self.node.as_mut() {
            for response in node.handle(frame) {
                self.rx.push_back(Some(response));
            }
        }
        Ok(())
    }
}

const SDO_ABORT_NO_OBJECT: u32 = 0x0602_0000;
const SDO_ABORT_READ_ONLY: u32 = 0x0601_0002;

/// A CANopen node with a small parameter table, answering NMT, expedited
/// SDO requests, and SYNC with its transmit PDO.
pub struct SimNode {
    pub id: u8,
    /// (index, subindex) -> (value, size in bytes, writable)
    pub parameters: HashMap<(u16, u8), (u32, u8, bool)>,
    pub state: u8,
    pub rpdo: Vec<u8>,
    pub emcy_on_sync: Option<[u8; 8]>,
}

impl SimNode {
    pub fn new(id: u8) -> Self {
        let mut parameters = HashMap::new();
        parameters.insert((0x1000, 0), (0x0002_0192, 4, false));
        parameters.insert((0x1018, 1), (0x0000_0123, 4, false));
        parameters.insert((0x1018, 2), (0x0000_4567, 4, false));
        parameters.insert((0x1017, 0), (0, 2, true));
        parameters.insert((0x6060, 0), (0, 1, true));
        parameters.insert((0x6064, 0), (0xFFFF_FF9C, 4, true));
        Self {
            id,
            parameters,
            state: 0x7f,
            rpdo: vec![0; 2],
            emcy_on_sync: None,
        }
    }

    pub fn handle(&mut self, frame: &Frame) -> Vec<Frame> {
        let id = u16::from(self.id);
        let data = frame.data();
        match frame.cob_id() {
            0x000 if data.len() == 2 && (data[1] == 0 || data[1] == self.id) => {
                self.nmt(data[0], id)
            }
            0x080 => {
                let mut out = Vec::new();
                if let Some(emcy) = self.emcy_on_sync.take() {
                    out.push(Frame::new(0x080 + id, &emcy).unwrap());
                }
                if self.state == 0x05 {
                    out.push(Frame::new(0x180 + id, &self.rpdo).unwrap());
                }
                out
            }
            cob_id if cob_id == 0x200 + id && self.state == 0x05 => {
                self.rpdo = data.to_vec();
                Vec::new()
            }
            cob_id if cob_id == 0x600 + id && data.len() == 8 => {
                vec![Frame::new(0x580 + id, &self.sdo(data)).unwrap()]
            }
            _ => Vec::new(),
        }
    }

    fn nmt(&mut self, command: u8, id: u16) -> Vec<Frame> {
        match command {
            0x01 => self.state = 0x05,
            0x02 => self.state = 0x04,
            0x80 => self.state = 0x7f,
            0x81 | 0x82 => {
                self.state = 0x7f;
                return vec![Frame::new(0x700 + id, &[0]).unwrap()];
            }
            _ => {}
        }
        Vec::new()
    }

    fn sdo(&mut self, request: &[u8]) -> [u8; 8] {
        let index = u16::from_le_bytes([request[1], request[2]]);
        let subindex = request[3];
        let mut response = [0; 8];
        response[1..4].copy_from_slice(&request[1..4]);
        let entry = self.parameters.get_mut(&(index, subindex));
        let abort = |response: &mut [u8; 8], code: u32| {
            response[0] = 0x80;
            response[4..].copy_from_slice(&code.to_le_bytes());
        };
        match (request[0] & 0xe0, entry) {
            (0x40, Some(&mut (value, size, _))) => {
                response[0] = 0x43 | ((4 - size) << 2);
                response[4..].copy_from_slice(&value.to_le_bytes());
            }
            (0x20, Some((value, size, true))) => {
                let unused = usize::from((request[0] >> 2) & 0x03);
                let mut bytes = [0; 4];
                bytes[..4 - unused].copy_from_slice(&request[4..8 - unused]);
                *value = u32::from_le_bytes(bytes);
                *size = (4 - unused) as u8;
                response[0] = 0x60;
            }
            (0x20, Some(_)) => abort(&mut response, SDO_ABORT_READ_ONLY),
            _ => abort(&mut response, SDO_ABORT_NO_OBJECT),
        }
        response
    }
}

/// Byte stream standing in for a serial port.
pub struct SerialInterface {
    pub rx: Vec<u8>,
    rx_pos: usize,
    pub tx: Vec<u8>,
    do_read_error: bool,
    do_write_error: bool,
}

impl SerialInterface {
    pub fn new(rx: &[u8]) -> Self {
        Self {
            rx: rx.to_vec(),
            tx: Vec::new(),
            rx_pos: 0,
            do_read_error: false,
            do_write_error: false,
        }
    }

    pub fn trigger_write_error(&mut self) {
        self.do_write_error = true;
    }

    pub fn trigger_read_error(&mut self) {
        self.do_read_error = true;
    }
}

impl std::io::Read for SerialInterface {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.do_read_error {
            self.do_read_error = false;
            return Err(Error::new(ErrorKind::PermissionDenied, "read error"));
        }
        if self.rx_pos == self.rx.len() {
            return Err(Error::new(ErrorKind::TimedOut, "no data"));
        }
        // hand out the data in small pieces, like a serial port does
        let end = min(self.rx_pos + min(buf.len(), 5), self.rx.len());
        let len = end - self.rx_pos;
        buf[..len].copy_from_slice(&self.rx[self.rx_pos..end]);
        self.rx_pos = end;
        Ok(len)
    }
}

impl std::io::Write for SerialInterface {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.do_write_error {
            self.do_write_error = false;
            Err(Error::new(ErrorKind::PermissionDenied, "write error"))
        } else {
            self.tx.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
