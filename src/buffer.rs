/// Receive buffer for the serial line adapter.
///
/// Holds bytes read from the serial port until a complete line has arrived.
#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    read_pos: usize,
}

/// A line longer than this is garbage, a frame line is at most 22 bytes.
const MAX_LEN: usize = 256;

impl Buffer {
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(64),
            read_pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len() - self.read_pos
    }

    pub fn consume(&mut self, len: usize) {
        assert!(len <= self.len());
        self.read_pos += len;
        if self.read_pos == self.data.len() {
            self.clear();
        }
    }

    /// Append received bytes. Drops everything buffered if the buffer
    /// would grow past `MAX_LEN` without a line being consumed.
    pub fn write(&mut self, bytes: &[u8]) {
        if self.read_pos > 0 {
            self.data.drain(..self.read_pos);
            self.read_pos = 0;
        }
        if self.data.len() + bytes.len() > MAX_LEN {
            self.clear();
        }
        self.data.extend_from_slice(bytes);
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.read_pos = 0;
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        &self.data[self.read_pos..]
    }
}
