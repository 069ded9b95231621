/// The capacity of a socket buffer, in octets.
pub const CAPACITY: usize = 1500;

/// A fixed-capacity byte ring buffer.
///
/// Bytes enter at the back and leave at the front. Reading can be split
/// into a non-destructive [`peek`] and a later [`skip`], which is how
/// unacknowledged transmit data stays available for retransmission until
/// the acknowledgment arrives.
///
/// [`peek`]: #method.peek
/// [`skip`]: #method.skip
pub struct Fifo {
    data: [u8; CAPACITY],
    read_at: usize,
    length: usize,
}

impl Fifo {
    pub const fn new() -> Fifo {
        Fifo {
            data: [0; CAPACITY],
            read_at: 0,
            length: 0,
        }
    }

    /// The number of buffered bytes.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The number of bytes that can still be enqueued.
    pub fn window(&self) -> usize {
        CAPACITY - self.length
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.read_at = 0;
        self.length = 0;
    }

    fn wrap(&self, offset: usize) -> usize {
        debug_assert!(offset < 2 * CAPACITY);
        if offset >= CAPACITY {
            offset - CAPACITY
        } else {
            offset
        }
    }

    /// Append bytes at the back of the buffer.
    ///
    /// Returns the number of bytes actually enqueued, which is less than
    /// `data.len()` when the window is smaller than the input.
    pub fn enqueue(&mut self, data: &[u8]) -> usize {
        let count = data.len().min(self.window());
        let mut write_at = self.wrap(self.read_at + self.length);
        for &byte in &data[..count] {
            self.data[write_at] = byte;
            write_at = self.wrap(write_at + 1);
        }
        self.length += count;
        count
    }

    /// Copy bytes from the front of the buffer without consuming them.
    ///
    /// The read starts `offset` bytes past the front. Returns the number
    /// of bytes copied into `data`.
    pub fn peek(&self, offset: usize, data: &mut [u8]) -> usize {
        if offset >= self.length {
            return 0;
        }
        let count = data.len().min(self.length - offset);
        let mut read_at = self.wrap(self.read_at + offset);
        for byte in &mut data[..count] {
            *byte = self.data[read_at];
            read_at = self.wrap(read_at + 1);
        }
        count
    }

    /// Remove bytes from the front of the buffer and copy them out.
    ///
    /// Returns the number of bytes dequeued.
    pub fn dequeue(&mut self, data: &mut [u8]) -> usize {
        let count = self.peek(0, data);
        self.skip(count)
    }

    /// Remove bytes from the front of the buffer without copying them.
    ///
    /// Returns the number of bytes removed, which is less than `count`
    /// when the buffer holds fewer.
    pub fn skip(&mut self, count: usize) -> usize {
        let count = count.min(self.length);
        self.read_at = self.wrap(self.read_at + count);
        self.length -= count;
        count
    }
}

impl Default for Fifo {
    fn default() -> Fifo {
        Fifo::new()
    }
}
