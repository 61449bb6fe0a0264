//! Untyped byte storage backing geometry attributes.

use std::io::{self, Write};
use std::sync::atomic::{AtomicI64, Ordering};

static NEXT_BUFFER_ID: AtomicI64 = AtomicI64::new(1);

/// Snapshot of a buffer's identity and revision.
///
/// Consumers that hold raw offsets into a buffer capture a descriptor at
/// attach time; a later mismatch means the bytes were overwritten since.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataBufferDescriptor {
    pub buffer_id: i64,
    pub buffer_update_count: i64,
}

#[derive(Debug, Clone)]
pub struct DataBuffer {
    data: Vec<u8>,
    descriptor: DataBufferDescriptor,
}

impl DataBuffer {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            descriptor: DataBufferDescriptor {
                buffer_id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
                buffer_update_count: 0,
            },
        }
    }

    pub fn with_data(data: &[u8]) -> Self {
        let mut buffer = Self::new();
        buffer.update(data, None);
        buffer
    }

    /// Writes `data` at `offset` (default 0), growing the buffer if needed.
    pub fn update(&mut self, data: &[u8], offset: Option<usize>) {
        let offset = offset.unwrap_or(0);
        let end = offset + data.len();

        if end > self.data.len() {
            self.data.resize(end, 0);
        }

        self.data[offset..end].copy_from_slice(data);
        self.descriptor.buffer_update_count += 1;
    }

    pub fn resize(&mut self, new_size: usize) {
        self.data.resize(new_size, 0);
    }

    pub fn write_data_to_stream<W: Write>(&self, stream: &mut W) -> io::Result<()> {
        stream.write_all(&self.data)
    }

    /// Copies `out_data.len()` bytes starting at `byte_pos` into `out_data`.
    /// Returns false when the range falls past the end of the buffer.
    pub fn read(&self, byte_pos: usize, out_data: &mut [u8]) -> bool {
        let end = match byte_pos.checked_add(out_data.len()) {
            Some(end) => end,
            None => return false,
        };
        if end > self.data.len() {
            return false;
        }
        out_data.copy_from_slice(&self.data[byte_pos..end]);
        true
    }

    /// Overwrites bytes at `byte_pos`. Returns false when the range falls
    /// past the end of the buffer; the buffer is not grown.
    pub fn write(&mut self, byte_pos: usize, in_data: &[u8]) -> bool {
        let end = match byte_pos.checked_add(in_data.len()) {
            Some(end) => end,
            None => return false,
        };
        if end > self.data.len() {
            return false;
        }
        self.data[byte_pos..end].copy_from_slice(in_data);
        self.descriptor.buffer_update_count += 1;
        true
    }

    pub fn update_count(&self) -> i64 {
        self.descriptor.buffer_update_count
    }

    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn buffer_id(&self) -> i64 {
        self.descriptor.buffer_id
    }

    pub fn descriptor(&self) -> DataBufferDescriptor {
        self.descriptor
    }
}

impl Default for DataBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_grows_and_counts() {
        let mut buffer = DataBuffer::new();
        assert_eq!(buffer.update_count(), 0);
        buffer.update(&[1, 2, 3, 4], None);
        assert_eq!(buffer.data_size(), 4);
        assert_eq!(buffer.update_count(), 1);
        buffer.update(&[9], Some(2));
        assert_eq!(buffer.data(), &[1, 2, 9, 4]);
        assert_eq!(buffer.update_count(), 2);
    }

    #[test]
    fn test_write_increments_update_count() {
        let mut buffer = DataBuffer::new();
        buffer.resize(8);
        let before = buffer.update_count();
        assert!(buffer.write(4, &[7, 7]));
        assert_eq!(buffer.update_count(), before + 1);
    }

    #[test]
    fn test_read_write_out_of_range() {
        let mut buffer = DataBuffer::new();
        buffer.resize(4);
        let mut out = [0u8; 3];
        assert!(!buffer.read(2, &mut out));
        assert!(!buffer.write(3, &[0, 0]));
        // A failed write must not bump the revision.
        assert_eq!(buffer.update_count(), 0);
    }

    #[test]
    fn test_distinct_buffers_have_distinct_ids() {
        let a = DataBuffer::new();
        let b = DataBuffer::new();
        assert_ne!(a.buffer_id(), b.buffer_id());
        assert_ne!(a.descriptor(), b.descriptor());
    }
}
