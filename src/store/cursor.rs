//! Checked little-endian reader over a column buffer

use crate::error::{SnapshotError, SnapshotResult};

/// Forward-only cursor that bounds-checks every read
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Take the next `len` bytes
    pub fn take(&mut self, len: usize) -> SnapshotResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(SnapshotError::Truncated {
                position: self.position,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    #[inline]
    fn read_array<const N: usize>(&mut self) -> SnapshotResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> SnapshotResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i32(&mut self) -> SnapshotResult<i32> {
        self.read_array().map(i32::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> SnapshotResult<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub fn read_i64(&mut self) -> SnapshotResult<i64> {
        self.read_array().map(i64::from_le_bytes)
    }

    pub fn read_u64(&mut self) -> SnapshotResult<u64> {
        self.read_array().map(u64::from_le_bytes)
    }
}
