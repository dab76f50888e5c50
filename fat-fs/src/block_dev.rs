//! Disk block device interface layer

use alloc::vec;
use alloc::vec::Vec;
use core::any::Any;
use core::fmt;

use spin::Mutex;

use crate::BLOCK_SZ;

/// Failure reported by the backing store. The file system never retries a
/// failed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceError;

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block device error")
    }
}

/// API a backing store provides to the file system. Transfers are whole
/// blocks only; `buf` must be exactly `BLOCK_SZ` bytes.
pub trait BlockDevice: Send + Sync + Any {
    /// read block data into `buf`
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DeviceError>;

    /// write `buf` back to the block
    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DeviceError>;
}

/// Memory-backed block device, usable as a virtual disk in tests and tools.
pub struct MemBlockDevice {
    blocks: Mutex<Vec<u8>>,
}

impl MemBlockDevice {
    /// A zero-filled disk of `total_blocks` blocks.
    pub fn new(total_blocks: usize) -> Self {
        Self {
            blocks: Mutex::new(vec![0; total_blocks * BLOCK_SZ]),
        }
    }

    /// Copy of the raw disk image.
    pub fn snapshot(&self) -> Vec<u8> {
        self.blocks.lock().clone()
    }
}

impl BlockDevice for MemBlockDevice {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DeviceError> {
        let blocks = self.blocks.lock();
        let start = block_id * BLOCK_SZ;
        if buf.len() != BLOCK_SZ || start + BLOCK_SZ > blocks.len() {
            return Err(DeviceError);
        }
        buf.copy_from_slice(&blocks[start..start + BLOCK_SZ]);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DeviceError> {
        let mut blocks = self.blocks.lock();
        let start = block_id * BLOCK_SZ;
        if buf.len() != BLOCK_SZ || start + BLOCK_SZ > blocks.len() {
            return Err(DeviceError);
        }
        blocks[start..start + BLOCK_SZ].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_block_round_trip() {
        let dev = MemBlockDevice::new(4);
        let data = [0xA5u8; BLOCK_SZ];
        dev.write_block(2, &data).unwrap();
        let mut back = [0u8; BLOCK_SZ];
        dev.read_block(2, &mut back).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn out_of_range_block_fails() {
        let dev = MemBlockDevice::new(2);
        let mut buf = [0u8; BLOCK_SZ];
        assert_eq!(dev.read_block(2, &mut buf), Err(DeviceError));
        assert_eq!(dev.write_block(5, &buf), Err(DeviceError));
    }

    #[test]
    fn partial_buffer_rejected() {
        let dev = MemBlockDevice::new(2);
        let mut short = [0u8; 16];
        assert_eq!(dev.read_block(0, &mut short), Err(DeviceError));
    }
}
