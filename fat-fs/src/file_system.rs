//! Mounted-volume layer
//!
//! [`FatFileSystem`] owns everything a mounted volume needs: the device,
//! the superblock, the in-memory FAT, the root directory and the open-file
//! table. Mounting constructs it, unmounting consumes it, so operations on
//! an unmounted volume cannot be expressed. Metadata mutations happen on
//! the in-memory copies and reach the disk at unmount; file data moves
//! through full-block bounce buffers on every call.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::cmp::min;
use core::fmt;

use log::debug;

use crate::block_dev::BlockDevice;
use crate::dentry::{FileName, RootDir, MAX_FILES};
use crate::error::{FsError, Result};
use crate::fat::{Fat, FAT_EOC};
use crate::file::{Fd, FdTable};
use crate::super_block::SuperBlock;
use crate::BLOCK_SZ;

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u32,
    pub first_block: u16,
}

/// Read-only volume report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsInfo {
    pub total_blocks: u16,
    pub fat_block_count: u8,
    pub root_block: u16,
    pub data_start_block: u16,
    pub data_block_count: u16,
    pub free_data_blocks: usize,
    pub free_dir_slots: usize,
}

impl fmt::Display for FsInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "total_blk_count={}", self.total_blocks)?;
        writeln!(f, "fat_blk_count={}", self.fat_block_count)?;
        writeln!(f, "rdir_blk={}", self.root_block)?;
        writeln!(f, "data_blk={}", self.data_start_block)?;
        writeln!(f, "data_blk_count={}", self.data_block_count)?;
        writeln!(
            f,
            "fat_free_ratio={}/{}",
            self.free_data_blocks, self.data_block_count
        )?;
        write!(f, "rdir_free_ratio={}/{}", self.free_dir_slots, MAX_FILES)
    }
}

/// A refused `unmount`. The still-mounted volume comes back with the error
/// so the caller can close handles and retry.
pub struct UnmountError {
    pub volume: FatFileSystem,
    pub error: FsError,
}

impl fmt::Debug for UnmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnmountError")
            .field("error", &self.error)
            .finish()
    }
}

impl fmt::Display for UnmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unmount failed: {}", self.error)
    }
}

/// In-memory image of one mounted volume.
pub struct FatFileSystem {
    device: Arc<dyn BlockDevice>,
    sb: SuperBlock,
    fat: Fat,
    root: RootDir,
    fds: FdTable,
}

impl FatFileSystem {
    /// Write a fresh, empty volume layout to `device` and mount it.
    pub fn format(device: Arc<dyn BlockDevice>, total_blocks: u16) -> Result<Self> {
        let sb = SuperBlock::for_volume(total_blocks)?;
        let fs = Self {
            device,
            fat: Fat::new(sb.data_block_count as usize),
            root: RootDir::empty(),
            fds: FdTable::new(),
            sb,
        };
        fs.store_metadata()?;
        debug!("format: {} blocks, {} data", total_blocks, fs.sb.data_block_count);
        Ok(fs)
    }

    /// Load a volume previously written to `device`. The open-file table
    /// starts empty on every mount.
    pub fn mount(device: Arc<dyn BlockDevice>) -> Result<Self> {
        let mut block = [0u8; BLOCK_SZ];
        device.read_block(0, &mut block)?;
        let sb = SuperBlock::decode(&block)?;

        let mut fat_raw = vec![0u8; sb.fat_block_count as usize * BLOCK_SZ];
        for i in 0..sb.fat_block_count as usize {
            device.read_block(1 + i, &mut fat_raw[i * BLOCK_SZ..(i + 1) * BLOCK_SZ])?;
        }
        let fat = Fat::decode(&fat_raw, sb.data_block_count as usize);

        device.read_block(sb.root_block as usize, &mut block)?;
        let root = RootDir::decode(&block);

        debug!(
            "mount: {} data blocks, {} free",
            sb.data_block_count,
            fat.free_count()
        );
        Ok(Self {
            device,
            sb,
            fat,
            root,
            fds: FdTable::new(),
        })
    }

    /// Flush the metadata and consume the volume. Refused while any handle
    /// is still open.
    pub fn unmount(self) -> core::result::Result<(), UnmountError> {
        if self.fds.any_open() {
            return Err(UnmountError {
                volume: self,
                error: FsError::FilesStillOpen,
            });
        }
        if let Err(error) = self.store_metadata() {
            return Err(UnmountError {
                volume: self,
                error,
            });
        }
        Ok(())
    }

    /// Superblock, FAT area, directory block, in that order.
    fn store_metadata(&self) -> Result<()> {
        let mut block = [0u8; BLOCK_SZ];
        self.sb.encode(&mut block);
        self.device.write_block(0, &block)?;

        let mut fat_raw = vec![0u8; self.sb.fat_block_count as usize * BLOCK_SZ];
        self.fat.encode(&mut fat_raw);
        for i in 0..self.sb.fat_block_count as usize {
            self.device
                .write_block(1 + i, &fat_raw[i * BLOCK_SZ..(i + 1) * BLOCK_SZ])?;
        }

        self.root.encode(&mut block);
        self.device.write_block(self.sb.root_block as usize, &block)?;
        Ok(())
    }

    /// Block counts and free ratios of the FAT and the directory.
    pub fn info(&self) -> FsInfo {
        FsInfo {
            total_blocks: self.sb.total_blocks,
            fat_block_count: self.sb.fat_block_count,
            root_block: self.sb.root_block,
            data_start_block: self.sb.data_start_block,
            data_block_count: self.sb.data_block_count,
            free_data_blocks: self.fat.free_count(),
            free_dir_slots: self.root.free_count(),
        }
    }

    /// Create an empty file. No data block is allocated until the first
    /// write reaches it.
    pub fn create(&mut self, name: &str) -> Result<()> {
        let name = FileName::new(name)?;
        let slot = self.root.create(&name)?;
        debug!("create: {} in slot {}", name, slot);
        Ok(())
    }

    /// Delete a file and release its block chain. Refused while any handle
    /// is bound to the name.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        let name = FileName::new(name)?;
        if self.fds.is_open(&name) {
            return Err(FsError::FileOpen);
        }
        let first_block = self.root.remove(&name)?;
        if first_block != FAT_EOC {
            self.fat.release(first_block);
        }
        debug!("delete: {}", name);
        Ok(())
    }

    /// Occupied directory entries in table order.
    pub fn list(&self) -> Vec<FileInfo> {
        self.root
            .iter_occupied()
            .map(|e| FileInfo {
                name: e.name_string(),
                size: e.size,
                first_block: e.first_block,
            })
            .collect()
    }

    /// Open an existing file; the returned handle starts with its cursor
    /// at offset 0.
    pub fn open(&mut self, name: &str) -> Result<Fd> {
        let name = FileName::new(name)?;
        if self.root.find(&name).is_none() {
            return Err(FsError::FileNotFound);
        }
        self.fds.open(name)
    }

    pub fn close(&mut self, fd: Fd) -> Result<()> {
        self.fds.close(fd)
    }

    /// Current size of the file bound to `fd`.
    pub fn stat(&self, fd: Fd) -> Result<u32> {
        let name = self.fds.get(fd)?.name;
        let slot = self.root.find(&name).ok_or(FsError::FileNotFound)?;
        Ok(self.root.entry(slot).size)
    }

    /// Move the cursor. The target may not pass the current end of file.
    pub fn seek(&mut self, fd: Fd, offset: usize) -> Result<()> {
        let size = self.stat(fd)? as usize;
        if offset > size {
            return Err(FsError::OffsetBeyondEnd);
        }
        self.fds.get_mut(fd)?.offset = offset;
        Ok(())
    }

    /// Copy bytes at the cursor into `buf`, bounded by the file size, and
    /// advance the cursor by the returned count. A request at or past the
    /// end of file returns `Ok(0)`.
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        let file = self.fds.get(fd)?;
        let name = file.name;
        let offset = file.offset;
        let slot = self.root.find(&name).ok_or(FsError::FileNotFound)?;
        let entry = self.root.entry(slot);
        let (first_block, size) = (entry.first_block, entry.size as usize);

        let end = min(size, offset + buf.len());
        if offset >= end {
            return Ok(0);
        }

        let mut cur = self.fat.walk(first_block, offset);
        let mut pos = offset;
        let mut read = 0usize;
        let mut bounce = [0u8; BLOCK_SZ];
        while pos < end && cur != FAT_EOC {
            let in_block = pos % BLOCK_SZ;
            let n = min(BLOCK_SZ - in_block, end - pos);
            self.read_data_block(cur, &mut bounce)?;
            buf[read..read + n].copy_from_slice(&bounce[in_block..in_block + n]);
            read += n;
            pos += n;
            if pos < end {
                cur = self.fat.next(cur);
            }
        }

        self.fds.get_mut(fd)?.offset = pos;
        Ok(read)
    }

    /// Splice `buf` into the file at the cursor, growing the block chain on
    /// demand. When no free block is left the call stops early and returns
    /// the short count; callers must compare it against `buf.len()`. The
    /// recorded size grows past the last byte written and never shrinks
    /// here; the cursor advances by the returned count, symmetric with
    /// [`read`](Self::read).
    pub fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize> {
        let file = self.fds.get(fd)?;
        let name = file.name;
        let offset = file.offset;
        let slot = self.root.find(&name).ok_or(FsError::FileNotFound)?;

        // Seek to the block holding the cursor, keeping the chain tail at
        // hand so grown blocks can be linked on.
        let mut cur = self.root.entry(slot).first_block;
        let mut tail: Option<u16> = None;
        let mut hops = offset / BLOCK_SZ;
        while hops > 0 && cur != FAT_EOC {
            tail = Some(cur);
            cur = self.fat.next(cur);
            hops -= 1;
        }

        let mut pos = offset;
        let mut written = 0usize;
        let mut bounce = [0u8; BLOCK_SZ];
        while written < buf.len() {
            if cur == FAT_EOC {
                cur = match self.fat.extend(tail) {
                    Ok(block) => block,
                    Err(FsError::AllocationExhausted) => break,
                    Err(e) => return Err(e),
                };
                if tail.is_none() {
                    self.root.entry_mut(slot).first_block = cur;
                }
            }
            let in_block = pos % BLOCK_SZ;
            let n = min(BLOCK_SZ - in_block, buf.len() - written);
            // Load-modify-store even for a whole-block overwrite; the
            // device contract is whole blocks only.
            self.read_data_block(cur, &mut bounce)?;
            bounce[in_block..in_block + n].copy_from_slice(&buf[written..written + n]);
            self.write_data_block(cur, &bounce)?;
            written += n;
            pos += n;
            if written < buf.len() {
                tail = Some(cur);
                cur = self.fat.next(cur);
            }
        }

        let entry = self.root.entry_mut(slot);
        if pos as u32 > entry.size {
            entry.size = pos as u32;
        }
        self.fds.get_mut(fd)?.offset = pos;
        if written < buf.len() {
            debug!("write: short, {} of {} bytes", written, buf.len());
        }
        Ok(written)
    }

    fn read_data_block(&self, index: u16, buf: &mut [u8; BLOCK_SZ]) -> Result<()> {
        self.device.read_block(self.data_block_id(index), buf)?;
        Ok(())
    }

    fn write_data_block(&self, index: u16, buf: &[u8; BLOCK_SZ]) -> Result<()> {
        self.device.write_block(self.data_block_id(index), buf)?;
        Ok(())
    }

    fn data_block_id(&self, index: u16) -> usize {
        debug_assert!(index < self.sb.data_block_count);
        self.sb.data_start_block as usize + index as usize
    }
}
