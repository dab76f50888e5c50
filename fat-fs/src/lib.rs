//! fat-fs
//!
//! fat-fs is a FAT-style flat file system over a fixed-block-size virtual
//! disk. A volume is a superblock, a file allocation table describing block
//! chains, and a single-block root directory of file entries; open files are
//! tracked in a fixed-capacity handle table with independent byte cursors.
//!
//! The crate is divided into layers from bottom to top:
//!
//! - Disk block device interface layer
//! - Disk layout layer (superblock, FAT entries, directory records)
//! - Allocation layer (FAT chain walking and first-fit growth)
//! - Mounted-volume layer (directory operations, open-file handles and the
//!   byte-range I/O engine)
//!
//! All metadata is loaded wholesale at mount and written back at unmount;
//! file data moves through full-block bounce buffers because the device
//! contract is whole blocks only.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod block_dev;
pub mod dentry;
pub mod error;
pub mod fat;
pub mod file;
pub mod file_system;
pub mod super_block;

/// Block size in bytes
pub const BLOCK_SZ: usize = 4096;

pub use block_dev::{BlockDevice, DeviceError, MemBlockDevice};
pub use dentry::{FileName, MAX_FILES, NAME_LENGTH_LIMIT};
pub use error::{FsError, Result};
pub use fat::FAT_EOC;
pub use file::{Fd, MAX_OPEN};
pub use file_system::{FatFileSystem, FileInfo, FsInfo, UnmountError};
