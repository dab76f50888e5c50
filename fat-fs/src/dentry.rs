//! Disk layout layer: file names and the flat root directory
//!
//! The whole directory is one block of fixed-size records. A record with a
//! NUL first name byte is an unused slot. Name uniqueness and slot
//! occupancy are enforced here, not at call sites.

use alloc::string::String;
use core::fmt;

use crate::error::{FsError, Result};
use crate::fat::FAT_EOC;
use crate::BLOCK_SZ;

/// Size of one on-disk directory record.
pub const DIRENT_SZ: usize = 32;
/// Slots in the root directory, one block's worth of records.
pub const MAX_FILES: usize = BLOCK_SZ / DIRENT_SZ;
/// Name buffer bytes, terminating NUL included.
pub const FILENAME_LEN: usize = 16;
/// Longest usable name; one byte stays reserved for the NUL.
pub const NAME_LENGTH_LIMIT: usize = FILENAME_LEN - 1;

/// A validated file name: non-empty, at most `NAME_LENGTH_LIMIT` bytes, no
/// interior NUL. The only way to build one is through the checks.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FileName {
    bytes: [u8; FILENAME_LEN],
}

impl FileName {
    pub fn new(name: &str) -> Result<Self> {
        let raw = name.as_bytes();
        if raw.is_empty() || raw.len() > NAME_LENGTH_LIMIT || raw.contains(&0) {
            return Err(FsError::InvalidName);
        }
        let mut bytes = [0u8; FILENAME_LEN];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self { bytes })
    }

    pub fn as_str(&self) -> &str {
        let len = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FILENAME_LEN);
        core::str::from_utf8(&self.bytes[..len]).unwrap_or("")
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

/// One root-directory record: name, byte size and the first FAT index
/// (`FAT_EOC` for a zero-length file).
#[derive(Clone, Copy)]
pub struct DirEntry {
    name: [u8; FILENAME_LEN],
    pub size: u32,
    pub first_block: u16,
}

impl DirEntry {
    fn vacant() -> Self {
        Self {
            name: [0; FILENAME_LEN],
            size: 0,
            first_block: FAT_EOC,
        }
    }

    fn occupied(name: &FileName) -> Self {
        Self {
            name: name.bytes,
            size: 0,
            first_block: FAT_EOC,
        }
    }

    pub fn is_vacant(&self) -> bool {
        self.name[0] == 0
    }

    fn name_matches(&self, name: &FileName) -> bool {
        !self.is_vacant() && self.name == name.bytes
    }

    /// Owned copy of the name for listings.
    pub fn name_string(&self) -> String {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FILENAME_LEN);
        String::from_utf8_lossy(&self.name[..len]).into_owned()
    }

    fn decode(buf: &[u8]) -> Self {
        let mut name = [0u8; FILENAME_LEN];
        name.copy_from_slice(&buf[0..FILENAME_LEN]);
        Self {
            name,
            size: u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]),
            first_block: u16::from_le_bytes([buf[20], buf[21]]),
        }
    }

    fn encode(&self, buf: &mut [u8]) {
        buf.fill(0);
        buf[0..FILENAME_LEN].copy_from_slice(&self.name);
        buf[16..20].copy_from_slice(&self.size.to_le_bytes());
        buf[20..22].copy_from_slice(&self.first_block.to_le_bytes());
    }
}

/// The root directory table.
pub struct RootDir {
    entries: [DirEntry; MAX_FILES],
}

impl RootDir {
    pub fn empty() -> Self {
        Self {
            entries: [DirEntry::vacant(); MAX_FILES],
        }
    }

    /// Parse the directory block.
    pub fn decode(buf: &[u8]) -> Self {
        let mut dir = Self::empty();
        for (i, entry) in dir.entries.iter_mut().enumerate() {
            *entry = DirEntry::decode(&buf[i * DIRENT_SZ..(i + 1) * DIRENT_SZ]);
        }
        dir
    }

    /// Serialize the whole table back into one block.
    pub fn encode(&self, buf: &mut [u8]) {
        for (i, entry) in self.entries.iter().enumerate() {
            entry.encode(&mut buf[i * DIRENT_SZ..(i + 1) * DIRENT_SZ]);
        }
    }

    /// Slot index of the entry bound to `name`.
    pub fn find(&self, name: &FileName) -> Option<usize> {
        self.entries.iter().position(|e| e.name_matches(name))
    }

    pub fn entry(&self, slot: usize) -> &DirEntry {
        &self.entries[slot]
    }

    pub fn entry_mut(&mut self, slot: usize) -> &mut DirEntry {
        &mut self.entries[slot]
    }

    /// Claim the lowest vacant slot for `name` with size 0 and no chain.
    pub fn create(&mut self, name: &FileName) -> Result<usize> {
        if self.find(name).is_some() {
            return Err(FsError::NameExists);
        }
        let slot = self
            .entries
            .iter()
            .position(|e| e.is_vacant())
            .ok_or(FsError::DirectoryFull)?;
        self.entries[slot] = DirEntry::occupied(name);
        Ok(slot)
    }

    /// Clear the slot bound to `name`, handing back its first block so the
    /// caller can release the chain.
    pub fn remove(&mut self, name: &FileName) -> Result<u16> {
        let slot = self.find(name).ok_or(FsError::FileNotFound)?;
        let first_block = self.entries[slot].first_block;
        self.entries[slot] = DirEntry::vacant();
        Ok(first_block)
    }

    /// occupied entries in table order
    pub fn iter_occupied(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter().filter(|e| !e.is_vacant())
    }

    /// unused slots left
    pub fn free_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_vacant()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        assert!(FileName::new("a").is_ok());
        assert!(FileName::new("fifteen-bytes-x").is_ok());
        assert_eq!(FileName::new(""), Err(FsError::InvalidName));
        assert_eq!(FileName::new("sixteen-bytes-xy"), Err(FsError::InvalidName));
        assert_eq!(FileName::new("nul\0name"), Err(FsError::InvalidName));
    }

    #[test]
    fn name_round_trips_through_str() {
        let name = FileName::new("report.txt").unwrap();
        assert_eq!(name.as_str(), "report.txt");
    }

    #[test]
    fn entry_encode_decode_round_trip() {
        let name = FileName::new("data.bin").unwrap();
        let mut entry = DirEntry::occupied(&name);
        entry.size = 0x01020304;
        entry.first_block = 7;
        let mut buf = [0u8; DIRENT_SZ];
        entry.encode(&mut buf);
        let back = DirEntry::decode(&buf);
        assert!(back.name_matches(&name));
        assert_eq!(back.size, 0x01020304);
        assert_eq!(back.first_block, 7);
    }

    #[test]
    fn create_claims_lowest_slot_and_rejects_duplicates() {
        let mut dir = RootDir::empty();
        let a = FileName::new("a").unwrap();
        let b = FileName::new("b").unwrap();
        assert_eq!(dir.create(&a).unwrap(), 0);
        assert_eq!(dir.create(&b).unwrap(), 1);
        assert_eq!(dir.create(&a), Err(FsError::NameExists));
        dir.remove(&a).unwrap();
        // freed slot is reused first
        assert_eq!(dir.create(&a).unwrap(), 0);
    }

    #[test]
    fn full_directory_is_reported() {
        let mut dir = RootDir::empty();
        for i in 0..MAX_FILES {
            let name = FileName::new(&alloc::format!("f{}", i)).unwrap();
            dir.create(&name).unwrap();
        }
        assert_eq!(dir.free_count(), 0);
        let extra = FileName::new("overflow").unwrap();
        assert_eq!(dir.create(&extra), Err(FsError::DirectoryFull));
    }

    #[test]
    fn table_encode_decode_round_trip() {
        let mut dir = RootDir::empty();
        let name = FileName::new("keep").unwrap();
        let slot = dir.create(&name).unwrap();
        dir.entry_mut(slot).size = 123;
        dir.entry_mut(slot).first_block = 4;
        let mut buf = [0u8; BLOCK_SZ];
        dir.encode(&mut buf);
        let back = RootDir::decode(&buf);
        assert_eq!(back.find(&name), Some(slot));
        assert_eq!(back.entry(slot).size, 123);
        assert_eq!(back.entry(slot).first_block, 4);
        assert_eq!(back.free_count(), MAX_FILES - 1);
    }
}
