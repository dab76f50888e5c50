//! Error taxonomy shared by every volume operation

use core::fmt;

use crate::block_dev::DeviceError;

pub type Result<T> = core::result::Result<T, FsError>;

/// Everything a volume operation can report. Validation failures surface at
/// the operation boundary; nothing is retried or rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// The underlying device failed a transfer.
    Device(DeviceError),
    /// Block 0 does not carry a valid superblock.
    InvalidVolume,
    /// Empty, too long, or otherwise malformed file name.
    InvalidName,
    NameExists,
    DirectoryFull,
    FileNotFound,
    /// Deletion refused while a handle is bound to the name.
    FileOpen,
    /// Unmount refused while handles remain open.
    FilesStillOpen,
    TooManyOpen,
    InvalidHandle,
    /// Seek target past the current end of file.
    OffsetBeyondEnd,
    /// No free block left for chain growth.
    AllocationExhausted,
}

impl From<DeviceError> for FsError {
    fn from(e: DeviceError) -> Self {
        FsError::Device(e)
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::Device(e) => write!(f, "{}", e),
            FsError::InvalidVolume => write!(f, "invalid volume"),
            FsError::InvalidName => write!(f, "invalid file name"),
            FsError::NameExists => write!(f, "file name already exists"),
            FsError::DirectoryFull => write!(f, "root directory is full"),
            FsError::FileNotFound => write!(f, "file not found"),
            FsError::FileOpen => write!(f, "file is open"),
            FsError::FilesStillOpen => write!(f, "files are still open"),
            FsError::TooManyOpen => write!(f, "too many open files"),
            FsError::InvalidHandle => write!(f, "invalid file handle"),
            FsError::OffsetBeyondEnd => write!(f, "offset beyond end of file"),
            FsError::AllocationExhausted => write!(f, "no free data block"),
        }
    }
}
