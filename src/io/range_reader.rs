use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use bytes::Bytes;

use crate::error::IoError;

/// Trait for reading byte ranges from a grid resource.
///
/// Grid readers never load whole files: headers are read once and samples
/// are fetched on demand at absolute offsets. Implementations must be
/// thread-safe so an opened grid can move to another worker.
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Returns an error if the range is out of bounds or if the read fails.
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Get the total size of the resource in bytes.
    fn size(&self) -> u64;

    /// Get a unique identifier for this resource (for logging and registries).
    ///
    /// For files this is the resolved path.
    fn identifier(&self) -> &str;

    /// Whether the underlying resource changed since it was opened.
    fn has_changed(&self) -> bool {
        false
    }
}

fn check_range(offset: u64, len: usize, size: u64) -> Result<(), IoError> {
    if offset.checked_add(len as u64).map_or(true, |end| end > size) {
        return Err(IoError::RangeOutOfBounds {
            offset,
            requested: len as u64,
            size,
        });
    }
    Ok(())
}

// =============================================================================
// FileRangeReader
// =============================================================================

/// Range reader over a local file.
///
/// Reads are positioned (seek + read) under a mutex, so a single handle can
/// serve every grid of a multi-grid resource.
pub struct FileRangeReader {
    file: Mutex<File>,
    path: PathBuf,
    identifier: String,
    size: u64,
    modified: Option<SystemTime>,
}

impl FileRangeReader {
    /// Open `path` for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let identifier = path.display().to_string();
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(identifier.clone()),
            _ => IoError::Open {
                path: identifier.clone(),
                message: e.to_string(),
            },
        })?;
        let metadata = file.metadata().map_err(|e| IoError::Open {
            path: identifier.clone(),
            message: e.to_string(),
        })?;

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            identifier,
            size: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }

    /// Path the reader was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_error(&self, message: impl ToString) -> IoError {
        IoError::Read {
            resource: self.identifier.clone(),
            message: message.to_string(),
        }
    }
}

impl RangeReader for FileRangeReader {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.size)?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let mut file = self
            .file
            .lock()
            .map_err(|_| self.read_error("file handle poisoned"))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| self.read_error(e))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).map_err(|e| self.read_error(e))?;
        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn has_changed(&self) -> bool {
        match std::fs::metadata(&self.path) {
            Ok(metadata) => {
                metadata.len() != self.size || metadata.modified().ok() != self.modified
            }
            Err(_) => true,
        }
    }
}

// =============================================================================
// MemoryRangeReader
// =============================================================================

/// Range reader over an in-memory buffer.
#[derive(Clone)]
pub struct MemoryRangeReader {
    data: Bytes,
    identifier: String,
}

impl MemoryRangeReader {
    pub fn new(data: impl Into<Bytes>, identifier: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            identifier: identifier.into(),
        }
    }
}

impl RangeReader for MemoryRangeReader {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.data.len() as u64)?;
        let start = offset as usize;
        Ok(self.data.slice(start..start + len))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// Endian Helper Functions
// =============================================================================
//
// Grid formats fix their byte order (NTv1 and GTX are big-endian, CTable2 is
// little-endian) or declare it in the file (NTv2, TIFF). Every reader goes
// through these helpers so decoding never depends on the host order.

/// Read a little-endian u16 from a byte slice.
///
/// # Panics
/// Panics if the slice has fewer than 2 bytes.
#[inline]
pub fn read_u16_le(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

/// Read a big-endian u16 from a byte slice.
///
/// # Panics
/// Panics if the slice has fewer than 2 bytes.
#[inline]
pub fn read_u16_be(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

/// Read a little-endian u32 from a byte slice.
///
/// # Panics
/// Panics if the slice has fewer than 4 bytes.
#[inline]
pub fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Read a big-endian u32 from a byte slice.
///
/// # Panics
/// Panics if the slice has fewer than 4 bytes.
#[inline]
pub fn read_u32_be(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Read a little-endian u64 from a byte slice.
///
/// # Panics
/// Panics if the slice has fewer than 8 bytes.
#[inline]
pub fn read_u64_le(bytes: &[u8]) -> u64 {
    u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

/// Read a big-endian u64 from a byte slice.
///
/// # Panics
/// Panics if the slice has fewer than 8 bytes.
#[inline]
pub fn read_u64_be(bytes: &[u8]) -> u64 {
    u64::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}
