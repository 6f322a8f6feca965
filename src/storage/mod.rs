//! Byte-addressed non-volatile storage.
//!
//! The oven keeps its constants and profiles in a small EEPROM-style image.
//! [`Storage`] is the byte-level seam; [`MemoryStorage`] backs tests and
//! [`FileStorage`] keeps the image in a file on the host.

pub mod store;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use store::{ConstantsStore, NonVolatileStore, ProfileStore};

/// Value of an erased storage cell.
pub const ERASED: u8 = 0xFF;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Corrupt data: {0}")]
    CorruptData(String),
    #[error("Write of {len} bytes at address {address} exceeds capacity {capacity}")]
    CapacityExceeded {
        address: usize,
        len: usize,
        capacity: usize,
    },
    #[error("IO error: {0}")]
    Io(String),
}

/// Fixed-capacity byte storage. Accesses that do not fit fail without
/// touching any byte.
pub trait Storage {
    fn capacity(&self) -> usize;
    fn read(&self, address: usize, buf: &mut [u8]) -> Result<(), StorageError>;
    fn write(&mut self, address: usize, data: &[u8]) -> Result<(), StorageError>;
}

fn region_end(address: usize, len: usize, capacity: usize) -> Option<usize> {
    address.checked_add(len).filter(|end| *end <= capacity)
}

/// In-memory image, initially erased.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    bytes: Vec<u8>,
}

impl MemoryStorage {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![ERASED; capacity],
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Storage for MemoryStorage {
    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn read(&self, address: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        let end = region_end(address, buf.len(), self.bytes.len()).ok_or_else(|| {
            StorageError::NotFound(format!(
                "{} bytes at address {} lie outside capacity {}",
                buf.len(),
                address,
                self.bytes.len()
            ))
        })?;
        buf.copy_from_slice(&self.bytes[address..end]);
        Ok(())
    }

    fn write(&mut self, address: usize, data: &[u8]) -> Result<(), StorageError> {
        let capacity = self.bytes.len();
        let end = region_end(address, data.len(), capacity).ok_or(StorageError::CapacityExceeded {
            address,
            len: data.len(),
            capacity,
        })?;
        self.bytes[address..end].copy_from_slice(data);
        Ok(())
    }
}

/// Image persisted to a file on every write.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    image: MemoryStorage,
}

impl FileStorage {
    /// Open the image at `path`. A missing file starts erased; a file of a
    /// different size is padded with erased cells or truncated.
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let mut bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No storage image at {}; starting erased", path.display());
                Vec::new()
            }
            Err(e) => return Err(StorageError::Io(e.to_string())),
        };
        if !bytes.is_empty() && bytes.len() != capacity {
            tracing::warn!(
                "Storage image {} is {} bytes, expected {}",
                path.display(),
                bytes.len(),
                capacity
            );
        }
        bytes.resize(capacity, ERASED);
        Ok(Self {
            path,
            image: MemoryStorage::from_bytes(bytes),
        })
    }
}

impl Storage for FileStorage {
    fn capacity(&self) -> usize {
        self.image.capacity()
    }

    fn read(&self, address: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        self.image.read(address, buf)
    }

    fn write(&mut self, address: usize, data: &[u8]) -> Result<(), StorageError> {
        let mut previous = vec![0u8; data.len()];
        self.image.read(address, &mut previous).map_err(|_| StorageError::CapacityExceeded {
            address,
            len: data.len(),
            capacity: self.image.capacity(),
        })?;
        self.image.write(address, data)?;
        if let Err(e) = std::fs::write(&self.path, self.image.as_bytes()) {
            self.image.write(address, &previous)?;
            return Err(StorageError::Io(e.to_string()));
        }
        Ok(())
    }
}
