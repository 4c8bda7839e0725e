//! Persistence boundary of the device database
//!
//! The database hands a complete snapshot of its top-level records to a
//! [`DeviceStore`] after every successful mutation, synchronously, so an
//! add or remove is on the store before the call returns. The on-disk format is
//! left entirely to the store implementation.

use alloc::vec::Vec;

use crate::device::{DeviceName, DeviceType, LeIdentity};
use crate::{Address, ClassOfDevice, StorageError};

/// One persisted device
///
/// Dual-mode pairs are persisted as a single [`DeviceType::Dual`] record; their
/// classic and LE halves are rebuilt from it on load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Device address; its canonical text is the record's uid
    pub address: Address,
    /// Transport type
    pub device_type: DeviceType,
    /// Device name
    pub name: DeviceName,
    /// Class of Device
    pub class_of_device: ClassOfDevice,
    /// Bonding state
    pub is_bonded: bool,
    /// LE identity for LE and dual records
    pub le_identity: Option<LeIdentity>,
}

impl DeviceRecord {
    /// A record with default metadata
    #[must_use]
    pub fn new(address: Address, device_type: DeviceType) -> Self {
        Self {
            address,
            device_type,
            name: DeviceName::new(),
            class_of_device: ClassOfDevice::ZERO,
            is_bonded: false,
            le_identity: None,
        }
    }
}

/// Backing store for device records
pub trait DeviceStore {
    /// Load every persisted record
    ///
    /// # Errors
    /// Returns `StorageError::ReadFailed` if the store cannot be read
    fn read_from_disk(&mut self) -> Result<Vec<DeviceRecord>, StorageError>;

    /// Replace the persisted records with `records`
    ///
    /// # Errors
    /// Returns `StorageError::WriteFailed` if the store cannot be written
    fn write_to_disk(&mut self, records: &[DeviceRecord]) -> Result<(), StorageError>;
}

/// A store that persists nothing: reads are empty and writes succeed
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl DeviceStore for NullStore {
    fn read_from_disk(&mut self) -> Result<Vec<DeviceRecord>, StorageError> {
        Ok(Vec::new())
    }

    fn write_to_disk(&mut self, _records: &[DeviceRecord]) -> Result<(), StorageError> {
        Ok(())
    }
}

/// A store that keeps the last written snapshot in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Vec<DeviceRecord>,
    writes: usize,
    fail_reads: bool,
    fail_writes: bool,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `records`
    #[must_use]
    pub fn with_records(records: Vec<DeviceRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    /// The last snapshot written (or the initial records)
    #[must_use]
    pub fn records(&self) -> &[DeviceRecord] {
        &self.records
    }

    /// Number of successful writes
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Make subsequent reads fail
    pub fn set_fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    /// Make subsequent writes fail
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl DeviceStore for MemoryStore {
    fn read_from_disk(&mut self) -> Result<Vec<DeviceRecord>, StorageError> {
        if self.fail_reads {
            return Err(StorageError::ReadFailed);
        }
        Ok(self.records.clone())
    }

    fn write_to_disk(&mut self, records: &[DeviceRecord]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::WriteFailed);
        }
        self.records = records.to_vec();
        self.writes += 1;
        Ok(())
    }
}
