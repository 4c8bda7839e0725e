//! `bluesim`: simulated Bluetooth device registry and shared-medium link layer
//!
//! The crate provides the building blocks of a Bluetooth controller test
//! environment:
//!
//! - [`DeviceDatabase`]: a thread-safe registry of classic, LE and dual-mode
//!   device identities, persisted through a [`DeviceStore`] on every mutation.
//! - [`PhyLayerFactory`] / [`PhyLayer`]: a simulated radio medium per technology
//!   that fans every transmitted packet out to all other attached peers.
//! - [`model::TestModel`]: an orchestrator that wires simulated peers to phys,
//!   drives the periodic simulation timer and attaches remote peers.
//!
//! The crate is `no_std` and only needs `alloc`.

#![no_std]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

extern crate alloc;

mod address;
mod class_of_device;
pub mod constants;
pub mod database;
pub mod device;
pub mod model;
pub mod packet;
pub mod phy;

pub use address::Address;
pub use class_of_device::{ClassOfDevice, MajorDeviceClass};
pub use database::{DeviceDatabase, DeviceRecord, DeviceStore, MemoryStore, NullStore};
pub use device::{
    ClassicDevice, Device, DeviceRef, DeviceType, DualDevice, LeDevice, LeIdentity, Uid,
};
pub use packet::{LinkLayerPacket, PacketType};
pub use phy::{PhyLayer, PhyLayerFactory, PhyType};

/// Persistence failures reported by a [`DeviceStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum StorageError {
    /// The backing store could not be read
    ReadFailed,
    /// The backing store could not be written
    WriteFailed,
}

/// Errors produced by the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum BluetoothError {
    /// Invalid parameter provided (e.g., malformed address or oversized name)
    InvalidParameter,
    /// No device with the given address or index
    DeviceNotFound,
    /// A device database map has no room for another entry
    DatabaseFull,
    /// No phy with the given index
    PhyNotFound,
    /// A phy factory or a device has no room for another layer
    PhyLayersExhausted,
    /// Packet bytes could not be decoded
    InvalidPacket,
    /// Payload exceeds buffer capacity
    PayloadTooLarge,
    /// Connecting to a remote peer failed
    RemoteConnectionFailed,
    /// The persistent store failed; the in-memory state is still authoritative
    Storage(StorageError),
}

impl From<StorageError> for BluetoothError {
    fn from(error: StorageError) -> Self {
        Self::Storage(error)
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ReadFailed => write!(f, "failed to read device records"),
            Self::WriteFailed => write!(f, "failed to write device records"),
        }
    }
}

impl core::fmt::Display for BluetoothError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidParameter => write!(f, "Invalid parameter"),
            Self::DeviceNotFound => write!(f, "Device not found"),
            Self::DatabaseFull => write!(f, "Device database is full"),
            Self::PhyNotFound => write!(f, "Phy not found"),
            Self::PhyLayersExhausted => write!(f, "No room for another phy layer"),
            Self::InvalidPacket => write!(f, "Malformed link layer packet"),
            Self::PayloadTooLarge => write!(f, "Link layer payload exceeds buffer capacity"),
            Self::RemoteConnectionFailed => write!(f, "Could not connect to remote peer"),
            Self::Storage(e) => write!(f, "Storage error: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_storage_error_converts() {
        let error: BluetoothError = StorageError::WriteFailed.into();
        assert_eq!(error, BluetoothError::Storage(StorageError::WriteFailed));
        assert_eq!(
            error.to_string(),
            "Storage error: failed to write device records"
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(BluetoothError::DeviceNotFound.to_string(), "Device not found");
        assert_eq!(BluetoothError::PhyNotFound.to_string(), "Phy not found");
    }
}
