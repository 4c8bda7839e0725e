use core::cell::RefCell;
use core::ops::Deref;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};

use super::{Device, DeviceType};
use crate::Address;

/// LE identity material: the public address behind a rotating private
/// address, and the identity resolving key
///
/// The IRK is stored as an opaque byte; nothing in the simulation resolves
/// private addresses with it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, defmt::Format)]
pub struct LeIdentity {
    /// Public (identity) address
    pub public_address: Address,
    /// Identity resolving key
    pub irk: u8,
}

/// A low energy device record
///
/// [`Device::address`] is the address currently in use over the air, which may
/// be a private address; [`LeDevice::public_address`] is the stable identity.
pub struct LeDevice {
    device: Device,
    identity: Mutex<CriticalSectionRawMutex, RefCell<LeIdentity>>,
}

impl LeDevice {
    pub(crate) fn new(address: Address) -> Self {
        Self {
            device: Device::new(address, DeviceType::Le),
            identity: Mutex::new(RefCell::new(LeIdentity::default())),
        }
    }

    /// The common record
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Public (identity) address, empty unless set
    #[must_use]
    pub fn public_address(&self) -> Address {
        self.identity().public_address
    }

    /// Identity resolving key
    #[must_use]
    pub fn irk(&self) -> u8 {
        self.identity().irk
    }

    /// Both identity fields read together
    #[must_use]
    pub fn identity(&self) -> LeIdentity {
        self.identity.lock(|identity| *identity.borrow())
    }

    /// Set the public address
    pub fn set_public_address(&self, public_address: Address) {
        self.identity
            .lock(|identity| identity.borrow_mut().public_address = public_address);
    }

    /// Set the identity resolving key
    pub fn set_irk(&self, irk: u8) {
        self.identity.lock(|identity| identity.borrow_mut().irk = irk);
    }

    pub(crate) fn set_identity(&self, identity: LeIdentity) {
        self.identity.lock(|current| *current.borrow_mut() = identity);
    }
}

impl Deref for LeDevice {
    type Target = Device;

    fn deref(&self) -> &Self::Target {
        &self.device
    }
}

impl PartialEq for LeDevice {
    fn eq(&self, other: &Self) -> bool {
        self.device == other.device
    }
}

impl Eq for LeDevice {}

impl core::fmt::Debug for LeDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LeDevice")
            .field("device", &self.device)
            .field("identity", &self.identity())
            .finish()
    }
}
