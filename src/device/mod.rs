//! Device identity records
//!
//! Every peer tracked by the [`DeviceDatabase`](crate::DeviceDatabase) is one of
//! three concrete records sharing a common [`Device`] core:
//!
//! - [`ClassicDevice`]: a BR/EDR identity
//! - [`LeDevice`]: a low energy identity, with its public address and IRK
//! - [`DualDevice`]: one physical peer usable over both transports, sharing
//!   ownership of one classic and one LE record
//!
//! Records are created only by the database. Readers get `Arc` handles and may
//! read any field; the identity fields (address, uid, type, bonding) change
//! only through database operations so the database maps stay keyed correctly.
//!
//! Each record guards its state with a critical-section mutex. Critical
//! sections nest, which lets a [`DualDevice`] update itself and both of its
//! sub-devices as one step.

mod classic;
mod dual;
mod le;

use alloc::sync::Arc;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use heapless::String;

use crate::constants::{BD_ADDR_STRING_LENGTH, MAX_DEVICE_NAME_LENGTH};
use crate::{Address, BluetoothError, ClassOfDevice};

pub use classic::ClassicDevice;
pub use dual::DualDevice;
pub use le::{LeDevice, LeIdentity};

/// Database key of a device: the canonical text form of its address
pub type Uid = String<BD_ADDR_STRING_LENGTH>;

/// Device name storage
pub type DeviceName = String<MAX_DEVICE_NAME_LENGTH>;

/// Transport(s) a device record represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, defmt::Format)]
pub enum DeviceType {
    /// BR/EDR only
    Classic,
    /// Low energy only
    Le,
    /// Both transports; sub-devices of a dual pair are promoted to this type
    Dual,
}

impl core::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Classic => write!(f, "CLASSIC"),
            Self::Le => write!(f, "LE"),
            Self::Dual => write!(f, "DUAL"),
        }
    }
}

#[derive(Debug, Clone)]
struct DeviceState {
    address: Address,
    uid: Uid,
    device_type: DeviceType,
    name: DeviceName,
    class_of_device: ClassOfDevice,
    is_bonded: bool,
}

impl DeviceState {
    fn set_address(&mut self, address: Address) {
        self.address = address;
        self.uid = address.format_hex();
    }
}

/// Identity and metadata shared by every device record
pub struct Device {
    state: Mutex<CriticalSectionRawMutex, RefCell<DeviceState>>,
}

impl Device {
    pub(crate) fn new(address: Address, device_type: DeviceType) -> Self {
        Self {
            state: Mutex::new(RefCell::new(DeviceState {
                address,
                uid: address.format_hex(),
                device_type,
                name: String::new(),
                class_of_device: ClassOfDevice::ZERO,
                is_bonded: false,
            })),
        }
    }

    fn read<U>(&self, f: impl FnOnce(&DeviceState) -> U) -> U {
        self.state.lock(|state| f(&state.borrow()))
    }

    fn update<U>(&self, f: impl FnOnce(&mut DeviceState) -> U) -> U {
        self.state.lock(|state| f(&mut state.borrow_mut()))
    }

    /// Current address of the peer
    #[must_use]
    pub fn address(&self) -> Address {
        self.read(|s| s.address)
    }

    /// Database key, always the canonical text of [`Device::address`]
    #[must_use]
    pub fn uid(&self) -> Uid {
        self.read(|s| s.uid.clone())
    }

    /// Transport type of this record
    #[must_use]
    pub fn device_type(&self) -> DeviceType {
        self.read(|s| s.device_type)
    }

    /// Human-readable name, empty unless set
    #[must_use]
    pub fn name(&self) -> DeviceName {
        self.read(|s| s.name.clone())
    }

    /// Class of Device, zero unless set
    #[must_use]
    pub fn class_of_device(&self) -> ClassOfDevice {
        self.read(|s| s.class_of_device)
    }

    /// Whether the peer is bonded
    #[must_use]
    pub fn is_bonded(&self) -> bool {
        self.read(|s| s.is_bonded)
    }

    fn identity(&self) -> (Uid, Address, DeviceType, bool) {
        self.read(|s| (s.uid.clone(), s.address, s.device_type, s.is_bonded))
    }

    /// Change the address; the uid is regenerated with it
    pub(crate) fn set_address(&self, address: Address) {
        self.update(|s| s.set_address(address));
    }

    pub(crate) fn set_device_type(&self, device_type: DeviceType) {
        self.update(|s| s.device_type = device_type);
    }

    pub(crate) fn set_name(&self, name: &str) -> Result<(), BluetoothError> {
        let name = DeviceName::try_from(name).map_err(|()| BluetoothError::InvalidParameter)?;
        self.update(|s| s.name = name);
        Ok(())
    }

    pub(crate) fn set_class_of_device(&self, class_of_device: ClassOfDevice) {
        self.update(|s| s.class_of_device = class_of_device);
    }

    pub(crate) fn set_bonded(&self, is_bonded: bool) {
        self.update(|s| s.is_bonded = is_bonded);
    }

    /// Take over name, class of device and bonding state from `other`
    pub(crate) fn copy_metadata_from(&self, other: &Device) {
        let (name, class_of_device, is_bonded) =
            other.read(|s| (s.name.clone(), s.class_of_device, s.is_bonded));
        self.update(|s| {
            s.name = name;
            s.class_of_device = class_of_device;
            s.is_bonded = is_bonded;
        });
    }
}

// Name and class of device are metadata, not identity.
impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Device {}

impl core::fmt::Debug for Device {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.read(DeviceState::clone);
        f.debug_struct("Device")
            .field("uid", &state.uid.as_str())
            .field("device_type", &state.device_type)
            .field("name", &state.name.as_str())
            .field("class_of_device", &state.class_of_device)
            .field("is_bonded", &state.is_bonded)
            .finish()
    }
}

/// Shared handle to any device record
///
/// Database operations that work on all record kinds take a `DeviceRef` and
/// match on the variant, so every kind is handled explicitly.
#[derive(Debug, Clone)]
pub enum DeviceRef {
    /// A classic record
    Classic(Arc<ClassicDevice>),
    /// An LE record
    Le(Arc<LeDevice>),
    /// A dual-mode compound record
    Dual(Arc<DualDevice>),
}

impl DeviceRef {
    /// The common record behind the handle
    #[must_use]
    pub fn device(&self) -> &Device {
        match self {
            Self::Classic(classic) => classic.device(),
            Self::Le(le) => le.device(),
            Self::Dual(dual) => dual.device(),
        }
    }

    /// Shortcut for `self.device().uid()`
    #[must_use]
    pub fn uid(&self) -> Uid {
        self.device().uid()
    }

    /// Shortcut for `self.device().address()`
    #[must_use]
    pub fn address(&self) -> Address {
        self.device().address()
    }

    /// Shortcut for `self.device().device_type()`
    #[must_use]
    pub fn device_type(&self) -> DeviceType {
        self.device().device_type()
    }
}

impl From<Arc<ClassicDevice>> for DeviceRef {
    fn from(device: Arc<ClassicDevice>) -> Self {
        Self::Classic(device)
    }
}

impl From<Arc<LeDevice>> for DeviceRef {
    fn from(device: Arc<LeDevice>) -> Self {
        Self::Le(device)
    }
}

impl From<Arc<DualDevice>> for DeviceRef {
    fn from(device: Arc<DualDevice>) -> Self {
        Self::Dual(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: Address = Address::new([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);

    #[test]
    fn test_new_device_defaults() {
        let device = Device::new(ADDR, DeviceType::Classic);

        assert_eq!(device.address(), ADDR);
        assert_eq!(device.uid().as_str(), "06:05:04:03:02:01");
        assert_eq!(device.device_type(), DeviceType::Classic);
        assert!(device.name().is_empty());
        assert_eq!(device.class_of_device(), ClassOfDevice::ZERO);
        assert!(!device.is_bonded());
    }

    #[test]
    fn test_set_address_regenerates_uid() {
        let device = Device::new(ADDR, DeviceType::Le);
        let next = Address::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

        device.set_address(next);

        assert_eq!(device.address(), next);
        assert_eq!(device.uid(), next.format_hex());
    }

    #[test]
    fn test_equality_ignores_name_and_class() {
        let a = Device::new(ADDR, DeviceType::Classic);
        let b = Device::new(ADDR, DeviceType::Classic);
        a.set_name("kitchen speaker").unwrap();
        b.set_name("hallway speaker").unwrap();
        b.set_class_of_device(ClassOfDevice::from_raw(0x24_0404));

        assert_eq!(a, b);
    }

    #[test]
    fn test_equality_covers_identity() {
        let a = Device::new(ADDR, DeviceType::Classic);

        let other_type = Device::new(ADDR, DeviceType::Le);
        assert_ne!(a, other_type);

        let bonded = Device::new(ADDR, DeviceType::Classic);
        bonded.set_bonded(true);
        assert_ne!(a, bonded);

        let moved = Device::new(Address::new([9, 9, 9, 9, 9, 9]), DeviceType::Classic);
        assert_ne!(a, moved);
    }

    #[test]
    fn test_name_too_long_is_rejected() {
        let device = Device::new(ADDR, DeviceType::Classic);
        let long = "x".repeat(MAX_DEVICE_NAME_LENGTH + 1);

        assert_eq!(device.set_name(&long), Err(BluetoothError::InvalidParameter));
        assert!(device.name().is_empty());
    }

    #[test]
    fn test_device_ref_accessors() {
        let classic = Arc::new(ClassicDevice::new(ADDR));
        let handle = DeviceRef::from(classic.clone());

        assert_eq!(handle.device_type(), DeviceType::Classic);
        assert_eq!(handle.address(), ADDR);
        assert_eq!(handle.uid(), classic.uid());
    }

    #[test]
    fn test_device_type_display() {
        assert_eq!(alloc::format!("{}", DeviceType::Dual), "DUAL");
        assert_eq!(alloc::format!("{}", DeviceType::Le), "LE");
    }
}
