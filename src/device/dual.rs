use alloc::sync::Arc;
use core::ops::Deref;

use super::{ClassicDevice, Device, DeviceType, LeDevice};
use crate::Address;

/// A dual-mode device record
///
/// Owns shares of one classic and one LE record for the same peer, both
/// promoted to [`DeviceType::Dual`]. The compound and both sub-devices always
/// carry the same address. Sub-devices hold no reference back to the compound.
#[derive(Debug, PartialEq, Eq)]
pub struct DualDevice {
    device: Device,
    classic: Arc<ClassicDevice>,
    le: Arc<LeDevice>,
}

impl DualDevice {
    /// Build the compound, promoting both sub-devices and aligning their
    /// addresses with the classic record
    pub(crate) fn new(classic: Arc<ClassicDevice>, le: Arc<LeDevice>) -> Self {
        let address = classic.address();
        classic.set_device_type(DeviceType::Dual);
        le.set_device_type(DeviceType::Dual);
        if le.address() != address {
            le.set_address(address);
        }
        Self {
            device: Device::new(address, DeviceType::Dual),
            classic,
            le,
        }
    }

    /// The common record of the compound
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The classic half of the pair
    #[must_use]
    pub fn classic_device(&self) -> &Arc<ClassicDevice> {
        &self.classic
    }

    /// The LE half of the pair
    #[must_use]
    pub fn le_device(&self) -> &Arc<LeDevice> {
        &self.le
    }

    /// Move the compound and both sub-devices to `address`
    ///
    /// Runs inside the compound's critical section, so no reader observes the
    /// three records with different addresses.
    pub(crate) fn set_address(&self, address: Address) {
        self.device.update(|state| {
            self.classic.set_address(address);
            self.le.set_address(address);
            state.set_address(address);
        });
    }
}

impl Deref for DualDevice {
    type Target = Device;

    fn deref(&self) -> &Self::Target {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dual_promotes_sub_devices() {
        let address = Address::new([1, 2, 3, 4, 5, 6]);
        let classic = Arc::new(ClassicDevice::new(address));
        let le = Arc::new(LeDevice::new(address));

        let dual = DualDevice::new(classic.clone(), le.clone());

        assert_eq!(dual.device_type(), DeviceType::Dual);
        assert_eq!(classic.device_type(), DeviceType::Dual);
        assert_eq!(le.device_type(), DeviceType::Dual);
        assert!(Arc::ptr_eq(dual.classic_device(), &classic));
        assert!(Arc::ptr_eq(dual.le_device(), &le));
    }

    #[test]
    fn test_dual_set_address_cascades() {
        let address = Address::new([1, 2, 3, 4, 5, 6]);
        let next = Address::new([6, 5, 4, 3, 2, 1]);
        let dual = DualDevice::new(
            Arc::new(ClassicDevice::new(address)),
            Arc::new(LeDevice::new(address)),
        );

        dual.set_address(next);

        assert_eq!(dual.address(), next);
        assert_eq!(dual.classic_device().address(), next);
        assert_eq!(dual.le_device().address(), next);
        assert_eq!(dual.uid(), next.format_hex());
        assert_eq!(dual.le_device().uid(), next.format_hex());
    }
}
