use core::ops::Deref;

use super::{Device, DeviceType};
use crate::Address;

/// A BR/EDR device record
#[derive(Debug, PartialEq, Eq)]
pub struct ClassicDevice {
    device: Device,
}

impl ClassicDevice {
    pub(crate) fn new(address: Address) -> Self {
        Self {
            device: Device::new(address, DeviceType::Classic),
        }
    }

    /// The common record
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl Deref for ClassicDevice {
    type Target = Device;

    fn deref(&self) -> &Self::Target {
        &self.device
    }
}
