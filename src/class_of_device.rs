//! Class of Device (`CoD`) value type
//!
//! The Class of Device is a 24-bit field carried as three little-endian bytes:
//! - Major Service Classes (bits 23-13)
//! - Major Device Class (bits 12-8)
//! - Minor Device Class (bits 7-2)
//! - Format Type (bits 1-0, always 0b00)
//!
//! The simulation treats it as an opaque tag stored with each device record; the
//! accessors below only decode the fields for display and filtering.
//!
//! ## Text form
//!
//! `ClassOfDevice` prints as `sss-m-nn` (hex): the upper twelve bits, the next
//! nibble and the low byte, so `[0x0C, 0x02, 0x5A]` reads as `5a0-2-0c`.

use core::fmt::Write;
use core::str::FromStr;

use crate::BluetoothError;
use crate::constants::CLASS_OF_DEVICE_LENGTH;

/// Class of Device (`CoD`) indicating device type and capabilities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, defmt::Format)]
pub struct ClassOfDevice {
    raw: u32,
}

impl ClassOfDevice {
    /// The all-zero class, used as the default for new device records
    pub const ZERO: Self = Self { raw: 0 };

    /// Create a `ClassOfDevice` from raw 24-bit value
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            raw: raw & 0xFF_FFFF,
        }
    }

    /// Create a `ClassOfDevice` from its three over-the-air (little-endian) bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; CLASS_OF_DEVICE_LENGTH]) -> Self {
        Self::from_raw(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]))
    }

    /// Get the three over-the-air bytes
    #[must_use]
    pub fn to_bytes(&self) -> [u8; CLASS_OF_DEVICE_LENGTH] {
        let [b0, b1, b2, _] = self.raw.to_le_bytes();
        [b0, b1, b2]
    }

    /// Get the raw 24-bit value
    #[must_use]
    pub const fn raw(&self) -> u32 {
        self.raw
    }

    /// Get the Major Device Class (bits 12-8)
    #[must_use]
    pub fn major_device_class(&self) -> MajorDeviceClass {
        MajorDeviceClass::from_raw(((self.raw >> 8) & 0x1F) as u8)
    }

    /// Get the Minor Device Class (bits 7-2)
    #[must_use]
    pub fn minor_device_class(&self) -> u8 {
        ((self.raw >> 2) & 0x3F) as u8
    }

    /// Get the Major Service Classes bit field (bits 23-13)
    #[must_use]
    pub fn major_service_classes(&self) -> u16 {
        ((self.raw >> 13) & 0x7FF) as u16
    }

    /// Render the text form into a fixed buffer
    #[must_use]
    pub fn format(&self) -> heapless::String<8> {
        let mut buffer = heapless::String::new();
        // 8 bytes always fit "sss-m-nn"
        write!(buffer, "{self}").ok();
        buffer
    }
}

impl core::fmt::Display for ClassOfDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let [b0, b1, b2] = self.to_bytes();
        let upper = (u16::from(b2) << 4) | u16::from(b1 >> 4);
        write!(f, "{upper:03x}-{:01x}-{b0:02x}", b1 & 0x0F)
    }
}

impl FromStr for ClassOfDevice {
    type Err = BluetoothError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('-');
        let (Some(upper), Some(nibble), Some(low), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(BluetoothError::InvalidParameter);
        };
        if upper.len() != 3 || nibble.len() != 1 || low.len() != 2 {
            return Err(BluetoothError::InvalidParameter);
        }
        let parse = |text: &str| {
            if text.chars().all(|c| c.is_ascii_hexdigit()) {
                u16::from_str_radix(text, 16).map_err(|_| BluetoothError::InvalidParameter)
            } else {
                Err(BluetoothError::InvalidParameter)
            }
        };
        let upper = parse(upper)?;
        let nibble = parse(nibble)?;
        let low = parse(low)?;

        let b2 = (upper >> 4) as u8;
        let b1 = (((upper & 0x0F) << 4) | nibble) as u8;
        Ok(Self::from_bytes([low as u8, b1, b2]))
    }
}

impl From<[u8; CLASS_OF_DEVICE_LENGTH]> for ClassOfDevice {
    fn from(bytes: [u8; CLASS_OF_DEVICE_LENGTH]) -> Self {
        Self::from_bytes(bytes)
    }
}

/// Major Device Class enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum MajorDeviceClass {
    /// Miscellaneous devices
    Miscellaneous,
    /// Computer devices (desktop, server, laptop, etc.)
    Computer,
    /// Phone devices (cellular, cordless, smartphone, etc.)
    Phone,
    /// LAN/Network Access Point devices
    LanNetworkAccessPoint,
    /// Audio/Video devices (headphones, speakers, microphones, etc.)
    AudioVideo,
    /// Peripheral devices (keyboard, mouse, etc.)
    Peripheral,
    /// Imaging devices (display, camera, scanner, printer)
    Imaging,
    /// Wearable devices (watch, glasses, etc.)
    Wearable,
    /// Toy devices (robot, vehicle, controller, etc.)
    Toy,
    /// Health devices (monitor, scale, etc.)
    Health,
    /// Uncategorized devices
    Uncategorized,
    /// Reserved or unknown device class
    Reserved(u8),
}

impl MajorDeviceClass {
    /// Create `MajorDeviceClass` from raw 5-bit value
    #[must_use]
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0x00 => Self::Miscellaneous,
            0x01 => Self::Computer,
            0x02 => Self::Phone,
            0x03 => Self::LanNetworkAccessPoint,
            0x04 => Self::AudioVideo,
            0x05 => Self::Peripheral,
            0x06 => Self::Imaging,
            0x07 => Self::Wearable,
            0x08 => Self::Toy,
            0x09 => Self::Health,
            0x1F => Self::Uncategorized,
            other => Self::Reserved(other),
        }
    }

    /// Get human-readable description
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Miscellaneous => "Miscellaneous",
            Self::Computer => "Computer",
            Self::Phone => "Phone",
            Self::LanNetworkAccessPoint => "LAN/Network Access Point",
            Self::AudioVideo => "Audio/Video",
            Self::Peripheral => "Peripheral",
            Self::Imaging => "Imaging",
            Self::Wearable => "Wearable",
            Self::Toy => "Toy",
            Self::Health => "Health",
            Self::Uncategorized => "Uncategorized",
            Self::Reserved(_) => "Reserved",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_zero() {
        assert_eq!(ClassOfDevice::default(), ClassOfDevice::ZERO);
        assert_eq!(ClassOfDevice::ZERO.to_bytes(), [0, 0, 0]);
        assert_eq!(ClassOfDevice::ZERO.format().as_str(), "000-0-00");
    }

    #[test]
    fn test_bytes_and_raw_agree() {
        let cod = ClassOfDevice::from_bytes([0x0C, 0x02, 0x5A]);
        assert_eq!(cod.raw(), 0x5A_020C);
        assert_eq!(cod.to_bytes(), [0x0C, 0x02, 0x5A]);

        // Only 24 bits are kept
        assert_eq!(ClassOfDevice::from_raw(0xFF5A_020C), cod);
    }

    #[test]
    fn test_field_decoding() {
        // Smartphone with networking, capturing, object transfer and telephony services
        let cod = ClassOfDevice::from_bytes([0x0C, 0x02, 0x5A]);
        assert_eq!(cod.major_device_class(), MajorDeviceClass::Phone);
        assert_eq!(cod.minor_device_class(), 0x03);
        assert_eq!(cod.major_service_classes(), 0x2D0);
        assert_eq!(cod.major_device_class().description(), "Phone");
        assert_eq!(
            ClassOfDevice::from_raw(0x1F00).major_device_class(),
            MajorDeviceClass::Uncategorized
        );
        assert_eq!(
            ClassOfDevice::from_raw(0x1500).major_device_class(),
            MajorDeviceClass::Reserved(0x15)
        );
    }

    #[test]
    fn test_text_form() {
        let cod = ClassOfDevice::from_bytes([0x0C, 0x02, 0x5A]);
        assert_eq!(cod.format().as_str(), "5a0-2-0c");
        assert_eq!("5a0-2-0c".parse::<ClassOfDevice>().unwrap(), cod);
        assert_eq!("5A0-2-0C".parse::<ClassOfDevice>().unwrap(), cod);
    }

    #[test]
    fn test_text_form_rejects_malformed() {
        assert!("".parse::<ClassOfDevice>().is_err());
        assert!("5a0-2".parse::<ClassOfDevice>().is_err());
        assert!("5a0-2-0c-1".parse::<ClassOfDevice>().is_err());
        assert!("5a-20-0c".parse::<ClassOfDevice>().is_err());
        assert!("5a0-x-0c".parse::<ClassOfDevice>().is_err());
    }
}
