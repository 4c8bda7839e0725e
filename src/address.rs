use core::str::FromStr;

use crate::BluetoothError;
use crate::constants::{BD_ADDR_LENGTH, BD_ADDR_STRING_LENGTH};

/// A Bluetooth Device Address (`BD_ADDR`)
///
/// Bytes are kept in over-the-air (little-endian) order. The canonical text form
/// prints the most significant byte first, so `[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]`
/// reads as `06:05:04:03:02:01`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, defmt::Format)]
pub struct Address(pub [u8; BD_ADDR_LENGTH]);

impl Address {
    /// Reserved all-zero address, used as "no address" and as the broadcast destination
    pub const EMPTY: Self = Self([0; BD_ADDR_LENGTH]);

    /// Create a new address from over-the-air bytes
    #[must_use]
    pub const fn new(addr: [u8; BD_ADDR_LENGTH]) -> Self {
        Self(addr)
    }

    /// Get the raw address bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; BD_ADDR_LENGTH] {
        &self.0
    }

    /// Whether this is the reserved empty address
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Format the address in its canonical colon-separated form
    ///
    /// This text is also the device `uid` used by the database.
    #[must_use]
    pub fn format_hex(&self) -> heapless::String<BD_ADDR_STRING_LENGTH> {
        const HEX: &[u8; 16] = b"0123456789abcdef";

        let mut result = heapless::String::new();
        for (i, byte) in self.0.iter().rev().enumerate() {
            if i > 0 {
                result.push(':').ok();
            }
            result.push(char::from(HEX[usize::from(byte >> 4)])).ok();
            result.push(char::from(HEX[usize::from(byte & 0x0F)])).ok();
        }
        result
    }

    /// Parse an address from its canonical colon-separated form
    ///
    /// # Errors
    /// Returns `BluetoothError::InvalidParameter` if the string is not exactly six
    /// colon-separated pairs of hex digits
    pub fn from_hex(hex: &str) -> Result<Self, BluetoothError> {
        if hex.len() != BD_ADDR_STRING_LENGTH {
            return Err(BluetoothError::InvalidParameter);
        }

        let mut bytes = [0u8; BD_ADDR_LENGTH];
        let mut count = 0;
        for (i, part) in hex.split(':').enumerate() {
            if i >= BD_ADDR_LENGTH
                || part.len() != 2
                || !part.chars().all(|c| c.is_ascii_hexdigit())
            {
                return Err(BluetoothError::InvalidParameter);
            }
            bytes[BD_ADDR_LENGTH - 1 - i] =
                u8::from_str_radix(part, 16).map_err(|_| BluetoothError::InvalidParameter)?;
            count += 1;
        }
        if count != BD_ADDR_LENGTH {
            return Err(BluetoothError::InvalidParameter);
        }
        Ok(Self(bytes))
    }
}

impl core::fmt::Display for Address {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.format_hex().as_str())
    }
}

impl FromStr for Address {
    type Err = BluetoothError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; BD_ADDR_LENGTH]> for Address {
    fn from(addr: [u8; BD_ADDR_LENGTH]) -> Self {
        Self(addr)
    }
}

impl From<Address> for [u8; BD_ADDR_LENGTH] {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl From<Address> for bt_hci::param::BdAddr {
    fn from(addr: Address) -> Self {
        bt_hci::param::BdAddr::new(addr.0)
    }
}

impl TryFrom<&str> for Address {
    type Error = BluetoothError;

    fn try_from(hex: &str) -> Result<Self, Self::Error> {
        Address::from_hex(hex)
    }
}

impl TryFrom<&[u8]> for Address {
    type Error = BluetoothError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let addr: [u8; BD_ADDR_LENGTH] = bytes
            .try_into()
            .map_err(|_| BluetoothError::InvalidParameter)?;
        Ok(Address(addr))
    }
}

impl TryFrom<bt_hci::param::BdAddr> for Address {
    type Error = BluetoothError;

    fn try_from(bd_addr: bt_hci::param::BdAddr) -> Result<Self, Self::Error> {
        bd_addr.raw().try_into()
    }
}
