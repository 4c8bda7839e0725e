//! Link Layer Packet Envelope
//!
//! Simulated peers exchange link layer packets as opaque bytes on a phy. Every
//! packet starts with a fixed 13-byte header followed by the payload:
//!
//! | offset | size | field                     |
//! |--------|------|---------------------------|
//! | 0      | 1    | packet type               |
//! | 1      | 6    | source address (LE)       |
//! | 7      | 6    | destination address (LE)  |
//! | 13     | n    | payload                   |

use heapless::Vec;

use crate::BluetoothError;
use crate::address::Address;
use crate::constants::{
    BD_ADDR_LENGTH, LINK_LAYER_HEADER_LENGTH, MAX_PACKET_LENGTH, MAX_PAYLOAD_LENGTH,
};

/// Link layer packet kinds understood by simulated peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, defmt::Format)]
pub enum PacketType {
    /// ACL data
    Acl,
    /// Link teardown
    Disconnect,
    /// BR/EDR inquiry
    Inquiry,
    /// Answer to an inquiry
    InquiryResponse,
    /// BR/EDR page (connection request)
    Page,
    /// Answer to a page
    PageResponse,
    /// Remote name request
    RemoteNameRequest,
    /// Answer to a remote name request
    RemoteNameRequestResponse,
    /// LE advertising PDU
    LeAdvertisement,
    /// LE scan request
    LeScan,
    /// Answer to an LE scan request
    LeScanResponse,
    /// Any other wire value
    Unknown(u8),
}

impl PacketType {
    /// Decode the wire value
    #[must_use]
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0x01 => Self::Acl,
            0x02 => Self::Disconnect,
            0x03 => Self::Inquiry,
            0x04 => Self::InquiryResponse,
            0x05 => Self::Page,
            0x06 => Self::PageResponse,
            0x07 => Self::RemoteNameRequest,
            0x08 => Self::RemoteNameRequestResponse,
            0x09 => Self::LeAdvertisement,
            0x0A => Self::LeScan,
            0x0B => Self::LeScanResponse,
            other => Self::Unknown(other),
        }
    }

    /// Encode to the wire value
    #[must_use]
    pub fn to_raw(self) -> u8 {
        match self {
            Self::Acl => 0x01,
            Self::Disconnect => 0x02,
            Self::Inquiry => 0x03,
            Self::InquiryResponse => 0x04,
            Self::Page => 0x05,
            Self::PageResponse => 0x06,
            Self::RemoteNameRequest => 0x07,
            Self::RemoteNameRequestResponse => 0x08,
            Self::LeAdvertisement => 0x09,
            Self::LeScan => 0x0A,
            Self::LeScanResponse => 0x0B,
            Self::Unknown(other) => other,
        }
    }

    /// Whether this kind travels on the LE phy
    #[must_use]
    pub fn is_le(self) -> bool {
        matches!(self, Self::LeAdvertisement | Self::LeScan | Self::LeScanResponse)
    }
}

impl core::fmt::Display for PacketType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Acl => write!(f, "ACL"),
            Self::Disconnect => write!(f, "DISCONNECT"),
            Self::Inquiry => write!(f, "INQUIRY"),
            Self::InquiryResponse => write!(f, "INQUIRY_RESPONSE"),
            Self::Page => write!(f, "PAGE"),
            Self::PageResponse => write!(f, "PAGE_RESPONSE"),
            Self::RemoteNameRequest => write!(f, "REMOTE_NAME_REQUEST"),
            Self::RemoteNameRequestResponse => write!(f, "REMOTE_NAME_REQUEST_RESPONSE"),
            Self::LeAdvertisement => write!(f, "LE_ADVERTISEMENT"),
            Self::LeScan => write!(f, "LE_SCAN"),
            Self::LeScanResponse => write!(f, "LE_SCAN_RESPONSE"),
            Self::Unknown(raw) => write!(f, "UNKNOWN(0x{raw:02x})"),
        }
    }
}

/// Payload buffer of a link layer packet
pub type Payload = Vec<u8, MAX_PAYLOAD_LENGTH>;

/// Link layer packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkLayerPacket {
    /// Packet kind
    pub packet_type: PacketType,
    /// Sending peer
    pub source: Address,
    /// Receiving peer; [`Address::EMPTY`] for broadcasts
    pub destination: Address,
    /// Packet payload
    pub payload: Payload,
}

impl LinkLayerPacket {
    /// Create a packet
    ///
    /// # Errors
    /// Returns `BluetoothError::PayloadTooLarge` if the payload exceeds `MAX_PAYLOAD_LENGTH`
    pub fn new(
        packet_type: PacketType,
        source: Address,
        destination: Address,
        payload: &[u8],
    ) -> Result<Self, BluetoothError> {
        let payload = Vec::from_slice(payload).map_err(|()| BluetoothError::PayloadTooLarge)?;
        Ok(Self {
            packet_type,
            source,
            destination,
            payload,
        })
    }

    /// Whether the destination is the broadcast address
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.destination.is_empty()
    }

    /// Encoded size in bytes
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        LINK_LAYER_HEADER_LENGTH + self.payload.len()
    }

    /// Parse a packet from its wire form
    ///
    /// # Errors
    /// Returns `BluetoothError::InvalidPacket` if the bytes are shorter than the header,
    /// or `BluetoothError::PayloadTooLarge` if the payload exceeds `MAX_PAYLOAD_LENGTH`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BluetoothError> {
        if bytes.len() < LINK_LAYER_HEADER_LENGTH {
            return Err(BluetoothError::InvalidPacket);
        }

        let packet_type = PacketType::from_raw(bytes[0]);
        let source = Address::try_from(&bytes[1..=BD_ADDR_LENGTH])?;
        let destination = Address::try_from(&bytes[1 + BD_ADDR_LENGTH..LINK_LAYER_HEADER_LENGTH])?;

        Self::new(packet_type, source, destination, &bytes[LINK_LAYER_HEADER_LENGTH..])
    }

    /// Encode the packet to its wire form
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8, MAX_PACKET_LENGTH> {
        let mut bytes = Vec::new();
        // Header plus a bounded payload always fits MAX_PACKET_LENGTH
        let _ = bytes.push(self.packet_type.to_raw());
        let _ = bytes.extend_from_slice(self.source.as_bytes());
        let _ = bytes.extend_from_slice(self.destination.as_bytes());
        let _ = bytes.extend_from_slice(&self.payload);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Address {
        Address::new([last, 0, 0, 0, 0, 0xC0])
    }

    #[test]
    fn test_packet_type_values() {
        assert_eq!(PacketType::from_raw(0x09), PacketType::LeAdvertisement);
        assert_eq!(PacketType::LeScanResponse.to_raw(), 0x0B);
        assert_eq!(PacketType::from_raw(0x7F), PacketType::Unknown(0x7F));
        assert_eq!(PacketType::Unknown(0x7F).to_raw(), 0x7F);
        assert!(PacketType::LeScan.is_le());
        assert!(!PacketType::Page.is_le());
    }

    #[test]
    fn test_wire_layout() {
        let packet =
            LinkLayerPacket::new(PacketType::Page, addr(1), addr(2), &[0xAA, 0xBB]).unwrap();
        let bytes = packet.to_bytes();

        assert_eq!(bytes.len(), packet.encoded_len());
        assert_eq!(bytes[0], 0x05);
        assert_eq!(&bytes[1..7], &[1, 0, 0, 0, 0, 0xC0]);
        assert_eq!(&bytes[7..13], &[2, 0, 0, 0, 0, 0xC0]);
        assert_eq!(&bytes[13..], &[0xAA, 0xBB]);
        assert_eq!(LinkLayerPacket::from_bytes(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_header_only_packet() {
        let packet =
            LinkLayerPacket::new(PacketType::Inquiry, addr(3), Address::EMPTY, &[]).unwrap();
        let decoded = LinkLayerPacket::from_bytes(&packet.to_bytes()).unwrap();

        assert!(decoded.is_broadcast());
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_truncated_packet() {
        assert_eq!(
            LinkLayerPacket::from_bytes(&[0x01; LINK_LAYER_HEADER_LENGTH - 1]),
            Err(BluetoothError::InvalidPacket)
        );
        assert_eq!(LinkLayerPacket::from_bytes(&[]), Err(BluetoothError::InvalidPacket));
    }

    #[test]
    fn test_oversized_payload() {
        let payload = [0u8; MAX_PAYLOAD_LENGTH + 1];
        assert_eq!(
            LinkLayerPacket::new(PacketType::Acl, addr(1), addr(2), &payload),
            Err(BluetoothError::PayloadTooLarge)
        );

        let mut bytes = [0u8; LINK_LAYER_HEADER_LENGTH + MAX_PAYLOAD_LENGTH + 1];
        bytes[0] = 0x01;
        assert_eq!(LinkLayerPacket::from_bytes(&bytes), Err(BluetoothError::PayloadTooLarge));
    }

    #[test]
    fn test_display() {
        use alloc::string::ToString;

        assert_eq!(PacketType::LeScan.to_string(), "LE_SCAN");
        assert_eq!(PacketType::Unknown(0x42).to_string(), "UNKNOWN(0x42)");
    }
}
