use core::cell::RefCell;
use core::time::Duration;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use heapless::Vec;

use super::{PeerDevice, PhyAttachments};
use crate::BluetoothError;
use crate::address::Address;
use crate::constants::{DEFAULT_ADVERTISING_INTERVAL, MAX_ADVERTISING_DATA_LENGTH};
use crate::packet::{LinkLayerPacket, PacketType};
use crate::phy::PhyType;

/// Advertising or scan response data
pub type AdvertisingData = Vec<u8, MAX_ADVERTISING_DATA_LENGTH>;

struct BeaconState {
    address: Address,
    advertising_interval: Duration,
    advertising_data: AdvertisingData,
    scan_response_data: AdvertisingData,
    last_advertisement: Option<Duration>,
}

/// LE advertiser
///
/// Broadcasts an `LeAdvertisement` once per advertising interval and answers
/// scan requests addressed to it.
pub struct Beacon {
    state: Mutex<CriticalSectionRawMutex, RefCell<BeaconState>>,
    phys: PhyAttachments,
}

impl Beacon {
    /// Create a beacon with the default interval and no data
    #[must_use]
    pub fn new(address: Address) -> Self {
        Self {
            state: Mutex::new(RefCell::new(BeaconState {
                address,
                advertising_interval: DEFAULT_ADVERTISING_INTERVAL,
                advertising_data: Vec::new(),
                scan_response_data: Vec::new(),
                last_advertisement: None,
            })),
            phys: PhyAttachments::new(),
        }
    }

    /// Set the advertising interval
    #[must_use]
    pub fn with_advertising_interval(self, interval: Duration) -> Self {
        self.update(|state| state.advertising_interval = interval);
        self
    }

    /// Set the advertising data
    ///
    /// # Errors
    /// Returns `BluetoothError::PayloadTooLarge` if `data` exceeds 31 bytes
    pub fn with_advertising_data(self, data: &[u8]) -> Result<Self, BluetoothError> {
        let data = Vec::from_slice(data).map_err(|()| BluetoothError::PayloadTooLarge)?;
        self.update(|state| state.advertising_data = data);
        Ok(self)
    }

    /// Set the scan response data
    ///
    /// # Errors
    /// Returns `BluetoothError::PayloadTooLarge` if `data` exceeds 31 bytes
    pub fn with_scan_response_data(self, data: &[u8]) -> Result<Self, BluetoothError> {
        let data = Vec::from_slice(data).map_err(|()| BluetoothError::PayloadTooLarge)?;
        self.update(|state| state.scan_response_data = data);
        Ok(self)
    }

    /// Current advertising interval
    #[must_use]
    pub fn advertising_interval(&self) -> Duration {
        self.read(|state| state.advertising_interval)
    }

    fn read<R>(&self, f: impl FnOnce(&BeaconState) -> R) -> R {
        self.state.lock(|state| f(&state.borrow()))
    }

    fn update<R>(&self, f: impl FnOnce(&mut BeaconState) -> R) -> R {
        self.state.lock(|state| f(&mut state.borrow_mut()))
    }

    /// Build the next advertisement if the interval has elapsed at `now`
    fn due_advertisement(&self, now: Duration) -> Option<LinkLayerPacket> {
        self.update(|state| {
            let due = state
                .last_advertisement
                .is_none_or(|last| now.saturating_sub(last) >= state.advertising_interval);
            if !due {
                return None;
            }
            state.last_advertisement = Some(now);
            LinkLayerPacket::new(
                PacketType::LeAdvertisement,
                state.address,
                Address::EMPTY,
                &state.advertising_data,
            )
            .ok()
        })
    }
}

impl PeerDevice for Beacon {
    fn address(&self) -> Address {
        self.read(|state| state.address)
    }

    fn set_address(&self, address: Address) {
        self.update(|state| state.address = address);
    }

    fn type_name(&self) -> &'static str {
        "beacon"
    }

    fn phys(&self) -> &PhyAttachments {
        &self.phys
    }

    fn incoming_packet(&self, packet: &LinkLayerPacket) {
        if packet.packet_type != PacketType::LeScan {
            return;
        }
        let response = self.read(|state| {
            (packet.destination == state.address).then(|| {
                LinkLayerPacket::new(
                    PacketType::LeScanResponse,
                    state.address,
                    packet.source,
                    &state.scan_response_data,
                )
            })
        });
        if let Some(Ok(response)) = response {
            defmt::debug!("[BEACON] {} answers scan from {}", response.source, packet.source);
            self.send_link_layer_packet(&response, PhyType::LowEnergy);
        }
    }

    fn timer_tick(&self, now: Duration) {
        if let Some(advertisement) = self.due_advertisement(now) {
            self.send_link_layer_packet(&advertisement, PhyType::LowEnergy);
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::phy::PhyLayerFactory;
    use alloc::sync::Arc;
    use alloc::vec::Vec as StdVec;
    use std::sync::Mutex as StdMutex;

    const BEACON: Address = Address::new([0x01, 0x00, 0x00, 0x00, 0x00, 0xBE]);
    const SCANNER: Address = Address::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x5C]);

    type Heard = Arc<StdMutex<StdVec<LinkLayerPacket>>>;

    fn listen(factory: &Arc<PhyLayerFactory>) -> (Arc<crate::phy::PhyLayer>, Heard) {
        let heard: Heard = Arc::default();
        let sink = heard.clone();
        let receive = move |bytes: &[u8]| {
            let packet = LinkLayerPacket::from_bytes(bytes).unwrap();
            sink.lock().unwrap().push(packet);
        };
        let layer = factory.get_phy_layer(receive, 1).unwrap();
        (layer, heard)
    }

    fn attached_beacon(factory: &Arc<PhyLayerFactory>) -> Beacon {
        let beacon = Beacon::new(BEACON)
            .with_advertising_interval(Duration::from_millis(100))
            .with_advertising_data(&[0x02, 0x01, 0x06])
            .unwrap()
            .with_scan_response_data(&[0x03, 0x09, b'b', b'b'])
            .unwrap();
        beacon
            .register_phy_layer(factory.get_phy_layer(|_| {}, 0).unwrap())
            .unwrap();
        beacon
    }

    #[test]
    fn test_advertises_once_per_interval() {
        let factory = PhyLayerFactory::new(PhyType::LowEnergy, 0);
        let beacon = attached_beacon(&factory);
        let (_layer, heard) = listen(&factory);

        for ms in [0, 10, 50, 99, 100, 150, 200] {
            beacon.timer_tick(Duration::from_millis(ms));
        }

        let heard = heard.lock().unwrap();
        assert_eq!(heard.len(), 3);
        assert!(heard.iter().all(|p| p.packet_type == PacketType::LeAdvertisement));
        assert!(heard.iter().all(|p| p.source == BEACON && p.is_broadcast()));
        assert_eq!(heard[0].payload.as_slice(), &[0x02, 0x01, 0x06]);
    }

    #[test]
    fn test_answers_scan_addressed_to_it() {
        let factory = PhyLayerFactory::new(PhyType::LowEnergy, 0);
        let beacon = attached_beacon(&factory);
        let (_layer, heard) = listen(&factory);

        let scan = LinkLayerPacket::new(PacketType::LeScan, SCANNER, BEACON, &[]).unwrap();
        beacon.incoming_packet(&scan);
        let elsewhere = LinkLayerPacket::new(PacketType::LeScan, SCANNER, SCANNER, &[]).unwrap();
        beacon.incoming_packet(&elsewhere);

        let heard = heard.lock().unwrap();
        assert_eq!(heard.len(), 1);
        assert_eq!(heard[0].packet_type, PacketType::LeScanResponse);
        assert_eq!(heard[0].destination, SCANNER);
        assert_eq!(heard[0].payload.as_slice(), &[0x03, 0x09, b'b', b'b']);
    }

    #[test]
    fn test_silent_without_le_phy() {
        let factory = PhyLayerFactory::new(PhyType::BrEdr, 0);
        let beacon = Beacon::new(BEACON);
        beacon
            .register_phy_layer(factory.get_phy_layer(|_| {}, 0).unwrap())
            .unwrap();
        let (_layer, heard) = listen(&factory);

        beacon.timer_tick(Duration::ZERO);

        assert!(heard.lock().unwrap().is_empty());
    }

    #[test]
    fn test_oversized_advertising_data() {
        assert!(matches!(
            Beacon::new(BEACON).with_advertising_data(&[0; MAX_ADVERTISING_DATA_LENGTH + 1]),
            Err(BluetoothError::PayloadTooLarge)
        ));
        assert_eq!(Beacon::new(BEACON).advertising_interval(), DEFAULT_ADVERTISING_INTERVAL);
    }
}
