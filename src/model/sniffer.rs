use alloc::vec::Vec;
use core::cell::RefCell;
use core::time::Duration;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};

use super::{PeerDevice, PhyAttachments};
use crate::address::Address;
use crate::packet::LinkLayerPacket;

struct SnifferState {
    address: Address,
    filter: Option<Address>,
    captured: Vec<LinkLayerPacket>,
}

/// Passive peer that records the packets it hears
///
/// With a filter set, only packets whose source or destination matches the
/// filter address are kept.
pub struct Sniffer {
    state: Mutex<CriticalSectionRawMutex, RefCell<SnifferState>>,
    phys: PhyAttachments,
}

impl Sniffer {
    /// Create a sniffer that keeps everything
    #[must_use]
    pub fn new(address: Address) -> Self {
        Self {
            state: Mutex::new(RefCell::new(SnifferState {
                address,
                filter: None,
                captured: Vec::new(),
            })),
            phys: PhyAttachments::new(),
        }
    }

    /// Only keep traffic from or to `address`
    #[must_use]
    pub fn with_filter(self, address: Address) -> Self {
        self.set_filter(Some(address));
        self
    }

    /// Replace the filter; `None` keeps everything
    pub fn set_filter(&self, filter: Option<Address>) {
        self.state.lock(|state| state.borrow_mut().filter = filter);
    }

    /// Copy of everything captured so far
    #[must_use]
    pub fn captured(&self) -> Vec<LinkLayerPacket> {
        self.state.lock(|state| state.borrow().captured.clone())
    }

    /// Take everything captured so far
    pub fn drain(&self) -> Vec<LinkLayerPacket> {
        self.state
            .lock(|state| core::mem::take(&mut state.borrow_mut().captured))
    }
}

impl PeerDevice for Sniffer {
    fn address(&self) -> Address {
        self.state.lock(|state| state.borrow().address)
    }

    fn set_address(&self, address: Address) {
        self.state.lock(|state| state.borrow_mut().address = address);
    }

    fn type_name(&self) -> &'static str {
        "sniffer"
    }

    fn phys(&self) -> &PhyAttachments {
        &self.phys
    }

    fn incoming_packet(&self, packet: &LinkLayerPacket) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            let keep = state
                .filter
                .is_none_or(|filter| packet.source == filter || packet.destination == filter);
            if keep {
                state.captured.push(packet.clone());
            }
        });
    }

    fn timer_tick(&self, _now: Duration) {}
}
