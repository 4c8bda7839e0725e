//! Simulated peers and their phy attachments

use alloc::sync::Arc;
use core::cell::RefCell;
use core::time::Duration;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use heapless::Vec;

use crate::BluetoothError;
use crate::address::Address;
use crate::constants::MAX_PHYS_PER_DEVICE;
use crate::packet::LinkLayerPacket;
use crate::phy::{PhyLayer, PhyType};

type AttachmentTable = Vec<Arc<PhyLayer>, MAX_PHYS_PER_DEVICE>;

/// The phy layers a peer currently holds, in attach order
pub struct PhyAttachments {
    layers: Mutex<CriticalSectionRawMutex, RefCell<AttachmentTable>>,
}

impl PhyAttachments {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self {
            layers: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Hold `layer`
    ///
    /// # Errors
    /// Returns `BluetoothError::PhyLayersExhausted` if the peer already holds
    /// `MAX_PHYS_PER_DEVICE` layers
    pub fn attach(&self, layer: Arc<PhyLayer>) -> Result<(), BluetoothError> {
        self.layers.lock(|layers| {
            layers
                .borrow_mut()
                .push(layer)
                .map_err(|_| BluetoothError::PhyLayersExhausted)
        })
    }

    /// Release and unregister the layers handed out by the factory `factory_id`
    /// of technology `phy_type`; returns how many were released
    pub fn detach(&self, phy_type: PhyType, factory_id: u32) -> usize {
        self.release(|layer| layer.phy_type() == phy_type && layer.is_factory_id(factory_id))
    }

    /// Release and unregister every layer
    pub fn detach_all(&self) -> usize {
        self.release(|_| true)
    }

    /// Snapshot of the held layers of technology `phy_type`
    #[must_use]
    pub fn layers_of(&self, phy_type: PhyType) -> AttachmentTable {
        self.layers.lock(|layers| {
            layers
                .borrow()
                .iter()
                .filter(|layer| layer.phy_type() == phy_type)
                .cloned()
                .collect()
        })
    }

    /// Number of held layers
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.lock(|layers| layers.borrow().len())
    }

    /// Whether no layer is held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, matches: impl Fn(&PhyLayer) -> bool) -> usize {
        let mut released = AttachmentTable::new();
        self.layers.lock(|layers| {
            layers.borrow_mut().retain(|layer| {
                if matches(layer.as_ref()) {
                    // Capacity matches the source table
                    let _ = released.push(layer.clone());
                    false
                } else {
                    true
                }
            });
        });
        // Unregister outside the lock; the factory takes its own
        for layer in &released {
            layer.unregister();
        }
        released.len()
    }
}

impl Default for PhyAttachments {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for PhyAttachments {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.layers
            .lock(|layers| f.debug_list().entries(layers.borrow().iter()).finish())
    }
}

/// A simulated peer that can be attached to phys
///
/// Implementors provide identity, the packet entry point and the tick hook;
/// the phy bookkeeping comes with the trait.
pub trait PeerDevice: Send + Sync {
    /// Current address
    fn address(&self) -> Address;

    /// Change the address
    fn set_address(&self, address: Address);

    /// Short type label used in listings
    fn type_name(&self) -> &'static str;

    /// Phy layers held by this peer
    fn phys(&self) -> &PhyAttachments;

    /// Handle a packet received on any attached phy
    fn incoming_packet(&self, packet: &LinkLayerPacket);

    /// Periodic hook; `now` is the simulated time since the model started
    fn timer_tick(&self, now: Duration);

    /// Hold a newly created layer
    ///
    /// # Errors
    /// Returns `BluetoothError::PhyLayersExhausted` if the peer holds too many layers
    fn register_phy_layer(&self, layer: Arc<PhyLayer>) -> Result<(), BluetoothError> {
        self.phys().attach(layer)
    }

    /// Drop the layers of one factory generation
    fn unregister_phy_layer(&self, phy_type: PhyType, factory_id: u32) {
        self.phys().detach(phy_type, factory_id);
    }

    /// Drop every layer
    fn unregister_phy_layers(&self) {
        self.phys().detach_all();
    }

    /// Send `packet` on every held layer of technology `phy_type`
    fn send_link_layer_packet(&self, packet: &LinkLayerPacket, phy_type: PhyType) {
        let bytes = packet.to_bytes();
        for layer in &self.phys().layers_of(phy_type) {
            layer.send(&bytes);
        }
    }
}
