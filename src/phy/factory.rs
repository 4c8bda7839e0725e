use alloc::boxed::Box;
use alloc::sync::Arc;
use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use heapless::Vec;

use super::{PhyLayer, PhyType};
use crate::BluetoothError;
use crate::constants::MAX_PHY_LAYERS;

type LayerTable = Vec<Arc<PhyLayer>, MAX_PHY_LAYERS>;

/// One shared medium: owns the registered layers of one technology and fans
/// every packet out to all of them but the sender
pub struct PhyLayerFactory {
    phy_type: PhyType,
    factory_id: u32,
    next_id: AtomicU32,
    layers: Mutex<CriticalSectionRawMutex, RefCell<LayerTable>>,
}

impl PhyLayerFactory {
    /// Create a factory
    ///
    /// `factory_id` tells factories of the same technology apart, so a peer can
    /// detach exactly the layers one factory generation handed out.
    #[must_use]
    pub fn new(phy_type: PhyType, factory_id: u32) -> Arc<Self> {
        Arc::new(Self {
            phy_type,
            factory_id,
            next_id: AtomicU32::new(0),
            layers: Mutex::new(RefCell::new(Vec::new())),
        })
    }

    /// Technology of this medium
    #[must_use]
    pub fn phy_type(&self) -> PhyType {
        self.phy_type
    }

    /// Identifier of this factory
    #[must_use]
    pub fn factory_id(&self) -> u32 {
        self.factory_id
    }

    /// Register a new layer for `device_id`, delivering through `receive`
    ///
    /// # Errors
    /// Returns `BluetoothError::PhyLayersExhausted` if the factory already
    /// carries `MAX_PHY_LAYERS` layers
    pub fn get_phy_layer(
        self: &Arc<Self>,
        receive: impl Fn(&[u8]) + Send + Sync + 'static,
        device_id: u32,
    ) -> Result<Arc<PhyLayer>, BluetoothError> {
        self.layers.lock(|layers| {
            let mut layers = layers.borrow_mut();
            if layers.is_full() {
                return Err(BluetoothError::PhyLayersExhausted);
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let layer = Arc::new(PhyLayer::new(
                self.phy_type,
                id,
                device_id,
                self.factory_id,
                Box::new(receive),
                Arc::downgrade(self),
            ));
            layers
                .push(layer.clone())
                .map_err(|_| BluetoothError::PhyLayersExhausted)?;
            defmt::debug!(
                "[PHY] {} factory {}: layer {} for device {}",
                self.phy_type,
                self.factory_id,
                id,
                device_id
            );
            Ok(layer)
        })
    }

    /// Drop the layer with `id`; does nothing if it is not registered
    ///
    /// The remaining layers keep their registration order.
    pub fn unregister_phy_layer(&self, id: u32) {
        self.layers.lock(|layers| layers.borrow_mut().retain(|layer| layer.id() != id));
    }

    /// Deliver `packet` to every registered layer except `sender_id`, in
    /// registration order
    pub fn send(&self, packet: &[u8], sender_id: u32) {
        for layer in self.snapshot().iter().filter(|layer| layer.id() != sender_id) {
            layer.receive(packet);
        }
    }

    /// Forward a timer tick to every registered layer
    pub fn timer_tick(&self) {
        for layer in &self.snapshot() {
            layer.timer_tick();
        }
    }

    /// Number of registered layers
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layers.lock(|layers| layers.borrow().len())
    }

    /// Whether a layer with `id` is registered
    #[must_use]
    pub fn is_registered(&self, id: u32) -> bool {
        self.layers
            .lock(|layers| layers.borrow().iter().any(|layer| layer.id() == id))
    }

    fn snapshot(&self) -> LayerTable {
        self.layers.lock(|layers| layers.borrow().clone())
    }
}

impl core::fmt::Display for PhyLayerFactory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} factory {}:", self.phy_type, self.factory_id)?;
        for layer in &self.snapshot() {
            write!(f, " {}", layer.device_id())?;
        }
        Ok(())
    }
}
