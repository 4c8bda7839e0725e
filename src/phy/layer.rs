use alloc::boxed::Box;
use alloc::sync::Weak;
use core::sync::atomic::{AtomicU32, Ordering};

use super::{PhyLayerFactory, PhyType};

/// Receive entry point bound into a layer: called with every packet sent by
/// another layer of the same factory
pub type ReceiveCallback = Box<dyn Fn(&[u8]) + Send + Sync>;

/// One peer's attachment point to a [`PhyLayerFactory`]
///
/// Layers are created by [`PhyLayerFactory::get_phy_layer`]. The factory keeps
/// a share of every registered layer; the owning peer keeps another to send.
pub struct PhyLayer {
    phy_type: PhyType,
    id: u32,
    device_id: u32,
    factory_id: u32,
    receive: ReceiveCallback,
    factory: Weak<PhyLayerFactory>,
    ticks: AtomicU32,
}

impl PhyLayer {
    pub(super) fn new(
        phy_type: PhyType,
        id: u32,
        device_id: u32,
        factory_id: u32,
        receive: ReceiveCallback,
        factory: Weak<PhyLayerFactory>,
    ) -> Self {
        Self {
            phy_type,
            id,
            device_id,
            factory_id,
            receive,
            factory,
            ticks: AtomicU32::new(0),
        }
    }

    /// Technology of the owning factory
    #[must_use]
    pub fn phy_type(&self) -> PhyType {
        self.phy_type
    }

    /// Identifier, unique within the owning factory
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Identifier of the peer this layer belongs to
    #[must_use]
    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    /// Identifier of the owning factory
    #[must_use]
    pub fn factory_id(&self) -> u32 {
        self.factory_id
    }

    /// Whether this layer was created by the factory with `factory_id`
    #[must_use]
    pub fn is_factory_id(&self, factory_id: u32) -> bool {
        self.factory_id == factory_id
    }

    /// Transmit `packet` to every other layer of the owning factory
    ///
    /// Once the factory is gone the packet is dropped.
    pub fn send(&self, packet: &[u8]) {
        match self.factory.upgrade() {
            Some(factory) => factory.send(packet, self.id),
            None => {
                defmt::debug!("[PHY] Layer {} has no factory, packet dropped", self.id);
            }
        }
    }

    /// Deliver `packet` to the owning peer
    pub fn receive(&self, packet: &[u8]) {
        (self.receive)(packet);
    }

    /// Advance this layer's tick count
    pub fn timer_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of timer ticks forwarded to this layer
    #[must_use]
    pub fn ticks(&self) -> u32 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Remove this layer from its factory; does nothing if already removed
    pub fn unregister(&self) {
        if let Some(factory) = self.factory.upgrade() {
            factory.unregister_phy_layer(self.id);
        }
    }
}

impl core::fmt::Debug for PhyLayer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PhyLayer")
            .field("phy_type", &self.phy_type)
            .field("id", &self.id)
            .field("device_id", &self.device_id)
            .field("factory_id", &self.factory_id)
            .finish_non_exhaustive()
    }
}
