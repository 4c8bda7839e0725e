//! Simulated physical layers
//!
//! A [`PhyLayerFactory`] stands for one shared radio medium of one technology.
//! Every simulated peer attached to it holds a [`PhyLayer`]; whatever one layer
//! sends, every other layer of the same factory receives.
//!
//! ## Delivery
//!
//! Delivery is synchronous and deterministic: [`PhyLayerFactory::send`] calls
//! each receiver in registration order before returning. There is no loss,
//! corruption or contention; packets are opaque bytes.
//!
//! ## Threading
//!
//! The factory is meant to be driven from one simulation thread (timer ticks,
//! sends and attach/detach all run in order). Its layer table is still guarded
//! by a critical-section mutex, and sends iterate over a snapshot of the
//! table, so a receiver may send or (un)register layers from inside its
//! callback.

mod factory;
mod layer;

pub use factory::PhyLayerFactory;
pub use layer::{PhyLayer, ReceiveCallback};

/// Radio technology of a phy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, defmt::Format)]
pub enum PhyType {
    /// Bluetooth low energy
    LowEnergy,
    /// Basic rate / enhanced data rate (classic)
    BrEdr,
}

impl core::fmt::Display for PhyType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::LowEnergy => write!(f, "LOW_ENERGY"),
            Self::BrEdr => write!(f, "BR_EDR"),
        }
    }
}
