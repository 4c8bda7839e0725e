//! Device-level simulation model
//!
//! [`TestModel`] owns the simulated peers and the phy factories, wires peers
//! to phys and drives the periodic simulation timer. Timing and remote
//! connections are supplied by the host through the [`Scheduler`] and
//! [`RemoteTransport`] traits.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::time::Duration;

use crate::constants::DEFAULT_TIMER_PERIOD;
use crate::phy::PhyType;

mod beacon;
mod peer;
mod sniffer;
mod test_model;

pub use beacon::{AdvertisingData, Beacon};
pub use peer::{PeerDevice, PhyAttachments};
pub use sniffer::Sniffer;
pub use test_model::TestModel;

/// Identifier of a scheduled task
pub type TaskId = u32;

/// Work run by the [`Scheduler`]
pub type TaskCallback = Box<dyn FnMut() + Send>;

/// Handle of a connected remote socket
pub type SocketFd = i32;

/// Host timer service
pub trait Scheduler: Send + Sync {
    /// Run `callback` once after `delay`
    fn schedule_task(&self, delay: Duration, callback: TaskCallback) -> TaskId;

    /// Run `callback` after `initial_delay`, then every `period`
    fn schedule_periodic_task(
        &self,
        initial_delay: Duration,
        period: Duration,
        callback: TaskCallback,
    ) -> TaskId;

    /// Stop a scheduled task; unknown ids are ignored
    fn cancel_task(&self, id: TaskId);
}

/// Host socket service for peers simulated outside this process
pub trait RemoteTransport: Send + Sync {
    /// Open a connection to `host:port`
    fn connect_to_remote(&self, host: &str, port: u16) -> Option<SocketFd>;

    /// Wrap a connected socket in a peer speaking link layer packets on `phy_type`
    fn link_layer_device(&self, fd: SocketFd, phy_type: PhyType) -> Arc<dyn PeerDevice>;
}

/// Model construction options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestModelOptions {
    /// Period of the simulation timer
    pub timer_period: Duration,
    /// Start the timer as soon as the model is built
    pub start_timer: bool,
}

impl Default for TestModelOptions {
    fn default() -> Self {
        Self {
            timer_period: DEFAULT_TIMER_PERIOD,
            start_timer: false,
        }
    }
}
