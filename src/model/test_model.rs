use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt::Write;
use core::time::Duration;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};

use super::{PeerDevice, RemoteTransport, Scheduler, TaskId, TestModelOptions};
use crate::BluetoothError;
use crate::address::Address;
use crate::packet::LinkLayerPacket;
use crate::phy::{PhyLayerFactory, PhyType};

struct ModelState {
    devices: BTreeMap<usize, Arc<dyn PeerDevice>>,
    phys: BTreeMap<usize, Arc<PhyLayerFactory>>,
    next_device: usize,
    next_phy: usize,
    next_factory_id: u32,
    timer_period: Duration,
    timer_task: Option<TaskId>,
    now: Duration,
}

/// Orchestrator of simulated peers and phys
///
/// Devices and phys are addressed by the index returned when they were added.
/// Indices are never reused.
pub struct TestModel<S: Scheduler, R: RemoteTransport> {
    scheduler: S,
    remote: R,
    state: Mutex<CriticalSectionRawMutex, RefCell<ModelState>>,
    this: Weak<Self>,
}

impl<S: Scheduler + 'static, R: RemoteTransport + 'static> TestModel<S, R> {
    /// Build a model
    #[must_use]
    pub fn new(scheduler: S, remote: R, options: TestModelOptions) -> Arc<Self> {
        let model = Arc::new_cyclic(|this| Self {
            scheduler,
            remote,
            state: Mutex::new(RefCell::new(ModelState {
                devices: BTreeMap::new(),
                phys: BTreeMap::new(),
                next_device: 0,
                next_phy: 0,
                next_factory_id: 0,
                timer_period: options.timer_period,
                timer_task: None,
                now: Duration::ZERO,
            })),
            this: this.clone(),
        });
        if options.start_timer {
            model.start_timer();
        }
        model
    }

    fn read<T>(&self, f: impl FnOnce(&ModelState) -> T) -> T {
        self.state.lock(|state| f(&state.borrow()))
    }

    fn update<T>(&self, f: impl FnOnce(&mut ModelState) -> T) -> T {
        self.state.lock(|state| f(&mut state.borrow_mut()))
    }

    fn device(&self, index: usize) -> Result<Arc<dyn PeerDevice>, BluetoothError> {
        self.read(|state| state.devices.get(&index).cloned())
            .ok_or(BluetoothError::DeviceNotFound)
    }

    fn phy(&self, index: usize) -> Result<Arc<PhyLayerFactory>, BluetoothError> {
        self.read(|state| state.phys.get(&index).cloned())
            .ok_or(BluetoothError::PhyNotFound)
    }

    /// Add a peer; returns its index
    pub fn add(&self, device: Arc<dyn PeerDevice>) -> usize {
        let type_name = device.type_name();
        let index = self.update(|state| {
            let index = state.next_device;
            state.next_device += 1;
            state.devices.insert(index, device);
            index
        });
        defmt::info!("[MODEL] Device {} added ({})", index, type_name);
        index
    }

    /// Remove a peer and detach it from every phy
    ///
    /// # Errors
    /// Returns `BluetoothError::DeviceNotFound` for an unknown index
    pub fn del(&self, index: usize) -> Result<(), BluetoothError> {
        let device = self
            .update(|state| state.devices.remove(&index))
            .ok_or(BluetoothError::DeviceNotFound)?;
        device.unregister_phy_layers();
        defmt::info!("[MODEL] Device {} removed", index);
        Ok(())
    }

    /// Add a phy of technology `phy_type`; returns its index
    pub fn add_phy(&self, phy_type: PhyType) -> usize {
        let index = self.update(|state| {
            let index = state.next_phy;
            let factory_id = state.next_factory_id;
            state.next_phy += 1;
            state.next_factory_id += 1;
            state.phys.insert(index, PhyLayerFactory::new(phy_type, factory_id));
            index
        });
        defmt::info!("[MODEL] Phy {} added ({})", index, phy_type);
        index
    }

    /// Remove a phy, detaching every peer from it first
    ///
    /// # Errors
    /// Returns `BluetoothError::PhyNotFound` for an unknown index
    pub fn del_phy(&self, index: usize) -> Result<(), BluetoothError> {
        let (factory, devices) = self.update(|state| {
            let factory = state.phys.remove(&index)?;
            let devices: Vec<_> = state.devices.values().cloned().collect();
            Some((factory, devices))
        })
        .ok_or(BluetoothError::PhyNotFound)?;
        for device in &devices {
            device.unregister_phy_layer(factory.phy_type(), factory.factory_id());
        }
        defmt::info!("[MODEL] Phy {} removed", index);
        Ok(())
    }

    /// Attach peer `device_index` to phy `phy_index`
    ///
    /// The layer decodes every received packet and hands it to the peer. It only
    /// holds the peer weakly; a removed peer stops receiving.
    ///
    /// # Errors
    /// Returns `DeviceNotFound` / `PhyNotFound` for unknown indices and
    /// `PhyLayersExhausted` if the phy or the peer has no room for another layer
    pub fn add_device_to_phy(
        &self,
        device_index: usize,
        phy_index: usize,
    ) -> Result<(), BluetoothError> {
        let device = self.device(device_index)?;
        let factory = self.phy(phy_index)?;

        let peer = Arc::downgrade(&device);
        let receive = move |bytes: &[u8]| {
            let Some(peer) = peer.upgrade() else {
                return;
            };
            match LinkLayerPacket::from_bytes(bytes) {
                Ok(packet) => peer.incoming_packet(&packet),
                Err(e) => {
                    defmt::warn!("[MODEL] Dropping undecodable packet: {}", e);
                }
            }
        };
        // Layer device ids are the model's device indices
        let device_id =
            u32::try_from(device_index).map_err(|_| BluetoothError::InvalidParameter)?;
        let layer = factory.get_phy_layer(receive, device_id)?;
        if let Err(e) = device.register_phy_layer(layer.clone()) {
            layer.unregister();
            return Err(e);
        }
        defmt::debug!("[MODEL] Device {} attached to phy {}", device_index, phy_index);
        Ok(())
    }

    /// Detach peer `device_index` from phy `phy_index`
    ///
    /// # Errors
    /// Returns `DeviceNotFound` / `PhyNotFound` for unknown indices
    pub fn del_device_from_phy(
        &self,
        device_index: usize,
        phy_index: usize,
    ) -> Result<(), BluetoothError> {
        let device = self.device(device_index)?;
        let factory = self.phy(phy_index)?;
        device.unregister_phy_layer(factory.phy_type(), factory.factory_id());
        defmt::debug!("[MODEL] Device {} detached from phy {}", device_index, phy_index);
        Ok(())
    }

    /// Add a peer and attach it to every phy of technology `phy_type`
    ///
    /// # Errors
    /// Returns `PhyLayersExhausted` if an attachment does not fit; the peer
    /// stays added with the attachments made so far
    pub fn add_link_layer_connection(
        &self,
        device: Arc<dyn PeerDevice>,
        phy_type: PhyType,
    ) -> Result<usize, BluetoothError> {
        let index = self.add(device);
        let phys: Vec<usize> = self.read(|state| {
            state
                .phys
                .iter()
                .filter(|(_, factory)| factory.phy_type() == phy_type)
                .map(|(index, _)| *index)
                .collect()
        });
        for phy in phys {
            self.add_device_to_phy(index, phy)?;
        }
        Ok(index)
    }

    /// Adopt a remote peer that connected to us; it speaks BR/EDR
    ///
    /// # Errors
    /// See [`TestModel::add_link_layer_connection`]
    pub fn incoming_link_layer_connection(
        &self,
        fd: super::SocketFd,
    ) -> Result<usize, BluetoothError> {
        let device = self.remote.link_layer_device(fd, PhyType::BrEdr);
        self.add_link_layer_connection(device, PhyType::BrEdr)
    }

    /// Connect to a remote peer at `host:port` and attach it to the phys of `phy_type`
    ///
    /// # Errors
    /// Returns `BluetoothError::RemoteConnectionFailed` if the connection cannot be
    /// opened; see also [`TestModel::add_link_layer_connection`]
    pub fn add_remote(
        &self,
        host: &str,
        port: u16,
        phy_type: PhyType,
    ) -> Result<usize, BluetoothError> {
        let Some(fd) = self.remote.connect_to_remote(host, port) else {
            defmt::warn!("[MODEL] Connection to {}:{} failed", host, port);
            return Err(BluetoothError::RemoteConnectionFailed);
        };
        let device = self.remote.link_layer_device(fd, phy_type);
        self.add_link_layer_connection(device, phy_type)
    }

    /// Change the address of peer `index`
    ///
    /// # Errors
    /// Returns `BluetoothError::DeviceNotFound` for an unknown index
    pub fn set_device_address(&self, index: usize, address: Address) -> Result<(), BluetoothError> {
        self.device(index)?.set_address(address);
        Ok(())
    }

    /// Start the periodic timer; restarts it if already running
    pub fn start_timer(&self) {
        self.stop_timer();
        let period = self.read(|state| state.timer_period);
        let model = self.this.clone();
        let task = self.scheduler.schedule_periodic_task(
            Duration::ZERO,
            period,
            Box::new(move || {
                if let Some(model) = model.upgrade() {
                    model.timer_tick();
                }
            }),
        );
        self.update(|state| state.timer_task = Some(task));
        defmt::info!(
            "[MODEL] Timer started, period {} ms",
            u64::try_from(period.as_millis()).unwrap_or(u64::MAX)
        );
    }

    /// Stop the periodic timer if running
    pub fn stop_timer(&self) {
        if let Some(task) = self.update(|state| state.timer_task.take()) {
            self.scheduler.cancel_task(task);
            defmt::info!("[MODEL] Timer stopped");
        }
    }

    /// Whether the periodic timer is running
    #[must_use]
    pub fn is_timer_running(&self) -> bool {
        self.read(|state| state.timer_task.is_some())
    }

    /// Change the timer period; a running timer is restarted with it
    pub fn set_timer_period(&self, period: Duration) {
        self.update(|state| state.timer_period = period);
        if self.is_timer_running() {
            self.start_timer();
        }
    }

    /// Current timer period
    #[must_use]
    pub fn timer_period(&self) -> Duration {
        self.read(|state| state.timer_period)
    }

    /// Advance simulated time by one period; ticks every peer, then every phy
    pub fn timer_tick(&self) {
        let (now, devices, phys) = self.update(|state| {
            state.now += state.timer_period;
            let devices: Vec<_> = state.devices.values().cloned().collect();
            let phys: Vec<_> = state.phys.values().cloned().collect();
            (state.now, devices, phys)
        });
        for device in &devices {
            device.timer_tick(now);
        }
        for phy in &phys {
            phy.timer_tick();
        }
    }

    /// Simulated time elapsed through timer ticks
    #[must_use]
    pub fn now(&self) -> Duration {
        self.read(|state| state.now)
    }

    /// Human readable listing of peers and phys
    #[must_use]
    pub fn list(&self) -> String {
        let (devices, phys) = self.read(|state| {
            let devices: Vec<_> = state.devices.iter().map(|(i, d)| (*i, d.clone())).collect();
            let phys: Vec<_> = state.phys.iter().map(|(i, p)| (*i, p.clone())).collect();
            (devices, phys)
        });

        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = write!(out, "List {} devices:\r\n", devices.len());
        for (index, device) in &devices {
            let _ = write!(out, "{index}:{}@{}\r\n", device.type_name(), device.address());
        }
        let _ = write!(out, "List {} phys:\r\n", phys.len());
        for (index, phy) in &phys {
            let _ = write!(out, "{index}:{phy}\r\n");
        }
        out
    }

    /// Number of peers
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.read(|state| state.devices.len())
    }

    /// Number of phys
    #[must_use]
    pub fn phy_count(&self) -> usize {
        self.read(|state| state.phys.len())
    }

    /// Stop the timer and remove every peer and phy
    pub fn reset(&self) {
        self.stop_timer();
        let devices = self.update(|state| {
            state.phys.clear();
            core::mem::take(&mut state.devices)
        });
        for device in devices.values() {
            device.unregister_phy_layers();
        }
        defmt::info!("[MODEL] Reset, {} devices removed", devices.len());
    }
}

impl<S: Scheduler, R: RemoteTransport> Drop for TestModel<S, R> {
    fn drop(&mut self) {
        if let Some(task) = self.state.get_mut().get_mut().timer_task.take() {
            self.scheduler.cancel_task(task);
        }
    }
}

#[cfg(test)]
mod tests;
