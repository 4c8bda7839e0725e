extern crate std;

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex as StdMutex;

use super::*;
use crate::model::{Beacon, PhyAttachments, SocketFd, Sniffer, TaskCallback};
use crate::packet::PacketType;

struct Task {
    period: Option<Duration>,
    callback: TaskCallback,
}

#[derive(Default)]
struct SchedulerInner {
    tasks: StdMutex<BTreeMap<TaskId, Task>>,
    next_id: AtomicU32,
}

/// Scheduler that only runs tasks when the test fires them
#[derive(Clone, Default)]
struct ManualScheduler(Arc<SchedulerInner>);

impl ManualScheduler {
    fn insert(&self, period: Option<Duration>, callback: TaskCallback) -> TaskId {
        let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
        self.0.tasks.lock().unwrap().insert(id, Task { period, callback });
        id
    }

    /// Run every pending task once; one-shot tasks are consumed
    fn fire(&self) {
        let ids: Vec<TaskId> = self.0.tasks.lock().unwrap().keys().copied().collect();
        for id in ids {
            let task = self.0.tasks.lock().unwrap().remove(&id);
            if let Some(mut task) = task {
                (task.callback)();
                if task.period.is_some() {
                    self.0.tasks.lock().unwrap().insert(id, task);
                }
            }
        }
    }

    fn periods(&self) -> Vec<Option<Duration>> {
        self.0.tasks.lock().unwrap().values().map(|task| task.period).collect()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_task(&self, _delay: Duration, callback: TaskCallback) -> TaskId {
        self.insert(None, callback)
    }

    fn schedule_periodic_task(
        &self,
        _initial_delay: Duration,
        period: Duration,
        callback: TaskCallback,
    ) -> TaskId {
        self.insert(Some(period), callback)
    }

    fn cancel_task(&self, id: TaskId) {
        self.0.tasks.lock().unwrap().remove(&id);
    }
}

/// Remote transport that only reaches 127.0.0.1 and hands out sniffers
#[derive(Clone, Default)]
struct FakeRemote {
    peers: Arc<StdMutex<Vec<Arc<Sniffer>>>>,
}

impl FakeRemote {
    fn peer(&self, n: usize) -> Arc<Sniffer> {
        self.peers.lock().unwrap()[n].clone()
    }
}

impl RemoteTransport for FakeRemote {
    fn connect_to_remote(&self, host: &str, port: u16) -> Option<SocketFd> {
        (host == "127.0.0.1").then_some(SocketFd::from(port))
    }

    fn link_layer_device(&self, fd: SocketFd, _phy_type: PhyType) -> Arc<dyn PeerDevice> {
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let sniffer = Arc::new(Sniffer::new(address(fd as u8)));
        self.peers.lock().unwrap().push(sniffer.clone());
        sniffer
    }
}

/// Peer that answers every advertisement with a scan request
struct Scanner {
    address: Address,
    phys: PhyAttachments,
}

impl PeerDevice for Scanner {
    fn address(&self) -> Address {
        self.address
    }

    fn set_address(&self, _address: Address) {}

    fn type_name(&self) -> &'static str {
        "scanner"
    }

    fn phys(&self) -> &PhyAttachments {
        &self.phys
    }

    fn incoming_packet(&self, packet: &LinkLayerPacket) {
        if packet.packet_type == PacketType::LeAdvertisement {
            let scan =
                LinkLayerPacket::new(PacketType::LeScan, self.address, packet.source, &[]).unwrap();
            self.send_link_layer_packet(&scan, PhyType::LowEnergy);
        }
    }

    fn timer_tick(&self, _now: Duration) {}
}

fn address(n: u8) -> Address {
    Address::new([n, 0x00, 0x00, 0x00, 0x00, 0xC0])
}

fn model() -> (Arc<TestModel<ManualScheduler, FakeRemote>>, ManualScheduler, FakeRemote) {
    let scheduler = ManualScheduler::default();
    let remote = FakeRemote::default();
    let model = TestModel::new(scheduler.clone(), remote.clone(), TestModelOptions::default());
    (model, scheduler, remote)
}

#[test]
fn test_add_and_del_devices() {
    let (model, _, _) = model();

    let first = model.add(Arc::new(Sniffer::new(address(1))));
    let second = model.add(Arc::new(Sniffer::new(address(2))));
    assert_ne!(first, second);
    assert_eq!(model.device_count(), 2);

    model.del(first).unwrap();
    assert_eq!(model.device_count(), 1);
    assert_eq!(model.del(first), Err(BluetoothError::DeviceNotFound));

    // Indices are not reused
    let third = model.add(Arc::new(Sniffer::new(address(3))));
    assert_ne!(third, first);
}

#[test]
fn test_unknown_indices() {
    let (model, _, _) = model();
    let device = model.add(Arc::new(Sniffer::new(address(1))));
    let phy = model.add_phy(PhyType::LowEnergy);

    assert_eq!(model.add_device_to_phy(device + 1, phy), Err(BluetoothError::DeviceNotFound));
    assert_eq!(model.add_device_to_phy(device, phy + 1), Err(BluetoothError::PhyNotFound));
    assert_eq!(model.del_device_from_phy(device, phy + 1), Err(BluetoothError::PhyNotFound));
    assert_eq!(model.del_phy(phy + 1), Err(BluetoothError::PhyNotFound));
    assert_eq!(
        model.set_device_address(device + 1, address(9)),
        Err(BluetoothError::DeviceNotFound)
    );
}

#[test]
fn test_beacon_heard_by_sniffer() {
    let (model, _, _) = model();
    let beacon = model.add(Arc::new(Beacon::new(address(1))));
    let sniffer = Arc::new(Sniffer::new(address(2)));
    let sniffer_index = model.add(sniffer.clone());
    let le = model.add_phy(PhyType::LowEnergy);
    model.add_device_to_phy(beacon, le).unwrap();
    model.add_device_to_phy(sniffer_index, le).unwrap();

    model.timer_tick();

    let captured = sniffer.captured();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].packet_type, PacketType::LeAdvertisement);
    assert_eq!(captured[0].source, address(1));
    assert_eq!(model.now(), model.timer_period());
}

#[test]
fn test_scan_exchange_through_model() {
    let (model, _, _) = model();
    let beacon = model.add(Arc::new(Beacon::new(address(1))));
    let scanner = model.add(Arc::new(Scanner {
        address: address(2),
        phys: PhyAttachments::new(),
    }));
    let sniffer = Arc::new(Sniffer::new(address(3)));
    let sniffer_index = model.add(sniffer.clone());
    let le = model.add_phy(PhyType::LowEnergy);
    // Delivery is depth first; the sniffer comes first to hear packets in send order
    for device in [sniffer_index, beacon, scanner] {
        model.add_device_to_phy(device, le).unwrap();
    }

    model.timer_tick();

    let kinds: Vec<PacketType> = sniffer.captured().iter().map(|p| p.packet_type).collect();
    assert_eq!(
        kinds,
        [PacketType::LeAdvertisement, PacketType::LeScan, PacketType::LeScanResponse]
    );
}

#[test]
fn test_detach_stops_delivery() {
    let (model, _, _) = model();
    let beacon = Beacon::new(address(1)).with_advertising_interval(Duration::ZERO);
    let beacon = model.add(Arc::new(beacon));
    let sniffer = Arc::new(Sniffer::new(address(2)));
    let sniffer_index = model.add(sniffer.clone());
    let le = model.add_phy(PhyType::LowEnergy);
    model.add_device_to_phy(beacon, le).unwrap();
    model.add_device_to_phy(sniffer_index, le).unwrap();

    model.timer_tick();
    model.del_device_from_phy(sniffer_index, le).unwrap();
    model.timer_tick();

    assert_eq!(sniffer.captured().len(), 1);
    assert!(sniffer.phys().is_empty());
}

#[test]
fn test_deleted_device_stops_receiving() {
    let (model, _, _) = model();
    let beacon = Beacon::new(address(1)).with_advertising_interval(Duration::ZERO);
    let beacon = model.add(Arc::new(beacon));
    let sniffer = Arc::new(Sniffer::new(address(2)));
    let sniffer_index = model.add(sniffer.clone());
    let le = model.add_phy(PhyType::LowEnergy);
    model.add_device_to_phy(beacon, le).unwrap();
    model.add_device_to_phy(sniffer_index, le).unwrap();

    model.del(sniffer_index).unwrap();
    model.timer_tick();

    assert!(sniffer.captured().is_empty());
    assert!(model.list().contains("0:LOW_ENERGY factory 0: 0\r\n"));
}

#[test]
fn test_del_phy_detaches_devices() {
    let (model, _, _) = model();
    let sniffer = Arc::new(Sniffer::new(address(1)));
    let index = model.add(sniffer.clone());
    let first = model.add_phy(PhyType::LowEnergy);
    let second = model.add_phy(PhyType::LowEnergy);
    model.add_device_to_phy(index, first).unwrap();
    model.add_device_to_phy(index, second).unwrap();

    model.del_phy(first).unwrap();

    assert_eq!(model.phy_count(), 1);
    let remaining = sniffer.phys().layers_of(PhyType::LowEnergy);
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].is_factory_id(1));
}

#[test]
fn test_timer_lifecycle() {
    let scheduler = ManualScheduler::default();
    let options = TestModelOptions {
        timer_period: Duration::from_millis(5),
        start_timer: true,
    };
    let model = TestModel::new(scheduler.clone(), FakeRemote::default(), options);
    assert!(model.is_timer_running());
    assert_eq!(scheduler.periods(), [Some(Duration::from_millis(5))]);

    scheduler.fire();
    scheduler.fire();
    assert_eq!(model.now(), Duration::from_millis(10));

    model.set_timer_period(Duration::from_millis(20));
    assert_eq!(scheduler.periods(), [Some(Duration::from_millis(20))]);
    scheduler.fire();
    assert_eq!(model.now(), Duration::from_millis(30));

    model.stop_timer();
    assert!(!model.is_timer_running());
    assert!(scheduler.periods().is_empty());

    // Changing the period of a stopped timer does not start it
    model.set_timer_period(Duration::from_millis(1));
    assert!(scheduler.periods().is_empty());
}

#[test]
fn test_timer_callback_does_not_keep_model_alive() {
    let (model, scheduler, _) = model();
    model.start_timer();
    assert_eq!(scheduler.periods().len(), 1);
    drop(model);

    assert!(scheduler.periods().is_empty());
    scheduler.fire();
}

#[test]
fn test_add_remote() {
    let (model, _, remote) = model();
    let classic = model.add_phy(PhyType::BrEdr);
    let le = model.add_phy(PhyType::LowEnergy);

    let index = model.add_remote("127.0.0.1", 7, PhyType::BrEdr).unwrap();

    let peer = remote.peer(0);
    assert_eq!(model.device_count(), 1);
    assert_eq!(peer.address(), address(7));
    assert_eq!(peer.phys().layers_of(PhyType::BrEdr).len(), 1);
    assert!(peer.phys().layers_of(PhyType::LowEnergy).is_empty());

    model.del_device_from_phy(index, classic).unwrap();
    model.del_device_from_phy(index, le).unwrap();
    assert!(peer.phys().is_empty());

    assert_eq!(
        model.add_remote("10.0.0.1", 7, PhyType::BrEdr),
        Err(BluetoothError::RemoteConnectionFailed)
    );
    assert_eq!(model.device_count(), 1);
}

#[test]
fn test_incoming_connection_attaches_to_classic_phys() {
    let (model, _, remote) = model();
    model.add_phy(PhyType::BrEdr);
    model.add_phy(PhyType::BrEdr);
    model.add_phy(PhyType::LowEnergy);

    model.incoming_link_layer_connection(3).unwrap();

    let peer = remote.peer(0);
    assert_eq!(peer.phys().len(), 2);
    assert_eq!(peer.phys().layers_of(PhyType::BrEdr).len(), 2);
}

#[test]
fn test_set_device_address_and_list() {
    let (model, _, _) = model();
    let index = model.add(Arc::new(Sniffer::new(address(1))));
    let le = model.add_phy(PhyType::LowEnergy);
    model.add_device_to_phy(index, le).unwrap();

    model.set_device_address(index, address(0x42)).unwrap();

    assert_eq!(
        model.list(),
        "List 1 devices:\r\n\
         0:sniffer@c0:00:00:00:00:42\r\n\
         List 1 phys:\r\n\
         0:LOW_ENERGY factory 0: 0\r\n"
    );
}

#[test]
fn test_reset() {
    let (model, scheduler, _) = model();
    let sniffer = Arc::new(Sniffer::new(address(1)));
    let index = model.add(sniffer.clone());
    let le = model.add_phy(PhyType::LowEnergy);
    model.add_device_to_phy(index, le).unwrap();
    model.start_timer();

    model.reset();

    assert_eq!(model.device_count(), 0);
    assert_eq!(model.phy_count(), 0);
    assert!(!model.is_timer_running());
    assert!(scheduler.periods().is_empty());
    assert!(sniffer.phys().is_empty());
}
