//! Device Database - authoritative registry of tracked device identities
//!
//! The database owns every [`ClassicDevice`], [`LeDevice`] and [`DualDevice`]
//! record, in three maps keyed by [`Uid`]. It is an ordinary owned value: share
//! it with `Arc` where several components need it.
//!
//! ## Locking
//!
//! All three maps and the store sit behind one critical-section mutex. Each
//! public operation takes the lock once and runs to completion under it,
//! including the compound dual-mode paths, so other threads never observe a
//! dual pair half removed or half re-keyed.
//!
//! ## Persistence
//!
//! Every successful mutation writes a full snapshot through the
//! [`DeviceStore`] before returning. A failed write is reported as
//! [`BluetoothError::Storage`]; the in-memory change stays applied and the next
//! successful write brings the store back in line.

mod store;

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use heapless::FnvIndexMap;

use crate::constants::MAX_DEVICES;
use crate::device::{
    ClassicDevice, Device, DeviceRef, DeviceType, DualDevice, LeDevice, LeIdentity, Uid,
};
use crate::{Address, BluetoothError, ClassOfDevice};

pub use store::{DeviceRecord, DeviceStore, MemoryStore, NullStore};

type DeviceMap<T> = FnvIndexMap<Uid, Arc<T>, MAX_DEVICES>;

/// Whether `device` is the exact record stored under `uid`
fn is_entry<T>(map: &DeviceMap<T>, uid: &Uid, device: &Arc<T>) -> bool {
    map.get(uid).is_some_and(|entry| Arc::ptr_eq(entry, device))
}

/// Move the record stored under `old` to `new`
fn rekey<T>(map: &mut DeviceMap<T>, old: &Uid, new: &Uid) -> Result<(), BluetoothError> {
    if let Some(device) = map.remove(old) {
        map.insert(new.clone(), device)
            .map_err(|_| BluetoothError::DatabaseFull)?;
    }
    Ok(())
}

fn has_room<T>(map: &DeviceMap<T>, uid: &Uid) -> bool {
    map.contains_key(uid) || map.len() < map.capacity()
}

fn record_of(device: &Device, le_identity: Option<LeIdentity>) -> DeviceRecord {
    DeviceRecord {
        address: device.address(),
        device_type: device.device_type(),
        name: device.name(),
        class_of_device: device.class_of_device(),
        is_bonded: device.is_bonded(),
        le_identity,
    }
}

fn apply_record(device: &Device, record: &DeviceRecord) -> Result<(), BluetoothError> {
    device.set_name(record.name.as_str())?;
    device.set_class_of_device(record.class_of_device);
    device.set_bonded(record.is_bonded);
    Ok(())
}

#[derive(Default)]
struct Tables {
    classic: DeviceMap<ClassicDevice>,
    le: DeviceMap<LeDevice>,
    dual: DeviceMap<DualDevice>,
}

impl Tables {
    fn classic_or_insert(
        &mut self,
        address: Address,
    ) -> Result<(Arc<ClassicDevice>, bool), BluetoothError> {
        let uid = address.format_hex();
        if let Some(existing) = self.classic.get(&uid) {
            return Ok((existing.clone(), false));
        }
        let device = Arc::new(ClassicDevice::new(address));
        self.classic
            .insert(uid, device.clone())
            .map_err(|_| BluetoothError::DatabaseFull)?;
        Ok((device, true))
    }

    fn le_or_insert(&mut self, address: Address) -> Result<(Arc<LeDevice>, bool), BluetoothError> {
        let uid = address.format_hex();
        if let Some(existing) = self.le.get(&uid) {
            return Ok((existing.clone(), false));
        }
        let device = Arc::new(LeDevice::new(address));
        self.le
            .insert(uid, device.clone())
            .map_err(|_| BluetoothError::DatabaseFull)?;
        Ok((device, true))
    }

    fn dual_or_insert(
        &mut self,
        address: Address,
    ) -> Result<(Arc<DualDevice>, bool), BluetoothError> {
        let uid = address.format_hex();
        if let Some(existing) = self.dual.get(&uid) {
            return Ok((existing.clone(), false));
        }
        // Check every map first so a full map leaves nothing half inserted.
        if !has_room(&self.classic, &uid)
            || !has_room(&self.le, &uid)
            || !has_room(&self.dual, &uid)
        {
            return Err(BluetoothError::DatabaseFull);
        }

        let (classic, classic_created) = self.classic_or_insert(address)?;
        let (le, le_created) = self.le_or_insert(address)?;
        // A promoted standalone record hands its metadata to the compound,
        // which is the one persisted from now on. Classic wins over LE.
        let seed = if !classic_created {
            Some(DeviceRef::from(classic.clone()))
        } else if !le_created {
            Some(DeviceRef::from(le.clone()))
        } else {
            None
        };
        let dual = Arc::new(DualDevice::new(classic, le));
        if let Some(seed) = seed {
            dual.device().copy_metadata_from(seed.device());
        }
        // The lookup above ran under the same lock, so this never replaces an entry.
        self.dual
            .insert(uid, dual.clone())
            .map_err(|_| BluetoothError::DatabaseFull)?;
        Ok((dual, true))
    }

    fn contains(&self, device: &DeviceRef) -> bool {
        let uid = device.uid();
        match device {
            DeviceRef::Classic(classic) => is_entry(&self.classic, &uid, classic),
            DeviceRef::Le(le) => is_entry(&self.le, &uid, le),
            DeviceRef::Dual(dual) => is_entry(&self.dual, &uid, dual),
        }
    }

    /// Whether the compound and both halves are all stored under `uid`
    fn contains_pair(&self, uid: &Uid, dual: &Arc<DualDevice>) -> bool {
        is_entry(&self.dual, uid, dual)
            && is_entry(&self.classic, uid, dual.classic_device())
            && is_entry(&self.le, uid, dual.le_device())
    }

    fn remove(&mut self, device: &DeviceRef) -> bool {
        let uid = device.uid();
        match device {
            DeviceRef::Classic(classic) => {
                if classic.device_type() == DeviceType::Dual {
                    defmt::warn!("[DATABASE] {} is half of a dual pair", uid.as_str());
                    return false;
                }
                is_entry(&self.classic, &uid, classic) && self.classic.remove(&uid).is_some()
            }
            DeviceRef::Le(le) => {
                if le.device_type() == DeviceType::Dual {
                    defmt::warn!("[DATABASE] {} is half of a dual pair", uid.as_str());
                    return false;
                }
                is_entry(&self.le, &uid, le) && self.le.remove(&uid).is_some()
            }
            DeviceRef::Dual(dual) => {
                if !self.contains_pair(&uid, dual) {
                    return false;
                }
                self.classic.remove(&uid);
                self.le.remove(&uid);
                self.dual.remove(&uid);
                true
            }
        }
    }

    fn update_address(
        &mut self,
        device: &DeviceRef,
        address: Address,
    ) -> Result<bool, BluetoothError> {
        let old = device.uid();
        let new = address.format_hex();
        match device {
            DeviceRef::Classic(classic) => {
                if classic.device_type() == DeviceType::Dual
                    || !is_entry(&self.classic, &old, classic)
                {
                    return Ok(false);
                }
                if old != new && self.classic.contains_key(&new) {
                    defmt::warn!("[DATABASE] Classic device {} already exists", new.as_str());
                    return Ok(false);
                }
                classic.set_address(address);
                rekey(&mut self.classic, &old, &new)?;
            }
            DeviceRef::Le(le) => {
                if le.device_type() == DeviceType::Dual || !is_entry(&self.le, &old, le) {
                    return Ok(false);
                }
                if old != new && self.le.contains_key(&new) {
                    defmt::warn!("[DATABASE] LE device {} already exists", new.as_str());
                    return Ok(false);
                }
                le.set_address(address);
                rekey(&mut self.le, &old, &new)?;
            }
            DeviceRef::Dual(dual) => {
                if !self.contains_pair(&old, dual) {
                    return Ok(false);
                }
                if old != new
                    && (self.classic.contains_key(&new)
                        || self.le.contains_key(&new)
                        || self.dual.contains_key(&new))
                {
                    defmt::warn!("[DATABASE] Device {} already exists", new.as_str());
                    return Ok(false);
                }
                dual.set_address(address);
                rekey(&mut self.classic, &old, &new)?;
                rekey(&mut self.le, &old, &new)?;
                rekey(&mut self.dual, &old, &new)?;
            }
        }
        Ok(true)
    }

    fn records(&self) -> Vec<DeviceRecord> {
        let standalone_classic = self
            .classic
            .values()
            .filter(|device| device.device_type() == DeviceType::Classic)
            .map(|device| record_of(device.device(), None));
        let standalone_le = self
            .le
            .values()
            .filter(|device| device.device_type() == DeviceType::Le)
            .map(|device| record_of(device.device(), Some(device.identity())));
        let dual = self
            .dual
            .values()
            .map(|device| record_of(device.device(), Some(device.le_device().identity())));

        standalone_classic.chain(standalone_le).chain(dual).collect()
    }

    fn restore(&mut self, record: &DeviceRecord) -> Result<(), BluetoothError> {
        match record.device_type {
            DeviceType::Classic => {
                let (device, _) = self.classic_or_insert(record.address)?;
                apply_record(device.device(), record)
            }
            DeviceType::Le => {
                let (device, _) = self.le_or_insert(record.address)?;
                if let Some(identity) = record.le_identity {
                    device.set_identity(identity);
                }
                apply_record(device.device(), record)
            }
            DeviceType::Dual => {
                let (device, _) = self.dual_or_insert(record.address)?;
                if let Some(identity) = record.le_identity {
                    device.le_device().set_identity(identity);
                }
                apply_record(device.device(), record)
            }
        }
    }
}

struct Inner<S> {
    tables: Tables,
    store: S,
}

impl<S: DeviceStore> Inner<S> {
    fn persist(&mut self) -> Result<(), BluetoothError> {
        let records = self.tables.records();
        self.store.write_to_disk(&records).map_err(|e| {
            defmt::warn!("[DATABASE] Failed to persist {} records", records.len());
            BluetoothError::Storage(e)
        })
    }
}

/// Thread-safe registry of classic, LE and dual-mode device records
pub struct DeviceDatabase<S: DeviceStore = NullStore> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Inner<S>>>,
}

impl DeviceDatabase<NullStore> {
    /// Create an empty database that persists nothing
    #[must_use]
    pub fn new() -> Self {
        Self::with_tables(Tables::default(), NullStore)
    }
}

impl Default for DeviceDatabase<NullStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: DeviceStore> DeviceDatabase<S> {
    fn with_tables(tables: Tables, store: S) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner { tables, store })),
        }
    }

    fn with_inner<U>(&self, f: impl FnOnce(&mut Inner<S>) -> U) -> U {
        self.inner.lock(|inner| f(&mut inner.borrow_mut()))
    }

    /// Create a database backed by `store`, loading the records it holds
    ///
    /// # Errors
    /// Returns `BluetoothError::Storage` if the store cannot be read, or
    /// `BluetoothError::DatabaseFull` if it holds more records than fit
    pub fn open(mut store: S) -> Result<Self, BluetoothError> {
        let records = store.read_from_disk()?;
        let mut tables = Tables::default();
        for record in &records {
            tables.restore(record)?;
        }
        defmt::debug!("[DATABASE] Loaded {} records", records.len());
        Ok(Self::with_tables(tables, store))
    }

    /// Inspect the backing store
    pub fn with_store<U>(&self, f: impl FnOnce(&S) -> U) -> U {
        self.with_inner(|inner| f(&inner.store))
    }

    /// Reconfigure the backing store
    pub fn with_store_mut<U>(&self, f: impl FnOnce(&mut S) -> U) -> U {
        self.with_inner(|inner| f(&mut inner.store))
    }

    /// Create a classic record for `address`, or return the existing one
    ///
    /// # Errors
    /// Returns `BluetoothError::DatabaseFull` if there is no room for a new
    /// record, or `BluetoothError::Storage` if the new record could not be
    /// persisted (the record is still created)
    pub fn create_classic_device(
        &self,
        address: Address,
    ) -> Result<Arc<ClassicDevice>, BluetoothError> {
        self.with_inner(|inner| {
            let (device, created) = inner.tables.classic_or_insert(address)?;
            if created {
                defmt::debug!("[DATABASE] Created classic device {}", address);
                inner.persist()?;
            }
            Ok(device)
        })
    }

    /// Create an LE record for `address`, or return the existing one
    ///
    /// # Errors
    /// See [`DeviceDatabase::create_classic_device`]
    pub fn create_le_device(&self, address: Address) -> Result<Arc<LeDevice>, BluetoothError> {
        self.with_inner(|inner| {
            let (device, created) = inner.tables.le_or_insert(address)?;
            if created {
                defmt::debug!("[DATABASE] Created LE device {}", address);
                inner.persist()?;
            }
            Ok(device)
        })
    }

    /// Create a dual-mode record for `address`, or return the existing one
    ///
    /// Existing classic and LE records for the address are reused and promoted
    /// to [`DeviceType::Dual`]; missing ones are created. Either every needed
    /// entry is inserted or none is.
    ///
    /// # Errors
    /// See [`DeviceDatabase::create_classic_device`]
    pub fn create_dual_device(&self, address: Address) -> Result<Arc<DualDevice>, BluetoothError> {
        self.with_inner(|inner| {
            let (device, created) = inner.tables.dual_or_insert(address)?;
            if created {
                defmt::debug!("[DATABASE] Created dual device {}", address);
                inner.persist()?;
            }
            Ok(device)
        })
    }

    /// Look up a classic record (including halves of dual pairs)
    #[must_use]
    pub fn get_classic_device(&self, uid: &str) -> Option<Arc<ClassicDevice>> {
        let found = Uid::try_from(uid)
            .ok()
            .and_then(|key| self.with_inner(|inner| inner.tables.classic.get(&key).cloned()));
        if found.is_none() {
            defmt::warn!("[DATABASE] Classic device {} not found", uid);
        }
        found
    }

    /// Look up an LE record (including halves of dual pairs)
    #[must_use]
    pub fn get_le_device(&self, uid: &str) -> Option<Arc<LeDevice>> {
        let found = Uid::try_from(uid)
            .ok()
            .and_then(|key| self.with_inner(|inner| inner.tables.le.get(&key).cloned()));
        if found.is_none() {
            defmt::warn!("[DATABASE] LE device {} not found", uid);
        }
        found
    }

    /// Look up a dual-mode record
    #[must_use]
    pub fn get_dual_device(&self, uid: &str) -> Option<Arc<DualDevice>> {
        let found = Uid::try_from(uid)
            .ok()
            .and_then(|key| self.with_inner(|inner| inner.tables.dual.get(&key).cloned()));
        if found.is_none() {
            defmt::warn!("[DATABASE] Dual device {} not found", uid);
        }
        found
    }

    /// Whether `device` is the record currently stored under its uid
    #[must_use]
    pub fn contains(&self, device: &DeviceRef) -> bool {
        self.with_inner(|inner| inner.tables.contains(device))
    }

    /// Remove a record
    ///
    /// A dual-mode record is removed together with both of its halves, all or
    /// nothing. A classic or LE half of a dual pair cannot be removed on its
    /// own. Returns `Ok(false)` if the record is not stored (for example,
    /// already removed).
    ///
    /// # Errors
    /// Returns `BluetoothError::Storage` if the removal could not be persisted
    /// (the record is still removed)
    pub fn remove_device(&self, device: &DeviceRef) -> Result<bool, BluetoothError> {
        self.with_inner(|inner| {
            if !inner.tables.remove(device) {
                defmt::warn!("[DATABASE] Nothing removed for {}", device.uid().as_str());
                return Ok(false);
            }
            defmt::debug!(
                "[DATABASE] Removed {} device {}",
                device.device_type(),
                device.uid().as_str()
            );
            inner.persist()?;
            Ok(true)
        })
    }

    /// Move a record to a new address, re-keying it under the new uid
    ///
    /// For a dual-mode record the compound and both halves move together.
    /// Returns `Ok(false)` if the record is not stored, is half of a dual pair,
    /// or if another record already uses the new address.
    ///
    /// # Errors
    /// Returns `BluetoothError::Storage` if the change could not be persisted
    /// (the change is still applied)
    pub fn update_device_address(
        &self,
        device: &DeviceRef,
        address: Address,
    ) -> Result<bool, BluetoothError> {
        self.with_inner(|inner| {
            let old = device.address();
            if !inner.tables.update_address(device, address)? {
                return Ok(false);
            }
            defmt::debug!("[DATABASE] Moved {} to {}", old, address);
            inner.persist()?;
            Ok(true)
        })
    }

    fn update_metadata(
        &self,
        device: &DeviceRef,
        apply: impl FnOnce() -> Result<(), BluetoothError>,
    ) -> Result<bool, BluetoothError> {
        self.with_inner(|inner| {
            if !inner.tables.contains(device) {
                defmt::warn!("[DATABASE] Device {} not found", device.uid().as_str());
                return Ok(false);
            }
            // Halves are not persisted on their own; the compound carries the metadata
            let is_half =
                !matches!(device, DeviceRef::Dual(_)) && device.device_type() == DeviceType::Dual;
            if is_half {
                defmt::warn!("[DATABASE] {} is half of a dual pair", device.uid().as_str());
                return Ok(false);
            }
            apply()?;
            inner.persist()?;
            Ok(true)
        })
    }

    /// Set the name of a stored record
    ///
    /// Like the other metadata setters, returns `Ok(false)` if the record is not
    /// stored or is half of a dual pair; set metadata on the dual record instead.
    ///
    /// # Errors
    /// Returns `BluetoothError::InvalidParameter` if the name is too long, or
    /// `BluetoothError::Storage` if the change could not be persisted
    pub fn set_device_name(&self, device: &DeviceRef, name: &str) -> Result<bool, BluetoothError> {
        self.update_metadata(device, || device.device().set_name(name))
    }

    /// Set the Class of Device of a stored record
    ///
    /// # Errors
    /// Returns `BluetoothError::Storage` if the change could not be persisted
    pub fn set_class_of_device(
        &self,
        device: &DeviceRef,
        class_of_device: ClassOfDevice,
    ) -> Result<bool, BluetoothError> {
        self.update_metadata(device, || {
            device.device().set_class_of_device(class_of_device);
            Ok(())
        })
    }

    /// Set the bonding state of a stored record
    ///
    /// # Errors
    /// Returns `BluetoothError::Storage` if the change could not be persisted
    pub fn set_bonded(&self, device: &DeviceRef, is_bonded: bool) -> Result<bool, BluetoothError> {
        self.update_metadata(device, || {
            device.device().set_bonded(is_bonded);
            Ok(())
        })
    }

    /// Set the LE identity of a stored LE or dual-mode record
    ///
    /// # Errors
    /// Returns `BluetoothError::InvalidParameter` for a classic record, or
    /// `BluetoothError::Storage` if the change could not be persisted
    pub fn set_le_identity(
        &self,
        device: &DeviceRef,
        identity: LeIdentity,
    ) -> Result<bool, BluetoothError> {
        self.update_metadata(device, || match device {
            DeviceRef::Classic(_) => Err(BluetoothError::InvalidParameter),
            DeviceRef::Le(le) => {
                le.set_identity(identity);
                Ok(())
            }
            DeviceRef::Dual(dual) => {
                dual.le_device().set_identity(identity);
                Ok(())
            }
        })
    }

    /// Snapshot of the records that would be persisted
    #[must_use]
    pub fn records(&self) -> Vec<DeviceRecord> {
        self.with_inner(|inner| inner.tables.records())
    }

    /// Number of classic records, including halves of dual pairs
    #[must_use]
    pub fn classic_count(&self) -> usize {
        self.with_inner(|inner| inner.tables.classic.len())
    }

    /// Number of LE records, including halves of dual pairs
    #[must_use]
    pub fn le_count(&self) -> usize {
        self.with_inner(|inner| inner.tables.le.len())
    }

    /// Number of dual-mode records
    #[must_use]
    pub fn dual_count(&self) -> usize {
        self.with_inner(|inner| inner.tables.dual.len())
    }

    /// Number of top-level records: standalone classic, standalone LE and dual
    ///
    /// Matches the length of [`DeviceDatabase::records`].
    #[must_use]
    pub fn len(&self) -> usize {
        // Every dual record also holds one classic and one LE entry
        self.with_inner(|inner| {
            let tables = &inner.tables;
            tables.classic.len() + tables.le.len() - tables.dual.len()
        })
    }

    /// Whether the database holds no records at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.with_inner(|inner| {
            let tables = &inner.tables;
            tables.classic.is_empty() && tables.le.is_empty() && tables.dual.is_empty()
        })
    }
}
