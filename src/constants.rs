//! `bluesim` Constants
//!
//! This module contains the limits and default values used throughout the
//! simulation: table capacities, name and payload sizes, and timer defaults.

use core::time::Duration;

/// Maximum number of entries in each device database map (classic, LE, dual)
///
/// Must be a power of two (heapless index map requirement).
pub const MAX_DEVICES: usize = 64;

/// Maximum number of layers a single phy factory can carry at once
pub const MAX_PHY_LAYERS: usize = 32;

/// Maximum number of phy layers a single simulated peer can hold
pub const MAX_PHYS_PER_DEVICE: usize = 8;

/// Maximum device name length in bytes (Bluetooth local name limit)
pub const MAX_DEVICE_NAME_LENGTH: usize = 248;

/// `BD_ADDR` length in bytes
pub const BD_ADDR_LENGTH: usize = 6;

/// Length of the canonical `xx:xx:xx:xx:xx:xx` address text
pub const BD_ADDR_STRING_LENGTH: usize = 17;

/// Class of Device length in bytes
pub const CLASS_OF_DEVICE_LENGTH: usize = 3;

/// Maximum link layer payload carried in one simulated packet
pub const MAX_PAYLOAD_LENGTH: usize = 1024;

/// Link layer header: type (1) + source address (6) + destination address (6)
pub const LINK_LAYER_HEADER_LENGTH: usize = 1 + 2 * BD_ADDR_LENGTH;

/// Maximum encoded link layer packet size
pub const MAX_PACKET_LENGTH: usize = LINK_LAYER_HEADER_LENGTH + MAX_PAYLOAD_LENGTH;

/// Maximum legacy advertising / scan response data length
pub const MAX_ADVERTISING_DATA_LENGTH: usize = 31;

/// Default period of the model's simulation timer
pub const DEFAULT_TIMER_PERIOD: Duration = Duration::from_millis(10);

/// Default beacon advertising interval
pub const DEFAULT_ADVERTISING_INTERVAL: Duration = Duration::from_millis(1280);
