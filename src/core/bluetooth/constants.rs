//! Constants used throughout the session manager
//! This module contains the fixed GATT profile of the SynkLinx band
//! along with the timing values of the connection lifecycle.

use uuid::Uuid;

/// Case-folded product identifier every SynkLinx advertisement name contains
pub const DEVICE_NAME_FILTER: &str = "synklinx";

/// The UUID of the SynkLinx vitals service
pub const UUID_VITALS_SERVICE: Uuid = Uuid::from_u128(0xe5df6019_cf42_49f6_a418_346db96363f6);

/// Heart rate characteristic (u8, bpm)
pub const UUID_HEART_RATE_CHAR: Uuid = Uuid::from_u128(0x3c1f4fe4_c7ce_4c09_a38a_ba166fce06c6);

/// Oxygen saturation characteristic (u8, percent)
pub const UUID_O2_SAT_CHAR: Uuid = Uuid::from_u128(0x9749ccd9_940e_4ad6_bce9_d246a8d30dca);

/// Temperature characteristic (i16 little-endian, hundredths of a degree Celsius)
pub const UUID_TEMPERATURE_CHAR: Uuid = Uuid::from_u128(0x69b82322_1c56_423e_820e_eb08c3f030d4);

/// Default scan duration in milliseconds
pub const DEFAULT_SCAN_TIMEOUT_MS: u64 = 8000;

/// Pause between service discovery and subscribing, in milliseconds
pub const CONNECT_SETTLE_DELAY_MS: u64 = 500;

/// Cool-down after a lost link before scanning again, in milliseconds
pub const DISCONNECT_COOLDOWN_MS: u64 = 2000;

/// Timeout for link establishment and service discovery in seconds
pub const BLUETOOTH_OPERATION_TIMEOUT_SECS: u64 = 10;

/// Accepted heart rate range in bpm
pub const HEART_RATE_RANGE_BPM: (u8, u8) = (40, 200);

/// Accepted oxygen saturation range in percent
pub const O2_SAT_RANGE_PERCENT: (u8, u8) = (50, 100);

/// Accepted body temperature range in degrees Celsius
pub const TEMPERATURE_RANGE_CELSIUS: (f64, f64) = (30.0, 45.0);
