//! SynkLinx vital-sign payload decoding
//! This module turns raw characteristic values into validated readings
//! and holds the latest value of each vital.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::bluetooth::{
    HEART_RATE_RANGE_BPM, O2_SAT_RANGE_PERCENT, TEMPERATURE_RANGE_CELSIUS, UUID_HEART_RATE_CHAR,
    UUID_O2_SAT_CHAR, UUID_TEMPERATURE_CHAR,
};

/// Reads byte 0 as an unsigned integer and keeps it only inside `[min, max]`.
pub fn decode_unsigned_byte(bytes: &[u8], min: u8, max: u8) -> Option<u8> {
    let value = *bytes.first()?;
    (min..=max).contains(&value).then_some(value)
}

/// Reads bytes 0-1 as a little-endian `i16` in hundredths of a degree and keeps the
/// resulting Celsius value only inside `[min, max]`.
pub fn decode_fixed_point_temperature(bytes: &[u8], min: f64, max: f64) -> Option<f64> {
    let raw: [u8; 2] = bytes.get(..2)?.try_into().ok()?;
    let celsius = f64::from(i16::from_le_bytes(raw)) / 100.0;
    (min..=max).contains(&celsius).then_some(celsius)
}

/// The three streamed vitals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VitalKind {
    HeartRate,
    O2Sat,
    Temperature,
}

impl VitalKind {
    pub const ALL: [VitalKind; 3] = [VitalKind::HeartRate, VitalKind::O2Sat, VitalKind::Temperature];

    /// The characteristic this vital is streamed on
    pub fn characteristic_uuid(self) -> Uuid {
        match self {
            Self::HeartRate => UUID_HEART_RATE_CHAR,
            Self::O2Sat => UUID_O2_SAT_CHAR,
            Self::Temperature => UUID_TEMPERATURE_CHAR,
        }
    }

    /// Decodes a payload for this vital, `None` when it is short or out of range
    pub fn decode(self, bytes: &[u8]) -> Option<VitalReading> {
        match self {
            Self::HeartRate => {
                let (min, max) = HEART_RATE_RANGE_BPM;
                decode_unsigned_byte(bytes, min, max).map(VitalReading::HeartRate)
            }
            Self::O2Sat => {
                let (min, max) = O2_SAT_RANGE_PERCENT;
                decode_unsigned_byte(bytes, min, max).map(VitalReading::O2Sat)
            }
            Self::Temperature => {
                let (min, max) = TEMPERATURE_RANGE_CELSIUS;
                decode_fixed_point_temperature(bytes, min, max).map(VitalReading::Temperature)
            }
        }
    }
}

impl fmt::Display for VitalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HeartRate => "heart rate",
            Self::O2Sat => "O2 saturation",
            Self::Temperature => "temperature",
        };
        f.write_str(name)
    }
}

/// A single validated reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum VitalReading {
    HeartRate(u8),
    O2Sat(u8),
    Temperature(f64),
}

impl VitalReading {
    pub fn kind(&self) -> VitalKind {
        match self {
            Self::HeartRate(_) => VitalKind::HeartRate,
            Self::O2Sat(_) => VitalKind::O2Sat,
            Self::Temperature(_) => VitalKind::Temperature,
        }
    }
}

/// Latest value of every vital. `None` means unknown, which is never the same as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalSample {
    /// Heart rate in bpm
    pub heart_rate: Option<u8>,
    /// Oxygen saturation in percent
    pub o2_sat: Option<u8>,
    /// Body temperature in degrees Celsius
    pub temperature: Option<f64>,
}

impl VitalSample {
    pub fn apply(&mut self, reading: VitalReading) {
        match reading {
            VitalReading::HeartRate(bpm) => self.heart_rate = Some(bpm),
            VitalReading::O2Sat(percent) => self.o2_sat = Some(percent),
            VitalReading::Temperature(celsius) => self.temperature = Some(celsius),
        }
    }

    /// Forgets every reading
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_unknown(&self) -> bool {
        self.heart_rate.is_none() && self.o2_sat.is_none() && self.temperature.is_none()
    }

    /// Temperature converted to the requested unit
    pub fn temperature_in(&self, unit: TemperatureUnit) -> Option<f64> {
        self.temperature.map(|celsius| unit.convert_celsius(celsius))
    }
}

/// Display unit for body temperature
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn convert_celsius(self, celsius: f64) -> f64 {
        match self {
            Self::Celsius => celsius,
            Self::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
        }
    }
}
