use serde::{Deserialize, Serialize};

/// Heart rate tiers in bpm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateThresholds {
    pub critically_high: u8,
    pub high: u8,
    pub low: u8,
    pub critically_low: u8,
}

/// Oxygen saturation tiers in percent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct O2SatThresholds {
    pub low: u8,
    pub critically_low: u8,
}

/// Body temperature limits in one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureThresholds {
    pub high: f64,
    pub low: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Minimum pause between two alerts for the same vital, in seconds.
    pub throttle_secs: u64,

    pub heart_rate: HeartRateThresholds,

    pub o2_sat: O2SatThresholds,

    /// Limits applied when temperature is shown in Celsius.
    pub temperature_celsius: TemperatureThresholds,

    /// Limits applied when temperature is shown in Fahrenheit.
    pub temperature_fahrenheit: TemperatureThresholds,
}

impl Default for AlertConfig {
    fn default() -> Self {
        AlertConfig {
            throttle_secs: 15,
            heart_rate: HeartRateThresholds {
                critically_high: 180,
                high: 120,
                low: 50,
                critically_low: 30,
            },
            o2_sat: O2SatThresholds {
                low: 95,
                critically_low: 90,
            },
            temperature_celsius: TemperatureThresholds { high: 38.0, low: 35.0 },
            temperature_fahrenheit: TemperatureThresholds { high: 100.4, low: 95.0 },
        }
    }
}
