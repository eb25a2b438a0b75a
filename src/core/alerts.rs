//! Threshold alerts for streamed vitals
//! Classifies the latest readings into warning and critical tiers, at most one
//! alert per vital within the throttle window. Purely an observer of the session.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::alert_config::AlertConfig;
use crate::core::vitals::{TemperatureUnit, VitalKind, VitalSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VitalAlert {
    pub kind: VitalKind,
    pub severity: AlertSeverity,
    pub title: &'static str,
    pub description: String,
}

pub struct VitalAlertMonitor {
    config: AlertConfig,
    last_alert: HashMap<VitalKind, Instant>,
}

impl VitalAlertMonitor {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            last_alert: HashMap::new(),
        }
    }

    fn throttle(&self) -> Duration {
        Duration::from_secs(self.config.throttle_secs)
    }

    /// Checks `sample` against the thresholds and returns the alerts due at `now`
    pub fn evaluate(&mut self, sample: &VitalSample, unit: TemperatureUnit, now: Instant) -> Vec<VitalAlert> {
        let candidates = [
            sample.o2_sat.and_then(|o2| self.classify_o2(o2)),
            sample.heart_rate.and_then(|bpm| self.classify_heart_rate(bpm)),
            sample
                .temperature_in(unit)
                .and_then(|value| self.classify_temperature(value, unit)),
        ];

        let throttle = self.throttle();
        let mut alerts = Vec::new();
        for alert in candidates.into_iter().flatten() {
            let throttled = self
                .last_alert
                .get(&alert.kind)
                .is_some_and(|last| now.saturating_duration_since(*last) < throttle);
            if !throttled {
                self.last_alert.insert(alert.kind, now);
                alerts.push(alert);
            }
        }
        alerts
    }

    fn classify_o2(&self, o2: u8) -> Option<VitalAlert> {
        let limits = &self.config.o2_sat;
        let (severity, title) = if o2 <= limits.critically_low {
            (AlertSeverity::Critical, "Critically Low O₂")
        } else if o2 < limits.low {
            (AlertSeverity::Warning, "Low O₂")
        } else {
            return None;
        };
        Some(VitalAlert {
            kind: VitalKind::O2Sat,
            severity,
            title,
            description: format!("SpO₂: {}%", o2),
        })
    }

    fn classify_heart_rate(&self, bpm: u8) -> Option<VitalAlert> {
        let limits = &self.config.heart_rate;
        let (severity, title) = if bpm >= limits.critically_high {
            (AlertSeverity::Critical, "Critically High HR")
        } else if bpm >= limits.high {
            (AlertSeverity::Warning, "High HR")
        } else if bpm < limits.critically_low {
            (AlertSeverity::Critical, "Critically Low HR")
        } else if bpm < limits.low {
            (AlertSeverity::Warning, "Low HR")
        } else {
            return None;
        };
        Some(VitalAlert {
            kind: VitalKind::HeartRate,
            severity,
            title,
            description: format!("Heart Rate: {} bpm", bpm),
        })
    }

    fn classify_temperature(&self, value: f64, unit: TemperatureUnit) -> Option<VitalAlert> {
        let limits = match unit {
            TemperatureUnit::Celsius => &self.config.temperature_celsius,
            TemperatureUnit::Fahrenheit => &self.config.temperature_fahrenheit,
        };
        let title = if value >= limits.high {
            "High Body Temperature"
        } else if value <= limits.low {
            "Low Body Temperature"
        } else {
            return None;
        };
        Some(VitalAlert {
            kind: VitalKind::Temperature,
            severity: AlertSeverity::Critical,
            title,
            description: format!("Temperature: {:.1}{}", value, unit.symbol()),
        })
    }
}

impl Default for VitalAlertMonitor {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}
