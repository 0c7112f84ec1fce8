//! Libraries the generated firmware links against.

use std::collections::BTreeSet;

/// Libraries every build needs.
///
/// This is a fixed catalog, not something derived from the program. Boards
/// that do not use a library still get it installed.
pub const DEFAULT_REQUIRED_LIBRARIES: &[&str] = &[
    "WiFiNINA",
    "Ethernet",
    "Arduino_MachineControl",
    "Arduino_EdgeControl",
    "OneWire",
    "DallasTemperature",
    "P1AM",
    "CONTROLLINO",
    "PubSubClient",
    "ArduinoJson",
    "ArduinoMqttClient",
    "RP2040_PWM",
    "AVR_PWM",
    "megaAVR_PWM",
    "SAMD_PWM",
    "SAMDUE_PWM",
    "Portenta_H7_PWM",
    "CAN",
    "STM32_CAN",
    "STM32_PWM",
];

/// Set of library names that must be installed before compiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredLibraries {
    names: BTreeSet<String>,
}

impl RequiredLibraries {
    /// Create a set from explicit names. Blank names are dropped.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RequiredLibraries {
            names: names
                .into_iter()
                .map(Into::into)
                .filter(|n: &String| !n.trim().is_empty())
                .collect(),
        }
    }

    /// Whether `name` is required. Matching is exact.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Required names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// The underlying set.
    pub fn as_set(&self) -> &BTreeSet<String> {
        &self.names
    }

    /// Number of required libraries.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether nothing is required.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for RequiredLibraries {
    fn default() -> Self {
        RequiredLibraries::new(DEFAULT_REQUIRED_LIBRARIES.iter().copied())
    }
}
