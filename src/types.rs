use std::{collections::HashMap, fmt, str::FromStr};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ClientError;

/// <notification_id, pending alarm>
pub type AlarmMap = HashMap<i32, crate::alarms::PendingAlarm>;

/// <storage key, value>
pub type StorageMap = HashMap<String, String>;

/// A wall-clock time of day, rendered as 24-hour `HH:MM`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Result<ClockTime, ClientError> {
        if hour > 23 || minute > 59 {
            return Err(ClientError::validation(
                "time",
                format!("{hour:02}:{minute:02} is not a valid time of day"),
            ));
        }
        Ok(ClockTime { hour, minute })
    }

    /// Top of the given hour, wrapped into a single day.
    pub fn on_the_hour(hour: u32) -> ClockTime {
        ClockTime { hour: (hour % 24) as u8, minute: 0 }
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ClockTime {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ClientError::validation("time", format!("expected HH:MM, got {s:?}"));
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(invalid());
        }
        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        ClockTime::new(hour, minute)
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Device tag sent alongside a push token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Web,
    Android,
    Ios,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Web => "web",
            DeviceType::Android => "android",
            DeviceType::Ios => "ios",
        }
    }
}

impl FromStr for DeviceType {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "web" => Ok(DeviceType::Web),
            "android" => Ok(DeviceType::Android),
            "ios" => Ok(DeviceType::Ios),
            other => Err(ClientError::validation("device_type", format!("unknown device type {other:?}"))),
        }
    }
}
