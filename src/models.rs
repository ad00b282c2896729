use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ClientError;
use crate::timing::{self, TreatmentProgress};
use crate::types::{ClockTime, DeviceType};

const DAYS_PER_WEEK: u32 = 7;
const DAYS_PER_MONTH: u32 = 30;

#[derive(Serialize, Clone, Debug)]
pub struct Credentials {
    pub phone: String,
    pub password: String,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: i64,
    pub phone: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Days,
    Weeks,
    Months,
}

impl DurationUnit {
    pub fn days(&self) -> u32 {
        match self {
            DurationUnit::Days => 1,
            DurationUnit::Weeks => DAYS_PER_WEEK,
            DurationUnit::Months => DAYS_PER_MONTH,
        }
    }
}

/// User-confirmed dosage. Presented as immutable once confirmed.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Dosage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pills_per_day: Option<f64>,
    #[serde(default, deserialize_with = "lenient_count", skip_serializing_if = "Option::is_none")]
    pub times_per_day: Option<u32>,
    #[serde(default, deserialize_with = "lenient_count", skip_serializing_if = "Option::is_none")]
    pub duration_days: Option<u32>,
    #[serde(default, deserialize_with = "lenient_count", skip_serializing_if = "Option::is_none")]
    pub duration_value: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_unit: Option<DurationUnit>,
}

/// Counts arrive as numbers, numeric strings or junk. Junk becomes `None`.
fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

impl Dosage {
    /// Total treatment length in days, if one was given.
    pub fn total_days(&self) -> Option<u32> {
        if let Some(days) = self.duration_days.filter(|d| *d > 0) {
            return Some(days);
        }
        let value = self.duration_value.filter(|v| *v > 0)?;
        let unit = self.duration_unit.unwrap_or(DurationUnit::Days);
        Some(value.saturating_mul(unit.days()))
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if let Some(pills) = self.pills_per_day {
            if !pills.is_finite() || pills <= 0.0 {
                return Err(ClientError::validation("pills_per_day", "Pills per day must be a positive number."));
            }
        }
        if self.times_per_day == Some(0) {
            return Err(ClientError::validation("times_per_day", "Dose frequency must be at least once a day."));
        }
        if self.duration_value.is_some() && self.duration_unit.is_none() {
            return Err(ClientError::validation("duration_unit", "Choose days, weeks or months."));
        }
        Ok(())
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Medication {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub dosage: Option<Dosage>,
    #[serde(default)]
    pub start_date: Option<String>,
}

impl Medication {
    pub fn times_per_day(&self) -> Option<u32> {
        self.dosage.as_ref().and_then(|d| d.times_per_day)
    }

    /// Treatment start as epoch milliseconds. Accepts `YYYY-MM-DD` (midnight UTC) or RFC 3339.
    pub fn start_millis(&self) -> Option<i64> {
        let raw = self.start_date.as_deref()?.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.timestamp_millis());
        }
        let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
        Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis())
    }

    pub fn treatment_progress(&self, now: DateTime<Utc>) -> TreatmentProgress {
        let duration = self.dosage.as_ref().and_then(Dosage::total_days);
        match self.start_millis() {
            Some(start) => timing::treatment_progress(start, duration, now.timestamp_millis()),
            None => TreatmentProgress::Unspecified,
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct NewMedication {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dosage: Option<Dosage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
}

impl NewMedication {
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.name.trim().is_empty() {
            return Err(ClientError::validation("name", "Enter the medication name."));
        }
        if let Some(dosage) = &self.dosage {
            dosage.validate()?;
        }
        if let Some(start) = &self.start_date {
            NaiveDate::parse_from_str(start.trim(), "%Y-%m-%d")
                .map_err(|_| ClientError::validation("start_date", "Use the YYYY-MM-DD format."))?;
        }
        Ok(())
    }
}

/// All the time slots for one medication.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Reminder {
    pub id: i64,
    pub medication_id: i64,
    pub times: Vec<ClockTime>,
    pub enabled: bool,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct NewReminder {
    pub medication_id: i64,
    pub times: Vec<ClockTime>,
    pub enabled: bool,
}

impl NewReminder {
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.times.is_empty() {
            return Err(ClientError::validation("times", "Pick at least one reminder time."));
        }
        let mut sorted = self.times.clone();
        sorted.sort();
        sorted.dedup();
        if sorted.len() != self.times.len() {
            return Err(ClientError::validation("times", "Reminder times must not repeat."));
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct AdherenceStats {
    pub expected_doses: u32,
    pub taken_doses: u32,
    pub missed_doses: u32,
    pub adherence_rate: f64,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct RegisterTokenRequest {
    pub token: String,
    pub device_type: DeviceType,
}

#[derive(Serialize, Clone, Debug)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub message: String,
}

impl ContactMessage {
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.name.trim().is_empty() {
            return Err(ClientError::validation("name", "Enter your name."));
        }
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
            _ => return Err(ClientError::validation("email", "Enter a valid email address.")),
        }
        if self.message.trim().is_empty() {
            return Err(ClientError::validation("message", "Write a message."));
        }
        Ok(())
    }
}
