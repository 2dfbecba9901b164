use core::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use gatepass_core::{CheckLogId, DomainError, DomainResult, Entity, PassId, UserId, VisitorId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    CheckIn,
    CheckOut,
}

impl CheckType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::CheckIn => "check_in",
            CheckType::CheckOut => "check_out",
        }
    }
}

impl FromStr for CheckType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check_in" => Ok(CheckType::CheckIn),
            "check_out" => Ok(CheckType::CheckOut),
            other => Err(DomainError::validation(format!("unknown check type '{other}'"))),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckMethod {
    #[default]
    QrScan,
    Manual,
    FacialRecognition,
}

impl CheckMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckMethod::QrScan => "qr_scan",
            CheckMethod::Manual => "manual",
            CheckMethod::FacialRecognition => "facial_recognition",
        }
    }
}

impl FromStr for CheckMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qr_scan" => Ok(CheckMethod::QrScan),
            "manual" => Ok(CheckMethod::Manual),
            "facial_recognition" => Ok(CheckMethod::FacialRecognition),
            other => Err(DomainError::validation(format!("unknown check method '{other}'"))),
        }
    }
}

/// Body temperature bounds accepted on a check-in, in °C.
pub const TEMPERATURE_RANGE: core::ops::RangeInclusive<f64> = 30.0..=45.0;

/// Operator-supplied details of a scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckEntry {
    pub location: Option<String>,
    #[serde(default)]
    pub method: CheckMethod,
    pub temperature: Option<f64>,
    pub notes: Option<String>,
    pub device_info: Option<String>,
}

impl CheckEntry {
    pub fn validate(&self) -> DomainResult<()> {
        match self.temperature {
            Some(t) if !TEMPERATURE_RANGE.contains(&t) => {
                Err(DomainError::validation("temperature must be between 30 and 45"))
            }
            _ => Ok(()),
        }
    }
}

/// Append-only audit record of a check-in or check-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckLog {
    pub id: CheckLogId,
    pub visitor_id: VisitorId,
    pub pass_id: PassId,
    #[serde(rename = "type")]
    pub kind: CheckType,
    pub timestamp: DateTime<Utc>,
    pub location: Option<String>,
    pub checked_by: UserId,
    pub method: CheckMethod,
    pub notes: Option<String>,
    pub temperature: Option<f64>,
    pub device_info: Option<String>,
}

impl Entity for CheckLog {
    type Id = CheckLogId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl CheckLog {
    pub fn record(
        kind: CheckType,
        visitor_id: VisitorId,
        pass_id: PassId,
        checked_by: UserId,
        entry: CheckEntry,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CheckLogId::new(),
            visitor_id,
            pass_id,
            kind,
            timestamp: now,
            location: entry.location,
            checked_by,
            method: entry.method,
            notes: entry.notes,
            // Check-outs carry no health telemetry.
            temperature: match kind {
                CheckType::CheckIn => entry.temperature,
                CheckType::CheckOut => None,
            },
            device_info: entry.device_info,
        }
    }
}

/// Trailing window in which a repeated check-in is treated as a duplicate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CheckWindow(Duration);

impl CheckWindow {
    pub const DEFAULT_HOURS: i64 = 24;

    pub fn hours(hours: i64) -> Self {
        Self(Duration::hours(hours))
    }

    /// Start of the window ending at `now`.
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.0
    }
}

impl Default for CheckWindow {
    fn default() -> Self {
        Self::hours(Self::DEFAULT_HOURS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_out_of_range_is_rejected() {
        let mut e = CheckEntry {
            temperature: Some(29.9),
            ..Default::default()
        };
        assert!(e.validate().is_err());
        e.temperature = Some(36.6);
        assert!(e.validate().is_ok());
        e.temperature = None;
        assert!(e.validate().is_ok());
    }

    #[test]
    fn check_out_drops_temperature() {
        let entry = CheckEntry {
            temperature: Some(37.0),
            location: Some("Lobby".to_string()),
            ..Default::default()
        };
        let log = CheckLog::record(
            CheckType::CheckOut,
            VisitorId::new(),
            PassId::new(),
            UserId::new(),
            entry,
            Utc::now(),
        );
        assert_eq!(log.temperature, None);
        assert_eq!(log.location.as_deref(), Some("Lobby"));
        assert_eq!(log.method, CheckMethod::QrScan);
    }

    #[test]
    fn log_serializes_kind_as_type() {
        let log = CheckLog::record(
            CheckType::CheckIn,
            VisitorId::new(),
            PassId::new(),
            UserId::new(),
            CheckEntry::default(),
            Utc::now(),
        );
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["type"], "check_in");
        assert_eq!(json["method"], "qr_scan");
    }

    #[test]
    fn default_window_is_a_day() {
        let now = Utc::now();
        assert_eq!(CheckWindow::default().since(now), now - Duration::hours(24));
    }
}
