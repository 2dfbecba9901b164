use core::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use gatepass_core::{AppointmentId, DomainError, DomainResult, Entity, UserId, VisitorId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Approved => "approved",
            AppointmentStatus::Rejected => "rejected",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AppointmentStatus::Pending),
            "approved" => Ok(AppointmentStatus::Approved),
            "rejected" => Ok(AppointmentStatus::Rejected),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            _ => Err(DomainError::validation("Invalid status")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAppointment {
    pub visitor_id: VisitorId,
    pub title: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub location: Option<String>,
    #[serde(default)]
    pub attendees: Vec<UserId>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub location: Option<String>,
    pub attendees: Option<Vec<UserId>>,
    pub notes: Option<String>,
}

/// A scheduled meeting between a visitor and their host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: AppointmentId,
    pub visitor_id: VisitorId,
    pub host_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    /// `HH:MM`, 24h clock.
    pub start_time: String,
    pub end_time: String,
    pub location: Option<String>,
    pub attendees: Vec<UserId>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Appointment {
    type Id = AppointmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn parse_clock(field: &str, value: &str) -> DomainResult<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| DomainError::validation(format!("{field} must be HH:MM")))
}

fn slot(start: &str, end: &str) -> DomainResult<(String, String)> {
    let s = parse_clock("startTime", start)?;
    let e = parse_clock("endTime", end)?;
    if e <= s {
        return Err(DomainError::validation("endTime must be after startTime"));
    }
    Ok((s.format("%H:%M").to_string(), e.format("%H:%M").to_string()))
}

fn title(value: &str) -> DomainResult<String> {
    let t = value.trim();
    if t.is_empty() {
        return Err(DomainError::validation("title is required"));
    }
    Ok(t.to_string())
}

impl Appointment {
    /// Schedule an appointment hosted by `host_id`. Starts `pending`.
    pub fn schedule(input: NewAppointment, host_id: UserId, now: DateTime<Utc>) -> DomainResult<Self> {
        let (start_time, end_time) = slot(&input.start_time, &input.end_time)?;
        Ok(Self {
            id: AppointmentId::new(),
            visitor_id: input.visitor_id,
            host_id,
            title: title(&input.title)?,
            description: input.description,
            date: input.date,
            start_time,
            end_time,
            location: input.location,
            attendees: dedup(input.attendees),
            status: AppointmentStatus::Pending,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply_update(&mut self, update: AppointmentUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        let (start_time, end_time) = slot(
            update.start_time.as_deref().unwrap_or(&self.start_time),
            update.end_time.as_deref().unwrap_or(&self.end_time),
        )?;
        if let Some(t) = update.title {
            self.title = title(&t)?;
        }
        if let Some(date) = update.date {
            self.date = date;
        }
        if update.description.is_some() {
            self.description = update.description;
        }
        if update.location.is_some() {
            self.location = update.location;
        }
        if let Some(attendees) = update.attendees {
            self.attendees = dedup(attendees);
        }
        if update.notes.is_some() {
            self.notes = update.notes;
        }
        self.start_time = start_time;
        self.end_time = end_time;
        self.updated_at = now;
        Ok(())
    }

    /// Record a status decision. `pending` cannot be set explicitly.
    pub fn set_status(&mut self, status: AppointmentStatus, now: DateTime<Utc>) -> DomainResult<()> {
        if status == AppointmentStatus::Pending {
            return Err(DomainError::validation("Invalid status"));
        }
        self.status = status;
        self.updated_at = now;
        Ok(())
    }

    pub fn involves(&self, user_id: UserId) -> bool {
        self.host_id == user_id || self.attendees.contains(&user_id)
    }
}

fn dedup(mut ids: Vec<UserId>) -> Vec<UserId> {
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(*id));
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> NewAppointment {
        NewAppointment {
            visitor_id: VisitorId::new(),
            title: "Quarterly sync".to_string(),
            description: None,
            date: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
            start_time: "9:30".to_string(),
            end_time: "10:15".to_string(),
            location: Some("Room 4".to_string()),
            attendees: vec![],
            notes: None,
        }
    }

    #[test]
    fn schedule_normalizes_clock_times() {
        let host = UserId::new();
        let a = Appointment::schedule(input(), host, Utc::now()).unwrap();
        assert_eq!(a.start_time, "09:30");
        assert_eq!(a.end_time, "10:15");
        assert_eq!(a.status, AppointmentStatus::Pending);
        assert!(a.involves(host));
    }

    #[test]
    fn schedule_rejects_inverted_or_malformed_slot() {
        let mut i = input();
        i.end_time = "09:00".to_string();
        assert_eq!(
            Appointment::schedule(i, UserId::new(), Utc::now()),
            Err(DomainError::validation("endTime must be after startTime"))
        );

        let mut i = input();
        i.start_time = "noon".to_string();
        assert!(Appointment::schedule(i, UserId::new(), Utc::now()).is_err());
    }

    #[test]
    fn update_revalidates_against_existing_slot() {
        let mut a = Appointment::schedule(input(), UserId::new(), Utc::now()).unwrap();
        let err = a
            .apply_update(
                AppointmentUpdate {
                    start_time: Some("11:00".to_string()),
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(a.start_time, "09:30");
    }

    #[test]
    fn attendees_are_deduplicated() {
        let u = UserId::new();
        let mut i = input();
        i.attendees = vec![u, u];
        let a = Appointment::schedule(i, UserId::new(), Utc::now()).unwrap();
        assert_eq!(a.attendees, vec![u]);
        assert!(a.involves(u));
    }

    #[test]
    fn pending_cannot_be_set_explicitly() {
        let mut a = Appointment::schedule(input(), UserId::new(), Utc::now()).unwrap();
        assert!(a.set_status(AppointmentStatus::Pending, Utc::now()).is_err());
        a.set_status(AppointmentStatus::Completed, Utc::now()).unwrap();
        assert_eq!(a.status, AppointmentStatus::Completed);
        assert_eq!("bogus".parse::<AppointmentStatus>(), Err(DomainError::validation("Invalid status")));
    }
}
