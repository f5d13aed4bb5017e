//! Scheduling event types.
//!
//! These are the structured form of a VEVENT as far as scheduling cares:
//! identity (UID), ordering (SEQUENCE, DTSTAMP), timing, and the
//! organizer/attendee list with participation state.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::participation::ParticipationStatus;

/// A calendar event as exchanged in scheduling messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub uid: String,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    pub status: EventStatus,
    /// Whether event blocks time (OPAQUE) or is free (TRANSPARENT)
    pub transparency: Transparency,

    /// Creation time of this particular message/revision (DTSTAMP)
    pub dtstamp: DateTime<Utc>,
    /// Organizer revision counter (SEQUENCE)
    pub sequence: i64,

    pub organizer: Option<CalendarUser>,
    pub attendees: Vec<Attendee>,
}

impl Event {
    /// New unscheduled event with a fresh UID.
    pub fn new(summary: impl Into<String>, start: EventTime, end: EventTime) -> Self {
        Event {
            uid: format!("{}@calsched", uuid::Uuid::new_v4()),
            summary: summary.into(),
            description: None,
            location: None,
            start,
            end,
            status: EventStatus::Confirmed,
            transparency: Transparency::Opaque,
            dtstamp: Utc::now(),
            sequence: 0,
            organizer: None,
            attendees: Vec::new(),
        }
    }

    pub fn attendee(&self, address: &str) -> Option<&Attendee> {
        self.attendees.iter().find(|a| same_address(&a.email, address))
    }

    pub fn attendee_mut(&mut self, address: &str) -> Option<&mut Attendee> {
        self.attendees
            .iter_mut()
            .find(|a| same_address(&a.email, address))
    }

    pub fn is_organized_by(&self, address: &str) -> bool {
        self.organizer
            .as_ref()
            .is_some_and(|o| same_address(&o.email, address))
    }

    /// Whether this event occupies time for free/busy purposes.
    pub fn is_busy(&self) -> bool {
        self.transparency == Transparency::Opaque && self.status != EventStatus::Cancelled
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary)
    }
}

/// A calendar user address with an optional common name (ORGANIZER, ATTENDEE value).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarUser {
    pub name: Option<String>,
    /// Scheduling address, stored without the `mailto:` prefix
    pub email: String,
}

impl CalendarUser {
    pub fn new(name: Option<String>, email: impl AsRef<str>) -> Self {
        CalendarUser {
            name,
            email: strip_mailto(email.as_ref()).to_string(),
        }
    }

    pub fn mailto(&self) -> String {
        format!("mailto:{}", self.email)
    }
}

impl fmt::Display for CalendarUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} <{}>", name, self.email),
            None => write!(f, "{}", self.email),
        }
    }
}

/// An event attendee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendee {
    pub name: Option<String>,
    pub email: String,
    pub partstat: ParticipationStatus,
    pub role: AttendeeRole,
    pub rsvp: bool,
    /// Server delivery status (SCHEDULE-STATUS, RFC 6638 §7.3), e.g. "1.2"
    pub schedule_status: Option<String>,
    /// DTSTAMP of the reply that set `partstat`, tracked on the organizer's copy
    pub replied_at: Option<DateTime<Utc>>,
}

impl Attendee {
    /// Fresh invitee awaiting an answer.
    pub fn invited(user: CalendarUser) -> Self {
        Attendee {
            name: user.name,
            email: user.email,
            partstat: ParticipationStatus::NeedsAction,
            role: AttendeeRole::Required,
            rsvp: true,
            schedule_status: None,
            replied_at: None,
        }
    }

    pub fn user(&self) -> CalendarUser {
        CalendarUser {
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendeeRole {
    Chair,
    Required,
    Optional,
    NonParticipant,
}

impl AttendeeRole {
    pub fn as_ics_str(&self) -> &'static str {
        match self {
            AttendeeRole::Chair => "CHAIR",
            AttendeeRole::Required => "REQ-PARTICIPANT",
            AttendeeRole::Optional => "OPT-PARTICIPANT",
            AttendeeRole::NonParticipant => "NON-PARTICIPANT",
        }
    }

    pub fn from_ics_str(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "CHAIR" => AttendeeRole::Chair,
            "OPT-PARTICIPANT" => AttendeeRole::Optional,
            "NON-PARTICIPANT" => AttendeeRole::NonParticipant,
            // REQ-PARTICIPANT is the RFC 5545 default
            _ => AttendeeRole::Required,
        }
    }
}

/// Event transparency (busy/free status)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transparency {
    Opaque,
    Transparent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

/// Start/end value of an event, preserving how it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventTime {
    Date(NaiveDate),
    DateTimeUtc(DateTime<Utc>),
    DateTimeFloating(NaiveDateTime),
    DateTimeZoned {
        datetime: NaiveDateTime,
        tzid: String,
    },
}

impl EventTime {
    /// Resolve to an instant. Dates start at midnight UTC and floating times
    /// are read as UTC; an unknown TZID yields None.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            EventTime::Date(d) => d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
            EventTime::DateTimeUtc(dt) => Some(*dt),
            EventTime::DateTimeFloating(dt) => Some(dt.and_utc()),
            EventTime::DateTimeZoned { datetime, tzid } => {
                let tz: chrono_tz::Tz = tzid.parse().ok()?;
                tz.from_local_datetime(datetime)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
            }
        }
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTime::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            EventTime::DateTimeUtc(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M UTC")),
            EventTime::DateTimeFloating(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M")),
            EventTime::DateTimeZoned { datetime, tzid } => {
                write!(f, "{} ({})", datetime.format("%Y-%m-%d %H:%M"), tzid)
            }
        }
    }
}

/// Strip a leading `mailto:` (any case) from a calendar user address.
pub fn strip_mailto(address: &str) -> &str {
    let trimmed = address.trim();
    match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("mailto:") => &trimmed[7..],
        _ => trimmed,
    }
}

/// Compare two calendar user addresses the way servers do: case-insensitive,
/// ignoring the `mailto:` scheme.
pub fn same_address(a: &str, b: &str) -> bool {
    strip_mailto(a).eq_ignore_ascii_case(strip_mailto(b))
}
