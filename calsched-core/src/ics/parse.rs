//! ICS parsing using the icalendar crate's parser.

use chrono::{DateTime, Days, Duration, Utc};
use icalendar::{
    DatePerhapsTime,
    parser::{Component, Property, read_calendar, unfold},
};

use crate::error::{SchedError, SchedResult};
use crate::event::{
    Attendee, AttendeeRole, CalendarUser, Event, EventStatus, EventTime, Transparency,
};
use crate::message::{ItipMethod, ScheduleObject};
use crate::participation::ParticipationStatus;

use super::{REPLIED_PARAM, parse_utc};

/// Parse a calendar object holding one VEVENT, plus its METHOD if any.
pub fn parse_schedule_object(content: &str) -> SchedResult<ScheduleObject> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|e| SchedError::IcsParse(e.to_string()))?;

    let method = calendar
        .properties
        .iter()
        .find(|p| p.name == "METHOD")
        .map(|p| ItipMethod::from_ics_str(p.val.as_ref()));

    let vevent = calendar
        .components
        .iter()
        .find(|c| c.name == "VEVENT")
        .ok_or_else(|| SchedError::IcsParse("no VEVENT component".to_string()))?;

    let event = parse_vevent(vevent)?;
    Ok(ScheduleObject { method, event })
}

fn parse_vevent(vevent: &Component) -> SchedResult<Event> {
    let uid = vevent
        .find_prop("UID")
        .map(|p| p.val.to_string())
        .ok_or_else(|| SchedError::IcsParse("VEVENT without UID".to_string()))?;

    let summary = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_else(|| "(No title)".to_string());

    let start = vevent
        .find_prop("DTSTART")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_event_time)
        .ok_or_else(|| SchedError::IcsParse(format!("{}: missing or invalid DTSTART", uid)))?;

    let end = match vevent.find_prop("DTEND") {
        Some(prop) => DatePerhapsTime::try_from(prop)
            .map(to_event_time)
            .map_err(|_| SchedError::IcsParse(format!("{}: invalid DTEND", uid)))?,
        None => implied_end(&uid, &start, vevent.find_prop("DURATION"))?,
    };

    let description = vevent.find_prop("DESCRIPTION").map(|p| p.val.to_string());
    let location = vevent.find_prop("LOCATION").map(|p| p.val.to_string());
    let sequence = vevent
        .find_prop("SEQUENCE")
        .and_then(|p| p.val.as_ref().trim().parse().ok())
        .unwrap_or(0);

    // DTSTAMP is required by RFC 5545; a missing one sorts before any real reply.
    let dtstamp = vevent
        .find_prop("DTSTAMP")
        .and_then(|p| parse_utc(p.val.as_ref()))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let status = vevent
        .find_prop("STATUS")
        .map(|p| match p.val.as_ref() {
            "TENTATIVE" => EventStatus::Tentative,
            "CANCELLED" => EventStatus::Cancelled,
            _ => EventStatus::Confirmed,
        })
        .unwrap_or(EventStatus::Confirmed);

    let transparency = vevent
        .find_prop("TRANSP")
        .map(|p| {
            if p.val == "TRANSPARENT" {
                Transparency::Transparent
            } else {
                Transparency::Opaque
            }
        })
        .unwrap_or(Transparency::Opaque);

    let organizer = vevent.find_prop("ORGANIZER").map(parse_calendar_user);
    let attendees: Vec<Attendee> = vevent
        .properties
        .iter()
        .filter(|p| p.name == "ATTENDEE")
        .map(parse_attendee)
        .collect();

    Ok(Event {
        uid,
        summary,
        description,
        location,
        start,
        end,
        status,
        transparency,
        dtstamp,
        sequence,
        organizer,
        attendees,
    })
}

/// Convert icalendar's DatePerhapsTime to our EventTime, preserving timezone info
pub(super) fn to_event_time(dpt: DatePerhapsTime) -> EventTime {
    match dpt {
        DatePerhapsTime::Date(d) => EventTime::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            icalendar::CalendarDateTime::Utc(dt) => EventTime::DateTimeUtc(dt),
            icalendar::CalendarDateTime::Floating(naive) => EventTime::DateTimeFloating(naive),
            icalendar::CalendarDateTime::WithTimezone { date_time, tzid } => {
                EventTime::DateTimeZoned {
                    datetime: date_time,
                    tzid,
                }
            }
        },
    }
}

/// End of an event without DTEND (RFC 5545 §3.6.1): start + DURATION, one
/// day for all-day events, otherwise the start itself.
fn implied_end(
    uid: &str,
    start: &EventTime,
    duration: Option<&Property>,
) -> SchedResult<EventTime> {
    let duration = duration.and_then(|p| parse_duration(p.val.as_ref()));
    let overflow = || SchedError::IcsParse(format!("{}: DURATION out of range", uid));
    let end = match (start, duration) {
        (EventTime::Date(d), None) => EventTime::Date(d.succ_opt().unwrap_or(*d)),
        (EventTime::Date(d), Some(dur)) => {
            let days = Days::new(dur.num_days().unsigned_abs());
            EventTime::Date(d.checked_add_days(days).ok_or_else(overflow)?)
        }
        (EventTime::DateTimeUtc(dt), Some(dur)) => {
            EventTime::DateTimeUtc(dt.checked_add_signed(dur).ok_or_else(overflow)?)
        }
        (EventTime::DateTimeFloating(dt), Some(dur)) => {
            EventTime::DateTimeFloating(dt.checked_add_signed(dur).ok_or_else(overflow)?)
        }
        (EventTime::DateTimeZoned { datetime, tzid }, Some(dur)) => EventTime::DateTimeZoned {
            datetime: datetime.checked_add_signed(dur).ok_or_else(overflow)?,
            tzid: tzid.clone(),
        },
        (other, None) => other.clone(),
    };
    Ok(end)
}

/// Parse a positive ISO 8601 duration such as `PT1H30M` or `P1D`.
pub(super) fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim().trim_start_matches('+');
    let duration = iso8601::duration(value).ok()?;
    let std_duration: std::time::Duration = duration.into();
    Duration::from_std(std_duration).ok()
}

pub(super) fn param(prop: &Property, key: &str) -> Option<String> {
    prop.params
        .iter()
        .find(|p| p.key == key)
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()))
}

/// Parse ORGANIZER or ATTENDEE into the bare calendar user
pub(super) fn parse_calendar_user(prop: &Property) -> CalendarUser {
    CalendarUser::new(param(prop, "CN"), prop.val.as_ref())
}

fn parse_attendee(prop: &Property) -> Attendee {
    let user = parse_calendar_user(prop);

    // Unknown values read as NEEDS-ACTION (RFC 5545 §3.2.12 default)
    let partstat = param(prop, "PARTSTAT")
        .and_then(|v| ParticipationStatus::from_ics_str(&v))
        .unwrap_or(ParticipationStatus::NeedsAction);

    let role = param(prop, "ROLE")
        .map(|v| AttendeeRole::from_ics_str(&v))
        .unwrap_or(AttendeeRole::Required);

    let rsvp = param(prop, "RSVP").is_some_and(|v| v.eq_ignore_ascii_case("TRUE"));

    Attendee {
        name: user.name,
        email: user.email,
        partstat,
        role,
        rsvp,
        schedule_status: param(prop, "SCHEDULE-STATUS"),
        replied_at: param(prop, REPLIED_PARAM).and_then(|v| parse_utc(&v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    const INVITE: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//Example Corp.//CalDAV Server//EN\r\n\
METHOD:REQUEST\r\n\
BEGIN:VEVENT\r\n\
UID:planning-42@example.com\r\n\
DTSTAMP:20250301T120000Z\r\n\
SEQUENCE:2\r\n\
DTSTART;TZID=Europe/Oslo:20250320T150000\r\n\
DURATION:PT1H30M\r\n\
SUMMARY:Sprint planning\r\n\
ORGANIZER;CN=Alice:mailto:alice@example.com\r\n\
ATTENDEE;CN=Bob;PARTSTAT=NEEDS-ACTION;RSVP=TRUE;ROLE=REQ-PARTICIPANT:mailto:bob@example.com\r\n\
ATTENDEE;PARTSTAT=ACCEPTED;ROLE=CHAIR;SCHEDULE-STATUS=1.2:MAILTO:alice@example.com\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn test_parse_invite_with_method_and_duration() {
        let object = parse_schedule_object(INVITE).unwrap();
        assert_eq!(object.method, Some(ItipMethod::Request));

        let event = object.event;
        assert_eq!(event.uid, "planning-42@example.com");
        assert_eq!(event.sequence, 2);
        assert_eq!(
            event.dtstamp,
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(
            event.end,
            EventTime::DateTimeZoned {
                datetime: NaiveDate::from_ymd_opt(2025, 3, 20)
                    .unwrap()
                    .and_hms_opt(16, 30, 0)
                    .unwrap(),
                tzid: "Europe/Oslo".to_string(),
            }
        );

        let organizer = event.organizer.as_ref().unwrap();
        assert_eq!(organizer.email, "alice@example.com");
        assert_eq!(organizer.name.as_deref(), Some("Alice"));

        assert_eq!(event.attendees.len(), 2);
        let bob = event.attendee("bob@example.com").unwrap();
        assert_eq!(bob.partstat, ParticipationStatus::NeedsAction);
        assert!(bob.rsvp);
        assert_eq!(bob.schedule_status, None);

        let alice = event.attendee("alice@example.com").unwrap();
        assert_eq!(alice.role, AttendeeRole::Chair);
        assert_eq!(alice.schedule_status.as_deref(), Some("1.2"));
        assert!(!alice.rsvp);
    }

    #[test]
    fn test_missing_uid_is_an_error() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
DTSTART:20250320T150000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";
        assert!(matches!(
            parse_schedule_object(ics),
            Err(SchedError::IcsParse(_))
        ));
    }

    #[test]
    fn test_calendar_without_event_is_an_error() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VTODO\r\n\
UID:todo-1\r\n\
END:VTODO\r\n\
END:VCALENDAR\r\n";
        assert!(matches!(
            parse_schedule_object(ics),
            Err(SchedError::IcsParse(_))
        ));
    }

    #[test]
    fn test_all_day_event_without_dtend_lasts_one_day() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
UID:offsite@example.com\r\n\
DTSTAMP:20250301T120000Z\r\n\
DTSTART;VALUE=DATE:20250320\r\n\
SUMMARY:Offsite\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";
        let event = parse_schedule_object(ics).unwrap().event;
        assert_eq!(
            event.end,
            EventTime::Date(NaiveDate::from_ymd_opt(2025, 3, 21).unwrap())
        );
    }

    #[test]
    fn test_oversized_duration_is_a_parse_error() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
UID:forever@example.com\r\n\
DTSTAMP:20250301T120000Z\r\n\
DTSTART:20250320T100000Z\r\n\
DURATION:P99999999D\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";
        assert!(matches!(
            parse_schedule_object(ics),
            Err(SchedError::IcsParse(_))
        ));

        let all_day = ics.replace("DTSTART:20250320T100000Z", "DTSTART;VALUE=DATE:20250320");
        assert!(matches!(
            parse_schedule_object(&all_day),
            Err(SchedError::IcsParse(_))
        ));
    }
}
