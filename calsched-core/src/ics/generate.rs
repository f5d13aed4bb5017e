//! ICS generation for scheduled events.

use icalendar::{Calendar, Component, EventLike, Property, ValueType};

use crate::error::SchedResult;
use crate::event::{Attendee, CalendarUser, Event, EventStatus, EventTime, Transparency};
use crate::message::ItipMethod;

use super::{PRODID, REPLIED_PARAM, format_utc};

/// Generate .ics content for an event, optionally as an iTIP message.
pub fn generate_ics(event: &Event, method: Option<&ItipMethod>) -> SchedResult<String> {
    let mut cal = Calendar::new();

    let mut ics_event = icalendar::Event::new();
    ics_event.uid(&event.uid);
    ics_event.summary(&event.summary);
    ics_event.add_property("DTSTAMP", format_utc(&event.dtstamp));
    ics_event.add_property("SEQUENCE", event.sequence.to_string());

    add_datetime_property(&mut ics_event, "DTSTART", &event.start);
    add_datetime_property(&mut ics_event, "DTEND", &event.end);

    if let Some(ref desc) = event.description {
        ics_event.description(desc);
    }

    if let Some(ref loc) = event.location {
        ics_event.location(loc);
    }

    // Status - only emit if not CONFIRMED (the implied default)
    match event.status {
        EventStatus::Confirmed => {}
        EventStatus::Tentative => {
            ics_event.add_property("STATUS", "TENTATIVE");
        }
        EventStatus::Cancelled => {
            ics_event.add_property("STATUS", "CANCELLED");
        }
    }

    // TRANSP - only emit if TRANSPARENT (OPAQUE is the default)
    if event.transparency == Transparency::Transparent {
        ics_event.add_property("TRANSP", "TRANSPARENT");
    }

    if let Some(ref org) = event.organizer {
        ics_event.append_property(calendar_user_property("ORGANIZER", org));
    }

    // ATTENDEE (multi-property - can appear multiple times)
    for attendee in &event.attendees {
        ics_event.append_multi_property(attendee_property(attendee));
    }

    let ics_event = ics_event.done();
    cal.push(ics_event);
    let cal = cal.done();

    Ok(finish_ics(&cal.to_string(), method))
}

fn calendar_user_property(name: &str, user: &CalendarUser) -> Property {
    let mut prop = Property::new(name, user.mailto());
    if let Some(ref cn) = user.name {
        prop.add_parameter("CN", cn);
    }
    prop
}

fn attendee_property(attendee: &Attendee) -> Property {
    let mut prop = calendar_user_property("ATTENDEE", &attendee.user());
    prop.add_parameter("PARTSTAT", attendee.partstat.as_ics_str());
    prop.add_parameter("ROLE", attendee.role.as_ics_str());
    if attendee.rsvp {
        prop.add_parameter("RSVP", "TRUE");
    }
    if let Some(ref status) = attendee.schedule_status {
        prop.add_parameter("SCHEDULE-STATUS", status);
    }
    if let Some(ref replied_at) = attendee.replied_at {
        prop.add_parameter(REPLIED_PARAM, &format_utc(replied_at));
    }
    prop
}

/// Clean up ICS output from the icalendar crate and add the METHOD
/// - Replace PRODID with ours
/// - Remove CALSCALE:GREGORIAN (it's the default)
/// - Insert METHOD right after VERSION
fn finish_ics(ics: &str, method: Option<&ItipMethod>) -> String {
    let mut result = String::with_capacity(ics.len() + 32);

    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str("PRODID:");
            result.push_str(PRODID);
            result.push_str("\r\n");
            continue;
        }

        if line == "CALSCALE:GREGORIAN" || line.starts_with("METHOD:") {
            continue;
        }

        result.push_str(line);
        result.push_str("\r\n");

        if line == "VERSION:2.0"
            && let Some(method) = method
        {
            result.push_str("METHOD:");
            result.push_str(method.as_ics_str());
            result.push_str("\r\n");
        }
    }

    result
}

/// Add a datetime property with proper formatting based on EventTime variant
fn add_datetime_property(ics_event: &mut icalendar::Event, name: &str, time: &EventTime) {
    match time {
        EventTime::Date(d) => {
            let mut prop = Property::new(name, d.format("%Y%m%d").to_string());
            prop.append_parameter(ValueType::Date);
            ics_event.append_property(prop);
        }
        EventTime::DateTimeUtc(dt) => {
            ics_event.add_property(name, format_utc(dt));
        }
        EventTime::DateTimeFloating(dt) => {
            ics_event.add_property(name, dt.format("%Y%m%dT%H%M%S").to_string());
        }
        EventTime::DateTimeZoned { datetime, tzid } => {
            let mut prop = Property::new(name, datetime.format("%Y%m%dT%H%M%S").to_string());
            prop.add_parameter("TZID", tzid);
            ics_event.append_property(prop);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ics::parse_schedule_object;
    use crate::participation::ParticipationStatus;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn make_test_event() -> Event {
        let mut event = Event::new(
            "Test Event",
            EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2025, 3, 20, 15, 0, 0).unwrap()),
            EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2025, 3, 20, 16, 0, 0).unwrap()),
        );
        event.uid = "test-event-123@calsched".to_string();
        event.dtstamp = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        event
    }

    #[test]
    fn test_method_is_inserted_after_version() {
        let ics = generate_ics(&make_test_event(), Some(&ItipMethod::Request)).unwrap();
        let lines: Vec<&str> = ics.lines().collect();
        let version = lines.iter().position(|l| *l == "VERSION:2.0").unwrap();
        assert_eq!(lines[version + 1], "METHOD:REQUEST");
        assert!(ics.contains("PRODID:-//calsched//calsched//EN"));
        assert!(!ics.contains("CALSCALE"));

        let plain = generate_ics(&make_test_event(), None).unwrap();
        assert!(!plain.contains("METHOD:"));
    }

    #[test]
    fn test_scheduling_fields_survive_reparse() {
        let mut event = make_test_event();
        event.sequence = 3;
        event.organizer = Some(CalendarUser::new(Some("Alice".into()), "alice@example.com"));

        let mut bob = Attendee::invited(CalendarUser::new(Some("Bob".into()), "bob@example.com"));
        bob.partstat = ParticipationStatus::Accepted;
        bob.schedule_status = Some("2.0".to_string());
        bob.replied_at = Some(Utc.with_ymd_and_hms(2025, 3, 2, 8, 0, 0).unwrap());
        event.attendees.push(bob);
        event
            .attendees
            .push(Attendee::invited(CalendarUser::new(None, "carol@example.com")));

        let ics = generate_ics(&event, Some(&ItipMethod::Reply)).unwrap();
        let parsed = parse_schedule_object(&ics).unwrap();

        assert_eq!(parsed.method, Some(ItipMethod::Reply));
        assert_eq!(parsed.event.uid, event.uid);
        assert_eq!(parsed.event.sequence, 3);
        assert_eq!(parsed.event.dtstamp, event.dtstamp);
        assert_eq!(parsed.event.organizer, event.organizer);
        assert_eq!(parsed.event.attendees, event.attendees);
    }

    #[test]
    fn test_all_day_and_zoned_times() {
        let mut event = make_test_event();
        event.start = EventTime::Date(NaiveDate::from_ymd_opt(2025, 3, 20).unwrap());
        event.end = EventTime::DateTimeZoned {
            datetime: NaiveDate::from_ymd_opt(2025, 3, 21)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            tzid: "Europe/Oslo".to_string(),
        };

        let ics = generate_ics(&event, None).unwrap();
        assert!(ics.contains("DTSTART;VALUE=DATE:20250320"));
        assert!(ics.contains("DTEND;TZID=Europe/Oslo:20250321T090000"));
    }
}
