//! VFREEBUSY requests and replies.
//!
//! The icalendar builder has no VFREEBUSY component, so these are written
//! line by line and folded at 75 octets.

use chrono::{DateTime, Utc};
use icalendar::{
    DatePerhapsTime,
    parser::{Property, read_calendar, unfold},
};

use crate::error::{SchedError, SchedResult};
use crate::event::CalendarUser;
use crate::freebusy::{BusyInterval, BusyKind, FreeBusyMessage, FreeBusyRequest, TimeRange};
use crate::message::ItipMethod;

use super::parse::{param, parse_calendar_user, parse_duration, to_event_time};
use super::{PRODID, format_utc, parse_utc};

/// METHOD:REQUEST body for a free/busy POST to the outbox.
pub fn generate_freebusy_request(request: &FreeBusyRequest) -> String {
    let mut out = FoldedWriter::begin(&ItipMethod::Request);
    out.line(&format!("UID:{}", request.uid));
    out.line(&format!("DTSTAMP:{}", format_utc(&request.dtstamp)));
    out.line(&format!("DTSTART:{}", format_utc(&request.range.start)));
    out.line(&format!("DTEND:{}", format_utc(&request.range.end)));
    out.line(&calendar_user_line("ORGANIZER", &request.organizer));
    for attendee in &request.attendees {
        out.line(&calendar_user_line("ATTENDEE", attendee));
    }
    out.end()
}

/// METHOD:REPLY body with one attendee's busy periods.
pub fn generate_freebusy_reply(
    request: &FreeBusyMessage,
    attendee: &CalendarUser,
    range: &TimeRange,
    busy: &[BusyInterval],
) -> String {
    let mut out = FoldedWriter::begin(&ItipMethod::Reply);
    if let Some(ref uid) = request.uid {
        out.line(&format!("UID:{}", uid));
    }
    out.line(&format!("DTSTAMP:{}", format_utc(&Utc::now())));
    out.line(&format!("DTSTART:{}", format_utc(&range.start)));
    out.line(&format!("DTEND:{}", format_utc(&range.end)));
    if let Some(ref organizer) = request.organizer {
        out.line(&calendar_user_line("ORGANIZER", organizer));
    }
    out.line(&calendar_user_line("ATTENDEE", attendee));
    for interval in busy {
        out.line(&format!(
            "FREEBUSY;FBTYPE={}:{}/{}",
            interval.kind.as_fbtype(),
            format_utc(&interval.start),
            format_utc(&interval.end)
        ));
    }
    out.end()
}

/// Parse a calendar object holding a VFREEBUSY.
pub fn parse_freebusy(content: &str) -> SchedResult<FreeBusyMessage> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|e| SchedError::IcsParse(e.to_string()))?;

    let method = calendar
        .properties
        .iter()
        .find(|p| p.name == "METHOD")
        .map(|p| ItipMethod::from_ics_str(p.val.as_ref()));

    let vfreebusy = calendar
        .components
        .iter()
        .find(|c| c.name == "VFREEBUSY")
        .ok_or_else(|| SchedError::IcsParse("no VFREEBUSY component".to_string()))?;

    let start = vfreebusy.find_prop("DTSTART").and_then(utc_property);
    let end = vfreebusy.find_prop("DTEND").and_then(utc_property);
    let range = match (start, end) {
        (Some(start), Some(end)) => Some(TimeRange::new(start, end)?),
        _ => None,
    };

    let mut busy = Vec::new();
    for prop in vfreebusy.properties.iter().filter(|p| p.name == "FREEBUSY") {
        let Some(kind) = BusyKind::from_fbtype(&param(prop, "FBTYPE").unwrap_or_default())
        else {
            continue;
        };
        for period in prop.val.as_ref().split(',') {
            let (start, end) = parse_period(period)?;
            busy.push(BusyInterval { start, end, kind });
        }
    }

    Ok(FreeBusyMessage {
        method,
        uid: vfreebusy.find_prop("UID").map(|p| p.val.to_string()),
        organizer: vfreebusy.find_prop("ORGANIZER").map(parse_calendar_user),
        attendees: vfreebusy
            .properties
            .iter()
            .filter(|p| p.name == "ATTENDEE")
            .map(parse_calendar_user)
            .collect(),
        range,
        busy,
    })
}

fn utc_property(prop: &Property) -> Option<DateTime<Utc>> {
    DatePerhapsTime::try_from(prop)
        .ok()
        .map(to_event_time)
        .and_then(|t| t.to_utc())
}

/// `start/end` or `start/duration` (RFC 5545 §3.3.9), both in UTC.
fn parse_period(period: &str) -> SchedResult<(DateTime<Utc>, DateTime<Utc>)> {
    let invalid = || SchedError::IcsParse(format!("invalid FREEBUSY period '{}'", period));

    let (start, rest) = period.trim().split_once('/').ok_or_else(invalid)?;
    let start = parse_utc(start).ok_or_else(invalid)?;
    let end = if rest.starts_with('P') || rest.starts_with("+P") {
        let duration = parse_duration(rest).ok_or_else(invalid)?;
        start.checked_add_signed(duration).ok_or_else(invalid)?
    } else {
        parse_utc(rest).ok_or_else(invalid)?
    };
    Ok((start, end))
}

fn calendar_user_line(name: &str, user: &CalendarUser) -> String {
    match user.name {
        Some(ref cn) if cn.contains([':', ';', ',']) => {
            format!("{};CN=\"{}\":{}", name, cn.replace('"', "'"), user.mailto())
        }
        Some(ref cn) => format!("{};CN={}:{}", name, cn, user.mailto()),
        None => format!("{}:{}", name, user.mailto()),
    }
}

struct FoldedWriter {
    out: String,
}

impl FoldedWriter {
    fn begin(method: &ItipMethod) -> Self {
        let mut writer = FoldedWriter { out: String::new() };
        writer.line("BEGIN:VCALENDAR");
        writer.line("VERSION:2.0");
        writer.line(&format!("PRODID:{}", PRODID));
        writer.line(&format!("METHOD:{}", method));
        writer.line("BEGIN:VFREEBUSY");
        writer
    }

    /// Write one content line, folding at 75 octets on char boundaries.
    fn line(&mut self, line: &str) {
        let mut width = 0;
        for c in line.chars() {
            if width + c.len_utf8() > 75 {
                self.out.push_str("\r\n ");
                width = 1;
            }
            self.out.push(c);
            width += c.len_utf8();
        }
        self.out.push_str("\r\n");
    }

    fn end(mut self) -> String {
        self.line("END:VFREEBUSY");
        self.line("END:VCALENDAR");
        self.out
    }
}
