//! ICS generation and parsing.
//!
//! This module reads and writes iCalendar objects (RFC 5545) carrying iTIP
//! scheduling messages (RFC 5546).

mod freebusy;
mod generate;
mod parse;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::codec::EventCodec;
use crate::error::SchedResult;
use crate::event::Event;
use crate::freebusy::{FreeBusyMessage, FreeBusyRequest};
use crate::message::{ItipMethod, ScheduleObject};

pub use freebusy::{generate_freebusy_reply, generate_freebusy_request, parse_freebusy};
pub use generate::generate_ics;
pub use parse::parse_schedule_object;

pub const PRODID: &str = "-//calsched//calsched//EN";

/// ATTENDEE parameter recording the DTSTAMP of the reply that set PARTSTAT.
pub const REPLIED_PARAM: &str = "X-CALSCHED-REPLIED";

/// `20250320T150000Z`
pub fn format_utc(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn parse_utc(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim().strip_suffix('Z')?;
    NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
        .ok()
        .map(|dt| dt.and_utc())
}

/// [`EventCodec`] backed by the icalendar crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct IcsCodec;

impl EventCodec for IcsCodec {
    fn parse(&self, text: &str) -> SchedResult<ScheduleObject> {
        parse_schedule_object(text)
    }

    fn serialize(&self, event: &Event, method: Option<&ItipMethod>) -> SchedResult<String> {
        generate_ics(event, method)
    }

    fn serialize_freebusy_request(&self, request: &FreeBusyRequest) -> SchedResult<String> {
        Ok(generate_freebusy_request(request))
    }

    fn parse_freebusy(&self, text: &str) -> SchedResult<FreeBusyMessage> {
        parse_freebusy(text)
    }
}
