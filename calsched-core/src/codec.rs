//! The codec seam between calendar text and structured objects.

use std::sync::Arc;

use crate::error::SchedResult;
use crate::event::Event;
use crate::freebusy::{FreeBusyMessage, FreeBusyRequest};
use crate::message::{ItipMethod, ScheduleObject};

/// Parses and serializes scheduling objects.
///
/// [`crate::ics::IcsCodec`] is the iCalendar implementation.
pub trait EventCodec: Send + Sync {
    /// Parse a calendar object with one event. Malformed text is
    /// `SchedError::IcsParse`.
    fn parse(&self, text: &str) -> SchedResult<ScheduleObject>;

    fn serialize(&self, event: &Event, method: Option<&ItipMethod>) -> SchedResult<String>;

    fn serialize_freebusy_request(&self, request: &FreeBusyRequest) -> SchedResult<String>;

    fn parse_freebusy(&self, text: &str) -> SchedResult<FreeBusyMessage>;
}

pub type SharedCodec = Arc<dyn EventCodec>;
