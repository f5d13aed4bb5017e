//! iTIP scheduling messages (RFC 5546) as they appear in a scheduling inbox.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::event::Event;
use crate::store::RevisionToken;

/// iTIP METHOD of a calendar object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItipMethod {
    Publish,
    Request,
    Reply,
    Add,
    Cancel,
    Refresh,
    Counter,
    DeclineCounter,
    Other(String),
}

impl ItipMethod {
    pub fn as_ics_str(&self) -> &str {
        match self {
            ItipMethod::Publish => "PUBLISH",
            ItipMethod::Request => "REQUEST",
            ItipMethod::Reply => "REPLY",
            ItipMethod::Add => "ADD",
            ItipMethod::Cancel => "CANCEL",
            ItipMethod::Refresh => "REFRESH",
            ItipMethod::Counter => "COUNTER",
            ItipMethod::DeclineCounter => "DECLINECOUNTER",
            ItipMethod::Other(s) => s,
        }
    }

    pub fn from_ics_str(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "PUBLISH" => ItipMethod::Publish,
            "REQUEST" => ItipMethod::Request,
            "REPLY" => ItipMethod::Reply,
            "ADD" => ItipMethod::Add,
            "CANCEL" => ItipMethod::Cancel,
            "REFRESH" => ItipMethod::Refresh,
            "COUNTER" => ItipMethod::Counter,
            "DECLINECOUNTER" => ItipMethod::DeclineCounter,
            other => ItipMethod::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ItipMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ics_str())
    }
}

/// A parsed calendar object: the optional METHOD plus its event.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleObject {
    pub method: Option<ItipMethod>,
    pub event: Event,
}

/// What an inbox message asks of its recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Invite,
    Reply,
    Cancellation,
    Other,
}

impl MessageKind {
    /// Classify by METHOD, then check the message carries what that method
    /// requires. Anything malformed falls back to `Other`.
    pub fn classify(method: Option<&ItipMethod>, event: &Event) -> Self {
        match method {
            Some(ItipMethod::Request) | Some(ItipMethod::Add)
                if event.organizer.is_some() && !event.attendees.is_empty() =>
            {
                MessageKind::Invite
            }
            Some(ItipMethod::Reply) if !event.attendees.is_empty() => MessageKind::Reply,
            Some(ItipMethod::Cancel) if event.organizer.is_some() => MessageKind::Cancellation,
            _ => MessageKind::Other,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MessageKind::Invite => "invite",
            MessageKind::Reply => "reply",
            MessageKind::Cancellation => "cancellation",
            MessageKind::Other => "other",
        };
        f.write_str(label)
    }
}

/// A scheduling message found in a principal's inbox.
#[derive(Debug, Clone, PartialEq)]
pub struct InboxItem {
    pub href: String,
    /// Revision read at triage time; deleting the item is conditional on it.
    pub revision: RevisionToken,
    pub method: Option<ItipMethod>,
    pub kind: MessageKind,
    pub event: Event,
}

impl InboxItem {
    pub fn new(href: String, revision: RevisionToken, object: ScheduleObject) -> Self {
        let kind = MessageKind::classify(object.method.as_ref(), &object.event);
        InboxItem {
            href,
            revision,
            method: object.method,
            kind,
            event: object.event,
        }
    }

    pub fn uid(&self) -> &str {
        &self.event.uid
    }

    pub fn is_invite(&self) -> bool {
        self.kind == MessageKind::Invite
    }

    pub fn is_reply(&self) -> bool {
        self.kind == MessageKind::Reply
    }

    pub fn is_cancellation(&self) -> bool {
        self.kind == MessageKind::Cancellation
    }

    pub fn is_other(&self) -> bool {
        self.kind == MessageKind::Other
    }

    pub fn method_label(&self) -> &str {
        self.method.as_ref().map(|m| m.as_ics_str()).unwrap_or("(none)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Attendee, CalendarUser, EventTime};
    use chrono::{TimeZone, Utc};

    fn make_event() -> Event {
        Event::new(
            "Planning",
            EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2025, 3, 20, 15, 0, 0).unwrap()),
            EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2025, 3, 20, 16, 0, 0).unwrap()),
        )
    }

    #[test]
    fn test_request_without_attendees_is_not_an_invite() {
        let mut event = make_event();
        event.organizer = Some(CalendarUser::new(None, "org@example.com"));
        assert_eq!(
            MessageKind::classify(Some(&ItipMethod::Request), &event),
            MessageKind::Other
        );

        event
            .attendees
            .push(Attendee::invited(CalendarUser::new(None, "a@example.com")));
        assert_eq!(
            MessageKind::classify(Some(&ItipMethod::Request), &event),
            MessageKind::Invite
        );
    }

    #[test]
    fn test_classification_by_method() {
        let mut event = make_event();
        event.organizer = Some(CalendarUser::new(None, "org@example.com"));
        event
            .attendees
            .push(Attendee::invited(CalendarUser::new(None, "a@example.com")));

        assert_eq!(
            MessageKind::classify(Some(&ItipMethod::Reply), &event),
            MessageKind::Reply
        );
        assert_eq!(
            MessageKind::classify(Some(&ItipMethod::Cancel), &event),
            MessageKind::Cancellation
        );
        assert_eq!(
            MessageKind::classify(Some(&ItipMethod::Counter), &event),
            MessageKind::Other
        );
        assert_eq!(MessageKind::classify(None, &event), MessageKind::Other);
    }

    #[test]
    fn test_unknown_method_is_preserved() {
        let method = ItipMethod::from_ics_str("x-poll");
        assert_eq!(method, ItipMethod::Other("X-POLL".to_string()));
        assert_eq!(method.as_ics_str(), "X-POLL");
    }
}
