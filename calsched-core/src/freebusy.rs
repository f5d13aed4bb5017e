//! Free/busy queries across participants (RFC 6638 §5, VFREEBUSY).
//!
//! One VFREEBUSY REQUEST is POSTed to the organizer's outbox; the server
//! answers per recipient. Every participant asked for gets exactly one
//! [`FreeBusyReport`], either with known busy time or explicitly unknown.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::SharedCodec;
use crate::error::{SchedError, SchedResult};
use crate::event::{CalendarUser, same_address};
use crate::ics::IcsCodec;
use crate::message::ItipMethod;
use crate::principal::Principal;
use crate::store::SharedStore;

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> SchedResult<Self> {
        if start >= end {
            return Err(SchedError::InvalidTimeRange(format!(
                "start {} is not before end {}",
                start, end
            )));
        }
        Ok(TimeRange { start, end })
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end && self.start < end
    }

    /// The part of `[start, end)` inside this range, if any.
    pub fn clip(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = start.max(self.start);
        let end = end.min(self.end);
        (start < end).then_some((start, end))
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%Y-%m-%d %H:%M UTC")
        )
    }
}

/// FBTYPE of a busy period, ordered by how strongly it blocks time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BusyKind {
    BusyTentative,
    Busy,
    BusyUnavailable,
}

impl BusyKind {
    pub fn as_fbtype(&self) -> &'static str {
        match self {
            BusyKind::BusyTentative => "BUSY-TENTATIVE",
            BusyKind::Busy => "BUSY",
            BusyKind::BusyUnavailable => "BUSY-UNAVAILABLE",
        }
    }

    /// `None` for FREE. Unrecognized types are BUSY (RFC 5545 §3.2.9).
    pub fn from_fbtype(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FREE" => None,
            "BUSY-TENTATIVE" => Some(BusyKind::BusyTentative),
            "BUSY-UNAVAILABLE" => Some(BusyKind::BusyUnavailable),
            _ => Some(BusyKind::Busy),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub kind: BusyKind,
}

impl BusyInterval {
    pub fn busy(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        BusyInterval {
            start,
            end,
            kind: BusyKind::Busy,
        }
    }
}

impl fmt::Display for BusyInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} ({})",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%H:%M"),
            self.kind.as_fbtype()
        )
    }
}

/// Clip intervals to `range`, drop what falls outside, and flatten overlaps
/// into an ordered, non-overlapping list. Time covered by several periods
/// takes the strongest kind; the rest keeps its own. Touching periods merge
/// only when their kinds match.
pub fn normalize_busy(
    range: &TimeRange,
    intervals: impl IntoIterator<Item = BusyInterval>,
) -> Vec<BusyInterval> {
    let clipped: Vec<BusyInterval> = intervals
        .into_iter()
        .filter_map(|iv| {
            range.clip(iv.start, iv.end).map(|(start, end)| BusyInterval {
                start,
                end,
                kind: iv.kind,
            })
        })
        .collect();

    let mut bounds: Vec<DateTime<Utc>> = clipped.iter().flat_map(|iv| [iv.start, iv.end]).collect();
    bounds.sort();
    bounds.dedup();

    let mut merged: Vec<BusyInterval> = Vec::with_capacity(clipped.len());
    for window in bounds.windows(2) {
        let (start, end) = (window[0], window[1]);
        let Some(kind) = clipped
            .iter()
            .filter(|iv| iv.start <= start && end <= iv.end)
            .map(|iv| iv.kind)
            .max()
        else {
            continue;
        };
        match merged.last_mut() {
            Some(last) if last.end == start && last.kind == kind => last.end = end,
            _ => merged.push(BusyInterval { start, end, kind }),
        }
    }
    merged
}

/// What is known about one participant's time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Availability {
    /// Busy periods in the queried range; empty means free throughout.
    Known(Vec<BusyInterval>),
    /// The participant could not be reached or does not disclose free/busy.
    Unknown { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreeBusyReport {
    pub participant: CalendarUser,
    pub availability: Availability,
}

impl FreeBusyReport {
    pub fn busy(&self) -> Option<&[BusyInterval]> {
        match &self.availability {
            Availability::Known(busy) => Some(busy),
            Availability::Unknown { .. } => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.availability, Availability::Unknown { .. })
    }

    fn unknown(participant: &CalendarUser, reason: impl Into<String>) -> Self {
        FreeBusyReport {
            participant: participant.clone(),
            availability: Availability::Unknown {
                reason: reason.into(),
            },
        }
    }
}

/// A VFREEBUSY request as sent to the outbox.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeBusyRequest {
    pub uid: String,
    pub dtstamp: DateTime<Utc>,
    pub organizer: CalendarUser,
    pub attendees: Vec<CalendarUser>,
    pub range: TimeRange,
}

/// A parsed VFREEBUSY object, request or reply.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeBusyMessage {
    pub method: Option<ItipMethod>,
    pub uid: Option<String>,
    pub organizer: Option<CalendarUser>,
    pub attendees: Vec<CalendarUser>,
    pub range: Option<TimeRange>,
    pub busy: Vec<BusyInterval>,
}

/// Runs free/busy queries on behalf of one organizer.
pub struct FreeBusyQueryEngine {
    store: SharedStore,
    codec: SharedCodec,
    organizer: Principal,
}

impl FreeBusyQueryEngine {
    pub fn new(store: SharedStore, organizer: Principal) -> Self {
        FreeBusyQueryEngine {
            store,
            codec: std::sync::Arc::new(IcsCodec),
            organizer,
        }
    }

    pub fn with_codec(mut self, codec: SharedCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Ask the server for the busy time of each participant over `range`.
    ///
    /// Reports come back in participant order. Failing to submit the request
    /// at all is an error; a participant the server cannot answer for is
    /// reported as unknown.
    pub async fn query(
        &self,
        range: TimeRange,
        participants: &[CalendarUser],
    ) -> SchedResult<Vec<FreeBusyReport>> {
        if participants.is_empty() {
            return Ok(Vec::new());
        }

        let request = FreeBusyRequest {
            uid: format!("{}@calsched", uuid::Uuid::new_v4()),
            dtstamp: Utc::now(),
            organizer: self.organizer.user(),
            attendees: participants.to_vec(),
            range,
        };
        let body = self.codec.serialize_freebusy_request(&request)?;

        tracing::debug!(
            outbox = %self.organizer.outbox_href,
            participants = participants.len(),
            "posting free/busy request"
        );
        let responses = self
            .store
            .schedule_post(&self.organizer.outbox_href, body)
            .await?;

        let reports = participants
            .iter()
            .map(|participant| {
                let Some(response) = responses
                    .iter()
                    .find(|r| same_address(&r.recipient, &participant.email))
                else {
                    return FreeBusyReport::unknown(participant, "no response from server");
                };

                if !response.is_success() {
                    return FreeBusyReport::unknown(
                        participant,
                        format!("request status {}", response.request_status),
                    );
                }

                let Some(data) = response.calendar_data.as_deref() else {
                    return FreeBusyReport::unknown(participant, "no free/busy data");
                };

                match self.codec.parse_freebusy(data) {
                    Ok(message) => FreeBusyReport {
                        participant: participant.clone(),
                        availability: Availability::Known(normalize_busy(&range, message.busy)),
                    },
                    Err(e) => {
                        tracing::warn!(participant = %participant.email, error = %e, "unreadable free/busy reply");
                        FreeBusyReport::unknown(participant, format!("unreadable reply: {}", e))
                    }
                }
            })
            .collect();

        Ok(reports)
    }
}
