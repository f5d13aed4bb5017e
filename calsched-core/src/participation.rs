//! Attendee participation lifecycle (PARTSTAT).
//!
//! An attendee starts in `NeedsAction` and moves only on an explicit
//! [`Decision`] of that attendee. `Accepted` and `Declined` need no further
//! action, but a newer decision may still replace them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SchedError, SchedResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipationStatus {
    NeedsAction,
    Accepted,
    Declined,
    Tentative,
    Delegated,
}

impl ParticipationStatus {
    pub fn as_ics_str(&self) -> &'static str {
        match self {
            ParticipationStatus::NeedsAction => "NEEDS-ACTION",
            ParticipationStatus::Accepted => "ACCEPTED",
            ParticipationStatus::Declined => "DECLINED",
            ParticipationStatus::Tentative => "TENTATIVE",
            ParticipationStatus::Delegated => "DELEGATED",
        }
    }

    pub fn from_ics_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "NEEDS-ACTION" => Some(ParticipationStatus::NeedsAction),
            "ACCEPTED" => Some(ParticipationStatus::Accepted),
            "DECLINED" => Some(ParticipationStatus::Declined),
            "TENTATIVE" => Some(ParticipationStatus::Tentative),
            "DELEGATED" => Some(ParticipationStatus::Delegated),
            _ => None,
        }
    }

    /// No further action is required from the attendee.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ParticipationStatus::Accepted | ParticipationStatus::Declined
        )
    }

    /// Apply an attendee's decision.
    ///
    /// Delegated invitations belong to the delegate, so they cannot be
    /// answered here.
    pub fn transition(self, decision: Decision) -> SchedResult<ParticipationStatus> {
        match self {
            ParticipationStatus::Delegated => Err(SchedError::InvalidTransition(format!(
                "{} -> {}: invitation was delegated",
                self, decision
            ))),
            _ => Ok(decision.into()),
        }
    }
}

impl fmt::Display for ParticipationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ics_str())
    }
}

/// An attendee's answer to an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Accepted,
    Declined,
    Tentative,
}

impl Decision {
    /// Read a decision from a REPLY's PARTSTAT. Anything that is not an
    /// answer (NEEDS-ACTION, DELEGATED, unknown values) is rejected.
    pub fn from_status(status: ParticipationStatus) -> SchedResult<Self> {
        match status {
            ParticipationStatus::Accepted => Ok(Decision::Accepted),
            ParticipationStatus::Declined => Ok(Decision::Declined),
            ParticipationStatus::Tentative => Ok(Decision::Tentative),
            other => Err(SchedError::InvalidTransition(format!(
                "{} is not a reply decision",
                other
            ))),
        }
    }
}

impl From<Decision> for ParticipationStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Accepted => ParticipationStatus::Accepted,
            Decision::Declined => ParticipationStatus::Declined,
            Decision::Tentative => ParticipationStatus::Tentative,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(ParticipationStatus::from(*self).as_ics_str())
    }
}

impl FromStr for Decision {
    type Err = SchedError;

    /// Accepts the PARTSTAT names plus the verbs used on the command line.
    fn from_str(s: &str) -> SchedResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accepted" | "accept" => Ok(Decision::Accepted),
            "declined" | "decline" | "reject" => Ok(Decision::Declined),
            "tentative" | "maybe" => Ok(Decision::Tentative),
            other => Err(SchedError::InvalidTransition(format!(
                "'{}' is not one of accepted, declined, tentative",
                other
            ))),
        }
    }
}
