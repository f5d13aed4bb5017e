//! Calendar users on the server and how attendees are named.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{SchedError, SchedResult};
use crate::event::{CalendarUser, strip_mailto};
use crate::store::object_href;

/// A calendar user identity with its scheduling collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub href: String,
    pub display_name: Option<String>,
    /// Scheduling address, without `mailto:`
    pub address: String,
    /// Calendar that holds this user's copies of scheduled events
    pub calendar_href: String,
    pub inbox_href: String,
    pub outbox_href: String,
}

impl Principal {
    pub fn user(&self) -> CalendarUser {
        CalendarUser::new(self.display_name.clone(), &self.address)
    }

    /// Where this principal keeps its copy of the event with `uid`.
    pub fn calendar_object_href(&self, uid: &str) -> String {
        object_href(&self.calendar_href, uid)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user())
    }
}

/// How a caller names an attendee when inviting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendeeSpec {
    /// Bare scheduling address (`bob@example.com` or `mailto:bob@example.com`)
    Address(String),
    /// Display name plus address
    Named { name: String, email: String },
    /// Principal URL, resolved through an [`AddressResolver`]
    Principal(String),
}

impl AttendeeSpec {
    /// The text this spec was given as, for reporting.
    pub fn label(&self) -> String {
        match self {
            AttendeeSpec::Address(address) => strip_mailto(address).to_string(),
            AttendeeSpec::Named { email, .. } => strip_mailto(email).to_string(),
            AttendeeSpec::Principal(href) => href.clone(),
        }
    }

    /// Turn the spec into a calendar user with a usable scheduling address.
    pub async fn resolve(&self, resolver: &dyn AddressResolver) -> SchedResult<CalendarUser> {
        let user = match self {
            AttendeeSpec::Address(address) => CalendarUser::new(None, address),
            AttendeeSpec::Named { name, email } => CalendarUser::new(Some(name.clone()), email),
            AttendeeSpec::Principal(href) => resolver.resolve(href).await?,
        };
        validate_address(&user.email)?;
        Ok(user)
    }
}

impl FromStr for AttendeeSpec {
    type Err = SchedError;

    /// Parses `Name <mail>`, a principal URL (`https://...` or `/principals/...`),
    /// or a bare address.
    fn from_str(s: &str) -> SchedResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SchedError::AddressResolution {
                address: String::new(),
                reason: "empty attendee".to_string(),
            });
        }

        if let (Some(open), true) = (s.find('<'), s.ends_with('>')) {
            let name = s[..open].trim().trim_matches('"').to_string();
            let email = s[open + 1..s.len() - 1].trim().to_string();
            if name.is_empty() {
                return Ok(AttendeeSpec::Address(email));
            }
            return Ok(AttendeeSpec::Named { name, email });
        }

        if s.starts_with("http://") || s.starts_with("https://") || s.starts_with('/') {
            return Ok(AttendeeSpec::Principal(s.to_string()));
        }

        Ok(AttendeeSpec::Address(s.to_string()))
    }
}

impl From<&Principal> for AttendeeSpec {
    fn from(principal: &Principal) -> Self {
        AttendeeSpec::Principal(principal.href.clone())
    }
}

impl From<CalendarUser> for AttendeeSpec {
    fn from(user: CalendarUser) -> Self {
        match user.name {
            Some(name) => AttendeeSpec::Named {
                name,
                email: user.email,
            },
            None => AttendeeSpec::Address(user.email),
        }
    }
}

fn validate_address(address: &str) -> SchedResult<()> {
    let address = strip_mailto(address);
    let valid = match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !address.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SchedError::AddressResolution {
            address: address.to_string(),
            reason: "not a scheduling address".to_string(),
        })
    }
}

/// Maps a principal reference to its scheduling address.
///
/// Implementations carry their own credentials, so a coordinator can only
/// resolve what its account is allowed to see.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self, principal_href: &str) -> SchedResult<CalendarUser>;
}

pub type SharedResolver = Arc<dyn AddressResolver>;

/// Resolver for callers without directory access; every lookup fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDirectory;

#[async_trait]
impl AddressResolver for NoDirectory {
    async fn resolve(&self, principal_href: &str) -> SchedResult<CalendarUser> {
        Err(SchedError::AddressResolution {
            address: principal_href.to_string(),
            reason: "no directory access".to_string(),
        })
    }
}
