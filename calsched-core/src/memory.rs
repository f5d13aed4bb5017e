//! In-process CalDAV scheduling server.
//!
//! Serves several principals from one shared map of calendar objects and
//! performs implicit scheduling the way an RFC 6638 server does:
//!
//! - an organizer creating an event delivers a REQUEST to every known
//!   attendee's inbox and stamps SCHEDULE-STATUS on its copy
//! - an attendee writing an answer to its copy delivers a REPLY to the
//!   organizer's inbox
//! - a VFREEBUSY request POSTed to an outbox is answered per recipient from
//!   that recipient's opaque events
//!
//! Each [`MemoryStore`] acts as one authenticated principal.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{SchedError, SchedResult};
use crate::event::{CalendarUser, Event, EventStatus, same_address};
use crate::freebusy::{BusyInterval, BusyKind, TimeRange, normalize_busy};
use crate::ics::{generate_freebusy_reply, generate_ics, parse_freebusy, parse_schedule_object};
use crate::message::ItipMethod;
use crate::participation::ParticipationStatus;
use crate::principal::{AddressResolver, Principal};
use crate::store::{
    Precondition, RecipientResponse, ResourceStore, RevisionToken, StoredResource, object_href,
};

#[derive(Debug, Default)]
struct ServerState {
    /// href -> (etag, calendar data)
    resources: BTreeMap<String, (RevisionToken, String)>,
    principals: Vec<Principal>,
    /// Lowercased addresses that do not disclose free/busy
    private: BTreeSet<String>,
    etag_counter: u64,
}

impl ServerState {
    fn next_etag(&mut self) -> RevisionToken {
        self.etag_counter += 1;
        format!("\"{}\"", self.etag_counter)
    }

    fn principal_by_address(&self, address: &str) -> Option<&Principal> {
        self.principals
            .iter()
            .find(|p| same_address(&p.address, address))
    }

    fn deliver(&mut self, inbox_href: &str, data: String) -> String {
        let href = object_href(inbox_href, &uuid::Uuid::new_v4().to_string());
        let etag = self.next_etag();
        self.resources.insert(href.clone(), (etag, data));
        href
    }

    fn children(&self, collection_href: &str) -> Vec<String> {
        let prefix = format!("{}/", collection_href.trim_end_matches('/'));
        self.resources
            .keys()
            .filter(|href| {
                href.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
            })
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct MemoryServer {
    state: Mutex<ServerState>,
}

impl MemoryServer {
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryServer::default())
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a principal with a calendar, inbox and outbox.
    pub fn register(&self, name: &str, email: &str) -> Principal {
        let mut state = self.state();
        let local = email.split('@').next().unwrap_or(email).to_ascii_lowercase();
        let mut user = local.clone();
        let mut n = 1;
        while state
            .principals
            .iter()
            .any(|p| p.href == format!("/principals/{}/", user))
        {
            n += 1;
            user = format!("{}{}", local, n);
        }

        let principal = Principal {
            href: format!("/principals/{}/", user),
            display_name: Some(name.to_string()),
            address: CalendarUser::new(None, email).email,
            calendar_href: format!("/calendars/{}/calendar/", user),
            inbox_href: format!("/calendars/{}/inbox/", user),
            outbox_href: format!("/calendars/{}/outbox/", user),
        };
        state.principals.push(principal.clone());
        principal
    }

    /// Hide a principal's free/busy from other users.
    pub fn set_private(&self, address: &str, private: bool) {
        let key = CalendarUser::new(None, address).email.to_ascii_lowercase();
        let mut state = self.state();
        if private {
            state.private.insert(key);
        } else {
            state.private.remove(&key);
        }
    }

    pub fn principals(&self) -> Vec<Principal> {
        self.state().principals.clone()
    }

    /// Calendar data at `href`, bypassing authentication.
    pub fn resource(&self, href: &str) -> Option<String> {
        self.state().resources.get(href).map(|(_, data)| data.clone())
    }

    pub fn children(&self, collection_href: &str) -> Vec<String> {
        self.state().children(collection_href)
    }

    /// A store acting as `principal`.
    pub fn store_for(self: &Arc<Self>, principal: &Principal) -> MemoryStore {
        MemoryStore {
            server: Arc::clone(self),
            owner: principal.clone(),
        }
    }

    pub fn resolver(self: &Arc<Self>) -> MemoryResolver {
        MemoryResolver {
            server: Arc::clone(self),
        }
    }
}

/// One principal's authenticated view of a [`MemoryServer`].
#[derive(Debug, Clone)]
pub struct MemoryStore {
    server: Arc<MemoryServer>,
    owner: Principal,
}

impl MemoryStore {
    pub fn owner(&self) -> &Principal {
        &self.owner
    }

    /// Scheduling side effects of a write to the owner's calendar. Returns
    /// the data to store, with SCHEDULE-STATUS stamped on organizer copies.
    fn schedule_write(
        &self,
        state: &mut ServerState,
        data: String,
        previous: Option<&str>,
    ) -> SchedResult<String> {
        let mut event = parse_schedule_object(&data)
            .map_err(|e| SchedError::Transport(format!("415 invalid calendar data: {}", e)))?
            .event;
        let owner = self.owner.address.as_str();

        if event.is_organized_by(owner) {
            if previous.is_some() {
                return Ok(data);
            }
            let request = generate_ics(&event, Some(&ItipMethod::Request))?;
            for attendee in event.attendees.iter_mut() {
                if same_address(&attendee.email, owner) {
                    continue;
                }
                let inbox = state
                    .principal_by_address(&attendee.email)
                    .map(|p| p.inbox_href.clone());
                attendee.schedule_status = Some(match inbox {
                    Some(inbox) => {
                        let href = state.deliver(&inbox, request.clone());
                        tracing::debug!(uid = %event.uid, to = %attendee.email, href = %href, "delivered request");
                        "1.2".to_string()
                    }
                    None => "3.7".to_string(),
                });
            }
            return generate_ics(&event, None);
        }

        let Some(organizer) = event.organizer.clone() else {
            return Ok(data);
        };
        let Some(answer) = event.attendee(owner).cloned() else {
            return Ok(data);
        };
        if answer.partstat == ParticipationStatus::NeedsAction {
            return Ok(data);
        }
        let unchanged = previous
            .and_then(|p| parse_schedule_object(p).ok())
            .and_then(|p| p.event.attendee(owner).map(|a| a.partstat))
            .is_some_and(|before| before == answer.partstat);
        if unchanged {
            return Ok(data);
        }

        if let Some(inbox) = state
            .principal_by_address(&organizer.email)
            .map(|p| p.inbox_href.clone())
        {
            let mut reply = event.clone();
            reply.attendees = vec![answer];
            let href = state.deliver(&inbox, generate_ics(&reply, Some(&ItipMethod::Reply))?);
            tracing::debug!(uid = %event.uid, to = %organizer.email, href = %href, "delivered reply");
        }
        Ok(data)
    }

    fn busy_time(state: &ServerState, principal: &Principal, range: &TimeRange) -> Vec<BusyInterval> {
        let events = state
            .children(&principal.calendar_href)
            .into_iter()
            .filter_map(|href| state.resources.get(&href))
            .filter_map(|(_, data)| parse_schedule_object(data).ok())
            .map(|object| object.event)
            .filter(|event| event.is_busy() && !declined_by(event, &principal.address));

        let intervals = events.filter_map(|event| {
            let start = event.start.to_utc()?;
            let end = event.end.to_utc()?;
            range.overlaps(start, end).then_some(BusyInterval {
                start,
                end,
                kind: if event.status == EventStatus::Tentative {
                    BusyKind::BusyTentative
                } else {
                    BusyKind::Busy
                },
            })
        });

        normalize_busy(range, intervals)
    }
}

fn declined_by(event: &Event, address: &str) -> bool {
    event
        .attendee(address)
        .is_some_and(|a| a.partstat == ParticipationStatus::Declined)
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, href: &str) -> SchedResult<StoredResource> {
        let state = self.server.state();
        state
            .resources
            .get(href)
            .map(|(etag, data)| StoredResource {
                href: href.to_string(),
                revision: etag.clone(),
                data: data.clone(),
            })
            .ok_or_else(|| SchedError::NotFound(href.to_string()))
    }

    async fn put(
        &self,
        href: &str,
        data: String,
        precondition: Precondition,
    ) -> SchedResult<RevisionToken> {
        let mut state = self.server.state();
        let previous = state.resources.get(href).cloned();

        match (&precondition, &previous) {
            (Precondition::IfMatch(expected), Some((current, _))) if expected == current => {}
            (Precondition::IfMatch(expected), _) => {
                return Err(SchedError::Conflict {
                    href: href.to_string(),
                    revision: expected.clone(),
                });
            }
            (Precondition::IfNoneMatch, None) => {}
            (Precondition::IfNoneMatch, Some(_)) => {
                return Err(SchedError::Conflict {
                    href: href.to_string(),
                    revision: "*".to_string(),
                });
            }
        }

        let data = if href.starts_with(&self.owner.calendar_href) {
            self.schedule_write(&mut state, data, previous.as_ref().map(|(_, d)| d.as_str()))?
        } else {
            data
        };

        let etag = state.next_etag();
        state
            .resources
            .insert(href.to_string(), (etag.clone(), data));
        Ok(etag)
    }

    async fn list_children(&self, collection_href: &str) -> SchedResult<Vec<String>> {
        Ok(self.server.state().children(collection_href))
    }

    async fn delete(&self, href: &str, if_match: &RevisionToken) -> SchedResult<()> {
        let mut state = self.server.state();
        match state.resources.get(href) {
            None => Err(SchedError::NotFound(href.to_string())),
            Some((current, _)) if current != if_match => Err(SchedError::Conflict {
                href: href.to_string(),
                revision: if_match.clone(),
            }),
            Some(_) => {
                state.resources.remove(href);
                Ok(())
            }
        }
    }

    async fn schedule_post(
        &self,
        outbox_href: &str,
        data: String,
    ) -> SchedResult<Vec<RecipientResponse>> {
        if outbox_href != self.owner.outbox_href {
            return Err(SchedError::Transport(format!(
                "403 {} is not the outbox of {}",
                outbox_href, self.owner.address
            )));
        }

        let request = parse_freebusy(&data)
            .map_err(|e| SchedError::Transport(format!("400 bad free/busy request: {}", e)))?;
        let range = request
            .range
            .ok_or_else(|| SchedError::Transport("400 free/busy request without range".into()))?;

        let state = self.server.state();
        let responses = request
            .attendees
            .iter()
            .map(|attendee| {
                let recipient = attendee.mailto();
                match state.principal_by_address(&attendee.email) {
                    None => RecipientResponse {
                        recipient,
                        request_status: "3.7;Invalid calendar user".to_string(),
                        calendar_data: None,
                    },
                    Some(p) if state.private.contains(&p.address.to_ascii_lowercase()) => {
                        RecipientResponse {
                            recipient,
                            request_status: "3.8;No authority".to_string(),
                            calendar_data: None,
                        }
                    }
                    Some(p) => {
                        let busy = Self::busy_time(&state, p, &range);
                        RecipientResponse {
                            recipient,
                            request_status: "2.0;Success".to_string(),
                            calendar_data: Some(generate_freebusy_reply(
                                &request, &p.user(), &range, &busy,
                            )),
                        }
                    }
                }
            })
            .collect();

        Ok(responses)
    }
}

/// Directory lookup against the principals of a [`MemoryServer`].
#[derive(Debug, Clone)]
pub struct MemoryResolver {
    server: Arc<MemoryServer>,
}

#[async_trait]
impl AddressResolver for MemoryResolver {
    async fn resolve(&self, principal_href: &str) -> SchedResult<CalendarUser> {
        let wanted = principal_href.trim_end_matches('/');
        self.server
            .state()
            .principals
            .iter()
            .find(|p| p.href.trim_end_matches('/') == wanted)
            .map(Principal::user)
            .ok_or_else(|| SchedError::AddressResolution {
                address: principal_href.to_string(),
                reason: "no such principal".to_string(),
            })
    }
}
