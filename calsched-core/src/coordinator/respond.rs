use chrono::Utc;

use super::{ReconcileOutcome, ReconcileResult, SchedulingCoordinator};
use crate::error::{SchedError, SchedResult};
use crate::event::Event;
use crate::message::InboxItem;
use crate::participation::{Decision, ParticipationStatus};
use crate::store::Precondition;

impl SchedulingCoordinator {
    /// Answer an invitation as this principal.
    ///
    /// Writes the decision to this principal's copy of the event; the server
    /// turns that write into a REPLY to the organizer. A conflicting write is
    /// retried from a fresh read. Answering again with the same decision is
    /// a no-op, so a retried call never sends a second REPLY.
    pub async fn respond_to_invite(
        &self,
        item: &InboxItem,
        decision: Decision,
    ) -> SchedResult<ReconcileResult> {
        if !item.is_invite() {
            return Err(SchedError::UnexpectedMessage {
                expected: "invite".to_string(),
                actual: item.kind.to_string(),
            });
        }

        let me = self.principal.address.as_str();
        let uid = item.uid();
        if item.event.attendee(me).is_none() {
            return Err(SchedError::AttendeeNotFound {
                uid: uid.to_string(),
                attendee: me.to_string(),
            });
        }

        let href = self.principal.calendar_object_href(uid);
        let wanted = ParticipationStatus::from(decision);
        let mut last_revision = None;

        for attempt in 1..=self.policy.max_attempts {
            let (mut event, precondition) = match self.fetch_event(&href).await {
                Ok((stored, copy)) => {
                    last_revision = Some(stored.revision.clone());
                    (
                        newer_of(copy, &item.event),
                        Precondition::IfMatch(stored.revision),
                    )
                }
                Err(SchedError::NotFound(_)) => (item.event.clone(), Precondition::IfNoneMatch),
                Err(e) => return Err(e),
            };

            let attendee = event
                .attendee_mut(me)
                .ok_or_else(|| SchedError::AttendeeNotFound {
                    uid: uid.to_string(),
                    attendee: me.to_string(),
                })?;

            if attendee.partstat == wanted
                && let Precondition::IfMatch(revision) = &precondition
            {
                tracing::debug!(uid = %uid, partstat = %wanted, "invite already answered");
                let removed = self.consume(item).await;
                return Ok(ReconcileResult {
                    uid: uid.to_string(),
                    href,
                    revision: revision.clone(),
                    outcome: ReconcileOutcome::Duplicate,
                    attempts: 0,
                    inbox_item_removed: removed,
                });
            }

            attendee.partstat = attendee.partstat.transition(decision)?;
            attendee.rsvp = false;
            event.dtstamp = Utc::now();

            let data = self.codec.serialize(&event, None)?;
            match self.store.put(&href, data, precondition).await {
                Ok(revision) => {
                    tracing::info!(uid = %uid, partstat = %wanted, attempt, "answered invite");
                    let removed = self.consume(item).await;
                    return Ok(ReconcileResult {
                        uid: uid.to_string(),
                        href,
                        revision,
                        outcome: ReconcileOutcome::Applied,
                        attempts: attempt,
                        inbox_item_removed: removed,
                    });
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(uid = %uid, href = %href, attempt, "conflict answering invite, retrying");
                    self.backoff(attempt).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(self.exhausted(uid, me, last_revision))
    }
}

/// The attendee's stored copy, unless the organizer has since sent a newer
/// revision of the event.
fn newer_of(copy: Event, invite: &Event) -> Event {
    if invite.sequence > copy.sequence {
        invite.clone()
    } else {
        copy
    }
}
