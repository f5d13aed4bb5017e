use chrono::{DateTime, Utc};

use super::{ReconcileOutcome, ReconcileResult, SchedulingCoordinator};
use crate::error::{SchedError, SchedResult};
use crate::event::Attendee;
use crate::message::InboxItem;
use crate::participation::{Decision, ParticipationStatus};
use crate::store::Precondition;

/// What one reply means for one attendee of the organizer's copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Apply,
    Duplicate,
    Stale,
}

/// Order replies by (SEQUENCE, DTSTAMP).
///
/// A reply to an older revision of the event is stale. Otherwise the reply
/// applies unless a reply stamped at or after it was already recorded: the
/// same stamp with the same answer is a replay, anything else is stale.
fn judge(
    reply_sequence: i64,
    reply_stamp: DateTime<Utc>,
    decision: Decision,
    copy_sequence: i64,
    current: &Attendee,
) -> Verdict {
    if reply_sequence < copy_sequence {
        return Verdict::Stale;
    }
    match current.replied_at {
        None => Verdict::Apply,
        Some(recorded) if reply_stamp > recorded => Verdict::Apply,
        Some(recorded)
            if reply_stamp == recorded
                && current.partstat == ParticipationStatus::from(decision) =>
        {
            Verdict::Duplicate
        }
        Some(_) => Verdict::Stale,
    }
}

impl SchedulingCoordinator {
    /// Fold an attendee's REPLY into the organizer's copy of the event, then
    /// remove the reply from the inbox.
    ///
    /// Safe to repeat: a replayed reply changes nothing, and a reply older
    /// than what is already recorded is discarded. The inbox item is removed
    /// only after the copy reflects it.
    pub async fn reconcile_reply(&self, item: &InboxItem) -> SchedResult<ReconcileResult> {
        if !item.is_reply() {
            return Err(SchedError::UnexpectedMessage {
                expected: "reply".to_string(),
                actual: item.kind.to_string(),
            });
        }

        let uid = item.uid();
        let replies = item
            .event
            .attendees
            .iter()
            .map(|a| Ok((a, Decision::from_status(a.partstat)?)))
            .collect::<SchedResult<Vec<(&Attendee, Decision)>>>()?;
        let attendee_label = replies
            .iter()
            .map(|(a, _)| a.email.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let href = self.principal.calendar_object_href(uid);
        let mut last_revision = None;

        for attempt in 1..=self.policy.max_attempts {
            let (stored, mut copy) = self.fetch_event(&href).await?;
            last_revision = Some(stored.revision.clone());

            let copy_sequence = copy.sequence;
            let mut verdicts = Vec::with_capacity(replies.len());
            for (reply, decision) in &replies {
                let current = copy.attendee_mut(&reply.email).ok_or_else(|| {
                    SchedError::AttendeeNotFound {
                        uid: uid.to_string(),
                        attendee: reply.email.clone(),
                    }
                })?;

                let verdict = judge(
                    item.event.sequence,
                    item.event.dtstamp,
                    *decision,
                    copy_sequence,
                    current,
                );
                if verdict == Verdict::Apply {
                    current.partstat = current.partstat.transition(*decision)?;
                    current.replied_at = Some(item.event.dtstamp);
                }
                verdicts.push(verdict);
            }

            if !verdicts.contains(&Verdict::Apply) {
                let outcome = if verdicts.iter().all(|v| *v == Verdict::Duplicate) {
                    ReconcileOutcome::Duplicate
                } else {
                    ReconcileOutcome::Stale
                };
                tracing::debug!(uid = %uid, attendee = %attendee_label, ?outcome, "reply needs no update");
                let removed = self.consume(item).await;
                return Ok(ReconcileResult {
                    uid: uid.to_string(),
                    href,
                    revision: stored.revision,
                    outcome,
                    attempts: 0,
                    inbox_item_removed: removed,
                });
            }

            let data = self.codec.serialize(&copy, None)?;
            match self
                .store
                .put(&href, data, Precondition::IfMatch(stored.revision))
                .await
            {
                Ok(revision) => {
                    tracing::info!(uid = %uid, attendee = %attendee_label, attempt, "applied reply");
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
                    tracing::warn!(uid = %uid, href = %href, attempt, "conflict applying reply, retrying");
                    self.backoff(attempt).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(self.exhausted(uid, &attendee_label, last_revision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CalendarUser;
    use chrono::TimeZone;

    fn stamp(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 20, 12, minute, 0).unwrap()
    }

    fn recorded(partstat: ParticipationStatus, at: Option<DateTime<Utc>>) -> Attendee {
        let mut attendee = Attendee::invited(CalendarUser::new(None, "bob@example.com"));
        attendee.partstat = partstat;
        attendee.replied_at = at;
        attendee
    }

    #[test]
    fn test_first_reply_applies() {
        let current = recorded(ParticipationStatus::NeedsAction, None);
        assert_eq!(judge(0, stamp(0), Decision::Accepted, 0, &current), Verdict::Apply);
    }

    #[test]
    fn test_later_reply_supersedes() {
        let current = recorded(ParticipationStatus::Accepted, Some(stamp(1)));
        assert_eq!(judge(0, stamp(2), Decision::Declined, 0, &current), Verdict::Apply);
    }

    #[test]
    fn test_older_reply_is_stale() {
        let current = recorded(ParticipationStatus::Declined, Some(stamp(2)));
        assert_eq!(judge(0, stamp(1), Decision::Accepted, 0, &current), Verdict::Stale);
    }

    #[test]
    fn test_replay_is_duplicate() {
        let current = recorded(ParticipationStatus::Accepted, Some(stamp(1)));
        assert_eq!(
            judge(0, stamp(1), Decision::Accepted, 0, &current),
            Verdict::Duplicate
        );
        assert_eq!(judge(0, stamp(1), Decision::Declined, 0, &current), Verdict::Stale);
    }

    #[test]
    fn test_reply_to_older_sequence_is_stale() {
        let current = recorded(ParticipationStatus::NeedsAction, None);
        assert_eq!(judge(1, stamp(5), Decision::Accepted, 2, &current), Verdict::Stale);
    }
}
