use serde::Serialize;

use super::{ReconcileOutcome, SchedulingCoordinator};
use crate::error::SchedResult;
use crate::message::{InboxItem, MessageKind};
use crate::participation::Decision;

/// Tally of one pass over the inbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InboxSummary {
    pub replies_applied: usize,
    /// Replays and out-of-date replies
    pub replies_discarded: usize,
    pub invites_answered: usize,
    /// Invites the decision function passed on, plus cancellations and other messages
    pub left_untouched: usize,
    /// One message per item that could not be handled
    pub failures: Vec<String>,
}

impl SchedulingCoordinator {
    /// Handle everything in the inbox once.
    ///
    /// Replies are reconciled into the organizer's copies. Invites are
    /// answered with whatever `decide` returns for them, or left alone on
    /// `None`. Everything else stays in the inbox. A failure on one item is
    /// recorded and the pass continues.
    pub async fn process_inbox<F>(&self, mut decide: F) -> SchedResult<InboxSummary>
    where
        F: FnMut(&InboxItem) -> Option<Decision>,
    {
        let mut summary = InboxSummary::default();
        let mut triage = self.triage_inbox();

        while let Some(next) = triage.next().await {
            let item = match next {
                Ok(item) => item,
                Err(e) => {
                    summary.failures.push(e.to_string());
                    continue;
                }
            };

            match item.kind {
                MessageKind::Reply => match self.reconcile_reply(&item).await {
                    Ok(result) if result.outcome == ReconcileOutcome::Applied => {
                        summary.replies_applied += 1
                    }
                    Ok(_) => summary.replies_discarded += 1,
                    Err(e) => {
                        tracing::warn!(href = %item.href, error = %e, "failed to reconcile reply");
                        summary.failures.push(format!("{}: {}", item.href, e));
                    }
                },
                MessageKind::Invite => match decide(&item) {
                    Some(decision) => match self.respond_to_invite(&item, decision).await {
                        Ok(_) => summary.invites_answered += 1,
                        Err(e) => {
                            tracing::warn!(href = %item.href, error = %e, "failed to answer invite");
                            summary.failures.push(format!("{}: {}", item.href, e));
                        }
                    },
                    None => summary.left_untouched += 1,
                },
                MessageKind::Cancellation | MessageKind::Other => summary.left_untouched += 1,
            }
        }

        Ok(summary)
    }
}
