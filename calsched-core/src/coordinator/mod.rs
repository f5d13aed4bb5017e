//! The scheduling coordinator: builds, sends and reconciles scheduling
//! messages for one principal.
//!
//! All shared state lives on the server. Every write is conditional on the
//! revision that was read, and a lost write is retried from a fresh read a
//! bounded number of times. No lock is held across a store call.

mod dispatch;
mod process;
mod reconcile;
mod respond;
mod triage;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use dispatch::{DeliveryOutcome, DeliveryStatus, DispatchResult};
pub use process::InboxSummary;
pub use triage::InboxTriage;

use crate::codec::SharedCodec;
use crate::config::{InboxRetention, SchedulingPolicy};
use crate::error::{SchedError, SchedResult};
use crate::event::{CalendarUser, Event};
use crate::freebusy::{FreeBusyQueryEngine, FreeBusyReport, TimeRange};
use crate::ics::IcsCodec;
use crate::message::InboxItem;
use crate::principal::{Principal, SharedResolver};
use crate::store::{RevisionToken, SharedStore, StoredResource};

/// How a response or reply ended up on the stored copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileOutcome {
    /// The copy was updated.
    Applied,
    /// The copy already reflected this exact answer; nothing was written.
    Duplicate,
    /// The copy holds newer information; the message was discarded.
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileResult {
    pub uid: String,
    /// The calendar object that was reconciled
    pub href: String,
    /// Revision of that object after this operation
    pub revision: RevisionToken,
    pub outcome: ReconcileOutcome,
    /// Conditional-write attempts used, 0 when nothing had to be written
    pub attempts: u32,
    /// Whether the inbox message was deleted afterwards
    pub inbox_item_removed: bool,
}

pub struct SchedulingCoordinator {
    store: SharedStore,
    principal: Principal,
    resolver: SharedResolver,
    codec: SharedCodec,
    policy: SchedulingPolicy,
}

impl SchedulingCoordinator {
    pub fn new(store: SharedStore, principal: Principal, resolver: SharedResolver) -> Self {
        SchedulingCoordinator {
            store,
            principal,
            resolver,
            codec: Arc::new(IcsCodec),
            policy: SchedulingPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SchedulingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_codec(mut self, codec: SharedCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn policy(&self) -> &SchedulingPolicy {
        &self.policy
    }

    pub fn freebusy_engine(&self) -> FreeBusyQueryEngine {
        FreeBusyQueryEngine::new(self.store.clone(), self.principal.clone())
            .with_codec(self.codec.clone())
    }

    /// Busy time of each participant in `range`, asked as this principal.
    pub async fn query_freebusy(
        &self,
        range: TimeRange,
        participants: &[CalendarUser],
    ) -> SchedResult<Vec<FreeBusyReport>> {
        self.freebusy_engine().query(range, participants).await
    }

    /// Fetch and parse the calendar object at `href`.
    async fn fetch_event(&self, href: &str) -> SchedResult<(StoredResource, Event)> {
        let stored = self.store.get(href).await?;
        let event = self.codec.parse(&stored.data)?.event;
        Ok((stored, event))
    }

    async fn backoff(&self, attempt: u32) {
        if attempt < self.policy.max_attempts && !self.policy.conflict_backoff.is_zero() {
            tokio::time::sleep(self.policy.conflict_backoff).await;
        }
    }

    fn exhausted(&self, uid: &str, attendee: &str, last_revision: Option<RevisionToken>) -> SchedError {
        SchedError::ReconciliationFailed {
            uid: uid.to_string(),
            attendee: attendee.to_string(),
            last_revision,
            attempts: self.policy.max_attempts,
        }
    }

    /// Remove a processed inbox message according to the retention policy.
    ///
    /// Only called once the message's effect is stored. Failing to delete
    /// is logged, not returned: the message is already accounted for and a
    /// later pass will see it as a duplicate.
    async fn consume(&self, item: &InboxItem) -> bool {
        if self.policy.retention == InboxRetention::Retain {
            return false;
        }

        match self.store.delete(&item.href, &item.revision).await {
            Ok(()) => {
                tracing::debug!(href = %item.href, uid = %item.uid(), "deleted inbox item");
                true
            }
            Err(SchedError::NotFound(_)) => true,
            Err(e) => {
                tracing::warn!(href = %item.href, error = %e, "could not delete inbox item");
                false
            }
        }
    }
}
