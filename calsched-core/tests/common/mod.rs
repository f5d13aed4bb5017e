#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use calsched_core::config::{InboxRetention, SchedulingPolicy};
use calsched_core::memory::{MemoryServer, MemoryStore};
use calsched_core::store::{RecipientResponse, StoredResource};
use calsched_core::{
    Event, EventTime, InboxItem, Precondition, Principal, ResourceStore, RevisionToken,
    SchedError, SchedResult, SchedulingCoordinator,
};
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Barrier;

pub struct Office {
    pub server: Arc<MemoryServer>,
    pub alice: Principal,
    pub bob: Principal,
    pub carol: Principal,
    pub dave: Principal,
}

impl Office {
    pub fn new() -> Self {
        let server = MemoryServer::new();
        let alice = server.register("Alice", "alice@example.com");
        let bob = server.register("Bob", "bob@example.com");
        let carol = server.register("Carol", "carol@example.com");
        let dave = server.register("Dave", "dave@example.com");
        Office {
            server,
            alice,
            bob,
            carol,
            dave,
        }
    }

    pub fn store(&self, principal: &Principal) -> MemoryStore {
        self.server.store_for(principal)
    }

    pub fn coordinator(&self, principal: &Principal) -> SchedulingCoordinator {
        self.coordinator_with(principal, InboxRetention::Delete)
    }

    pub fn coordinator_with(
        &self,
        principal: &Principal,
        retention: InboxRetention,
    ) -> SchedulingCoordinator {
        self.coordinator_on(Arc::new(self.store(principal)), principal, retention)
    }

    pub fn coordinator_on(
        &self,
        store: Arc<dyn ResourceStore>,
        principal: &Principal,
        retention: InboxRetention,
    ) -> SchedulingCoordinator {
        SchedulingCoordinator::new(store, principal.clone(), Arc::new(self.server.resolver()))
            .with_policy(SchedulingPolicy {
                max_attempts: 4,
                conflict_backoff: Duration::ZERO,
                retention,
            })
    }

    /// Parsed organizer copy of `uid` in `principal`'s calendar.
    pub fn calendar_copy(&self, principal: &Principal, uid: &str) -> Event {
        let data = self
            .server
            .resource(&principal.calendar_object_href(uid))
            .expect("calendar copy exists");
        calsched_core::ics::parse_schedule_object(&data)
            .expect("calendar copy parses")
            .event
    }
}

pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 20, h, m, 0).unwrap()
}

/// Two-hour meeting on 2025-03-20 from 10:00 UTC.
pub fn meeting(summary: &str) -> Event {
    Event::new(
        summary,
        EventTime::DateTimeUtc(at(10, 0)),
        EventTime::DateTimeUtc(at(12, 0)),
    )
}

pub async fn inbox(coordinator: &SchedulingCoordinator) -> Vec<InboxItem> {
    coordinator
        .triage_inbox()
        .collect_items()
        .await
        .expect("inbox readable")
}

/// Holds the first two reads of one href until both have happened, so two
/// writers start from the same revision.
pub struct GatedStore {
    pub inner: MemoryStore,
    pub href: String,
    gets: AtomicUsize,
    barrier: Barrier,
}

impl GatedStore {
    pub fn new(inner: MemoryStore, href: String) -> Self {
        GatedStore {
            inner,
            href,
            gets: AtomicUsize::new(0),
            barrier: Barrier::new(2),
        }
    }
}

#[async_trait]
impl ResourceStore for GatedStore {
    async fn get(&self, href: &str) -> SchedResult<StoredResource> {
        let result = self.inner.get(href).await;
        if href == self.href && self.gets.fetch_add(1, Ordering::SeqCst) < 2 {
            self.barrier.wait().await;
        }
        result
    }

    async fn put(
        &self,
        href: &str,
        data: String,
        precondition: Precondition,
    ) -> SchedResult<RevisionToken> {
        self.inner.put(href, data, precondition).await
    }

    async fn list_children(&self, collection_href: &str) -> SchedResult<Vec<String>> {
        self.inner.list_children(collection_href).await
    }

    async fn delete(&self, href: &str, if_match: &RevisionToken) -> SchedResult<()> {
        self.inner.delete(href, if_match).await
    }

    async fn schedule_post(
        &self,
        outbox_href: &str,
        data: String,
    ) -> SchedResult<Vec<RecipientResponse>> {
        self.inner.schedule_post(outbox_href, data).await
    }
}

/// Every write to `href` loses against an imaginary concurrent writer.
pub struct ContendedStore {
    pub inner: MemoryStore,
    pub href: String,
}

#[async_trait]
impl ResourceStore for ContendedStore {
    async fn get(&self, href: &str) -> SchedResult<StoredResource> {
        self.inner.get(href).await
    }

    async fn put(
        &self,
        href: &str,
        data: String,
        precondition: Precondition,
    ) -> SchedResult<RevisionToken> {
        if href == self.href {
            return Err(SchedError::Conflict {
                href: href.to_string(),
                revision: format!("{:?}", precondition),
            });
        }
        self.inner.put(href, data, precondition).await
    }

    async fn list_children(&self, collection_href: &str) -> SchedResult<Vec<String>> {
        self.inner.list_children(collection_href).await
    }

    async fn delete(&self, href: &str, if_match: &RevisionToken) -> SchedResult<()> {
        self.inner.delete(href, if_match).await
    }

    async fn schedule_post(
        &self,
        outbox_href: &str,
        data: String,
    ) -> SchedResult<Vec<RecipientResponse>> {
        self.inner.schedule_post(outbox_href, data).await
    }
}
